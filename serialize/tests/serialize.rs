// This file is part of kestrel-ledger.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serialize::*;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::sync::Arc;

#[derive(PartialEq, Debug, Clone, Serializable)]
#[tag = "pair[v1]"]
struct Pair {
    left: u32,
    right: String,
}

#[derive(PartialEq, Debug, Clone, Serializable)]
#[tag = "shape[v1]"]
enum Shape {
    Point,
    Circle(u16),
    Rect { width: u8, height: u8 },
}

#[derive(PartialEq, Debug, Serializable)]
#[tag = "wrapper[v1]"]
struct Wrapper<T> {
    inner: Vec<T>,
}

#[test]
fn integers_are_little_endian_fixed_width() {
    assert_eq!(to_bytes(&0x0102_0304u32), vec![4, 3, 2, 1]);
    assert_eq!(to_bytes(&-1i16), vec![0xff, 0xff]);
    assert_eq!(to_bytes(&1u64).len(), 8);
}

#[test]
fn vec_length_prefix_is_four_bytes() {
    let value = vec![1u8, 2, 3];
    let bytes = to_bytes(&value);
    assert_eq!(bytes, vec![3, 0, 0, 0, 1, 2, 3]);
    assert_eq!(value.serialized_size(), bytes.len());
}

#[test]
fn tagged_prefix_and_roundtrip() {
    let value = Pair {
        left: 7,
        right: "seven".into(),
    };
    let mut bytes = Vec::new();
    tagged_serialize(&value, &mut bytes).unwrap();
    assert!(bytes.starts_with(b"kestrel:pair[v1]:"));
    assert_eq!(bytes.len(), tagged_serialized_size(&value));
    let back: Pair = tagged_deserialize(&mut bytes.as_slice()).unwrap();
    assert_eq!(back, value);
}

#[test]
fn tagged_rejects_foreign_tag() {
    let mut bytes = Vec::new();
    tagged_serialize(&5u32, &mut bytes).unwrap();
    let res: std::io::Result<u64> = tagged_deserialize(&mut bytes.as_slice());
    assert!(res.is_err());
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut bytes = to_bytes(&5u32);
    bytes.push(0);
    assert!(from_bytes::<u32>(&bytes).is_err());
    let mut tagged = Vec::new();
    tagged_serialize(&5u32, &mut tagged).unwrap();
    tagged.push(0);
    assert!(tagged_deserialize::<u32>(&mut tagged.as_slice()).is_err());
}

#[test]
fn too_few_bytes_is_an_error() {
    assert!(from_bytes::<u64>(&[1, 2, 3]).is_err());
    assert!(from_bytes::<String>(&[10, 0, 0, 0, b'a']).is_err());
}

#[test]
fn derived_enum_uses_variant_index() {
    assert_eq!(to_bytes(&Shape::Point), vec![0]);
    assert_eq!(to_bytes(&Shape::Circle(2)), vec![1, 2, 0]);
    assert_eq!(to_bytes(&Shape::Rect { width: 3, height: 4 }), vec![2, 3, 4]);
    assert_eq!(
        from_bytes::<Shape>(&[2, 3, 4]).unwrap(),
        Shape::Rect {
            width: 3,
            height: 4
        }
    );
    assert!(from_bytes::<Shape>(&[3]).is_err());
}

#[test]
fn derived_tags() {
    assert_eq!(Pair::tag(), "pair[v1]");
    assert_eq!(Pair::tag_unique_factor(), "(u32,string)");
    assert_eq!(Shape::tag_unique_factor(), "[(),(u16),(u8,u8)]");
    assert_eq!(Wrapper::<u8>::tag(), "wrapper[v1](u8)");
    assert_eq!(<Option<Pair>>::tag(), "option(pair[v1])");
}

#[test]
fn serialized_size_matches_output() {
    let values = vec![
        Shape::Point,
        Shape::Circle(9),
        Shape::Rect {
            width: 1,
            height: 1,
        },
    ];
    assert_eq!(values.serialized_size(), to_bytes(&values).len());
    let wrapper = Wrapper {
        inner: vec![Some(1u32), None],
    };
    assert_eq!(wrapper.serialized_size(), 4 + 5 + 1);
    assert_eq!(to_bytes(&wrapper).len(), wrapper.serialized_size());
}

#[test]
fn btree_collections_are_canonical() {
    let mut map = BTreeMap::new();
    map.insert("b".to_string(), 2u8);
    map.insert("a".to_string(), 1u8);
    let bytes = to_bytes(&map);
    assert_eq!(from_bytes::<BTreeMap<String, u8>>(&bytes).unwrap(), map);

    // Same elements written in descending order must not decode.
    let mut unsorted = Vec::new();
    2u32.serialize(&mut unsorted).unwrap();
    9u8.serialize(&mut unsorted).unwrap();
    3u8.serialize(&mut unsorted).unwrap();
    assert!(from_bytes::<BTreeSet<u8>>(&unsorted).is_err());
}

#[test]
fn recursion_limit_is_enforced() {
    enum Nested {
        Leaf,
        Node(Arc<Nested>),
    }

    impl Serializable for Nested {
        fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()> {
            match self {
                Nested::Leaf => 0u8.serialize(writer),
                Nested::Node(child) => {
                    1u8.serialize(writer)?;
                    child.serialize(writer)
                }
            }
        }

        fn serialized_size(&self) -> usize {
            match self {
                Nested::Leaf => 1,
                Nested::Node(child) => 1 + child.serialized_size(),
            }
        }
    }

    impl Deserializable for Nested {
        fn deserialize(reader: &mut impl Read, mut recursion_depth: u32) -> std::io::Result<Self> {
            Self::check_rec(&mut recursion_depth)?;
            match u8::deserialize(reader, recursion_depth)? {
                0 => Ok(Nested::Leaf),
                _ => Ok(Nested::Node(Arc::new(Nested::deserialize(
                    reader,
                    recursion_depth,
                )?))),
            }
        }
    }

    let mut value = Nested::Leaf;
    for _ in 0..(RECURSION_LIMIT + 1) {
        value = Nested::Node(Arc::new(value));
    }
    let bytes = to_bytes(&value);
    assert!(from_bytes::<Nested>(&bytes).is_err());
}
