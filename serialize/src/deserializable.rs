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

use crate::VecExt;
use crate::serializable::GLOBAL_TAG;
use crate::tagged::Tagged;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::sync::Arc;

#[cfg(debug_assertions)]
pub const RECURSION_LIMIT: u32 = 50;
#[cfg(not(debug_assertions))]
pub const RECURSION_LIMIT: u32 = 250;

fn invalid_data(msg: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.into())
}

/// Reads a value written by [`tagged_serialize`](crate::tagged_serialize),
/// rejecting both a foreign tag and trailing bytes.
pub fn tagged_deserialize<T: Deserializable + Tagged>(mut reader: impl Read) -> std::io::Result<T> {
    let tag_expected = format!("{GLOBAL_TAG}{}:", T::tag());
    let mut read_tag = Vec::with_capacity(tag_expected.len());
    (&mut reader)
        .take(tag_expected.len() as u64)
        .read_to_end(&mut read_tag)?;
    if read_tag != tag_expected.as_bytes() {
        let sanitised = String::from_utf8_lossy(&read_tag).replace(
            |c: char| !c.is_ascii_alphanumeric() && !":_-()[],".contains(c),
            "?",
        );
        return Err(invalid_data(format!(
            "expected header tag '{tag_expected}', got '{sanitised}'"
        )));
    }
    let value = T::deserialize(&mut reader, 0)?;

    let remaining = reader.bytes().count();
    if remaining != 0 {
        return Err(invalid_data(format!(
            "not all bytes read deserializing '{tag_expected}'; {remaining} bytes remaining"
        )));
    }
    Ok(value)
}

pub trait Deserializable
where
    Self: Sized,
{
    const LIMIT_RECURSION: bool = true;

    fn deserialize(reader: &mut impl Read, recursion_depth: u32) -> std::io::Result<Self>;

    fn check_rec(depth: &mut u32) -> std::io::Result<()> {
        if Self::LIMIT_RECURSION {
            *depth += 1;
            if *depth > RECURSION_LIMIT {
                return Err(invalid_data("exceeded recursion depth deserializing"));
            }
        }
        Ok(())
    }
}

pub(crate) fn read_len(reader: &mut impl Read, recursion_depth: u32) -> std::io::Result<usize> {
    Ok(u32::deserialize(reader, recursion_depth)? as usize)
}

impl<T: Deserializable> Deserializable for Vec<T> {
    fn deserialize(reader: &mut impl Read, mut recursion_depth: u32) -> std::io::Result<Self> {
        Self::check_rec(&mut recursion_depth)?;
        let len = read_len(reader, recursion_depth)?;
        let mut result = Vec::with_bounded_capacity(len);
        for _ in 0..len {
            result.push(T::deserialize(reader, recursion_depth)?);
        }
        Ok(result)
    }
}

impl<K: Deserializable + Ord, V: Deserializable> Deserializable for BTreeMap<K, V> {
    fn deserialize(reader: &mut impl Read, mut recursion_depth: u32) -> std::io::Result<Self> {
        Self::check_rec(&mut recursion_depth)?;
        let len = read_len(reader, recursion_depth)?;
        let mut result = BTreeMap::new();
        for _ in 0..len {
            let k = K::deserialize(reader, recursion_depth)?;
            let v = V::deserialize(reader, recursion_depth)?;
            // Keys must arrive strictly ascending, otherwise the encoding is not canonical.
            if result.last_key_value().is_some_and(|(last, _)| *last >= k) {
                return Err(invalid_data("map keys out of order"));
            }
            result.insert(k, v);
        }
        Ok(result)
    }
}

impl<T: Deserializable + Ord> Deserializable for BTreeSet<T> {
    fn deserialize(reader: &mut impl Read, mut recursion_depth: u32) -> std::io::Result<Self> {
        Self::check_rec(&mut recursion_depth)?;
        let len = read_len(reader, recursion_depth)?;
        let mut result = BTreeSet::new();
        for _ in 0..len {
            let elem = T::deserialize(reader, recursion_depth)?;
            if result.last().is_some_and(|last| *last >= elem) {
                return Err(invalid_data("set elements out of order"));
            }
            result.insert(elem);
        }
        Ok(result)
    }
}

impl<T: Deserializable> Deserializable for Option<T> {
    fn deserialize(reader: &mut impl Read, mut recursion_depth: u32) -> std::io::Result<Self> {
        Self::check_rec(&mut recursion_depth)?;
        match u8::deserialize(reader, recursion_depth)? {
            0 => Ok(None),
            1 => Ok(Some(T::deserialize(reader, recursion_depth)?)),
            other => Err(invalid_data(format!("invalid option discriminant: {other}"))),
        }
    }
}

impl Deserializable for String {
    fn deserialize(reader: &mut impl Read, recursion_depth: u32) -> std::io::Result<Self> {
        let len = read_len(reader, recursion_depth)?;
        let bytes = crate::ReadExt::read_exact_to_vec(reader, len)?;
        String::from_utf8(bytes).map_err(|e| invalid_data(e.to_string()))
    }
}

impl<const N: usize> Deserializable for [u8; N] {
    fn deserialize(reader: &mut impl Read, _recursion_depth: u32) -> std::io::Result<Self> {
        let mut res = [0u8; N];
        reader.read_exact(&mut res[..])?;
        Ok(res)
    }
}

impl<T: Deserializable> Deserializable for Box<T> {
    fn deserialize(reader: &mut impl Read, recursion_depth: u32) -> std::io::Result<Self> {
        T::deserialize(reader, recursion_depth).map(Box::new)
    }
}

impl<T: Deserializable> Deserializable for Arc<T> {
    fn deserialize(reader: &mut impl Read, mut recursion_depth: u32) -> std::io::Result<Self> {
        Self::check_rec(&mut recursion_depth)?;
        T::deserialize(reader, recursion_depth).map(Arc::new)
    }
}
