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

use crate::tagged::Tagged;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;

pub const GLOBAL_TAG: &str = "kestrel:";

/// Writes `kestrel:<tag>:` followed by the value.
pub fn tagged_serialize<T: Serializable + Tagged>(
    value: &T,
    mut writer: impl Write,
) -> std::io::Result<()> {
    let tag = T::tag();
    write!(&mut writer, "{GLOBAL_TAG}{tag}:")?;
    value.serialize(&mut writer)
}

pub fn tagged_serialized_size<T: Serializable + Tagged>(value: &T) -> usize {
    GLOBAL_TAG.len() + T::tag().len() + 1 + value.serialized_size()
}

/// Canonical binary serialization.
///
/// `serialized_size` must always equal the number of bytes `serialize` writes;
/// size limits on transactions are computed from it without re-encoding.
pub trait Serializable {
    fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()>;
    fn serialized_size(&self) -> usize;
}

pub(crate) fn write_len(len: usize, writer: &mut impl Write) -> std::io::Result<()> {
    let len = u32::try_from(len).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("collection of length {len} exceeds the u32 length prefix"),
        )
    })?;
    len.serialize(writer)
}

pub(crate) const LEN_PREFIX: usize = 4;

impl<T: Serializable> Serializable for Vec<T> {
    fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()> {
        self.as_slice().serialize(writer)
    }
    fn serialized_size(&self) -> usize {
        self.as_slice().serialized_size()
    }
}

impl<T: Serializable> Serializable for [T] {
    fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()> {
        write_len(self.len(), writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
    fn serialized_size(&self) -> usize {
        self.iter()
            .fold(LEN_PREFIX, |acc, x| acc + x.serialized_size())
    }
}

impl<K: Serializable, V: Serializable> Serializable for BTreeMap<K, V> {
    fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()> {
        write_len(self.len(), writer)?;
        for (k, v) in self.iter() {
            k.serialize(writer)?;
            v.serialize(writer)?;
        }
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        self.iter().fold(LEN_PREFIX, |acc, (k, v)| {
            acc + k.serialized_size() + v.serialized_size()
        })
    }
}

impl<T: Serializable> Serializable for BTreeSet<T> {
    fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()> {
        write_len(self.len(), writer)?;
        for elem in self.iter() {
            elem.serialize(writer)?;
        }
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        self.iter()
            .fold(LEN_PREFIX, |acc, elem| acc + elem.serialized_size())
    }
}

impl<T: Serializable + ?Sized> Serializable for &T {
    fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()> {
        T::serialize(self, writer)
    }

    fn serialized_size(&self) -> usize {
        T::serialized_size(self)
    }
}

impl<T: Serializable> Serializable for Option<T> {
    fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()> {
        match self {
            Some(v) => {
                1u8.serialize(writer)?;
                v.serialize(writer)
            }
            None => 0u8.serialize(writer),
        }
    }

    fn serialized_size(&self) -> usize {
        1 + self.as_ref().map(Serializable::serialized_size).unwrap_or(0)
    }
}

impl Serializable for str {
    fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()> {
        write_len(self.len(), writer)?;
        writer.write_all(self.as_bytes())
    }

    fn serialized_size(&self) -> usize {
        LEN_PREFIX + self.len()
    }
}

impl Serializable for String {
    fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()> {
        self.as_str().serialize(writer)
    }

    fn serialized_size(&self) -> usize {
        self.as_str().serialized_size()
    }
}

impl<const N: usize> Serializable for [u8; N] {
    fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_all(&self[..])
    }
    fn serialized_size(&self) -> usize {
        N
    }
}

impl<T: Serializable> Serializable for Box<T> {
    fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()> {
        T::serialize(self, writer)
    }
    fn serialized_size(&self) -> usize {
        T::serialized_size(self)
    }
}

impl<T: Serializable> Serializable for Arc<T> {
    fn serialize(&self, writer: &mut impl Write) -> std::io::Result<()> {
        T::serialize(self, writer)
    }
    fn serialized_size(&self) -> usize {
        T::serialized_size(self)
    }
}
