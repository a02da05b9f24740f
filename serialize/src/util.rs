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

use crate::{Deserializable, Serializable, Tagged};
use std::io::Read;

pub trait VecExt {
    fn with_bounded_capacity(n: usize) -> Self;
}

impl<T> VecExt for Vec<T> {
    fn with_bounded_capacity(n: usize) -> Self {
        const MEMORY_LIMIT: usize = 1 << 25; // 32 MiB
        let alloc_limit = MEMORY_LIMIT / std::mem::size_of::<T>().max(1);
        Self::with_capacity(usize::min(alloc_limit, n))
    }
}

pub trait ReadExt: Read {
    /// Reads exactly `n` bytes, growing the buffer in chunks so that a forged
    /// length prefix cannot force a huge up-front allocation.
    fn read_exact_to_vec(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
        const CHUNK_SIZE: usize = 4096;
        let mut res = Vec::with_capacity(usize::min(n, CHUNK_SIZE));
        let mut len = 0;
        while n > len {
            let new_len = usize::min(n, len + CHUNK_SIZE);
            res.resize(new_len, 0);
            self.read_exact(&mut res[len..])?;
            len = new_len;
        }
        Ok(res)
    }
}

impl<R: Read> ReadExt for R {}

/// Serializes a value into a fresh buffer.
pub fn to_bytes<T: Serializable + ?Sized>(value: &T) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(value.serialized_size());
    // Only fails for collections longer than u32::MAX.
    value
        .serialize(&mut bytes)
        .expect("in-memory serialization should not fail");
    bytes
}

/// Deserializes a value that must span the whole of `bytes`.
pub fn from_bytes<T: Deserializable>(mut bytes: &[u8]) -> std::io::Result<T> {
    let value = T::deserialize(&mut bytes, 0)?;
    if !bytes.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} trailing bytes after value", bytes.len()),
        ));
    }
    Ok(value)
}

impl Serializable for () {
    fn serialize(&self, _writer: &mut impl std::io::Write) -> std::io::Result<()> {
        Ok(())
    }
    fn serialized_size(&self) -> usize {
        0
    }
}

impl Deserializable for () {
    fn deserialize(_reader: &mut impl Read, _recursion_depth: u32) -> std::io::Result<Self> {
        Ok(())
    }
}

impl Tagged for () {
    fn tag() -> std::borrow::Cow<'static, str> {
        std::borrow::Cow::Borrowed("()")
    }
    fn tag_unique_factor() -> String {
        "()".into()
    }
}

impl Serializable for bool {
    fn serialize(&self, writer: &mut impl std::io::Write) -> std::io::Result<()> {
        writer.write_all(&[*self as u8])
    }
    fn serialized_size(&self) -> usize {
        1
    }
}

impl Deserializable for bool {
    fn deserialize(reader: &mut impl Read, _recursion_depth: u32) -> std::io::Result<Self> {
        let mut buf = [0u8];
        reader.read_exact(&mut buf[..])?;
        match buf[0] {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("cannot deserialize {v} as bool"),
            )),
        }
    }
}

impl Tagged for bool {
    fn tag() -> std::borrow::Cow<'static, str> {
        std::borrow::Cow::Borrowed("bool")
    }
    fn tag_unique_factor() -> String {
        "bool".into()
    }
}

macro_rules! via_le_bytes {
    ($($ty:ty),*) => {
        $(
            impl Serializable for $ty {
                fn serialize(&self, writer: &mut impl std::io::Write) -> std::io::Result<()> {
                    writer.write_all(&self.to_le_bytes()[..])
                }
                fn serialized_size(&self) -> usize {
                    std::mem::size_of::<$ty>()
                }
            }

            impl Deserializable for $ty {
                fn deserialize(reader: &mut impl Read, _recursion_depth: u32) -> std::io::Result<Self> {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    reader.read_exact(&mut buf[..])?;
                    Ok(<$ty>::from_le_bytes(buf))
                }
            }

            impl Tagged for $ty {
                fn tag() -> std::borrow::Cow<'static, str> {
                    std::borrow::Cow::Borrowed(stringify!($ty))
                }
                fn tag_unique_factor() -> String {
                    stringify!($ty).into()
                }
            }
        )*
    };
}

via_le_bytes!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

macro_rules! tuple_serializable {
    ($(($ty:ident, $idx:tt)),+) => {
        impl<$($ty: Serializable),+> Serializable for ($($ty,)+) {
            fn serialize(&self, writer: &mut impl std::io::Write) -> std::io::Result<()> {
                $(self.$idx.serialize(writer)?;)+
                Ok(())
            }

            fn serialized_size(&self) -> usize {
                0 $(+ self.$idx.serialized_size())+
            }
        }

        impl<$($ty: Deserializable),+> Deserializable for ($($ty,)+) {
            fn deserialize(reader: &mut impl Read, mut recursion_depth: u32) -> std::io::Result<Self> {
                <Self as Deserializable>::check_rec(&mut recursion_depth)?;
                Ok(($($ty::deserialize(reader, recursion_depth)?,)+))
            }
        }

        impl<$($ty: Tagged),+> Tagged for ($($ty,)+) {
            fn tag() -> std::borrow::Cow<'static, str> {
                let parts: Vec<String> = vec![$($ty::tag().into_owned()),+];
                std::borrow::Cow::Owned(format!("({})", parts.join(",")))
            }
            fn tag_unique_factor() -> String {
                let parts: Vec<String> = vec![$($ty::tag_unique_factor()),+];
                format!("({})", parts.join(","))
            }
        }
    };
}

tuple_serializable!((A, 0));
tuple_serializable!((A, 0), (B, 1));
tuple_serializable!((A, 0), (B, 1), (C, 2));
tuple_serializable!((A, 0), (B, 1), (C, 2), (D, 3));
tuple_serializable!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
tuple_serializable!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));
