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

#![deny(unreachable_pub)]

//! Deterministic binary serialization.
//!
//! Every encoding produced here is canonical: the same value always yields the
//! same bytes, which is what makes hashing serialized transaction components
//! meaningful across independently operated nodes.

mod deserializable;
mod serializable;
mod tagged;
mod util;

pub use crate::deserializable::{Deserializable, RECURSION_LIMIT, tagged_deserialize};
pub use crate::serializable::{GLOBAL_TAG, Serializable, tagged_serialize, tagged_serialized_size};
pub use crate::tagged::Tagged;
pub use crate::util::{ReadExt, VecExt, from_bytes, to_bytes};
pub use macros::Serializable;
