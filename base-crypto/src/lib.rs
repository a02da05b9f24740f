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
#![warn(missing_docs)]

//! This crate collects the cryptographic primitives of the Kestrel transaction
//! core: hashing and the component-commitment digest rules, the Merkle root
//! used for transaction identifiers, Schnorr signatures, and time.

pub mod hash;
pub mod merkle;
pub mod signatures;
pub mod time;
