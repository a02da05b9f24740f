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

//! This crate implements the Kestrel transaction core: the component
//! commitment scheme and transaction identifiers, wire and filtered
//! transactions, contract-upgrade transactions, and the transaction builder
//! that selects contract attachments and resolves output constraints.

#[macro_use]
extern crate tracing;

pub mod attachments;
pub mod builder;
pub mod commitment;
pub mod components;
pub mod constraints;
pub mod error;
pub mod filtered;
pub mod ledger;
pub mod parameters;
pub mod services;
pub mod signed;
pub mod structure;
#[path = "tracing.rs"]
mod transactions_tracing;
pub mod upgrade;
pub mod wire;

pub use transactions_tracing::{LogLevel, init_logger};

#[cfg(feature = "test-utilities")]
pub mod test_utilities;
