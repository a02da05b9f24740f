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

//! Merkle roots over ordered lists of hashes.
//!
//! Leaves are padded with [`DigestService::zero_hash`] up to the next power of
//! two, and every internal node is [`DigestService::node_hash`] of its two
//! children. A tree with a single leaf has that leaf as its root.

use crate::hash::{DigestService, SecureHash};
use std::fmt::{self, Display, Formatter};

/// Failure to build a Merkle tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    /// No leaves were supplied.
    EmptyTree,
}

impl Display for MerkleError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            MerkleError::EmptyTree => write!(f, "cannot calculate a Merkle root without leaves"),
        }
    }
}

impl std::error::Error for MerkleError {}

/// Computes the Merkle root of `leaves`, in order.
pub fn merkle_root(leaves: &[SecureHash], digest: &DigestService) -> Result<SecureHash, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyTree);
    }
    let mut level = leaves.to_vec();
    level.resize(leaves.len().next_power_of_two(), digest.zero_hash());
    while level.len() > 1 {
        level = level
            .chunks_exact(2)
            .map(|pair| digest.node_hash(&pair[0], &pair[1]))
            .collect();
    }
    Ok(level[0])
}
