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


//! The commitment scheme behind transaction ids.
//!
//! Every component is blinded with a nonce derived from the transaction's
//! privacy salt and its `(group, position)` coordinates, then hashed. Each
//! group's component hashes form a Merkle tree, and the roots of all groups,
//! in index order with an all-ones sentinel for absent groups, form the tree
//! whose root is the transaction id.

use crate::components::ComponentGroup;
use crate::structure::PrivacySalt;
use base_crypto::hash::{DigestService, SecureHash};
use base_crypto::merkle::merkle_root;
use std::collections::BTreeMap;

/// The nonce for the component `bytes` at `position` in group `group_index`.
pub fn component_nonce(
    digest: &DigestService,
    salt: &PrivacySalt,
    group_index: u32,
    position: u32,
    bytes: &[u8],
) -> SecureHash {
    if digest.uses_combined_nonces() {
        digest.salted_component_nonce(bytes, salt.as_bytes(), group_index, position)
    } else {
        digest.compute_nonce(salt.as_bytes(), group_index, position)
    }
}

pub fn component_hash(digest: &DigestService, nonce: &SecureHash, bytes: &[u8]) -> SecureHash {
    digest.component_hash(nonce, bytes)
}

/// The Merkle root of `leaves`, or the all-ones sentinel if there are none.
pub fn root_or_sentinel(digest: &DigestService, leaves: &[SecureHash]) -> SecureHash {
    merkle_root(leaves, digest).unwrap_or_else(|_| digest.all_ones_hash())
}

/// Lays out group roots by index, filling gaps with the all-ones sentinel.
pub fn group_slots(digest: &DigestService, roots: &BTreeMap<u32, SecureHash>) -> Vec<SecureHash> {
    let Some(max) = roots.keys().next_back() else {
        return Vec::new();
    };
    (0..=*max)
        .map(|index| roots.get(&index).copied().unwrap_or_else(|| digest.all_ones_hash()))
        .collect()
}

pub fn transaction_id(digest: &DigestService, roots: &BTreeMap<u32, SecureHash>) -> SecureHash {
    root_or_sentinel(digest, &group_slots(digest, roots))
}

/// All commitments of a transaction's component groups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentCommitments {
    pub nonces: BTreeMap<u32, Vec<SecureHash>>,
    pub hashes: BTreeMap<u32, Vec<SecureHash>>,
    pub roots: BTreeMap<u32, SecureHash>,
    pub id: SecureHash,
}

impl ComponentCommitments {
    pub fn compute(groups: &[ComponentGroup], salt: &PrivacySalt, digest: &DigestService) -> Self {
        let mut nonces = BTreeMap::new();
        let mut hashes = BTreeMap::new();
        let mut roots = BTreeMap::new();
        for group in groups {
            let group_nonces = group
                .components
                .iter()
                .enumerate()
                .map(|(position, bytes)| {
                    component_nonce(digest, salt, group.group_index, position as u32, bytes)
                })
                .collect::<Vec<_>>();
            let group_hashes = group
                .components
                .iter()
                .zip(&group_nonces)
                .map(|(bytes, nonce)| component_hash(digest, nonce, bytes))
                .collect::<Vec<_>>();
            roots.insert(group.group_index, root_or_sentinel(digest, &group_hashes));
            nonces.insert(group.group_index, group_nonces);
            hashes.insert(group.group_index, group_hashes);
        }
        let id = transaction_id(digest, &roots);
        ComponentCommitments {
            nonces,
            hashes,
            roots,
            id,
        }
    }
}
