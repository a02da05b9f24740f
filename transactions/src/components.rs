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


//! Transactions are stored as numbered groups of individually serialized
//! components, so that any subset can later be revealed and checked against
//! the transaction id.

use crate::structure::{AttachmentId, Command, Party, StateRef, TimeWindow, TransactionState};
use base_crypto::hash::SecureHash;
use serialize::{Deserializable, Serializable, Tagged};

/// The meaning of each component group index. Indices are part of the
/// transaction format and must never change.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum ComponentGroupKind {
    Inputs = 0,
    Outputs = 1,
    /// Command data. The signers of each command live in [`Self::Signers`].
    Commands = 2,
    /// Attachments only used by nodes running legacy contract code.
    Attachments = 3,
    Notary = 4,
    TimeWindow = 5,
    Signers = 6,
    References = 7,
    Parameters = 8,
    AttachmentsV2 = 9,
}

impl ComponentGroupKind {
    pub const ALL: [ComponentGroupKind; 10] = [
        ComponentGroupKind::Inputs,
        ComponentGroupKind::Outputs,
        ComponentGroupKind::Commands,
        ComponentGroupKind::Attachments,
        ComponentGroupKind::Notary,
        ComponentGroupKind::TimeWindow,
        ComponentGroupKind::Signers,
        ComponentGroupKind::References,
        ComponentGroupKind::Parameters,
        ComponentGroupKind::AttachmentsV2,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serializable)]
#[tag = "component-group[v1]"]
pub struct ComponentGroup {
    pub group_index: u32,
    pub components: Vec<Vec<u8>>,
}

impl ComponentGroup {
    pub fn new(kind: ComponentGroupKind, components: Vec<Vec<u8>>) -> Self {
        ComponentGroup {
            group_index: kind.index(),
            components,
        }
    }

    /// `None` for groups introduced by later versions of the format.
    pub fn kind(&self) -> Option<ComponentGroupKind> {
        ComponentGroupKind::from_index(self.group_index)
    }

    /// Total bytes of the group's components.
    pub fn components_size(&self) -> usize {
        self.components.iter().map(Vec::len).sum()
    }
}

/// The typed contents of a transaction before serialization into groups.
#[derive(Clone, Debug, Default)]
pub struct TransactionComponents {
    pub inputs: Vec<StateRef>,
    pub outputs: Vec<TransactionState>,
    pub commands: Vec<Command>,
    pub attachments: Vec<AttachmentId>,
    pub legacy_attachments: Vec<AttachmentId>,
    pub notary: Option<Party>,
    pub time_window: Option<TimeWindow>,
    pub references: Vec<StateRef>,
    pub network_parameters_hash: Option<SecureHash>,
}

impl TransactionComponents {
    /// Serializes each component and groups them by kind, in index order.
    /// Empty groups are omitted.
    pub fn to_component_groups(&self) -> Vec<ComponentGroup> {
        fn encode<T: Serializable>(items: impl IntoIterator<Item = T>) -> Vec<Vec<u8>> {
            items.into_iter().map(|item| serialize::to_bytes(&item)).collect()
        }
        use ComponentGroupKind as K;
        let groups = [
            (K::Inputs, encode(&self.inputs)),
            (K::Outputs, encode(&self.outputs)),
            (K::Commands, encode(self.commands.iter().map(|c| &c.data))),
            (K::Attachments, encode(&self.legacy_attachments)),
            (K::Notary, encode(&self.notary)),
            (K::TimeWindow, encode(&self.time_window)),
            (K::Signers, encode(self.commands.iter().map(|c| &c.signers))),
            (K::References, encode(&self.references)),
            (K::Parameters, encode(&self.network_parameters_hash)),
            (K::AttachmentsV2, encode(&self.attachments)),
        ];
        groups
            .into_iter()
            .filter(|(_, components)| !components.is_empty())
            .map(|(kind, components)| ComponentGroup::new(kind, components))
            .collect()
    }
}
