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


//! Filtered transactions reveal a chosen subset of a transaction's
//! components, with enough commitments for the rest that the recipient can
//! still re-derive the transaction id.

use crate::commitment::{component_hash, root_or_sentinel, transaction_id};
use crate::components::ComponentGroupKind;
use crate::error::{FilteredTransactionError, MalformedTransaction};
use crate::structure::{
    AttachmentId, Command, CommandData, Party, StateRef, TimeWindow, TransactionState,
};
use crate::wire::WireTransaction;
use base_crypto::hash::{DigestService, SecureHash};
use base_crypto::signatures::VerifyingKey;
use serialize::{Deserializable, Serializable, Tagged};
use std::collections::BTreeMap;

/// A decoded component offered to a filter predicate.
#[derive(Clone, Copy, Debug)]
pub enum ComponentView<'a> {
    Input(&'a StateRef),
    Output(&'a TransactionState),
    Command(&'a Command),
    LegacyAttachment(&'a AttachmentId),
    Notary(&'a Party),
    TimeWindow(&'a TimeWindow),
    Reference(&'a StateRef),
    NetworkParametersHash(&'a SecureHash),
    Attachment(&'a AttachmentId),
    /// A component of a group this version does not know how to decode.
    Unknown { group_index: u32, bytes: &'a [u8] },
}

#[derive(Clone, Debug, PartialEq, Eq, Serializable)]
#[tag = "filtered-component[v1]"]
pub struct FilteredComponent {
    pub bytes: Vec<u8>,
    pub nonce: SecureHash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serializable)]
#[tag = "filtered-slot[v1]"]
pub enum FilteredSlot {
    Visible(FilteredComponent),
    /// The component hash of a component that is not revealed.
    Hidden(SecureHash),
}

impl FilteredSlot {
    pub fn component_hash(&self, digest: &DigestService) -> SecureHash {
        match self {
            FilteredSlot::Visible(component) => component_hash(digest, &component.nonce, &component.bytes),
            FilteredSlot::Hidden(hash) => *hash,
        }
    }

    pub fn visible(&self) -> Option<&FilteredComponent> {
        match self {
            FilteredSlot::Visible(component) => Some(component),
            FilteredSlot::Hidden(_) => None,
        }
    }
}

/// A group with at least one revealed component.
#[derive(Clone, Debug, PartialEq, Eq, Serializable)]
#[tag = "filtered-group[v1]"]
pub struct FilteredGroup {
    pub group_index: u32,
    pub slots: Vec<FilteredSlot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serializable)]
#[tag = "filtered-transaction[v1]"]
pub struct FilteredTransaction {
    id: SecureHash,
    groups: Vec<FilteredGroup>,
    /// Roots of groups with no revealed components.
    hidden_group_roots: BTreeMap<u32, SecureHash>,
    digest: DigestService,
}

impl FilteredTransaction {
    /// Reveals the components of `wtx` accepted by `filter`. Revealing any
    /// command also reveals the signers of every command.
    pub fn build(
        wtx: &WireTransaction,
        filter: impl Fn(&ComponentView<'_>) -> bool,
    ) -> Result<Self, MalformedTransaction> {
        fn select<T>(items: &[T], view: impl Fn(&T) -> bool) -> Vec<bool> {
            items.iter().map(view).collect()
        }
        use ComponentGroupKind as K;
        let mut revealed = BTreeMap::new();
        for group in wtx.component_groups() {
            let selection = match group.kind() {
                Some(K::Inputs) => select(wtx.inputs()?, |x| filter(&ComponentView::Input(x))),
                Some(K::Outputs) => select(wtx.outputs()?, |x| filter(&ComponentView::Output(x))),
                Some(K::Commands) => select(wtx.commands()?, |x| filter(&ComponentView::Command(x))),
                Some(K::Attachments) => select(wtx.legacy_attachments()?, |x| {
                    filter(&ComponentView::LegacyAttachment(x))
                }),
                Some(K::Notary) => wtx
                    .notary()?
                    .into_iter()
                    .map(|x| filter(&ComponentView::Notary(x)))
                    .collect(),
                Some(K::TimeWindow) => wtx
                    .time_window()?
                    .into_iter()
                    .map(|x| filter(&ComponentView::TimeWindow(x)))
                    .collect(),
                // Decided once the commands are known.
                Some(K::Signers) => continue,
                Some(K::References) => {
                    select(wtx.references()?, |x| filter(&ComponentView::Reference(x)))
                }
                Some(K::Parameters) => wtx
                    .network_parameters_hash()?
                    .into_iter()
                    .map(|x| filter(&ComponentView::NetworkParametersHash(x)))
                    .collect(),
                Some(K::AttachmentsV2) => {
                    select(wtx.attachments()?, |x| filter(&ComponentView::Attachment(x)))
                }
                None => select(&group.components, |bytes| {
                    filter(&ComponentView::Unknown {
                        group_index: group.group_index,
                        bytes,
                    })
                }),
            };
            revealed.insert(group.group_index, selection);
        }
        let any_command = revealed
            .get(&K::Commands.index())
            .is_some_and(|selection| selection.iter().any(|r| *r));
        if let Some(signers) = wtx.group(K::Signers) {
            revealed.insert(K::Signers.index(), vec![any_command; signers.components.len()]);
        }

        let commitments = wtx.commitments();
        let mut groups = Vec::new();
        let mut hidden_group_roots = BTreeMap::new();
        for group in wtx.component_groups() {
            let index = group.group_index;
            let selection = revealed.get(&index).map(Vec::as_slice).unwrap_or(&[]);
            if !selection.iter().any(|r| *r) {
                hidden_group_roots.insert(index, commitments.roots[&index]);
                continue;
            }
            let slots = group
                .components
                .iter()
                .zip(&commitments.nonces[&index])
                .zip(&commitments.hashes[&index])
                .zip(selection)
                .map(|(((bytes, nonce), hash), visible)| {
                    if *visible {
                        FilteredSlot::Visible(FilteredComponent {
                            bytes: bytes.clone(),
                            nonce: *nonce,
                        })
                    } else {
                        FilteredSlot::Hidden(*hash)
                    }
                })
                .collect();
            groups.push(FilteredGroup {
                group_index: index,
                slots,
            });
        }
        Ok(FilteredTransaction {
            id: wtx.id(),
            groups,
            hidden_group_roots,
            digest: *wtx.digest(),
        })
    }

    /// The id this filtered transaction claims to be a view of.
    pub fn id(&self) -> SecureHash {
        self.id
    }

    pub fn groups(&self) -> &[FilteredGroup] {
        &self.groups
    }

    pub fn hidden_group_roots(&self) -> &BTreeMap<u32, SecureHash> {
        &self.hidden_group_roots
    }

    /// Re-derives the transaction id from revealed components and hidden
    /// commitments.
    pub fn compute_id(&self) -> Result<SecureHash, FilteredTransactionError> {
        let mut roots = BTreeMap::new();
        for group in &self.groups {
            let index = group.group_index;
            if self.hidden_group_roots.contains_key(&index) {
                return Err(FilteredTransactionError::GroupRevealedAndHidden { group_index: index });
            }
            let hashes = group
                .slots
                .iter()
                .map(|slot| slot.component_hash(&self.digest))
                .collect::<Vec<_>>();
            if roots.insert(index, root_or_sentinel(&self.digest, &hashes)).is_some() {
                return Err(FilteredTransactionError::DuplicateGroup { group_index: index });
            }
        }
        roots.extend(self.hidden_group_roots.iter().map(|(k, v)| (*k, *v)));
        Ok(transaction_id(&self.digest, &roots))
    }

    /// Checks the revealed components commit to the claimed id.
    pub fn verify(&self) -> Result<(), FilteredTransactionError> {
        let computed = self.compute_id()?;
        if computed != self.id {
            return Err(FilteredTransactionError::IdMismatch {
                claimed: self.id,
                computed,
            });
        }
        Ok(())
    }

    fn group(&self, kind: ComponentGroupKind) -> Option<&FilteredGroup> {
        self.groups.iter().find(|group| group.group_index == kind.index())
    }

    /// Decodes the visible components of a group, with their positions.
    fn visible<T: Deserializable>(
        &self,
        kind: ComponentGroupKind,
    ) -> Result<Vec<(u32, T)>, MalformedTransaction> {
        let Some(group) = self.group(kind) else {
            return Ok(Vec::new());
        };
        group
            .slots
            .iter()
            .enumerate()
            .filter_map(|(position, slot)| slot.visible().map(|c| (position as u32, c)))
            .map(|(position, component)| {
                serialize::from_bytes(&component.bytes)
                    .map(|value| (position, value))
                    .map_err(|source| MalformedTransaction::Deserialization {
                        group_index: group.group_index,
                        position,
                        source,
                    })
            })
            .collect()
    }

    fn visible_values<T: Deserializable>(
        &self,
        kind: ComponentGroupKind,
    ) -> Result<Vec<T>, MalformedTransaction> {
        Ok(self.visible(kind)?.into_iter().map(|(_, value)| value).collect())
    }

    pub fn inputs(&self) -> Result<Vec<StateRef>, MalformedTransaction> {
        self.visible_values(ComponentGroupKind::Inputs)
    }

    pub fn outputs(&self) -> Result<Vec<TransactionState>, MalformedTransaction> {
        self.visible_values(ComponentGroupKind::Outputs)
    }

    /// Visible commands, with signers where the signers group is visible.
    pub fn commands(&self) -> Result<Vec<Command>, MalformedTransaction> {
        let signers = self
            .visible::<Vec<VerifyingKey>>(ComponentGroupKind::Signers)?
            .into_iter()
            .collect::<BTreeMap<_, _>>();
        Ok(self
            .visible::<CommandData>(ComponentGroupKind::Commands)?
            .into_iter()
            .map(|(position, data)| {
                Command::new(data, signers.get(&position).cloned().unwrap_or_default())
            })
            .collect())
    }

    pub fn attachments(&self) -> Result<Vec<AttachmentId>, MalformedTransaction> {
        self.visible_values(ComponentGroupKind::AttachmentsV2)
    }

    pub fn legacy_attachments(&self) -> Result<Vec<AttachmentId>, MalformedTransaction> {
        self.visible_values(ComponentGroupKind::Attachments)
    }

    pub fn notary(&self) -> Result<Option<Party>, MalformedTransaction> {
        Ok(self.visible_values(ComponentGroupKind::Notary)?.pop())
    }

    pub fn time_window(&self) -> Result<Option<TimeWindow>, MalformedTransaction> {
        Ok(self.visible_values(ComponentGroupKind::TimeWindow)?.pop())
    }

    pub fn references(&self) -> Result<Vec<StateRef>, MalformedTransaction> {
        self.visible_values(ComponentGroupKind::References)
    }

    pub fn network_parameters_hash(&self) -> Result<Option<SecureHash>, MalformedTransaction> {
        Ok(self.visible_values(ComponentGroupKind::Parameters)?.pop())
    }

    /// Fails unless every component of `kind` in the original transaction
    /// is revealed.
    pub fn check_all_components_visible(
        &self,
        kind: ComponentGroupKind,
    ) -> Result<(), FilteredTransactionError> {
        let group_index = kind.index();
        let all_visible = match self.group(kind) {
            Some(group) => group.slots.iter().all(|slot| slot.visible().is_some()),
            None => !self.hidden_group_roots.contains_key(&group_index),
        };
        if !all_visible {
            return Err(FilteredTransactionError::ComponentsNotVisible { group_index });
        }
        Ok(())
    }

    /// Fails unless every command `key` must sign is revealed, so a signer
    /// knows what they are signing for.
    pub fn check_command_visibility(&self, key: &VerifyingKey) -> Result<(), FilteredTransactionError> {
        self.check_all_components_visible(ComponentGroupKind::Signers)?;
        let commands = self.group(ComponentGroupKind::Commands);
        for (position, signers) in self.visible::<Vec<VerifyingKey>>(ComponentGroupKind::Signers)? {
            if !signers.contains(key) {
                continue;
            }
            let visible = commands
                .and_then(|group| group.slots.get(position as usize))
                .is_some_and(|slot| slot.visible().is_some());
            if !visible {
                return Err(FilteredTransactionError::CommandNotVisible(key.clone()));
            }
        }
        Ok(())
    }
}
