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


//! Fully resolved transactions, ready for contract verification.

use crate::attachments::Attachment;
use crate::components::{ComponentGroup, ComponentGroupKind};
use crate::error::{SizeLimitExceeded, VerificationFailure};
use crate::parameters::NetworkParameters;
use crate::services::ContractVerifier;
use crate::structure::{Command, Party, PrivacySalt, StateAndRef, TimeWindow, TransactionState};
use base_crypto::hash::{DigestService, SecureHash};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Which contract code a transaction is resolved against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VerificationMode {
    /// The current attachments, for verification in this process.
    #[default]
    InProcess,
    /// The legacy attachments, for nodes running older contract code.
    Legacy,
}

impl VerificationMode {
    pub fn attachments_group(self) -> ComponentGroupKind {
        match self {
            VerificationMode::InProcess => ComponentGroupKind::AttachmentsV2,
            VerificationMode::Legacy => ComponentGroupKind::Attachments,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LedgerTransaction {
    pub id: SecureHash,
    pub inputs: Vec<StateAndRef>,
    pub outputs: Vec<TransactionState>,
    pub commands: Vec<Command>,
    pub attachments: Vec<Arc<Attachment>>,
    pub notary: Option<Party>,
    pub time_window: Option<TimeWindow>,
    pub privacy_salt: PrivacySalt,
    pub network_parameters: Arc<NetworkParameters>,
    pub references: Vec<StateAndRef>,
    pub digest: DigestService,
    pub mode: VerificationMode,
}

impl LedgerTransaction {
    pub fn verify(&self, verifier: &dyn ContractVerifier) -> Result<(), VerificationFailure> {
        debug!(tx_id = %self.id, mode = ?self.mode, "verifying ledger transaction");
        verifier.verify(self)
    }

    /// The attachment providing `contract`, if the transaction has one.
    pub fn contract_attachment(&self, contract: &str) -> Option<&Arc<Attachment>> {
        self.attachments.iter().find(|att| att.contracts.contains(contract))
    }

    pub fn input_states(&self) -> impl Iterator<Item = &TransactionState> {
        self.inputs.iter().map(|input| &input.state)
    }

    pub fn reference_states(&self) -> impl Iterator<Item = &TransactionState> {
        self.references.iter().map(|reference| &reference.state)
    }
}

fn group_size(groups: &[ComponentGroup], kind: ComponentGroupKind) -> usize {
    groups
        .iter()
        .find(|group| group.group_index == kind.index())
        .map_or(0, |group| group.components_size() + 4)
}

/// The sizes charged against the transaction size limit, in charging order:
/// distinct attachments, resolved inputs, resolved references, then the
/// command and output groups.
fn charged_sizes<'a>(
    groups: &'a [ComponentGroup],
    attachments: &'a [Arc<Attachment>],
    inputs: &'a [StateAndRef],
    references: &'a [StateAndRef],
) -> impl Iterator<Item = usize> + 'a {
    let mut seen = BTreeSet::new();
    let attachments = attachments
        .iter()
        .filter(move |att| seen.insert(att.id))
        .map(|att| att.size as usize);
    let states = inputs
        .iter()
        .chain(references)
        .map(|state| serialize::Serializable::serialized_size(&state.state));
    let trailing = [ComponentGroupKind::Commands, ComponentGroupKind::Outputs]
        .into_iter()
        .map(move |kind| group_size(groups, kind));
    attachments.chain(states).chain(trailing)
}

/// The total size a transaction is charged against the size limit.
pub fn transaction_size(
    groups: &[ComponentGroup],
    attachments: &[Arc<Attachment>],
    inputs: &[StateAndRef],
    references: &[StateAndRef],
) -> usize {
    charged_sizes(groups, attachments, inputs, references).sum()
}

/// Fails as soon as the running total exceeds `max_transaction_size`. A
/// transaction of exactly the maximum size passes.
pub fn check_transaction_size(
    tx_id: SecureHash,
    max_transaction_size: u32,
    groups: &[ComponentGroup],
    attachments: &[Arc<Attachment>],
    inputs: &[StateAndRef],
    references: &[StateAndRef],
) -> Result<(), SizeLimitExceeded> {
    let mut remaining = max_transaction_size as usize;
    for size in charged_sizes(groups, attachments, inputs, references) {
        remaining = remaining.checked_sub(size).ok_or(SizeLimitExceeded {
            tx_id,
            max_transaction_size,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::Uploader;

    fn attachment(name: &[u8], size: u32) -> Arc<Attachment> {
        Arc::new(Attachment::new(SecureHash::sha256(name), size, Uploader::App))
    }

    #[test]
    fn duplicate_attachments_are_charged_once() {
        let groups = vec![ComponentGroup::new(ComponentGroupKind::Commands, vec![vec![0u8; 6]])];
        let a = attachment(b"a", 100);
        let attachments = vec![a.clone(), a, attachment(b"b", 50)];
        assert_eq!(transaction_size(&groups, &attachments, &[], &[]), 100 + 50 + 6 + 4);
        let id = SecureHash::sha256(b"tx");
        assert!(check_transaction_size(id, 160, &groups, &attachments, &[], &[]).is_ok());
        assert_eq!(
            check_transaction_size(id, 159, &groups, &attachments, &[], &[]),
            Err(SizeLimitExceeded {
                tx_id: id,
                max_transaction_size: 159
            })
        );
    }
}
