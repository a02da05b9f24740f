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


use crate::commitment::ComponentCommitments;
use crate::components::{ComponentGroup, ComponentGroupKind, TransactionComponents};
use crate::error::{LedgerTransactionError, MalformedTransaction, ResolutionError, SignatureError};
use crate::filtered::{ComponentView, FilteredTransaction};
use crate::ledger::{LedgerTransaction, VerificationMode, check_transaction_size};
use crate::services::ServiceHub;
use crate::signed::TransactionSignature;
use crate::structure::{
    AttachmentId, Command, CommandData, Party, PrivacySalt, StateRef, TimeWindow, TransactionState,
};
use base_crypto::hash::{DigestService, SecureHash};
use base_crypto::signatures::VerifyingKey;
use itertools::Itertools;
use serialize::{Deserializable, Serializable, Tagged};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Write};
use std::sync::OnceLock;

/// Checks shared by every transaction that consumes states.
pub(crate) fn check_base_invariants(
    inputs: &[StateRef],
    references: &[StateRef],
    notary: Option<&Party>,
) -> Result<(), MalformedTransaction> {
    if notary.is_none() && !(inputs.is_empty() && references.is_empty()) {
        return Err(MalformedTransaction::MissingNotary);
    }
    if let Some(duplicate) = inputs.iter().duplicates().next() {
        return Err(MalformedTransaction::DuplicateInput(*duplicate));
    }
    if let Some(duplicate) = references.iter().duplicates().next() {
        return Err(MalformedTransaction::DuplicateReference(*duplicate));
    }
    let inputs = inputs.iter().collect::<BTreeSet<_>>();
    if let Some(overlap) = references.iter().find(|r| inputs.contains(r)) {
        return Err(MalformedTransaction::InputsAndReferencesOverlap(*overlap));
    }
    Ok(())
}

fn cached<T>(
    cell: &OnceLock<T>,
    init: impl FnOnce() -> Result<T, MalformedTransaction>,
) -> Result<&T, MalformedTransaction> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    // A concurrent initialisation may win; both decoded the same bytes.
    Ok(cell.get_or_init(|| value))
}

/// A transaction as transmitted and signed: serialized component groups and
/// the salt that blinds them.
///
/// Typed views of the groups are decoded on first access and cached, as are
/// the component commitments and the id.
#[derive(Clone, Debug)]
pub struct WireTransaction {
    component_groups: Vec<ComponentGroup>,
    privacy_salt: PrivacySalt,
    digest: DigestService,
    commitments: OnceLock<ComponentCommitments>,
    inputs: OnceLock<Vec<StateRef>>,
    outputs: OnceLock<Vec<TransactionState>>,
    commands: OnceLock<Vec<Command>>,
    attachments: OnceLock<Vec<AttachmentId>>,
    legacy_attachments: OnceLock<Vec<AttachmentId>>,
    notary: OnceLock<Option<Party>>,
    time_window: OnceLock<Option<TimeWindow>>,
    references: OnceLock<Vec<StateRef>>,
    network_parameters_hash: OnceLock<Option<SecureHash>>,
}

impl PartialEq for WireTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.component_groups == other.component_groups
            && self.privacy_salt == other.privacy_salt
            && self.digest == other.digest
    }
}

impl Eq for WireTransaction {}

impl Hash for WireTransaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl WireTransaction {
    pub fn new(
        component_groups: Vec<ComponentGroup>,
        privacy_salt: PrivacySalt,
        digest: DigestService,
    ) -> Result<Self, MalformedTransaction> {
        let wtx = WireTransaction {
            component_groups,
            privacy_salt,
            digest,
            commitments: OnceLock::new(),
            inputs: OnceLock::new(),
            outputs: OnceLock::new(),
            commands: OnceLock::new(),
            attachments: OnceLock::new(),
            legacy_attachments: OnceLock::new(),
            notary: OnceLock::new(),
            time_window: OnceLock::new(),
            references: OnceLock::new(),
            network_parameters_hash: OnceLock::new(),
        };
        wtx.check_well_formed()?;
        Ok(wtx)
    }

    pub fn from_components(
        components: &TransactionComponents,
        privacy_salt: PrivacySalt,
        digest: DigestService,
    ) -> Result<Self, MalformedTransaction> {
        Self::new(components.to_component_groups(), privacy_salt, digest)
    }

    fn check_well_formed(&self) -> Result<(), MalformedTransaction> {
        let mut seen = BTreeSet::new();
        for group in &self.component_groups {
            if group.components.is_empty() {
                return Err(MalformedTransaction::EmptyComponentGroup {
                    group_index: group.group_index,
                });
            }
            if !seen.insert(group.group_index) {
                return Err(MalformedTransaction::DuplicateComponentGroup {
                    group_index: group.group_index,
                });
            }
        }
        check_base_invariants(self.inputs()?, self.references()?, self.notary()?)?;
        if self.inputs()?.is_empty() && self.outputs()?.is_empty() {
            return Err(MalformedTransaction::NoInputsOrOutputs);
        }
        if self.commands()?.is_empty() {
            return Err(MalformedTransaction::NoCommands);
        }
        if self.time_window()?.is_some() && self.notary()?.is_none() {
            return Err(MalformedTransaction::TimeWindowWithoutNotary);
        }
        Ok(())
    }

    pub fn component_groups(&self) -> &[ComponentGroup] {
        &self.component_groups
    }

    pub fn group(&self, kind: ComponentGroupKind) -> Option<&ComponentGroup> {
        self.component_groups
            .iter()
            .find(|group| group.group_index == kind.index())
    }

    pub fn privacy_salt(&self) -> &PrivacySalt {
        &self.privacy_salt
    }

    pub fn digest(&self) -> &DigestService {
        &self.digest
    }

    pub fn commitments(&self) -> &ComponentCommitments {
        self.commitments.get_or_init(|| {
            ComponentCommitments::compute(&self.component_groups, &self.privacy_salt, &self.digest)
        })
    }

    /// The Merkle root over all group roots.
    pub fn id(&self) -> SecureHash {
        self.commitments().id
    }

    fn decode_group<T: Deserializable>(
        &self,
        kind: ComponentGroupKind,
    ) -> Result<Vec<T>, MalformedTransaction> {
        let Some(group) = self.group(kind) else {
            return Ok(Vec::new());
        };
        group
            .components
            .iter()
            .enumerate()
            .map(|(position, bytes)| {
                serialize::from_bytes(bytes).map_err(|source| MalformedTransaction::Deserialization {
                    group_index: group.group_index,
                    position: position as u32,
                    source,
                })
            })
            .collect()
    }

    fn decode_single<T: Deserializable>(
        &self,
        kind: ComponentGroupKind,
    ) -> Result<Option<T>, MalformedTransaction> {
        let mut values = self.decode_group(kind)?;
        match values.len() {
            0 | 1 => Ok(values.pop()),
            count => Err(MalformedTransaction::MultipleComponents {
                group_index: kind.index(),
                count,
            }),
        }
    }

    pub fn inputs(&self) -> Result<&[StateRef], MalformedTransaction> {
        cached(&self.inputs, || self.decode_group(ComponentGroupKind::Inputs)).map(Vec::as_slice)
    }

    pub fn outputs(&self) -> Result<&[TransactionState], MalformedTransaction> {
        cached(&self.outputs, || self.decode_group(ComponentGroupKind::Outputs)).map(Vec::as_slice)
    }

    /// Commands, each paired with its signers from the signers group.
    pub fn commands(&self) -> Result<&[Command], MalformedTransaction> {
        cached(&self.commands, || {
            let data: Vec<CommandData> = self.decode_group(ComponentGroupKind::Commands)?;
            let signers: Vec<Vec<VerifyingKey>> = self.decode_group(ComponentGroupKind::Signers)?;
            if data.len() != signers.len() {
                return Err(MalformedTransaction::CommandSignerMismatch {
                    commands: data.len(),
                    signers: signers.len(),
                });
            }
            Ok(data
                .into_iter()
                .zip(signers)
                .map(|(data, signers)| Command::new(data, signers))
                .collect())
        })
        .map(Vec::as_slice)
    }

    /// Attachments used when verifying with current contract code.
    pub fn attachments(&self) -> Result<&[AttachmentId], MalformedTransaction> {
        cached(&self.attachments, || {
            self.decode_group(ComponentGroupKind::AttachmentsV2)
        })
        .map(Vec::as_slice)
    }

    pub fn legacy_attachments(&self) -> Result<&[AttachmentId], MalformedTransaction> {
        cached(&self.legacy_attachments, || {
            self.decode_group(ComponentGroupKind::Attachments)
        })
        .map(Vec::as_slice)
    }

    pub fn notary(&self) -> Result<Option<&Party>, MalformedTransaction> {
        cached(&self.notary, || self.decode_single(ComponentGroupKind::Notary)).map(Option::as_ref)
    }

    pub fn time_window(&self) -> Result<Option<&TimeWindow>, MalformedTransaction> {
        cached(&self.time_window, || {
            self.decode_single(ComponentGroupKind::TimeWindow)
        })
        .map(Option::as_ref)
    }

    pub fn references(&self) -> Result<&[StateRef], MalformedTransaction> {
        cached(&self.references, || {
            self.decode_group(ComponentGroupKind::References)
        })
        .map(Vec::as_slice)
    }

    pub fn network_parameters_hash(&self) -> Result<Option<&SecureHash>, MalformedTransaction> {
        cached(&self.network_parameters_hash, || {
            self.decode_single(ComponentGroupKind::Parameters)
        })
        .map(Option::as_ref)
    }

    /// Every key whose signature the transaction needs: all command signers,
    /// plus the notary's if it has to attest to inputs, references or a time
    /// window.
    pub fn required_signing_keys(&self) -> Result<BTreeSet<VerifyingKey>, MalformedTransaction> {
        let mut keys = self
            .commands()?
            .iter()
            .flat_map(|command| command.signers.iter().cloned())
            .collect::<BTreeSet<_>>();
        if let Some(notary) = self.notary()? {
            let notarised = !self.inputs()?.is_empty()
                || !self.references()?.is_empty()
                || self.time_window()?.is_some();
            if notarised {
                keys.insert(notary.owning_key.clone());
            }
        }
        Ok(keys)
    }

    /// Checks a signature was made by one of the command signers over this
    /// transaction's id.
    pub fn check_signature(&self, signature: &TransactionSignature) -> Result<(), SignatureError> {
        let required = self
            .commands()?
            .iter()
            .any(|command| command.signers.contains(&signature.by));
        if !required {
            return Err(SignatureError::SignerNotRequired(signature.by.clone()));
        }
        signature.verify(&self.id())
    }

    pub fn build_filtered_transaction(
        &self,
        filter: impl Fn(&ComponentView<'_>) -> bool,
    ) -> Result<FilteredTransaction, MalformedTransaction> {
        FilteredTransaction::build(self, filter)
    }

    /// Resolves inputs, references, attachments and network parameters
    /// through `services`, then applies the transaction size limit.
    pub fn to_ledger_transaction(
        &self,
        services: &dyn ServiceHub,
        mode: VerificationMode,
    ) -> Result<LedgerTransaction, LedgerTransactionError> {
        let id = self.id();
        let states = services.states();
        let inputs = self
            .inputs()?
            .iter()
            .map(|state_ref| states.load_state_and_ref(state_ref))
            .collect::<Result<Vec<_>, _>>()?;
        let references = self
            .references()?
            .iter()
            .map(|state_ref| states.load_state_and_ref(state_ref))
            .collect::<Result<Vec<_>, _>>()?;
        let attachment_ids = match mode {
            VerificationMode::InProcess => self.attachments()?,
            VerificationMode::Legacy => self.legacy_attachments()?,
        };
        let attachments = attachment_ids
            .iter()
            .map(|id| {
                services
                    .attachments()
                    .open_attachment(id)
                    .ok_or(ResolutionError::AttachmentNotFound(*id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let parameters_service = services.network_parameters();
        let network_parameters = match self.network_parameters_hash()? {
            Some(hash) => parameters_service.lookup(hash).ok_or(ResolutionError::UnknownParameters {
                tx_id: id,
                hash: Some(*hash),
            })?,
            None => parameters_service
                .current_parameters()
                .ok_or(ResolutionError::UnknownParameters {
                    tx_id: id,
                    hash: None,
                })?,
        };
        check_transaction_size(
            id,
            network_parameters.max_transaction_size,
            &self.component_groups,
            &attachments,
            &inputs,
            &references,
        )?;
        Ok(LedgerTransaction {
            id,
            inputs,
            outputs: self.outputs()?.to_vec(),
            commands: self.commands()?.to_vec(),
            attachments,
            notary: self.notary()?.cloned(),
            time_window: self.time_window()?.copied(),
            privacy_salt: self.privacy_salt,
            network_parameters,
            references,
            digest: self.digest,
            mode,
        })
    }
}

impl Tagged for WireTransaction {
    fn tag() -> Cow<'static, str> {
        Cow::Borrowed("wire-transaction[v1]")
    }
    fn tag_unique_factor() -> String {
        format!(
            "({},{},{})",
            <Vec<ComponentGroup>>::tag(),
            PrivacySalt::tag(),
            DigestService::tag()
        )
    }
}

impl Serializable for WireTransaction {
    fn serialize(&self, writer: &mut impl Write) -> io::Result<()> {
        self.component_groups.serialize(writer)?;
        self.privacy_salt.serialize(writer)?;
        self.digest.serialize(writer)
    }
    fn serialized_size(&self) -> usize {
        self.component_groups.serialized_size()
            + self.privacy_salt.serialized_size()
            + self.digest.serialized_size()
    }
}

impl Deserializable for WireTransaction {
    fn deserialize(reader: &mut impl Read, mut recursion_depth: u32) -> io::Result<Self> {
        Self::check_rec(&mut recursion_depth)?;
        let groups = <Vec<ComponentGroup>>::deserialize(reader, recursion_depth)?;
        let salt = PrivacySalt::deserialize(reader, recursion_depth)?;
        let digest = DigestService::deserialize(reader, recursion_depth)?;
        WireTransaction::new(groups, salt, digest)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}
