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


//! Contract upgrade transactions move states from one contract to its
//! upgraded version, re-pinning their constraints to the new code.
//!
//! Unlike ordinary transactions, an upgrade carries a flat list of
//! components rather than groups, and its outputs are not stored: they are
//! derived during resolution by running the upgrade logic on each input.

use crate::attachments::{Attachment, AttachmentWithContext};
use crate::commitment::{component_hash, root_or_sentinel};
use crate::constraints::AttachmentConstraint;
use crate::error::{
    FilteredTransactionError, MalformedTransaction, ResolutionError, SignatureError, UpgradeError,
};
use crate::filtered::FilteredComponent;
use crate::parameters::NetworkParameters;
use crate::services::ServiceHub;
use crate::signed::TransactionSignature;
use crate::structure::{
    AttachmentId, ContractClassName, ContractState, Party, PrivacySalt, StateAndRef, StateRef,
    TransactionState,
};
use crate::wire::check_base_invariants;
use base_crypto::hash::{DigestService, SecureHash};
use base_crypto::signatures::VerifyingKey;
use serialize::{Deserializable, Serializable, Tagged};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::io::{self, Read, Write};
use std::sync::{Arc, OnceLock};

/// Positions of the components of an upgrade transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum UpgradeComponent {
    Inputs = 0,
    Notary = 1,
    LegacyAttachment = 2,
    UpgradedContract = 3,
    UpgradedAttachment = 4,
    /// Absent in upgrades created before parameters were committed to.
    ParametersHash = 5,
}

impl UpgradeComponent {
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Upgrade logic from a legacy contract to its replacement.
pub trait UpgradedContract: Debug + Send + Sync {
    /// The name of the contract states are upgraded to.
    fn class_name(&self) -> &str;

    /// The name of the contract states are upgraded from.
    fn legacy_contract(&self) -> &str;

    /// The constraint the legacy contract attachment must satisfy. `None`
    /// means the zone whitelist.
    fn legacy_contract_constraint(&self) -> Option<AttachmentConstraint> {
        None
    }

    fn upgrade(&self, state: &ContractState) -> anyhow::Result<ContractState>;
}

#[derive(Clone, Debug)]
pub struct ContractUpgradeWireTransaction {
    serialized_components: Vec<Vec<u8>>,
    privacy_salt: PrivacySalt,
    digest: DigestService,
    inputs: Vec<StateRef>,
    notary: Party,
    id: OnceLock<SecureHash>,
}

impl PartialEq for ContractUpgradeWireTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.serialized_components == other.serialized_components
            && self.privacy_salt == other.privacy_salt
            && self.digest == other.digest
    }
}

impl Eq for ContractUpgradeWireTransaction {}

fn decode_component<T: Deserializable>(
    components: &[Vec<u8>],
    component: UpgradeComponent,
) -> Result<T, MalformedTransaction> {
    let index = component.index();
    let bytes = components
        .get(index as usize)
        .ok_or(MalformedTransaction::MissingUpgradeComponent { index })?;
    serialize::from_bytes(bytes).map_err(|source| MalformedTransaction::Deserialization {
        group_index: index,
        position: 0,
        source,
    })
}

impl ContractUpgradeWireTransaction {
    pub fn new(
        serialized_components: Vec<Vec<u8>>,
        privacy_salt: PrivacySalt,
        digest: DigestService,
    ) -> Result<Self, MalformedTransaction> {
        let required = UpgradeComponent::UpgradedAttachment.index() as usize + 1;
        if serialized_components.len() < required {
            return Err(MalformedTransaction::MissingUpgradeComponent {
                index: serialized_components.len() as u32,
            });
        }
        let inputs: Vec<StateRef> =
            decode_component(&serialized_components, UpgradeComponent::Inputs)?;
        let notary: Party = decode_component(&serialized_components, UpgradeComponent::Notary)?;
        if inputs.is_empty() {
            return Err(MalformedTransaction::UpgradeWithoutInputs);
        }
        check_base_invariants(&inputs, &[], Some(&notary))?;
        Ok(ContractUpgradeWireTransaction {
            serialized_components,
            privacy_salt,
            digest,
            inputs,
            notary,
            id: OnceLock::new(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        inputs: &[StateRef],
        notary: &Party,
        legacy_contract_attachment_id: AttachmentId,
        upgraded_contract_class_name: &str,
        upgraded_contract_attachment_id: AttachmentId,
        network_parameters_hash: Option<SecureHash>,
        privacy_salt: PrivacySalt,
        digest: DigestService,
    ) -> Result<Self, MalformedTransaction> {
        let mut components = vec![
            serialize::to_bytes(inputs),
            serialize::to_bytes(notary),
            serialize::to_bytes(&legacy_contract_attachment_id),
            serialize::to_bytes(upgraded_contract_class_name),
            serialize::to_bytes(&upgraded_contract_attachment_id),
        ];
        if let Some(hash) = network_parameters_hash {
            components.push(serialize::to_bytes(&hash));
        }
        Self::new(components, privacy_salt, digest)
    }

    pub fn serialized_components(&self) -> &[Vec<u8>] {
        &self.serialized_components
    }

    pub fn privacy_salt(&self) -> &PrivacySalt {
        &self.privacy_salt
    }

    pub fn inputs(&self) -> &[StateRef] {
        &self.inputs
    }

    pub fn notary(&self) -> &Party {
        &self.notary
    }

    pub fn legacy_contract_attachment_id(&self) -> Result<AttachmentId, MalformedTransaction> {
        decode_component(&self.serialized_components, UpgradeComponent::LegacyAttachment)
    }

    pub fn upgraded_contract_class_name(&self) -> Result<ContractClassName, MalformedTransaction> {
        decode_component(&self.serialized_components, UpgradeComponent::UpgradedContract)
    }

    pub fn upgraded_contract_attachment_id(&self) -> Result<AttachmentId, MalformedTransaction> {
        decode_component(&self.serialized_components, UpgradeComponent::UpgradedAttachment)
    }

    pub fn network_parameters_hash(&self) -> Result<Option<SecureHash>, MalformedTransaction> {
        if self.component(UpgradeComponent::ParametersHash).is_none() {
            return Ok(None);
        }
        decode_component(&self.serialized_components, UpgradeComponent::ParametersHash).map(Some)
    }

    /// Outputs depend on the upgrade logic and only exist once resolved.
    pub fn outputs(&self) -> Result<Vec<TransactionState>, UpgradeError> {
        Err(UpgradeError::OutputsRequireResolution)
    }

    fn component(&self, component: UpgradeComponent) -> Option<&[u8]> {
        self.serialized_components
            .get(component.index() as usize)
            .map(Vec::as_slice)
    }

    pub fn nonces(&self) -> Vec<SecureHash> {
        (0..self.serialized_components.len() as u32)
            .map(|index| {
                self.digest
                    .compute_nonce(self.privacy_salt.as_bytes(), index, 0)
            })
            .collect()
    }

    pub fn component_hashes(&self) -> Vec<SecureHash> {
        self.serialized_components
            .iter()
            .zip(self.nonces())
            .map(|(bytes, nonce)| component_hash(&self.digest, &nonce, bytes))
            .collect()
    }

    /// The Merkle root over the component hashes.
    pub fn id(&self) -> SecureHash {
        *self
            .id
            .get_or_init(|| root_or_sentinel(&self.digest, &self.component_hashes()))
    }

    /// Reveals the inputs, the notary and the parameters hash; every other
    /// component is replaced by its hash.
    pub fn build_filtered_transaction(&self) -> ContractUpgradeFilteredTransaction {
        let revealed = [
            UpgradeComponent::Inputs,
            UpgradeComponent::Notary,
            UpgradeComponent::ParametersHash,
        ]
        .map(UpgradeComponent::index);
        let mut visible_components = BTreeMap::new();
        let mut hidden_components = BTreeMap::new();
        for (index, ((bytes, nonce), hash)) in self
            .serialized_components
            .iter()
            .zip(self.nonces())
            .zip(self.component_hashes())
            .enumerate()
        {
            let index = index as u32;
            if revealed.contains(&index) {
                visible_components.insert(
                    index,
                    FilteredComponent {
                        bytes: bytes.clone(),
                        nonce,
                    },
                );
            } else {
                hidden_components.insert(index, hash);
            }
        }
        ContractUpgradeFilteredTransaction {
            visible_components,
            hidden_components,
            digest: self.digest,
        }
    }

    /// Resolves inputs, attachments, parameters and the upgrade logic, then
    /// checks the upgrade is admissible and derives its outputs.
    pub fn resolve(
        &self,
        services: &dyn ServiceHub,
        sigs: Vec<TransactionSignature>,
    ) -> Result<ContractUpgradeLedgerTransaction, UpgradeError> {
        let id = self.id();
        let inputs = self
            .inputs
            .iter()
            .map(|state_ref| services.states().load_state_and_ref(state_ref))
            .collect::<Result<Vec<_>, _>>()?;
        let open = |attachment_id: AttachmentId| {
            services
                .attachments()
                .open_attachment(&attachment_id)
                .ok_or(ResolutionError::AttachmentNotFound(attachment_id))
        };
        let legacy_contract_attachment = open(self.legacy_contract_attachment_id()?)?;
        let upgraded_contract_attachment = open(self.upgraded_contract_attachment_id()?)?;
        let parameters_service = services.network_parameters();
        let network_parameters = match self.network_parameters_hash()? {
            Some(hash) => parameters_service.lookup(&hash).ok_or(ResolutionError::UnknownParameters {
                tx_id: id,
                hash: Some(hash),
            })?,
            None => parameters_service
                .current_parameters()
                .ok_or(ResolutionError::UnknownParameters {
                    tx_id: id,
                    hash: None,
                })?,
        };
        let class_name = self.upgraded_contract_class_name()?;
        let upgraded_contract = services
            .upgrade_loader()
            .load(&class_name, &upgraded_contract_attachment)
            .map_err(|cause| UpgradeError::ContractCreation {
                tx_id: id,
                class_name: class_name.clone(),
                cause,
            })?;
        ContractUpgradeLedgerTransaction::new(
            id,
            inputs,
            self.notary.clone(),
            legacy_contract_attachment,
            upgraded_contract_attachment,
            upgraded_contract,
            network_parameters,
            self.privacy_salt,
            sigs,
        )
    }
}

impl Tagged for ContractUpgradeWireTransaction {
    fn tag() -> Cow<'static, str> {
        Cow::Borrowed("contract-upgrade-wire-transaction[v1]")
    }
    fn tag_unique_factor() -> String {
        format!(
            "({},{},{})",
            <Vec<Vec<u8>>>::tag(),
            PrivacySalt::tag(),
            DigestService::tag()
        )
    }
}

impl Serializable for ContractUpgradeWireTransaction {
    fn serialize(&self, writer: &mut impl Write) -> io::Result<()> {
        self.serialized_components.serialize(writer)?;
        self.privacy_salt.serialize(writer)?;
        self.digest.serialize(writer)
    }
    fn serialized_size(&self) -> usize {
        self.serialized_components.serialized_size()
            + self.privacy_salt.serialized_size()
            + self.digest.serialized_size()
    }
}

impl Deserializable for ContractUpgradeWireTransaction {
    fn deserialize(reader: &mut impl Read, mut recursion_depth: u32) -> io::Result<Self> {
        Self::check_rec(&mut recursion_depth)?;
        let components = <Vec<Vec<u8>>>::deserialize(reader, recursion_depth)?;
        let salt = PrivacySalt::deserialize(reader, recursion_depth)?;
        let digest = DigestService::deserialize(reader, recursion_depth)?;
        ContractUpgradeWireTransaction::new(components, salt, digest)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

/// An upgrade transaction as shown to its notary.
#[derive(Clone, Debug, PartialEq, Eq, Serializable)]
#[tag = "contract-upgrade-filtered-transaction[v1]"]
pub struct ContractUpgradeFilteredTransaction {
    visible_components: BTreeMap<u32, FilteredComponent>,
    hidden_components: BTreeMap<u32, SecureHash>,
    digest: DigestService,
}

impl ContractUpgradeFilteredTransaction {
    pub fn visible_components(&self) -> &BTreeMap<u32, FilteredComponent> {
        &self.visible_components
    }

    pub fn hidden_components(&self) -> &BTreeMap<u32, SecureHash> {
        &self.hidden_components
    }

    /// Re-derives the id of the upgrade this was filtered from.
    pub fn id(&self) -> Result<SecureHash, FilteredTransactionError> {
        let count = self
            .visible_components
            .keys()
            .chain(self.hidden_components.keys())
            .max()
            .map_or(0, |max| max + 1);
        let hashes = (0..count)
            .map(|index| {
                match (
                    self.visible_components.get(&index),
                    self.hidden_components.get(&index),
                ) {
                    (Some(_), Some(_)) => {
                        Err(FilteredTransactionError::GroupRevealedAndHidden { group_index: index })
                    }
                    (Some(visible), None) => {
                        Ok(component_hash(&self.digest, &visible.nonce, &visible.bytes))
                    }
                    (None, Some(hidden)) => Ok(*hidden),
                    (None, None) => Err(FilteredTransactionError::MissingComponent { index }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(root_or_sentinel(&self.digest, &hashes))
    }

    fn visible<T: Deserializable>(
        &self,
        component: UpgradeComponent,
    ) -> Result<Option<T>, MalformedTransaction> {
        let index = component.index();
        self.visible_components
            .get(&index)
            .map(|visible| {
                serialize::from_bytes(&visible.bytes).map_err(|source| {
                    MalformedTransaction::Deserialization {
                        group_index: index,
                        position: 0,
                        source,
                    }
                })
            })
            .transpose()
    }

    pub fn inputs(&self) -> Result<Vec<StateRef>, MalformedTransaction> {
        Ok(self.visible(UpgradeComponent::Inputs)?.unwrap_or_default())
    }

    pub fn notary(&self) -> Result<Party, MalformedTransaction> {
        self.visible(UpgradeComponent::Notary)?
            .ok_or(MalformedTransaction::MissingUpgradeComponent {
                index: UpgradeComponent::Notary.index(),
            })
    }

    pub fn network_parameters_hash(&self) -> Result<Option<SecureHash>, MalformedTransaction> {
        self.visible(UpgradeComponent::ParametersHash)
    }
}

/// A resolved contract upgrade, with the outputs derived from its inputs.
#[derive(Clone, Debug)]
pub struct ContractUpgradeLedgerTransaction {
    pub id: SecureHash,
    pub inputs: Vec<StateAndRef>,
    pub outputs: Vec<TransactionState>,
    pub notary: Party,
    pub legacy_contract_attachment: Arc<Attachment>,
    pub upgraded_contract_attachment: Arc<Attachment>,
    pub upgraded_contract: Arc<dyn UpgradedContract>,
    pub network_parameters: Arc<NetworkParameters>,
    pub privacy_salt: PrivacySalt,
    pub sigs: Vec<TransactionSignature>,
}

impl ContractUpgradeLedgerTransaction {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: SecureHash,
        inputs: Vec<StateAndRef>,
        notary: Party,
        legacy_contract_attachment: Arc<Attachment>,
        upgraded_contract_attachment: Arc<Attachment>,
        upgraded_contract: Arc<dyn UpgradedContract>,
        network_parameters: Arc<NetworkParameters>,
        privacy_salt: PrivacySalt,
        sigs: Vec<TransactionSignature>,
    ) -> Result<Self, UpgradeError> {
        let mut tx = ContractUpgradeLedgerTransaction {
            id,
            inputs,
            outputs: Vec::new(),
            notary,
            legacy_contract_attachment,
            upgraded_contract_attachment,
            upgraded_contract,
            network_parameters,
            privacy_salt,
            sigs,
        };
        if !tx.network_parameters.is_notary(&tx.notary) {
            return Err(UpgradeError::NotaryNotWhitelisted(tx.notary.clone()));
        }
        tx.check_contracts()?;
        tx.check_constraints()?;
        tx.outputs = tx.upgraded_outputs()?;
        Ok(tx)
    }

    /// The contract every input is governed by.
    pub fn legacy_contract_class_name(&self) -> &str {
        self.inputs
            .first()
            .map_or("", |input| input.state.contract.as_str())
    }

    fn check_contracts(&self) -> Result<(), UpgradeError> {
        let expected = self.legacy_contract_class_name();
        if let Some(input) = self.inputs.iter().find(|i| i.state.contract != expected) {
            return Err(UpgradeError::InputContractMismatch {
                state_ref: input.state_ref,
                expected: expected.to_owned(),
                found: input.state.contract.clone(),
            });
        }
        let declared = self.upgraded_contract.legacy_contract();
        if declared != expected {
            return Err(UpgradeError::LegacyContractMismatch {
                expected: expected.to_owned(),
                declared: declared.to_owned(),
            });
        }
        Ok(())
    }

    fn check_constraints(&self) -> Result<(), UpgradeError> {
        let context = AttachmentWithContext::new(
            &self.legacy_contract_attachment,
            self.legacy_contract_class_name(),
            &self.network_parameters.whitelisted_contract_implementations,
        );
        for input in &self.inputs {
            if !input.state.constraint.is_satisfied_by(&context)? {
                return Err(UpgradeError::InputConstraintNotSatisfied {
                    state_ref: input.state_ref,
                    constraint: input.state.constraint.clone(),
                });
            }
        }
        let legacy_constraint = self
            .upgraded_contract
            .legacy_contract_constraint()
            .unwrap_or(AttachmentConstraint::WhitelistedByZone);
        if !legacy_constraint.is_satisfied_by(&context)? {
            return Err(UpgradeError::LegacyConstraintNotSatisfied {
                constraint: legacy_constraint,
            });
        }
        Ok(())
    }

    fn upgraded_outputs(&self) -> Result<Vec<TransactionState>, UpgradeError> {
        self.inputs
            .iter()
            .map(|input| {
                let constraint = match &input.state.constraint {
                    AttachmentConstraint::Hash(_) => {
                        AttachmentConstraint::Hash(self.upgraded_contract_attachment.id)
                    }
                    AttachmentConstraint::WhitelistedByZone => AttachmentConstraint::WhitelistedByZone,
                    other => {
                        return Err(UpgradeError::UnsupportedInputConstraint {
                            state_ref: input.state_ref,
                            constraint: other.clone(),
                        });
                    }
                };
                let data = self
                    .upgraded_contract
                    .upgrade(&input.state.data)
                    .map_err(|cause| UpgradeError::UpgradeFailed {
                        state_ref: input.state_ref,
                        cause,
                    })?;
                Ok(TransactionState {
                    data,
                    contract: self.upgraded_contract.class_name().to_owned(),
                    notary: input.state.notary.clone(),
                    encumbrance: input.state.encumbrance,
                    constraint,
                })
            })
            .collect()
    }

    /// The participants of every input, and the notary.
    pub fn required_signing_keys(&self) -> BTreeSet<VerifyingKey> {
        self.inputs
            .iter()
            .flat_map(|input| input.state.data.participants.iter())
            .map(|party| party.owning_key().clone())
            .chain(std::iter::once(self.notary.owning_key.clone()))
            .collect()
    }

    /// Checks all attached signatures and that no required one is missing.
    pub fn verify_required_signatures(&self) -> Result<(), SignatureError> {
        for sig in &self.sigs {
            sig.verify(&self.id)?;
        }
        let signed = self.sigs.iter().map(|sig| &sig.by).collect::<BTreeSet<_>>();
        let missing = self
            .required_signing_keys()
            .into_iter()
            .filter(|key| !signed.contains(key))
            .collect::<BTreeSet<_>>();
        if !missing.is_empty() {
            return Err(SignatureError::MissingSignatures(missing));
        }
        Ok(())
    }
}
