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


//! In-memory node services and fixtures for exercising transactions in tests.

use crate::attachments::{Attachment, ContractAttachmentWithLegacy, Uploader};
use crate::constraints::AttachmentConstraint;
use crate::error::{ResolutionError, SigningError, VerificationFailure};
use crate::ledger::LedgerTransaction;
use crate::parameters::{NetworkParameters, NotaryInfo};
use crate::services::{
    AttachmentStorage, CodeProvider, ContractVerifier, IdentityService, KeyManagementService,
    NetworkParametersService, ServiceHub, StateResolver, UpgradeLoader,
};
use crate::signed::{SignableData, TransactionSignature};
use crate::structure::{
    AbstractParty, AttachmentId, ContractClassName, ContractState, Party, StateAndRef, StateRef,
    TransactionState, UniqueIdentifier,
};
use crate::upgrade::UpgradedContract;
use base_crypto::hash::{DigestService, SecureHash};
use base_crypto::signatures::{SigningKey, VerifyingKey};
use lazy_static::lazy_static;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const CASH_CONTRACT: &str = "com.example.contracts.Cash";
pub const BOND_CONTRACT: &str = "com.example.contracts.Bond";

lazy_static! {
    pub static ref NOTARY_KEY: SigningKey = key(1);
    pub static ref ALICE_KEY: SigningKey = key(2);
    pub static ref BOB_KEY: SigningKey = key(3);
    pub static ref NOTARY: Party = Party::new("O=Notary,L=Zurich,C=CH", NOTARY_KEY.verifying_key());
    pub static ref ALICE: Party = Party::new("O=Alice,L=London,C=GB", ALICE_KEY.verifying_key());
    pub static ref BOB: Party = Party::new("O=Bob,L=Paris,C=FR", BOB_KEY.verifying_key());
}

/// A deterministic signing key for fixture `n`.
pub fn key(n: u64) -> SigningKey {
    SigningKey::sample(StdRng::seed_from_u64(0x42 + n))
}

pub fn attachment_id(label: &str) -> AttachmentId {
    SecureHash::sha256(label.as_bytes())
}

/// A trusted, unsigned attachment providing `contract`.
pub fn contract_attachment(label: &str, contract: &str) -> Attachment {
    Attachment::new(attachment_id(label), 1024, Uploader::App).providing(contract)
}

/// A state owned by `owner`, with a payload of `size` bytes.
pub fn test_state(owner: &Party, size: usize) -> ContractState {
    ContractState::new(
        "com.example.states.Token",
        vec![AbstractParty::Named(owner.clone())],
        vec![0x5a; size],
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct MockStates {
    states: Mutex<BTreeMap<StateRef, TransactionState>>,
    linear: Mutex<BTreeMap<UniqueIdentifier, StateRef>>,
}

impl StateResolver for MockStates {
    fn load_state(&self, state_ref: &StateRef) -> Result<TransactionState, ResolutionError> {
        lock(&self.states)
            .get(state_ref)
            .cloned()
            .ok_or(ResolutionError::UnknownTransaction(*state_ref))
    }

    fn resolve_linear(&self, id: &UniqueIdentifier) -> Result<StateAndRef, ResolutionError> {
        let state_ref = lock(&self.linear)
            .get(id)
            .copied()
            .ok_or_else(|| ResolutionError::UnknownLinearState(id.clone()))?;
        self.load_state_and_ref(&state_ref)
    }
}

#[derive(Default)]
pub struct MockAttachments {
    attachments: Mutex<BTreeMap<AttachmentId, Arc<Attachment>>>,
}

impl AttachmentStorage for MockAttachments {
    fn open_attachment(&self, id: &AttachmentId) -> Option<Arc<Attachment>> {
        lock(&self.attachments).get(id).cloned()
    }
}

#[derive(Default)]
pub struct MockParameters {
    current: Mutex<Option<SecureHash>>,
    known: Mutex<BTreeMap<SecureHash, Arc<NetworkParameters>>>,
}

impl NetworkParametersService for MockParameters {
    fn current_hash(&self) -> SecureHash {
        (*lock(&self.current)).unwrap_or_else(|| DigestService::SHA256.zero_hash())
    }

    fn lookup(&self, hash: &SecureHash) -> Option<Arc<NetworkParameters>> {
        lock(&self.known).get(hash).cloned()
    }
}

#[derive(Default)]
pub struct MockCode {
    contracts: Mutex<BTreeMap<ContractClassName, ContractAttachmentWithLegacy>>,
    libraries: Mutex<Vec<Arc<Attachment>>>,
    fixups: Mutex<Vec<(BTreeSet<AttachmentId>, BTreeSet<AttachmentId>)>>,
    without_propagation: Mutex<BTreeSet<ContractClassName>>,
}

impl CodeProvider for MockCode {
    fn contract_attachments(&self, contract: &str) -> Option<ContractAttachmentWithLegacy> {
        lock(&self.contracts).get(contract).cloned()
    }

    fn trusted_class_attachment(&self, class_path: &str) -> Option<Arc<Attachment>> {
        lock(&self.libraries)
            .iter()
            .find(|attachment| attachment.is_trusted() && attachment.declares(class_path))
            .cloned()
    }

    fn fixup_attachment_ids(&self, ids: &[AttachmentId]) -> Vec<AttachmentId> {
        let mut ids = ids.iter().copied().collect::<BTreeSet<_>>();
        for (from, to) in lock(&self.fixups).iter() {
            if from.is_subset(&ids) {
                ids.retain(|id| !from.contains(id));
                ids.extend(to.iter().copied());
            }
        }
        ids.into_iter().collect()
    }

    fn has_automatic_constraint_propagation(&self, contract: &str) -> bool {
        !lock(&self.without_propagation).contains(contract)
    }
}

#[derive(Default)]
pub struct MockIdentity {
    parties: Mutex<BTreeMap<String, Party>>,
}

impl IdentityService for MockIdentity {
    fn well_known_party_from_name(&self, name: &str) -> Option<Party> {
        lock(&self.parties).get(name).cloned()
    }
}

pub struct MockKeys {
    keys: Mutex<BTreeMap<VerifyingKey, SigningKey>>,
    rng: Mutex<StdRng>,
}

impl Default for MockKeys {
    fn default() -> Self {
        MockKeys {
            keys: Mutex::new(BTreeMap::new()),
            rng: Mutex::new(StdRng::seed_from_u64(0x42)),
        }
    }
}

impl KeyManagementService for MockKeys {
    fn sign(&self, data: &SignableData, key: &VerifyingKey) -> Result<TransactionSignature, SigningError> {
        let keys = lock(&self.keys);
        let signing_key = keys
            .get(key)
            .ok_or_else(|| SigningError::UnknownKey(key.clone()))?;
        Ok(TransactionSignature::sign(
            signing_key,
            &mut *lock(&self.rng),
            data,
        ))
    }
}

#[derive(Default)]
pub struct MockUpgrades {
    upgrades: Mutex<BTreeMap<String, Arc<dyn UpgradedContract>>>,
}

impl UpgradeLoader for MockUpgrades {
    fn load(&self, class_name: &str, attachment: &Attachment) -> anyhow::Result<Arc<dyn UpgradedContract>> {
        if !attachment.declares(&class_name.replace('.', "/")) {
            anyhow::bail!("attachment {} does not contain {class_name}", attachment.id);
        }
        lock(&self.upgrades)
            .get(class_name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no upgrade logic registered for {class_name}"))
    }
}

/// Fails verification with a missing class unless some attachment of the
/// transaction declares every class its contracts need.
#[derive(Default)]
pub struct MockVerifier {
    required_classes: Mutex<BTreeMap<ContractClassName, Vec<String>>>,
    failure: Mutex<Option<String>>,
    calls: Mutex<usize>,
}

impl MockVerifier {
    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

impl ContractVerifier for MockVerifier {
    fn verify(&self, tx: &LedgerTransaction) -> Result<(), VerificationFailure> {
        *lock(&self.calls) += 1;
        if let Some(message) = lock(&self.failure).clone() {
            return Err(VerificationFailure::Other(anyhow::anyhow!(message)));
        }
        let contracts = tx
            .input_states()
            .chain(&tx.outputs)
            .map(|state| state.contract.as_str())
            .collect::<BTreeSet<_>>();
        let required = lock(&self.required_classes);
        for contract in contracts {
            for class_path in required.get(contract).into_iter().flatten() {
                if !tx.attachments.iter().any(|att| att.declares(class_path)) {
                    return Err(VerificationFailure::Wrapped {
                        context: format!("verifying contract {contract}"),
                        cause: Box::new(VerificationFailure::ClassNotFound {
                            class_name: class_path.replace('/', "."),
                        }),
                    });
                }
            }
        }
        Ok(())
    }
}

/// An upgrade that keeps the state data and moves it to a new contract.
#[derive(Debug)]
pub struct RenamingUpgrade {
    pub from: ContractClassName,
    pub to: ContractClassName,
    pub legacy_constraint: Option<AttachmentConstraint>,
}

impl UpgradedContract for RenamingUpgrade {
    fn class_name(&self) -> &str {
        &self.to
    }

    fn legacy_contract(&self) -> &str {
        &self.from
    }

    fn legacy_contract_constraint(&self) -> Option<AttachmentConstraint> {
        self.legacy_constraint.clone()
    }

    fn upgrade(&self, state: &ContractState) -> anyhow::Result<ContractState> {
        Ok(state.clone())
    }
}

/// A node's services, held in memory.
#[derive(Default)]
pub struct MockServices {
    pub states: MockStates,
    pub attachments: MockAttachments,
    pub parameters: MockParameters,
    pub code: MockCode,
    pub identity: MockIdentity,
    pub keys: MockKeys,
    pub upgrades: MockUpgrades,
    pub verifier: MockVerifier,
    next_tx: Mutex<u64>,
}

impl MockServices {
    /// Services for a network with default parameters and [`NOTARY`] as
    /// its only notary.
    pub fn new() -> Self {
        let services = MockServices::default();
        services.set_parameters(NetworkParameters {
            notaries: vec![NotaryInfo {
                identity: NOTARY.clone(),
                validating: false,
            }],
            ..NetworkParameters::default()
        });
        services.register_identity(NOTARY.clone());
        for key in [&*NOTARY_KEY, &*ALICE_KEY, &*BOB_KEY] {
            services.add_key(key.clone());
        }
        services
    }

    /// Registers `params` and makes them current.
    pub fn set_parameters(&self, params: NetworkParameters) -> SecureHash {
        let hash = self.register_parameters(params);
        *lock(&self.parameters.current) = Some(hash);
        hash
    }

    /// Registers `params` without making them current.
    pub fn register_parameters(&self, params: NetworkParameters) -> SecureHash {
        let hash = params.hash();
        lock(&self.parameters.known).insert(hash, Arc::new(params));
        hash
    }

    pub fn current_parameters(&self) -> Arc<NetworkParameters> {
        let hash = self.parameters.current_hash();
        lock(&self.parameters.known)
            .get(&hash)
            .cloned()
            .unwrap_or_default()
    }

    /// Updates the current parameters with `f`.
    pub fn update_parameters(&self, f: impl FnOnce(&mut NetworkParameters)) -> SecureHash {
        let mut params = (*self.current_parameters()).clone();
        f(&mut params);
        self.set_parameters(params)
    }

    pub fn store_attachment(&self, attachment: Attachment) -> Arc<Attachment> {
        let attachment = Arc::new(attachment);
        lock(&self.attachments.attachments).insert(attachment.id, Arc::clone(&attachment));
        lock(&self.code.libraries).push(Arc::clone(&attachment));
        attachment
    }

    /// Stores `current` (and `legacy`) and installs it as the code for every
    /// contract it provides.
    pub fn install_contract(&self, current: Attachment, legacy: Option<Attachment>) -> Arc<Attachment> {
        let current = self.store_attachment(current);
        let legacy = legacy.map(|legacy| self.store_attachment(legacy));
        let mut contracts = lock(&self.code.contracts);
        for contract in &current.contracts {
            contracts.insert(
                contract.clone(),
                ContractAttachmentWithLegacy::new(Arc::clone(&current), legacy.clone()),
            );
        }
        current
    }

    /// Makes the node replace attachments `from` with `to` when all of
    /// `from` are present.
    pub fn add_fixup(
        &self,
        from: impl IntoIterator<Item = AttachmentId>,
        to: impl IntoIterator<Item = AttachmentId>,
    ) {
        lock(&self.code.fixups).push((from.into_iter().collect(), to.into_iter().collect()));
    }

    pub fn disable_constraint_propagation(&self, contract: &str) {
        lock(&self.code.without_propagation).insert(contract.to_owned());
    }

    pub fn require_classes(&self, contract: &str, classes: impl IntoIterator<Item = impl Into<String>>) {
        lock(&self.verifier.required_classes)
            .entry(contract.to_owned())
            .or_default()
            .extend(classes.into_iter().map(Into::into));
    }

    /// Makes every verification fail with an unexpected error.
    pub fn fail_verification(&self, message: &str) {
        *lock(&self.verifier.failure) = Some(message.to_owned());
    }

    pub fn register_identity(&self, party: Party) {
        lock(&self.identity.parties).insert(party.name.clone(), party);
    }

    pub fn add_key(&self, key: SigningKey) {
        lock(&self.keys.keys).insert(key.verifying_key(), key);
    }

    pub fn register_upgrade(&self, upgrade: Arc<dyn UpgradedContract>) {
        lock(&self.upgrades.upgrades).insert(upgrade.class_name().to_owned(), upgrade);
    }

    /// Records `state` as an output of a fresh transaction.
    pub fn record_state(&self, state: TransactionState) -> StateAndRef {
        let mut next = lock(&self.next_tx);
        *next += 1;
        let state_ref = StateRef::new(SecureHash::sha256(&next.to_be_bytes()), 0);
        drop(next);
        if let Some(linear_id) = &state.data.linear_id {
            lock(&self.states.linear).insert(linear_id.clone(), state_ref);
        }
        lock(&self.states.states).insert(state_ref, state.clone());
        StateAndRef::new(state, state_ref)
    }
}

impl ServiceHub for MockServices {
    fn states(&self) -> &dyn StateResolver {
        &self.states
    }

    fn attachments(&self) -> &dyn AttachmentStorage {
        &self.attachments
    }

    fn network_parameters(&self) -> &dyn NetworkParametersService {
        &self.parameters
    }

    fn code(&self) -> &dyn CodeProvider {
        &self.code
    }

    fn identity(&self) -> &dyn IdentityService {
        &self.identity
    }

    fn key_management(&self) -> &dyn KeyManagementService {
        &self.keys
    }

    fn upgrade_loader(&self) -> &dyn UpgradeLoader {
        &self.upgrades
    }

    fn verifier(&self) -> &dyn ContractVerifier {
        &self.verifier
    }
}
