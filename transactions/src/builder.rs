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


//! Incremental assembly of transactions.
//!
//! A [`TransactionBuilder`] collects inputs, outputs, commands and the rest,
//! then turns them into a [`WireTransaction`]. Building selects one contract
//! attachment per contract, replaces placeholder output constraints with
//! concrete ones, and, if verification fails because a class is missing,
//! retries with the attachments that provide it.

use crate::attachments::{Attachment, AttachmentWithContext, ContractAttachmentWithLegacy};
use crate::components::TransactionComponents;
use crate::constraints::{
    AttachmentConstraint, MAX_NUMBER_OF_KEYS_IN_SIGNATURE_CONSTRAINT,
    MIGRATE_ATTACHMENT_TO_SIGNATURE_CONSTRAINTS, MIGRATE_HASH_TO_SIGNATURE_CONSTRAINTS,
    output_constraint_from_inputs,
};
use crate::error::{
    BuildError, ConstraintError, LedgerTransactionError, MalformedTransaction, ResolutionError,
    VerificationFailure,
};
use crate::ledger::{LedgerTransaction, VerificationMode};
use crate::parameters::{BuilderConfig, NetworkParameters, REFERENCE_STATES_PLATFORM_VERSION};
use crate::services::{ServiceHub, StateResolver};
use crate::signed::{SignableData, SignatureMetadata, SignedTransaction};
use crate::structure::{
    AttachmentId, Command, CommandData, ContractClassName, ContractState, Party, PrivacySalt,
    StateAndRef, StatePointer, StateRef, TimeWindow, TransactionState,
};
use crate::wire::WireTransaction;
use base_crypto::signatures::VerifyingKey;
use base_crypto::time::{Duration, Timestamp};
use lazy_static::lazy_static;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

lazy_static! {
    static ref LOGGED_WARNINGS: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

fn warn_once(message: String) {
    let mut logged = LOGGED_WARNINGS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if !logged.contains(&message) {
        warn!("{message}");
        logged.insert(message);
    }
}

/// Whether `path` looks like a slash-separated class name, e.g. `com/example/Cash`.
fn is_valid_class_path(path: &str) -> bool {
    fn is_identifier(segment: &str) -> bool {
        let mut chars = segment.chars();
        chars
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
            && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
    }
    let segments = path.split('/').collect::<Vec<_>>();
    segments.len() > 1 && segments.into_iter().all(is_identifier)
}

fn resolve_pointer(
    pointer: &StatePointer,
    states: &dyn StateResolver,
) -> Result<StateAndRef, ResolutionError> {
    match pointer {
        StatePointer::Static { pointer, .. } => states.load_state_and_ref(pointer),
        StatePointer::Linear { pointer, .. } => states.resolve_linear(pointer),
    }
}

/// Anything that can be added to a builder in bulk.
#[derive(Clone, Debug)]
pub enum BuilderItem {
    Input(StateAndRef),
    Reference(StateAndRef),
    Attachment(AttachmentId),
    Output(TransactionState),
    Command(Command),
    TimeWindow(TimeWindow),
    PrivacySalt(PrivacySalt),
}

/// The outcome of an attempt to recover from a missing class.
enum Recovery {
    Rebuild,
    Rethrow,
    NotApplicable,
}

#[derive(Clone)]
pub struct TransactionBuilder {
    notary: Option<Party>,
    lock_id: Uuid,
    inputs: Vec<StateRef>,
    attachments: Vec<AttachmentId>,
    outputs: Vec<TransactionState>,
    commands: Vec<Command>,
    window: Option<TimeWindow>,
    privacy_salt: PrivacySalt,
    references: Vec<StateRef>,
    services: Option<Arc<dyn ServiceHub>>,
    config: BuilderConfig,
    input_states: Vec<StateAndRef>,
    reference_states: Vec<StateAndRef>,
    excluded_attachments: BTreeSet<AttachmentId>,
}

impl Debug for TransactionBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionBuilder")
            .field("notary", &self.notary)
            .field("lock_id", &self.lock_id)
            .field("inputs", &self.inputs)
            .field("attachments", &self.attachments)
            .field("outputs", &self.outputs)
            .field("commands", &self.commands)
            .field("window", &self.window)
            .field("references", &self.references)
            .field("has_services", &self.services.is_some())
            .field("config", &self.config)
            .field("excluded_attachments", &self.excluded_attachments)
            .finish()
    }
}

impl TransactionBuilder {
    pub fn new(notary: Option<Party>) -> Self {
        TransactionBuilder {
            notary,
            lock_id: Uuid::new_v4(),
            inputs: Vec::new(),
            attachments: Vec::new(),
            outputs: Vec::new(),
            commands: Vec::new(),
            window: None,
            privacy_salt: PrivacySalt::random(),
            references: Vec::new(),
            services: None,
            config: BuilderConfig::default(),
            input_states: Vec::new(),
            reference_states: Vec::new(),
            excluded_attachments: BTreeSet::new(),
        }
    }

    /// Services used to resolve state pointers as states are added.
    pub fn with_services(mut self, services: Arc<dyn ServiceHub>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn with_config(mut self, config: BuilderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_lock_id(mut self, lock_id: Uuid) -> Self {
        self.lock_id = lock_id;
        self
    }

    /// An independent copy, sharing only the services handle.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn lock_id(&self) -> Uuid {
        self.lock_id
    }

    pub fn notary(&self) -> Option<&Party> {
        self.notary.as_ref()
    }

    pub fn set_notary(&mut self, notary: Option<Party>) -> &mut Self {
        self.notary = notary;
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn inputs(&self) -> &[StateRef] {
        &self.inputs
    }

    pub fn input_states(&self) -> &[StateAndRef] {
        &self.input_states
    }

    pub fn references(&self) -> &[StateRef] {
        &self.references
    }

    pub fn reference_states(&self) -> &[StateAndRef] {
        &self.reference_states
    }

    pub fn attachments(&self) -> &[AttachmentId] {
        &self.attachments
    }

    pub fn excluded_attachments(&self) -> &BTreeSet<AttachmentId> {
        &self.excluded_attachments
    }

    pub fn outputs(&self) -> &[TransactionState] {
        &self.outputs
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn time_window(&self) -> Option<&TimeWindow> {
        self.window.as_ref()
    }

    pub fn privacy_salt(&self) -> &PrivacySalt {
        &self.privacy_salt
    }

    pub fn with_items(
        &mut self,
        items: impl IntoIterator<Item = BuilderItem>,
    ) -> Result<&mut Self, BuildError> {
        for item in items {
            match item {
                BuilderItem::Input(state) => self.add_input_state(state)?,
                BuilderItem::Reference(state) => self.add_reference_state(state)?,
                BuilderItem::Attachment(id) => self.add_attachment(id),
                BuilderItem::Output(state) => self.add_output_state(state)?,
                BuilderItem::Command(command) => self.add_command(command),
                BuilderItem::TimeWindow(window) => self.set_time_window(window)?,
                BuilderItem::PrivacySalt(salt) => self.set_privacy_salt(salt),
            };
        }
        Ok(self)
    }

    fn check_notary(&self, state: &StateAndRef) -> Result<(), BuildError> {
        let found = &state.state.notary.name;
        if self.notary.as_ref().map(|notary| &notary.name) != Some(found) {
            return Err(BuildError::NotaryMismatch {
                expected: self.notary.as_ref().map(|notary| notary.name.clone()),
                found: found.clone(),
            });
        }
        Ok(())
    }

    pub fn add_input_state(&mut self, state: StateAndRef) -> Result<&mut Self, BuildError> {
        self.check_notary(&state)?;
        self.inputs.push(state.state_ref);
        self.input_states.push(state.clone());
        self.resolve_state_pointers(&state.state)?;
        Ok(self)
    }

    pub fn add_reference_state(&mut self, state: StateAndRef) -> Result<&mut Self, BuildError> {
        let pointers = state.state.data.pointers.clone();
        self.push_reference(state)?;
        self.resolve_pointers(&pointers)?;
        Ok(self)
    }

    fn push_reference(&mut self, state: StateAndRef) -> Result<(), BuildError> {
        if let Some(first) = self.reference_states.first() {
            if first.state.notary.name != state.state.notary.name {
                return Err(BuildError::ReferencesUseMultipleNotaries {
                    first: first.state.notary.name.clone(),
                    second: state.state.notary.name.clone(),
                });
            }
        }
        self.check_notary(&state)?;
        if self.inputs.contains(&state.state_ref) {
            return Err(MalformedTransaction::InputsAndReferencesOverlap(state.state_ref).into());
        }
        self.references.push(state.state_ref);
        self.reference_states.push(state);
        Ok(())
    }

    pub fn add_attachment(&mut self, id: AttachmentId) -> &mut Self {
        self.attachments.push(id);
        self
    }

    pub fn add_output_state(&mut self, state: TransactionState) -> Result<&mut Self, BuildError> {
        self.resolve_state_pointers(&state)?;
        self.outputs.push(state);
        Ok(self)
    }

    /// Adds an output governed by `contract` under the builder's notary.
    pub fn add_output(
        &mut self,
        data: ContractState,
        contract: impl Into<ContractClassName>,
        constraint: AttachmentConstraint,
    ) -> Result<&mut Self, BuildError> {
        let notary = self.notary.clone().ok_or(BuildError::NoNotary)?;
        self.add_output_state(TransactionState::new(data, contract, notary).with_constraint(constraint))
    }

    pub fn add_command(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn add_command_with(&mut self, data: CommandData, signers: Vec<VerifyingKey>) -> &mut Self {
        self.add_command(Command::new(data, signers))
    }

    pub fn set_time_window(&mut self, window: TimeWindow) -> Result<&mut Self, BuildError> {
        if self.notary.is_none() {
            return Err(MalformedTransaction::TimeWindowWithoutNotary.into());
        }
        self.window = Some(window);
        Ok(self)
    }

    /// Sets a window of `2 * tolerance` centred on `time`.
    pub fn set_time_window_with_tolerance(
        &mut self,
        time: Timestamp,
        tolerance: Duration,
    ) -> Result<&mut Self, BuildError> {
        self.set_time_window(TimeWindow::with_tolerance(time, tolerance)?)
    }

    pub fn set_privacy_salt(&mut self, salt: PrivacySalt) -> &mut Self {
        self.privacy_salt = salt;
        self
    }

    fn resolve_state_pointers(&mut self, state: &TransactionState) -> Result<(), BuildError> {
        self.resolve_pointers(&state.data.pointers)
    }

    /// Adds the state behind each pointer as a reference, followed by the
    /// states its own pointers lead to. Each walk stops at the first pointer
    /// that is not meant to be resolved.
    fn resolve_pointers(&mut self, pointers: &[StatePointer]) -> Result<(), BuildError> {
        for pointer in pointers {
            let services = match &self.services {
                Some(services) if pointer.is_resolved() => Arc::clone(services),
                _ => {
                    if pointer.is_resolved() {
                        warn!(
                            %pointer,
                            "no services were provided to the transaction builder, so the state pointer cannot be resolved"
                        );
                    }
                    return Ok(());
                }
            };
            let resolved = resolve_pointer(pointer, services.states())?;
            if self.references.contains(&resolved.state_ref) {
                continue;
            }
            let nested = resolved.state.data.pointers.clone();
            self.push_reference(resolved)?;
            self.resolve_pointers(&nested)?;
        }
        Ok(())
    }

    /// Builds the wire transaction, retrying while missing classes can be
    /// supplied by adding attachments.
    pub fn to_wire_transaction(&mut self, services: &dyn ServiceHub) -> Result<WireTransaction, BuildError> {
        let mut try_count = 0;
        loop {
            let wtx = self.assemble(services)?;
            if !self.add_missing_dependency(services, &wtx, try_count)? {
                return Ok(wtx);
            }
            try_count += 1;
            debug!(try_count, "rebuilding transaction with additional attachments");
        }
    }

    pub fn to_ledger_transaction(
        &mut self,
        services: &dyn ServiceHub,
    ) -> Result<LedgerTransaction, BuildError> {
        let wtx = self.to_wire_transaction(services)?;
        Ok(wtx.to_ledger_transaction(services, VerificationMode::InProcess)?)
    }

    pub fn verify(&mut self, services: &dyn ServiceHub) -> Result<(), BuildError> {
        let ltx = self.to_ledger_transaction(services)?;
        Ok(ltx.verify(services.verifier())?)
    }

    /// Builds the transaction and signs it with `key` through the key
    /// management service.
    pub fn to_signed_transaction(
        &mut self,
        services: &dyn ServiceHub,
        key: &VerifyingKey,
        metadata: SignatureMetadata,
    ) -> Result<SignedTransaction, BuildError> {
        let wtx = self.to_wire_transaction(services)?;
        let data = SignableData {
            tx_id: wtx.id(),
            metadata,
        };
        let sig = services.key_management().sign(&data, key)?;
        Ok(SignedTransaction::new(wtx, vec![sig]))
    }

    fn assemble(&self, services: &dyn ServiceHub) -> Result<WireTransaction, BuildError> {
        let parameters_service = services.network_parameters();
        let params = parameters_service
            .current_parameters()
            .ok_or(BuildError::NoCurrentParameters)?;
        if !self.references.is_empty()
            && params.minimum_platform_version < REFERENCE_STATES_PLATFORM_VERSION
        {
            return Err(BuildError::PlatformVersionTooLow {
                feature: "reference states",
                required: REFERENCE_STATES_PLATFORM_VERSION,
                actual: params.minimum_platform_version,
            });
        }
        let (notary, outputs) = self.resolve_notary(services);
        let (contract_attachments, outputs) =
            self.select_contract_attachments_and_output_state_constraints(services, &params, outputs)?;
        for state in self
            .input_states
            .iter()
            .map(|input| &input.state)
            .chain(&outputs)
        {
            self.check_constraint_validity(state, &contract_attachments, &params)?;
        }

        let mut attachments = contract_attachments
            .values()
            .map(|selected| selected.current.id)
            .chain(self.attachments.iter().copied())
            .collect::<BTreeSet<_>>();
        attachments.retain(|id| !self.excluded_attachments.contains(id));
        let legacy_attachments = contract_attachments
            .values()
            .filter_map(|selected| selected.legacy.as_ref().map(|legacy| legacy.id))
            .collect::<BTreeSet<_>>();

        let components = TransactionComponents {
            inputs: self.inputs.clone(),
            outputs,
            commands: self.commands.clone(),
            attachments: attachments.into_iter().collect(),
            legacy_attachments: legacy_attachments.into_iter().collect(),
            notary,
            time_window: self.window,
            references: self.references.clone(),
            network_parameters_hash: Some(parameters_service.current_hash()),
        };
        Ok(WireTransaction::from_components(
            &components,
            self.privacy_salt,
            services.digest_service(),
        )?)
    }

    /// The notary and outputs to build with, switched to the identity the
    /// notary currently uses if it has rotated its key.
    fn resolve_notary(&self, services: &dyn ServiceHub) -> (Option<Party>, Vec<TransactionState>) {
        let Some(notary) = &self.notary else {
            return (None, self.outputs.clone());
        };
        let Some(active) = services.identity().well_known_party_from_name(&notary.name) else {
            return (Some(notary.clone()), self.outputs.clone());
        };
        if &active != notary {
            warn!(from = ?notary, to = ?active, "replacing the transaction notary with its current identity");
        }
        let outputs = self
            .outputs
            .iter()
            .enumerate()
            .map(|(index, state)| {
                if state.notary == active {
                    return state.clone();
                }
                warn!(index, from = ?state.notary, to = ?active, "replacing the notary of a transaction output");
                state.clone().with_notary(active.clone())
            })
            .collect();
        (Some(active), outputs)
    }

    fn check_constraint_validity(
        &self,
        state: &TransactionState,
        contract_attachments: &BTreeMap<ContractClassName, ContractAttachmentWithLegacy>,
        params: &NetworkParameters,
    ) -> Result<(), BuildError> {
        if let AttachmentConstraint::Signature(keys) = &state.constraint {
            let count = keys.keys().len();
            if count > MAX_NUMBER_OF_KEYS_IN_SIGNATURE_CONSTRAINT {
                return Err(ConstraintError::TooManySignatureKeys {
                    count,
                    max: MAX_NUMBER_OF_KEYS_IN_SIGNATURE_CONSTRAINT,
                }
                .into());
            }
        }
        let selected = contract_attachments.get(&state.contract).ok_or_else(|| {
            BuildError::MissingContractAttachments {
                states: vec![state.clone()],
                contract: Some(state.contract.clone()),
            }
        })?;
        let context = self.context(&selected.current, &state.contract, params);
        if !state.constraint.is_satisfied_by(&context)? {
            return Err(ConstraintError::NotSatisfied {
                contract: state.contract.clone(),
                constraint: state.constraint.clone(),
                attachment: selected.current.id,
            }
            .into());
        }
        Ok(())
    }

    fn context<'a>(
        &self,
        attachment: &'a Attachment,
        contract: &'a str,
        params: &'a NetworkParameters,
    ) -> AttachmentWithContext<'a> {
        AttachmentWithContext::new(
            attachment,
            contract,
            &params.whitelisted_contract_implementations,
        )
        .with_hash_constraints_disabled(self.config.disable_hash_constraints)
    }

    /// Selects an attachment for every contract used by inputs, outputs and
    /// references, and resolves placeholder output constraints. Outputs are
    /// returned in their original order.
    #[allow(clippy::type_complexity)]
    fn select_contract_attachments_and_output_state_constraints(
        &self,
        services: &dyn ServiceHub,
        params: &NetworkParameters,
        outputs: Vec<TransactionState>,
    ) -> Result<
        (
            BTreeMap<ContractClassName, ContractAttachmentWithLegacy>,
            Vec<TransactionState>,
        ),
        BuildError,
    > {
        let explicit = self.explicit_contract_attachments(services)?;

        let mut input_groups = BTreeMap::<&str, Vec<&TransactionState>>::new();
        for input in &self.input_states {
            input_groups
                .entry(input.state.contract.as_str())
                .or_default()
                .push(&input.state);
        }
        let mut output_groups = BTreeMap::<ContractClassName, Vec<(usize, TransactionState)>>::new();
        for (index, state) in outputs.into_iter().enumerate() {
            output_groups
                .entry(state.contract.clone())
                .or_default()
                .push((index, state));
        }
        let all_contracts = input_groups
            .keys()
            .map(|contract| contract.to_string())
            .chain(output_groups.keys().cloned())
            .collect::<BTreeSet<_>>();

        let mut selected = BTreeMap::new();
        let mut resolved_outputs = Vec::new();
        for contract in &all_contracts {
            let inputs = input_groups
                .get(contract.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let (attachment, outputs) = self.select_attachment_and_resolve_outputs(
                services,
                params,
                contract,
                inputs,
                output_groups.remove(contract),
                explicit.get(contract),
            )?;
            selected.insert(contract.clone(), attachment);
            resolved_outputs.extend(outputs);
        }

        let mut reference_groups = BTreeMap::<&str, Vec<TransactionState>>::new();
        for reference in &self.reference_states {
            if !all_contracts.contains(&reference.state.contract) {
                reference_groups
                    .entry(reference.state.contract.as_str())
                    .or_default()
                    .push(reference.state.clone());
            }
        }
        for (contract, states) in reference_groups {
            selected.insert(
                contract.to_owned(),
                self.installed_attachment(services, contract, states)?,
            );
        }

        resolved_outputs.sort_by_key(|(index, _)| *index);
        Ok((
            selected,
            resolved_outputs.into_iter().map(|(_, state)| state).collect(),
        ))
    }

    /// Contract attachments added explicitly, by the contracts they provide.
    fn explicit_contract_attachments(
        &self,
        services: &dyn ServiceHub,
    ) -> Result<BTreeMap<ContractClassName, Arc<Attachment>>, BuildError> {
        let mut explicit = BTreeMap::new();
        for id in &self.attachments {
            // Unknown ids stay in the transaction but select no contract code.
            let Some(attachment) = services.attachments().open_attachment(id) else {
                continue;
            };
            for contract in &attachment.contracts {
                match explicit.entry(contract.clone()) {
                    Entry::Vacant(entry) => {
                        entry.insert(Arc::clone(&attachment));
                    }
                    Entry::Occupied(entry) if entry.get().id != attachment.id => {
                        return Err(BuildError::MultipleExplicitAttachments {
                            contract: contract.clone(),
                            first: entry.get().id,
                            second: attachment.id,
                        });
                    }
                    Entry::Occupied(_) => {}
                }
            }
        }
        Ok(explicit)
    }

    /// The installed attachment for `contract`. `states` are reported if
    /// there is none.
    fn installed_attachment(
        &self,
        services: &dyn ServiceHub,
        contract: &str,
        states: Vec<TransactionState>,
    ) -> Result<ContractAttachmentWithLegacy, BuildError> {
        let selected = services.code().contract_attachments(contract).ok_or_else(|| {
            BuildError::MissingContractAttachments {
                states,
                contract: Some(contract.to_owned()),
            }
        })?;
        if selected.legacy.is_none() {
            warn_once(format!(
                "contract {contract} has no legacy attachment; nodes running legacy contract code will not be able to verify transactions using it"
            ));
        }
        Ok(selected)
    }

    fn select_attachment_and_resolve_outputs(
        &self,
        services: &dyn ServiceHub,
        params: &NetworkParameters,
        contract: &str,
        inputs: &[&TransactionState],
        outputs: Option<Vec<(usize, TransactionState)>>,
        explicit: Option<&Arc<Attachment>>,
    ) -> Result<(ContractAttachmentWithLegacy, Vec<(usize, TransactionState)>), BuildError> {
        let inputs_and_outputs = || {
            inputs
                .iter()
                .copied()
                .chain(outputs.iter().flatten().map(|(_, state)| state))
        };
        let installed = || {
            let states = inputs_and_outputs()
                .filter(|state| !state.constraint.is_placeholder())
                .cloned()
                .collect();
            self.installed_attachment(services, contract, states)
        };
        let is_hash = |state: &&TransactionState| matches!(state.constraint, AttachmentConstraint::Hash(_));

        let migrate_hash_to_signature = self.config.disable_hash_constraints
            && params.minimum_platform_version >= MIGRATE_HASH_TO_SIGNATURE_CONSTRAINTS
            && inputs.iter().any(is_hash)
            && !outputs.iter().flatten().map(|(_, state)| state).any(|s| is_hash(&s));
        if migrate_hash_to_signature {
            let selected = installed()?;
            let current = &selected.current;
            if current.is_signed() && explicit.is_none_or(|explicit| explicit.id == current.id) {
                let signature = AttachmentConstraint::signed_by(current)?;
                if !signature.is_satisfied_by(&self.context(current, contract, params))? {
                    return Err(ConstraintError::NotSatisfied {
                        contract: contract.to_owned(),
                        constraint: signature,
                        attachment: current.id,
                    }
                    .into());
                }
                let outputs = outputs
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(index, state)| {
                        if state.constraint.is_placeholder() {
                            (index, state.with_constraint(signature.clone()))
                        } else {
                            (index, state)
                        }
                    })
                    .collect();
                return Ok((selected, outputs));
            }
        }

        let storage = services.attachments();
        let mut hash_attachments = BTreeMap::new();
        for state in inputs_and_outputs() {
            if let AttachmentConstraint::Hash(id) = &state.constraint {
                let attachment = storage
                    .open_attachment(id)
                    .filter(|att| att.is_contract_attachment() && storage.is_trusted(att))
                    .ok_or_else(|| BuildError::MissingContractAttachments {
                        states: vec![state.clone()],
                        contract: None,
                    })?;
                hash_attachments.insert(*id, attachment);
            }
        }
        if hash_attachments.len() > 1 {
            return Err(ConstraintError::MultipleHashAttachments {
                contract: contract.to_owned(),
                attachments: hash_attachments.into_keys().collect(),
            }
            .into());
        }
        let pinned = hash_attachments.into_values().next();

        let selected = match (explicit, pinned) {
            (Some(explicit), Some(pinned)) if explicit.id != pinned.id => {
                return Err(BuildError::ExplicitAttachmentConflict {
                    contract: contract.to_owned(),
                    explicit: explicit.id,
                    pinned: pinned.id,
                });
            }
            (Some(explicit), _) => ContractAttachmentWithLegacy::without_legacy(Arc::clone(explicit)),
            (None, Some(pinned)) => ContractAttachmentWithLegacy::without_legacy(pinned),
            (None, None) => installed()?,
        };

        let Some(outputs) = outputs else {
            return Ok((selected, Vec::new()));
        };
        if !outputs.iter().any(|(_, state)| state.constraint.is_placeholder()) {
            return Ok((selected, outputs));
        }
        if !services.code().has_automatic_constraint_propagation(contract) {
            return Err(ConstraintError::NoConstraintPropagation {
                contract: contract.to_owned(),
            }
            .into());
        }

        let attachment = &selected.current;
        let context = self.context(attachment, contract, params);
        let default = self.default_output_constraint(inputs, &context, params)?;
        if !default.is_satisfied_by(&context)? {
            return Err(ConstraintError::NotSatisfied {
                contract: contract.to_owned(),
                constraint: default,
                attachment: attachment.id,
            }
            .into());
        }
        let outputs = outputs
            .into_iter()
            .map(|(index, state)| {
                if state.constraint.is_placeholder() {
                    return Ok((index, state.with_constraint(default.clone())));
                }
                for input in inputs {
                    let allowed = state.constraint.can_be_transitioned_from(
                        &input.constraint,
                        attachment,
                        self.config.disable_hash_constraints,
                    )?;
                    if !allowed {
                        return Err(ConstraintError::IllegalTransition {
                            contract: contract.to_owned(),
                            from: input.constraint.clone(),
                            to: state.constraint.clone(),
                        }
                        .into());
                    }
                }
                if !state.constraint.is_satisfied_by(&context)? {
                    return Err(ConstraintError::NotSatisfied {
                        contract: contract.to_owned(),
                        constraint: state.constraint.clone(),
                        attachment: attachment.id,
                    }
                    .into());
                }
                Ok((index, state))
            })
            .collect::<Result<Vec<_>, BuildError>>()?;
        Ok((selected, outputs))
    }

    /// The constraint given to placeholder outputs: derived from the inputs
    /// if there are any, otherwise chosen for a fresh issuance.
    fn default_output_constraint(
        &self,
        inputs: &[&TransactionState],
        context: &AttachmentWithContext<'_>,
        params: &NetworkParameters,
    ) -> Result<AttachmentConstraint, BuildError> {
        let attachment = context.attachment;
        if !inputs.is_empty() {
            let constraints = inputs
                .iter()
                .map(|state| state.constraint.clone())
                .collect::<BTreeSet<_>>();
            return Ok(output_constraint_from_inputs(
                &constraints,
                attachment,
                params.minimum_platform_version,
            )?);
        }
        let fallback = if context.is_whitelisted() {
            AttachmentConstraint::WhitelistedByZone
        } else {
            AttachmentConstraint::Hash(attachment.id)
        };
        if !attachment.is_signed() {
            return Ok(fallback);
        }
        if params.minimum_platform_version < MIGRATE_ATTACHMENT_TO_SIGNATURE_CONSTRAINTS {
            warn_once(format!(
                "signature constraints need minimum platform version {MIGRATE_ATTACHMENT_TO_SIGNATURE_CONSTRAINTS}, but the network is at {}; using {fallback:?} for {}",
                params.minimum_platform_version, context.contract
            ));
            return Ok(fallback);
        }
        Ok(AttachmentConstraint::signed_by(attachment)?)
    }

    /// Verifies `wtx` and, if it fails for want of a class, adjusts the
    /// attachments so a rebuild can succeed. Returns whether to rebuild.
    fn add_missing_dependency(
        &mut self,
        services: &dyn ServiceHub,
        wtx: &WireTransaction,
        try_count: u32,
    ) -> Result<bool, BuildError> {
        let failure = match wtx.to_ledger_transaction(services, VerificationMode::InProcess) {
            Ok(ltx) => match ltx.verify(services.verifier()) {
                Ok(()) => return Ok(false),
                Err(failure) => failure,
            },
            Err(err @ LedgerTransactionError::SizeLimit(_)) => return Err(err.into()),
            Err(err) => VerificationFailure::Ledger(err),
        };
        let Some(class_path) = failure.missing_class_path() else {
            if let VerificationFailure::Other(err) = failure.root_cause() {
                error!(tx_id = %wtx.id(), "unexpected failure while verifying transaction: {err:#}");
                return Err(failure.into());
            }
            // Reported again when the transaction itself is verified.
            debug!(tx_id = %wtx.id(), %failure, "transaction does not verify yet");
            return Ok(false);
        };

        let tx_attachments = wtx.attachments()?;
        if try_count == 0 {
            match self.fixup_attachments(tx_attachments, services) {
                Recovery::Rebuild => return Ok(true),
                Recovery::Rethrow => return Err(failure.into()),
                Recovery::NotApplicable => {}
            }
        }
        match self.add_missing_attachment(&class_path, tx_attachments, services) {
            Recovery::Rebuild => Ok(true),
            Recovery::Rethrow | Recovery::NotApplicable => Err(failure.into()),
        }
    }

    /// Applies the node's attachment substitutions to the transaction's
    /// attachments.
    fn fixup_attachments(&mut self, tx_attachments: &[AttachmentId], services: &dyn ServiceHub) -> Recovery {
        let original = tx_attachments.iter().copied().collect::<BTreeSet<_>>();
        let replacement = services
            .code()
            .fixup_attachment_ids(tx_attachments)
            .into_iter()
            .collect::<BTreeSet<_>>();
        if original == replacement {
            return Recovery::NotApplicable;
        }
        let extra = replacement.difference(&original).copied().collect::<Vec<_>>();
        let storage = services.attachments();
        for id in &extra {
            let trusted = storage
                .open_attachment(id)
                .is_some_and(|attachment| storage.is_trusted(&attachment));
            if !trusted {
                warn!(attachment = %id, "attachment fix-up suggests an attachment that is missing or untrusted");
                return Recovery::Rethrow;
            }
        }
        self.attachments.extend(extra.iter().copied());
        self.excluded_attachments = original.difference(&replacement).copied().collect();
        warn!(
            added = ?extra,
            removed = ?self.excluded_attachments,
            "rebuilding transaction with fixed-up attachments"
        );
        Recovery::Rebuild
    }

    fn add_missing_attachment(
        &mut self,
        class_path: &str,
        tx_attachments: &[AttachmentId],
        services: &dyn ServiceHub,
    ) -> Recovery {
        if !is_valid_class_path(class_path) {
            warn!(class_path, "could not find an attachment for a class with an invalid name");
            return Recovery::Rethrow;
        }
        if self.config.missing_class_disabled {
            warn!(
                class_path,
                "transaction is missing an attachment for a class, and automatic attachment discovery is disabled"
            );
            return Recovery::Rethrow;
        }
        let Some(attachment) = services.code().trusted_class_attachment(class_path) else {
            error!(
                class_path,
                "transaction is missing an attachment for a class, and no trusted attachment in storage provides it"
            );
            return Recovery::Rethrow;
        };
        if tx_attachments.contains(&attachment.id) || self.attachments.contains(&attachment.id) {
            warn!(class_path, attachment = %attachment.id, "attachment providing the missing class is already included");
            return Recovery::Rethrow;
        }
        warn_once(format!(
            "transaction is missing an attachment for class {class_path}; automatically adding dependency {}. Installing the latest version of the application is recommended",
            attachment.id
        ));
        self.attachments.push(attachment.id);
        Recovery::Rebuild
    }
}
