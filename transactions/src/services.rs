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


//! The node services transactions are resolved and built against.

use crate::attachments::{Attachment, ContractAttachmentWithLegacy};
use crate::error::{ResolutionError, SigningError, VerificationFailure};
use crate::ledger::LedgerTransaction;
use crate::parameters::NetworkParameters;
use crate::signed::{SignableData, TransactionSignature};
use crate::structure::{AttachmentId, Party, StateAndRef, StateRef, TransactionState, UniqueIdentifier};
use crate::upgrade::UpgradedContract;
use base_crypto::hash::{DigestService, SecureHash};
use base_crypto::signatures::VerifyingKey;
use std::sync::Arc;

pub trait StateResolver {
    /// Loads the output a state reference points at.
    fn load_state(&self, state_ref: &StateRef) -> Result<TransactionState, ResolutionError>;

    /// Finds the current unconsumed version of a linear state.
    fn resolve_linear(&self, id: &UniqueIdentifier) -> Result<StateAndRef, ResolutionError>;

    fn load_state_and_ref(&self, state_ref: &StateRef) -> Result<StateAndRef, ResolutionError> {
        Ok(StateAndRef::new(self.load_state(state_ref)?, *state_ref))
    }
}

pub trait AttachmentStorage {
    fn open_attachment(&self, id: &AttachmentId) -> Option<Arc<Attachment>>;

    fn is_trusted(&self, attachment: &Attachment) -> bool {
        attachment.is_trusted()
    }
}

pub trait NetworkParametersService {
    fn current_hash(&self) -> SecureHash;

    fn lookup(&self, hash: &SecureHash) -> Option<Arc<NetworkParameters>>;

    fn current_parameters(&self) -> Option<Arc<NetworkParameters>> {
        self.lookup(&self.current_hash())
    }
}

/// Knowledge of the contract code installed on this node.
pub trait CodeProvider {
    /// The installed attachment for `contract`, with its legacy build if one exists.
    fn contract_attachments(&self, contract: &str) -> Option<ContractAttachmentWithLegacy>;

    /// A trusted attachment declaring the slash-separated class `class_path`.
    fn trusted_class_attachment(&self, class_path: &str) -> Option<Arc<Attachment>>;

    /// Rewrites an attachment set using the node's configured substitutions.
    fn fixup_attachment_ids(&self, ids: &[AttachmentId]) -> Vec<AttachmentId>;

    fn has_automatic_constraint_propagation(&self, _contract: &str) -> bool {
        true
    }
}

pub trait IdentityService {
    fn well_known_party_from_name(&self, name: &str) -> Option<Party>;
}

pub trait KeyManagementService {
    fn sign(&self, data: &SignableData, key: &VerifyingKey) -> Result<TransactionSignature, SigningError>;
}

/// Instantiates upgraded contract logic from its attachment.
pub trait UpgradeLoader {
    fn load(&self, class_name: &str, attachment: &Attachment) -> anyhow::Result<Arc<dyn UpgradedContract>>;
}

/// Runs contract verification over a resolved transaction.
pub trait ContractVerifier {
    fn verify(&self, tx: &LedgerTransaction) -> Result<(), VerificationFailure>;
}

pub trait ServiceHub: Send + Sync {
    fn states(&self) -> &dyn StateResolver;
    fn attachments(&self) -> &dyn AttachmentStorage;
    fn network_parameters(&self) -> &dyn NetworkParametersService;
    fn code(&self) -> &dyn CodeProvider;
    fn identity(&self) -> &dyn IdentityService;
    fn key_management(&self) -> &dyn KeyManagementService;
    fn upgrade_loader(&self) -> &dyn UpgradeLoader;
    fn verifier(&self) -> &dyn ContractVerifier;

    fn digest_service(&self) -> DigestService {
        DigestService::SHA256
    }
}
