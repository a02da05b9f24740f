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


use crate::constraints::AttachmentConstraint;
use crate::structure::{AttachmentId, ContractClassName, Party, StateRef, TransactionState, UniqueIdentifier};
use base_crypto::hash::SecureHash;
use base_crypto::signatures::VerifyingKey;
use base_crypto::time::Timestamp;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;

#[derive(Debug)]
#[non_exhaustive]
pub enum MalformedTransaction {
    ZeroPrivacySalt,
    InvalidTimeWindow {
        from_time: Timestamp,
        until_time: Timestamp,
    },
    EmptyComponentGroup {
        group_index: u32,
    },
    DuplicateComponentGroup {
        group_index: u32,
    },
    Deserialization {
        group_index: u32,
        position: u32,
        source: io::Error,
    },
    MultipleComponents {
        group_index: u32,
        count: usize,
    },
    CommandSignerMismatch {
        commands: usize,
        signers: usize,
    },
    MissingNotary,
    DuplicateInput(StateRef),
    DuplicateReference(StateRef),
    InputsAndReferencesOverlap(StateRef),
    NoInputsOrOutputs,
    NoCommands,
    TimeWindowWithoutNotary,
    UpgradeWithoutInputs,
    MissingUpgradeComponent {
        index: u32,
    },
}

impl Display for MalformedTransaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use MalformedTransaction::*;
        match self {
            ZeroPrivacySalt => write!(f, "privacy salt must not be all zeroes"),
            InvalidTimeWindow {
                from_time,
                until_time,
            } => write!(
                f,
                "time window start {from_time} is not before its end {until_time}"
            ),
            EmptyComponentGroup { group_index } => {
                write!(f, "component group {group_index} is present but empty")
            }
            DuplicateComponentGroup { group_index } => {
                write!(f, "component group {group_index} appears more than once")
            }
            Deserialization {
                group_index,
                position,
                source,
            } => write!(
                f,
                "failed to decode component {position} of group {group_index}: {source}"
            ),
            MultipleComponents { group_index, count } => write!(
                f,
                "component group {group_index} holds a single value but has {count} components"
            ),
            CommandSignerMismatch { commands, signers } => write!(
                f,
                "transaction has {commands} commands but {signers} signer lists"
            ),
            MissingNotary => write!(
                f,
                "transactions with inputs or reference states must have a notary"
            ),
            DuplicateInput(state_ref) => write!(f, "input {state_ref} is spent twice"),
            DuplicateReference(state_ref) => {
                write!(f, "reference {state_ref} is included twice")
            }
            InputsAndReferencesOverlap(state_ref) => write!(
                f,
                "state {state_ref} is used both as an input and as a reference"
            ),
            NoInputsOrOutputs => write!(f, "transaction has neither inputs nor outputs"),
            NoCommands => write!(f, "transaction has no commands"),
            TimeWindowWithoutNotary => {
                write!(f, "transactions with a time window must have a notary")
            }
            UpgradeWithoutInputs => write!(f, "contract upgrade transaction has no inputs"),
            MissingUpgradeComponent { index } => {
                write!(f, "contract upgrade transaction is missing component {index}")
            }
        }
    }
}

impl Error for MalformedTransaction {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MalformedTransaction::Deserialization { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum ResolutionError {
    /// The transaction that produced a state is not known locally.
    UnknownTransaction(StateRef),
    AttachmentNotFound(AttachmentId),
    UnknownParameters {
        tx_id: SecureHash,
        hash: Option<SecureHash>,
    },
    UnknownLinearState(UniqueIdentifier),
    Malformed(MalformedTransaction),
}

impl Display for ResolutionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use ResolutionError::*;
        match self {
            UnknownTransaction(state_ref) => write!(
                f,
                "cannot resolve {state_ref}: transaction {} is unknown",
                state_ref.txhash
            ),
            AttachmentNotFound(id) => write!(f, "attachment {id} could not be found"),
            UnknownParameters {
                tx_id,
                hash: Some(hash),
            } => write!(
                f,
                "network parameters {hash} referenced by transaction {tx_id} are unknown"
            ),
            UnknownParameters { tx_id, hash: None } => write!(
                f,
                "no current network parameters available to resolve transaction {tx_id}"
            ),
            UnknownLinearState(id) => write!(f, "no unconsumed linear state with id {id}"),
            Malformed(e) => e.fmt(f),
        }
    }
}

impl Error for ResolutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ResolutionError::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MalformedTransaction> for ResolutionError {
    fn from(err: MalformedTransaction) -> ResolutionError {
        ResolutionError::Malformed(err)
    }
}

/// The serialized transaction and its dependencies exceed the network's
/// maximum transaction size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeLimitExceeded {
    pub tx_id: SecureHash,
    pub max_transaction_size: u32,
}

impl Display for SizeLimitExceeded {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transaction {} exceeded the maximum transaction size limit of {} bytes",
            self.tx_id, self.max_transaction_size
        )
    }
}

impl Error for SizeLimitExceeded {}

/// Failure to turn a wire transaction into a ledger transaction.
#[derive(Debug)]
#[non_exhaustive]
pub enum LedgerTransactionError {
    Malformed(MalformedTransaction),
    Resolution(ResolutionError),
    SizeLimit(SizeLimitExceeded),
}

impl Display for LedgerTransactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LedgerTransactionError::Malformed(e) => e.fmt(f),
            LedgerTransactionError::Resolution(e) => e.fmt(f),
            LedgerTransactionError::SizeLimit(e) => e.fmt(f),
        }
    }
}

impl Error for LedgerTransactionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LedgerTransactionError::Malformed(e) => Some(e),
            LedgerTransactionError::Resolution(e) => Some(e),
            LedgerTransactionError::SizeLimit(e) => Some(e),
        }
    }
}

impl From<MalformedTransaction> for LedgerTransactionError {
    fn from(err: MalformedTransaction) -> LedgerTransactionError {
        LedgerTransactionError::Malformed(err)
    }
}

impl From<ResolutionError> for LedgerTransactionError {
    fn from(err: ResolutionError) -> LedgerTransactionError {
        LedgerTransactionError::Resolution(err)
    }
}

impl From<SizeLimitExceeded> for LedgerTransactionError {
    fn from(err: SizeLimitExceeded) -> LedgerTransactionError {
        LedgerTransactionError::SizeLimit(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConstraintError {
    /// A placeholder survived to a point where a concrete constraint is required.
    PlaceholderNotResolved(AttachmentConstraint),
    NoInputConstraints,
    AlwaysAcceptMixed,
    ConflictingHashConstraints(Vec<AttachmentConstraint>),
    MultipleSignatureConstraints(Vec<AttachmentConstraint>),
    SignatureWithUnsignedAttachment {
        attachment: AttachmentId,
    },
    UnexpectedConstraints(Vec<AttachmentConstraint>),
    EmptySignerSet,
    TooManySignatureKeys {
        count: usize,
        max: usize,
    },
    NotSatisfied {
        contract: ContractClassName,
        constraint: AttachmentConstraint,
        attachment: AttachmentId,
    },
    IllegalTransition {
        contract: ContractClassName,
        from: AttachmentConstraint,
        to: AttachmentConstraint,
    },
    NoConstraintPropagation {
        contract: ContractClassName,
    },
    MultipleHashAttachments {
        contract: ContractClassName,
        attachments: Vec<AttachmentId>,
    },
}

impl Display for ConstraintError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use ConstraintError::*;
        match self {
            PlaceholderNotResolved(c) => {
                write!(f, "{c:?} must be resolved to a concrete constraint first")
            }
            NoInputConstraints => write!(f, "cannot transition from an empty set of constraints"),
            AlwaysAcceptMixed => write!(
                f,
                "AlwaysAccept constraints cannot be mixed with other constraint types"
            ),
            ConflictingHashConstraints(cs) => {
                write!(f, "cannot mix different hash constraints: {cs:?}")
            }
            MultipleSignatureConstraints(cs) => write!(
                f,
                "cannot mix signature constraints signed by different parties: {cs:?}"
            ),
            SignatureWithUnsignedAttachment { attachment } => write!(
                f,
                "cannot transition to a signature constraint: attachment {attachment} is not signed"
            ),
            UnexpectedConstraints(cs) => {
                write!(f, "unexpected combination of input constraints: {cs:?}")
            }
            EmptySignerSet => write!(f, "a signature constraint needs at least one key"),
            TooManySignatureKeys { count, max } => write!(
                f,
                "signature constraint has {count} keys, more than the maximum of {max}"
            ),
            NotSatisfied {
                contract,
                constraint,
                attachment,
            } => write!(
                f,
                "selected attachment {attachment} does not satisfy {constraint:?} for contract {contract}"
            ),
            IllegalTransition { contract, from, to } => write!(
                f,
                "illegal constraint transition for contract {contract}: {from:?} -> {to:?}"
            ),
            NoConstraintPropagation { contract } => write!(
                f,
                "contract {contract} does not support automatic constraint propagation; set output constraints explicitly"
            ),
            MultipleHashAttachments {
                contract,
                attachments,
            } => write!(
                f,
                "hash constraints for contract {contract} pin more than one attachment: {attachments:?}"
            ),
        }
    }
}

impl Error for ConstraintError {}

/// A failure reported while verifying a resolved transaction.
#[derive(Debug)]
#[non_exhaustive]
pub enum VerificationFailure {
    /// A class referenced by name (dot-separated) could not be loaded.
    ClassNotFound { class_name: String },
    /// A class referenced from other code (slash-separated) could not be loaded.
    NoClassDefFound { class_path: String },
    ContractRejected {
        contract: ContractClassName,
        reason: String,
    },
    Constraint(ConstraintError),
    Ledger(LedgerTransactionError),
    /// A failure reported with additional context by the verifier.
    Wrapped {
        context: String,
        cause: Box<VerificationFailure>,
    },
    Other(anyhow::Error),
}

impl VerificationFailure {
    /// The innermost failure, with any context wrappers removed.
    pub fn root_cause(&self) -> &VerificationFailure {
        let mut current = self;
        while let VerificationFailure::Wrapped { cause, .. } = current {
            current = cause;
        }
        current
    }

    /// The slash-separated path of the class whose absence caused this
    /// failure, if any.
    pub fn missing_class_path(&self) -> Option<String> {
        match self.root_cause() {
            VerificationFailure::ClassNotFound { class_name } => Some(class_name.replace('.', "/")),
            VerificationFailure::NoClassDefFound { class_path } => Some(class_path.clone()),
            _ => None,
        }
    }
}

impl Display for VerificationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use VerificationFailure::*;
        match self {
            ClassNotFound { class_name } => write!(f, "class not found: {class_name}"),
            NoClassDefFound { class_path } => write!(f, "no class definition found: {class_path}"),
            ContractRejected { contract, reason } => {
                write!(f, "contract {contract} rejected the transaction: {reason}")
            }
            Constraint(e) => e.fmt(f),
            Ledger(e) => e.fmt(f),
            Wrapped { context, cause } => write!(f, "{context}: {cause}"),
            Other(e) => write!(f, "{e:#}"),
        }
    }
}

impl Error for VerificationFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            VerificationFailure::Constraint(e) => Some(e),
            VerificationFailure::Ledger(e) => Some(e),
            VerificationFailure::Wrapped { cause, .. } => Some(cause.as_ref()),
            VerificationFailure::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<LedgerTransactionError> for VerificationFailure {
    fn from(err: LedgerTransactionError) -> VerificationFailure {
        VerificationFailure::Ledger(err)
    }
}

impl From<ConstraintError> for VerificationFailure {
    fn from(err: ConstraintError) -> VerificationFailure {
        VerificationFailure::Constraint(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SigningError {
    /// The key management service holds no private key for this public key.
    UnknownKey(VerifyingKey),
}

impl Display for SigningError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SigningError::UnknownKey(key) => write!(f, "no signing key held for {key}"),
        }
    }
}

impl Error for SigningError {}

#[derive(Debug)]
#[non_exhaustive]
pub enum SignatureError {
    /// The signing key is not required by any command.
    SignerNotRequired(VerifyingKey),
    InvalidSignature(VerifyingKey),
    MissingSignatures(BTreeSet<VerifyingKey>),
    Malformed(MalformedTransaction),
}

impl Display for SignatureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use SignatureError::*;
        match self {
            SignerNotRequired(key) => {
                write!(f, "{key} is not among the signers of any command")
            }
            InvalidSignature(key) => write!(f, "signature by {key} does not verify"),
            MissingSignatures(keys) => {
                write!(f, "missing signatures from: ")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}")?;
                }
                Ok(())
            }
            Malformed(e) => e.fmt(f),
        }
    }
}

impl Error for SignatureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SignatureError::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MalformedTransaction> for SignatureError {
    fn from(err: MalformedTransaction) -> SignatureError {
        SignatureError::Malformed(err)
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum FilteredTransactionError {
    Malformed(MalformedTransaction),
    IdMismatch {
        claimed: SecureHash,
        computed: SecureHash,
    },
    GroupRevealedAndHidden {
        group_index: u32,
    },
    DuplicateGroup {
        group_index: u32,
    },
    ComponentsNotVisible {
        group_index: u32,
    },
    CommandNotVisible(VerifyingKey),
    MissingComponent {
        index: u32,
    },
}

impl Display for FilteredTransactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use FilteredTransactionError::*;
        match self {
            Malformed(e) => e.fmt(f),
            IdMismatch { claimed, computed } => write!(
                f,
                "filtered transaction claims id {claimed} but its components commit to {computed}"
            ),
            GroupRevealedAndHidden { group_index } => write!(
                f,
                "component group {group_index} is both revealed and hidden"
            ),
            DuplicateGroup { group_index } => {
                write!(f, "component group {group_index} is revealed more than once")
            }
            ComponentsNotVisible { group_index } => write!(
                f,
                "not all components of group {group_index} are visible"
            ),
            CommandNotVisible(key) => write!(
                f,
                "a command requiring a signature from {key} is not visible"
            ),
            MissingComponent { index } => {
                write!(f, "component {index} is neither revealed nor hidden")
            }
        }
    }
}

impl Error for FilteredTransactionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FilteredTransactionError::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MalformedTransaction> for FilteredTransactionError {
    fn from(err: MalformedTransaction) -> FilteredTransactionError {
        FilteredTransactionError::Malformed(err)
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum UpgradeError {
    Malformed(MalformedTransaction),
    Resolution(ResolutionError),
    /// The upgraded contract named by the transaction could not be loaded.
    ContractCreation {
        tx_id: SecureHash,
        class_name: ContractClassName,
        cause: anyhow::Error,
    },
    NotaryNotWhitelisted(Party),
    InputContractMismatch {
        state_ref: StateRef,
        expected: ContractClassName,
        found: ContractClassName,
    },
    LegacyContractMismatch {
        expected: ContractClassName,
        declared: ContractClassName,
    },
    InputConstraintNotSatisfied {
        state_ref: StateRef,
        constraint: AttachmentConstraint,
    },
    LegacyConstraintNotSatisfied {
        constraint: AttachmentConstraint,
    },
    UnsupportedInputConstraint {
        state_ref: StateRef,
        constraint: AttachmentConstraint,
    },
    UpgradeFailed {
        state_ref: StateRef,
        cause: anyhow::Error,
    },
    Constraint(ConstraintError),
    /// Outputs only exist once the upgrade has been resolved.
    OutputsRequireResolution,
}

impl Display for UpgradeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use UpgradeError::*;
        match self {
            Malformed(e) => e.fmt(f),
            Resolution(e) => e.fmt(f),
            ContractCreation {
                tx_id,
                class_name,
                cause,
            } => write!(
                f,
                "contract upgrade transaction {tx_id} could not create upgraded contract {class_name}: {cause:#}"
            ),
            NotaryNotWhitelisted(notary) => {
                write!(f, "notary {notary} is not on the network's notary whitelist")
            }
            InputContractMismatch {
                state_ref,
                expected,
                found,
            } => write!(
                f,
                "input {state_ref} is governed by {found}, but the upgrade applies to {expected}"
            ),
            LegacyContractMismatch { expected, declared } => write!(
                f,
                "upgraded contract declares legacy contract {declared}, but the inputs are governed by {expected}"
            ),
            InputConstraintNotSatisfied {
                state_ref,
                constraint,
            } => write!(
                f,
                "legacy contract attachment does not satisfy {constraint:?} of input {state_ref}"
            ),
            LegacyConstraintNotSatisfied { constraint } => write!(
                f,
                "legacy contract attachment does not satisfy the legacy constraint {constraint:?}"
            ),
            UnsupportedInputConstraint {
                state_ref,
                constraint,
            } => write!(
                f,
                "input {state_ref} has constraint {constraint:?}, which cannot be carried across an upgrade"
            ),
            UpgradeFailed { state_ref, cause } => {
                write!(f, "failed to upgrade input {state_ref}: {cause:#}")
            }
            Constraint(e) => e.fmt(f),
            OutputsRequireResolution => write!(
                f,
                "outputs of a contract upgrade are only available after resolution"
            ),
        }
    }
}

impl Error for UpgradeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            UpgradeError::Malformed(e) => Some(e),
            UpgradeError::Resolution(e) => Some(e),
            UpgradeError::ContractCreation { cause, .. } => Some(cause.as_ref()),
            UpgradeError::UpgradeFailed { cause, .. } => Some(cause.as_ref()),
            UpgradeError::Constraint(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MalformedTransaction> for UpgradeError {
    fn from(err: MalformedTransaction) -> UpgradeError {
        UpgradeError::Malformed(err)
    }
}

impl From<ResolutionError> for UpgradeError {
    fn from(err: ResolutionError) -> UpgradeError {
        UpgradeError::Resolution(err)
    }
}

impl From<ConstraintError> for UpgradeError {
    fn from(err: ConstraintError) -> UpgradeError {
        UpgradeError::Constraint(err)
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum BuildError {
    Malformed(MalformedTransaction),
    Resolution(ResolutionError),
    Constraint(ConstraintError),
    Ledger(LedgerTransactionError),
    Verification(VerificationFailure),
    Signing(SigningError),
    /// No trusted attachment could be found for the contract of these states.
    MissingContractAttachments {
        states: Vec<TransactionState>,
        contract: Option<ContractClassName>,
    },
    MultipleExplicitAttachments {
        contract: ContractClassName,
        first: AttachmentId,
        second: AttachmentId,
    },
    ExplicitAttachmentConflict {
        contract: ContractClassName,
        explicit: AttachmentId,
        pinned: AttachmentId,
    },
    NotaryMismatch {
        expected: Option<String>,
        found: String,
    },
    ReferencesUseMultipleNotaries {
        first: String,
        second: String,
    },
    NoNotary,
    NoCurrentParameters,
    PlatformVersionTooLow {
        feature: &'static str,
        required: u32,
        actual: u32,
    },
}

impl Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use BuildError::*;
        match self {
            Malformed(e) => e.fmt(f),
            Resolution(e) => e.fmt(f),
            Constraint(e) => e.fmt(f),
            Ledger(e) => e.fmt(f),
            Verification(e) => e.fmt(f),
            Signing(e) => e.fmt(f),
            MissingContractAttachments {
                states,
                contract: Some(contract),
            } => write!(
                f,
                "cannot find a trusted contract attachment for {contract} ({} states affected)",
                states.len()
            ),
            MissingContractAttachments {
                states,
                contract: None,
            } => {
                let contracts = states
                    .iter()
                    .map(|s| s.contract.as_str())
                    .collect::<BTreeSet<_>>();
                write!(
                    f,
                    "cannot find trusted contract attachments for {contracts:?}"
                )
            }
            MultipleExplicitAttachments {
                contract,
                first,
                second,
            } => write!(
                f,
                "more than one explicit attachment provides contract {contract}: {first} and {second}"
            ),
            ExplicitAttachmentConflict {
                contract,
                explicit,
                pinned,
            } => write!(
                f,
                "explicit attachment {explicit} for contract {contract} conflicts with hash constraint on {pinned}"
            ),
            NotaryMismatch {
                expected: Some(expected),
                found,
            } => write!(
                f,
                "input state requires notary {found}, which does not match the transaction notary {expected}"
            ),
            NotaryMismatch {
                expected: None,
                found,
            } => write!(
                f,
                "input state requires notary {found}, but the transaction has no notary"
            ),
            ReferencesUseMultipleNotaries { first, second } => write!(
                f,
                "all reference states must use the same notary; found {first} and {second}"
            ),
            NoNotary => write!(f, "transaction builder has no notary"),
            NoCurrentParameters => write!(f, "no current network parameters are available"),
            PlatformVersionTooLow {
                feature,
                required,
                actual,
            } => write!(
                f,
                "{feature} require a minimum platform version of {required}, but the network is at {actual}"
            ),
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BuildError::Malformed(e) => Some(e),
            BuildError::Resolution(e) => Some(e),
            BuildError::Constraint(e) => Some(e),
            BuildError::Ledger(e) => Some(e),
            BuildError::Verification(e) => Some(e),
            BuildError::Signing(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MalformedTransaction> for BuildError {
    fn from(err: MalformedTransaction) -> BuildError {
        BuildError::Malformed(err)
    }
}

impl From<ResolutionError> for BuildError {
    fn from(err: ResolutionError) -> BuildError {
        BuildError::Resolution(err)
    }
}

impl From<ConstraintError> for BuildError {
    fn from(err: ConstraintError) -> BuildError {
        BuildError::Constraint(err)
    }
}

impl From<LedgerTransactionError> for BuildError {
    fn from(err: LedgerTransactionError) -> BuildError {
        BuildError::Ledger(err)
    }
}

impl From<VerificationFailure> for BuildError {
    fn from(err: VerificationFailure) -> BuildError {
        BuildError::Verification(err)
    }
}

impl From<SigningError> for BuildError {
    fn from(err: SigningError) -> BuildError {
        BuildError::Signing(err)
    }
}
