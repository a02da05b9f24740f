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


//! The value types transactions are built from: state references, parties,
//! contract states, commands and time windows.

use crate::constraints::AttachmentConstraint;
use crate::error::MalformedTransaction;
use base_crypto::hash::{HASH_BYTES, SecureHash};
use base_crypto::signatures::VerifyingKey;
use base_crypto::time::{Duration, Timestamp};
use const_hex::ToHexExt;
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};
use serialize::{Deserializable, Serializable, Tagged};
use std::borrow::Cow;
use std::fmt::{self, Debug, Display, Formatter};
use std::io::{self, Read, Write};

/// Identifies an attachment by the hash of its contents.
pub type AttachmentId = SecureHash;

/// The fully qualified name of a contract class, e.g. `com.example.Cash`.
pub type ContractClassName = String;

/// Per-transaction salt blinding every component commitment.
///
/// The all-zero salt is rejected: it would make component nonces guessable.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct PrivacySalt([u8; HASH_BYTES]);

impl PrivacySalt {
    pub fn from_bytes(bytes: [u8; HASH_BYTES]) -> Result<Self, MalformedTransaction> {
        if bytes.iter().all(|b| *b == 0) {
            return Err(MalformedTransaction::ZeroPrivacySalt);
        }
        Ok(PrivacySalt(bytes))
    }

    pub fn sample<R: Rng + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let bytes: [u8; HASH_BYTES] = rng.r#gen();
            if let Ok(salt) = PrivacySalt::from_bytes(bytes) {
                return salt;
            }
        }
    }

    pub fn random() -> Self {
        Self::sample(&mut rand::rngs::OsRng)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_BYTES] {
        &self.0
    }
}

impl Debug for PrivacySalt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PrivacySalt({})", self.0.encode_hex())
    }
}

impl Tagged for PrivacySalt {
    fn tag() -> Cow<'static, str> {
        Cow::Borrowed("privacy-salt[v1]")
    }
    fn tag_unique_factor() -> String {
        <[u8; HASH_BYTES]>::tag().into_owned()
    }
}

impl Serializable for PrivacySalt {
    fn serialize(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&self.0)
    }
    fn serialized_size(&self) -> usize {
        HASH_BYTES
    }
}

impl Deserializable for PrivacySalt {
    fn deserialize(reader: &mut impl Read, recursion_depth: u32) -> io::Result<Self> {
        let bytes = <[u8; HASH_BYTES] as Deserializable>::deserialize(reader, recursion_depth)?;
        PrivacySalt::from_bytes(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

/// Points at output `index` of the transaction with id `txhash`.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serializable, Serialize, Deserialize,
)]
#[tag = "state-ref[v1]"]
pub struct StateRef {
    pub txhash: SecureHash,
    pub index: u32,
}

impl StateRef {
    pub fn new(txhash: SecureHash, index: u32) -> Self {
        StateRef { txhash, index }
    }
}

impl Display for StateRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.txhash, self.index)
    }
}

/// A well-known identity: a legal name bound to a key.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serializable, Serialize, Deserialize,
)]
#[tag = "party[v1]"]
pub struct Party {
    pub name: String,
    pub owning_key: VerifyingKey,
}

impl Party {
    pub fn new(name: impl Into<String>, owning_key: VerifyingKey) -> Self {
        Party {
            name: name.into(),
            owning_key,
        }
    }
}

impl Display for Party {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A participant in a state, either named or known only by key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serializable)]
#[tag = "abstract-party[v1]"]
pub enum AbstractParty {
    Named(Party),
    Anonymous(VerifyingKey),
}

impl AbstractParty {
    pub fn owning_key(&self) -> &VerifyingKey {
        match self {
            AbstractParty::Named(party) => &party.owning_key,
            AbstractParty::Anonymous(key) => key,
        }
    }
}

impl From<Party> for AbstractParty {
    fn from(party: Party) -> Self {
        AbstractParty::Named(party)
    }
}

/// The stable identity of a linear state across its evolutions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serializable)]
#[tag = "unique-identifier[v1]"]
pub struct UniqueIdentifier {
    pub external_id: Option<String>,
    pub id: [u8; 16],
}

impl UniqueIdentifier {
    pub fn random() -> Self {
        UniqueIdentifier {
            external_id: None,
            id: *uuid::Uuid::new_v4().as_bytes(),
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

impl Display for UniqueIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let id = uuid::Uuid::from_bytes(self.id);
        match &self.external_id {
            Some(external) => write!(f, "{external}_{id}"),
            None => write!(f, "{id}"),
        }
    }
}

/// A reference from one state to another, resolved while building a
/// transaction into an additional reference input.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serializable)]
#[tag = "state-pointer[v1]"]
pub enum StatePointer {
    /// Points at one specific state.
    Static { pointer: StateRef, resolve: bool },
    /// Points at whatever the current version of a linear state is.
    Linear {
        pointer: UniqueIdentifier,
        resolve: bool,
    },
}

impl StatePointer {
    pub fn to_static(pointer: StateRef) -> Self {
        StatePointer::Static {
            pointer,
            resolve: true,
        }
    }

    pub fn to_linear(pointer: UniqueIdentifier) -> Self {
        StatePointer::Linear {
            pointer,
            resolve: true,
        }
    }

    /// Whether the pointee should be added to the transaction as a reference.
    pub fn is_resolved(&self) -> bool {
        match self {
            StatePointer::Static { resolve, .. } | StatePointer::Linear { resolve, .. } => *resolve,
        }
    }
}

impl Display for StatePointer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StatePointer::Static { pointer, .. } => write!(f, "static pointer to {pointer}"),
            StatePointer::Linear { pointer, .. } => write!(f, "linear pointer to {pointer}"),
        }
    }
}

/// The contract-specific payload of a state.
///
/// The payload itself is opaque here; contracts interpret `data` according to
/// `type_name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serializable)]
#[tag = "contract-state[v1]"]
pub struct ContractState {
    pub type_name: String,
    pub participants: Vec<AbstractParty>,
    pub data: Vec<u8>,
    pub pointers: Vec<StatePointer>,
    pub linear_id: Option<UniqueIdentifier>,
}

impl ContractState {
    pub fn new(type_name: impl Into<String>, participants: Vec<AbstractParty>, data: Vec<u8>) -> Self {
        ContractState {
            type_name: type_name.into(),
            participants,
            data,
            pointers: Vec::new(),
            linear_id: None,
        }
    }

    pub fn with_pointer(mut self, pointer: StatePointer) -> Self {
        self.pointers.push(pointer);
        self
    }

    pub fn with_linear_id(mut self, linear_id: UniqueIdentifier) -> Self {
        self.linear_id = Some(linear_id);
        self
    }
}

/// A state together with the contract governing it, its notary and the
/// constraint restricting which contract code may verify it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serializable)]
#[tag = "transaction-state[v1]"]
pub struct TransactionState {
    pub data: ContractState,
    pub contract: ContractClassName,
    pub notary: Party,
    /// Index of the output that must be consumed alongside this one.
    pub encumbrance: Option<u32>,
    pub constraint: AttachmentConstraint,
}

impl TransactionState {
    /// A state whose constraint is left for the builder to choose.
    pub fn new(data: ContractState, contract: impl Into<ContractClassName>, notary: Party) -> Self {
        TransactionState {
            data,
            contract: contract.into(),
            notary,
            encumbrance: None,
            constraint: AttachmentConstraint::AutomaticPlaceholder,
        }
    }

    pub fn with_constraint(mut self, constraint: AttachmentConstraint) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn with_encumbrance(mut self, encumbrance: u32) -> Self {
        self.encumbrance = Some(encumbrance);
        self
    }

    pub fn with_notary(mut self, notary: Party) -> Self {
        self.notary = notary;
        self
    }
}

/// A resolved state and the reference it was loaded from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StateAndRef {
    pub state: TransactionState,
    pub state_ref: StateRef,
}

impl StateAndRef {
    pub fn new(state: TransactionState, state_ref: StateRef) -> Self {
        StateAndRef { state, state_ref }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serializable)]
#[tag = "command-data[v1]"]
pub struct CommandData {
    pub type_name: String,
    pub payload: Vec<u8>,
}

impl CommandData {
    pub fn new(type_name: impl Into<String>, payload: Vec<u8>) -> Self {
        CommandData {
            type_name: type_name.into(),
            payload,
        }
    }
}

/// A command and the keys required to sign for it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Command {
    pub data: CommandData,
    pub signers: Vec<VerifyingKey>,
}

impl Command {
    pub fn new(data: CommandData, signers: Vec<VerifyingKey>) -> Self {
        Command { data, signers }
    }
}

/// The interval a transaction is valid in, as attested by the notary.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serializable)]
#[tag = "time-window[v1]"]
pub struct TimeWindow {
    pub from_time: Option<Timestamp>,
    pub until_time: Option<Timestamp>,
}

impl TimeWindow {
    pub fn between(from_time: Timestamp, until_time: Timestamp) -> Result<Self, MalformedTransaction> {
        if from_time >= until_time {
            return Err(MalformedTransaction::InvalidTimeWindow {
                from_time,
                until_time,
            });
        }
        Ok(TimeWindow {
            from_time: Some(from_time),
            until_time: Some(until_time),
        })
    }

    pub fn from_only(from_time: Timestamp) -> Self {
        TimeWindow {
            from_time: Some(from_time),
            until_time: None,
        }
    }

    pub fn until_only(until_time: Timestamp) -> Self {
        TimeWindow {
            from_time: None,
            until_time: Some(until_time),
        }
    }

    /// The window of width `2 * tolerance` centred on `time`.
    pub fn with_tolerance(time: Timestamp, tolerance: Duration) -> Result<Self, MalformedTransaction> {
        Self::between(time - tolerance, time + tolerance)
    }

    pub fn midpoint(&self) -> Option<Timestamp> {
        match (self.from_time, self.until_time) {
            (Some(from), Some(until)) => Some(from + (until - from).halved()),
            _ => None,
        }
    }

    pub fn contains(&self, time: Timestamp) -> bool {
        self.from_time.is_none_or(|from| time >= from)
            && self.until_time.is_none_or(|until| time < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn zero_salt_is_rejected() {
        assert!(PrivacySalt::from_bytes([0u8; HASH_BYTES]).is_err());
        assert!(serialize::from_bytes::<PrivacySalt>(&[0u8; HASH_BYTES]).is_err());
        let mut rng = StdRng::seed_from_u64(0x42);
        let salt = PrivacySalt::sample(&mut rng);
        assert_eq!(serialize::from_bytes::<PrivacySalt>(&serialize::to_bytes(&salt)).unwrap(), salt);
    }

    #[test]
    fn time_window_bounds() {
        let window = TimeWindow::between(Timestamp::from_secs(10), Timestamp::from_secs(20)).unwrap();
        assert!(window.contains(Timestamp::from_secs(10)));
        assert!(!window.contains(Timestamp::from_secs(20)));
        assert_eq!(window.midpoint(), Some(Timestamp::from_secs(15)));
        assert!(TimeWindow::between(Timestamp::from_secs(20), Timestamp::from_secs(20)).is_err());
        assert!(TimeWindow::until_only(Timestamp::from_secs(5)).contains(Timestamp::from_secs(0)));
    }

    #[test]
    fn tolerance_window_is_centred() {
        let window =
            TimeWindow::with_tolerance(Timestamp::from_secs(100), Duration::from_secs(30)).unwrap();
        assert_eq!(window.from_time, Some(Timestamp::from_secs(70)));
        assert_eq!(window.until_time, Some(Timestamp::from_secs(130)));
    }
}
