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


use crate::error::{MalformedTransaction, SignatureError};
use crate::wire::WireTransaction;
use base_crypto::hash::SecureHash;
use base_crypto::signatures::{Signature, SigningKey, VerifyingKey};
use rand::{CryptoRng, Rng};
use serialize::{Deserializable, Serializable, Tagged};
use std::collections::BTreeSet;

/// Identifies BIP340 Schnorr signatures over secp256k1.
pub const SCHNORR_SECP256K1_SCHEME_ID: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serializable)]
#[tag = "signature-metadata[v1]"]
pub struct SignatureMetadata {
    pub platform_version: u32,
    pub scheme_id: u32,
}

impl SignatureMetadata {
    pub fn new(platform_version: u32) -> Self {
        SignatureMetadata {
            platform_version,
            scheme_id: SCHNORR_SECP256K1_SCHEME_ID,
        }
    }
}

/// What a transaction signature actually covers: the id, bound to the
/// metadata of the signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serializable)]
#[tag = "signable-data[v1]"]
pub struct SignableData {
    pub tx_id: SecureHash,
    pub metadata: SignatureMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serializable)]
#[tag = "transaction-signature[v1]"]
pub struct TransactionSignature {
    pub by: VerifyingKey,
    pub signature: Signature,
    pub metadata: SignatureMetadata,
}

impl TransactionSignature {
    pub fn sign<R: Rng + CryptoRng>(key: &SigningKey, rng: &mut R, data: &SignableData) -> Self {
        TransactionSignature {
            by: key.verifying_key(),
            signature: key.sign(rng, &serialize::to_bytes(data)),
            metadata: data.metadata,
        }
    }

    pub fn verify(&self, tx_id: &SecureHash) -> Result<(), SignatureError> {
        let data = SignableData {
            tx_id: *tx_id,
            metadata: self.metadata,
        };
        if !self.by.verify(&serialize::to_bytes(&data), &self.signature) {
            return Err(SignatureError::InvalidSignature(self.by.clone()));
        }
        Ok(())
    }
}

/// A wire transaction with the signatures collected over it so far.
#[derive(Clone, Debug, PartialEq, Eq, Serializable)]
#[tag = "signed-transaction[v1]"]
pub struct SignedTransaction {
    pub tx: WireTransaction,
    pub sigs: Vec<TransactionSignature>,
}

impl SignedTransaction {
    pub fn new(tx: WireTransaction, sigs: Vec<TransactionSignature>) -> Self {
        SignedTransaction { tx, sigs }
    }

    pub fn id(&self) -> SecureHash {
        self.tx.id()
    }

    pub fn with_additional_signature(mut self, sig: TransactionSignature) -> Self {
        self.sigs.push(sig);
        self
    }

    /// Required signing keys that have not signed yet.
    pub fn missing_signers(&self) -> Result<BTreeSet<VerifyingKey>, MalformedTransaction> {
        let signed = self.sigs.iter().map(|sig| &sig.by).collect::<BTreeSet<_>>();
        Ok(self
            .tx
            .required_signing_keys()?
            .into_iter()
            .filter(|key| !signed.contains(key))
            .collect())
    }

    /// Checks every attached signature is valid, and that all required
    /// signatures other than those from `allowed_to_be_missing` are present.
    pub fn verify_signatures_except(
        &self,
        allowed_to_be_missing: &BTreeSet<VerifyingKey>,
    ) -> Result<(), SignatureError> {
        let id = self.id();
        for sig in &self.sigs {
            sig.verify(&id)?;
        }
        let missing = self
            .missing_signers()?
            .into_iter()
            .filter(|key| !allowed_to_be_missing.contains(key))
            .collect::<BTreeSet<_>>();
        if !missing.is_empty() {
            return Err(SignatureError::MissingSignatures(missing));
        }
        Ok(())
    }

    pub fn verify_required_signatures(&self) -> Result<(), SignatureError> {
        self.verify_signatures_except(&BTreeSet::new())
    }
}
