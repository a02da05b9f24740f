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

//! Signature scheme for transaction and command signers.
//!
//! Schnorr over secp256k1, conforming to BIP340.
use const_hex::ToHexExt;
use k256::schnorr;
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};
use serialize::{Deserializable, Serializable, Tagged};
use signature::{RandomizedSigner, Verifier};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;
use std::io::{self, Read, Write};

macro_rules! derive_via_to_bytes {
    ($ty:ty) => {
        impl Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                state.write(&self.0.to_bytes()[..]);
            }
        }

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &$ty) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $ty {
            fn cmp(&self, other: &$ty) -> Ordering {
                self.0.to_bytes().cmp(&other.0.to_bytes())
            }
        }
    };
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A verifying public key
pub struct VerifyingKey(schnorr::VerifyingKey);
derive_via_to_bytes!(VerifyingKey);

/// The encoded length of a [`VerifyingKey`]. BIP340 encodes points as a field element.
pub const VERIFYING_KEY_BYTES: usize = 32;

impl VerifyingKey {
    /// Verifies if a signature is correct
    pub fn verify(&self, msg: &[u8], signature: &Signature) -> bool {
        self.0.verify(msg, &signature.0).is_ok()
    }

    /// The x-only encoding of the key.
    pub fn to_bytes(&self) -> [u8; VERIFYING_KEY_BYTES] {
        self.0.to_bytes().into()
    }

    /// Parses an x-only encoded key.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        schnorr::VerifyingKey::from_bytes(bytes)
            .map(VerifyingKey)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Malformed Schnorr verifying key"))
    }
}

impl Debug for VerifyingKey {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "VerifyingKey({})", self)
    }
}

impl Display for VerifyingKey {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "{}", &self.to_bytes().encode_hex()[..16])
    }
}

impl Tagged for VerifyingKey {
    fn tag() -> Cow<'static, str> {
        Cow::Borrowed("signature-verifying-key[v1]")
    }
    fn tag_unique_factor() -> String {
        "signature-verifying-key[v1]".into()
    }
}

impl Serializable for VerifyingKey {
    fn serialize(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    fn serialized_size(&self) -> usize {
        VERIFYING_KEY_BYTES
    }
}

impl Deserializable for VerifyingKey {
    fn deserialize(reader: &mut impl Read, _recursion_depth: u32) -> io::Result<Self> {
        let mut bytes = [0u8; VERIFYING_KEY_BYTES];
        reader.read_exact(&mut bytes)?;
        VerifyingKey::from_bytes(&bytes)
    }
}

#[derive(Clone)]
/// A signing secret key
pub struct SigningKey(schnorr::SigningKey);

impl SigningKey {
    /// Samples a new secret key from secure randomness
    pub fn sample<R: Rng + CryptoRng>(mut rng: R) -> Self {
        SigningKey(schnorr::SigningKey::random(&mut rng))
    }

    /// Returns the corresponding verifying public key
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(*self.0.verifying_key())
    }

    /// Signs a message
    pub fn sign<R: Rng + CryptoRng>(&self, rng: &mut R, msg: &[u8]) -> Signature {
        Signature(self.0.sign_with_rng(rng, msg))
    }

    /// Parse signing key from big endian-encoded bytes
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        schnorr::SigningKey::from_bytes(bytes)
            .map(SigningKey)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Malformed Schnorr signing key"))
    }
}

impl Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<secret key>")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A Schnorr signature
pub struct Signature(schnorr::Signature);
derive_via_to_bytes!(Signature);

impl Tagged for Signature {
    fn tag() -> Cow<'static, str> {
        Cow::Borrowed("signature[v1]")
    }
    fn tag_unique_factor() -> String {
        "signature[v1]".into()
    }
}

impl Serializable for Signature {
    fn serialize(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&self.0.to_bytes())
    }

    fn serialized_size(&self) -> usize {
        schnorr::Signature::BYTE_SIZE
    }
}

impl Deserializable for Signature {
    fn deserialize(reader: &mut impl Read, _recursion_depth: u32) -> io::Result<Self> {
        let mut bytes = [0u8; schnorr::Signature::BYTE_SIZE];
        reader.read_exact(&mut bytes)?;
        Ok(Signature(schnorr::Signature::try_from(&bytes[..]).map_err(
            |_| io::Error::new(io::ErrorKind::InvalidData, "Malformed Schnorr signature"),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn sign_and_verify() {
        let mut rng = StdRng::seed_from_u64(0x42);
        let key = SigningKey::sample(&mut rng);
        let sig = key.sign(&mut rng, b"transaction id");
        assert!(key.verifying_key().verify(b"transaction id", &sig));
        assert!(!key.verifying_key().verify(b"another id", &sig));
    }

    #[test]
    fn keys_survive_the_codec() {
        let mut rng = StdRng::seed_from_u64(0x42);
        let key = SigningKey::sample(&mut rng).verifying_key();
        let bytes = serialize::to_bytes(&key);
        assert_eq!(bytes.len(), VERIFYING_KEY_BYTES);
        assert_eq!(serialize::from_bytes::<VerifyingKey>(&bytes).unwrap(), key);
    }

    #[test]
    fn keys_order_by_encoding() {
        let mut rng = StdRng::seed_from_u64(0x42);
        let a = SigningKey::sample(&mut rng).verifying_key();
        let b = SigningKey::sample(&mut rng).verifying_key();
        assert_eq!(a.cmp(&b), a.to_bytes().cmp(&b.to_bytes()));
    }
}
