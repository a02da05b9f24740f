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

//! Hashing and the component-commitment digest rules.
//!
//! Every transaction component is committed to through a [`DigestService`]:
//! a per-component nonce derived from the transaction's privacy salt, then a
//! component hash over `(nonce, bytes)`. The default algorithm (SHA-256) uses
//! double hashing; other algorithms use single hashing with domain-separation
//! prefixes.

use const_hex::ToHexExt;
use serde::{Deserialize, Serialize};
use serialize::{Deserializable, Serializable, Tagged};
use sha2::{Digest, Sha256, Sha512_256};
use std::fmt::{self, Debug, Display, Formatter};
use std::io;
use std::str::FromStr;

/// The number of bytes of every supported digest.
pub const HASH_BYTES: usize = 32;

/// Domain separator for nonces in generic (non SHA-256) mode.
pub const NONCE_SUFFIX: &str = "COMPONENT_NONCE";
/// Domain separator for component hashes in generic (non SHA-256) mode.
pub const COMPONENT_SUFFIX: &str = "COMPONENT_HASH";

/// Hash algorithms a transaction may be committed with.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serializable,
    Serialize,
    Deserialize,
)]
#[tag = "hash-algorithm[v1]"]
pub enum HashAlgorithm {
    /// SHA-256, the default; selects the combined nonce mode.
    #[default]
    Sha256,
    /// SHA-512 truncated to 256 bits.
    Sha512_256,
}

impl HashAlgorithm {
    /// The canonical algorithm name, also used as a domain-separation prefix.
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha512_256 => "SHA-512/256",
        }
    }

    fn digest(self, data: &[u8]) -> [u8; HASH_BYTES] {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(data).into(),
            HashAlgorithm::Sha512_256 => Sha512_256::digest(data).into(),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHA-256" => Ok(HashAlgorithm::Sha256),
            "SHA-512/256" => Ok(HashAlgorithm::Sha512_256),
            other => Err(HashParseError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// A digest tagged with the algorithm that produced it.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serializable, Serialize, Deserialize)]
#[tag = "secure-hash[v1]"]
pub struct SecureHash {
    algorithm: HashAlgorithm,
    bytes: [u8; HASH_BYTES],
}

impl SecureHash {
    /// Wraps raw digest bytes.
    pub const fn new(algorithm: HashAlgorithm, bytes: [u8; HASH_BYTES]) -> Self {
        SecureHash { algorithm, bytes }
    }

    /// SHA-256 of `data`.
    pub fn sha256(data: &[u8]) -> Self {
        DigestService::SHA256.hash(data)
    }

    /// The algorithm this hash was produced with.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_BYTES] {
        &self.bytes
    }

    /// Hex encoding of the digest, without the algorithm prefix.
    pub fn to_hex(&self) -> String {
        self.bytes.encode_hex_upper()
    }
}

impl rand::distributions::Distribution<SecureHash> for rand::distributions::Standard {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> SecureHash {
        SecureHash::new(HashAlgorithm::Sha256, rng.r#gen())
    }
}

impl Display for SecureHash {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.algorithm {
            HashAlgorithm::Sha256 => write!(f, "{}", self.to_hex()),
            other => write!(f, "{}:{}", other.name(), self.to_hex()),
        }
    }
}

impl Debug for SecureHash {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for SecureHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, hex) = match s.rsplit_once(':') {
            Some((alg, hex)) => (alg.parse()?, hex),
            None => (HashAlgorithm::Sha256, s),
        };
        let bytes = const_hex::decode_to_array(hex).map_err(|_| HashParseError::InvalidHex)?;
        Ok(SecureHash::new(algorithm, bytes))
    }
}

/// Failure to parse a [`SecureHash`] or [`HashAlgorithm`] from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashParseError {
    /// The algorithm prefix is not supported.
    UnknownAlgorithm(String),
    /// The digest is not 32 bytes of hex.
    InvalidHex,
}

impl Display for HashParseError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            HashParseError::UnknownAlgorithm(alg) => write!(f, "unknown hash algorithm '{alg}'"),
            HashParseError::InvalidHex => write!(f, "expected {HASH_BYTES} hex-encoded bytes"),
        }
    }
}

impl std::error::Error for HashParseError {}

/// A writer object for streaming serialized data into a digest.
pub struct HashWriter(HashWriterState);

enum HashWriterState {
    Sha256(Sha256),
    Sha512_256(Sha512_256),
}

impl HashWriter {
    /// Initializes a blank hasher for `algorithm`.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        HashWriter(match algorithm {
            HashAlgorithm::Sha256 => HashWriterState::Sha256(Sha256::new()),
            HashAlgorithm::Sha512_256 => HashWriterState::Sha512_256(Sha512_256::new()),
        })
    }

    /// Feeds bytes into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.0 {
            HashWriterState::Sha256(h) => h.update(data),
            HashWriterState::Sha512_256(h) => h.update(data),
        }
    }

    /// Finalizes the hasher, and returns the result.
    pub fn finalize(self) -> SecureHash {
        match self.0 {
            HashWriterState::Sha256(h) => SecureHash::new(HashAlgorithm::Sha256, h.finalize().into()),
            HashWriterState::Sha512_256(h) => {
                SecureHash::new(HashAlgorithm::Sha512_256, h.finalize().into())
            }
        }
    }
}

impl io::Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The digest rules a transaction is committed under.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serializable, Serialize, Deserialize)]
#[tag = "digest-service[v1]"]
pub struct DigestService {
    /// The hash algorithm.
    pub algorithm: HashAlgorithm,
}

impl DigestService {
    /// SHA-256 digest rules.
    pub const SHA256: DigestService = DigestService {
        algorithm: HashAlgorithm::Sha256,
    };

    /// Digest rules for `algorithm`.
    pub const fn new(algorithm: HashAlgorithm) -> Self {
        DigestService { algorithm }
    }

    /// Whether nonces fold the component bytes in (SHA-256 only).
    pub fn uses_combined_nonces(&self) -> bool {
        self.algorithm == HashAlgorithm::Sha256
    }

    /// A single hash of `data`.
    pub fn hash(&self, data: &[u8]) -> SecureHash {
        SecureHash::new(self.algorithm, self.algorithm.digest(data))
    }

    /// `H(H(data))`.
    pub fn hash_twice(&self, data: &[u8]) -> SecureHash {
        let once = self.algorithm.digest(data);
        SecureHash::new(self.algorithm, self.algorithm.digest(&once))
    }

    /// Hashes a value's canonical serialization.
    pub fn hash_serializable<T: Serializable + ?Sized>(&self, value: &T) -> SecureHash {
        let mut writer = HashWriter::new(self.algorithm);
        // HashWriter never fails.
        let _ = value.serialize(&mut writer);
        writer.finalize()
    }

    /// The sentinel standing in for absent component groups.
    pub fn all_ones_hash(&self) -> SecureHash {
        SecureHash::new(self.algorithm, [0xff; HASH_BYTES])
    }

    /// The padding leaf for Merkle trees.
    pub fn zero_hash(&self) -> SecureHash {
        SecureHash::new(self.algorithm, [0x00; HASH_BYTES])
    }

    fn coordinates(group: u32, index: u32) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&group.to_be_bytes());
        out[4..].copy_from_slice(&index.to_be_bytes());
        out
    }

    /// The nonce for component `index` of group `group`, derived from `salt` alone.
    pub fn compute_nonce(&self, salt: &[u8], group: u32, index: u32) -> SecureHash {
        let coordinates = Self::coordinates(group, index);
        match self.algorithm {
            HashAlgorithm::Sha256 => self.hash_twice(&[salt, &coordinates[..]].concat()),
            alg => self.hash_twice(
                &[
                    alg.name().as_bytes(),
                    NONCE_SUFFIX.as_bytes(),
                    salt,
                    &coordinates[..],
                ]
                .concat(),
            ),
        }
    }

    /// The commitment to a component's bytes under `nonce`.
    pub fn component_hash(&self, nonce: &SecureHash, bytes: &[u8]) -> SecureHash {
        match self.algorithm {
            HashAlgorithm::Sha256 => self.hash_twice(&[&nonce.bytes[..], bytes].concat()),
            alg => self.hash_twice(
                &[
                    alg.name().as_bytes(),
                    COMPONENT_SUFFIX.as_bytes(),
                    &nonce.bytes[..],
                    bytes,
                ]
                .concat(),
            ),
        }
    }

    /// The combined-mode nonce: the component hash of `bytes` under the plain
    /// salt-derived nonce.
    pub fn salted_component_nonce(
        &self,
        bytes: &[u8],
        salt: &[u8],
        group: u32,
        index: u32,
    ) -> SecureHash {
        self.component_hash(&self.compute_nonce(salt, group, index), bytes)
    }

    /// An internal Merkle node over two children.
    pub fn node_hash(&self, left: &SecureHash, right: &SecureHash) -> SecureHash {
        self.hash(&[&left.bytes[..], &right.bytes[..]].concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: [u8; 32] = [7u8; 32];

    #[test]
    fn sentinels() {
        let d = DigestService::SHA256;
        assert_eq!(d.all_ones_hash().as_bytes(), &[0xff; 32]);
        assert_eq!(d.zero_hash().as_bytes(), &[0u8; 32]);
        assert_ne!(d.all_ones_hash(), d.zero_hash());
    }

    #[test]
    fn nonce_is_deterministic_and_coordinate_bound() {
        let d = DigestService::SHA256;
        assert_eq!(d.compute_nonce(&SALT, 1, 2), d.compute_nonce(&SALT, 1, 2));
        assert_ne!(d.compute_nonce(&SALT, 1, 2), d.compute_nonce(&SALT, 2, 1));
        assert_ne!(d.compute_nonce(&SALT, 0, 0), d.compute_nonce(&[8u8; 32], 0, 0));
    }

    #[test]
    fn sha256_nonce_is_double_hash_of_salt_and_coordinates() {
        let d = DigestService::SHA256;
        let mut preimage = SALT.to_vec();
        preimage.extend_from_slice(&3u32.to_be_bytes());
        preimage.extend_from_slice(&4u32.to_be_bytes());
        let once: [u8; 32] = Sha256::digest(&preimage).into();
        let twice: [u8; 32] = Sha256::digest(once).into();
        assert_eq!(d.compute_nonce(&SALT, 3, 4).as_bytes(), &twice);
    }

    #[test]
    fn generic_mode_is_domain_separated() {
        let sha = DigestService::SHA256;
        let other = DigestService::new(HashAlgorithm::Sha512_256);
        assert!(!other.uses_combined_nonces());
        let nonce = other.compute_nonce(&SALT, 0, 0);
        assert_eq!(nonce.algorithm(), HashAlgorithm::Sha512_256);
        assert_ne!(nonce.as_bytes(), sha.compute_nonce(&SALT, 0, 0).as_bytes());
        assert_ne!(
            other.component_hash(&nonce, b"abc"),
            other.hash_twice(&[&nonce.as_bytes()[..], b"abc"].concat())
        );
    }

    #[test]
    fn component_hash_depends_on_bytes() {
        let d = DigestService::SHA256;
        let nonce = d.compute_nonce(&SALT, 0, 0);
        assert_ne!(d.component_hash(&nonce, b"a"), d.component_hash(&nonce, b"b"));
    }

    #[test]
    fn hex_roundtrip() {
        let h = SecureHash::sha256(b"kestrel");
        assert_eq!(h.to_string().parse::<SecureHash>().unwrap(), h);
        let other = DigestService::new(HashAlgorithm::Sha512_256).hash(b"kestrel");
        assert!(other.to_string().starts_with("SHA-512/256:"));
        assert_eq!(other.to_string().parse::<SecureHash>().unwrap(), other);
        assert!("zz".parse::<SecureHash>().is_err());
    }

    #[test]
    fn streamed_hash_matches_direct_hash() {
        let d = DigestService::SHA256;
        let value = vec![1u32, 2, 3];
        assert_eq!(d.hash_serializable(&value), d.hash(&serialize::to_bytes(&value)));
    }

    #[test]
    fn json_roundtrip() {
        let digest = DigestService::new(HashAlgorithm::Sha512_256);
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(serde_json::from_str::<DigestService>(&json).unwrap(), digest);
        let h = digest.hash(b"kestrel");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(serde_json::from_str::<SecureHash>(&json).unwrap(), h);
    }
}
