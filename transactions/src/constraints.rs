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


//! Attachment constraints restrict which contract code may verify a state.
//!
//! When a state is consumed and re-created, the constraint of the new state
//! is derived from the constraints of the consumed ones. The permitted moves
//! form a small lattice: `AlwaysAccept` is terminal, a hash pin wins over
//! everything else, and zone whitelisting can be upgraded to a signature
//! constraint once the network supports it.

use crate::attachments::{Attachment, AttachmentWithContext};
use crate::error::ConstraintError;
use crate::structure::AttachmentId;
use base_crypto::signatures::VerifyingKey;
use serialize::{Deserializable, Serializable, Tagged};
use std::collections::BTreeSet;

/// Minimum platform version at which signed attachments move whitelisted
/// states to signature constraints.
pub const MIGRATE_ATTACHMENT_TO_SIGNATURE_CONSTRAINTS: u32 = 4;
/// Minimum platform version at which hash-pinned states may be migrated to
/// signature constraints.
pub const MIGRATE_HASH_TO_SIGNATURE_CONSTRAINTS: u32 = 4;
pub const MAX_NUMBER_OF_KEYS_IN_SIGNATURE_CONSTRAINT: usize = 20;

/// A non-empty set of keys that must all have signed an attachment.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serializable)]
#[tag = "signer-set[v1]"]
pub struct SignerSet(BTreeSet<VerifyingKey>);

impl SignerSet {
    pub fn new(keys: impl IntoIterator<Item = VerifyingKey>) -> Result<Self, ConstraintError> {
        let keys = keys.into_iter().collect::<BTreeSet<_>>();
        if keys.is_empty() {
            return Err(ConstraintError::EmptySignerSet);
        }
        Ok(SignerSet(keys))
    }

    pub fn keys(&self) -> &BTreeSet<VerifyingKey> {
        &self.0
    }

    pub fn is_fulfilled_by<'a>(&self, signers: impl IntoIterator<Item = &'a VerifyingKey>) -> bool {
        let signers = signers.into_iter().collect::<BTreeSet<_>>();
        self.0.iter().all(|key| signers.contains(key))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serializable)]
#[tag = "attachment-constraint[v1]"]
pub enum AttachmentConstraint {
    /// Any attachment is accepted. Cannot be transitioned away from.
    AlwaysAccept,
    /// Only the attachment with this id is accepted.
    Hash(AttachmentId),
    /// Any attachment the network whitelists for the contract is accepted.
    WhitelistedByZone,
    /// Any attachment signed by all of these keys is accepted.
    Signature(SignerSet),
    /// To be replaced by the builder with a concrete constraint.
    AutomaticPlaceholder,
    /// Legacy placeholder, treated as [`AttachmentConstraint::AutomaticPlaceholder`].
    AutomaticHash,
}

impl AttachmentConstraint {
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self,
            AttachmentConstraint::AutomaticPlaceholder | AttachmentConstraint::AutomaticHash
        )
    }

    /// A signature constraint requiring every key that signed `attachment`.
    pub fn signed_by(attachment: &Attachment) -> Result<Self, ConstraintError> {
        if !attachment.is_signed() {
            return Err(ConstraintError::SignatureWithUnsignedAttachment {
                attachment: attachment.id,
            });
        }
        Ok(AttachmentConstraint::Signature(SignerSet::new(
            attachment.signer_keys.iter().cloned(),
        )?))
    }

    pub fn is_satisfied_by(&self, attachment: &AttachmentWithContext<'_>) -> Result<bool, ConstraintError> {
        use AttachmentConstraint::*;
        Ok(match self {
            AlwaysAccept => true,
            Hash(id) => attachment.disable_hash_constraints || *id == attachment.attachment.id,
            WhitelistedByZone => attachment.is_whitelisted(),
            Signature(keys) => keys.is_fulfilled_by(&attachment.attachment.signer_keys),
            AutomaticPlaceholder | AutomaticHash => {
                return Err(ConstraintError::PlaceholderNotResolved(self.clone()));
            }
        })
    }

    /// Whether a state constrained by `input` may be re-created with this
    /// constraint, given the contract attachment the transaction will use.
    pub fn can_be_transitioned_from(
        &self,
        input: &AttachmentConstraint,
        attachment: &Attachment,
        disable_hash_constraints: bool,
    ) -> Result<bool, ConstraintError> {
        use AttachmentConstraint::*;
        for constraint in [input, self] {
            if constraint.is_placeholder() {
                return Err(ConstraintError::PlaceholderNotResolved(constraint.clone()));
            }
        }
        if input == self {
            return Ok(true);
        }
        Ok(match (input, self) {
            (AlwaysAccept, _) => false,
            (Hash(_), Hash(_)) => false,
            (_, Hash(_)) => true,
            (Signature(from), Signature(to)) => from.keys() == to.keys(),
            (Hash(_), Signature(_)) => disable_hash_constraints,
            (WhitelistedByZone, Signature(keys)) => {
                attachment.is_signed()
                    && attachment
                        .signer_keys
                        .iter()
                        .all(|signer| keys.keys().contains(signer))
            }
            _ => false,
        })
    }
}

#[derive(Default)]
struct InputMix<'a> {
    always_accept: bool,
    whitelisted: bool,
    hashes: Vec<&'a AttachmentConstraint>,
    signatures: Vec<&'a AttachmentConstraint>,
}

/// The output constraint for a contract whose inputs carry `constraints`,
/// given the attachment the transaction will run.
pub fn output_constraint_from_inputs(
    constraints: &BTreeSet<AttachmentConstraint>,
    attachment: &Attachment,
    minimum_platform_version: u32,
) -> Result<AttachmentConstraint, ConstraintError> {
    use AttachmentConstraint::*;
    if constraints.is_empty() {
        return Err(ConstraintError::NoInputConstraints);
    }
    let mut mix = InputMix::default();
    for constraint in constraints {
        match constraint {
            AlwaysAccept => mix.always_accept = true,
            Hash(_) => mix.hashes.push(constraint),
            WhitelistedByZone => mix.whitelisted = true,
            Signature(_) => mix.signatures.push(constraint),
            AutomaticPlaceholder | AutomaticHash => {
                return Err(ConstraintError::PlaceholderNotResolved(constraint.clone()));
            }
        }
    }
    let all = || constraints.iter().cloned().collect::<Vec<_>>();

    if mix.always_accept {
        return match constraints.len() {
            1 => Ok(AlwaysAccept),
            _ => Err(ConstraintError::AlwaysAcceptMixed),
        };
    }
    if mix.hashes.len() > 1 {
        return Err(ConstraintError::ConflictingHashConstraints(all()));
    }
    if let Some(hash) = mix.hashes.first() {
        return Ok((*hash).clone());
    }
    if mix.signatures.len() > 1 {
        return Err(ConstraintError::MultipleSignatureConstraints(all()));
    }
    if mix.whitelisted
        && attachment.is_signed()
        && minimum_platform_version >= MIGRATE_ATTACHMENT_TO_SIGNATURE_CONSTRAINTS
    {
        return match mix.signatures.first() {
            Some(signature) => Ok((*signature).clone()),
            None => AttachmentConstraint::signed_by(attachment),
        };
    }
    if !mix.signatures.is_empty() && !attachment.is_signed() {
        return Err(ConstraintError::SignatureWithUnsignedAttachment {
            attachment: attachment.id,
        });
    }
    if constraints.len() == 1 {
        if let Some(only) = constraints.first() {
            return Ok(only.clone());
        }
    }
    Err(ConstraintError::UnexpectedConstraints(all()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::Uploader;
    use base_crypto::hash::SecureHash;
    use base_crypto::signatures::SigningKey;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeMap;

    fn keys(n: usize) -> Vec<VerifyingKey> {
        let mut rng = StdRng::seed_from_u64(0x42);
        (0..n)
            .map(|_| SigningKey::sample(&mut rng).verifying_key())
            .collect()
    }

    fn attachment(name: &[u8]) -> Attachment {
        Attachment::new(SecureHash::sha256(name), 100, Uploader::App).providing("com.example.Cash")
    }

    fn set(cs: impl IntoIterator<Item = AttachmentConstraint>) -> BTreeSet<AttachmentConstraint> {
        cs.into_iter().collect()
    }

    #[test]
    fn single_hash_input_is_kept() {
        let att = attachment(b"a");
        let pinned = AttachmentConstraint::Hash(att.id);
        assert_eq!(output_constraint_from_inputs(&set([pinned.clone()]), &att, 4), Ok(pinned));
    }

    #[test]
    fn hash_wins_over_whitelist() {
        let att = attachment(b"a");
        let pinned = AttachmentConstraint::Hash(att.id);
        let inputs = set([pinned.clone(), AttachmentConstraint::WhitelistedByZone]);
        assert_eq!(output_constraint_from_inputs(&inputs, &att, 4), Ok(pinned));
    }

    #[test]
    fn distinct_hashes_conflict() {
        let att = attachment(b"a");
        let inputs = set([
            AttachmentConstraint::Hash(SecureHash::sha256(b"x")),
            AttachmentConstraint::Hash(SecureHash::sha256(b"y")),
        ]);
        assert!(matches!(
            output_constraint_from_inputs(&inputs, &att, 4),
            Err(ConstraintError::ConflictingHashConstraints(_))
        ));
        let with_whitelist = set([
            AttachmentConstraint::Hash(SecureHash::sha256(b"x")),
            AttachmentConstraint::Hash(SecureHash::sha256(b"y")),
            AttachmentConstraint::WhitelistedByZone,
        ]);
        assert!(matches!(
            output_constraint_from_inputs(&with_whitelist, &att, 4),
            Err(ConstraintError::ConflictingHashConstraints(_))
        ));
    }

    #[test]
    fn always_accept_does_not_mix() {
        let att = attachment(b"a");
        assert_eq!(
            output_constraint_from_inputs(&set([AttachmentConstraint::AlwaysAccept]), &att, 4),
            Ok(AttachmentConstraint::AlwaysAccept)
        );
        let mixed = set([AttachmentConstraint::AlwaysAccept, AttachmentConstraint::WhitelistedByZone]);
        assert_eq!(
            output_constraint_from_inputs(&mixed, &att, 4),
            Err(ConstraintError::AlwaysAcceptMixed)
        );
    }

    #[test]
    fn whitelist_migrates_to_signature_for_signed_attachment() {
        let keys = keys(2);
        let att = attachment(b"a").signed_by(keys.clone());
        let expected = AttachmentConstraint::Signature(SignerSet::new(keys).unwrap());
        let inputs = set([AttachmentConstraint::WhitelistedByZone]);
        assert_eq!(output_constraint_from_inputs(&inputs, &att, 4), Ok(expected));
        // Below the migration platform version the whitelist stays.
        assert_eq!(
            output_constraint_from_inputs(&inputs, &att, 3),
            Ok(AttachmentConstraint::WhitelistedByZone)
        );
    }

    #[test]
    fn whitelist_and_signature_keep_the_signature() {
        let keys = keys(1);
        let att = attachment(b"a").signed_by(keys.clone());
        let signature = AttachmentConstraint::Signature(SignerSet::new(keys).unwrap());
        let inputs = set([AttachmentConstraint::WhitelistedByZone, signature.clone()]);
        assert_eq!(output_constraint_from_inputs(&inputs, &att, 4), Ok(signature));
    }

    #[test]
    fn signature_requires_signed_attachment() {
        let signature = AttachmentConstraint::Signature(SignerSet::new(keys(1)).unwrap());
        let att = attachment(b"a");
        assert!(matches!(
            output_constraint_from_inputs(&set([signature]), &att, 4),
            Err(ConstraintError::SignatureWithUnsignedAttachment { .. })
        ));
    }

    #[test]
    fn different_signers_conflict() {
        let keys = keys(2);
        let att = attachment(b"a").signed_by(keys.clone());
        let inputs = set([
            AttachmentConstraint::Signature(SignerSet::new([keys[0].clone()]).unwrap()),
            AttachmentConstraint::Signature(SignerSet::new([keys[1].clone()]).unwrap()),
        ]);
        assert!(matches!(
            output_constraint_from_inputs(&inputs, &att, 4),
            Err(ConstraintError::MultipleSignatureConstraints(_))
        ));
    }

    #[test]
    fn empty_input_set_is_an_error() {
        assert_eq!(
            output_constraint_from_inputs(&BTreeSet::new(), &attachment(b"a"), 4),
            Err(ConstraintError::NoInputConstraints)
        );
    }

    #[test]
    fn transitions() {
        let keys = keys(2);
        let signed = attachment(b"a").signed_by(keys.clone());
        let sig = AttachmentConstraint::Signature(SignerSet::new(keys.clone()).unwrap());
        let partial = AttachmentConstraint::Signature(SignerSet::new([keys[0].clone()]).unwrap());
        let hash = AttachmentConstraint::Hash(signed.id);
        let other_hash = AttachmentConstraint::Hash(SecureHash::sha256(b"other"));
        let wl = AttachmentConstraint::WhitelistedByZone;

        assert_eq!(hash.can_be_transitioned_from(&hash, &signed, false), Ok(true));
        assert_eq!(other_hash.can_be_transitioned_from(&hash, &signed, false), Ok(false));
        assert_eq!(hash.can_be_transitioned_from(&wl, &signed, false), Ok(true));
        assert_eq!(wl.can_be_transitioned_from(&AttachmentConstraint::AlwaysAccept, &signed, false), Ok(false));
        assert_eq!(sig.can_be_transitioned_from(&hash, &signed, false), Ok(false));
        assert_eq!(sig.can_be_transitioned_from(&hash, &signed, true), Ok(true));
        assert_eq!(sig.can_be_transitioned_from(&wl, &signed, false), Ok(true));
        assert_eq!(partial.can_be_transitioned_from(&wl, &signed, false), Ok(false));
        assert_eq!(partial.can_be_transitioned_from(&sig, &signed, false), Ok(false));
        assert!(
            sig.can_be_transitioned_from(&AttachmentConstraint::AutomaticPlaceholder, &signed, false)
                .is_err()
        );
    }

    #[test]
    fn satisfaction() {
        let keys = keys(1);
        let att = attachment(b"a").signed_by(keys.clone());
        let mut whitelist = BTreeMap::new();
        let ctx = AttachmentWithContext::new(&att, "com.example.Cash", &whitelist);
        assert_eq!(AttachmentConstraint::Hash(att.id).is_satisfied_by(&ctx), Ok(true));
        assert_eq!(
            AttachmentConstraint::Hash(SecureHash::sha256(b"b")).is_satisfied_by(&ctx),
            Ok(false)
        );
        assert_eq!(
            AttachmentConstraint::Hash(SecureHash::sha256(b"b"))
                .is_satisfied_by(&ctx.with_hash_constraints_disabled(true)),
            Ok(true)
        );
        assert_eq!(AttachmentConstraint::WhitelistedByZone.is_satisfied_by(&ctx), Ok(false));
        assert_eq!(
            AttachmentConstraint::Signature(SignerSet::new(keys).unwrap()).is_satisfied_by(&ctx),
            Ok(true)
        );
        assert!(AttachmentConstraint::AutomaticHash.is_satisfied_by(&ctx).is_err());

        whitelist.insert("com.example.Cash".to_owned(), vec![att.id]);
        let ctx = AttachmentWithContext::new(&att, "com.example.Cash", &whitelist);
        assert_eq!(AttachmentConstraint::WhitelistedByZone.is_satisfied_by(&ctx), Ok(true));
    }
}
