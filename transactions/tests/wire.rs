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


use base_crypto::hash::{DigestService, HashAlgorithm, SecureHash};
use base_crypto::time::Timestamp;
use kestrel_transactions::commitment::transaction_id;
use kestrel_transactions::components::{ComponentGroup, ComponentGroupKind, TransactionComponents};
use kestrel_transactions::constraints::AttachmentConstraint;
use kestrel_transactions::error::{
    FilteredTransactionError, LedgerTransactionError, MalformedTransaction, SignatureError,
};
use kestrel_transactions::filtered::ComponentView;
use kestrel_transactions::ledger::{VerificationMode, transaction_size};
use kestrel_transactions::signed::{SignableData, SignatureMetadata, SignedTransaction, TransactionSignature};
use kestrel_transactions::structure::{
    Command, CommandData, PrivacySalt, StateRef, TimeWindow, TransactionState,
};
use kestrel_transactions::test_utilities::*;
use kestrel_transactions::wire::WireTransaction;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serialize::{tagged_deserialize, tagged_serialize};
use std::collections::BTreeSet;

fn salt(seed: u64) -> PrivacySalt {
    PrivacySalt::sample(&mut StdRng::seed_from_u64(seed))
}

fn output(size: usize) -> TransactionState {
    TransactionState::new(test_state(&ALICE, size), CASH_CONTRACT, NOTARY.clone())
        .with_constraint(AttachmentConstraint::AlwaysAccept)
}

fn components() -> TransactionComponents {
    TransactionComponents {
        inputs: vec![StateRef::new(SecureHash::sha256(b"previous"), 0)],
        outputs: vec![output(16), output(8)],
        commands: vec![
            Command::new(CommandData::new("Move", Vec::new()), vec![ALICE.owning_key.clone()]),
            Command::new(CommandData::new("Audit", vec![1]), vec![BOB.owning_key.clone()]),
        ],
        attachments: vec![attachment_id("cash-v1")],
        notary: Some(NOTARY.clone()),
        time_window: Some(TimeWindow::from_only(Timestamp::from_secs(1_000))),
        ..TransactionComponents::default()
    }
}

fn wire(components: &TransactionComponents) -> Result<WireTransaction, MalformedTransaction> {
    WireTransaction::from_components(components, salt(0x42), DigestService::SHA256)
}

#[test]
fn id_is_deterministic() {
    let a = wire(&components()).unwrap();
    let b = wire(&components()).unwrap();
    assert_eq!(a.id(), b.id());

    let resalted = WireTransaction::from_components(&components(), salt(0x43), DigestService::SHA256).unwrap();
    assert_ne!(a.id(), resalted.id());

    let rehashed = WireTransaction::from_components(
        &components(),
        salt(0x42),
        DigestService::new(HashAlgorithm::Sha512_256),
    )
    .unwrap();
    assert_ne!(a.id(), rehashed.id());
}

#[test]
fn id_is_the_root_over_group_roots() {
    let wtx = wire(&components()).unwrap();
    let commitments = wtx.commitments();
    assert_eq!(wtx.id(), commitments.id);
    assert_eq!(wtx.id(), transaction_id(wtx.digest(), &commitments.roots));
    assert!(!commitments.roots.contains_key(&ComponentGroupKind::References.index()));
    assert_eq!(commitments.hashes[&ComponentGroupKind::Outputs.index()].len(), 2);
}

#[test]
fn changing_a_component_changes_the_id() {
    let original = wire(&components()).unwrap();
    let mut changed = components();
    changed.outputs[1] = output(9);
    assert_ne!(original.id(), wire(&changed).unwrap().id());

    let mut reordered = components();
    reordered.outputs.reverse();
    assert_ne!(original.id(), wire(&reordered).unwrap().id());
}

#[test]
fn typed_views_decode_the_groups() {
    let wtx = wire(&components()).unwrap();
    let commands = wtx.commands().unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[1].signers, vec![BOB.owning_key.clone()]);
    assert_eq!(wtx.notary().unwrap(), Some(&*NOTARY));
    assert_eq!(wtx.outputs().unwrap().len(), 2);
    assert!(wtx.references().unwrap().is_empty());
    assert_eq!(wtx.network_parameters_hash().unwrap(), None);
    assert_eq!(
        wtx.required_signing_keys().unwrap(),
        [ALICE.owning_key.clone(), BOB.owning_key.clone(), NOTARY.owning_key.clone()]
            .into_iter()
            .collect::<BTreeSet<_>>()
    );
}

#[test]
fn notary_signs_only_when_notarising() {
    let mut issuance = components();
    issuance.inputs.clear();
    issuance.time_window = None;
    let wtx = wire(&issuance).unwrap();
    assert_eq!(wtx.notary().unwrap(), Some(&*NOTARY));
    assert_eq!(
        wtx.required_signing_keys().unwrap(),
        [ALICE.owning_key.clone(), BOB.owning_key.clone()]
            .into_iter()
            .collect::<BTreeSet<_>>()
    );

    let mut timed = issuance.clone();
    timed.time_window = Some(TimeWindow::from_only(Timestamp::from_secs(1_000)));
    assert!(wire(&timed).unwrap().required_signing_keys().unwrap().contains(&NOTARY.owning_key));

    let mut referencing = issuance;
    referencing.references = vec![StateRef::new(SecureHash::sha256(b"reference"), 0)];
    assert!(
        wire(&referencing)
            .unwrap()
            .required_signing_keys()
            .unwrap()
            .contains(&NOTARY.owning_key)
    );
}

#[test]
fn malformed_transactions_are_rejected() {
    let mut no_commands = components();
    no_commands.commands.clear();
    assert!(matches!(wire(&no_commands), Err(MalformedTransaction::NoCommands)));

    let mut no_notary = components();
    no_notary.notary = None;
    assert!(matches!(wire(&no_notary), Err(MalformedTransaction::MissingNotary)));

    let mut window_without_notary = components();
    window_without_notary.inputs.clear();
    window_without_notary.notary = None;
    assert!(matches!(
        wire(&window_without_notary),
        Err(MalformedTransaction::TimeWindowWithoutNotary)
    ));

    let mut duplicate = components();
    duplicate.inputs.push(duplicate.inputs[0]);
    assert!(matches!(wire(&duplicate), Err(MalformedTransaction::DuplicateInput(_))));

    let mut overlapping = components();
    overlapping.references = overlapping.inputs.clone();
    assert!(matches!(
        wire(&overlapping),
        Err(MalformedTransaction::InputsAndReferencesOverlap(_))
    ));

    let mut empty = components();
    empty.inputs.clear();
    empty.outputs.clear();
    assert!(matches!(wire(&empty), Err(MalformedTransaction::NoInputsOrOutputs)));

    let mut groups = components().to_component_groups();
    groups.push(ComponentGroup {
        group_index: ComponentGroupKind::References.index(),
        components: Vec::new(),
    });
    assert!(matches!(
        WireTransaction::new(groups, salt(0x42), DigestService::SHA256),
        Err(MalformedTransaction::EmptyComponentGroup { group_index: 7 })
    ));

    let mut groups = components().to_component_groups();
    groups.push(groups[0].clone());
    assert!(matches!(
        WireTransaction::new(groups, salt(0x42), DigestService::SHA256),
        Err(MalformedTransaction::DuplicateComponentGroup { group_index: 0 })
    ));
}

#[test]
fn mismatched_signers_are_rejected() {
    let mut groups = components().to_component_groups();
    let signers = groups
        .iter_mut()
        .find(|group| group.group_index == ComponentGroupKind::Signers.index())
        .unwrap();
    signers.components.pop();
    assert!(matches!(
        WireTransaction::new(groups, salt(0x42), DigestService::SHA256),
        Err(MalformedTransaction::CommandSignerMismatch { commands: 2, signers: 1 })
    ));
}

#[test]
fn zero_salt_is_rejected() {
    assert!(matches!(
        PrivacySalt::from_bytes([0; 32]),
        Err(MalformedTransaction::ZeroPrivacySalt)
    ));
}

#[test]
fn serialization_preserves_the_id() {
    let wtx = wire(&components()).unwrap();
    let mut bytes = Vec::new();
    tagged_serialize(&wtx, &mut bytes).unwrap();
    let decoded: WireTransaction = tagged_deserialize(&bytes[..]).unwrap();
    assert_eq!(decoded, wtx);
    assert_eq!(decoded.id(), wtx.id());
}

#[test]
fn filtered_transaction_reveals_selected_components() {
    let wtx = wire(&components()).unwrap();
    let ftx = wtx
        .build_filtered_transaction(|view| matches!(view, ComponentView::Output(_)))
        .unwrap();
    assert_eq!(ftx.id(), wtx.id());
    ftx.verify().unwrap();
    assert_eq!(ftx.outputs().unwrap(), wtx.outputs().unwrap());
    assert!(ftx.inputs().unwrap().is_empty());
    assert_eq!(ftx.notary().unwrap(), None);
    ftx.check_all_components_visible(ComponentGroupKind::Outputs).unwrap();
    assert!(matches!(
        ftx.check_all_components_visible(ComponentGroupKind::Inputs),
        Err(FilteredTransactionError::ComponentsNotVisible { group_index: 0 })
    ));
}

#[test]
fn filtered_transaction_with_nothing_revealed() {
    let wtx = wire(&components()).unwrap();
    let ftx = wtx.build_filtered_transaction(|_| false).unwrap();
    assert!(ftx.groups().is_empty());
    assert_eq!(ftx.compute_id().unwrap(), wtx.id());
}

#[test]
fn partially_revealed_group_keeps_positions() {
    let wtx = wire(&components()).unwrap();
    let second = wtx.outputs().unwrap()[1].clone();
    let ftx = wtx
        .build_filtered_transaction(|view| matches!(view, ComponentView::Output(state) if **state == second))
        .unwrap();
    ftx.verify().unwrap();
    assert_eq!(ftx.outputs().unwrap(), vec![second]);
    assert!(ftx.check_all_components_visible(ComponentGroupKind::Outputs).is_err());
}

#[test]
fn revealing_a_command_reveals_every_signer() {
    let wtx = wire(&components()).unwrap();
    let ftx = wtx
        .build_filtered_transaction(|view| match view {
            ComponentView::Command(command) => command.signers.contains(&ALICE.owning_key),
            _ => false,
        })
        .unwrap();
    ftx.verify().unwrap();
    let commands = ftx.commands().unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].signers, vec![ALICE.owning_key.clone()]);
    ftx.check_all_components_visible(ComponentGroupKind::Signers).unwrap();
    ftx.check_command_visibility(&ALICE.owning_key).unwrap();
    assert!(matches!(
        ftx.check_command_visibility(&BOB.owning_key),
        Err(FilteredTransactionError::CommandNotVisible(_))
    ));
}

#[test]
fn transaction_of_exactly_the_maximum_size_passes() {
    let services = MockServices::new();
    let cash = services.store_attachment(contract_attachment("cash-v1", CASH_CONTRACT));
    let input = services.record_state(output(32));
    let wtx = wire(&TransactionComponents {
        inputs: vec![input.state_ref],
        attachments: vec![cash.id],
        ..components()
    })
    .unwrap();
    let size = transaction_size(wtx.component_groups(), &[cash], &[input], &[]);

    services.update_parameters(|params| params.max_transaction_size = size as u32);
    wtx.to_ledger_transaction(&services, VerificationMode::InProcess)
        .unwrap();

    services.update_parameters(|params| params.max_transaction_size = size as u32 - 1);
    assert!(matches!(
        wtx.to_ledger_transaction(&services, VerificationMode::InProcess),
        Err(LedgerTransactionError::SizeLimit(_))
    ));
}

#[test]
fn ledger_transaction_needs_known_parameters() {
    let services = MockServices::new();
    services.store_attachment(contract_attachment("cash-v1", CASH_CONTRACT));
    let input = services.record_state(output(32));
    let wtx = wire(&TransactionComponents {
        inputs: vec![input.state_ref],
        network_parameters_hash: Some(SecureHash::sha256(b"unknown parameters")),
        ..components()
    })
    .unwrap();
    assert!(matches!(
        wtx.to_ledger_transaction(&services, VerificationMode::InProcess),
        Err(LedgerTransactionError::Resolution(_))
    ));
}

#[test]
fn signed_transaction_tracks_missing_signers() {
    let wtx = wire(&components()).unwrap();
    let data = SignableData {
        tx_id: wtx.id(),
        metadata: SignatureMetadata::new(4),
    };
    let mut rng = StdRng::seed_from_u64(0x42);
    let alice = TransactionSignature::sign(&ALICE_KEY, &mut rng, &data);
    wtx.check_signature(&alice).unwrap();
    let notary = TransactionSignature::sign(&NOTARY_KEY, &mut rng, &data);
    assert!(matches!(
        wtx.check_signature(&notary),
        Err(SignatureError::SignerNotRequired(_))
    ));

    let stx = SignedTransaction::new(wtx, vec![alice]);
    let missing = stx.missing_signers().unwrap();
    assert_eq!(
        missing,
        [BOB.owning_key.clone(), NOTARY.owning_key.clone()]
            .into_iter()
            .collect::<BTreeSet<_>>()
    );
    assert!(matches!(
        stx.verify_required_signatures(),
        Err(SignatureError::MissingSignatures(_))
    ));
    stx.verify_signatures_except(&missing).unwrap();

    let bob = TransactionSignature::sign(&BOB_KEY, &mut rng, &data);
    let stx = stx.with_additional_signature(bob);
    stx.verify_signatures_except(&[NOTARY.owning_key.clone()].into_iter().collect())
        .unwrap();
}

#[test]
fn signature_over_another_transaction_is_invalid() {
    let wtx = wire(&components()).unwrap();
    let other = WireTransaction::from_components(&components(), salt(7), DigestService::SHA256).unwrap();
    let data = SignableData {
        tx_id: other.id(),
        metadata: SignatureMetadata::new(4),
    };
    let sig = TransactionSignature::sign(&ALICE_KEY, &mut StdRng::seed_from_u64(0x42), &data);
    assert!(matches!(
        wtx.check_signature(&sig),
        Err(SignatureError::InvalidSignature(_))
    ));
}

#[cfg(feature = "proptest")]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn id_survives_serialization(seed in any::<u64>(), payload in 0usize..64) {
            let wtx = WireTransaction::from_components(
                &TransactionComponents {
                    outputs: vec![output(payload)],
                    ..components()
                },
                salt(seed),
                DigestService::SHA256,
            )
            .unwrap();
            let decoded: WireTransaction = serialize::from_bytes(&serialize::to_bytes(&wtx)).unwrap();
            prop_assert_eq!(decoded.id(), wtx.id());
            let ftx = wtx.build_filtered_transaction(|_| true).unwrap();
            prop_assert_eq!(ftx.compute_id().unwrap(), wtx.id());
        }
    }
}
