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


use base_crypto::hash::{DigestService, SecureHash};
use kestrel_transactions::attachments::Attachment;
use kestrel_transactions::constraints::AttachmentConstraint;
use kestrel_transactions::error::{MalformedTransaction, ResolutionError, SignatureError, UpgradeError};
use kestrel_transactions::signed::{SignableData, SignatureMetadata, TransactionSignature};
use kestrel_transactions::structure::{Party, PrivacySalt, StateAndRef, StateRef, TransactionState};
use kestrel_transactions::test_utilities::*;
use kestrel_transactions::upgrade::ContractUpgradeWireTransaction;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;

const CASH_V2_CONTRACT: &str = "com.example.contracts.CashV2";

struct Fixture {
    services: MockServices,
    legacy: Arc<Attachment>,
    upgraded: Arc<Attachment>,
}

impl Fixture {
    fn new() -> Self {
        let services = MockServices::new();
        let legacy = services.store_attachment(contract_attachment("cash-v1", CASH_CONTRACT));
        let upgraded = services.store_attachment(contract_attachment("cash-v2", CASH_V2_CONTRACT));
        services.update_parameters(|params| {
            params
                .whitelisted_contract_implementations
                .insert(CASH_CONTRACT.to_owned(), vec![legacy.id]);
        });
        services.register_upgrade(Arc::new(RenamingUpgrade {
            from: CASH_CONTRACT.to_owned(),
            to: CASH_V2_CONTRACT.to_owned(),
            legacy_constraint: None,
        }));
        Fixture {
            services,
            legacy,
            upgraded,
        }
    }

    fn input(&self, contract: &str, constraint: AttachmentConstraint) -> StateAndRef {
        self.services.record_state(
            TransactionState::new(test_state(&ALICE, 16), contract, NOTARY.clone())
                .with_constraint(constraint),
        )
    }

    fn upgrade(&self, inputs: &[StateAndRef], notary: &Party) -> ContractUpgradeWireTransaction {
        let inputs = inputs.iter().map(|input| input.state_ref).collect::<Vec<_>>();
        ContractUpgradeWireTransaction::create(
            &inputs,
            notary,
            self.legacy.id,
            CASH_V2_CONTRACT,
            self.upgraded.id,
            Some(self.services.current_parameters().hash()),
            PrivacySalt::sample(&mut StdRng::seed_from_u64(0x42)),
            DigestService::SHA256,
        )
        .unwrap()
    }
}

#[test]
fn upgrade_derives_outputs_from_inputs() {
    let fixture = Fixture::new();
    let hashed = fixture.input(CASH_CONTRACT, AttachmentConstraint::Hash(fixture.legacy.id));
    let whitelisted = fixture.services.record_state(
        TransactionState::new(test_state(&BOB, 8), CASH_CONTRACT, NOTARY.clone())
            .with_constraint(AttachmentConstraint::WhitelistedByZone)
            .with_encumbrance(0),
    );
    let wtx = fixture.upgrade(&[hashed.clone(), whitelisted.clone()], &NOTARY);
    assert!(matches!(wtx.outputs(), Err(UpgradeError::OutputsRequireResolution)));

    let ltx = wtx.resolve(&fixture.services, Vec::new()).unwrap();
    assert_eq!(ltx.id, wtx.id());
    assert_eq!(ltx.legacy_contract_class_name(), CASH_CONTRACT);
    assert_eq!(ltx.outputs.len(), 2);
    assert!(ltx.outputs.iter().all(|output| output.contract == CASH_V2_CONTRACT));
    assert_eq!(
        ltx.outputs[0].constraint,
        AttachmentConstraint::Hash(fixture.upgraded.id)
    );
    assert_eq!(ltx.outputs[1].constraint, AttachmentConstraint::WhitelistedByZone);
    assert_eq!(ltx.outputs[1].encumbrance, Some(0));
    assert_eq!(ltx.outputs[0].data, hashed.state.data);
    assert!(ltx.required_signing_keys().contains(&NOTARY.owning_key));
    assert!(ltx.required_signing_keys().contains(&BOB.owning_key));
}

#[test]
fn upgrade_signatures() {
    let fixture = Fixture::new();
    let input = fixture.input(CASH_CONTRACT, AttachmentConstraint::Hash(fixture.legacy.id));
    let wtx = fixture.upgrade(&[input], &NOTARY);
    let data = SignableData {
        tx_id: wtx.id(),
        metadata: SignatureMetadata::new(4),
    };
    let mut rng = StdRng::seed_from_u64(0x42);
    let alice = TransactionSignature::sign(&ALICE_KEY, &mut rng, &data);
    let notary = TransactionSignature::sign(&NOTARY_KEY, &mut rng, &data);

    let partial = wtx.resolve(&fixture.services, vec![alice.clone()]).unwrap();
    assert!(matches!(
        partial.verify_required_signatures(),
        Err(SignatureError::MissingSignatures(missing)) if missing.contains(&NOTARY.owning_key)
    ));
    let complete = wtx.resolve(&fixture.services, vec![alice, notary]).unwrap();
    complete.verify_required_signatures().unwrap();
}

#[test]
fn filtered_upgrade_reveals_inputs_notary_and_parameters() {
    let fixture = Fixture::new();
    let input = fixture.input(CASH_CONTRACT, AttachmentConstraint::Hash(fixture.legacy.id));
    let wtx = fixture.upgrade(&[input.clone()], &NOTARY);
    let ftx = wtx.build_filtered_transaction();
    assert_eq!(ftx.id().unwrap(), wtx.id());
    assert_eq!(ftx.visible_components().keys().copied().collect::<Vec<_>>(), vec![0, 1, 5]);
    assert_eq!(ftx.hidden_components().keys().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    assert_eq!(ftx.inputs().unwrap(), vec![input.state_ref]);
    assert_eq!(ftx.notary().unwrap(), *NOTARY);
    assert_eq!(
        ftx.network_parameters_hash().unwrap(),
        Some(fixture.services.current_parameters().hash())
    );
}

#[test]
fn upgrade_without_parameters_hash() {
    let fixture = Fixture::new();
    let input = fixture.input(CASH_CONTRACT, AttachmentConstraint::Hash(fixture.legacy.id));
    let wtx = ContractUpgradeWireTransaction::create(
        &[input.state_ref],
        &NOTARY,
        fixture.legacy.id,
        CASH_V2_CONTRACT,
        fixture.upgraded.id,
        None,
        PrivacySalt::sample(&mut StdRng::seed_from_u64(0x42)),
        DigestService::SHA256,
    )
    .unwrap();
    assert_eq!(wtx.serialized_components().len(), 5);
    assert_eq!(wtx.network_parameters_hash().unwrap(), None);
    let ftx = wtx.build_filtered_transaction();
    assert_eq!(ftx.visible_components().len(), 2);
    assert_eq!(ftx.id().unwrap(), wtx.id());
    // Falls back to the current parameters.
    wtx.resolve(&fixture.services, Vec::new()).unwrap();
}

#[test]
fn upgrade_id_commits_to_every_component() {
    let fixture = Fixture::new();
    let input = fixture.input(CASH_CONTRACT, AttachmentConstraint::Hash(fixture.legacy.id));
    let wtx = fixture.upgrade(&[input.clone()], &NOTARY);
    let other = ContractUpgradeWireTransaction::create(
        &[input.state_ref],
        &NOTARY,
        fixture.legacy.id,
        CASH_V2_CONTRACT,
        attachment_id("cash-v3"),
        Some(fixture.services.current_parameters().hash()),
        PrivacySalt::sample(&mut StdRng::seed_from_u64(0x42)),
        DigestService::SHA256,
    )
    .unwrap();
    assert_ne!(wtx.id(), other.id());
    assert_eq!(wtx.nonces().len(), 6);
    assert_eq!(wtx.component_hashes().len(), 6);

    let decoded: ContractUpgradeWireTransaction =
        serialize::from_bytes(&serialize::to_bytes(&wtx)).unwrap();
    assert_eq!(decoded, wtx);
    assert_eq!(decoded.id(), wtx.id());
}

#[test]
fn upgrade_needs_inputs() {
    let result = ContractUpgradeWireTransaction::create(
        &[],
        &NOTARY,
        attachment_id("cash-v1"),
        CASH_V2_CONTRACT,
        attachment_id("cash-v2"),
        None,
        PrivacySalt::sample(&mut StdRng::seed_from_u64(0x42)),
        DigestService::SHA256,
    );
    assert!(matches!(result, Err(MalformedTransaction::UpgradeWithoutInputs)));

    let truncated = ContractUpgradeWireTransaction::new(
        vec![serialize::to_bytes(&vec![StateRef::new(SecureHash::sha256(b"tx"), 0)])],
        PrivacySalt::sample(&mut StdRng::seed_from_u64(0x42)),
        DigestService::SHA256,
    );
    assert!(matches!(
        truncated,
        Err(MalformedTransaction::MissingUpgradeComponent { index: 1 })
    ));
}

#[test]
fn notary_must_be_whitelisted() {
    let fixture = Fixture::new();
    let input = fixture.input(CASH_CONTRACT, AttachmentConstraint::Hash(fixture.legacy.id));
    let rogue = Party::new("O=Rogue Notary,L=Nowhere,C=XX", BOB.owning_key.clone());
    let wtx = fixture.upgrade(&[input], &rogue);
    assert!(matches!(
        wtx.resolve(&fixture.services, Vec::new()),
        Err(UpgradeError::NotaryNotWhitelisted(party)) if party == rogue
    ));
}

#[test]
fn inputs_must_share_the_legacy_contract() {
    let fixture = Fixture::new();
    let cash = fixture.input(CASH_CONTRACT, AttachmentConstraint::Hash(fixture.legacy.id));
    let bond = fixture.input(BOND_CONTRACT, AttachmentConstraint::Hash(fixture.legacy.id));
    let wtx = fixture.upgrade(&[cash, bond.clone()], &NOTARY);
    match wtx.resolve(&fixture.services, Vec::new()) {
        Err(UpgradeError::InputContractMismatch { state_ref, found, .. }) => {
            assert_eq!(state_ref, bond.state_ref);
            assert_eq!(found, BOND_CONTRACT);
        }
        other => panic!("unexpected result: {:?}", other.map(|ltx| ltx.id)),
    }
}

#[test]
fn upgrade_must_name_the_legacy_contract() {
    let fixture = Fixture::new();
    fixture.services.register_upgrade(Arc::new(RenamingUpgrade {
        from: BOND_CONTRACT.to_owned(),
        to: CASH_V2_CONTRACT.to_owned(),
        legacy_constraint: None,
    }));
    let input = fixture.input(CASH_CONTRACT, AttachmentConstraint::Hash(fixture.legacy.id));
    let wtx = fixture.upgrade(&[input], &NOTARY);
    assert!(matches!(
        wtx.resolve(&fixture.services, Vec::new()),
        Err(UpgradeError::LegacyContractMismatch { .. })
    ));
}

#[test]
fn input_constraints_must_accept_the_legacy_attachment() {
    let fixture = Fixture::new();
    let input = fixture.input(CASH_CONTRACT, AttachmentConstraint::Hash(attachment_id("cash-v0")));
    let wtx = fixture.upgrade(&[input], &NOTARY);
    assert!(matches!(
        wtx.resolve(&fixture.services, Vec::new()),
        Err(UpgradeError::InputConstraintNotSatisfied { .. })
    ));
}

#[test]
fn legacy_attachment_must_be_whitelisted_by_default() {
    let fixture = Fixture::new();
    fixture.services.update_parameters(|params| {
        params.whitelisted_contract_implementations.clear();
    });
    let input = fixture.input(CASH_CONTRACT, AttachmentConstraint::Hash(fixture.legacy.id));
    let wtx = fixture.upgrade(&[input], &NOTARY);
    assert!(matches!(
        wtx.resolve(&fixture.services, Vec::new()),
        Err(UpgradeError::LegacyConstraintNotSatisfied {
            constraint: AttachmentConstraint::WhitelistedByZone
        })
    ));
}

#[test]
fn always_accept_inputs_cannot_be_upgraded() {
    let fixture = Fixture::new();
    let input = fixture.input(CASH_CONTRACT, AttachmentConstraint::AlwaysAccept);
    let wtx = fixture.upgrade(&[input], &NOTARY);
    assert!(matches!(
        wtx.resolve(&fixture.services, Vec::new()),
        Err(UpgradeError::UnsupportedInputConstraint {
            constraint: AttachmentConstraint::AlwaysAccept,
            ..
        })
    ));
}

#[test]
fn upgrade_logic_must_load() {
    let fixture = Fixture::new();
    let input = fixture.input(CASH_CONTRACT, AttachmentConstraint::Hash(fixture.legacy.id));
    let wtx = ContractUpgradeWireTransaction::create(
        &[input.state_ref],
        &NOTARY,
        fixture.legacy.id,
        "com.example.contracts.Unknown",
        fixture.upgraded.id,
        None,
        PrivacySalt::sample(&mut StdRng::seed_from_u64(0x42)),
        DigestService::SHA256,
    )
    .unwrap();
    assert!(matches!(
        wtx.resolve(&fixture.services, Vec::new()),
        Err(UpgradeError::ContractCreation { .. })
    ));
}

#[test]
fn unknown_parameters_hash() {
    let fixture = Fixture::new();
    let input = fixture.input(CASH_CONTRACT, AttachmentConstraint::Hash(fixture.legacy.id));
    let wtx = ContractUpgradeWireTransaction::create(
        &[input.state_ref],
        &NOTARY,
        fixture.legacy.id,
        CASH_V2_CONTRACT,
        fixture.upgraded.id,
        Some(SecureHash::sha256(b"unknown parameters")),
        PrivacySalt::sample(&mut StdRng::seed_from_u64(0x42)),
        DigestService::SHA256,
    )
    .unwrap();
    assert!(matches!(
        wtx.resolve(&fixture.services, Vec::new()),
        Err(UpgradeError::Resolution(ResolutionError::UnknownParameters { .. }))
    ));
}
