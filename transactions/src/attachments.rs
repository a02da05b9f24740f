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


//! Attachments: content-addressed archives carrying contract code.

use crate::structure::{AttachmentId, ContractClassName};
use base_crypto::signatures::VerifyingKey;
use serde::{Deserialize, Serialize};
use serialize::{Deserializable, Serializable, Tagged};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Where an attachment entered the node's storage from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serializable, Serialize, Deserialize)]
#[tag = "uploader[v1]"]
pub enum Uploader {
    /// Installed with a locally deployed application.
    App,
    /// Imported by an operator over RPC.
    Rpc,
    Test,
    /// Received from a peer while resolving a transaction.
    P2p,
    Unknown,
}

impl Uploader {
    /// Whether code from this source may be run without further checks.
    pub fn is_trusted(self) -> bool {
        matches!(self, Uploader::App | Uploader::Rpc | Uploader::Test)
    }
}

/// The metadata of a stored attachment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub id: AttachmentId,
    /// Size of the archive in bytes.
    pub size: u32,
    pub signer_keys: Vec<VerifyingKey>,
    pub uploader: Uploader,
    /// Class files contained in the archive, as slash-separated paths.
    pub declared_classes: BTreeSet<String>,
    /// Contract classes this attachment provides. Empty for plain library
    /// attachments.
    pub contracts: BTreeSet<ContractClassName>,
}

impl Attachment {
    pub fn new(id: AttachmentId, size: u32, uploader: Uploader) -> Self {
        Attachment {
            id,
            size,
            signer_keys: Vec::new(),
            uploader,
            declared_classes: BTreeSet::new(),
            contracts: BTreeSet::new(),
        }
    }

    pub fn signed_by(mut self, keys: impl IntoIterator<Item = VerifyingKey>) -> Self {
        self.signer_keys.extend(keys);
        self
    }

    pub fn declaring(mut self, classes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.declared_classes.extend(classes.into_iter().map(Into::into));
        self
    }

    /// Marks this attachment as providing `contract`, declaring its class.
    pub fn providing(mut self, contract: impl Into<ContractClassName>) -> Self {
        let contract = contract.into();
        self.declared_classes.insert(contract.replace('.', "/"));
        self.contracts.insert(contract);
        self
    }

    pub fn is_signed(&self) -> bool {
        !self.signer_keys.is_empty()
    }

    pub fn is_trusted(&self) -> bool {
        self.uploader.is_trusted()
    }

    pub fn is_contract_attachment(&self) -> bool {
        !self.contracts.is_empty()
    }

    pub fn declares(&self, class_path: &str) -> bool {
        self.declared_classes.contains(class_path)
    }
}

/// The installed attachment for a contract, and optionally an older,
/// unsigned build of it kept for nodes that cannot verify the current one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractAttachmentWithLegacy {
    pub current: Arc<Attachment>,
    pub legacy: Option<Arc<Attachment>>,
}

impl ContractAttachmentWithLegacy {
    pub fn new(current: Arc<Attachment>, legacy: Option<Arc<Attachment>>) -> Self {
        ContractAttachmentWithLegacy { current, legacy }
    }

    pub fn without_legacy(current: Arc<Attachment>) -> Self {
        ContractAttachmentWithLegacy {
            current,
            legacy: None,
        }
    }
}

/// An attachment viewed as the code for one particular contract, along with
/// what constraint evaluation needs to know about the network.
#[derive(Clone, Copy, Debug)]
pub struct AttachmentWithContext<'a> {
    pub attachment: &'a Attachment,
    pub contract: &'a str,
    pub whitelist: &'a BTreeMap<ContractClassName, Vec<AttachmentId>>,
    /// When set, hash constraints accept any attachment.
    pub disable_hash_constraints: bool,
}

impl<'a> AttachmentWithContext<'a> {
    pub fn new(
        attachment: &'a Attachment,
        contract: &'a str,
        whitelist: &'a BTreeMap<ContractClassName, Vec<AttachmentId>>,
    ) -> Self {
        AttachmentWithContext {
            attachment,
            contract,
            whitelist,
            disable_hash_constraints: false,
        }
    }

    pub fn with_hash_constraints_disabled(mut self, disabled: bool) -> Self {
        self.disable_hash_constraints = disabled;
        self
    }

    pub fn is_whitelisted(&self) -> bool {
        self.whitelist
            .get(self.contract)
            .is_some_and(|ids| ids.contains(&self.attachment.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base_crypto::hash::SecureHash;

    #[test]
    fn only_local_uploads_are_trusted() {
        assert!(Uploader::App.is_trusted());
        assert!(Uploader::Rpc.is_trusted());
        assert!(!Uploader::P2p.is_trusted());
        assert!(!Uploader::Unknown.is_trusted());
    }

    #[test]
    fn providing_declares_the_contract_class() {
        let att = Attachment::new(SecureHash::sha256(b"cash"), 1024, Uploader::App)
            .providing("com.example.Cash");
        assert!(att.is_contract_attachment());
        assert!(att.declares("com/example/Cash"));
        assert!(!att.is_signed());
    }
}
