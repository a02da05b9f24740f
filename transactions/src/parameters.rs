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


//! Network-wide parameters and builder configuration.

use crate::structure::{AttachmentId, ContractClassName, Party};
use base_crypto::hash::{DigestService, SecureHash};
use serde::{Deserialize, Serialize};
use serialize::{Deserializable, Serializable, Tagged};
use std::collections::BTreeMap;

/// Platform version from which reference states may be used.
pub const REFERENCE_STATES_PLATFORM_VERSION: u32 = 4;

pub const DEFAULT_MAX_TRANSACTION_SIZE: u32 = 10 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serializable, Serialize, Deserialize)]
#[tag = "notary-info[v1]"]
pub struct NotaryInfo {
    pub identity: Party,
    pub validating: bool,
}

/// Parameters every node on the network agrees on. Transactions commit to
/// the hash of the parameters they were built under.
#[derive(Clone, Debug, PartialEq, Eq, Serializable, Serialize, Deserialize)]
#[tag = "network-parameters[v1]"]
pub struct NetworkParameters {
    pub minimum_platform_version: u32,
    /// Upper bound on the size of a transaction and everything it depends on.
    pub max_transaction_size: u32,
    /// Attachments accepted for states with a zone-whitelist constraint.
    #[serde(default)]
    pub whitelisted_contract_implementations: BTreeMap<ContractClassName, Vec<AttachmentId>>,
    #[serde(default)]
    pub notaries: Vec<NotaryInfo>,
    pub epoch: u32,
}

impl Default for NetworkParameters {
    fn default() -> Self {
        NetworkParameters {
            minimum_platform_version: 4,
            max_transaction_size: DEFAULT_MAX_TRANSACTION_SIZE,
            whitelisted_contract_implementations: BTreeMap::new(),
            notaries: Vec::new(),
            epoch: 1,
        }
    }
}

impl NetworkParameters {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn hash(&self) -> SecureHash {
        DigestService::SHA256.hash_serializable(self)
    }

    pub fn is_whitelisted(&self, contract: &str) -> bool {
        self.whitelisted_contract_implementations
            .get(contract)
            .is_some_and(|ids| !ids.is_empty())
    }

    pub fn is_notary(&self, party: &Party) -> bool {
        self.notaries.iter().any(|info| &info.identity == party)
    }
}

/// Switches controlling how the transaction builder behaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Stops the builder from adding attachments for classes that fail to load.
    pub missing_class_disabled: bool,
    /// Lets hash-constrained states move to signature constraints, and makes
    /// hash constraints accept any attachment.
    pub disable_hash_constraints: bool,
}

impl BuilderConfig {
    pub const MISSING_CLASS_DISABLED_VAR: &'static str = "KESTREL_MISSING_CLASS_DISABLED";
    pub const DISABLE_HASH_CONSTRAINTS_VAR: &'static str = "KESTREL_DISABLE_HASH_CONSTRAINTS";

    /// Reads the configuration from the environment. Unset or unparsable
    /// variables leave the default in place.
    pub fn from_env() -> Self {
        let flag = |name: &str| {
            std::env::var(name)
                .ok()
                .and_then(|value| parse_flag(&value))
                .unwrap_or(false)
        };
        BuilderConfig {
            missing_class_disabled: flag(Self::MISSING_CLASS_DISABLED_VAR),
            disable_hash_constraints: flag(Self::DISABLE_HASH_CONSTRAINTS_VAR),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_from_json() {
        let params = NetworkParameters::from_json(
            r#"{"minimum_platform_version": 4, "max_transaction_size": 1024, "epoch": 3}"#,
        )
        .unwrap();
        assert_eq!(params.max_transaction_size, 1024);
        assert!(params.notaries.is_empty());
        assert!(!params.is_whitelisted("com.example.Cash"));
    }

    #[test]
    fn hash_depends_on_contents() {
        let a = NetworkParameters::default();
        let b = NetworkParameters {
            epoch: 2,
            ..NetworkParameters::default()
        };
        assert_eq!(a.hash(), a.clone().hash());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn flags() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        let config: BuilderConfig = serde_json::from_str(r#"{"disable_hash_constraints": true}"#).unwrap();
        assert!(config.disable_hash_constraints);
        assert!(!config.missing_class_disabled);
    }
}
