// session/src/types.rs

use crate::OperationKind;
use chrono::{DateTime, Utc};
use diagnostics::{annotations_for, Annotation, Diagnostic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hex account or contract address (`0x`-prefixed)
pub type Address = String;

/// Block height
pub type BlockNumber = u64;

/// Gas limit/used
pub type Gas = u64;

/// Native token amount
pub type Amount = u128;

/// Named, typed value used for init params, transition params and state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KVPair {
    pub vname: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub value: serde_json::Value,
}

impl KVPair {
    pub fn new(vname: impl Into<String>, ty: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            vname: vname.into(),
            ty: ty.into(),
            value,
        }
    }
}

/// Typed parameter or field declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub name: String,
    pub params: Vec<AbiParam>,
}

/// Contract interface as reported by the execution backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abi {
    pub name: String,
    pub params: Vec<AbiParam>,
    pub fields: Vec<AbiParam>,
    pub transitions: Vec<Transition>,
}

impl Abi {
    pub fn transition(&self, name: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.name == name)
    }
}

/// Chain account, owned by the chain provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: Amount,
    pub nonce: u64,
}

/// Message attached to a deploy or call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Amount sent along with the message
    #[serde(rename = "_amount")]
    pub amount: Amount,
}

/// Source file known to the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub code: String,
    /// Code as last written to the store, `None` if never persisted
    pub persisted: Option<String>,
    pub error: Option<Vec<Diagnostic>>,
}

impl SourceFile {
    /// A file created in the workspace but not yet saved
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            persisted: None,
            error: None,
        }
    }

    /// A file loaded from the store
    pub fn persisted(name: impl Into<String>, code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            name: name.into(),
            persisted: Some(code.clone()),
            code,
            error: None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.persisted.as_deref() != Some(self.code.as_str())
    }

    pub fn annotations(&self) -> Vec<Annotation> {
        annotations_for(self.error.as_deref())
    }
}

/// A deployed contract tracked by the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractInstance {
    pub address: Address,
    pub abi: Abi,
    pub state: Vec<KVPair>,
}

impl ContractInstance {
    pub fn field(&self, name: &str) -> Option<&KVPair> {
        self.state.iter().find(|kv| kv.vname == name)
    }
}

/// Read-only view of the chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub block_num: BlockNumber,
    pub accounts: BTreeMap<Address, Account>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub code: String,
    pub init: Vec<KVPair>,
    pub message: Message,
    pub deployer: Account,
    pub gas_limit: Gas,
    pub gas_price: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub address: Address,
    pub transition: String,
    pub params: Vec<KVPair>,
    pub message: Message,
    pub caller: Account,
    pub gas_limit: Gas,
    pub gas_price: u64,
}

/// Successful deployment as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub address: Address,
    pub abi: Abi,
    pub state: Vec<KVPair>,
    pub gas_used: Gas,
}

/// Success payload of a deploy or call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerOutput {
    pub address: Address,
    pub state: Vec<KVPair>,
    pub gas_used: Gas,
}

impl From<&Deployment> for RunnerOutput {
    fn from(deployment: &Deployment) -> Self {
        Self {
            address: deployment.address.clone(),
            state: deployment.state.clone(),
            gas_used: deployment.gas_used,
        }
    }
}

/// Active edit target and active deployed contract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub active_source: Option<String>,
    pub active_contract: Option<Address>,
}

/// One completed deploy or call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub kind: OperationKind,
    pub address: Option<Address>,
    pub transition: Option<String>,
    pub block_num: BlockNumber,
    pub outcome: Result<Gas, String>,
    pub recorded_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_file_is_dirty_until_persisted() {
        let mut file = SourceFile::new("Foo", "contract Foo ()");
        assert!(file.is_dirty());

        file.persisted = Some(file.code.clone());
        assert!(!file.is_dirty());

        file.code.push('\n');
        assert!(file.is_dirty());
    }

    #[test]
    fn test_loaded_file_is_clean() {
        let file = SourceFile::persisted("Foo", "contract Foo ()");
        assert!(!file.is_dirty());
        assert!(file.annotations().is_empty());
    }

    #[test]
    fn test_kvpair_uses_type_key() {
        let kv = KVPair::new("owner", "ByStr20", serde_json::json!("0x00"));
        let json = serde_json::to_value(&kv).unwrap();
        assert_eq!(json["type"], "ByStr20");
        assert_eq!(json["vname"], "owner");
    }

    #[test]
    fn test_abi_transition_lookup() {
        let abi = Abi {
            name: "Counter".into(),
            transitions: vec![Transition { name: "Increment".into(), params: vec![] }],
            ..Default::default()
        };
        assert!(abi.transition("Increment").is_some());
        assert!(abi.transition("Decrement").is_none());
    }
}
