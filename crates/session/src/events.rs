// session/src/events.rs
use crate::{Address, OperationKind};
use serde::{Deserialize, Serialize};

/// Change notifications published by the session to its subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SourceChecked { name: String, success: bool },
    SourceSaved { name: String },
    SaveFailed { name: String, error: String },
    SourceAdded { name: String },
    SourceRemoved { name: String },
    ContractDeployed { address: Address },
    TransitionCalled { address: Address, transition: String },
    OperationFailed { kind: OperationKind, error: String },
    SelectionChanged,
    NotificationShown { key: u64 },
}
