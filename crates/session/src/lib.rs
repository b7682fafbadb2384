// session/src/lib.rs

//! Contract development session
//!
//! This crate provides:
//! - The session data model (source files, accounts, deployed contracts)
//! - Collaborator contracts for checking, persistence, execution and chain access
//! - `ContractSession`, the single owner of mutable session state
//! - The editor buffer reducer

pub mod backend;
pub mod config;
pub mod editor;
pub mod events;
pub mod orchestrator;
pub mod types;

pub use backend::{ChainProvider, Checker, ExecutionBackend, SourceStore};
pub use config::{CheckPolicy, SessionConfig};
pub use editor::EditorBuffer;
pub use events::SessionEvent;
pub use orchestrator::{Collaborators, ContractSession, Pending, SaveOutcome, SessionState};
pub use types::*;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Outcome delivered to the caller of a deploy or call
pub type RunnerResult = Result<RunnerOutput, ExecutionError>;

/// Kinds of single-flight operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Deploy,
    Call,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Deploy => write!(f, "deploy"),
            OperationKind::Call => write!(f, "call"),
        }
    }
}

/// Errors surfaced by session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Unknown source file: {0}")]
    UnknownSource(String),

    #[error("Source file already exists: {0}")]
    DuplicateSource(String),

    #[error("Unknown contract: {0}")]
    UnknownContract(Address),

    #[error("A {0} is already in progress")]
    Busy(OperationKind),

    #[error("A check of {0} is already in progress")]
    CheckInFlight(String),

    #[error("Operation abandoned before completion")]
    Abandoned,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl SessionError {
    /// Whether this is a synchronous single-flight rejection
    pub fn is_concurrency_rejection(&self) -> bool {
        matches!(self, SessionError::Busy(_) | SessionError::CheckInFlight(_))
    }
}

/// Errors reported by a source store
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Invalid source name: {0:?}")]
    InvalidName(String),

    #[error("Failed to persist {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors reported by an execution backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("Contract rejected: {0}")]
    Rejected(String),

    #[error("Contract not found: {0}")]
    ContractNotFound(Address),

    #[error("Unknown transition: {0}")]
    UnknownTransition(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u128, available: u128 },

    #[error("Out of gas: limit {limit}")]
    OutOfGas { limit: u64 },

    #[error("Transition threw: {0}")]
    Thrown(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_rejection_classification() {
        assert!(SessionError::Busy(OperationKind::Deploy).is_concurrency_rejection());
        assert!(SessionError::CheckInFlight("Foo".into()).is_concurrency_rejection());
        assert!(!SessionError::UnknownSource("Foo".into()).is_concurrency_rejection());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SessionError::Busy(OperationKind::Call).to_string(),
            "A call is already in progress"
        );
        assert_eq!(
            ExecutionError::OutOfGas { limit: 10 }.to_string(),
            "Out of gas: limit 10"
        );
    }
}
