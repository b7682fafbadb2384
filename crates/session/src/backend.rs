// session/src/backend.rs

//! Collaborator contracts consumed by the session.
//!
//! Implementations never touch session state; their results flow back only
//! through the values they return.

use crate::{
    CallRequest, ChainSnapshot, DeployRequest, Deployment, ExecutionError, PersistenceError,
    RunnerOutput,
};
use async_trait::async_trait;
use diagnostics::CheckResult;

/// Contract checker
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, code: &str) -> CheckResult;
}

/// Persistence of named source files
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// All stored files as `(name, code)` pairs
    async fn load_all(&self) -> Result<Vec<(String, String)>, PersistenceError>;

    async fn update(&self, name: &str, code: &str) -> Result<(), PersistenceError>;
}

/// Deploy/call execution
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn deploy(&self, request: DeployRequest) -> Result<Deployment, ExecutionError>;

    async fn call(&self, request: CallRequest) -> Result<RunnerOutput, ExecutionError>;
}

/// Read-only chain view
pub trait ChainProvider: Send + Sync {
    fn snapshot(&self) -> ChainSnapshot;
}
