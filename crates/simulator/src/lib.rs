// simulator/src/lib.rs

//! In-process contract chain and checker
//!
//! This crate provides:
//! - Lexical and structural analysis of contract source
//! - A deterministic account/contract state with block production
//! - Gas metering for deployments and transition calls
//! - Collaborator implementations used by the session

pub mod chain;
pub mod checker;
pub mod gas;
pub mod parse;
pub mod state;
pub mod vm;

pub use chain::{ChainConfig, GenesisAccount, SimulatedChain};
pub use checker::{CheckerConfig, SimulatedChecker};
pub use gas::{GasMeter, GasSchedule};
pub use parse::{analyze, check_source, ContractDef};
pub use state::{ChainState, ContractRecord};
pub use vm::Executor;

use session::{Address, ExecutionError};

/// Result type for simulated execution
pub type ContractResult<T> = Result<T, ContractError>;

/// Errors that can occur during simulated execution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("Contract rejected: {0}")]
    Rejected(String),

    #[error("Contract not found: {0}")]
    ContractNotFound(Address),

    #[error("Account not found: {0}")]
    AccountNotFound(Address),

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
}

impl From<ContractError> for ExecutionError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::Rejected(msg) => ExecutionError::Rejected(msg),
            ContractError::ContractNotFound(address) => ExecutionError::ContractNotFound(address),
            ContractError::UnknownTransition(name) => ExecutionError::UnknownTransition(name),
            ContractError::MissingParameter(name) => ExecutionError::MissingParameter(name),
            ContractError::InsufficientBalance { needed, available } => {
                ExecutionError::InsufficientBalance { needed, available }
            }
            ContractError::OutOfGas { limit } => ExecutionError::OutOfGas { limit },
            ContractError::Thrown(msg) => ExecutionError::Thrown(msg),
            err @ (ContractError::AccountNotFound(_) | ContractError::Runtime(_)) => {
                ExecutionError::Runtime(err.to_string())
            }
        }
    }
}
