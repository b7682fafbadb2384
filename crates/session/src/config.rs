// session/src/config.rs
use crate::Gas;
use serde::{Deserialize, Serialize};

/// What to do when a file is checked again before its previous check returned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckPolicy {
    /// Let both run; the response that arrives last sets the file's error
    #[default]
    Overwrite,
    /// Refuse the second check until the first has returned
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub history_limit: usize,
    pub check_policy: CheckPolicy,
    pub default_gas_limit: Gas,
    pub default_gas_price: u64,
    /// Capacity of the event channel handed to subscribers
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            check_policy: CheckPolicy::Overwrite,
            default_gas_limit: 50_000,
            default_gas_price: 1,
            event_buffer: 256,
        }
    }
}
