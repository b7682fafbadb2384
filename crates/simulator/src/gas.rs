// simulator/src/gas.rs

use crate::{ContractError, ContractResult};
use serde::{Deserialize, Serialize};
use session::Gas;

/// Gas charged by the simulated chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSchedule {
    /// Flat cost of a deployment
    pub deploy_base: Gas,
    /// Cost per byte of contract source
    pub deploy_per_byte: Gas,
    /// Cost per initialised field
    pub field_init: Gas,
    /// Flat cost of a transition call
    pub call_base: Gas,
    /// Cost per executed statement
    pub statement: Gas,
    /// Additional cost per field write
    pub store: Gas,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

impl GasSchedule {
    pub fn standard() -> Self {
        Self {
            deploy_base: 500,
            deploy_per_byte: 1,
            field_init: 20,
            call_base: 100,
            statement: 10,
            store: 20,
        }
    }

    /// Lower gas configuration for testing
    pub fn test() -> Self {
        Self {
            deploy_base: 10,
            deploy_per_byte: 0,
            field_init: 1,
            call_base: 5,
            statement: 1,
            store: 2,
        }
    }

    /// Upfront cost of deploying `code`
    pub fn deploy_gas(&self, code: &str) -> Gas {
        self.deploy_base
            .saturating_add(self.deploy_per_byte.saturating_mul(code.len() as Gas))
    }
}

/// Gas meter for tracking usage during execution
#[derive(Debug)]
pub struct GasMeter {
    limit: Gas,
    used: Gas,
}

impl GasMeter {
    pub fn new(limit: Gas) -> Self {
        Self { limit, used: 0 }
    }

    /// Consume gas, failing once the limit would be exceeded
    pub fn consume(&mut self, amount: Gas) -> ContractResult<()> {
        let used = self.used.saturating_add(amount);
        if used > self.limit {
            return Err(ContractError::OutOfGas { limit: self.limit });
        }
        self.used = used;
        Ok(())
    }

    pub fn remaining(&self) -> Gas {
        self.limit.saturating_sub(self.used)
    }

    pub fn used(&self) -> Gas {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_gas_scales_with_code() {
        let schedule = GasSchedule::standard();
        assert_eq!(schedule.deploy_gas(""), 500);
        assert_eq!(schedule.deploy_gas("contract A ()"), 500 + 13);
    }

    #[test]
    fn test_gas_meter() {
        let mut meter = GasMeter::new(100);

        meter.consume(60).unwrap();
        assert_eq!(meter.used(), 60);
        assert_eq!(meter.remaining(), 40);

        meter.consume(40).unwrap();
        assert_eq!(meter.remaining(), 0);
    }

    #[test]
    fn test_out_of_gas_leaves_usage_unchanged() {
        let mut meter = GasMeter::new(50);
        meter.consume(30).unwrap();

        assert_eq!(meter.consume(30), Err(ContractError::OutOfGas { limit: 50 }));
        assert_eq!(meter.used(), 30);
    }
}
