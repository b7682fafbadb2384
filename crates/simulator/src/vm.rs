// simulator/src/vm.rs

use crate::{
    gas::{GasMeter, GasSchedule},
    parse::{self, Initializer, Operand, Statement},
    state::{ChainState, ContractRecord},
    ContractError, ContractResult,
};
use diagnostics::Diagnostic;
use serde_json::Value;
use session::{Amount, CallRequest, DeployRequest, Deployment, Gas, KVPair, RunnerOutput};
use std::collections::HashMap;

/// Executes deployments and transition calls.
///
/// Every failure is detected before `state` is touched, so a failed request
/// leaves the chain exactly as it was.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    schedule: GasSchedule,
}

impl Executor {
    pub fn new(schedule: GasSchedule) -> Self {
        Self { schedule }
    }

    /// Deploy a contract
    pub fn deploy(
        &self,
        state: &mut ChainState,
        request: &DeployRequest,
    ) -> ContractResult<Deployment> {
        let deployer = state.account(&request.deployer.address)?.clone();
        let mut meter = GasMeter::new(request.gas_limit);

        meter.consume(self.schedule.deploy_gas(&request.code))?;

        let def = parse::analyze(&request.code)
            .map_err(|diagnostics| ContractError::Rejected(describe(&diagnostics)))?;

        let mut init = HashMap::new();
        for param in &def.params {
            let supplied = request
                .init
                .iter()
                .find(|kv| kv.vname == param.name)
                .ok_or_else(|| ContractError::MissingParameter(param.name.clone()))?;
            init.insert(param.name.as_str(), supplied.value.clone());
        }

        let amount = request.message.amount;
        ensure_funds(deployer.balance, amount, request.gas_limit, request.gas_price)?;

        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            meter.consume(self.schedule.field_init)?;
            let value = match &field.init {
                Initializer::Literal(value) | Initializer::Expr(value) => {
                    Value::String(value.clone())
                }
                Initializer::EmptyMap => Value::Object(Default::default()),
                Initializer::Param(name) => init.get(name.as_str()).cloned().unwrap_or(Value::Null),
            };
            fields.push(KVPair::new(field.name.clone(), field.ty.clone(), value));
        }

        let gas_used = meter.used();
        let address = ChainState::create_address(&deployer.address, deployer.nonce);
        state.debit(
            &deployer.address,
            amount.saturating_add(fee(gas_used, request.gas_price)),
        )?;
        state.increment_nonce(&deployer.address);

        let record = ContractRecord {
            address: address.clone(),
            abi: def.abi(),
            def,
            fields,
            balance: amount,
        };
        let deployment = Deployment {
            address,
            abi: record.abi.clone(),
            state: record.state(),
            gas_used,
        };
        state.insert_contract(record);

        tracing::debug!(
            "Deployed {} at {} for {} gas",
            deployment.abi.name,
            deployment.address,
            gas_used
        );
        Ok(deployment)
    }

    /// Run a transition of a deployed contract
    pub fn call(&self, state: &mut ChainState, request: &CallRequest) -> ContractResult<RunnerOutput> {
        let caller = state.account(&request.caller.address)?.clone();
        let contract = state
            .contract(&request.address)
            .cloned()
            .ok_or_else(|| ContractError::ContractNotFound(request.address.clone()))?;
        let transition = contract
            .def
            .transition(&request.transition)
            .ok_or_else(|| ContractError::UnknownTransition(request.transition.clone()))?;

        let mut locals = HashMap::new();
        for param in &transition.params {
            let supplied = request
                .params
                .iter()
                .find(|kv| kv.vname == param.name)
                .ok_or_else(|| ContractError::MissingParameter(param.name.clone()))?;
            locals.insert(param.name.clone(), supplied.value.clone());
        }

        let amount = request.message.amount;
        locals.insert("_sender".into(), Value::String(caller.address.clone()));
        locals.insert("_amount".into(), Value::String(amount.to_string()));
        locals.insert("_this_address".into(), Value::String(contract.address.clone()));

        ensure_funds(caller.balance, amount, request.gas_limit, request.gas_price)?;

        let mut meter = GasMeter::new(request.gas_limit);
        meter.consume(self.schedule.call_base)?;

        let mut fields = contract.fields.clone();
        let mut accepted = false;

        for statement in &transition.body {
            meter.consume(self.schedule.statement)?;
            match statement {
                Statement::Accept => accepted = true,
                Statement::Throw(reason) => {
                    return Err(ContractError::Thrown(
                        reason.clone().unwrap_or_else(|| transition.name.clone()),
                    ));
                }
                Statement::Store { field, value } => {
                    meter.consume(self.schedule.store)?;
                    let value = resolve(value, &locals)?;
                    let slot = fields
                        .iter_mut()
                        .find(|kv| kv.vname == *field)
                        .ok_or_else(|| unknown_field(field))?;
                    slot.value = value;
                }
                Statement::Load { local, field } => {
                    let value = fields
                        .iter()
                        .find(|kv| kv.vname == *field)
                        .map(|kv| kv.value.clone())
                        .ok_or_else(|| unknown_field(field))?;
                    locals.insert(local.clone(), value);
                }
                Statement::Other(text) => tracing::trace!("Skipping statement: {}", text),
            }
        }

        let gas_used = meter.used();
        let transferred = if accepted { amount } else { 0 };
        state.debit(
            &caller.address,
            transferred.saturating_add(fee(gas_used, request.gas_price)),
        )?;
        state.increment_nonce(&caller.address);

        let record = state
            .contract_mut(&contract.address)
            .ok_or_else(|| ContractError::ContractNotFound(contract.address.clone()))?;
        record.fields = fields;
        record.balance = record.balance.saturating_add(transferred);

        tracing::debug!(
            "{} on {} used {} gas",
            transition.name,
            record.address,
            gas_used
        );
        Ok(RunnerOutput {
            address: record.address.clone(),
            state: record.state(),
            gas_used,
        })
    }
}

fn fee(gas: Gas, gas_price: u64) -> Amount {
    Amount::from(gas) * Amount::from(gas_price)
}

/// The sender must cover the amount plus the full gas allowance
fn ensure_funds(balance: Amount, amount: Amount, gas_limit: Gas, gas_price: u64) -> ContractResult<()> {
    let needed = amount.saturating_add(fee(gas_limit, gas_price));
    if balance < needed {
        return Err(ContractError::InsufficientBalance {
            needed,
            available: balance,
        });
    }
    Ok(())
}

fn resolve(operand: &Operand, locals: &HashMap<String, Value>) -> ContractResult<Value> {
    match operand {
        Operand::Literal(value) => Ok(Value::String(value.clone())),
        Operand::Ident(name) => match locals.get(name) {
            Some(value) => Ok(value.clone()),
            // Constructors such as `True` evaluate to themselves
            None if name.starts_with(char::is_uppercase) => Ok(Value::String(name.clone())),
            None => Err(ContractError::Runtime(format!("Unbound identifier '{}'", name))),
        },
    }
}

fn unknown_field(field: &str) -> ContractError {
    ContractError::Runtime(format!("Unknown field '{}'", field))
}

fn describe(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("{}:{}: {}", d.line, d.column, d.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::tests::COUNTER;
    use serde_json::json;
    use session::{Account, Message};

    const DEPLOYER: &str = "0x00000000000000000000000000000000000000aa";

    fn chain() -> ChainState {
        ChainState::with_accounts([Account {
            address: DEPLOYER.into(),
            balance: 1_000_000,
            nonce: 0,
        }])
    }

    fn executor() -> Executor {
        Executor::new(GasSchedule::test())
    }

    fn deploy_request(state: &ChainState, code: &str) -> DeployRequest {
        DeployRequest {
            code: code.into(),
            init: vec![
                KVPair::new("owner", "ByStr20", json!(DEPLOYER)),
                KVPair::new("start", "Uint32", json!("7")),
            ],
            message: Message::default(),
            deployer: state.account(DEPLOYER).unwrap().clone(),
            gas_limit: 1_000,
            gas_price: 1,
        }
    }

    fn deploy_counter(state: &mut ChainState) -> Deployment {
        let request = deploy_request(state, COUNTER);
        executor().deploy(state, &request).unwrap()
    }

    fn call_request(state: &ChainState, address: &str, transition: &str, params: Vec<KVPair>) -> CallRequest {
        CallRequest {
            address: address.into(),
            transition: transition.into(),
            params,
            message: Message::default(),
            caller: state.account(DEPLOYER).unwrap().clone(),
            gas_limit: 1_000,
            gas_price: 1,
        }
    }

    fn field<'a>(state: &'a [KVPair], name: &str) -> &'a Value {
        &state.iter().find(|kv| kv.vname == name).unwrap().value
    }

    #[test]
    fn test_deploy_initialises_fields() {
        let mut state = chain();
        let request = deploy_request(&state, COUNTER);
        let deployment = executor().deploy(&mut state, &request).unwrap();

        assert_eq!(deployment.address, ChainState::create_address(DEPLOYER, 0));
        assert_eq!(deployment.abi.name, "Counter");
        assert_eq!(field(&deployment.state, "count"), &json!("7"));
        assert_eq!(field(&deployment.state, "owner_copy"), &json!(DEPLOYER));
        assert_eq!(field(&deployment.state, "label"), &json!("counter"));
        assert_eq!(field(&deployment.state, "deposits"), &json!({}));
        assert_eq!(field(&deployment.state, "_balance"), &json!("0"));

        // 10 base + 5 fields
        assert_eq!(deployment.gas_used, 15);
        let deployer = state.account(DEPLOYER).unwrap();
        assert_eq!(deployer.balance, 1_000_000 - 15);
        assert_eq!(deployer.nonce, 1);
    }

    #[test]
    fn test_consecutive_deploys_get_distinct_addresses() {
        let mut state = chain();
        let first = deploy_counter(&mut state);
        let second = deploy_counter(&mut state);

        assert_ne!(first.address, second.address);
        assert_eq!(state.contracts().count(), 2);
    }

    #[test]
    fn test_deploy_rejects_bad_source() {
        let mut state = chain();
        let request = deploy_request(&state, "contract Broken (");
        let err = executor().deploy(&mut state, &request).unwrap_err();

        assert_eq!(err, ContractError::Rejected("1:17: Unclosed '('".into()));
        assert_eq!(state.account(DEPLOYER).unwrap().nonce, 0);
        assert_eq!(state.contracts().count(), 0);
    }

    #[test]
    fn test_deploy_requires_every_parameter() {
        let mut state = chain();
        let mut request = deploy_request(&state, COUNTER);
        request.init.retain(|kv| kv.vname != "start");

        assert_eq!(
            executor().deploy(&mut state, &request),
            Err(ContractError::MissingParameter("start".into()))
        );
    }

    #[test]
    fn test_deploy_requires_funds_for_gas_allowance() {
        let mut state = chain();
        let mut request = deploy_request(&state, COUNTER);
        request.gas_price = 1_000;
        request.gas_limit = 1_001;

        assert!(matches!(
            executor().deploy(&mut state, &request),
            Err(ContractError::InsufficientBalance { needed: 1_001_000, .. })
        ));
        assert_eq!(state.account(DEPLOYER).unwrap().balance, 1_000_000);
    }

    #[test]
    fn test_deploy_out_of_gas() {
        let mut state = chain();
        let mut request = deploy_request(&state, COUNTER);
        request.gas_limit = 12;

        assert_eq!(
            executor().deploy(&mut state, &request),
            Err(ContractError::OutOfGas { limit: 12 })
        );
        assert_eq!(state.contracts().count(), 0);
    }

    #[test]
    fn test_call_stores_params_and_sender() {
        let mut state = chain();
        let deployment = deploy_counter(&mut state);

        let request = call_request(
            &state,
            &deployment.address,
            "Set",
            vec![KVPair::new("value", "Uint32", json!("42"))],
        );
        let output = executor().call(&mut state, &request).unwrap();

        assert_eq!(field(&output.state, "count"), &json!("42"));
        assert_eq!(field(&output.state, "owner_copy"), &json!(DEPLOYER));
        // 5 base + 2 statements + 2 stores
        assert_eq!(output.gas_used, 11);
        assert_eq!(
            state.contract(&deployment.address).unwrap().state(),
            output.state
        );
    }

    #[test]
    fn test_accept_moves_amount_into_contract() {
        let mut state = chain();
        let deployment = deploy_counter(&mut state);
        let before = state.account(DEPLOYER).unwrap().balance;

        let mut request = call_request(&state, &deployment.address, "Deposit", vec![]);
        request.message.amount = 500;
        let output = executor().call(&mut state, &request).unwrap();

        assert_eq!(field(&output.state, "_balance"), &json!("500"));
        assert_eq!(field(&output.state, "label"), &json!("7"));
        assert_eq!(
            state.account(DEPLOYER).unwrap().balance,
            before - 500 - u128::from(output.gas_used)
        );
    }

    #[test]
    fn test_throw_leaves_state_untouched() {
        let mut state = chain();
        let deployment = deploy_counter(&mut state);
        let before = state.contract(&deployment.address).unwrap().state();
        let balance = state.account(DEPLOYER).unwrap().balance;

        let request = call_request(&state, &deployment.address, "Fail", vec![]);
        assert_eq!(
            executor().call(&mut state, &request),
            Err(ContractError::Thrown("Fail".into()))
        );
        assert_eq!(state.contract(&deployment.address).unwrap().state(), before);
        assert_eq!(state.account(DEPLOYER).unwrap().balance, balance);
    }

    #[test]
    fn test_call_failures() {
        let mut state = chain();
        let deployment = deploy_counter(&mut state);

        let request = call_request(&state, "0xdead", "Set", vec![]);
        assert_eq!(
            executor().call(&mut state, &request),
            Err(ContractError::ContractNotFound("0xdead".into()))
        );

        let request = call_request(&state, &deployment.address, "Nope", vec![]);
        assert_eq!(
            executor().call(&mut state, &request),
            Err(ContractError::UnknownTransition("Nope".into()))
        );

        let request = call_request(&state, &deployment.address, "Set", vec![]);
        assert_eq!(
            executor().call(&mut state, &request),
            Err(ContractError::MissingParameter("value".into()))
        );

        let mut request = call_request(
            &state,
            &deployment.address,
            "Set",
            vec![KVPair::new("value", "Uint32", json!("1"))],
        );
        request.gas_limit = 8;
        assert_eq!(
            executor().call(&mut state, &request),
            Err(ContractError::OutOfGas { limit: 8 })
        );
        assert_eq!(
            field(&state.contract(&deployment.address).unwrap().fields, "count"),
            &json!("7")
        );
    }
}
