// simulator/src/chain.rs

use crate::{gas::GasSchedule, state::ChainState, vm::Executor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use session::{
    Account, Address, BlockNumber, CallRequest, ChainProvider, ChainSnapshot, DeployRequest,
    Deployment, ExecutionBackend, ExecutionError, RunnerOutput,
};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

/// Explicitly configured genesis account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: u64,
}

/// Simulated chain configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Generated accounts when `accounts` is empty
    pub account_count: usize,
    /// Balance of each generated account
    pub initial_balance: u64,
    /// Block production interval (0 disables the producer)
    pub block_time_ms: u64,
    /// Artificial delay before every deploy or call
    pub latency_ms: u64,
    pub accounts: Vec<GenesisAccount>,
    pub gas: GasSchedule,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            account_count: 3,
            initial_balance: 1_000_000_000,
            block_time_ms: 5_000,
            latency_ms: 0,
            accounts: Vec::new(),
            gas: GasSchedule::default(),
        }
    }
}

impl ChainConfig {
    /// Accounts that exist at block 0
    pub fn genesis_accounts(&self) -> Vec<Account> {
        if !self.accounts.is_empty() {
            return self
                .accounts
                .iter()
                .map(|a| Account {
                    address: a.address.clone(),
                    balance: a.balance.into(),
                    nonce: 0,
                })
                .collect();
        }

        (0..self.account_count)
            .map(|i| Account {
                address: ChainState::derive_address(format!("genesis-{}", i).as_bytes()),
                balance: self.initial_balance.into(),
                nonce: 0,
            })
            .collect()
    }
}

/// In-process chain serving deploys, calls and snapshots.
///
/// Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct SimulatedChain {
    state: Arc<RwLock<ChainState>>,
    executor: Executor,
    latency: Duration,
}

impl SimulatedChain {
    pub fn new(config: &ChainConfig) -> Self {
        let accounts = config.genesis_accounts();
        tracing::info!("✓ Simulated chain initialized with {} accounts", accounts.len());

        Self {
            state: Arc::new(RwLock::new(ChainState::with_accounts(accounts))),
            executor: Executor::new(config.gas.clone()),
            latency: Duration::from_millis(config.latency_ms),
        }
    }

    pub fn block_num(&self) -> BlockNumber {
        self.read().block_num()
    }

    pub fn advance_block(&self) -> BlockNumber {
        self.write().advance_block()
    }

    /// Advance the block height every `every` until the task is aborted
    pub fn spawn_block_producer(&self, every: Duration) -> JoinHandle<()> {
        let chain = self.clone();
        let every = every.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = interval(every);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let height = chain.advance_block();
                tracing::debug!("Produced block {}", height);
            }
        })
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ExecutionBackend for SimulatedChain {
    async fn deploy(&self, request: DeployRequest) -> Result<Deployment, ExecutionError> {
        self.delay().await;
        let mut state = self.write();
        let deployment = self.executor.deploy(&mut state, &request)?;
        tracing::info!(
            "✓ {} deployed at {} in block {}",
            deployment.abi.name,
            deployment.address,
            state.block_num()
        );
        Ok(deployment)
    }

    async fn call(&self, request: CallRequest) -> Result<RunnerOutput, ExecutionError> {
        self.delay().await;
        let mut state = self.write();
        let output = self.executor.call(&mut state, &request)?;
        tracing::info!(
            "✓ {} executed on {} in block {}",
            request.transition,
            output.address,
            state.block_num()
        );
        Ok(output)
    }
}

impl ChainProvider for SimulatedChain {
    fn snapshot(&self) -> ChainSnapshot {
        self.read().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::tests::COUNTER;
    use serde_json::json;
    use session::{KVPair, Message};

    fn chain() -> SimulatedChain {
        SimulatedChain::new(&ChainConfig {
            gas: GasSchedule::test(),
            ..Default::default()
        })
    }

    fn first_account(chain: &SimulatedChain) -> Account {
        chain.snapshot().accounts.into_values().next().unwrap()
    }

    #[test]
    fn test_generated_genesis_is_deterministic() {
        let config = ChainConfig::default();
        let accounts = config.genesis_accounts();

        assert_eq!(accounts.len(), 3);
        assert_eq!(accounts, config.genesis_accounts());
        assert!(accounts.iter().all(|a| a.balance == 1_000_000_000));
    }

    #[test]
    fn test_explicit_genesis_accounts() {
        let config = ChainConfig {
            accounts: vec![GenesisAccount {
                address: "0xabc".into(),
                balance: 42,
            }],
            ..Default::default()
        };
        let snapshot = SimulatedChain::new(&config).snapshot();

        assert_eq!(snapshot.accounts.len(), 1);
        assert_eq!(snapshot.accounts["0xabc"].balance, 42);
        assert_eq!(snapshot.block_num, 0);
    }

    #[tokio::test]
    async fn test_deploy_then_call() {
        let chain = chain();
        let account = first_account(&chain);

        let deployment = chain
            .deploy(DeployRequest {
                code: COUNTER.into(),
                init: vec![
                    KVPair::new("owner", "ByStr20", json!(account.address)),
                    KVPair::new("start", "Uint32", json!("0")),
                ],
                message: Message::default(),
                deployer: account.clone(),
                gas_limit: 1_000,
                gas_price: 1,
            })
            .await
            .unwrap();

        let output = chain
            .call(CallRequest {
                address: deployment.address.clone(),
                transition: "Set".into(),
                params: vec![KVPair::new("value", "Uint32", json!("3"))],
                message: Message::default(),
                caller: account.clone(),
                gas_limit: 1_000,
                gas_price: 1,
            })
            .await
            .unwrap();

        assert_eq!(output.address, deployment.address);
        let count = output.state.iter().find(|kv| kv.vname == "count").unwrap();
        assert_eq!(count.value, json!("3"));
        assert_eq!(chain.snapshot().accounts[&account.address].nonce, 2);
    }

    #[tokio::test]
    async fn test_failures_convert_to_execution_errors() {
        let chain = chain();
        let account = first_account(&chain);

        let err = chain
            .call(CallRequest {
                address: "0xnone".into(),
                transition: "Set".into(),
                params: vec![],
                message: Message::default(),
                caller: account,
                gas_limit: 1_000,
                gas_price: 1,
            })
            .await
            .unwrap_err();
        assert_eq!(err, ExecutionError::ContractNotFound("0xnone".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_producer_advances_height() {
        let chain = chain();
        let producer = chain.spawn_block_producer(Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(chain.block_num() >= 3);

        producer.abort();
    }
}
