// simulator/src/state.rs

use crate::{parse::ContractDef, ContractError, ContractResult};
use serde_json::json;
use session::{Abi, Account, Address, Amount, BlockNumber, ChainSnapshot, KVPair};
use sha3::{Digest, Keccak256};
use std::collections::{BTreeMap, HashMap};

/// Deployed contract with its analysed source
#[derive(Debug, Clone)]
pub struct ContractRecord {
    pub address: Address,
    pub abi: Abi,
    pub def: ContractDef,
    /// Field values in declaration order
    pub fields: Vec<KVPair>,
    pub balance: Amount,
}

impl ContractRecord {
    /// Field values followed by the contract balance
    pub fn state(&self) -> Vec<KVPair> {
        let mut state = self.fields.clone();
        state.push(KVPair::new(
            "_balance",
            "Uint128",
            json!(self.balance.to_string()),
        ));
        state
    }
}

/// Accounts, contracts and block height of the simulated chain
#[derive(Debug, Clone, Default)]
pub struct ChainState {
    block_num: BlockNumber,
    accounts: BTreeMap<Address, Account>,
    contracts: HashMap<Address, ContractRecord>,
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|account| (account.address.clone(), account))
                .collect(),
            ..Default::default()
        }
    }

    /// Last 20 bytes of the Keccak-256 of `seed`, `0x`-hex
    pub fn derive_address(seed: &[u8]) -> Address {
        let hash = Keccak256::digest(seed);
        format!("0x{}", hex::encode(&hash[12..]))
    }

    /// Address of the contract created by `deployer` at `nonce`
    pub fn create_address(deployer: &str, nonce: u64) -> Address {
        let mut data = deployer.as_bytes().to_vec();
        data.extend_from_slice(&nonce.to_be_bytes());
        Self::derive_address(&data)
    }

    pub fn block_num(&self) -> BlockNumber {
        self.block_num
    }

    pub fn advance_block(&mut self) -> BlockNumber {
        self.block_num += 1;
        self.block_num
    }

    pub fn account(&self, address: &str) -> ContractResult<&Account> {
        self.accounts
            .get(address)
            .ok_or_else(|| ContractError::AccountNotFound(address.to_string()))
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn debit(&mut self, address: &str, amount: Amount) -> ContractResult<()> {
        let account = self
            .accounts
            .get_mut(address)
            .ok_or_else(|| ContractError::AccountNotFound(address.to_string()))?;
        account.balance = account.balance.checked_sub(amount).ok_or(
            ContractError::InsufficientBalance {
                needed: amount,
                available: account.balance,
            },
        )?;
        Ok(())
    }

    pub fn increment_nonce(&mut self, address: &str) {
        if let Some(account) = self.accounts.get_mut(address) {
            account.nonce += 1;
        }
    }

    pub fn contract(&self, address: &str) -> Option<&ContractRecord> {
        self.contracts.get(address)
    }

    pub fn contract_mut(&mut self, address: &str) -> Option<&mut ContractRecord> {
        self.contracts.get_mut(address)
    }

    pub fn insert_contract(&mut self, record: ContractRecord) {
        self.contracts.insert(record.address.clone(), record);
    }

    pub fn contracts(&self) -> impl Iterator<Item = &ContractRecord> {
        self.contracts.values()
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            block_num: self.block_num,
            accounts: self.accounts.clone(),
        }
    }
}
