//! Scriptable in-memory ledger for tests
//!
//! Records every call, applies account creations and transfers from accepted
//! broadcasts, and can be switched into transport failure or slow mode.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::rpc::{
    AccountInfo, ActionRecord, BroadcastReceipt, ChainState, LedgerRpc, RewardEntry,
    BROADCAST_SUCCESS,
};
use super::signer::{Operation, SignedTransaction};
use crate::types::{RelayError, Result};

struct MockState {
    accounts: HashMap<String, u64>,
    chain: ChainState,
    rewards: HashMap<u64, Vec<RewardEntry>>,
    history: HashMap<String, Vec<ActionRecord>>,
    calls: Vec<String>,
    broadcasts: Vec<SignedTransaction>,
}

pub struct MockLedger {
    state: Mutex<MockState>,
    transport_down: AtomicBool,
    broadcast_status: AtomicU32,
    delay: Mutex<Option<Duration>>,
    broadcast_delay: Mutex<Option<Duration>>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                accounts: HashMap::new(),
                chain: ChainState {
                    irreversible_height: 0,
                    head_height: 100,
                    head_block_id: "00000064aabbccddeeff00112233445566778899".into(),
                    head_time: 1_700_000_000,
                },
                rewards: HashMap::new(),
                history: HashMap::new(),
                calls: Vec::new(),
                broadcasts: Vec::new(),
            }),
            transport_down: AtomicBool::new(false),
            broadcast_status: AtomicU32::new(BROADCAST_SUCCESS),
            delay: Mutex::new(None),
            broadcast_delay: Mutex::new(None),
        }
    }

    pub fn add_account(&self, name: &str, balance: u64) {
        self.state.lock().unwrap().accounts.insert(name.to_string(), balance);
    }

    pub fn balance(&self, name: &str) -> Option<u64> {
        self.state.lock().unwrap().accounts.get(name).copied()
    }

    pub fn set_irreversible_height(&self, height: u64) {
        self.state.lock().unwrap().chain.irreversible_height = height;
    }

    pub fn set_rewards(&self, height: u64, rewards: Vec<RewardEntry>) {
        self.state.lock().unwrap().rewards.insert(height, rewards);
    }

    pub fn set_history(&self, name: &str, records: Vec<ActionRecord>) {
        self.state
            .lock()
            .unwrap()
            .history
            .insert(name.to_string(), records);
    }

    pub fn fail_transport(&self, down: bool) {
        self.transport_down.store(down, Ordering::SeqCst);
    }

    pub fn set_broadcast_status(&self, status: u32) {
        self.broadcast_status.store(status, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Slow down broadcasts only
    pub fn set_broadcast_delay(&self, delay: Duration) {
        *self.broadcast_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn broadcasts(&self) -> Vec<SignedTransaction> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    /// Operations of every broadcast attempt, in order
    pub fn operations(&self) -> Vec<Operation> {
        self.broadcasts()
            .into_iter()
            .flat_map(|tx| tx.trx.operations)
            .collect()
    }

    async fn enter(&self, call: String) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().unwrap().calls.push(call);
        if self.transport_down.load(Ordering::SeqCst) {
            return Err(RelayError::Transport("mock ledger unreachable".into()));
        }
        Ok(())
    }
}

fn apply(accounts: &mut HashMap<String, u64>, op: &Operation) {
    match op {
        Operation::AccountCreate {
            new_account_name, ..
        } => {
            accounts.entry(new_account_name.clone()).or_insert(0);
        }
        Operation::Transfer {
            from, to, amount, ..
        } => {
            if let Some(balance) = accounts.get_mut(from) {
                *balance = balance.saturating_sub(*amount);
            }
            *accounts.entry(to.clone()).or_insert(0) += amount;
        }
        _ => {}
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn get_account_by_name(&self, name: &str) -> Result<Option<AccountInfo>> {
        self.enter(format!("get_account:{}", name)).await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .accounts
            .get(name)
            .map(|balance| AccountInfo {
                name: name.to_string(),
                balance: *balance,
            }))
    }

    async fn get_chain_state(&self) -> Result<ChainState> {
        self.enter("chain_state".into()).await?;
        Ok(self.state.lock().unwrap().chain.clone())
    }

    async fn broadcast_transaction(&self, tx: &SignedTransaction) -> Result<BroadcastReceipt> {
        let delay = *self.broadcast_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.enter(format!("broadcast:{}", tx.kinds().join("+"))).await?;
        let status = self.broadcast_status.load(Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.broadcasts.push(tx.clone());
        if status == BROADCAST_SUCCESS {
            for op in &tx.trx.operations {
                apply(&mut state.accounts, op);
            }
        }
        Ok(BroadcastReceipt {
            status,
            message: String::new(),
        })
    }

    async fn get_block_rewards(&self, height: u64) -> Result<Vec<RewardEntry>> {
        self.enter(format!("rewards:{}", height)).await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .rewards
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_user_action_history(&self, name: &str, limit: u32) -> Result<Vec<ActionRecord>> {
        self.enter(format!("history:{}", name)).await?;
        let mut records = self
            .state
            .lock()
            .unwrap()
            .history
            .get(name)
            .cloned()
            .unwrap_or_default();
        records.truncate(limit as usize);
        Ok(records)
    }
}
