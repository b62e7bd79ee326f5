//! Ledger RPC capability and wire types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::signer::SignedTransaction;
use crate::types::Result;

/// Broadcast status the ledger reports for an accepted transaction
pub const BROADCAST_SUCCESS: u32 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub name: String,
    pub balance: u64,
}

/// Snapshot of the chain head used for finality checks and transaction stamping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub irreversible_height: u64,
    pub head_height: u64,
    /// Hex-encoded head block id
    pub head_block_id: String,
    /// Head block time, unix seconds
    pub head_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReceipt {
    pub status: u32,
    #[serde(default)]
    pub message: String,
}

impl BroadcastReceipt {
    pub fn is_success(&self) -> bool {
        self.status == BROADCAST_SUCCESS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEntry {
    pub account_name: String,
    pub reward: u64,
}

/// One entry of a user's on-chain history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub tx_hash: String,
    pub block_time: String,
    /// Kind of the first operation (`post`, `reply`, `follow`, `vote`, ...)
    pub operation: String,
}

impl ActionRecord {
    /// Label shown to client applications
    pub fn label(&self) -> &'static str {
        match self.operation.as_str() {
            "post" => "Post",
            "reply" => "Comment",
            "follow" => "Follow",
            "vote" => "Like",
            "contract_apply" => "Signin",
            _ => "otherAction",
        }
    }
}

/// Remote ledger node
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// `Ok(None)` when the account does not exist
    async fn get_account_by_name(&self, name: &str) -> Result<Option<AccountInfo>>;

    async fn get_chain_state(&self) -> Result<ChainState>;

    async fn broadcast_transaction(&self, tx: &SignedTransaction) -> Result<BroadcastReceipt>;

    async fn get_block_rewards(&self, height: u64) -> Result<Vec<RewardEntry>>;

    async fn get_user_action_history(&self, name: &str, limit: u32) -> Result<Vec<ActionRecord>>;
}
