//! Configuration for the relay
//!
//! CLI arguments and environment variable handling using clap. Every option
//! can be given as a flag or through the environment (a `.env` file is loaded
//! first by `main`).

use clap::Parser;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

use crate::ledger::LedgerPoolConfig;
use crate::namespace::Namespace;
use crate::rewards::RewardSyncConfig;
use crate::worker::{ContractSettings, Creator, ReconcileSettings, WorkerPoolConfig};

/// chain-relay - transaction relay between client apps and the ledger
#[derive(Parser, Debug, Clone)]
#[command(name = "chain-relay")]
#[command(about = "Relays application events to the ledger as signed transactions")]
#[command(args_override_self = true)]
pub struct Args {
    /// Unique node identifier for this relay instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Comma-separated ledger RPC endpoints, e.g. "http://a:8080,http://b:8080".
    /// The first live one is preferred.
    #[arg(long, env = "RPC_URLS", default_value = "http://127.0.0.1:8080")]
    pub rpc_urls: String,

    /// Timeout for ledger queries in milliseconds
    #[arg(long, env = "RPC_TIMEOUT_MS", default_value = "350")]
    pub rpc_timeout_ms: u64,

    /// Timeout for transaction broadcasts in milliseconds (0 = unbounded)
    #[arg(long, env = "BROADCAST_TIMEOUT_MS", default_value = "30000")]
    pub broadcast_timeout_ms: u64,

    /// Seconds between probes of dead ledger endpoints
    #[arg(long, env = "PROBE_INTERVAL_SECS", default_value = "15")]
    pub probe_interval_secs: u64,

    /// Timeout of a single probe call in milliseconds
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "50")]
    pub probe_timeout_ms: u64,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "chain_relay")]
    pub mongodb_db: String,

    /// MongoDB collection holding the key-value records
    #[arg(long, env = "MONGODB_COLLECTION", default_value = "relay_kv")]
    pub mongodb_collection: String,

    /// Enable development mode (falls back to an in-memory store)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Number of worker shards
    #[arg(long, env = "WORKER_COUNT", default_value = "100")]
    pub worker_count: usize,

    /// Queue capacity of each worker shard
    #[arg(long, env = "QUEUE_CAPACITY", default_value = "500")]
    pub queue_capacity: usize,

    /// Request tokens refilled per second
    #[arg(long, env = "TOKENS_PER_SECOND", default_value = "1000")]
    pub tokens_per_second: u32,

    /// Token bucket capacity (burst)
    #[arg(long, env = "TOKEN_MAX", default_value = "1500")]
    pub token_max: u32,

    /// Account creators per namespace: "PG:name:key,CT:name:key,G2:name:key"
    #[arg(long, env = "CREATORS")]
    pub creators: Option<String>,

    /// Account that deployed the engagement contract
    #[arg(long, env = "CONTRACT_DEPLOYER")]
    pub contract_deployer: Option<String>,

    /// Engagement contract name
    #[arg(long, env = "CONTRACT_NAME")]
    pub contract_name: Option<String>,

    /// Contract method recording a comment on a missing post
    #[arg(long, env = "CONTRACT_COMMENT_METHOD")]
    pub contract_comment_method: Option<String>,

    /// Contract method recording a daily sign-in
    #[arg(long, env = "CONTRACT_SIGN_IN_METHOD")]
    pub contract_sign_in_method: Option<String>,

    /// Contract method recording a like on a missing post
    #[arg(long, env = "CONTRACT_LIKE_METHOD")]
    pub contract_like_method: Option<String>,

    /// Gas limit for contract calls
    #[arg(long, env = "CONTRACT_GAS", default_value = "300000")]
    pub contract_gas: u64,

    /// Fee paid by the creator for each new account
    #[arg(long, env = "ACCOUNT_FEE", default_value = "1")]
    pub account_fee: u64,

    /// Reward sync interval when caught up, in milliseconds
    #[arg(long, env = "REWARD_INTERVAL_MS", default_value = "1000")]
    pub reward_interval_ms: u64,

    /// Reward sync interval while catching up, in milliseconds
    #[arg(long, env = "REWARD_FAST_INTERVAL_MS", default_value = "100")]
    pub reward_fast_interval_ms: u64,

    /// Treasury account funding top-ups and receiving refunds
    #[arg(long, env = "TREASURY_NAME")]
    pub treasury_name: Option<String>,

    /// Treasury private key (base58)
    #[arg(long, env = "TREASURY_KEY")]
    pub treasury_key: Option<String>,

    /// Balance granted on sign-in and fake engagement to poorer accounts
    #[arg(long, env = "MIN_BALANCE", default_value = "300000")]
    pub min_balance: u64,

    /// Surplus tolerated before a settlement refund
    #[arg(long, env = "REFUND_TOLERANCE", default_value = "0")]
    pub refund_tolerance: u64,
}

fn required(value: &Option<String>, var: &str) -> Result<String, String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("{} is required", var))
}

impl Args {
    /// Ledger endpoints in preference order
    pub fn rpc_url_list(&self) -> Vec<String> {
        self.rpc_urls
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Parse CREATORS into one creator per namespace
    pub fn creators(&self) -> Result<HashMap<Namespace, Creator>, String> {
        let raw = required(&self.creators, "CREATORS")?;
        let mut creators = HashMap::new();

        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.splitn(3, ':');
            let (tag, name, key) = match (parts.next(), parts.next(), parts.next()) {
                (Some(tag), Some(name), Some(key)) => (tag.trim(), name.trim(), key.trim()),
                _ => return Err(format!("CREATORS entry '{}' is not TAG:name:key", entry)),
            };
            let namespace = Namespace::from_tag(tag)
                .ok_or_else(|| format!("CREATORS entry has unknown namespace '{}'", tag))?;
            if name.is_empty() || key.is_empty() {
                return Err(format!("CREATORS entry for {} needs a name and a key", tag));
            }
            creators.insert(
                namespace,
                Creator {
                    name: name.to_string(),
                    private_key: key.to_string(),
                },
            );
        }

        if let Some(missing) = Namespace::ALL.iter().find(|ns| !creators.contains_key(*ns)) {
            return Err(format!("CREATORS has no entry for {}", missing.tag()));
        }
        Ok(creators)
    }

    pub fn treasury(&self) -> Result<Creator, String> {
        Ok(Creator {
            name: required(&self.treasury_name, "TREASURY_NAME")?,
            private_key: required(&self.treasury_key, "TREASURY_KEY")?,
        })
    }

    pub fn contract(&self) -> Result<ContractSettings, String> {
        Ok(ContractSettings {
            deployer: required(&self.contract_deployer, "CONTRACT_DEPLOYER")?,
            name: required(&self.contract_name, "CONTRACT_NAME")?,
            comment_method: required(&self.contract_comment_method, "CONTRACT_COMMENT_METHOD")?,
            sign_in_method: required(&self.contract_sign_in_method, "CONTRACT_SIGN_IN_METHOD")?,
            like_method: required(&self.contract_like_method, "CONTRACT_LIKE_METHOD")?,
            gas: self.contract_gas,
        })
    }

    pub fn reconcile_settings(&self) -> Result<ReconcileSettings, String> {
        Ok(ReconcileSettings {
            creators: self.creators()?,
            treasury: self.treasury()?,
            contract: self.contract()?,
            account_fee: self.account_fee,
            min_balance: self.min_balance,
            refund_tolerance: self.refund_tolerance,
        })
    }

    /// The contract deployer doubles as the probe account
    pub fn pool_config(&self) -> LedgerPoolConfig {
        LedgerPoolConfig {
            endpoints: self.rpc_url_list(),
            call_timeout: Duration::from_millis(self.rpc_timeout_ms),
            broadcast_timeout: match self.broadcast_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            probe_account: self.contract_deployer.clone().unwrap_or_default(),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
        }
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn worker_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            shard_count: self.worker_count,
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn reward_config(&self) -> RewardSyncConfig {
        RewardSyncConfig {
            steady_interval: Duration::from_millis(self.reward_interval_ms),
            fast_interval: Duration::from_millis(self.reward_fast_interval_ms),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.rpc_url_list().is_empty() {
            return Err("RPC_URLS must name at least one endpoint".to_string());
        }
        if self.worker_count == 0 {
            return Err("WORKER_COUNT must be greater than 0".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("QUEUE_CAPACITY must be greater than 0".to_string());
        }
        if self.tokens_per_second == 0 || self.token_max == 0 {
            return Err("TOKENS_PER_SECOND and TOKEN_MAX must be greater than 0".to_string());
        }
        if self.probe_interval_secs == 0 {
            return Err("PROBE_INTERVAL_SECS must be greater than 0".to_string());
        }

        self.reconcile_settings()?;
        Ok(())
    }
}
