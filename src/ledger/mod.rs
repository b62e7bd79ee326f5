//! Ledger access
//!
//! - [`LedgerRpc`]: the remote node capability (one implementation per transport)
//! - [`LedgerClient`]: one endpoint with liveness and per-call timeouts
//! - [`LedgerPool`]: ordered failover list of clients plus the dead-endpoint prober
//! - [`signer`]: transaction stamping, signing and key generation

pub mod http_client;
#[cfg(test)]
pub mod mock;
pub mod pool;
pub mod rpc;
pub mod signer;

pub use http_client::HttpLedgerClient;
pub use pool::{spawn_probe_task, EndpointStatus, LedgerClient, LedgerPool, LedgerPoolConfig};
pub use rpc::{
    AccountInfo, ActionRecord, BroadcastReceipt, ChainState, LedgerRpc, RewardEntry,
    BROADCAST_SUCCESS,
};
pub use signer::{
    generate_content_uuid, generate_key_pair, Beneficiary, Ed25519Signer, KeyPair, Operation,
    SignedTransaction, Transaction, TransactionSigner,
};
