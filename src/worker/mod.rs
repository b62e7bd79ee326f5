//! Worker module - sharded processing of chain-mutating work
//!
//! - **pool**: N single-consumer shards, routed by `partition_id % N`
//! - **reconcile**: the steps every handler composes (identity resolution,
//!   dedup markers, account repair, balance reconciliation, broadcast)
//! - **handlers**: one handler per [`WorkItem`] kind
//! - **settlement**: pure game-settlement arithmetic

pub mod handlers;
pub mod messages;
pub mod pool;
pub mod reconcile;
pub mod settlement;

pub use handlers::RelayHandler;
pub use messages::WorkItem;
pub use pool::{PoolStats, WorkHandler, WorkerPool, WorkerPoolConfig};
pub use reconcile::{ContractSettings, Creator, ReconcileSettings, Reconciler};
