//! Chain Relay - transaction relay gateway for a content ledger
//!
//! Client applications post events (accounts, posts, likes, comments,
//! follows, sign-ins, game results) over HTTP. The relay validates them
//! against its local identity store and hands them to a sharded worker pool,
//! which signs and broadcasts the matching ledger transactions.
//!
//! ## Services
//!
//! - **Intake**: form-encoded `/api/*` endpoints with a global token bucket
//! - **Workers**: per-user ordered processing of chain-mutating work
//! - **Ledger pool**: ordered RPC failover with background liveness probing
//! - **Reward sync**: credits per-block rewards from irreversible blocks

pub mod config;
pub mod db;
pub mod ledger;
pub mod namespace;
pub mod rewards;
pub mod routes;
pub mod server;
pub mod types;
pub mod worker;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{RelayError, Result};
