//! Reward synchronization
//!
//! Walks irreversible blocks one at a time and credits each block's rewards
//! to the local identity that owns the rewarded chain account.

pub mod sync;

pub use sync::{spawn_reward_sync, RewardSync, RewardSyncConfig, Tick, TickOutcome};
