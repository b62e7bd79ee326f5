//! Reward sync loop
//!
//! Each tick compares the persisted cursor `h` with the chain's irreversible
//! height `I`:
//!
//! - `h == I`: nothing to do
//! - `h > I`: the chain was reset, restart from 0
//! - otherwise credit block `h + 1`, then persist `h + 1`
//!
//! The loop sleeps the fast interval while more than one block behind.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::Store;
use crate::ledger::{LedgerPool, RewardEntry};
use crate::namespace::{reverse_key, BLOCK_HEIGHT_KEY, FIELD_REWARD};
use crate::types::{RelayError, Result};

#[derive(Debug, Clone)]
pub struct RewardSyncConfig {
    /// Sleep between ticks when caught up
    pub steady_interval: Duration,
    /// Sleep between ticks while catching up
    pub fast_interval: Duration,
}

impl Default for RewardSyncConfig {
    fn default() -> Self {
        Self {
            steady_interval: Duration::from_millis(1000),
            fast_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Cursor already at the irreversible height
    UpToDate { height: u64 },
    /// Block `height` processed and the cursor advanced to it
    Credited {
        height: u64,
        credited: usize,
        skipped: usize,
    },
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub outcome: TickOutcome,
    pub next_interval: Duration,
    /// The cursor was ahead of the chain and restarted from 0
    pub reset: bool,
}

pub struct RewardSync {
    store: Arc<dyn Store>,
    ledger: Arc<LedgerPool>,
    config: RewardSyncConfig,
}

impl RewardSync {
    pub fn new(store: Arc<dyn Store>, ledger: Arc<LedgerPool>, config: RewardSyncConfig) -> Self {
        Self {
            store,
            ledger,
            config,
        }
    }

    pub fn steady_interval(&self) -> Duration {
        self.config.steady_interval
    }

    /// Last processed block height; 0 before the first block
    pub async fn cursor(&self) -> Result<u64> {
        match self.store.get(BLOCK_HEIGHT_KEY).await? {
            None => Ok(0),
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                RelayError::Inconsistent(format!("block height cursor {:?} is not a number", raw))
            }),
        }
    }

    async fn set_cursor(&self, height: u64) -> Result<()> {
        self.store.set(BLOCK_HEIGHT_KEY, &height.to_string()).await
    }

    pub async fn tick(&self) -> Result<Tick> {
        let client = self.ledger.get_client();
        let mut height = self.cursor().await?;
        let irreversible = client.get_chain_state().await?.irreversible_height;

        let mut reset = false;
        if height > irreversible {
            warn!(
                cursor = height,
                irreversible, "Cursor ahead of chain, assuming reset"
            );
            height = 0;
            reset = true;
        }

        if height == irreversible {
            if reset {
                self.set_cursor(0).await?;
            }
            return Ok(Tick {
                outcome: TickOutcome::UpToDate { height },
                next_interval: self.config.steady_interval,
                reset,
            });
        }

        let next_interval = if irreversible - height > 1 {
            self.config.fast_interval
        } else {
            self.config.steady_interval
        };

        let block = height + 1;
        let rewards = client.get_block_rewards(block).await?;
        let mut credited = 0;
        let mut skipped = 0;
        for entry in &rewards {
            match self.credit(entry).await {
                Ok(true) => credited += 1,
                Ok(false) => skipped += 1,
                Err(e) => {
                    skipped += 1;
                    error!(height = block, account = %entry.account_name, error = %e, "Reward credit failed");
                }
            }
        }

        self.set_cursor(block).await?;
        Ok(Tick {
            outcome: TickOutcome::Credited {
                height: block,
                credited,
                skipped,
            },
            next_interval,
            reset,
        })
    }

    /// Returns `false` when the account has no local identity
    async fn credit(&self, entry: &RewardEntry) -> Result<bool> {
        let Some(identity_key) = self.store.get(&reverse_key(&entry.account_name)).await? else {
            return Ok(false);
        };
        let delta = i64::try_from(entry.reward).map_err(|_| {
            RelayError::Inconsistent(format!("reward {} does not fit a counter", entry.reward))
        })?;
        let total = self
            .store
            .hash_increment(&identity_key, FIELD_REWARD, delta)
            .await?;
        debug!(identity = %identity_key, reward = entry.reward, total, "Reward credited");
        Ok(true)
    }
}

/// Spawn the reward loop; a failed tick keeps the previous interval
pub fn spawn_reward_sync(sync: Arc<RewardSync>) -> JoinHandle<()> {
    info!(
        steady_ms = sync.config.steady_interval.as_millis() as u64,
        fast_ms = sync.config.fast_interval.as_millis() as u64,
        "Reward sync started"
    );

    tokio::spawn(async move {
        let mut interval = sync.steady_interval();
        loop {
            tokio::time::sleep(interval).await;
            match sync.tick().await {
                Ok(tick) => {
                    if let TickOutcome::Credited {
                        height,
                        credited,
                        skipped,
                    } = tick.outcome
                    {
                        debug!(height, credited, skipped, "Reward block processed");
                    }
                    interval = tick.next_interval;
                }
                Err(e) => error!(error = %e, "Reward sync tick failed"),
            }
        }
    })
}
