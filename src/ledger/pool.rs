//! Ledger connection pool with failover and dead-endpoint probing
//!
//! The pool keeps an ordered list of clients. Position 0 is the preferred
//! endpoint. When it is dead, [`LedgerPool::get_client`] scans from the tail
//! for a live client and swaps it to the front, so whichever endpoint most
//! recently proved alive stays preferred.
//!
//! Endpoints are demoted only by real call failures. A background prober
//! revisits dead endpoints on a fixed interval with one short lookup each.

use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::http_client::HttpLedgerClient;
use super::rpc::{AccountInfo, ActionRecord, BroadcastReceipt, ChainState, LedgerRpc, RewardEntry};
use super::signer::SignedTransaction;
use crate::types::{RelayError, Result};

/// One ledger endpoint
pub struct LedgerClient {
    address: String,
    alive: AtomicBool,
    call_timeout: Duration,
    broadcast_timeout: Option<Duration>,
    rpc: Arc<dyn LedgerRpc>,
}

impl LedgerClient {
    pub fn new(
        address: impl Into<String>,
        rpc: Arc<dyn LedgerRpc>,
        call_timeout: Duration,
        broadcast_timeout: Option<Duration>,
    ) -> Self {
        Self {
            address: address.into(),
            alive: AtomicBool::new(true),
            call_timeout,
            broadcast_timeout,
            rpc,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn set_alive(&self, alive: bool) {
        let was = self.alive.swap(alive, Ordering::AcqRel);
        if was && !alive {
            warn!(endpoint = %self.address, "Ledger endpoint marked dead");
        } else if !was && alive {
            info!(endpoint = %self.address, "Ledger endpoint alive again");
        }
    }

    /// Bound a call and demote this endpoint on transport failure
    async fn guarded<T, F>(&self, limit: Option<Duration>, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = match limit {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(RelayError::Transport(format!(
                    "{} timed out after {}ms",
                    self.address,
                    limit.as_millis()
                ))),
            },
            None => call.await,
        };

        if let Err(e) = &result {
            if e.is_transport() {
                self.set_alive(false);
            }
        }
        result
    }

    pub async fn get_account_by_name(&self, name: &str) -> Result<Option<AccountInfo>> {
        self.guarded(Some(self.call_timeout), self.rpc.get_account_by_name(name))
            .await
    }

    pub async fn get_chain_state(&self) -> Result<ChainState> {
        self.guarded(Some(self.call_timeout), self.rpc.get_chain_state())
            .await
    }

    pub async fn broadcast_transaction(&self, tx: &SignedTransaction) -> Result<BroadcastReceipt> {
        self.guarded(self.broadcast_timeout, self.rpc.broadcast_transaction(tx))
            .await
    }

    pub async fn get_block_rewards(&self, height: u64) -> Result<Vec<RewardEntry>> {
        self.guarded(Some(self.call_timeout), self.rpc.get_block_rewards(height))
            .await
    }

    pub async fn get_user_action_history(
        &self,
        name: &str,
        limit: u32,
    ) -> Result<Vec<ActionRecord>> {
        self.guarded(
            Some(self.call_timeout),
            self.rpc.get_user_action_history(name, limit),
        )
        .await
    }

    /// One lightweight lookup; success marks the endpoint alive
    pub async fn probe(&self, account: &str, timeout: Duration) -> bool {
        let ok = matches!(
            tokio::time::timeout(timeout, self.rpc.get_account_by_name(account)).await,
            Ok(Ok(_))
        );
        if ok {
            self.set_alive(true);
        }
        ok
    }
}

/// Pool construction parameters
#[derive(Debug, Clone)]
pub struct LedgerPoolConfig {
    pub endpoints: Vec<String>,
    pub call_timeout: Duration,
    /// `None` leaves broadcasts unbounded
    pub broadcast_timeout: Option<Duration>,
    /// Account looked up by the prober
    pub probe_account: String,
    pub probe_timeout: Duration,
}

/// Liveness of one endpoint, as reported by /health
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub address: String,
    pub alive: bool,
}

/// Ordered failover list of ledger clients
pub struct LedgerPool {
    clients: Mutex<Vec<Arc<LedgerClient>>>,
    probe_account: String,
    probe_timeout: Duration,
}

impl LedgerPool {
    pub fn new(
        clients: Vec<Arc<LedgerClient>>,
        probe_account: impl Into<String>,
        probe_timeout: Duration,
    ) -> Result<Self> {
        if clients.is_empty() {
            return Err(RelayError::Config("ledger pool needs at least one endpoint".into()));
        }
        Ok(Self {
            clients: Mutex::new(clients),
            probe_account: probe_account.into(),
            probe_timeout,
        })
    }

    /// Build an HTTP client for every configured endpoint
    pub fn connect(config: &LedgerPoolConfig) -> Result<Self> {
        let clients = config
            .endpoints
            .iter()
            .map(|address| -> Result<Arc<LedgerClient>> {
                let rpc: Arc<dyn LedgerRpc> = Arc::new(HttpLedgerClient::new(address)?);
                Ok(Arc::new(LedgerClient::new(
                    address.clone(),
                    rpc,
                    config.call_timeout,
                    config.broadcast_timeout,
                )))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(endpoints = clients.len(), "Ledger pool created");
        Self::new(clients, config.probe_account.clone(), config.probe_timeout)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<LedgerClient>>> {
        // A panic while holding the lock cannot leave the list half-swapped
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Preferred client, failing over to the last live one found from the tail.
    ///
    /// When nothing is alive the front client is returned anyway.
    pub fn get_client(&self) -> Arc<LedgerClient> {
        let mut clients = self.lock();
        if !clients[0].is_alive() {
            if let Some(i) = (1..clients.len()).rev().find(|&i| clients[i].is_alive()) {
                clients.swap(0, i);
                debug!(endpoint = %clients[0].address(), "Ledger pool failed over");
            }
        }
        Arc::clone(&clients[0])
    }

    pub fn alive_count(&self) -> usize {
        self.lock().iter().filter(|c| c.is_alive()).count()
    }

    pub fn snapshot(&self) -> Vec<EndpointStatus> {
        self.lock()
            .iter()
            .map(|c| EndpointStatus {
                address: c.address().to_string(),
                alive: c.is_alive(),
            })
            .collect()
    }

    /// Probe every dead endpoint once, concurrently.
    ///
    /// Returns `(revived, still_dead)`.
    pub async fn probe_dead(&self) -> (usize, usize) {
        let dead: Vec<Arc<LedgerClient>> =
            self.lock().iter().filter(|c| !c.is_alive()).cloned().collect();
        if dead.is_empty() {
            return (0, 0);
        }

        let results = join_all(
            dead.iter()
                .map(|c| c.probe(&self.probe_account, self.probe_timeout)),
        )
        .await;

        let revived = results.iter().filter(|ok| **ok).count();
        (revived, results.len() - revived)
    }
}

/// Spawn the dead-endpoint prober
pub fn spawn_probe_task(pool: Arc<LedgerPool>, interval: Duration) -> JoinHandle<()> {
    info!(
        interval_secs = interval.as_secs(),
        "Ledger probe task started"
    );

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let (revived, still_dead) = pool.probe_dead().await;
            if revived > 0 || still_dead > 0 {
                debug!(
                    revived,
                    still_dead,
                    alive = pool.alive_count(),
                    "Ledger probe round finished"
                );
            }
        }
    })
}
