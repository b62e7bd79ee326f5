//! In-process sharded worker pool
//!
//! Each shard is one task draining its own bounded queue, one item at a time.
//! Items for the same partition always land on the same shard, so they are
//! applied in submission order. A full queue blocks `put` until the shard
//! catches up.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::WorkItem;
use crate::types::{RelayError, Result};

/// Processes one work item to completion
#[async_trait]
pub trait WorkHandler: Send + Sync {
    async fn handle(&self, shard: usize, item: WorkItem) -> Result<()>;
}

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of shards (one worker task each)
    pub shard_count: usize,
    /// Capacity of each shard's queue
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            shard_count: 100,
            queue_capacity: 500,
        }
    }
}

#[derive(Debug, Default)]
struct PoolMetrics {
    queued: AtomicUsize,
    processed: AtomicU64,
    duplicates: AtomicU64,
    failed: AtomicU64,
}

/// Counters reported by /health
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub shard_count: usize,
    pub queue_capacity: usize,
    pub queued: usize,
    pub processed: u64,
    pub duplicates: u64,
    pub failed: u64,
}

/// Sharded worker pool
pub struct WorkerPool {
    shards: Vec<mpsc::Sender<WorkItem>>,
    handles: Vec<JoinHandle<()>>,
    metrics: Arc<PoolMetrics>,
    queue_capacity: usize,
}

impl WorkerPool {
    /// Spawn one worker task per shard
    pub fn start(config: WorkerPoolConfig, handler: Arc<dyn WorkHandler>) -> Result<Self> {
        if config.shard_count == 0 || config.queue_capacity == 0 {
            return Err(RelayError::Config(
                "worker pool needs at least one shard and a non-zero queue".into(),
            ));
        }

        let metrics = Arc::new(PoolMetrics::default());
        let mut shards = Vec::with_capacity(config.shard_count);
        let mut handles = Vec::with_capacity(config.shard_count);

        for shard in 0..config.shard_count {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            shards.push(tx);
            handles.push(tokio::spawn(worker_task(
                shard,
                rx,
                Arc::clone(&handler),
                Arc::clone(&metrics),
            )));
        }

        info!(
            shards = config.shard_count,
            queue_capacity = config.queue_capacity,
            "Worker pool started"
        );

        Ok(Self {
            shards,
            handles,
            metrics,
            queue_capacity: config.queue_capacity,
        })
    }

    pub fn shard_for(&self, partition_id: u64) -> usize {
        (partition_id % self.shards.len() as u64) as usize
    }

    /// Enqueue an item on the shard owning `partition_id`.
    ///
    /// Waits while that shard's queue is full.
    pub async fn put(&self, partition_id: u64, item: WorkItem) -> Result<()> {
        let shard = self.shard_for(partition_id);
        let kind = item.kind();
        self.metrics.queued.fetch_add(1, Ordering::Relaxed);
        if self.shards[shard].send(item).await.is_err() {
            self.metrics.queued.fetch_sub(1, Ordering::Relaxed);
            return Err(RelayError::Internal(format!("worker shard {} closed", shard)));
        }
        debug!(shard, partition_id, kind, "Work item queued");
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            shard_count: self.shards.len(),
            queue_capacity: self.queue_capacity,
            queued: self.metrics.queued.load(Ordering::Relaxed),
            processed: self.metrics.processed.load(Ordering::Relaxed),
            duplicates: self.metrics.duplicates.load(Ordering::Relaxed),
            failed: self.metrics.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work and wait until every queued item is processed
    pub async fn shutdown(self) {
        drop(self.shards);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Worker task ended abnormally: {}", e);
            }
        }
        info!("Worker pool drained");
    }
}

/// Single consumer loop for one shard
async fn worker_task(
    shard: usize,
    mut rx: mpsc::Receiver<WorkItem>,
    handler: Arc<dyn WorkHandler>,
    metrics: Arc<PoolMetrics>,
) {
    debug!(shard, "Worker starting");

    while let Some(item) = rx.recv().await {
        metrics.queued.fetch_sub(1, Ordering::Relaxed);
        let kind = item.kind();
        let namespace = item.namespace();
        let subject = item.subject().to_string();

        let outcome = handler.handle(shard, item).await;
        metrics.processed.fetch_add(1, Ordering::Relaxed);

        match outcome {
            Ok(()) => debug!(shard, kind, %namespace, subject = %subject, "Work item applied"),
            Err(RelayError::Duplicate(reason)) => {
                metrics.duplicates.fetch_add(1, Ordering::Relaxed);
                info!(shard, kind, %namespace, subject = %subject, reason = %reason, "Duplicate work item dropped");
            }
            Err(RelayError::Inconsistent(reason)) => {
                metrics.failed.fetch_add(1, Ordering::Relaxed);
                warn!(shard, kind, %namespace, subject = %subject, reason = %reason, "Work item aborted on missing data");
            }
            Err(e) => {
                metrics.failed.fetch_add(1, Ordering::Relaxed);
                error!(shard, kind, %namespace, subject = %subject, error = %e, "Work item failed");
            }
        }
    }

    debug!(shard, "Worker shutting down (channel closed)");
}
