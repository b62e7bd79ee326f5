//! Chain Relay - transaction relay gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chain_relay::{
    config::Args,
    db::{MemoryStore, MongoStore, Store},
    ledger::{spawn_probe_task, Ed25519Signer, LedgerPool},
    rewards::{spawn_reward_sync, RewardSync},
    server,
    worker::{Reconciler, RelayHandler, WorkerPool},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chain_relay={},info", log_level).into()),
        )
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let rpc_urls = args.rpc_url_list();
    info!("======================================");
    info!("  Chain Relay");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Ledger pool: {} endpoint(s)", rpc_urls.len());
    for (i, url) in rpc_urls.iter().enumerate() {
        info!("  rpc-{}: {}", i, url);
    }
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Workers: {} x {}", args.worker_count, args.queue_capacity);
    info!("Rate limit: {}/s, burst {}", args.tokens_per_second, args.token_max);
    info!("======================================");

    // In-memory store is only acceptable in dev mode
    let store: Arc<dyn Store> =
        match MongoStore::connect(&args.mongodb_uri, &args.mongodb_db, &args.mongodb_collection)
            .await
        {
            Ok(store) => Arc::new(store),
            Err(e) if args.dev_mode => {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                Arc::new(MemoryStore::new())
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        };

    let ledger = Arc::new(LedgerPool::connect(&args.pool_config())?);
    let _probe = spawn_probe_task(Arc::clone(&ledger), args.probe_interval());

    let settings = args.reconcile_settings().map_err(anyhow::Error::msg)?;
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&ledger),
        Arc::new(Ed25519Signer),
        settings,
    ));
    let workers = Arc::new(WorkerPool::start(
        args.worker_config(),
        Arc::new(RelayHandler::new(reconciler)),
    )?);
    info!("Worker pool started with {} shards", args.worker_count);

    let rewards = Arc::new(RewardSync::new(
        Arc::clone(&store),
        Arc::clone(&ledger),
        args.reward_config(),
    ));
    let _rewards = spawn_reward_sync(rewards);

    let state = Arc::new(server::AppState::new(
        args,
        store,
        ledger,
        Arc::clone(&workers),
    ));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };
    if let Err(e) = server::run(state, shutdown).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    // run() closes every connection, so the state it held is gone
    match Arc::try_unwrap(workers) {
        Ok(workers) => {
            info!("Draining workers");
            workers.shutdown().await;
        }
        Err(_) => warn!("Worker pool still shared, queued work dropped"),
    }

    info!("Chain Relay stopped");
    Ok(())
}
