//! livetally server
//!
//! Runs the whole pipeline in one process: the durable event bus, the
//! tally aggregator and vote ledger consumer groups, the broadcast hub,
//! and the HTTP/WebSocket gateway. State is persisted to disk and
//! survives restarts.

use anyhow::Result;
use clap::Parser;
use event_bus::{BusConfig, EventBus};
use gateway::{
    GatewayContext, HttpServer, PollRegistry, SubscriptionManager, VoteIntake, WebSocketServer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tally::{CounterStore, TallyAggregator, TallyAggregatorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vote_ledger::{LedgerStore, LedgerWriter};

/// Live poll voting with real-time tally broadcast
#[derive(Parser, Debug)]
#[command(name = "livetally")]
#[command(about = "Event-driven vote tally pipeline with live broadcast", long_about = None)]
struct Args {
    /// HTTP intake bind address
    #[arg(long, default_value = "127.0.0.1:8080")]
    http_addr: String,

    /// WebSocket subscription bind address
    #[arg(long, default_value = "127.0.0.1:8081")]
    ws_addr: String,

    /// Data directory for the event bus and vote ledger
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Partitions per bus topic
    #[arg(long, default_value_t = event_bus::DEFAULT_PARTITIONS)]
    partitions: usize,

    /// Bounded queue capacity per subscriber connection
    #[arg(long, default_value_t = gateway::DEFAULT_SUBSCRIBER_QUEUE)]
    subscriber_queue: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting livetally");
    tracing::info!("  HTTP intake: {}", args.http_addr);
    tracing::info!("  WebSocket: {}", args.ws_addr);
    tracing::info!("  Data directory: {:?}", args.data_dir);
    tracing::info!("  Partitions per topic: {}", args.partitions);

    std::fs::create_dir_all(&args.data_dir)?;

    // Durable transport and ledger
    let bus = Arc::new(EventBus::open(
        args.data_dir.join("bus"),
        BusConfig {
            partitions: args.partitions,
        },
    )?);
    let ledger_store = Arc::new(LedgerStore::open(args.data_dir.join("ledger"))?);

    // Tally aggregator: one worker per partition
    let aggregator = Arc::new(TallyAggregator::new(
        bus.clone(),
        CounterStore::new(),
        TallyAggregatorConfig::default(),
    ));
    let tally_workers = aggregator.clone().spawn_workers(bus.partitions());

    // Vote ledger: independent consumer group, one worker per partition
    let ledger_writer = Arc::new(LedgerWriter::new(bus.clone(), ledger_store.clone()));
    let ledger_workers = ledger_writer.clone().spawn_workers(bus.partitions());

    // Broadcast hub, fed from the aggregator's update stream
    let subscription_manager = Arc::new(SubscriptionManager::new(args.subscriber_queue));
    let fanout = tokio::spawn(
        subscription_manager
            .clone()
            .forward_updates(aggregator.subscribe()),
    );

    // HTTP intake
    let context = Arc::new(GatewayContext {
        intake: VoteIntake::new(bus.clone()),
        polls: PollRegistry::new(bus.clone()),
    });
    let http_addr = args.http_addr.clone();
    let http_server = tokio::spawn(async move {
        if let Err(e) = HttpServer::new(context).run(&http_addr).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    // WebSocket subscriptions
    let ws_manager = subscription_manager.clone();
    let ws_addr = args.ws_addr.clone();
    let ws_server = tokio::spawn(async move {
        if let Err(e) = WebSocketServer::new(ws_manager).run(&ws_addr).await {
            tracing::error!("WebSocket server error: {}", e);
        }
    });

    tracing::info!("livetally running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");

    // Flush durable state; in-flight uncommitted batches are simply
    // redelivered on the next start.
    if let Err(e) = bus.flush() {
        tracing::error!("Failed to flush event bus: {}", e);
    }
    if let Err(e) = ledger_store.flush() {
        tracing::error!("Failed to flush vote ledger: {}", e);
    }

    for worker in tally_workers.into_iter().chain(ledger_workers) {
        worker.abort();
    }
    fanout.abort();
    http_server.abort();
    ws_server.abort();

    tracing::info!("livetally stopped");

    Ok(())
}
