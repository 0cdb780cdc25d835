//! ChainIntel Server
//!
//! Ingests blockchain transfer events, scores them for risk, routes alerts
//! and periodically replays recent blocks to catch missed events.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use chintel_core::entities::replay_job::{PgReplayJobStore, ReplayJobStore};
use chintel_core::entities::transfer_event::PgEventStore;
use chintel_core::events::transfer_event_channel;
use chintel_core::framework::DatabaseProcessor;
use chintel_core::notification::NotificationRouter;
use chintel_core::processors::{EventCollaborators, EventProcessor, IngestRunner, ReplayScheduler};
use chintel_core::queue::WorkQueue;
use chintel_core::services::{
    FacadeMetrics, HeuristicScorer, HttpNotifier, MetricsSink, RpcChainProvider,
};
use clap::Parser;
use config::{ConfigLoader, get_database_url};
use metrics_exporter_prometheus::PrometheusBuilder;
use server::{build_router, run_server};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// ChainIntel - blockchain event risk monitoring
#[derive(Parser, Debug)]
#[command(name = "chintel-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./chintel-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "CHINTEL_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.log_json);

    tracing::info!("Starting chintel-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.listen);
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    let listen_addr = loaded_config.listen;
    tracing::info!(
        chains = loaded_config.chains.len(),
        "Configuration loaded from {:?}",
        args.config
    );

    // Install the Prometheus recorder behind the metrics facade
    let prometheus = PrometheusBuilder::new().install_recorder().map_err(|e| {
        tracing::error!("Failed to install metrics recorder: {}", e);
        e
    })?;

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    // Build the processing pipeline
    let db = DatabaseProcessor {
        pool: db_pool.clone(),
    };
    let metrics: Arc<dyn MetricsSink> = Arc::new(FacadeMetrics);
    let jobs: Arc<dyn ReplayJobStore> = Arc::new(PgReplayJobStore::new(db.clone()));
    let notifier = HttpNotifier::new(loaded_config.notifier);
    tracing::info!(channels = ?notifier.configured_channels(), "Notifier ready");

    let processor = EventProcessor::new(
        loaded_config.processor,
        WorkQueue::new(loaded_config.queue),
        NotificationRouter::new(loaded_config.router),
        EventCollaborators {
            store: Arc::new(PgEventStore::new(db)),
            scorer: Arc::new(HeuristicScorer::new(loaded_config.scorer)),
            notifier: Arc::new(notifier),
            metrics: metrics.clone(),
        },
    );
    let provider = Arc::new(RpcChainProvider::new(
        loaded_config.chains,
        processor.clone(),
    ));
    let scheduler = ReplayScheduler::new(loaded_config.scheduler, provider, jobs.clone(), metrics);

    // Spawn background tasks
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, event_rx) = transfer_event_channel();
    let ingest_task = tokio::spawn(IngestRunner::new(processor, event_rx, shutdown_rx.clone()).run());
    let replay_task = tokio::spawn(scheduler.clone().run(shutdown_rx));

    // Create application state
    let state = AppState {
        db: db_pool.clone(),
        events: event_tx,
        scheduler,
        jobs,
        metrics: prometheus,
    };

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop background tasks and wait for in-flight events
    tracing::info!("Stopping background tasks...");
    if shutdown_tx.send(true).is_err() {
        tracing::debug!("Background tasks already stopped");
    }
    for (name, task) in [("ingest", ingest_task), ("replay", replay_task)] {
        if let Err(e) = task.await {
            tracing::error!(task = name, error = %e, "Background task failed");
        }
    }

    // Close database connections gracefully
    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,chintel_core=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
