//! Stagehand API Server

use clap::Parser;
use stagehand_config::{LogFormat, StagehandConfig, load_config};
use stagehand_core::MemoryStageStore;
use stagehand_db::connect;
use stagehand_server::{AppState, routes};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stagehand-server")]
#[command(about = "Pull-based stage scheduler for CI runners", long_about = None)]
struct Cli {
    /// Path to the KDL configuration file
    #[arg(long, env = "STAGEHAND_CONFIG")]
    config: Option<PathBuf>,

    /// PostgreSQL URL; overrides the configuration file
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Address to listen on; overrides the configuration file
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => StagehandConfig::default(),
    };
    if let Some(url) = cli.database_url {
        config.server.database_url = Some(url);
    }
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    init_tracing(config.server.log_format);

    let (state, scheduler) = match &config.server.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let store = connect(url, config.server.database_pool_size).await?;
            AppState::with_store(
                Arc::new(store),
                &config.scheduler,
                config.server.request_timeout,
            )
        }
        None => {
            warn!("No database configured, stages are kept in memory");
            AppState::with_store(
                Arc::new(MemoryStageStore::new()),
                &config.scheduler,
                config.server.request_timeout,
            )
        }
    };

    // Open runner requests end when draining starts; the loop keeps matching
    // until the server has stopped accepting them.
    let draining = CancellationToken::new();
    let shutdown = CancellationToken::new();
    let scheduling = scheduler.start(shutdown.clone());

    let app = routes::router(state.with_draining(draining.clone()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.listen;
    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(draining))
        .await?;

    shutdown.cancel();
    scheduling.await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn shutdown_signal(draining: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
    draining.cancel();
}
