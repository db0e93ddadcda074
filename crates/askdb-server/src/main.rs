//! AskDB gateway server binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use askdb_core::Config;
use askdb_engine::engine_from_config;
use askdb_server::{app, AppState};
use askdb_session::{
    ExpirySweeper, MemorySessionStore, SessionManager, SessionStore, SqliteSessionStore,
};

#[derive(Parser)]
#[command(name = "askdb-server")]
#[command(version, about = "Gateway for the AskDB interruptible query protocol")]
struct Args {
    /// Bind host, overriding the configuration
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overriding the configuration
    #[arg(long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = Config::load_validated().context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let store = build_store(&config)?;
    let engine = engine_from_config(&config)?;
    info!(engine = engine.name(), backend = %config.session.backend, "configured");

    let manager = Arc::new(SessionManager::new(
        store.clone(),
        engine,
        askdb_core::SchemaContext::music_store(),
        Duration::from_secs(config.engine.timeout_secs),
    ));

    ExpirySweeper::new(
        store,
        Duration::from_secs(config.session.idle_timeout_secs),
        Duration::from_secs(config.session.sweep_interval_secs),
    )
    .spawn();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "gateway listening");

    axum::serve(listener, app(AppState::new(manager)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("gateway stopped");
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_store(config: &Config) -> Result<Arc<dyn SessionStore>> {
    match config.session.backend.as_str() {
        "sqlite" => {
            let store = SqliteSessionStore::new(config.data_dir())
                .context("Failed to open session database")?;
            Ok(Arc::new(store))
        }
        _ => Ok(Arc::new(MemorySessionStore::new())),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install shutdown handler");
        return;
    }
    info!("shutdown signal received");
}
