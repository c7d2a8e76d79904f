// watchtrackd: progress tracking HTTP server.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use watchtrack_server::{
    app::{build_router, shutdown_signal},
    config::{FileConfig, LogFormat, ServerConfig, StoreKind},
    cors::cors_layer,
    engine::ProgressTracker,
    store::WatchStore,
};

#[derive(Parser)]
#[command(name = "watchtrackd", about = "Video watch-progress tracking server")]
struct Cli {
    /// TOML config file (default: ~/.watchtrack/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen address, overriding WATCHTRACK_HOST/WATCHTRACK_PORT
    #[arg(long)]
    listen: Option<SocketAddr>,
    /// SQLite database path, overriding WATCHTRACK_DB_PATH
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file = FileConfig::locate_and_load(cli.config.as_deref(), |key| std::env::var(key))
        .context("failed to load config file")?;
    let mut config = ServerConfig::from_env(file).context("invalid server configuration")?;
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    init_tracing(&config)?;

    let store = match config.store {
        StoreKind::Sqlite => WatchStore::open_sqlite(&config.db_path).with_context(|| {
            format!("failed to open progress database at {}", config.db_path.display())
        })?,
        StoreKind::Memory => WatchStore::memory(),
    };
    store.health_check().await.context("progress store health check failed")?;

    let tracker = Arc::new(ProgressTracker::new(store, config.tracker));
    let app = build_router(Arc::clone(&tracker), cors_layer(config.cors_origins.as_deref()));

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.listen_addr))?;

    info!(
        listen_addr = %config.listen_addr,
        store = tracker.store().kind(),
        min_segment_secs = config.tracker.policy.min_duration,
        merge_tolerance_secs = config.tracker.policy.tolerance,
        "starting watchtrack server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("watchtrack server exited unexpectedly")
}

fn init_tracing(config: &ServerConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("invalid log filter `{}`", config.log_filter))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.log_format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
