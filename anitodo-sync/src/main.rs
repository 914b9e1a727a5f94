//! anitodo sync daemon - main entry point
//!
//! Loads the bootstrap config, opens the database, mirrors watched/favorite
//! state from it and refreshes all sources on a fixed interval until
//! Ctrl+C/SIGTERM. With `--once` it performs a single refresh and exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anitodo_common::config::{self, RootFolderInitializer, RootFolderResolver};
use anitodo_common::{db, logging, EventBus};
use anitodo_sync::fanout::{FanOutFetcher, FetchPolicy};
use anitodo_sync::sources;
use anitodo_sync::{RefreshPipeline, RefreshScheduler, SqliteStore, StateSynchronizer, Store};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for anitodo-sync
#[derive(Parser, Debug)]
#[command(name = "anitodo-sync")]
#[command(about = "Fetches daily anime updates and keeps watched/followed state in sync")]
#[command(version)]
struct Args {
    /// Folder holding anitodo.db
    #[arg(short, long, env = "ANITODO_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file (default: <config_dir>/anitodo/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Refresh once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config =
        config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    logging::init_tracing(&toml_config.logging).context("Failed to initialize logging")?;

    info!("Starting anitodo-sync v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(args.root_folder.clone())
        .with_config_root(toml_config.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());

    let pool = db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    let synchronizer = Arc::new(StateSynchronizer::new(store, EventBus::default()));

    // Startup proceeds with empty state when the first reload fails
    if let Err(e) = synchronizer.reload().await {
        warn!(error = %e, "Initial state load failed");
    }

    let policy = FetchPolicy::from_config(&toml_config.refresh);
    let clients = sources::http_clients(&toml_config.sources, policy.timeout + Duration::from_secs(1))
        .context("Failed to build HTTP client")?;
    let fetcher = FanOutFetcher::new(clients, policy);
    info!("Configured sources: {}", fetcher.count());

    let pipeline = Arc::new(RefreshPipeline::new(fetcher, Arc::clone(&synchronizer)));

    if args.once {
        let result = pipeline.refresh().await.context("Refresh failed")?;
        for failure in result.partial_errors.values() {
            warn!(source = %failure.source_name, error = %failure.cause, "Source failed");
        }
        info!(
            "Refresh complete: {} entries, {} pending today",
            anitodo_sync::models::entry_count(&result.merged),
            anitodo_sync::models::entry_count(&synchronizer.pending_today().await)
        );
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let scheduler = RefreshScheduler::from_config(Arc::clone(&pipeline), &toml_config.refresh);
    let handle = scheduler.spawn(cancel.clone());

    shutdown_signal().await;
    cancel.cancel();
    let runs = handle.await.context("Scheduler task failed")?;

    info!("anitodo-sync stopped after {} refreshes", runs);
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
