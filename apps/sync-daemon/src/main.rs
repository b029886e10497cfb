//! # tindahan-syncd
//!
//! Headless host for the offline sync engine.
//!
//! ## Run Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  load config ──► init tracing ──► open queue db ──► purge synced rows  │
//! │                                                       │                 │
//! │                                                       ▼                 │
//! │                         spawn probe ──► start agent ──► wait signal    │
//! │                                                       │                 │
//! │                                                       ▼                 │
//! │                         agent.shutdown ──► probe.shutdown ──► close db │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tindahan_core::{EntityType, MutationAction};
use tindahan_sync::{DrainOutcome, InMemoryFeed, SyncConfig, SyncEngine};

const DEFAULT_LOG_FILTER: &str = "info,tindahan=debug,sqlx=warn";

#[derive(Parser, Debug)]
#[command(name = "tindahan-syncd", about = "Tindahan POS offline sync daemon", version)]
struct Cli {
    /// Path to sync.toml (defaults to the platform config directory)
    #[arg(long, global = true, env = "TINDAHAN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the probe and sync agent until interrupted
    Run {
        /// Assume the API is reachable instead of probing it
        #[arg(long)]
        no_probe: bool,
    },

    /// Show pending offline mutations
    Status,

    /// Queue a mutation for later replay
    Enqueue {
        /// product, category, inventory, sale or report
        #[arg(long)]
        entity: String,

        /// create, update or delete
        #[arg(long)]
        action: String,

        /// JSON payload
        #[arg(long)]
        payload: String,
    },

    /// Probe the API once and drain the queue if it is reachable
    Sync,

    /// Show the effective configuration
    Config {
        /// Write it to the config path
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(true)
        .init();

    let config = SyncConfig::load(cli.config.clone()).context("failed to load sync config")?;

    match cli.command {
        Command::Run { no_probe } => run(config, no_probe).await,
        Command::Status => status(config).await,
        Command::Enqueue {
            entity,
            action,
            payload,
        } => enqueue(config, &entity, &action, &payload).await,
        Command::Sync => sync_once(config).await,
        Command::Config { write } => show_config(&config, cli.config, write),
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn run(config: SyncConfig, no_probe: bool) -> anyhow::Result<()> {
    info!(
        device_id = %config.device_id(),
        store_id = ?config.store_id(),
        mode = %config.mode(),
        api = %config.api.base_url,
        "Starting tindahan-syncd"
    );

    let engine = SyncEngine::builder(config)
        .initially_online(no_probe)
        .build()
        .await
        .context("failed to open sync engine")?;

    let purged = engine.queue().purge_synced().await?;
    if purged > 0 {
        warn!(purged, "Removed synced mutations left behind by an earlier run");
    }

    let probe = if no_probe {
        None
    } else {
        Some(engine.probe()?.spawn())
    };
    let agent = engine.agent().start()?;

    shutdown_signal().await;

    agent.shutdown().await?;
    if let Some(probe) = probe {
        probe.shutdown().await?;
    }
    engine.close().await;

    info!("Shutdown complete");
    Ok(())
}

async fn status(config: SyncConfig) -> anyhow::Result<()> {
    let engine = local_engine(config).await?;
    let counts = engine.manager().pending_counts().await?;

    println!("mode:    {}", engine.config().mode());
    println!("device:  {}", engine.config().device_id());
    println!("queue:   {}", engine.config().database_path().display());
    if counts.is_empty() {
        println!("pending: none");
    } else {
        for (entity, count) in counts {
            println!("pending: {entity:<10} {count}");
        }
    }

    engine.close().await;
    Ok(())
}

async fn enqueue(
    config: SyncConfig,
    entity: &str,
    action: &str,
    payload: &str,
) -> anyhow::Result<()> {
    let entity: EntityType = entity.parse()?;
    let action: MutationAction = action.parse()?;
    let payload: Value = serde_json::from_str(payload).context("payload is not valid JSON")?;

    let engine = local_engine(config).await?;
    let receipt = engine.interceptor().queue_offline(entity, action, payload).await?;

    println!("queued {} ({entity} {action})", receipt.queue_id);
    if let Some(temp_id) = receipt.temp_id {
        println!("temporary id {temp_id}");
    }

    engine.close().await;
    Ok(())
}

async fn sync_once(config: SyncConfig) -> anyhow::Result<()> {
    if !config.is_sync_enabled() {
        bail!("sync is disabled in the configuration");
    }

    let engine = SyncEngine::builder(config).build().await?;
    let probe = engine.probe()?;
    if !probe.probe_once().await {
        engine.close().await;
        bail!("API at {} is not reachable", engine.config().api.base_url);
    }

    match engine.manager().drain().await {
        DrainOutcome::Completed(report) => {
            println!("synced {}, failed {}", report.synced(), report.failed());
            if let Some(err) = report.first_error() {
                println!("last error: {err}");
            }
        }
        DrainOutcome::Skipped => println!("a drain is already running"),
    }

    engine.close().await;
    Ok(())
}

fn show_config(config: &SyncConfig, path: Option<PathBuf>, write: bool) -> anyhow::Result<()> {
    if write {
        config.save(path.clone())?;
        let shown = path.or_else(SyncConfig::default_config_path);
        println!("wrote {}", shown.map(|p| p.display().to_string()).unwrap_or_default());
        return Ok(());
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

/// Engine for commands that only touch the local queue. Notifications stay
/// in memory.
async fn local_engine(config: SyncConfig) -> anyhow::Result<SyncEngine> {
    Ok(SyncEngine::builder(config)
        .with_feed(Arc::new(InMemoryFeed::default()))
        .build()
        .await?)
}

/// Completes on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping sync");
}
