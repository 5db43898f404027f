//! discat-rd - Disc Read Daemon
//!
//! Command-line entry point: reads the disc in the given device and
//! reconciles its metadata into the catalog, reporting milestones on the
//! status bus as it goes.

use anyhow::Result;
use clap::Parser;
use discat_common::config::{resolve_database_path, TomlConfig};
use discat_common::db::init_database;
use discat_common::events::EventBus;
use discat_rd::orchestrator::{Orchestrator, ReadRequest};
use discat_rd::reconcile::Reconciler;
use discat_rd::session::SessionState;
use discat_rd::tool::ToolAdapter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "discat-rd", version, about = "Disc metadata read daemon")]
struct Args {
    /// Optical device to read
    #[arg(long, env = "DISCAT_DEVICE", default_value = "/dev/sr0")]
    device: PathBuf,

    /// Config file path (default: ~/.config/discat/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Catalog database path (overrides config file)
    #[arg(long, env = "DISCAT_DB")]
    database: Option<PathBuf>,

    /// Re-read the disc even if it is already cataloged, superseding the
    /// existing generation if the layout changed
    #[arg(long)]
    reread: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting discat-rd (Disc Read Daemon)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = TomlConfig::load(args.config.as_deref())?;
    let db_path = resolve_database_path(args.database.as_deref(), &config);
    info!("Database: {}", db_path.display());

    let pool = init_database(&db_path).await?;
    let bus = Arc::new(EventBus::new(config.session.event_capacity));

    // Forward status events to the log until an external broker subscribes
    // at this boundary
    let mut status_rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!(target: "discat::bus", "{}", json),
                    Err(e) => warn!("Failed to serialize status event: {}", e),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Status forwarder lagged; {} events dropped", missed);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let adapter = ToolAdapter::new(
        config.tool.binary.clone(),
        config.tool.extra_args.clone(),
        config.tool.min_title_seconds,
    );
    let reconciler = Reconciler::new(pool);
    let orchestrator = Orchestrator::new(
        Arc::clone(&bus),
        adapter,
        reconciler,
        Duration::from_secs(config.session.idle_timeout_secs),
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling session");
            signal_cancel.cancel();
        }
    });

    let request = ReadRequest {
        device_path: args.device,
        explicit_reread: args.reread,
    };
    let outcome = orchestrator.run(request, cancel).await?;

    match outcome.state {
        SessionState::Complete => {
            if let Some(commit) = &outcome.commit {
                info!(
                    "Catalog commit: fingerprint {} generation {} ({} titles, {} streams)",
                    commit.fingerprint,
                    commit.generation,
                    commit.titles_committed,
                    commit.streams_committed
                );
            }
            Ok(())
        }
        SessionState::Partial => {
            warn!("Session ended partial; disc recorded with partial metadata");
            Ok(())
        }
        state => {
            error!(
                "Session ended in state {}: {}",
                state,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            anyhow::bail!("Read session failed")
        }
    }
}
