//! mezzo - self-hosted music library server
//!
//! Loads the configuration, opens the catalog, constructs the artwork and
//! recommendation services and runs the media scanner until shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use mezzo_common::db::Db;
use mezzo_common::{EventBus, MezzoEvent, Settings};
use mezzo_core::{ArtworkService, FeatureEngine, ScannerService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mezzo", version, about = "Self-hosted music library server")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "MEZZO_CONFIG", default_value = "/etc/mezzo.conf")]
    config: PathBuf,

    /// Override the configured working directory
    #[arg(long, env = "MEZZO_WORKING_DIR")]
    working_dir: Option<PathBuf>,

    /// Directory holding the placeholder images
    #[arg(long, default_value = "assets")]
    assets_dir: PathBuf,

    /// Trigger a full scan at startup
    #[arg(long)]
    scan_on_startup: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting mezzo");

    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("Cannot load configuration from {}", cli.config.display()))?;
    if let Some(working_dir) = cli.working_dir {
        settings.working_dir = working_dir;
        settings.validate().context("Invalid working directory")?;
    }
    tracing::info!(working_dir = %settings.working_dir.display(), "Configuration loaded");

    let db = Db::open(&settings.db_path())
        .await
        .context("Cannot open catalog database")?;
    tracing::info!(path = %settings.db_path().display(), "Catalog database ready");

    let events = EventBus::new(1000);

    let artwork = Arc::new(
        ArtworkService::new(
            db.clone(),
            &settings,
            &cli.assets_dir.join("default-release.svg"),
            &cli.assets_dir.join("default-artist.svg"),
        )
        .context("Cannot construct the artwork service")?,
    );

    let engine = Arc::new(FeatureEngine::new(db.clone(), settings.features_cache_dir()));
    if let Err(e) = engine.load(false, |_| {}).await {
        tracing::warn!(error = %e, "Recommendation engine not loaded yet");
    }

    let scanner = ScannerService::start(
        db,
        &settings,
        events.clone(),
        Arc::clone(&artwork),
        Arc::clone(&engine),
    );

    // Log scanner events as they happen
    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            match &event {
                MezzoEvent::ScanProgress { step } => {
                    tracing::debug!(
                        step = step.current_step.name(),
                        progress = step.progress(),
                        "Scan progress"
                    );
                }
                other => tracing::info!(event = other.event_type(), "Scanner event"),
            }
        }
    });

    if cli.scan_on_startup {
        scanner.request_immediate_scan(false);
    }

    tokio::signal::ctrl_c()
        .await
        .context("Cannot wait for shutdown signal")?;
    tracing::info!("Shutting down");
    scanner.request_stop();

    Ok(())
}
