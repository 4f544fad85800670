//! Audio Player (sravana-ap) - Main entry point
//!
//! Chaptered audiobook playback service with sleep timer, progress
//! checkpointing and procedural ambient sound, controlled over HTTP/SSE.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sravana_ap::api::{self, AppContext};
use sravana_ap::audio::{AudioContext, CpalContext, SharedAudioContext};
use sravana_ap::config::Config;
use sravana_ap::db::{init_database, SqliteProgressStore};
use sravana_ap::Player;
use sravana_common::config::resolve_config;
use sravana_common::events::EventBus;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Capacity of the player event broadcast channel
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for sravana-ap
#[derive(Parser, Debug)]
#[command(name = "sravana-ap")]
#[command(about = "Chaptered audio player for Sravana")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "SRAVANA_PORT")]
    port: Option<u16>,

    /// TOML config file
    #[arg(short, long, env = "SRAVANA_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database for listening progress (overrides the config file)
    #[arg(short, long, env = "SRAVANA_DATABASE")]
    database: Option<PathBuf>,

    /// Run without an audio device (every session plays in demo mode)
    #[arg(long, env = "SRAVANA_NO_AUDIO")]
    no_audio: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = resolve_config(args.config.as_deref(), "SRAVANA_CONFIG")
        .context("Failed to load configuration")?;
    let config = Config::from_toml(toml_config, args.port, args.database);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Sravana Audio Player on port {}", config.port);
    info!("Database: {}", config.database_path.display());

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let store = Arc::new(SqliteProgressStore::new(pool));

    let audio = if args.no_audio {
        info!("Audio output disabled");
        SharedAudioContext::unavailable()
    } else {
        SharedAudioContext::lazy(Box::new(|| {
            CpalContext::open().map(|ctx| Arc::new(ctx) as Arc<dyn AudioContext>)
        }))
    };

    let events = EventBus::new(EVENT_BUS_CAPACITY);
    let player = Arc::new(Player::new(config.player.clone(), audio, store, events));
    info!("Player initialized");

    let ctx = AppContext {
        player: Arc::clone(&player),
        port: config.port,
    };
    api::run(ctx, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if player.close().await {
        info!("Open session closed");
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
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
