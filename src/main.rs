//! Doorguard - doorway crossing monitor for a Raspberry Pi doorway rig
//!
//! Watches two proximity sensor lines at a doorway, infers entry/exit
//! crossings, keeps a running occupancy count and notifies a workflow
//! engine via HTTP callbacks. Snapshots and stored photos are served from
//! the same process.
//!
//! Module structure:
//! - `domain/` - Core types (Direction, SensorReading, EventNotification)
//! - `io/` - External interfaces (GPIO, callback HTTP, camera, photos, HTTP)
//! - `services/` - Business logic (CrossingDetector, Monitor, Recorder)
//! - `infra/` - Infrastructure (Config)

use clap::Parser;
use doorguard::infra::Config;
use doorguard::io::http::{self, ServerContext};
use doorguard::io::sensor::gpio_factory;
use doorguard::io::{CallbackDispatcher, CommandCapture, FrameCapture, PhotoStore};
use doorguard::services::{MonitorController, MonitorTiming, RecorderController};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Doorguard - doorway crossing monitor
#[derive(Parser, Debug)]
#[command(name = "doorguard", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("doorguard starting");

    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        entry_pin = %config.entry_pin(),
        exit_pin = %config.exit_pin(),
        poll_interval_ms = %config.poll_interval_ms(),
        window_ms = %config.window_ms(),
        cooldown_ms = %config.cooldown_ms(),
        http_port = %config.http_port(),
        image_dir = %config.image_dir(),
        "config_loaded"
    );

    // Shared components
    let photos = Arc::new(PhotoStore::new(config.image_dir())?);
    let camera: Arc<dyn FrameCapture> = Arc::new(CommandCapture::from_config(&config));
    let dispatcher =
        CallbackDispatcher::new(Duration::from_millis(config.callback_timeout_ms()))?;
    let monitor = Arc::new(MonitorController::new(
        MonitorTiming::from_config(&config),
        dispatcher,
        gpio_factory(&config),
    ));
    let recorder = Arc::new(RecorderController::new(
        Arc::clone(&camera),
        Arc::clone(&photos),
        Duration::from_millis(config.frame_interval_ms()),
    ));

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let addr: SocketAddr =
        format!("{}:{}", config.http_bind_address(), config.http_port()).parse()?;
    let ctx = Arc::new(ServerContext {
        config,
        monitor: Arc::clone(&monitor),
        recorder: Arc::clone(&recorder),
        photos,
        camera,
    });

    // Serve requests until the shutdown signal fires
    http::serve(addr, ctx, shutdown_rx).await?;

    // Stop background tasks cleanly, releasing the sensor lines
    monitor.stop().await;
    recorder.stop().await;

    info!("doorguard shutdown complete");
    Ok(())
}
