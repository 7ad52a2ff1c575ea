//! # Gatehouse - Quad authentication service
//!
//! Email one-time-password login for the Quad campus app. Issues 6-digit
//! challenges, verifies them with expiry and attempt limits, and mints
//! session credentials for verified addresses.
//!
//! ## Architecture
//! ```text
//! Client → Gatehouse → ChallengeStore (memory | Redis)
//!              ↓
//!        IdentityIssuer → session credential
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod identity;
mod notify;
mod otp;
mod routes;
mod state;

use config::{AppConfig, StoreBackend};
use otp::SweeperHandle;
use quad_common::DisclosureMode;
use state::AppState;

/// Quad Gatehouse - OTP authentication service
#[derive(Parser, Debug)]
#[command(name = "gatehouse")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/gatehouse.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Challenge store backend (overrides config)
    #[arg(long, value_enum, env = "OTP_STORE")]
    store: Option<StoreBackend>,

    /// OTP disclosure mode: disclose | send_only (overrides config)
    #[arg(long, env = "OTP_DISCLOSURE")]
    disclosure: Option<DisclosureMode>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a local .env before clap reads the environment
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!(
        "🔑 Starting Quad Gatehouse v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!("📋 Configuration loaded from {}", args.config);

    if config.otp.disclosure == DisclosureMode::Disclose {
        tracing::warn!("OTP disclosure enabled: codes are returned to callers (development only)");
    }

    // Initialize application state
    let state = AppState::new(config.clone()).await?;

    // Spawn the expired-challenge sweeper
    let sweeper = SweeperHandle::spawn(
        state.store(),
        Duration::from_secs(config.otp.sweep_interval_secs),
    );

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 Gatehouse listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.stop().await;

    info!("👋 Gatehouse shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown signal received");
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
