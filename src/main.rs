//! BATCOM - Battlefield Tactical Commander
//!
//! Headless decision engine for LLM-driven force allocation in a simulated
//! battlefield. The host simulator drives it entirely over the RPC surface:
//!
//! ```bash
//! # Run with defaults (listens on 127.0.0.1:8640)
//! cargo run --release
//!
//! # Explicit bind address and config file
//! ./batcom --addr 0.0.0.0:8640 --config /etc/batcom/batcom.toml
//! ```
//!
//! # Environment Variables
//!
//! - `BATCOM_CONFIG`: path to the engine TOML (see `EngineConfig::load`)
//! - `{PROVIDER}_API_KEY`: API key fallback, e.g. `GEMINI_API_KEY`
//! - `RUST_LOG`: logging filter (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use batcom::api::{create_router, EngineHandle};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "batcom")]
#[command(about = "BATCOM Battlefield Tactical Commander")]
#[command(version)]
struct CliArgs {
    /// Bind address for the host-facing RPC server
    #[arg(short, long, default_value = "127.0.0.1:8640")]
    addr: String,

    /// Path to the engine config TOML (overrides BATCOM_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for AO logs, API call logs, and token stats
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Some(path) = &args.config {
        // EngineConfig::load reads this on every init RPC
        std::env::set_var("BATCOM_CONFIG", path);
    }
    std::fs::create_dir_all(&args.log_dir)
        .with_context(|| format!("creating log dir {}", args.log_dir.display()))?;

    let handle = EngineHandle::new(args.log_dir.clone());
    let router = create_router(handle);

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("binding {}", args.addr))?;
    info!(addr = %args.addr, log_dir = %args.log_dir.display(), "BATCOM RPC surface listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving RPC surface")?;

    info!("BATCOM stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to install ctrl-c handler, running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
