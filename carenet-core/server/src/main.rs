//! Carenet service entry point.
//!
//! One binary serves any of the three roles. The role decides which entity
//! kind is stored locally and which dependencies are called for composites.

use anyhow::Context;
use carenet_core::{observability::setup_logging, CarenetService, Config, ServiceRole};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "carenet-server", version, about = "Hospital, department and patient services")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "carenet.toml")]
    config: PathBuf,

    /// Override the configured role (hospital, department, patient)
    #[arg(long)]
    role: Option<ServiceRole>,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = if args.config.exists() {
        Config::load(&args.config)
            .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?
    } else {
        Config::default()
    };
    if let Some(role) = args.role {
        config.service.role = role;
    }
    if let Some(bind) = args.bind {
        config.service.bind = bind;
    }

    config.validate().context("Invalid configuration")?;
    setup_logging(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        role = %config.service.role,
        config = %args.config.display(),
        "Starting carenet service"
    );

    let service = CarenetService::build(&config)
        .await
        .context("Failed to wire service")?;
    let app = service.router();

    let listener = tokio::net::TcpListener::bind(&config.service.bind)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {}", config.service.bind))?;
    tracing::info!("Listening on http://{}", config.service.bind);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server terminated unexpectedly");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, starting graceful shutdown...");
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received, starting graceful shutdown...");
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Ctrl+C handler failed");
    }
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
