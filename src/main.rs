#![forbid(unsafe_code)]

//! `nearhand` — community assistance coordination server binary.
//!
//! Bootstraps configuration, connects the database, starts the
//! retention and matching background tasks, and serves the HTTP API
//! with its WebSocket realtime channel.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use nearhand::config::GlobalConfig;
use nearhand::http::{self, AppState};
use nearhand::matching;
use nearhand::persistence::{db, retention};
use nearhand::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "nearhand", about = "Community assistance coordination server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("nearhand server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(port) = args.port {
        config.http_port = port;
    }
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path).await?);
    info!(db_path = %config.db_path.display(), "database connected");

    // ── Build shared application state ──────────────────
    let state = AppState::new(Arc::clone(&config), Arc::clone(&db));

    // ── Start background services ───────────────────────
    let ct = CancellationToken::new();
    let retention_handle =
        retention::spawn_retention_task(Arc::clone(&db), config.retention.clone(), ct.clone());
    info!("retention service started");

    let matching_handle = if config.matching.enabled {
        Some(matching::spawn_matching_task(
            state.matching.clone(),
            config.matching.sweep_interval_seconds,
            ct.clone(),
        ))
    } else {
        info!("matching sweep disabled by configuration");
        None
    };

    // ── Serve HTTP ──────────────────────────────────────
    let bind = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind on {bind}: {err}")))?;

    info!(%bind, "nearhand server ready");

    let shutdown_ct = ct.clone();
    axum::serve(listener, http::routes(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            shutdown_ct.cancel();
        })
        .await
        .map_err(|err| AppError::Config(format!("server error: {err}")))?;

    // ── Wait for background tasks ───────────────────────
    if let Err(err) = retention_handle.await {
        error!(%err, "retention task join failed");
    }
    if let Some(handle) = matching_handle {
        if let Err(err) = handle.await {
            error!(%err, "matching task join failed");
        }
    }
    info!("nearhand shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
