// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP API server command

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use aegis_healer_core::application::factory::build_orchestrator;
use aegis_healer_core::domain::healer_config::HealerConfigManifest;
use aegis_healer_core::presentation::api;

#[derive(Args)]
pub struct ServeArgs {
    /// Bind address (default: spec.server.bind_address)
    #[arg(long, env = "AEGIS_HEALER_HOST")]
    pub host: Option<String>,

    /// Port (default: spec.server.port)
    #[arg(long, env = "AEGIS_HEALER_PORT")]
    pub port: Option<u16>,
}

pub async fn handle_command(args: ServeArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = HealerConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    let host = args.host.unwrap_or_else(|| config.spec.server.bind_address.clone());
    let port = args.port.unwrap_or(config.spec.server.port);

    let orchestrator = Arc::new(build_orchestrator(&config).context("Failed to build healing pipeline")?);
    let app = api::app(orchestrator.clone());

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(
        address = %addr,
        knowledge_backend = orchestrator.cache().backend_name(),
        patterns = orchestrator.catalog().len(),
        "Healer API listening"
    );
    println!("{}", format!("✓ Healer API listening on http://{}", addr).green());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Cancels in-flight research crawls
    orchestrator.shutdown();
    info!("Healer API shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
