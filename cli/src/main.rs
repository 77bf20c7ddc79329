// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Healer CLI
//!
//! The `aegis-heal` binary drives the autonomous error healer.
//!
//! ## Modes
//!
//! - **Embedded**: `heal` and `classify` build the healing pipeline in-process
//!   from the discovered configuration
//! - **Server**: `serve` exposes the pipeline over HTTP; `stats` and the
//!   catalog candidate commands talk to that server
//!
//! ## Commands
//!
//! - `aegis-heal heal <message> [-C key=value]... [--json]`
//! - `aegis-heal classify <message> [--json]`
//! - `aegis-heal serve [--host H] [--port P]`
//! - `aegis-heal stats`
//! - `aegis-heal catalog list|candidates|promote <id>`
//! - `aegis-heal cache prune --older-than-days N`
//! - `aegis-heal config show|validate|generate`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use aegis_healer::commands::{
    self, CacheCommand, CatalogCommand, ClassifyArgs, ConfigCommand, HealArgs, ServeArgs,
};
use aegis_healer_core::domain::healer_config::HealerConfigManifest;

/// AEGIS Healer - classify, research and patch runtime errors
#[derive(Parser)]
#[command(name = "aegis-heal")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AEGIS_HEALER_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Base URL of a running healer server (default: derived from config)
    #[arg(long, global = true, env = "AEGIS_HEALER_URL", value_name = "URL")]
    server: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true, env = "AEGIS_HEALER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true, env = "AEGIS_HEALER_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Heal an error message
    #[command(name = "heal")]
    Heal(HealArgs),

    /// Classify an error message without healing it
    #[command(name = "classify")]
    Classify(ClassifyArgs),

    /// Run the HTTP API server
    #[command(name = "serve")]
    Serve(ServeArgs),

    /// Show healing statistics of a running server
    #[command(name = "stats")]
    Stats,

    /// Pattern catalog management
    #[command(name = "catalog")]
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },

    /// Knowledge cache maintenance
    #[command(name = "cache")]
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match cli.command {
        Some(Commands::Heal(args)) => commands::heal::handle_heal(args, cli.config, cli.server).await,
        Some(Commands::Classify(args)) => commands::heal::handle_classify(args, cli.config).await,
        Some(Commands::Serve(args)) => commands::serve::handle_command(args, cli.config).await,
        Some(Commands::Stats) => commands::stats::handle_command(cli.config, cli.server).await,
        Some(Commands::Catalog { command }) => {
            commands::catalog::handle_command(command, cli.config, cli.server).await
        }
        Some(Commands::Cache { command }) => commands::cache::handle_command(command, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
///
/// Flags win over the config file's `observability.logging` block. Logs go
/// to stderr so `--json` output on stdout stays machine readable.
fn init_logging(cli: &Cli) -> Result<()> {
    let configured = peek_logging_config(cli.config.as_ref());
    let level = cli
        .log_level
        .clone()
        .or_else(|| configured.as_ref().map(|(level, _)| level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let format = cli
        .log_format
        .clone()
        .or_else(|| configured.map(|(_, format)| format))
        .unwrap_or_else(|| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format.as_str() {
        "json" => builder.json().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}

/// Reads the logging block before the subscriber exists. Load errors are
/// ignored here and reported by the command that loads the config for real.
fn peek_logging_config(config_override: Option<&PathBuf>) -> Option<(String, String)> {
    let path = config_override
        .cloned()
        .or_else(HealerConfigManifest::discover_config)?;
    let manifest = HealerConfigManifest::from_yaml_file(path).ok()?;
    let logging = manifest.spec.observability?.logging?;
    Some((logging.level, logging.format))
}
