// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Statistics of a running healer server

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use aegis_healer_core::domain::healer_config::HealerConfigManifest;

use crate::client::HealerClient;
use crate::output::print_stats;

/// Resolves the server client from `--server` or the configured address.
pub fn server_client(config_override: Option<PathBuf>, server: Option<String>) -> Result<HealerClient> {
    match server {
        Some(url) => HealerClient::new(url),
        None => {
            let config = HealerConfigManifest::load_or_default(config_override)
                .context("Failed to load configuration")?;
            HealerClient::from_config(&config)
        }
    }
}

pub async fn handle_command(config_override: Option<PathBuf>, server: Option<String>) -> Result<()> {
    let client = server_client(config_override, server)?;

    if !client.is_healthy().await {
        println!(
            "{}",
            format!("No healer server reachable at {}", client.base_url()).yellow()
        );
        println!("Start one with: aegis-heal serve");
        std::process::exit(1);
    }

    let stats = client.stats().await?;
    print_stats(&stats);

    Ok(())
}
