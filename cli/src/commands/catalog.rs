// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pattern catalog commands
//!
//! Commands: list, candidates, promote

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use uuid::Uuid;

use aegis_healer_core::application::factory::create_catalog;
use aegis_healer_core::domain::healer_config::HealerConfigManifest;
use aegis_healer_core::domain::pattern::{PatternEntry, PatternOrigin};

use super::stats::server_client;

#[derive(Subcommand)]
pub enum CatalogCommand {
    /// List active patterns
    List {
        /// Ask the running server, which includes promoted patterns
        #[arg(long)]
        remote: bool,
    },

    /// List learned patterns awaiting promotion (running server)
    Candidates,

    /// Promote a learned pattern into the active catalog (running server)
    Promote {
        /// Candidate ID
        #[arg(value_name = "CANDIDATE_ID")]
        id: Uuid,
    },
}

pub async fn handle_command(
    command: CatalogCommand,
    config_override: Option<PathBuf>,
    server: Option<String>,
) -> Result<()> {
    match command {
        CatalogCommand::List { remote } => {
            let entries = if remote {
                server_client(config_override, server)?.catalog().await?
            } else {
                let config = HealerConfigManifest::load_or_default(config_override)
                    .context("Failed to load configuration")?;
                create_catalog(&config)?.entries()
            };
            print_entries(&entries);
            Ok(())
        }
        CatalogCommand::Candidates => candidates(server_client(config_override, server)?).await,
        CatalogCommand::Promote { id } => {
            let entry = server_client(config_override, server)?.promote(id).await?;
            println!(
                "{}",
                format!("✓ Promoted candidate {} as {}", id, entry.pattern_type).green()
            );
            println!("  match: {}", entry.matcher);
            Ok(())
        }
    }
}

async fn candidates(client: crate::client::HealerClient) -> Result<()> {
    let candidates = client.candidates().await?;
    if candidates.is_empty() {
        println!("{}", "No promotion candidates".dimmed());
        return Ok(());
    }

    println!("{}", "Promotion candidates:".bold());
    for candidate in candidates {
        println!(
            "  {} {} (seen {}x, proposed {})",
            candidate.id.to_string().bold(),
            candidate.entry.pattern_type,
            candidate.occurrences,
            candidate.proposed_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("    signature: {}", candidate.signature.to_string().dimmed());
        println!("    match: {}", candidate.entry.matcher);
        for source in &candidate.evidence {
            println!("    evidence: {}", source.location);
        }
    }
    Ok(())
}

fn print_entries(entries: &[PatternEntry]) {
    println!("{}", format!("{} pattern(s):", entries.len()).bold());
    println!(
        "  {:<24} {:<10} {:<10} {:<26} MATCH",
        "PATTERN", "ORIGIN", "SEVERITY", "TEMPLATE"
    );
    for entry in entries {
        let origin = match entry.origin {
            PatternOrigin::Builtin => "builtin",
            PatternOrigin::Configured => "configured",
            PatternOrigin::Learned => "learned",
        };
        println!(
            "  {:<24} {:<10} {:<10} {:<26} {}",
            entry.pattern_type.as_str(),
            origin,
            entry.default_severity.to_string(),
            entry.fix_template_id,
            entry.matcher.dimmed()
        );
    }
}
