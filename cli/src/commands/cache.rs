// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Knowledge cache maintenance
//!
//! Commands: prune

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use aegis_healer_core::application::factory::create_knowledge_cache;
use aegis_healer_core::domain::healer_config::{HealerConfigManifest, KnowledgeBackend};

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Remove records not updated within the given number of days
    Prune {
        /// Age threshold in days
        #[arg(long, value_name = "DAYS")]
        older_than_days: u32,
    },
}

pub async fn handle_command(command: CacheCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        CacheCommand::Prune { older_than_days } => prune(config_override, older_than_days),
    }
}

/// Opens the persistent store directly; a server holding the store open
/// must be stopped first.
fn prune(config_override: Option<PathBuf>, older_than_days: u32) -> Result<()> {
    let config = HealerConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;

    if config.spec.knowledge.backend != KnowledgeBackend::Sled {
        println!(
            "{}",
            "Knowledge backend is in-memory; nothing persists between runs to prune".yellow()
        );
        return Ok(());
    }

    let cache = create_knowledge_cache(&config.spec.knowledge);
    if cache.is_stateless() {
        anyhow::bail!("Knowledge store could not be opened (is a healer server running?)");
    }

    let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));
    let before = cache.len();
    let removed = cache.evict_older_than(cutoff);
    info!(removed, before, cutoff = %cutoff, "Pruned knowledge store");

    println!(
        "{}",
        format!(
            "✓ Removed {} of {} record(s) older than {} day(s)",
            removed, before, older_than_days
        )
        .green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_healer_core::domain::error_report::ErrorSignature;
    use aegis_healer_core::domain::pattern::PatternType;
    use aegis_healer_core::domain::solution::{ResearchMethod, Solution};

    #[test]
    fn test_prune_keeps_fresh_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = HealerConfigManifest::default();
        config.spec.knowledge.backend = KnowledgeBackend::Sled;
        config.spec.knowledge.path = Some(dir.path().join("kb").display().to_string());
        let config_path = dir.path().join("healer.yaml");
        config.to_yaml_file(&config_path).unwrap();

        {
            let cache = create_knowledge_cache(&config.spec.knowledge);
            let solution = Solution::new(PatternType::InstallOrFixModule, 0.7, ResearchMethod::CommonSolutions)
                .with_parameter("module", "advanced_analytics");
            cache.record_solution(&ErrorSignature::new("modulenotfounderror: no module named <module>"), &solution);
        }

        prune(Some(config_path.clone()), 1).unwrap();

        let cache = create_knowledge_cache(&config.spec.knowledge);
        assert_eq!(cache.len(), 1);
    }
}
