// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use aegis_healer_core::domain::healer_config::HealerConfigManifest;

const MINIMAL_TEMPLATE: &str = include_str!("../../templates/healer-config.yaml");
const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/healer-config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./aegis-healer.yaml)
        #[arg(short, long, default_value = "./aegis-healer.yaml")]
        output: PathBuf,

        /// Include every section with comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, examples } => generate(output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = HealerConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. AEGIS_HEALER_CONFIG_PATH: {}",
            std::env::var("AEGIS_HEALER_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./aegis-healer.yaml");
        println!("  4. ~/.aegis/healer.yaml");
        println!("  5. /etc/aegis/healer.yaml");
        match HealerConfigManifest::discover_config() {
            Some(found) if config_override.is_none() => println!("  Using: {}", found.display()),
            None if config_override.is_none() => println!("  Using: {}", "(built-in defaults)".dimmed()),
            _ => {}
        }
        println!();
    }

    if as_yaml {
        print!("{}", serde_yaml::to_string(&config).context("Failed to render configuration")?);
        return Ok(());
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Resolver:".bold());
    for (pattern, confidence) in &spec.resolver.common_solutions {
        println!(
            "  {:<26} stock {:.2}  accept at {:.2}",
            pattern.as_str(),
            confidence,
            spec.resolver.threshold_for(*pattern)
        );
    }
    println!("  Codebase boost: {:.2}", spec.resolver.codebase_boost);
    println!();

    println!("{}", "Research:".bold());
    if spec.research.enabled {
        println!(
            "  Per-source timeout: {:?}  Global timeout: {:?}",
            spec.research.per_source_timeout, spec.research.global_timeout
        );
        for source in &spec.research.sources {
            let state = if source.enabled { "enabled".green() } else { "disabled".dimmed() };
            println!("  {} ({}) {} [{}]", source.name.bold(), source.source_type, source.endpoint, state);
        }
        if spec.research.sources.is_empty() {
            println!("  {}", "(no sources configured)".dimmed());
        }
    } else {
        println!("  {}", "disabled".dimmed());
    }
    println!();

    println!("{}", "Knowledge:".bold());
    println!("  Backend: {:?}", spec.knowledge.backend);
    if let Some(path) = spec.knowledge.resolved_path() {
        println!("  Path: {}", path.display());
    }
    println!("  Max entries: {}", spec.knowledge.max_entries);
    println!();

    println!("{}", "Applier:".bold());
    println!("  Mutator: {:?}", spec.applier.mutator);
    if let Some(root) = &spec.applier.root {
        println!("  Root: {}", root.display());
    }
    if let Some(command) = &spec.applier.verify_command {
        println!("  Verify: {} (timeout {:?})", command.join(" "), spec.applier.verify_timeout);
    }
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", spec.server.bind_address, spec.server.port);

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = HealerConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples { EXAMPLES_TEMPLATE } else { MINIMAL_TEMPLATE };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
