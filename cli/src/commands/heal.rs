// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Healing commands
//!
//! Commands: heal, classify

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use aegis_healer_core::application::classifier::ErrorClassifier;
use aegis_healer_core::application::factory::{build_orchestrator, create_catalog};
use aegis_healer_core::domain::error_report::ErrorReport;
use aegis_healer_core::domain::healer_config::HealerConfigManifest;

use crate::client::HealerClient;
use crate::output::{print_healing, HealingSummary};

/// Exit status for an error no strategy could resolve.
const EXIT_UNRESOLVED: i32 = 2;

#[derive(Args)]
pub struct HealArgs {
    /// The raw error message
    #[arg(value_name = "MESSAGE")]
    pub message: String,

    /// Context entry attached to the report (repeatable)
    #[arg(short = 'C', long = "context", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub context: Vec<(String, String)>,

    /// Print the full healing result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ClassifyArgs {
    /// The raw error message
    #[arg(value_name = "MESSAGE")]
    pub message: String,

    /// Print the classification as JSON
    #[arg(long)]
    pub json: bool,
}

/// Parses a `key=value` pair; the value may itself contain `=`.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{}`", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in `{}`", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Heals in-process unless `--server` points at a running healer.
pub async fn handle_heal(
    args: HealArgs,
    config_override: Option<PathBuf>,
    server: Option<String>,
) -> Result<()> {
    anyhow::ensure!(!args.message.trim().is_empty(), "Error message cannot be empty");
    let context: BTreeMap<String, String> = args.context.into_iter().collect();

    let value = match server {
        Some(url) => {
            let client = HealerClient::new(url)?;
            debug!(server = client.base_url(), "Delegating healing to server");
            client.submit_error(&args.message, &context).await?
        }
        None => heal_embedded(args.message, context, config_override).await?,
    };

    let summary = HealingSummary::from_json(value.clone()).context("Unexpected healing result shape")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_healing(&summary);
    }

    if summary.is_unresolved() {
        std::process::exit(EXIT_UNRESOLVED);
    }
    Ok(())
}

async fn heal_embedded(
    message: String,
    context: BTreeMap<String, String>,
    config_override: Option<PathBuf>,
) -> Result<serde_json::Value> {
    let config = HealerConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    let orchestrator = build_orchestrator(&config).context("Failed to build healing pipeline")?;
    let report = context
        .into_iter()
        .fold(ErrorReport::new(message), |report, (key, value)| report.with_context(key, value));

    let result = orchestrator.submit_error(report).await;
    orchestrator.shutdown();

    serde_json::to_value(&result).context("Failed to serialize healing result")
}

pub async fn handle_classify(args: ClassifyArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = HealerConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let classifier = ErrorClassifier::new(create_catalog(&config)?);
    let classification = classifier.classify(&args.message);

    if args.json {
        let value = json!({
            "signature": &classification.signature,
            "signature_hash": classification.signature.digest(),
            "pattern_type": classification.pattern_type,
            "severity": classification.severity,
            "parameters": &classification.parameters,
            "fix_template_id": &classification.fix_template_id,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let pattern = if classification.pattern_type.is_known() {
        classification.pattern_type.as_str().green().bold()
    } else {
        classification.pattern_type.as_str().yellow().bold()
    };
    println!("{} {}", "Pattern:".bold(), pattern);
    println!("  {}", classification.pattern_type.describe().dimmed());
    println!("  Severity: {}", classification.severity);
    println!("  Signature: {}", classification.signature);
    println!("  Hash: {}", classification.signature.digest().as_str().dimmed());
    if let Some(template) = &classification.fix_template_id {
        println!("  Fix template: {}", template);
    }
    if !classification.parameters.is_empty() {
        println!("  Parameters:");
        for (key, value) in &classification.parameters {
            println!("    {} = {}", key, value);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value_splits_on_first_equals() {
        assert_eq!(
            parse_key_value("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_key_value(" source_module =app.cache").unwrap(),
            ("source_module".to_string(), "app.cache".to_string())
        );
    }

    #[test]
    fn test_parse_key_value_rejects_malformed_pairs() {
        assert!(parse_key_value("no-separator").is_err());
        assert!(parse_key_value("=value").is_err());
    }

    #[tokio::test]
    async fn test_embedded_heal_uses_context() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("healer.yaml");
        let mut config = HealerConfigManifest::default();
        config.spec.research.enabled = false;
        config.to_yaml_file(&path).unwrap();

        let context = BTreeMap::from([("source_module".to_string(), "app.cache".to_string())]);
        let value = heal_embedded(
            "ModuleNotFoundError: No module named 'advanced_analytics'".to_string(),
            context,
            Some(path),
        )
        .await
        .unwrap();

        let summary = HealingSummary::from_json(value).unwrap();
        assert!(summary.is_solved());
        assert_eq!(summary.pattern_type, "install_or_fix_module");
    }
}
