// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Terminal rendering of healing results and statistics.
//!
//! Results are read back from their JSON form so the embedded pipeline and
//! a remote server render identically.

use colored::Colorize;
use serde::Deserialize;
use uuid::Uuid;

use aegis_healer_core::domain::healing::StatsSnapshot;

/// The fields of a serialized healing result the CLI displays.
#[derive(Debug, Clone, Deserialize)]
pub struct HealingSummary {
    pub healing_id: Uuid,
    pub signature: String,
    pub pattern_type: String,
    pub severity: String,
    pub outcome: String,
    pub applied: bool,
    pub verified: bool,
    pub from_cache: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
    pub solution: SolutionSummary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolutionSummary {
    pub confidence: f64,
    pub research_method: String,
    #[serde(default)]
    pub evidence: Vec<serde_json::Value>,
    #[serde(default)]
    pub generated_fix: Option<PatchSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchSummary {
    pub target: String,
    pub operation: String,
    pub code: String,
}

impl HealingSummary {
    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn is_solved(&self) -> bool {
        self.outcome == "solved"
    }

    pub fn is_unresolved(&self) -> bool {
        self.outcome == "unresolved"
    }
}

pub fn print_healing(summary: &HealingSummary) {
    let outcome = match summary.outcome.as_str() {
        "solved" => summary.outcome.green().bold(),
        "partially_solved" => summary.outcome.yellow().bold(),
        _ => summary.outcome.red().bold(),
    };
    println!("{} {}", "Outcome:".bold(), outcome);
    println!("  Healing ID: {}", summary.healing_id);
    println!("  Pattern: {} ({})", summary.pattern_type, summary.severity);
    println!("  Signature: {}", summary.signature.dimmed());
    println!(
        "  Confidence: {:.2} via {}{}",
        summary.solution.confidence,
        summary.solution.research_method,
        if summary.from_cache { " (cached)".cyan().to_string() } else { String::new() }
    );
    println!(
        "  Applied: {}  Verified: {}",
        yes_no(summary.applied),
        yes_no(summary.verified)
    );
    if !summary.solution.evidence.is_empty() {
        println!("  Evidence: {} source(s)", summary.solution.evidence.len());
    }
    println!("  Duration: {}ms", summary.duration_ms);

    if let Some(error) = &summary.error {
        println!("  {} {}", "Error:".red(), error);
    }

    if let Some(fix) = &summary.solution.generated_fix {
        println!();
        println!("{} {} on {}", "Generated fix:".bold(), fix.operation, fix.target);
        for line in fix.code.lines() {
            println!("    {}", line);
        }
    }
}

pub fn print_stats(stats: &StatsSnapshot) {
    println!("{}", "Healing statistics:".bold());
    println!("  Healings: {}", stats.healings_total);
    println!(
        "  Attempts: {}  Successes: {}  Success rate: {:.1}%",
        stats.attempts,
        stats.successes,
        stats.success_rate * 100.0
    );
    println!();

    println!("{}", "Knowledge cache:".bold());
    if stats.cache_stateless {
        println!("  {}", "stateless (no backing store)".yellow());
    }
    println!("  Entries: {}", stats.cache_entries);
    println!(
        "  Hits: {}/{} ({:.1}%)",
        stats.cache_hits,
        stats.cache_lookups,
        stats.cache_hit_ratio * 100.0
    );
    println!();

    if !stats.outcomes.is_empty() {
        println!("{}", "Outcomes:".bold());
        for (outcome, count) in &stats.outcomes {
            println!("  {:<18} {}", outcome, count);
        }
        println!();
    }

    if !stats.per_pattern.is_empty() {
        println!("{}", "Per pattern:".bold());
        println!("  {:<24} {:>8} {:>9}", "PATTERN", "ATTEMPTS", "SUCCESSES");
        for (pattern, counters) in &stats.per_pattern {
            println!(
                "  {:<24} {:>8} {:>9}",
                pattern.as_str(),
                counters.attempts,
                counters.successes
            );
        }
    }
}

fn yes_no(value: bool) -> String {
    if value {
        "yes".green().to_string()
    } else {
        "no".dimmed().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_healer_core::application::factory::build_orchestrator;
    use aegis_healer_core::domain::error_report::ErrorReport;
    use aegis_healer_core::domain::healer_config::HealerConfigManifest;

    #[tokio::test]
    async fn test_summary_reads_a_serialized_result() {
        let mut manifest = HealerConfigManifest::default();
        manifest.spec.research.enabled = false;
        let healer = build_orchestrator(&manifest).unwrap();
        let result = healer
            .submit_error(ErrorReport::new("ModuleNotFoundError: No module named 'advanced_analytics'"))
            .await;

        let summary = HealingSummary::from_json(serde_json::to_value(&result).unwrap()).unwrap();
        assert_eq!(summary.healing_id, result.healing_id.0);
        assert_eq!(summary.pattern_type, "install_or_fix_module");
        assert!(summary.is_solved());
        assert_eq!(summary.solution.confidence, 0.7);
        let fix = summary.solution.generated_fix.unwrap();
        assert_eq!(fix.target, "advanced_analytics");
        assert!(fix.code.contains("pip install advanced_analytics"));
    }

    #[test]
    fn test_summary_tolerates_missing_fix() {
        let value = serde_json::json!({
            "healing_id": "7a4c3f5e-8d1b-4d6e-9f0a-2b3c4d5e6f70",
            "signature": "some unknown failure",
            "pattern_type": "unknown",
            "severity": "medium",
            "outcome": "unresolved",
            "applied": false,
            "verified": false,
            "from_cache": false,
            "duration_ms": 12,
            "solution": {
                "pattern_type": "unknown",
                "confidence": 0.0,
                "research_method": "file_structure_analysis",
                "evidence": [],
                "parameters": {}
            },
            "trail": [],
            "completed_at": "2026-01-01T00:00:00Z"
        });

        let summary = HealingSummary::from_json(value).unwrap();
        assert!(summary.is_unresolved());
        assert!(summary.solution.generated_fix.is_none());
        assert!(summary.error.is_none());
    }
}
