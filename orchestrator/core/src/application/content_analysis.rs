// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Content Analysis
//!
//! Merges research findings into ranked fix candidates. Pages are reduced to
//! markdown, then mined for install commands, import statements and fenced
//! code blocks. Confidence grows with how specific the best candidate is to
//! the error and how many independent kinds of source proposed it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::domain::pattern::PatternType;
use crate::domain::research::ResearchFinding;
use crate::domain::solution::{SourceKind, SourceRef};

static PIP_INSTALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bpip3?\s+install\s+(?:-U\s+|--upgrade\s+)?([A-Za-z0-9][A-Za-z0-9_.\-]*)(?:\[[^\]]*\])?").expect("valid regex")
});
static FROM_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*from\s+([A-Za-z_][\w.]*)\s+import\s+([A-Za-z_]\w*(?:\s*,\s*[A-Za-z_]\w*)*)\s*$").expect("valid regex")
});
static PLAIN_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*import\s+([A-Za-z_][\w.]*)\s*$").expect("valid regex"));
static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```[\w+-]*\n(.*?)```").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

const BASE_CONFIDENCE: f64 = 0.15;
const SPECIFICITY_WEIGHT: f64 = 0.35;
const PER_SOURCE_KIND: f64 = 0.15;
const ACTIONABLE_BONUS: f64 = 0.2;
const MAX_BLOCK_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CandidateKind {
    InstallCommand,
    ImportStatement,
    CodeBlock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixCandidate {
    pub kind: CandidateKind,
    pub snippet: String,
    pub specificity: f64,
    pub sources: BTreeSet<String>,
    pub source_kinds: BTreeSet<SourceKind>,
    pub urls: Vec<String>,
}

impl FixCandidate {
    fn score(&self) -> f64 {
        self.specificity + 0.1 * self.source_kinds.len() as f64 + 0.01 * self.sources.len() as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentAnalysis {
    /// Best first
    pub candidates: Vec<FixCandidate>,
    pub confidence: f64,
    pub source_diversity: usize,
    /// Pattern the best candidate implies, when it implies one
    pub inferred_pattern: Option<PatternType>,
    pub parameters: BTreeMap<String, String>,
}

impl ContentAnalysis {
    pub fn best(&self) -> Option<&FixCandidate> {
        self.candidates.first()
    }

    pub fn evidence(&self) -> Vec<SourceRef> {
        let Some(best) = self.best() else {
            return Vec::new();
        };
        let kind = best.source_kinds.iter().next().copied().unwrap_or(SourceKind::WebSearch);
        best.urls
            .iter()
            .map(|url| SourceRef::new(kind, url.clone()).with_snippet(best.snippet.clone()))
            .collect()
    }
}

pub struct ContentAnalyzer {
    max_confidence: f64,
}

impl Default for ContentAnalyzer {
    fn default() -> Self {
        Self { max_confidence: 0.85 }
    }
}

impl ContentAnalyzer {
    pub fn new(max_confidence: f64) -> Self {
        Self {
            max_confidence: max_confidence.clamp(0.0, 1.0),
        }
    }

    pub fn analyze(&self, findings: &[ResearchFinding], key_terms: &[String]) -> ContentAnalysis {
        let mut merged: BTreeMap<(CandidateKind, String), FixCandidate> = BTreeMap::new();

        for finding in findings {
            let text = readable_text(finding);
            for (kind, snippet) in extract(&text, key_terms) {
                let key = (kind, WHITESPACE.replace_all(snippet.trim(), " ").to_string());
                let candidate = merged.entry(key).or_insert_with(|| FixCandidate {
                    kind,
                    specificity: specificity(kind, &snippet, key_terms),
                    snippet: snippet.trim().to_string(),
                    sources: BTreeSet::new(),
                    source_kinds: BTreeSet::new(),
                    urls: Vec::new(),
                });
                candidate.sources.insert(finding.source_name.clone());
                candidate.source_kinds.insert(finding.source_kind);
                if !candidate.urls.contains(&finding.hit.url) {
                    candidate.urls.push(finding.hit.url.clone());
                }
            }
        }

        let mut candidates: Vec<FixCandidate> = merged.into_values().collect();
        candidates.sort_by(|a, b| b.score().total_cmp(&a.score()).then(a.kind.cmp(&b.kind)));

        let source_diversity = findings
            .iter()
            .map(|f| f.source_kind)
            .collect::<BTreeSet<_>>()
            .len();

        let Some(best) = candidates.first() else {
            return ContentAnalysis {
                source_diversity,
                ..ContentAnalysis::default()
            };
        };

        let confidence = (BASE_CONFIDENCE
            + SPECIFICITY_WEIGHT * best.specificity
            + PER_SOURCE_KIND * best.source_kinds.len() as f64)
            .min(self.max_confidence);
        let (inferred_pattern, mut parameters) = infer(best);
        parameters.insert("snippet".to_string(), best.snippet.clone());

        debug!(
            candidates = candidates.len(),
            confidence,
            source_diversity,
            "Analyzed research content"
        );
        ContentAnalysis {
            candidates,
            confidence,
            source_diversity,
            inferred_pattern,
            parameters,
        }
    }
}

fn looks_like_html(text: &str) -> bool {
    let head: String = text.chars().take(512).collect::<String>().to_ascii_lowercase();
    ["<html", "<!doctype", "<pre", "<code", "<p>", "<div"]
        .iter()
        .any(|marker| head.contains(marker))
        || text.contains("</code>")
}

fn readable_text(finding: &ResearchFinding) -> String {
    let mut text = String::new();
    for part in [Some(&finding.hit.snippet), finding.content.as_ref()].into_iter().flatten() {
        if looks_like_html(part) {
            text.push_str(&html2md::parse_html(part));
        } else {
            text.push_str(part);
        }
        text.push('\n');
    }
    text
}

fn extract(text: &str, key_terms: &[String]) -> Vec<(CandidateKind, String)> {
    let mut found = Vec::new();
    for caps in PIP_INSTALL.captures_iter(text) {
        found.push((CandidateKind::InstallCommand, format!("pip install {}", &caps[1])));
    }
    for caps in FROM_IMPORT.captures_iter(text) {
        found.push((
            CandidateKind::ImportStatement,
            format!("from {} import {}", &caps[1], WHITESPACE.replace_all(&caps[2], " ")),
        ));
    }
    for caps in PLAIN_IMPORT.captures_iter(text) {
        found.push((CandidateKind::ImportStatement, format!("import {}", &caps[1])));
    }
    for caps in FENCED_BLOCK.captures_iter(text) {
        let block = caps[1].trim();
        if !block.is_empty() && block.len() <= MAX_BLOCK_CHARS && mentions_any(block, key_terms) {
            found.push((CandidateKind::CodeBlock, block.to_string()));
        }
    }
    found
}

fn mentions_any(text: &str, key_terms: &[String]) -> bool {
    let lowered = text.to_lowercase();
    key_terms.iter().any(|term| lowered.contains(&term.to_lowercase()))
}

/// Share of key terms the snippet mentions, plus a bonus for directly
/// actionable lines.
fn specificity(kind: CandidateKind, snippet: &str, key_terms: &[String]) -> f64 {
    let lowered = snippet.to_lowercase();
    let coverage = if key_terms.is_empty() {
        0.5
    } else {
        key_terms
            .iter()
            .filter(|term| lowered.contains(&term.to_lowercase()))
            .count() as f64
            / key_terms.len() as f64
    };
    let bonus = if kind == CandidateKind::CodeBlock {
        0.0
    } else {
        ACTIONABLE_BONUS
    };
    (coverage + bonus).min(1.0)
}

fn infer(best: &FixCandidate) -> (Option<PatternType>, BTreeMap<String, String>) {
    let mut parameters = BTreeMap::new();
    match best.kind {
        CandidateKind::InstallCommand => {
            let package = best.snippet.trim_start_matches("pip install ").to_string();
            parameters.insert("module".to_string(), package.replace('-', "_"));
            parameters.insert("package".to_string(), package);
            (Some(PatternType::InstallOrFixModule), parameters)
        }
        CandidateKind::ImportStatement => {
            if let Some(caps) = FROM_IMPORT.captures(&best.snippet) {
                parameters.insert("resolved_module".to_string(), caps[1].to_string());
                if let Some(first) = caps[2].split(',').next() {
                    parameters.insert("name".to_string(), first.trim().to_string());
                }
            }
            (Some(PatternType::GenericImportFix), parameters)
        }
        CandidateKind::CodeBlock => (None, parameters),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::research::SearchHit;

    fn finding(source: &str, kind: SourceKind, snippet: &str, content: Option<&str>) -> ResearchFinding {
        ResearchFinding {
            source_name: source.to_string(),
            source_kind: kind,
            query: "q".to_string(),
            hit: SearchHit {
                url: format!("https://{}/1", source),
                title: "t".to_string(),
                snippet: snippet.to_string(),
            },
            content: content.map(str::to_string),
        }
    }

    #[test]
    fn test_install_command_across_sources() {
        let findings = vec![
            finding("searx", SourceKind::WebSearch, "Try pip install pyyaml", None),
            finding(
                "stackoverflow",
                SourceKind::QaSite,
                "",
                Some("<html><body><pre><code>pip install pyyaml</code></pre></body></html>"),
            ),
            finding("github", SourceKind::IssueTracker, "unrelated chatter", None),
        ];
        let analysis = ContentAnalyzer::default().analyze(&findings, &["yaml".to_string()]);

        let best = analysis.best().unwrap();
        assert_eq!(best.snippet, "pip install pyyaml");
        assert_eq!(best.source_kinds.len(), 2);
        assert_eq!(analysis.inferred_pattern, Some(PatternType::InstallOrFixModule));
        assert_eq!(analysis.parameters["package"], "pyyaml");
        assert_eq!(analysis.source_diversity, 3);
        // 0.15 + 0.35 * 1.0 + 0.15 * 2, capped
        assert!((analysis.confidence - 0.80).abs() < 1e-9);
        assert_eq!(analysis.evidence().len(), 2);
    }

    #[test]
    fn test_import_statement_inference() {
        let findings = vec![finding(
            "searx",
            SourceKind::WebSearch,
            "",
            Some("Move it:\n\nfrom src.data.connection import DatabaseConnection\n"),
        )];
        let analysis = ContentAnalyzer::default().analyze(&findings, &["DatabaseConnection".to_string()]);
        assert_eq!(analysis.inferred_pattern, Some(PatternType::GenericImportFix));
        assert_eq!(analysis.parameters["resolved_module"], "src.data.connection");
        assert_eq!(analysis.parameters["name"], "DatabaseConnection");
    }

    #[test]
    fn test_nothing_extracted_means_zero_confidence() {
        let findings = vec![finding("searx", SourceKind::WebSearch, "no code here", None)];
        let analysis = ContentAnalyzer::default().analyze(&findings, &["frobnicate".to_string()]);
        assert!(analysis.best().is_none());
        assert_eq!(analysis.confidence, 0.0);
        assert!(ContentAnalyzer::default().analyze(&[], &[]).candidates.is_empty());
    }

    #[test]
    fn test_code_blocks_need_key_terms() {
        let text = "```python\ncache.clear_all()\n```\n```\nprint('hello')\n```";
        let found = extract(text, &["clear_all".to_string()]);
        assert_eq!(found, vec![(CandidateKind::CodeBlock, "cache.clear_all()".to_string())]);
    }
}
