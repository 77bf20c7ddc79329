// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Strategy Resolver
//!
//! Finds the best [`Solution`] for a classified error by running an ordered
//! list of strategies until one clears the pattern's acceptance threshold.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Resolution of an error signature into a scored solution
//! - **Integration:** HealingOrchestrator → StrategyResolver → KnowledgeCache
//!
//! # Strategy order
//!
//! 0. Knowledge cache: a prior resolution for the signature is returned as-is.
//! 1. Common solutions: canned per-pattern solution with configured confidence.
//! 2. Codebase analysis: symbol index corroborates or locates the fix.
//! 3. Parallel research crawl: concurrent search over every configured source,
//!    bounded by the global deadline, merged by content analysis.
//! 4. File-structure analysis: only when everything before scored zero.
//!
//! Strategies run strictly in sequence; only the crawl is internally
//! concurrent. The highest-confidence solution wins and is recorded in the
//! cache, which keeps the maximum it has ever seen for the signature.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::classifier::Classification;
use crate::application::codebase_analysis::CodebaseAnalyzer;
use crate::application::content_analysis::ContentAnalyzer;
use crate::application::file_structure::FileStructureAnalyzer;
use crate::application::knowledge_cache::KnowledgeCache;
use crate::application::research_crawl::ParallelResearchCrawl;
use crate::domain::error_report::ErrorReport;
use crate::domain::errors::HealingError;
use crate::domain::events::HealingEvent;
use crate::domain::healer_config::ResolverConfig;
use crate::domain::healing::HealingId;
use crate::domain::knowledge::KnowledgeRecord;
use crate::domain::pattern::PatternType;
use crate::domain::solution::{ResearchMethod, Solution, SourceKind, SourceRef};
use crate::infrastructure::event_bus::EventBus;

static ERROR_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]\w*(?:Error|Exception))\b").expect("valid regex"));
static TERM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][\w.]{3,}").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

const MAX_QUERY_CHARS: usize = 256;
const MAX_KEY_TERMS: usize = 5;
const QUERY_STOP_WORDS: [&str; 8] = ["from", "with", "that", "this", "have", "named", "object", "module"];

/// One strategy's contribution to a resolution.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyAttempt {
    pub strategy: ResearchMethod,
    pub confidence: f64,
    pub duration_ms: u64,
}

/// The resolver's answer for one healing attempt.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub solution: Solution,
    pub from_cache: bool,
    pub cached_record: Option<KnowledgeRecord>,
    pub attempts: Vec<StrategyAttempt>,
    pub timed_out_sources: Vec<String>,
}

impl Resolution {
    /// The cached solution was already applied and verified.
    pub fn is_settled(&self) -> bool {
        self.cached_record.as_ref().is_some_and(KnowledgeRecord::is_settled)
    }
}

pub struct StrategyResolver {
    config: ResolverConfig,
    cache: Arc<KnowledgeCache>,
    codebase: Arc<CodebaseAnalyzer>,
    crawl: Option<ParallelResearchCrawl>,
    content: ContentAnalyzer,
    file_structure: Arc<FileStructureAnalyzer>,
    event_bus: Arc<EventBus>,
    shutdown: CancellationToken,
}

impl StrategyResolver {
    pub fn new(config: ResolverConfig, cache: Arc<KnowledgeCache>, event_bus: Arc<EventBus>) -> Self {
        Self {
            config,
            cache,
            codebase: Arc::new(CodebaseAnalyzer::disabled()),
            crawl: None,
            content: ContentAnalyzer::default(),
            file_structure: Arc::new(FileStructureAnalyzer::new(None, Vec::new())),
            event_bus,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_codebase(mut self, codebase: Arc<CodebaseAnalyzer>) -> Self {
        self.codebase = codebase;
        self
    }

    pub fn with_research(mut self, crawl: ParallelResearchCrawl) -> Self {
        self.crawl = Some(crawl);
        self
    }

    pub fn with_content_analyzer(mut self, content: ContentAnalyzer) -> Self {
        self.content = content;
        self
    }

    pub fn with_file_structure(mut self, file_structure: FileStructureAnalyzer) -> Self {
        self.file_structure = Arc::new(file_structure);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<KnowledgeCache> {
        &self.cache
    }

    pub fn codebase(&self) -> &Arc<CodebaseAnalyzer> {
        &self.codebase
    }

    /// Cancels every in-flight crawl. Later crawls start already cancelled.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn resolve(
        &self,
        healing_id: HealingId,
        report: &ErrorReport,
        classification: &Classification,
    ) -> Resolution {
        let signature = &classification.signature;

        if let Some(record) = self.cache.lookup_matching(signature, &classification.parameters) {
            info!(
                signature = %signature,
                confidence = record.confidence,
                research_method = %record.research_method,
                applied = record.applied,
                "Knowledge cache hit"
            );
            self.event_bus.publish(HealingEvent::CacheHit {
                healing_id,
                signature: signature.clone(),
                confidence: record.confidence,
                applied: record.applied,
                hit_at: Utc::now(),
            });
            return Resolution {
                solution: record.to_solution(),
                from_cache: true,
                cached_record: Some(record),
                attempts: Vec::new(),
                timed_out_sources: Vec::new(),
            };
        }

        let pattern_type = classification.pattern_type;
        if !pattern_type.is_known() {
            debug!(
                reason = %HealingError::ClassificationMiss(signature.to_string()),
                "Resolving without a catalog pattern"
            );
        }
        let threshold = self.config.threshold_for(pattern_type);
        let mut attempts = Vec::new();
        let mut best: Option<Solution> = None;

        let started = Instant::now();
        let common = self.common_solution(classification);
        self.record_attempt(healing_id, ResearchMethod::CommonSolutions, common.as_ref(), started, &mut attempts);
        best = better(best, common);

        if confidence_of(&best) < threshold && self.codebase.is_enabled() {
            let started = Instant::now();
            let found = self.analyze_codebase(classification, confidence_of(&best)).await;
            self.record_attempt(healing_id, ResearchMethod::CodebaseAnalysis, found.as_ref(), started, &mut attempts);
            best = better(best, found);
        }

        let mut timed_out_sources = Vec::new();
        if confidence_of(&best) < threshold {
            if let Some(crawl) = self.crawl.as_ref().filter(|c| c.source_count() > 0) {
                let started = Instant::now();
                let (found, timed_out) = self.research(healing_id, crawl, report, classification).await;
                self.record_attempt(healing_id, ResearchMethod::ParallelCrawling, found.as_ref(), started, &mut attempts);
                timed_out_sources = timed_out;
                best = better(best, found);
            }
        }

        if confidence_of(&best) <= 0.0 {
            let started = Instant::now();
            let found = self.analyze_file_structure(report, classification).await;
            self.record_attempt(
                healing_id,
                ResearchMethod::FileStructureAnalysis,
                found.as_ref(),
                started,
                &mut attempts,
            );
            best = better(best, found);
        }

        let solution = best.unwrap_or_else(|| Solution::unresolved(pattern_type, ResearchMethod::FileStructureAnalysis));
        let solution = self.cache.record_solution(signature, &solution);
        if solution.is_actionable() {
            self.event_bus.publish(HealingEvent::SolutionCached {
                healing_id,
                signature: signature.clone(),
                confidence: solution.confidence(),
                research_method: solution.research_method(),
                cached_at: Utc::now(),
            });
        }

        info!(
            signature = %signature,
            pattern_type = %solution.pattern_type(),
            confidence = solution.confidence(),
            strategy = %solution.research_method(),
            strategies_run = attempts.len(),
            "Resolution finished"
        );
        Resolution {
            solution,
            from_cache: false,
            cached_record: None,
            attempts,
            timed_out_sources,
        }
    }

    fn common_solution(&self, classification: &Classification) -> Option<Solution> {
        let pattern_type = classification.pattern_type;
        if !pattern_type.is_known() {
            return None;
        }
        let confidence = *self.config.common_solutions.get(&pattern_type)?;
        let location = classification
            .fix_template_id
            .clone()
            .unwrap_or_else(|| pattern_type.to_string());
        Some(
            Solution::new(pattern_type, confidence, ResearchMethod::CommonSolutions)
                .with_parameters(classification.parameters.clone())
                .with_evidence(
                    SourceRef::new(SourceKind::PatternCatalog, location).with_snippet(pattern_type.describe()),
                ),
        )
    }

    async fn analyze_codebase(&self, classification: &Classification, base: f64) -> Option<Solution> {
        let codebase = self.codebase.clone();
        let classification = classification.clone();
        let boost = self.config.codebase_boost;
        // Index builds walk the tree; keep them off the async workers
        match tokio::task::spawn_blocking(move || codebase.analyze(&classification, base, boost)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Codebase analysis task failed");
                None
            }
        }
    }

    async fn analyze_file_structure(&self, report: &ErrorReport, classification: &Classification) -> Option<Solution> {
        let analyzer = self.file_structure.clone();
        let report = report.clone();
        let classification = classification.clone();
        match tokio::task::spawn_blocking(move || analyzer.analyze(&report, &classification)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "File structure analysis task failed");
                None
            }
        }
    }

    async fn research(
        &self,
        healing_id: HealingId,
        crawl: &ParallelResearchCrawl,
        report: &ErrorReport,
        classification: &Classification,
    ) -> (Option<Solution>, Vec<String>) {
        let queries = build_queries(report, classification, crawl.settings().max_queries);
        let outcome = crawl.crawl(&queries, &self.shutdown).await;

        let mut timed_out = BTreeSet::new();
        for timeout in &outcome.timed_out {
            let error = HealingError::ResearchTimeout {
                source_name: timeout.source_name.clone(),
                timeout_ms: timeout.timeout_ms,
            };
            warn!(source = %timeout.source_name, query = %timeout.query, error = %error, "Research source excluded");
            if timed_out.insert(timeout.source_name.clone()) {
                self.event_bus.publish(HealingEvent::ResearchSourceTimedOut {
                    healing_id,
                    source_name: timeout.source_name.clone(),
                    timeout_ms: timeout.timeout_ms,
                    timed_out_at: Utc::now(),
                });
            }
        }
        for failure in &outcome.failed {
            warn!(source = %failure.source_name, error = %failure.error, "Research source failed");
        }

        let analysis = self.content.analyze(&outcome.findings, &key_terms(report, classification));
        if analysis.candidates.is_empty() || analysis.confidence <= 0.0 {
            return (None, timed_out.into_iter().collect());
        }

        let known = classification.pattern_type;
        let pattern_type = if known.is_known() {
            known
        } else {
            analysis.inferred_pattern.unwrap_or(PatternType::Unknown)
        };
        let mut parameters = classification.parameters.clone();
        let agrees = !known.is_known() || analysis.inferred_pattern == Some(known);
        for (key, value) in &analysis.parameters {
            if agrees || key == "snippet" {
                parameters.insert(key.clone(), value.clone());
            } else {
                parameters.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let solution = analysis.evidence().into_iter().fold(
            Solution::new(pattern_type, analysis.confidence, ResearchMethod::ParallelCrawling)
                .with_parameters(parameters),
            Solution::with_evidence,
        );
        (Some(solution), timed_out.into_iter().collect())
    }

    fn record_attempt(
        &self,
        healing_id: HealingId,
        strategy: ResearchMethod,
        found: Option<&Solution>,
        started: Instant,
        attempts: &mut Vec<StrategyAttempt>,
    ) {
        let confidence = found.map_or(0.0, Solution::confidence);
        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(strategy = %strategy, confidence, duration_ms, "Strategy completed");
        self.event_bus.publish(HealingEvent::StrategyCompleted {
            healing_id,
            strategy,
            confidence,
            duration_ms,
            completed_at: Utc::now(),
        });
        attempts.push(StrategyAttempt {
            strategy,
            confidence,
            duration_ms,
        });
    }
}

fn confidence_of(solution: &Option<Solution>) -> f64 {
    solution.as_ref().map_or(0.0, Solution::confidence)
}

/// Keeps the higher-confidence solution; ties go to the earlier strategy.
fn better(current: Option<Solution>, candidate: Option<Solution>) -> Option<Solution> {
    match (current, candidate) {
        (Some(current), Some(candidate)) if candidate.confidence() > current.confidence() => Some(candidate),
        (Some(current), _) => Some(current),
        (None, candidate) => candidate,
    }
}

/// Distinct phrasings of the error for the research crawl.
pub fn build_queries(report: &ErrorReport, classification: &Classification, max_queries: usize) -> Vec<String> {
    let message: String = report.raw_message.trim().chars().take(MAX_QUERY_CHARS).collect();
    let values: Vec<&str> = classification
        .parameters
        .values()
        .map(String::as_str)
        .filter(|v| !v.is_empty() && !v.contains('\n') && v.len() <= 128)
        .collect();
    let error_type = ERROR_TYPE
        .captures(&report.raw_message)
        .map(|caps| caps[1].to_string());

    let mut variants = vec![message.clone()];
    if !values.is_empty() {
        variants.push(format!("{} {}", classification.pattern_type.describe(), values.join(" ")));
    }
    variants.push(match error_type {
        Some(error_type) if !values.is_empty() => format!("how to fix {} {}", error_type, values.join(" ")),
        _ => format!("how to fix {}", message),
    });

    let language = report.context_value("language").filter(|l| !l.trim().is_empty());
    let mut seen = BTreeSet::new();
    variants
        .into_iter()
        .map(|query| match language {
            Some(language) if !query.to_lowercase().contains(&language.to_lowercase()) => {
                format!("{} {}", query, language)
            }
            _ => query,
        })
        .map(|query| WHITESPACE.replace_all(query.trim(), " ").to_string())
        .filter(|query| !query.is_empty() && seen.insert(query.clone()))
        .take(max_queries)
        .collect()
}

/// Terms a useful research snippet should mention.
fn key_terms(report: &ErrorReport, classification: &Classification) -> Vec<String> {
    let from_parameters: Vec<String> = classification
        .parameters
        .iter()
        .filter(|(key, _)| key.as_str() != "template")
        .map(|(_, value)| value.clone())
        .filter(|v| !v.is_empty() && !v.contains(char::is_whitespace))
        .collect();
    if !from_parameters.is_empty() {
        return from_parameters;
    }

    let mut seen = BTreeSet::new();
    TERM.find_iter(&report.raw_message)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .filter(|term| !ERROR_TYPE.is_match(term) && !QUERY_STOP_WORDS.contains(&term.to_lowercase().as_str()))
        .filter(|term| seen.insert(term.clone()))
        .take(MAX_KEY_TERMS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::classifier::ErrorClassifier;
    use crate::application::codebase_analysis::{ModuleSymbols, SymbolIndex};
    use crate::application::pattern_catalog::PatternCatalog;
    use crate::application::research_crawl::CrawlSettings;
    use crate::domain::research::{ResearchError, ResearchSource, ResearchSourceKind, SearchHit};
    use crate::infrastructure::knowledge::memory::InMemoryKnowledgeStore;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct CannedSource {
        name: String,
        snippet: Option<String>,
    }

    #[async_trait]
    impl ResearchSource for CannedSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> ResearchSourceKind {
            ResearchSourceKind::QaSearch
        }

        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchHit>, ResearchError> {
            match &self.snippet {
                Some(snippet) => Ok(vec![SearchHit {
                    url: format!("https://{}/answer", self.name),
                    title: query.to_string(),
                    snippet: snippet.clone(),
                }]),
                None => {
                    std::future::pending::<()>().await;
                    Ok(Vec::new())
                }
            }
        }

        async fn fetch(&self, _url: &str) -> Result<String, ResearchError> {
            Ok(String::new())
        }
    }

    fn source(name: &str, snippet: Option<&str>) -> Arc<dyn ResearchSource> {
        Arc::new(CannedSource {
            name: name.to_string(),
            snippet: snippet.map(str::to_string),
        })
    }

    fn classify(message: &str) -> Classification {
        ErrorClassifier::new(Arc::new(PatternCatalog::builtin())).classify(message)
    }

    fn resolver() -> StrategyResolver {
        StrategyResolver::new(
            ResolverConfig::default(),
            Arc::new(KnowledgeCache::new(Arc::new(InMemoryKnowledgeStore::new(100)))),
            Arc::new(EventBus::with_default_capacity()),
        )
    }

    fn crawl(sources: Vec<Arc<dyn ResearchSource>>) -> ParallelResearchCrawl {
        ParallelResearchCrawl::new(
            sources,
            CrawlSettings {
                per_source_timeout: Duration::from_secs(5),
                global_timeout: Duration::from_secs(15),
                fetch_timeout: Duration::from_secs(3),
                top_k: 1,
                max_queries: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_common_solution_short_circuits() {
        let resolver = resolver().with_research(crawl(vec![source("qa", Some("pip install nothing"))]));
        let message = "AttributeError: 'CacheManager' object has no attribute 'clear_all'";
        let resolution = resolver
            .resolve(HealingId::new(), &ErrorReport::new(message), &classify(message))
            .await;

        assert!(!resolution.from_cache);
        assert_eq!(resolution.solution.confidence(), 0.80);
        assert_eq!(resolution.solution.research_method(), ResearchMethod::CommonSolutions);
        assert_eq!(resolution.attempts.len(), 1);
        assert_eq!(resolution.solution.parameter("attribute"), Some("clear_all"));
    }

    #[tokio::test]
    async fn test_second_resolution_comes_from_cache() {
        let resolver = resolver();
        let message = "ModuleNotFoundError: No module named 'advanced_analytics'";
        let classification = classify(message);
        let first = resolver.resolve(HealingId::new(), &ErrorReport::new(message), &classification).await;
        let second = resolver.resolve(HealingId::new(), &ErrorReport::new(message), &classification).await;

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert!(!second.is_settled());
        assert_eq!(second.solution.research_method(), first.solution.research_method());
        assert_eq!(second.solution.confidence(), 0.70);
    }

    #[tokio::test]
    async fn test_codebase_raises_generic_import_confidence() {
        let mut index = SymbolIndex::default();
        let mut symbols = ModuleSymbols::default();
        symbols.classes.insert("DatabaseConnection".to_string(), BTreeSet::new());
        index.insert("src.data.connection".to_string(), symbols);

        let resolver = resolver().with_codebase(Arc::new(CodebaseAnalyzer::with_index(index)));
        let message = "ImportError: cannot import name 'DatabaseConnection' from 'src.data'";
        let resolution = resolver
            .resolve(HealingId::new(), &ErrorReport::new(message), &classify(message))
            .await;

        assert_eq!(resolution.solution.research_method(), ResearchMethod::CodebaseAnalysis);
        assert_eq!(resolution.solution.confidence(), 0.75);
        assert_eq!(resolution.solution.parameter("resolved_module"), Some("src.data.connection"));
        assert_eq!(resolution.attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_error_is_researched() {
        let resolver = resolver().with_research(crawl(vec![
            source("qa", Some("Run `pip install frobnicate-tools` and retry")),
            source("issues", Some("pip install frobnicate-tools fixed it for me")),
        ]));
        let message = "frobnicate toolkit failed to start: backend unavailable";
        let resolution = resolver
            .resolve(HealingId::new(), &ErrorReport::new(message), &classify(message))
            .await;

        let solution = &resolution.solution;
        assert_eq!(solution.research_method(), ResearchMethod::ParallelCrawling);
        assert_eq!(solution.pattern_type(), PatternType::InstallOrFixModule);
        assert_eq!(solution.parameter("package"), Some("frobnicate-tools"));
        assert!(solution.confidence() > 0.0);
        assert!(!solution.evidence().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_sources_timing_out_falls_through_to_zero() {
        let resolver = resolver().with_research(crawl(vec![
            source("web", None),
            source("issues", None),
            source("qa", None),
        ]));
        let message = "frobnicate toolkit failed to start: backend unavailable";
        let classification = classify(message);
        let resolution = resolver
            .resolve(HealingId::new(), &ErrorReport::new(message), &classification)
            .await;

        assert_eq!(resolution.solution.confidence(), 0.0);
        assert_eq!(resolution.solution.research_method(), ResearchMethod::FileStructureAnalysis);
        assert_eq!(resolution.timed_out_sources, vec!["issues", "qa", "web"]);
        let strategies: Vec<ResearchMethod> = resolution.attempts.iter().map(|a| a.strategy).collect();
        assert_eq!(
            strategies,
            vec![
                ResearchMethod::CommonSolutions,
                ResearchMethod::ParallelCrawling,
                ResearchMethod::FileStructureAnalysis
            ]
        );
        assert!(resolver.cache().lookup(&classification.signature).is_none());
    }

    #[test]
    fn test_query_variants() {
        let message = "ImportError: cannot import name 'DatabaseConnection' from 'src.data'";
        let report = ErrorReport::new(message).with_context("language", "python");
        let queries = build_queries(&report, &classify(message), 3);

        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0], format!("{} python", message));
        assert!(queries[1].starts_with("cannot import name"));
        assert!(queries[2].starts_with("how to fix ImportError"));
        assert_eq!(build_queries(&report, &classify(message), 1).len(), 1);
    }

    #[test]
    fn test_key_terms_fall_back_to_message() {
        let message = "frobnicate toolkit failed to start";
        let classification = Classification {
            parameters: BTreeMap::new(),
            ..classify(message)
        };
        let terms = key_terms(&ErrorReport::new(message), &classification);
        assert_eq!(terms, vec!["frobnicate", "toolkit", "failed", "start"]);
    }
}
