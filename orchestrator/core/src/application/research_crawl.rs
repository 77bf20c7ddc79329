// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Parallel Research Crawl
//!
//! Fans out one unit of work per (query × source). Each unit searches its
//! source under the per-source deadline, then fetches the top-K hit pages
//! concurrently under the fetch deadline alone. Units are joined against a single
//! global deadline; whatever has not finished by then is cancelled and left
//! out of the merge.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Resolver strategy 3 (fan-out / fan-in)
//!
//! # Cancellation
//!
//! Every crawl runs under a child of the caller's [`CancellationToken`].
//! Cancelling the parent stops the crawl; finishing (or abandoning) the crawl
//! cancels only its own child token, so sibling crawls are unaffected.
//! Abandoned units are aborted, which drops their in-flight HTTP futures.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::healer_config::ResearchConfig;
use crate::domain::research::{ResearchError, ResearchFinding, ResearchSource, SearchHit};

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub per_source_timeout: Duration,
    pub global_timeout: Duration,
    pub fetch_timeout: Duration,
    pub top_k: usize,
    pub max_queries: usize,
}

impl From<&ResearchConfig> for CrawlSettings {
    fn from(config: &ResearchConfig) -> Self {
        Self {
            per_source_timeout: config.per_source_timeout,
            global_timeout: config.global_timeout,
            fetch_timeout: config.fetch_timeout,
            top_k: config.top_k,
            max_queries: config.max_queries,
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::from(&ResearchConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceTimeout {
    pub source_name: String,
    pub query: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source_name: String,
    pub query: String,
    pub error: ResearchError,
}

/// Everything that arrived before the crawl ended.
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    pub findings: Vec<ResearchFinding>,
    pub timed_out: Vec<SourceTimeout>,
    pub failed: Vec<SourceFailure>,
    /// Units still running when the crawl ended
    pub abandoned: usize,
    pub deadline_exceeded: bool,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl CrawlReport {
    pub fn source_diversity(&self) -> usize {
        let mut names: Vec<&str> = self.findings.iter().map(|f| f.source_name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }
}

enum UnitOutcome {
    Found(Vec<ResearchFinding>),
    Failed(ResearchError),
    TimedOut,
    Cancelled,
}

pub struct ParallelResearchCrawl {
    sources: Vec<Arc<dyn ResearchSource>>,
    settings: CrawlSettings,
}

impl ParallelResearchCrawl {
    pub fn new(sources: Vec<Arc<dyn ResearchSource>>, settings: CrawlSettings) -> Self {
        Self { sources, settings }
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub async fn crawl(&self, queries: &[String], parent: &CancellationToken) -> CrawlReport {
        let started = Instant::now();
        let deadline = started + self.settings.global_timeout;
        let token = parent.child_token();
        let mut report = CrawlReport::default();

        let mut units = JoinSet::new();
        for query in queries.iter().take(self.settings.max_queries.max(1)) {
            for source in &self.sources {
                let source = source.clone();
                let query = query.clone();
                let settings = self.settings.clone();
                let token = token.clone();
                units.spawn(async move {
                    let source_name = source.name().to_string();
                    let outcome = tokio::select! {
                        _ = token.cancelled() => UnitOutcome::Cancelled,
                        outcome = research_unit(source, &query, &settings) => outcome,
                    };
                    (source_name, query, outcome)
                });
            }
        }

        let spawned = units.len();
        debug!(units = spawned, "Research crawl fanned out");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                next = timeout_at(deadline, units.join_next()) => match next {
                    Err(_) => {
                        report.deadline_exceeded = true;
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Ok((source_name, query, outcome)))) => {
                        self.merge(&mut report, source_name, query, outcome);
                    }
                    Ok(Some(Err(e))) => {
                        warn!("Research unit panicked or was aborted: {}", e);
                    }
                }
            }
        }

        report.abandoned = units.len();
        token.cancel();
        units.shutdown().await;

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            units = spawned,
            findings = report.findings.len(),
            timed_out = report.timed_out.len(),
            failed = report.failed.len(),
            abandoned = report.abandoned,
            duration_ms = report.elapsed_ms,
            "Research crawl finished"
        );
        report
    }

    fn merge(&self, report: &mut CrawlReport, source_name: String, query: String, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Found(findings) => {
                debug!(source = %source_name, hits = findings.len(), "Research source answered");
                report.findings.extend(findings);
            }
            UnitOutcome::Failed(error) => {
                debug!(source = %source_name, "Research source failed: {}", error);
                report.failed.push(SourceFailure {
                    source_name,
                    query,
                    error,
                });
            }
            UnitOutcome::TimedOut => {
                let timeout_ms = self.settings.per_source_timeout.as_millis() as u64;
                debug!(source = %source_name, timeout_ms, "Research source timed out");
                report.timed_out.push(SourceTimeout {
                    source_name,
                    query,
                    timeout_ms,
                });
            }
            UnitOutcome::Cancelled => {}
        }
    }
}

/// One (query, source) unit: search, then fetch the top hits concurrently.
///
/// The per-source deadline covers the search only. Once hits are in hand
/// they are kept; a page that misses the fetch deadline yields a finding
/// without content.
async fn research_unit(
    source: Arc<dyn ResearchSource>,
    query: &str,
    settings: &CrawlSettings,
) -> UnitOutcome {
    let hits = match timeout(settings.per_source_timeout, source.search(query, settings.top_k)).await {
        Ok(Ok(hits)) => hits,
        Ok(Err(e)) => return UnitOutcome::Failed(e),
        Err(_) => return UnitOutcome::TimedOut,
    };

    let mut fetches: JoinSet<(usize, SearchHit, Option<String>)> = JoinSet::new();
    for (rank, hit) in hits.into_iter().take(settings.top_k).enumerate() {
        let source = source.clone();
        let fetch_timeout = settings.fetch_timeout;
        fetches.spawn(async move {
            let content = match timeout(fetch_timeout, source.fetch(&hit.url)).await {
                Ok(Ok(body)) => Some(body),
                Ok(Err(e)) => {
                    debug!(url = %hit.url, "Fetch failed: {}", e);
                    None
                }
                Err(_) => {
                    debug!(url = %hit.url, "Fetch timed out");
                    None
                }
            };
            (rank, hit, content)
        });
    }

    let mut fetched = Vec::new();
    while let Some(joined) = fetches.join_next().await {
        if let Ok(entry) = joined {
            fetched.push(entry);
        }
    }
    fetched.sort_by_key(|(rank, _, _)| *rank);

    let source_name = source.name().to_string();
    let source_kind = source.kind().source_kind();
    UnitOutcome::Found(
        fetched
            .into_iter()
            .map(|(_, hit, content)| ResearchFinding {
                source_name: source_name.clone(),
                source_kind,
                query: query.to_string(),
                hit,
                content,
            })
            .collect(),
    )
}
