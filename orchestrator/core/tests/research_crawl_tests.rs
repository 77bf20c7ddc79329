// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use aegis_healer_core::application::research_crawl::{CrawlSettings, ParallelResearchCrawl};
use aegis_healer_core::domain::research::{ResearchError, ResearchSource, ResearchSourceKind, SearchHit};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Increments a shared counter when the owning future is dropped.
struct DropProbe(Arc<AtomicUsize>);

impl Drop for DropProbe {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

enum Behaviour {
    Answer,
    Hang,
    /// Search answers one hit after 3s; its page never loads
    SlowSearchDeadPage,
}

struct ScriptedSource {
    name: String,
    behaviour: Behaviour,
    dropped: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(name: impl Into<String>, behaviour: Behaviour, dropped: &Arc<AtomicUsize>) -> Arc<dyn ResearchSource> {
        Arc::new(Self {
            name: name.into(),
            behaviour,
            dropped: dropped.clone(),
        })
    }
}

#[async_trait]
impl ResearchSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResearchSourceKind {
        ResearchSourceKind::IssueSearch
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ResearchError> {
        match self.behaviour {
            Behaviour::Answer => Ok((0..limit)
                .map(|rank| SearchHit {
                    url: format!("https://{}.example/{}", self.name, rank),
                    title: query.to_string(),
                    snippet: format!("answer {} from {}", rank, self.name),
                })
                .collect()),
            Behaviour::Hang => {
                let _probe = DropProbe(self.dropped.clone());
                std::future::pending().await
            }
            Behaviour::SlowSearchDeadPage => {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok(vec![SearchHit {
                    url: format!("https://{}.example/slow", self.name),
                    title: query.to_string(),
                    snippet: "pip install pyyaml".to_string(),
                }])
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, ResearchError> {
        if let Behaviour::SlowSearchDeadPage = self.behaviour {
            let _probe = DropProbe(self.dropped.clone());
            return std::future::pending().await;
        }
        Ok(format!("<p>body of {}</p>", url))
    }
}

fn settings(per_source: Duration, global: Duration, max_queries: usize) -> CrawlSettings {
    CrawlSettings {
        per_source_timeout: per_source,
        global_timeout: global,
        fetch_timeout: Duration::from_millis(500),
        top_k: 2,
        max_queries,
    }
}

fn queries(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("query variant {}", i)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_hanging_sources_are_bounded_by_the_global_deadline() {
    let dropped = Arc::new(AtomicUsize::new(0));
    let sources = (0..8)
        .map(|i| ScriptedSource::new(format!("hang-{}", i), Behaviour::Hang, &dropped))
        .collect();
    let crawl = ParallelResearchCrawl::new(sources, settings(Duration::from_secs(30), Duration::from_secs(2), 4));

    let started = Instant::now();
    let report = crawl.crawl(&queries(4), &CancellationToken::new()).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_millis(2_100), "crawl took {:?}", elapsed);
    assert!(report.deadline_exceeded);
    assert!(report.findings.is_empty());
    assert_eq!(report.abandoned, 32);
    // Every in-flight search future was dropped, not left running
    assert_eq!(dropped.load(Ordering::SeqCst), 32);
}

#[tokio::test(start_paused = true)]
async fn test_slow_sources_are_excluded_and_fast_ones_merged() {
    let dropped = Arc::new(AtomicUsize::new(0));
    let sources = vec![
        ScriptedSource::new("issues", Behaviour::Answer, &dropped),
        ScriptedSource::new("qa", Behaviour::Answer, &dropped),
        ScriptedSource::new("web", Behaviour::Hang, &dropped),
    ];
    let crawl = ParallelResearchCrawl::new(sources, settings(Duration::from_secs(1), Duration::from_secs(10), 2));

    let started = Instant::now();
    let report = crawl.crawl(&queries(3), &CancellationToken::new()).await;

    // Per-source timeouts fire well before the global deadline
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!report.deadline_exceeded);
    assert_eq!(report.source_diversity(), 2);
    // 2 queries x 2 answering sources x top_k 2
    assert_eq!(report.findings.len(), 8);
    assert!(report.findings.iter().all(|f| f.content.is_some()));
    assert_eq!(report.timed_out.len(), 2);
    assert!(report.timed_out.iter().all(|t| t.source_name == "web"));
}

#[tokio::test(start_paused = true)]
async fn test_search_hits_survive_pages_that_never_load() {
    let dropped = Arc::new(AtomicUsize::new(0));
    let crawl = ParallelResearchCrawl::new(
        vec![ScriptedSource::new("qa", Behaviour::SlowSearchDeadPage, &dropped)],
        CrawlSettings {
            per_source_timeout: Duration::from_secs(5),
            global_timeout: Duration::from_secs(15),
            // Search plus fetch together outlast the per-source deadline
            fetch_timeout: Duration::from_secs(4),
            top_k: 2,
            max_queries: 1,
        },
    );

    let started = Instant::now();
    let report = crawl.crawl(&queries(1), &CancellationToken::new()).await;

    assert!(started.elapsed() >= Duration::from_secs(7));
    assert!(!report.deadline_exceeded);
    assert!(report.timed_out.is_empty());
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].hit.url, "https://qa.example/slow");
    assert!(report.findings[0].content.is_none());
    // The stalled page fetch was dropped once its own deadline passed
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelling_one_crawl_leaves_siblings_running() {
    let dropped = Arc::new(AtomicUsize::new(0));
    let crawl = Arc::new(ParallelResearchCrawl::new(
        vec![
            ScriptedSource::new("issues", Behaviour::Answer, &dropped),
            ScriptedSource::new("web", Behaviour::Hang, &dropped),
        ],
        settings(Duration::from_secs(1), Duration::from_secs(5), 1),
    ));

    let doomed_parent = CancellationToken::new();
    let doomed = {
        let crawl = crawl.clone();
        let parent = doomed_parent.clone();
        tokio::spawn(async move { crawl.crawl(&queries(1), &parent).await })
    };
    let sibling = {
        let crawl = crawl.clone();
        tokio::spawn(async move { crawl.crawl(&queries(1), &CancellationToken::new()).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    doomed_parent.cancel();

    let doomed = doomed.await.unwrap();
    let sibling = sibling.await.unwrap();
    assert!(doomed.cancelled);
    assert!(!sibling.cancelled);
    assert_eq!(sibling.source_diversity(), 1);
    assert_eq!(sibling.timed_out.len(), 1);
}

#[tokio::test]
async fn test_no_sources_finishes_immediately() {
    let crawl = ParallelResearchCrawl::new(Vec::new(), CrawlSettings::default());
    let report = crawl.crawl(&queries(3), &CancellationToken::new()).await;
    assert!(report.findings.is_empty());
    assert!(!report.deadline_exceeded);
    assert_eq!(report.abandoned, 0);
}
