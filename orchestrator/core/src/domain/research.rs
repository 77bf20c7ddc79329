// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Research
//!
//! The seam between the parallel research crawl and external knowledge
//! sources (web search, issue trackers, Q&A sites).
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Anti-Corruption Layer interface for research providers

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::solution::SourceKind;

/// Domain interface for research sources.
/// Adapters translate vendor search APIs into [`SearchHit`]s.
#[async_trait]
pub trait ResearchSource: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ResearchSourceKind;

    /// Ranked hits for `query`, at most `limit` of them.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ResearchError>;

    /// Raw body of a hit's page (HTML or plain text).
    async fn fetch(&self, url: &str) -> Result<String, ResearchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResearchSourceKind {
    WebSearch,
    IssueSearch,
    QaSearch,
}

impl ResearchSourceKind {
    pub fn source_kind(&self) -> SourceKind {
        match self {
            ResearchSourceKind::WebSearch => SourceKind::WebSearch,
            ResearchSourceKind::IssueSearch => SourceKind::IssueTracker,
            ResearchSourceKind::QaSearch => SourceKind::QaSite,
        }
    }
}

impl fmt::Display for ResearchSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResearchSourceKind::WebSearch => f.write_str("web-search"),
            ResearchSourceKind::IssueSearch => f.write_str("issue-search"),
            ResearchSourceKind::QaSearch => f.write_str("qa-search"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

/// A search hit together with whatever page content could be fetched for it
/// within the fetch deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchFinding {
    pub source_name: String,
    pub source_kind: SourceKind,
    pub query: String,
    pub hit: SearchHit,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResearchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("source '{source_name}' timed out after {timeout_ms}ms")]
    Timeout { source_name: String, timeout_ms: u64 },
}
