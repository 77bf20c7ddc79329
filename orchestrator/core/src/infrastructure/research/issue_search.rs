// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Issue Tracker Research Adapter
//
// Anti-Corruption Layer for the GitHub issue search API
// (`GET /search/issues?q=...`). Works unauthenticated at a low rate limit;
// a token raises it.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{build_client, fetch_page, status_error};
use crate::domain::research::{ResearchError, ResearchSource, ResearchSourceKind, SearchHit};

/// Issue bodies are long; hits keep only the head as their snippet.
const SNIPPET_CHARS: usize = 600;

pub struct IssueSearchSource {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct IssueSearchResponse {
    #[serde(default)]
    items: Vec<IssueItem>,
}

#[derive(Deserialize)]
struct IssueItem {
    html_url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
}

impl IssueSearchSource {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: build_client(),
            name: name.into(),
            endpoint: endpoint.into(),
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

#[async_trait]
impl ResearchSource for IssueSearchSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResearchSourceKind {
        ResearchSourceKind::IssueSearch
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ResearchError> {
        let url = format!("{}/search/issues", self.endpoint.trim_end_matches('/'));
        let per_page = limit.clamp(1, 100).to_string();
        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .query(&[("q", query), ("per_page", per_page.as_str())]);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResearchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let parsed: IssueSearchResponse = response
            .json()
            .await
            .map_err(|e| ResearchError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        Ok(parsed
            .items
            .into_iter()
            .take(limit)
            .map(|item| SearchHit {
                url: item.html_url,
                title: item.title,
                snippet: item
                    .body
                    .unwrap_or_default()
                    .chars()
                    .take(SNIPPET_CHARS)
                    .collect(),
            })
            .collect())
    }

    async fn fetch(&self, url: &str) -> Result<String, ResearchError> {
        fetch_page(&self.client, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_search_sends_token_and_maps_items() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/search/issues")
            .match_header("authorization", "Bearer s3cret")
            .match_query(Matcher::UrlEncoded("q".into(), "No module named yaml".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"total_count":1,"items":[
                    {"html_url":"https://github.com/o/r/issues/1","title":"yaml missing","body":"Run `pip install pyyaml`"}
                ]}"#,
            )
            .create_async()
            .await;

        let source = IssueSearchSource::new("github", server.url(), Some("s3cret".to_string()));
        let hits = source.search("No module named yaml", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://github.com/o/r/issues/1");
        assert!(hits[0].snippet.contains("pip install pyyaml"));
    }

    #[tokio::test]
    async fn test_forbidden_is_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/search/issues")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"message":"API rate limit exceeded"}"#)
            .create_async()
            .await;

        let source = IssueSearchSource::new("github", server.url(), None);
        assert_eq!(source.search("q", 3).await.unwrap_err(), ResearchError::RateLimit);
    }
}
