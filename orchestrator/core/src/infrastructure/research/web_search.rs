// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Web Search Research Adapter
//
// Anti-Corruption Layer for SearXNG-compatible metasearch endpoints
// (`GET /search?q=...&format=json`).

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{build_client, fetch_page, status_error};
use crate::domain::research::{ResearchError, ResearchSource, ResearchSourceKind, SearchHit};

pub struct WebSearchSource {
    client: reqwest::Client,
    name: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

#[derive(Deserialize)]
struct SearxResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

impl WebSearchSource {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: build_client(),
            name: name.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ResearchSource for WebSearchSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResearchSourceKind {
        ResearchSourceKind::WebSearch
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ResearchError> {
        let url = format!("{}/search", self.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| ResearchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let parsed: SearxResponse = response
            .json()
            .await
            .map_err(|e| ResearchError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        Ok(parsed
            .results
            .into_iter()
            .take(limit)
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                snippet: r.content,
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
    async fn test_search_translates_results() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "cannot import name Foo".into()),
                Matcher::UrlEncoded("format".into(), "json".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"results":[
                    {"url":"https://example.org/a","title":"A","content":"from pkg import Foo"},
                    {"url":"https://example.org/b","title":"B","content":"other"},
                    {"url":"https://example.org/c","title":"C"}
                ]}"#,
            )
            .create_async()
            .await;

        let source = WebSearchSource::new("searx", server.url());
        let hits = source.search("cannot import name Foo", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://example.org/a");
        assert_eq!(hits[0].snippet, "from pkg import Foo");
        assert_eq!(source.kind(), ResearchSourceKind::WebSearch);
    }

    #[tokio::test]
    async fn test_search_rejects_garbage() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let source = WebSearchSource::new("searx", server.url());
        assert!(matches!(
            source.search("q", 3).await,
            Err(ResearchError::InvalidResponse(_))
        ));
    }
}
