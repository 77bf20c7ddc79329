// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Q&A Site Research Adapter
//
// Anti-Corruption Layer for the Stack Exchange API
// (`GET /2.3/search/advanced`). Answered questions rank first.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{build_client, fetch_page, status_error};
use crate::domain::research::{ResearchError, ResearchSource, ResearchSourceKind, SearchHit};

const DEFAULT_SITE: &str = "stackoverflow";

pub struct QaSearchSource {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    site: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct QaSearchResponse {
    #[serde(default)]
    items: Vec<QaItem>,
}

#[derive(Deserialize)]
struct QaItem {
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    is_answered: bool,
}

impl QaSearchSource {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: build_client(),
            name: name.into(),
            endpoint: endpoint.into(),
            site: DEFAULT_SITE.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = site.into();
        self
    }
}

#[async_trait]
impl ResearchSource for QaSearchSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResearchSourceKind {
        ResearchSourceKind::QaSearch
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ResearchError> {
        let url = format!("{}/2.3/search/advanced", self.endpoint.trim_end_matches('/'));
        let pagesize = limit.clamp(1, 100).to_string();
        let mut params = vec![
            ("q", query),
            ("site", self.site.as_str()),
            ("order", "desc"),
            ("sort", "relevance"),
            ("filter", "withbody"),
            ("pagesize", pagesize.as_str()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("key", key.as_str()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ResearchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let parsed: QaSearchResponse = response
            .json()
            .await
            .map_err(|e| ResearchError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let mut items = parsed.items;
        // Stable sort keeps the API's relevance order within each group
        items.sort_by_key(|item| !item.is_answered);

        Ok(items
            .into_iter()
            .take(limit)
            .map(|item| SearchHit {
                url: item.link,
                title: item.title,
                snippet: item.body.unwrap_or_default(),
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
    async fn test_answered_questions_rank_first() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/2.3/search/advanced")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("site".into(), "stackoverflow".into()),
                Matcher::UrlEncoded("filter".into(), "withbody".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"items":[
                    {"link":"https://stackoverflow.com/q/1","title":"open","is_answered":false},
                    {"link":"https://stackoverflow.com/q/2","title":"solved","is_answered":true,"body":"<pre><code>pip install pyyaml</code></pre>"}
                ],"has_more":false}"#,
            )
            .create_async()
            .await;

        let source = QaSearchSource::new("stackoverflow", server.url(), None);
        let hits = source.search("No module named yaml", 3).await.unwrap();
        assert_eq!(hits[0].url, "https://stackoverflow.com/q/2");
        assert!(hits[0].snippet.contains("pip install pyyaml"));
        assert_eq!(hits.len(), 2);
    }
}
