// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for communicating with a running healer server

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use aegis_healer_core::application::pattern_catalog::PromotionCandidate;
use aegis_healer_core::domain::healer_config::HealerConfigManifest;
use aegis_healer_core::domain::healing::StatsSnapshot;
use aegis_healer_core::domain::pattern::PatternEntry;

#[derive(Debug, Clone)]
pub struct HealerClient {
    client: Client,
    base_url: String,
}

impl HealerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        // No global timeout: a healing may run the whole research crawl
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Client for the server address in the configuration. A wildcard bind
    /// address is reached through loopback.
    pub fn from_config(config: &HealerConfigManifest) -> Result<Self> {
        let server = &config.spec.server;
        let host = match server.bind_address.as_str() {
            "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
            other => other,
        };
        Self::new(format!("http://{}:{}", host, server.port))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn is_healthy(&self) -> bool {
        match self.client.get(format!("{}/health", self.base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Submits an error report and returns the serialized healing result.
    pub async fn submit_error(
        &self,
        raw_message: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<serde_json::Value> {
        #[derive(Serialize)]
        struct SubmitRequest<'a> {
            raw_message: &'a str,
            context: &'a BTreeMap<String, String>,
        }

        let response = self
            .client
            .post(format!("{}/v1/errors", self.base_url))
            .json(&SubmitRequest { raw_message, context })
            .send()
            .await
            .context("Failed to submit error")?;

        ensure_success(response, "submit error")
            .await?
            .json()
            .await
            .context("Failed to parse healing result")
    }

    pub async fn stats(&self) -> Result<StatsSnapshot> {
        let response = self
            .client
            .get(format!("{}/v1/stats", self.base_url))
            .send()
            .await
            .context("Failed to get stats")?;

        ensure_success(response, "get stats")
            .await?
            .json()
            .await
            .context("Failed to parse stats response")
    }

    pub async fn catalog(&self) -> Result<Vec<PatternEntry>> {
        let response = self
            .client
            .get(format!("{}/v1/catalog", self.base_url))
            .send()
            .await
            .context("Failed to list catalog")?;

        ensure_success(response, "list catalog")
            .await?
            .json()
            .await
            .context("Failed to parse catalog response")
    }

    pub async fn candidates(&self) -> Result<Vec<PromotionCandidate>> {
        let response = self
            .client
            .get(format!("{}/v1/catalog/candidates", self.base_url))
            .send()
            .await
            .context("Failed to list promotion candidates")?;

        ensure_success(response, "list promotion candidates")
            .await?
            .json()
            .await
            .context("Failed to parse candidates response")
    }

    pub async fn promote(&self, id: Uuid) -> Result<PatternEntry> {
        let response = self
            .client
            .post(format!("{}/v1/catalog/candidates/{}/promote", self.base_url, id))
            .send()
            .await
            .context("Failed to promote candidate")?;

        ensure_success(response, "promote candidate")
            .await?
            .json()
            .await
            .context("Failed to parse promoted pattern")
    }
}

/// Turns a non-2xx response into an error carrying the server's message.
async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    anyhow::bail!("Failed to {} ({}): {}", action, status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_error_posts_message_and_context() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/errors")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "raw_message": "NameError: name 'pd' is not defined",
                "context": {"source_module": "app.report"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"outcome":"solved"}"#)
            .create_async()
            .await;

        let client = HealerClient::new(server.url()).unwrap();
        let context = BTreeMap::from([("source_module".to_string(), "app.report".to_string())]);
        let result = client
            .submit_error("NameError: name 'pd' is not defined", &context)
            .await
            .unwrap();

        assert_eq!(result["outcome"], "solved");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let id = Uuid::new_v4();
        server
            .mock("POST", format!("/v1/catalog/candidates/{}/promote", id).as_str())
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"unknown promotion candidate"}"#)
            .create_async()
            .await;

        let client = HealerClient::new(format!("{}/", server.url())).unwrap();
        let error = client.promote(id).await.unwrap_err().to_string();

        assert!(error.contains("404"), "{}", error);
        assert!(error.contains("unknown promotion candidate"), "{}", error);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unhealthy() {
        let client = HealerClient::new("http://127.0.0.1:9").unwrap();
        assert!(!client.is_healthy().await);
    }

    #[test]
    fn test_wildcard_bind_is_reached_through_loopback() {
        let mut config = HealerConfigManifest::default();
        config.spec.server.bind_address = "0.0.0.0".to_string();
        config.spec.server.port = 9100;

        let client = HealerClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9100");
    }
}
