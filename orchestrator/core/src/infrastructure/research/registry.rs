// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Research Source Registry
//
// Builds research source adapters from the healer configuration. A source
// that fails to initialize is skipped with a warning; the crawl runs with
// whatever remains.

use std::sync::Arc;
use tracing::{info, warn};

use super::issue_search::IssueSearchSource;
use super::qa_search::QaSearchSource;
use super::web_search::WebSearchSource;
use crate::domain::healer_config::{ResearchConfig, ResearchSourceConfig};
use crate::domain::research::{ResearchSource, ResearchSourceKind};

#[derive(Default)]
pub struct ResearchSourceRegistry {
    sources: Vec<Arc<dyn ResearchSource>>,
}

impl ResearchSourceRegistry {
    /// Create the registry from the research section of the configuration
    pub fn from_config(config: &ResearchConfig) -> anyhow::Result<Self> {
        let mut sources = Vec::new();

        if !config.enabled {
            info!("Research disabled; no research sources initialized");
            return Ok(Self { sources });
        }

        for source_config in &config.sources {
            if !source_config.enabled {
                info!("Research source '{}' disabled, skipping", source_config.name);
                continue;
            }

            match Self::create_source(source_config) {
                Ok(source) => {
                    info!(
                        "Initialized research source: {} ({})",
                        source_config.name, source_config.source_type
                    );
                    sources.push(source);
                }
                Err(e) => {
                    warn!("Failed to initialize research source '{}': {}", source_config.name, e);
                }
            }
        }

        if sources.is_empty() {
            warn!("No research sources configured - parallel crawling will be skipped");
        }

        Ok(Self { sources })
    }

    /// Registers an already-built source.
    pub fn register(&mut self, source: Arc<dyn ResearchSource>) {
        self.sources.push(source);
    }

    fn create_source(config: &ResearchSourceConfig) -> anyhow::Result<Arc<dyn ResearchSource>> {
        let api_key = Self::resolve_api_key(&config.api_key)?;

        let source: Arc<dyn ResearchSource> = match config.kind() {
            Some(ResearchSourceKind::WebSearch) => {
                Arc::new(WebSearchSource::new(config.name.clone(), config.endpoint.clone()))
            }
            Some(ResearchSourceKind::IssueSearch) => Arc::new(IssueSearchSource::new(
                config.name.clone(),
                config.endpoint.clone(),
                api_key,
            )),
            Some(ResearchSourceKind::QaSearch) => Arc::new(QaSearchSource::new(
                config.name.clone(),
                config.endpoint.clone(),
                api_key,
            )),
            None => anyhow::bail!("Unsupported research source type: {}", config.source_type),
        };

        Ok(source)
    }

    /// Resolve API key from config (supports "env:VAR_NAME" syntax)
    fn resolve_api_key(key: &Option<String>) -> anyhow::Result<Option<String>> {
        match key.as_deref() {
            Some(k) => match k.strip_prefix("env:") {
                Some(var_name) => std::env::var(var_name)
                    .map(Some)
                    .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
                None => Ok(Some(k.to_string())),
            },
            None => Ok(None),
        }
    }

    pub fn sources(&self) -> Vec<Arc<dyn ResearchSource>> {
        self.sources.clone()
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
