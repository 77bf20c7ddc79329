// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Healer Configuration Types
//
// Defines the configuration schema for an AEGIS healer, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Resolver confidences and acceptance thresholds
// - Research crawl deadlines and source endpoints
// - Knowledge store backend
// - Applier mutator and verification settings
// - Server and observability settings

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::mutator::MutatorKind;
use crate::domain::pattern::PatternType;
use crate::domain::research::ResearchSourceKind;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "HealerConfig";

/// Top-level Kubernetes-style healer configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealerConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "HealerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: HealerConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Healer configuration body (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealerConfigSpec {
    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    #[serde(default)]
    pub codebase: CodebaseConfig,

    #[serde(default)]
    pub applier: ApplierConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Confidence assigned to the catalog's stock solution, per pattern
    #[serde(default = "default_common_solutions")]
    pub common_solutions: BTreeMap<PatternType, f64>,

    /// Confidence at which the resolver stops escalating, per pattern
    #[serde(default = "default_acceptance_thresholds")]
    pub acceptance_thresholds: BTreeMap<PatternType, f64>,

    #[serde(default = "default_acceptance_threshold")]
    pub default_acceptance_threshold: f64,

    /// Confidence added when the codebase corroborates a solution
    #[serde(default = "default_codebase_boost")]
    pub codebase_boost: f64,
}

impl ResolverConfig {
    pub fn threshold_for(&self, pattern_type: PatternType) -> f64 {
        self.acceptance_thresholds
            .get(&pattern_type)
            .copied()
            .unwrap_or(self.default_acceptance_threshold)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            common_solutions: default_common_solutions(),
            acceptance_thresholds: default_acceptance_thresholds(),
            default_acceptance_threshold: default_acceptance_threshold(),
            codebase_boost: default_codebase_boost(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(with = "humantime_serde", default = "default_per_source_timeout")]
    pub per_source_timeout: Duration,

    #[serde(with = "humantime_serde", default = "default_global_timeout")]
    pub global_timeout: Duration,

    #[serde(with = "humantime_serde", default = "default_fetch_timeout")]
    pub fetch_timeout: Duration,

    /// URLs fetched per search
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Query variants generated per error
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    #[serde(default)]
    pub sources: Vec<ResearchSourceConfig>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_source_timeout: default_per_source_timeout(),
            global_timeout: default_global_timeout(),
            fetch_timeout: default_fetch_timeout(),
            top_k: default_top_k(),
            max_queries: default_max_queries(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSourceConfig {
    pub name: String,

    /// "web-search", "issue-search" or "qa-search"
    #[serde(rename = "type")]
    pub source_type: String,

    pub endpoint: String,

    /// API key; "env:VAR_NAME" reads it from the environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ResearchSourceConfig {
    pub fn kind(&self) -> Option<ResearchSourceKind> {
        match self.source_type.as_str() {
            "web-search" => Some(ResearchSourceKind::WebSearch),
            "issue-search" => Some(ResearchSourceKind::IssueSearch),
            "qa-search" => Some(ResearchSourceKind::QaSearch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default)]
    pub backend: KnowledgeBackend,

    /// Sled directory; a leading "~/" expands to the home directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl KnowledgeConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        let raw = self.path.as_deref()?;
        match raw.strip_prefix("~/") {
            Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
            None => Some(PathBuf::from(raw)),
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            backend: KnowledgeBackend::Memory,
            path: None,
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodebaseConfig {
    /// Root of the source tree to index; analysis is skipped when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for CodebaseConfig {
    fn default() -> Self {
        Self {
            root: None,
            extensions: default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplierConfig {
    #[serde(default = "default_mutator")]
    pub mutator: MutatorKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Extension of files written by the source-file mutator
    #[serde(default = "default_source_extension")]
    pub extension: String,

    /// Command run after a source patch; "{module}" is substituted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_command: Option<Vec<String>>,

    #[serde(with = "humantime_serde", default = "default_verify_timeout")]
    pub verify_timeout: Duration,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            mutator: default_mutator(),
            root: None,
            extension: default_source_extension(),
            verify_command: None,
            verify_timeout: default_verify_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Optional YAML file of extra pattern rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Healing results retained in memory (oldest dropped first)
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_common_solutions() -> BTreeMap<PatternType, f64> {
    BTreeMap::from([
        (PatternType::GenericImportFix, 0.60),
        (PatternType::AddMissingAttribute, 0.80),
        (PatternType::InstallOrFixModule, 0.70),
        (PatternType::CreateMissingClass, 0.65),
        (PatternType::MissingModuleAttribute, 0.75),
    ])
}

fn default_acceptance_thresholds() -> BTreeMap<PatternType, f64> {
    BTreeMap::from([
        (PatternType::GenericImportFix, 0.75),
        (PatternType::AddMissingAttribute, 0.70),
        (PatternType::InstallOrFixModule, 0.65),
        (PatternType::CreateMissingClass, 0.60),
        (PatternType::MissingModuleAttribute, 0.70),
    ])
}

fn default_acceptance_threshold() -> f64 {
    0.70
}

fn default_codebase_boost() -> f64 {
    0.15
}

fn default_per_source_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_global_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_top_k() -> usize {
    3
}

fn default_max_queries() -> usize {
    3
}

fn default_max_entries() -> usize {
    10_000
}

fn default_extensions() -> Vec<String> {
    vec!["py".to_string()]
}

fn default_mutator() -> MutatorKind {
    MutatorKind::RuntimeRegistry
}

fn default_source_extension() -> String {
    "py".to_string()
}

fn default_verify_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_history_capacity() -> usize {
    256
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8787
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for HealerConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "aegis-healer".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: HealerConfigSpec::default(),
        }
    }
}

impl HealerConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AEGIS_HEALER_CONFIG_PATH environment variable
    /// 2. ./aegis-healer.yaml (working directory)
    /// 3. ~/.aegis/healer.yaml (user home)
    /// 4. /etc/aegis/healer.yaml (system, Unix) or C:\ProgramData\Aegis\healer.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AEGIS_HEALER_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aegis-healer.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aegis").join("healer.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/aegis/healer.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Aegis\\healer.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails hard when missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading healer configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading healer configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No healer configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("AEGIS_HEALER_GLOBAL_TIMEOUT_MS") {
            match val.trim().parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: AEGIS_HEALER_GLOBAL_TIMEOUT_MS={}", ms);
                    self.spec.research.global_timeout = Duration::from_millis(ms);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for AEGIS_HEALER_GLOBAL_TIMEOUT_MS: '{}'. Expected milliseconds. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("AEGIS_HEALER_KNOWLEDGE_PATH") {
            tracing::info!("Environment override: AEGIS_HEALER_KNOWLEDGE_PATH={}", val);
            self.spec.knowledge.backend = KnowledgeBackend::Sled;
            self.spec.knowledge.path = Some(val);
        }

        if let Some(val) = lookup("AEGIS_HEALER_RESEARCH_ENABLED") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: AEGIS_HEALER_RESEARCH_ENABLED=true");
                    self.spec.research.enabled = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: AEGIS_HEALER_RESEARCH_ENABLED=false");
                    self.spec.research.enabled = false;
                }
                _ => tracing::warn!(
                    "Invalid value for AEGIS_HEALER_RESEARCH_ENABLED: '{}'. Expected true/false. Ignoring.",
                    val
                ),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.trim().is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let resolver = &self.spec.resolver;
        for (pattern, value) in resolver
            .common_solutions
            .iter()
            .chain(resolver.acceptance_thresholds.iter())
        {
            if !(0.0..=1.0).contains(value) {
                anyhow::bail!("Confidence for '{}' must be within [0, 1], got {}", pattern, value);
            }
        }
        for (label, value) in [
            ("default_acceptance_threshold", resolver.default_acceptance_threshold),
            ("codebase_boost", resolver.codebase_boost),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("resolver.{} must be within [0, 1], got {}", label, value);
            }
        }

        let research = &self.spec.research;
        if research.per_source_timeout > research.global_timeout {
            anyhow::bail!(
                "research.per_source_timeout ({:?}) cannot exceed research.global_timeout ({:?})",
                research.per_source_timeout,
                research.global_timeout
            );
        }
        if research.top_k == 0 || research.max_queries == 0 {
            anyhow::bail!("research.top_k and research.max_queries must be at least 1");
        }

        let mut names = HashSet::new();
        for source in &research.sources {
            if source.name.trim().is_empty() {
                anyhow::bail!("Research source name cannot be empty");
            }
            if !names.insert(source.name.as_str()) {
                anyhow::bail!("Duplicate research source name: {}", source.name);
            }
            if source.kind().is_none() {
                anyhow::bail!(
                    "Unknown research source type '{}' for: {}. Expected web-search, issue-search or qa-search",
                    source.source_type,
                    source.name
                );
            }
            if url::Url::parse(&source.endpoint).is_err() {
                anyhow::bail!("Invalid endpoint '{}' for research source: {}", source.endpoint, source.name);
            }
        }

        if self.spec.knowledge.backend == KnowledgeBackend::Sled && self.spec.knowledge.path.is_none() {
            anyhow::bail!("knowledge.path is required for the sled backend");
        }
        if self.spec.knowledge.max_entries == 0 {
            anyhow::bail!("knowledge.max_entries must be at least 1");
        }

        if self.spec.applier.mutator == MutatorKind::SourceFile && self.spec.applier.root.is_none() {
            anyhow::bail!("applier.root is required for the source-file mutator");
        }

        if self.spec.history.capacity == 0 {
            anyhow::bail!("history.capacity must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = HealerConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(manifest.validate().is_ok());
        assert_eq!(
            manifest.spec.resolver.common_solutions[&PatternType::AddMissingAttribute],
            0.80
        );
        assert_eq!(manifest.spec.resolver.threshold_for(PatternType::Unknown), 0.70);
        assert_eq!(manifest.spec.research.global_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_yaml_parsing_with_humantime_durations() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: HealerConfig
metadata:
  name: test-healer
spec:
  resolver:
    common_solutions:
      generic_import_fix: 0.55
    codebase_boost: 0.2
  research:
    per_source_timeout: 2s
    global_timeout: 6s
    fetch_timeout: 500ms
    sources:
      - name: github
        type: issue-search
        endpoint: https://api.github.com
        api_key: env:GITHUB_TOKEN
  knowledge:
    backend: sled
    path: /tmp/aegis-healer-test
  applier:
    mutator: source-file
    root: ./src
    verify_command: ["python", "-c", "import {module}"]
"#;
        let manifest = HealerConfigManifest::from_yaml_str(yaml).unwrap();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.metadata.name, "test-healer");
        assert_eq!(manifest.spec.research.per_source_timeout, Duration::from_secs(2));
        assert_eq!(manifest.spec.research.fetch_timeout, Duration::from_millis(500));
        assert_eq!(manifest.spec.research.sources[0].kind(), Some(ResearchSourceKind::IssueSearch));
        assert_eq!(manifest.spec.applier.mutator, MutatorKind::SourceFile);
        assert_eq!(manifest.spec.knowledge.backend, KnowledgeBackend::Sled);
        // A partial map replaces the defaults wholesale
        assert_eq!(manifest.spec.resolver.common_solutions.len(), 1);
    }

    #[test]
    fn test_validation() {
        let mut manifest = HealerConfigManifest::default();
        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());

        let mut manifest = HealerConfigManifest::default();
        manifest.spec.resolver.common_solutions.insert(PatternType::Unknown, 1.5);
        assert!(manifest.validate().is_err());

        let mut manifest = HealerConfigManifest::default();
        manifest.spec.research.per_source_timeout = Duration::from_secs(30);
        assert!(manifest.validate().is_err());

        let mut manifest = HealerConfigManifest::default();
        let source = ResearchSourceConfig {
            name: "dup".to_string(),
            source_type: "web-search".to_string(),
            endpoint: "http://localhost:8888".to_string(),
            api_key: None,
            enabled: true,
        };
        manifest.spec.research.sources = vec![source.clone(), source.clone()];
        assert!(manifest.validate().is_err());

        let mut manifest = HealerConfigManifest::default();
        manifest.spec.research.sources = vec![ResearchSourceConfig {
            source_type: "carrier-pigeon".to_string(),
            ..source
        }];
        assert!(manifest.validate().is_err());

        let mut manifest = HealerConfigManifest::default();
        manifest.spec.applier.mutator = MutatorKind::SourceFile;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut manifest = HealerConfigManifest::default();
        manifest.apply_overrides(|key| match key {
            "AEGIS_HEALER_GLOBAL_TIMEOUT_MS" => Some("2500".to_string()),
            "AEGIS_HEALER_KNOWLEDGE_PATH" => Some("/var/lib/aegis/knowledge".to_string()),
            "AEGIS_HEALER_RESEARCH_ENABLED" => Some("off".to_string()),
            _ => None,
        });
        assert_eq!(manifest.spec.research.global_timeout, Duration::from_millis(2500));
        assert_eq!(manifest.spec.knowledge.backend, KnowledgeBackend::Sled);
        assert!(!manifest.spec.research.enabled);

        let mut untouched = HealerConfigManifest::default();
        untouched.apply_overrides(|key| match key {
            "AEGIS_HEALER_GLOBAL_TIMEOUT_MS" => Some("soon".to_string()),
            _ => None,
        });
        assert_eq!(untouched.spec.research.global_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_knowledge_path_expands_home() {
        let config = KnowledgeConfig {
            backend: KnowledgeBackend::Sled,
            path: Some("/abs/path".to_string()),
            max_entries: 10,
        };
        assert_eq!(config.resolved_path(), Some(PathBuf::from("/abs/path")));
    }
}
