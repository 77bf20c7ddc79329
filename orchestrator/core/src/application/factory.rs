// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Healer Factory - Application Layer
//!
//! Creates the concrete knowledge store, target mutator, research sources and
//! the fully wired [`HealingOrchestrator`] from a [`HealerConfigManifest`].
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Map configuration onto infrastructure implementations

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::codebase_analysis::CodebaseAnalyzer;
use crate::application::file_structure::FileStructureAnalyzer;
use crate::application::fix_generator::FixGenerator;
use crate::application::healing_applier::HealingApplier;
use crate::application::knowledge_cache::KnowledgeCache;
use crate::application::orchestrator::HealingOrchestrator;
use crate::application::pattern_catalog::PatternCatalog;
use crate::application::research_crawl::{CrawlSettings, ParallelResearchCrawl};
use crate::application::resolver::StrategyResolver;
use crate::application::stats::HealingStats;
use crate::domain::errors::HealingError;
use crate::domain::healer_config::{ApplierConfig, HealerConfigManifest, KnowledgeBackend, KnowledgeConfig};
use crate::domain::mutator::{MutatorKind, TargetMutator};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::knowledge::{InMemoryKnowledgeStore, SledKnowledgeStore};
use crate::infrastructure::mutators::{RuntimeRegistryMutator, SourceFileMutator};
use crate::infrastructure::research::ResearchSourceRegistry;

fn default_knowledge_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".aegis").join("healer").join("knowledge"))
}

/// Creates the knowledge cache for the configured backend. A store that
/// cannot be opened degrades to a stateless cache instead of failing.
pub fn create_knowledge_cache(config: &KnowledgeConfig) -> KnowledgeCache {
    match config.backend {
        KnowledgeBackend::Memory => KnowledgeCache::new(Arc::new(InMemoryKnowledgeStore::new(config.max_entries))),
        KnowledgeBackend::Sled => {
            let Some(path) = config.resolved_path().or_else(default_knowledge_path) else {
                warn!("No knowledge store path and no home directory; running stateless");
                return KnowledgeCache::stateless();
            };
            match SledKnowledgeStore::open(&path, config.max_entries) {
                Ok(store) => KnowledgeCache::new(Arc::new(store)),
                Err(e) => {
                    let error = HealingError::from(e);
                    warn!(path = %path.display(), error = %error, "Knowledge store unavailable; running stateless");
                    KnowledgeCache::stateless()
                }
            }
        }
    }
}

/// Creates the target mutator the applier patches through.
pub fn create_mutator(config: &ApplierConfig) -> Result<Arc<dyn TargetMutator>> {
    match config.mutator {
        MutatorKind::RuntimeRegistry => Ok(Arc::new(RuntimeRegistryMutator::new())),
        MutatorKind::SourceFile => {
            let root = config
                .root
                .clone()
                .context("applier.root is required for the source-file mutator")?;
            let mut mutator = SourceFileMutator::new(root, config.extension.clone());
            if let Some(command) = config.verify_command.clone() {
                mutator = mutator.with_verify_command(command, config.verify_timeout);
            }
            Ok(Arc::new(mutator))
        }
    }
}

/// Builds the catalog: built-in rows plus the optional YAML rows.
pub fn create_catalog(config: &HealerConfigManifest) -> Result<Arc<PatternCatalog>> {
    let catalog = PatternCatalog::builtin();
    if let Some(path) = &config.spec.catalog.path {
        let loaded = catalog
            .load_yaml_file(path)
            .with_context(|| format!("Failed to load pattern catalog from {}", path.display()))?;
        info!(rows = loaded, path = %path.display(), "Loaded configured catalog patterns");
    }
    Ok(Arc::new(catalog))
}

pub fn build_orchestrator(config: &HealerConfigManifest) -> Result<HealingOrchestrator> {
    let mutator = create_mutator(&config.spec.applier)?;
    build_orchestrator_with_mutator(config, mutator)
}

/// Wires every component from the manifest around a caller-supplied mutator.
pub fn build_orchestrator_with_mutator(
    config: &HealerConfigManifest,
    mutator: Arc<dyn TargetMutator>,
) -> Result<HealingOrchestrator> {
    let spec = &config.spec;
    let catalog = create_catalog(config)?;
    let cache = Arc::new(create_knowledge_cache(&spec.knowledge));
    let event_bus = Arc::new(EventBus::with_default_capacity());
    let stats = Arc::new(HealingStats::new());

    let codebase = Arc::new(CodebaseAnalyzer::new(
        spec.codebase.root.clone(),
        spec.codebase.extensions.clone(),
    ));
    let structure_root = spec.codebase.root.clone().or_else(|| spec.applier.root.clone());
    let mut resolver = StrategyResolver::new(spec.resolver.clone(), cache.clone(), event_bus.clone())
        .with_codebase(codebase)
        .with_file_structure(FileStructureAnalyzer::new(structure_root, spec.codebase.extensions.clone()));

    let registry = ResearchSourceRegistry::from_config(&spec.research)?;
    if registry.is_empty() {
        info!("No research sources configured; the parallel crawl is disabled");
    } else {
        info!(sources = ?registry.source_names(), "Research sources ready");
        resolver = resolver.with_research(ParallelResearchCrawl::new(
            registry.sources(),
            CrawlSettings::from(&spec.research),
        ));
    }

    let generator = FixGenerator::new().context("Failed to register built-in fix templates")?;
    info!(
        mutator = ?mutator.kind(),
        knowledge = cache.backend_name(),
        catalog_rows = catalog.len(),
        "Healer assembled"
    );
    let applier = HealingApplier::new(mutator, stats.clone());

    Ok(
        HealingOrchestrator::new(catalog, resolver, generator, applier, stats, event_bus)
            .with_history_capacity(spec.history.capacity),
    )
}
