// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Healing Orchestrator
//!
//! Public entry point of the healer. Drives one error report through
//! classification, resolution, generation and application, and always
//! answers with a well-formed [`HealingResult`].
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Own the healing state machine and the process-wide stats
//! - **Integration:** API / CLI / monitoring daemon → HealingOrchestrator
//!
//! # State machine
//!
//! ```text
//! Received → Classified → Resolving → Resolved → Generating → Generated → Applying → Done(success)
//!                                         │            │                        │
//!                                         └────────────┴────────────────────────┴──→ Done(failure)
//! ```
//!
//! A cached fix that was already applied and verified goes from `Resolved`
//! straight to `Done(success)` without touching the applier. Nothing is
//! retried automatically; callers resubmit.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::classifier::{Classification, ErrorClassifier};
use crate::application::fix_generator::FixGenerator;
use crate::application::healing_applier::HealingApplier;
use crate::application::knowledge_cache::KnowledgeCache;
use crate::application::pattern_catalog::{CatalogError, PatternCatalog, PromotionCandidate};
use crate::application::resolver::{Resolution, StrategyResolver};
use crate::application::stats::HealingStats;
use crate::domain::error_report::ErrorReport;
use crate::domain::errors::HealingError;
use crate::domain::events::HealingEvent;
use crate::domain::healing::{
    DoneStatus, HealingAttempt, HealingOutcome, HealingResult, HealingState, StatsSnapshot, TransitionError,
};
use crate::domain::pattern::PatternEntry;
use crate::domain::solution::{ResearchMethod, Solution};
use crate::infrastructure::event_bus::EventBus;

pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// The call surface collaborators (HTTP API, CLI, monitoring daemons) use.
#[async_trait]
pub trait HealingService: Send + Sync {
    async fn submit_error(&self, report: ErrorReport) -> HealingResult;
    fn get_stats(&self) -> StatsSnapshot;
    /// Most recent results first, at most `limit` of them.
    fn history(&self, limit: usize) -> Vec<HealingResult>;
    fn catalog_entries(&self) -> Vec<PatternEntry>;
    fn promotion_candidates(&self) -> Vec<PromotionCandidate>;
    fn promote_candidate(&self, id: Uuid) -> Result<PatternEntry, CatalogError>;
}

/// What the state machine decided, before timing and trail are attached.
struct Verdict {
    solution: Solution,
    applied: bool,
    verified: bool,
    from_cache: bool,
    outcome: HealingOutcome,
    error: Option<String>,
}

impl Verdict {
    fn new(solution: Solution, from_cache: bool, outcome: HealingOutcome) -> Self {
        let done = outcome == HealingOutcome::Solved;
        Self {
            solution,
            applied: done,
            verified: done,
            from_cache,
            outcome,
            error: None,
        }
    }

    fn failed(solution: Solution, from_cache: bool, error: HealingError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(solution, from_cache, HealingOutcome::PartiallySolved)
        }
    }
}

pub struct HealingOrchestrator {
    catalog: Arc<PatternCatalog>,
    classifier: ErrorClassifier,
    resolver: StrategyResolver,
    generator: FixGenerator,
    applier: HealingApplier,
    stats: Arc<HealingStats>,
    event_bus: Arc<EventBus>,
    history: RwLock<VecDeque<HealingResult>>,
    history_capacity: usize,
}

impl HealingOrchestrator {
    pub fn new(
        catalog: Arc<PatternCatalog>,
        resolver: StrategyResolver,
        generator: FixGenerator,
        applier: HealingApplier,
        stats: Arc<HealingStats>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            classifier: ErrorClassifier::new(catalog.clone()),
            catalog,
            resolver,
            generator,
            applier,
            stats,
            event_bus,
            history: RwLock::new(VecDeque::new()),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    pub fn catalog(&self) -> &Arc<PatternCatalog> {
        &self.catalog
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn cache(&self) -> &Arc<KnowledgeCache> {
        self.resolver.cache()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Cancels in-flight research crawls; healings in progress still finish
    /// with whatever evidence they have.
    pub fn shutdown(&self) {
        info!("Healing orchestrator shutting down");
        self.resolver.shutdown();
    }

    pub async fn submit_error(&self, report: ErrorReport) -> HealingResult {
        let mut attempt = HealingAttempt::start();
        let healing_id = attempt.id;
        self.event_bus.publish(HealingEvent::ErrorReceived {
            healing_id,
            raw_message: report.raw_message.clone(),
            received_at: report.timestamp,
        });

        let classification = self.classifier.classify(&report.raw_message);
        self.event_bus.publish(HealingEvent::ErrorClassified {
            healing_id,
            signature: classification.signature.clone(),
            pattern_type: classification.pattern_type,
            severity: classification.severity,
            classified_at: Utc::now(),
        });

        let verdict = match self.run(&mut attempt, &report, &classification).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(healing_id = %healing_id, error = %e, "Healing state machine violated");
                let solution = Solution::unresolved(classification.pattern_type, ResearchMethod::CommonSolutions);
                Verdict::new(solution, false, HealingOutcome::Unresolved)
            }
        };

        let duration_ms = attempt.elapsed_ms();
        let result = HealingResult {
            healing_id,
            signature: classification.signature.clone(),
            pattern_type: classification.pattern_type,
            severity: classification.severity,
            solution: verdict.solution,
            applied: verdict.applied,
            verified: verdict.verified,
            from_cache: verdict.from_cache,
            outcome: verdict.outcome,
            duration_ms,
            error: verdict.error,
            trail: attempt.into_trail(),
            completed_at: Utc::now(),
        };

        self.stats.record_outcome(result.outcome);
        self.event_bus.publish(HealingEvent::HealingCompleted {
            healing_id,
            outcome: result.outcome,
            duration_ms,
            completed_at: result.completed_at,
        });
        info!(
            healing_id = %healing_id,
            signature = %result.signature,
            pattern_type = %result.pattern_type,
            outcome = %result.outcome,
            confidence = result.solution.confidence(),
            applied = result.applied,
            from_cache = result.from_cache,
            duration_ms,
            "Healing finished"
        );

        self.remember(result.clone());
        result
    }

    async fn run(
        &self,
        attempt: &mut HealingAttempt,
        report: &ErrorReport,
        classification: &Classification,
    ) -> Result<Verdict, TransitionError> {
        let healing_id = attempt.id;
        let signature = &classification.signature;

        attempt.advance(
            HealingState::Classified,
            format!("{} ({} severity)", classification.pattern_type, classification.severity),
        )?;
        attempt.advance(HealingState::Resolving, "running resolution strategies")?;

        let resolution: Resolution = self.resolver.resolve(healing_id, report, classification).await;
        let from_cache = resolution.from_cache;
        let solution = resolution.solution.clone();
        attempt.advance(
            HealingState::Resolved,
            format!(
                "{} at confidence {:.2}{}",
                solution.research_method(),
                solution.confidence(),
                if from_cache { " (cached)" } else { "" }
            ),
        )?;

        if resolution.is_settled() {
            attempt.advance(
                HealingState::Done(DoneStatus::Success),
                "cached fix already applied and verified",
            )?;
            return Ok(Verdict::new(solution, true, HealingOutcome::Solved));
        }

        if !solution.is_actionable() {
            attempt.advance(HealingState::Done(DoneStatus::Failure), "no strategy produced a solution")?;
            return Ok(Verdict::new(solution, from_cache, HealingOutcome::Unresolved));
        }

        let template_id = self.generator.select(&solution).map(|t| t.id.clone()).ok();
        attempt.advance(
            HealingState::Generating,
            template_id.clone().unwrap_or_else(|| "no template".to_string()),
        )?;
        let generated = self
            .generator
            .attach(&solution, &report.context)
            .map_err(HealingError::from)
            .and_then(|healed| match healed.generated_fix().cloned() {
                Some(patch) => Ok((healed, patch)),
                None => Err(HealingError::GenerationFailure("no patch attached".to_string())),
            });
        let (solution, patch) = match generated {
            Ok(generated) => generated,
            Err(e) => {
                warn!(healing_id = %healing_id, signature = %signature, error = %e, "Fix generation failed closed");
                self.event_bus.publish(HealingEvent::GenerationFailed {
                    healing_id,
                    reason: e.to_string(),
                    failed_at: Utc::now(),
                });
                attempt.advance(HealingState::Done(DoneStatus::Failure), e.to_string())?;
                return Ok(Verdict::failed(solution, from_cache, e));
            }
        };

        self.event_bus.publish(HealingEvent::PatchGenerated {
            healing_id,
            target: patch.target.clone(),
            operation: patch.operation,
            generated_at: Utc::now(),
        });
        attempt.advance(HealingState::Generated, patch.summary())?;
        self.cache().record_solution(signature, &solution);

        attempt.advance(HealingState::Applying, patch.target.clone())?;
        let applied = self.applier.apply(&patch, solution.pattern_type()).await;

        if applied.verified {
            self.cache().mark_applied(signature, &patch, true);
            self.event_bus.publish(HealingEvent::PatchApplied {
                healing_id,
                target: patch.target.clone(),
                verified: true,
                applied_at: Utc::now(),
            });
            if solution.research_method().is_novel() && solution.pattern_type().is_known() {
                self.catalog.propose_candidate(
                    signature,
                    solution.pattern_type(),
                    template_id.as_deref().unwrap_or(solution.pattern_type().as_str()),
                    solution.parameters().clone(),
                    solution.evidence().to_vec(),
                );
            }
            attempt.advance(HealingState::Done(DoneStatus::Success), "patch applied and verified")?;
            return Ok(Verdict::new(solution, from_cache, HealingOutcome::Solved));
        }

        let error = applied
            .error
            .unwrap_or_else(|| HealingError::ApplyFailure("patch was not applied".to_string()));
        if applied.rolled_back {
            self.event_bus.publish(HealingEvent::PatchRolledBack {
                healing_id,
                target: patch.target.clone(),
                reason: error.to_string(),
                rolled_back_at: Utc::now(),
            });
        }
        attempt.advance(HealingState::Done(DoneStatus::Failure), error.to_string())?;
        Ok(Verdict::failed(solution, from_cache, error))
    }

    fn remember(&self, result: HealingResult) {
        let mut history = self.history.write();
        if history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(result);
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.cache())
    }

    pub fn history(&self, limit: usize) -> Vec<HealingResult> {
        self.history.read().iter().rev().take(limit).cloned().collect()
    }
}

#[async_trait]
impl HealingService for HealingOrchestrator {
    async fn submit_error(&self, report: ErrorReport) -> HealingResult {
        HealingOrchestrator::submit_error(self, report).await
    }

    fn get_stats(&self) -> StatsSnapshot {
        HealingOrchestrator::get_stats(self)
    }

    fn history(&self, limit: usize) -> Vec<HealingResult> {
        HealingOrchestrator::history(self, limit)
    }

    fn catalog_entries(&self) -> Vec<PatternEntry> {
        self.catalog.entries()
    }

    fn promotion_candidates(&self) -> Vec<PromotionCandidate> {
        self.catalog.candidates()
    }

    fn promote_candidate(&self, id: Uuid) -> Result<PatternEntry, CatalogError> {
        self.catalog.promote_candidate(id)
    }
}
