// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Healing Events
//!
//! Domain events published on the event bus as a healing attempt moves
//! through the pipeline.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Event vocabulary for observers of the healing pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error_report::{ErrorSignature, Severity};
use crate::domain::healing::{HealingId, HealingOutcome};
use crate::domain::pattern::PatternType;
use crate::domain::solution::{PatchOperation, ResearchMethod};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealingEvent {
    ErrorReceived {
        healing_id: HealingId,
        raw_message: String,
        received_at: DateTime<Utc>,
    },
    ErrorClassified {
        healing_id: HealingId,
        signature: ErrorSignature,
        pattern_type: PatternType,
        severity: Severity,
        classified_at: DateTime<Utc>,
    },
    CacheHit {
        healing_id: HealingId,
        signature: ErrorSignature,
        confidence: f64,
        applied: bool,
        hit_at: DateTime<Utc>,
    },
    StrategyCompleted {
        healing_id: HealingId,
        strategy: ResearchMethod,
        confidence: f64,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    ResearchSourceTimedOut {
        healing_id: HealingId,
        source_name: String,
        timeout_ms: u64,
        timed_out_at: DateTime<Utc>,
    },
    SolutionCached {
        healing_id: HealingId,
        signature: ErrorSignature,
        confidence: f64,
        research_method: ResearchMethod,
        cached_at: DateTime<Utc>,
    },
    PatchGenerated {
        healing_id: HealingId,
        target: String,
        operation: PatchOperation,
        generated_at: DateTime<Utc>,
    },
    GenerationFailed {
        healing_id: HealingId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    PatchApplied {
        healing_id: HealingId,
        target: String,
        verified: bool,
        applied_at: DateTime<Utc>,
    },
    PatchRolledBack {
        healing_id: HealingId,
        target: String,
        reason: String,
        rolled_back_at: DateTime<Utc>,
    },
    HealingCompleted {
        healing_id: HealingId,
        outcome: HealingOutcome,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
}

impl HealingEvent {
    pub fn healing_id(&self) -> HealingId {
        match self {
            HealingEvent::ErrorReceived { healing_id, .. }
            | HealingEvent::ErrorClassified { healing_id, .. }
            | HealingEvent::CacheHit { healing_id, .. }
            | HealingEvent::StrategyCompleted { healing_id, .. }
            | HealingEvent::ResearchSourceTimedOut { healing_id, .. }
            | HealingEvent::SolutionCached { healing_id, .. }
            | HealingEvent::PatchGenerated { healing_id, .. }
            | HealingEvent::GenerationFailed { healing_id, .. }
            | HealingEvent::PatchApplied { healing_id, .. }
            | HealingEvent::PatchRolledBack { healing_id, .. }
            | HealingEvent::HealingCompleted { healing_id, .. } => *healing_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            HealingEvent::ErrorReceived { .. } => "error_received",
            HealingEvent::ErrorClassified { .. } => "error_classified",
            HealingEvent::CacheHit { .. } => "cache_hit",
            HealingEvent::StrategyCompleted { .. } => "strategy_completed",
            HealingEvent::ResearchSourceTimedOut { .. } => "research_source_timed_out",
            HealingEvent::SolutionCached { .. } => "solution_cached",
            HealingEvent::PatchGenerated { .. } => "patch_generated",
            HealingEvent::GenerationFailed { .. } => "generation_failed",
            HealingEvent::PatchApplied { .. } => "patch_applied",
            HealingEvent::PatchRolledBack { .. } => "patch_rolled_back",
            HealingEvent::HealingCompleted { .. } => "healing_completed",
        }
    }
}
