// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Healing
//!
//! The healing attempt lifecycle: identity, state machine, audit trail and
//! the result handed back to callers.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Healing aggregate and result types
//!
//! # State Machine
//!
//! ```text
//! Received → Classified → Resolving → Resolved → Generating → Generated → Applying → Done(success)
//!     ╰──────────────╯────────────╯───────────╯─────────────╯───────────╯──────────╯→ Done(failure)
//! ```
//!
//! Forward transitions advance exactly one stage. Any live stage may finish
//! early, and `Done` is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::error_report::{ErrorSignature, Severity};
use crate::domain::pattern::PatternType;
use crate::domain::solution::Solution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HealingId(pub Uuid);

impl HealingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HealingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HealingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "status", rename_all = "snake_case")]
pub enum HealingState {
    Received,
    Classified,
    Resolving,
    Resolved,
    Generating,
    Generated,
    Applying,
    Done(DoneStatus),
}

impl HealingState {
    fn ordinal(&self) -> u8 {
        match self {
            HealingState::Received => 0,
            HealingState::Classified => 1,
            HealingState::Resolving => 2,
            HealingState::Resolved => 3,
            HealingState::Generating => 4,
            HealingState::Generated => 5,
            HealingState::Applying => 6,
            HealingState::Done(_) => 7,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HealingState::Done(_))
    }

    pub fn can_transition_to(&self, next: HealingState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            HealingState::Done(_) => true,
            _ => next.ordinal() == self.ordinal() + 1,
        }
    }
}

impl fmt::Display for HealingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealingState::Received => f.write_str("received"),
            HealingState::Classified => f.write_str("classified"),
            HealingState::Resolving => f.write_str("resolving"),
            HealingState::Resolved => f.write_str("resolved"),
            HealingState::Generating => f.write_str("generating"),
            HealingState::Generated => f.write_str("generated"),
            HealingState::Applying => f.write_str("applying"),
            HealingState::Done(DoneStatus::Success) => f.write_str("done(success)"),
            HealingState::Done(DoneStatus::Failure) => f.write_str("done(failure)"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("illegal healing transition {from} -> {to}")]
pub struct TransitionError {
    pub from: HealingState,
    pub to: HealingState,
}

/// One entry of a healing attempt's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub state: HealingState,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// A healing attempt moving through the pipeline.
#[derive(Debug, Clone)]
pub struct HealingAttempt {
    pub id: HealingId,
    state: HealingState,
    trail: Vec<StageRecord>,
    started_at: DateTime<Utc>,
}

impl HealingAttempt {
    pub fn start() -> Self {
        let started_at = Utc::now();
        Self {
            id: HealingId::new(),
            state: HealingState::Received,
            trail: vec![StageRecord {
                state: HealingState::Received,
                detail: "error report accepted".to_string(),
                at: started_at,
            }],
            started_at,
        }
    }

    pub fn state(&self) -> HealingState {
        self.state
    }

    pub fn advance(&mut self, next: HealingState, detail: impl Into<String>) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError { from: self.state, to: next });
        }
        self.state = next;
        self.trail.push(StageRecord {
            state: next,
            detail: detail.into(),
            at: Utc::now(),
        });
        Ok(())
    }

    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0) as u64
    }

    pub fn into_trail(self) -> Vec<StageRecord> {
        self.trail
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingOutcome {
    /// A patch was applied and verified.
    Solved,
    /// A solution was found but could not be turned into a verified patch.
    PartiallySolved,
    /// No strategy produced a usable solution.
    Unresolved,
}

impl HealingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealingOutcome::Solved => "solved",
            HealingOutcome::PartiallySolved => "partially_solved",
            HealingOutcome::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for HealingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `submit_error` returns for every report.
#[derive(Debug, Clone, Serialize)]
pub struct HealingResult {
    pub healing_id: HealingId,
    pub signature: ErrorSignature,
    pub pattern_type: PatternType,
    pub severity: Severity,
    pub solution: Solution,
    pub applied: bool,
    pub verified: bool,
    pub from_cache: bool,
    pub outcome: HealingOutcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub trail: Vec<StageRecord>,
    pub completed_at: DateTime<Utc>,
}

impl HealingResult {
    pub fn is_success(&self) -> bool {
        self.outcome == HealingOutcome::Solved
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternCounters {
    pub attempts: u64,
    pub successes: u64,
}

/// Point-in-time view of the healer's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub healings_total: u64,
    pub attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub per_pattern: BTreeMap<PatternType, PatternCounters>,
    pub outcomes: BTreeMap<String, u64>,
    pub cache_hits: u64,
    pub cache_lookups: u64,
    pub cache_hit_ratio: f64,
    pub cache_entries: usize,
    pub cache_stateless: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_transitions() {
        let mut attempt = HealingAttempt::start();
        for next in [
            HealingState::Classified,
            HealingState::Resolving,
            HealingState::Resolved,
            HealingState::Generating,
            HealingState::Generated,
            HealingState::Applying,
            HealingState::Done(DoneStatus::Success),
        ] {
            attempt.advance(next, "ok").unwrap();
        }
        assert_eq!(attempt.into_trail().len(), 8);
    }

    #[test]
    fn test_stage_skipping_is_rejected() {
        let mut attempt = HealingAttempt::start();
        let err = attempt.advance(HealingState::Resolving, "skip").unwrap_err();
        assert_eq!(err.from, HealingState::Received);
        assert_eq!(attempt.state(), HealingState::Received);
    }

    #[test]
    fn test_done_is_terminal_and_reachable_early() {
        let mut attempt = HealingAttempt::start();
        attempt.advance(HealingState::Classified, "ok").unwrap();
        attempt.advance(HealingState::Done(DoneStatus::Failure), "gave up").unwrap();
        assert!(attempt.state().is_terminal());
        assert!(attempt.advance(HealingState::Resolving, "again").is_err());
        assert!(attempt.advance(HealingState::Done(DoneStatus::Success), "again").is_err());
    }
}
