// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Healing Applier
//!
//! Applies a generated [`Patch`] through the configured [`TargetMutator`],
//! verifies it, and rolls it back when verification fails. Apply and verify
//! form one critical section per target module, so two healings never race
//! on the same module.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::application::stats::HealingStats;
use crate::domain::errors::HealingError;
use crate::domain::mutator::{MutatorKind, TargetMutator};
use crate::domain::pattern::PatternType;
use crate::domain::solution::Patch;

/// Result of one apply attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub applied: bool,
    pub verified: bool,
    pub rolled_back: bool,
    pub error: Option<HealingError>,
}

impl ApplyOutcome {
    fn success() -> Self {
        Self {
            applied: true,
            verified: true,
            rolled_back: false,
            error: None,
        }
    }

    fn failure(error: HealingError, rolled_back: bool) -> Self {
        Self {
            applied: false,
            verified: false,
            rolled_back,
            error: Some(error),
        }
    }
}

pub struct HealingApplier {
    mutator: Arc<dyn TargetMutator>,
    stats: Arc<HealingStats>,
    target_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl HealingApplier {
    pub fn new(mutator: Arc<dyn TargetMutator>, stats: Arc<HealingStats>) -> Self {
        Self {
            mutator,
            stats,
            target_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn mutator_kind(&self) -> MutatorKind {
        self.mutator.kind()
    }

    /// Applies and verifies `patch`, rolling it back on verification failure.
    ///
    /// The critical section runs on its own task: dropping the returned
    /// future abandons the wait, never the section, so a patch is always
    /// left either verified or rolled back.
    pub async fn apply(&self, patch: &Patch, pattern_type: PatternType) -> ApplyOutcome {
        let key = patch.module_and_class().0.to_string();
        let lock = self
            .target_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let mutator = self.mutator.clone();
        let stats = self.stats.clone();
        let locks = self.target_locks.clone();
        let patch = patch.clone();
        let section = tokio::spawn(async move {
            let guard = lock.lock_owned().await;
            let outcome = apply_and_verify(mutator.as_ref(), &stats, &patch, pattern_type).await;
            drop(guard);
            locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
            outcome
        });

        match section.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Apply task did not complete");
                ApplyOutcome::failure(HealingError::ApplyFailure(format!("apply task failed: {}", e)), false)
            }
        }
    }
}

async fn apply_and_verify(
    mutator: &dyn TargetMutator,
    stats: &HealingStats,
    patch: &Patch,
    pattern_type: PatternType,
) -> ApplyOutcome {
    stats.record_attempt(pattern_type);

    let change = match mutator.apply(patch).await {
        Ok(change) => change,
        Err(e) => {
            warn!(target = %patch.target, operation = %patch.operation, error = %e, "Patch could not be applied");
            return ApplyOutcome::failure(e.into(), false);
        }
    };

    let verify_error = match mutator.verify(patch).await {
        Ok(()) => {
            stats.record_success(pattern_type);
            info!(
                target = %patch.target,
                operation = %patch.operation,
                pattern_type = %pattern_type,
                note = %change.note,
                "Patch applied and verified"
            );
            return ApplyOutcome::success();
        }
        Err(e) => e,
    };

    warn!(target = %patch.target, error = %verify_error, "Verification failed; rolling back");
    match mutator.rollback(change).await {
        Ok(()) => ApplyOutcome::failure(verify_error.into(), true),
        Err(rollback_error) => {
            error!(target = %patch.target, error = %rollback_error, "Rollback failed");
            ApplyOutcome::failure(
                HealingError::ApplyFailure(format!("{}; rollback failed: {}", verify_error, rollback_error)),
                false,
            )
        }
    }
}
