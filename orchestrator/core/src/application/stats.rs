// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Healing Statistics
//!
//! Process-wide healing counters. Created once by the orchestrator wiring
//! and shared with the applier; read only through [`HealingStats::snapshot`].

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::application::knowledge_cache::KnowledgeCache;
use crate::domain::healing::{HealingOutcome, PatternCounters, StatsSnapshot};
use crate::domain::pattern::PatternType;

#[derive(Default)]
pub struct HealingStats {
    healings: AtomicU64,
    attempts: AtomicU64,
    successes: AtomicU64,
    per_pattern: Mutex<BTreeMap<PatternType, PatternCounters>>,
    outcomes: Mutex<BTreeMap<HealingOutcome, u64>>,
}

impl HealingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// An apply attempt for `pattern_type` started.
    pub fn record_attempt(&self, pattern_type: PatternType) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.per_pattern.lock().entry(pattern_type).or_default().attempts += 1;
    }

    /// An apply attempt for `pattern_type` was applied and verified.
    pub fn record_success(&self, pattern_type: PatternType) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.per_pattern.lock().entry(pattern_type).or_default().successes += 1;
    }

    pub fn record_outcome(&self, outcome: HealingOutcome) {
        self.healings.fetch_add(1, Ordering::Relaxed);
        *self.outcomes.lock().entry(outcome).or_default() += 1;
    }

    pub fn snapshot(&self, cache: &KnowledgeCache) -> StatsSnapshot {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        StatsSnapshot {
            healings_total: self.healings.load(Ordering::Relaxed),
            attempts,
            successes,
            success_rate: if attempts == 0 {
                0.0
            } else {
                successes as f64 / attempts as f64
            },
            per_pattern: self.per_pattern.lock().clone(),
            outcomes: self
                .outcomes
                .lock()
                .iter()
                .map(|(outcome, count)| (outcome.as_str().to_string(), *count))
                .collect(),
            cache_hits: cache.hits(),
            cache_lookups: cache.lookups(),
            cache_hit_ratio: cache.hit_ratio(),
            cache_entries: cache.len(),
            cache_stateless: cache.is_stateless(),
        }
    }
}
