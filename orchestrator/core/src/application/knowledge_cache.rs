// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Knowledge Cache
//!
//! Signature-keyed memory of solutions in front of a [`KnowledgeStore`].
//!
//! Writes for one signature are serialized through a striped lock and keep
//! the highest-confidence solution, so concurrent resolvers can never lower
//! a cached confidence. Store failures degrade the healer to stateless
//! operation: lookups miss and writes are dropped, with a warning.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Cache policy over the knowledge store seam

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::error_report::ErrorSignature;
use crate::domain::errors::HealingError;
use crate::domain::knowledge::{CacheError, KnowledgeRecord, KnowledgeStore};
use crate::domain::solution::{Patch, Solution};

const LOCK_STRIPES: usize = 64;

pub struct KnowledgeCache {
    store: Option<Arc<dyn KnowledgeStore>>,
    stripes: Vec<Mutex<()>>,
    hits: AtomicU64,
    lookups: AtomicU64,
    degraded: AtomicBool,
}

impl KnowledgeCache {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self::build(Some(store))
    }

    /// A cache with no backing store; every lookup misses.
    pub fn stateless() -> Self {
        Self::build(None)
    }

    fn build(store: Option<Arc<dyn KnowledgeStore>>) -> Self {
        Self {
            store,
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            hits: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.as_ref().map(|s| s.name()).unwrap_or("none")
    }

    pub fn is_stateless(&self) -> bool {
        self.store.is_none() || self.degraded.load(Ordering::Relaxed)
    }

    pub fn lookup(&self, signature: &ErrorSignature) -> Option<KnowledgeRecord> {
        self.lookup_where(signature, |_| true)
    }

    /// Like [`lookup`](Self::lookup), but only a record resolved for the
    /// same `parameters` counts as a hit.
    pub fn lookup_matching(
        &self,
        signature: &ErrorSignature,
        parameters: &BTreeMap<String, String>,
    ) -> Option<KnowledgeRecord> {
        self.lookup_where(signature, |record| record.answers(parameters))
    }

    fn lookup_where(
        &self,
        signature: &ErrorSignature,
        accept: impl FnOnce(&KnowledgeRecord) -> bool,
    ) -> Option<KnowledgeRecord> {
        let store = self.store.as_ref()?;
        self.lookups.fetch_add(1, Ordering::Relaxed);
        match store.get(&signature.digest()) {
            Ok(Some(record)) if accept(&record) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.mark_healthy();
                debug!(signature = %signature, confidence = record.confidence, "Knowledge cache hit");
                Some(record)
            }
            Ok(Some(_)) => {
                self.mark_healthy();
                debug!(signature = %signature, "Cached record belongs to other identifiers");
                None
            }
            Ok(None) => {
                self.mark_healthy();
                None
            }
            Err(e) => {
                self.degrade(e);
                None
            }
        }
    }

    /// Stores `solution` unless a stronger one is already cached, and
    /// returns whichever solution is now authoritative for the signature.
    /// A stronger record resolved for other identifiers stays cached but is
    /// not handed back. Zero-confidence solutions are never written.
    pub fn record_solution(&self, signature: &ErrorSignature, solution: &Solution) -> Solution {
        if !solution.is_actionable() {
            return solution.clone();
        }
        let Some(store) = self.store.as_ref() else {
            return solution.clone();
        };

        let key = signature.digest();
        let _guard = self.stripe(signature).lock();

        let existing = match store.get(&key) {
            Ok(existing) => existing,
            Err(e) => {
                self.degrade(e);
                return solution.clone();
            }
        };

        let mut record = KnowledgeRecord::from_solution(signature, solution);
        if let Some(existing) = existing {
            if existing.confidence > solution.confidence() {
                debug!(
                    signature = %signature,
                    cached = existing.confidence,
                    offered = solution.confidence(),
                    "Keeping stronger cached solution"
                );
                return if existing.answers(solution.parameters()) {
                    existing.to_solution()
                } else {
                    solution.clone()
                };
            }
            if existing.generated_fix.is_some() && existing.generated_fix == record.generated_fix {
                record.applied = existing.applied;
                record.verified = existing.verified;
            }
        }

        if let Err(e) = store.put(&key, &record) {
            self.degrade(e);
        } else {
            self.mark_healthy();
        }
        solution.clone()
    }

    /// Flags the cached fix for `signature` as applied, provided the cached
    /// fix is `patch`.
    pub fn mark_applied(&self, signature: &ErrorSignature, patch: &Patch, verified: bool) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let key = signature.digest();
        let _guard = self.stripe(signature).lock();
        let result = store.get(&key).and_then(|existing| match existing {
            Some(mut record) if record.generated_fix.as_ref() == Some(patch) => {
                record.applied = true;
                record.verified = verified;
                record.timestamp = Utc::now();
                store.put(&key, &record)
            }
            _ => Ok(()),
        });
        if let Err(e) = result {
            self.degrade(e);
        }
    }

    pub fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        match store.evict_older_than(cutoff) {
            Ok(evicted) => evicted,
            Err(e) => {
                self.degrade(e);
                0
            }
        }
    }

    pub fn len(&self) -> usize {
        self.store
            .as_ref()
            .and_then(|store| store.len().map_err(|e| self.degrade(e)).ok())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            0.0
        } else {
            self.hits() as f64 / lookups as f64
        }
    }

    fn stripe(&self, signature: &ErrorSignature) -> &Mutex<()> {
        let digest = signature.digest();
        let index = digest
            .as_str()
            .get(..4)
            .and_then(|prefix| usize::from_str_radix(prefix, 16).ok())
            .unwrap_or(0);
        &self.stripes[index % self.stripes.len()]
    }

    fn degrade(&self, err: CacheError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!("{}; continuing without the knowledge cache", HealingError::from(err));
        } else {
            debug!("Knowledge cache still unavailable: {}", err);
        }
    }

    fn mark_healthy(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            tracing::info!("Knowledge cache recovered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error_report::SignatureHash;
    use crate::domain::pattern::PatternType;
    use crate::domain::solution::{Patch, PatchOperation, ResearchMethod};
    use crate::infrastructure::knowledge::InMemoryKnowledgeStore;

    struct BrokenStore;

    impl KnowledgeStore for BrokenStore {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn get(&self, _key: &SignatureHash) -> Result<Option<KnowledgeRecord>, CacheError> {
            Err(CacheError::Unavailable("disk on fire".into()))
        }
        fn put(&self, _key: &SignatureHash, _record: &KnowledgeRecord) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("disk on fire".into()))
        }
        fn remove(&self, _key: &SignatureHash) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("disk on fire".into()))
        }
        fn len(&self) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("disk on fire".into()))
        }
        fn evict_older_than(&self, _cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("disk on fire".into()))
        }
    }

    fn cache() -> KnowledgeCache {
        KnowledgeCache::new(Arc::new(InMemoryKnowledgeStore::new(100)))
    }

    fn signature() -> ErrorSignature {
        ErrorSignature::new("ImportError: cannot import name <name> from <module>")
    }

    #[test]
    fn test_keeps_highest_confidence() {
        let cache = cache();
        let strong = Solution::new(PatternType::GenericImportFix, 0.75, ResearchMethod::CodebaseAnalysis);
        let weak = Solution::new(PatternType::GenericImportFix, 0.60, ResearchMethod::CommonSolutions);

        cache.record_solution(&signature(), &strong);
        let kept = cache.record_solution(&signature(), &weak);
        assert_eq!(kept.confidence(), 0.75);
        assert_eq!(kept.research_method(), ResearchMethod::CodebaseAnalysis);
        assert_eq!(cache.lookup(&signature()).unwrap().confidence, 0.75);
    }

    #[test]
    fn test_records_for_other_identifiers_are_not_reused() {
        let cache = cache();
        let strong = Solution::new(PatternType::GenericImportFix, 0.75, ResearchMethod::CodebaseAnalysis)
            .with_parameter("name", "DatabaseConnection");
        let other = Solution::new(PatternType::GenericImportFix, 0.60, ResearchMethod::CommonSolutions)
            .with_parameter("name", "ReportWriter");

        cache.record_solution(&signature(), &strong);
        assert_eq!(cache.record_solution(&signature(), &other), other);
        assert_eq!(cache.lookup(&signature()).unwrap().confidence, 0.75);

        let wanted = BTreeMap::from([("name".to_string(), "ReportWriter".to_string())]);
        assert!(cache.lookup_matching(&signature(), &wanted).is_none());
        let wanted = BTreeMap::from([("name".to_string(), "DatabaseConnection".to_string())]);
        assert!(cache.lookup_matching(&signature(), &wanted).is_some());
    }

    #[test]
    fn test_zero_confidence_is_never_cached() {
        let cache = cache();
        let nothing = Solution::unresolved(PatternType::Unknown, ResearchMethod::FileStructureAnalysis);
        cache.record_solution(&signature(), &nothing);
        assert!(cache.lookup(&signature()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_mark_applied_and_hit_ratio() {
        let cache = cache();
        let solution = Solution::new(PatternType::GenericImportFix, 0.6, ResearchMethod::CommonSolutions)
            .with_fix(Patch::new("src.data", PatchOperation::FixImportPath, "from src import X"))
            .unwrap();
        assert!(cache.lookup(&signature()).is_none());
        cache.record_solution(&signature(), &solution);
        cache.mark_applied(&signature(), &Patch::new("src.data", PatchOperation::AddAttribute, "X = None"), true);
        assert!(!cache.lookup(&signature()).unwrap().applied);
        cache.mark_applied(&signature(), solution.generated_fix().unwrap(), true);

        let record = cache.lookup(&signature()).unwrap();
        assert!(record.is_settled());
        assert!((cache.hit_ratio() - 2.0 / 3.0).abs() < 1e-9);

        // Re-recording the same fix keeps the applied flags
        cache.record_solution(&signature(), &solution);
        assert!(cache.lookup(&signature()).unwrap().applied);
    }

    #[test]
    fn test_store_failure_degrades_to_stateless() {
        let cache = KnowledgeCache::new(Arc::new(BrokenStore));
        let solution = Solution::new(PatternType::GenericImportFix, 0.6, ResearchMethod::CommonSolutions);
        assert!(cache.lookup(&signature()).is_none());
        assert!(cache.is_stateless());
        assert_eq!(cache.record_solution(&signature(), &solution), solution);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.evict_older_than(Utc::now()), 0);
    }

    #[test]
    fn test_concurrent_writers_converge_on_max() {
        let cache = Arc::new(cache());
        let handles: Vec<_> = (1..=16)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let solution = Solution::new(
                        PatternType::GenericImportFix,
                        i as f64 / 20.0,
                        ResearchMethod::ParallelCrawling,
                    );
                    cache.record_solution(&signature(), &solution);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.lookup(&signature()).unwrap().confidence, 0.8);
    }
}
