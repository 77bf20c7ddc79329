// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-Memory Knowledge Store
//
// LRU-bounded store; knowledge is lost on restart. Used for tests and for
// healers configured with `knowledge.backend: memory`.

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use crate::domain::error_report::SignatureHash;
use crate::domain::knowledge::{CacheError, KnowledgeRecord, KnowledgeStore};

pub struct InMemoryKnowledgeStore {
    entries: Mutex<LruCache<String, KnowledgeRecord>>,
}

impl InMemoryKnowledgeStore {
    /// Creates a store holding at most `max_entries` records (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl KnowledgeStore for InMemoryKnowledgeStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &SignatureHash) -> Result<Option<KnowledgeRecord>, CacheError> {
        Ok(self.entries.lock().get(key.as_str()).cloned())
    }

    fn put(&self, key: &SignatureHash, record: &KnowledgeRecord) -> Result<(), CacheError> {
        self.entries.lock().put(key.as_str().to_string(), record.clone());
        Ok(())
    }

    fn remove(&self, key: &SignatureHash) -> Result<bool, CacheError> {
        Ok(self.entries.lock().pop(key.as_str()).is_some())
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.lock().len())
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, record)| record.timestamp < cutoff)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error_report::ErrorSignature;
    use crate::domain::pattern::PatternType;
    use crate::domain::solution::{ResearchMethod, Solution};

    fn record(text: &str) -> (SignatureHash, KnowledgeRecord) {
        let signature = ErrorSignature::new(text);
        let solution = Solution::new(PatternType::CreateMissingClass, 0.65, ResearchMethod::CommonSolutions);
        (signature.digest(), KnowledgeRecord::from_solution(&signature, &solution))
    }

    #[test]
    fn test_lru_bound() {
        let store = InMemoryKnowledgeStore::new(2);
        let (k1, r1) = record("one");
        let (k2, r2) = record("two");
        let (k3, r3) = record("three");
        store.put(&k1, &r1).unwrap();
        store.put(&k2, &r2).unwrap();
        // Touch k1 so k2 becomes least recently used
        assert!(store.get(&k1).unwrap().is_some());
        store.put(&k3, &r3).unwrap();

        assert_eq!(store.len().unwrap(), 2);
        assert!(store.get(&k2).unwrap().is_none());
        assert!(store.get(&k1).unwrap().is_some());
    }

    #[test]
    fn test_evict_older_than() {
        let store = InMemoryKnowledgeStore::default();
        let (k1, mut r1) = record("old");
        r1.timestamp = Utc::now() - chrono::Duration::days(30);
        let (k2, r2) = record("fresh");
        store.put(&k1, &r1).unwrap();
        store.put(&k2, &r2).unwrap();

        let evicted = store.evict_older_than(Utc::now() - chrono::Duration::days(7)).unwrap();
        assert_eq!(evicted, 1);
        assert!(store.get(&k1).unwrap().is_none());
        assert!(store.remove(&k2).unwrap());
        assert!(store.is_empty().unwrap());
    }
}
