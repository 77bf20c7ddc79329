// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Sled Knowledge Store
//
// Persists knowledge records as JSON values in an embedded sled tree keyed
// by signature hash. When the tree grows past `max_entries` the least
// recently written records are dropped.

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::domain::error_report::SignatureHash;
use crate::domain::knowledge::{CacheError, KnowledgeRecord, KnowledgeStore};

const TREE_NAME: &str = "knowledge";

pub struct SledKnowledgeStore {
    db: sled::Db,
    tree: sled::Tree,
    max_entries: usize,
}

impl SledKnowledgeStore {
    pub fn open(path: impl AsRef<Path>, max_entries: usize) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(unavailable)?;
        info!("Opened sled knowledge store at {}", path.display());
        Self::from_db(db, max_entries)
    }

    /// A store backed by a temporary database removed on drop.
    pub fn temporary(max_entries: usize) -> Result<Self, CacheError> {
        let db = sled::Config::new().temporary(true).open().map_err(unavailable)?;
        Self::from_db(db, max_entries)
    }

    fn from_db(db: sled::Db, max_entries: usize) -> Result<Self, CacheError> {
        let tree = db.open_tree(TREE_NAME).map_err(unavailable)?;
        Ok(Self {
            db,
            tree,
            max_entries: max_entries.max(1),
        })
    }

    pub fn flush(&self) -> Result<(), CacheError> {
        self.db.flush().map_err(unavailable)?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<KnowledgeRecord, CacheError> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn scan(&self) -> Result<Vec<(sled::IVec, DateTime<Utc>)>, CacheError> {
        let mut rows = Vec::with_capacity(self.tree.len());
        for item in self.tree.iter() {
            let (key, value) = item.map_err(unavailable)?;
            // Undecodable rows sort first so they are evicted first
            let timestamp = Self::decode(&value)
                .map(|record| record.timestamp)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            rows.push((key, timestamp));
        }
        Ok(rows)
    }

    fn enforce_bound(&self) -> Result<(), CacheError> {
        let len = self.tree.len();
        if len <= self.max_entries {
            return Ok(());
        }
        let mut rows = self.scan()?;
        rows.sort_by_key(|(_, timestamp)| *timestamp);
        let excess = len - self.max_entries;
        for (key, _) in rows.into_iter().take(excess) {
            self.tree.remove(key).map_err(unavailable)?;
        }
        debug!("Evicted {} knowledge records over the {} entry bound", excess, self.max_entries);
        Ok(())
    }
}

impl Drop for SledKnowledgeStore {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            warn!("Failed to flush knowledge store on shutdown: {}", e);
        }
    }
}

fn unavailable(err: sled::Error) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

impl KnowledgeStore for SledKnowledgeStore {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn get(&self, key: &SignatureHash) -> Result<Option<KnowledgeRecord>, CacheError> {
        match self.tree.get(key.as_str()).map_err(unavailable)? {
            Some(bytes) => Self::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn put(&self, key: &SignatureHash, record: &KnowledgeRecord) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(record).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.tree.insert(key.as_str(), bytes).map_err(unavailable)?;
        self.enforce_bound()
    }

    fn remove(&self, key: &SignatureHash) -> Result<bool, CacheError> {
        Ok(self.tree.remove(key.as_str()).map_err(unavailable)?.is_some())
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self.tree.len())
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CacheError> {
        let mut evicted = 0;
        for (key, timestamp) in self.scan()? {
            if timestamp < cutoff {
                self.tree.remove(key).map_err(unavailable)?;
                evicted += 1;
            }
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error_report::ErrorSignature;
    use crate::domain::pattern::PatternType;
    use crate::domain::solution::{Patch, PatchOperation, ResearchMethod, Solution};

    fn record(text: &str, age_days: i64) -> (SignatureHash, KnowledgeRecord) {
        let signature = ErrorSignature::new(text);
        let solution = Solution::new(PatternType::InstallOrFixModule, 0.7, ResearchMethod::CommonSolutions)
            .with_parameter("module", "yaml")
            .with_fix(Patch::new("yaml", PatchOperation::InstallOrFixModule, "# stub"))
            .unwrap();
        let mut record = KnowledgeRecord::from_solution(&signature, &solution);
        record.timestamp = Utc::now() - chrono::Duration::days(age_days);
        (signature.digest(), record)
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (key, record) = record("No module named <module>", 0);
        {
            let store = SledKnowledgeStore::open(dir.path(), 100).unwrap();
            store.put(&key, &record).unwrap();
            store.flush().unwrap();
        }
        let store = SledKnowledgeStore::open(dir.path(), 100).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(record));
    }

    #[test]
    fn test_bound_drops_oldest() {
        let store = SledKnowledgeStore::temporary(2).unwrap();
        let (k_old, r_old) = record("old", 10);
        let (k_mid, r_mid) = record("mid", 5);
        let (k_new, r_new) = record("new", 0);
        store.put(&k_old, &r_old).unwrap();
        store.put(&k_mid, &r_mid).unwrap();
        store.put(&k_new, &r_new).unwrap();

        assert_eq!(store.len().unwrap(), 2);
        assert!(store.get(&k_old).unwrap().is_none());
        assert!(store.get(&k_new).unwrap().is_some());
    }

    #[test]
    fn test_evict_older_than() {
        let store = SledKnowledgeStore::temporary(100).unwrap();
        let (k_old, r_old) = record("old", 40);
        let (k_new, r_new) = record("new", 1);
        store.put(&k_old, &r_old).unwrap();
        store.put(&k_new, &r_new).unwrap();

        assert_eq!(store.evict_older_than(Utc::now() - chrono::Duration::days(30)).unwrap(), 1);
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.remove(&k_new).unwrap());
    }
}
