// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use aegis_healer_core::application::knowledge_cache::KnowledgeCache;
use aegis_healer_core::domain::error_report::ErrorSignature;
use aegis_healer_core::domain::knowledge::KnowledgeStore;
use aegis_healer_core::domain::pattern::PatternType;
use aegis_healer_core::domain::solution::{Patch, PatchOperation, ResearchMethod, Solution};
use aegis_healer_core::infrastructure::knowledge::{InMemoryKnowledgeStore, SledKnowledgeStore};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::TempDir;

fn stub_solution(module: &str, confidence: f64) -> Solution {
    Solution::new(PatternType::InstallOrFixModule, confidence, ResearchMethod::CommonSolutions)
        .with_parameter("module", module)
        .with_fix(Patch::new(module, PatchOperation::InstallOrFixModule, "\"\"\"stub\"\"\""))
        .unwrap()
}

#[test]
fn test_sled_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("knowledge");
    let signature = ErrorSignature::new("modulenotfounderror: no module named <module>");
    let solution = stub_solution("advanced_analytics", 0.7);

    {
        let store = Arc::new(SledKnowledgeStore::open(&path, 100).unwrap());
        let cache = KnowledgeCache::new(store.clone());
        cache.record_solution(&signature, &solution);
        cache.mark_applied(&signature, solution.generated_fix().unwrap(), true);
        store.flush().unwrap();
    }

    let cache = KnowledgeCache::new(Arc::new(SledKnowledgeStore::open(&path, 100).unwrap()));
    let record = cache.lookup(&signature).unwrap();
    assert!(record.is_settled());
    assert_eq!(record.confidence, 0.7);
    assert_eq!(record.research_method, ResearchMethod::CommonSolutions);
    assert_eq!(
        record.generated_fix_summary.as_deref(),
        solution.generated_fix().map(Patch::summary).as_deref()
    );
}

#[test]
fn test_concurrent_writers_keep_the_strongest_solution() {
    let store: Arc<dyn KnowledgeStore> = Arc::new(SledKnowledgeStore::temporary(1_000).unwrap());
    let cache = Arc::new(KnowledgeCache::new(store));
    let signatures: Vec<ErrorSignature> = (0..4)
        .map(|i| ErrorSignature::new(format!("failure family {}", i)))
        .collect();

    let handles: Vec<_> = (1..=32)
        .map(|i| {
            let cache = cache.clone();
            let signatures = signatures.clone();
            std::thread::spawn(move || {
                for signature in &signatures {
                    // Confidences 0.03..0.96, each signature sees all of them
                    let kept = cache.record_solution(signature, &stub_solution("x", i as f64 * 0.03));
                    assert!(kept.confidence() >= i as f64 * 0.03 - 1e-9);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.len(), 4);
    for signature in &signatures {
        assert_eq!(cache.lookup(signature).unwrap().confidence, 0.96);
    }
}

#[test]
fn test_memory_store_evicts_least_recently_used() {
    let cache = KnowledgeCache::new(Arc::new(InMemoryKnowledgeStore::new(2)));
    let first = ErrorSignature::new("first <name>");
    let second = ErrorSignature::new("second <name>");
    let third = ErrorSignature::new("third <name>");

    cache.record_solution(&first, &stub_solution("a", 0.7));
    cache.record_solution(&second, &stub_solution("b", 0.7));
    assert!(cache.lookup(&first).is_some());
    cache.record_solution(&third, &stub_solution("c", 0.7));

    assert_eq!(cache.len(), 2);
    assert!(cache.lookup(&first).is_some());
    assert!(cache.lookup(&second).is_none());
    assert!(cache.lookup(&third).is_some());
}

#[test]
fn test_prune_by_age() {
    let cache = KnowledgeCache::new(Arc::new(SledKnowledgeStore::temporary(100).unwrap()));
    let signature = ErrorSignature::new("stale <name>");
    cache.record_solution(&signature, &stub_solution("stale", 0.7));

    assert_eq!(cache.evict_older_than(Utc::now() - Duration::days(1)), 0);
    assert_eq!(cache.evict_older_than(Utc::now() + Duration::seconds(1)), 1);
    assert!(cache.is_empty());
}
