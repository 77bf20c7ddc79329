// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Knowledge
//!
//! Persistent memory of solved signatures. The store trait is synchronous:
//! both shipped backends (an in-process LRU and sled) complete in
//! microseconds and are called from inside striped critical sections.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Knowledge record shape and the storage seam

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::error_report::{ErrorSignature, SignatureHash};
use crate::domain::pattern::PatternType;
use crate::domain::solution::{Patch, ResearchMethod, Solution, SourceRef};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    #[error("knowledge store unavailable: {0}")]
    Unavailable(String),

    #[error("knowledge record could not be (de)serialized: {0}")]
    Serialization(String),
}

/// A cached solution keyed by signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub signature: ErrorSignature,
    pub pattern_type: PatternType,
    pub confidence: f64,
    pub research_method: ResearchMethod,
    #[serde(default)]
    pub evidence: Vec<SourceRef>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub generated_fix: Option<Patch>,
    #[serde(default)]
    pub generated_fix_summary: Option<String>,
    #[serde(default)]
    pub applied: bool,
    #[serde(default)]
    pub verified: bool,
    pub timestamp: DateTime<Utc>,
}

impl KnowledgeRecord {
    pub fn from_solution(signature: &ErrorSignature, solution: &Solution) -> Self {
        Self {
            signature: signature.clone(),
            pattern_type: solution.pattern_type(),
            confidence: solution.confidence(),
            research_method: solution.research_method(),
            evidence: solution.evidence().to_vec(),
            parameters: solution.parameters().clone(),
            generated_fix: solution.generated_fix().cloned(),
            generated_fix_summary: solution.generated_fix().map(Patch::summary),
            applied: false,
            verified: false,
            timestamp: Utc::now(),
        }
    }

    /// Rebuilds the solution this record was cached from.
    pub fn to_solution(&self) -> Solution {
        let mut solution = Solution::new(self.pattern_type, self.confidence, self.research_method)
            .with_parameters(self.parameters.clone());
        for source in &self.evidence {
            solution = solution.with_evidence(source.clone());
        }
        match &self.generated_fix {
            Some(patch) if solution.is_actionable() => match solution.clone().with_fix(patch.clone()) {
                Ok(with_fix) => with_fix,
                Err(_) => solution,
            },
            _ => solution,
        }
    }

    /// Whether this record was resolved for `parameters`: every given
    /// parameter must carry the same value here. Signatures strip
    /// identifiers, so two reports can share a record without sharing a fix.
    pub fn answers(&self, parameters: &BTreeMap<String, String>) -> bool {
        parameters
            .iter()
            .all(|(key, value)| self.parameters.get(key) == Some(value))
    }

    /// True once the cached fix has been applied and verified, so a repeat
    /// of the signature needs no further mutation.
    pub fn is_settled(&self) -> bool {
        self.applied && self.verified && self.generated_fix.is_some()
    }
}

/// Storage backend for knowledge records.
pub trait KnowledgeStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn get(&self, key: &SignatureHash) -> Result<Option<KnowledgeRecord>, CacheError>;

    fn put(&self, key: &SignatureHash, record: &KnowledgeRecord) -> Result<(), CacheError>;

    fn remove(&self, key: &SignatureHash) -> Result<bool, CacheError>;

    fn len(&self) -> Result<usize, CacheError>;

    fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Removes every record last written before `cutoff`; returns how many.
    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::solution::PatchOperation;

    #[test]
    fn test_record_round_trips_solution() {
        let signature = ErrorSignature::new("<object> object has no attribute <attribute>");
        let solution = Solution::new(PatternType::AddMissingAttribute, 0.8, ResearchMethod::CommonSolutions)
            .with_parameter("object", "CacheManager")
            .with_fix(Patch::new("__main__:CacheManager", PatchOperation::AddMethod, "def clear_all(self):\n    return None"))
            .unwrap();

        let record = KnowledgeRecord::from_solution(&signature, &solution);
        assert_eq!(record.generated_fix_summary.as_deref(), Some("add_method on __main__:CacheManager (2 lines)"));
        assert!(!record.is_settled());
        assert_eq!(record.to_solution(), solution);
    }
}
