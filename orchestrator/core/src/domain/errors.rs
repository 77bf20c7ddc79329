// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Healing Errors
//!
//! The healer's error taxonomy. Only generation and apply failures reach a
//! caller through `HealingResult.error`; the other kinds degrade the pipeline
//! (a miss, a skipped source, a stateless cache) and are logged instead.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Error kinds shared across pipeline stages

use thiserror::Error;

use crate::domain::knowledge::CacheError;
use crate::domain::mutator::MutationError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum HealingError {
    #[error("no catalog pattern matched signature '{0}'")]
    ClassificationMiss(String),

    #[error("research source '{source_name}' exceeded its {timeout_ms}ms deadline")]
    ResearchTimeout { source_name: String, timeout_ms: u64 },

    #[error("fix generation failed: {0}")]
    GenerationFailure(String),

    #[error("patch application failed: {0}")]
    ApplyFailure(String),

    #[error("knowledge cache unavailable: {0}")]
    CacheUnavailable(String),
}

impl HealingError {
    /// Whether this kind is reported back to the caller.
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            HealingError::GenerationFailure(_) | HealingError::ApplyFailure(_)
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("solution has zero confidence; refusing to generate a fix")]
    InsufficientEvidence,

    #[error("no fix template registered for '{0}'")]
    NoTemplate(String),

    #[error("template '{template}' requires parameter '{parameter}'")]
    MissingParameter { template: String, parameter: String },

    #[error("parameter '{parameter}' has invalid value '{value}'")]
    InvalidParameter { parameter: String, value: String },

    #[error("template rendering failed: {0}")]
    Render(String),
}

impl From<GenerationError> for HealingError {
    fn from(err: GenerationError) -> Self {
        HealingError::GenerationFailure(err.to_string())
    }
}

impl From<MutationError> for HealingError {
    fn from(err: MutationError) -> Self {
        HealingError::ApplyFailure(err.to_string())
    }
}

impl From<CacheError> for HealingError {
    fn from(err: CacheError) -> Self {
        HealingError::CacheUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_generation_and_apply_failures_surface() {
        assert!(HealingError::from(GenerationError::InsufficientEvidence).is_surfaced());
        assert!(HealingError::from(MutationError::TargetNotFound("x".into())).is_surfaced());
        assert!(!HealingError::from(CacheError::Unavailable("down".into())).is_surfaced());
        assert!(!HealingError::ClassificationMiss("sig".into()).is_surfaced());
        assert!(!HealingError::ResearchTimeout { source_name: "web".into(), timeout_ms: 5000 }.is_surfaced());
    }
}
