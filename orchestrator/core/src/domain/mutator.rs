// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Target Mutator
//!
//! The seam the healing applier uses to change a live target: source files
//! on disk or an in-process runtime registry.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Mutation interface with verification and rollback

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::solution::Patch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutatorKind {
    SourceFile,
    RuntimeRegistry,
}

/// Everything needed to undo one applied patch.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub target: String,
    /// Prior contents, or `None` when the patch created the target.
    pub previous: Option<String>,
    pub note: String,
    /// Directories the patch had to create, outermost first.
    pub created_dirs: Vec<PathBuf>,
}

#[async_trait]
pub trait TargetMutator: Send + Sync {
    fn kind(&self) -> MutatorKind;

    async fn apply(&self, patch: &Patch) -> Result<AppliedChange, MutationError>;

    /// Confirms the patched target now resolves (the missing symbol exists,
    /// the module imports, the class instantiates).
    async fn verify(&self, patch: &Patch) -> Result<(), MutationError>;

    async fn rollback(&self, change: AppliedChange) -> Result<(), MutationError>;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MutationError {
    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("operation '{operation}' is not supported for target '{target}'")]
    Unsupported { operation: String, target: String },

    #[error("target conflict: {0}")]
    Conflict(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

impl From<std::io::Error> for MutationError {
    fn from(err: std::io::Error) -> Self {
        MutationError::Io(err.to_string())
    }
}
