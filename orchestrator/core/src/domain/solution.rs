// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Solution
//!
//! Candidate solutions produced by the strategy resolver, the evidence that
//! backs them, and the concrete patches rendered from them.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Solution aggregate and patch value objects
//!
//! A solution with zero confidence can never carry a generated fix; the
//! invariant is enforced by keeping the fields private and routing every
//! fix attachment through [`Solution::with_fix`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::errors::GenerationError;
use crate::domain::pattern::PatternType;

/// Which resolver strategy produced a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchMethod {
    CommonSolutions,
    CodebaseAnalysis,
    ParallelCrawling,
    FileStructureAnalysis,
}

impl ResearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchMethod::CommonSolutions => "common_solutions",
            ResearchMethod::CodebaseAnalysis => "codebase_analysis",
            ResearchMethod::ParallelCrawling => "parallel_crawling",
            ResearchMethod::FileStructureAnalysis => "file_structure_analysis",
        }
    }

    /// Strategies that discover knowledge the catalog did not already hold.
    pub fn is_novel(&self) -> bool {
        matches!(
            self,
            ResearchMethod::ParallelCrawling | ResearchMethod::FileStructureAnalysis
        )
    }
}

impl fmt::Display for ResearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    PatternCatalog,
    Codebase,
    WebSearch,
    IssueTracker,
    QaSite,
    FileSystem,
}

/// A piece of evidence supporting a solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl SourceRef {
    pub fn new(kind: SourceKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOperation {
    AddMethod,
    AddAttribute,
    CreateClass,
    FixImportPath,
    InstallOrFixModule,
    GenericImportFix,
}

impl PatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOperation::AddMethod => "add_method",
            PatchOperation::AddAttribute => "add_attribute",
            PatchOperation::CreateClass => "create_class",
            PatchOperation::FixImportPath => "fix_import_path",
            PatchOperation::InstallOrFixModule => "install_or_fix_module",
            PatchOperation::GenericImportFix => "generic_import_fix",
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete code change. `target` is a dotted module path, optionally
/// suffixed with `:ClassName` for member operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub target: String,
    pub operation: PatchOperation,
    pub code: String,
}

impl Patch {
    pub fn new(target: impl Into<String>, operation: PatchOperation, code: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            operation,
            code: code.into(),
        }
    }

    /// Splits the target into its module and optional class.
    pub fn module_and_class(&self) -> (&str, Option<&str>) {
        match self.target.split_once(':') {
            Some((module, class)) => (module, Some(class)),
            None => (self.target.as_str(), None),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} on {} ({} lines)",
            self.operation,
            self.target,
            self.code.lines().count()
        )
    }
}

/// A candidate resolution for a classified error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pattern_type: PatternType,
    confidence: f64,
    research_method: ResearchMethod,
    evidence: Vec<SourceRef>,
    parameters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generated_fix: Option<Patch>,
}

impl Solution {
    /// Creates a solution; confidence is clamped into `[0, 1]` and rounded
    /// to two decimals.
    pub fn new(pattern_type: PatternType, confidence: f64, research_method: ResearchMethod) -> Self {
        Self {
            pattern_type,
            confidence: clamp_confidence(confidence),
            research_method,
            evidence: Vec::new(),
            parameters: BTreeMap::new(),
            generated_fix: None,
        }
    }

    /// The "nothing found" solution.
    pub fn unresolved(pattern_type: PatternType, research_method: ResearchMethod) -> Self {
        Self::new(pattern_type, 0.0, research_method)
    }

    pub fn with_evidence(mut self, source: SourceRef) -> Self {
        self.evidence.push(source);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Attaches a generated patch. Refused when the solution has no
    /// confidence behind it.
    pub fn with_fix(mut self, patch: Patch) -> Result<Self, GenerationError> {
        if !self.is_actionable() {
            return Err(GenerationError::InsufficientEvidence);
        }
        self.generated_fix = Some(patch);
        Ok(self)
    }

    pub fn pattern_type(&self) -> PatternType {
        self.pattern_type
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn research_method(&self) -> ResearchMethod {
        self.research_method
    }

    pub fn evidence(&self) -> &[SourceRef] {
        &self.evidence
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn generated_fix(&self) -> Option<&Patch> {
        self.generated_fix.as_ref()
    }

    pub fn is_actionable(&self) -> bool {
        self.confidence > 0.0
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value.clamp(0.0, 1.0) * 100.0).round() / 100.0
}
