// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! File Structure Analysis
//!
//! Last-resort heuristic: checks whether the module and file paths an error
//! refers to exist on disk. A reference that is missing while a file with
//! the same name lives elsewhere under the root suggests a moved module,
//! which an alias can bridge.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::application::classifier::Classification;
use crate::application::codebase_analysis::{is_skipped_dir, module_path};
use crate::domain::error_report::ErrorReport;
use crate::domain::pattern::PatternType;
use crate::domain::solution::{ResearchMethod, Solution, SourceKind, SourceRef};

static DOTTED_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)+\b").expect("valid regex"));
static FILE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[\w.\-]+/)+[\w\-]+\.[A-Za-z]{1,4}\b").expect("valid regex"));

const FILE_STRUCTURE_CONFIDENCE: f64 = 0.40;

pub struct FileStructureAnalyzer {
    root: Option<PathBuf>,
    extensions: Vec<String>,
}

impl FileStructureAnalyzer {
    pub fn new(root: Option<PathBuf>, extensions: Vec<String>) -> Self {
        Self { root, extensions }
    }

    pub fn analyze(&self, report: &ErrorReport, classification: &Classification) -> Option<Solution> {
        let root = self.root.as_deref()?;

        for reference in self.references(report, classification) {
            let stem = self.reference_stem(&reference);
            if stem.is_empty() || self.reference_exists(root, &reference) {
                continue;
            }
            let Some(found) = self.find_by_stem(root, &stem) else {
                continue;
            };
            let Some(resolved) = module_path(root, &found) else {
                continue;
            };
            let missing = self.reference_module(&reference);
            debug!(missing = %missing, resolved = %resolved, "Referenced module missing; same-named file found");

            let pattern_type = if classification.pattern_type.is_known() {
                classification.pattern_type
            } else {
                PatternType::InstallOrFixModule
            };
            return Some(
                Solution::new(pattern_type, FILE_STRUCTURE_CONFIDENCE, ResearchMethod::FileStructureAnalysis)
                    .with_parameters(classification.parameters.clone())
                    .with_parameter("module", missing.clone())
                    .with_parameter("resolved_module", resolved.clone())
                    .with_evidence(
                        SourceRef::new(SourceKind::FileSystem, found.display().to_string())
                            .with_snippet(format!("{} is missing; found {}", missing, resolved)),
                    ),
            );
        }
        None
    }

    /// Module and file references in the message, the report context and the
    /// classification parameters, in order of appearance.
    fn references(&self, report: &ErrorReport, classification: &Classification) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut references = Vec::new();
        // The classified module name counts even without a dot in it
        if let Some(module) = classification.parameter("module") {
            seen.insert(module.to_string());
            references.push(module.to_string());
        }

        let texts = std::iter::once(report.raw_message.as_str()).chain(report.context.values().map(String::as_str));
        for text in texts {
            let files: Vec<&str> = FILE_REF.find_iter(text).map(|m| m.as_str()).collect();
            let dotted = DOTTED_REF
                .find_iter(text)
                .map(|m| m.as_str())
                .filter(|d| !files.iter().any(|f| f.contains(d)));
            let found: Vec<String> = files.iter().copied().chain(dotted).map(str::to_string).collect();
            for reference in found {
                if seen.insert(reference.clone()) {
                    references.push(reference);
                }
            }
        }
        references
    }

    fn is_file_reference(&self, reference: &str) -> bool {
        reference.contains('/')
            || self
                .extensions
                .iter()
                .any(|ext| reference.ends_with(&format!(".{}", ext.trim_start_matches('.'))))
    }

    /// Last path or module segment without an extension.
    fn reference_stem(&self, reference: &str) -> String {
        if self.is_file_reference(reference) {
            return Path::new(reference)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }
        reference.rsplit('.').next().unwrap_or(reference).to_string()
    }

    /// `a/b/c.py` → `a.b.c`; dotted references are returned as-is.
    fn reference_module(&self, reference: &str) -> String {
        if !self.is_file_reference(reference) {
            return reference.to_string();
        }
        let path = Path::new(reference).with_extension("");
        path.components()
            .filter_map(|c| match c {
                std::path::Component::Normal(segment) => segment.to_str(),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn reference_exists(&self, root: &Path, reference: &str) -> bool {
        if self.is_file_reference(reference) {
            let path = Path::new(reference);
            return if path.is_absolute() {
                path.exists()
            } else {
                root.join(path).exists()
            };
        }
        let relative: PathBuf = reference.split('.').collect();
        root.join(&relative).is_dir()
            || self
                .extensions
                .iter()
                .any(|ext| root.join(&relative).with_extension(ext.trim_start_matches('.')).is_file())
    }

    fn find_by_stem(&self, root: &Path, stem: &str) -> Option<PathBuf> {
        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !is_skipped_dir(entry))
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.file_stem().and_then(|s| s.to_str()) == Some(stem)
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| self.extensions.iter().any(|x| x.trim_start_matches('.') == e))
            })
            .min_by_key(|path| path.components().count())
    }
}
