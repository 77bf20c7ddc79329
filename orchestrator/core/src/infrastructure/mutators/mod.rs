// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Target mutators: the two ways the healing applier can change a live target.
//!
//! Both variants understand the same patch code conventions, parsed by the
//! helpers in this module:
//!
//! - `add_method` code starts with `def <name>(`
//! - `add_attribute` code starts with `<name> =`
//! - `create_class` code contains `class <Name>`
//! - import fixes are one statement per line (`from a.b import C`, `import a`)

pub mod runtime_registry;
pub mod source_file;

pub use runtime_registry::{RuntimeClass, RuntimeModule, RuntimeRegistryMutator};
pub use source_file::SourceFileMutator;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::mutator::MutationError;
use crate::domain::solution::Patch;

static DEF_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").expect("valid regex"));
static ASSIGN_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*([A-Za-z_]\w*)\s*(?::[^=]+)?=").expect("valid regex"));
static CLASS_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*class\s+([A-Za-z_]\w*)").expect("valid regex"));
static FROM_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^from\s+([A-Za-z_.][\w.]*)\s+import\s+(.+)$").expect("valid regex"));

pub const MAIN_MODULE: &str = "__main__";

/// Name introduced by an `add_method` or `add_attribute` patch.
pub(crate) fn member_name(patch: &Patch) -> Result<String, MutationError> {
    DEF_NAME
        .captures(&patch.code)
        .or_else(|| ASSIGN_NAME.captures(&patch.code))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| unsupported(patch))
}

/// Class declared by a `create_class` patch.
pub(crate) fn class_name(patch: &Patch) -> Result<String, MutationError> {
    CLASS_NAME
        .captures(&patch.code)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| unsupported(patch))
}

/// Non-empty, trimmed lines of an import fix.
pub(crate) fn import_lines(code: &str) -> Vec<String> {
    code.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Names bound by a single-line `from x import a, b as c` statement.
pub(crate) fn imported_names(line: &str) -> Vec<String> {
    let Some(caps) = FROM_IMPORT.captures(line.trim()) else {
        return Vec::new();
    };
    caps.get(2)
        .map(|names| {
            names
                .as_str()
                .trim_matches(|c| c == '(' || c == ')')
                .split(',')
                .filter_map(|n| n.split_whitespace().last())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Rejects module paths that are not dotted identifiers. This keeps patch
/// targets from escaping the mutator root (`..`, `/`, absolute paths).
pub(crate) fn validate_module(module: &str) -> Result<(), MutationError> {
    let valid = !module.is_empty()
        && module.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(MutationError::TargetNotFound(format!("invalid module path '{}'", module)))
    }
}

pub(crate) fn unsupported(patch: &Patch) -> MutationError {
    MutationError::Unsupported {
        operation: patch.operation.to_string(),
        target: patch.target.clone(),
    }
}
