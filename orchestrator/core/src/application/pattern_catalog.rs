// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pattern Catalog
//!
//! Ordered, append-only table of error patterns. The first row whose regex
//! matches a raw message wins. Rows come from three places: the built-in
//! set, an optional YAML file loaded at startup, and learned candidates
//! promoted by an operator.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Pattern lookup, YAML loading and candidate promotion

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::error_report::{ErrorSignature, Severity};
use crate::domain::pattern::{PatternEntry, PatternOrigin, PatternType};
use crate::domain::solution::SourceRef;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("invalid pattern regex '{matcher}': {reason}")]
    InvalidPattern { matcher: String, reason: String },

    #[error("pattern rows for 'unknown' cannot be registered")]
    UnknownPatternType,

    #[error("no promotion candidate with id {0}")]
    UnknownCandidate(Uuid),

    #[error("failed to load catalog rows: {0}")]
    Load(String),
}

struct CompiledPattern {
    entry: PatternEntry,
    regex: Regex,
}

/// A successful regex match against the catalog.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub entry: PatternEntry,
    /// Named capture values
    pub captures: BTreeMap<String, String>,
    /// Byte spans of the named captures in the raw message, in order
    pub spans: Vec<(String, Range<usize>)>,
}

/// A novel, successfully healed signature awaiting operator promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionCandidate {
    pub id: Uuid,
    pub entry: PatternEntry,
    pub signature: ErrorSignature,
    pub evidence: Vec<SourceRef>,
    pub occurrences: u32,
    pub proposed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    patterns: Vec<PatternEntry>,
}

pub struct PatternCatalog {
    rows: RwLock<Vec<CompiledPattern>>,
    candidates: RwLock<Vec<PromotionCandidate>>,
}

impl PatternCatalog {
    pub fn empty() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            candidates: RwLock::new(Vec::new()),
        }
    }

    /// The catalog every healer starts from.
    pub fn builtin() -> Self {
        let catalog = Self::empty();
        for entry in builtin_entries() {
            // Built-in regexes are fixed strings covered by tests
            if let Err(e) = catalog.register(entry) {
                tracing::error!("Built-in pattern rejected: {}", e);
            }
        }
        catalog
    }

    pub fn from_entries(entries: Vec<PatternEntry>) -> Result<Self, CatalogError> {
        let catalog = Self::empty();
        for entry in entries {
            catalog.register(entry)?;
        }
        Ok(catalog)
    }

    /// Appends a row. Earlier rows keep precedence.
    pub fn register(&self, entry: PatternEntry) -> Result<(), CatalogError> {
        if entry.pattern_type == PatternType::Unknown {
            return Err(CatalogError::UnknownPatternType);
        }
        let regex = Regex::new(&entry.matcher).map_err(|e| CatalogError::InvalidPattern {
            matcher: entry.matcher.clone(),
            reason: e.to_string(),
        })?;
        debug!(pattern_type = %entry.pattern_type, origin = ?entry.origin, "Registering catalog pattern");
        self.rows.write().push(CompiledPattern { entry, regex });
        Ok(())
    }

    /// Parses a YAML document of the form `patterns: [PatternEntry, ...]`.
    pub fn parse_yaml(yaml: &str) -> Result<Vec<PatternEntry>, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(yaml).map_err(|e| CatalogError::Load(e.to_string()))?;
        Ok(file
            .patterns
            .into_iter()
            .map(|entry| match entry.origin {
                PatternOrigin::Builtin => entry.with_origin(PatternOrigin::Configured),
                _ => entry,
            })
            .collect())
    }

    /// Appends every row of a YAML catalog file; returns how many were added.
    pub fn load_yaml_file(&self, path: impl AsRef<Path>) -> Result<usize, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Load(format!("{}: {}", path.display(), e)))?;
        let entries = Self::parse_yaml(&content)?;
        let count = entries.len();
        for entry in entries {
            self.register(entry)?;
        }
        info!("Loaded {} catalog patterns from {}", count, path.display());
        Ok(count)
    }

    pub fn first_match(&self, raw_message: &str) -> Option<PatternMatch> {
        let rows = self.rows.read();
        rows.iter().find_map(|row| {
            let caps = row.regex.captures(raw_message)?;
            let mut captures = BTreeMap::new();
            let mut spans = Vec::new();
            for name in row.regex.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    captures.insert(name.to_string(), m.as_str().to_string());
                    spans.push((name.to_string(), m.range()));
                }
            }
            spans.sort_by_key(|(_, range)| range.start);
            Some(PatternMatch {
                entry: row.entry.clone(),
                captures,
                spans,
            })
        })
    }

    pub fn entries(&self) -> Vec<PatternEntry> {
        self.rows.read().iter().map(|row| row.entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Records a healed novel signature as a candidate row. Repeat proposals
    /// for the same signature bump the occurrence count.
    pub fn propose_candidate(
        &self,
        signature: &ErrorSignature,
        pattern_type: PatternType,
        fix_template_id: &str,
        fix_parameters: BTreeMap<String, String>,
        evidence: Vec<SourceRef>,
    ) -> Uuid {
        let mut candidates = self.candidates.write();
        if let Some(existing) = candidates.iter_mut().find(|c| &c.signature == signature) {
            existing.occurrences += 1;
            return existing.id;
        }

        let mut entry = PatternEntry::new(
            pattern_type,
            signature_to_regex(signature.as_str()),
            Severity::Medium,
            fix_template_id,
        )
        .with_origin(PatternOrigin::Learned);
        entry.fix_parameters = fix_parameters;

        let candidate = PromotionCandidate {
            id: Uuid::new_v4(),
            entry,
            signature: signature.clone(),
            evidence,
            occurrences: 1,
            proposed_at: Utc::now(),
        };
        info!(
            candidate_id = %candidate.id,
            signature = %signature,
            pattern_type = %pattern_type,
            "Recorded pattern promotion candidate"
        );
        let id = candidate.id;
        candidates.push(candidate);
        id
    }

    pub fn candidates(&self) -> Vec<PromotionCandidate> {
        self.candidates.read().clone()
    }

    /// Moves a candidate into the catalog.
    pub fn promote_candidate(&self, id: Uuid) -> Result<PatternEntry, CatalogError> {
        let candidate = {
            let mut candidates = self.candidates.write();
            let index = candidates
                .iter()
                .position(|c| c.id == id)
                .ok_or(CatalogError::UnknownCandidate(id))?;
            candidates.remove(index)
        };
        let entry = candidate.entry.clone();
        if let Err(e) = self.register(candidate.entry.clone()) {
            self.candidates.write().push(candidate);
            return Err(e);
        }
        info!(candidate_id = %id, pattern_type = %entry.pattern_type, "Promoted learned pattern");
        Ok(entry)
    }
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_entries() -> Vec<PatternEntry> {
    vec![
        PatternEntry::new(
            PatternType::GenericImportFix,
            r#"cannot import name\s+['"]?(?P<name>[A-Za-z_]\w*)['"]?\s+from\s+['"]?(?P<module>[A-Za-z_][\w.]*)['"]?"#,
            Severity::High,
            "fix_import_path",
        ),
        PatternEntry::new(
            PatternType::MissingModuleAttribute,
            r#"module\s+['"]?(?P<module>[A-Za-z_][\w.]*)['"]?\s+has no attribute\s+['"]?(?P<attribute>[A-Za-z_]\w*)['"]?"#,
            Severity::Medium,
            "add_module_attribute",
        ),
        PatternEntry::new(
            PatternType::AddMissingAttribute,
            r#"['"]?(?P<object>[A-Za-z_]\w*)['"]?\s+object has no attribute\s+['"]?(?P<attribute>[A-Za-z_]\w*)['"]?"#,
            Severity::Medium,
            "add_missing_attribute",
        ),
        PatternEntry::new(
            PatternType::InstallOrFixModule,
            r#"No module named\s+['"]?(?P<module>[A-Za-z_][\w.]*)['"]?"#,
            Severity::High,
            "install_or_fix_module",
        ),
        PatternEntry::new(
            PatternType::CreateMissingClass,
            r#"name\s+['"](?P<name>[A-Z]\w*)['"]\s+is not defined"#,
            Severity::Medium,
            "create_class",
        ),
    ]
}

/// Turns a normalized signature back into a matcher for raw messages.
fn signature_to_regex(signature: &str) -> String {
    static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(\w+)>").expect("valid regex"));

    let mut pattern = String::from("^");
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(signature) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        push_literal(&mut pattern, &signature[last..whole.start()]);
        pattern.push_str(match name.as_str() {
            "str" => r#"(?:'[^']*'|"[^"]*")"#,
            "addr" => r"0x[0-9a-fA-F]+",
            "n" => r"\d+(?:\.\d+)?",
            _ => r"\S+",
        });
        last = whole.end();
    }
    push_literal(&mut pattern, &signature[last..]);
    pattern.push('$');
    pattern
}

fn push_literal(pattern: &mut String, literal: &str) {
    let mut in_space = false;
    for ch in literal.chars() {
        if ch.is_whitespace() {
            if !in_space {
                pattern.push_str(r"\s+");
                in_space = true;
            }
        } else {
            in_space = false;
            pattern.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4])));
        }
    }
}
