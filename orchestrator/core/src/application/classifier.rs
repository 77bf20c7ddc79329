// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Error Classifier
//!
//! Maps a raw error message to a normalized signature, a pattern type and a
//! severity. Classification is a pure function of the message and the
//! catalog contents: identical inputs always produce identical signatures.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Pattern matching and signature normalization

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::application::pattern_catalog::PatternCatalog;
use crate::domain::error_report::{ErrorSignature, Severity};
use crate::domain::errors::HealingError;
use crate::domain::pattern::PatternType;

static ABSOLUTE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(^|[\s(\[=:,"'])((?:[A-Za-z]:\\|/)[\w.\-]+(?:[\\/][\w.\-]+)*)"#).expect("valid regex")
});
static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"'[^'\n]*'|"[^"\n]*""#).expect("valid regex"));
static HEX_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b0x[0-9a-fA-F]+\b").expect("valid regex"));
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

const HIGH_SEVERITY_MARKERS: [&str; 5] = ["fatal", "panic", "critical", "segmentation fault", "out of memory"];
const LOW_SEVERITY_MARKERS: [&str; 2] = ["warning", "deprecat"];

/// Output of [`ErrorClassifier::classify`].
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub signature: ErrorSignature,
    pub pattern_type: PatternType,
    pub severity: Severity,
    /// Named captures of the matching catalog row plus its static fix parameters
    pub parameters: BTreeMap<String, String>,
    pub fix_template_id: Option<String>,
}

impl Classification {
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

pub struct ErrorClassifier {
    catalog: Arc<PatternCatalog>,
}

impl ErrorClassifier {
    pub fn new(catalog: Arc<PatternCatalog>) -> Self {
        Self { catalog }
    }

    pub fn classify(&self, raw_message: &str) -> Classification {
        let Some(matched) = self.catalog.first_match(raw_message) else {
            let signature = ErrorSignature::new(normalize(raw_message));
            debug!("{}", HealingError::ClassificationMiss(signature.to_string()));
            return Classification {
                signature,
                pattern_type: PatternType::Unknown,
                severity: infer_severity(raw_message),
                parameters: BTreeMap::new(),
                fix_template_id: None,
            };
        };

        // Replace each captured identifier with its group name so messages
        // that differ only in identifiers collapse onto one signature.
        let mut templated = String::with_capacity(raw_message.len());
        let mut cursor = 0;
        for (name, range) in &matched.spans {
            let (start, end) = widen_to_quotes(raw_message, range.start, range.end);
            if start < cursor {
                continue;
            }
            templated.push_str(&raw_message[cursor..start]);
            templated.push('<');
            templated.push_str(name);
            templated.push('>');
            cursor = end;
        }
        templated.push_str(&raw_message[cursor..]);

        let mut parameters = matched.entry.fix_parameters.clone();
        parameters.extend(matched.captures);

        let classification = Classification {
            signature: ErrorSignature::new(normalize(&templated)),
            pattern_type: matched.entry.pattern_type,
            severity: matched.entry.default_severity,
            parameters,
            fix_template_id: Some(matched.entry.fix_template_id),
        };
        debug!(
            signature = %classification.signature,
            pattern_type = %classification.pattern_type,
            "Classified error"
        );
        classification
    }
}

/// Generic normalization: absolute paths, quoted literals, hex addresses and
/// numbers become placeholders; whitespace collapses.
pub fn normalize(message: &str) -> String {
    let text = ABSOLUTE_PATH.replace_all(message, "${1}<path>");
    let text = QUOTED.replace_all(&text, "<str>");
    let text = HEX_ADDRESS.replace_all(&text, "<addr>");
    let text = NUMBER.replace_all(&text, "<n>");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Extends a capture span over a surrounding pair of matching quotes.
fn widen_to_quotes(message: &str, start: usize, end: usize) -> (usize, usize) {
    let bytes = message.as_bytes();
    if start > 0 && end < bytes.len() {
        let before = bytes[start - 1];
        let after = bytes[end];
        if before == after && (before == b'\'' || before == b'"' || before == b'`') {
            return (start - 1, end + 1);
        }
    }
    (start, end)
}

fn infer_severity(message: &str) -> Severity {
    let lowered = message.to_lowercase();
    if HIGH_SEVERITY_MARKERS.iter().any(|m| lowered.contains(m)) {
        Severity::High
    } else if LOW_SEVERITY_MARKERS.iter().any(|m| lowered.contains(m)) {
        Severity::Low
    } else {
        Severity::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ErrorClassifier {
        ErrorClassifier::new(Arc::new(PatternCatalog::builtin()))
    }

    #[test]
    fn test_import_error_signature() {
        let result = classifier()
            .classify("ImportError: cannot import name 'DatabaseConnection' from 'src.data' (/srv/app/src/data/__init__.py)");
        assert_eq!(result.pattern_type, PatternType::GenericImportFix);
        assert_eq!(result.severity, Severity::High);
        assert_eq!(
            result.signature.as_str(),
            "ImportError: cannot import name <name> from <module> (<path>)"
        );
        assert_eq!(result.parameter("name"), Some("DatabaseConnection"));
        assert_eq!(result.fix_template_id.as_deref(), Some("fix_import_path"));
    }

    #[test]
    fn test_identifiers_collapse_onto_one_signature() {
        let c = classifier();
        let a = c.classify("AttributeError: 'CacheManager' object has no attribute 'clear_all'");
        let b = c.classify("AttributeError: 'SessionStore' object has no attribute 'flush'");
        let unquoted = c.classify("AttributeError: CacheManager object has no attribute clear_all");
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.signature, unquoted.signature);
        assert_eq!(a.signature.as_str(), "AttributeError: <object> object has no attribute <attribute>");
        assert_ne!(a.parameters, b.parameters);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let c = classifier();
        let message = "KeyError at 0x7f3a2c while reading row 17 of '/tmp/data.csv'";
        assert_eq!(c.classify(message), c.classify(message));
    }

    #[test]
    fn test_unknown_errors_are_normalized() {
        let result = classifier().classify("FATAL: worker 12 crashed reading \"/var/run/app.sock\" at 0xdeadbeef");
        assert_eq!(result.pattern_type, PatternType::Unknown);
        assert_eq!(result.severity, Severity::High);
        assert_eq!(result.signature.as_str(), "FATAL: worker <n> crashed reading <str> at <addr>");
        assert!(result.fix_template_id.is_none());
    }

    #[test]
    fn test_normalize_paths_and_whitespace() {
        assert_eq!(normalize("  failed at   /a/b/c.py line 3 "), "failed at <path> line <n>");
        assert_eq!(normalize("and/or stays"), "and/or stays");
    }
}
