// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pattern
//!
//! Error pattern taxonomy and the catalog row type.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pattern types, catalog entries and their provenance

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::error_report::Severity;

/// Known families of runtime errors the healer can fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    GenericImportFix,
    AddMissingAttribute,
    InstallOrFixModule,
    CreateMissingClass,
    MissingModuleAttribute,
    Unknown,
}

impl PatternType {
    pub const KNOWN: [PatternType; 5] = [
        PatternType::GenericImportFix,
        PatternType::AddMissingAttribute,
        PatternType::InstallOrFixModule,
        PatternType::CreateMissingClass,
        PatternType::MissingModuleAttribute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::GenericImportFix => "generic_import_fix",
            PatternType::AddMissingAttribute => "add_missing_attribute",
            PatternType::InstallOrFixModule => "install_or_fix_module",
            PatternType::CreateMissingClass => "create_missing_class",
            PatternType::MissingModuleAttribute => "missing_module_attribute",
            PatternType::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, PatternType::Unknown)
    }

    /// Human phrase used when composing research queries.
    pub fn describe(&self) -> &'static str {
        match self {
            PatternType::GenericImportFix => "cannot import name",
            PatternType::AddMissingAttribute => "object has no attribute",
            PatternType::InstallOrFixModule => "no module named",
            PatternType::CreateMissingClass => "name is not defined",
            PatternType::MissingModuleAttribute => "module has no attribute",
            PatternType::Unknown => "error",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generic_import_fix" => Ok(PatternType::GenericImportFix),
            "add_missing_attribute" => Ok(PatternType::AddMissingAttribute),
            "install_or_fix_module" => Ok(PatternType::InstallOrFixModule),
            "create_missing_class" => Ok(PatternType::CreateMissingClass),
            "missing_module_attribute" => Ok(PatternType::MissingModuleAttribute),
            "unknown" => Ok(PatternType::Unknown),
            other => Err(format!("unknown pattern type '{}'", other)),
        }
    }
}

/// Where a catalog row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternOrigin {
    #[default]
    Builtin,
    Configured,
    Learned,
}

/// One row of the pattern catalog.
///
/// `matcher` is a regular expression applied to the raw error message. Its
/// named capture groups become solution parameters. `fix_parameters` are
/// static parameters merged in when the row matches (learned rows use them
/// to carry the snippet that healed the original error).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEntry {
    pub pattern_type: PatternType,
    #[serde(rename = "match")]
    pub matcher: String,
    pub default_severity: Severity,
    pub fix_template_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fix_parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub origin: PatternOrigin,
}

impl PatternEntry {
    pub fn new(
        pattern_type: PatternType,
        matcher: impl Into<String>,
        default_severity: Severity,
        fix_template_id: impl Into<String>,
    ) -> Self {
        Self {
            pattern_type,
            matcher: matcher.into(),
            default_severity,
            fix_template_id: fix_template_id.into(),
            fix_parameters: BTreeMap::new(),
            origin: PatternOrigin::Builtin,
        }
    }

    pub fn with_origin(mut self, origin: PatternOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_fix_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fix_parameters.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_type_round_trips_through_str() {
        for pattern in PatternType::KNOWN {
            assert_eq!(pattern.as_str().parse::<PatternType>().unwrap(), pattern);
        }
        assert!("nonsense".parse::<PatternType>().is_err());
    }

    #[test]
    fn test_entry_yaml_uses_match_key() {
        let yaml = r#"
pattern_type: create_missing_class
match: "name '(?P<name>\\w+)' is not defined"
default_severity: medium
fix_template_id: create_class
"#;
        let entry: PatternEntry = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(entry.pattern_type, PatternType::CreateMissingClass);
        assert_eq!(entry.origin, PatternOrigin::Builtin);
        assert!(entry.matcher.contains("(?P<name>"));
    }
}
