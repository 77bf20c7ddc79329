// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Codebase Structure Analysis
//!
//! Builds a symbol index of the local source tree (which module defines
//! which classes, functions and module-level names) and uses it to
//! disambiguate import and attribute errors.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Resolver strategy 2
//!
//! The index is built lazily on first use and reused until
//! [`CodebaseAnalyzer::refresh`] is called. Building walks the tree with
//! blocking I/O; async callers go through `spawn_blocking`.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::application::classifier::Classification;
use crate::domain::pattern::PatternType;
use crate::domain::solution::{ResearchMethod, Solution, SourceKind, SourceRef};

const SKIPPED_DIRS: [&str; 8] = [
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    "venv",
    ".venv",
    ".tox",
    "dist",
];
const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Confidence the analysis starts from when no common solution exists.
const STANDALONE_BASE: f64 = 0.50;
const CONFIDENCE_CAP: f64 = 0.95;

static PY_CLASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)class\s+([A-Za-z_]\w*)").expect("valid regex"));
static PY_DEF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)(?:async\s+)?def\s+([A-Za-z_]\w*)").expect("valid regex"));
static PY_ASSIGN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)([A-Za-z_]\w*)\s*(?::[^=]+)?=[^=]").expect("valid regex"));
static RS_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|type)\s+([A-Za-z_]\w*)").expect("valid regex")
});
static RS_IMPL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)impl(?:<[^>]*>)?\s+(?:[\w:]+(?:<[^>]*>)?\s+for\s+)?([A-Za-z_]\w*)").expect("valid regex")
});
static RS_FN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?fn\s+([A-Za-z_]\w*)").expect("valid regex")
});

/// Symbols defined by one module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleSymbols {
    pub path: PathBuf,
    /// Class (or type) name → members
    pub classes: BTreeMap<String, BTreeSet<String>>,
    pub functions: BTreeSet<String>,
    pub assignments: BTreeSet<String>,
}

impl ModuleSymbols {
    pub fn defines(&self, name: &str) -> bool {
        self.classes.contains_key(name) || self.functions.contains(name) || self.assignments.contains(name)
    }
}

/// Module path → symbols, plus a reverse index of top-level names.
#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    modules: BTreeMap<String, ModuleSymbols>,
    definitions: BTreeMap<String, BTreeSet<String>>,
}

impl SymbolIndex {
    pub fn build(root: &Path, extensions: &[String]) -> Self {
        let mut index = Self::default();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !is_skipped_dir(entry));

        for entry in walker.filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !extensions.iter().any(|wanted| wanted.trim_start_matches('.') == ext) {
                continue;
            }
            if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
                continue;
            }
            let Some(module) = module_path(root, path) else {
                continue;
            };
            match std::fs::read_to_string(path) {
                Ok(source) => {
                    let symbols = if ext == "rs" {
                        scan_rust(&source)
                    } else {
                        scan_python(&source)
                    };
                    index.insert(module, ModuleSymbols { path: path.to_path_buf(), ..symbols });
                }
                Err(e) => debug!(path = %path.display(), "Skipping unreadable source file: {}", e),
            }
        }

        info!(root = %root.display(), modules = index.modules.len(), "Built codebase symbol index");
        index
    }

    pub fn insert(&mut self, module: String, symbols: ModuleSymbols) {
        let names = symbols
            .classes
            .keys()
            .chain(symbols.functions.iter())
            .chain(symbols.assignments.iter());
        for name in names {
            self.definitions.entry(name.clone()).or_default().insert(module.clone());
        }
        self.modules.insert(module, symbols);
    }

    pub fn module(&self, module: &str) -> Option<&ModuleSymbols> {
        self.modules.get(module)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Modules defining `name` at top level.
    pub fn modules_defining(&self, name: &str) -> Vec<&str> {
        self.definitions
            .get(name)
            .map(|modules| modules.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Modules declaring class `name`.
    pub fn modules_with_class(&self, name: &str) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|(_, symbols)| symbols.classes.contains_key(name))
            .map(|(module, _)| module.as_str())
            .collect()
    }

    /// Modules whose last path segment is `segment`.
    pub fn modules_named(&self, segment: &str) -> Vec<&str> {
        self.modules
            .keys()
            .filter(|module| module.rsplit('.').next() == Some(segment))
            .map(String::as_str)
            .collect()
    }
}

pub(crate) fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

/// `root/src/data/__init__.py` → `src.data`; `root/app/cache.py` → `app.cache`.
pub(crate) fn module_path(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?.with_extension("");
    let mut segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if matches!(segments.last().map(String::as_str), Some("__init__") | Some("mod")) {
        segments.pop();
    }
    if segments.is_empty() || segments.iter().any(|s| s.contains('.') || s.is_empty()) {
        return None;
    }
    Some(segments.join("."))
}

fn scan_python(source: &str) -> ModuleSymbols {
    let mut symbols = ModuleSymbols::default();
    let mut container: Option<(String, usize)> = None;

    for line in source.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        if container.as_ref().is_some_and(|(_, class_indent)| indent <= *class_indent) {
            container = None;
        }

        if let Some(caps) = PY_CLASS.captures(line) {
            let name = caps[2].to_string();
            if indent == 0 {
                symbols.classes.entry(name.clone()).or_default();
                container = Some((name, indent));
            }
            continue;
        }
        let member = PY_DEF
            .captures(line)
            .map(|caps| caps[2].to_string())
            .map(|name| (name, true))
            .or_else(|| PY_ASSIGN.captures(line).map(|caps| (caps[2].to_string(), false)));
        let Some((name, is_def)) = member else {
            continue;
        };
        match &container {
            Some((class, _)) => {
                symbols.classes.entry(class.clone()).or_default().insert(name);
            }
            None if indent == 0 && is_def => {
                symbols.functions.insert(name);
            }
            None if indent == 0 => {
                symbols.assignments.insert(name);
            }
            None => {}
        }
    }
    symbols
}

fn scan_rust(source: &str) -> ModuleSymbols {
    let mut symbols = ModuleSymbols::default();
    let mut container: Option<(String, usize)> = None;

    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        let indent = line.len() - trimmed.len();
        if container.as_ref().is_some_and(|(_, impl_indent)| indent <= *impl_indent) && trimmed != "}" {
            container = None;
        }

        if let Some(caps) = RS_TYPE.captures(line) {
            symbols.classes.entry(caps[2].to_string()).or_default();
        } else if let Some(caps) = RS_IMPL.captures(line) {
            let name = caps[2].to_string();
            symbols.classes.entry(name.clone()).or_default();
            container = Some((name, indent));
        } else if let Some(caps) = RS_FN.captures(line) {
            let name = caps[2].to_string();
            match &container {
                Some((owner, _)) => {
                    symbols.classes.entry(owner.clone()).or_default().insert(name);
                }
                None if indent == 0 => {
                    symbols.functions.insert(name);
                }
                None => {}
            }
        }
    }
    symbols
}

/// Folds case and underscores so `clear_all`, `clearAll` and `ClearAll`
/// compare equal.
fn fold_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

pub struct CodebaseAnalyzer {
    root: Option<PathBuf>,
    extensions: Vec<String>,
    index: RwLock<Option<Arc<SymbolIndex>>>,
}

impl CodebaseAnalyzer {
    pub fn new(root: Option<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root,
            extensions,
            index: RwLock::new(None),
        }
    }

    /// An analyzer with no tree to inspect; every analysis is inconclusive.
    pub fn disabled() -> Self {
        Self::new(None, Vec::new())
    }

    /// An analyzer over a prebuilt index.
    pub fn with_index(index: SymbolIndex) -> Self {
        Self {
            root: None,
            extensions: Vec::new(),
            index: RwLock::new(Some(Arc::new(index))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.root.is_some() || self.index.read().is_some()
    }

    pub fn refresh(&self) {
        if self.root.is_some() {
            *self.index.write() = None;
        }
    }

    fn index(&self) -> Option<Arc<SymbolIndex>> {
        if let Some(index) = self.index.read().as_ref() {
            return Some(index.clone());
        }
        let root = self.root.as_ref()?;
        let built = Arc::new(SymbolIndex::build(root, &self.extensions));
        *self.index.write() = Some(built.clone());
        Some(built)
    }

    /// Looks the classified error up in the symbol index. `base_confidence`
    /// is what the common-solutions strategy offered; a confirming match adds
    /// `boost` (halved when the match is ambiguous). `None` means the
    /// codebase had nothing to say.
    pub fn analyze(&self, classification: &Classification, base_confidence: f64, boost: f64) -> Option<Solution> {
        let index = self.index()?;
        let base = if base_confidence > 0.0 {
            base_confidence
        } else {
            STANDALONE_BASE
        };

        let finding = match classification.pattern_type {
            PatternType::GenericImportFix => self.locate_import(&index, classification),
            PatternType::AddMissingAttribute => self.locate_class_member(&index, classification),
            PatternType::MissingModuleAttribute => self.locate_module_attribute(&index, classification),
            PatternType::InstallOrFixModule => self.locate_module(&index, classification),
            PatternType::CreateMissingClass => self.locate_class(&index, classification),
            PatternType::Unknown => None,
        }?;

        let applied_boost = if finding.ambiguous { boost / 2.0 } else { boost };
        let confidence = (base + applied_boost).min(CONFIDENCE_CAP);
        debug!(
            pattern_type = %classification.pattern_type,
            confidence,
            ambiguous = finding.ambiguous,
            "Codebase analysis located symbols"
        );

        let mut solution = Solution::new(classification.pattern_type, confidence, ResearchMethod::CodebaseAnalysis)
            .with_parameters(classification.parameters.clone())
            .with_parameters(finding.parameters);
        for (location, snippet) in finding.evidence {
            solution = solution.with_evidence(SourceRef::new(SourceKind::Codebase, location).with_snippet(snippet));
        }
        Some(solution)
    }

    fn locate_import(&self, index: &SymbolIndex, classification: &Classification) -> Option<Finding> {
        let name = classification.parameter("name")?;
        let requested = classification.parameter("module").unwrap_or_default();
        let candidates: Vec<&str> = index
            .modules_defining(name)
            .into_iter()
            .filter(|module| *module != requested)
            .collect();
        let best = closest_module(&candidates, requested)?;
        Some(Finding::new(candidates.len() > 1)
            .parameter("resolved_module", best)
            .evidence(index, best, format!("{} defines {}", best, name)))
    }

    fn locate_class_member(&self, index: &SymbolIndex, classification: &Classification) -> Option<Finding> {
        let object = classification.parameter("object")?;
        let attribute = classification.parameter("attribute")?;
        let owners = index.modules_with_class(object);
        let owner = *owners.first()?;

        let mut finding = Finding::new(owners.len() > 1)
            .parameter("target_module", owner)
            .evidence(index, owner, format!("class {} is defined in {}", object, owner));

        let folded = fold_identifier(attribute);
        let similar = index
            .module(owner)
            .and_then(|symbols| symbols.classes.get(object))
            .and_then(|members| {
                members
                    .iter()
                    .find(|member| member.as_str() != attribute && fold_identifier(member) == folded)
            });
        if let Some(similar) = similar {
            finding = finding.parameter("similar_member", similar);
        }
        Some(finding)
    }

    fn locate_module_attribute(&self, index: &SymbolIndex, classification: &Classification) -> Option<Finding> {
        let module = classification.parameter("module")?;
        let attribute = classification.parameter("attribute")?;
        index.module(module)?;

        let mut finding = Finding::new(false)
            .parameter("target_module", module)
            .evidence(index, module, format!("module {} exists", module));
        let elsewhere: Vec<&str> = index
            .modules_defining(attribute)
            .into_iter()
            .filter(|m| *m != module)
            .collect();
        if let Some(other) = closest_module(&elsewhere, module) {
            finding = finding.parameter("resolved_module", other);
        }
        Some(finding)
    }

    fn locate_module(&self, index: &SymbolIndex, classification: &Classification) -> Option<Finding> {
        let module = classification.parameter("module")?;
        let last = module.rsplit('.').next().unwrap_or(module);
        let candidates: Vec<&str> = index
            .modules_named(last)
            .into_iter()
            .filter(|m| *m != module)
            .collect();
        let best = closest_module(&candidates, module)?;
        Some(Finding::new(candidates.len() > 1)
            .parameter("resolved_module", best)
            .evidence(index, best, format!("{} exists locally as {}", module, best)))
    }

    fn locate_class(&self, index: &SymbolIndex, classification: &Classification) -> Option<Finding> {
        let name = classification.parameter("name")?;
        let owners = index.modules_with_class(name);
        let owner = *owners.first()?;
        Some(Finding::new(owners.len() > 1)
            .parameter("resolved_module", owner)
            .evidence(index, owner, format!("class {} is defined in {}", name, owner)))
    }
}

struct Finding {
    ambiguous: bool,
    parameters: BTreeMap<String, String>,
    evidence: Vec<(String, String)>,
}

impl Finding {
    fn new(ambiguous: bool) -> Self {
        Self {
            ambiguous,
            parameters: BTreeMap::new(),
            evidence: Vec::new(),
        }
    }

    fn parameter(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    fn evidence(mut self, index: &SymbolIndex, module: &str, snippet: String) -> Self {
        let location = index
            .module(module)
            .map(|symbols| symbols.path.display().to_string())
            .unwrap_or_else(|| module.to_string());
        self.evidence.push((location, snippet));
        self
    }
}

/// The candidate sharing the longest dotted prefix with `requested`;
/// ties go to the shortest path, then lexical order.
fn closest_module<'a>(candidates: &[&'a str], requested: &str) -> Option<&'a str> {
    let shared = |candidate: &str| {
        candidate
            .split('.')
            .zip(requested.split('.'))
            .take_while(|(a, b)| a == b)
            .count()
    };
    candidates.iter().copied().min_by(|a, b| {
        shared(b)
            .cmp(&shared(a))
            .then(a.split('.').count().cmp(&b.split('.').count()))
            .then(a.cmp(b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error_report::{ErrorSignature, Severity};
    use tempfile::TempDir;

    fn classification(pattern_type: PatternType, params: &[(&str, &str)]) -> Classification {
        Classification {
            signature: ErrorSignature::new("sig"),
            pattern_type,
            severity: Severity::Medium,
            parameters: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            fix_template_id: None,
        }
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/data")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/junk")).unwrap();
        std::fs::write(root.join("src/data/__init__.py"), "").unwrap();
        std::fs::write(
            root.join("src/data/connection.py"),
            "class DatabaseConnection:\n    pool_size = 4\n\n    def clearAll(self):\n        pass\n\ndef connect():\n    pass\n",
        )
        .unwrap();
        std::fs::write(root.join("node_modules/junk/x.py"), "class DatabaseConnection:\n    pass\n").unwrap();
        dir
    }

    #[test]
    fn test_index_scans_python_tree() {
        let dir = project();
        let index = SymbolIndex::build(dir.path(), &["py".to_string()]);
        let module = index.module("src.data.connection").unwrap();
        assert!(module.classes["DatabaseConnection"].contains("pool_size"));
        assert!(module.classes["DatabaseConnection"].contains("clearAll"));
        assert!(module.functions.contains("connect"));
        assert!(index.module("src.data").is_some());
        // node_modules is skipped
        assert_eq!(index.modules_with_class("DatabaseConnection"), vec!["src.data.connection"]);
    }

    #[test]
    fn test_import_resolution_boosts_confidence() {
        let dir = project();
        let analyzer = CodebaseAnalyzer::new(Some(dir.path().to_path_buf()), vec!["py".to_string()]);
        let solution = analyzer
            .analyze(
                &classification(
                    PatternType::GenericImportFix,
                    &[("name", "DatabaseConnection"), ("module", "src.data")],
                ),
                0.60,
                0.15,
            )
            .unwrap();
        assert_eq!(solution.confidence(), 0.75);
        assert_eq!(solution.research_method(), ResearchMethod::CodebaseAnalysis);
        assert_eq!(solution.parameter("resolved_module"), Some("src.data.connection"));
        assert_eq!(solution.evidence()[0].kind, SourceKind::Codebase);
    }

    #[test]
    fn test_similar_member_detected() {
        let dir = project();
        let analyzer = CodebaseAnalyzer::new(Some(dir.path().to_path_buf()), vec!["py".to_string()]);
        let solution = analyzer
            .analyze(
                &classification(
                    PatternType::AddMissingAttribute,
                    &[("object", "DatabaseConnection"), ("attribute", "clear_all")],
                ),
                0.80,
                0.15,
            )
            .unwrap();
        assert_eq!(solution.parameter("similar_member"), Some("clearAll"));
        assert_eq!(solution.parameter("target_module"), Some("src.data.connection"));
        assert_eq!(solution.confidence(), 0.95);
    }

    #[test]
    fn test_unknown_symbols_are_inconclusive() {
        let dir = project();
        let analyzer = CodebaseAnalyzer::new(Some(dir.path().to_path_buf()), vec!["py".to_string()]);
        assert!(analyzer
            .analyze(&classification(PatternType::CreateMissingClass, &[("name", "Nope")]), 0.65, 0.15)
            .is_none());
        assert!(CodebaseAnalyzer::disabled()
            .analyze(&classification(PatternType::GenericImportFix, &[("name", "X")]), 0.6, 0.15)
            .is_none());
    }

    #[test]
    fn test_rust_symbols() {
        let symbols = scan_rust("pub struct Cache {\n}\n\nimpl Cache {\n    pub fn clear(&self) {}\n}\n\nfn helper() {}\n");
        assert!(symbols.classes["Cache"].contains("clear"));
        assert!(symbols.functions.contains("helper"));
    }

    #[test]
    fn test_closest_module_prefers_shared_prefix() {
        let candidates = ["lib.db", "src.data.connection", "src.other.connection"];
        assert_eq!(closest_module(&candidates, "src.data"), Some("src.data.connection"));
    }
}
