// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fix Generator
//!
//! Turns a resolved [`Solution`] into an executable [`Patch`].
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Map `pattern_type` (refined by the evidence at hand) to a
//!   fix template and render it with parameters taken from the solution
//! - **Integration:** StrategyResolver → FixGenerator → HealingApplier
//!
//! # Templates
//!
//! | Template                  | Operation             | Required parameters            |
//! |---------------------------|-----------------------|--------------------------------|
//! | `fix_import_path`         | `fix_import_path`     | `name`, `resolved_module`      |
//! | `fix_import_submodule`    | `fix_import_path`     | `name`, `module`               |
//! | `generic_import_fix`      | `generic_import_fix`  | `snippet`                      |
//! | `add_method`              | `add_method`          | `object`, `attribute`          |
//! | `add_method_alias`        | `add_method`          | `object`, `attribute`, `similar_member` |
//! | `add_attribute`           | `add_attribute`       | `object`, `attribute`          |
//! | `add_module_attribute`    | `add_attribute`       | `module`, `attribute`          |
//! | `import_module_attribute` | `fix_import_path`     | `module`, `attribute`, `resolved_module` |
//! | `install_or_stub_module`  | `install_or_fix_module` | `module`                     |
//! | `alias_module`            | `install_or_fix_module` | `module`, `resolved_module`  |
//! | `create_class`            | `create_class`        | `name`                         |
//! | `import_existing_class`   | `fix_import_path`     | `name`, `resolved_module`      |
//!
//! Generation fails closed: a missing or malformed parameter yields a
//! [`GenerationError`] and no patch.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::errors::GenerationError;
use crate::domain::pattern::PatternType;
use crate::domain::solution::{Patch, PatchOperation, Solution};
use crate::infrastructure::fix_template_engine::FixTemplateEngine;
use crate::infrastructure::mutators::MAIN_MODULE;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_]\w*$").expect("valid regex"));
static MODULE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)*$").expect("valid regex"));
static PACKAGE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").expect("valid regex"));
static IMPORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:from\s+\.*[\w.]*\s+import\s+[\w\s,*()]+|import\s+[\w.]+(?:\s+as\s+\w+)?(?:\s*,\s*[\w.]+(?:\s+as\s+\w+)?)*)$")
        .expect("valid regex")
});

/// Error-report context key naming the module the error was raised from.
pub const SOURCE_MODULE_KEY: &str = "source_module";
/// Solution parameter that forces a specific registered template.
pub const TEMPLATE_KEY: &str = "template";

/// Optional parameters that steer targeting or rendering of any template.
const TARGET_KEYS: [&str; 4] = ["target_module", "importer", "package", "object"];

/// Which module or class a template's patch is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRule {
    /// The module that raised the error.
    Importer,
    /// `target_module:object`, the class missing a member.
    ObjectClass,
    /// The module named by the `module` parameter.
    NamedModule,
    /// `target_module` when known, otherwise the `module` parameter.
    OwningModule,
}

/// A registered fix template.
#[derive(Debug, Clone)]
pub struct FixTemplate {
    pub id: String,
    pub operation: PatchOperation,
    pub target: TargetRule,
    pub required: Vec<String>,
    pub body: String,
}

impl FixTemplate {
    pub fn new(
        id: impl Into<String>,
        operation: PatchOperation,
        target: TargetRule,
        required: &[&str],
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            operation,
            target,
            required: required.iter().map(|p| p.to_string()).collect(),
            body: body.into(),
        }
    }
}

fn builtin_templates() -> Vec<FixTemplate> {
    use PatchOperation::*;
    use TargetRule::*;
    vec![
        FixTemplate::new(
            "fix_import_path",
            FixImportPath,
            Importer,
            &["name", "resolved_module"],
            "from {{resolved_module}} import {{name}}",
        ),
        FixTemplate::new(
            "fix_import_submodule",
            FixImportPath,
            Importer,
            &["name", "module"],
            "from {{module}}.{{name_snake}} import {{name}}",
        ),
        FixTemplate::new("generic_import_fix", GenericImportFix, Importer, &["snippet"], "{{snippet}}"),
        FixTemplate::new(
            "add_method",
            AddMethod,
            ObjectClass,
            &["object", "attribute"],
            "def {{attribute}}(self, *args, **kwargs):\n    return None",
        ),
        FixTemplate::new(
            "add_method_alias",
            AddMethod,
            ObjectClass,
            &["object", "attribute", "similar_member"],
            "def {{attribute}}(self, *args, **kwargs):\n    return self.{{similar_member}}(*args, **kwargs)",
        ),
        FixTemplate::new(
            "add_attribute",
            AddAttribute,
            ObjectClass,
            &["object", "attribute"],
            "{{attribute}} = None",
        ),
        FixTemplate::new(
            "add_module_attribute",
            AddAttribute,
            OwningModule,
            &["module", "attribute"],
            "{{attribute}} = None",
        ),
        FixTemplate::new(
            "import_module_attribute",
            FixImportPath,
            OwningModule,
            &["module", "attribute", "resolved_module"],
            "from {{resolved_module}} import {{attribute}}",
        ),
        FixTemplate::new(
            "install_or_stub_module",
            InstallOrFixModule,
            NamedModule,
            &["module"],
            "# Missing module '{{module}}': install it with `pip install {{package}}`.\n\
             # Until then this stub keeps imports of '{{module}}' working.\n\
             \"\"\"Stub for the missing '{{module}}' module.\"\"\"",
        ),
        FixTemplate::new(
            "alias_module",
            InstallOrFixModule,
            NamedModule,
            &["module", "resolved_module"],
            "\"\"\"Alias of '{{resolved_module}}'.\"\"\"\nfrom {{resolved_module}} import *  # noqa: F401,F403",
        ),
        FixTemplate::new(
            "create_class",
            CreateClass,
            Importer,
            &["name"],
            "class {{name}}:\n    def __init__(self, *args, **kwargs):\n        self.args = args\n        self.kwargs = kwargs",
        ),
        FixTemplate::new(
            "import_existing_class",
            FixImportPath,
            Importer,
            &["name", "resolved_module"],
            "from {{resolved_module}} import {{name}}",
        ),
    ]
}

pub struct FixGenerator {
    engine: FixTemplateEngine,
    templates: BTreeMap<String, FixTemplate>,
}

impl FixGenerator {
    pub fn new() -> Result<Self, GenerationError> {
        let mut generator = Self {
            engine: FixTemplateEngine::new(),
            templates: BTreeMap::new(),
        };
        for template in builtin_templates() {
            generator.register(template)?;
        }
        Ok(generator)
    }

    /// Registers (or replaces) a template. Solutions select it through the
    /// `template` parameter.
    pub fn register(&mut self, template: FixTemplate) -> Result<(), GenerationError> {
        self.engine.validate_template(&template.body)?;
        self.engine.register(&template.id, &template.body)?;
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    pub fn template_ids(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    pub fn generate(&self, solution: &Solution) -> Result<Patch, GenerationError> {
        self.generate_with_context(solution, &BTreeMap::new())
    }

    /// Generates a patch; `context` is the error report's context and is
    /// only consulted to locate the importing module.
    pub fn generate_with_context(
        &self,
        solution: &Solution,
        context: &BTreeMap<String, String>,
    ) -> Result<Patch, GenerationError> {
        if solution.confidence() <= 0.0 {
            return Err(GenerationError::InsufficientEvidence);
        }

        let template = self.select(solution)?;
        let params = solution.parameters();
        for required in &template.required {
            if params.get(required).map_or(true, |v| v.trim().is_empty()) {
                return Err(GenerationError::MissingParameter {
                    template: template.id.clone(),
                    parameter: required.clone(),
                });
            }
        }
        let used = template.required.iter().map(String::as_str).chain(TARGET_KEYS.iter().copied());
        for key in used {
            if let Some(value) = params.get(key) {
                validate_parameter(key, value)?;
            }
        }

        let mut render_params = params.clone();
        if let Some(name) = params.get("name") {
            render_params.insert("name_snake".to_string(), snake_case(name));
        }
        if let Some(module) = params.get("module") {
            render_params
                .entry("package".to_string())
                .or_insert_with(|| root_package(module));
        }

        let target = resolve_target(template.target, params, context)?;
        let code = self.engine.render(&template.id, &render_params)?;
        debug!(
            template = %template.id,
            target = %target,
            pattern_type = %solution.pattern_type(),
            "Fix rendered"
        );
        Ok(Patch::new(target, template.operation, code))
    }

    /// Generates the patch and attaches it to a copy of the solution.
    pub fn attach(
        &self,
        solution: &Solution,
        context: &BTreeMap<String, String>,
    ) -> Result<Solution, GenerationError> {
        let patch = self.generate_with_context(solution, context)?;
        solution.clone().with_fix(patch)
    }

    /// The template a solution renders with: an explicit `template`
    /// parameter, otherwise the pattern's stock template.
    pub fn select(&self, solution: &Solution) -> Result<&FixTemplate, GenerationError> {
        if let Some(id) = solution.parameter(TEMPLATE_KEY) {
            return self
                .templates
                .get(id)
                .ok_or_else(|| GenerationError::NoTemplate(id.to_string()));
        }
        let id = default_template(solution)?;
        self.templates
            .get(id)
            .ok_or_else(|| GenerationError::NoTemplate(id.to_string()))
    }
}

/// The stock template for a pattern, refined by which evidence is present.
fn default_template(solution: &Solution) -> Result<&'static str, GenerationError> {
    let has = |key: &str| solution.parameter(key).is_some_and(|v| !v.trim().is_empty());
    let id = match solution.pattern_type() {
        PatternType::GenericImportFix if has("resolved_module") => "fix_import_path",
        PatternType::GenericImportFix if !has("name") && has("snippet") => "generic_import_fix",
        PatternType::GenericImportFix => "fix_import_submodule",
        PatternType::AddMissingAttribute => match solution.parameter("attribute") {
            Some(attribute) if is_constant_name(attribute) => "add_attribute",
            _ if has("similar_member") => "add_method_alias",
            _ => "add_method",
        },
        PatternType::MissingModuleAttribute if has("resolved_module") => "import_module_attribute",
        PatternType::MissingModuleAttribute => "add_module_attribute",
        PatternType::InstallOrFixModule if has("resolved_module") => "alias_module",
        PatternType::InstallOrFixModule => "install_or_stub_module",
        PatternType::CreateMissingClass if has("resolved_module") => "import_existing_class",
        PatternType::CreateMissingClass => "create_class",
        PatternType::Unknown if has("snippet") => "generic_import_fix",
        PatternType::Unknown => return Err(GenerationError::NoTemplate(PatternType::Unknown.to_string())),
    };
    Ok(id)
}

fn resolve_target(
    rule: TargetRule,
    params: &BTreeMap<String, String>,
    context: &BTreeMap<String, String>,
) -> Result<String, GenerationError> {
    let importer = || {
        params
            .get("importer")
            .or_else(|| context.get(SOURCE_MODULE_KEY))
            .filter(|m| MODULE_PATH.is_match(m))
            .cloned()
            .unwrap_or_else(|| MAIN_MODULE.to_string())
    };
    let param = |key: &str| params.get(key).cloned();

    Ok(match rule {
        TargetRule::Importer => importer(),
        TargetRule::ObjectClass => {
            let module = param("target_module").unwrap_or_else(importer);
            let object = param("object").ok_or_else(|| missing("object"))?;
            format!("{}:{}", module, object)
        }
        TargetRule::NamedModule => param("module").ok_or_else(|| missing("module"))?,
        TargetRule::OwningModule => param("target_module")
            .or_else(|| param("module"))
            .ok_or_else(|| missing("module"))?,
    })
}

fn missing(parameter: &str) -> GenerationError {
    GenerationError::MissingParameter {
        template: "target".to_string(),
        parameter: parameter.to_string(),
    }
}

/// Parameters that flow into code must have the shape their role implies.
fn validate_parameter(key: &str, value: &str) -> Result<(), GenerationError> {
    let valid = match key {
        "name" | "attribute" | "object" | "similar_member" => IDENTIFIER.is_match(value),
        "module" | "resolved_module" | "target_module" | "importer" => MODULE_PATH.is_match(value),
        "package" => PACKAGE_NAME.is_match(value),
        "snippet" => is_import_block(value),
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(GenerationError::InvalidParameter {
            parameter: key.to_string(),
            value: value.to_string(),
        })
    }
}

fn is_import_block(snippet: &str) -> bool {
    let mut lines = snippet
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .peekable();
    lines.peek().is_some() && lines.all(|line| IMPORT_LINE.is_match(line))
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn root_package(module: &str) -> String {
    module.split('.').next().unwrap_or(module).to_string()
}

/// `DatabaseConnection` → `database_connection`, `HTTPClient` → `http_client`.
fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
