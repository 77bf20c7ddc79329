// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fix Template Engine
//!
//! Renders fix templates into patch code using Handlebars placeholder
//! substitution.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Transform fix templates with placeholders into source code
//! - **Integration:** Solution parameters → Patch code
//!
//! Templates render in strict mode: a placeholder without a value is an
//! error, never an empty string, so a half-filled fix cannot be produced.
//! Output is not HTML-escaped.

use handlebars::Handlebars;
use std::collections::BTreeMap;

use crate::domain::errors::GenerationError;

pub struct FixTemplateEngine {
    handlebars: Handlebars<'static>,
}

impl FixTemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Compile and register a named template.
    pub fn register(&mut self, name: &str, template: &str) -> Result<(), GenerationError> {
        self.handlebars
            .register_template_string(name, template)
            .map_err(|e| GenerationError::Render(format!("template '{}': {}", name, e)))
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }

    /// Render a registered template with string parameters.
    pub fn render(&self, name: &str, params: &BTreeMap<String, String>) -> Result<String, GenerationError> {
        if !self.has_template(name) {
            return Err(GenerationError::NoTemplate(name.to_string()));
        }
        self.handlebars
            .render(name, params)
            .map_err(|e| GenerationError::Render(e.to_string()))
    }

    /// Render an ad-hoc template string.
    pub fn render_inline(&self, template: &str, params: &BTreeMap<String, String>) -> Result<String, GenerationError> {
        self.handlebars
            .render_template(template, params)
            .map_err(|e| GenerationError::Render(e.to_string()))
    }

    /// Validate template syntax without rendering
    pub fn validate_template(&self, template: &str) -> Result<(), GenerationError> {
        handlebars::template::Template::compile(template)
            .map(|_| ())
            .map_err(|e| GenerationError::Render(format!("invalid template syntax: {}", e)))
    }
}

impl Default for FixTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
