// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Runtime Registry Mutator
//
// Applies patches to an in-process registry of dynamically loaded modules
// instead of files on disk. Plugins register their modules and classes here
// at load time and resolve members through it; healing a missing member is
// then a registration, not a recompile.
//
// Rollback snapshots are the JSON form of the touched module.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use super::{class_name, import_lines, member_name, unsupported, validate_module, MAIN_MODULE};
use crate::domain::mutator::{AppliedChange, MutationError, MutatorKind, TargetMutator};
use crate::domain::solution::{Patch, PatchOperation};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeClass {
    /// Member name → source
    pub members: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeModule {
    pub classes: BTreeMap<String, RuntimeClass>,
    pub attributes: BTreeMap<String, String>,
    pub imports: BTreeSet<String>,
    /// Source of a stub installed in place of a missing module
    pub stub: Option<String>,
}

#[derive(Default)]
pub struct RuntimeRegistryMutator {
    modules: RwLock<BTreeMap<String, RuntimeModule>>,
}

impl RuntimeRegistryMutator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_module(&self, module: &str) {
        self.modules.write().entry(module.to_string()).or_default();
    }

    pub fn define_class(&self, module: &str, class: &str) {
        self.modules
            .write()
            .entry(module.to_string())
            .or_default()
            .classes
            .entry(class.to_string())
            .or_default();
    }

    pub fn module(&self, module: &str) -> Option<RuntimeModule> {
        self.modules.read().get(module).cloned()
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.read().keys().cloned().collect()
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.read().contains_key(module)
    }

    pub fn has_class(&self, module: &str, class: &str) -> bool {
        self.modules
            .read()
            .get(module)
            .is_some_and(|m| m.classes.contains_key(class))
    }

    pub fn has_member(&self, module: &str, class: &str, member: &str) -> bool {
        self.modules
            .read()
            .get(module)
            .and_then(|m| m.classes.get(class))
            .is_some_and(|c| c.members.contains_key(member))
    }

    fn split_target(patch: &Patch) -> Result<(String, Option<String>), MutationError> {
        let (module, class) = patch.module_and_class();
        let module = if module.is_empty() { MAIN_MODULE } else { module };
        validate_module(module)?;
        Ok((module.to_string(), class.map(str::to_string)))
    }

    fn snapshot(module: Option<&RuntimeModule>) -> Result<Option<String>, MutationError> {
        module
            .map(|m| serde_json::to_string(m).map_err(|e| MutationError::Io(e.to_string())))
            .transpose()
    }
}

#[async_trait]
impl TargetMutator for RuntimeRegistryMutator {
    fn kind(&self) -> MutatorKind {
        MutatorKind::RuntimeRegistry
    }

    async fn apply(&self, patch: &Patch) -> Result<AppliedChange, MutationError> {
        let (module_name, class) = Self::split_target(patch)?;
        let mut modules = self.modules.write();
        let previous = Self::snapshot(modules.get(&module_name))?;

        let note = match patch.operation {
            PatchOperation::AddMethod | PatchOperation::AddAttribute => {
                let member = member_name(patch)?;
                match class {
                    Some(class) => {
                        let target_class = modules
                            .get_mut(&module_name)
                            .and_then(|m| m.classes.get_mut(&class))
                            .ok_or_else(|| MutationError::TargetNotFound(format!("{}:{}", module_name, class)))?;
                        if target_class
                            .members
                            .get(&member)
                            .is_some_and(|existing| existing != &patch.code)
                        {
                            return Err(MutationError::Conflict(format!(
                                "{}.{} already defined differently",
                                class, member
                            )));
                        }
                        target_class.members.insert(member.clone(), patch.code.clone());
                        format!("registered {}.{}", class, member)
                    }
                    None if patch.operation == PatchOperation::AddAttribute => {
                        let target_module = modules
                            .get_mut(&module_name)
                            .ok_or_else(|| MutationError::TargetNotFound(module_name.clone()))?;
                        target_module.attributes.insert(member.clone(), patch.code.clone());
                        format!("registered {}.{}", module_name, member)
                    }
                    None => return Err(unsupported(patch)),
                }
            }
            PatchOperation::CreateClass => {
                let class = class_name(patch)?;
                let target_module = modules.entry(module_name.clone()).or_default();
                if target_module.classes.contains_key(&class) {
                    return Err(MutationError::Conflict(format!("class {} already exists", class)));
                }
                let mut created = RuntimeClass::default();
                created.members.insert("__source__".to_string(), patch.code.clone());
                target_module.classes.insert(class.clone(), created);
                format!("created class {}", class)
            }
            PatchOperation::FixImportPath | PatchOperation::GenericImportFix => {
                let target_module = modules.entry(module_name.clone()).or_default();
                let lines = import_lines(&patch.code);
                if lines.is_empty() {
                    return Err(unsupported(patch));
                }
                let added = lines.len();
                target_module.imports.extend(lines);
                format!("recorded {} import line(s)", added)
            }
            PatchOperation::InstallOrFixModule => {
                if class.is_some() {
                    return Err(unsupported(patch));
                }
                match modules.get(&module_name) {
                    Some(existing) if existing.stub.is_none() => {
                        return Err(MutationError::Conflict(format!(
                            "module {} already loaded",
                            module_name
                        )));
                    }
                    Some(_) => format!("stub for {} already installed", module_name),
                    None => {
                        modules.insert(
                            module_name.clone(),
                            RuntimeModule {
                                stub: Some(patch.code.clone()),
                                ..RuntimeModule::default()
                            },
                        );
                        format!("installed stub module {}", module_name)
                    }
                }
            }
        };

        info!(target = %patch.target, operation = %patch.operation, "{}", note);
        Ok(AppliedChange {
            target: module_name,
            previous,
            note,
            created_dirs: Vec::new(),
        })
    }

    async fn verify(&self, patch: &Patch) -> Result<(), MutationError> {
        let (module_name, class) = Self::split_target(patch)?;
        let modules = self.modules.read();
        let module = modules
            .get(&module_name)
            .ok_or_else(|| MutationError::VerificationFailed(format!("module {} is not loaded", module_name)))?;

        let resolved = match patch.operation {
            PatchOperation::AddMethod | PatchOperation::AddAttribute => {
                let member = member_name(patch)?;
                match class {
                    Some(class) => module
                        .classes
                        .get(&class)
                        .is_some_and(|c| c.members.contains_key(&member)),
                    None => module.attributes.contains_key(&member),
                }
            }
            PatchOperation::CreateClass => module.classes.contains_key(&class_name(patch)?),
            PatchOperation::FixImportPath | PatchOperation::GenericImportFix => {
                import_lines(&patch.code).iter().all(|line| module.imports.contains(line))
            }
            PatchOperation::InstallOrFixModule => true,
        };

        if resolved {
            debug!(target = %patch.target, "Runtime registry probe passed");
            Ok(())
        } else {
            Err(MutationError::VerificationFailed(format!(
                "{} did not resolve after {}",
                patch.target, patch.operation
            )))
        }
    }

    async fn rollback(&self, change: AppliedChange) -> Result<(), MutationError> {
        let mut modules = self.modules.write();
        match change.previous {
            Some(snapshot) => {
                let restored: RuntimeModule =
                    serde_json::from_str(&snapshot).map_err(|e| MutationError::Io(e.to_string()))?;
                modules.insert(change.target.clone(), restored);
            }
            None => {
                modules.remove(&change.target);
            }
        }
        info!(target = %change.target, "Rolled back runtime registry change");
        Ok(())
    }
}
