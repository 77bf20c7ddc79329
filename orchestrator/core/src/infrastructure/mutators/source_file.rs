// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Source File Mutator
//
// Applies patches to source files under a fixed root. Module paths map to
// `<root>/a/b.<ext>` or `<root>/a/b/__init__.<ext>`; only dotted identifiers
// are accepted so no patch can reach outside the root.
//
// Verification checks the patched text landed and, when configured, runs an
// external probe command (`{module}` is substituted) under a timeout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{class_name, import_lines, imported_names, member_name, unsupported, validate_module, MAIN_MODULE};
use crate::domain::mutator::{AppliedChange, MutationError, MutatorKind, TargetMutator};
use crate::domain::solution::{Patch, PatchOperation};

const INDENT: &str = "    ";
const PROBE_OUTPUT_CHARS: usize = 400;

pub struct SourceFileMutator {
    root: PathBuf,
    extension: String,
    verify_command: Option<Vec<String>>,
    verify_timeout: Duration,
}

impl SourceFileMutator {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
            verify_command: None,
            verify_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_verify_command(mut self, command: Vec<String>, timeout: Duration) -> Self {
        self.verify_command = Some(command).filter(|c| !c.is_empty());
        self.verify_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn module_of(patch: &Patch) -> Result<&str, MutationError> {
        let (module, _) = patch.module_and_class();
        let module = if module.is_empty() { MAIN_MODULE } else { module };
        validate_module(module)?;
        Ok(module)
    }

    /// Candidate files for a module, preferred first.
    fn candidate_paths(&self, module: &str) -> [PathBuf; 2] {
        let relative: PathBuf = module.split('.').collect();
        [
            self.root.join(&relative).with_extension(&self.extension),
            self.root.join(&relative).join(format!("__init__.{}", self.extension)),
        ]
    }

    async fn existing_file(&self, module: &str) -> Option<PathBuf> {
        for path in self.candidate_paths(module) {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }

    /// Creates the missing parents of `path` and returns them outermost first.
    async fn create_parents(&self, path: &Path) -> Result<Vec<PathBuf>, MutationError> {
        let mut missing = Vec::new();
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.root || tokio::fs::try_exists(current).await? {
                break;
            }
            missing.push(current.to_path_buf());
            dir = current.parent();
        }
        missing.reverse();
        if let Some(deepest) = missing.last() {
            tokio::fs::create_dir_all(deepest).await?;
        }
        Ok(missing)
    }

    async fn run_probe(&self, module: &str) -> Result<(), MutationError> {
        let Some(command) = &self.verify_command else {
            return Ok(());
        };
        let args: Vec<String> = command.iter().map(|arg| arg.replace("{module}", module)).collect();
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| MutationError::VerificationFailed("empty verify command".to_string()))?;

        let mut probe = Command::new(program);
        probe.args(rest).current_dir(&self.root).kill_on_drop(true);

        let output = tokio::time::timeout(self.verify_timeout, probe.output())
            .await
            .map_err(|_| {
                MutationError::VerificationFailed(format!(
                    "probe timed out after {}ms",
                    self.verify_timeout.as_millis()
                ))
            })??;

        if output.status.success() {
            debug!(module, "Verification probe passed");
            Ok(())
        } else {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .chars()
                .take(PROBE_OUTPUT_CHARS)
                .collect();
            Err(MutationError::VerificationFailed(format!(
                "probe exited with {}: {}",
                output.status,
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl TargetMutator for SourceFileMutator {
    fn kind(&self) -> MutatorKind {
        MutatorKind::SourceFile
    }

    async fn apply(&self, patch: &Patch) -> Result<AppliedChange, MutationError> {
        let module = Self::module_of(patch)?;
        let (_, class) = patch.module_and_class();

        if patch.operation == PatchOperation::InstallOrFixModule {
            if let Some(existing) = self.existing_file(module).await {
                return Err(MutationError::Conflict(format!(
                    "module {} already exists at {}",
                    module,
                    existing.display()
                )));
            }
            let [path, _] = self.candidate_paths(module);
            let created_dirs = self.create_parents(&path).await?;
            tokio::fs::write(&path, ensure_trailing_newline(&patch.code)).await?;
            info!(path = %path.display(), "Wrote stub module");
            return Ok(AppliedChange {
                target: path.display().to_string(),
                previous: None,
                note: format!("created stub for {}", module),
                created_dirs,
            });
        }

        let existing = self.existing_file(module).await;
        if existing.is_none() && patch.operation != PatchOperation::CreateClass {
            return Err(MutationError::TargetNotFound(format!("no source file for module {}", module)));
        }
        let path = match existing {
            Some(path) => path,
            None => {
                let [path, _] = self.candidate_paths(module);
                path
            }
        };
        let previous = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let current = previous.clone().unwrap_or_default();

        let updated = match patch.operation {
            PatchOperation::AddMethod | PatchOperation::AddAttribute => {
                member_name(patch)?;
                match class {
                    Some(class) => insert_into_class(&current, class, &patch.code)
                        .ok_or_else(|| MutationError::TargetNotFound(format!("class {} in {}", class, path.display())))?,
                    None if patch.operation == PatchOperation::AddAttribute => append_block(&current, &patch.code),
                    None => return Err(unsupported(patch)),
                }
            }
            PatchOperation::CreateClass => {
                let class = class_name(patch)?;
                if find_class(&current, &class).is_some() {
                    return Err(MutationError::Conflict(format!("class {} already defined in {}", class, path.display())));
                }
                append_block(&current, &patch.code)
            }
            PatchOperation::FixImportPath | PatchOperation::GenericImportFix => rewrite_imports(&current, &patch.code),
            PatchOperation::InstallOrFixModule => return Err(unsupported(patch)),
        };

        let mut created_dirs = Vec::new();
        if Some(&updated) == previous.as_ref() {
            debug!(path = %path.display(), "Patch already present");
        } else {
            created_dirs = self.create_parents(&path).await?;
            tokio::fs::write(&path, &updated).await?;
        }

        info!(path = %path.display(), operation = %patch.operation, "Patched source file");
        Ok(AppliedChange {
            target: path.display().to_string(),
            previous,
            note: patch.summary(),
            created_dirs,
        })
    }

    async fn verify(&self, patch: &Patch) -> Result<(), MutationError> {
        let module = Self::module_of(patch)?;
        let path = self
            .existing_file(module)
            .await
            .ok_or_else(|| MutationError::VerificationFailed(format!("module {} has no source file", module)))?;
        let contents = tokio::fs::read_to_string(&path).await?;

        let missing = import_lines(&patch.code)
            .into_iter()
            .find(|line| !contents.lines().any(|l| l.trim() == line));
        if let Some(line) = missing {
            return Err(MutationError::VerificationFailed(format!(
                "'{}' not found in {}",
                line,
                path.display()
            )));
        }

        self.run_probe(module).await
    }

    async fn rollback(&self, change: AppliedChange) -> Result<(), MutationError> {
        let path = PathBuf::from(&change.target);
        if !path.starts_with(&self.root) {
            return Err(MutationError::Conflict(format!("{} is outside the mutator root", change.target)));
        }
        match change.previous {
            Some(contents) => tokio::fs::write(&path, contents).await?,
            None => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        return Err(e.into());
                    }
                    warn!(path = %path.display(), "Rollback target already gone");
                }
            }
        }
        for dir in change.created_dirs.iter().rev() {
            if !dir.starts_with(&self.root) || dir == &self.root {
                continue;
            }
            // Leaves anything written there since the patch was applied
            if let Err(e) = tokio::fs::remove_dir(dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %dir.display(), "Created directory not removed: {}", e);
                    break;
                }
            }
        }
        info!(path = %path.display(), "Rolled back source file");
        Ok(())
    }
}

fn ensure_trailing_newline(code: &str) -> String {
    let mut text = code.trim_end().to_string();
    text.push('\n');
    text
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Line index and indentation of `class <name>` in `source`.
fn find_class(source: &str, name: &str) -> Option<(usize, usize)> {
    source.lines().enumerate().find_map(|(index, line)| {
        let rest = line.trim_start().strip_prefix("class ")?;
        let declared: String = rest.chars().take_while(|c| c.is_alphanumeric() || *c == '_').collect();
        (declared == name).then(|| (index, indent_of(line)))
    })
}

/// Inserts `code` as the last member of class `name`, re-indented to the
/// class body. Returns `None` when the class does not exist.
fn insert_into_class(source: &str, name: &str, code: &str) -> Option<String> {
    let (header, class_indent) = find_class(source, name)?;
    let lines: Vec<&str> = source.lines().collect();

    let mut body_indent = None;
    let mut end = header + 1;
    for (index, line) in lines.iter().enumerate().skip(header + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) <= class_indent {
            break;
        }
        body_indent.get_or_insert(indent_of(line));
        end = index + 1;
    }
    let prefix = " ".repeat(body_indent.unwrap_or(class_indent + INDENT.len()));

    let mut member: Vec<String> = vec![String::new()];
    member.extend(code.trim_end().lines().map(|l| {
        if l.trim().is_empty() {
            String::new()
        } else {
            format!("{}{}", prefix, l)
        }
    }));

    let mut out: Vec<String> = lines[..end].iter().map(|l| l.to_string()).collect();
    out.extend(member);
    out.extend(lines[end..].iter().map(|l| l.to_string()));
    let mut text = out.join("\n");
    text.push('\n');
    Some(text)
}

fn append_block(source: &str, code: &str) -> String {
    let mut text = source.trim_end().to_string();
    if !text.is_empty() {
        text.push_str("\n\n\n");
    }
    text.push_str(&ensure_trailing_newline(code));
    text
}

/// Replaces existing imports of the same names; anything new goes on top.
fn rewrite_imports(source: &str, code: &str) -> String {
    let mut lines: Vec<String> = source.lines().map(str::to_string).collect();
    let mut prepend = Vec::new();

    for import in import_lines(code) {
        if lines.iter().any(|l| l.trim() == import) {
            continue;
        }
        let names = imported_names(&import);
        let replaced = !names.is_empty()
            && lines.iter_mut().any(|line| {
                let existing = imported_names(line);
                if indent_of(line) == 0 && !existing.is_empty() && existing == names {
                    *line = import.clone();
                    true
                } else {
                    false
                }
            });
        if !replaced {
            prepend.push(import);
        }
    }

    let mut out = prepend;
    out.extend(lines);
    let mut text = out.join("\n");
    text.push('\n');
    text
}
