//! Module tree mapping.
//!
//! Maps translator source modules (`.qrs`) onto the generated module tree:
//! - `a/b/c.qrs` is module `a.b.c` and emits `a/b/c.rs`
//! - `a/b/mod.qrs` is the directory module `a.b` and emits `a/b/mod.rs`
//! - root `main.qrs` is the entry module and emits `main_gen.rs`
//!
//! The [`ModuleRegistry`] records which child modules every directory
//! module (and the entry module) must declare.

use crate::config::LayoutConfig;
use crate::error::BootstrapError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One translator source file, identified by its path under the source root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceModule {
    pub relative_path: PathBuf,
    pub stem: String,
    /// Dotted module path; empty for the namespace root
    pub module_path: String,
    pub is_directory_module: bool,
    pub is_entry: bool,
    pub is_reserved: bool,
    pub output_path: PathBuf,
}

impl SourceModule {
    /// Last segment of the module path
    pub fn name(&self) -> Option<&str> {
        if self.module_path.is_empty() {
            return None;
        }
        Some(
            self.module_path
                .rsplit_once('.')
                .map(|(_, name)| name)
                .unwrap_or(&self.module_path),
        )
    }

    /// Whether this module takes part in the child-module registry
    pub fn is_registered(&self) -> bool {
        !self.is_reserved && !self.module_path.is_empty()
    }
}

/// Naming conventions of the source and generated trees
#[derive(Debug, Clone)]
pub struct ModuleLayout {
    config: LayoutConfig,
}

impl ModuleLayout {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn source_extension(&self) -> &str {
        &self.config.source_extension
    }

    /// Describe the module at `relative_path` (relative to the source root)
    pub fn describe(&self, relative_path: &Path) -> SourceModule {
        let stem = relative_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let parent = relative_path.parent().unwrap_or_else(|| Path::new(""));
        let is_directory_module = stem == self.config.directory_module_stem;
        let is_root_level = parent.as_os_str().is_empty();

        let mut segments: Vec<String> = parent
            .iter()
            .map(|seg| seg.to_string_lossy().to_string())
            .filter(|seg| !seg.is_empty())
            .collect();
        if !is_directory_module {
            segments.push(stem.clone());
        }

        let is_entry = is_root_level && stem == self.config.entry_stem;
        let is_reserved = self.config.reserved_stems.iter().any(|s| *s == stem);
        let output_path = self.output_path(relative_path, parent, is_directory_module, is_entry);

        SourceModule {
            relative_path: relative_path.to_path_buf(),
            stem,
            module_path: segments.join("."),
            is_directory_module,
            is_entry,
            is_reserved,
            output_path,
        }
    }

    fn output_path(
        &self,
        relative_path: &Path,
        parent: &Path,
        is_directory_module: bool,
        is_entry: bool,
    ) -> PathBuf {
        let ext = &self.config.generated_extension;
        if is_directory_module {
            parent.join(format!("{}.{}", self.config.directory_module_stem, ext))
        } else if is_entry {
            PathBuf::from(format!("{}.{}", self.config.entry_output_stem, ext))
        } else {
            relative_path.with_extension(ext)
        }
    }

    /// Recursively discover every source module under `source_root`, sorted by path
    pub fn discover(&self, source_root: &Path) -> Result<Vec<SourceModule>, BootstrapError> {
        let mut modules = Vec::new();

        for entry in WalkDir::new(source_root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(source_root).to_path_buf();
                BootstrapError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.source_extension()) {
                continue;
            }
            let rel = path.strip_prefix(source_root).unwrap_or(path);
            modules.push(self.describe(rel));
        }

        modules.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        debug!(
            "Discovered {} source modules under {}",
            modules.len(),
            source_root.display()
        );
        Ok(modules)
    }
}

/// Parent module path -> immediate children, plus the top-level module set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRegistry {
    pub children: BTreeMap<String, BTreeSet<String>>,
    pub top_level: BTreeSet<String>,
}

impl ModuleRegistry {
    pub fn build(modules: &[SourceModule]) -> Self {
        let mut registry = Self::default();

        for module in modules.iter().filter(|m| m.is_registered()) {
            match module.module_path.rsplit_once('.') {
                Some((parent, _)) => {
                    registry
                        .children
                        .entry(parent.to_string())
                        .or_default()
                        .insert(module.module_path.clone());
                }
                None => {
                    registry.top_level.insert(module.module_path.clone());
                }
            }

            if module.is_directory_module {
                registry
                    .children
                    .entry(module.module_path.clone())
                    .or_default();
            }
        }

        for parent in registry.children.keys() {
            let declared = modules
                .iter()
                .any(|m| m.is_directory_module && m.module_path == *parent);
            if !declared {
                warn!(
                    "Module '{}' has children but no directory module declares them",
                    parent
                );
            }
        }

        registry
    }

    /// Child names (last segment) of `module_path`, in lexical order.
    ///
    /// `None` means `module_path` is not a directory module at all.
    pub fn child_names(&self, module_path: &str) -> Option<Vec<String>> {
        self.children.get(module_path).map(|children| {
            let names: BTreeSet<String> = children
                .iter()
                .filter_map(|child| child.rsplit_once('.').map(|(_, name)| name.to_string()))
                .collect();
            names.into_iter().collect()
        })
    }

    /// The declaration block the runner prepends to a module's generated text
    pub fn header_for(&self, module: &SourceModule) -> String {
        let names: Vec<String> = if module.is_entry {
            self.top_level.iter().cloned().collect()
        } else if module.is_directory_module {
            self.child_names(&module.module_path).unwrap_or_default()
        } else {
            Vec::new()
        };

        if names.is_empty() {
            return String::new();
        }

        let mut header: String = names
            .iter()
            .map(|name| format!("pub mod {};\n", name))
            .collect();
        header.push('\n');
        header
    }
}
