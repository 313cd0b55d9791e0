//! Compilation project builder.
//!
//! Wraps a generated tree in a throwaway cargo package and builds the
//! next-stage binary from it.

use crate::config::{DependencySpec, ManifestConfig};
use crate::error::BootstrapError;
use crate::runner::{reset_dir, GeneratedTree};
use crate::tools::Invocation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use walkdir::WalkDir;

/// A materialized scratch project, ready to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectHandle {
    pub stage: String,
    pub package_name: String,
    pub dir: PathBuf,
}

impl ProjectHandle {
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join("Cargo.toml")
    }

    /// Debug binary location, derived from the package name rather than searched for
    pub fn binary_path(&self) -> PathBuf {
        self.dir
            .join("target")
            .join("debug")
            .join(format!("{}{}", self.package_name, std::env::consts::EXE_SUFFIX))
    }
}

#[derive(Debug, Serialize)]
struct Manifest {
    package: PackageSection,
    workspace: BTreeMap<String, String>,
    dependencies: BTreeMap<String, DependencySpec>,
    features: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
struct PackageSection {
    name: String,
    version: String,
    edition: String,
}

/// Materializes and builds stage projects
#[derive(Debug, Clone)]
pub struct ProjectBuilder {
    manifest: ManifestConfig,
    output_root: PathBuf,
    wrapper: PathBuf,
    timeout: Duration,
    cargo: PathBuf,
}

impl ProjectBuilder {
    pub fn new(
        manifest: ManifestConfig,
        output_root: PathBuf,
        wrapper: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            manifest,
            output_root,
            wrapper,
            timeout,
            cargo: PathBuf::from("cargo"),
        }
    }

    /// Build with `program` instead of the `cargo` on `PATH`
    pub fn with_cargo(mut self, program: impl Into<PathBuf>) -> Self {
        self.cargo = program.into();
        self
    }

    pub fn package_name(&self, stage: &str) -> String {
        format!("{}{}", self.manifest.package_prefix, stage)
    }

    /// Render `Cargo.toml` for the `stage` scratch package
    pub fn render_manifest(&self, stage: &str) -> Result<String, toml::ser::Error> {
        let mut dependencies = BTreeMap::new();
        dependencies.insert(
            self.manifest.runtime_crate.clone(),
            DependencySpec::Detailed {
                path: Some(self.manifest.runtime_path.clone()),
                git: None,
                rev: None,
                version: None,
            },
        );
        for krate in &self.manifest.parser_crates {
            dependencies.insert(
                krate.clone(),
                DependencySpec::Detailed {
                    path: None,
                    git: Some(self.manifest.parser_git.clone()),
                    rev: self.manifest.parser_rev.clone(),
                    version: None,
                },
            );
        }
        for (name, spec) in &self.manifest.extra_dependencies {
            dependencies.insert(name.clone(), spec.clone());
        }

        let mut features = BTreeMap::new();
        features.insert(self.manifest.feature.clone(), Vec::new());

        let manifest = Manifest {
            package: PackageSection {
                name: self.package_name(stage),
                version: "0.1.0".to_string(),
                edition: self.manifest.edition.clone(),
            },
            workspace: BTreeMap::new(),
            dependencies,
            features,
        };
        toml::to_string(&manifest)
    }

    /// Lay out `bootstrap_<stage>/` with the generated sources, wrapper and manifest
    pub fn materialize(
        &self,
        stage: &str,
        tree: &GeneratedTree,
    ) -> Result<ProjectHandle, BootstrapError> {
        let dir = self.output_root.join(format!("bootstrap_{}", stage));
        let src = dir.join("src");
        reset_dir(&dir)?;
        std::fs::create_dir_all(&src).map_err(|e| BootstrapError::io(&src, e))?;

        let copied = copy_tree(&tree.root, &src)?;

        let wrapper_dest = src.join("main.rs");
        std::fs::copy(&self.wrapper, &wrapper_dest)
            .map_err(|e| BootstrapError::io(&self.wrapper, e))?;

        let manifest = self.render_manifest(stage).map_err(|e| {
            BootstrapError::io(
                dir.join("Cargo.toml"),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        let handle = ProjectHandle {
            stage: stage.to_string(),
            package_name: self.package_name(stage),
            dir,
        };
        std::fs::write(handle.manifest_path(), manifest)
            .map_err(|e| BootstrapError::io(handle.manifest_path(), e))?;

        info!(
            "{}: materialized {} generated files into {}",
            stage,
            copied,
            handle.dir.display()
        );
        Ok(handle)
    }

    /// `cargo build` the project with the bootstrap feature and return the binary path
    pub async fn build(&self, handle: &ProjectHandle) -> Result<PathBuf, BootstrapError> {
        info!("{}: building {}", handle.stage, handle.dir.display());

        let output = Invocation::new(&self.cargo, self.timeout)
            .args(["build", "--quiet", "--features"])
            .arg(self.manifest.feature.clone())
            .env(self.manifest.stage_env_var.clone(), handle.stage.clone())
            .current_dir(&handle.dir)
            .output()
            .await?;

        if !output.success() {
            return Err(BootstrapError::BuildFailure {
                project: handle.dir.clone(),
                code: output.code,
                stderr: output.stderr_lossy(),
            });
        }

        let binary = handle.binary_path();
        if !binary.is_file() {
            return Err(BootstrapError::MissingBinary(binary));
        }
        Ok(binary)
    }
}

/// Copy every file under `from` into `to`, preserving relative paths
fn copy_tree(from: &Path, to: &Path) -> Result<usize, BootstrapError> {
    let mut copied = 0;
    for entry in WalkDir::new(from).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            BootstrapError::io(path, e.into())
        })?;
        let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| BootstrapError::io(&dest, e))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &dest).map_err(|e| BootstrapError::io(entry.path(), e))?;
            copied += 1;
        }
    }
    Ok(copied)
}
