use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default configuration file looked up in the current directory
pub const CONFIG_FILENAME: &str = "bootcheck.toml";

/// Environment variable relocating stage directories and scratch projects
pub const TARGET_DIR_ENV: &str = "BOOTCHECK_TARGET_DIR";

/// Fewest generations that can be compared against each other
pub const MIN_GENERATIONS: usize = 2;

/// Bootcheck configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Configuration file version
    pub version: String,

    /// Where the translator lives and where outputs go
    pub project: ProjectConfig,

    /// Source/generated file naming conventions
    pub layout: LayoutConfig,

    /// How the host-built stage 0 binary is obtained
    pub stage0: Stage0Config,

    /// Manifest written around each generated tree
    pub manifest: ManifestConfig,

    /// Generation loop settings
    pub pipeline: PipelineConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            project: ProjectConfig::default(),
            layout: LayoutConfig::default(),
            stage0: Stage0Config::default(),
            manifest: ManifestConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Workspace root; relative paths below are resolved against it
    pub workspace_root: PathBuf,

    /// Translator source tree (holds the `.qrs` modules and the wrapper entry file)
    pub translator_src: PathBuf,

    /// Hand-authored entry wrapper, relative to `translator_src`
    pub wrapper: PathBuf,

    /// Root for stage output directories and scratch build projects
    pub output_root: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            translator_src: PathBuf::from("crates/quiche-self/src"),
            wrapper: PathBuf::from("main.rs"),
            output_root: PathBuf::from("target"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Extension of translator source modules
    pub source_extension: String,

    /// Extension of generated modules
    pub generated_extension: String,

    /// Stem of the file that aggregates a directory's children
    pub directory_module_stem: String,

    /// Stem of the namespace-root module that receives top-level declarations
    pub entry_stem: String,

    /// Output stem for the entry module, so the copied wrapper is not overwritten
    pub entry_output_stem: String,

    /// Stems transpiled but never registered as child modules
    pub reserved_stems: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            source_extension: "qrs".to_string(),
            generated_extension: "rs".to_string(),
            directory_module_stem: "mod".to_string(),
            entry_stem: "main".to_string(),
            entry_output_stem: "main_gen".to_string(),
            reserved_stems: vec!["main".to_string(), "lib".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage0Config {
    /// Use this prebuilt binary instead of building one
    pub binary: Option<PathBuf>,

    /// Workspace package built with the host toolchain
    pub package: String,

    /// Name of the binary that package produces
    pub binary_name: String,
}

impl Default for Stage0Config {
    fn default() -> Self {
        Self {
            binary: None,
            package: "quiche_self".to_string(),
            binary_name: "quiche_self".to_string(),
        }
    }
}

/// A dependency entry in the synthesized manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Version(String),
    Detailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        #[serde(skip_serializing_if = "Option::is_none")]
        git: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rev: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Scratch package name is `<package_prefix><stage>`
    pub package_prefix: String,

    /// Rust edition of the scratch package
    pub edition: String,

    /// Runtime support crate name
    pub runtime_crate: String,

    /// Runtime support crate, by local path relative to the workspace
    pub runtime_path: PathBuf,

    /// Parser/AST support repository
    pub parser_git: String,

    /// Revision the parser crates are pinned to
    pub parser_rev: Option<String>,

    /// Crates pulled from the parser repository
    pub parser_crates: Vec<String>,

    /// Build-only feature gating bootstrap-stage code paths
    pub feature: String,

    /// Environment variable carrying the stage name into the build
    pub stage_env_var: String,

    /// Any further fixed dependencies
    pub extra_dependencies: BTreeMap<String, DependencySpec>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        let mut extra_dependencies = BTreeMap::new();
        extra_dependencies.insert(
            "num-bigint".to_string(),
            DependencySpec::Version("0.4".to_string()),
        );
        Self {
            package_prefix: "quiche_bootstrap_".to_string(),
            edition: "2024".to_string(),
            runtime_crate: "quiche_runtime".to_string(),
            runtime_path: PathBuf::from("crates/runtime"),
            parser_git: "https://github.com/astral-sh/ruff".to_string(),
            parser_rev: None,
            parser_crates: vec![
                "ruff_python_parser".to_string(),
                "ruff_python_ast".to_string(),
            ],
            feature: "bootstrap".to_string(),
            stage_env_var: "QUICHE_STAGE".to_string(),
            extra_dependencies,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of generated trees; consecutive trees are compared
    pub generations: usize,

    /// Concurrent stage-binary invocations (0 = available parallelism)
    pub jobs: usize,

    /// Per-module transpile timeout
    pub transpile_timeout_secs: u64,

    /// Per-stage cargo build timeout
    pub build_timeout_secs: u64,

    /// Arguments placed before the module path on every invocation
    pub extra_args: Vec<String>,

    /// Treat shadowed `let mut` findings as a failed verdict
    pub fail_on_shadow: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generations: 2,
            jobs: 0,
            transpile_timeout_secs: 300,
            build_timeout_secs: 1800,
            extra_args: vec![],
            fail_on_shadow: false,
        }
    }
}

impl PipelineConfig {
    /// Worker count with the `0 = auto` rule applied
    pub fn effective_jobs(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Generation count actually run, never below [`MIN_GENERATIONS`]
    pub fn effective_generations(&self) -> usize {
        self.generations.max(MIN_GENERATIONS)
    }
}

impl BootstrapConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Anchor relative paths at `workspace_root` and apply an output-root override.
    ///
    /// The override is the value of [`TARGET_DIR_ENV`], read by the caller.
    pub fn resolve(mut self, workspace_root: &Path, output_override: Option<PathBuf>) -> Self {
        let root = if self.project.workspace_root.is_absolute() {
            self.project.workspace_root.clone()
        } else {
            workspace_root.join(&self.project.workspace_root)
        };
        self.project.translator_src = anchor(&root, &self.project.translator_src);
        self.project.output_root = match output_override {
            Some(dir) => anchor(&root, &dir),
            None => anchor(&root, &self.project.output_root),
        };
        self.manifest.runtime_path = anchor(&root, &self.manifest.runtime_path);
        self.stage0.binary = self.stage0.binary.map(|b| anchor(&root, &b));
        self.project.workspace_root = root;
        self
    }

    pub fn wrapper_path(&self) -> PathBuf {
        self.project.translator_src.join(&self.project.wrapper)
    }

    pub fn stage_output_dir(&self, generation: usize) -> PathBuf {
        self.project
            .output_root
            .join(format!("stage{}_out", generation))
    }

    pub fn report_path(&self) -> PathBuf {
        self.project.output_root.join("bootstrap_report.json")
    }
}

fn anchor(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bootstrap_config_default() {
        let config = BootstrapConfig::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.pipeline.generations, 2);
        assert_eq!(config.layout.source_extension, "qrs");
        assert_eq!(config.layout.generated_extension, "rs");
        assert_eq!(config.layout.entry_output_stem, "main_gen");
        assert!(config.stage0.binary.is_none());
        assert!(!config.pipeline.fail_on_shadow);
    }

    #[test]
    fn test_manifest_config_default() {
        let manifest = ManifestConfig::default();
        assert_eq!(manifest.feature, "bootstrap");
        assert_eq!(manifest.parser_crates.len(), 2);
        assert_eq!(
            manifest.extra_dependencies.get("num-bigint"),
            Some(&DependencySpec::Version("0.4".to_string()))
        );
    }

    #[test]
    fn test_effective_jobs() {
        let mut pipeline = PipelineConfig::default();
        assert!(pipeline.effective_jobs() >= 1);
        pipeline.jobs = 3;
        assert_eq!(pipeline.effective_jobs(), 3);
    }

    #[test]
    fn test_effective_generations_clamps_to_two() {
        let mut pipeline = PipelineConfig::default();
        pipeline.generations = 1;
        assert_eq!(pipeline.effective_generations(), 2);
        pipeline.generations = 0;
        assert_eq!(pipeline.effective_generations(), 2);
        pipeline.generations = 4;
        assert_eq!(pipeline.effective_generations(), 4);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILENAME);

        let mut config = BootstrapConfig::default();
        config.pipeline.generations = 3;
        config.manifest.parser_rev = Some("abc123".to_string());
        config.save(&config_path).unwrap();

        let loaded = BootstrapConfig::load(&config_path).unwrap();
        assert_eq!(loaded.pipeline.generations, 3);
        assert_eq!(loaded.manifest.parser_rev.as_deref(), Some("abc123"));
        assert_eq!(loaded.manifest.extra_dependencies.len(), 1);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = BootstrapConfig::load(Path::new("/nonexistent/bootcheck.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "invalid toml content [[[").unwrap();
        assert!(BootstrapConfig::load(&config_path).is_err());
    }

    #[test]
    fn test_save_config_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("dir").join(CONFIG_FILENAME);
        BootstrapConfig::default().save(&config_path).unwrap();
        assert!(config_path.exists());
    }

    #[test]
    fn test_resolve_anchors_relative_paths() {
        let config = BootstrapConfig::default().resolve(Path::new("/work"), None);
        assert_eq!(config.project.workspace_root, PathBuf::from("/work/."));
        assert_eq!(
            config.project.translator_src,
            PathBuf::from("/work/./crates/quiche-self/src")
        );
        assert_eq!(config.project.output_root, PathBuf::from("/work/./target"));
        assert_eq!(
            config.stage_output_dir(1),
            PathBuf::from("/work/./target/stage1_out")
        );
        assert_eq!(
            config.wrapper_path(),
            PathBuf::from("/work/./crates/quiche-self/src/main.rs")
        );
    }

    #[test]
    fn test_resolve_output_override() {
        let config = BootstrapConfig::default()
            .resolve(Path::new("/work"), Some(PathBuf::from("/scratch/boot")));
        assert_eq!(config.project.output_root, PathBuf::from("/scratch/boot"));
        assert_eq!(
            config.report_path(),
            PathBuf::from("/scratch/boot/bootstrap_report.json")
        );
    }
}
