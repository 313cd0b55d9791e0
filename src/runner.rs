//! Stage runner: transpile every source module with one stage binary.
//!
//! Invocations run concurrently on a bounded pool. Generated text is handed
//! back to a single writer that injects module headers and writes the tree
//! in sorted order, so the output is byte-identical across runs.

use crate::error::BootstrapError;
use crate::modules::{ModuleLayout, ModuleRegistry, SourceModule};
use crate::tools::Invocation;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// The output of one stage run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTree {
    pub stage: String,
    pub root: PathBuf,
    /// Generated files, relative to `root`, in write order
    pub files: Vec<PathBuf>,
    pub registry: ModuleRegistry,
}

impl GeneratedTree {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Runner settings shared by every stage
#[derive(Debug, Clone)]
pub struct StageRunner {
    layout: ModuleLayout,
    jobs: usize,
    timeout: Duration,
    extra_args: Vec<String>,
}

impl StageRunner {
    pub fn new(layout: ModuleLayout, jobs: usize, timeout: Duration) -> Self {
        Self {
            layout,
            jobs: jobs.max(1),
            timeout,
            extra_args: Vec::new(),
        }
    }

    /// Arguments passed before the module path on every invocation
    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    /// Transpile every module under `source_root` with `binary` into `output_dir`.
    ///
    /// `output_dir` is removed and recreated first. The first failing
    /// invocation aborts the run; nothing written so far counts as a tree.
    pub async fn run(
        &self,
        stage: &str,
        binary: &Path,
        source_root: &Path,
        output_dir: &Path,
    ) -> Result<GeneratedTree, BootstrapError> {
        if !binary.is_file() {
            return Err(BootstrapError::MissingBinary(binary.to_path_buf()));
        }

        reset_dir(output_dir)?;

        let modules = self.layout.discover(source_root)?;
        let registry = ModuleRegistry::build(&modules);
        info!(
            "{}: transpiling {} modules with {} ({} jobs)",
            stage,
            modules.len(),
            binary.display(),
            self.jobs
        );

        let outputs = self.transpile_all(binary, source_root, &modules).await?;

        let mut files = Vec::with_capacity(modules.len());
        for (module, code) in modules.iter().zip(outputs) {
            let header = registry.header_for(module);
            let dest = output_dir.join(&module.output_path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| BootstrapError::io(parent, e))?;
            }
            let text = format!("{}{}", header, code);
            std::fs::write(&dest, text).map_err(|e| BootstrapError::io(&dest, e))?;

            files.push(module.output_path.clone());
        }

        debug!("{}: wrote {} files to {}", stage, files.len(), output_dir.display());

        Ok(GeneratedTree {
            stage: stage.to_string(),
            root: output_dir.to_path_buf(),
            files,
            registry,
        })
    }

    /// Run the binary on every module; results come back in `modules` order
    async fn transpile_all(
        &self,
        binary: &Path,
        source_root: &Path,
        modules: &[SourceModule],
    ) -> Result<Vec<String>, BootstrapError> {
        let permits = Arc::new(Semaphore::new(self.jobs));
        let mut tasks = JoinSet::new();

        for (index, module) in modules.iter().enumerate() {
            let source_path = source_root.join(&module.relative_path);
            let invocation = Invocation::new(binary, self.timeout)
                .args(self.extra_args.iter().cloned())
                .arg(source_path.clone());
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => transpile_one(&invocation, &source_path).await,
                    Err(e) => Err(BootstrapError::Spawn {
                        command: invocation.display(),
                        source: std::io::Error::other(e),
                    }),
                };
                (index, result)
            });
        }

        let mut outputs: Vec<Option<String>> = vec![None; modules.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(pair) => pair,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => {
                    tasks.abort_all();
                    return Err(BootstrapError::io(source_root, std::io::Error::other(e)));
                }
            };
            match result {
                Ok(code) => outputs[index] = Some(code),
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        Ok(outputs.into_iter().map(Option::unwrap_or_default).collect())
    }
}

async fn transpile_one(
    invocation: &Invocation,
    source_path: &Path,
) -> Result<String, BootstrapError> {
    let output = invocation.output().await?;
    if !output.success() {
        return Err(BootstrapError::TranspileFailure {
            module: source_path.to_path_buf(),
            code: output.code,
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
        });
    }
    String::from_utf8(output.stdout).map_err(|_| BootstrapError::InvalidOutput {
        module: source_path.to_path_buf(),
    })
}

/// Remove `dir` wholesale and recreate it empty
pub fn reset_dir(dir: &Path) -> Result<(), BootstrapError> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| BootstrapError::io(dir, e))?;
    }
    std::fs::create_dir_all(dir).map_err(|e| BootstrapError::io(dir, e))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn write_source(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn source_tree() -> TempDir {
        let src = TempDir::new().unwrap();
        write_source(src.path(), "main.qrs", "fn main() {}\n");
        write_source(src.path(), "lexer.qrs", "fn lex() {}\n");
        write_source(src.path(), "compiler/mod.qrs", "// compiler\n");
        write_source(src.path(), "compiler/type_utils.qrs", "fn ty() {}\n");
        write_source(src.path(), "compiler/codegen.qrs", "fn emit() {}\n");
        src
    }

    fn runner() -> StageRunner {
        StageRunner::new(
            ModuleLayout::new(LayoutConfig::default()),
            4,
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_run_writes_mapped_tree_with_headers() {
        let src = source_tree();
        let tools = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let identity = write_script(tools.path(), "identity", "cat \"$1\"");

        let tree = runner()
            .run("stage1", &identity, src.path(), &out.path().join("stage1_out"))
            .await
            .unwrap();

        assert_eq!(tree.len(), 5);
        let root = out.path().join("stage1_out");
        let dir_module = std::fs::read_to_string(root.join("compiler/mod.rs")).unwrap();
        let mut lines = dir_module.lines();
        assert_eq!(lines.next(), Some("pub mod codegen;"));
        assert_eq!(lines.next(), Some("pub mod type_utils;"));
        assert_eq!(lines.next(), Some(""));
        assert_eq!(lines.next(), Some("// compiler"));

        let entry = std::fs::read_to_string(root.join("main_gen.rs")).unwrap();
        assert!(entry.starts_with("pub mod compiler;\npub mod lexer;\n\nfn main() {}"));

        let leaf = std::fs::read_to_string(root.join("compiler/codegen.rs")).unwrap();
        assert_eq!(leaf, "fn emit() {}\n");
        assert!(!root.join("main.rs").exists());
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let src = source_tree();
        let tools = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let identity = write_script(tools.path(), "identity", "cat \"$1\"");
        let runner = runner();

        let first = out.path().join("a");
        let second = out.path().join("b");
        runner.run("a", &identity, src.path(), &first).await.unwrap();
        runner.run("b", &identity, src.path(), &second).await.unwrap();

        let result = crate::compare::compare_trees(&first, &second, "rs").unwrap();
        assert!(result.is_fixed_point());
        for rel in ["main_gen.rs", "lexer.rs", "compiler/mod.rs"] {
            assert_eq!(
                std::fs::read(first.join(rel)).unwrap(),
                std::fs::read(second.join(rel)).unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_run_clears_stale_output() {
        let src = source_tree();
        let tools = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let identity = write_script(tools.path(), "identity", "cat \"$1\"");
        let target = out.path().join("stage1_out");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("stale.rs"), "old").unwrap();

        runner().run("stage1", &identity, src.path(), &target).await.unwrap();
        assert!(!target.join("stale.rs").exists());
    }

    #[tokio::test]
    async fn test_run_aborts_on_failing_module() {
        let src = source_tree();
        let tools = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let failing = write_script(
            tools.path(),
            "failing",
            "case \"$1\" in *codegen.qrs) echo 'syntax error' >&2; exit 1;; esac\ncat \"$1\"",
        );

        let err = runner()
            .run("stage1", &failing, src.path(), &out.path().join("stage1_out"))
            .await
            .unwrap_err();
        match err {
            BootstrapError::TranspileFailure { module, code, stderr, .. } => {
                assert!(module.ends_with("compiler/codegen.qrs"));
                assert_eq!(code, Some(1));
                assert!(stderr.contains("syntax error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_times_out_hung_binary() {
        let src = source_tree();
        let tools = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let hung = write_script(tools.path(), "hung", "sleep 10");
        let runner = StageRunner::new(
            ModuleLayout::new(LayoutConfig::default()),
            2,
            Duration::from_millis(300),
        );

        let err = runner
            .run("stage1", &hung, src.path(), &out.path().join("stage1_out"))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_run_passes_extra_args_before_module() {
        let src = TempDir::new().unwrap();
        write_source(src.path(), "lexer.qrs", "fn lex() {}\n");
        let tools = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let echo = write_script(tools.path(), "echo_args", "echo \"$1\"");

        runner()
            .with_extra_args(vec!["--emit-rust".to_string()])
            .run("stage1", &echo, src.path(), out.path())
            .await
            .unwrap();
        let text = std::fs::read_to_string(out.path().join("lexer.rs")).unwrap();
        assert_eq!(text.trim(), "--emit-rust");
    }

    #[tokio::test]
    async fn test_run_rejects_missing_binary() {
        let src = source_tree();
        let out = TempDir::new().unwrap();
        let err = runner()
            .run("stage1", Path::new("/nonexistent/bin"), src.path(), out.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::MissingBinary(_)));
    }
}
