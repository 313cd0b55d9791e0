//! Host stage - obtains the stage 0 binary.

use anyhow::{Context as AnyhowContext, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::config::{BootstrapConfig, Stage0Config};
use crate::error::BootstrapError;
use crate::pipeline::types::{BootstrapContext, PipelineStage, StageArtifact, ValidationResult};
use crate::tools::Invocation;

pub const HOST_STAGE: &str = "stage0";

/// Host stage - builds (or locates) the host-built translator
pub struct HostStage {
    pub(crate) stage0: Stage0Config,
    pub(crate) workspace_root: PathBuf,
    pub(crate) timeout: Duration,
    pub(crate) cargo: PathBuf,
}

impl HostStage {
    pub fn new(stage0: Stage0Config, workspace_root: PathBuf, timeout: Duration) -> Self {
        Self {
            stage0,
            workspace_root,
            timeout,
            cargo: PathBuf::from("cargo"),
        }
    }

    /// Build with `program` instead of the `cargo` on `PATH`
    pub fn with_cargo(mut self, program: impl Into<PathBuf>) -> Self {
        self.cargo = program.into();
        self
    }

    pub fn from_config(config: &BootstrapConfig) -> Self {
        Self::new(
            config.stage0.clone(),
            config.project.workspace_root.clone(),
            Duration::from_secs(config.pipeline.build_timeout_secs),
        )
    }

    fn host_binary_path(&self) -> PathBuf {
        self.workspace_root
            .join("target")
            .join("debug")
            .join(format!(
                "{}{}",
                self.stage0.binary_name,
                std::env::consts::EXE_SUFFIX
            ))
    }

    async fn build_host(&self) -> Result<PathBuf> {
        info!(
            "Building host translator (package {}) in {}",
            self.stage0.package,
            self.workspace_root.display()
        );

        let output = Invocation::new(&self.cargo, self.timeout)
            .args(["build", "--quiet", "-p"])
            .arg(self.stage0.package.clone())
            .current_dir(&self.workspace_root)
            .output()
            .await?;

        if !output.success() {
            return Err(BootstrapError::BuildFailure {
                project: self.workspace_root.clone(),
                code: output.code,
                stderr: output.stderr_lossy(),
            }
            .into());
        }
        Ok(self.host_binary_path())
    }
}

#[async_trait::async_trait]
impl PipelineStage for HostStage {
    fn name(&self) -> &str {
        HOST_STAGE
    }

    async fn execute(&self, mut ctx: BootstrapContext) -> Result<BootstrapContext> {
        let binary = match &self.stage0.binary {
            Some(prebuilt) => {
                info!("Using prebuilt stage 0 binary {}", prebuilt.display());
                prebuilt.clone()
            }
            None => self
                .build_host()
                .await
                .context("Failed to build the host translator")?,
        };

        if !binary.is_file() {
            return Err(BootstrapError::MissingBinary(binary).into());
        }

        ctx.artifacts.push(StageArtifact {
            stage: HOST_STAGE.to_string(),
            binary,
        });
        Ok(ctx)
    }

    fn validate(&self, ctx: &BootstrapContext) -> Result<ValidationResult> {
        Ok(match ctx.latest_artifact() {
            Some(artifact) if artifact.stage == HOST_STAGE => {
                ValidationResult::pass(self.name(), format!("{}", artifact.binary.display()))
            }
            _ => ValidationResult::fail(self.name(), "no stage 0 binary recorded"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prebuilt_binary_recorded() {
        let dir = tempfile::TempDir::new().unwrap();
        let bin = dir.path().join("quiche_self");
        std::fs::write(&bin, "").unwrap();

        let mut config = BootstrapConfig::default();
        config.stage0.binary = Some(bin.clone());
        let stage = HostStage::from_config(&config);

        let ctx = stage.execute(BootstrapContext::new(config)).await.unwrap();
        assert_eq!(ctx.artifacts[0].binary, bin);
        assert!(stage.validate(&ctx).unwrap().passed);
    }

    #[tokio::test]
    async fn test_missing_prebuilt_binary_fails() {
        let mut config = BootstrapConfig::default();
        config.stage0.binary = Some(PathBuf::from("/nonexistent/quiche_self"));
        let stage = HostStage::from_config(&config);

        let err = stage.execute(BootstrapContext::new(config)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BootstrapError>(),
            Some(BootstrapError::MissingBinary(_))
        ));
    }

    #[test]
    fn test_host_binary_path() {
        let stage = HostStage::new(
            Stage0Config::default(),
            PathBuf::from("/ws"),
            Duration::from_secs(1),
        );
        let expected = format!("quiche_self{}", std::env::consts::EXE_SUFFIX);
        assert_eq!(
            stage.host_binary_path(),
            PathBuf::from("/ws/target/debug").join(expected)
        );
    }

    #[cfg(unix)]
    mod build {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn host_stage(workspace: &std::path::Path, cargo_body: &str) -> HostStage {
            let cargo = workspace.join("fake-cargo");
            std::fs::write(&cargo, format!("#!/bin/sh\n{}\n", cargo_body)).unwrap();
            let mut perms = std::fs::metadata(&cargo).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&cargo, perms).unwrap();

            HostStage::new(
                Stage0Config::default(),
                workspace.to_path_buf(),
                Duration::from_secs(30),
            )
            .with_cargo(cargo)
        }

        #[tokio::test]
        async fn test_host_build_produces_binary() {
            let dir = tempfile::TempDir::new().unwrap();
            let stage = host_stage(
                dir.path(),
                "[ \"$3\" = -p ] && [ \"$4\" = quiche_self ] || exit 2\n\
                 mkdir -p target/debug && touch target/debug/quiche_self",
            );

            let ctx = stage
                .execute(BootstrapContext::new(BootstrapConfig::default()))
                .await
                .unwrap();
            assert_eq!(ctx.artifacts[0].stage, HOST_STAGE);
            assert_eq!(ctx.artifacts[0].binary, stage.host_binary_path());
        }

        #[tokio::test]
        async fn test_host_build_failure_is_fatal() {
            let dir = tempfile::TempDir::new().unwrap();
            let stage = host_stage(
                dir.path(),
                "echo 'could not compile quiche_self' >&2; exit 101",
            );

            let err = stage
                .execute(BootstrapContext::new(BootstrapConfig::default()))
                .await
                .unwrap_err();
            match err.downcast_ref::<BootstrapError>() {
                Some(BootstrapError::BuildFailure { code, stderr, .. }) => {
                    assert_eq!(*code, Some(101));
                    assert!(stderr.contains("could not compile quiche_self"));
                }
                other => panic!("expected BuildFailure, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_host_build_without_binary_fails() {
            let dir = tempfile::TempDir::new().unwrap();
            let stage = host_stage(dir.path(), "exit 0");

            let err = stage
                .execute(BootstrapContext::new(BootstrapConfig::default()))
                .await
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<BootstrapError>(),
                Some(BootstrapError::MissingBinary(_))
            ));
        }
    }
}
