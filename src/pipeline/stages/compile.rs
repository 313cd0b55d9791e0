//! Compile stage - turns a generated tree into the next stage binary.

use anyhow::{Context as AnyhowContext, Result};
use std::time::Duration;
use tracing::info;

use crate::config::BootstrapConfig;
use crate::pipeline::types::{BootstrapContext, PipelineStage, StageArtifact, ValidationResult};
use crate::project::ProjectBuilder;

/// Compile stage - materializes `bootstrap_stage<g>` and builds it with cargo
pub struct CompileStage {
    pub(crate) name: String,
    pub(crate) stage: String,
    pub(crate) builder: ProjectBuilder,
}

impl CompileStage {
    pub fn new(generation: usize, builder: ProjectBuilder) -> Self {
        Self {
            name: format!("compile stage{}", generation),
            stage: format!("stage{}", generation),
            builder,
        }
    }

    pub fn from_config(generation: usize, config: &BootstrapConfig) -> Self {
        let builder = ProjectBuilder::new(
            config.manifest.clone(),
            config.project.output_root.clone(),
            config.wrapper_path(),
            Duration::from_secs(config.pipeline.build_timeout_secs),
        );
        Self::new(generation, builder)
    }
}

#[async_trait::async_trait]
impl PipelineStage for CompileStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, mut ctx: BootstrapContext) -> Result<BootstrapContext> {
        let tree = ctx
            .latest_tree()
            .context("No generated tree to compile")?;

        let handle = self.builder.materialize(&self.stage, tree)?;
        let binary = self.builder.build(&handle).await?;
        info!("{} binary: {}", self.stage, binary.display());

        ctx.artifacts.push(StageArtifact {
            stage: self.stage.clone(),
            binary,
        });
        Ok(ctx)
    }

    fn validate(&self, ctx: &BootstrapContext) -> Result<ValidationResult> {
        Ok(match ctx.latest_artifact() {
            Some(artifact) if artifact.stage == self.stage && artifact.binary.is_file() => {
                ValidationResult::pass(self.name(), format!("{}", artifact.binary.display()))
            }
            _ => ValidationResult::fail(self.name(), format!("no {} binary produced", self.stage)),
        })
    }
}
