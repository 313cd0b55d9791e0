//! Transpile stage - runs the previous stage's binary over the translator sources.

use anyhow::{Context as AnyhowContext, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::config::BootstrapConfig;
use crate::modules::ModuleLayout;
use crate::pipeline::types::{BootstrapContext, PipelineStage, ValidationResult};
use crate::runner::StageRunner;

/// Transpile stage - produces generation `g`'s tree
pub struct TranspileStage {
    pub(crate) name: String,
    pub(crate) stage: String,
    pub(crate) runner: StageRunner,
    pub(crate) source_root: PathBuf,
    pub(crate) output_dir: PathBuf,
}

impl TranspileStage {
    pub fn new(
        generation: usize,
        runner: StageRunner,
        source_root: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            name: format!("transpile stage{}", generation),
            stage: format!("stage{}", generation),
            runner,
            source_root,
            output_dir,
        }
    }

    pub fn from_config(generation: usize, config: &BootstrapConfig) -> Self {
        let runner = StageRunner::new(
            ModuleLayout::new(config.layout.clone()),
            config.pipeline.effective_jobs(),
            Duration::from_secs(config.pipeline.transpile_timeout_secs),
        )
        .with_extra_args(config.pipeline.extra_args.clone());

        Self::new(
            generation,
            runner,
            config.project.translator_src.clone(),
            config.stage_output_dir(generation),
        )
    }
}

#[async_trait::async_trait]
impl PipelineStage for TranspileStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, mut ctx: BootstrapContext) -> Result<BootstrapContext> {
        let artifact = ctx
            .latest_artifact()
            .cloned()
            .context("No stage binary available to transpile with")?;

        info!(
            "Transpiling {} with {} binary",
            self.source_root.display(),
            artifact.stage
        );

        let tree = self
            .runner
            .run(
                &self.stage,
                &artifact.binary,
                &self.source_root,
                &self.output_dir,
            )
            .await?;

        info!("{} files written to {}", tree.len(), tree.root.display());
        ctx.trees.push(tree);
        Ok(ctx)
    }

    fn validate(&self, ctx: &BootstrapContext) -> Result<ValidationResult> {
        Ok(match ctx.latest_tree() {
            Some(tree) if tree.root == self.output_dir && !tree.is_empty() => {
                ValidationResult::pass(self.name(), format!("{} modules", tree.len()))
            }
            Some(tree) if tree.root == self.output_dir => ValidationResult::fail(
                self.name(),
                format!("no source modules found under {}", self.source_root.display()),
            ),
            _ => ValidationResult::fail(self.name(), "generated tree was not recorded"),
        })
    }
}
