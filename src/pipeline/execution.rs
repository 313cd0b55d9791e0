//! Pipeline execution engine.

use anyhow::{Context as AnyhowContext, Result};
use std::time::Instant;
use tracing::{debug, info};

use super::stages::{CompileStage, HostStage, ShadowStage, TranspileStage, VerifyStage};
use super::types::{BootstrapContext, BootstrapOutput, PipelineStage, StageTiming};
use crate::config::BootstrapConfig;

/// Ordered bootstrap stages sharing one context
pub struct BootstrapPipeline {
    pub(crate) config: BootstrapConfig,
    pub(crate) stages: Vec<Box<dyn PipelineStage>>,
}

impl BootstrapPipeline {
    pub fn new(config: BootstrapConfig) -> Self {
        Self {
            config,
            stages: Vec::new(),
        }
    }

    /// Add a stage to the pipeline
    pub fn add_stage(mut self, stage: Box<dyn PipelineStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Host build, then transpile/compile per generation, then verify and scan.
    ///
    /// `config` should already be resolved against the workspace root.
    pub fn standard(config: &BootstrapConfig) -> Self {
        let generations = config.pipeline.effective_generations();
        let mut pipeline =
            Self::new(config.clone()).add_stage(Box::new(HostStage::from_config(config)));

        for generation in 1..=generations {
            pipeline =
                pipeline.add_stage(Box::new(TranspileStage::from_config(generation, config)));
            if generation < generations {
                pipeline =
                    pipeline.add_stage(Box::new(CompileStage::from_config(generation, config)));
            }
        }

        pipeline
            .add_stage(Box::new(VerifyStage::from_config(config)))
            .add_stage(Box::new(ShadowStage::from_config(config)))
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order; the first failure halts the run
    pub async fn run(&self) -> Result<BootstrapOutput> {
        info!("Starting bootstrap with {} stages", self.stages.len());

        let mut ctx = BootstrapContext::new(self.config.clone());

        for (idx, stage) in self.stages.iter().enumerate() {
            info!(
                "Running stage {}/{}: {}",
                idx + 1,
                self.stages.len(),
                stage.name()
            );

            let started = Instant::now();
            ctx = stage
                .execute(ctx)
                .await
                .with_context(|| format!("Stage '{}' failed", stage.name()))?;

            debug!("Validating stage: {}", stage.name());
            let validation_result = stage.validate(&ctx)?;
            ctx.validation_results.push(validation_result.clone());
            ctx.timings.push(StageTiming {
                stage: stage.name().to_string(),
                millis: started.elapsed().as_millis(),
            });

            if !validation_result.passed {
                anyhow::bail!(
                    "Validation failed for stage '{}': {}",
                    stage.name(),
                    validation_result.message
                );
            }
        }

        let output = ctx.output();
        info!("Bootstrap completed: {}", output.verdict);
        Ok(output)
    }
}
