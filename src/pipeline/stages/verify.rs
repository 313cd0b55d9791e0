//! Verify stage - compares consecutive generations.

use anyhow::Result;
use tracing::{info, warn};

use crate::compare::compare_trees;
use crate::config::BootstrapConfig;
use crate::pipeline::types::{BootstrapContext, PipelineStage, ValidationResult};

pub struct VerifyStage {
    pub(crate) extension: String,
}

impl VerifyStage {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &BootstrapConfig) -> Self {
        Self::new(config.layout.generated_extension.clone())
    }
}

#[async_trait::async_trait]
impl PipelineStage for VerifyStage {
    fn name(&self) -> &str {
        "verify"
    }

    async fn execute(&self, mut ctx: BootstrapContext) -> Result<BootstrapContext> {
        let mut comparisons = Vec::new();
        for pair in ctx.trees.windows(2) {
            let (older, newer) = (&pair[0], &pair[1]);
            info!("Comparing {} against {}", older.stage, newer.stage);

            let result = compare_trees(&older.root, &newer.root, &self.extension)?;
            if result.is_fixed_point() {
                info!("{} == {} ({} files)", older.stage, newer.stage, result.matched.len());
            } else {
                warn!(
                    "{} and {} differ in {} files",
                    older.stage,
                    newer.stage,
                    result.entries.len()
                );
            }
            comparisons.push(result);
        }
        ctx.comparisons = comparisons;
        Ok(ctx)
    }

    /// Divergence is a verdict, not a stage failure; only the comparison count is checked
    fn validate(&self, ctx: &BootstrapContext) -> Result<ValidationResult> {
        let expected = ctx.trees.len().saturating_sub(1);
        Ok(if expected > 0 && ctx.comparisons.len() == expected {
            let diverged = ctx.comparisons.iter().filter(|c| !c.is_fixed_point()).count();
            ValidationResult::pass(
                self.name(),
                format!("{} comparisons, {} diverged", expected, diverged),
            )
        } else {
            ValidationResult::fail(
                self.name(),
                format!("need at least two generated trees, found {}", ctx.trees.len()),
            )
        })
    }
}
