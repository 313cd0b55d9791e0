//! Shadow stage - scans the newest generated tree for shadowed `let mut` bindings.

use anyhow::{Context as AnyhowContext, Result};
use tracing::{info, warn};

use crate::config::BootstrapConfig;
use crate::pipeline::types::{BootstrapContext, PipelineStage};
use crate::shadow::scan_tree;

pub struct ShadowStage {
    pub(crate) extension: String,
}

impl ShadowStage {
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
impl PipelineStage for ShadowStage {
    fn name(&self) -> &str {
        "shadow"
    }

    async fn execute(&self, mut ctx: BootstrapContext) -> Result<BootstrapContext> {
        let tree = ctx.latest_tree().context("No generated tree to scan")?;
        let findings = scan_tree(&tree.root, &self.extension)?;

        if findings.is_empty() {
            info!("No shadowed bindings in {}", tree.stage);
        } else {
            for finding in &findings {
                warn!("{}", finding);
            }
        }

        ctx.shadow_findings = findings;
        Ok(ctx)
    }
}
