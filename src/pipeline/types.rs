//! Pipeline types and trait definitions.

use crate::compare::ComparisonResult;
use crate::config::BootstrapConfig;
use crate::runner::GeneratedTree;
use crate::shadow::ShadowFinding;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A stage binary; stage 0 is host-built, later ones come from generated trees
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageArtifact {
    pub stage: String,
    pub binary: PathBuf,
}

/// Wall-clock time spent in one pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub millis: u128,
}

/// Context passed between pipeline stages
#[derive(Debug, Clone)]
pub struct BootstrapContext {
    /// Resolved configuration for this run
    pub config: BootstrapConfig,

    /// Stage binaries in the order they were produced
    pub artifacts: Vec<StageArtifact>,

    /// Generated trees in generation order
    pub trees: Vec<GeneratedTree>,

    /// One comparison per consecutive pair of trees
    pub comparisons: Vec<ComparisonResult>,

    pub shadow_findings: Vec<ShadowFinding>,

    pub validation_results: Vec<ValidationResult>,

    pub timings: Vec<StageTiming>,
}

impl BootstrapContext {
    pub fn new(config: BootstrapConfig) -> Self {
        Self {
            config,
            artifacts: Vec::new(),
            trees: Vec::new(),
            comparisons: Vec::new(),
            shadow_findings: Vec::new(),
            validation_results: Vec::new(),
            timings: Vec::new(),
        }
    }

    pub fn latest_artifact(&self) -> Option<&StageArtifact> {
        self.artifacts.last()
    }

    pub fn latest_tree(&self) -> Option<&GeneratedTree> {
        self.trees.last()
    }

    pub fn verdict(&self) -> Verdict {
        if self.comparisons.is_empty() {
            return Verdict::Incomplete;
        }
        if self.comparisons.iter().any(|c| !c.is_fixed_point()) {
            return Verdict::Diverged;
        }
        if self.config.pipeline.fail_on_shadow && !self.shadow_findings.is_empty() {
            return Verdict::ShadowViolation;
        }
        Verdict::FixedPoint
    }

    /// Get final output artifacts
    pub fn output(&self) -> BootstrapOutput {
        BootstrapOutput {
            verdict: self.verdict(),
            output_root: self.config.project.output_root.clone(),
            artifacts: self.artifacts.clone(),
            trees: self
                .trees
                .iter()
                .map(|t| TreeSummary {
                    stage: t.stage.clone(),
                    root: t.root.clone(),
                    files: t.len(),
                })
                .collect(),
            comparisons: self.comparisons.clone(),
            shadow_findings: self.shadow_findings.clone(),
            validations: self.validation_results.clone(),
            timings: self.timings.clone(),
        }
    }
}

/// Outcome of a bootstrap run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every consecutive pair of generations is equivalent
    FixedPoint,
    /// At least one file is missing or mismatched
    Diverged,
    /// Trees agree, but shadowing was found and the policy makes it fatal
    ShadowViolation,
    /// Fewer than two trees were compared
    Incomplete,
}

impl Verdict {
    pub fn passed(self) -> bool {
        self == Verdict::FixedPoint
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::FixedPoint => "fixed point verified",
            Verdict::Diverged => "generations diverged",
            Verdict::ShadowViolation => "shadowed bindings found",
            Verdict::Incomplete => "incomplete",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSummary {
    pub stage: String,
    pub root: PathBuf,
    pub files: usize,
}

/// Validation result from a pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub stage: String,
    pub passed: bool,
    pub message: String,
}

impl ValidationResult {
    pub fn pass(stage: &str, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(stage: &str, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            passed: false,
            message: message.into(),
        }
    }
}

/// Final output from the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapOutput {
    pub verdict: Verdict,
    pub output_root: PathBuf,
    pub artifacts: Vec<StageArtifact>,
    pub trees: Vec<TreeSummary>,
    pub comparisons: Vec<ComparisonResult>,
    pub shadow_findings: Vec<ShadowFinding>,
    pub validations: Vec<ValidationResult>,
    pub timings: Vec<StageTiming>,
}

/// Trait for pipeline stages
#[async_trait::async_trait]
pub trait PipelineStage: Send + Sync {
    /// Name of this stage
    fn name(&self) -> &str;

    /// Execute this stage
    async fn execute(&self, ctx: BootstrapContext) -> Result<BootstrapContext>;

    /// Validate the output of this stage
    fn validate(&self, _ctx: &BootstrapContext) -> Result<ValidationResult> {
        Ok(ValidationResult::pass(self.name(), "No validation configured"))
    }
}
