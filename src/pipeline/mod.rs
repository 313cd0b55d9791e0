//! Bootstrap orchestration.
//!
//! The pipeline drives one full bootstrap cycle:
//! 1. Host - obtains the stage 0 binary
//! 2. Transpile - runs the latest binary over the translator sources
//! 3. Compile - builds the next binary from a generated tree
//! 4. Verify - compares consecutive generated trees
//! 5. Shadow - scans the newest tree for shadowed bindings
//!
//! Transpile and compile alternate once per generation.

mod execution;
mod stages;
mod types;

pub use types::{
    BootstrapContext, BootstrapOutput, PipelineStage, StageArtifact, StageTiming, TreeSummary,
    ValidationResult, Verdict,
};

pub use execution::BootstrapPipeline;

pub use stages::{CompileStage, HostStage, ShadowStage, TranspileStage, VerifyStage, HOST_STAGE};
