// Library exports for bootstrap fixed-point verification
pub mod compare;
pub mod config;
pub mod error;
pub mod modules;
pub mod pipeline;
pub mod project;
pub mod report;
pub mod runner;
pub mod shadow;
pub mod tools;

// Re-export key types for convenience
pub use compare::{compare_trees, ComparisonResult, DiffEntry, DiffKind};
pub use config::BootstrapConfig;
pub use error::BootstrapError;
pub use modules::{ModuleLayout, ModuleRegistry, SourceModule};
pub use pipeline::{BootstrapOutput, BootstrapPipeline, PipelineStage, Verdict};
pub use report::{BootstrapReport, ReportFormat};
pub use runner::{GeneratedTree, StageRunner};
pub use shadow::{scan_tree, ShadowFinding};
