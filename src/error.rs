//! Bootstrap error taxonomy
//!
//! Every variant here is fatal for a bootstrap run. A failed comparison is
//! not an error: it is a non-empty [`crate::compare::ComparisonResult`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal failures raised while running or building a stage
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(
        "transpiling {} failed (exit code: {code:?})\nstdout:\n{stdout}\nstderr:\n{stderr}",
        .module.display()
    )]
    TranspileFailure {
        module: PathBuf,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("cargo build failed for {} (exit code: {code:?}):\n{stderr}", .project.display())]
    BuildFailure {
        project: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("expected stage binary at {} but it does not exist", .0.display())]
    MissingBinary(PathBuf),

    #[error("stage binary produced non-UTF-8 output for {}", .module.display())]
    InvalidOutput { module: PathBuf },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BootstrapError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
