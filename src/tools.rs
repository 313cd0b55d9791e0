//! External process plumbing: the stage binaries and cargo.
//!
//! Every invocation runs under a timeout and is killed when it expires.

use crate::error::BootstrapError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Detected tool information
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub version: Option<String>,
    pub path: PathBuf,
}

/// Locate a tool on `PATH` and probe its version
pub fn detect_tool(name: &str) -> Option<ToolInfo> {
    debug!("Checking for tool: {}", name);

    let path = match which::which(name) {
        Ok(p) => p,
        Err(_) => {
            debug!("Tool '{}' not found in PATH", name);
            return None;
        }
    };

    let version = get_tool_version(&path);
    debug!(
        "Found tool '{}' at '{}' (version: {:?})",
        name,
        path.display(),
        version
    );

    Some(ToolInfo {
        name: name.to_string(),
        version,
        path,
    })
}

/// Get tool version by running --version
fn get_tool_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("--version")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    // "cargo 1.80.0 (376290515 2024-07-16)" -> "1.80.0"
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().next()?;
    line.split_whitespace().nth(1).map(|v| v.to_string())
}

/// Captured result of a finished process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// A single process invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            working_dir: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Human-readable command line, used in errors and logs
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Run to completion, capturing stdout and stderr.
    ///
    /// A non-zero exit is returned as a normal [`ProcessOutput`]; only spawn
    /// failures and timeouts are errors.
    pub async fn output(&self) -> Result<ProcessOutput, BootstrapError> {
        debug!("Running: {}", self.display());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| BootstrapError::Spawn {
            command: self.display(),
            source,
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ProcessOutput {
                code: output.status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
            }),
            Ok(Err(source)) => Err(BootstrapError::Spawn {
                command: self.display(),
                source,
            }),
            Err(_) => Err(BootstrapError::Timeout {
                command: self.display(),
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display() {
        let inv = Invocation::new("cargo", Duration::from_secs(5))
            .arg("build")
            .args(["--quiet", "--features", "bootstrap"]);
        assert_eq!(inv.display(), "cargo build --quiet --features bootstrap");
    }

    #[test]
    fn test_detect_missing_tool() {
        assert!(detect_tool("definitely-not-a-real-tool-bootcheck").is_none());
    }

    #[test]
    fn test_process_output_success() {
        let out = ProcessOutput {
            code: Some(0),
            stdout: b"fn main() {}".to_vec(),
            stderr: vec![],
        };
        assert!(out.success());
        assert_eq!(out.stdout_lossy(), "fn main() {}");

        let failed = ProcessOutput {
            code: None,
            ..out
        };
        assert!(!failed.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_captures_streams_and_exit_code() {
        let out = Invocation::new("sh", Duration::from_secs(10))
            .args(["-c", "echo out; echo err >&2; exit 3"])
            .output()
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout_lossy().trim(), "out");
        assert_eq!(out.stderr_lossy().trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_passes_env_and_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = Invocation::new("sh", Duration::from_secs(10))
            .args(["-c", "echo $BOOTCHECK_TEST_STAGE; pwd"])
            .env("BOOTCHECK_TEST_STAGE", "stage7")
            .current_dir(dir.path())
            .output()
            .await
            .unwrap();
        let stdout = out.stdout_lossy();
        assert!(stdout.starts_with("stage7"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_times_out() {
        let err = Invocation::new("sh", Duration::from_millis(200))
            .args(["-c", "sleep 5"])
            .output()
            .await
            .unwrap_err();
        match err {
            BootstrapError::Timeout { timeout, .. } => {
                assert_eq!(timeout, Duration::from_millis(200))
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let err = Invocation::new("/nonexistent/stage-binary", Duration::from_secs(1))
            .output()
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Spawn { .. }));
    }
}
