//! Build collaborator and process execution
//!
//! The pipeline only needs two operations from the outside world: build a
//! named target inside the workspace, and run an executable the build left
//! there. [`MakeToolchain`] does both with `std::process::Command`, always
//! with the workspace as working directory.

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

/// Captured result of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code as text, `signal` when there is none
    pub fn code_text(&self) -> String {
        self.code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string())
    }
}

impl From<std::process::Output> for ProcessOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Builds targets and runs executables inside a workspace
pub trait Toolchain: Send + Sync {
    /// Build `target`; binaries land in the workspace root.
    fn build(&self, workspace: &Path, target: &str) -> Result<ProcessOutput>;

    /// Run the executable `name` from the workspace root.
    fn run(&self, workspace: &Path, name: &str) -> Result<ProcessOutput>;
}

/// `make <target>` in the workspace
#[derive(Debug, Clone)]
pub struct MakeToolchain {
    program: String,
}

impl MakeToolchain {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for MakeToolchain {
    fn default() -> Self {
        Self::new("make")
    }
}

impl Toolchain for MakeToolchain {
    fn build(&self, workspace: &Path, target: &str) -> Result<ProcessOutput> {
        tracing::debug!(program = %self.program, target, "building");
        let output = Command::new(&self.program)
            .arg(target)
            .current_dir(workspace)
            .output()
            .map_err(|e| {
                Error::DevMalformed(format!("failed to invoke {} {}: {}", self.program, target, e))
            })?;
        Ok(output.into())
    }

    fn run(&self, workspace: &Path, name: &str) -> Result<ProcessOutput> {
        let executable = workspace.join(name);
        tracing::debug!(executable = %executable.display(), "running");
        let output = Command::new(&executable)
            .current_dir(workspace)
            .output()
            .map_err(|e| {
                Error::DevMalformed(format!("failed to execute {}: {}", executable.display(), e))
            })?;
        Ok(output.into())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_build_runs_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        // `sh <target>` stands in for the build tool
        std::fs::write(dir.path().join("hello"), "pwd; echo built >&2").unwrap();

        let output = MakeToolchain::new("sh").build(dir.path(), "hello").unwrap();
        assert!(output.success());
        let cwd = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(output.stdout.trim(), cwd.display().to_string());
        assert_eq!(output.stderr.trim(), "built");
    }

    #[test]
    fn test_nonzero_exit_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fail"), "echo nope; exit 3").unwrap();

        let output = MakeToolchain::new("sh").build(dir.path(), "fail").unwrap();
        assert!(!output.success());
        assert_eq!(output.code, Some(3));
        assert_eq!(output.code_text(), "3");
    }

    #[test]
    fn test_missing_program_is_dev_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let err = MakeToolchain::new("/nonexistent/make")
            .build(dir.path(), "all")
            .unwrap_err();
        assert!(matches!(err, Error::DevMalformed(_)));
    }
}
