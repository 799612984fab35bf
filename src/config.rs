//! Runner configuration
//!
//! Loaded from an optional YAML file (`--config`), then overridden by CLI
//! flags. The resulting [`RunnerConfig`] is passed explicitly into the suite
//! and every pipeline; there is no process-wide configuration state.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// When a test's workspace survives teardown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Retention {
    /// Always delete the workspace
    #[default]
    Never,
    /// Keep the workspace of failed tests
    OnFailure,
    /// Keep every workspace
    Always,
}

impl Retention {
    /// Whether a workspace is kept for a test that `passed` or not
    pub fn keeps(self, passed: bool) -> bool {
        match self {
            Retention::Never => false,
            Retention::OnFailure => !passed,
            Retention::Always => true,
        }
    }
}

/// Configuration shared by every test of a suite run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunnerConfig {
    /// Directory with template overrides (`generator.cpp.jinja`,
    /// `verifier.cpp.jinja`, `Makefile.jinja`)
    #[serde(default)]
    pub resources_dir: Option<PathBuf>,

    /// LoopChainIR checkout the generated Makefile points back to
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// Workspace retention policy
    #[serde(default)]
    pub retention: Retention,

    /// Persist the log of passing tests too
    #[serde(default)]
    pub save_log: bool,

    /// Build collaborator invoked as `<build_tool> <target>` in the workspace
    #[serde(default = "default_build_tool")]
    pub build_tool: String,

    /// Tests run concurrently
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_build_tool() -> String {
    "make".to_string()
}

fn default_jobs() -> usize {
    1
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            resources_dir: None,
            project_root: default_project_root(),
            retention: Retention::default(),
            save_log: false,
            build_tool: default_build_tool(),
            jobs: default_jobs(),
        }
    }
}

impl RunnerConfig {
    /// Load from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        Self::from_yaml(&content)
            .map_err(|e| Error::Other(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: RunnerConfig = serde_norway::from_str(content)?;
        if config.jobs == 0 {
            return Err(Error::Other("jobs must be at least 1".into()));
        }
        if config.build_tool.trim().is_empty() {
            return Err(Error::Other("build_tool must not be empty".into()));
        }
        Ok(config)
    }

    /// JSON schema of the config file
    pub fn schema_json() -> Result<String> {
        let schema = schemars::schema_for!(RunnerConfig);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}
