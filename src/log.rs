//! Per-test log
//!
//! Every stage of a test writes into its [`TestLog`]: stage headers, rendered
//! sources, process output and the failure message. The log is held in
//! memory and persisted next to the test file when the test fails (or always,
//! with `--save-log`).

use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct TestLog {
    path: PathBuf,
    text: String,
}

impl TestLog {
    /// Log for the test file at `test_file`, persisted to `<dir>/<basename>.log`
    pub fn for_test_file(test_file: &Path) -> Self {
        let mut log = Self {
            path: log_path(test_file),
            text: String::new(),
        };
        log.write(&format!(
            "chain-regress log for {} started {}",
            test_file.display(),
            Utc::now().to_rfc3339()
        ));
        log
    }

    /// Append one entry
    pub fn write(&mut self, entry: &str) {
        self.text.push_str(entry);
        if !entry.ends_with('\n') {
            self.text.push('\n');
        }
    }

    /// Append a stage header, e.g. `[Building chain_generator]`
    pub fn stage(&mut self, header: &str) {
        tracing::debug!(stage = header, "stage");
        self.write(&format!("[{}]", header));
    }

    /// Append a labelled block of text such as a source file or process output
    pub fn block(&mut self, label: &str, body: &str) {
        self.write(&format!("{}:", label));
        if body.is_empty() {
            self.write("<empty>");
        } else {
            self.write(body);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Write the log to its file
    pub fn persist(&self) -> Result<PathBuf> {
        std::fs::write(&self.path, &self.text).map_err(|e| {
            Error::DevMalformed(format!("cannot write log {}: {}", self.path.display(), e))
        })?;
        Ok(self.path.clone())
    }
}

/// `<dir>/<basename>.log` for a test file
pub fn log_path(test_file: &Path) -> PathBuf {
    let stem = test_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "test".to_string());
    test_file.with_file_name(format!("{}.log", stem))
}
