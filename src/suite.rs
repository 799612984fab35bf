//! Suite runner
//!
//! Runs a batch of test files and reports one [`TestOutcome`] per file. A
//! failing file never halts the batch. Tests run one at a time by default;
//! with more than one job they run on scoped worker threads, and the report
//! still lists outcomes in input order. Tests that resolve to the same
//! workspace directory never run at the same time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

use crate::config::RunnerConfig;
use crate::error::{Error, FailureKind};
use crate::log::TestLog;
use crate::parse::parse_test_file;
use crate::pipeline::ExecutableTest;
use crate::templates::TemplateSet;
use crate::toolchain::Toolchain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
}

/// Result of one test file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub file: PathBuf,
    /// Test name; absent when the file did not parse
    pub name: Option<String>,
    pub status: TestStatus,
    /// `parse` or the pipeline stage that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Parser warnings
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_kept: Option<PathBuf>,
    /// sha256 of the verifier source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl TestOutcome {
    fn failed(file: &Path, stage: &str, error: &Error) -> Self {
        Self {
            file: file.to_path_buf(),
            name: None,
            status: TestStatus::Failed,
            stage: Some(stage.to_string()),
            kind: Some(error.kind()),
            message: Some(error_message(error)),
            diagnostics: Vec::new(),
            log_path: None,
            workspace_kept: None,
            digest: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    /// Human-readable report lines
    pub fn render(&self) -> String {
        let basename = self
            .file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.display().to_string());
        let dots = ".".repeat(10);
        let mut out = format!("Parsing {}{}", basename, dots);

        let Some(name) = &self.name else {
            out.push_str(&self.render_failure());
            return out;
        };
        out.push_str("DONE\n");
        for diagnostic in &self.diagnostics {
            out.push_str(diagnostic);
            out.push('\n');
        }
        out.push_str(&format!("Running {}{}", name, dots));
        if self.passed() {
            out.push_str("SUCCESS");
            if let Some(path) = &self.workspace_kept {
                out.push_str(&format!("\nWorkspace kept at {}", path.display()));
            }
        } else {
            out.push_str(&self.render_failure());
        }
        out
    }

    fn render_failure(&self) -> String {
        let message = self.message.as_deref().unwrap_or("");
        let log = self
            .log_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<not written>".to_string());
        let mut out = match self.kind {
            Some(FailureKind::UserMalformed) => format!(
                "FAILED!\nTest is malformed. This is a user error:\n{}\nSee log file {}",
                message, log
            ),
            Some(FailureKind::TestFailure) => {
                format!("FAILED!\n{}\nSee log file {}", message, log)
            }
            _ => format!(
                "FAILED!\nSoftware Error. Please report:\n{}\nInclude log file {}",
                message, log
            ),
        };
        if let Some(path) = &self.workspace_kept {
            out.push_str(&format!("\nWorkspace kept at {}", path.display()));
        }
        out
    }
}

/// Message without the classification prefix the `Display` impl adds
fn error_message(error: &Error) -> String {
    match error {
        Error::UserMalformed(msg) | Error::DevMalformed(msg) | Error::TestFailure(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Outcomes of a whole batch
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<TestOutcome>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    /// Report in the format of the interactive runner
    pub fn render(&self) -> String {
        let rule = "=".repeat(20);
        let mut out = String::new();
        for outcome in &self.outcomes {
            out.push_str(&rule);
            out.push('\n');
            out.push_str(&outcome.render());
            out.push('\n');
        }
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!(
            "{} passed, {} failed\n",
            self.passed(),
            self.failed()
        ));
        out
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Workspace directories currently held by a running test
#[derive(Debug, Default)]
struct WorkspaceLeases {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

impl WorkspaceLeases {
    /// Block until no other test holds `path`, then hold it.
    fn acquire(&self, path: &Path) -> WorkspaceLease<'_> {
        let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(&key) {
            tracing::debug!(workspace = %key.display(), "waiting for workspace");
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.clone());
        WorkspaceLease { leases: self, key }
    }
}

struct WorkspaceLease<'a> {
    leases: &'a WorkspaceLeases,
    key: PathBuf,
}

impl Drop for WorkspaceLease<'_> {
    fn drop(&mut self) {
        self.leases
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        self.leases.released.notify_all();
    }
}

/// Runs test files with shared configuration and collaborators
pub struct SuiteRunner<'a> {
    config: &'a RunnerConfig,
    templates: &'a TemplateSet,
    toolchain: &'a dyn Toolchain,
    leases: WorkspaceLeases,
}

impl<'a> SuiteRunner<'a> {
    pub fn new(config: &'a RunnerConfig, templates: &'a TemplateSet, toolchain: &'a dyn Toolchain) -> Self {
        Self {
            config,
            templates,
            toolchain,
            leases: WorkspaceLeases::default(),
        }
    }

    /// Parse and run one test file.
    pub fn run_file(&self, path: &Path) -> TestOutcome {
        let mut log = TestLog::for_test_file(path);
        log.stage(&format!("Parsing {}", path.display()));

        let parsed = match parse_test_file(path) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(file = %path.display(), error = %error, "parse failed");
                log.write(&format!("{}: {}", error.kind(), error));
                let mut outcome = TestOutcome::failed(path, "parse", &error);
                outcome.log_path = persist_log(&log);
                return outcome;
            }
        };

        let diagnostics: Vec<String> = parsed.diagnostics.iter().map(|d| d.to_string()).collect();
        for diagnostic in &diagnostics {
            tracing::warn!(file = %path.display(), "{}", diagnostic);
            log.write(diagnostic);
        }

        let test = ExecutableTest::new(parsed.spec, self.config, self.templates, self.toolchain);
        let name = test.spec().name.clone();

        let lease = self.leases.acquire(&test.spec().workspace_path());
        let result = test.run(&mut log);
        drop(lease);

        match result {
            Ok(report) => {
                tracing::info!(test = %name, "passed");
                let log_path = if self.config.save_log {
                    persist_log(&log)
                } else {
                    None
                };
                TestOutcome {
                    file: path.to_path_buf(),
                    name: Some(name),
                    status: TestStatus::Passed,
                    stage: None,
                    kind: None,
                    message: None,
                    diagnostics,
                    log_path,
                    workspace_kept: report.workspace_kept,
                    digest: Some(report.digest),
                }
            }
            Err(failure) => {
                tracing::warn!(test = %name, kind = %failure.error.kind(), stage = %failure.stage, "failed");
                let mut outcome = TestOutcome::failed(path, failure.stage.name(), &failure.error);
                outcome.name = Some(name);
                outcome.diagnostics = diagnostics;
                outcome.log_path = persist_log(&log);
                outcome.workspace_kept = failure.workspace_kept;
                outcome
            }
        }
    }

    /// Run every file; outcomes come back in input order.
    pub fn run(&self, files: &[PathBuf]) -> SuiteReport {
        let started_at = Utc::now();
        let jobs = self.config.jobs.clamp(1, files.len().max(1));

        let outcomes = if jobs == 1 {
            files.iter().map(|file| self.run_file(file)).collect()
        } else {
            self.run_concurrently(files, jobs)
        };

        SuiteReport {
            started_at,
            outcomes,
        }
    }

    fn run_concurrently(&self, files: &[PathBuf], jobs: usize) -> Vec<TestOutcome> {
        let next = AtomicUsize::new(0);
        let mut slots: Vec<Option<TestOutcome>> = vec![None; files.len()];

        let finished: Vec<(usize, TestOutcome)> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..jobs)
                .map(|_| {
                    scope.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let idx = next.fetch_add(1, Ordering::Relaxed);
                            let Some(file) = files.get(idx) else {
                                break;
                            };
                            done.push((idx, self.run_file(file)));
                        }
                        done
                    })
                })
                .collect();

            workers
                .into_iter()
                .flat_map(|worker| match worker.join() {
                    Ok(done) => done,
                    Err(_) => {
                        tracing::error!("test worker panicked");
                        Vec::new()
                    }
                })
                .collect()
        });

        for (idx, outcome) in finished {
            slots[idx] = Some(outcome);
        }
        slots
            .into_iter()
            .zip(files)
            .map(|(slot, file)| {
                slot.unwrap_or_else(|| {
                    TestOutcome::failed(file, "run", &Error::DevMalformed("test worker panicked".into()))
                })
            })
            .collect()
    }
}

fn persist_log(log: &TestLog) -> Option<PathBuf> {
    match log.persist() {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!(error = %e, "log not written");
            None
        }
    }
}
