//! One test, run end to end
//!
//! ```text
//! setup → path-fixup → emit generators → build generators → run generators
//!       → assemble verifier → build verifier → run verifier → teardown
//! ```
//!
//! Stages run strictly in order and stop at the first error. Build failures
//! are dev-malformed, non-zero exits of built programs are test failures.
//! Every error is written into the test log before it leaves the pipeline,
//! and the workspace is torn down on every path unless retention keeps it.

use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::config::RunnerConfig;
use crate::error::{Error, Result};
use crate::generator::{self, GeneratorKind, VERIFIER_TARGET};
use crate::log::TestLog;
use crate::spec::TestSpec;
use crate::symbols::SymbolBindings;
use crate::templates::TemplateSet;
use crate::toolchain::{ProcessOutput, Toolchain};
use crate::transform::VerifierProgram;
use crate::workspace::{relative_path, Workspace};

/// Source file of the verifier inside the workspace
pub const VERIFIER_SOURCE: &str = "verifier.cpp";

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    PathFixup,
    EmitGenerators,
    BuildGenerators,
    RunGenerators,
    AssembleVerifier,
    BuildVerifier,
    RunVerifier,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::PathFixup => "path-fixup",
            Stage::EmitGenerators => "emit-generators",
            Stage::BuildGenerators => "build-generators",
            Stage::RunGenerators => "run-generators",
            Stage::AssembleVerifier => "assemble-verifier",
            Stage::BuildVerifier => "build-verifier",
            Stage::RunVerifier => "run-verifier",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A passed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// sha256 of the verifier source
    pub digest: String,
    pub workspace_kept: Option<PathBuf>,
}

/// A failed run
#[derive(Debug)]
pub struct RunFailure {
    pub error: Error,
    /// Stage the error came from
    pub stage: Stage,
    pub workspace_kept: Option<PathBuf>,
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// A parsed test bound to the collaborators that run it
pub struct ExecutableTest<'a> {
    spec: TestSpec,
    bindings: SymbolBindings,
    config: &'a RunnerConfig,
    templates: &'a TemplateSet,
    toolchain: &'a dyn Toolchain,
}

impl<'a> ExecutableTest<'a> {
    pub fn new(
        spec: TestSpec,
        config: &'a RunnerConfig,
        templates: &'a TemplateSet,
        toolchain: &'a dyn Toolchain,
    ) -> Self {
        let bindings = SymbolBindings::for_test(&spec);
        Self {
            spec,
            bindings,
            config,
            templates,
            toolchain,
        }
    }

    pub fn spec(&self) -> &TestSpec {
        &self.spec
    }

    /// Run every stage, then tear down.
    pub fn run(&self, log: &mut TestLog) -> std::result::Result<RunReport, RunFailure> {
        log.write(&self.spec.to_string());
        tracing::info!(test = %self.spec.name, "running");

        log.stage("Setting up workspace");
        let workspace = match Workspace::create(self.spec.workspace_path(), self.config.retention) {
            Ok(workspace) => workspace,
            Err(error) => {
                log.write(&format!("{}: {}", error.kind(), error));
                return Err(RunFailure {
                    error,
                    stage: Stage::Setup,
                    workspace_kept: None,
                });
            }
        };

        let mut stage = Stage::Setup;
        let result = self.execute(&workspace, log, &mut stage);
        if let Err(error) = &result {
            log.write(&format!("{} during {}: {}", error.kind(), stage, error));
        }

        log.stage("Tearing down workspace");
        let workspace_kept = match workspace.finish(result.is_ok()) {
            Ok(kept) => kept,
            Err(e) => {
                tracing::warn!(test = %self.spec.name, error = %e, "teardown failed");
                log.write(&e.to_string());
                None
            }
        };
        if let Some(path) = &workspace_kept {
            log.write(&format!("workspace kept at {}", path.display()));
        }

        match result {
            Ok(digest) => Ok(RunReport {
                digest,
                workspace_kept,
            }),
            Err(error) => Err(RunFailure {
                error,
                stage,
                workspace_kept,
            }),
        }
    }

    fn execute(&self, workspace: &Workspace, log: &mut TestLog, stage: &mut Stage) -> Result<String> {
        *stage = Stage::PathFixup;
        self.fixup_makefile(workspace, log)?;

        *stage = Stage::EmitGenerators;
        log.stage("Emitting generators");
        generator::write_generators(workspace, self.templates, &self.spec, &self.bindings)?;
        for kind in GeneratorKind::ALL {
            log.block(&kind.source_file(), &workspace.read(&kind.source_file())?);
        }

        *stage = Stage::BuildGenerators;
        for kind in GeneratorKind::ALL {
            self.build(workspace, kind.target(), log)?;
        }

        *stage = Stage::RunGenerators;
        for kind in GeneratorKind::ALL {
            self.run_program(workspace, kind.target(), log)?;
        }

        *stage = Stage::AssembleVerifier;
        log.stage("Assembling verifier");
        let raw_records = generator::read_markers(workspace, GeneratorKind::RawOrder)?;
        let new_records = generator::read_markers(workspace, GeneratorKind::NewOrder)?;
        let skeleton = generator::read_skeleton(workspace)?;
        log.write(&format!(
            "{} raw order markers, {} new order markers",
            raw_records.len(),
            new_records.len()
        ));
        log.block(GeneratorKind::Chain.output_file(), &skeleton);

        let program =
            VerifierProgram::assemble(&self.spec, &self.bindings, &raw_records, &new_records, &skeleton)?;
        for (label, graph) in [("raw order", &program.raw_order), ("new order", &program.new_order)] {
            log.write(&format!(
                "{}: {} edges over {} iterations",
                label,
                graph.edge_count(),
                graph.node_count()
            ));
        }
        let source = program.render(self.templates)?;
        workspace.write(VERIFIER_SOURCE, &source)?;
        log.block(VERIFIER_SOURCE, &source);
        let digest = hex::encode(Sha256::digest(source.as_bytes()));

        *stage = Stage::BuildVerifier;
        self.build(workspace, VERIFIER_TARGET, log)?;

        *stage = Stage::RunVerifier;
        self.run_program(workspace, VERIFIER_TARGET, log)?;

        Ok(digest)
    }

    /// Write the Makefile with `PROJECT_DIR` pointing back to the project root.
    fn fixup_makefile(&self, workspace: &Workspace, log: &mut TestLog) -> Result<()> {
        log.stage("Fixing up Makefile path");
        let project_dir = relative_path(workspace.path(), &self.config.project_root)?;
        let project_dir = project_dir.to_string_lossy();
        let makefile = generator::render_makefile(self.templates, &self.spec, &project_dir)?;
        workspace.write("Makefile", &makefile)?;
        log.write(&format!("PROJECT_DIR is {}", project_dir));
        Ok(())
    }

    fn build(&self, workspace: &Workspace, target: &str, log: &mut TestLog) -> Result<()> {
        log.stage(&format!("Building {}", target));
        let output = self.toolchain.build(workspace.path(), target)?;
        record_output(log, &output);
        if !output.success() {
            return Err(Error::DevMalformed(format!(
                "failed to build {} (exit code {})\n{}",
                target,
                output.code_text(),
                output.stderr.trim_end()
            )));
        }
        Ok(())
    }

    fn run_program(&self, workspace: &Workspace, name: &str, log: &mut TestLog) -> Result<()> {
        log.stage(&format!("Running {}", name));
        let output = self.toolchain.run(workspace.path(), name)?;
        record_output(log, &output);
        if !output.success() {
            return Err(Error::TestFailure(format!(
                "{} exited with non-zero exit code {}\nOutput:\n{}",
                name,
                output.code_text(),
                output.stdout.trim_end()
            )));
        }
        Ok(())
    }
}

fn record_output(log: &mut TestLog, output: &ProcessOutput) {
    log.write(&format!("exit code {}", output.code_text()));
    log.block("stdout", &output.stdout);
    log.block("stderr", &output.stderr);
}
