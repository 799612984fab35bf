// Production-quality lints
#![warn(
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
// Deny truly dangerous patterns
#![deny(clippy::mem_forget)]
// Allow common patterns in library code
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! # chain-regress
//!
//! Regression tests for LoopChainIR schedule transformations.
//!
//! ## Core Concept
//!
//! A test file declares a **loop chain** (rectangular loop nests), the
//! dependencies between iterations of the declared chain (**raw order**), the
//! dependencies that must still hold after a transformation (**new order**)
//! and the schedule to apply. chain-regress turns that into a C++ program that
//! executes the scheduled loop code and checks, iteration by iteration, that
//! no iteration runs before one it depends on.
//!
//! Two phases do the work:
//!
//! 1. **Generators.** Three small programs are emitted and run. Two enumerate
//!    every concrete dependency with isl; the third asks LoopChainIR for the
//!    loop code of the chain.
//! 2. **Verifier.** Their outputs are checked and rendered into one program
//!    that replays the loop code against both dependency graphs and exits
//!    non-zero at the first violation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chain_regress::{MakeToolchain, RunnerConfig, SuiteRunner, TemplateSet};
//!
//! let config = RunnerConfig::default();
//! let templates = TemplateSet::embedded();
//! let toolchain = MakeToolchain::new(&config.build_tool);
//!
//! let report = SuiteRunner::new(&config, &templates, &toolchain)
//!     .run(&["tests/fuse.test".into()]);
//! print!("{}", report.render());
//! ```
//!
//! ## Test Format
//!
//! ```text
//! test name: fused pair
//! loop chain:
//!   (i){0..N}
//!   (i){0..N}
//! :end
//! dependencies:
//!   [N]->{[0,i,0]->[1,i,0] : 0<=i<=N}
//! :end
//! new ordering:
//!   [N]->{[0,i,0]->[1,i,0] : 0<=i<=N}
//! :end
//! schedule:
//!   fuse
//! :end
//! ```
//!
//! Blocks may appear in any order; each must appear exactly once and end
//! with `:end`. Dependency tuples are written in full form,
//! `[statement, i0, 0, i1, 0, ...]`, padded to `2 * deepest_nest + 1` values.
//!
//! ## Failure Classes
//!
//! | Kind | Meaning |
//! |------|---------|
//! | user-malformed | the test file is wrong; fix the test |
//! | dev-malformed | a generated program failed to build; templates or tooling are broken |
//! | test-failure | a generated program exited non-zero; for the verifier this is the regression |

// Core modules
pub mod config;
pub mod error;
pub mod spec;

// Test files
pub mod parse;
pub mod symbols;

// Code generation
pub mod emit;
pub mod generator;
pub mod graph;
pub mod ir;
pub mod templates;
pub mod transform;

// Execution
pub mod log;
pub mod pipeline;
pub mod suite;
pub mod toolchain;
pub mod workspace;

pub use config::{Retention, RunnerConfig};
pub use error::{Error, FailureKind, Result};
pub use graph::{DependencyGraph, OrderingOracle, Violation};
pub use parse::{parse_test, parse_test_file, ParseError, Parsed};
pub use pipeline::{ExecutableTest, RunFailure, RunReport};
pub use spec::{Bound, DependencySpec, NestSpec, TestSpec};
pub use suite::{SuiteReport, SuiteRunner, TestOutcome, TestStatus};
pub use templates::TemplateSet;
pub use toolchain::{MakeToolchain, ProcessOutput, Toolchain};

/// Version of chain-regress
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
