//! Error types for chain-regress
//!
//! Every failure a test can hit is classified into exactly one
//! [`FailureKind`]. The classification decides how the suite reports it:
//! a user-malformed test is skipped with the violated invariant, a
//! dev-malformed test points at broken templates or tooling, and a test
//! failure is the regression signal itself.

use serde::Serialize;
use thiserror::Error;

use crate::parse::ParseError;
use crate::templates::TemplateError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// The three disjoint failure classifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The test file violates a structural invariant of the DSL
    UserMalformed,
    /// Generators or the verifier failed to build; templates/tooling are broken
    DevMalformed,
    /// A generator or the verifier exited non-zero while running
    TestFailure,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::UserMalformed => "user-malformed",
            FailureKind::DevMalformed => "dev-malformed",
            FailureKind::TestFailure => "test-failure",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// chain-regress errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed test: {0}")]
    UserMalformed(String),

    #[error("Software error: {0}")]
    DevMalformed(String),

    #[error("Test failed: {0}")]
    TestFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_norway::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classification used by the suite runner.
    ///
    /// Infrastructure errors (I/O, serialization, templates) never come from
    /// the test file itself, so they count as dev-malformed.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::UserMalformed(_) => FailureKind::UserMalformed,
            Error::TestFailure(_) => FailureKind::TestFailure,
            Error::DevMalformed(_)
            | Error::Io(_)
            | Error::Yaml(_)
            | Error::Json(_)
            | Error::Template(_)
            | Error::Other(_) => FailureKind::DevMalformed,
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::UserMalformed(e.to_string())
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
