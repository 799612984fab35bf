//! Test specification types, the core data model
//!
//! A test describes a *loop chain* (an ordered list of rectangular loop
//! nests), two dependency relations over the chain's iterations and a list of
//! schedule transformations.
//!
//! ## Example Test
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
//! Iterations are compared in *full form*: the statement id interleaved with
//! the iterator values and zero padded to the canonical arity
//! `2 * max_depth + 1` of the chain.

use serde::Serialize;
use std::path::PathBuf;

use crate::parse::{free_symbols, ParseError};

/// Inclusive bounds of one loop dimension, as unevaluated expressions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bound {
    pub lower: String,
    pub upper: String,
}

impl Bound {
    pub fn new(lower: impl Into<String>, upper: impl Into<String>) -> Self {
        Self {
            lower: lower.into(),
            upper: upper.into(),
        }
    }
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.lower, self.upper)
    }
}

/// One rectangular loop nest of the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestSpec {
    iterators: Vec<String>,
    bounds: Vec<Bound>,
    symbols: Vec<String>,
}

impl NestSpec {
    /// Build a nest, enforcing one bound pair per iterator.
    ///
    /// Symbolic constants are collected from the bound expressions in order of
    /// first appearance.
    pub fn try_new(iterators: Vec<String>, bounds: Vec<Bound>) -> Result<Self, ParseError> {
        if iterators.len() != bounds.len() {
            return Err(ParseError::IteratorBoundMismatch {
                nest: describe_nest(&iterators, &bounds),
                iterators: iterators.len(),
                bounds: bounds.len(),
            });
        }

        let mut symbols: Vec<String> = Vec::new();
        for bound in &bounds {
            for symbol in free_symbols(&bound.lower)
                .into_iter()
                .chain(free_symbols(&bound.upper))
            {
                if !symbols.contains(&symbol) {
                    symbols.push(symbol);
                }
            }
        }

        Ok(Self {
            iterators,
            bounds,
            symbols,
        })
    }

    pub fn iterators(&self) -> &[String] {
        &self.iterators
    }

    pub fn bounds(&self) -> &[Bound] {
        &self.bounds
    }

    /// Free symbolic names referenced by the bounds
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Depth of the nest
    pub fn dimensions(&self) -> usize {
        self.iterators.len()
    }
}

impl std::fmt::Display for NestSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&describe_nest(&self.iterators, &self.bounds))
    }
}

fn describe_nest(iterators: &[String], bounds: &[Bound]) -> String {
    let bounds: Vec<String> = bounds.iter().map(Bound::to_string).collect();
    format!("({}){{{}}}", iterators.join(","), bounds.join(","))
}

/// Ordered list of dependency relations in set-builder syntax
///
/// e.g. `[N]->{[0,i,0]->[1,i,0] : 0<=i<=N}`. Every iteration must be given
/// in full form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencySpec {
    pub relations: Vec<String>,
}

impl DependencySpec {
    pub fn new(relations: Vec<String>) -> Self {
        Self { relations }
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

impl std::fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.relations.join("\n"))
    }
}

/// A parsed regression test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestSpec {
    /// Sanitized test name (no whitespace); names the workspace directory
    pub name: String,

    /// Loop nests; position is the statement id
    pub chain: Vec<NestSpec>,

    /// Order that must hold for the chain as declared
    pub raw_order: DependencySpec,

    /// Order that must hold after the requested transformation
    pub new_order: DependencySpec,

    /// Schedule transformations, in application order
    pub schedules: Vec<String>,

    /// Directory containing the test file
    pub directory: PathBuf,

    /// Exemplar code for source-to-source tool tests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exemplar: Option<String>,
}

impl TestSpec {
    /// Depth of the deepest nest in the chain
    pub fn max_depth(&self) -> usize {
        self.chain
            .iter()
            .map(NestSpec::dimensions)
            .max()
            .unwrap_or(0)
    }

    /// Arity every full-form tuple of this test must have
    pub fn canonical_arity(&self) -> usize {
        2 * self.max_depth() + 1
    }

    /// Symbolic constants across the chain, first appearance order
    pub fn chain_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = Vec::new();
        for symbol in self.chain.iter().flat_map(|nest| nest.symbols()) {
            if !symbols.contains(symbol) {
                symbols.push(symbol.clone());
            }
        }
        symbols
    }

    /// Workspace directory used while the test runs
    pub fn workspace_path(&self) -> PathBuf {
        self.directory.join(format!("{}.dir", self.name))
    }
}

impl std::fmt::Display for TestSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Test: {}", self.name)?;
        writeln!(f, "Chain:")?;
        for (loop_idx, nest) in self.chain.iter().enumerate() {
            writeln!(f, "loop: {}", loop_idx)?;
            for (d, (iterator, bound)) in nest.iterators().iter().zip(nest.bounds()).enumerate() {
                writeln!(f, "  {}: {} in {}", d, iterator, bound)?;
            }
        }
        writeln!(f, "Symbols: {}", self.chain_symbols().join(" "))?;
        writeln!(f, "Dependencies:\n{}", self.raw_order)?;
        writeln!(f, "Transformations:\n{}", self.schedules.join("\n"))?;
        write!(f, "New Order Dependencies:\n{}", self.new_order)
    }
}
