//! Phase two: assemble the verifier
//!
//! Takes the three artifacts of phase one, checks them against the test's
//! canonical arity and renders a single verifier program. The verifier
//! defines one macro per chain statement; each macro builds the canonical
//! tuple of the executed iteration and checks it against the raw order, then
//! the new order, exiting with [`ORDER_VIOLATION_EXIT`] on the first violation.

use serde::Serialize;

use crate::emit::statement_name;
use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, Ordering};
use crate::ir::{canonical_layout, join_values, scan_statement_calls, DependencyEdge, MarkerRecord, TupleSlot};
use crate::spec::TestSpec;
use crate::symbols::{Binding, SymbolBindings};
use crate::templates::{TemplateSet, VERIFIER_TEMPLATE};

/// Exit status of a verifier that detected an ordering violation
pub const ORDER_VIOLATION_EXIT: i32 = 3;

/// Check marker arity and split every record into an edge.
///
/// Each record must hold an even number of values, half of which is the
/// canonical arity, and every record of the block must agree with the first.
pub fn marker_edges(
    ordering: Ordering,
    records: &[MarkerRecord],
    arity: usize,
) -> Result<Vec<DependencyEdge>> {
    let mut anchor: Option<usize> = None;
    let mut edges = Vec::with_capacity(records.len());

    for record in records {
        let len = record.tuple.len();
        if len % 2 != 0 {
            return Err(Error::UserMalformed(format!(
                "{} relation {}: odd number of values in marker {}",
                ordering.label(),
                record.relation,
                record
            )));
        }
        let half = len / 2;
        if half != arity {
            return Err(Error::UserMalformed(format!(
                "{} relation {}: dependency tuples must have the arity of the deepest nest, is {} but should be {} in {}",
                ordering.label(),
                record.relation,
                half,
                arity,
                record
            )));
        }
        match anchor {
            None => anchor = Some(half),
            Some(expected) if expected != half => {
                return Err(Error::UserMalformed(format!(
                    "{} relation {}: unequal tuple lengths, is {} but was {} in {}",
                    ordering.label(),
                    record.relation,
                    half,
                    expected,
                    record
                )));
            }
            Some(_) => {}
        }
        edges.push(DependencyEdge::from_marker(record));
    }

    Ok(edges)
}

/// Every statement of the chain must appear in the skeleton with one
/// argument per iterator.
pub fn check_skeleton(spec: &TestSpec, skeleton: &str) -> Result<()> {
    let calls = scan_statement_calls(skeleton);

    for (statement, nest) in spec.chain.iter().enumerate() {
        let mut found = calls.iter().filter(|call| call.statement == statement).peekable();
        if found.peek().is_none() {
            return Err(Error::TestFailure(format!(
                "generated loop code never executes {}",
                statement_name(statement)
            )));
        }
        if let Some(call) = found.find(|call| call.args.len() != nest.dimensions()) {
            return Err(Error::TestFailure(format!(
                "{} called with {} arguments but its nest has {} iterators",
                statement_name(statement),
                call.args.len(),
                nest.dimensions()
            )));
        }
    }

    if let Some(call) = calls.iter().find(|call| call.statement >= spec.chain.len()) {
        return Err(Error::TestFailure(format!(
            "generated loop code executes {} but the chain has {} nests",
            statement_name(call.statement),
            spec.chain.len()
        )));
    }

    Ok(())
}

/// Definition of one statement macro
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementMacro {
    pub name: String,
    /// Macro parameter list
    pub params: String,
    /// Iteration expression built from the parameters
    pub iteration: String,
}

/// Macro for chain position `statement` of a nest with `dims` iterators
pub fn statement_macro(statement: usize, dims: usize, arity: usize) -> StatementMacro {
    let params: Vec<String> = (0..dims).map(|d| format!("stmt_arg{}", d)).collect();
    let slots: Vec<String> = canonical_layout(dims, arity)
        .into_iter()
        .map(|slot| match slot {
            TupleSlot::Statement => statement.to_string(),
            TupleSlot::Iterator(idx) => format!("({})", params[idx]),
            TupleSlot::Zero => "0".to_string(),
        })
        .collect();

    StatementMacro {
        name: statement_name(statement),
        params: params.join(", "),
        iteration: format!("Iteration{{ {} }}", slots.join(", ")),
    }
}

fn iteration_literal(tuple: &[i64]) -> String {
    format!("Iteration{{ {} }}", join_values(tuple))
}

#[derive(Serialize)]
struct EdgeContext {
    src: String,
    dst: String,
}

#[derive(Serialize)]
struct VerifierContext<'a> {
    test_name: &'a str,
    schedules: &'a [String],
    arity: usize,
    violation_exit: i32,
    bounds: Vec<&'a Binding>,
    raw_order: Vec<EdgeContext>,
    new_order: Vec<EdgeContext>,
    statements: &'a [StatementMacro],
    skeleton: &'a str,
}

/// Everything the verifier is rendered from
#[derive(Debug, Clone)]
pub struct VerifierProgram {
    pub test_name: String,
    pub schedules: Vec<String>,
    pub arity: usize,
    pub bindings: SymbolBindings,
    pub raw_order: DependencyGraph,
    pub new_order: DependencyGraph,
    pub statements: Vec<StatementMacro>,
    pub skeleton: String,
}

impl VerifierProgram {
    /// Check the phase one artifacts and collect them into a program.
    pub fn assemble(
        spec: &TestSpec,
        bindings: &SymbolBindings,
        raw_records: &[MarkerRecord],
        new_records: &[MarkerRecord],
        skeleton: &str,
    ) -> Result<Self> {
        let arity = spec.canonical_arity();
        let raw_edges = marker_edges(Ordering::Raw, raw_records, arity)?;
        let new_edges = marker_edges(Ordering::New, new_records, arity)?;
        check_skeleton(spec, skeleton)?;

        let statements = spec
            .chain
            .iter()
            .enumerate()
            .map(|(statement, nest)| statement_macro(statement, nest.dimensions(), arity))
            .collect();

        Ok(Self {
            test_name: spec.name.clone(),
            schedules: spec.schedules.clone(),
            arity,
            bindings: bindings.clone(),
            raw_order: DependencyGraph::from_edges(&raw_edges),
            new_order: DependencyGraph::from_edges(&new_edges),
            statements,
            skeleton: skeleton.trim_end().to_string(),
        })
    }

    fn edges(graph: &DependencyGraph) -> Vec<EdgeContext> {
        graph
            .edges()
            .map(|edge| EdgeContext {
                src: iteration_literal(&edge.src),
                dst: iteration_literal(&edge.dst),
            })
            .collect()
    }

    /// Render the verifier source
    pub fn render(&self, templates: &TemplateSet) -> Result<String> {
        let ctx = VerifierContext {
            test_name: &self.test_name,
            schedules: &self.schedules,
            arity: self.arity,
            violation_exit: ORDER_VIOLATION_EXIT,
            bounds: self.bindings.iter().collect(),
            raw_order: Self::edges(&self.raw_order),
            new_order: Self::edges(&self.new_order),
            statements: &self.statements,
            skeleton: &self.skeleton,
        };
        Ok(templates.render(VERIFIER_TEMPLATE, &ctx)?)
    }
}
