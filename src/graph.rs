//! Dependency graphs over full-form iterations
//!
//! The verifier keeps two of these, one for the declared (raw) order and one
//! for the transformed (new) order. Every executed iteration is checked
//! against both before it is marked. The generated C++ carries the same
//! structure; [`OrderingOracle`] replays an execution trace on the host so the
//! checks can be exercised without a compiler.

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{join_values, DependencyEdge, Tuple};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Node {
    predecessors: BTreeSet<Tuple>,
    marked: bool,
}

/// Iterations connected by "must run before" edges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeMap<Tuple, Node>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph of every edge; duplicates collapse.
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a DependencyEdge>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.connect(edge.src.clone(), edge.dst.clone());
        }
        graph
    }

    /// Record that `src` must be marked before `dst` is satisfied.
    pub fn connect(&mut self, src: Tuple, dst: Tuple) {
        self.nodes.entry(src.clone()).or_default();
        self.nodes.entry(dst).or_default().predecessors.insert(src);
    }

    /// Mark `iteration` as executed. Marking is monotone and idempotent.
    pub fn mark(&mut self, iteration: &[i64]) {
        self.nodes.entry(iteration.to_vec()).or_default().marked = true;
    }

    pub fn is_marked(&self, iteration: &[i64]) -> bool {
        self.nodes.get(iteration).is_some_and(|node| node.marked)
    }

    /// True iff every predecessor is marked. Unknown iterations are satisfied.
    pub fn is_satisfied(&self, iteration: &[i64]) -> bool {
        self.nodes.get(iteration).is_none_or(|node| {
            node.predecessors
                .iter()
                .all(|pred| self.is_marked(pred))
        })
    }

    pub fn predecessors(&self, iteration: &[i64]) -> impl Iterator<Item = &Tuple> {
        self.nodes
            .get(iteration)
            .into_iter()
            .flat_map(|node| node.predecessors.iter())
    }

    /// Every edge, ordered by destination then source
    pub fn edges(&self) -> impl Iterator<Item = DependencyEdge> + '_ {
        self.nodes.iter().flat_map(|(dst, node)| {
            node.predecessors.iter().map(move |src| DependencyEdge {
                src: src.clone(),
                dst: dst.clone(),
            })
        })
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|node| node.predecessors.len()).sum()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Which of the two orders a check runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    Raw,
    New,
}

impl Ordering {
    /// Label printed in front of a violation
    pub fn label(self) -> &'static str {
        match self {
            Ordering::Raw => "RAW ORDER",
            Ordering::New => "NEW ORDER",
        }
    }
}

/// State of one predecessor when a violation was detected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredecessorState {
    pub iteration: Tuple,
    pub marked: bool,
    pub satisfied: bool,
}

/// An iteration ran before one of its predecessors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub ordering: Ordering,
    pub iteration: Tuple,
    pub predecessors: Vec<PredecessorState>,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} FAILURE: ({})",
            self.ordering.label(),
            join_values(&self.iteration)
        )?;
        writeln!(f, "Dependencies:")?;
        for pred in &self.predecessors {
            writeln!(
                f,
                "({}) {} {}",
                join_values(&pred.iteration),
                if pred.marked { "Marked" } else { "UNMARKED" },
                if pred.satisfied { "Satisfied" } else { "UNSATISFIED" }
            )?;
        }
        Ok(())
    }
}

/// Checks each visited iteration against the raw order, then the new order
#[derive(Debug, Clone, Default)]
pub struct OrderingOracle {
    raw: DependencyGraph,
    new: DependencyGraph,
}

impl OrderingOracle {
    pub fn new(raw: DependencyGraph, new: DependencyGraph) -> Self {
        Self { raw, new }
    }

    pub fn graph(&self, ordering: Ordering) -> &DependencyGraph {
        match ordering {
            Ordering::Raw => &self.raw,
            Ordering::New => &self.new,
        }
    }

    /// Visit one iteration. On success it is marked in both graphs.
    pub fn visit(&mut self, iteration: &[i64]) -> Result<(), Violation> {
        for ordering in [Ordering::Raw, Ordering::New] {
            let graph = match ordering {
                Ordering::Raw => &mut self.raw,
                Ordering::New => &mut self.new,
            };
            if !graph.is_satisfied(iteration) {
                return Err(violation(graph, ordering, iteration));
            }
            graph.mark(iteration);
        }
        Ok(())
    }

    /// Visit a whole trace, stopping at the first violation.
    pub fn replay<'a>(
        &mut self,
        trace: impl IntoIterator<Item = &'a Tuple>,
    ) -> Result<usize, Violation> {
        let mut visited = 0;
        for iteration in trace {
            self.visit(iteration)?;
            visited += 1;
        }
        Ok(visited)
    }
}

fn violation(graph: &DependencyGraph, ordering: Ordering, iteration: &[i64]) -> Violation {
    Violation {
        ordering,
        iteration: iteration.to_vec(),
        predecessors: graph
            .predecessors(iteration)
            .map(|pred| PredecessorState {
                iteration: pred.clone(),
                marked: graph.is_marked(pred),
                satisfied: graph.is_satisfied(pred),
            })
            .collect(),
    }
}
