//! Property-based tests for tuple encoding and dependency graphs
//!
//! Uses proptest to generate random chains, traces and edge sets

use chain_regress::graph::{DependencyGraph, OrderingOracle};
use chain_regress::ir::{decode_iteration, encode_iteration, DependencyEdge, Iteration, Tuple};
use chain_regress::parse::split_top_level;
use proptest::prelude::*;

/// Nest depths of a chain, plus one iteration of one of its statements
fn any_iteration() -> impl Strategy<Value = (Vec<usize>, Iteration)> {
    prop::collection::vec(1usize..4, 1..5).prop_flat_map(|depths| {
        let statements = depths.len();
        (Just(depths.clone()), 0..statements).prop_flat_map(|(depths, statement)| {
            let dims = depths[statement];
            (
                Just(depths),
                prop::collection::vec(-50i64..50, dims).prop_map(move |iterators| Iteration {
                    statement,
                    iterators,
                }),
            )
        })
    })
}

/// Edges between iterations `(s, i, 0)` of a two-statement chain
fn any_edges() -> impl Strategy<Value = Vec<DependencyEdge>> {
    prop::collection::vec((0i64..2, 0i64..6, 0i64..2, 0i64..6), 0..20).prop_map(|raw| {
        raw.into_iter()
            .map(|(s0, i0, s1, i1)| DependencyEdge {
                src: vec![s0, i0, 0],
                dst: vec![s1, i1, 0],
            })
            .collect()
    })
}

fn trace_of(iterations: &[(i64, i64)]) -> Vec<Tuple> {
    iterations.iter().map(|&(s, i)| vec![s, i, 0]).collect()
}

proptest! {
    #[test]
    fn test_encoded_iterations_decode((depths, iteration) in any_iteration()) {
        let arity = 2 * depths.iter().max().copied().unwrap_or(0) + 1;
        let tuple = encode_iteration(iteration.statement, &iteration.iterators, arity);
        prop_assert_eq!(tuple.len(), arity);
        prop_assert_eq!(decode_iteration(&tuple, &depths), Some(iteration));
    }

    #[test]
    fn test_padding_slots_are_zero((depths, iteration) in any_iteration()) {
        let arity = 2 * depths.iter().max().copied().unwrap_or(0) + 1;
        let tuple = encode_iteration(iteration.statement, &iteration.iterators, arity);
        for (pos, value) in tuple.iter().enumerate().skip(1) {
            if pos % 2 == 0 || pos / 2 >= iteration.iterators.len() {
                prop_assert_eq!(*value, 0);
            }
        }
    }

    #[test]
    fn test_marking_is_monotone(edges in any_edges(), order in prop::collection::vec((0i64..2, 0i64..6), 0..30)) {
        let mut graph = DependencyGraph::from_edges(&edges);
        let trace = trace_of(&order);
        for (idx, iteration) in trace.iter().enumerate() {
            graph.mark(iteration);
            // everything marked so far stays marked
            for earlier in &trace[..=idx] {
                prop_assert!(graph.is_marked(earlier));
            }
        }
    }

    #[test]
    fn test_topological_trace_never_violates(edges in any_edges()) {
        // only forward edges, so ascending order is a valid execution
        let forward: Vec<DependencyEdge> = edges.into_iter().filter(|e| e.src < e.dst).collect();
        let graph = DependencyGraph::from_edges(&forward);
        let mut oracle = OrderingOracle::new(graph.clone(), graph);

        let mut trace: Vec<Tuple> = (0..2)
            .flat_map(|s| (0..6).map(move |i| vec![s, i, 0]))
            .collect();
        trace.sort();
        prop_assert_eq!(oracle.replay(&trace), Ok(trace.len()));
    }

    #[test]
    fn test_violation_names_unmarked_predecessor(edges in any_edges(), order in prop::collection::vec((0i64..2, 0i64..6), 1..30)) {
        let graph = DependencyGraph::from_edges(&edges);
        let mut oracle = OrderingOracle::new(graph, DependencyGraph::new());
        if let Err(violation) = oracle.replay(&trace_of(&order)) {
            prop_assert!(violation.predecessors.iter().any(|pred| !pred.marked));
            prop_assert!(violation.to_string().starts_with("RAW ORDER FAILURE: ("));
        }
    }

    #[test]
    fn test_split_top_level_keeps_text(parts in prop::collection::vec("[a-z0-9]{1,4}(\\([a-z0-9,]{0,5}\\))?", 1..6)) {
        let joined = parts.join(",");
        prop_assert_eq!(split_top_level(&joined), parts.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
