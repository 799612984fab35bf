//! Intermediate representation shared by the two generation phases
//!
//! Phase one produces three artifacts in the workspace: two files of marker
//! records (one JSON object per line, written by the order generators) and
//! the loop skeleton written by the chain generator. This module reads them
//! back into typed values: [`MarkerRecord`]s, [`DependencyEdge`]s and
//! [`StatementCall`]s.
//!
//! Iterations use the canonical layout `[k, i0, 0, i1, 0, ..., 0]`: the
//! statement id, then each iterator followed by a zero, padded with zeros
//! to the canonical arity.

use serde::{Deserialize, Serialize};

use crate::emit::STATEMENT_PREFIX;
use crate::error::{Error, Result};

/// A full-form iteration
pub type Tuple = Vec<i64>;

/// One enumerated point of a marker set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRecord {
    /// Position of the originating relation in its block
    pub relation: usize,
    /// Source tuple followed by destination tuple
    pub tuple: Vec<i64>,
}

impl std::fmt::Display for MarkerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", crate::emit::MARKER, join_values(&self.tuple))
    }
}

/// Parse a marker file written by an order generator.
///
/// Blank lines are ignored. Anything else that is not a marker record means
/// the generator template is broken.
pub fn parse_marker_records(text: &str) -> Result<Vec<MarkerRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| {
                Error::DevMalformed(format!(
                    "marker output line {} is not a marker record ({}): {}",
                    idx + 1,
                    e,
                    line
                ))
            })
        })
        .collect()
}

/// `src` must complete before `dst`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DependencyEdge {
    pub src: Tuple,
    pub dst: Tuple,
}

impl DependencyEdge {
    /// Split a marker record in half; the caller has checked the arity.
    pub fn from_marker(record: &MarkerRecord) -> Self {
        let (src, dst) = record.tuple.split_at(record.tuple.len() / 2);
        Self {
            src: src.to_vec(),
            dst: dst.to_vec(),
        }
    }
}

impl std::fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) -> ({})", join_values(&self.src), join_values(&self.dst))
    }
}

/// What each position of a canonical tuple holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleSlot {
    Statement,
    /// Index into the nest's iterators
    Iterator(usize),
    Zero,
}

/// Slot layout for a nest of depth `dims` in a chain of arity `arity`.
pub fn canonical_layout(dims: usize, arity: usize) -> Vec<TupleSlot> {
    (0..arity)
        .map(|pos| match pos {
            0 => TupleSlot::Statement,
            p if p % 2 == 1 && p / 2 < dims => TupleSlot::Iterator(p / 2),
            _ => TupleSlot::Zero,
        })
        .collect()
}

/// Full-form tuple of an iteration of statement `statement`.
pub fn encode_iteration(statement: usize, iterators: &[i64], arity: usize) -> Tuple {
    canonical_layout(iterators.len(), arity)
        .into_iter()
        .map(|slot| match slot {
            TupleSlot::Statement => statement as i64,
            TupleSlot::Iterator(idx) => iterators[idx],
            TupleSlot::Zero => 0,
        })
        .collect()
}

/// An iteration recovered from its full form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iteration {
    pub statement: usize,
    pub iterators: Vec<i64>,
}

/// Recover the iteration of a full-form tuple, given each nest's depth.
///
/// Returns `None` when the tuple names no statement of the chain, has the
/// wrong length, or carries non-zero values in padding slots.
pub fn decode_iteration(tuple: &[i64], depths: &[usize]) -> Option<Iteration> {
    let arity = 2 * depths.iter().copied().max().unwrap_or(0) + 1;
    if tuple.len() != arity {
        return None;
    }
    let statement = usize::try_from(*tuple.first()?).ok()?;
    let dims = *depths.get(statement)?;

    let mut iterators = vec![0; dims];
    for (slot, value) in canonical_layout(dims, arity).into_iter().zip(tuple) {
        match slot {
            TupleSlot::Statement => {}
            TupleSlot::Iterator(idx) => iterators[idx] = *value,
            TupleSlot::Zero if *value != 0 => return None,
            TupleSlot::Zero => {}
        }
    }
    Some(Iteration {
        statement,
        iterators,
    })
}

/// A `statement_k(...)` call found in the loop skeleton
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementCall {
    pub statement: usize,
    pub args: Vec<String>,
}

/// Find every statement call in generated loop code.
///
/// Arguments are split on top-level commas only, so `statement_0(max(c0, 1), c1)`
/// has two arguments.
pub fn scan_statement_calls(code: &str) -> Vec<StatementCall> {
    let mut calls = Vec::new();
    let mut rest = code;

    while let Some(pos) = rest.find(STATEMENT_PREFIX) {
        let preceded_by_ident = rest[..pos]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let after = &rest[pos + STATEMENT_PREFIX.len()..];
        rest = after;
        if preceded_by_ident {
            continue;
        }

        let digits: String = after.chars().take_while(char::is_ascii_digit).collect();
        let Ok(statement) = digits.parse::<usize>() else {
            continue;
        };
        let tail = after[digits.len()..].trim_start();
        let Some(open) = tail.strip_prefix('(') else {
            continue;
        };
        let Some(close) = matching_paren(open) else {
            continue;
        };

        let inner = &open[..close];
        let args = if inner.trim().is_empty() {
            Vec::new()
        } else {
            crate::parse::split_top_level(inner)
                .into_iter()
                .map(|arg| arg.trim().to_string())
                .collect()
        };
        calls.push(StatementCall { statement, args });
        rest = &open[close + 1..];
    }

    calls
}

/// Byte offset of the `)` closing an already opened parenthesis
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return Some(idx),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Comma-separated values, as written into generated C++
pub fn join_values(values: &[i64]) -> String {
    values
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_marker_records() {
        let text = "{\"relation\":0,\"tuple\":[0,1,0,1,1,0]}\n\n{\"relation\":1,\"tuple\":[0,2,0,1,2,0]}\n";
        let records = parse_marker_records(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].relation, 1);
        assert_eq!(records[0].to_string(), "GRAPH_MARK(0, 1, 0, 1, 1, 0)");
    }

    #[test]
    fn test_parse_marker_records_rejects_garbage() {
        let err = parse_marker_records("not json").unwrap_err();
        assert!(matches!(err, Error::DevMalformed(_)));
    }

    #[test]
    fn test_edge_from_marker() {
        let record = MarkerRecord {
            relation: 0,
            tuple: vec![0, 3, 0, 1, 3, 0],
        };
        let edge = DependencyEdge::from_marker(&record);
        assert_eq!(edge.src, vec![0, 3, 0]);
        assert_eq!(edge.dst, vec![1, 3, 0]);
        assert_eq!(edge.to_string(), "(0, 3, 0) -> (1, 3, 0)");
    }

    #[test]
    fn test_encode_pads_shallow_nests() {
        assert_eq!(encode_iteration(1, &[4], 5), vec![1, 4, 0, 0, 0]);
        assert_eq!(encode_iteration(0, &[4, 7], 5), vec![0, 4, 0, 7, 0]);
        assert_eq!(encode_iteration(2, &[], 1), vec![2]);
    }

    #[test]
    fn test_decode_iteration() {
        let depths = [2, 1];
        assert_eq!(
            decode_iteration(&[1, 4, 0, 0, 0], &depths),
            Some(Iteration {
                statement: 1,
                iterators: vec![4]
            })
        );
        // padding must be zero
        assert_eq!(decode_iteration(&[1, 4, 0, 9, 0], &depths), None);
        assert_eq!(decode_iteration(&[5, 4, 0, 0, 0], &depths), None);
        assert_eq!(decode_iteration(&[0, 4, 0], &depths), None);
    }

    #[test]
    fn test_scan_statement_calls() {
        let code = "for (int c1 = 0; c1 <= 10; c1 += 1) {\n  statement_0(c1);\n  statement_1(max(c1, 2), c1 - 1);\n}\n";
        let calls = scan_statement_calls(code);
        assert_eq!(
            calls,
            vec![
                StatementCall {
                    statement: 0,
                    args: vec!["c1".into()]
                },
                StatementCall {
                    statement: 1,
                    args: vec!["max(c1, 2)".into(), "c1 - 1".into()]
                },
            ]
        );
    }

    #[test]
    fn test_scan_ignores_other_identifiers() {
        let calls = scan_statement_calls("my_statement_0(c0); statement_x(1); statement_2 (c0)");
        assert_eq!(
            calls,
            vec![StatementCall {
                statement: 2,
                args: vec!["c0".into()]
            }]
        );
    }
}
