//! Test file parsing
//!
//! Well-formed fixtures and data-driven malformed inputs.

use chain_regress::parse::{BlockKind, Diagnostic};
use chain_regress::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::{Path, PathBuf};

fn load_test_fixture(name: &str) -> PathBuf {
    PathBuf::from("tests/fixtures").join(name)
}

/// Assemble a test file from block bodies; `None` leaves the block out
fn test_text(
    chain: Option<&str>,
    deps: Option<&str>,
    new_order: Option<&str>,
    schedule: Option<&str>,
) -> String {
    let mut text = String::from("test name: t\n");
    for (keyword, body) in [
        ("loop chain", chain),
        ("dependencies", deps),
        ("new ordering", new_order),
        ("schedule", schedule),
    ] {
        if let Some(body) = body {
            text.push_str(&format!("{}:\n{}\n:end\n", keyword, body));
        }
    }
    text
}

const CHAIN: &str = "(i){0..N}\n(i){0..N}";
const DEPS: &str = "[N]->{[0,i,0]->[1,i,0] : 0<=i<=N}";

#[test]
fn test_fixture_fused_pair() {
    let parsed = parse_test_file(&load_test_fixture("fused_pair.test")).unwrap();
    let spec = &parsed.spec;

    assert_eq!(spec.name, "fused_pair");
    assert_eq!(spec.chain.len(), 2);
    assert_eq!(spec.max_depth(), 1);
    assert_eq!(spec.canonical_arity(), 3);
    assert_eq!(spec.chain_symbols(), vec!["N".to_string()]);
    assert_eq!(spec.raw_order.relations, vec![DEPS.to_string()]);
    assert_eq!(spec.schedules, vec!["none".to_string()]);
    assert_eq!(spec.directory, Path::new("tests/fixtures"));
    assert_eq!(spec.workspace_path(), Path::new("tests/fixtures/fused_pair.dir"));
    assert_eq!(
        parsed.diagnostics,
        vec![Diagnostic::NameSanitized {
            original: "fused pair".into(),
            sanitized: "fused_pair".into(),
        }]
    );
}

#[test]
fn test_fixture_reversed_order() {
    let parsed = parse_test_file(&load_test_fixture("reversed_order.test")).unwrap();
    assert!(parsed.diagnostics.is_empty());
    assert_eq!(
        parsed.spec.new_order.relations,
        vec!["[N]->{[1,i,0]->[0,i,0] : 0<=i<=N}".to_string()]
    );
}

#[test]
fn test_fixture_missing_end() {
    let err = parse_test_file(&load_test_fixture("missing_end.test")).unwrap_err();
    assert_eq!(err.kind(), FailureKind::UserMalformed);
    assert!(err.to_string().contains("loop chain"));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = parse_test_file(Path::new("tests/fixtures/absent.test")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[rstest]
#[case(None, Some(DEPS), Some(DEPS), Some("fuse"), ParseError::MissingBlock(BlockKind::LoopChain))]
#[case(Some(CHAIN), None, Some(DEPS), Some("fuse"), ParseError::MissingBlock(BlockKind::Dependencies))]
#[case(Some(CHAIN), Some(DEPS), None, Some("fuse"), ParseError::MissingBlock(BlockKind::NewOrdering))]
#[case(Some(CHAIN), Some(DEPS), Some(DEPS), None, ParseError::MissingBlock(BlockKind::Schedule))]
#[case(Some(CHAIN), Some("  "), Some(DEPS), Some("fuse"), ParseError::EmptyBlock(BlockKind::Dependencies))]
#[case(Some(CHAIN), Some(DEPS), Some(DEPS), Some("\n\n"), ParseError::EmptyBlock(BlockKind::Schedule))]
#[case(Some(" "), Some(DEPS), Some(DEPS), Some("fuse"), ParseError::EmptyBlock(BlockKind::LoopChain))]
fn test_malformed_blocks(
    #[case] chain: Option<&str>,
    #[case] deps: Option<&str>,
    #[case] new_order: Option<&str>,
    #[case] schedule: Option<&str>,
    #[case] expected: ParseError,
) {
    let text = test_text(chain, deps, new_order, schedule);
    assert_eq!(parse_test(&text, Path::new(".")).unwrap_err(), expected);
}

#[rstest]
#[case("(i,j){0..N}", 2, 1)]
#[case("(i){0..N,0..M}", 1, 2)]
#[case("(i){0..N}\n(a,b,c){0..N,0..N}", 3, 2)]
fn test_iterator_bound_mismatch(#[case] chain: &str, #[case] iterators: usize, #[case] bounds: usize) {
    let text = test_text(Some(chain), Some(DEPS), Some(DEPS), Some("fuse"));
    match parse_test(&text, Path::new(".")).unwrap_err() {
        ParseError::IteratorBoundMismatch {
            iterators: got_iterators,
            bounds: got_bounds,
            ..
        } => {
            assert_eq!(got_iterators, iterators);
            assert_eq!(got_bounds, bounds);
        }
        other => panic!("expected a mismatch, got {:?}", other),
    }
}

#[rstest]
#[case("(i){0..N} stray")]
#[case("(1i){0..N}")]
#[case("(i){0:N}")]
fn test_malformed_nest(#[case] chain: &str) {
    let text = test_text(Some(chain), Some(DEPS), Some(DEPS), Some("fuse"));
    assert!(matches!(
        parse_test(&text, Path::new(".")),
        Err(ParseError::MalformedNest(_))
    ));
}

#[test]
fn test_duplicate_block() {
    let mut text = test_text(Some(CHAIN), Some(DEPS), Some(DEPS), Some("fuse"));
    text.push_str("schedule:\n  tile\n:end\n");
    assert_eq!(
        parse_test(&text, Path::new(".")).unwrap_err(),
        ParseError::DuplicateBlock(BlockKind::Schedule)
    );
}

#[test]
fn test_blocks_in_any_order_and_on_one_line() {
    let text = "schedule: fuse :end\n\
                new ordering: [N]->{[0,i,0]->[1,i,0] : 0<=i<=N} :end\n\
                test name: one_line\n\
                dependencies: [N]->{[0,i,0]->[1,i,0] : 0<=i<=N} :end\n\
                loop chain: (i){0..N} (i){0..N} :end\n";
    let spec = parse_test(text, Path::new(".")).unwrap().spec;
    assert_eq!(spec.name, "one_line");
    assert_eq!(spec.chain.len(), 2);
    assert_eq!(spec.schedules, vec!["fuse".to_string()]);
}

#[test]
fn test_nested_bound_expressions() {
    let text = test_text(
        Some("(i,j){max(0,N-2)..N, 1..min(M,N)}"),
        Some(DEPS),
        Some(DEPS),
        Some("fuse"),
    );
    let spec = parse_test(&text, Path::new(".")).unwrap().spec;
    let nest = &spec.chain[0];
    assert_eq!(nest.dimensions(), 2);
    assert_eq!(nest.bounds()[0], Bound::new("max(0,N-2)", "N"));
    assert_eq!(nest.bounds()[1], Bound::new("1", "min(M,N)"));
    assert_eq!(nest.symbols(), &["N".to_string(), "M".to_string()]);
    assert_eq!(spec.canonical_arity(), 5);
}

#[test]
fn test_optional_exemplar_code() {
    let mut text = test_text(Some(CHAIN), Some(DEPS), Some(DEPS), Some("fuse"));
    text.push_str("exemplar code:\n  for (i = 0; i <= N; i++) { S0(i); S1(i); }\n:end\n");
    let spec = parse_test(&text, Path::new(".")).unwrap().spec;
    assert_eq!(
        spec.exemplar.as_deref(),
        Some("for (i = 0; i <= N; i++) { S0(i); S1(i); }")
    );
}
