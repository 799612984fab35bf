//! Test file parsing
//!
//! A test file is a sequence of labelled blocks. Headers start a line and
//! every block except the name runs until its `:end` terminator:
//!
//! ```text
//! test name: <free text>
//! loop chain: ( id[,id]* ){ expr..expr[, expr..expr]* } [more nests] :end
//! dependencies: <relation-line>+ :end
//! new ordering: <relation-line>+ :end
//! schedule: <line>+ :end
//! exemplar code: <code> :end          (optional)
//! ```
//!
//! Every required block must occur exactly once. A block whose body runs into
//! the next header (or the end of the file) before `:end` counts as missing.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

use crate::spec::{Bound, DependencySpec, NestSpec, TestSpec};

/// Block kinds of the test DSL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    TestName,
    LoopChain,
    Dependencies,
    NewOrdering,
    Schedule,
    ExemplarCode,
}

impl BlockKind {
    /// Header keyword, without the trailing colon
    pub fn keyword(self) -> &'static str {
        match self {
            BlockKind::TestName => "test name",
            BlockKind::LoopChain => "loop chain",
            BlockKind::Dependencies => "dependencies",
            BlockKind::NewOrdering => "new ordering",
            BlockKind::Schedule => "schedule",
            BlockKind::ExemplarCode => "exemplar code",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "test name" => Some(BlockKind::TestName),
            "loop chain" => Some(BlockKind::LoopChain),
            "dependencies" => Some(BlockKind::Dependencies),
            "new ordering" => Some(BlockKind::NewOrdering),
            "schedule" => Some(BlockKind::Schedule),
            "exemplar code" => Some(BlockKind::ExemplarCode),
            _ => None,
        }
    }

    /// The name is a single line; everything else needs `:end`
    fn is_terminated(self) -> bool {
        !matches!(self, BlockKind::TestName)
    }

    fn form(self) -> String {
        if self.is_terminated() {
            format!("`{}: ... :end`", self.keyword())
        } else {
            format!("`{}: ...`", self.keyword())
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Structural violations of the test DSL
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no complete {} block", .0.form())]
    MissingBlock(BlockKind),

    #[error("multiple {} blocks", .0.form())]
    DuplicateBlock(BlockKind),

    #[error("nothing listed in the `{0}` block")]
    EmptyBlock(BlockKind),

    #[error("nest `{nest}` declares {iterators} iterator(s) but {bounds} bound pair(s)")]
    IteratorBoundMismatch {
        nest: String,
        iterators: usize,
        bounds: usize,
    },

    #[error("malformed loop nest: {0}")]
    MalformedNest(String),
}

/// Non-fatal findings surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Whitespace in the declared name was replaced by underscores
    NameSanitized { original: String, sanitized: String },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::NameSanitized {
                original,
                sanitized,
            } => write!(
                f,
                "Warning: test name may not contain white-space. Test \"{}\" renamed: \"{}\"",
                original, sanitized
            ),
        }
    }
}

/// Parse result with the diagnostics collected along the way
#[derive(Debug, Clone)]
pub struct Parsed {
    pub spec: TestSpec,
    pub diagnostics: Vec<Diagnostic>,
}

fn header_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| {
        Regex::new(
            r"(?m)^[ \t]*(?P<keyword>test name|loop chain|dependencies|new ordering|schedule|exemplar code)[ \t]*:",
        )
        .expect("header regex is valid")
    })
}

fn nest_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| {
        Regex::new(r"\(\s*(?P<iterators>[^()]*?)\s*\)\s*\{(?P<bounds>[^{}]*)\}")
            .expect("nest regex is valid")
    })
}

fn identifier_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").expect("identifier regex is valid"))
}

fn whitespace_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex is valid"))
}

/// A located block; `body` is `None` when `:end` was never reached
struct Block<'a> {
    kind: BlockKind,
    body: Option<&'a str>,
}

fn scan_blocks(text: &str) -> Vec<Block<'_>> {
    let headers: Vec<(BlockKind, usize, usize)> = header_rx()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let kind = BlockKind::from_keyword(caps.name("keyword")?.as_str())?;
            Some((kind, whole.start(), whole.end()))
        })
        .collect();

    headers
        .iter()
        .enumerate()
        .map(|(idx, &(kind, _, body_start))| {
            let region_end = headers
                .get(idx + 1)
                .map(|&(_, start, _)| start)
                .unwrap_or(text.len());
            let region = &text[body_start..region_end];

            let body = if kind.is_terminated() {
                region.find(":end").map(|end| &region[..end])
            } else {
                Some(region.lines().next().unwrap_or(""))
            };
            Block { kind, body }
        })
        .collect()
}

/// Return the body of the unique, terminated block of `kind`
fn single_block<'a>(blocks: &[Block<'a>], kind: BlockKind) -> Result<&'a str, ParseError> {
    let mut found = blocks.iter().filter(|b| b.kind == kind);
    let first = found.next().ok_or(ParseError::MissingBlock(kind))?;
    if found.next().is_some() {
        return Err(ParseError::DuplicateBlock(kind));
    }
    first.body.ok_or(ParseError::MissingBlock(kind))
}

fn optional_block<'a>(
    blocks: &[Block<'a>],
    kind: BlockKind,
) -> Result<Option<&'a str>, ParseError> {
    match blocks.iter().filter(|b| b.kind == kind).count() {
        0 => Ok(None),
        1 => single_block(blocks, kind).map(Some),
        _ => Err(ParseError::DuplicateBlock(kind)),
    }
}

/// Parse test text. `directory` is where the test file lives.
pub fn parse_test(text: &str, directory: &Path) -> Result<Parsed, ParseError> {
    let blocks = scan_blocks(text);
    let mut diagnostics = Vec::new();

    let name = parse_name(single_block(&blocks, BlockKind::TestName)?, &mut diagnostics)?;
    let chain = parse_chain(single_block(&blocks, BlockKind::LoopChain)?)?;
    let raw_order = DependencySpec::new(parse_lines(
        single_block(&blocks, BlockKind::Dependencies)?,
        BlockKind::Dependencies,
    )?);
    let new_order = DependencySpec::new(parse_lines(
        single_block(&blocks, BlockKind::NewOrdering)?,
        BlockKind::NewOrdering,
    )?);
    let schedules = parse_lines(
        single_block(&blocks, BlockKind::Schedule)?,
        BlockKind::Schedule,
    )?;
    let exemplar = optional_block(&blocks, BlockKind::ExemplarCode)?
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty());

    Ok(Parsed {
        spec: TestSpec {
            name,
            chain,
            raw_order,
            new_order,
            schedules,
            directory: directory.to_path_buf(),
            exemplar,
        },
        diagnostics,
    })
}

/// Read and parse a test file
pub fn parse_test_file(path: &Path) -> crate::Result<Parsed> {
    let text = std::fs::read_to_string(path)?;
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(parse_test(&text, directory)?)
}

fn parse_name(line: &str, diagnostics: &mut Vec<Diagnostic>) -> Result<String, ParseError> {
    let original = line.trim();
    if original.is_empty() {
        return Err(ParseError::MissingBlock(BlockKind::TestName));
    }

    let sanitized = whitespace_rx().replace_all(original, "_").into_owned();
    if sanitized != original {
        diagnostics.push(Diagnostic::NameSanitized {
            original: original.to_string(),
            sanitized: sanitized.clone(),
        });
    }
    Ok(sanitized)
}

fn parse_chain(body: &str) -> Result<Vec<NestSpec>, ParseError> {
    let mut chain = Vec::new();
    let mut last_end = 0;

    for caps in nest_rx().captures_iter(body) {
        let Some(whole) = caps.get(0) else { continue };
        check_separator(&body[last_end..whole.start()])?;
        last_end = whole.end();

        let iterators = parse_iterators(&caps["iterators"], whole.as_str())?;
        let bounds = parse_bounds(&caps["bounds"], whole.as_str())?;
        chain.push(NestSpec::try_new(iterators, bounds)?);
    }
    check_separator(&body[last_end..])?;

    if chain.is_empty() {
        return Err(ParseError::EmptyBlock(BlockKind::LoopChain));
    }
    Ok(chain)
}

/// Only whitespace and list punctuation may sit between nests
fn check_separator(text: &str) -> Result<(), ParseError> {
    let stray = text.trim_matches(|c: char| c.is_whitespace() || c == ',' || c == ';');
    if stray.is_empty() {
        Ok(())
    } else {
        Err(ParseError::MalformedNest(format!(
            "unexpected text `{}` in loop chain",
            stray
        )))
    }
}

fn parse_iterators(list: &str, nest: &str) -> Result<Vec<String>, ParseError> {
    list.split(',')
        .map(str::trim)
        .map(|iterator| {
            if is_identifier(iterator) {
                Ok(iterator.to_string())
            } else {
                Err(ParseError::MalformedNest(format!(
                    "`{}` is not an iterator name in `{}`",
                    iterator, nest
                )))
            }
        })
        .collect()
}

fn parse_bounds(list: &str, nest: &str) -> Result<Vec<Bound>, ParseError> {
    split_top_level(list)
        .into_iter()
        .map(|pair| {
            let (lower, upper) = pair.split_once("..").ok_or_else(|| {
                ParseError::MalformedNest(format!("bound `{}` in `{}` is not `lower..upper`", pair.trim(), nest))
            })?;
            let (lower, upper) = (lower.trim(), upper.trim());
            if !is_bound_expression(lower) || !is_bound_expression(upper) {
                return Err(ParseError::MalformedNest(format!(
                    "bound `{}` in `{}` is not an arithmetic expression",
                    pair.trim(),
                    nest
                )));
            }
            Ok(Bound::new(lower, upper))
        })
        .collect()
}

/// Split on commas that are not nested inside parentheses
pub fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_bound_expression(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_+-*/%(), ".contains(c))
}

/// Free identifiers of a bound expression, in order, without duplicates.
///
/// Numeric literals never match; identifiers directly followed by `(` are
/// function names (`max(N,M)`) and are skipped.
pub fn free_symbols(expr: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for m in identifier_rx().find_iter(expr) {
        let is_call = expr[m.end()..].trim_start().starts_with('(');
        let name = m.as_str().to_string();
        if !is_call && !symbols.contains(&name) {
            symbols.push(name);
        }
    }
    symbols
}

fn parse_lines(body: &str, kind: BlockKind) -> Result<Vec<String>, ParseError> {
    let lines: Vec<String> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if lines.is_empty() {
        return Err(ParseError::EmptyBlock(kind));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCENARIO_A: &str = r#"test name: fused pair
loop chain:
  (i){0..N}
  (i){0..N}
:end
dependencies:
  [N]->{[0,i,0]->[1,i,0] : 0<=i<=N}
:end
new ordering:
  [N]->{[0,i,0]->[1,i,0] : 0<=i<=N}
:end
schedule:
  default
:end
"#;

    fn parse(text: &str) -> Result<Parsed, ParseError> {
        parse_test(text, Path::new("tests"))
    }

    #[test]
    fn test_parse_complete_test() {
        let parsed = parse(SCENARIO_A).unwrap();
        let spec = parsed.spec;
        assert_eq!(spec.name, "fused_pair");
        assert_eq!(spec.chain.len(), 2);
        assert_eq!(spec.chain[0].iterators(), &["i".to_string()]);
        assert_eq!(spec.chain[0].bounds(), &[Bound::new("0", "N")]);
        assert_eq!(spec.chain[0].symbols(), &["N".to_string()]);
        assert_eq!(
            spec.raw_order.relations,
            vec!["[N]->{[0,i,0]->[1,i,0] : 0<=i<=N}".to_string()]
        );
        assert_eq!(spec.schedules, vec!["default".to_string()]);
        assert_eq!(spec.exemplar, None);
        assert_eq!(
            parsed.diagnostics,
            vec![Diagnostic::NameSanitized {
                original: "fused pair".into(),
                sanitized: "fused_pair".into()
            }]
        );
    }

    #[test]
    fn test_blocks_in_any_order() {
        let text = r#"schedule: s :end
new ordering: [N]->{[0,i,0]->[0,i,0] : 0<=i<=N} :end
test name: reordered
dependencies: [N]->{[0,i,0]->[0,i,0] : 0<=i<=N} :end
loop chain: (i,j){0..N, 1..M} :end
"#;
        let spec = parse(text).unwrap().spec;
        assert_eq!(spec.name, "reordered");
        assert_eq!(spec.chain[0].dimensions(), 2);
        assert_eq!(spec.chain[0].symbols(), &["N".to_string(), "M".to_string()]);
        assert_eq!(spec.schedules, vec!["s".to_string()]);
    }

    #[test]
    fn test_missing_terminator_is_missing_block() {
        let text = SCENARIO_A.replacen("  (i){0..N}\n:end", "  (i){0..N}\n", 1);
        assert_eq!(
            parse(&text).unwrap_err(),
            ParseError::MissingBlock(BlockKind::LoopChain)
        );
    }

    #[test]
    fn test_missing_block() {
        let text = SCENARIO_A.replace("schedule:\n  default\n:end\n", "");
        assert_eq!(
            parse(&text).unwrap_err(),
            ParseError::MissingBlock(BlockKind::Schedule)
        );
    }

    #[test]
    fn test_duplicate_block() {
        let text = format!("{}dependencies:\n  [N]->{{[0,i,0]->[1,i,0]}}\n:end\n", SCENARIO_A);
        assert_eq!(
            parse(&text).unwrap_err(),
            ParseError::DuplicateBlock(BlockKind::Dependencies)
        );
    }

    #[test]
    fn test_empty_dependency_block() {
        let text = SCENARIO_A.replace("new ordering:\n  [N]->{[0,i,0]->[1,i,0] : 0<=i<=N}\n:end", "new ordering:\n:end");
        assert_eq!(
            parse(&text).unwrap_err(),
            ParseError::EmptyBlock(BlockKind::NewOrdering)
        );
    }

    #[test]
    fn test_iterator_bound_mismatch() {
        let text = SCENARIO_A.replacen("(i){0..N}", "(i,j){0..N}", 1);
        assert!(matches!(
            parse(&text).unwrap_err(),
            ParseError::IteratorBoundMismatch {
                iterators: 2,
                bounds: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_stray_text_in_chain() {
        let text = SCENARIO_A.replacen("(i){0..N}", "(i){0..N} oops", 1);
        assert!(matches!(parse(&text).unwrap_err(), ParseError::MalformedNest(_)));
    }

    #[test]
    fn test_bounds_with_calls_split_on_top_level_commas() {
        let text = SCENARIO_A.replacen("(i){0..N}", "(i,j){0..max(N,M), 1..N-1}", 1);
        let spec = parse(&text).unwrap().spec;
        assert_eq!(spec.chain[0].bounds()[0], Bound::new("0", "max(N,M)"));
        assert_eq!(spec.chain[0].symbols(), &["N".to_string(), "M".to_string()]);
    }

    #[test]
    fn test_exemplar_block_is_optional() {
        let text = format!("{}exemplar code:\n for(i=0;i<N;i++) S(i);\n:end\n", SCENARIO_A);
        let spec = parse(&text).unwrap().spec;
        assert_eq!(spec.exemplar.as_deref(), Some("for(i=0;i<N;i++) S(i);"));
    }

    #[test]
    fn test_free_symbols() {
        assert_eq!(free_symbols("N*2 + M - N"), vec!["N", "M"]);
        assert_eq!(free_symbols("10"), Vec::<String>::new());
        assert_eq!(free_symbols("min(N, 4)"), vec!["N"]);
        assert_eq!(free_symbols("1e5"), Vec::<String>::new());
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_top_level("a, f(b, c), d"), vec!["a", " f(b, c)", " d"]);
        assert_eq!(split_top_level("x"), vec!["x"]);
    }

    #[test]
    fn test_parse_error_messages_name_the_block() {
        assert_eq!(
            ParseError::MissingBlock(BlockKind::LoopChain).to_string(),
            "no complete `loop chain: ... :end` block"
        );
        assert_eq!(
            ParseError::DuplicateBlock(BlockKind::TestName).to_string(),
            "multiple `test name: ...` blocks"
        );
    }
}
