//! Code fragments emitted into the generator programs
//!
//! Each loop nest becomes a block of C++ that builds a LoopChainIR
//! `RectangularDomain` and appends it to the chain. Each dependency relation
//! is flattened into a named *marker set*: the `src -> dst` pair of tuples
//! becomes one tuple `GRAPH_MARK[src..., dst...]` whose points the generator
//! enumerates.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::parse::split_top_level;
use crate::spec::NestSpec;

/// Name of the chain variable in the chain generator
pub const CHAIN_VARIABLE: &str = "chain";

/// Tuple name of every flattened relation
pub const MARKER: &str = "GRAPH_MARK";

/// Prefix of the statement macros in generated loop code
pub const STATEMENT_PREFIX: &str = "statement_";

/// Declarations and append call for one nest of the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestFragment {
    /// Chain position of the nest
    pub statement: usize,
    pub lower: String,
    pub upper: String,
    /// Absent when the nest has no symbolic constants
    pub symbolics: Option<String>,
    pub append: String,
}

impl NestFragment {
    /// Lines of the fragment in declaration order
    pub fn lines(&self) -> Vec<&str> {
        let mut lines = vec![self.lower.as_str(), self.upper.as_str()];
        if let Some(symbolics) = &self.symbolics {
            lines.push(symbolics);
        }
        lines.push(&self.append);
        lines
    }
}

impl std::fmt::Display for NestFragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

/// Emit the C++ that appends `nest` to the chain.
pub fn emit_nest(nest: &NestSpec, statement: usize) -> NestFragment {
    let dims = nest.dimensions();
    let lower: Vec<&str> = nest.bounds().iter().map(|b| b.lower.as_str()).collect();
    let upper: Vec<&str> = nest.bounds().iter().map(|b| b.upper.as_str()).collect();
    let symbols: Vec<&str> = nest.symbols().iter().map(String::as_str).collect();

    // the symbolic constructor rejects a NULL symbol array
    let (symbolics, domain_args) = if symbols.is_empty() {
        (None, format!("lower, upper, {}", dims))
    } else {
        (
            Some(string_array("symbolics", &symbols)),
            format!("lower, upper, {}, symbolics, {}", dims, symbols.len()),
        )
    };

    NestFragment {
        statement,
        lower: string_array("lower", &lower),
        upper: string_array("upper", &upper),
        symbolics,
        append: format!(
            "{}.append( LoopNest( RectangularDomain( {} ) ) );",
            CHAIN_VARIABLE, domain_args
        ),
    }
}

fn string_array(name: &str, values: &[&str]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| cpp_string_literal(v)).collect();
    format!("string {}[{}] = {{ {} }};", name, values.len(), quoted.join(", "))
}

/// Quote `value` as a C string literal.
pub fn cpp_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// One dependency relation rewritten as a marker set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerInvocation {
    /// Position of the relation in its block
    pub relation: usize,
    /// Statement label written before the source tuple, e.g. `S0` in `{ S0[...] -> ...}`
    pub source_statement: Option<String>,
    /// Parameters declared by the relation
    pub parameters: Vec<String>,
    /// The rewritten set, ready for isl
    pub text: String,
}

fn open_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| {
        Regex::new(r"(?P<open>[{;])\s*(?P<statement>[A-Za-z_][A-Za-z0-9_]*)?\s*\[")
            .expect("marker open regex is valid")
    })
}

fn arrow_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| {
        Regex::new(r"\]\s*->\s*(?P<statement>[A-Za-z_][A-Za-z0-9_]*)?\s*\[")
            .expect("marker arrow regex is valid")
    })
}

fn params_rx() -> &'static Regex {
    static RX: OnceLock<Regex> = OnceLock::new();
    RX.get_or_init(|| {
        Regex::new(r"^\s*\[(?P<params>[^\]]*)\]\s*->\s*\{").expect("params regex is valid")
    })
}

/// Rewrite one relation as a marker set.
///
/// `[N]->{[0,i,0]->[1,i,0] : 0<=i<=N}` becomes
/// `[N]->{ GRAPH_MARK[0,i,0,1,i,0] : 0<=i<=N}`. Statement labels on either
/// tuple are dropped from the set; the source label is kept as metadata.
pub fn emit_marker(relation: usize, text: &str) -> MarkerInvocation {
    let source_statement = open_rx()
        .captures(text)
        .and_then(|caps| caps.name("statement"))
        .map(|m| m.as_str().to_string());

    let opened = open_rx().replace_all(text, format!("${{open}} {}[", MARKER).as_str());
    let flattened = arrow_rx().replace_all(&opened, ",");

    MarkerInvocation {
        relation,
        source_statement,
        parameters: relation_parameters(text),
        text: flattened.into_owned(),
    }
}

/// Rewrite every relation of a dependency block, in order.
pub fn emit_markers(relations: &[String]) -> Vec<MarkerInvocation> {
    relations
        .iter()
        .enumerate()
        .map(|(idx, relation)| emit_marker(idx, relation))
        .collect()
}

/// Parameters declared in front of a relation, e.g. `[N, M]->{...}`
pub fn relation_parameters(relation: &str) -> Vec<String> {
    params_rx()
        .captures(relation)
        .and_then(|caps| caps.name("params"))
        .map(|params| {
            split_top_level(params.as_str())
                .into_iter()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Name of the statement macro for chain position `statement`
pub fn statement_name(statement: usize) -> String {
    format!("{}{}", STATEMENT_PREFIX, statement)
}
