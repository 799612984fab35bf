//! Phase one: the generator programs
//!
//! Three C++ programs are written into the workspace. The two order
//! generators enumerate the points of each flattened dependency relation
//! with isl and write them as marker records; the chain generator builds the
//! loop chain with LoopChainIR and writes the loop code of its default
//! schedule. Their outputs feed [`crate::transform`].

use serde::Serialize;

use crate::emit::{emit_markers, emit_nest, MarkerInvocation, CHAIN_VARIABLE};
use crate::error::Result;
use crate::ir::{parse_marker_records, MarkerRecord};
use crate::spec::TestSpec;
use crate::symbols::SymbolBindings;
use crate::templates::{TemplateSet, GENERATOR_TEMPLATE, MAKEFILE_TEMPLATE};
use crate::workspace::Workspace;

/// Build target of the final verifier
pub const VERIFIER_TARGET: &str = "verifier";

/// The three generator programs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    RawOrder,
    NewOrder,
    Chain,
}

impl GeneratorKind {
    pub const ALL: [GeneratorKind; 3] = [
        GeneratorKind::RawOrder,
        GeneratorKind::NewOrder,
        GeneratorKind::Chain,
    ];

    /// Make target and executable name
    pub fn target(self) -> &'static str {
        match self {
            GeneratorKind::RawOrder => "raw_order_generator",
            GeneratorKind::NewOrder => "new_order_generator",
            GeneratorKind::Chain => "chain_generator",
        }
    }

    pub fn source_file(self) -> String {
        format!("{}.cpp", self.target())
    }

    /// File the generator writes when run
    pub fn output_file(self) -> &'static str {
        match self {
            GeneratorKind::RawOrder => "raw_order_tuples.jsonl",
            GeneratorKind::NewOrder => "new_order_tuples.jsonl",
            GeneratorKind::Chain => "chain_skeleton.c",
        }
    }

    fn entry_function(self) -> &'static str {
        match self {
            GeneratorKind::RawOrder => "generateRawOrder",
            GeneratorKind::NewOrder => "generateNewOrder",
            GeneratorKind::Chain => "generateChain",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            GeneratorKind::RawOrder => "raw order generator",
            GeneratorKind::NewOrder => "new order generator",
            GeneratorKind::Chain => "chain generator",
        }
    }
}

impl std::fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.target())
    }
}

#[derive(Serialize)]
struct GeneratorContext<'a> {
    kind: &'static str,
    test_name: &'a str,
    fragment: String,
    entry: String,
}

#[derive(Serialize)]
struct MakefileContext<'a> {
    test_name: &'a str,
    project_dir: &'a str,
    generators: Vec<&'static str>,
    verifier: &'static str,
}

/// C++ injected into the generator template for `kind`
pub fn fragment(kind: GeneratorKind, spec: &TestSpec, bindings: &SymbolBindings) -> String {
    match kind {
        GeneratorKind::RawOrder => order_fragment(kind, &spec.raw_order.relations, bindings),
        GeneratorKind::NewOrder => order_fragment(kind, &spec.new_order.relations, bindings),
        GeneratorKind::Chain => chain_fragment(spec),
    }
}

fn order_fragment(kind: GeneratorKind, relations: &[String], bindings: &SymbolBindings) -> String {
    let mut out = String::new();
    out.push_str(&format!("static int {}(){{\n", kind.entry_function()));
    out.push_str("  const vector<string> relations = {\n");
    for marker in emit_markers(relations) {
        out.push_str(&format!("    // {}\n", marker_comment(&marker)));
        out.push_str(&format!(
            "    {},\n",
            crate::emit::cpp_string_literal(&marker.text)
        ));
    }
    out.push_str("  };\n");
    out.push_str(&format!(
        "  return enumerateMarkers( relations, {}, {} );\n",
        crate::emit::cpp_string_literal(&bindings.isl_context()),
        crate::emit::cpp_string_literal(kind.output_file())
    ));
    out.push_str("}\n");
    out
}

/// `relation 0 [N, M] from S0`
fn marker_comment(marker: &MarkerInvocation) -> String {
    let mut comment = format!("relation {}", marker.relation);
    if !marker.parameters.is_empty() {
        comment.push_str(&format!(" [{}]", marker.parameters.join(", ")));
    }
    if let Some(statement) = &marker.source_statement {
        comment.push_str(&format!(" from {}", statement));
    }
    comment
}

fn chain_fragment(spec: &TestSpec) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "static int {}(){{\n",
        GeneratorKind::Chain.entry_function()
    ));
    out.push_str(&format!("  LoopChain {};\n", CHAIN_VARIABLE));
    for (statement, nest) in spec.chain.iter().enumerate() {
        out.push_str(&format!("  // {}: {}\n", statement, nest));
        out.push_str("  {\n");
        for line in emit_nest(nest, statement).lines() {
            out.push_str(&format!("    {}\n", line));
        }
        out.push_str("  }\n");
    }
    out.push_str(&format!(
        "  return writeSkeleton( {}, {} );\n",
        CHAIN_VARIABLE,
        crate::emit::cpp_string_literal(GeneratorKind::Chain.output_file())
    ));
    out.push_str("}\n");
    out
}

/// Render the full source of one generator
pub fn render_generator(
    templates: &TemplateSet,
    kind: GeneratorKind,
    spec: &TestSpec,
    bindings: &SymbolBindings,
) -> Result<String> {
    let ctx = GeneratorContext {
        kind: kind.description(),
        test_name: &spec.name,
        fragment: fragment(kind, spec, bindings),
        entry: format!("{}()", kind.entry_function()),
    };
    Ok(templates.render(GENERATOR_TEMPLATE, &ctx)?)
}

/// Render the test Makefile. `project_dir` is the project root relative to
/// the workspace.
pub fn render_makefile(templates: &TemplateSet, spec: &TestSpec, project_dir: &str) -> Result<String> {
    let ctx = MakefileContext {
        test_name: &spec.name,
        project_dir,
        generators: GeneratorKind::ALL.iter().map(|kind| kind.target()).collect(),
        verifier: VERIFIER_TARGET,
    };
    Ok(templates.render(MAKEFILE_TEMPLATE, &ctx)?)
}

/// Write the three generator sources into the workspace.
pub fn write_generators(
    workspace: &Workspace,
    templates: &TemplateSet,
    spec: &TestSpec,
    bindings: &SymbolBindings,
) -> Result<()> {
    for kind in GeneratorKind::ALL {
        let source = render_generator(templates, kind, spec, bindings)?;
        workspace.write(&kind.source_file(), &source)?;
    }
    Ok(())
}

/// Read back the marker records an order generator wrote.
pub fn read_markers(workspace: &Workspace, kind: GeneratorKind) -> Result<Vec<MarkerRecord>> {
    parse_marker_records(&workspace.read(kind.output_file())?)
}

/// Read back the loop skeleton the chain generator wrote.
pub fn read_skeleton(workspace: &Workspace) -> Result<String> {
    workspace.read(GeneratorKind::Chain.output_file())
}
