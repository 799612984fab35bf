//! Template-based code generation
//!
//! Uses MiniJinja templates for the generated C++ programs and the test
//! Makefile. Templates are embedded by default; a resources directory given
//! with `--resources` (or `resources_dir` in the config file) may override
//! any of them by file name.

pub mod filters;

use minijinja::Environment;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;

// Embedded templates (compiled into binary)
mod embedded {
    pub const GENERATOR: &str = include_str!("../../templates/generator.cpp.jinja");
    pub const VERIFIER: &str = include_str!("../../templates/verifier.cpp.jinja");
    pub const MAKEFILE: &str = include_str!("../../templates/Makefile.jinja");
}

/// Template names, also the file names looked up in an override directory
pub const GENERATOR_TEMPLATE: &str = "generator.cpp.jinja";
pub const VERIFIER_TEMPLATE: &str = "verifier.cpp.jinja";
pub const MAKEFILE_TEMPLATE: &str = "Makefile.jinja";

const ALL_TEMPLATES: [(&str, &str); 3] = [
    (GENERATOR_TEMPLATE, embedded::GENERATOR),
    (VERIFIER_TEMPLATE, embedded::VERIFIER),
    (MAKEFILE_TEMPLATE, embedded::MAKEFILE),
];

/// Template engine singleton
static ENGINE: OnceLock<Environment<'static>> = OnceLock::new();

/// Initialize the template engine with embedded templates
fn init_engine() -> Environment<'static> {
    let mut env = Environment::new();
    filters::register_filters(&mut env);

    for (name, source) in ALL_TEMPLATES {
        env.add_template(name, source)
            .expect("Failed to load embedded template");
    }

    env
}

/// Get the global template engine
pub fn engine() -> &'static Environment<'static> {
    ENGINE.get_or_init(init_engine)
}

/// Create a new template engine with custom template directory
/// Templates in custom_dir override embedded templates
pub fn engine_with_override(custom_dir: &Path) -> Result<Environment<'static>, TemplateError> {
    let mut env = init_engine();
    load_custom_templates(&mut env, custom_dir)?;
    Ok(env)
}

fn load_custom_templates(env: &mut Environment<'static>, dir: &Path) -> Result<(), TemplateError> {
    if !dir.is_dir() {
        return Err(TemplateError::IoError(format!(
            "resources directory {} does not exist",
            dir.display()
        )));
    }

    for (name, _) in ALL_TEMPLATES {
        let path = dir.join(name);
        if !path.exists() {
            continue;
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            TemplateError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        env.add_template_owned(name, content)
            .map_err(|e| TemplateError::ParseError(name.into(), e.to_string()))?;
        tracing::debug!(template = name, path = %path.display(), "template overridden");
    }

    Ok(())
}

/// The templates a suite run renders with
#[derive(Debug)]
pub struct TemplateSet {
    custom: Option<Environment<'static>>,
}

impl TemplateSet {
    /// Embedded templates only
    pub fn embedded() -> Self {
        Self { custom: None }
    }

    /// Embedded templates, overridden by any found in `dir`
    pub fn with_overrides(dir: &Path) -> Result<Self, TemplateError> {
        Ok(Self {
            custom: Some(engine_with_override(dir)?),
        })
    }

    fn env(&self) -> &Environment<'static> {
        self.custom.as_ref().unwrap_or_else(|| engine())
    }

    /// Render template `name` with `ctx`
    pub fn render<S: Serialize>(&self, name: &str, ctx: &S) -> Result<String, TemplateError> {
        let template = self
            .env()
            .get_template(name)
            .map_err(|e| TemplateError::TemplateNotFound(e.to_string()))?;
        template
            .render(ctx)
            .map_err(|e| TemplateError::RenderError(format!("{}: {}", name, e)))
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::embedded()
    }
}

/// Template errors
#[derive(Debug, Clone)]
pub enum TemplateError {
    /// Template not found
    TemplateNotFound(String),
    /// Template parse error
    ParseError(String, String),
    /// Template render error
    RenderError(String),
    /// IO error loading custom templates
    IoError(String),
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::TemplateNotFound(msg) => write!(f, "Template not found: {}", msg),
            TemplateError::ParseError(name, msg) => {
                write!(f, "Template parse error in {}: {}", name, msg)
            }
            TemplateError::RenderError(msg) => write!(f, "Template render error: {}", msg),
            TemplateError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for TemplateError {}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_engine_initialization() {
        let env = engine();
        for (name, _) in ALL_TEMPLATES {
            assert!(env.get_template(name).is_ok(), "missing {}", name);
        }
    }

    #[test]
    fn test_makefile_lists_targets() {
        let text = TemplateSet::embedded()
            .render(
                MAKEFILE_TEMPLATE,
                &context! {
                    test_name => "pair",
                    project_dir => "../..",
                    generators => vec!["raw_order_generator", "chain_generator"],
                    verifier => "verifier",
                },
            )
            .unwrap();
        assert!(text.contains("PROJECT_DIR := ../.."));
        assert!(text.contains("raw_order_generator: raw_order_generator.cpp\n\t$(CXX)"));
        assert!(text.contains("verifier: verifier.cpp"));
    }

    #[test]
    fn test_override_directory_replaces_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MAKEFILE_TEMPLATE), "custom {{ test_name }}").unwrap();

        let templates = TemplateSet::with_overrides(dir.path()).unwrap();
        let text = templates
            .render(MAKEFILE_TEMPLATE, &context! { test_name => "pair" })
            .unwrap();
        assert_eq!(text, "custom pair");

        // others stay embedded
        assert!(templates
            .render(GENERATOR_TEMPLATE, &context! { fragment => "", entry => "0" })
            .unwrap()
            .contains("enumerateMarkers"));
    }

    #[test]
    fn test_missing_override_directory() {
        let err = TemplateSet::with_overrides(Path::new("/nonexistent/resources")).unwrap_err();
        assert!(matches!(err, TemplateError::IoError(_)));
    }

    #[test]
    fn test_broken_override_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VERIFIER_TEMPLATE), "{% for x in %}").unwrap();
        let err = TemplateSet::with_overrides(dir.path()).unwrap_err();
        assert!(matches!(err, TemplateError::ParseError(_, _)));
    }
}
