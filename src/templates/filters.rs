//! Custom MiniJinja filters for code generation

use minijinja::Environment;

use crate::emit::cpp_string_literal;

/// Register all custom filters with the environment
pub fn register_filters(env: &mut Environment<'_>) {
    env.add_filter("indent", indent);
    env.add_filter("cpp_string", cpp_string);
}

/// Add indentation to each non-empty line
fn indent(value: &str, spaces: usize) -> String {
    let indent_str = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", indent_str, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Quote a value as a C string literal
fn cpp_string(value: &str) -> String {
    cpp_string_literal(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent() {
        assert_eq!(indent("foo\nbar", 4), "    foo\n    bar");
        assert_eq!(indent("foo\n\nbar", 2), "  foo\n\n  bar");
    }

    #[test]
    fn test_cpp_string() {
        assert_eq!(cpp_string("[N]->{ : N = 10 }"), "\"[N]->{ : N = 10 }\"");
        assert_eq!(cpp_string("say \"hi\""), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_filters_registered() {
        let mut env = Environment::new();
        register_filters(&mut env);
        let out = env
            .render_str("{{ v | cpp_string }}|{{ b | indent(2) }}", minijinja::context! { v => "x", b => "a\nb" })
            .unwrap();
        assert_eq!(out, "\"x\"|  a\n  b");
    }
}
