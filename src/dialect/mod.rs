//! SQL dialect capability queries and function-template rendering.
//!
//! The dialect capability tables live outside this crate; the translator
//! consumes them as a lookup service: "does the target dialect support X" and
//! "how does it spell this function".

use std::collections::HashMap;

/// Capability and rendering queries against the target SQL dialect.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// ANSI `join ... on` syntax. Dialects without it get theta-style joins:
    /// comma-separated tables with the join condition in the WHERE clause.
    fn supports_ansi_joins(&self) -> bool {
        true
    }

    /// `on conflict` clauses on INSERT.
    fn supports_conflict_clause(&self) -> bool {
        true
    }

    /// `for update` row-locking clauses on SELECT.
    fn supports_for_update(&self) -> bool {
        true
    }

    /// Rendering template for a function name, if the dialect registers one.
    /// Calls without a template are emitted literally as written.
    fn function_template(&self, name: &str) -> Option<&FunctionTemplate>;

    /// Name of the temporary id table used by multi-table bulk operations.
    fn temporary_id_table_name(&self, base_table: &str) -> String {
        format!("ht_{base_table}")
    }
}

/// A function rendering template with `?1`-style argument slots, e.g.
/// `substring(?1 from ?2 for ?3)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionTemplate {
    chunks: Vec<TemplateChunk>,
}

#[derive(Debug, Clone, PartialEq)]
enum TemplateChunk {
    Text(String),
    /// 0-based argument index.
    Arg(usize),
}

impl FunctionTemplate {
    /// Parses a template string. `?N` references the N-th argument (1-based
    /// in the template text, as dialect authors write them).
    pub fn parse(template: &str) -> Self {
        let mut chunks = Vec::new();
        let mut text = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '?' && matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
                if !text.is_empty() {
                    chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                }
                let mut ordinal = 0usize;
                while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                    ordinal = ordinal * 10 + d as usize;
                    chars.next();
                }
                chunks.push(TemplateChunk::Arg(ordinal.saturating_sub(1)));
            } else {
                text.push(c);
            }
        }
        if !text.is_empty() {
            chunks.push(TemplateChunk::Text(text));
        }
        Self { chunks }
    }

    /// Renders the template against collected argument strings. Referencing
    /// a missing argument is an error surfaced through the generator's
    /// diagnostics.
    pub fn render(&self, args: &[String]) -> Result<String, String> {
        let mut out = String::new();
        for chunk in &self.chunks {
            match chunk {
                TemplateChunk::Text(text) => out.push_str(text),
                TemplateChunk::Arg(index) => match args.get(*index) {
                    Some(arg) => out.push_str(arg),
                    None => {
                        return Err(format!(
                            "function template references argument {} but only {} were supplied",
                            index + 1,
                            args.len()
                        ));
                    }
                },
            }
        }
        Ok(out)
    }
}

/// A generic ANSI-ish dialect with a standard function registry.
pub struct GenericDialect {
    functions: HashMap<String, FunctionTemplate>,
}

impl GenericDialect {
    pub fn new() -> Self {
        let mut dialect = Self {
            functions: HashMap::new(),
        };
        dialect.register("upper", "upper(?1)");
        dialect.register("lower", "lower(?1)");
        dialect.register("length", "char_length(?1)");
        dialect.register("trim", "trim(?1)");
        dialect.register("abs", "abs(?1)");
        dialect.register("mod", "(?1 % ?2)");
        dialect.register("concat", "(?1 || ?2)");
        dialect.register("substring", "substring(?1 from ?2 for ?3)");
        dialect
    }

    /// Registers (or replaces) a function template.
    pub fn register(&mut self, name: &str, template: &str) {
        self.functions
            .insert(name.to_ascii_lowercase(), FunctionTemplate::parse(template));
    }
}

impl Default for GenericDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn function_template(&self, name: &str) -> Option<&FunctionTemplate> {
        self.functions.get(&name.to_ascii_lowercase())
    }
}

/// A dialect for engines without ANSI join syntax or conflict clauses; joins
/// render theta-style and conflict clauses are rejected during analysis.
pub struct LegacyDialect {
    inner: GenericDialect,
}

impl LegacyDialect {
    pub fn new() -> Self {
        Self {
            inner: GenericDialect::new(),
        }
    }
}

impl Default for LegacyDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for LegacyDialect {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn supports_ansi_joins(&self) -> bool {
        false
    }

    fn supports_conflict_clause(&self) -> bool {
        false
    }

    fn supports_for_update(&self) -> bool {
        false
    }

    fn function_template(&self, name: &str) -> Option<&FunctionTemplate> {
        self.inner.function_template(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_renders_in_argument_order() {
        let template = FunctionTemplate::parse("substring(?1 from ?2 for ?3)");
        let rendered = template
            .render(&["e.name".into(), "1".into(), "3".into()])
            .unwrap();
        assert_eq!(rendered, "substring(e.name from 1 for 3)");
    }

    #[test]
    fn template_missing_argument_is_an_error() {
        let template = FunctionTemplate::parse("mod(?1, ?2)");
        assert!(template.render(&["x".into()]).is_err());
    }

    #[test]
    fn unregistered_function_has_no_template() {
        let dialect = GenericDialect::new();
        assert!(dialect.function_template("upper").is_some());
        assert!(dialect.function_template("bit_reverse").is_none());
    }
}
