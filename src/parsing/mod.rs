//! Lexical and syntactic analysis for the object query language.
//!
//! This module turns raw query text into a syntax tree: the lexer produces
//! positioned tokens (with soft-keyword tagging), the recursive-descent
//! parser builds the AST with clause-level error recovery, and the
//! constant-folding pass collapses static-constant references into literals
//! before semantic analysis sees the tree.

pub mod ast;
pub mod fold;
mod lexer;
mod parser;

use std::collections::HashMap;

use crate::diagnostics::DiagnosticsCollector;

pub use ast::Statement;
pub use fold::{fold_constants, ConstantResolver, NoConstants};
pub use lexer::{Keyword, Lexer, Token, TokenKind};
pub use parser::Parser;

/// Lexes and parses a query string, reporting all diagnostics to `diag`.
/// Returns `None` when no usable AST could be built.
pub fn parse(
    text: &str,
    replacements: &HashMap<String, String>,
    diag: &mut DiagnosticsCollector,
) -> Option<Statement> {
    let tokens = Lexer::tokenize(text, replacements, diag);
    Parser::parse(tokens, diag)
}
