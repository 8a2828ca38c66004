//! Semantic analysis: from the parsed query AST to the relational AST.
//!
//! The analyzer resolves entities, paths, joins, aliases and parameters
//! against the domain-model metadata and produces the tree SQL generation
//! walks. All user-level failures are semantic diagnostics; the relational
//! AST it returns is fully typed.

pub mod alias;
pub mod analyzer;
pub mod statement;

pub use analyzer::{FilterArguments, SemanticAnalyzer};
pub use statement::{
    FromElement, FromElementId, ParameterKind, ParameterSpec, Selection, SelectNode,
    StatementKind, TranslatedStatement,
};
