//! An object-query to SQL translation engine.
//!
//! This crate is the query-compilation core of the Lattice object-relational
//! mapper: it compiles a declarative object-query language (select / insert /
//! update / delete over mapped entities and association paths) into
//! executable relational SQL. The pipeline is a three-phase compiler:
//!
//! 1. lexing and recursive-descent parsing into a query AST, followed by a
//!    constant-folding pass;
//! 2. semantic analysis resolving every path against domain-model metadata
//!    into a relational AST of joined from-elements;
//! 3. dialect-directed SQL text generation, with executor selection for
//!    multi-table data-modification statements.
//!
//! Mapping metadata, dialect capabilities, filter configuration, and constant
//! resolution are consumed through narrow traits; sessions, caching and
//! object hydration live elsewhere in the engine.

mod diagnostics;
mod error;

pub mod dialect;
pub mod execution;
pub mod generation;
pub mod metadata;
pub mod parsing;
pub mod semantic;
pub mod translator;
pub mod types;

pub use diagnostics::{Diagnostic, DiagnosticsCollector};
pub use dialect::{Dialect, FunctionTemplate, GenericDialect, LegacyDialect};
pub use error::{Error, Result};
pub use execution::StatementExecutor;
pub use metadata::{
    EntityMapping, FilterDefinition, Metamodel, MetamodelRegistry, PropertyKind, PropertyMapping,
};
pub use parsing::{ConstantResolver, NoConstants};
pub use translator::{CompiledQuery, QueryOptions, QueryTranslator};
pub use types::{DataType, Value};
