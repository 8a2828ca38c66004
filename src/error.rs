//! Error types for the query translation engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The single failure type surfaced to callers.
///
/// Phase-local diagnostics are accumulated in a
/// [`DiagnosticsCollector`](crate::diagnostics::DiagnosticsCollector) and only
/// converted into one of these at a compilation checkpoint, so a caller sees
/// one coherent failure per compile attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A positioned lexical or grammar error, carrying the original query text.
    #[error("{message} near line {line}, column {column} [{query}]")]
    Syntax {
        message: String,
        line: u32,
        column: u32,
        query: String,
    },

    /// Aggregate of all diagnostics collected for one compilation. The
    /// message joins every error string with newlines.
    #[error("{message} [{query}]")]
    Translation { message: String, query: String },

    /// A tree reached a phase in a shape the previous phase should have
    /// rejected. Always a defect in the translator, never a user error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The original query text, where the error carries one.
    pub fn query(&self) -> Option<&str> {
        match self {
            Error::Syntax { query, .. } | Error::Translation { query, .. } => Some(query),
            Error::Internal(_) => None,
        }
    }

    /// Source position, for positioned syntax errors.
    pub fn position(&self) -> Option<(u32, u32)> {
        match self {
            Error::Syntax { line, column, .. } => Some((*line, *column)),
            _ => None,
        }
    }
}
