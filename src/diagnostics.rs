//! Shared per-compilation diagnostics collector.
//!
//! Every phase of one compilation reports into the same collector; only at
//! defined checkpoints (end of parse, end of analysis, end of generation) is
//! it inspected and, if non-empty, translated into a single [`Error`]. The
//! collector is created fresh per compilation and never reused.

use crate::error::{Error, Result};

/// One recorded diagnostic, with an optional source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl Diagnostic {
    fn positioned(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
            column: Some(column),
        }
    }

    fn bare(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }
}

/// Accumulates errors and warnings across all phases of one compilation.
///
/// The first position-annotated (low-level recognition) error is tracked
/// separately: when the compilation fails it is preferred as the structured
/// exception, falling back to an aggregate of all error messages otherwise.
/// Warnings are recorded but never abort compilation.
#[derive(Debug, Default)]
pub struct DiagnosticsCollector {
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
    recognition: Option<Diagnostic>,
}

impl DiagnosticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a positioned lexical/grammar error.
    pub fn error_at(&mut self, message: impl Into<String>, line: u32, column: u32) {
        let diag = Diagnostic::positioned(message, line, column);
        tracing::debug!(message = %diag.message, line, column, "query diagnostic");
        if self.recognition.is_none() {
            self.recognition = Some(diag.clone());
        }
        self.errors.push(diag);
    }

    /// Report an unpositioned (semantic) error.
    pub fn error(&mut self, message: impl Into<String>) {
        let diag = Diagnostic::bare(message);
        tracing::debug!(message = %diag.message, "query diagnostic");
        self.errors.push(diag);
    }

    /// Report a non-fatal advisory diagnostic.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(Diagnostic::bare(message));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Phase checkpoint: clean means proceed, otherwise the collected state is
    /// folded into a single error for the caller.
    ///
    /// A recorded recognition error wins (it carries a position); otherwise
    /// all error strings are joined by newlines into one aggregate message.
    pub fn checkpoint(&self, query: &str) -> Result<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        if let Some(diag) = &self.recognition {
            return Err(Error::Syntax {
                message: diag.message.clone(),
                line: diag.line.unwrap_or(0),
                column: diag.column.unwrap_or(0),
                query: query.to_string(),
            });
        }
        let message = self
            .errors
            .iter()
            .map(|d| d.message.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Err(Error::Translation {
            message,
            query: query.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_checkpoint_passes() {
        let mut diag = DiagnosticsCollector::new();
        diag.warn("prefer explicit select list");
        assert!(diag.checkpoint("from Employee").is_ok());
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn recognition_error_is_preferred() {
        let mut diag = DiagnosticsCollector::new();
        diag.error("unknown entity Foo");
        diag.error_at("unexpected token", 1, 12);
        match diag.checkpoint("from Foo x x").unwrap_err() {
            Error::Syntax { line, column, .. } => {
                assert_eq!((line, column), (1, 12));
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn semantic_errors_aggregate_with_newlines() {
        let mut diag = DiagnosticsCollector::new();
        diag.error("first");
        diag.error("second");
        match diag.checkpoint("q").unwrap_err() {
            Error::Translation { message, query } => {
                assert_eq!(message, "first\nsecond");
                assert_eq!(query, "q");
            }
            other => panic!("expected translation error, got {other:?}"),
        }
    }
}
