//! The query translator: drives the whole pipeline and guards compilation.
//!
//! One translator instance holds one (query string, filter set, shallow flag)
//! combination. `compile` runs the pipeline at most once per instance — the
//! guard is an explicit `{Uncompiled, Compiling, Compiled}` state machine
//! behind a mutex, so concurrent callers on the same instance are excluded
//! while the work happens and every later call just returns the compiled
//! artifacts. Callers cache translators keyed by their inputs and rebind
//! parameter values per execution.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dialect::Dialect;
use crate::diagnostics::DiagnosticsCollector;
use crate::error::{Error, Result};
use crate::execution::{self, StatementExecutor};
use crate::generation;
use crate::metadata::Metamodel;
use crate::parsing::{self, ConstantResolver};
use crate::semantic::analyzer::FilterArguments;
use crate::semantic::statement::{ParameterKind, ParameterSpec, StatementKind, TranslatedStatement};
use crate::types::DataType;

/// Per-translator compilation inputs beyond the query text.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Only scalar/identifier projections are needed; fetch joins are elided
    /// and entity selections collapse to their identifiers.
    pub shallow: bool,
    /// Macro-style token substitutions applied during lexing.
    pub token_replacements: HashMap<String, String>,
    /// Enabled filter names with their parameter bindings.
    pub enabled_filters: BTreeMap<String, FilterArguments>,
    /// Append a row-locking clause to generated SELECT statements.
    pub for_update: bool,
}

/// Everything a compiled query exposes to the engine. Retained (with the
/// relational AST) for as long as the caller caches the compilation.
#[derive(Debug)]
pub struct CompiledQuery {
    pub query: String,
    /// Generated SQL; more than one statement only for multi-table DML.
    pub sql: Vec<String>,
    /// Bind specifications in marker-emission order: the n-th `?` in `sql`
    /// binds the n-th entry.
    pub parameters: Vec<ParameterSpec>,
    /// Named parameter name to bind positions (a name may occur repeatedly).
    pub named_parameter_positions: BTreeMap<String, Vec<usize>>,
    /// Result types per tuple element, SELECT only.
    pub return_types: Vec<DataType>,
    /// Output column aliases per tuple element, SELECT only.
    pub column_names: Vec<Vec<String>>,
    /// Tables the statement touches, for cache invalidation.
    pub query_spaces: std::collections::BTreeSet<String>,
    /// Execution strategy, DML only.
    pub executor: Option<StatementExecutor>,
    /// The relational AST generation ran over, kept for regeneration and
    /// introspection.
    pub statement: TranslatedStatement,
}

enum CompileState {
    Uncompiled,
    Compiling,
    Compiled(Arc<CompiledQuery>),
}

/// Compiles one query string into SQL, at most once.
pub struct QueryTranslator {
    query: String,
    options: QueryOptions,
    state: Mutex<CompileState>,
}

impl QueryTranslator {
    pub fn new(query: impl Into<String>, options: QueryOptions) -> Self {
        Self {
            query: query.into(),
            options,
            state: Mutex::new(CompileState::Uncompiled),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Whether this translator already holds compiled artifacts.
    pub fn is_compiled(&self) -> bool {
        matches!(&*self.state.lock(), CompileState::Compiled(_))
    }

    /// Compile or join: runs the pipeline under the state lock, or returns
    /// the artifacts a previous call produced. A failed compilation leaves
    /// the translator uncompiled, so the caller may correct inputs and retry.
    pub fn compile(
        &self,
        metamodel: &dyn Metamodel,
        dialect: &dyn Dialect,
        constants: &dyn ConstantResolver,
    ) -> Result<Arc<CompiledQuery>> {
        let mut state = self.state.lock();
        match &*state {
            CompileState::Compiled(compiled) => return Ok(compiled.clone()),
            CompileState::Compiling => {
                // The lock excludes concurrent compilers, so observing this
                // state means the same thread re-entered the pipeline.
                return Err(Error::Internal(
                    "reentrant compilation of a query translator".to_string(),
                ));
            }
            CompileState::Uncompiled => {}
        }
        *state = CompileState::Compiling;
        match self.do_compile(metamodel, dialect, constants) {
            Ok(compiled) => {
                let compiled = Arc::new(compiled);
                *state = CompileState::Compiled(compiled.clone());
                Ok(compiled)
            }
            Err(error) => {
                *state = CompileState::Uncompiled;
                Err(error)
            }
        }
    }

    fn do_compile(
        &self,
        metamodel: &dyn Metamodel,
        dialect: &dyn Dialect,
        constants: &dyn ConstantResolver,
    ) -> Result<CompiledQuery> {
        tracing::debug!(query = %self.query, shallow = self.options.shallow, "compiling query");
        let mut diag = DiagnosticsCollector::new();

        // Phase 1: lex and parse.
        let ast = parsing::parse(&self.query, &self.options.token_replacements, &mut diag);
        diag.checkpoint(&self.query)?;
        let mut ast = ast.ok_or_else(|| {
            Error::Internal("parser produced neither a statement nor diagnostics".to_string())
        })?;

        // Phase 2: constant folding, then semantic analysis.
        parsing::fold_constants(&mut ast, constants);
        let analyzer = crate::semantic::SemanticAnalyzer::new(
            metamodel,
            dialect,
            &self.options.enabled_filters,
            self.options.shallow,
            &mut diag,
        );
        let translated = analyzer.analyze(ast)?;
        diag.checkpoint(&self.query)?;
        let translated = translated.ok_or_else(|| {
            Error::Internal("analysis produced neither a statement nor diagnostics".to_string())
        })?;
        tracing::trace!(
            parameters = translated.parameters.len(),
            query_spaces = ?translated.query_spaces,
            "semantic analysis complete"
        );

        // Phase 3: SQL generation (via the executor for DML).
        let (sql, param_order, executor) = if translated.needs_executor() {
            let plan = execution::build_dml(&translated, metamodel, dialect, &mut diag)?;
            (plan.sql, plan.params, Some(plan.executor))
        } else {
            let mut generated = generation::generate(&translated, dialect, &mut diag);
            if self.options.for_update {
                if dialect.supports_for_update() {
                    generated.sql.push_str(" for update");
                } else {
                    diag.warn(format!(
                        "dialect '{}' does not support for update; lock request ignored",
                        dialect.name()
                    ));
                }
            }
            (vec![generated.sql], generated.params, None)
        };
        diag.checkpoint(&self.query)?;

        let parameters: Vec<ParameterSpec> = param_order
            .iter()
            .map(|&index| translated.parameters[index].clone())
            .collect();
        let mut named_parameter_positions: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (position, spec) in parameters.iter().enumerate() {
            if let ParameterKind::Named(name) = &spec.kind {
                named_parameter_positions
                    .entry(name.clone())
                    .or_default()
                    .push(position);
            }
        }

        let (return_types, column_names) = match &translated.kind {
            StatementKind::Select(node) => {
                let result: Vec<_> = node
                    .selections
                    .iter()
                    .filter(|s| !s.is_fetched())
                    .collect();
                (
                    result.iter().map(|s| s.data_type().clone()).collect(),
                    result.iter().map(|s| s.column_aliases()).collect(),
                )
            }
            _ => (Vec::new(), Vec::new()),
        };

        tracing::debug!(sql = %sql[0], statements = sql.len(), parameters = parameters.len(), "query compiled");
        Ok(CompiledQuery {
            query: self.query.clone(),
            sql,
            parameters,
            named_parameter_positions,
            return_types,
            column_names,
            query_spaces: translated.query_spaces.clone(),
            executor,
            statement: translated,
        })
    }
}

impl CompiledQuery {
    /// Regenerates SQL from the retained relational AST. Generation is a
    /// pure function of the tree and dialect, so for an unchanged compilation
    /// the output is byte-identical.
    pub fn regenerate(
        &self,
        metamodel: &dyn Metamodel,
        dialect: &dyn Dialect,
    ) -> Result<Vec<String>> {
        let mut diag = DiagnosticsCollector::new();
        let sql = if self.statement.needs_executor() {
            execution::build_dml(&self.statement, metamodel, dialect, &mut diag)?.sql
        } else {
            vec![generation::generate(&self.statement, dialect, &mut diag).sql]
        };
        diag.checkpoint(&self.query)?;
        Ok(sql)
    }
}
