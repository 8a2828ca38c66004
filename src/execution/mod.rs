//! Statement-executor selection for data-modification statements.
//!
//! Pure decision logic over the finished relational AST: UPDATE/DELETE
//! against an entity mapped to multiple physical tables take the multi-table
//! strategy (select qualifying identifiers into a temporary id table, then
//! per-table DML in dependency order); everything else is a single SQL
//! statement. There is no fallback: a statement kind this module does not
//! recognize is a defect, not a recoverable condition.

use crate::dialect::Dialect;
use crate::diagnostics::DiagnosticsCollector;
use crate::error::{Error, Result};
use crate::generation::SqlGenerator;
use crate::metadata::{EntityMapping, Metamodel};
use crate::semantic::statement::{
    Assignment, FromElementId, SqlExpr, StatementKind, TranslatedStatement,
};

/// The chosen execution strategy for a DML statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementExecutor {
    /// One SQL statement.
    Basic,
    /// Id-select into a temporary table, then one UPDATE per affected table.
    MultiTableUpdate,
    /// Id-select into a temporary table, then one DELETE per table,
    /// secondary tables before the primary.
    MultiTableDelete,
}

/// The executor strategy plus the SQL statements it issues and the
/// parameter-spec indices in bind order across those statements.
#[derive(Debug, Clone)]
pub struct ExecutorPlan {
    pub executor: StatementExecutor,
    pub sql: Vec<String>,
    pub params: Vec<usize>,
}

/// Chooses the execution strategy for a DML statement. SELECT statements
/// take a loader, never an executor; routing one here is an internal error.
pub fn select_executor(
    statement: &TranslatedStatement,
    metamodel: &dyn Metamodel,
) -> Result<StatementExecutor> {
    match &statement.kind {
        StatementKind::Update { element, .. } => {
            let mapping = element_mapping(statement, *element, metamodel)?;
            if mapping.is_multi_table() {
                Ok(StatementExecutor::MultiTableUpdate)
            } else {
                Ok(StatementExecutor::Basic)
            }
        }
        StatementKind::Delete { element, .. } => {
            let mapping = element_mapping(statement, *element, metamodel)?;
            if mapping.is_multi_table() {
                Ok(StatementExecutor::MultiTableDelete)
            } else {
                Ok(StatementExecutor::Basic)
            }
        }
        StatementKind::Insert { .. } => Ok(StatementExecutor::Basic),
        StatementKind::Select(_) => Err(Error::Internal(
            "select statements take a loader, not an executor".to_string(),
        )),
    }
}

/// Builds the SQL statement list for a DML statement under its selected
/// executor.
pub fn build_dml(
    statement: &TranslatedStatement,
    metamodel: &dyn Metamodel,
    dialect: &dyn Dialect,
    diag: &mut DiagnosticsCollector,
) -> Result<ExecutorPlan> {
    let executor = select_executor(statement, metamodel)?;
    match executor {
        StatementExecutor::Basic => {
            let generated = crate::generation::generate(statement, dialect, diag);
            Ok(ExecutorPlan {
                executor,
                sql: vec![generated.sql],
                params: generated.params,
            })
        }
        StatementExecutor::MultiTableUpdate => {
            let StatementKind::Update {
                element,
                assignments,
                r#where,
            } = &statement.kind
            else {
                unreachable!("executor selection matched update");
            };
            let mapping = element_mapping(statement, *element, metamodel)?;
            build_multi_table_update(
                statement,
                mapping,
                assignments,
                r#where.as_ref(),
                dialect,
                diag,
            )
            .map(|(sql, params)| ExecutorPlan {
                executor,
                sql,
                params,
            })
        }
        StatementExecutor::MultiTableDelete => {
            let StatementKind::Delete { element, r#where } = &statement.kind else {
                unreachable!("executor selection matched delete");
            };
            let mapping = element_mapping(statement, *element, metamodel)?;
            let (sql, params) =
                build_multi_table_delete(statement, mapping, r#where.as_ref(), dialect, diag);
            Ok(ExecutorPlan {
                executor,
                sql,
                params,
            })
        }
    }
}

fn element_mapping<'m>(
    statement: &TranslatedStatement,
    element: FromElementId,
    metamodel: &'m dyn Metamodel,
) -> Result<&'m EntityMapping> {
    let entity = statement
        .arena
        .get(element)
        .entity
        .as_ref()
        .ok_or_else(|| Error::Internal("DML target element has no entity".to_string()))?;
    metamodel
        .entity(entity)
        .ok_or_else(|| Error::Internal(format!("DML target entity '{entity}' is not mapped")))
}

/// The id-select feeding a multi-table operation:
/// `insert into <temp> select <id> from <root> where ...`.
fn id_select(
    statement: &TranslatedStatement,
    mapping: &EntityMapping,
    predicate: Option<&SqlExpr>,
    dialect: &dyn Dialect,
    diag: &mut DiagnosticsCollector,
) -> (String, Vec<usize>) {
    let temp_table = dialect.temporary_id_table_name(&mapping.table);
    let mut generator = SqlGenerator::new(&statement.arena, dialect, diag);
    generator.raw(&format!(
        "insert into {} select {} from {}",
        temp_table,
        mapping.id.columns.join(", "),
        mapping.table
    ));
    if let Some(predicate) = predicate {
        generator.raw(" where ");
        generator.unqualified();
        generator.expr(predicate);
    }
    let generated = generator.finish();
    (generated.sql, generated.params)
}

fn id_restriction(mapping: &EntityMapping, dialect: &dyn Dialect) -> String {
    let temp_table = dialect.temporary_id_table_name(&mapping.table);
    let id_columns = mapping.id.columns.join(", ");
    if mapping.id.columns.len() == 1 {
        format!(
            "{id_columns} in (select {id_columns} from {temp_table})"
        )
    } else {
        format!(
            "({id_columns}) in (select {id_columns} from {temp_table})"
        )
    }
}

fn build_multi_table_update(
    statement: &TranslatedStatement,
    mapping: &EntityMapping,
    assignments: &[Assignment],
    predicate: Option<&SqlExpr>,
    dialect: &dyn Dialect,
    diag: &mut DiagnosticsCollector,
) -> Result<(Vec<String>, Vec<usize>)> {
    let mut sql = Vec::new();
    let mut params = Vec::new();

    let (select_sql, select_params) = id_select(statement, mapping, predicate, dialect, diag);
    sql.push(select_sql);
    params.extend(select_params);

    // One UPDATE per table that receives assignments, primary table first.
    for table in 0..=mapping.secondary_tables.len() {
        let table_assignments: Vec<_> =
            assignments.iter().filter(|a| a.table == table).collect();
        if table_assignments.is_empty() {
            continue;
        }
        let mut generator = SqlGenerator::new(&statement.arena, dialect, diag);
        generator.raw(&format!("update {} set ", mapping.table_name(table)));
        generator.unqualified();
        for (index, assignment) in table_assignments.iter().enumerate() {
            if index > 0 {
                generator.raw(", ");
            }
            generator.raw(&assignment.column);
            generator.raw(" = ");
            generator.expr(&assignment.value);
        }
        generator.raw(" where ");
        generator.raw(&id_restriction(mapping, dialect));
        let generated = generator.finish();
        sql.push(generated.sql);
        params.extend(generated.params);
    }

    if sql.len() < 2 {
        return Err(Error::Internal(
            "multi-table update produced no per-table statements".to_string(),
        ));
    }
    Ok((sql, params))
}

fn build_multi_table_delete(
    statement: &TranslatedStatement,
    mapping: &EntityMapping,
    predicate: Option<&SqlExpr>,
    dialect: &dyn Dialect,
    diag: &mut DiagnosticsCollector,
) -> (Vec<String>, Vec<usize>) {
    let mut sql = Vec::new();
    let mut params = Vec::new();

    let (select_sql, select_params) = id_select(statement, mapping, predicate, dialect, diag);
    sql.push(select_sql);
    params.extend(select_params);

    // Dependency order: rows of secondary tables reference the primary row,
    // so they go first.
    let restriction = id_restriction(mapping, dialect);
    for table in mapping
        .secondary_tables
        .iter()
        .map(|s| s.as_str())
        .chain(std::iter::once(mapping.table.as_str()))
    {
        sql.push(format!("delete from {table} where {restriction}"));
    }

    (sql, params)
}
