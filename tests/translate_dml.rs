//! DML translation: executor selection, multi-table strategies, insert
//! validation and conflict clauses.

mod common;

use common::{compile, compile_with, model, sql};
use lattice_sql::execution::{self, StatementExecutor};
use lattice_sql::parsing::ast as qast;
use lattice_sql::semantic::ParameterKind;
use lattice_sql::translator::QueryOptions;
use lattice_sql::{DiagnosticsCollector, Error, GenericDialect, LegacyDialect};

#[test]
fn single_table_update_is_one_statement() {
    let compiled = compile("update Employee e set e.name = 'x' where e.id = 1").unwrap();
    assert_eq!(compiled.executor, Some(StatementExecutor::Basic));
    assert_eq!(
        sql(&compiled),
        "update employee set name = 'x' where id = 1"
    );
    assert!(compiled.query_spaces.contains("employee"));
}

#[test]
fn single_table_delete_renders_unaliased() {
    let compiled = compile("delete from Employee e where e.status = 9").unwrap();
    assert_eq!(compiled.executor, Some(StatementExecutor::Basic));
    assert_eq!(sql(&compiled), "delete from employee where status = 9");
}

#[test]
fn multi_table_update_selects_ids_then_updates_each_table() {
    let compiled = compile("update Contract set rate = :r where client = :c").unwrap();

    assert_eq!(compiled.executor, Some(StatementExecutor::MultiTableUpdate));
    assert_eq!(compiled.sql.len(), 2, "got: {:?}", compiled.sql);
    assert_eq!(
        compiled.sql[0],
        "insert into ht_contract select id from contract where client = ?"
    );
    assert_eq!(
        compiled.sql[1],
        "update contract_terms set rate = ? where id in (select id from ht_contract)"
    );
    // Bind order follows statement emission order: the restriction binds
    // before the assignment, even though the query text says otherwise.
    assert_eq!(
        compiled.parameters[0].kind,
        ParameterKind::Named("c".to_string())
    );
    assert_eq!(
        compiled.parameters[1].kind,
        ParameterKind::Named("r".to_string())
    );
    assert!(compiled.query_spaces.contains("contract_terms"));
}

#[test]
fn multi_table_update_touching_both_tables() {
    let compiled =
        compile("update Contract set client = 'ACME', rate = 10 where id = 5").unwrap();
    assert_eq!(compiled.sql.len(), 3, "got: {:?}", compiled.sql);
    assert!(compiled.sql[1].starts_with("update contract set client = 'ACME'"));
    assert!(compiled.sql[2].starts_with("update contract_terms set rate = 10"));
}

#[test]
fn multi_table_delete_removes_secondary_rows_first() {
    let compiled = compile("delete Contract where client = 'ACME'").unwrap();

    assert_eq!(compiled.executor, Some(StatementExecutor::MultiTableDelete));
    assert_eq!(
        compiled.sql,
        vec![
            "insert into ht_contract select id from contract where client = 'ACME'".to_string(),
            "delete from contract_terms where id in (select id from ht_contract)".to_string(),
            "delete from contract where id in (select id from ht_contract)".to_string(),
        ]
    );
}

#[test]
fn bulk_statements_reject_implied_joins() {
    let error = compile("delete from Employee e where e.department.name = 'Sales'").unwrap_err();
    assert!(
        error.to_string().contains("bulk statement"),
        "got: {error}"
    );
}

#[test]
fn insert_from_select_compiles() {
    let compiled = compile(
        "insert into Project (id, title) select e.id, e.name from Employee e where e.status = 1",
    )
    .unwrap();
    assert_eq!(compiled.executor, Some(StatementExecutor::Basic));
    let sql = sql(&compiled);
    assert!(sql.starts_with("insert into project (id, title) select"), "got: {sql}");
    assert!(compiled.query_spaces.contains("project"));
    assert!(compiled.query_spaces.contains("employee"));
}

#[test]
fn insert_values_binds_target_types() {
    let compiled = compile("insert into Project (id, title) values (:id, :title)").unwrap();
    assert_eq!(
        sql(&compiled),
        "insert into project (id, title) values (?, ?)"
    );
    assert_eq!(
        compiled.parameters[0].expected_type,
        Some(lattice_sql::DataType::Long)
    );
    assert_eq!(
        compiled.parameters[1].expected_type,
        Some(lattice_sql::DataType::Text)
    );
}

#[test]
fn insert_arity_mismatch_is_a_semantic_error() {
    let error = compile("insert into Project (id, title) values (1)").unwrap_err();
    assert!(
        error.to_string().contains("arity"),
        "got: {error}"
    );
}

#[test]
fn insert_select_arity_mismatch_is_a_semantic_error() {
    let error =
        compile("insert into Project (id, title) select e.id from Employee e").unwrap_err();
    assert!(
        error.to_string().contains("did not match"),
        "got: {error}"
    );
}

#[test]
fn insert_type_mismatch_is_a_semantic_error() {
    let error = compile("insert into Project (id, title) values ('x', 'y')").unwrap_err();
    assert!(
        error.to_string().contains("type mismatch"),
        "got: {error}"
    );
}

#[test]
fn insert_into_secondary_table_property_is_rejected() {
    let error = compile("insert into Contract (id, rate) values (1, 10)").unwrap_err();
    assert!(
        error.to_string().contains("primary table"),
        "got: {error}"
    );
}

#[test]
fn conflict_clause_with_property_targets() {
    let compiled = compile(
        "insert into Project (id, title) values (1, 'a') \
         on conflict (id) do update set title = 'b'",
    )
    .unwrap();
    assert_eq!(
        sql(&compiled),
        "insert into project (id, title) values (1, 'a') \
         on conflict (id) do update set title = 'b'"
    );
}

#[test]
fn conflict_clause_with_constraint_name_does_nothing() {
    let compiled = compile(
        "insert into Project (id, title) values (1, 'a') \
         on conflict on constraint project_pk do nothing",
    )
    .unwrap();
    assert_eq!(
        sql(&compiled),
        "insert into project (id, title) values (1, 'a') \
         on conflict on constraint project_pk do nothing"
    );
}

#[test]
fn conflict_clause_requires_dialect_support() {
    let error = compile_with(
        "insert into Project (id, title) values (1, 'a') on conflict (id) do nothing",
        QueryOptions::default(),
        &LegacyDialect::new(),
    )
    .unwrap_err();
    assert!(
        error.to_string().contains("conflict"),
        "got: {error}"
    );
}

#[test]
fn conflict_target_invariant_is_internal() {
    // The grammar cannot produce both a constraint name and a property list;
    // hand-building that shape must trip the hard invariant.
    use lattice_sql::semantic::SemanticAnalyzer;

    let registry = model();
    let dialect = GenericDialect::new();
    let filters = Default::default();
    let mut diag = DiagnosticsCollector::new();

    let path = |name: &str| qast::PathExpr::new(vec![name.to_string()], 1, 1);
    let statement = qast::Statement::Insert(Box::new(qast::InsertStatement {
        entity: path("Project"),
        properties: vec![path("id")],
        source: qast::InsertSource::Values(vec![vec![qast::Expression::Literal(
            qast::Literal::Integer(1),
        )]]),
        on_conflict: Some(qast::OnConflict {
            constraint_name: Some("project_pk".to_string()),
            constraint_paths: vec![path("id")],
            update_assignments: vec![],
        }),
    }));

    let analyzer = SemanticAnalyzer::new(&registry, &dialect, &filters, false, &mut diag);
    match analyzer.analyze(statement) {
        Err(Error::Internal(message)) => {
            assert!(message.contains("constraint"), "got: {message}");
        }
        other => panic!("expected internal error, got {other:?}"),
    }
}

#[test]
fn executor_selection_rejects_select_statements() {
    let compiled = compile("from Employee").unwrap();
    let registry = model();
    match execution::select_executor(&compiled.statement, &registry) {
        Err(Error::Internal(message)) => {
            assert!(message.contains("loader"), "got: {message}");
        }
        other => panic!("expected internal error, got {other:?}"),
    }
}

#[test]
fn update_type_mismatch_is_a_semantic_error() {
    let error = compile("update Employee e set e.salary = 'lots'").unwrap_err();
    assert!(
        error.to_string().contains("type mismatch"),
        "got: {error}"
    );
}
