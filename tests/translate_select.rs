//! SELECT translation: projections, joins, filters, shallow compilation,
//! function templates, CTEs and subqueries.

mod common;

use common::{compile, compile_with, sql};
use lattice_sql::semantic::ParameterKind;
use lattice_sql::translator::QueryOptions;
use lattice_sql::{DataType, GenericDialect, LegacyDialect};

#[test]
fn simple_select_projects_all_mapped_columns() {
    let compiled = compile("from Employee").unwrap();
    let sql = sql(&compiled);

    assert!(sql.starts_with("select "), "got: {sql}");
    assert!(sql.contains(" from employee employee0_"), "got: {sql}");
    assert!(!sql.contains(" where "), "got: {sql}");
    for column in ["id", "name", "salary", "status", "department_id", "manager_id"] {
        assert!(
            sql.contains(&format!("employee0_.{column}")),
            "missing {column} in: {sql}"
        );
    }
    assert!(compiled.parameters.is_empty());
    assert_eq!(
        compiled.return_types,
        vec![DataType::Entity("Employee".to_string())]
    );
    assert_eq!(compiled.column_names.len(), 1);
    assert_eq!(compiled.column_names[0].len(), 6);
    assert!(compiled.query_spaces.contains("employee"));
}

#[test]
fn parameterized_association_id_needs_no_join() {
    let compiled = compile("from Employee e where e.department.id = :deptId").unwrap();
    let sql = sql(&compiled);

    assert!(
        sql.contains("where employee0_.department_id = ?"),
        "got: {sql}"
    );
    assert!(!sql.contains("join"), "fk comparison should not join: {sql}");
    assert_eq!(compiled.parameters.len(), 1);
    assert_eq!(
        compiled.parameters[0].kind,
        ParameterKind::Named("deptId".to_string())
    );
    assert_eq!(compiled.parameters[0].expected_type, Some(DataType::Long));
    assert_eq!(compiled.named_parameter_positions["deptId"], vec![0]);
}

#[test]
fn explicit_ansi_join_uses_space_separator() {
    let compiled = compile("from Employee e join e.department d").unwrap();
    let sql = sql(&compiled);

    assert!(
        sql.contains(
            "from employee employee0_ inner join department department1_ \
             on employee0_.department_id = department1_.id"
        ),
        "got: {sql}"
    );
    assert!(
        !sql.contains("employee0_, inner join"),
        "comma must not separate a join from its origin: {sql}"
    );
}

#[test]
fn unrelated_roots_are_comma_separated() {
    let compiled = compile("select e.name, p.title from Employee e, Project p").unwrap();
    let sql = sql(&compiled);
    assert!(
        sql.contains("from employee employee0_, project project1_"),
        "got: {sql}"
    );
}

#[test]
fn implied_join_from_path_navigation() {
    let compiled = compile("from Employee e where e.department.name = 'Sales'").unwrap();
    let sql = sql(&compiled);
    assert!(
        sql.contains("inner join department department1_"),
        "got: {sql}"
    );
    assert!(sql.contains("department1_.name = 'Sales'"), "got: {sql}");
}

#[test]
fn optional_association_implies_outer_join() {
    let compiled = compile("select e.manager.name from Employee e").unwrap();
    let sql = sql(&compiled);
    assert!(
        sql.contains("left outer join employee employee1_"),
        "got: {sql}"
    );
}

#[test]
fn implied_joins_are_reused_across_references() {
    let compiled =
        compile("from Employee e where e.department.name = 'Sales' and e.department.name <> 'Ops'")
            .unwrap();
    let sql = sql(&compiled);
    assert_eq!(
        sql.matches("join department").count(),
        1,
        "one implied join expected: {sql}"
    );
}

#[test]
fn legacy_dialect_renders_theta_joins() {
    let compiled = compile_with(
        "from Employee e join e.department d",
        QueryOptions::default(),
        &LegacyDialect::new(),
    )
    .unwrap();
    let sql = sql(&compiled);

    assert!(
        sql.contains("from employee employee0_, department department1_"),
        "theta join lists tables with a comma: {sql}"
    );
    assert!(!sql.contains("inner join"), "got: {sql}");
    assert!(
        sql.contains("where employee0_.department_id = department1_.id"),
        "theta condition goes to the where clause: {sql}"
    );
}

#[test]
fn enabled_filter_restricts_root() {
    let mut options = QueryOptions::default();
    options.enabled_filters.insert(
        "region".to_string(),
        [("regionId".to_string(), lattice_sql::Value::Integer(7))]
            .into_iter()
            .collect(),
    );
    let compiled = compile_with("from Department", options, &GenericDialect::new()).unwrap();
    let sql = sql(&compiled);

    assert!(
        sql.contains("where department0_.region_id = ?"),
        "got: {sql}"
    );
    assert_eq!(compiled.parameters.len(), 1);
    assert_eq!(
        compiled.parameters[0].kind,
        ParameterKind::Filter {
            filter: "region".to_string(),
            parameter: "regionId".to_string(),
        }
    );
    assert_eq!(
        compiled.parameters[0].expected_type,
        Some(DataType::Integer)
    );
}

#[test]
fn enabled_filter_joins_into_join_condition() {
    let mut options = QueryOptions::default();
    options.enabled_filters.insert(
        "region".to_string(),
        [("regionId".to_string(), lattice_sql::Value::Integer(7))]
            .into_iter()
            .collect(),
    );
    let compiled = compile_with(
        "from Employee e join e.department d",
        options,
        &GenericDialect::new(),
    )
    .unwrap();
    let sql = sql(&compiled);
    assert!(
        sql.contains("on employee0_.department_id = department1_.id and department1_.region_id = ?"),
        "filter belongs in the join condition: {sql}"
    );
}

#[test]
fn filter_without_argument_fails() {
    let mut options = QueryOptions::default();
    options
        .enabled_filters
        .insert("region".to_string(), Default::default());
    let error = compile_with("from Department", options, &GenericDialect::new()).unwrap_err();
    assert!(
        error.to_string().contains("regionId"),
        "got: {error}"
    );
}

#[test]
fn unknown_enabled_filter_fails() {
    let mut options = QueryOptions::default();
    options
        .enabled_filters
        .insert("tenant".to_string(), Default::default());
    let error = compile_with("from Department", options, &GenericDialect::new()).unwrap_err();
    assert!(
        error.to_string().contains("no filter configured"),
        "got: {error}"
    );
}

#[test]
fn fetch_join_loads_association_without_widening_the_result() {
    let compiled = compile("from Employee e left join fetch e.projects").unwrap();
    let sql = sql(&compiled);

    assert!(
        sql.contains("left outer join project project1_ on employee0_.id = project1_.employee_id"),
        "got: {sql}"
    );
    assert!(sql.contains("project1_.title"), "fetched columns: {sql}");
    // The fetched entity is loaded into its owner, not returned separately.
    assert_eq!(compiled.return_types.len(), 1);
}

#[test]
fn shallow_compilation_elides_fetch_and_projects_identifiers() {
    let options = QueryOptions {
        shallow: true,
        ..Default::default()
    };
    let compiled = compile_with(
        "from Employee e left join fetch e.projects",
        options,
        &GenericDialect::new(),
    )
    .unwrap();
    let sql = sql(&compiled);

    assert!(!sql.contains("project1_.title"), "got: {sql}");
    assert!(!sql.contains("employee0_.name"), "got: {sql}");
    assert!(sql.contains("employee0_.id"), "got: {sql}");
    assert_eq!(compiled.return_types, vec![DataType::Long]);
}

#[test]
fn registered_function_renders_through_template() {
    let compiled =
        compile("select substring(e.name, 1, 3) from Employee e where upper(e.name) = 'BOB'")
            .unwrap();
    let sql = sql(&compiled);
    assert!(
        sql.contains("substring(employee0_.name from 1 for 3)"),
        "got: {sql}"
    );
    assert!(sql.contains("upper(employee0_.name) = 'BOB'"), "got: {sql}");
}

#[test]
fn unregistered_function_is_emitted_literally() {
    let compiled = compile("select soundex(e.name) from Employee e").unwrap();
    assert!(
        sql(&compiled).contains("soundex(employee0_.name)"),
        "got: {}",
        sql(&compiled)
    );
}

#[test]
fn aggregates_group_by_and_order_by() {
    let compiled = compile(
        "select e.status, count(distinct e.id) from Employee e \
         group by e.status having count(e.id) > 1 order by e.status desc",
    )
    .unwrap();
    let sql = sql(&compiled);

    assert!(sql.contains("group by employee0_.status"), "got: {sql}");
    assert!(sql.contains("having count(employee0_.id) > 1"), "got: {sql}");
    assert!(sql.contains("count(distinct employee0_.id)"), "got: {sql}");
    assert!(sql.ends_with("order by employee0_.status desc"), "got: {sql}");
    assert_eq!(
        compiled.return_types,
        vec![DataType::Integer, DataType::Long]
    );
}

#[test]
fn order_by_may_reference_select_labels() {
    let compiled =
        compile("select e.name as label from Employee e order by label").unwrap();
    assert!(
        sql(&compiled).ends_with("order by label"),
        "got: {}",
        sql(&compiled)
    );
}

#[test]
fn constant_path_folds_to_literal() {
    let compiled = compile("from Employee e where e.status = Status.ACTIVE").unwrap();
    assert!(
        sql(&compiled).contains("employee0_.status = 1"),
        "got: {}",
        sql(&compiled)
    );
    assert!(compiled.parameters.is_empty());
}

#[test]
fn cte_and_correlated_subquery() {
    let compiled = compile(
        "with seniors as (select e.id from Employee e where e.salary > 100) \
         from Employee e where e.id in (select s.id from seniors s)",
    )
    .unwrap();
    let sql = sql(&compiled);

    assert!(sql.starts_with("with seniors as (select"), "got: {sql}");
    assert!(sql.contains("in (select"), "got: {sql}");
    assert!(sql.contains("from seniors"), "got: {sql}");
}

#[test]
fn exists_subquery_references_outer_alias() {
    let compiled = compile(
        "from Department d where exists \
         (select e.id from Employee e where e.department = d)",
    )
    .unwrap();
    let sql = sql(&compiled);
    assert!(
        sql.contains("exists (select") && sql.contains("employee1_.department_id = department0_.id"),
        "got: {sql}"
    );
}

#[test]
fn scalar_subquery_in_comparison() {
    let compiled = compile(
        "from Employee e where e.salary >= (select max(m.salary) from Employee m)",
    )
    .unwrap();
    assert!(
        sql(&compiled).contains(">= (select max(employee1_.salary)"),
        "got: {}",
        sql(&compiled)
    );
}

#[test]
fn for_update_respects_dialect_capability() {
    let options = QueryOptions {
        for_update: true,
        ..Default::default()
    };
    let compiled = compile_with("from Employee", options.clone(), &GenericDialect::new()).unwrap();
    assert!(sql(&compiled).ends_with(" for update"));

    let compiled = compile_with("from Employee", options, &LegacyDialect::new()).unwrap();
    assert!(!sql(&compiled).contains("for update"));
}

#[test]
fn secondary_table_property_joins_on_demand() {
    let compiled = compile("select c.rate from Contract c where c.client = 'ACME'").unwrap();
    let sql = sql(&compiled);

    assert!(
        sql.contains("inner join contract_terms contract_1_ on contract0_.id = contract_1_.id"),
        "got: {sql}"
    );
    assert!(sql.contains("contract_1_.rate"), "got: {sql}");
    assert!(sql.contains("contract0_.client = 'ACME'"), "got: {sql}");
}

#[test]
fn token_replacements_rewrite_identifiers() {
    let mut options = QueryOptions::default();
    options
        .token_replacements
        .insert("Person".to_string(), "Employee".to_string());
    let compiled = compile_with("from Person", options, &GenericDialect::new()).unwrap();
    assert!(sql(&compiled).contains("from employee employee0_"));
}
