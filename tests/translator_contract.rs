//! Translator-level contracts: compile-once idempotence, byte-identical
//! regeneration, parameter ordering, and error shaping.

mod common;

use common::{compile, model, sql, Constants};
use lattice_sql::semantic::ParameterKind;
use lattice_sql::translator::{QueryOptions, QueryTranslator};
use lattice_sql::{Error, GenericDialect};
use std::sync::Arc;

#[test]
fn compile_is_idempotent_per_translator() {
    let registry = model();
    let dialect = GenericDialect::new();
    let translator = QueryTranslator::new(
        "from Employee e where e.salary > :min",
        QueryOptions::default(),
    );

    assert!(!translator.is_compiled());
    let first = translator.compile(&registry, &dialect, &Constants).unwrap();
    assert!(translator.is_compiled());
    let second = translator.compile(&registry, &dialect, &Constants).unwrap();
    assert!(
        Arc::ptr_eq(&first, &second),
        "second compile must return the same artifacts"
    );
}

#[test]
fn concurrent_compilation_happens_once() {
    let registry = Arc::new(model());
    let dialect = Arc::new(GenericDialect::new());
    let translator = Arc::new(QueryTranslator::new(
        "from Employee e where e.department.id = :d",
        QueryOptions::default(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let translator = translator.clone();
            let registry = registry.clone();
            let dialect = dialect.clone();
            std::thread::spawn(move || {
                translator
                    .compile(registry.as_ref(), dialect.as_ref(), &Constants)
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for result in &results[1..] {
        assert!(Arc::ptr_eq(&results[0], result));
    }
}

#[test]
fn regeneration_is_byte_identical() {
    let registry = model();
    let dialect = GenericDialect::new();
    let compiled = compile(
        "select e.name from Employee e join e.department d \
         where d.name like :pattern order by e.name",
    )
    .unwrap();

    let first = compiled.regenerate(&registry, &dialect).unwrap();
    let second = compiled.regenerate(&registry, &dialect).unwrap();
    assert_eq!(first, compiled.sql);
    assert_eq!(first, second);
}

#[test]
fn multi_table_regeneration_is_stable() {
    let registry = model();
    let dialect = GenericDialect::new();
    let compiled = compile("update Contract set rate = 1 where client = 'a'").unwrap();
    let regenerated = compiled.regenerate(&registry, &dialect).unwrap();
    assert_eq!(regenerated, compiled.sql);
}

#[test]
fn parameter_order_matches_marker_order_for_mixed_styles() {
    let compiled = compile(
        "select e.name from Employee e \
         where e.status = :s and e.salary > ? and e.id in (?4, :s)",
    )
    .unwrap();

    let markers = sql(&compiled).matches('?').count();
    assert_eq!(markers, compiled.parameters.len());
    assert_eq!(
        compiled
            .parameters
            .iter()
            .map(|p| p.kind.clone())
            .collect::<Vec<_>>(),
        vec![
            ParameterKind::Named("s".to_string()),
            ParameterKind::Positional(0),
            ParameterKind::Ordinal(4),
            ParameterKind::Named("s".to_string()),
        ]
    );
    assert_eq!(compiled.named_parameter_positions["s"], vec![0, 3]);
}

#[test]
fn parameters_carry_source_positions() {
    let compiled = compile("from Employee e where e.name = :who").unwrap();
    let spec = &compiled.parameters[0];
    assert_eq!(spec.line, Some(1));
    assert!(spec.column.is_some());
}

#[test]
fn two_syntax_errors_surface_as_one_positioned_exception() {
    let error = compile("select e.name, from Employee e where e.salary > order by e.name")
        .unwrap_err();
    match error {
        Error::Syntax {
            line,
            column,
            query,
            ..
        } => {
            assert_eq!(line, 1);
            assert!(column > 0);
            assert!(query.contains("select e.name,"));
        }
        other => panic!("expected a positioned syntax error, got {other:?}"),
    }
}

#[test]
fn clean_query_compiles_without_error() {
    compile("from Employee e where e.name = 'x'").unwrap();
}

#[test]
fn ambiguous_alias_is_a_semantic_error() {
    let error = compile("from Employee e, Department e").unwrap_err();
    match error {
        Error::Translation { message, query } => {
            assert!(
                message.contains("duplicate definition of alias 'e'"),
                "got: {message}"
            );
            assert_eq!(query, "from Employee e, Department e");
        }
        other => panic!("expected a translation error, got {other:?}"),
    }
}

#[test]
fn semantic_errors_aggregate_across_clauses() {
    let error = compile("select e.nope from Employee e where e.missing = 1").unwrap_err();
    match error {
        Error::Translation { message, .. } => {
            assert!(message.contains("could not resolve property: nope of: Employee"));
            assert!(message.contains("could not resolve property: missing of: Employee"));
            assert!(message.contains('\n'), "messages joined by newline");
        }
        other => panic!("expected a translation error, got {other:?}"),
    }
}

#[test]
fn unknown_entity_names_the_reference() {
    let error = compile("from Martian m").unwrap_err();
    assert!(
        error.to_string().contains("Martian is not mapped"),
        "got: {error}"
    );
}

#[test]
fn failed_compilation_leaves_translator_retryable() {
    let registry = model();
    let dialect = GenericDialect::new();
    let translator = QueryTranslator::new("from Martian", QueryOptions::default());
    assert!(translator.compile(&registry, &dialect, &Constants).is_err());
    assert!(!translator.is_compiled());
    // Still fails, but from a fresh pipeline run rather than a poisoned state.
    assert!(translator.compile(&registry, &dialect, &Constants).is_err());
}

#[test]
fn collection_dereference_is_rejected() {
    let error = compile("from Employee e where e.projects.title = 'x'").unwrap_err();
    assert!(
        error.to_string().contains("collection-valued"),
        "got: {error}"
    );
}
