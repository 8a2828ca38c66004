//! Shared test fixtures: a small mapped domain model and compile helpers.

use lattice_sql::metadata::{
    EntityMapping, FilterDefinition, MetamodelRegistry, PropertyMapping,
};
use lattice_sql::parsing::ast::Literal;
use lattice_sql::parsing::ConstantResolver;
use lattice_sql::translator::{CompiledQuery, QueryOptions, QueryTranslator};
use lattice_sql::{DataType, Dialect, GenericDialect, Result};
use std::sync::Arc;

/// Employees with a required department, an optional manager, a project
/// collection; departments carry a region filter; contracts span two
/// physical tables.
pub fn model() -> MetamodelRegistry {
    let mut registry = MetamodelRegistry::new();

    registry.add_entity(
        EntityMapping::new("Department", "department")
            .property(PropertyMapping::scalar("name", "name", DataType::Text))
            .filter("region"),
    );

    registry.add_entity(
        EntityMapping::new("Employee", "employee")
            .property(PropertyMapping::scalar("name", "name", DataType::Text))
            .property(PropertyMapping::scalar(
                "salary",
                "salary",
                DataType::Decimal,
            ))
            .property(PropertyMapping::scalar(
                "status",
                "status",
                DataType::Integer,
            ))
            .property(PropertyMapping::many_to_one(
                "department",
                "department_id",
                "Department",
            ))
            .property(PropertyMapping::many_to_one("manager", "manager_id", "Employee").optional())
            .property(PropertyMapping::collection(
                "projects",
                "Project",
                "employee_id",
            )),
    );

    registry.add_entity(
        EntityMapping::new("Project", "project")
            .property(PropertyMapping::scalar("title", "title", DataType::Text)),
    );

    registry.add_entity(
        EntityMapping::new("Contract", "contract")
            .secondary_table("contract_terms")
            .property(PropertyMapping::scalar("client", "client", DataType::Text))
            .property(PropertyMapping::scalar("rate", "rate", DataType::Decimal).in_table(1))
            .property(PropertyMapping::scalar("notes", "notes", DataType::Text).in_table(1)),
    );

    registry.add_filter(
        FilterDefinition::new("region", "{alias}.region_id = :regionId")
            .parameter("regionId", DataType::Integer),
    );

    registry
}

/// Static constants visible to the folding pass.
pub struct Constants;

impl ConstantResolver for Constants {
    fn resolve(&self, qualified_name: &str) -> Option<Literal> {
        match qualified_name {
            "Status.ACTIVE" => Some(Literal::Integer(1)),
            "Status.RETIRED" => Some(Literal::Integer(9)),
            _ => None,
        }
    }
}

pub fn compile(query: &str) -> Result<Arc<CompiledQuery>> {
    compile_with(query, QueryOptions::default(), &GenericDialect::new())
}

pub fn compile_with(
    query: &str,
    options: QueryOptions,
    dialect: &dyn Dialect,
) -> Result<Arc<CompiledQuery>> {
    let registry = model();
    let translator = QueryTranslator::new(query, options);
    translator.compile(&registry, dialect, &Constants)
}

/// The single SQL string of a compiled SELECT.
pub fn sql(compiled: &CompiledQuery) -> &str {
    assert_eq!(compiled.sql.len(), 1, "expected one SQL statement");
    &compiled.sql[0]
}
