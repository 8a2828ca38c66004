//! Domain-model metadata consumed by the translator.
//!
//! The mapping subsystem itself (documents, annotations, runtime model) lives
//! outside this crate; the translator only needs to answer "resolve this
//! entity/property path to table, column(s) and type" and "which filters
//! restrict this entity". [`Metamodel`] is that narrow interface, and
//! [`MetamodelRegistry`] is the plain in-memory implementation the engine
//! hands to the translator.

use std::collections::HashMap;

use crate::types::DataType;

/// Read-only lookup service over the mapped domain model. Implementations
/// must be thread-safe; the translator performs no writes through it.
pub trait Metamodel: Send + Sync {
    /// Look up an entity mapping by its query-language name.
    fn entity(&self, name: &str) -> Option<&EntityMapping>;

    /// Look up a filter definition by name.
    fn filter(&self, name: &str) -> Option<&FilterDefinition>;
}

/// How a property maps to the relational schema.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    /// A plain value column (or columns, for composite values).
    Scalar,
    /// A to-one association; `columns` on the mapping are the foreign-key
    /// columns in the owning table.
    ManyToOne {
        target: String,
        /// Nullable association: implied joins over it become outer joins.
        optional: bool,
    },
    /// A to-many association; `key_columns` are the columns on the target
    /// table referencing the owner's identifier.
    Collection {
        target: String,
        key_columns: Vec<String>,
    },
}

/// One mapped property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMapping {
    pub name: String,
    pub columns: Vec<String>,
    /// Which physical table holds the columns: 0 is the primary table,
    /// 1.. index into the entity's secondary tables.
    pub table: usize,
    pub ty: DataType,
    pub kind: PropertyKind,
}

impl PropertyMapping {
    pub fn scalar(name: impl Into<String>, column: impl Into<String>, ty: DataType) -> Self {
        Self {
            name: name.into(),
            columns: vec![column.into()],
            table: 0,
            ty,
            kind: PropertyKind::Scalar,
        }
    }

    pub fn many_to_one(
        name: impl Into<String>,
        fk_column: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let target = target.into();
        Self {
            name: name.into(),
            columns: vec![fk_column.into()],
            table: 0,
            ty: DataType::Entity(target.clone()),
            kind: PropertyKind::ManyToOne {
                target,
                optional: false,
            },
        }
    }

    pub fn collection(
        name: impl Into<String>,
        target: impl Into<String>,
        key_column: impl Into<String>,
    ) -> Self {
        let target = target.into();
        Self {
            name: name.into(),
            columns: vec![],
            table: 0,
            ty: DataType::Entity(target.clone()),
            kind: PropertyKind::Collection {
                target,
                key_columns: vec![key_column.into()],
            },
        }
    }

    /// Marks the association optional (nullable foreign key).
    pub fn optional(mut self) -> Self {
        if let PropertyKind::ManyToOne { optional, .. } = &mut self.kind {
            *optional = true;
        }
        self
    }

    /// Places the property's columns in a secondary table.
    pub fn in_table(mut self, table: usize) -> Self {
        self.table = table;
        self
    }
}

/// A filter attached to an entity mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterUse {
    pub name: String,
}

/// One mapped entity: its tables, identifier, and properties.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMapping {
    pub name: String,
    pub table: String,
    /// Extra physical tables, joined to the primary table on the id columns.
    pub secondary_tables: Vec<String>,
    pub id: PropertyMapping,
    pub properties: Vec<PropertyMapping>,
    pub filters: Vec<FilterUse>,
}

impl EntityMapping {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            secondary_tables: Vec::new(),
            id: PropertyMapping::scalar("id", "id", DataType::Long),
            properties: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn id(mut self, id: PropertyMapping) -> Self {
        self.id = id;
        self
    }

    pub fn property(mut self, property: PropertyMapping) -> Self {
        self.properties.push(property);
        self
    }

    pub fn secondary_table(mut self, table: impl Into<String>) -> Self {
        self.secondary_tables.push(table.into());
        self
    }

    pub fn filter(mut self, name: impl Into<String>) -> Self {
        self.filters.push(FilterUse { name: name.into() });
        self
    }

    /// Resolve a property by name; the identifier is a property like any
    /// other.
    pub fn find_property(&self, name: &str) -> Option<&PropertyMapping> {
        if self.id.name == name {
            return Some(&self.id);
        }
        self.properties.iter().find(|p| p.name == name)
    }

    /// The physical table for a property-table index.
    pub fn table_name(&self, index: usize) -> &str {
        if index == 0 {
            &self.table
        } else {
            &self.secondary_tables[index - 1]
        }
    }

    /// All physical tables, primary first.
    pub fn all_tables(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.table.as_str())
            .chain(self.secondary_tables.iter().map(|s| s.as_str()))
    }

    pub fn is_multi_table(&self) -> bool {
        !self.secondary_tables.is_empty()
    }
}

/// A named data filter: a SQL condition fragment with declared parameters.
///
/// The condition references columns of the filtered table through the
/// `{alias}` placeholder and parameters as `:name`, e.g.
/// `{alias}.region_id = :regionId`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDefinition {
    pub name: String,
    pub condition: String,
    pub parameters: Vec<(String, DataType)>,
}

impl FilterDefinition {
    pub fn new(name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: condition.into(),
            parameters: Vec::new(),
        }
    }

    pub fn parameter(mut self, name: impl Into<String>, ty: DataType) -> Self {
        self.parameters.push((name.into(), ty));
        self
    }

    pub fn parameter_type(&self, name: &str) -> Option<&DataType> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| ty)
    }
}

/// In-memory [`Metamodel`] implementation.
#[derive(Debug, Default)]
pub struct MetamodelRegistry {
    entities: HashMap<String, EntityMapping>,
    filters: HashMap<String, FilterDefinition>,
}

impl MetamodelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, entity: EntityMapping) -> &mut Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    pub fn add_filter(&mut self, filter: FilterDefinition) -> &mut Self {
        self.filters.insert(filter.name.clone(), filter);
        self
    }
}

impl Metamodel for MetamodelRegistry {
    fn entity(&self, name: &str) -> Option<&EntityMapping> {
        self.entities.get(name)
    }

    fn filter(&self, name: &str) -> Option<&FilterDefinition> {
        self.filters.get(name)
    }
}
