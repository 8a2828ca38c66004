//! The semantic analyzer: walks the query AST, resolves every path against
//! the domain model, and builds the relational AST.
//!
//! Responsibilities, in order: root entity and join resolution (explicit
//! joins and implied dotted-path navigation), enabled-filter injection,
//! property resolution in every clause, unique alias assignment, ordered
//! parameter collection with context-derived types, statement-kind
//! validation, and query-space recording. Any failure is reported to the
//! shared collector; a compilation with errors yields no usable relational
//! AST.

use std::collections::{BTreeMap, BTreeSet};

use crate::dialect::Dialect;
use crate::diagnostics::DiagnosticsCollector;
use crate::error::{Error, Result};
use crate::metadata::{EntityMapping, Metamodel, PropertyKind, PropertyMapping};
use crate::parsing::ast::{
    self, Expression, FromItem, JoinKind, Literal, ParameterRef, PathExpr, Statement,
};
use crate::types::{DataType, Value};

use super::alias::AliasGenerator;
use super::statement::{
    Assignment, BinaryOp, ConflictNode, EntityColumn, FragmentChunk, FromArena, FromElement,
    FromElementId, InsertNode, JoinSpec, JoinStyle, ParameterKind, ParameterSpec, Selection,
    SelectNode, SqlExpr, StatementKind, TranslatedStatement, UnaryOp,
};

/// Runtime arguments for one enabled filter: parameter name to value.
pub type FilterArguments = BTreeMap<String, Value>;

#[derive(Default)]
struct Scope {
    /// Source alias bindings, in declaration order.
    bindings: Vec<(String, FromElementId)>,
    /// Elements of this select level, in emission order.
    elements: Vec<FromElementId>,
    /// CTE shapes visible at this level.
    ctes: Vec<(String, Vec<(String, DataType)>)>,
    /// Theta-join and root-filter conditions merged into WHERE.
    where_extra: Vec<SqlExpr>,
}

pub struct SemanticAnalyzer<'a> {
    metamodel: &'a dyn Metamodel,
    dialect: &'a dyn Dialect,
    enabled_filters: &'a BTreeMap<String, FilterArguments>,
    shallow: bool,
    diag: &'a mut DiagnosticsCollector,
    arena: FromArena,
    aliases: AliasGenerator,
    parameters: Vec<ParameterSpec>,
    query_spaces: BTreeSet<String>,
    scopes: Vec<Scope>,
    scalar_counter: usize,
    /// Set while resolving bulk-statement restrictions, where implied joins
    /// and secondary-table references are rejected.
    dml_restriction: bool,
    internal: Option<String>,
}

impl<'a> SemanticAnalyzer<'a> {
    pub fn new(
        metamodel: &'a dyn Metamodel,
        dialect: &'a dyn Dialect,
        enabled_filters: &'a BTreeMap<String, FilterArguments>,
        shallow: bool,
        diag: &'a mut DiagnosticsCollector,
    ) -> Self {
        Self {
            metamodel,
            dialect,
            enabled_filters,
            shallow,
            diag,
            arena: FromArena::new(),
            aliases: AliasGenerator::new(),
            parameters: Vec::new(),
            query_spaces: BTreeSet::new(),
            scopes: Vec::new(),
            scalar_counter: 0,
            dml_restriction: false,
            internal: None,
        }
    }

    /// Analyzes a statement. `Ok(None)` means semantic errors were reported
    /// to the collector; `Err` is reserved for internal invariant violations.
    pub fn analyze(mut self, statement: Statement) -> Result<Option<TranslatedStatement>> {
        // Enabled filters must exist before anything references them.
        for name in self.enabled_filters.keys() {
            if self.metamodel.filter(name).is_none() {
                self.diag.error(format!("no filter configured with name {name}"));
            }
        }

        let kind = match statement {
            Statement::Select(select) => self.analyze_select(*select).map(StatementKind::Select),
            Statement::Update(update) => self.analyze_update(*update),
            Statement::Delete(delete) => self.analyze_delete(*delete),
            Statement::Insert(insert) => self.analyze_insert(*insert),
        };

        if let Some(message) = self.internal {
            return Err(Error::Internal(message));
        }
        if self.diag.has_errors() {
            return Ok(None);
        }
        Ok(kind.map(|kind| TranslatedStatement {
            arena: self.arena,
            kind,
            parameters: self.parameters,
            query_spaces: self.query_spaces,
        }))
    }

    fn internal_error<T>(&mut self, message: impl Into<String>) -> Option<T> {
        if self.internal.is_none() {
            self.internal = Some(message.into());
        }
        None
    }

    fn scope_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack is never empty here")
    }

    // Select statements

    fn analyze_select(&mut self, select: ast::SelectStatement) -> Option<SelectNode> {
        self.scopes.push(Scope::default());
        // The bulk-statement restriction binds to the outer statement's own
        // clauses; subqueries are full selects and may join freely.
        let outer_restriction = std::mem::replace(&mut self.dml_restriction, false);

        let mut ctes = Vec::new();
        for cte in select.ctes {
            let name = cte.name;
            if let Some(node) = self.analyze_select(*cte.query) {
                let shape = self.cte_shape(&name, &node);
                self.scope_mut().ctes.push((name.clone(), shape));
                ctes.push((name, node));
            }
        }

        for item in &select.from {
            match item {
                FromItem::Root { entity, alias } => {
                    self.add_root(entity, alias.clone());
                }
                FromItem::Join {
                    kind,
                    fetch,
                    path,
                    alias,
                } => {
                    self.add_explicit_join(*kind, *fetch, path, alias.clone());
                }
            }
        }

        let selections = self.build_selections(&select.select);

        let mut r#where = select
            .r#where
            .as_ref()
            .and_then(|expr| self.resolve_expression(expr).map(|(sql, _)| sql));

        let group_by = select
            .group_by
            .iter()
            .filter_map(|expr| self.resolve_expression(expr).map(|(sql, _)| sql))
            .collect();

        let having = select
            .having
            .as_ref()
            .and_then(|expr| self.resolve_expression(expr).map(|(sql, _)| sql));

        let order_by = select
            .order_by
            .iter()
            .filter_map(|(expr, direction)| {
                self.resolve_order_item(expr, &selections)
                    .map(|sql| (sql, *direction))
            })
            .collect();

        self.dml_restriction = outer_restriction;
        let scope = self.scopes.pop().expect("select scope");
        for extra in scope.where_extra {
            r#where = Some(SqlExpr::and(r#where, extra));
        }

        Some(SelectNode {
            ctes,
            distinct: select.distinct,
            selections,
            from: scope.elements,
            r#where,
            group_by,
            having,
            order_by,
        })
    }

    fn cte_shape(&mut self, name: &str, node: &SelectNode) -> Vec<(String, DataType)> {
        let mut shape = Vec::new();
        for selection in node.selections.iter().filter(|s| !s.is_fetched()) {
            match selection {
                Selection::Scalar {
                    alias, ty, label, ..
                } => {
                    shape.push((label.clone().unwrap_or_else(|| alias.clone()), ty.clone()));
                }
                Selection::Entity { .. } => {
                    self.diag
                        .error(format!("CTE '{name}' must select scalar values"));
                }
            }
        }
        shape
    }

    /// ORDER BY items may reference select-list labels; everything else
    /// resolves as a normal expression.
    fn resolve_order_item(
        &mut self,
        expr: &Expression,
        selections: &[Selection],
    ) -> Option<SqlExpr> {
        if let Expression::Path(path) = expr {
            if path.segments.len() == 1 {
                let name = &path.segments[0];
                let labelled = selections.iter().any(|s| {
                    matches!(s, Selection::Scalar { label: Some(l), .. } if l == name)
                });
                if labelled {
                    return Some(SqlExpr::OutputAlias(name.clone()));
                }
            }
        }
        self.resolve_expression(expr).map(|(sql, _)| sql)
    }

    // From-clause construction

    fn add_root(&mut self, entity_path: &PathExpr, alias: Option<String>) -> Option<FromElementId> {
        let name = entity_path.dotted();

        if entity_path.segments.len() == 1 {
            if let Some(shape) = self.find_cte(&name) {
                let sql_alias = self.aliases.create(&name);
                let id = self.arena.alloc(FromElement {
                    entity: None,
                    table: name.clone(),
                    alias: sql_alias,
                    source_alias: alias.clone(),
                    origin: None,
                    join: None,
                    join_property: None,
                    collection: false,
                    fetch: false,
                    synthetic: false,
                    cte_columns: Some(shape),
                });
                if let Some(alias) = alias {
                    self.register_binding(alias, id);
                }
                self.scope_mut().elements.push(id);
                return Some(id);
            }
        }

        let metamodel = self.metamodel;
        let Some(mapping) = metamodel.entity(&name) else {
            self.diag.error(format!("{name} is not mapped"));
            return None;
        };
        for table in mapping.all_tables() {
            self.query_spaces.insert(table.to_string());
        }
        let sql_alias = self.aliases.create(&mapping.table);
        let mut element = FromElement::root(mapping.name.clone(), mapping.table.clone(), sql_alias);
        element.source_alias = alias.clone();
        let id = self.arena.alloc(element);
        if let Some(alias) = alias {
            self.register_binding(alias, id);
        }
        self.scope_mut().elements.push(id);
        self.apply_filters(id, mapping);
        Some(id)
    }

    fn register_binding(&mut self, alias: String, id: FromElementId) {
        let duplicate = self
            .scope_mut()
            .bindings
            .iter()
            .any(|(name, _)| *name == alias);
        if duplicate {
            self.diag
                .error(format!("duplicate definition of alias '{alias}'"));
            return;
        }
        self.scope_mut().bindings.push((alias, id));
    }

    fn lookup_alias(&self, name: &str) -> Option<FromElementId> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, id)) = scope.bindings.iter().find(|(n, _)| n == name) {
                return Some(*id);
            }
        }
        None
    }

    fn find_cte(&self, name: &str) -> Option<Vec<(String, DataType)>> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, shape)) = scope.ctes.iter().find(|(n, _)| n == name) {
                return Some(shape.clone());
            }
        }
        None
    }

    /// The join style implied joins and explicit joins use under the target
    /// dialect.
    fn join_style(&self) -> JoinStyle {
        if self.dialect.supports_ansi_joins() {
            JoinStyle::Ansi
        } else {
            JoinStyle::Theta
        }
    }

    fn add_explicit_join(
        &mut self,
        kind: JoinKind,
        fetch: bool,
        path: &PathExpr,
        alias: Option<String>,
    ) -> Option<FromElementId> {
        if path.segments.len() < 2 {
            self.diag
                .error(format!("join path must navigate from an alias: {path}"));
            return None;
        }
        let Some(mut current) = self.lookup_alias(&path.segments[0]) else {
            self.diag
                .error(format!("could not resolve join alias: {}", path.segments[0]));
            return None;
        };
        for segment in &path.segments[1..path.segments.len() - 1] {
            current = self.implied_join(current, segment)?;
        }
        let last = path.segments.last().expect("non-empty path");
        let fetch = fetch && !self.shallow;
        let id = self.association_join(current, last, kind, fetch)?;
        if let Some(alias) = alias {
            self.arena.get_mut(id).source_alias = Some(alias.clone());
            self.register_binding(alias, id);
        }
        Some(id)
    }

    /// Creates (or reuses) a join element for navigating `property` from
    /// `origin`. Used for intermediate path segments; the join kind follows
    /// association optionality.
    fn implied_join(&mut self, origin: FromElementId, property: &str) -> Option<FromElementId> {
        if let Some(existing) = self.find_implied_join(origin, property) {
            return Some(existing);
        }
        if self.dml_restriction {
            self.diag.error(format!(
                "implied join on '{property}' is not allowed in a bulk statement"
            ));
            return None;
        }
        let mapping = self.element_mapping(origin)?;
        let Some(prop) = mapping.find_property(property) else {
            let entity = mapping.name.clone();
            self.diag
                .error(format!("could not resolve property: {property} of: {entity}"));
            return None;
        };
        match &prop.kind {
            PropertyKind::ManyToOne { optional, .. } => {
                let kind = if *optional {
                    JoinKind::LeftOuter
                } else {
                    JoinKind::Inner
                };
                self.association_join(origin, property, kind, false)
            }
            PropertyKind::Collection { .. } => {
                self.diag.error(format!(
                    "cannot dereference collection-valued property: {property}"
                ));
                None
            }
            PropertyKind::Scalar => {
                self.diag
                    .error(format!("cannot dereference scalar property: {property}"));
                None
            }
        }
    }

    fn find_implied_join(&self, origin: FromElementId, property: &str) -> Option<FromElementId> {
        self.arena
            .iter()
            .find(|(_, e)| {
                e.origin == Some(origin)
                    && e.join_property.as_deref() == Some(property)
                    && e.source_alias.is_none()
            })
            .map(|(id, _)| id)
    }

    /// Creates the join element for an association property.
    fn association_join(
        &mut self,
        origin: FromElementId,
        property: &str,
        kind: JoinKind,
        fetch: bool,
    ) -> Option<FromElementId> {
        if self.dml_restriction {
            self.diag.error(format!(
                "join on '{property}' is not allowed in a bulk statement"
            ));
            return None;
        }
        let metamodel = self.metamodel;
        let mapping = self.element_mapping(origin)?;
        let owner_entity = mapping.name.clone();
        let owner_id_columns = mapping.id.columns.clone();
        let Some(prop) = mapping.find_property(property) else {
            self.diag.error(format!(
                "could not resolve property: {property} of: {owner_entity}"
            ));
            return None;
        };

        let (target_name, collection) = match &prop.kind {
            PropertyKind::ManyToOne { target, .. } => (target.clone(), false),
            PropertyKind::Collection { target, .. } => (target.clone(), true),
            PropertyKind::Scalar => {
                self.diag
                    .error(format!("property is not an association: {property}"));
                return None;
            }
        };
        let Some(target_mapping) = metamodel.entity(&target_name) else {
            return self.internal_error(format!(
                "association '{property}' of '{owner_entity}' targets unmapped entity '{target_name}'"
            ));
        };
        let (owner_columns, target_columns) = match &prop.kind {
            PropertyKind::ManyToOne { .. } => {
                (prop.columns.clone(), target_mapping.id.columns.clone())
            }
            PropertyKind::Collection { key_columns, .. } => {
                (owner_id_columns, key_columns.clone())
            }
            PropertyKind::Scalar => unreachable!("rejected above"),
        };
        for table in target_mapping.all_tables() {
            self.query_spaces.insert(table.to_string());
        }

        let style = self.join_style();
        if style == JoinStyle::Theta && kind != JoinKind::Inner {
            self.diag.warn(format!(
                "dialect '{}' lacks ansi join syntax; outer join on '{property}' rendered theta-style",
                self.dialect.name()
            ));
        }

        let alias = self.aliases.create(&target_mapping.table);
        let id = self.arena.alloc(FromElement {
            entity: Some(target_mapping.name.clone()),
            table: target_mapping.table.clone(),
            alias,
            source_alias: None,
            origin: Some(origin),
            join: None,
            join_property: Some(property.to_string()),
            collection,
            fetch,
            synthetic: false,
            cte_columns: None,
        });

        if owner_columns.len() != target_columns.len() {
            return self.internal_error(format!(
                "association '{property}' join column arity mismatch"
            ));
        }
        let condition = self.column_equality(origin, &owner_columns, id, &target_columns);
        self.arena.get_mut(id).join = Some(JoinSpec {
            kind,
            style,
            condition: condition.clone(),
        });
        if style == JoinStyle::Theta {
            self.scope_mut().where_extra.push(condition);
        }
        self.scope_mut().elements.push(id);

        self.apply_filters(id, target_mapping);
        Some(id)
    }

    fn column_equality(
        &self,
        left: FromElementId,
        left_columns: &[String],
        right: FromElementId,
        right_columns: &[String],
    ) -> SqlExpr {
        let mut condition = None;
        for (lc, rc) in left_columns.iter().zip(right_columns) {
            let eq = SqlExpr::Binary {
                op: BinaryOp::Eq,
                lhs: Box::new(SqlExpr::Columns {
                    from: left,
                    columns: vec![lc.clone()],
                }),
                rhs: Box::new(SqlExpr::Columns {
                    from: right,
                    columns: vec![rc.clone()],
                }),
            };
            condition = Some(SqlExpr::and(condition, eq));
        }
        condition.expect("join condition has at least one column pair")
    }

    fn element_mapping(&mut self, id: FromElementId) -> Option<&'a EntityMapping> {
        let element = self.arena.get(id);
        match &element.entity {
            Some(entity) => {
                let entity = entity.clone();
                match self.metamodel.entity(&entity) {
                    Some(mapping) => Some(mapping),
                    None => self.internal_error(format!(
                        "from-element references unmapped entity '{entity}'"
                    )),
                }
            }
            None => {
                self.diag
                    .error("path does not navigate a mapped entity".to_string());
                None
            }
        }
    }

    /// The element carrying a property's columns: the owner itself for the
    /// primary table, or a synthetic inner join for a secondary table.
    fn element_for_table(
        &mut self,
        owner: FromElementId,
        mapping: &EntityMapping,
        table: usize,
    ) -> Option<FromElementId> {
        if table == 0 {
            return Some(owner);
        }
        if self.dml_restriction {
            self.diag.error(format!(
                "secondary-table property of '{}' cannot be referenced in a bulk statement restriction",
                mapping.name
            ));
            return None;
        }
        let table_name = mapping.table_name(table).to_string();
        if let Some((id, _)) = self
            .arena
            .iter()
            .find(|(_, e)| e.origin == Some(owner) && e.synthetic && e.table == table_name)
        {
            return Some(id);
        }
        let alias = self.aliases.create(&table_name);
        let id = self.arena.alloc(FromElement {
            entity: None,
            table: table_name,
            alias,
            source_alias: None,
            origin: Some(owner),
            join: None,
            join_property: None,
            collection: false,
            fetch: false,
            synthetic: true,
            cte_columns: None,
        });
        let style = self.join_style();
        let condition =
            self.column_equality(owner, &mapping.id.columns, id, &mapping.id.columns);
        self.arena.get_mut(id).join = Some(JoinSpec {
            kind: JoinKind::Inner,
            style,
            condition: condition.clone(),
        });
        if style == JoinStyle::Theta {
            self.scope_mut().where_extra.push(condition);
        }
        self.scope_mut().elements.push(id);
        Some(id)
    }

    // Filters

    fn apply_filters(&mut self, id: FromElementId, mapping: &EntityMapping) {
        let metamodel = self.metamodel;
        for filter_use in &mapping.filters {
            let Some(arguments) = self.enabled_filters.get(&filter_use.name) else {
                continue;
            };
            let Some(definition) = metamodel.filter(&filter_use.name) else {
                self.diag.error(format!(
                    "no filter configured with name {}",
                    filter_use.name
                ));
                continue;
            };
            let fragment = self.build_filter_fragment(id, definition, arguments);
            // Joined elements take the restriction into their join condition;
            // roots (and theta joins) take it in the WHERE clause.
            let ansi_join = self
                .arena
                .get(id)
                .join
                .as_ref()
                .is_some_and(|j| j.style == JoinStyle::Ansi);
            if ansi_join {
                let join = self.arena.get_mut(id).join.as_mut().expect("join");
                let condition = join.condition.clone();
                join.condition = SqlExpr::and(Some(condition), fragment);
            } else {
                self.scope_mut().where_extra.push(fragment);
            }
        }
    }

    /// Renders a filter condition template into fragment chunks: `{alias}`
    /// becomes the element's SQL alias, `:name` becomes a filter parameter
    /// bind.
    fn build_filter_fragment(
        &mut self,
        id: FromElementId,
        definition: &crate::metadata::FilterDefinition,
        arguments: &FilterArguments,
    ) -> SqlExpr {
        let alias = self.arena.get(id).alias.clone();
        let mut chunks = Vec::new();
        let mut text = String::new();
        let condition = definition.condition.clone();
        let mut chars = condition.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '{' {
                let mut key = String::new();
                for k in chars.by_ref() {
                    if k == '}' {
                        break;
                    }
                    key.push(k);
                }
                if key == "alias" {
                    text.push_str(&alias);
                } else {
                    self.diag.error(format!(
                        "unknown placeholder '{{{key}}}' in filter '{}'",
                        definition.name
                    ));
                }
            } else if c == ':' {
                let mut name = String::new();
                while matches!(chars.peek(), Some(k) if k.is_ascii_alphanumeric() || *k == '_') {
                    name.push(chars.next().unwrap());
                }
                let Some(ty) = definition.parameter_type(&name) else {
                    self.diag.error(format!(
                        "undeclared parameter '{name}' in filter '{}'",
                        definition.name
                    ));
                    continue;
                };
                if !arguments.contains_key(&name) {
                    self.diag.error(format!(
                        "no value supplied for parameter '{name}' of filter '{}'",
                        definition.name
                    ));
                }
                if !text.is_empty() {
                    chunks.push(FragmentChunk::Text(std::mem::take(&mut text)));
                }
                self.parameters.push(ParameterSpec {
                    kind: ParameterKind::Filter {
                        filter: definition.name.clone(),
                        parameter: name,
                    },
                    expected_type: Some(ty.clone()),
                    line: None,
                    column: None,
                });
                chunks.push(FragmentChunk::Bind(self.parameters.len() - 1));
            } else {
                text.push(c);
            }
        }
        if !text.is_empty() {
            chunks.push(FragmentChunk::Text(text));
        }
        SqlExpr::FilterFragment { chunks }
    }

    // Selections

    fn build_selections(&mut self, items: &[(Expression, Option<String>)]) -> Vec<Selection> {
        let mut selections = Vec::new();
        if items.is_empty() {
            let roots: Vec<_> = self
                .scope_mut()
                .elements
                .clone()
                .into_iter()
                .filter(|id| self.arena.get(*id).origin.is_none())
                .collect();
            for id in roots {
                if let Some(columns) = self.arena.get(id).cte_columns.clone() {
                    for (name, ty) in columns {
                        let alias = self.next_scalar_alias();
                        selections.push(Selection::Scalar {
                            expr: SqlExpr::Columns {
                                from: id,
                                columns: vec![name.clone()],
                            },
                            alias,
                            ty,
                            label: Some(name),
                        });
                    }
                } else if let Some(selection) = self.entity_selection(id, false) {
                    selections.push(selection);
                }
            }
        } else {
            for (expr, label) in items {
                if let Expression::Path(path) = expr {
                    if path.segments.len() == 1 {
                        if let Some(id) = self.lookup_alias(&path.segments[0]) {
                            if let Some(selection) = self.entity_selection(id, false) {
                                selections.push(selection);
                            }
                            continue;
                        }
                    }
                }
                let Some((sql, ty)) = self.resolve_expression(expr) else {
                    continue;
                };
                let Some(ty) = ty else {
                    self.diag.error(format!(
                        "could not determine the type of a select expression{}",
                        label
                            .as_ref()
                            .map(|l| format!(" labelled '{l}'"))
                            .unwrap_or_default()
                    ));
                    continue;
                };
                let alias = self.next_scalar_alias();
                let label = label.clone().or_else(|| scalar_label(expr));
                selections.push(Selection::Scalar {
                    expr: sql,
                    alias,
                    ty,
                    label,
                });
            }
        }

        // Fetch-joined elements contribute their columns without adding
        // tuple elements of their own.
        let fetched: Vec<_> = self
            .scope_mut()
            .elements
            .clone()
            .into_iter()
            .filter(|id| self.arena.get(*id).fetch)
            .collect();
        for id in fetched {
            if let Some(selection) = self.entity_selection(id, true) {
                selections.push(selection);
            }
        }

        selections
    }

    fn next_scalar_alias(&mut self) -> String {
        let alias = format!("c{}_", self.scalar_counter);
        self.scalar_counter += 1;
        alias
    }

    fn entity_selection(&mut self, id: FromElementId, fetched: bool) -> Option<Selection> {
        let mapping = self.element_mapping(id)?;
        let entity = mapping.name.clone();
        let sequence = self.scalar_counter;
        self.scalar_counter += 1;

        let mut columns = Vec::new();
        let push_columns =
            |analyzer: &mut Self, columns: &mut Vec<EntityColumn>, prop: &PropertyMapping| {
                let Some(from) = analyzer.element_for_table(id, mapping, prop.table) else {
                    return;
                };
                for column in &prop.columns {
                    columns.push(EntityColumn {
                        from,
                        column: column.clone(),
                        alias: format!("{column}_{sequence}_"),
                    });
                }
            };

        push_columns(self, &mut columns, &mapping.id);
        let ty = if self.shallow && !fetched {
            mapping.id.ty.clone()
        } else {
            DataType::Entity(entity.clone())
        };
        if !self.shallow {
            for prop in &mapping.properties {
                if matches!(prop.kind, PropertyKind::Collection { .. }) {
                    continue;
                }
                push_columns(self, &mut columns, prop);
            }
        }

        Some(Selection::Entity {
            from: id,
            entity,
            columns,
            ty,
            fetched,
        })
    }

    // Expression resolution

    fn add_parameter(&mut self, param: &ParameterRef, line: u32, column: u32) -> usize {
        let kind = match param {
            ParameterRef::Named(name) => ParameterKind::Named(name.clone()),
            ParameterRef::Positional(ordinal) => ParameterKind::Positional(*ordinal),
            ParameterRef::Ordinal(ordinal) => ParameterKind::Ordinal(*ordinal),
        };
        self.parameters.push(ParameterSpec {
            kind,
            expected_type: None,
            line: Some(line),
            column: Some(column),
        });
        self.parameters.len() - 1
    }

    /// Sets a parameter's expected type from its usage context, when it is
    /// still unknown.
    fn note_param_type(&mut self, sql: &SqlExpr, ty: Option<&DataType>) {
        if let (SqlExpr::Bind(index), Some(ty)) = (sql, ty) {
            let spec = &mut self.parameters[*index];
            if spec.expected_type.is_none() {
                spec.expected_type = Some(ty.clone());
            }
        }
    }

    fn resolve_expression(&mut self, expr: &Expression) -> Option<(SqlExpr, Option<DataType>)> {
        match expr {
            Expression::All => Some((SqlExpr::Star, None)),

            Expression::Literal(literal) => {
                Some((SqlExpr::Literal(literal.clone()), literal_type(literal)))
            }

            Expression::Parameter {
                param,
                line,
                column,
            } => {
                let index = self.add_parameter(param, *line, *column);
                Some((SqlExpr::Bind(index), None))
            }

            Expression::Path(path) => match self.resolve_path(path)? {
                Resolved::Element(id) => {
                    // An entity-valued reference in an expression compares by
                    // identifier.
                    let mapping = self.element_mapping(id)?;
                    let columns = mapping.id.columns.clone();
                    let entity = mapping.name.clone();
                    Some((
                        SqlExpr::Columns { from: id, columns },
                        Some(DataType::Entity(entity)),
                    ))
                }
                Resolved::Columns { from, columns, ty } => {
                    Some((SqlExpr::Columns { from, columns }, Some(ty)))
                }
            },

            Expression::Function {
                name,
                args,
                distinct,
            } => {
                let mut resolved_args = Vec::new();
                let mut arg_types = Vec::new();
                for arg in args {
                    let (sql, ty) = self.resolve_expression(arg)?;
                    resolved_args.push(sql);
                    arg_types.push(ty);
                }
                let ty = function_type(name, &arg_types);
                Some((
                    SqlExpr::Function {
                        name: name.clone(),
                        args: resolved_args,
                        distinct: *distinct,
                    },
                    ty,
                ))
            }

            Expression::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let operand = match operand {
                    Some(operand) => Some(Box::new(self.resolve_expression(operand)?.0)),
                    None => None,
                };
                let mut ty = None;
                let mut whens = Vec::new();
                for (condition, result) in when_clauses {
                    let (cond_sql, _) = self.resolve_expression(condition)?;
                    let (result_sql, result_ty) = self.resolve_expression(result)?;
                    if ty.is_none() {
                        ty = result_ty;
                    }
                    whens.push((cond_sql, result_sql));
                }
                let else_clause = match else_clause {
                    Some(else_clause) => {
                        let (sql, else_ty) = self.resolve_expression(else_clause)?;
                        if ty.is_none() {
                            ty = else_ty;
                        }
                        Some(Box::new(sql))
                    }
                    None => None,
                };
                Some((
                    SqlExpr::Case {
                        operand,
                        when_clauses: whens,
                        else_clause,
                    },
                    ty,
                ))
            }

            Expression::Subquery(subquery) => {
                let node = self.analyze_select((**subquery).clone())?;
                let ty = subquery_type(&node);
                Some((SqlExpr::Subquery(Box::new(node)), ty))
            }

            Expression::Operator(op) => self.resolve_operator(op),
        }
    }

    fn resolve_operator(&mut self, op: &ast::Operator) -> Option<(SqlExpr, Option<DataType>)> {
        use ast::Operator::*;

        let binary = |analyzer: &mut Self,
                          op: BinaryOp,
                          lhs: &Expression,
                          rhs: &Expression,
                          cross_infer: bool|
         -> Option<(SqlExpr, Option<DataType>)> {
            let (lhs_sql, lhs_ty) = analyzer.resolve_expression(lhs)?;
            let (rhs_sql, rhs_ty) = analyzer.resolve_expression(rhs)?;
            if cross_infer {
                analyzer.note_param_type(&lhs_sql, rhs_ty.as_ref());
                analyzer.note_param_type(&rhs_sql, lhs_ty.as_ref());
            }
            let ty = if op.is_connective() || matches!(op, BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le) {
                Some(DataType::Bool)
            } else if op == BinaryOp::Concat {
                Some(DataType::Text)
            } else {
                lhs_ty.or(rhs_ty)
            };
            Some((
                SqlExpr::Binary {
                    op,
                    lhs: Box::new(lhs_sql),
                    rhs: Box::new(rhs_sql),
                },
                ty,
            ))
        };

        match op {
            And(l, r) => binary(self, BinaryOp::And, l, r, false),
            Or(l, r) => binary(self, BinaryOp::Or, l, r, false),
            Equal(l, r) => binary(self, BinaryOp::Eq, l, r, true),
            NotEqual(l, r) => binary(self, BinaryOp::Ne, l, r, true),
            GreaterThan(l, r) => binary(self, BinaryOp::Gt, l, r, true),
            GreaterThanOrEqual(l, r) => binary(self, BinaryOp::Ge, l, r, true),
            LessThan(l, r) => binary(self, BinaryOp::Lt, l, r, true),
            LessThanOrEqual(l, r) => binary(self, BinaryOp::Le, l, r, true),
            Add(l, r) => binary(self, BinaryOp::Add, l, r, true),
            Subtract(l, r) => binary(self, BinaryOp::Sub, l, r, true),
            Multiply(l, r) => binary(self, BinaryOp::Mul, l, r, true),
            Divide(l, r) => binary(self, BinaryOp::Div, l, r, true),
            Remainder(l, r) => binary(self, BinaryOp::Rem, l, r, true),
            Concat(l, r) => binary(self, BinaryOp::Concat, l, r, false),

            Not(expr) => {
                let (sql, _) = self.resolve_expression(expr)?;
                Some((
                    SqlExpr::Unary {
                        op: UnaryOp::Not,
                        expr: Box::new(sql),
                    },
                    Some(DataType::Bool),
                ))
            }
            Negate(expr) => {
                let (sql, ty) = self.resolve_expression(expr)?;
                Some((
                    SqlExpr::Unary {
                        op: UnaryOp::Neg,
                        expr: Box::new(sql),
                    },
                    ty,
                ))
            }

            IsNull { expr, negated } => {
                let (sql, _) = self.resolve_expression(expr)?;
                Some((
                    SqlExpr::IsNull {
                        expr: Box::new(sql),
                        negated: *negated,
                    },
                    Some(DataType::Bool),
                ))
            }

            Like {
                expr,
                pattern,
                escape,
                negated,
            } => {
                let (expr_sql, _) = self.resolve_expression(expr)?;
                let (pattern_sql, _) = self.resolve_expression(pattern)?;
                self.note_param_type(&pattern_sql, Some(&DataType::Text));
                let escape = match escape {
                    Some(escape) => Some(Box::new(self.resolve_expression(escape)?.0)),
                    None => None,
                };
                Some((
                    SqlExpr::Like {
                        expr: Box::new(expr_sql),
                        pattern: Box::new(pattern_sql),
                        escape,
                        negated: *negated,
                    },
                    Some(DataType::Bool),
                ))
            }

            Between {
                expr,
                low,
                high,
                negated,
            } => {
                let (expr_sql, expr_ty) = self.resolve_expression(expr)?;
                let (low_sql, low_ty) = self.resolve_expression(low)?;
                let (high_sql, high_ty) = self.resolve_expression(high)?;
                self.note_param_type(&low_sql, expr_ty.as_ref());
                self.note_param_type(&high_sql, expr_ty.as_ref());
                self.note_param_type(&expr_sql, low_ty.as_ref().or(high_ty.as_ref()));
                Some((
                    SqlExpr::Between {
                        expr: Box::new(expr_sql),
                        low: Box::new(low_sql),
                        high: Box::new(high_sql),
                        negated: *negated,
                    },
                    Some(DataType::Bool),
                ))
            }

            InList {
                expr,
                list,
                negated,
            } => {
                let (expr_sql, expr_ty) = self.resolve_expression(expr)?;
                let mut resolved = Vec::new();
                for item in list {
                    let (item_sql, item_ty) = self.resolve_expression(item)?;
                    self.note_param_type(&item_sql, expr_ty.as_ref());
                    self.note_param_type(&expr_sql, item_ty.as_ref());
                    resolved.push(item_sql);
                }
                Some((
                    SqlExpr::InList {
                        expr: Box::new(expr_sql),
                        list: resolved,
                        negated: *negated,
                    },
                    Some(DataType::Bool),
                ))
            }

            InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let (expr_sql, _) = self.resolve_expression(expr)?;
                let node = self.analyze_select((**subquery).clone())?;
                self.note_param_type(&expr_sql, subquery_type(&node).as_ref());
                Some((
                    SqlExpr::InSubquery {
                        expr: Box::new(expr_sql),
                        subquery: Box::new(node),
                        negated: *negated,
                    },
                    Some(DataType::Bool),
                ))
            }

            Exists(subquery) => {
                let node = self.analyze_select((**subquery).clone())?;
                Some((SqlExpr::Exists(Box::new(node)), Some(DataType::Bool)))
            }
        }
    }

    fn resolve_path(&mut self, path: &PathExpr) -> Option<Resolved> {
        let segments = &path.segments;
        let (mut current, mut index) = match self.lookup_alias(&segments[0]) {
            Some(id) => (id, 1),
            None => match self.unique_root_with_property(&segments[0]) {
                Some(id) => (id, 0),
                None => {
                    self.diag
                        .error(format!("could not resolve path: {}", path.dotted()));
                    return None;
                }
            },
        };

        if index == segments.len() {
            return Some(Resolved::Element(current));
        }

        let metamodel = self.metamodel;
        loop {
            let segment = &segments[index];
            let terminal = index == segments.len() - 1;

            if let Some(cte_columns) = self.arena.get(current).cte_columns.clone() {
                let Some((name, ty)) = cte_columns.iter().find(|(n, _)| n == segment) else {
                    let table = self.arena.get(current).table.clone();
                    self.diag
                        .error(format!("could not resolve property: {segment} of: {table}"));
                    return None;
                };
                if !terminal {
                    self.diag.error(format!(
                        "cannot dereference scalar property: {segment}"
                    ));
                    return None;
                }
                return Some(Resolved::Columns {
                    from: current,
                    columns: vec![name.clone()],
                    ty: ty.clone(),
                });
            }

            let mapping = self.element_mapping(current)?;
            let Some(prop) = mapping.find_property(segment) else {
                let entity = mapping.name.clone();
                self.diag
                    .error(format!("could not resolve property: {segment} of: {entity}"));
                return None;
            };

            match &prop.kind {
                PropertyKind::Scalar => {
                    if !terminal {
                        self.diag.error(format!(
                            "cannot dereference scalar property: {segment}"
                        ));
                        return None;
                    }
                    let columns = prop.columns.clone();
                    let ty = prop.ty.clone();
                    let table = prop.table;
                    let from = self.element_for_table(current, mapping, table)?;
                    return Some(Resolved::Columns { from, columns, ty });
                }
                PropertyKind::ManyToOne { target, .. } => {
                    if terminal {
                        let columns = prop.columns.clone();
                        let ty = prop.ty.clone();
                        let table = prop.table;
                        let from = self.element_for_table(current, mapping, table)?;
                        return Some(Resolved::Columns { from, columns, ty });
                    }
                    // Navigating to the target's identifier needs no join:
                    // the foreign key carries it.
                    let Some(target_mapping) = metamodel.entity(target) else {
                        return self.internal_error(format!(
                            "association '{segment}' targets unmapped entity '{target}'"
                        ));
                    };
                    if index + 1 == segments.len() - 1
                        && segments[index + 1] == target_mapping.id.name
                    {
                        let columns = prop.columns.clone();
                        let table = prop.table;
                        let ty = target_mapping.id.ty.clone();
                        let from = self.element_for_table(current, mapping, table)?;
                        return Some(Resolved::Columns { from, columns, ty });
                    }
                    current = self.implied_join(current, segment)?;
                    index += 1;
                }
                PropertyKind::Collection { .. } => {
                    self.diag.error(format!(
                        "cannot dereference collection-valued property: {segment}"
                    ));
                    return None;
                }
            }
        }
    }

    /// Unqualified property references resolve against the only root of the
    /// current scope, when there is exactly one and it has the property.
    fn unique_root_with_property(&mut self, property: &str) -> Option<FromElementId> {
        let scope = self.scopes.last()?;
        let roots: Vec<_> = scope
            .elements
            .iter()
            .copied()
            .filter(|id| self.arena.get(*id).origin.is_none())
            .collect();
        if roots.len() != 1 {
            return None;
        }
        let id = roots[0];
        let entity = self.arena.get(id).entity.clone()?;
        let mapping = self.metamodel.entity(&entity)?;
        mapping.find_property(property).map(|_| id)
    }

    // Bulk statements

    /// Resolves an UPDATE/INSERT target path to a property of the statement
    /// root. Accepts `alias.property` and bare `property` forms.
    fn resolve_dml_property<'m>(
        &mut self,
        path: &PathExpr,
        mapping: &'m EntityMapping,
        alias: Option<&str>,
    ) -> Option<&'m PropertyMapping> {
        let property = match path.segments.as_slice() {
            [single] => single,
            [qualifier, property] if Some(qualifier.as_str()) == alias => property,
            _ => {
                self.diag.error(format!(
                    "assignment target must be a property of {}: {}",
                    mapping.name,
                    path.dotted()
                ));
                return None;
            }
        };
        let Some(prop) = mapping.find_property(property) else {
            self.diag.error(format!(
                "could not resolve property: {property} of: {}",
                mapping.name
            ));
            return None;
        };
        if matches!(prop.kind, PropertyKind::Collection { .. }) {
            self.diag.error(format!(
                "collection-valued property cannot be assigned: {property}"
            ));
            return None;
        }
        if prop.columns.len() != 1 {
            self.diag.error(format!(
                "cannot assign multi-column property directly: {property}"
            ));
            return None;
        }
        Some(prop)
    }

    fn dml_root(
        &mut self,
        entity_path: &PathExpr,
        alias: Option<String>,
    ) -> Option<(FromElementId, &'a EntityMapping)> {
        let name = entity_path.dotted();
        let Some(mapping) = self.metamodel.entity(&name) else {
            self.diag.error(format!("{name} is not mapped"));
            return None;
        };
        for table in mapping.all_tables() {
            self.query_spaces.insert(table.to_string());
        }
        let sql_alias = self.aliases.create(&mapping.table);
        let mut element = FromElement::root(mapping.name.clone(), mapping.table.clone(), sql_alias);
        element.source_alias = alias.clone();
        let id = self.arena.alloc(element);
        if let Some(alias) = alias {
            self.register_binding(alias, id);
        }
        self.scope_mut().elements.push(id);
        Some((id, mapping))
    }

    fn analyze_update(&mut self, update: ast::UpdateStatement) -> Option<StatementKind> {
        self.scopes.push(Scope::default());
        let (element, mapping) = self.dml_root(&update.entity, update.alias.clone())?;
        self.dml_restriction = true;

        let alias = update.alias.as_deref();
        let mut assignments = Vec::new();
        for (target, value) in &update.set {
            let Some(prop) = self.resolve_dml_property(target, mapping, alias) else {
                continue;
            };
            let prop = prop.clone();
            let Some((value_sql, value_ty)) = self.resolve_expression(value) else {
                continue;
            };
            self.note_param_type(&value_sql, Some(&prop.ty));
            self.check_assignable(value_ty.as_ref(), &prop.ty, &prop.name);
            assignments.push(Assignment {
                table: prop.table,
                column: prop.columns[0].clone(),
                value: value_sql,
            });
        }

        let r#where = update
            .r#where
            .as_ref()
            .and_then(|expr| self.resolve_expression(expr).map(|(sql, _)| sql));
        let r#where = self.merge_where_extra(r#where);

        self.dml_restriction = false;
        self.scopes.pop();
        Some(StatementKind::Update {
            element,
            assignments,
            r#where,
        })
    }

    fn analyze_delete(&mut self, delete: ast::DeleteStatement) -> Option<StatementKind> {
        self.scopes.push(Scope::default());
        let (element, _mapping) = self.dml_root(&delete.entity, delete.alias.clone())?;
        self.dml_restriction = true;

        let r#where = delete
            .r#where
            .as_ref()
            .and_then(|expr| self.resolve_expression(expr).map(|(sql, _)| sql));
        let r#where = self.merge_where_extra(r#where);

        self.dml_restriction = false;
        self.scopes.pop();
        Some(StatementKind::Delete { element, r#where })
    }

    fn merge_where_extra(&mut self, mut r#where: Option<SqlExpr>) -> Option<SqlExpr> {
        let extras = std::mem::take(&mut self.scope_mut().where_extra);
        for extra in extras {
            r#where = Some(SqlExpr::and(r#where, extra));
        }
        r#where
    }

    fn check_assignable(&mut self, found: Option<&DataType>, target: &DataType, name: &str) {
        if let Some(found) = found {
            if !found.assignable_to(target) {
                self.diag.error(format!(
                    "type mismatch for '{name}': expected {target}, found {found}"
                ));
            }
        }
    }

    fn analyze_insert(&mut self, insert: ast::InsertStatement) -> Option<StatementKind> {
        self.scopes.push(Scope::default());
        let (element, mapping) = self.dml_root(&insert.entity, None)?;

        let mut columns = Vec::new();
        let mut column_types = Vec::new();
        for target in &insert.properties {
            let Some(prop) = self.resolve_dml_property(target, mapping, None) else {
                continue;
            };
            if prop.table != 0 {
                self.diag.error(format!(
                    "insert may only target columns of the primary table: {}",
                    prop.name
                ));
                continue;
            }
            columns.push(prop.columns[0].clone());
            column_types.push(prop.ty.clone());
        }

        let source = match &insert.source {
            ast::InsertSource::Values(rows) => {
                let mut resolved_rows = Vec::new();
                for row in rows {
                    if row.len() != column_types.len() {
                        self.diag.error(format!(
                            "insert arity mismatch: {} values for {} properties",
                            row.len(),
                            column_types.len()
                        ));
                        continue;
                    }
                    let mut resolved = Vec::new();
                    for (expr, target_ty) in row.iter().zip(&column_types) {
                        let Some((sql, ty)) = self.resolve_expression(expr) else {
                            continue;
                        };
                        self.note_param_type(&sql, Some(target_ty));
                        self.check_assignable(ty.as_ref(), target_ty, "insert value");
                        resolved.push(sql);
                    }
                    resolved_rows.push(resolved);
                }
                InsertNode::Values(resolved_rows)
            }
            ast::InsertSource::Select(select) => {
                let node = self.analyze_select((**select).clone())?;
                let result_selections: Vec<_> = node
                    .selections
                    .iter()
                    .filter(|s| !s.is_fetched())
                    .collect();
                if result_selections.len() != column_types.len() {
                    self.diag.error(format!(
                        "number of select values did not match insert properties: {} for {}",
                        result_selections.len(),
                        column_types.len()
                    ));
                } else {
                    for (selection, target_ty) in result_selections.iter().zip(&column_types) {
                        let found = selection.data_type().clone();
                        self.check_assignable(Some(&found), target_ty, "insert selection");
                    }
                }
                InsertNode::Select(node)
            }
        };

        let conflict = match &insert.on_conflict {
            Some(clause) => self.analyze_conflict(clause, mapping),
            None => None,
        };

        self.scopes.pop();
        Some(StatementKind::Insert {
            element,
            columns,
            source,
            conflict,
        })
    }

    fn analyze_conflict(
        &mut self,
        clause: &ast::OnConflict,
        mapping: &'a EntityMapping,
    ) -> Option<ConflictNode> {
        // Hard invariant: a conflict target is a constraint name or a
        // property list, never both. The grammar cannot produce both, so a
        // violation is a defect upstream of this phase.
        if clause.constraint_name.is_some() && !clause.constraint_paths.is_empty() {
            return self.internal_error(
                "conflict clause carries both a constraint name and a property list",
            );
        }
        if !self.dialect.supports_conflict_clause() {
            self.diag.error(format!(
                "dialect '{}' does not support insert conflict clauses",
                self.dialect.name()
            ));
            return None;
        }

        let mut target_columns = Vec::new();
        for path in &clause.constraint_paths {
            let Some(prop) = self.resolve_dml_property(path, mapping, None) else {
                continue;
            };
            if prop.table != 0 {
                self.diag.error(format!(
                    "conflict target must be a column of the primary table: {}",
                    prop.name
                ));
                continue;
            }
            target_columns.push(prop.columns[0].clone());
        }

        self.dml_restriction = true;
        let mut assignments = Vec::new();
        for (target, value) in &clause.update_assignments {
            let Some(prop) = self.resolve_dml_property(target, mapping, None) else {
                continue;
            };
            if prop.table != 0 {
                self.diag.error(format!(
                    "conflict update may only assign columns of the primary table: {}",
                    prop.name
                ));
                continue;
            }
            let prop = prop.clone();
            let Some((value_sql, value_ty)) = self.resolve_expression(value) else {
                continue;
            };
            self.note_param_type(&value_sql, Some(&prop.ty));
            self.check_assignable(value_ty.as_ref(), &prop.ty, &prop.name);
            assignments.push(Assignment {
                table: prop.table,
                column: prop.columns[0].clone(),
                value: value_sql,
            });
        }
        self.dml_restriction = false;

        Some(ConflictNode {
            constraint_name: clause.constraint_name.clone(),
            target_columns,
            assignments,
        })
    }
}

enum Resolved {
    Element(FromElementId),
    Columns {
        from: FromElementId,
        columns: Vec<String>,
        ty: DataType,
    },
}

fn literal_type(literal: &Literal) -> Option<DataType> {
    match literal {
        Literal::Null => None,
        Literal::Boolean(_) => Some(DataType::Bool),
        Literal::Integer(_) => Some(DataType::Long),
        Literal::Float(_) => Some(DataType::Double),
        Literal::Decimal(_) => Some(DataType::Decimal),
        Literal::String(_) => Some(DataType::Text),
        Literal::Date(_) => Some(DataType::Date),
        Literal::Time(_) => Some(DataType::Time),
        Literal::Timestamp(_) => Some(DataType::Timestamp),
    }
}

fn function_type(name: &str, arg_types: &[Option<DataType>]) -> Option<DataType> {
    let first = arg_types.first().and_then(|t| t.clone());
    match name {
        "count" => Some(DataType::Long),
        "avg" => Some(DataType::Double),
        "sum" | "min" | "max" | "abs" | "mod" => first,
        "upper" | "lower" | "trim" | "substring" | "concat" => Some(DataType::Text),
        "length" => Some(DataType::Integer),
        _ => None,
    }
}

/// The type of a scalar subquery: its single result selection.
fn subquery_type(node: &SelectNode) -> Option<DataType> {
    let mut result = node.selections.iter().filter(|s| !s.is_fetched());
    let first = result.next()?;
    if result.next().is_some() {
        return None;
    }
    Some(first.data_type().clone())
}

fn scalar_label(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Path(path) => path.segments.last().cloned(),
        _ => None,
    }
}
