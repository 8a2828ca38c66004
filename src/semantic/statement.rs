//! The relational AST produced by semantic analysis.
//!
//! This tree is distinct from the parsed query AST: every node in it is fully
//! resolved against the domain model (tables, columns, types, aliases), so
//! SQL generation is a pure second walk that needs no metadata access. The
//! tree is retained by the caller for as long as the compiled query lives,
//! because regeneration and introspection operate on it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::parsing::ast::{Direction, JoinKind, Literal};
use crate::types::DataType;

/// Arena index of a from-element. The origin relation is expressed through
/// these indices, which keeps the origin graph an acyclic tree by
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FromElementId(pub usize);

/// Arena of all from-elements of one compiled statement, subqueries included.
#[derive(Debug, Clone, Default)]
pub struct FromArena {
    elements: Vec<FromElement>,
}

impl FromArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, element: FromElement) -> FromElementId {
        self.elements.push(element);
        FromElementId(self.elements.len() - 1)
    }

    pub fn get(&self, id: FromElementId) -> &FromElement {
        &self.elements[id.0]
    }

    pub fn get_mut(&mut self, id: FromElementId) -> &mut FromElement {
        &mut self.elements[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (FromElementId, &FromElement)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| (FromElementId(i), e))
    }

    /// The element `right` resolves from, following synthetic secondary-table
    /// elements up to the element the query author actually named.
    pub fn real_origin(&self, id: FromElementId) -> Option<FromElementId> {
        let element = self.get(id);
        match element.origin {
            Some(origin) if self.get(origin).synthetic => self.real_origin(origin),
            other => other,
        }
    }
}

/// How a joined element's fragment is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStyle {
    /// `join <table> <alias> on (<condition>)`
    Ansi,
    /// Comma-listed table; the condition was merged into the WHERE clause.
    Theta,
}

/// Join attributes of a non-root from-element.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub style: JoinStyle,
    /// Fully resolved join condition. For theta joins this is additionally
    /// merged into the statement's WHERE clause and not rendered inline.
    pub condition: SqlExpr,
}

/// One joined row-source of the compiled statement.
#[derive(Debug, Clone)]
pub struct FromElement {
    /// Mapped entity, `None` for CTE references and secondary-table elements.
    pub entity: Option<String>,
    pub table: String,
    /// The assigned SQL alias, unique within the statement.
    pub alias: String,
    /// The alias written in the query, if any.
    pub source_alias: Option<String>,
    /// The element this one was joined from; `None` for statement roots.
    pub origin: Option<FromElementId>,
    /// Join attributes; `None` for roots.
    pub join: Option<JoinSpec>,
    /// Property that produced this element, for implied-join reuse.
    pub join_property: Option<String>,
    /// A collection-valued association join.
    pub collection: bool,
    /// Requested by a `join fetch` directive (elided under shallow
    /// compilation).
    pub fetch: bool,
    /// Secondary-table element synthesized during property resolution rather
    /// than written in the query.
    pub synthetic: bool,
    /// Output columns of a CTE reference, for path resolution against it.
    pub cte_columns: Option<Vec<(String, DataType)>>,
}

impl FromElement {
    pub fn root(entity: impl Into<String>, table: impl Into<String>, alias: String) -> Self {
        Self {
            entity: Some(entity.into()),
            table: table.into(),
            alias,
            source_alias: None,
            origin: None,
            join: None,
            join_property: None,
            collection: false,
            fetch: false,
            synthetic: false,
            cte_columns: None,
        }
    }
}

/// Binary operators of the relational tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
}

impl BinaryOp {
    pub fn sql(&self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Concat => "||",
        }
    }

    /// Boolean connectives parenthesize their operands when nested.
    pub fn is_connective(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// One chunk of an injected filter condition fragment.
#[derive(Debug, Clone)]
pub enum FragmentChunk {
    Text(String),
    Bind(usize),
}

/// A fully resolved expression of the relational tree.
#[derive(Debug, Clone)]
pub enum SqlExpr {
    /// Columns of a resolved property, qualified by their element's alias at
    /// render time. Multi-column properties render as a parenthesized tuple.
    Columns {
        from: FromElementId,
        columns: Vec<String>,
    },
    /// A reference to a select-list output label (ORDER BY only).
    OutputAlias(String),
    Literal(Literal),
    /// A bind marker; the index points into the statement's parameter list.
    Bind(usize),
    Unary {
        op: UnaryOp,
        expr: Box<SqlExpr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<SqlExpr>,
        rhs: Box<SqlExpr>,
    },
    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },
    Like {
        expr: Box<SqlExpr>,
        pattern: Box<SqlExpr>,
        escape: Option<Box<SqlExpr>>,
        negated: bool,
    },
    Between {
        expr: Box<SqlExpr>,
        low: Box<SqlExpr>,
        high: Box<SqlExpr>,
        negated: bool,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<SqlExpr>,
        subquery: Box<SelectNode>,
        negated: bool,
    },
    Exists(Box<SelectNode>),
    Subquery(Box<SelectNode>),
    Case {
        operand: Option<Box<SqlExpr>>,
        when_clauses: Vec<(SqlExpr, SqlExpr)>,
        else_clause: Option<Box<SqlExpr>>,
    },
    Function {
        name: String,
        args: Vec<SqlExpr>,
        distinct: bool,
    },
    /// `*`, only as a function argument (`count(*)`).
    Star,
    /// An injected filter restriction.
    FilterFragment {
        chunks: Vec<FragmentChunk>,
    },
}

impl SqlExpr {
    /// Conjunction, absorbing the empty side.
    pub fn and(lhs: Option<SqlExpr>, rhs: SqlExpr) -> SqlExpr {
        match lhs {
            Some(lhs) => SqlExpr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            None => rhs,
        }
    }
}

/// One emitted column of an entity selection. Columns of secondary-table
/// properties point at the synthetic element joining that table.
#[derive(Debug, Clone)]
pub struct EntityColumn {
    pub from: FromElementId,
    pub column: String,
    pub alias: String,
}

/// One resolved select-list entry.
#[derive(Debug, Clone)]
pub enum Selection {
    /// A whole entity: all its mapped columns, each with an output alias.
    /// Fetched selections load associations of another selection and do not
    /// contribute a tuple element of their own.
    Entity {
        from: FromElementId,
        entity: String,
        columns: Vec<EntityColumn>,
        ty: DataType,
        fetched: bool,
    },
    /// A scalar expression with its output alias.
    Scalar {
        expr: SqlExpr,
        alias: String,
        ty: DataType,
        label: Option<String>,
    },
}

impl Selection {
    pub fn data_type(&self) -> &DataType {
        match self {
            Selection::Entity { ty, .. } | Selection::Scalar { ty, .. } => ty,
        }
    }

    pub fn column_aliases(&self) -> Vec<String> {
        match self {
            Selection::Entity { columns, .. } => {
                columns.iter().map(|c| c.alias.clone()).collect()
            }
            Selection::Scalar { alias, .. } => vec![alias.clone()],
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, Selection::Entity { fetched: true, .. })
    }
}

/// A resolved select query (statement root or subquery).
#[derive(Debug, Clone)]
pub struct SelectNode {
    pub ctes: Vec<(String, SelectNode)>,
    pub distinct: bool,
    pub selections: Vec<Selection>,
    /// From-elements in emission order.
    pub from: Vec<FromElementId>,
    pub r#where: Option<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub having: Option<SqlExpr>,
    pub order_by: Vec<(SqlExpr, Direction)>,
}

/// A resolved UPDATE/conflict assignment. `table` partitions assignments for
/// the multi-table executor.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub table: usize,
    pub column: String,
    pub value: SqlExpr,
}

/// Row source of a resolved INSERT.
#[derive(Debug, Clone)]
pub enum InsertNode {
    Values(Vec<Vec<SqlExpr>>),
    Select(SelectNode),
}

/// Resolved conflict clause. At most one of `constraint_name` /
/// `target_columns` is set; violating that is an internal error.
#[derive(Debug, Clone)]
pub struct ConflictNode {
    pub constraint_name: Option<String>,
    pub target_columns: Vec<String>,
    pub assignments: Vec<Assignment>,
}

/// The resolved statement kinds.
#[derive(Debug, Clone)]
pub enum StatementKind {
    Select(SelectNode),
    Update {
        element: FromElementId,
        assignments: Vec<Assignment>,
        r#where: Option<SqlExpr>,
    },
    Delete {
        element: FromElementId,
        r#where: Option<SqlExpr>,
    },
    Insert {
        element: FromElementId,
        columns: Vec<String>,
        source: InsertNode,
        conflict: Option<ConflictNode>,
    },
}

/// How a bind parameter was written in the query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    Named(String),
    Positional(usize),
    Ordinal(u32),
    Filter { filter: String, parameter: String },
}

impl std::fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterKind::Named(name) => write!(f, ":{name}"),
            ParameterKind::Positional(ordinal) => write!(f, "?#{ordinal}"),
            ParameterKind::Ordinal(ordinal) => write!(f, "?{ordinal}"),
            ParameterKind::Filter { filter, parameter } => write!(f, ":{filter}.{parameter}"),
        }
    }
}

/// One bind position with its resolved type and source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub kind: ParameterKind,
    pub expected_type: Option<DataType>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// The root of the relational AST, retained for the lifetime of the compiled
/// query.
#[derive(Debug, Clone)]
pub struct TranslatedStatement {
    pub arena: FromArena,
    pub kind: StatementKind,
    /// Parameter specifications in analysis order; the generator re-emits
    /// them in bind-marker order, which is the order the caller binds.
    pub parameters: Vec<ParameterSpec>,
    /// Tables this statement reads or writes, for cache invalidation.
    pub query_spaces: BTreeSet<String>,
}

impl TranslatedStatement {
    /// DML statements need an executor; SELECT needs a loader.
    pub fn needs_executor(&self) -> bool {
        !matches!(self.kind, StatementKind::Select(_))
    }
}
