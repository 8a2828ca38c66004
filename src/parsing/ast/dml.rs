//! Statement nodes: SELECT, INSERT, UPDATE, DELETE

use super::common::{Cte, Direction, FromItem, PathExpr, SelectItem};
use super::expressions::Expression;

/// SELECT statement structure. An empty select list means the implicit form
/// (`from Employee e`), which projects the root entities.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// Leading WITH clause, if any.
    pub ctes: Vec<Cte>,
    /// DISTINCT: whether to deduplicate result rows.
    pub distinct: bool,
    /// Expressions to select, with an optional result label.
    pub select: Vec<SelectItem>,
    /// FROM: roots and joins, in source order.
    pub from: Vec<FromItem>,
    /// WHERE: optional condition to filter rows.
    pub r#where: Option<Expression>,
    /// GROUP BY: expressions to group by.
    pub group_by: Vec<Expression>,
    /// HAVING: expression to filter groups by.
    pub having: Option<Expression>,
    /// ORDER BY: expressions to sort by, with direction.
    pub order_by: Vec<(Expression, Direction)>,
}

/// Source of rows for INSERT statements.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// VALUES: explicit rows of expressions.
    Values(Vec<Vec<Expression>>),
    /// SELECT: rows from a query.
    Select(Box<SelectStatement>),
}

/// INSERT conflict clause. The conflict target is either a named constraint
/// or a property list; at most one of the two may be set, asserted as a hard
/// invariant during analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    pub constraint_name: Option<String>,
    pub constraint_paths: Vec<PathExpr>,
    /// SET assignments for `do update`, empty for `do nothing`.
    pub update_assignments: Vec<(PathExpr, Expression)>,
}

/// INSERT INTO: inserts new entity rows.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// The target entity.
    pub entity: PathExpr,
    /// Properties receiving values.
    pub properties: Vec<PathExpr>,
    /// Source of rows to insert.
    pub source: InsertSource,
    /// Optional conflict clause.
    pub on_conflict: Option<OnConflict>,
}

/// UPDATE: updates entity state. Assignment order is preserved so generated
/// SQL is stable across recompiles.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub entity: PathExpr,
    pub alias: Option<String>,
    pub set: Vec<(PathExpr, Expression)>,
    pub r#where: Option<Expression>,
}

/// DELETE: deletes entity rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub entity: PathExpr,
    pub alias: Option<String>,
    pub r#where: Option<Expression>,
}
