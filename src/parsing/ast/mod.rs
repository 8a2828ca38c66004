//! Abstract syntax tree for object-query statements.
//!
//! The AST is purely syntactic: it records entity and property *paths* as
//! written, without knowing whether they resolve against the domain model.
//! Resolution is the job of the semantic analyzer, which builds a separate
//! relational tree from this one.

pub mod common;
pub mod dml;
pub mod expressions;

pub use common::{Cte, Direction, FromItem, JoinKind, PathExpr};
pub use dml::{
    DeleteStatement, InsertSource, InsertStatement, OnConflict, SelectStatement, UpdateStatement,
};
pub use expressions::{Expression, Literal, Operator, ParameterRef};

/// An object-query statement, the root of the syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Box<SelectStatement>),
    Insert(Box<InsertStatement>),
    Update(Box<UpdateStatement>),
    Delete(Box<DeleteStatement>),
}
