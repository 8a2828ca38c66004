//! Common structures used across AST modules

use super::dml::SelectStatement;
use super::expressions::Expression;
use std::fmt;

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Asc,
    Desc,
}

/// Join kinds as written in the query. The analyzer adds implied joins (from
/// path navigation) with a kind chosen from association optionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
}

/// A dotted path as written in the query: `e.department.name`, or a single
/// identifier. Carries the position of its first segment for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathExpr {
    pub segments: Vec<String>,
    pub line: u32,
    pub column: u32,
}

impl PathExpr {
    pub fn new(segments: Vec<String>, line: u32, column: u32) -> Self {
        Self {
            segments,
            line,
            column,
        }
    }

    /// The full dotted form, for diagnostics and constant lookup.
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

/// One item of a FROM clause, in source order. Roots and joins form a flat
/// left-to-right sequence; each join path starts from an alias introduced
/// earlier in the sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    /// A root entity reference: `Employee e`.
    Root {
        entity: PathExpr,
        alias: Option<String>,
    },
    /// An explicit join: `left join fetch e.projects p`.
    Join {
        kind: JoinKind,
        fetch: bool,
        path: PathExpr,
        alias: Option<String>,
    },
}

/// A common table expression: `with recent as (select ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub query: Box<SelectStatement>,
}

/// A select item with an optional alias label.
pub type SelectItem = (Expression, Option<String>);
