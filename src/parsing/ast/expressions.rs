//! Query-language expressions and operators

use super::common::PathExpr;
use super::dml::SelectStatement;
use rust_decimal::Decimal;

/// Expressions, e.g. `e.salary * 2 > :min`. Can be nested.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// All columns: `*` (select list or `count(*)`).
    All,
    /// A property path, possibly a bare alias or a dotted navigation.
    Path(PathExpr),
    /// A literal value.
    Literal(Literal),
    /// A bind parameter reference, with its source position.
    Parameter {
        param: ParameterRef,
        line: u32,
        column: u32,
    },
    /// A function call: `upper(e.name)`, `count(distinct e.id)`.
    Function {
        name: String,
        args: Vec<Expression>,
        distinct: bool,
    },
    /// An operator.
    Operator(Box<Operator>),
    /// CASE WHEN expression (simple or searched).
    Case {
        operand: Option<Box<Expression>>,
        when_clauses: Vec<(Expression, Expression)>,
        else_clause: Option<Box<Expression>>,
    },
    /// A scalar subquery: `(select max(e.salary) from Employee e)`.
    Subquery(Box<SelectStatement>),
}

/// Expression literal values. Date/time variants only arise from constant
/// folding; the grammar itself has no date literal syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i128),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Timestamp(chrono::NaiveDateTime),
}

/// A bind parameter as written: `:name`, bare `?`, or `?1`. Bare positional
/// parameters are numbered left-to-right by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterRef {
    Named(String),
    Positional(usize),
    Ordinal(u32),
}

/// Expression operators. Negatable predicates carry their `negated` flag
/// rather than wrapping in NOT, mirroring how they are written.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    And(Expression, Expression),
    Or(Expression, Expression),
    Not(Expression),

    Equal(Expression, Expression),
    NotEqual(Expression, Expression),
    GreaterThan(Expression, Expression),
    GreaterThanOrEqual(Expression, Expression),
    LessThan(Expression, Expression),
    LessThanOrEqual(Expression, Expression),

    Add(Expression, Expression),
    Subtract(Expression, Expression),
    Multiply(Expression, Expression),
    Divide(Expression, Expression),
    Remainder(Expression, Expression),
    Negate(Expression),
    Concat(Expression, Expression),

    IsNull {
        expr: Expression,
        negated: bool,
    },
    Like {
        expr: Expression,
        pattern: Expression,
        escape: Option<Expression>,
        negated: bool,
    },
    Between {
        expr: Expression,
        low: Expression,
        high: Expression,
        negated: bool,
    },
    InList {
        expr: Expression,
        list: Vec<Expression>,
        negated: bool,
    },
    InSubquery {
        expr: Expression,
        subquery: Box<SelectStatement>,
        negated: bool,
    },
    Exists(Box<SelectStatement>),
}

impl From<Operator> for Expression {
    fn from(operator: Operator) -> Self {
        Expression::Operator(Box::new(operator))
    }
}

impl From<Literal> for Expression {
    fn from(literal: Literal) -> Self {
        Expression::Literal(literal)
    }
}

impl Expression {
    /// Walks the expression tree depth-first, calling the closure for every
    /// node. Halts and returns false if the closure returns false. Subquery
    /// boundaries are not crossed.
    pub fn walk(&self, visitor: &mut impl FnMut(&Expression) -> bool) -> bool {
        use Operator::*;

        if !visitor(self) {
            return false;
        }

        match self {
            Self::Operator(op) => match op.as_ref() {
                And(lhs, rhs)
                | Or(lhs, rhs)
                | Equal(lhs, rhs)
                | NotEqual(lhs, rhs)
                | GreaterThan(lhs, rhs)
                | GreaterThanOrEqual(lhs, rhs)
                | LessThan(lhs, rhs)
                | LessThanOrEqual(lhs, rhs)
                | Add(lhs, rhs)
                | Subtract(lhs, rhs)
                | Multiply(lhs, rhs)
                | Divide(lhs, rhs)
                | Remainder(lhs, rhs)
                | Concat(lhs, rhs) => lhs.walk(visitor) && rhs.walk(visitor),

                Not(expr) | Negate(expr) => expr.walk(visitor),

                IsNull { expr, .. } => expr.walk(visitor),

                Like {
                    expr,
                    pattern,
                    escape,
                    ..
                } => {
                    expr.walk(visitor)
                        && pattern.walk(visitor)
                        && escape.as_ref().is_none_or(|e| e.walk(visitor))
                }

                Between {
                    expr, low, high, ..
                } => expr.walk(visitor) && low.walk(visitor) && high.walk(visitor),

                InList { expr, list, .. } => {
                    expr.walk(visitor) && list.iter().all(|e| e.walk(visitor))
                }

                InSubquery { expr, .. } => expr.walk(visitor),

                Exists(_) => true,
            },

            Self::Function { args, .. } => args.iter().all(|arg| arg.walk(visitor)),

            Self::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                operand.as_ref().is_none_or(|o| o.walk(visitor))
                    && when_clauses
                        .iter()
                        .all(|(cond, result)| cond.walk(visitor) && result.walk(visitor))
                    && else_clause.as_ref().is_none_or(|e| e.walk(visitor))
            }

            _ => true,
        }
    }

    /// Transforms the expression tree depth-first, applying the closure to
    /// every node and replacing the node slot with the returned value.
    /// Subquery boundaries are not crossed.
    pub fn transform<E>(
        &mut self,
        transformer: &mut impl FnMut(&mut Expression) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        use Operator::*;

        match self {
            Self::Operator(op) => match op.as_mut() {
                And(lhs, rhs)
                | Or(lhs, rhs)
                | Equal(lhs, rhs)
                | NotEqual(lhs, rhs)
                | GreaterThan(lhs, rhs)
                | GreaterThanOrEqual(lhs, rhs)
                | LessThan(lhs, rhs)
                | LessThanOrEqual(lhs, rhs)
                | Add(lhs, rhs)
                | Subtract(lhs, rhs)
                | Multiply(lhs, rhs)
                | Divide(lhs, rhs)
                | Remainder(lhs, rhs)
                | Concat(lhs, rhs) => {
                    lhs.transform(transformer)?;
                    rhs.transform(transformer)?;
                }

                Not(expr) | Negate(expr) => expr.transform(transformer)?,

                IsNull { expr, .. } => expr.transform(transformer)?,

                Like {
                    expr,
                    pattern,
                    escape,
                    ..
                } => {
                    expr.transform(transformer)?;
                    pattern.transform(transformer)?;
                    if let Some(escape) = escape {
                        escape.transform(transformer)?;
                    }
                }

                Between {
                    expr, low, high, ..
                } => {
                    expr.transform(transformer)?;
                    low.transform(transformer)?;
                    high.transform(transformer)?;
                }

                InList { expr, list, .. } => {
                    expr.transform(transformer)?;
                    for item in list {
                        item.transform(transformer)?;
                    }
                }

                InSubquery { expr, .. } => expr.transform(transformer)?,

                Exists(_) => {}
            },

            Self::Function { args, .. } => {
                for arg in args {
                    arg.transform(transformer)?;
                }
            }

            Self::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                if let Some(operand) = operand {
                    operand.transform(transformer)?;
                }
                for (cond, result) in when_clauses {
                    cond.transform(transformer)?;
                    result.transform(transformer)?;
                }
                if let Some(else_clause) = else_clause {
                    else_clause.transform(transformer)?;
                }
            }

            _ => {}
        }

        transformer(self)
    }
}
