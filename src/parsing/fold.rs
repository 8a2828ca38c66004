//! Constant-folding pass.
//!
//! Runs between parsing and semantic analysis. Scans the statement for dotted
//! paths whose *full* dotted name resolves to a compile-time constant through
//! the pluggable [`ConstantResolver`], and collapses each such subtree into a
//! single literal node. Paths that are legitimate property navigation resolve
//! to nothing here and are left untouched for the analyzer. A path is a
//! single AST node, so a name nested inside an already-matched path can never
//! be reprocessed.

use super::ast::{Expression, InsertSource, Literal, SelectStatement, Statement};

/// Resolves fully-qualified static-constant names to literal values.
///
/// Implemented by the domain-model layer; the translator only asks "is this
/// whole dotted name a constant, and what is its value".
pub trait ConstantResolver {
    fn resolve(&self, qualified_name: &str) -> Option<Literal>;
}

/// A resolver that knows no constants. Folding with it is a no-op.
pub struct NoConstants;

impl ConstantResolver for NoConstants {
    fn resolve(&self, _qualified_name: &str) -> Option<Literal> {
        None
    }
}

/// Folds constant references in a parsed statement, in place.
pub fn fold_constants(statement: &mut Statement, resolver: &dyn ConstantResolver) {
    match statement {
        Statement::Select(select) => fold_select(select, resolver),
        Statement::Insert(insert) => {
            match &mut insert.source {
                InsertSource::Values(rows) => {
                    for row in rows {
                        for expr in row {
                            fold_expression(expr, resolver);
                        }
                    }
                }
                InsertSource::Select(select) => fold_select(select, resolver),
            }
            if let Some(conflict) = &mut insert.on_conflict {
                for (_, expr) in &mut conflict.update_assignments {
                    fold_expression(expr, resolver);
                }
            }
        }
        Statement::Update(update) => {
            for (_, expr) in &mut update.set {
                fold_expression(expr, resolver);
            }
            if let Some(expr) = &mut update.r#where {
                fold_expression(expr, resolver);
            }
        }
        Statement::Delete(delete) => {
            if let Some(expr) = &mut delete.r#where {
                fold_expression(expr, resolver);
            }
        }
    }
}

fn fold_select(select: &mut SelectStatement, resolver: &dyn ConstantResolver) {
    for cte in &mut select.ctes {
        fold_select(&mut cte.query, resolver);
    }
    for (expr, _) in &mut select.select {
        fold_expression(expr, resolver);
    }
    if let Some(expr) = &mut select.r#where {
        fold_expression(expr, resolver);
    }
    for expr in &mut select.group_by {
        fold_expression(expr, resolver);
    }
    if let Some(expr) = &mut select.having {
        fold_expression(expr, resolver);
    }
    for (expr, _) in &mut select.order_by {
        fold_expression(expr, resolver);
    }
}

fn fold_expression(expr: &mut Expression, resolver: &dyn ConstantResolver) {
    use super::ast::Operator;

    // `transform` visits every node but does not descend into subqueries;
    // those are folded explicitly so the pass covers the whole statement.
    let _ = expr.transform::<()>(&mut |node| {
        match node {
            Expression::Path(path) if path.segments.len() >= 2 => {
                if let Some(literal) = resolver.resolve(&path.dotted()) {
                    *node = Expression::Literal(literal);
                }
            }
            Expression::Subquery(subquery) => fold_select(subquery, resolver),
            Expression::Operator(op) => match op.as_mut() {
                Operator::InSubquery { subquery, .. } => fold_select(subquery, resolver),
                Operator::Exists(subquery) => fold_select(subquery, resolver),
                _ => {}
            },
            _ => {}
        }
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::super::lexer::Lexer;
    use super::super::parser::Parser;
    use super::*;
    use crate::diagnostics::DiagnosticsCollector;
    use std::collections::HashMap;

    struct StatusConstants;

    impl ConstantResolver for StatusConstants {
        fn resolve(&self, qualified_name: &str) -> Option<Literal> {
            match qualified_name {
                "Status.ACTIVE" => Some(Literal::Integer(1)),
                "com.example.Limits.MAX" => Some(Literal::Integer(9000)),
                _ => None,
            }
        }
    }

    fn parse(query: &str) -> Statement {
        let replacements = HashMap::new();
        let mut diag = DiagnosticsCollector::new();
        let tokens = Lexer::tokenize(query, &replacements, &mut diag);
        let statement = Parser::parse(tokens, &mut diag).expect("statement");
        assert!(!diag.has_errors());
        statement
    }

    fn count_paths_and_literals(statement: &Statement) -> (usize, usize) {
        let Statement::Select(select) = statement else {
            panic!("expected select");
        };
        let mut paths = 0;
        let mut literals = 0;
        select.r#where.as_ref().unwrap().walk(&mut |expr| {
            match expr {
                Expression::Path(_) => paths += 1,
                Expression::Literal(_) => literals += 1,
                _ => {}
            }
            true
        });
        (paths, literals)
    }

    #[test]
    fn constant_path_is_folded_to_literal() {
        let mut statement = parse("from Employee e where e.status = Status.ACTIVE");
        fold_constants(&mut statement, &StatusConstants);
        let (paths, literals) = count_paths_and_literals(&statement);
        assert_eq!(paths, 1, "only e.status should remain a path");
        assert_eq!(literals, 1);
    }

    #[test]
    fn multi_segment_constant_folds_whole_path() {
        let mut statement = parse("from Employee e where e.salary < com.example.Limits.MAX");
        fold_constants(&mut statement, &StatusConstants);
        let (paths, literals) = count_paths_and_literals(&statement);
        assert_eq!((paths, literals), (1, 1));
    }

    #[test]
    fn property_navigation_is_left_untouched() {
        let mut statement = parse("from Employee e where e.department.id = 3");
        fold_constants(&mut statement, &StatusConstants);
        let (paths, literals) = count_paths_and_literals(&statement);
        assert_eq!((paths, literals), (1, 1));
    }

    #[test]
    fn folding_reaches_subqueries() {
        let mut statement = parse(
            "from Employee e where e.id in \
             (select d.id from Department d where d.status = Status.ACTIVE)",
        );
        fold_constants(&mut statement, &StatusConstants);
        let Statement::Select(select) = &statement else {
            panic!("expected select");
        };
        let mut folded = false;
        select.r#where.as_ref().unwrap().walk(&mut |expr| {
            if let Expression::Operator(op) = expr {
                if let super::super::ast::Operator::InSubquery { subquery, .. } = op.as_ref() {
                    subquery.r#where.as_ref().unwrap().walk(&mut |inner| {
                        if matches!(inner, Expression::Literal(Literal::Integer(1))) {
                            folded = true;
                        }
                        true
                    });
                }
            }
            true
        });
        assert!(folded);
    }
}
