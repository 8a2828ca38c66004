//! Expression grammar with standard operator precedence:
//! `or` < `and` < `not` < predicates/comparisons < `+ - ||` < `* / %` < unary.

use super::super::ast::{Expression, Literal, Operator, ParameterRef, PathExpr};
use super::super::lexer::{Keyword, TokenKind};
use super::{PResult, Parser};

impl Parser<'_> {
    pub(super) fn parse_expression(&mut self) -> PResult<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expression> {
        let mut lhs = self.parse_and()?;
        while self.next_is_keyword(Keyword::Or) {
            let rhs = self.parse_and()?;
            lhs = Operator::Or(lhs, rhs).into();
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Expression> {
        let mut lhs = self.parse_not()?;
        while self.next_is_keyword(Keyword::And) {
            let rhs = self.parse_not()?;
            lhs = Operator::And(lhs, rhs).into();
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> PResult<Expression> {
        if self.next_is_keyword(Keyword::Not) {
            let expr = self.parse_not()?;
            return Ok(Operator::Not(expr).into());
        }
        self.parse_predicate()
    }

    /// Parses a comparison or postfix predicate (`is null`, `between`,
    /// `like`, `in`) over additive operands.
    fn parse_predicate(&mut self) -> PResult<Expression> {
        let lhs = self.parse_additive()?;

        if self.next_is_keyword(Keyword::Is) {
            let negated = self.next_is_keyword(Keyword::Not);
            self.expect_keyword(Keyword::Null)?;
            return Ok(Operator::IsNull { expr: lhs, negated }.into());
        }

        let negated = self.next_is_keyword(Keyword::Not);
        if self.next_is_keyword(Keyword::Between) {
            let low = self.parse_additive()?;
            self.expect_keyword(Keyword::And)?;
            let high = self.parse_additive()?;
            return Ok(Operator::Between {
                expr: lhs,
                low,
                high,
                negated,
            }
            .into());
        }
        if self.next_is_keyword(Keyword::Like) {
            let pattern = self.parse_additive()?;
            let escape = if self.next_is_keyword(Keyword::Escape) {
                Some(self.parse_additive()?)
            } else {
                None
            };
            return Ok(Operator::Like {
                expr: lhs,
                pattern,
                escape,
                negated,
            }
            .into());
        }
        if self.next_is_keyword(Keyword::In) {
            return self.parse_in_rhs(lhs, negated);
        }
        if negated {
            return Err(self.error_here("expected BETWEEN, LIKE or IN after NOT"));
        }

        let op: Option<fn(Expression, Expression) -> Operator> = match self.peek_kind() {
            Some(TokenKind::Equal) => Some(Operator::Equal),
            Some(TokenKind::NotEqual) => Some(Operator::NotEqual),
            Some(TokenKind::GreaterThan) => Some(Operator::GreaterThan),
            Some(TokenKind::GreaterOrEqual) => Some(Operator::GreaterThanOrEqual),
            Some(TokenKind::LessThan) => Some(Operator::LessThan),
            Some(TokenKind::LessOrEqual) => Some(Operator::LessThanOrEqual),
            _ => None,
        };
        if let Some(op) = op {
            self.next();
            let rhs = self.parse_additive()?;
            return Ok(op(lhs, rhs).into());
        }

        Ok(lhs)
    }

    fn parse_in_rhs(&mut self, lhs: Expression, negated: bool) -> PResult<Expression> {
        self.expect(TokenKind::OpenParen)?;
        if self.peek_select_start() {
            let subquery = self.parse_select_statement()?;
            self.expect(TokenKind::CloseParen)?;
            return Ok(Operator::InSubquery {
                expr: lhs,
                subquery: Box::new(subquery),
                negated,
            }
            .into());
        }
        let list = self.parse_expression_list()?;
        self.expect(TokenKind::CloseParen)?;
        Ok(Operator::InList {
            expr: lhs,
            list,
            negated,
        }
        .into())
    }

    fn peek_select_start(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::Keyword(Keyword::Select | Keyword::From | Keyword::With))
        )
    }

    fn parse_additive(&mut self) -> PResult<Expression> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op: fn(Expression, Expression) -> Operator = match self.peek_kind() {
                Some(TokenKind::Plus) => Operator::Add,
                Some(TokenKind::Minus) => Operator::Subtract,
                Some(TokenKind::Concat) => Operator::Concat,
                _ => break,
            };
            self.next();
            let rhs = self.parse_multiplicative()?;
            lhs = op(lhs, rhs).into();
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expression> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op: fn(Expression, Expression) -> Operator = match self.peek_kind() {
                Some(TokenKind::Asterisk) => Operator::Multiply,
                Some(TokenKind::Slash) => Operator::Divide,
                Some(TokenKind::Percent) => Operator::Remainder,
                _ => break,
            };
            self.next();
            let rhs = self.parse_unary()?;
            lhs = op(lhs, rhs).into();
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expression> {
        if self.next_is(TokenKind::Minus) {
            let expr = self.parse_unary()?;
            return Ok(Operator::Negate(expr).into());
        }
        if self.next_is(TokenKind::Plus) {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    /// Primary expressions. Soft keywords are *not* accepted as bare
    /// identifiers here; they remain reachable as path segments after `.` and
    /// as `as`-aliases, which is how the keyword/identifier ambiguity is
    /// resolved context-sensitively.
    fn parse_primary(&mut self) -> PResult<Expression> {
        match self.peek_kind() {
            Some(TokenKind::Integer) => {
                let token = self.next().unwrap();
                match token.text.parse::<i128>() {
                    Ok(n) => Ok(Literal::Integer(n).into()),
                    Err(_) => {
                        self.diag.error_at(
                            format!("integer literal {} out of range", token.text),
                            token.line,
                            token.column,
                        );
                        Err(super::Recovered)
                    }
                }
            }
            Some(TokenKind::Float) => {
                let token = self.next().unwrap();
                match token.text.parse::<f64>() {
                    Ok(n) => Ok(Literal::Float(n).into()),
                    Err(_) => {
                        self.diag.error_at(
                            format!("invalid numeric literal {}", token.text),
                            token.line,
                            token.column,
                        );
                        Err(super::Recovered)
                    }
                }
            }
            Some(TokenKind::String) => {
                let token = self.next().unwrap();
                Ok(Literal::String(token.text).into())
            }
            Some(TokenKind::Keyword(Keyword::True)) => {
                self.next();
                Ok(Literal::Boolean(true).into())
            }
            Some(TokenKind::Keyword(Keyword::False)) => {
                self.next();
                Ok(Literal::Boolean(false).into())
            }
            Some(TokenKind::Keyword(Keyword::Null)) => {
                self.next();
                Ok(Literal::Null.into())
            }
            Some(TokenKind::NamedParam) => {
                let token = self.next().unwrap();
                Ok(Expression::Parameter {
                    param: ParameterRef::Named(token.text),
                    line: token.line,
                    column: token.column,
                })
            }
            Some(TokenKind::PositionalParam) => {
                let token = self.next().unwrap();
                let ordinal = self.next_positional_ordinal();
                Ok(Expression::Parameter {
                    param: ParameterRef::Positional(ordinal),
                    line: token.line,
                    column: token.column,
                })
            }
            Some(TokenKind::JpaParam) => {
                let token = self.next().unwrap();
                match token.text.parse::<u32>() {
                    Ok(ordinal) => Ok(Expression::Parameter {
                        param: ParameterRef::Ordinal(ordinal),
                        line: token.line,
                        column: token.column,
                    }),
                    Err(_) => {
                        self.diag.error_at(
                            format!("invalid parameter ordinal ?{}", token.text),
                            token.line,
                            token.column,
                        );
                        Err(super::Recovered)
                    }
                }
            }
            Some(TokenKind::Keyword(Keyword::Case)) => self.parse_case(),
            Some(TokenKind::Keyword(Keyword::Exists)) => {
                self.next();
                self.expect(TokenKind::OpenParen)?;
                let subquery = self.parse_select_statement()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(Operator::Exists(Box::new(subquery)).into())
            }
            Some(TokenKind::OpenParen) => {
                self.next();
                if self.peek_select_start() {
                    let subquery = self.parse_select_statement()?;
                    self.expect(TokenKind::CloseParen)?;
                    return Ok(Expression::Subquery(Box::new(subquery)));
                }
                let expr = self.parse_expression()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(expr)
            }
            Some(TokenKind::Asterisk) => {
                self.next();
                Ok(Expression::All)
            }
            Some(TokenKind::Ident) => self.parse_path_or_function(),
            _ => Err(self.error_here("expected an expression")),
        }
    }

    fn parse_case(&mut self) -> PResult<Expression> {
        self.expect_keyword(Keyword::Case)?;
        let operand = if self.peek_keyword(Keyword::When) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let mut when_clauses = Vec::new();
        while self.next_is_keyword(Keyword::When) {
            let condition = self.parse_expression()?;
            self.expect_keyword(Keyword::Then)?;
            let result = self.parse_expression()?;
            when_clauses.push((condition, result));
        }
        if when_clauses.is_empty() {
            return Err(self.error_here("expected WHEN in CASE expression"));
        }
        let else_clause = if self.next_is_keyword(Keyword::Else) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;
        Ok(Expression::Case {
            operand,
            when_clauses,
            else_clause,
        })
    }

    /// An identifier starts either a function call (`upper(...)`) or a
    /// dotted path (`e.department.name`).
    fn parse_path_or_function(&mut self) -> PResult<Expression> {
        let first = self.next().unwrap();
        if self.next_is(TokenKind::OpenParen) {
            let name = first.text.to_ascii_lowercase();
            let distinct = self.next_is_keyword(Keyword::Distinct);
            let mut args = Vec::new();
            if !self.next_is(TokenKind::CloseParen) {
                args = self.parse_expression_list()?;
                self.expect(TokenKind::CloseParen)?;
            }
            return Ok(Expression::Function {
                name,
                args,
                distinct,
            });
        }

        let (line, column) = (first.line, first.column);
        let mut segments = vec![first.text];
        while self.next_is(TokenKind::Period) {
            segments.push(self.next_ident()?.text);
        }
        Ok(Expression::Path(PathExpr::new(segments, line, column)))
    }
}
