//! Statement-level grammar: SELECT (with CTEs and joins), INSERT, UPDATE,
//! DELETE.

use super::super::ast::{
    Cte, DeleteStatement, Direction, Expression, FromItem, InsertSource, InsertStatement,
    JoinKind, OnConflict, PathExpr, SelectStatement, UpdateStatement,
};
use super::super::lexer::{Keyword, TokenKind};
use super::{PResult, Parser};

impl Parser<'_> {
    /// Parses a SELECT statement, including the implicit `from Entity` form.
    /// Clause-level errors recover at the next clause boundary so that later
    /// clauses still contribute diagnostics.
    pub(super) fn parse_select_statement(&mut self) -> PResult<SelectStatement> {
        let ctes = self.parse_ctes()?;

        let mut distinct = false;
        let mut select = Vec::new();
        if self.next_is_keyword(Keyword::Select) {
            distinct = self.next_is_keyword(Keyword::Distinct);
            match self.parse_select_items() {
                Ok(items) => select = items,
                Err(_) => self.recover_to_clause(),
            }
        }

        self.expect_keyword(Keyword::From)?;
        let from = match self.parse_from_items() {
            Ok(items) => items,
            Err(_) => {
                self.recover_to_clause();
                Vec::new()
            }
        };

        let r#where = self.parse_where_clause();

        let mut group_by = Vec::new();
        if self.next_is_keyword(Keyword::Group) {
            if self.expect_keyword(Keyword::By).is_err() {
                self.recover_to_clause();
            } else {
                match self.parse_expression_list() {
                    Ok(exprs) => group_by = exprs,
                    Err(_) => self.recover_to_clause(),
                }
            }
        }

        let mut having = None;
        if self.next_is_keyword(Keyword::Having) {
            match self.parse_expression() {
                Ok(expr) => having = Some(expr),
                Err(_) => self.recover_to_clause(),
            }
        }

        let mut order_by = Vec::new();
        if self.next_is_keyword(Keyword::Order) {
            if self.expect_keyword(Keyword::By).is_err() {
                self.recover_to_clause();
            } else {
                match self.parse_order_by_items() {
                    Ok(items) => order_by = items,
                    Err(_) => self.recover_to_clause(),
                }
            }
        }

        Ok(SelectStatement {
            ctes,
            distinct,
            select,
            from,
            r#where,
            group_by,
            having,
            order_by,
        })
    }

    fn parse_ctes(&mut self) -> PResult<Vec<Cte>> {
        let mut ctes = Vec::new();
        if !self.next_is_keyword(Keyword::With) {
            return Ok(ctes);
        }
        loop {
            let name = self.next_ident()?.text;
            self.expect_keyword(Keyword::As)?;
            self.expect(TokenKind::OpenParen)?;
            let query = self.parse_select_statement()?;
            self.expect(TokenKind::CloseParen)?;
            ctes.push(Cte {
                name,
                query: Box::new(query),
            });
            if !self.next_is(TokenKind::Comma) {
                break;
            }
        }
        Ok(ctes)
    }

    fn parse_select_items(&mut self) -> PResult<Vec<(Expression, Option<String>)>> {
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expression()?;
            let label = self.parse_optional_alias()?;
            items.push((expr, label));
            if !self.next_is(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn parse_where_clause(&mut self) -> Option<Expression> {
        if !self.next_is_keyword(Keyword::Where) {
            return None;
        }
        match self.parse_expression() {
            Ok(expr) => Some(expr),
            Err(_) => {
                self.recover_to_clause();
                None
            }
        }
    }

    pub(super) fn parse_expression_list(&mut self) -> PResult<Vec<Expression>> {
        let mut exprs = vec![self.parse_expression()?];
        while self.next_is(TokenKind::Comma) {
            exprs.push(self.parse_expression()?);
        }
        Ok(exprs)
    }

    fn parse_order_by_items(&mut self) -> PResult<Vec<(Expression, Direction)>> {
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expression()?;
            let direction = if self.next_is_keyword(Keyword::Desc) {
                Direction::Desc
            } else {
                self.next_is_keyword(Keyword::Asc);
                Direction::Asc
            };
            items.push((expr, direction));
            if !self.next_is(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    /// Parses the FROM clause: a flat left-to-right sequence of roots and
    /// joins. `from Employee e join e.department d, Project p` yields three
    /// items.
    fn parse_from_items(&mut self) -> PResult<Vec<FromItem>> {
        let mut items = Vec::new();
        loop {
            if let Some(kind) = self.parse_join_prefix()? {
                let fetch = self.next_is_keyword(Keyword::Fetch);
                let path = self.parse_path()?;
                let alias = self.parse_optional_alias()?;
                items.push(FromItem::Join {
                    kind,
                    fetch,
                    path,
                    alias,
                });
            } else {
                let entity = self.parse_path()?;
                let alias = self.parse_optional_alias()?;
                items.push(FromItem::Root { entity, alias });
            }
            if self.next_is(TokenKind::Comma) {
                continue;
            }
            if self.peek_join_keyword() {
                continue;
            }
            break;
        }
        Ok(items)
    }

    fn peek_join_keyword(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::Keyword(
                Keyword::Join | Keyword::Inner | Keyword::Left | Keyword::Right
            ))
        )
    }

    /// Consumes a join prefix if present: `join`, `inner join`,
    /// `left [outer] join`, `right [outer] join`.
    fn parse_join_prefix(&mut self) -> PResult<Option<JoinKind>> {
        let kind = if self.next_is_keyword(Keyword::Inner) {
            JoinKind::Inner
        } else if self.next_is_keyword(Keyword::Left) {
            self.next_is_keyword(Keyword::Outer);
            JoinKind::LeftOuter
        } else if self.next_is_keyword(Keyword::Right) {
            self.next_is_keyword(Keyword::Outer);
            JoinKind::RightOuter
        } else if self.next_is_keyword(Keyword::Join) {
            return Ok(Some(JoinKind::Inner));
        } else {
            return Ok(None);
        };
        self.expect_keyword(Keyword::Join)?;
        Ok(Some(kind))
    }

    pub(super) fn parse_insert_statement(&mut self) -> PResult<InsertStatement> {
        self.expect_keyword(Keyword::Insert)?;
        self.expect_keyword(Keyword::Into)?;
        let entity = self.parse_path()?;

        self.expect(TokenKind::OpenParen)?;
        let mut properties = vec![self.parse_path()?];
        while self.next_is(TokenKind::Comma) {
            properties.push(self.parse_path()?);
        }
        self.expect(TokenKind::CloseParen)?;

        let source = if self.next_is_keyword(Keyword::Values) {
            let mut rows = Vec::new();
            loop {
                self.expect(TokenKind::OpenParen)?;
                let row = self.parse_expression_list()?;
                self.expect(TokenKind::CloseParen)?;
                rows.push(row);
                if !self.next_is(TokenKind::Comma) {
                    break;
                }
            }
            InsertSource::Values(rows)
        } else {
            InsertSource::Select(Box::new(self.parse_select_statement()?))
        };

        let on_conflict = self.parse_on_conflict()?;

        Ok(InsertStatement {
            entity,
            properties,
            source,
            on_conflict,
        })
    }

    /// Parses `on conflict [on constraint name | (path, ...)] do nothing` or
    /// `... do update set a = b, ...`. The grammar admits either a constraint
    /// name or a path list, never both.
    fn parse_on_conflict(&mut self) -> PResult<Option<OnConflict>> {
        if !self.next_is_keyword(Keyword::On) {
            return Ok(None);
        }
        self.expect_keyword(Keyword::Conflict)?;

        let mut constraint_name = None;
        let mut constraint_paths = Vec::new();
        if self.next_is_keyword(Keyword::On) {
            self.expect_keyword(Keyword::Constraint)?;
            constraint_name = Some(self.next_ident()?.text);
        } else if self.next_is(TokenKind::OpenParen) {
            constraint_paths.push(self.parse_path()?);
            while self.next_is(TokenKind::Comma) {
                constraint_paths.push(self.parse_path()?);
            }
            self.expect(TokenKind::CloseParen)?;
        }

        self.expect_keyword(Keyword::Do)?;
        let update_assignments = if self.next_is_keyword(Keyword::Nothing) {
            Vec::new()
        } else {
            self.expect_keyword(Keyword::Update)?;
            self.expect_keyword(Keyword::Set)?;
            self.parse_assignments()?
        };

        Ok(Some(OnConflict {
            constraint_name,
            constraint_paths,
            update_assignments,
        }))
    }

    fn parse_assignments(&mut self) -> PResult<Vec<(PathExpr, Expression)>> {
        let mut assignments = Vec::new();
        loop {
            let target = self.parse_path()?;
            self.expect(TokenKind::Equal)?;
            let value = self.parse_expression()?;
            assignments.push((target, value));
            if !self.next_is(TokenKind::Comma) {
                break;
            }
        }
        Ok(assignments)
    }

    pub(super) fn parse_update_statement(&mut self) -> PResult<UpdateStatement> {
        self.expect_keyword(Keyword::Update)?;
        let entity = self.parse_path()?;
        let alias = self.parse_optional_alias()?;
        self.expect_keyword(Keyword::Set)?;
        let set = match self.parse_assignments() {
            Ok(set) => set,
            Err(recovered) => {
                self.recover_to_clause();
                if !self.peek_keyword(Keyword::Where) {
                    return Err(recovered);
                }
                Vec::new()
            }
        };
        let r#where = self.parse_where_clause();
        Ok(UpdateStatement {
            entity,
            alias,
            set,
            r#where,
        })
    }

    pub(super) fn parse_delete_statement(&mut self) -> PResult<DeleteStatement> {
        self.expect_keyword(Keyword::Delete)?;
        self.next_is_keyword(Keyword::From);
        let entity = self.parse_path()?;
        let alias = self.parse_optional_alias()?;
        let r#where = self.parse_where_clause();
        Ok(DeleteStatement {
            entity,
            alias,
            r#where,
        })
    }
}
