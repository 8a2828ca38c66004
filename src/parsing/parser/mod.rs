//! Recursive-descent parser for the object query language.
//!
//! The parser builds a best-effort AST while reporting every grammar
//! violation to the shared diagnostics collector. On an error it resynchronizes
//! at the next clause boundary and keeps going, so a single parse surfaces as
//! many diagnostics as feasible; the compilation checkpoint after parsing
//! decides whether the result is usable.

mod dml_parser;
mod expr_parser;

use super::ast::{self, Statement};
use super::lexer::{Keyword, Token, TokenKind};
use crate::diagnostics::DiagnosticsCollector;

/// Marker for "a diagnostic was already reported, unwind to a recovery
/// point". Never surfaces to callers.
pub(super) struct Recovered;

pub(super) type PResult<T> = std::result::Result<T, Recovered>;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    diag: &'a mut DiagnosticsCollector,
    /// Next ordinal for bare `?` parameters, assigned left to right.
    positional_counter: usize,
}

impl<'a> Parser<'a> {
    /// Parses a token stream into a statement. Returns `None` when no usable
    /// statement could be built; diagnostics were reported either way.
    pub fn parse(tokens: Vec<Token>, diag: &'a mut DiagnosticsCollector) -> Option<Statement> {
        let mut parser = Parser {
            tokens,
            pos: 0,
            diag,
            positional_counter: 0,
        };
        let statement = parser.parse_statement().ok();
        if statement.is_some() {
            if let Some(token) = parser.peek().cloned() {
                parser.diag.error_at(
                    format!("unexpected token {} after end of statement", token.kind),
                    token.line,
                    token.column,
                );
            }
        }
        statement
    }

    fn parse_statement(&mut self) -> PResult<Statement> {
        match self.peek().map(|t| t.kind) {
            Some(TokenKind::Keyword(Keyword::Select))
            | Some(TokenKind::Keyword(Keyword::With))
            | Some(TokenKind::Keyword(Keyword::From)) => Ok(Statement::Select(Box::new(
                self.parse_select_statement()?,
            ))),
            Some(TokenKind::Keyword(Keyword::Insert)) => {
                Ok(Statement::Insert(Box::new(self.parse_insert_statement()?)))
            }
            Some(TokenKind::Keyword(Keyword::Update)) => {
                Ok(Statement::Update(Box::new(self.parse_update_statement()?)))
            }
            Some(TokenKind::Keyword(Keyword::Delete)) => {
                Ok(Statement::Delete(Box::new(self.parse_delete_statement()?)))
            }
            _ => Err(self.error_here("expected a SELECT, INSERT, UPDATE or DELETE statement")),
        }
    }

    // Token helpers

    pub(super) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(super) fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    pub(super) fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Consumes the next token if it has the given kind, returning true.
    pub(super) fn next_is(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            return true;
        }
        false
    }

    /// Consumes the next token if it is the given keyword.
    pub(super) fn next_is_keyword(&mut self, keyword: Keyword) -> bool {
        self.next_is(TokenKind::Keyword(keyword))
    }

    pub(super) fn peek_keyword(&self, keyword: Keyword) -> bool {
        self.peek_kind() == Some(TokenKind::Keyword(keyword))
    }

    /// Consumes the next token if it's the expected kind, or reports an error.
    pub(super) fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        match self.peek() {
            Some(token) if token.kind == kind => Ok(self.next().unwrap()),
            _ => Err(self.error_here(format!("expected {kind}"))),
        }
    }

    pub(super) fn expect_keyword(&mut self, keyword: Keyword) -> PResult<()> {
        self.expect(TokenKind::Keyword(keyword)).map(|_| ())
    }

    /// Returns the next identifier token. Keywords are soft: any token tagged
    /// as a possible identifier is accepted here.
    pub(super) fn next_ident(&mut self) -> PResult<Token> {
        match self.peek() {
            Some(token) if token.possible_identifier => Ok(self.next().unwrap()),
            _ => Err(self.error_here("expected an identifier")),
        }
    }

    /// Reports a positioned error at the current token (or end of input) and
    /// returns the recovery marker.
    pub(super) fn error_here(&mut self, message: impl Into<String>) -> Recovered {
        let message = message.into();
        match self.peek() {
            Some(token) => {
                let message = format!("{message}, found {}", token.kind);
                self.diag.error_at(message, token.line, token.column);
            }
            None => {
                let (line, column) = self
                    .tokens
                    .last()
                    .map(|t| (t.line, t.column + t.text.len() as u32))
                    .unwrap_or((1, 1));
                self.diag
                    .error_at(format!("{message}, found end of input"), line, column);
            }
        }
        Recovered
    }

    /// Skips tokens until the next clause boundary: a top-level clause
    /// keyword, a closing parenthesis that was not opened during the skip, or
    /// end of input. Used to continue collecting diagnostics after an error.
    pub(super) fn recover_to_clause(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::OpenParen => depth += 1,
                TokenKind::CloseParen => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Keyword(
                    Keyword::From
                    | Keyword::Where
                    | Keyword::Group
                    | Keyword::Having
                    | Keyword::Order
                    | Keyword::Set
                    | Keyword::Values
                    | Keyword::On,
                ) if depth == 0 => return,
                _ => {}
            }
            self.pos += 1;
        }
    }

    /// Parses an optional alias. The `as` form accepts any identifier-shaped
    /// token (keywords are soft); the bare form only accepts plain
    /// identifiers, so clause keywords never get swallowed as aliases.
    pub(super) fn parse_optional_alias(&mut self) -> PResult<Option<String>> {
        if self.next_is_keyword(Keyword::As) {
            return Ok(Some(self.next_ident()?.text));
        }
        if self.peek_kind() == Some(TokenKind::Ident) {
            return Ok(Some(self.next().unwrap().text));
        }
        Ok(None)
    }

    /// Parses a dotted path: `Employee`, `e.department.name`.
    pub(super) fn parse_path(&mut self) -> PResult<ast::PathExpr> {
        let first = self.next_ident()?;
        let (line, column) = (first.line, first.column);
        let mut segments = vec![first.text];
        while self.next_is(TokenKind::Period) {
            segments.push(self.next_ident()?.text);
        }
        Ok(ast::PathExpr::new(segments, line, column))
    }

    pub(super) fn next_positional_ordinal(&mut self) -> usize {
        let ordinal = self.positional_counter;
        self.positional_counter += 1;
        ordinal
    }
}

#[cfg(test)]
mod tests {
    use super::super::ast::*;
    use super::super::lexer::Lexer;
    use super::*;
    use std::collections::HashMap;

    fn parse(query: &str) -> (Option<Statement>, DiagnosticsCollector) {
        let replacements = HashMap::new();
        let mut diag = DiagnosticsCollector::new();
        let tokens = Lexer::tokenize(query, &replacements, &mut diag);
        let statement = Parser::parse(tokens, &mut diag);
        (statement, diag)
    }

    fn parse_ok(query: &str) -> Statement {
        let (statement, diag) = parse(query);
        assert!(!diag.has_errors(), "unexpected diagnostics for {query:?}");
        statement.expect("statement")
    }

    #[test]
    fn implicit_select_from_entity() {
        let Statement::Select(select) = parse_ok("from Employee e") else {
            panic!("expected select");
        };
        assert!(select.select.is_empty());
        assert_eq!(select.from.len(), 1);
        match &select.from[0] {
            FromItem::Root { entity, alias } => {
                assert_eq!(entity.dotted(), "Employee");
                assert_eq!(alias.as_deref(), Some("e"));
            }
            other => panic!("expected root, got {other:?}"),
        }
    }

    #[test]
    fn explicit_joins_and_fetch() {
        let Statement::Select(select) =
            parse_ok("from Employee e left join fetch e.projects p join e.department d")
        else {
            panic!("expected select");
        };
        assert_eq!(select.from.len(), 3);
        match &select.from[1] {
            FromItem::Join {
                kind, fetch, path, ..
            } => {
                assert_eq!(*kind, JoinKind::LeftOuter);
                assert!(fetch);
                assert_eq!(path.dotted(), "e.projects");
            }
            other => panic!("expected join, got {other:?}"),
        }
        match &select.from[2] {
            FromItem::Join { kind, fetch, .. } => {
                assert_eq!(*kind, JoinKind::Inner);
                assert!(!fetch);
            }
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn where_with_parameters() {
        let Statement::Select(select) =
            parse_ok("from Employee e where e.department.id = :deptId and e.salary > ?")
        else {
            panic!("expected select");
        };
        let mut named = 0;
        let mut positional = 0;
        select.r#where.as_ref().unwrap().walk(&mut |expr| {
            match expr {
                Expression::Parameter {
                    param: ParameterRef::Named(name),
                    ..
                } => {
                    assert_eq!(name, "deptId");
                    named += 1;
                }
                Expression::Parameter {
                    param: ParameterRef::Positional(0),
                    ..
                } => positional += 1,
                _ => {}
            }
            true
        });
        assert_eq!((named, positional), (1, 1));
    }

    #[test]
    fn select_list_functions_and_case() {
        let Statement::Select(select) = parse_ok(
            "select e.name, count(distinct e.id), case when e.salary > 100 then 'hi' else 'lo' end \
             from Employee e group by e.name having count(e.id) > 1 order by e.name desc",
        ) else {
            panic!("expected select");
        };
        assert_eq!(select.select.len(), 3);
        match &select.select[1].0 {
            Expression::Function { name, distinct, .. } => {
                assert_eq!(name, "count");
                assert!(distinct);
            }
            other => panic!("expected function, got {other:?}"),
        }
        assert_eq!(select.group_by.len(), 1);
        assert!(select.having.is_some());
        assert_eq!(select.order_by[0].1, Direction::Desc);
    }

    #[test]
    fn update_preserves_assignment_order() {
        let Statement::Update(update) =
            parse_ok("update Employee e set e.name = 'x', e.salary = e.salary + 1 where e.id = 1")
        else {
            panic!("expected update");
        };
        assert_eq!(update.entity.dotted(), "Employee");
        assert_eq!(update.set.len(), 2);
        assert_eq!(update.set[0].0.dotted(), "e.name");
        assert_eq!(update.set[1].0.dotted(), "e.salary");
    }

    #[test]
    fn insert_select_and_values() {
        let Statement::Insert(insert) = parse_ok(
            "insert into Archive (id, title) select p.id, p.title from Project p where p.id > 10",
        ) else {
            panic!("expected insert");
        };
        assert_eq!(insert.properties.len(), 2);
        assert!(matches!(insert.source, InsertSource::Select(_)));

        let Statement::Insert(insert) = parse_ok("insert into Project (id, title) values (1, 'a')")
        else {
            panic!("expected insert");
        };
        match &insert.source {
            InsertSource::Values(rows) => assert_eq!(rows.len(), 1),
            other => panic!("expected values, got {other:?}"),
        }
    }

    #[test]
    fn insert_conflict_targets_are_exclusive_by_construction() {
        let Statement::Insert(insert) = parse_ok(
            "insert into Project (id, title) values (1, 'a') on conflict (id) do nothing",
        ) else {
            panic!("expected insert");
        };
        let conflict = insert.on_conflict.expect("conflict clause");
        assert!(conflict.constraint_name.is_none());
        assert_eq!(conflict.constraint_paths.len(), 1);

        let Statement::Insert(insert) = parse_ok(
            "insert into Project (id, title) values (1, 'a') \
             on conflict on constraint project_pk do update set title = 'b'",
        ) else {
            panic!("expected insert");
        };
        let conflict = insert.on_conflict.expect("conflict clause");
        assert_eq!(conflict.constraint_name.as_deref(), Some("project_pk"));
        assert!(conflict.constraint_paths.is_empty());
        assert_eq!(conflict.update_assignments.len(), 1);
    }

    #[test]
    fn delete_with_optional_from() {
        let Statement::Delete(delete) = parse_ok("delete from Employee e where e.id = 7") else {
            panic!("expected delete");
        };
        assert_eq!(delete.entity.dotted(), "Employee");
        assert!(delete.r#where.is_some());
        parse_ok("delete Employee");
    }

    #[test]
    fn cte_and_subqueries() {
        let Statement::Select(select) = parse_ok(
            "with seniors as (select e.id from Employee e where e.salary > 100) \
             from Employee e where e.id in (select s.id from seniors s)",
        ) else {
            panic!("expected select");
        };
        assert_eq!(select.ctes.len(), 1);
        assert_eq!(select.ctes[0].name, "seniors");
    }

    #[test]
    fn error_recovery_collects_multiple_diagnostics() {
        let (_, diag) = parse("select e.name, from Employee e where e.salary > order by e.name");
        assert!(diag.error_count() >= 2, "got {} errors", diag.error_count());
    }

    #[test]
    fn trailing_tokens_are_an_error() {
        let (_, diag) = parse("from Employee e e");
        assert!(diag.has_errors());
    }

    #[test]
    fn keyword_as_property_name_via_period() {
        let Statement::Select(select) = parse_ok("select e.order from Employee e") else {
            panic!("expected select");
        };
        match &select.select[0].0 {
            Expression::Path(path) => assert_eq!(path.dotted(), "e.order"),
            other => panic!("expected path, got {other:?}"),
        }
    }
}
