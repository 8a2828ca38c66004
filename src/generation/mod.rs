//! SQL text generation: a second walk over the relational AST.
//!
//! Everything here is dialect-directed string emission; no metadata lookups
//! happen in this phase, and any malformed tree reaching it is an internal
//! error (semantic analysis already rejected user mistakes). Bind markers are
//! emitted positionally and their parameter-spec indices collected in
//! emission order, which defines the order the caller binds values.

use crate::dialect::Dialect;
use crate::diagnostics::DiagnosticsCollector;
use crate::parsing::ast::{Direction, JoinKind, Literal};
use crate::semantic::statement::{
    Assignment, BinaryOp, ConflictNode, FragmentChunk, FromArena, FromElementId, InsertNode,
    JoinStyle, Selection, SelectNode, SqlExpr, StatementKind, TranslatedStatement, UnaryOp,
};

/// Result of one generation pass: SQL text plus the parameter-spec indices in
/// bind-marker order.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub sql: String,
    pub params: Vec<usize>,
}

/// Generates the single SQL statement for a SELECT or single-table DML
/// statement. Multi-table DML goes through the executor module, which drives
/// the same generator per emitted statement.
pub fn generate(
    statement: &TranslatedStatement,
    dialect: &dyn Dialect,
    diag: &mut DiagnosticsCollector,
) -> Generated {
    let mut generator = SqlGenerator::new(&statement.arena, dialect, diag);
    match &statement.kind {
        StatementKind::Select(node) => generator.select(node),
        StatementKind::Update {
            element,
            assignments,
            r#where,
        } => generator.update(*element, assignments, r#where.as_ref()),
        StatementKind::Delete { element, r#where } => {
            generator.delete(*element, r#where.as_ref())
        }
        StatementKind::Insert {
            element,
            columns,
            source,
            conflict,
        } => generator.insert(*element, columns, source, conflict.as_ref()),
    }
    generator.finish()
}

/// The active output sink. Function-template rendering temporarily redirects
/// output into an argument-collecting buffer; the stack discipline restores
/// the previous sink when the call completes.
enum Sink {
    Direct(String),
    /// One string chunk per argument, advanced by the argument separator.
    FunctionArgs(Vec<String>),
}

pub struct SqlGenerator<'a> {
    arena: &'a FromArena,
    dialect: &'a dyn Dialect,
    diag: &'a mut DiagnosticsCollector,
    sinks: Vec<Sink>,
    params: Vec<usize>,
    /// Qualify column references with their element alias. Cleared for
    /// single-table DML, which renders unaliased.
    qualify: bool,
}

impl<'a> SqlGenerator<'a> {
    pub fn new(
        arena: &'a FromArena,
        dialect: &'a dyn Dialect,
        diag: &'a mut DiagnosticsCollector,
    ) -> Self {
        Self {
            arena,
            dialect,
            diag,
            sinks: vec![Sink::Direct(String::new())],
            params: Vec::new(),
            qualify: true,
        }
    }

    /// Appends raw SQL text to the current sink. Used by the executor module
    /// when composing multi-table statement lists around generated pieces.
    pub fn raw(&mut self, text: &str) {
        self.out(text);
    }

    /// Renders subsequent column references without alias qualification, for
    /// statements whose dialect form takes no table alias.
    pub fn unqualified(&mut self) {
        self.qualify = false;
    }

    pub fn finish(mut self) -> Generated {
        let sql = match self.sinks.pop() {
            Some(Sink::Direct(sql)) => sql,
            _ => {
                self.diag
                    .error("internal: generator finished with a redirected sink");
                String::new()
            }
        };
        Generated {
            sql,
            params: self.params,
        }
    }

    // Output plumbing

    fn out(&mut self, text: &str) {
        match self.sinks.last_mut().expect("sink stack is never empty") {
            Sink::Direct(buffer) => buffer.push_str(text),
            Sink::FunctionArgs(args) => args
                .last_mut()
                .expect("argument buffer starts non-empty")
                .push_str(text),
        }
    }

    fn last_char(&self) -> Option<char> {
        match self.sinks.last().expect("sink stack is never empty") {
            Sink::Direct(buffer) => buffer.chars().last(),
            Sink::FunctionArgs(args) => args.last().and_then(|a| a.chars().last()),
        }
    }

    /// Emits a single space unless the output already ends in one, ends in a
    /// parenthesis, or is empty.
    fn opt_space(&mut self) {
        match self.last_char() {
            None | Some(' ') | Some('(') | Some(')') => {}
            _ => self.out(" "),
        }
    }

    /// Advances to the next argument chunk inside a function-template
    /// capture; outside one this is a plain list separator.
    fn argument_separator(&mut self) {
        match self.sinks.last_mut().expect("sink stack is never empty") {
            Sink::FunctionArgs(args) => args.push(String::new()),
            Sink::Direct(buffer) => buffer.push_str(", "),
        }
    }

    fn alias(&self, id: FromElementId) -> &str {
        &self.arena.get(id).alias
    }

    // Select statements

    pub fn select(&mut self, node: &SelectNode) {
        if !node.ctes.is_empty() {
            self.out("with ");
            for (index, (name, cte)) in node.ctes.iter().enumerate() {
                if index > 0 {
                    self.out(", ");
                }
                self.out(name);
                self.out(" as (");
                self.select(cte);
                self.out(")");
            }
            self.out(" ");
        }

        self.out("select ");
        if node.distinct {
            self.out("distinct ");
        }
        let mut first = true;
        for selection in &node.selections {
            match selection {
                Selection::Entity { columns, .. } => {
                    for column in columns {
                        if !first {
                            self.out(", ");
                        }
                        first = false;
                        let alias = self.alias(column.from).to_string();
                        self.out(&alias);
                        self.out(".");
                        self.out(&column.column);
                        self.out(" as ");
                        self.out(&column.alias);
                    }
                }
                Selection::Scalar { expr, alias, .. } => {
                    if !first {
                        self.out(", ");
                    }
                    first = false;
                    self.expr(expr);
                    self.out(" as ");
                    self.out(alias);
                }
            }
        }
        if first {
            self.diag
                .error("internal: select clause resolved to no columns");
        }

        self.out(" from ");
        self.from_clause(&node.from);

        if let Some(predicate) = &node.r#where {
            self.out(" where ");
            self.expr(predicate);
        }
        if !node.group_by.is_empty() {
            self.out(" group by ");
            for (index, expr) in node.group_by.iter().enumerate() {
                if index > 0 {
                    self.out(", ");
                }
                self.expr(expr);
            }
        }
        if let Some(having) = &node.having {
            self.out(" having ");
            self.expr(having);
        }
        if !node.order_by.is_empty() {
            self.out(" order by ");
            for (index, (expr, direction)) in node.order_by.iter().enumerate() {
                if index > 0 {
                    self.out(", ");
                }
                self.expr(expr);
                if *direction == Direction::Desc {
                    self.out(" desc");
                }
            }
        }
    }

    // From clause

    fn from_clause(&mut self, elements: &[FromElementId]) {
        for (index, &id) in elements.iter().enumerate() {
            if index > 0 {
                self.from_fragment_separator(elements[index - 1], id);
            }
            self.from_fragment(id);
        }
    }

    /// Decides the separator between two adjacent from-fragments. A fragment
    /// joined (directly or through a shared origin) to the one on its left
    /// continues the same join tree: ANSI joins carry their own keyword and
    /// only need a space, theta joins are comma-listed. Two fragments with no
    /// common origin are unrelated table references and always take a comma.
    fn from_fragment_separator(&mut self, left: FromElementId, right: FromElementId) {
        let right_element = self.arena.get(right);
        let right_origin = self.arena.real_origin(right);
        let left_origin = self.arena.real_origin(left);
        let related =
            right_origin == Some(left) || (right_origin.is_some() && right_origin == left_origin);
        if related {
            let theta = right_element
                .join
                .as_ref()
                .map(|j| j.style == JoinStyle::Theta)
                .unwrap_or(true);
            if theta {
                self.out(", ");
            } else {
                self.opt_space();
            }
        } else {
            self.out(", ");
        }
    }

    fn from_fragment(&mut self, id: FromElementId) {
        let element = self.arena.get(id);
        let (table, alias) = (element.table.clone(), element.alias.clone());
        match &element.join {
            Some(join) if join.style == JoinStyle::Ansi => {
                let keyword = match join.kind {
                    JoinKind::Inner => "inner join ",
                    JoinKind::LeftOuter => "left outer join ",
                    JoinKind::RightOuter => "right outer join ",
                };
                let condition = join.condition.clone();
                self.out(keyword);
                self.out(&table);
                self.out(" ");
                self.out(&alias);
                self.out(" on ");
                self.expr(&condition);
            }
            // Theta joins and roots are plain table references; a theta
            // join's condition was merged into the WHERE clause.
            _ => {
                self.out(&table);
                self.out(" ");
                self.out(&alias);
            }
        }
    }

    // DML statements

    pub fn update(
        &mut self,
        element: FromElementId,
        assignments: &[Assignment],
        predicate: Option<&SqlExpr>,
    ) {
        self.qualify = false;
        let table = self.arena.get(element).table.clone();
        self.out("update ");
        self.out(&table);
        self.out(" set ");
        self.assignment_list(assignments);
        if let Some(predicate) = predicate {
            self.out(" where ");
            self.expr(predicate);
        }
    }

    pub fn delete(&mut self, element: FromElementId, predicate: Option<&SqlExpr>) {
        self.qualify = false;
        let table = self.arena.get(element).table.clone();
        self.out("delete from ");
        self.out(&table);
        if let Some(predicate) = predicate {
            self.out(" where ");
            self.expr(predicate);
        }
    }

    pub fn insert(
        &mut self,
        element: FromElementId,
        columns: &[String],
        source: &InsertNode,
        conflict: Option<&ConflictNode>,
    ) {
        let table = self.arena.get(element).table.clone();
        self.out("insert into ");
        self.out(&table);
        self.out(" (");
        for (index, column) in columns.iter().enumerate() {
            if index > 0 {
                self.out(", ");
            }
            self.out(column);
        }
        self.out(") ");
        match source {
            InsertNode::Values(rows) => {
                self.qualify = false;
                self.out("values ");
                for (row_index, row) in rows.iter().enumerate() {
                    if row_index > 0 {
                        self.out(", ");
                    }
                    self.out("(");
                    for (index, expr) in row.iter().enumerate() {
                        if index > 0 {
                            self.out(", ");
                        }
                        self.expr(expr);
                    }
                    self.out(")");
                }
            }
            InsertNode::Select(node) => {
                self.qualify = true;
                self.select(node);
            }
        }
        if let Some(conflict) = conflict {
            self.conflict_clause(conflict);
        }
    }

    fn conflict_clause(&mut self, conflict: &ConflictNode) {
        self.out(" on conflict");
        if let Some(name) = &conflict.constraint_name {
            self.out(" on constraint ");
            self.out(name);
        } else if !conflict.target_columns.is_empty() {
            self.out(" (");
            for (index, column) in conflict.target_columns.iter().enumerate() {
                if index > 0 {
                    self.out(", ");
                }
                self.out(column);
            }
            self.out(")");
        }
        if conflict.assignments.is_empty() {
            self.out(" do nothing");
        } else {
            self.qualify = false;
            self.out(" do update set ");
            self.assignment_list(&conflict.assignments);
        }
    }

    fn assignment_list(&mut self, assignments: &[Assignment]) {
        for (index, assignment) in assignments.iter().enumerate() {
            if index > 0 {
                self.out(", ");
            }
            self.out(&assignment.column);
            self.out(" = ");
            self.expr(&assignment.value);
        }
    }

    // Expressions

    pub fn expr(&mut self, expr: &SqlExpr) {
        match expr {
            SqlExpr::Columns { from, columns } => {
                if columns.len() == 1 {
                    self.column(*from, &columns[0]);
                } else {
                    self.out("(");
                    for (index, column) in columns.iter().enumerate() {
                        if index > 0 {
                            self.out(", ");
                        }
                        self.column(*from, column);
                    }
                    self.out(")");
                }
            }
            SqlExpr::OutputAlias(alias) => self.out(alias),
            SqlExpr::Literal(literal) => self.literal(literal),
            SqlExpr::Bind(index) => {
                self.out("?");
                self.params.push(*index);
            }
            SqlExpr::Unary { op, expr } => match op {
                UnaryOp::Not => {
                    self.out("not (");
                    self.expr(expr);
                    self.out(")");
                }
                UnaryOp::Neg => {
                    self.out("-");
                    self.operand(BinaryOp::Mul, expr);
                }
            },
            SqlExpr::Binary { op, lhs, rhs } => {
                self.operand(*op, lhs);
                self.out(" ");
                self.out(op.sql());
                self.out(" ");
                self.operand(*op, rhs);
            }
            SqlExpr::IsNull { expr, negated } => {
                self.expr(expr);
                self.out(if *negated { " is not null" } else { " is null" });
            }
            SqlExpr::Like {
                expr,
                pattern,
                escape,
                negated,
            } => {
                self.expr(expr);
                self.out(if *negated { " not like " } else { " like " });
                self.expr(pattern);
                if let Some(escape) = escape {
                    self.out(" escape ");
                    self.expr(escape);
                }
            }
            SqlExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                self.expr(expr);
                self.out(if *negated { " not between " } else { " between " });
                self.expr(low);
                self.out(" and ");
                self.expr(high);
            }
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                self.expr(expr);
                self.out(if *negated { " not in (" } else { " in (" });
                for (index, item) in list.iter().enumerate() {
                    if index > 0 {
                        self.out(", ");
                    }
                    self.expr(item);
                }
                self.out(")");
            }
            SqlExpr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                self.expr(expr);
                self.out(if *negated { " not in (" } else { " in (" });
                self.select(subquery);
                self.out(")");
            }
            SqlExpr::Exists(subquery) => {
                self.out("exists (");
                self.select(subquery);
                self.out(")");
            }
            SqlExpr::Subquery(subquery) => {
                self.out("(");
                self.select(subquery);
                self.out(")");
            }
            SqlExpr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                self.out("case");
                if let Some(operand) = operand {
                    self.out(" ");
                    self.expr(operand);
                }
                for (condition, result) in when_clauses {
                    self.out(" when ");
                    self.expr(condition);
                    self.out(" then ");
                    self.expr(result);
                }
                if let Some(else_clause) = else_clause {
                    self.out(" else ");
                    self.expr(else_clause);
                }
                self.out(" end");
            }
            SqlExpr::Function {
                name,
                args,
                distinct,
            } => self.function(name, args, *distinct),
            SqlExpr::Star => self.out("*"),
            SqlExpr::FilterFragment { chunks } => {
                for chunk in chunks {
                    match chunk {
                        FragmentChunk::Text(text) => self.out(text),
                        FragmentChunk::Bind(index) => {
                            self.out("?");
                            self.params.push(*index);
                        }
                    }
                }
            }
        }
    }

    /// Renders a function call. With a registered dialect template, output is
    /// redirected into an argument-collecting sink, each argument captured as
    /// a discrete chunk, and the template rendered from the chunks; without
    /// one the call is emitted literally as written. `distinct` aggregates
    /// always render literally, since templates have no distinct slot.
    fn function(&mut self, name: &str, args: &[SqlExpr], distinct: bool) {
        if !distinct {
            if let Some(template) = self.dialect.function_template(name) {
                let template = template.clone();
                self.sinks.push(Sink::FunctionArgs(vec![String::new()]));
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        self.argument_separator();
                    }
                    self.expr(arg);
                }
                let chunks = match self.sinks.pop() {
                    Some(Sink::FunctionArgs(chunks)) => chunks,
                    _ => {
                        self.diag
                            .error("internal: function argument sink unbalanced");
                        return;
                    }
                };
                // A zero-argument call leaves one empty chunk behind.
                let chunks = if args.is_empty() { Vec::new() } else { chunks };
                match template.render(&chunks) {
                    Ok(text) => self.out(&text),
                    Err(message) => self
                        .diag
                        .error(format!("internal: {message} rendering '{name}'")),
                }
                return;
            }
        }

        self.out(name);
        self.out("(");
        if distinct {
            self.out("distinct ");
        }
        for (index, arg) in args.iter().enumerate() {
            if index > 0 {
                self.out(", ");
            }
            self.expr(arg);
        }
        self.out(")");
    }

    /// Renders a binary operand, parenthesizing when its operator binds less
    /// tightly than the parent.
    fn operand(&mut self, parent: BinaryOp, expr: &SqlExpr) {
        let parens = match expr {
            SqlExpr::Binary { op, .. } => precedence(*op) < precedence(parent),
            _ => false,
        };
        if parens {
            self.out("(");
            self.expr(expr);
            self.out(")");
        } else {
            self.expr(expr);
        }
    }

    fn column(&mut self, from: FromElementId, column: &str) {
        if self.qualify {
            let alias = self.alias(from).to_string();
            self.out(&alias);
            self.out(".");
        }
        self.out(column);
    }

    fn literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Null => self.out("null"),
            Literal::Boolean(true) => self.out("true"),
            Literal::Boolean(false) => self.out("false"),
            Literal::Integer(value) => self.out(&value.to_string()),
            Literal::Float(value) => self.out(&value.to_string()),
            Literal::Decimal(value) => self.out(&value.to_string()),
            Literal::String(value) => {
                self.out("'");
                self.out(&value.replace('\'', "''"));
                self.out("'");
            }
            Literal::Date(value) => self.out(&format!("'{value}'")),
            Literal::Time(value) => self.out(&format!("'{value}'")),
            Literal::Timestamp(value) => self.out(&format!("'{value}'")),
        }
    }
}

fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::Lt
        | BinaryOp::Le => 3,
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Concat => 4,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 5,
    }
}
