//! Lexer for the object query language.
//!
//! Produces positioned tokens from raw query text. Query-language keywords
//! are not reserved: every keyword token that is identifier-shaped is tagged
//! as a possible identifier so the parser can disambiguate from context, and
//! the lexer tracks the previous token kind so that a word following `.` is
//! always lexed as an identifier (`e.order`, `e.group`).

use std::collections::HashMap;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::diagnostics::DiagnosticsCollector;

/// Query-language keywords. None of these are reserved words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    And,
    As,
    Asc,
    Between,
    By,
    Case,
    Conflict,
    Constraint,
    Delete,
    Desc,
    Distinct,
    Do,
    Else,
    End,
    Escape,
    Exists,
    False,
    Fetch,
    From,
    Group,
    Having,
    In,
    Inner,
    Insert,
    Into,
    Is,
    Join,
    Left,
    Like,
    Not,
    Nothing,
    Null,
    On,
    Or,
    Order,
    Outer,
    Right,
    Select,
    Set,
    Then,
    True,
    Update,
    Values,
    When,
    Where,
    With,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident.to_ascii_lowercase().as_str() {
            "and" => Keyword::And,
            "as" => Keyword::As,
            "asc" => Keyword::Asc,
            "between" => Keyword::Between,
            "by" => Keyword::By,
            "case" => Keyword::Case,
            "conflict" => Keyword::Conflict,
            "constraint" => Keyword::Constraint,
            "delete" => Keyword::Delete,
            "desc" => Keyword::Desc,
            "distinct" => Keyword::Distinct,
            "do" => Keyword::Do,
            "else" => Keyword::Else,
            "end" => Keyword::End,
            "escape" => Keyword::Escape,
            "exists" => Keyword::Exists,
            "false" => Keyword::False,
            "fetch" => Keyword::Fetch,
            "from" => Keyword::From,
            "group" => Keyword::Group,
            "having" => Keyword::Having,
            "in" => Keyword::In,
            "inner" => Keyword::Inner,
            "insert" => Keyword::Insert,
            "into" => Keyword::Into,
            "is" => Keyword::Is,
            "join" => Keyword::Join,
            "left" => Keyword::Left,
            "like" => Keyword::Like,
            "not" => Keyword::Not,
            "nothing" => Keyword::Nothing,
            "null" => Keyword::Null,
            "on" => Keyword::On,
            "or" => Keyword::Or,
            "order" => Keyword::Order,
            "outer" => Keyword::Outer,
            "right" => Keyword::Right,
            "select" => Keyword::Select,
            "set" => Keyword::Set,
            "then" => Keyword::Then,
            "true" => Keyword::True,
            "update" => Keyword::Update,
            "values" => Keyword::Values,
            "when" => Keyword::When,
            "where" => Keyword::Where,
            "with" => Keyword::With,
            _ => return None,
        })
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{self:?}").to_ascii_uppercase())
    }
}

/// Token kinds. `text` on [`Token`] carries the lexeme (for parameters, the
/// bare name or ordinal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Keyword(Keyword),
    Integer,
    Float,
    String,
    /// `:name`
    NamedParam,
    /// bare `?`
    PositionalParam,
    /// `?1`, `?2`, …
    JpaParam,
    Period,
    Comma,
    OpenParen,
    CloseParen,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Concat,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident => write!(f, "identifier"),
            TokenKind::Keyword(k) => write!(f, "{k}"),
            TokenKind::Integer => write!(f, "integer literal"),
            TokenKind::Float => write!(f, "numeric literal"),
            TokenKind::String => write!(f, "string literal"),
            TokenKind::NamedParam => write!(f, "named parameter"),
            TokenKind::PositionalParam => write!(f, "?"),
            TokenKind::JpaParam => write!(f, "ordinal parameter"),
            TokenKind::Period => write!(f, "."),
            TokenKind::Comma => write!(f, ","),
            TokenKind::OpenParen => write!(f, "("),
            TokenKind::CloseParen => write!(f, ")"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Asterisk => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Equal => write!(f, "="),
            TokenKind::NotEqual => write!(f, "<>"),
            TokenKind::LessThan => write!(f, "<"),
            TokenKind::LessOrEqual => write!(f, "<="),
            TokenKind::GreaterThan => write!(f, ">"),
            TokenKind::GreaterOrEqual => write!(f, ">="),
            TokenKind::Concat => write!(f, "||"),
        }
    }
}

/// One lexed token. Immutable after lexing, except that constant folding may
/// rewrite kind and text when a dotted path collapses into a literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
    /// Identifier-shaped token: a keyword here may still be used as an
    /// identifier (keywords are soft), and the parser decides from context.
    pub possible_identifier: bool,
}

/// The lexer. Tokenizes eagerly so the parser can look around freely during
/// error recovery; lexical errors are reported to the shared collector and
/// lexing continues where feasible so one pass surfaces multiple problems.
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: u32,
    column: u32,
    /// Kind of the previously produced token, for lookback disambiguation.
    prev: Option<TokenKind>,
    replacements: &'a HashMap<String, String>,
}

impl<'a> Lexer<'a> {
    /// Tokenize the whole input. `replacements` is the caller's macro-style
    /// token substitution map, applied to matching identifier tokens.
    pub fn tokenize(
        text: &'a str,
        replacements: &'a HashMap<String, String>,
        diag: &mut DiagnosticsCollector,
    ) -> Vec<Token> {
        let mut lexer = Lexer {
            chars: text.chars().peekable(),
            line: 1,
            column: 1,
            prev: None,
            replacements,
        };
        let mut tokens = Vec::new();
        while let Some(token) = lexer.scan(diag) {
            lexer.prev = Some(token.kind);
            tokens.push(token);
        }
        tokens
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn bump_if(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            return true;
        }
        false
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Scan one token, or `None` at end of input.
    fn scan(&mut self, diag: &mut DiagnosticsCollector) -> Option<Token> {
        loop {
            self.skip_whitespace();
            let (line, column) = (self.line, self.column);
            let c = *self.chars.peek()?;
            let token = match c {
                c if c.is_ascii_alphabetic() || c == '_' => self.scan_word(line, column),
                c if c.is_ascii_digit() => self.scan_number(line, column),
                '\'' => match self.scan_string(line, column, diag) {
                    Some(token) => token,
                    // Unterminated literal: the rest of the input was
                    // consumed, so there is nothing left to scan.
                    None => return None,
                },
                ':' => {
                    self.bump();
                    match self.scan_param_name(line, column) {
                        Some(token) => token,
                        None => {
                            diag.error_at("expected parameter name after ':'", line, column);
                            continue;
                        }
                    }
                }
                '?' => {
                    self.bump();
                    self.scan_ordinal_param(line, column)
                }
                _ => match self.scan_symbol(line, column, diag) {
                    Some(token) => token,
                    None => continue,
                },
            };
            return Some(token);
        }
    }

    fn scan_word(&mut self, line: u32, column: u32) -> Token {
        let mut text = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_alphanumeric() || *c == '_') {
            text.push(self.bump().unwrap());
        }
        if let Some(replacement) = self.replacements.get(&text) {
            text = replacement.clone();
        }
        // A word right after `.` is a path segment, never a keyword: `e.order`
        // must lex as an identifier.
        let keyword = if self.prev == Some(TokenKind::Period) {
            None
        } else {
            Keyword::from_ident(&text)
        };
        match keyword {
            Some(keyword) => Token {
                kind: TokenKind::Keyword(keyword),
                text,
                line,
                column,
                possible_identifier: true,
            },
            None => Token {
                kind: TokenKind::Ident,
                text,
                line,
                column,
                possible_identifier: true,
            },
        }
    }

    fn scan_number(&mut self, line: u32, column: u32) -> Token {
        let mut text = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.bump().unwrap());
        }
        let mut kind = TokenKind::Integer;
        // A `.` only continues the number when followed by a digit; `1.foo`
        // is a (nonsensical) path, not a float, and the parser will say so.
        if self.chars.peek() == Some(&'.') {
            let mut probe = self.chars.clone();
            probe.next();
            if matches!(probe.peek(), Some(c) if c.is_ascii_digit()) {
                kind = TokenKind::Float;
                text.push(self.bump().unwrap());
                while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
                    text.push(self.bump().unwrap());
                }
            }
        }
        Token {
            kind,
            text,
            line,
            column,
            possible_identifier: false,
        }
    }

    fn scan_string(
        &mut self,
        line: u32,
        column: u32,
        diag: &mut DiagnosticsCollector,
    ) -> Option<Token> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('\'') => {
                    // `''` is an escaped quote inside the literal.
                    if self.bump_if('\'') {
                        text.push('\'');
                        continue;
                    }
                    break;
                }
                Some(c) => text.push(c),
                None => {
                    diag.error_at("unterminated string literal", line, column);
                    return None;
                }
            }
        }
        Some(Token {
            kind: TokenKind::String,
            text,
            line,
            column,
            possible_identifier: false,
        })
    }

    fn scan_param_name(&mut self, line: u32, column: u32) -> Option<Token> {
        let mut name = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_alphanumeric() || *c == '_') {
            name.push(self.bump().unwrap());
        }
        if name.is_empty() {
            return None;
        }
        Some(Token {
            kind: TokenKind::NamedParam,
            text: name,
            line,
            column,
            possible_identifier: false,
        })
    }

    fn scan_ordinal_param(&mut self, line: u32, column: u32) -> Token {
        let mut ordinal = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
            ordinal.push(self.bump().unwrap());
        }
        if ordinal.is_empty() {
            Token {
                kind: TokenKind::PositionalParam,
                text: "?".to_string(),
                line,
                column,
                possible_identifier: false,
            }
        } else {
            Token {
                kind: TokenKind::JpaParam,
                text: ordinal,
                line,
                column,
                possible_identifier: false,
            }
        }
    }

    fn scan_symbol(
        &mut self,
        line: u32,
        column: u32,
        diag: &mut DiagnosticsCollector,
    ) -> Option<Token> {
        let c = self.bump()?;
        let kind = match c {
            '.' => TokenKind::Period,
            ',' => TokenKind::Comma,
            '(' => TokenKind::OpenParen,
            ')' => TokenKind::CloseParen,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Asterisk,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => TokenKind::Equal,
            '!' if self.bump_if('=') => TokenKind::NotEqual,
            '<' if self.bump_if('>') => TokenKind::NotEqual,
            '<' if self.bump_if('=') => TokenKind::LessOrEqual,
            '<' => TokenKind::LessThan,
            '>' if self.bump_if('=') => TokenKind::GreaterOrEqual,
            '>' => TokenKind::GreaterThan,
            '|' if self.bump_if('|') => TokenKind::Concat,
            other => {
                diag.error_at(format!("unexpected character '{other}'"), line, column);
                return None;
            }
        };
        Some(Token {
            kind,
            text: kind.to_string(),
            line,
            column,
            possible_identifier: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> (Vec<Token>, DiagnosticsCollector) {
        let replacements = HashMap::new();
        let mut diag = DiagnosticsCollector::new();
        let tokens = Lexer::tokenize(text, &replacements, &mut diag);
        (tokens, diag)
    }

    #[test]
    fn keywords_are_possible_identifiers() {
        let (tokens, diag) = lex("select order from Employee");
        assert!(!diag.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Keyword(Keyword::Select));
        assert!(tokens[0].possible_identifier);
        assert_eq!(tokens[1].kind, TokenKind::Keyword(Keyword::Order));
        assert!(tokens[1].possible_identifier);
    }

    #[test]
    fn word_after_period_is_identifier() {
        let (tokens, diag) = lex("e.order");
        assert!(!diag.has_errors());
        assert_eq!(tokens[1].kind, TokenKind::Period);
        assert_eq!(tokens[2].kind, TokenKind::Ident);
        assert_eq!(tokens[2].text, "order");
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let (tokens, _) = lex("from\n  Employee e");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 12));
    }

    #[test]
    fn parameter_forms() {
        let (tokens, diag) = lex(":deptId ? ?2");
        assert!(!diag.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::NamedParam);
        assert_eq!(tokens[0].text, "deptId");
        assert_eq!(tokens[1].kind, TokenKind::PositionalParam);
        assert_eq!(tokens[2].kind, TokenKind::JpaParam);
        assert_eq!(tokens[2].text, "2");
    }

    #[test]
    fn string_escapes_and_floats() {
        let (tokens, diag) = lex("'it''s' 3.25 42");
        assert!(!diag.has_errors());
        assert_eq!(tokens[0].text, "it's");
        assert_eq!(tokens[1].kind, TokenKind::Float);
        assert_eq!(tokens[2].kind, TokenKind::Integer);
    }

    #[test]
    fn unterminated_string_reports_position_and_stops() {
        let (tokens, diag) = lex("where name = 'abc");
        assert!(diag.has_errors());
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn invalid_character_is_reported_and_lexing_continues() {
        let (tokens, diag) = lex("a # b @ c");
        assert_eq!(diag.error_count(), 2);
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn token_replacements_apply_to_identifiers() {
        let mut replacements = HashMap::new();
        replacements.insert("Person".to_string(), "Employee".to_string());
        let mut diag = DiagnosticsCollector::new();
        let tokens = Lexer::tokenize("from Person", &replacements, &mut diag);
        assert_eq!(tokens[1].text, "Employee");
    }
}
