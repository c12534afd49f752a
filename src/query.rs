//! Sandboxed predicate language used by column filters and the quick search.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! expr       := and ( ("or" | "|" | "||") and )*
//! and        := not ( ("and" | "&" | "&&") not )*
//! not        := ("not" | "!" | "~") not | primary
//! primary    := "(" expr ")" | comparison
//! comparison := column op literal
//!             | column ("contains" | "icontains" | "startswith" | "endswith") string
//!             | column "is" ["not"] "null"
//! column     := identifier | `backtick quoted`
//! op         := "==" | "=" | "!=" | "<" | "<=" | ">" | ">="
//! literal    := 'string' | "string" | number | true | false | null
//! ```
//!
//! Only column reads and the listed operators exist; there is no way to call
//! functions or reach anything outside the row being evaluated.

use std::cmp::Ordering;
use std::fmt;

use crate::error::QueryError;
use crate::snapshot::Row;
use crate::value::CellValue;

/// Comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
        }
    }
}

/// Text matching operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
}

/// Parsed boolean predicate over the named columns of a row.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    True,
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Compare {
        column: String,
        op: CompareOp,
        value: CellValue,
    },
    Text {
        column: String,
        op: TextOp,
        needle: String,
        case_sensitive: bool,
    },
    IsNull {
        column: String,
        negated: bool,
    },
}

impl Predicate {
    /// Parses a query string.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(tok) = parser.tokens.get(parser.pos) {
            return Err(QueryError::UnexpectedToken {
                found: tok.kind.to_string(),
                offset: tok.offset,
                expected: "end of query",
            });
        }
        Ok(expr)
    }

    /// Substring match on the display form of a column.
    pub fn contains(column: impl Into<String>, needle: impl Into<String>, case_sensitive: bool) -> Self {
        Self::Text {
            column: column.into(),
            op: TextOp::Contains,
            needle: needle.into(),
            case_sensitive,
        }
    }

    /// Conjunction that flattens nested `And`s and drops `True`.
    pub fn and(parts: impl IntoIterator<Item = Self>) -> Self {
        let mut out = Vec::new();
        for part in parts {
            match part {
                Self::True => {}
                Self::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Self::True,
            1 => out.remove(0),
            _ => Self::And(out),
        }
    }

    /// Disjunction that flattens nested `Or`s. An empty disjunction is `True`.
    pub fn or(parts: impl IntoIterator<Item = Self>) -> Self {
        let mut out = Vec::new();
        for part in parts {
            match part {
                Self::True => return Self::True,
                Self::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Self::True,
            1 => out.remove(0),
            _ => Self::Or(out),
        }
    }

    /// Checks that every referenced column exists.
    pub fn validate<S: AsRef<str>>(&self, columns: &[S]) -> Result<(), QueryError> {
        let mut missing = None;
        self.visit_columns(&mut |name| {
            if missing.is_none() && !columns.iter().any(|col| col.as_ref() == name) {
                missing = Some(name.to_string());
            }
        });
        missing.map_or(Ok(()), |name| Err(QueryError::UnknownColumn(name)))
    }

    /// Calls `f` for every column referenced by the predicate.
    pub fn visit_columns(&self, f: &mut impl FnMut(&str)) {
        match self {
            Self::True => {}
            Self::And(parts) | Self::Or(parts) => {
                for part in parts {
                    part.visit_columns(f);
                }
            }
            Self::Not(inner) => inner.visit_columns(f),
            Self::Compare { column, .. } | Self::Text { column, .. } | Self::IsNull { column, .. } => {
                f(column);
            }
        }
    }

    /// Evaluates the predicate against a row; `columns` are the known column names.
    pub fn evaluate<R, S: AsRef<str>>(&self, row: &Row<R>, columns: &[S]) -> Result<bool, QueryError> {
        let lookup = |column: &str| {
            if columns.iter().any(|col| col.as_ref() == column) {
                Ok(row.get(column))
            } else {
                Err(QueryError::UnknownColumn(column.to_string()))
            }
        };

        match self {
            Self::True => Ok(true),
            Self::And(parts) => {
                for part in parts {
                    if !part.evaluate(row, columns)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(parts) => {
                for part in parts {
                    if part.evaluate(row, columns)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not(inner) => Ok(!inner.evaluate(row, columns)?),
            Self::Compare { column, op, value } => {
                let cell = lookup(column)?;
                Ok(compare(cell, value, *op))
            }
            Self::Text {
                column,
                op,
                needle,
                case_sensitive,
            } => {
                let cell = lookup(column)?;
                let hay = cell.as_str_lossy();
                Ok(if *case_sensitive {
                    text_match(*op, &hay, needle)
                } else {
                    text_match(*op, &hay.to_lowercase(), &needle.to_lowercase())
                })
            }
            Self::IsNull { column, negated } => {
                let cell = lookup(column)?;
                Ok(cell.is_null() != *negated)
            }
        }
    }
}

fn text_match(op: TextOp, hay: &str, needle: &str) -> bool {
    match op {
        TextOp::Contains => hay.contains(needle),
        TextOp::StartsWith => hay.starts_with(needle),
        TextOp::EndsWith => hay.ends_with(needle),
    }
}

fn compare(cell: &CellValue, literal: &CellValue, op: CompareOp) -> bool {
    let ord = match (cell.as_f64(), literal.as_f64()) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        _ => match (cell, literal) {
            (CellValue::Null, CellValue::Null) => Ordering::Equal,
            // Null only equals null; ordered comparisons against it never hold.
            (CellValue::Null, _) | (_, CellValue::Null) => {
                return op == CompareOp::Ne;
            }
            (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
            _ => cell.as_str_lossy().as_ref().cmp(literal.as_str_lossy().as_ref()),
        },
    };
    op.holds(ord)
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        if ch == '\'' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

fn column_name(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|ch| ch.is_alphabetic() || ch == '_')
        && name.chars().all(|ch| ch.is_alphanumeric() || ch == '_')
        && keyword(name).is_none();
    if plain { name.to_string() } else { format!("`{name}`") }
}

fn literal_text(value: &CellValue) -> String {
    match value {
        CellValue::Null => "null".to_string(),
        CellValue::Text(text) => quote(text),
        other => other.to_string(),
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("true"),
            Self::And(parts) | Self::Or(parts) => {
                let sep = if matches!(self, Self::And(_)) { " and " } else { " or " };
                f.write_str("(")?;
                for (idx, part) in parts.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str(")")
            }
            Self::Not(inner) => write!(f, "not {inner}"),
            Self::Compare { column, op, value } => {
                write!(f, "{} {} {}", column_name(column), op.symbol(), literal_text(value))
            }
            Self::Text {
                column,
                op,
                needle,
                case_sensitive,
            } => {
                let keyword = match (op, case_sensitive) {
                    (TextOp::Contains, true) => "contains",
                    (TextOp::Contains, false) => "icontains",
                    (TextOp::StartsWith, _) => "startswith",
                    (TextOp::EndsWith, _) => "endswith",
                };
                write!(f, "{} {keyword} {}", column_name(column), quote(needle))
            }
            Self::IsNull { column, negated } => {
                let not = if *negated { " not" } else { "" };
                write!(f, "{} is{not} null", column_name(column))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Keyword {
    And,
    Or,
    Not,
    Contains,
    IContains,
    StartsWith,
    EndsWith,
    Is,
    Null,
    True,
    False,
}

fn keyword(word: &str) -> Option<Keyword> {
    let kw = match word.to_ascii_lowercase().as_str() {
        "and" => Keyword::And,
        "or" => Keyword::Or,
        "not" => Keyword::Not,
        "contains" => Keyword::Contains,
        "icontains" => Keyword::IContains,
        "startswith" => Keyword::StartsWith,
        "endswith" => Keyword::EndsWith,
        "is" => Keyword::Is,
        "null" | "none" => Keyword::Null,
        "true" => Keyword::True,
        "false" => Keyword::False,
        _ => return None,
    };
    Some(kw)
}

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Num(CellValue),
    Kw(Keyword),
    Op(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => f.write_str(name),
            Self::Str(text) => f.write_str(&quote(text)),
            Self::Num(value) => write!(f, "{value}"),
            Self::Kw(kw) => write!(f, "{kw:?}"),
            Self::Op(op) => f.write_str(op.symbol()),
            Self::And => f.write_str("&"),
            Self::Or => f.write_str("|"),
            Self::Not => f.write_str("!"),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
        }
    }
}

#[derive(Clone, Debug)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, QueryError> {
        let mut tokens = Vec::new();
        while let Some(&(offset, ch)) = self.chars.peek() {
            if ch.is_whitespace() {
                self.chars.next();
                continue;
            }
            let kind = match ch {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '~' => self.single(TokenKind::Not),
                '&' => self.doubled('&', TokenKind::And),
                '|' => self.doubled('|', TokenKind::Or),
                '!' => {
                    self.chars.next();
                    if self.eat('=') {
                        TokenKind::Op(CompareOp::Ne)
                    } else {
                        TokenKind::Not
                    }
                }
                '=' => {
                    self.chars.next();
                    self.eat('=');
                    TokenKind::Op(CompareOp::Eq)
                }
                '<' => {
                    self.chars.next();
                    TokenKind::Op(if self.eat('=') { CompareOp::Le } else { CompareOp::Lt })
                }
                '>' => {
                    self.chars.next();
                    TokenKind::Op(if self.eat('=') { CompareOp::Ge } else { CompareOp::Gt })
                }
                '\'' | '"' => TokenKind::Str(self.string(offset, ch)?),
                '`' => TokenKind::Ident(self.backtick(offset)?),
                '-' | '.' | '0'..='9' => self.number(offset)?,
                c if c.is_alphabetic() || c == '_' => {
                    let word = self.word(offset);
                    keyword(word).map_or_else(|| TokenKind::Ident(word.to_string()), TokenKind::Kw)
                }
                other => return Err(QueryError::UnexpectedChar { ch: other, offset }),
            };
            tokens.push(Token { kind, offset });
        }
        Ok(tokens)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.chars.next();
        kind
    }

    fn doubled(&mut self, ch: char, kind: TokenKind) -> TokenKind {
        self.chars.next();
        self.eat(ch);
        kind
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek().is_some_and(|&(_, ch)| ch == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn string(&mut self, offset: usize, delim: char) -> Result<String, QueryError> {
        self.chars.next();
        let mut out = String::new();
        while let Some((_, ch)) = self.chars.next() {
            match ch {
                '\\' => match self.chars.next() {
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                c if c == delim => return Ok(out),
                c => out.push(c),
            }
        }
        Err(QueryError::UnterminatedString { offset })
    }

    fn backtick(&mut self, offset: usize) -> Result<String, QueryError> {
        self.chars.next();
        let mut out = String::new();
        for (_, ch) in self.chars.by_ref() {
            if ch == '`' {
                return Ok(out);
            }
            out.push(ch);
        }
        Err(QueryError::UnterminatedString { offset })
    }

    fn word(&mut self, start: usize) -> &'a str {
        let mut end = start;
        while let Some(&(idx, ch)) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                end = idx + ch.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        &self.input[start..end]
    }

    fn number(&mut self, start: usize) -> Result<TokenKind, QueryError> {
        let mut end = start;
        while let Some(&(idx, ch)) = self.chars.peek() {
            let sign_ok = (ch == '-' || ch == '+')
                && (idx == start || self.input[..idx].ends_with(['e', 'E']));
            if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || sign_ok {
                end = idx + 1;
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.input[start..end];
        if let Ok(int) = text.parse::<i64>() {
            return Ok(TokenKind::Num(CellValue::Int(int)));
        }
        text.parse::<f64>()
            .map(|float| TokenKind::Num(CellValue::Float(float)))
            .map_err(|_| QueryError::InvalidNumber {
                text: text.to_string(),
                offset: start,
            })
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|tok| &tok.kind)
    }

    fn next(&mut self, expected: &'static str) -> Result<Token, QueryError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(QueryError::UnexpectedEnd { expected })?;
        self.pos += 1;
        Ok(tok)
    }

    fn unexpected(tok: &Token, expected: &'static str) -> QueryError {
        QueryError::UnexpectedToken {
            found: tok.kind.to_string(),
            offset: tok.offset,
            expected,
        }
    }

    fn parse_or(&mut self) -> Result<Predicate, QueryError> {
        let mut parts = vec![self.parse_and()?];
        while matches!(self.peek(), Some(TokenKind::Or | TokenKind::Kw(Keyword::Or))) {
            self.pos += 1;
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Predicate::Or(parts) })
    }

    fn parse_and(&mut self) -> Result<Predicate, QueryError> {
        let mut parts = vec![self.parse_not()?];
        while matches!(self.peek(), Some(TokenKind::And | TokenKind::Kw(Keyword::And))) {
            self.pos += 1;
            parts.push(self.parse_not()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Predicate::And(parts) })
    }

    fn parse_not(&mut self) -> Result<Predicate, QueryError> {
        if matches!(self.peek(), Some(TokenKind::Not | TokenKind::Kw(Keyword::Not))) {
            self.pos += 1;
            return Ok(Predicate::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Predicate, QueryError> {
        let tok = self.next("column or '('")?;
        match tok.kind {
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                let close = self.next("')'")?;
                if close.kind != TokenKind::RParen {
                    return Err(Self::unexpected(&close, "')'"));
                }
                Ok(inner)
            }
            TokenKind::Kw(Keyword::True) => Ok(Predicate::True),
            TokenKind::Ident(column) => self.parse_comparison(column),
            _ => Err(Self::unexpected(&tok, "column or '('")),
        }
    }

    fn parse_comparison(&mut self, column: String) -> Result<Predicate, QueryError> {
        const EXPECTED: &str = "comparison operator";
        let tok = self.next(EXPECTED)?;
        let text_op = match tok.kind {
            TokenKind::Op(op) => {
                let value = self.parse_literal()?;
                return Ok(Predicate::Compare { column, op, value });
            }
            TokenKind::Kw(Keyword::Is) => {
                let negated = matches!(self.peek(), Some(TokenKind::Kw(Keyword::Not) | TokenKind::Not));
                if negated {
                    self.pos += 1;
                }
                let null = self.next("null")?;
                if null.kind != TokenKind::Kw(Keyword::Null) {
                    return Err(Self::unexpected(&null, "null"));
                }
                return Ok(Predicate::IsNull { column, negated });
            }
            TokenKind::Kw(Keyword::Contains) => (TextOp::Contains, true),
            TokenKind::Kw(Keyword::IContains) => (TextOp::Contains, false),
            TokenKind::Kw(Keyword::StartsWith) => (TextOp::StartsWith, true),
            TokenKind::Kw(Keyword::EndsWith) => (TextOp::EndsWith, true),
            _ => return Err(Self::unexpected(&tok, EXPECTED)),
        };
        let needle = self.next("string")?;
        let TokenKind::Str(needle_text) = needle.kind else {
            return Err(Self::unexpected(&needle, "string"));
        };
        Ok(Predicate::Text {
            column,
            op: text_op.0,
            needle: needle_text,
            case_sensitive: text_op.1,
        })
    }

    fn parse_literal(&mut self) -> Result<CellValue, QueryError> {
        let tok = self.next("literal")?;
        match tok.kind {
            TokenKind::Str(text) => Ok(CellValue::Text(text)),
            TokenKind::Num(value) => Ok(value),
            TokenKind::Kw(Keyword::True) => Ok(CellValue::Bool(true)),
            TokenKind::Kw(Keyword::False) => Ok(CellValue::Bool(false)),
            TokenKind::Kw(Keyword::Null) => Ok(CellValue::Null),
            _ => Err(Self::unexpected(&tok, "literal")),
        }
    }
}
