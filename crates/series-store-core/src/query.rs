//! Row filter expressions.
//!
//! A [`QueryBuilder`] is a boolean expression over a row's field values,
//! built either programmatically:
//!
//! ```
//! use series_store_core::query::QueryBuilder;
//!
//! let q = QueryBuilder::field("bid").gt(1.0).and(QueryBuilder::field("ask").le(2.5));
//! assert_eq!(q.to_string(), "bid > 1 and ask <= 2.5");
//! ```
//!
//! or parsed from text with the grammar
//!
//! ```text
//! expr    := or
//! or      := and ( "or" and )*
//! and     := unary ( "and" unary )*
//! unary   := "not" unary | "(" expr ")" | compare
//! compare := FIELD OP NUMBER
//! OP      := "==" | "=" | "!=" | "<" | "<=" | ">" | ">="
//! ```
//!
//! Keywords are case-insensitive. Field names that are not plain identifiers
//! (or collide with a keyword) are written in double quotes. A comparison on
//! a field the row lacks is false.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::rows::Row;

/// Comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn eval(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Compare {
        field: String,
        op: CompareOp,
        value: f64,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, row: &Row) -> bool {
        match self {
            Expr::Compare { field, op, value } => {
                row.get(field).is_some_and(|v| op.eval(v, *value))
            }
            Expr::Not(inner) => !inner.eval(row),
            Expr::And(a, b) => a.eval(row) && b.eval(row),
            Expr::Or(a, b) => a.eval(row) || b.eval(row),
        }
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Compare { field, .. } => {
                out.insert(field);
            }
            Expr::Not(inner) => inner.collect_fields(out),
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Or(..) => 1,
            Expr::And(..) => 2,
            Expr::Not(_) => 3,
            Expr::Compare { .. } => 4,
        }
    }

    fn fmt_in(&self, f: &mut fmt::Formatter<'_>, min_prec: u8) -> fmt::Result {
        let wrap = self.precedence() < min_prec;
        if wrap {
            f.write_str("(")?;
        }
        match self {
            Expr::Compare { field, op, value } => {
                if is_plain_ident(field) {
                    f.write_str(field)?;
                } else {
                    write!(f, "\"{}\"", field.replace('\\', "\\\\").replace('"', "\\\""))?;
                }
                write!(f, " {} {value}", op.symbol())?;
            }
            Expr::Not(inner) => {
                f.write_str("not ")?;
                inner.fmt_in(f, 3)?;
            }
            Expr::And(a, b) => {
                a.fmt_in(f, 2)?;
                f.write_str(" and ")?;
                b.fmt_in(f, 3)?;
            }
            Expr::Or(a, b) => {
                a.fmt_in(f, 1)?;
                f.write_str(" or ")?;
                b.fmt_in(f, 2)?;
            }
        }
        if wrap {
            f.write_str(")")?;
        }
        Ok(())
    }
}

fn is_keyword(s: &str) -> bool {
    ["and", "or", "not"]
        .iter()
        .any(|k| s.eq_ignore_ascii_case(k))
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn is_plain_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_char) && !is_keyword(s)
}

/// A row filter expression.
///
/// Serialized as its textual form, so it can travel in configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueryBuilder {
    expr: Expr,
}

/// Start of a comparison, returned by [`QueryBuilder::field`].
#[derive(Clone, Debug)]
pub struct FieldRef(String);

impl FieldRef {
    fn compare(self, op: CompareOp, value: f64) -> QueryBuilder {
        QueryBuilder {
            expr: Expr::Compare {
                field: self.0,
                op,
                value,
            },
        }
    }

    /// `field == value`
    pub fn eq(self, value: f64) -> QueryBuilder {
        self.compare(CompareOp::Eq, value)
    }

    /// `field != value`
    pub fn ne(self, value: f64) -> QueryBuilder {
        self.compare(CompareOp::Ne, value)
    }

    /// `field < value`
    pub fn lt(self, value: f64) -> QueryBuilder {
        self.compare(CompareOp::Lt, value)
    }

    /// `field <= value`
    pub fn le(self, value: f64) -> QueryBuilder {
        self.compare(CompareOp::Le, value)
    }

    /// `field > value`
    pub fn gt(self, value: f64) -> QueryBuilder {
        self.compare(CompareOp::Gt, value)
    }

    /// `field >= value`
    pub fn ge(self, value: f64) -> QueryBuilder {
        self.compare(CompareOp::Ge, value)
    }
}

impl QueryBuilder {
    /// Begin a comparison on `name`.
    pub fn field(name: impl Into<String>) -> FieldRef {
        FieldRef(name.into())
    }

    /// Both expressions hold.
    pub fn and(self, other: QueryBuilder) -> QueryBuilder {
        QueryBuilder {
            expr: Expr::And(Box::new(self.expr), Box::new(other.expr)),
        }
    }

    /// Either expression holds.
    pub fn or(self, other: QueryBuilder) -> QueryBuilder {
        QueryBuilder {
            expr: Expr::Or(Box::new(self.expr), Box::new(other.expr)),
        }
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> QueryBuilder {
        QueryBuilder {
            expr: Expr::Not(Box::new(self.expr)),
        }
    }

    /// Parse the textual form.
    pub fn parse(text: &str) -> Result<QueryBuilder, QueryParseError> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some((pos, tok)) = parser.peek() {
            return UnexpectedTokenSnafu {
                pos: *pos,
                found: tok.to_string(),
                expected: "end of expression",
            }
            .fail();
        }
        Ok(QueryBuilder { expr })
    }

    /// Whether `row` satisfies the expression.
    pub fn matches(&self, row: &Row) -> bool {
        self.expr.eval(row)
    }

    /// Field names the expression references, sorted.
    pub fn fields(&self) -> Vec<String> {
        let mut out = BTreeSet::new();
        self.expr.collect_fields(&mut out);
        out.into_iter().map(str::to_string).collect()
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.expr.fmt_in(f, 0)
    }
}

impl FromStr for QueryBuilder {
    type Err = QueryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueryBuilder::parse(s)
    }
}

impl TryFrom<String> for QueryBuilder {
    type Error = QueryParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        QueryBuilder::parse(&value)
    }
}

impl From<QueryBuilder> for String {
    fn from(q: QueryBuilder) -> Self {
        q.to_string()
    }
}

/// Errors from parsing a filter expression. Positions are byte offsets.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum QueryParseError {
    /// The expression is empty or ended early.
    #[snafu(display("Unexpected end of filter expression, expected {expected}"))]
    UnexpectedEnd {
        /// What the parser was looking for.
        expected: String,
    },

    /// A character that starts no token.
    #[snafu(display("Unexpected character {ch:?} at {pos}"))]
    UnexpectedChar {
        /// Byte offset.
        pos: usize,
        /// The character.
        ch: char,
    },

    /// A token in the wrong place.
    #[snafu(display("Unexpected {found:?} at {pos}, expected {expected}"))]
    UnexpectedToken {
        /// Byte offset.
        pos: usize,
        /// The token found.
        found: String,
        /// What the parser was looking for.
        expected: String,
    },

    /// A quoted field name without its closing quote.
    #[snafu(display("Unterminated quoted field name starting at {pos}"))]
    UnterminatedQuote {
        /// Byte offset of the opening quote.
        pos: usize,
    },
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Quoted(String),
    Number(f64),
    Op(CompareOp),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => f.write_str(s),
            Token::Quoted(s) => write!(f, "\"{s}\""),
            Token::Number(n) => write!(f, "{n}"),
            Token::Op(op) => f.write_str(op.symbol()),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, QueryParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        match c {
            '(' => {
                chars.next();
                tokens.push((pos, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((pos, Token::RParen));
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let has_eq = chars.next_if(|&(_, c)| c == '=').is_some();
                let op = match (c, has_eq) {
                    ('=', _) => CompareOp::Eq,
                    ('!', true) => CompareOp::Ne,
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    ('>', false) => CompareOp::Gt,
                    ('>', true) => CompareOp::Ge,
                    _ => return UnexpectedCharSnafu { pos, ch: c }.fail(),
                };
                tokens.push((pos, Token::Op(op)));
            }
            '"' => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, escaped)) => name.push(escaped),
                            None => break,
                        },
                        other => name.push(other),
                    }
                }
                ensure!(closed, UnterminatedQuoteSnafu { pos });
                tokens.push((pos, Token::Quoted(name)));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let mut end = pos;
                let mut prev = ' ';
                while let Some(&(i, c)) = chars.peek() {
                    let sign_ok = (c == '-' || c == '+') && (i == pos || prev == 'e' || prev == 'E');
                    if c.is_ascii_alphanumeric() || c == '.' || sign_ok {
                        end = i + c.len_utf8();
                        prev = c;
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &text[pos..end];
                let value = literal.parse::<f64>().map_err(|_| {
                    UnexpectedTokenSnafu {
                        pos,
                        found: literal,
                        expected: "a number",
                    }
                    .build()
                })?;
                tokens.push((pos, Token::Number(value)));
            }
            c if is_ident_start(c) => {
                let mut end = pos;
                while let Some(&(i, c)) = chars.peek() {
                    if is_ident_char(c) {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((pos, Token::Ident(text[pos..end].to_string())));
            }
            other => return UnexpectedCharSnafu { pos, ch: other }.fail(),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self, expected: &str) -> Result<(usize, Token), QueryParseError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .context(UnexpectedEndSnafu { expected })?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some((_, Token::Ident(s))) if s.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn parse_or(&mut self) -> Result<Expr, QueryParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, QueryParseError> {
        let mut lhs = self.parse_unary()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, QueryParseError> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if let Some((_, Token::LParen)) = self.peek() {
            self.pos += 1;
            let inner = self.parse_or()?;
            match self.next("')'")? {
                (_, Token::RParen) => return Ok(inner),
                (pos, tok) => {
                    return UnexpectedTokenSnafu {
                        pos,
                        found: tok.to_string(),
                        expected: "')'",
                    }
                    .fail();
                }
            }
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, QueryParseError> {
        let field = match self.next("a field name")? {
            (_, Token::Ident(name)) if !is_keyword(&name) => name,
            (_, Token::Quoted(name)) => name,
            (pos, tok) => {
                return UnexpectedTokenSnafu {
                    pos,
                    found: tok.to_string(),
                    expected: "a field name",
                }
                .fail();
            }
        };

        let op = match self.next("a comparison operator")? {
            (_, Token::Op(op)) => op,
            (pos, tok) => {
                return UnexpectedTokenSnafu {
                    pos,
                    found: tok.to_string(),
                    expected: "a comparison operator",
                }
                .fail();
            }
        };

        let value = match self.next("a number")? {
            (_, Token::Number(n)) => n,
            // `inf` and `NaN` lex as identifiers.
            (pos, Token::Ident(s)) => s.parse::<f64>().map_err(|_| {
                UnexpectedTokenSnafu {
                    pos,
                    found: s.clone(),
                    expected: "a number",
                }
                .build()
            })?,
            (pos, tok) => {
                return UnexpectedTokenSnafu {
                    pos,
                    found: tok.to_string(),
                    expected: "a number",
                }
                .fail();
            }
        };

        Ok(Expr::Compare { field, op, value })
    }
}
