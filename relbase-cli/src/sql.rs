//! Statement parsing for the relbase command loop
//!
//! The surface is two statements plus quit:
//!
//! ```text
//! LOAD <table> FROM '<file>' [WITH INDEX]
//! SELECT { key | value | * | count(*) } FROM <table> [WHERE <cond> [AND <cond>]*]
//! QUIT | EXIT
//! ```
//!
//! where a condition compares `key` or `value` against a literal with one of
//! `=`, `<>`, `!=`, `<`, `<=`, `>`, `>=`. Keywords are case-insensitive.

use std::fmt;

use thiserror::Error;

/// A parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Load {
        table: String,
        file: String,
        with_index: bool,
    },
    Select {
        attr: Attr,
        table: String,
        conds: Vec<Cond>,
    },
    Quit,
}

/// Projection of a `SELECT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr {
    /// `SELECT key`
    Key,
    /// `SELECT value`
    Value,
    /// `SELECT *`
    All,
    /// `SELECT count(*)`
    Count,
}

/// Attribute a condition applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondAttr {
    Key,
    Value,
}

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompOp::Eq => "=",
            CompOp::Ne => "<>",
            CompOp::Lt => "<",
            CompOp::Le => "<=",
            CompOp::Gt => ">",
            CompOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// One `WHERE` condition
#[derive(Debug, Clone, PartialEq)]
pub struct Cond {
    pub attr: CondAttr,
    pub op: CompOp,
    pub value: String,
}

/// Statement syntax error
#[derive(Debug, Error, PartialEq)]
#[error("syntax error: {0}")]
pub struct ParseError(String);

impl ParseError {
    fn new(msg: impl Into<String>) -> Self {
        ParseError(msg.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    Symbol(&'static str),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("'{s}'"),
            Token::Number(s) => format!("'{s}'"),
            Token::Str(_) => "string literal".to_string(),
            Token::Symbol(s) => format!("'{s}'"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => return Err(ParseError::new("unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '(' => {
                chars.next();
                tokens.push(Token::Symbol("("));
            }
            ')' => {
                chars.next();
                tokens.push(Token::Symbol(")"));
            }
            '*' => {
                chars.next();
                tokens.push(Token::Symbol("*"));
            }
            ',' => {
                chars.next();
                tokens.push(Token::Symbol(","));
            }
            ';' => {
                chars.next();
                tokens.push(Token::Symbol(";"));
            }
            '=' => {
                chars.next();
                tokens.push(Token::Symbol("="));
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        tokens.push(Token::Symbol("<="));
                    }
                    Some('>') => {
                        chars.next();
                        tokens.push(Token::Symbol("<>"));
                    }
                    _ => tokens.push(Token::Symbol("<")),
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Symbol(">="));
                } else {
                    tokens.push(Token::Symbol(">"));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Symbol("!="));
                } else {
                    return Err(ParseError::new("expected '=' after '!'"));
                }
            }
            '-' | '+' => {
                let sign = c;
                chars.next();
                let mut s = String::new();
                if sign == '-' {
                    s.push('-');
                }
                if !matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
                    return Err(ParseError::new(format!("expected digits after '{sign}'")));
                }
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(s));
            }
            c if c.is_ascii_digit() => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(s));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut s = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                        s.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(s));
            }
            other => {
                return Err(ParseError::new(format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(kw))
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.at_keyword(kw) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", kw.to_uppercase())))
        }
    }

    fn expect_symbol(&mut self, sym: &str) -> Result<(), ParseError> {
        match self.peek() {
            Some(Token::Symbol(s)) if *s == sym => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.unexpected(&format!("'{sym}'"))),
        }
    }

    fn take_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.advance() {
            Some(Token::Ident(s)) => Ok(s),
            _ => Err(ParseError::new(format!("expected {what}"))),
        }
    }

    fn unexpected(&self, wanted: &str) -> ParseError {
        match self.peek() {
            Some(tok) => ParseError::new(format!("expected {wanted}, found {}", tok.describe())),
            None => ParseError::new(format!("expected {wanted} at end of statement")),
        }
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        // allow one trailing semicolon
        if matches!(self.peek(), Some(Token::Symbol(";"))) {
            self.pos += 1;
        }
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(ParseError::new(format!(
                "unexpected {} after statement",
                tok.describe()
            ))),
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        if self.at_keyword("quit") || self.at_keyword("exit") {
            self.pos += 1;
            self.finish()?;
            return Ok(Statement::Quit);
        }
        if self.at_keyword("load") {
            self.pos += 1;
            return self.parse_load();
        }
        if self.at_keyword("select") {
            self.pos += 1;
            return self.parse_select();
        }
        Err(self.unexpected("LOAD, SELECT or QUIT"))
    }

    fn parse_load(&mut self) -> Result<Statement, ParseError> {
        let table = self.take_ident("table name")?;
        self.expect_keyword("from")?;
        let file = match self.advance() {
            Some(Token::Str(s)) => s,
            _ => return Err(ParseError::new("expected quoted file name after FROM")),
        };
        let with_index = if self.at_keyword("with") {
            self.pos += 1;
            self.expect_keyword("index")?;
            true
        } else {
            false
        };
        self.finish()?;
        Ok(Statement::Load {
            table,
            file,
            with_index,
        })
    }

    fn parse_select(&mut self) -> Result<Statement, ParseError> {
        let attr = self.parse_attr()?;
        self.expect_keyword("from")?;
        let table = self.take_ident("table name")?;

        let mut conds = Vec::new();
        if self.at_keyword("where") {
            self.pos += 1;
            conds.push(self.parse_cond()?);
            while self.at_keyword("and") {
                self.pos += 1;
                conds.push(self.parse_cond()?);
            }
        }
        self.finish()?;
        Ok(Statement::Select { attr, table, conds })
    }

    fn parse_attr(&mut self) -> Result<Attr, ParseError> {
        match self.advance() {
            Some(Token::Symbol("*")) => Ok(Attr::All),
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("key") => Ok(Attr::Key),
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("value") => Ok(Attr::Value),
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("count") => {
                self.expect_symbol("(")?;
                self.expect_symbol("*")?;
                self.expect_symbol(")")?;
                Ok(Attr::Count)
            }
            _ => Err(ParseError::new(
                "expected key, value, * or count(*) after SELECT",
            )),
        }
    }

    fn parse_cond(&mut self) -> Result<Cond, ParseError> {
        let attr = match self.advance() {
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("key") => CondAttr::Key,
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("value") => CondAttr::Value,
            _ => return Err(ParseError::new("expected key or value in condition")),
        };
        let op = match self.advance() {
            Some(Token::Symbol("=")) => CompOp::Eq,
            Some(Token::Symbol("<>")) | Some(Token::Symbol("!=")) => CompOp::Ne,
            Some(Token::Symbol("<")) => CompOp::Lt,
            Some(Token::Symbol("<=")) => CompOp::Le,
            Some(Token::Symbol(">")) => CompOp::Gt,
            Some(Token::Symbol(">=")) => CompOp::Ge,
            _ => return Err(ParseError::new("expected comparison operator in condition")),
        };
        let value = match self.advance() {
            Some(Token::Number(s)) => s,
            Some(Token::Str(s)) => s,
            _ => return Err(ParseError::new("expected literal in condition")),
        };
        Ok(Cond { attr, op, value })
    }
}

/// Parse a single statement.
pub fn parse(input: &str) -> Result<Statement, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::new("empty statement"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_statement()
}
