//! Filter expressions over record fields
//!
//! The grammar the search strategies generate:
//!
//! ```text
//! expr      := conj ('or' conj)*
//! conj      := atom ('and' atom)*
//! atom      := field op literal
//!            | field 'in' '[' literal (',' literal)* ']'
//!            | '(' expr ')'
//! op        := '==' | '!=' | '>' | '>=' | '<' | '<='
//! ```
//!
//! Strings are double-quoted. Remote backends receive the rendered string;
//! the in-memory backend evaluates the AST directly. Membership over
//! comma-joined fields (`pages`, `chapters`, `image_number`) matches any
//! comma-separated token of the stored value.

use std::fmt;

use serde_json::Value;

use crate::error::{Result, VellumError};
use crate::types::Record;

/// A literal value in a filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Literal {
    /// Token form used for comma-membership comparisons
    fn as_token(&self) -> String {
        match self {
            Literal::Str(s) => s.clone(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Bool(b) => b.to_string(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
        };
        write!(f, "{}", s)
    }
}

/// Boolean filter expression over record fields
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Cmp {
        field: String,
        op: CmpOp,
        value: Literal,
    },
    In {
        field: String,
        values: Vec<Literal>,
    },
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        FilterExpr::Cmp {
            field: field.into(),
            op: CmpOp::Eq,
            value: Literal::Str(value.into()),
        }
    }

    pub fn in_list(field: impl Into<String>, values: Vec<Literal>) -> Self {
        FilterExpr::In {
            field: field.into(),
            values,
        }
    }

    /// Conjunction, flattening single-element groups
    pub fn and(parts: Vec<FilterExpr>) -> Self {
        if parts.len() == 1 {
            parts.into_iter().next().unwrap()
        } else {
            FilterExpr::And(parts)
        }
    }

    /// Disjunction, flattening single-element groups
    pub fn or(parts: Vec<FilterExpr>) -> Self {
        if parts.len() == 1 {
            parts.into_iter().next().unwrap()
        } else {
            FilterExpr::Or(parts)
        }
    }

    /// Parse a rendered filter expression
    pub fn parse(input: &str) -> Result<FilterExpr> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(VellumError::Filter(format!(
                "unexpected trailing input at token {}",
                parser.pos
            )));
        }
        Ok(expr)
    }

    /// Evaluate the expression against a prepared record
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            FilterExpr::And(parts) => parts.iter().all(|p| p.matches(record)),
            FilterExpr::Or(parts) => parts.iter().any(|p| p.matches(record)),
            FilterExpr::Cmp { field, op, value } => match record.get(field) {
                Some(stored) => compare(stored, *op, value),
                None => false,
            },
            FilterExpr::In { field, values } => match record.get(field) {
                Some(stored) => {
                    let tokens = stored_tokens(stored);
                    values
                        .iter()
                        .any(|v| tokens.iter().any(|t| *t == v.as_token()))
                }
                None => false,
            },
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Cmp { field, op, value } => write!(f, "{} {} {}", field, op, value),
            FilterExpr::In { field, values } => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} in [{}]", field, rendered.join(", "))
            }
            FilterExpr::And(parts) => {
                let rendered: Vec<String> = parts.iter().map(render_grouped).collect();
                write!(f, "{}", rendered.join(" and "))
            }
            FilterExpr::Or(parts) => {
                let rendered: Vec<String> = parts.iter().map(render_grouped).collect();
                write!(f, "{}", rendered.join(" or "))
            }
        }
    }
}

/// Wrap composite children in parentheses so precedence survives rendering
fn render_grouped(expr: &FilterExpr) -> String {
    match expr {
        FilterExpr::And(parts) | FilterExpr::Or(parts) if parts.len() > 1 => {
            format!("({})", expr)
        }
        _ => expr.to_string(),
    }
}

/// Comma-separated token view of a stored value
fn stored_tokens(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s.split(',').map(|t| t.trim().to_string()).collect(),
        Value::Number(n) => vec![n.to_string()],
        Value::Bool(b) => vec![b.to_string()],
        _ => vec![],
    }
}

fn compare(stored: &Value, op: CmpOp, literal: &Literal) -> bool {
    use std::cmp::Ordering;

    let ordering = match (stored, literal) {
        (Value::String(s), Literal::Str(l)) => Some(s.as_str().cmp(l.as_str())),
        (Value::Number(n), Literal::Int(i)) => {
            n.as_f64().and_then(|v| v.partial_cmp(&(*i as f64)))
        }
        (Value::Number(n), Literal::Float(x)) => n.as_f64().and_then(|v| v.partial_cmp(x)),
        (Value::String(s), Literal::Int(i)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|v| v.partial_cmp(&(*i as f64))),
        (Value::String(s), Literal::Float(x)) => {
            s.trim().parse::<f64>().ok().and_then(|v| v.partial_cmp(x))
        }
        (Value::Bool(b), Literal::Bool(l)) => Some(b.cmp(l)),
        _ => None,
    };

    match ordering {
        Some(Ordering::Equal) => matches!(op, CmpOp::Eq | CmpOp::Ge | CmpOp::Le),
        Some(Ordering::Greater) => matches!(op, CmpOp::Ne | CmpOp::Gt | CmpOp::Ge),
        Some(Ordering::Less) => matches!(op, CmpOp::Ne | CmpOp::Lt | CmpOp::Le),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Op(CmpOp),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '"' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\\') => {
                            if let Some(&escaped) = chars.get(i + 1) {
                                value.push(escaped);
                                i += 2;
                            } else {
                                return Err(VellumError::Filter(
                                    "dangling escape in string literal".to_string(),
                                ));
                            }
                        }
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(VellumError::Filter(
                                "unterminated string literal".to_string(),
                            ));
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            '=' | '!' | '>' | '<' => {
                let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let (op, width) = match two.as_str() {
                    "==" => (CmpOp::Eq, 2),
                    "!=" => (CmpOp::Ne, 2),
                    ">=" => (CmpOp::Ge, 2),
                    "<=" => (CmpOp::Le, 2),
                    _ if c == '>' => (CmpOp::Gt, 1),
                    _ if c == '<' => (CmpOp::Lt, 1),
                    _ => {
                        return Err(VellumError::Filter(format!(
                            "unexpected character '{}' at position {}",
                            c, i
                        )));
                    }
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            _ if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            _ if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                return Err(VellumError::Filter(format!(
                    "unexpected character '{}' at position {}",
                    c, i
                )));
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

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn parse_expr(&mut self) -> Result<FilterExpr> {
        let mut parts = vec![self.parse_conj()?];
        while self.peek_keyword("or") {
            self.next();
            parts.push(self.parse_conj()?);
        }
        Ok(FilterExpr::or(parts))
    }

    fn parse_conj(&mut self) -> Result<FilterExpr> {
        let mut parts = vec![self.parse_atom()?];
        while self.peek_keyword("and") {
            self.next();
            parts.push(self.parse_atom()?);
        }
        Ok(FilterExpr::and(parts))
    }

    fn parse_atom(&mut self) -> Result<FilterExpr> {
        match self.next() {
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(VellumError::Filter("expected ')'".to_string())),
                }
            }
            Some(Token::Ident(field)) => {
                if self.peek_keyword("in") {
                    self.next();
                    self.parse_in(field)
                } else if let Some(Token::Op(op)) = self.peek().cloned() {
                    self.next();
                    let value = self.parse_literal()?;
                    Ok(FilterExpr::Cmp { field, op, value })
                } else {
                    Err(VellumError::Filter(format!(
                        "expected operator after field '{}'",
                        field
                    )))
                }
            }
            other => Err(VellumError::Filter(format!(
                "expected atom, found {:?}",
                other
            ))),
        }
    }

    fn parse_in(&mut self, field: String) -> Result<FilterExpr> {
        match self.next() {
            Some(Token::LBracket) => {}
            _ => return Err(VellumError::Filter("expected '[' after 'in'".to_string())),
        }

        let mut values = vec![self.parse_literal()?];
        loop {
            match self.next() {
                Some(Token::Comma) => values.push(self.parse_literal()?),
                Some(Token::RBracket) => break,
                other => {
                    return Err(VellumError::Filter(format!(
                        "expected ',' or ']', found {:?}",
                        other
                    )));
                }
            }
        }

        Ok(FilterExpr::In { field, values })
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Literal::Str(s)),
            Some(Token::Number(n)) => {
                if n.contains('.') {
                    n.parse::<f64>()
                        .map(Literal::Float)
                        .map_err(|_| VellumError::Filter(format!("invalid number '{}'", n)))
                } else {
                    n.parse::<i64>()
                        .map(Literal::Int)
                        .map_err(|_| VellumError::Filter(format!("invalid number '{}'", n)))
                }
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("true") => {
                Ok(Literal::Bool(true))
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("false") => {
                Ok(Literal::Bool(false))
            }
            other => Err(VellumError::Filter(format!(
                "expected literal, found {:?}",
                other
            ))),
        }
    }
}
