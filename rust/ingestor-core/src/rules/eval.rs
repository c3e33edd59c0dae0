//! A small, sandboxed expression language for rule `transform` expressions
//! (§4.3).
//!
//! Deliberately not an embedded scripting engine: the grammar below is the
//! entire surface a rule author has access to, there is no way to call out
//! to the host, and evaluation cannot loop or recurse without bound.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::standardized::ColumnValue;

/// A value flowing through rule evaluation: either a source record field or
/// an intermediate/final expression result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A signed integer.
    Int(i64),
    /// An arbitrary-precision decimal.
    Decimal(Decimal),
    /// Text.
    Text(String),
    /// A boolean.
    Bool(bool),
    /// A UTC timestamp.
    Timestamp(OffsetDateTime),
    /// The absence of a value, e.g. an unset optional source field.
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Timestamp(t) => write!(f, "{t}"),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<Value> for ColumnValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Int(i) => ColumnValue::Int(i),
            Value::Decimal(d) => ColumnValue::Decimal(d),
            Value::Text(s) => ColumnValue::Text(s),
            Value::Bool(b) => ColumnValue::Bool(b),
            Value::Timestamp(t) => ColumnValue::Timestamp(t),
            Value::Null => ColumnValue::Null,
        }
    }
}

/// An environment of named field values a transform expression may
/// reference, built from one [`crate::record::TypedRecord`].
pub type Env = HashMap<String, Value>;

/// A parsed, ready-to-evaluate rule expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr(ExprNode);

impl Expr {
    /// Parses `source` as a rule expression.
    ///
    /// # Errors
    /// Returns [`Error::Config`] on a syntax error, including any trailing
    /// unparsed input.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let node = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(Error::Config(format!(
                "trailing input in expression '{source}' starting at token {}",
                parser.pos
            )));
        }
        Ok(Expr(node))
    }

    /// Evaluates the expression against `env`.
    ///
    /// # Errors
    /// Returns [`Error::Transform`] if a referenced field is missing, or an
    /// operator is applied to mismatched types.
    pub fn eval(&self, env: &Env) -> Result<Value> {
        self.0.eval(env)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ExprNode {
    Int(i64),
    Decimal(Decimal),
    Text(String),
    Bool(bool),
    Field(String),
    Not(Box<ExprNode>),
    Neg(Box<ExprNode>),
    BinOp(BinOp, Box<ExprNode>, Box<ExprNode>),
    Call(String, Vec<ExprNode>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl ExprNode {
    fn eval(&self, env: &Env) -> Result<Value> {
        match self {
            ExprNode::Int(i) => Ok(Value::Int(*i)),
            ExprNode::Decimal(d) => Ok(Value::Decimal(*d)),
            ExprNode::Text(s) => Ok(Value::Text(s.clone())),
            ExprNode::Bool(b) => Ok(Value::Bool(*b)),
            ExprNode::Field(name) => env.get(name).cloned().ok_or_else(|| Error::Transform {
                rule_name: "expr".to_owned(),
                detail: format!("unknown field '{name}'"),
            }),
            ExprNode::Not(inner) => match inner.eval(env)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => type_error("!", &other),
            },
            ExprNode::Neg(inner) => match inner.eval(env)? {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Decimal(d) => Ok(Value::Decimal(-d)),
                other => type_error("unary -", &other),
            },
            ExprNode::BinOp(op, lhs, rhs) => eval_binop(*op, lhs.eval(env)?, rhs.eval(env)?),
            ExprNode::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|a| a.eval(env))
                    .collect::<Result<Vec<_>>>()?;
                eval_call(name, args)
            }
        }
    }
}

fn type_error(op: &str, value: &Value) -> Result<Value> {
    Err(Error::Transform {
        rule_name: "expr".to_owned(),
        detail: format!("operator '{op}' not defined for {value:?}"),
    })
}

fn eval_binop(op: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
    use BinOp::*;
    match op {
        And | Or => {
            let (Value::Bool(l), Value::Bool(r)) = (&lhs, &rhs) else {
                return type_error(if op == And { "&&" } else { "||" }, &lhs);
            };
            Ok(Value::Bool(if op == And { *l && *r } else { *l || *r }))
        }
        Eq => Ok(Value::Bool(lhs == rhs)),
        Ne => Ok(Value::Bool(lhs != rhs)),
        Lt | Le | Gt | Ge => compare(op, lhs, rhs),
        Add | Sub | Mul | Div => arithmetic(op, lhs, rhs),
    }
}

fn numeric_pair(lhs: Value, rhs: Value) -> Result<(Decimal, Decimal)> {
    fn to_dec(v: Value) -> Result<Decimal> {
        match v {
            Value::Int(i) => Ok(Decimal::from(i)),
            Value::Decimal(d) => Ok(d),
            other => Err(Error::Transform {
                rule_name: "expr".to_owned(),
                detail: format!("expected a number, found {other:?}"),
            }),
        }
    }
    Ok((to_dec(lhs)?, to_dec(rhs)?))
}

fn compare(op: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
    let (l, r) = numeric_pair(lhs, rhs)?;
    let result = match op {
        BinOp::Lt => l < r,
        BinOp::Le => l <= r,
        BinOp::Gt => l > r,
        BinOp::Ge => l >= r,
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn arithmetic(op: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
    let both_int = matches!((&lhs, &rhs), (Value::Int(_), Value::Int(_)));
    let (l, r) = numeric_pair(lhs, rhs)?;
    let result = match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => {
            if r.is_zero() {
                return Err(Error::Transform {
                    rule_name: "expr".to_owned(),
                    detail: "division by zero".to_owned(),
                });
            }
            l / r
        }
        _ => unreachable!(),
    };
    if both_int && op != BinOp::Div && result.fract().is_zero() {
        use rust_decimal::prelude::ToPrimitive;
        if let Some(i) = result.to_i64() {
            return Ok(Value::Int(i));
        }
    }
    Ok(Value::Decimal(result))
}

fn eval_call(name: &str, mut args: Vec<Value>) -> Result<Value> {
    match (name, args.len()) {
        ("abs", 1) => match args.remove(0) {
            Value::Int(i) => Ok(Value::Int(i.abs())),
            Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
            other => type_error("abs", &other),
        },
        ("upper", 1) => match args.remove(0) {
            Value::Text(s) => Ok(Value::Text(s.to_uppercase())),
            other => type_error("upper", &other),
        },
        ("coalesce", 2) => {
            let fallback = args.remove(1);
            let primary = args.remove(0);
            Ok(if primary == Value::Null { fallback } else { primary })
        }
        (name, arity) => Err(Error::Config(format!(
            "unknown function '{name}' with {arity} argument(s)"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Decimal(Decimal),
    Str(String),
    Ident(String),
    Symbol(&'static str),
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' {
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j] != '"' {
                j += 1;
            }
            if j >= chars.len() {
                return Err(Error::Config(format!("unterminated string in '{source}'")));
            }
            tokens.push(Token::Str(chars[start..j].iter().collect()));
            i = j + 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            let mut j = i;
            while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                j += 1;
            }
            let text: String = chars[start..j].iter().collect();
            if text.contains('.') {
                tokens.push(Token::Decimal(text.parse().map_err(|_| {
                    Error::Config(format!("invalid number literal '{text}'"))
                })?));
            } else {
                tokens.push(Token::Int(text.parse().map_err(|_| {
                    Error::Config(format!("invalid number literal '{text}'"))
                })?));
            }
            i = j;
            continue;
        }
        if c.is_alphabetic() || c == '_' || c == '.' {
            let start = i;
            let mut j = i;
            while j < chars.len()
                && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '.')
            {
                j += 1;
            }
            let text: String = chars[start..j].iter().collect();
            tokens.push(match text.as_str() {
                "true" => Token::Ident("true".to_owned()),
                "false" => Token::Ident("false".to_owned()),
                _ => Token::Ident(text),
            });
            i = j;
            continue;
        }
        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        let symbol: &'static str = match two.as_str() {
            "==" => {
                i += 2;
                "=="
            }
            "!=" => {
                i += 2;
                "!="
            }
            "<=" => {
                i += 2;
                "<="
            }
            ">=" => {
                i += 2;
                ">="
            }
            "&&" => {
                i += 2;
                "&&"
            }
            "||" => {
                i += 2;
                "||"
            }
            _ => {
                i += 1;
                match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    '<' => "<",
                    '>' => ">",
                    '!' => "!",
                    '(' => "(",
                    ')' => ")",
                    ',' => ",",
                    other => {
                        return Err(Error::Config(format!(
                            "unexpected character '{other}' in expression '{source}'"
                        )))
                    }
                }
            }
        };
        tokens.push(Token::Symbol(symbol));
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

    fn eat_symbol(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Symbol(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<ExprNode> {
        let mut lhs = self.parse_and()?;
        while self.eat_symbol("||") {
            let rhs = self.parse_and()?;
            lhs = ExprNode::BinOp(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<ExprNode> {
        let mut lhs = self.parse_equality()?;
        while self.eat_symbol("&&") {
            let rhs = self.parse_equality()?;
            lhs = ExprNode::BinOp(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<ExprNode> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = if self.eat_symbol("==") {
                BinOp::Eq
            } else if self.eat_symbol("!=") {
                BinOp::Ne
            } else {
                break;
            };
            let rhs = self.parse_comparison()?;
            lhs = ExprNode::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<ExprNode> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = if self.eat_symbol("<=") {
                BinOp::Le
            } else if self.eat_symbol(">=") {
                BinOp::Ge
            } else if self.eat_symbol("<") {
                BinOp::Lt
            } else if self.eat_symbol(">") {
                BinOp::Gt
            } else {
                break;
            };
            let rhs = self.parse_term()?;
            lhs = ExprNode::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<ExprNode> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = if self.eat_symbol("+") {
                BinOp::Add
            } else if self.eat_symbol("-") {
                BinOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_factor()?;
            lhs = ExprNode::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<ExprNode> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat_symbol("*") {
                BinOp::Mul
            } else if self.eat_symbol("/") {
                BinOp::Div
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            lhs = ExprNode::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<ExprNode> {
        if self.eat_symbol("!") {
            return Ok(ExprNode::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat_symbol("-") {
            return Ok(ExprNode::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<ExprNode> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Int(i)) => {
                self.pos += 1;
                Ok(ExprNode::Int(i))
            }
            Some(Token::Decimal(d)) => {
                self.pos += 1;
                Ok(ExprNode::Decimal(d))
            }
            Some(Token::Str(s)) => {
                self.pos += 1;
                Ok(ExprNode::Text(s))
            }
            Some(Token::Ident(name)) if name == "true" => {
                self.pos += 1;
                Ok(ExprNode::Bool(true))
            }
            Some(Token::Ident(name)) if name == "false" => {
                self.pos += 1;
                Ok(ExprNode::Bool(false))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                if self.eat_symbol("(") {
                    let mut args = Vec::new();
                    if !self.eat_symbol(")") {
                        loop {
                            args.push(self.parse_or()?);
                            if self.eat_symbol(")") {
                                break;
                            }
                            if !self.eat_symbol(",") {
                                return Err(Error::Config(format!(
                                    "expected ',' or ')' in call to '{name}'"
                                )));
                            }
                        }
                    }
                    Ok(ExprNode::Call(name, args))
                } else {
                    Ok(ExprNode::Field(name))
                }
            }
            Some(Token::Symbol("(")) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                if !self.eat_symbol(")") {
                    return Err(Error::Config("expected closing ')'".to_owned()));
                }
                Ok(inner)
            }
            other => Err(Error::Config(format!(
                "unexpected token {other:?} while parsing expression"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn env(pairs: &[(&str, Value)]) -> Env {
        pairs.iter().cloned().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn evaluates_arithmetic() {
        let expr = Expr::parse("price * size").unwrap();
        let env = env(&[("price", Value::Decimal(dec!(10))), ("size", Value::Int(3))]);
        assert_eq!(expr.eval(&env).unwrap(), Value::Decimal(dec!(30)));
    }

    #[test]
    fn evaluates_comparison_and_boolean_logic() {
        let expr = Expr::parse("price > 5 && size >= 1").unwrap();
        let env = env(&[("price", Value::Decimal(dec!(10))), ("size", Value::Int(1))]);
        assert_eq!(expr.eval(&env).unwrap(), Value::Bool(true));
    }

    #[test]
    fn evaluates_coalesce_on_missing_field_default() {
        let expr = Expr::parse("coalesce(bid, 0)").unwrap();
        let env = env(&[("bid", Value::Null)]);
        assert_eq!(expr.eval(&env).unwrap(), Value::Int(0));
    }

    #[test]
    fn unknown_field_is_a_transform_error() {
        let expr = Expr::parse("missing_field").unwrap();
        let err = expr.eval(&Env::new()).unwrap_err();
        assert!(matches!(err, Error::Transform { .. }));
    }

    #[test]
    fn division_by_zero_is_a_transform_error() {
        let expr = Expr::parse("1 / 0").unwrap();
        let err = expr.eval(&Env::new()).unwrap_err();
        assert!(matches!(err, Error::Transform { .. }));
    }

    #[test]
    fn trailing_garbage_is_rejected_at_parse_time() {
        assert!(Expr::parse("1 + 2 3").is_err());
    }

    #[test]
    fn string_literal_and_upper_call() {
        let expr = Expr::parse("upper(symbol)").unwrap();
        let env = env(&[("symbol", Value::Text("es.c.0".to_owned()))]);
        assert_eq!(expr.eval(&env).unwrap(), Value::Text("ES.C.0".to_owned()));
    }
}
