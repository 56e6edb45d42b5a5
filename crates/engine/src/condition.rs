// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Condition-expression evaluation over the workflow context.
//!
//! Grammar (loosest binding first):
//!   expr  := and ("||" and)*
//!   and   := not ("&&" not)*
//!   not   := "!" not | cmp
//!   cmp   := term (("==" | "!=" | ">=" | "<=" | ">" | "<") term)?
//!   term  := number | string | "true" | "false" | "null"
//!          | path | "(" expr ")"
//!   path  := ident ("." ident)*
//!
//! Paths resolve against the workflow context; a leading `context.`
//! segment is optional (`context.x` ≡ `x`). Missing keys evaluate to
//! null, which is falsy.

use hive_core::Context;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CondError {
    #[error("empty condition expression")]
    Empty,

    #[error("unexpected token at byte {at}: {found}")]
    Unexpected { at: usize, found: String },

    #[error("unterminated string literal")]
    UnterminatedString,
}

/// Evaluate a condition expression to a boolean.
pub fn eval_condition(expr: &str, context: &Context) -> Result<bool, CondError> {
    let mut parser = Parser::new(expr)?;
    let value = parser.expr(context)?;
    parser.expect_end()?;
    Ok(truthy(&value))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self, CondError> {
        let tokens = lex(input)?;
        if tokens.is_empty() {
            return Err(CondError::Empty);
        }
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self) -> CondError {
        match self.tokens.get(self.pos) {
            Some((at, token)) => {
                CondError::Unexpected { at: *at, found: format!("{token:?}") }
            }
            None => CondError::Unexpected { at: usize::MAX, found: "end of input".to_string() },
        }
    }

    fn expect_end(&self) -> Result<(), CondError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expr(&mut self, context: &Context) -> Result<Value, CondError> {
        let mut left = self.and(context)?;
        while self.peek() == Some(&Token::Op("||")) {
            self.bump();
            let right = self.and(context)?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn and(&mut self, context: &Context) -> Result<Value, CondError> {
        let mut left = self.not(context)?;
        while self.peek() == Some(&Token::Op("&&")) {
            self.bump();
            let right = self.not(context)?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn not(&mut self, context: &Context) -> Result<Value, CondError> {
        if self.peek() == Some(&Token::Op("!")) {
            self.bump();
            let value = self.not(context)?;
            return Ok(Value::Bool(!truthy(&value)));
        }
        self.cmp(context)
    }

    fn cmp(&mut self, context: &Context) -> Result<Value, CondError> {
        let left = self.term(context)?;
        let op = match self.peek() {
            Some(Token::Op(op @ ("==" | "!=" | ">=" | "<=" | ">" | "<"))) => *op,
            _ => return Ok(left),
        };
        self.bump();
        let right = self.term(context)?;
        Ok(Value::Bool(compare(op, &left, &right)))
    }

    fn term(&mut self, context: &Context) -> Result<Value, CondError> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(serde_json::json!(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Bool(b)) => Ok(Value::Bool(b)),
            Some(Token::Null) => Ok(Value::Null),
            Some(Token::Ident(path)) => Ok(resolve(&path, context)),
            Some(Token::LParen) => {
                let value = self.expr(context)?;
                if self.bump() != Some(Token::RParen) {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.unexpected());
                }
                Ok(value)
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }
}

fn compare(op: &str, left: &Value, right: &Value) -> bool {
    // numeric comparison when both sides are numbers; equality falls
    // back to structural comparison
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return match op {
            "==" => l == r,
            "!=" => l != r,
            ">" => l > r,
            ">=" => l >= r,
            "<" => l < r,
            "<=" => l <= r,
            _ => false,
        };
    }
    match op {
        "==" => left == right,
        "!=" => left != right,
        ">" | ">=" | "<" | "<=" => match (left.as_str(), right.as_str()) {
            (Some(l), Some(r)) => match op {
                ">" => l > r,
                ">=" => l >= r,
                "<" => l < r,
                _ => l <= r,
            },
            _ => false,
        },
        _ => false,
    }
}

/// Resolve a dotted path against the context. `true`/`false`/`null`
/// are handled by the lexer as keywords, never here.
fn resolve(path: &str, context: &Context) -> Value {
    let mut segments = path.split('.');
    let Some(mut head) = segments.next() else {
        return Value::Null;
    };
    // optional `context.` prefix
    if head == "context" {
        match segments.next() {
            Some(next) => head = next,
            None => return Value::Object(context.clone().into_iter().collect()),
        }
    }
    let Some(mut current) = context.get(head).cloned() else {
        return Value::Null;
    };
    for segment in segments {
        match current.get(segment) {
            Some(next) => current = next.clone(),
            None => return Value::Null,
        }
    }
    current
}

fn lex(input: &str) -> Result<Vec<(usize, Token)>, CondError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\n' | b'\r' => i += 1,
            b'(' => {
                tokens.push((i, Token::LParen));
                i += 1;
            }
            b')' => {
                tokens.push((i, Token::RParen));
                i += 1;
            }
            b'&' | b'|' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b {
                    tokens.push((i, Token::Op(if b == b'&' { "&&" } else { "||" })));
                    i += 2;
                } else {
                    return Err(CondError::Unexpected {
                        at: i,
                        found: (b as char).to_string(),
                    });
                }
            }
            b'=' | b'!' | b'>' | b'<' => {
                let two = i + 1 < bytes.len() && bytes[i + 1] == b'=';
                let op = match (b, two) {
                    (b'=', true) => "==",
                    (b'!', true) => "!=",
                    (b'>', true) => ">=",
                    (b'<', true) => "<=",
                    (b'>', false) => ">",
                    (b'<', false) => "<",
                    (b'!', false) => "!",
                    (b'=', false) => {
                        return Err(CondError::Unexpected { at: i, found: "=".to_string() })
                    }
                    _ => unreachable!(),
                };
                tokens.push((i, Token::Op(op)));
                i += if two { 2 } else { 1 };
            }
            b'"' | b'\'' => {
                let quote = b;
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] != quote {
                    j += 1;
                }
                if j == bytes.len() {
                    return Err(CondError::UnterminatedString);
                }
                tokens.push((i, Token::Str(input[start..j].to_string())));
                i = j + 1;
            }
            b'0'..=b'9' | b'-' => {
                let start = i;
                i += 1;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let raw = &input[start..i];
                let n: f64 = raw
                    .parse()
                    .map_err(|_| CondError::Unexpected { at: start, found: raw.to_string() })?;
                tokens.push((start, Token::Number(n)));
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
                {
                    i += 1;
                }
                let word = &input[start..i];
                let token = match word {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push((start, token));
            }
            other => {
                return Err(CondError::Unexpected {
                    at: i,
                    found: (other as char).to_string(),
                })
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
#[path = "condition_tests.rs"]
mod tests;
