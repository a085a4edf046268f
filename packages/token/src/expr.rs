//! Code-block expression language.
//!
//! A small, side-effect free language evaluated against JSON values:
//!
//! - literals: numbers, `'single'` or `"double"` quoted strings, `true`, `false`, `null`
//! - paths: `db.users.name`, `db.users["display name"]`, or a bare row column `name`
//! - operators: `+ - * / %`, `== != < <= > >=`, `&& || !`, `cond ? a : b`
//! - functions: `len`, `upper`, `lower`, `concat`, `iif`, `exists`
//!
//! Paths with at least two segments name a source (`namespace.name`) followed by an
//! optional column. They are reported by [`Expr::source_ids`] so the owning token can
//! subscribe to them. Evaluation never fails: type mismatches and division by zero
//! produce `null`.

use crate::error::{TokenError, TokenResult};
use crate::lexer::{lex, unescape, Lexeme};
use crate::path::ColumnPath;
use bindery_source::{display_value, is_empty_value, Row, Source};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::rc::Rc;

const FUNCTIONS: &[&str] = &["len", "upper", "lower", "concat", "iif", "exists"];

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(JsonValue),
    Path(Vec<String>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Call {
        name: String,
        arguments: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
}

impl Expr {
    /// Lowercased `namespace.name` ids of every source path in the expression
    pub fn source_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        self.collect_source_ids(&mut ids);
        ids
    }

    fn collect_source_ids(&self, ids: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Path(segments) => {
                if segments.len() >= 2 {
                    ids.insert(format!("{}.{}", segments[0], segments[1]).to_lowercase());
                }
            }
            Expr::Unary { operand, .. } => operand.collect_source_ids(ids),
            Expr::Binary { left, right, .. } => {
                left.collect_source_ids(ids);
                right.collect_source_ids(ids);
            }
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.collect_source_ids(ids);
                then_branch.collect_source_ids(ids);
                else_branch.collect_source_ids(ids);
            }
            Expr::Call { arguments, .. } => {
                for argument in arguments {
                    argument.collect_source_ids(ids);
                }
            }
        }
    }
}

/// Parse an expression; the whole input must be consumed
pub fn parse_expression(source: &str) -> TokenResult<Expr> {
    let mut parser = Parser {
        source,
        lexemes: lex(source)?,
        pos: 0,
    };
    if parser.is_at_end() {
        return Err(TokenError::invalid_expression(source, 0, "Empty expression"));
    }
    let expr = parser.parse_conditional()?;
    if !parser.is_at_end() {
        return Err(parser.error("Unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'src> {
    source: &'src str,
    lexemes: Vec<(Lexeme<'src>, Range<usize>)>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn parse_conditional(&mut self) -> TokenResult<Expr> {
        let condition = self.parse_or_expression()?;
        if !self.match_token(Lexeme::Question) {
            return Ok(condition);
        }
        let then_branch = self.parse_conditional()?;
        self.expect(Lexeme::Colon, "':'")?;
        let else_branch = self.parse_conditional()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn parse_or_expression(&mut self) -> TokenResult<Expr> {
        let mut left = self.parse_and_expression()?;
        while self.match_token(Lexeme::Or) {
            let right = self.parse_and_expression()?;
            left = binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and_expression(&mut self) -> TokenResult<Expr> {
        let mut left = self.parse_equality_expression()?;
        while self.match_token(Lexeme::And) {
            let right = self.parse_equality_expression()?;
            left = binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    fn parse_equality_expression(&mut self) -> TokenResult<Expr> {
        let mut left = self.parse_comparison_expression()?;
        while let Some(op) = self.match_equality_op() {
            let right = self.parse_comparison_expression()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_comparison_expression(&mut self) -> TokenResult<Expr> {
        let mut left = self.parse_additive_expression()?;
        while let Some(op) = self.match_comparison_op() {
            let right = self.parse_additive_expression()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> TokenResult<Expr> {
        let mut left = self.parse_multiplicative_expression()?;
        while let Some(op) = self.match_additive_op() {
            let right = self.parse_multiplicative_expression()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> TokenResult<Expr> {
        let mut left = self.parse_unary_expression()?;
        while let Some(op) = self.match_multiplicative_op() {
            let right = self.parse_unary_expression()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> TokenResult<Expr> {
        let op = if self.match_token(Lexeme::Bang) {
            UnaryOp::Not
        } else if self.match_token(Lexeme::Minus) {
            UnaryOp::Negate
        } else {
            return self.parse_primary_expression();
        };
        let operand = self.parse_unary_expression()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_primary_expression(&mut self) -> TokenResult<Expr> {
        let Some((lexeme, _)) = self.peek().cloned() else {
            return Err(self.error("Unexpected end of expression"));
        };
        match lexeme {
            Lexeme::True => {
                self.advance();
                Ok(Expr::Literal(JsonValue::Bool(true)))
            }
            Lexeme::False => {
                self.advance();
                Ok(Expr::Literal(JsonValue::Bool(false)))
            }
            Lexeme::Null => {
                self.advance();
                Ok(Expr::Literal(JsonValue::Null))
            }
            Lexeme::Number(text) => {
                self.advance();
                let value: f64 = text
                    .parse()
                    .map_err(|_| self.error(format!("Invalid number '{}'", text)))?;
                Ok(Expr::Literal(number(value)))
            }
            Lexeme::String(body) | Lexeme::SingleQuoteString(body) => {
                self.advance();
                Ok(Expr::Literal(JsonValue::String(unescape(body))))
            }
            Lexeme::LParen => {
                self.advance();
                let inner = self.parse_conditional()?;
                self.expect(Lexeme::RParen, "')'")?;
                Ok(inner)
            }
            Lexeme::Ident(name) => {
                self.advance();
                if self.check(&Lexeme::LParen) {
                    self.parse_function_call(name)
                } else {
                    self.parse_path(name)
                }
            }
            _ => Err(self.error("Expected a value")),
        }
    }

    fn parse_function_call(&mut self, name: &str) -> TokenResult<Expr> {
        let function = name.to_lowercase();
        if !FUNCTIONS.contains(&function.as_str()) {
            return Err(self.error(format!("Unknown function '{}'", name)));
        }
        self.expect(Lexeme::LParen, "'('")?;
        let mut arguments = Vec::new();
        if !self.match_token(Lexeme::RParen) {
            loop {
                arguments.push(self.parse_conditional()?);
                if self.match_token(Lexeme::Comma) {
                    continue;
                }
                self.expect(Lexeme::RParen, "')'")?;
                break;
            }
        }
        Ok(Expr::Call {
            name: function,
            arguments,
        })
    }

    fn parse_path(&mut self, first: &str) -> TokenResult<Expr> {
        let mut segments = vec![first.to_string()];
        loop {
            if self.match_token(Lexeme::Dot) {
                match self.peek().cloned() {
                    Some((Lexeme::Ident(name), _)) => {
                        self.advance();
                        segments.push(name.to_string());
                    }
                    _ => return Err(self.error("Expected identifier after '.'")),
                }
            } else if self.match_token(Lexeme::LBracket) {
                match self.peek().cloned() {
                    Some((Lexeme::String(body) | Lexeme::SingleQuoteString(body), _)) => {
                        self.advance();
                        segments.push(unescape(body));
                    }
                    _ => return Err(self.error("Expected quoted key inside '[...]'")),
                }
                self.expect(Lexeme::RBracket, "']'")?;
            } else {
                break;
            }
        }
        Ok(Expr::Path(segments))
    }

    fn match_equality_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Lexeme::EqEq) {
            Some(BinaryOp::Equals)
        } else if self.match_token(Lexeme::NotEq) {
            Some(BinaryOp::NotEquals)
        } else {
            None
        }
    }

    fn match_comparison_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Lexeme::Lte) {
            Some(BinaryOp::LessThanOrEqual)
        } else if self.match_token(Lexeme::Gte) {
            Some(BinaryOp::GreaterThanOrEqual)
        } else if self.match_token(Lexeme::Lt) {
            Some(BinaryOp::LessThan)
        } else if self.match_token(Lexeme::Gt) {
            Some(BinaryOp::GreaterThan)
        } else {
            None
        }
    }

    fn match_additive_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Lexeme::Plus) {
            Some(BinaryOp::Add)
        } else if self.match_token(Lexeme::Minus) {
            Some(BinaryOp::Subtract)
        } else {
            None
        }
    }

    fn match_multiplicative_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Lexeme::Star) {
            Some(BinaryOp::Multiply)
        } else if self.match_token(Lexeme::Slash) {
            Some(BinaryOp::Divide)
        } else if self.match_token(Lexeme::Percent) {
            Some(BinaryOp::Modulo)
        } else {
            None
        }
    }

    // Helper methods

    fn peek(&self) -> Option<&(Lexeme<'src>, Range<usize>)> {
        self.lexemes.get(self.pos)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.lexemes.len()
    }

    fn check(&self, lexeme: &Lexeme) -> bool {
        self.peek()
            .is_some_and(|(l, _)| std::mem::discriminant(l) == std::mem::discriminant(lexeme))
    }

    fn match_token(&mut self, lexeme: Lexeme) -> bool {
        if self.check(&lexeme) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, lexeme: Lexeme, expected: &str) -> TokenResult<()> {
        if self.match_token(lexeme) {
            Ok(())
        } else {
            Err(self.error(format!("Expected {}", expected)))
        }
    }

    fn error(&self, message: impl Into<String>) -> TokenError {
        let pos = self
            .peek()
            .map_or(self.source.len(), |(_, span)| span.start);
        TokenError::invalid_expression(self.source, pos, message)
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Lookup of path values during evaluation
pub trait Resolver {
    fn resolve(&self, path: &[String]) -> Option<JsonValue>;
}

/// Resolves `namespace.name[.column...]` paths against captured source snapshots
#[derive(Default, Clone)]
pub struct SourceScope {
    sources: HashMap<String, Rc<Source>>,
}

impl SourceScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: Rc<Source>) {
        self.sources.insert(source.id().to_string(), source);
    }

    pub fn get(&self, id: &str) -> Option<&Rc<Source>> {
        self.sources.get(&id.to_lowercase())
    }
}

impl Resolver for SourceScope {
    fn resolve(&self, path: &[String]) -> Option<JsonValue> {
        if path.len() < 2 {
            return None;
        }
        let source = self.get(&format!("{}.{}", path[0], path[1]))?;
        if path.len() == 2 {
            return Some(JsonValue::Bool(true));
        }
        Some(ColumnPath::from_segments(path[2..].to_vec()).extract_from(source))
    }
}

/// Resolves bare identifiers against a row, falling back to sources
pub struct RowScope<'a> {
    pub row: &'a Row,
    pub sources: Option<&'a SourceScope>,
}

impl Resolver for RowScope<'_> {
    fn resolve(&self, path: &[String]) -> Option<JsonValue> {
        let (first, rest) = path.split_first()?;
        let from_row = self.row.get(first).and_then(|value| {
            rest.iter()
                .try_fold(value, |current, segment| current.get(segment.as_str()))
                .cloned()
        });
        from_row.or_else(|| self.sources.and_then(|sources| sources.resolve(path)))
    }
}

/// Evaluate an expression; unresolved paths read as `null`
pub fn evaluate(expr: &Expr, resolver: &dyn Resolver) -> JsonValue {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Path(segments) => resolver.resolve(segments).unwrap_or(JsonValue::Null),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, resolver);
            match op {
                UnaryOp::Not => JsonValue::Bool(!is_truthy(&value)),
                UnaryOp::Negate => to_number(&value).map_or(JsonValue::Null, |n| number(-n)),
            }
        }
        Expr::Binary { left, op, right } => {
            let left = evaluate(left, resolver);
            match op {
                BinaryOp::And => {
                    if is_truthy(&left) {
                        evaluate(right, resolver)
                    } else {
                        left
                    }
                }
                BinaryOp::Or => {
                    if is_truthy(&left) {
                        left
                    } else {
                        evaluate(right, resolver)
                    }
                }
                _ => evaluate_binary(*op, &left, &evaluate(right, resolver)),
            }
        }
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            if is_truthy(&evaluate(condition, resolver)) {
                evaluate(then_branch, resolver)
            } else {
                evaluate(else_branch, resolver)
            }
        }
        Expr::Call { name, arguments } => call_function(name, arguments, resolver),
    }
}

fn evaluate_binary(op: BinaryOp, left: &JsonValue, right: &JsonValue) -> JsonValue {
    match op {
        BinaryOp::Add => {
            if left.is_string() || right.is_string() {
                JsonValue::String(format!("{}{}", display_value(left), display_value(right)))
            } else {
                arithmetic(left, right, |a, b| Some(a + b))
            }
        }
        BinaryOp::Subtract => arithmetic(left, right, |a, b| Some(a - b)),
        BinaryOp::Multiply => arithmetic(left, right, |a, b| Some(a * b)),
        BinaryOp::Divide => arithmetic(left, right, |a, b| (b != 0.0).then(|| a / b)),
        BinaryOp::Modulo => arithmetic(left, right, |a, b| (b != 0.0).then(|| a % b)),
        BinaryOp::Equals => JsonValue::Bool(loose_equals(left, right)),
        BinaryOp::NotEquals => JsonValue::Bool(!loose_equals(left, right)),
        BinaryOp::LessThan => compare(left, right, |o| o.is_lt()),
        BinaryOp::LessThanOrEqual => compare(left, right, |o| o.is_le()),
        BinaryOp::GreaterThan => compare(left, right, |o| o.is_gt()),
        BinaryOp::GreaterThanOrEqual => compare(left, right, |o| o.is_ge()),
        BinaryOp::And | BinaryOp::Or => JsonValue::Null,
    }
}

fn arithmetic(left: &JsonValue, right: &JsonValue, f: impl Fn(f64, f64) -> Option<f64>) -> JsonValue {
    match (to_number(left), to_number(right)) {
        (Some(a), Some(b)) => f(a, b).map_or(JsonValue::Null, number),
        _ => JsonValue::Null,
    }
}

fn loose_equals(left: &JsonValue, right: &JsonValue) -> bool {
    match (left, right) {
        (JsonValue::Null, JsonValue::Null) => true,
        (JsonValue::Null, _) | (_, JsonValue::Null) => false,
        (JsonValue::Bool(a), JsonValue::Bool(b)) => a == b,
        _ => match (to_number(left), to_number(right)) {
            (Some(a), Some(b)) if !left.is_string() || !right.is_string() => a == b,
            _ => display_value(left) == display_value(right),
        },
    }
}

fn compare(
    left: &JsonValue,
    right: &JsonValue,
    test: impl Fn(std::cmp::Ordering) -> bool,
) -> JsonValue {
    let ordering = match (to_number(left), to_number(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(display_value(left).cmp(&display_value(right))),
    };
    JsonValue::Bool(ordering.is_some_and(test))
}

fn call_function(name: &str, arguments: &[Expr], resolver: &dyn Resolver) -> JsonValue {
    let argument = |index: usize| {
        arguments
            .get(index)
            .map_or(JsonValue::Null, |expr| evaluate(expr, resolver))
    };
    match name {
        "len" => match argument(0) {
            JsonValue::Null => number(0.0),
            JsonValue::Array(items) => number(items.len() as f64),
            JsonValue::Object(map) => number(map.len() as f64),
            other => number(display_value(&other).chars().count() as f64),
        },
        "upper" => JsonValue::String(display_value(&argument(0)).to_uppercase()),
        "lower" => JsonValue::String(display_value(&argument(0)).to_lowercase()),
        "concat" => JsonValue::String(
            (0..arguments.len())
                .map(|index| display_value(&argument(index)))
                .collect(),
        ),
        "iif" => {
            if is_truthy(&argument(0)) {
                argument(1)
            } else {
                argument(2)
            }
        }
        "exists" => JsonValue::Bool(!is_empty_value(&argument(0))),
        _ => JsonValue::Null,
    }
}

/// JSON number, integral when the value has no fractional part
pub fn number(value: f64) -> JsonValue {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        JsonValue::from(value as i64)
    } else {
        serde_json::Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
    }
}

pub fn to_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(_) => true,
    }
}
