// crates/dataroute-core/src/runtime/expr.rs
// ============================================================================
// Module: Rule Expression Evaluator
// Description: Lexer, parser, and evaluator for routing rule expressions.
// Purpose: Turn rule condition and value expressions into results against a
//          routing context, with a parse cache keyed by source text.
// Dependencies: crate::core, crate::interfaces, dashmap, serde_json
// ============================================================================

//! ## Overview
//!
//! The expression language covers the needs of routing rules: comparisons
//! (`==`, `!=`, `>`, `>=`, `<`, `<=`), boolean composition (`&&`, `||`, `!`),
//! string/number addition (`+`), literals, parenthesized grouping, and a
//! small library of helper functions. Identifiers resolve against the
//! routing context: `tableName` and `operationType` first, then parameters,
//! headers, and attributes.
//!
//! ### Grammar (informal)
//! - **Literals**: `'text'`, `"text"`, `42`, `3.5`, `true`, `false`, `null`
//! - **Comparison**: `userType == 'VIP'`, `amount >= 100`
//! - **Boolean**: `a && b`, `a || b`, `!a`
//! - **Functions**: `isEmpty(x)`, `isNotEmpty(x)`, `contains(s, sub)`,
//!   `startsWith(s, p)`, `endsWith(s, p)`, `hashMod(v, n)`,
//!   `inRange(v, lo, hi)`, `param(name, default)`, `header(name, default)`
//!
//! Parsed expressions are cached by source text so repeated evaluation never
//! re-parses. Configured texts are marked as expressions by wrapping them in
//! `#{...}`; anything else is a literal handled by the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::core::RoutingContext;
use crate::interfaces::ConditionEvaluator;
use crate::interfaces::ExpectedKind;
use crate::interfaces::ExprError;

// ============================================================================
// SECTION: Limits and Markers
// ============================================================================

/// Maximum allowed expression source size in bytes.
const MAX_EXPR_BYTES: usize = 64 * 1024;
/// Maximum supported nesting depth for expressions.
const MAX_EXPR_NESTING: usize = 32;
/// Prefix marking a configured text as an expression.
const EXPR_OPEN: &str = "#{";
/// Suffix closing an expression marker.
const EXPR_CLOSE: &str = "}";

/// Returns the inner source when `text` is marked as an expression
/// (`#{...}`), or `None` when it is a literal.
#[must_use]
pub fn expression_source(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let inner = trimmed.strip_prefix(EXPR_OPEN)?;
    inner.strip_suffix(EXPR_CLOSE)
}

// ============================================================================
// SECTION: Deterministic Hashing
// ============================================================================

/// Hashes a string deterministically (FNV-1a, 64-bit).
///
/// The result is stable across processes and runs, unlike the standard
/// library's randomly seeded default hasher, so shard assignments computed
/// from it never move between restarts.
#[must_use]
pub fn deterministic_hash(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

// ============================================================================
// SECTION: Parse Errors
// ============================================================================

/// Errors produced while lexing or parsing an expression.
///
/// # Invariants
/// - None. Variants capture structured parse failures with byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseError {
    /// Input exceeded the configured size limit.
    InputTooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual input length in bytes.
        actual_bytes: usize,
    },
    /// Input exceeded the configured nesting depth.
    NestingTooDeep {
        /// Maximum allowed nesting depth.
        max_depth: usize,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Unexpected token encountered during parsing.
    UnexpectedToken {
        /// Human-friendly expectation summary.
        expected: &'static str,
        /// The token that was actually seen.
        found: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// String literal was not terminated.
    UnterminatedString {
        /// Byte offset where the literal begins.
        position: usize,
    },
    /// Numeric literal failed to parse.
    InvalidNumber {
        /// The raw numeric text.
        raw: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// Unexpected trailing input after a complete expression.
    TrailingInput {
        /// Byte offset where unexpected input begins.
        position: usize,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputTooLarge {
                max_bytes,
                actual_bytes,
            } => {
                write!(f, "input exceeds size limit: {actual_bytes} bytes (max {max_bytes})")
            }
            Self::NestingTooDeep {
                max_depth,
                position,
            } => {
                write!(f, "input nesting exceeds limit (max {max_depth}) at {position}")
            }
            Self::UnexpectedToken {
                expected,
                found,
                position,
            } => {
                write!(f, "unexpected token `{found}` at {position}, expected {expected}")
            }
            Self::UnterminatedString {
                position,
            } => {
                write!(f, "unterminated string literal at {position}")
            }
            Self::InvalidNumber {
                raw,
                position,
            } => {
                write!(f, "invalid number `{raw}` at {position}")
            }
            Self::TrailingInput {
                position,
            } => {
                write!(f, "unexpected trailing input at {position}")
            }
        }
    }
}

impl From<ParseError> for ExprError {
    fn from(err: ParseError) -> Self {
        Self::Evaluation(err.to_string())
    }
}

// ============================================================================
// SECTION: Abstract Syntax Tree
// ============================================================================

/// Binary operators, lowest to highest precedence tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    /// Logical OR.
    Or,
    /// Logical AND.
    And,
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Greater-than.
    Gt,
    /// Greater-than-or-equal.
    Ge,
    /// Less-than.
    Lt,
    /// Less-than-or-equal.
    Le,
    /// Addition or string concatenation.
    Add,
}

/// Parsed expression node.
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    /// Literal value.
    Literal(Value),
    /// Context identifier.
    Identifier(String),
    /// Logical negation.
    Not(Box<Expr>),
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Helper function call.
    Call {
        /// Function name.
        name: String,
        /// Argument expressions.
        args: Vec<Expr>,
    },
}

// ============================================================================
// SECTION: Lexer
// ============================================================================

/// Lexer token produced from the expression input.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Identifier token.
    Ident(String),
    /// Numeric literal token (raw text).
    Number(String),
    /// String literal token (unquoted content).
    Str(String),
    /// `==` operator.
    Eq,
    /// `!=` operator.
    Ne,
    /// `>` operator.
    Gt,
    /// `>=` operator.
    Ge,
    /// `<` operator.
    Lt,
    /// `<=` operator.
    Le,
    /// `&&` operator.
    And,
    /// `||` operator.
    Or,
    /// `!` operator.
    Not,
    /// `+` operator.
    Plus,
    /// Left parenthesis.
    LParen,
    /// Right parenthesis.
    RParen,
    /// Comma separator.
    Comma,
    /// End-of-input marker.
    Eof,
}

/// Token paired with its byte offset.
#[derive(Debug, Clone)]
struct SpannedToken {
    /// Token value.
    token: Token,
    /// Byte offset into the input.
    position: usize,
}

/// Lexer for routing expressions.
struct Lexer<'a> {
    /// Source input being tokenized.
    input: &'a str,
    /// Current byte offset into the input.
    offset: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
        }
    }

    /// Lexes the input into a sequence of tokens.
    fn lex(&mut self) -> Result<Vec<SpannedToken>, ParseError> {
        let mut tokens = Vec::new();
        let bytes = self.input.as_bytes();

        while self.offset < bytes.len() {
            let ch = bytes[self.offset];
            match ch {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.offset += 1;
                }
                b'(' => {
                    tokens.push(self.simple(Token::LParen));
                    self.offset += 1;
                }
                b')' => {
                    tokens.push(self.simple(Token::RParen));
                    self.offset += 1;
                }
                b',' => {
                    tokens.push(self.simple(Token::Comma));
                    self.offset += 1;
                }
                b'+' => {
                    tokens.push(self.simple(Token::Plus));
                    self.offset += 1;
                }
                b'=' => {
                    if self.peek_char(bytes) == Some(b'=') {
                        tokens.push(self.simple(Token::Eq));
                        self.offset += 2;
                    } else {
                        return Err(self.unexpected("==", "="));
                    }
                }
                b'!' => {
                    if self.peek_char(bytes) == Some(b'=') {
                        tokens.push(self.simple(Token::Ne));
                        self.offset += 2;
                    } else {
                        tokens.push(self.simple(Token::Not));
                        self.offset += 1;
                    }
                }
                b'>' => {
                    if self.peek_char(bytes) == Some(b'=') {
                        tokens.push(self.simple(Token::Ge));
                        self.offset += 2;
                    } else {
                        tokens.push(self.simple(Token::Gt));
                        self.offset += 1;
                    }
                }
                b'<' => {
                    if self.peek_char(bytes) == Some(b'=') {
                        tokens.push(self.simple(Token::Le));
                        self.offset += 2;
                    } else {
                        tokens.push(self.simple(Token::Lt));
                        self.offset += 1;
                    }
                }
                b'&' => {
                    if self.peek_char(bytes) == Some(b'&') {
                        tokens.push(self.simple(Token::And));
                        self.offset += 2;
                    } else {
                        return Err(self.unexpected("&&", "&"));
                    }
                }
                b'|' => {
                    if self.peek_char(bytes) == Some(b'|') {
                        tokens.push(self.simple(Token::Or));
                        self.offset += 2;
                    } else {
                        return Err(self.unexpected("||", "|"));
                    }
                }
                b'\'' | b'"' => {
                    tokens.push(self.lex_string(bytes, ch)?);
                }
                b'0' ..= b'9' => {
                    let start = self.offset;
                    self.consume_while(bytes, |b| b.is_ascii_digit() || b == b'.');
                    tokens.push(SpannedToken {
                        token: Token::Number(self.input[start .. self.offset].to_string()),
                        position: start,
                    });
                }
                b'a' ..= b'z' | b'A' ..= b'Z' | b'_' => {
                    let start = self.offset;
                    self.consume_while(bytes, |b| b.is_ascii_alphanumeric() || b == b'_');
                    tokens.push(SpannedToken {
                        token: Token::Ident(self.input[start .. self.offset].to_string()),
                        position: start,
                    });
                }
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "identifier, literal, or operator",
                        found: char::from(ch).to_string(),
                        position: self.offset,
                    });
                }
            }
        }

        tokens.push(SpannedToken {
            token: Token::Eof,
            position: self.offset,
        });
        Ok(tokens)
    }

    /// Lexes a quoted string literal.
    fn lex_string(&mut self, bytes: &[u8], quote: u8) -> Result<SpannedToken, ParseError> {
        let start = self.offset;
        self.offset += 1;
        let content_start = self.offset;
        while let Some(&b) = bytes.get(self.offset) {
            if b == quote {
                let token = SpannedToken {
                    token: Token::Str(self.input[content_start .. self.offset].to_string()),
                    position: start,
                };
                self.offset += 1;
                return Ok(token);
            }
            self.offset += 1;
        }
        Err(ParseError::UnterminatedString {
            position: start,
        })
    }

    /// Builds a token at the current offset.
    const fn simple(&self, token: Token) -> SpannedToken {
        SpannedToken {
            token,
            position: self.offset,
        }
    }

    /// Builds an unexpected-token error at the current offset.
    fn unexpected(&self, expected: &'static str, found: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected,
            found: found.to_string(),
            position: self.offset,
        }
    }

    /// Returns the next byte without advancing.
    fn peek_char(&self, bytes: &[u8]) -> Option<u8> {
        bytes.get(self.offset + 1).copied()
    }

    /// Advances while the condition matches the current byte.
    fn consume_while<F>(&mut self, bytes: &[u8], condition: F)
    where
        F: Fn(u8) -> bool,
    {
        while let Some(&b) = bytes.get(self.offset) {
            if condition(b) {
                self.offset += 1;
            } else {
                break;
            }
        }
    }
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Parses an expression source into an AST.
fn parse(input: &str) -> Result<Expr, ParseError> {
    if input.len() > MAX_EXPR_BYTES {
        return Err(ParseError::InputTooLarge {
            max_bytes: MAX_EXPR_BYTES,
            actual_bytes: input.len(),
        });
    }
    let mut lexer = Lexer::new(input);
    let tokens = lexer.lex()?;

    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expression()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Recursive-descent parser for routing expressions.
struct Parser {
    /// Token stream with source positions.
    tokens: Vec<SpannedToken>,
    /// Current token index.
    index: usize,
    /// Current nesting depth for bracketed or function expressions.
    nesting: usize,
}

impl Parser {
    /// Creates a parser over the token stream.
    const fn new(tokens: Vec<SpannedToken>) -> Self {
        Self {
            tokens,
            index: 0,
            nesting: 0,
        }
    }

    /// Parses a full expression.
    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    /// Parses OR expressions.
    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.matches(&Token::Or) {
            let right = self.parse_and()?;
            left = binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    /// Parses AND expressions.
    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;
        while self.matches(&Token::And) {
            let right = self.parse_comparison()?;
            left = binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    /// Parses comparison expressions.
    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        let op = match self.current().token {
            Token::Eq => BinOp::Eq,
            Token::Ne => BinOp::Ne,
            Token::Gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(binary(op, left, right))
    }

    /// Parses additive expressions.
    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while self.matches(&Token::Plus) {
            let right = self.parse_unary()?;
            left = binary(BinOp::Add, left, right);
        }
        Ok(left)
    }

    /// Parses unary expressions, including NOT.
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.matches(&Token::Not) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_primary()
    }

    /// Parses a primary expression.
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let SpannedToken {
            token,
            position,
        } = self.current().clone();
        match token {
            Token::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "true" => Ok(Expr::Literal(Value::Bool(true))),
                    "false" => Ok(Expr::Literal(Value::Bool(false))),
                    "null" => Ok(Expr::Literal(Value::Null)),
                    _ => {
                        if self.matches(&Token::LParen) {
                            self.parse_call(name, position)
                        } else {
                            Ok(Expr::Identifier(name))
                        }
                    }
                }
            }
            Token::Str(content) => {
                self.advance();
                Ok(Expr::Literal(Value::String(content)))
            }
            Token::Number(raw) => {
                self.advance();
                parse_number(&raw, position)
            }
            Token::LParen => {
                self.advance();
                self.with_nesting(position, |parser| {
                    let expr = parser.parse_expression()?;
                    parser.expect(&Token::RParen, "`)`")?;
                    Ok(expr)
                })
            }
            _ => Err(ParseError::UnexpectedToken {
                expected: "identifier, literal, or `(`",
                found: self.describe_current(),
                position,
            }),
        }
    }

    /// Parses a function call after the opening parenthesis.
    fn parse_call(&mut self, name: String, position: usize) -> Result<Expr, ParseError> {
        self.with_nesting(position, |parser| {
            let mut args = Vec::new();
            if parser.matches(&Token::RParen) {
                return Ok(Expr::Call {
                    name,
                    args,
                });
            }
            loop {
                args.push(parser.parse_expression()?);
                if parser.matches(&Token::Comma) {
                    continue;
                }
                parser.expect(&Token::RParen, "`)` after arguments")?;
                break;
            }
            Ok(Expr::Call {
                name,
                args,
            })
        })
    }

    /// Runs a parser step while enforcing the nesting limit.
    fn with_nesting<T>(
        &mut self,
        position: usize,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let next_depth = self.nesting + 1;
        if next_depth > MAX_EXPR_NESTING {
            return Err(ParseError::NestingTooDeep {
                max_depth: MAX_EXPR_NESTING,
                position,
            });
        }
        self.nesting = next_depth;
        let result = f(self);
        self.nesting = self.nesting.saturating_sub(1);
        result
    }

    /// Consumes the expected token or returns an error.
    fn expect(&mut self, token: &Token, expected: &'static str) -> Result<(), ParseError> {
        if std::mem::discriminant(&self.current().token) == std::mem::discriminant(token) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected,
                found: self.describe_current(),
                position: self.current().position,
            })
        }
    }

    /// Ensures the parser is at end-of-input.
    fn expect_eof(&self) -> Result<(), ParseError> {
        if matches!(self.current().token, Token::Eof) {
            Ok(())
        } else {
            Err(ParseError::TrailingInput {
                position: self.current().position,
            })
        }
    }

    /// Consumes the token if it matches the expected kind.
    fn matches(&mut self, kind: &Token) -> bool {
        if std::mem::discriminant(&self.current().token) == std::mem::discriminant(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Returns the current token.
    fn current(&self) -> &SpannedToken {
        debug_assert!(self.index < self.tokens.len(), "parser index out of bounds");
        &self.tokens[self.index]
    }

    /// Advances to the next token.
    const fn advance(&mut self) {
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
    }

    /// Formats the current token for diagnostics.
    fn describe_current(&self) -> String {
        match &self.current().token {
            Token::Ident(name) => name.clone(),
            Token::Number(raw) => raw.clone(),
            Token::Str(content) => format!("'{content}'"),
            Token::Eq => "==".to_string(),
            Token::Ne => "!=".to_string(),
            Token::Gt => ">".to_string(),
            Token::Ge => ">=".to_string(),
            Token::Lt => "<".to_string(),
            Token::Le => "<=".to_string(),
            Token::And => "&&".to_string(),
            Token::Or => "||".to_string(),
            Token::Not => "!".to_string(),
            Token::Plus => "+".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Comma => ",".to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

/// Builds a binary expression node.
fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Parses a numeric literal into a JSON value.
fn parse_number(raw: &str, position: usize) -> Result<Expr, ParseError> {
    if let Ok(int) = raw.parse::<i64>() {
        return Ok(Expr::Literal(Value::from(int)));
    }
    if let Ok(float) = raw.parse::<f64>()
        && let Some(number) = serde_json::Number::from_f64(float)
    {
        return Ok(Expr::Literal(Value::Number(number)));
    }
    Err(ParseError::InvalidNumber {
        raw: raw.to_string(),
        position,
    })
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Returns a stable label for a value's type.
const fn kind_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Renders a value as a plain string (strings unquoted).
fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Coerces a value to a number when it is numeric or a numeric string.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Evaluates an AST node against a routing context.
fn evaluate(expr: &Expr, ctx: &RoutingContext) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Identifier(name) => resolve_identifier(name, ctx),
        Expr::Not(operand) => {
            let value = evaluate(operand, ctx)?;
            let Value::Bool(flag) = value else {
                return Err(ExprError::Evaluation(format!(
                    "operator `!` requires a boolean, got {}",
                    kind_label(&value)
                )));
            };
            Ok(Value::Bool(!flag))
        }
        Expr::Binary {
            op,
            left,
            right,
        } => evaluate_binary(*op, left, right, ctx),
        Expr::Call {
            name,
            args,
        } => evaluate_call(name, args, ctx),
    }
}

/// Resolves a context identifier.
fn resolve_identifier(name: &str, ctx: &RoutingContext) -> Result<Value, ExprError> {
    match name {
        "tableName" => Ok(Value::String(ctx.table_name.clone())),
        "operationType" => Ok(Value::String(ctx.operation.as_str().to_string())),
        _ => {
            if let Some(value) = ctx.parameter(name) {
                return Ok(value.clone());
            }
            if let Some(value) = ctx.header(name) {
                return Ok(Value::String(value.to_string()));
            }
            if let Some(value) = ctx.attribute(name) {
                return Ok(value.clone());
            }
            Err(ExprError::Evaluation(format!("unknown identifier `{name}`")))
        }
    }
}

/// Evaluates a binary operation.
fn evaluate_binary(
    op: BinOp,
    left: &Expr,
    right: &Expr,
    ctx: &RoutingContext,
) -> Result<Value, ExprError> {
    // && and || short-circuit; their operands must be booleans.
    if matches!(op, BinOp::And | BinOp::Or) {
        let left_value = require_bool(evaluate(left, ctx)?, "logical operator")?;
        if (op == BinOp::And && !left_value) || (op == BinOp::Or && left_value) {
            return Ok(Value::Bool(left_value));
        }
        let right_value = require_bool(evaluate(right, ctx)?, "logical operator")?;
        return Ok(Value::Bool(right_value));
    }

    let left_value = evaluate(left, ctx)?;
    let right_value = evaluate(right, ctx)?;

    match op {
        BinOp::Add => add_values(&left_value, &right_value),
        BinOp::Eq => Ok(Value::Bool(values_equal(&left_value, &right_value))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(&left_value, &right_value))),
        BinOp::Gt | BinOp::Ge | BinOp::Lt | BinOp::Le => {
            compare_order(op, &left_value, &right_value)
        }
        BinOp::And | BinOp::Or => Err(ExprError::Evaluation(
            "logical operator reached value evaluation".to_string(),
        )),
    }
}

/// Requires a boolean value for a logical operand.
fn require_bool(value: Value, context: &str) -> Result<bool, ExprError> {
    let Value::Bool(flag) = value else {
        return Err(ExprError::Evaluation(format!(
            "{context} requires a boolean, got {}",
            kind_label(&value)
        )));
    };
    Ok(flag)
}

/// Compares values for equality with numeric awareness.
fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(left_num), Some(right_num)) = (as_number(left), as_number(right)) {
        return (left_num - right_num).abs() < f64::EPSILON;
    }
    left == right
}

/// Applies an ordering comparator to two values.
fn compare_order(op: BinOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    if let (Some(left_num), Some(right_num)) = (as_number(left), as_number(right)) {
        let result = match op {
            BinOp::Gt => left_num > right_num,
            BinOp::Ge => left_num >= right_num,
            BinOp::Lt => left_num < right_num,
            BinOp::Le => left_num <= right_num,
            _ => false,
        };
        return Ok(Value::Bool(result));
    }
    if let (Value::String(left_text), Value::String(right_text)) = (left, right) {
        let ordering = left_text.cmp(right_text);
        let result = match op {
            BinOp::Gt => ordering.is_gt(),
            BinOp::Ge => ordering.is_ge(),
            BinOp::Lt => ordering.is_lt(),
            BinOp::Le => ordering.is_le(),
            _ => false,
        };
        return Ok(Value::Bool(result));
    }
    Err(ExprError::Evaluation(format!(
        "cannot order {} against {}",
        kind_label(left),
        kind_label(right)
    )))
}

/// Adds numbers or concatenates strings.
fn add_values(left: &Value, right: &Value) -> Result<Value, ExprError> {
    if let (Value::Number(left_num), Value::Number(right_num)) = (left, right) {
        if let (Some(left_int), Some(right_int)) = (left_num.as_i64(), right_num.as_i64()) {
            let sum = left_int.checked_add(right_int).ok_or_else(|| {
                ExprError::Evaluation("integer addition overflow".to_string())
            })?;
            return Ok(Value::from(sum));
        }
        if let (Some(left_f), Some(right_f)) = (left_num.as_f64(), right_num.as_f64())
            && let Some(number) = serde_json::Number::from_f64(left_f + right_f)
        {
            return Ok(Value::Number(number));
        }
        return Err(ExprError::Evaluation("numeric addition failed".to_string()));
    }
    if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
        let mut out = render(left);
        out.push_str(&render(right));
        return Ok(Value::String(out));
    }
    Err(ExprError::Evaluation(format!(
        "cannot add {} and {}",
        kind_label(left),
        kind_label(right)
    )))
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Evaluates a helper function call.
fn evaluate_call(name: &str, args: &[Expr], ctx: &RoutingContext) -> Result<Value, ExprError> {
    let values: Vec<Value> =
        args.iter().map(|arg| evaluate(arg, ctx)).collect::<Result<_, _>>()?;
    match name {
        "isEmpty" => {
            let value = arg(&values, 0, name)?;
            Ok(Value::Bool(is_empty(value)))
        }
        "isNotEmpty" => {
            let value = arg(&values, 0, name)?;
            Ok(Value::Bool(!is_empty(value)))
        }
        "contains" => {
            let haystack = text_arg(&values, 0, name)?;
            let needle = text_arg(&values, 1, name)?;
            Ok(Value::Bool(haystack.contains(&needle)))
        }
        "startsWith" => {
            let haystack = text_arg(&values, 0, name)?;
            let prefix = text_arg(&values, 1, name)?;
            Ok(Value::Bool(haystack.starts_with(&prefix)))
        }
        "endsWith" => {
            let haystack = text_arg(&values, 0, name)?;
            let suffix = text_arg(&values, 1, name)?;
            Ok(Value::Bool(haystack.ends_with(&suffix)))
        }
        "hashMod" => {
            let value = text_arg(&values, 0, name)?;
            let modulus = int_arg(&values, 1, name)?;
            if modulus <= 0 {
                return Err(ExprError::Evaluation(
                    "hashMod modulus must be positive".to_string(),
                ));
            }
            let index = deterministic_hash(&value) % modulus.unsigned_abs();
            let rendered = i64::try_from(index).map_err(|_| {
                ExprError::Evaluation("hashMod result out of range".to_string())
            })?;
            Ok(Value::from(rendered))
        }
        "inRange" => {
            let value = arg(&values, 0, name)?;
            let low = arg(&values, 1, name)?;
            let high = arg(&values, 2, name)?;
            in_range(value, low, high)
        }
        "param" => {
            let key = text_arg(&values, 0, name)?;
            let default = arg(&values, 1, name)?;
            Ok(ctx.parameter(&key).cloned().unwrap_or_else(|| default.clone()))
        }
        "header" => {
            let key = text_arg(&values, 0, name)?;
            let default = arg(&values, 1, name)?;
            Ok(ctx
                .header(&key)
                .map_or_else(|| default.clone(), |value| Value::String(value.to_string())))
        }
        _ => Err(ExprError::Evaluation(format!("unknown function `{name}`"))),
    }
}

/// Fetches a positional argument.
fn arg<'a>(values: &'a [Value], index: usize, name: &str) -> Result<&'a Value, ExprError> {
    values.get(index).ok_or_else(|| {
        ExprError::Evaluation(format!("function `{name}` missing argument {index}"))
    })
}

/// Fetches a positional argument rendered as a string.
fn text_arg(values: &[Value], index: usize, name: &str) -> Result<String, ExprError> {
    Ok(render(arg(values, index, name)?))
}

/// Fetches a positional argument as an integer.
fn int_arg(values: &[Value], index: usize, name: &str) -> Result<i64, ExprError> {
    let value = arg(values, index, name)?;
    match value {
        Value::Number(number) => number.as_i64().ok_or_else(|| {
            ExprError::Evaluation(format!("function `{name}` argument {index} is not an integer"))
        }),
        other => Err(ExprError::Evaluation(format!(
            "function `{name}` argument {index} must be an integer, got {}",
            kind_label(other)
        ))),
    }
}

/// Returns whether a value is empty under routing semantics.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(entries) => entries.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Checks inclusive range membership, numeric when all operands are numeric.
fn in_range(value: &Value, low: &Value, high: &Value) -> Result<Value, ExprError> {
    if let (Some(v), Some(lo), Some(hi)) = (as_number(value), as_number(low), as_number(high)) {
        return Ok(Value::Bool(v >= lo && v <= hi));
    }
    let v = render(value);
    let lo = render(low);
    let hi = render(high);
    Ok(Value::Bool(v.as_str() >= lo.as_str() && v.as_str() <= hi.as_str()))
}

// ============================================================================
// SECTION: Evaluator
// ============================================================================

/// Expression evaluator with a parse cache keyed by source text.
///
/// # Invariants
/// - Parsed ASTs are immutable and shared; the cache only ever grows for the
///   fixed set of configured expressions.
#[derive(Debug, Default)]
pub struct ExprEvaluator {
    /// Parsed expression cache keyed by source text.
    cache: DashMap<String, Arc<Expr>>,
}

impl ExprEvaluator {
    /// Creates an evaluator with an empty parse cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of cached parsed expressions.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Parses `source`, consulting the cache first.
    fn parse_cached(&self, source: &str) -> Result<Arc<Expr>, ExprError> {
        if source.trim().is_empty() {
            return Err(ExprError::InvalidArgument("expression must not be empty".to_string()));
        }
        if let Some(cached) = self.cache.get(source) {
            return Ok(Arc::clone(cached.value()));
        }
        let parsed = Arc::new(parse(source)?);
        self.cache.insert(source.to_string(), Arc::clone(&parsed));
        Ok(parsed)
    }
}

impl ConditionEvaluator for ExprEvaluator {
    fn evaluate_condition(&self, expr: &str, ctx: &RoutingContext) -> Result<bool, ExprError> {
        let parsed = self.parse_cached(expr)?;
        let value = evaluate(&parsed, ctx)?;
        let Value::Bool(flag) = value else {
            return Err(ExprError::TypeMismatch {
                expected: "boolean",
                actual: kind_label(&value),
            });
        };
        Ok(flag)
    }

    fn evaluate_expression(
        &self,
        expr: &str,
        ctx: &RoutingContext,
        expected: ExpectedKind,
    ) -> Result<Value, ExprError> {
        let parsed = self.parse_cached(expr)?;
        let value = evaluate(&parsed, ctx)?;
        match expected {
            ExpectedKind::Text => Ok(Value::String(render(&value))),
            ExpectedKind::Integer => match &value {
                Value::Number(number) if number.as_i64().is_some() => Ok(value),
                Value::String(text) => {
                    let parsed: i64 = text.trim().parse().map_err(|_| {
                        ExprError::Evaluation(format!("`{text}` is not an integer"))
                    })?;
                    Ok(Value::from(parsed))
                }
                other => Err(ExprError::Evaluation(format!(
                    "expected integer result, got {}",
                    kind_label(other)
                ))),
            },
            ExpectedKind::Boolean => {
                let Value::Bool(_) = value else {
                    return Err(ExprError::TypeMismatch {
                        expected: "boolean",
                        actual: kind_label(&value),
                    });
                };
                Ok(value)
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
