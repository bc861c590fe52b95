//! Condition Evaluator
//!
//! A minimal, sandboxed boolean expression language for ifelse nodes.
//! Expressions read variables from the execution context and can do
//! nothing else: no I/O, no mutation, no function calls.
//!
//! Supported syntax:
//! - literals: numbers, `'single'`/`"double"` quoted strings, `true`,
//!   `false`, `null`
//! - variable lookup with dotted paths (`summary.length`, `check.acknowledged`);
//!   `length` is a virtual field on strings, arrays, and objects
//! - comparison: `==` `!=` `<` `<=` `>` `>=`
//! - boolean: `&&` `||` `!`, with parentheses for grouping
//!
//! The final value is coerced to a boolean the way the workflow editor's
//! host language would: `false`, `null`, `0`, and `""` are false,
//! everything else is true. Evaluating the same expression against an
//! unmodified context always yields the same result.

use serde_json::Value;
use thiserror::Error;

use super::model::ExecutionContext;

/// Expression evaluation errors. Fatal to the execution, never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("syntax error in condition: {0}")]
    SyntaxError(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("cannot order {left} against {right}")]
    TypeMismatch { left: String, right: String },
}

/// Evaluates a condition expression against an execution context.
pub fn evaluate(expression: &str, context: &ExecutionContext) -> Result<bool, EvalError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(EvalError::SyntaxError("empty expression".to_string()));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        context,
    };
    let value = parser.expression()?;

    if parser.pos != parser.tokens.len() {
        return Err(EvalError::SyntaxError(format!(
            "unexpected trailing input at token {}",
            parser.pos + 1
        )));
    }

    Ok(truthy(&value))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '&' => {
                chars.next();
                if chars.next() != Some('&') {
                    return Err(EvalError::SyntaxError("expected '&&'".to_string()));
                }
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                if chars.next() != Some('|') {
                    return Err(EvalError::SyntaxError("expected '||'".to_string()));
                }
                tokens.push(Token::Or);
            }
            '=' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(EvalError::SyntaxError(
                        "expected '==' (assignment is not supported)".to_string(),
                    ));
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    if ch == '\\' {
                        match chars.next() {
                            Some(escaped @ ('\'' | '"' | '\\')) => text.push(escaped),
                            Some(other) => {
                                return Err(EvalError::SyntaxError(format!(
                                    "unsupported escape '\\{}'",
                                    other
                                )))
                            }
                            None => break,
                        }
                    } else if ch == quote {
                        closed = true;
                        break;
                    } else {
                        text.push(ch);
                    }
                }
                if !closed {
                    return Err(EvalError::SyntaxError("unterminated string".to_string()));
                }
                tokens.push(Token::Str(text));
            }
            '0'..='9' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = text
                    .parse::<f64>()
                    .map_err(|_| EvalError::SyntaxError(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&i) = chars.peek() {
                    if i.is_alphanumeric() || i == '_' || i == '.' || i == '-' {
                        text.push(i);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match text.as_str() {
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    "null" => tokens.push(Token::Null),
                    _ => tokens.push(Token::Ident(text)),
                }
            }
            other => {
                return Err(EvalError::SyntaxError(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        }
    }

    Ok(tokens)
}

/// Recursive-descent evaluator over the token stream.
///
/// Precedence, loosest first: `||`, `&&`, comparison, unary `!`.
struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    context: &'a ExecutionContext,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expression(&mut self) -> Result<Value, EvalError> {
        let mut left = self.and_expression()?;

        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.and_expression()?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }

        Ok(left)
    }

    fn and_expression(&mut self) -> Result<Value, EvalError> {
        let mut left = self.comparison()?;

        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.comparison()?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }

        Ok(left)
    }

    fn comparison(&mut self) -> Result<Value, EvalError> {
        let left = self.unary()?;

        let op = match self.peek() {
            Some(Token::Eq) => Token::Eq,
            Some(Token::Ne) => Token::Ne,
            Some(Token::Lt) => Token::Lt,
            Some(Token::Le) => Token::Le,
            Some(Token::Gt) => Token::Gt,
            Some(Token::Ge) => Token::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.unary()?;

        let result = match op {
            Token::Eq => loose_equal(&left, &right),
            Token::Ne => !loose_equal(&left, &right),
            _ => {
                let (l, r) = numeric_pair(&left, &right)?;
                match op {
                    Token::Lt => l < r,
                    Token::Le => l <= r,
                    Token::Gt => l > r,
                    Token::Ge => l >= r,
                    _ => unreachable!(),
                }
            }
        };

        Ok(Value::Bool(result))
    }

    fn unary(&mut self) -> Result<Value, EvalError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let value = self.unary()?;
            return Ok(Value::Bool(!truthy(&value)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Value, EvalError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Value::from(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::True) => Ok(Value::Bool(true)),
            Some(Token::False) => Ok(Value::Bool(false)),
            Some(Token::Null) => Ok(Value::Null),
            Some(Token::Ident(path)) => self.lookup(&path),
            Some(Token::LParen) => {
                let value = self.expression()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(EvalError::SyntaxError("expected ')'".to_string())),
                }
            }
            Some(other) => Err(EvalError::SyntaxError(format!(
                "unexpected token {:?}",
                other
            ))),
            None => Err(EvalError::SyntaxError(
                "unexpected end of expression".to_string(),
            )),
        }
    }

    /// Resolves a dotted variable path against the context.
    ///
    /// The root segment must name a context variable; deeper segments walk
    /// into object values. A missing inner field yields `null` rather than
    /// an error, so conditions can probe optional data.
    fn lookup(&self, path: &str) -> Result<Value, EvalError> {
        let mut segments = path.split('.');
        let root = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EvalError::SyntaxError(format!("invalid variable path '{}'", path)))?;

        let mut current = self
            .context
            .get(root)
            .ok_or_else(|| EvalError::UnknownVariable(root.to_string()))?
            .clone();

        for segment in segments {
            if segment.is_empty() {
                return Err(EvalError::SyntaxError(format!(
                    "invalid variable path '{}'",
                    path
                )));
            }

            current = match (&current, segment) {
                (Value::String(s), "length") => Value::from(s.chars().count() as u64),
                (Value::Array(items), "length") => Value::from(items.len() as u64),
                (Value::Object(map), "length") => Value::from(map.len() as u64),
                (Value::Object(map), field) => map.get(field).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            };
        }

        Ok(current)
    }
}

/// Host-language truthiness of a value.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Equality with numeric coercion; values of different shapes are unequal.
fn loose_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn numeric_pair(left: &Value, right: &Value) -> Result<(f64, f64), EvalError> {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => Ok((l, r)),
        _ => Err(EvalError::TypeMismatch {
            left: type_name(left).to_string(),
            right: type_name(right).to_string(),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with(vars: &[(&str, Value)]) -> ExecutionContext {
        let mut context = ExecutionContext::new("exec-test", None);
        for (name, value) in vars {
            context.set(*name, value.clone());
        }
        context
    }

    #[test]
    fn test_literal_booleans() {
        let context = context_with(&[]);
        assert!(evaluate("true", &context).unwrap());
        assert!(!evaluate("false", &context).unwrap());
        assert!(!evaluate("null", &context).unwrap());
    }

    #[test]
    fn test_variable_lookup() {
        let context = context_with(&[("ready", json!(true))]);
        assert!(evaluate("ready", &context).unwrap());
    }

    #[test]
    fn test_unknown_variable() {
        let context = context_with(&[]);
        assert_eq!(
            evaluate("missing", &context),
            Err(EvalError::UnknownVariable("missing".to_string()))
        );
    }

    #[test]
    fn test_numeric_comparison() {
        let context = context_with(&[("count", json!(5))]);
        assert!(evaluate("count > 3", &context).unwrap());
        assert!(evaluate("count >= 5", &context).unwrap());
        assert!(!evaluate("count < 5", &context).unwrap());
        assert!(evaluate("count <= 5", &context).unwrap());
        assert!(evaluate("count == 5", &context).unwrap());
        assert!(evaluate("count != 4", &context).unwrap());
    }

    #[test]
    fn test_string_equality() {
        let context = context_with(&[("status", json!("done"))]);
        assert!(evaluate("status == 'done'", &context).unwrap());
        assert!(evaluate("status != \"pending\"", &context).unwrap());
    }

    #[test]
    fn test_string_length() {
        let context = context_with(&[("summary", json!("short text"))]);
        assert!(!evaluate("summary.length > 100", &context).unwrap());
        assert!(evaluate("summary.length > 5", &context).unwrap());
        assert!(evaluate("summary.length == 10", &context).unwrap());
    }

    #[test]
    fn test_array_and_object_length() {
        let context = context_with(&[
            ("items", json!([1, 2, 3])),
            ("fields", json!({"a": 1, "b": 2})),
        ]);
        assert!(evaluate("items.length == 3", &context).unwrap());
        assert!(evaluate("fields.length == 2", &context).unwrap());
    }

    #[test]
    fn test_dotted_path_into_object() {
        let context = context_with(&[(
            "check",
            json!({"acknowledged": true, "response": "looks good"}),
        )]);
        assert!(evaluate("check.acknowledged", &context).unwrap());
        assert!(evaluate("check.response == 'looks good'", &context).unwrap());
    }

    #[test]
    fn test_missing_inner_field_is_null() {
        let context = context_with(&[("check", json!({"acknowledged": false}))]);
        assert!(evaluate("check.reply == null", &context).unwrap());
        assert!(!evaluate("check.reply", &context).unwrap());
    }

    #[test]
    fn test_boolean_operators() {
        let context = context_with(&[("a", json!(true)), ("b", json!(false))]);
        assert!(evaluate("a && !b", &context).unwrap());
        assert!(evaluate("a || b", &context).unwrap());
        assert!(!evaluate("a && b", &context).unwrap());
        assert!(!evaluate("!a || b", &context).unwrap());
    }

    #[test]
    fn test_parentheses() {
        let context = context_with(&[("n", json!(7))]);
        assert!(evaluate("(n > 5) && (n < 10)", &context).unwrap());
        assert!(evaluate("!(n == 3)", &context).unwrap());
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let context = context_with(&[]);
        // false && false || true => (false && false) || true => true
        assert!(evaluate("false && false || true", &context).unwrap());
    }

    #[test]
    fn test_truthiness_coercion() {
        let context = context_with(&[
            ("empty", json!("")),
            ("text", json!("hi")),
            ("zero", json!(0)),
            ("one", json!(1)),
        ]);
        assert!(!evaluate("empty", &context).unwrap());
        assert!(evaluate("text", &context).unwrap());
        assert!(!evaluate("zero", &context).unwrap());
        assert!(evaluate("one", &context).unwrap());
    }

    #[test]
    fn test_syntax_errors() {
        let context = context_with(&[("a", json!(1))]);
        assert!(matches!(
            evaluate("", &context),
            Err(EvalError::SyntaxError(_))
        ));
        assert!(matches!(
            evaluate("a >", &context),
            Err(EvalError::SyntaxError(_))
        ));
        assert!(matches!(
            evaluate("(a == 1", &context),
            Err(EvalError::SyntaxError(_))
        ));
        assert!(matches!(
            evaluate("a = 1", &context),
            Err(EvalError::SyntaxError(_))
        ));
        assert!(matches!(
            evaluate("a == 1 extra", &context),
            Err(EvalError::SyntaxError(_))
        ));
        assert!(matches!(
            evaluate("'unterminated", &context),
            Err(EvalError::SyntaxError(_))
        ));
        assert!(matches!(
            evaluate("a # 1", &context),
            Err(EvalError::SyntaxError(_))
        ));
    }

    #[test]
    fn test_type_mismatch_on_ordering() {
        let context = context_with(&[("name", json!("zoe"))]);
        assert!(matches!(
            evaluate("name > 3", &context),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_equality_across_types_is_false() {
        let context = context_with(&[("n", json!(1))]);
        assert!(!evaluate("n == 'one'", &context).unwrap());
        assert!(evaluate("n != 'one'", &context).unwrap());
    }

    #[test]
    fn test_deterministic_for_unchanged_context() {
        let context = context_with(&[("summary", json!("abcdef"))]);
        let first = evaluate("summary.length > 3 && summary != ''", &context).unwrap();
        for _ in 0..10 {
            assert_eq!(
                evaluate("summary.length > 3 && summary != ''", &context).unwrap(),
                first
            );
        }
    }

    #[test]
    fn test_float_literals() {
        let context = context_with(&[("ratio", json!(0.75))]);
        assert!(evaluate("ratio > 0.5", &context).unwrap());
        assert!(evaluate("ratio == 0.75", &context).unwrap());
    }
}
