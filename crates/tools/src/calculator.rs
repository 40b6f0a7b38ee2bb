//! Calculator tool.
//!
//! Evaluates arithmetic expressions (`+`, `-`, `*`, `/`, parentheses, unary
//! minus, decimals) in a single pass: precedence climbing directly over the
//! input characters, no intermediate token stream. Syntax problems map to
//! [`ToolError::InvalidArguments`], arithmetic faults to
//! [`ToolError::ExecutionFailed`], so the loop reports them distinctly.

use std::iter::Peekable;
use std::str::Chars;

use async_trait::async_trait;
use modelmux_core::error::ToolError;
use modelmux_core::tool::Tool;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate a mathematical expression. Supports +, -, *, /, parentheses, and decimal numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The mathematical expression to evaluate, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let expr = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;

        let value = evaluate(expr)?;

        // Whole results print without a trailing ".0"
        if value.fract() == 0.0 && value.abs() < 1e15 {
            Ok(format!("{}", value as i64))
        } else {
            Ok(format!("{value}"))
        }
    }
}

/// Evaluate an arithmetic expression string.
pub fn evaluate(expr: &str) -> Result<f64, ToolError> {
    let mut input = expr.chars().peekable();
    let value = climb(&mut input, 0)?;

    skip_spaces(&mut input);
    match input.peek() {
        None => Ok(value),
        Some(c) => Err(syntax(format!("trailing input starting at '{c}'"))),
    }
}

fn syntax(reason: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments(reason.into())
}

fn skip_spaces(input: &mut Peekable<Chars>) {
    while input.peek().is_some_and(|c| c.is_whitespace()) {
        input.next();
    }
}

/// Binding power of an infix operator; `None` for anything else.
fn precedence(op: char) -> Option<u8> {
    match op {
        '+' | '-' => Some(1),
        '*' | '/' => Some(2),
        _ => None,
    }
}

/// Precedence climbing: fold operators whose binding power is at least
/// `min_prec`, recursing one level tighter for the right-hand side so equal
/// precedence associates left.
fn climb(input: &mut Peekable<Chars>, min_prec: u8) -> Result<f64, ToolError> {
    let mut acc = operand(input)?;

    loop {
        skip_spaces(input);
        let Some((op, prec)) = input.peek().and_then(|c| Some((*c, precedence(*c)?))) else {
            return Ok(acc);
        };
        if prec < min_prec {
            return Ok(acc);
        }
        input.next();

        let rhs = climb(input, prec + 1)?;
        acc = match op {
            '+' => acc + rhs,
            '-' => acc - rhs,
            '*' => acc * rhs,
            _ if rhs == 0.0 => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "calculator".into(),
                    reason: "division by zero".into(),
                });
            }
            _ => acc / rhs,
        };
    }
}

/// One operand: a number, a parenthesized subexpression, or a negation of
/// either.
fn operand(input: &mut Peekable<Chars>) -> Result<f64, ToolError> {
    skip_spaces(input);
    match input.peek() {
        Some('-') => {
            input.next();
            Ok(-operand(input)?)
        }
        Some('(') => {
            input.next();
            let value = climb(input, 0)?;
            skip_spaces(input);
            match input.next() {
                Some(')') => Ok(value),
                _ => Err(syntax("missing closing parenthesis")),
            }
        }
        Some(c) if c.is_ascii_digit() || *c == '.' => number(input),
        Some(c) => Err(syntax(format!("unexpected character '{c}'"))),
        None => Err(syntax("expression ended where a value was expected")),
    }
}

fn number(input: &mut Peekable<Chars>) -> Result<f64, ToolError> {
    let mut literal = String::new();
    while let Some(c) = input.peek() {
        if c.is_ascii_digit() || *c == '.' {
            literal.push(*c);
            input.next();
        } else {
            break;
        }
    }
    literal
        .parse()
        .map_err(|_| syntax(format!("'{literal}' is not a number")))
}
