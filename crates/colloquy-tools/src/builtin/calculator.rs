use async_trait::async_trait;

use crate::error::{Result, ToolError};
use crate::tool::{text_arg, Tool};

pub const VERSION: &str = "1.1.0";

/// Infix arithmetic evaluator: `+ - * /`, parentheses, unary minus.
pub struct Calculator;

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression (+, -, *, /, parentheses)"
    }

    fn usage(&self) -> &str {
        "calculator: {\"input\": \"15*7+22/11\"}"
    }

    fn triggers(&self) -> Vec<String> {
        vec![
            "calculate".to_string(),
            "compute".to_string(),
            r"\d+\s*[+\-*/]\s*\d+".to_string(),
        ]
    }

    fn min_compatible(&self) -> Option<&str> {
        Some("1.0.0")
    }

    async fn run(&self, args: serde_json::Value) -> Result<String> {
        let text = text_arg(&args)?;
        let expr = extract_expression(&text).ok_or_else(|| {
            ToolError::Execution(format!("no arithmetic expression found in: {text}"))
        })?;
        let value = eval(&expr)?;
        Ok(format_number(value))
    }
}

/// Pull the arithmetic substring out of free text, e.g.
/// `"calculate 15*7+22/11 please"` → `"15*7+22/11"`.
fn extract_expression(text: &str) -> Option<String> {
    let allowed = |c: char| c.is_ascii_digit() || "+-*/(). ".contains(c);

    let mut best: Option<String> = None;
    let mut current = String::new();
    for c in text.chars() {
        if allowed(c) {
            current.push(c);
        } else {
            consider(&mut best, &current);
            current.clear();
        }
    }
    consider(&mut best, &current);
    best
}

fn consider(best: &mut Option<String>, candidate: &str) {
    let trimmed = candidate.trim();
    // A usable expression has at least one digit and one operator.
    let has_digit = trimmed.chars().any(|c| c.is_ascii_digit());
    let has_op = trimmed.chars().any(|c| "+-*/".contains(c));
    if has_digit && has_op && best.as_ref().map(|b| b.len() < trimmed.len()).unwrap_or(true) {
        *best = Some(trimmed.to_string());
    }
}

fn format_number(value: f64) -> String {
    if value.is_finite() && (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{value}")
    }
}

// --- recursive-descent evaluator -------------------------------------------

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

fn eval(expr: &str) -> Result<f64> {
    let mut p = Parser {
        chars: expr.chars().peekable(),
    };
    let value = p.expr()?;
    p.skip_ws();
    if p.chars.peek().is_some() {
        return Err(ToolError::Execution(format!(
            "unexpected trailing input in expression: {expr}"
        )));
    }
    Ok(value)
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while self.chars.peek().map(|c| c.is_whitespace()).unwrap_or(false) {
            self.chars.next();
        }
    }

    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            self.skip_ws();
            match self.chars.peek() {
                Some('+') => {
                    self.chars.next();
                    value += self.term()?;
                }
                Some('-') => {
                    self.chars.next();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        loop {
            self.skip_ws();
            match self.chars.peek() {
                Some('*') => {
                    self.chars.next();
                    value *= self.factor()?;
                }
                Some('/') => {
                    self.chars.next();
                    let rhs = self.factor()?;
                    if rhs == 0.0 {
                        return Err(ToolError::Execution("division by zero".to_string()));
                    }
                    value /= rhs;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<f64> {
        self.skip_ws();
        match self.chars.peek() {
            Some('(') => {
                self.chars.next();
                let value = self.expr()?;
                self.skip_ws();
                if self.chars.next() != Some(')') {
                    return Err(ToolError::Execution("unbalanced parentheses".to_string()));
                }
                Ok(value)
            }
            Some('-') => {
                self.chars.next();
                Ok(-self.factor()?)
            }
            Some(c) if c.is_ascii_digit() || *c == '.' => self.number(),
            other => Err(ToolError::Execution(format!(
                "unexpected character in expression: {:?}",
                other
            ))),
        }
    }

    fn number(&mut self) -> Result<f64> {
        let mut raw = String::new();
        while let Some(c) = self.chars.peek() {
            if c.is_ascii_digit() || *c == '.' {
                raw.push(*c);
                self.chars.next();
            } else {
                break;
            }
        }
        raw.parse::<f64>()
            .map_err(|_| ToolError::Execution(format!("bad number: {raw}")))
    }
}
