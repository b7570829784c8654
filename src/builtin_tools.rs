//! Ready-made tools.
//!
//! | Tool               | Name         | Input                          |
//! |--------------------|--------------|--------------------------------|
//! | [`CalculatorTool`] | `calculator` | `expression`                   |
//! | [`FileReaderTool`] | `read_file`  | `path`                         |
//! | [`WebSearchTool`]  | `web_search` | `query`, `max_results` (opt.)  |
//! | [`UserInputTool`]  | `ask_user`   | `question`                     |

use crate::tools::{PropertySchema, Tool, ToolInputSchema, optional_i64, required_str};
use crate::types::ToolInput;
use crate::user_input::WeakUserInputBridge;
use crate::{Error, Result};
use async_trait::async_trait;

/// Arithmetic over `+ - * / %`, parentheses, unary minus and decimals
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Performs basic mathematical calculations"
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::object().required_property(
            "expression",
            PropertySchema::string(
                "Mathematical expression to evaluate (e.g., '2 + 2', '10 * 5')",
            ),
        )
    }

    async fn execute(&self, input: &ToolInput) -> Result<String> {
        let expression = required_str(input, "expression")?;
        let value = evaluate(expression)?;
        Ok(format!(
            "The result of {} is {}",
            expression,
            format_number(value)
        ))
    }
}

/// Evaluate an arithmetic expression
pub fn evaluate(expression: &str) -> Result<f64> {
    let mut parser = ExprParser {
        src: expression.as_bytes(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(Error::invalid_input(format!(
            "Unexpected '{}' at position {} in expression",
            parser.src[parser.pos] as char, parser.pos
        )));
    }
    if !value.is_finite() {
        return Err(Error::tool("Result is not a finite number"));
    }
    Ok(value)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Deepest parenthesis nesting the evaluator accepts
const MAX_DEPTH: usize = 256;

struct ExprParser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl ExprParser<'_> {
    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == b'+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        while let Some(op @ (b'*' | b'/' | b'%')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                b'*' => value * rhs,
                _ if rhs == 0.0 => return Err(Error::tool("Division by zero")),
                b'/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    // unary := ('-' | '+')* primary
    fn unary(&mut self) -> Result<f64> {
        let mut negate = false;
        while let Some(sign @ (b'-' | b'+')) = self.peek() {
            self.pos += 1;
            if sign == b'-' {
                negate = !negate;
            }
        }
        let value = self.primary()?;
        Ok(if negate { -value } else { value })
    }

    fn primary(&mut self) -> Result<f64> {
        match self.peek() {
            Some(b'(') => {
                if self.depth >= MAX_DEPTH {
                    return Err(Error::invalid_input("Expression nested too deeply"));
                }
                self.pos += 1;
                self.depth += 1;
                let value = self.expr()?;
                self.depth -= 1;
                if self.peek() != Some(b')') {
                    return Err(Error::invalid_input("Missing closing parenthesis"));
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) => Err(Error::invalid_input(format!(
                "Unexpected '{}' at position {} in expression",
                c as char, self.pos
            ))),
            None => Err(Error::invalid_input("Unexpected end of expression")),
        }
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        while self.pos < self.src.len()
            && (self.src[self.pos].is_ascii_digit() || self.src[self.pos] == b'.')
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|e| Error::invalid_input(e.to_string()))?;
        text.parse::<f64>()
            .map_err(|_| Error::invalid_input(format!("Invalid number '{text}'")))
    }
}

/// Reads a UTF-8 text file.
///
/// I/O failures are reported back to the model as text rather than as a tool failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileReaderTool;

#[async_trait]
impl Tool for FileReaderTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads the contents of a file from the file system"
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::object()
            .required_property("path", PropertySchema::string("The file path to read"))
    }

    async fn execute(&self, input: &ToolInput) -> Result<String> {
        let path = required_str(input, "path")?;
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(format!("File contents:\n{contents}")),
            Err(e) => {
                log::debug!("read_file failed for {}: {}", path, e);
                Ok(format!("Error reading file: {e}"))
            }
        }
    }
}

const DEFAULT_MAX_RESULTS: i64 = 5;
const MAX_RESULTS_CAP: i64 = 10;

/// Placeholder search that returns canned results
#[derive(Debug, Clone, Default)]
pub struct WebSearchTool {
    api_key: Option<String>,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for a real search provider, kept for integrations that replace the canned results
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Searches the web for information"
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::object()
            .required_property("query", PropertySchema::string("The search query"))
            .property(
                "max_results",
                PropertySchema::integer("Maximum number of results to return (default: 5)"),
            )
    }

    async fn execute(&self, input: &ToolInput) -> Result<String> {
        let query = required_str(input, "query")?;
        let max_results = optional_i64(input, "max_results")?.unwrap_or(DEFAULT_MAX_RESULTS);
        if max_results < 1 {
            return Err(Error::invalid_input("max_results must be at least 1"));
        }
        let count = max_results.min(MAX_RESULTS_CAP);

        let mut out = format!("Search results for \"{query}\" (showing {count} results):\n\n");
        for i in 1..=count {
            out.push_str(&format!(
                "{i}. [Mock Result {i}] - Placeholder result for \"{query}\"\n"
            ));
        }
        out.push_str(
            "\nNote: This is a mock implementation. Integrate with a real search API for actual results.",
        );
        Ok(out)
    }
}

/// Lets the model ask the human a question through the agent's user-input handler
#[derive(Debug, Clone)]
pub struct UserInputTool {
    bridge: WeakUserInputBridge,
}

impl UserInputTool {
    /// Usually obtained through [`Agent::user_input_tool`](crate::Agent::user_input_tool)
    pub fn new(bridge: WeakUserInputBridge) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Tool for UserInputTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Ask the user for input or clarification"
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::object().required_property(
            "question",
            PropertySchema::string("The question to ask the user"),
        )
    }

    async fn execute(&self, input: &ToolInput) -> Result<String> {
        let question = required_str(input, "question")?;
        let Some(bridge) = self.bridge.upgrade() else {
            return Ok("Error: Agent reference lost".to_string());
        };
        match bridge.ask(question).await {
            Some(answer) => Ok(format!("User response: {answer}")),
            None => Ok("No user input handler configured".to_string()),
        }
    }
}
