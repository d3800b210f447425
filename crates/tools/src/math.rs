//! The built-in math tool server.
//!
//! Hosted in-process behind `builtin:math`. Numbers are returned as plain
//! text (`8`, not `8.0`); lists as compact JSON arrays.

use crate::expr::evaluate;
use async_trait::async_trait;
use cortex_core::error::ToolError;
use cortex_core::tool::{ParamSpec, ParamType, Tool, ToolRegistry, ToolResult};
use serde_json::Value;
use tracing::debug;

/// Every math tool, in catalog order.
pub fn math_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for op in BinaryOp::ALL {
        registry.register(Box::new(BinaryTool(op)));
    }
    registry.register(Box::new(CalculateTool));
    registry.register(Box::new(StringsToCharsToInt));
    registry.register(Box::new(IntListToExponentialSum));
    registry
}

/// Render a float without a trailing `.0` when it is integral.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn number_arg(arguments: &Value, name: &str) -> Result<f64, ToolError> {
    arguments[name]
        .as_f64()
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{name}' must be a number")))
}

#[derive(Debug, Clone, Copy)]
enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

impl BinaryOp {
    const ALL: [BinaryOp; 5] = [Self::Add, Self::Subtract, Self::Multiply, Self::Divide, Self::Power];

    fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Power => "power",
        }
    }

    fn usage(self) -> &'static str {
        match self {
            Self::Add => "Add two numbers. Usage: add|a=5|b=3",
            Self::Subtract => "Subtract b from a. Usage: subtract|a=10|b=4",
            Self::Multiply => "Multiply two numbers. Usage: multiply|a=6|b=7",
            Self::Divide => "Divide a by b. Usage: divide|a=10|b=4",
            Self::Power => "Raise a to the power b. Usage: power|a=2|b=10",
        }
    }

    fn apply(self, a: f64, b: f64) -> Result<f64, String> {
        let value = match self {
            Self::Add => a + b,
            Self::Subtract => a - b,
            Self::Multiply => a * b,
            Self::Divide if b == 0.0 => return Err("division by zero".into()),
            Self::Divide => a / b,
            Self::Power => a.powf(b),
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err("result is not a finite number".into())
        }
    }
}

struct BinaryTool(BinaryOp);

#[async_trait]
impl Tool for BinaryTool {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn usage(&self) -> &str {
        self.0.usage()
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("a", ParamType::Number),
            ParamSpec::required("b", ParamType::Number),
        ]
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let a = number_arg(&arguments, "a")?;
        let b = number_arg(&arguments, "b")?;
        self.0
            .apply(a, b)
            .map(|value| ToolResult::ok(format_number(value)))
            .map_err(|reason| ToolError::ExecutionFailed {
                tool_name: self.0.name().into(),
                reason,
            })
    }
}

struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn usage(&self) -> &str {
        "Evaluate an arithmetic expression with + - * / % ^ and parentheses. Usage: calculate|expression=\"(2 + 3) * 4\""
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("expression", ParamType::String).with_description("e.g. (2 + 3) * 4")]
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let expression = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("'expression' must be a string".into()))?;
        debug!(expression, "Evaluating expression");
        evaluate(expression)
            .map(|value| ToolResult::ok(format_number(value)))
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "calculate".into(),
                reason: e.to_string(),
            })
    }
}

struct StringsToCharsToInt;

#[async_trait]
impl Tool for StringsToCharsToInt {
    fn name(&self) -> &str {
        "strings_to_chars_to_int"
    }

    fn usage(&self) -> &str {
        "Convert each character of a string to its ASCII code. Usage: strings_to_chars_to_int|input.string=INDIA"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "input",
            ParamType::object(vec![ParamSpec::required("string", ParamType::String)]),
        )]
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let text = arguments["input"]["string"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("'input.string' must be a string".into()))?;
        let codes: Vec<u32> = text.chars().map(u32::from).collect();
        Ok(ToolResult::ok(Value::from(codes).to_string()))
    }
}

struct IntListToExponentialSum;

#[async_trait]
impl Tool for IntListToExponentialSum {
    fn name(&self) -> &str {
        "int_list_to_exponential_sum"
    }

    fn usage(&self) -> &str {
        "Sum e raised to each integer in a list. Usage: int_list_to_exponential_sum|input.int_list=[73,78,68,73,65]"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "input",
            ParamType::object(vec![ParamSpec::required(
                "int_list",
                ParamType::array_of(ParamType::Integer),
            )]),
        )]
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let list = arguments["input"]["int_list"]
            .as_array()
            .ok_or_else(|| ToolError::InvalidArguments("'input.int_list' must be a list".into()))?;
        let mut sum = 0.0_f64;
        for item in list {
            let n = item
                .as_i64()
                .ok_or_else(|| ToolError::InvalidArguments(format!("not an integer: {item}")))?;
            sum += (n as f64).exp();
        }
        if !sum.is_finite() {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: "sum overflows".into(),
            });
        }
        Ok(ToolResult::ok(sum.to_string()))
    }
}
