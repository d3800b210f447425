//! Argument coercion: planner arguments in, schema-shaped JSON out.
//!
//! The planner emits flat `key=value` pairs. A key either names a declared
//! parameter literally, or is a dotted path (`input.string`) into a
//! parameter whose schema declares a nested object shape. Anything else is
//! rejected; there is no guessing.
//!
//! Scalar values are converted to the declared type (`5` → integer,
//! `true` → boolean); bracketed lists become JSON arrays with every element
//! converted to the declared item type.

use cortex_core::tool::{ArgValue, ParamSpec, ParamType, ToolArguments, ToolDescriptor};
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("parameter '{0}' given more than once")]
    Duplicate(String),

    #[error("missing required parameter '{0}'")]
    MissingRequired(String),

    #[error("parameter '{name}' expects {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: String,
        got: String,
    },
}

/// Coerce `args` against `descriptor`'s schema into a JSON object.
pub fn coerce_arguments(
    descriptor: &ToolDescriptor,
    args: &ToolArguments,
) -> Result<Value, CoercionError> {
    let mut root = Map::new();
    for (key, value) in args.iter() {
        assign(&descriptor.params, &mut root, key, key, value)?;
    }
    check_required(&descriptor.params, &root, "")?;
    Ok(Value::Object(root))
}

fn assign(
    params: &[ParamSpec],
    target: &mut Map<String, Value>,
    full_key: &str,
    key: &str,
    value: &ArgValue,
) -> Result<(), CoercionError> {
    if let Some(param) = params.iter().find(|p| p.name == key) {
        if target.contains_key(key) {
            return Err(CoercionError::Duplicate(full_key.to_string()));
        }
        let coerced = coerce_value(&param.kind, value, full_key)?;
        target.insert(key.to_string(), coerced);
        return Ok(());
    }

    let unknown = || CoercionError::UnknownParameter(full_key.to_string());
    let (head, rest) = key.split_once('.').ok_or_else(unknown)?;
    let param = params.iter().find(|p| p.name == head).ok_or_else(unknown)?;
    let ParamType::Object { fields } = &param.kind else {
        return Err(unknown());
    };

    let slot = target
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(nested) = slot else {
        return Err(CoercionError::Duplicate(full_key.to_string()));
    };
    assign(fields, nested, full_key, rest, value)
}

fn check_required(
    params: &[ParamSpec],
    target: &Map<String, Value>,
    prefix: &str,
) -> Result<(), CoercionError> {
    for param in params {
        match target.get(&param.name) {
            None if param.required => {
                return Err(CoercionError::MissingRequired(format!("{prefix}{}", param.name)));
            }
            Some(Value::Object(nested)) => {
                if let ParamType::Object { fields } = &param.kind {
                    check_required(fields, nested, &format!("{prefix}{}.", param.name))?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn coerce_value(kind: &ParamType, value: &ArgValue, name: &str) -> Result<Value, CoercionError> {
    let mismatch = || CoercionError::TypeMismatch {
        name: name.to_string(),
        expected: kind.to_string(),
        got: describe(value),
    };

    match kind {
        ParamType::String => value
            .as_scalar()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(mismatch),
        ParamType::Integer => {
            let raw = value.as_scalar().ok_or_else(mismatch)?.trim();
            parse_integer(raw).map(Value::from).ok_or_else(mismatch)
        }
        ParamType::Number => {
            let raw = value.as_scalar().ok_or_else(mismatch)?.trim();
            parse_number(raw).ok_or_else(mismatch)
        }
        ParamType::Boolean => {
            let raw = value.as_scalar().ok_or_else(mismatch)?.trim();
            match raw.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            }
        }
        ParamType::Array { items } => match value {
            ArgValue::List(elements) => elements
                .iter()
                .enumerate()
                .map(|(i, element)| coerce_value(items, element, &format!("{name}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Err(mismatch()),
        },
        ParamType::Object { .. } => {
            let raw = value.as_scalar().ok_or_else(mismatch)?;
            match serde_json::from_str::<Value>(raw) {
                Ok(object @ Value::Object(_)) => Ok(object),
                _ => Err(mismatch()),
            }
        }
        ParamType::Any => Ok(infer(value)),
    }
}

fn parse_integer(raw: &str) -> Option<i64> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    // "5.0" is still an integer
    let f = raw.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::from(n));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

/// Schema-less conversion: bare tokens become numbers or booleans when they
/// look like one, quoted tokens always stay strings.
fn infer(value: &ArgValue) -> Value {
    match value {
        ArgValue::Quoted(s) => Value::String(s.clone()),
        ArgValue::Text(s) => {
            let trimmed = s.trim();
            if let Some(number) = parse_number(trimmed) {
                number
            } else if trimmed.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if trimmed.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                Value::String(s.clone())
            }
        }
        ArgValue::List(items) => Value::Array(items.iter().map(infer).collect()),
    }
}

fn describe(value: &ArgValue) -> String {
    match value {
        ArgValue::List(items) => format!("a list of {}", items.len()),
        ArgValue::Text(s) | ArgValue::Quoted(s) => format!("'{s}'"),
    }
}
