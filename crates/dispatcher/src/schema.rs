//! JSON Schema → parameter schema.
//!
//! Stdio tool servers advertise an `inputSchema` per tool. Only the parts
//! the coercion step needs are kept: property order, primitive types,
//! list item types, nested object shapes, and the `required` set. Local
//! `$ref`s into `$defs`/`definitions` are resolved; anything the converter
//! does not understand becomes [`ParamType::Any`].

use cortex_core::tool::{ParamSpec, ParamType};
use serde_json::Value;

const MAX_DEPTH: usize = 8;

/// Convert an object schema's properties into an ordered parameter list.
pub fn params_from_schema(schema: &Value) -> Vec<ParamSpec> {
    object_fields(schema, schema, 0)
}

fn object_fields(schema: &Value, root: &Value, depth: usize) -> Vec<ParamSpec> {
    let schema = resolve(schema, root);
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    properties
        .iter()
        .map(|(name, property)| {
            let kind = param_type(property, root, depth + 1);
            let description = resolve(property, root)
                .get("description")
                .and_then(Value::as_str)
                .map(String::from);
            ParamSpec {
                name: name.clone(),
                kind,
                required: required.contains(&name.as_str()),
                description,
            }
        })
        .collect()
}

fn param_type(schema: &Value, root: &Value, depth: usize) -> ParamType {
    if depth > MAX_DEPTH {
        return ParamType::Any;
    }
    let schema = resolve(schema, root);

    // Optional<T> shows up as anyOf/oneOf [T, null]
    for key in ["anyOf", "oneOf"] {
        if let Some(variants) = schema.get(key).and_then(Value::as_array) {
            return variants
                .iter()
                .find(|v| resolve(v, root).get("type").and_then(Value::as_str) != Some("null"))
                .map(|v| param_type(v, root, depth + 1))
                .unwrap_or(ParamType::Any);
        }
    }

    let type_name = match schema.get("type") {
        Some(Value::String(name)) => Some(name.as_str()),
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .find(|name| *name != "null"),
        _ => None,
    };

    match type_name {
        Some("string") => ParamType::String,
        Some("integer") => ParamType::Integer,
        Some("number") => ParamType::Number,
        Some("boolean") => ParamType::Boolean,
        Some("array") => {
            let items = schema
                .get("items")
                .map(|items| param_type(items, root, depth + 1))
                .unwrap_or(ParamType::Any);
            ParamType::array_of(items)
        }
        Some("object") if schema.get("properties").is_some() => {
            ParamType::object(object_fields(schema, root, depth))
        }
        _ => ParamType::Any,
    }
}

/// Follow a local `#/$defs/Name` or `#/definitions/Name` reference.
fn resolve<'a>(schema: &'a Value, root: &'a Value) -> &'a Value {
    let Some(reference) = schema.get("$ref").and_then(Value::as_str) else {
        return schema;
    };
    let target = reference
        .strip_prefix("#/$defs/")
        .map(|name| root.get("$defs").and_then(|defs| defs.get(name)))
        .or_else(|| {
            reference
                .strip_prefix("#/definitions/")
                .map(|name| root.get("definitions").and_then(|defs| defs.get(name)))
        })
        .flatten();
    target.unwrap_or(schema)
}
