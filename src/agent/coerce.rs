// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Argument coercion against a tool's input schema.
//!
//! Models often send `"3"` where the schema says integer, or `"true"` for
//! a boolean. Strings are converted to the declared primitive type;
//! objects and arrays are walked recursively. Anything that does not
//! convert cleanly, or has no schema, passes through unchanged.

use serde_json::{Map, Number, Value};

/// Coerce `value` to match `schema`.
pub fn coerce_arguments(schema: &Value, value: Value) -> Value {
    let types = declared_types(schema);
    if types.is_empty() {
        return value;
    }
    if types.iter().any(|t| matches_type(t, &value)) {
        return descend(schema, value);
    }

    for ty in &types {
        if let Some(coerced) = coerce_primitive(ty, &value) {
            return coerced;
        }
    }
    value
}

/// `type` as a string or an array of strings. A schema with `properties`
/// and no `type` is treated as an object.
fn declared_types(schema: &Value) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(ty)) => vec![ty.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ if schema.get("properties").is_some() => vec!["object"],
        _ => Vec::new(),
    }
}

fn matches_type(ty: &str, value: &Value) -> bool {
    match (ty, value) {
        ("string", Value::String(_)) => true,
        ("integer", Value::Number(n)) => n.is_i64() || n.is_u64(),
        ("number", Value::Number(_)) => true,
        ("boolean", Value::Bool(_)) => true,
        ("object", Value::Object(_)) => true,
        ("array", Value::Array(_)) => true,
        ("null", Value::Null) => true,
        _ => false,
    }
}

/// Recurse into containers that already have the right shape.
fn descend(schema: &Value, value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(coerce_object(schema, map)),
        Value::Array(items) => match schema.get("items") {
            Some(item_schema) => Value::Array(
                items
                    .into_iter()
                    .map(|item| coerce_arguments(item_schema, item))
                    .collect(),
            ),
            None => Value::Array(items),
        },
        other => other,
    }
}

fn coerce_object(schema: &Value, map: Map<String, Value>) -> Map<String, Value> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return map;
    };
    map.into_iter()
        .map(|(key, value)| match properties.get(&key) {
            Some(prop_schema) => {
                let coerced = coerce_arguments(prop_schema, value);
                (key, coerced)
            }
            None => (key, value),
        })
        .collect()
}

fn coerce_primitive(ty: &str, value: &Value) -> Option<Value> {
    let text = value.as_str()?.trim();
    match ty {
        "integer" => parse_integer(text),
        "number" => parse_number(text),
        "boolean" => {
            if text.eq_ignore_ascii_case("true") {
                Some(Value::Bool(true))
            } else if text.eq_ignore_ascii_case("false") {
                Some(Value::Bool(false))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn parse_integer(text: &str) -> Option<Value> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::from(n));
    }
    // "3.0" is still an integer.
    let f = text.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else {
        None
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::from(n));
    }
    let f = text.parse::<f64>().ok()?;
    Number::from_f64(f).map(Value::Number)
}
