//! Argument validation against a tool's parameter specs.
//!
//! Runs before any tool body is invoked. On success the returned map holds
//! the caller's arguments plus defaults for omitted optional parameters.

use crate::error::ToolError;
use crate::types::{Arguments, ParameterSpec, ParameterType, ToolSpec};
use serde_json::Value;
use std::path::{Component, Path};

pub fn validate_arguments(spec: &ToolSpec, args: &Arguments) -> Result<Arguments, ToolError> {
    if let Some(unknown) = args.keys().find(|key| spec.param(key).is_none()) {
        return Err(ToolError::validation(
            unknown.as_str(),
            format!("unknown parameter for tool '{}'", spec.name),
        ));
    }

    let mut validated = Arguments::new();
    for param in &spec.parameters {
        match args.get(&param.name) {
            Some(value) => {
                validate_value(param, value)?;
                validated.insert(param.name.clone(), normalize(param, value));
            }
            None => match &param.default {
                Some(default) => {
                    validated.insert(param.name.clone(), default.clone());
                }
                None if param.required => {
                    return Err(ToolError::validation(
                        param.name.as_str(),
                        "missing required parameter",
                    ));
                }
                None => {}
            },
        }
    }

    Ok(validated)
}

fn validate_value(param: &ParameterSpec, value: &Value) -> Result<(), ToolError> {
    let fail = |message: String| ToolError::validation(param.name.as_str(), message);

    if !param.param_type.matches(value) {
        return Err(fail(format!(
            "expected {}, got {}",
            param.param_type,
            json_type_name(value)
        )));
    }

    match param.param_type {
        ParameterType::Integer => check_integer_range(value).map_err(fail)?,
        ParameterType::Url => check_url(value).map_err(fail)?,
        ParameterType::FilePath => check_path(param, value).map_err(fail)?,
        _ => {}
    }

    check_constraints(param, value).map_err(fail)
}

/// Integral floats accepted for integer parameters are passed on as integers.
fn normalize(param: &ParameterSpec, value: &Value) -> Value {
    match (param.param_type, value.as_f64()) {
        (ParameterType::Integer, Some(f)) if value.is_f64() => Value::from(f as i64),
        _ => value.clone(),
    }
}

/// Integral floats must fit in an i64 before they are converted.
fn check_integer_range(value: &Value) -> Result<(), String> {
    match value.as_f64() {
        // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
        Some(f) if value.is_f64() && !(f >= i64::MIN as f64 && f < i64::MAX as f64) => {
            Err(format!("integer {f} is out of range"))
        }
        _ => Ok(()),
    }
}

fn check_url(value: &Value) -> Result<(), String> {
    let raw = value.as_str().unwrap_or_default();
    let parsed = url::Url::parse(raw).map_err(|e| format!("invalid URL '{raw}': {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported URL scheme '{other}'")),
    }
}

fn check_path(param: &ParameterSpec, value: &Value) -> Result<(), String> {
    let raw = value.as_str().unwrap_or_default();
    if raw.is_empty() {
        return Err("path cannot be empty".to_string());
    }

    let path = Path::new(raw);
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(format!("path traversal not allowed: {raw}"));
    }

    if let Some(allowed) = param
        .constraints
        .get("allowed_extensions")
        .and_then(Value::as_array)
    {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let permitted = allowed.iter().filter_map(Value::as_str).any(|candidate| {
            candidate.trim_start_matches('.').eq_ignore_ascii_case(&ext)
        });
        if !permitted {
            return Err(format!("file extension '.{ext}' not allowed"));
        }
    }

    Ok(())
}

fn check_constraints(param: &ParameterSpec, value: &Value) -> Result<(), String> {
    if let Some(number) = value.as_f64() {
        if let Some(min) = lookup(param, &["min", "minimum"]).and_then(Value::as_f64) {
            if number < min {
                return Err(format!("value {number} is below minimum {min}"));
            }
        }
        if let Some(max) = lookup(param, &["max", "maximum"]).and_then(Value::as_f64) {
            if number > max {
                return Err(format!("value {number} is above maximum {max}"));
            }
        }
    }

    if let Some(text) = value.as_str() {
        let len = text.chars().count() as u64;
        if let Some(min) = lookup(param, &["minLength", "min_length"]).and_then(Value::as_u64) {
            if len < min {
                return Err(format!("length {len} is shorter than {min}"));
            }
        }
        if let Some(max) = lookup(param, &["maxLength", "max_length"]).and_then(Value::as_u64) {
            if len > max {
                return Err(format!("length {len} is longer than {max}"));
            }
        }
        if let Some(pattern) = lookup(param, &["pattern"]).and_then(Value::as_str) {
            let re = regex::Regex::new(pattern).map_err(|e| format!("bad pattern: {e}"))?;
            if !re.is_match(text) {
                return Err(format!("value does not match pattern '{pattern}'"));
            }
        }
    }

    if let Some(items) = value.as_array() {
        let len = items.len() as u64;
        if let Some(min) = lookup(param, &["minItems", "min_items"]).and_then(Value::as_u64) {
            if len < min {
                return Err(format!("expected at least {min} items, got {len}"));
            }
        }
        if let Some(max) = lookup(param, &["maxItems", "max_items"]).and_then(Value::as_u64) {
            if len > max {
                return Err(format!("expected at most {max} items, got {len}"));
            }
        }
    }

    if let Some(options) = lookup(param, &["enum"]).and_then(Value::as_array) {
        if !options.iter().any(|option| values_equal(option, value)) {
            return Err(format!("value must be one of {}", Value::Array(options.clone())));
        }
    }

    Ok(())
}

fn lookup<'a>(param: &'a ParameterSpec, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| param.constraints.get(*key))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
