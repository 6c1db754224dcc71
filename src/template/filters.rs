//! Built-in filters (`value | name(args)`) and tests (`value is name(args)`).

use super::TemplateError;
use super::eval::{display, float_value, is_truthy, type_name, values_equal};
use regex::Regex;
use serde_json::Value;

pub fn apply_filter(name: &str, value: Value, args: &[Value]) -> Result<Value, TemplateError> {
    match name {
        "lower" => Ok(Value::String(display(&value).to_lowercase())),
        "upper" => Ok(Value::String(display(&value).to_uppercase())),
        "capitalize" => Ok(Value::String(capitalize(&display(&value)))),
        "trim" => Ok(Value::String(display(&value).trim().to_string())),
        "string" => Ok(Value::String(display(&value))),
        "length" | "count" => length(&value),
        "int" => Ok(to_int(&value).map(Value::from).unwrap_or_else(|| {
            args.first().cloned().unwrap_or_else(|| Value::from(0))
        })),
        "float" => Ok(to_float(&value)
            .map(float_value)
            .unwrap_or_else(|| args.first().cloned().unwrap_or_else(|| float_value(0.0)))),
        "bool" => Ok(Value::Bool(to_bool(&value))),
        "replace" => {
            let (old, new) = two_string_args(name, args)?;
            Ok(Value::String(display(&value).replace(&old, &new)))
        }
        "split" => {
            let s = display(&value);
            let parts: Vec<Value> = match args.first() {
                Some(sep) => s
                    .split(display(sep).as_str())
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
                None => s
                    .split_whitespace()
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
            };
            Ok(Value::Array(parts))
        }
        "join" => {
            let sep = args.first().map(display).unwrap_or_default();
            match &value {
                Value::Array(items) => Ok(Value::String(
                    items.iter().map(display).collect::<Vec<_>>().join(&sep),
                )),
                other => Ok(Value::String(display(other))),
            }
        }
        "first" => Ok(edge_item(&value, true)),
        "last" => Ok(edge_item(&value, false)),
        "regex_replace" => {
            let (pattern, replacement) = two_string_args(name, args)?;
            let re = compile(&pattern)?;
            let replacement = python_replacement(&replacement);
            Ok(Value::String(
                re.replace_all(&display(&value), replacement.as_str())
                    .into_owned(),
            ))
        }
        "regex_search" => {
            let pattern = one_string_arg(name, args)?;
            let re = compile(&pattern)?;
            Ok(re
                .find(&display(&value))
                .map(|m| Value::String(m.as_str().to_string()))
                .unwrap_or(Value::Null))
        }
        _ => Err(TemplateError::UnknownFilter(name.to_string())),
    }
}

pub fn apply_test(name: &str, value: &Value, args: &[Value]) -> Result<bool, TemplateError> {
    match name {
        "none" => Ok(value.is_null()),
        "string" => Ok(value.is_string()),
        "number" => Ok(value.is_number()),
        "boolean" => Ok(value.is_boolean()),
        "mapping" => Ok(value.is_object()),
        "sequence" | "iterable" => Ok(value.is_array() || value.is_string()),
        "truthy" => Ok(is_truthy(value)),
        "falsy" => Ok(!is_truthy(value)),
        "eq" | "equalto" => Ok(args.first().is_some_and(|other| values_equal(value, other))),
        "match" => {
            let pattern = one_string_arg(name, args)?;
            let re = compile(&format!("^(?:{})", pattern))?;
            Ok(re.is_match(&display(value)))
        }
        "search" => {
            let pattern = one_string_arg(name, args)?;
            Ok(compile(&pattern)?.is_match(&display(value)))
        }
        _ => Err(TemplateError::UnknownTest(name.to_string())),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn length(value: &Value) -> Result<Value, TemplateError> {
    let len = match value {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        other => {
            return Err(TemplateError::invalid(format!(
                "object of type '{}' has no len()",
                type_name(other)
            )));
        }
    };
    Ok(Value::from(len))
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Ansible's `bool` filter: yes/on/1/true are true, everything else false.
fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "yes" | "on" | "1" | "true" | "y" | "t"
        ),
        _ => false,
    }
}

fn edge_item(value: &Value, first: bool) -> Value {
    match value {
        Value::Array(items) => {
            let item = if first { items.first() } else { items.last() };
            item.cloned().unwrap_or(Value::Null)
        }
        Value::String(s) => {
            let c = if first { s.chars().next() } else { s.chars().last() };
            c.map(|c| Value::String(c.to_string())).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

fn one_string_arg(filter: &str, args: &[Value]) -> Result<String, TemplateError> {
    args.first().map(display).ok_or_else(|| {
        TemplateError::invalid(format!("{} requires one argument", filter))
    })
}

fn two_string_args(filter: &str, args: &[Value]) -> Result<(String, String), TemplateError> {
    match args {
        [a, b, ..] => Ok((display(a), display(b))),
        _ => Err(TemplateError::invalid(format!(
            "{} requires two arguments",
            filter
        ))),
    }
}

fn compile(pattern: &str) -> Result<Regex, TemplateError> {
    Regex::new(pattern).map_err(|e| TemplateError::invalid(format!("invalid regex: {}", e)))
}

/// Translate Python back-references (`\1`) into the regex crate's `${1}`.
fn python_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek().is_some_and(|n| n.is_ascii_digit()) => {
                let mut group = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    group.push(d);
                    chars.next();
                }
                out.push_str(&format!("${{{}}}", group));
            }
            '$' => out.push_str("$$"),
            other => out.push(other),
        }
    }
    out
}
