//! Expression evaluation over JSON host variables.
//!
//! Semantics follow Jinja as used by Ansible's constructed inventory:
//! Python truthiness, `and`/`or` returning operands, undefined variables
//! raising unless guarded by `is defined` or `default`.

use super::TemplateError;
use super::ast::{BinaryOp, Expr};
use super::filters;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// Upper bound for strings built by `str * n`.
pub const MAX_STRING_LEN: usize = 1 << 20;

/// Evaluate `expr` against the given variables.
pub fn evaluate(expr: &Expr, vars: &Map<String, Value>) -> Result<Value, TemplateError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Variable(name) => vars
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::Undefined(name.clone())),
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, vars))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Dict(pairs) => {
            let mut map = Map::new();
            for (k, v) in pairs {
                let key = display(&evaluate(k, vars)?);
                map.insert(key, evaluate(v, vars)?);
            }
            Ok(Value::Object(map))
        }
        Expr::Attribute { target, name } => {
            let target = evaluate(target, vars)?;
            lookup_attribute(&target, name)
        }
        Expr::Index { target, index } => {
            let target = evaluate(target, vars)?;
            let index = evaluate(index, vars)?;
            lookup_index(&target, &index)
        }
        Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&evaluate(inner, vars)?))),
        Expr::Negate(inner) => negate(evaluate(inner, vars)?),
        Expr::Binary { op, left, right } => evaluate_binary(*op, left, right, vars),
        Expr::Filter { target, name, args } => evaluate_filter(target, name, args, vars),
        Expr::Test {
            target,
            name,
            args,
            negated,
        } => {
            let result = evaluate_test(target, name, args, vars)?;
            Ok(Value::Bool(result != *negated))
        }
        Expr::Conditional {
            then,
            condition,
            otherwise,
        } => {
            if is_truthy(&evaluate(condition, vars)?) {
                evaluate(then, vars)
            } else {
                match otherwise {
                    Some(e) => evaluate(e, vars),
                    None => Ok(Value::Null),
                }
            }
        }
    }
}

/// Python truthiness.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Render a value the way Python's `str()` would for scalars.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn lookup_attribute(target: &Value, name: &str) -> Result<Value, TemplateError> {
    match target {
        Value::Object(map) => map
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::Undefined(name.to_string())),
        _ => Err(TemplateError::Undefined(format!(
            "{}.{}",
            type_name(target),
            name
        ))),
    }
}

fn lookup_index(target: &Value, index: &Value) -> Result<Value, TemplateError> {
    match (target, index) {
        (Value::Object(map), key) => {
            let key = display(key);
            map.get(&key)
                .cloned()
                .ok_or(TemplateError::Undefined(key))
        }
        (Value::Array(items), Value::Number(n)) => n
            .as_i64()
            .and_then(|i| resolve_position(i, items.len()))
            .map(|i| items[i].clone())
            .ok_or_else(|| TemplateError::Undefined(format!("list[{}]", n))),
        (Value::String(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            n.as_i64()
                .and_then(|i| resolve_position(i, chars.len()))
                .map(|i| Value::String(chars[i].to_string()))
                .ok_or_else(|| TemplateError::Undefined(format!("str[{}]", n)))
        }
        _ => Err(TemplateError::invalid(format!(
            "'{}' object is not subscriptable by {}",
            type_name(target),
            type_name(index)
        ))),
    }
}

/// Python-style index resolution (negative indexes count from the end).
fn resolve_position(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let pos = if index < 0 { len + index } else { index };
    (0..len).contains(&pos).then_some(pos as usize)
}

fn negate(value: Value) -> Result<Value, TemplateError> {
    match &value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(-i))
            } else {
                Ok(float_value(-n.as_f64().unwrap_or_default()))
            }
        }
        _ => Err(TemplateError::invalid(format!(
            "bad operand type for unary -: '{}'",
            type_name(&value)
        ))),
    }
}

fn evaluate_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    vars: &Map<String, Value>,
) -> Result<Value, TemplateError> {
    // Short-circuit operators return the deciding operand.
    match op {
        BinaryOp::And => {
            let l = evaluate(left, vars)?;
            return if is_truthy(&l) {
                evaluate(right, vars)
            } else {
                Ok(l)
            };
        }
        BinaryOp::Or => {
            let l = evaluate(left, vars)?;
            return if is_truthy(&l) {
                Ok(l)
            } else {
                evaluate(right, vars)
            };
        }
        _ => {}
    }

    let l = evaluate(left, vars)?;
    let r = evaluate(right, vars)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinaryOp::Lt => compare(op, &l, &r).map(|o| Value::Bool(o == Ordering::Less)),
        BinaryOp::Le => compare(op, &l, &r).map(|o| Value::Bool(o != Ordering::Greater)),
        BinaryOp::Gt => compare(op, &l, &r).map(|o| Value::Bool(o == Ordering::Greater)),
        BinaryOp::Ge => compare(op, &l, &r).map(|o| Value::Bool(o != Ordering::Less)),
        BinaryOp::In => contains(&r, &l).map(Value::Bool),
        BinaryOp::NotIn => contains(&r, &l).map(|found| Value::Bool(!found)),
        BinaryOp::Concat => Ok(Value::String(format!("{}{}", display(&l), display(&r)))),
        BinaryOp::Add => add(&l, &r),
        BinaryOp::Mul => multiply(&l, &r),
        BinaryOp::Sub | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod => {
            arithmetic(op, &l, &r)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

/// Equality that treats `1` and `1.0` as equal.
pub(crate) fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => l == r,
    }
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> Result<Ordering, TemplateError> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                return Ok(x.cmp(&y));
            }
            a.as_f64()
                .zip(b.as_f64())
                .and_then(|(x, y)| x.partial_cmp(&y))
                .ok_or_else(|| mismatch(op, l, r))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(mismatch(op, l, r)),
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, TemplateError> {
    match container {
        Value::String(haystack) => match item {
            Value::String(needle) => Ok(haystack.contains(needle.as_str())),
            _ => Err(TemplateError::invalid(format!(
                "'in <string>' requires string as left operand, not {}",
                type_name(item)
            ))),
        },
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Object(map) => Ok(map.contains_key(&display(item))),
        _ => Err(TemplateError::invalid(format!(
            "argument of type '{}' is not iterable",
            type_name(container)
        ))),
    }
}

fn add(l: &Value, r: &Value) -> Result<Value, TemplateError> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                if let Some(sum) = x.checked_add(y) {
                    return Ok(Value::from(sum));
                }
            }
            Ok(float_value(a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default()))
        }
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::Array(a), Value::Array(b)) => {
            Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => Err(mismatch(BinaryOp::Add, l, r)),
    }
}

fn multiply(l: &Value, r: &Value) -> Result<Value, TemplateError> {
    match (l, r) {
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            let times = n.as_i64().ok_or_else(|| mismatch(BinaryOp::Mul, l, r))?;
            let times = usize::try_from(times.max(0)).unwrap_or(usize::MAX);
            match s.len().checked_mul(times) {
                Some(len) if len <= MAX_STRING_LEN => Ok(Value::String(s.repeat(times))),
                _ => Err(TemplateError::invalid(format!(
                    "repeated string would exceed {} bytes",
                    MAX_STRING_LEN
                ))),
            }
        }
        _ => arithmetic(BinaryOp::Mul, l, r),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, TemplateError> {
    let (Value::Number(a), Value::Number(b)) = (l, r) else {
        return Err(mismatch(op, l, r));
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::FloorDiv if y == 0 => return Err(TemplateError::DivisionByZero),
            BinaryOp::FloorDiv => {
                let q = x / y;
                Some(if x % y != 0 && ((x < 0) != (y < 0)) { q - 1 } else { q })
            }
            BinaryOp::Mod if y == 0 => return Err(TemplateError::DivisionByZero),
            BinaryOp::Mod => Some(((x % y) + y) % y),
            _ => None,
        };
        if let Some(v) = result {
            return Ok(Value::from(v));
        }
    }

    let x = a.as_f64().unwrap_or_default();
    let y = b.as_f64().unwrap_or_default();
    let result = match op {
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if y == 0.0 => {
            return Err(TemplateError::DivisionByZero);
        }
        BinaryOp::Div => x / y,
        BinaryOp::FloorDiv => (x / y).floor(),
        BinaryOp::Mod => x - y * (x / y).floor(),
        _ => return Err(mismatch(op, l, r)),
    };
    Ok(float_value(result))
}

pub(crate) fn float_value(f: f64) -> Value {
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn mismatch(op: BinaryOp, l: &Value, r: &Value) -> TemplateError {
    TemplateError::TypeMismatch {
        op: op.symbol(),
        left: type_name(l),
        right: type_name(r),
    }
}

fn evaluate_filter(
    target: &Expr,
    name: &str,
    args: &[Expr],
    vars: &Map<String, Value>,
) -> Result<Value, TemplateError> {
    let args = args
        .iter()
        .map(|a| evaluate(a, vars))
        .collect::<Result<Vec<_>, _>>()?;

    // `default` is the only filter that accepts an undefined input.
    if name == "default" || name == "d" {
        let fallback = args
            .first()
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));
        let falsy_counts = args.get(1).is_some_and(is_truthy);
        return match evaluate(target, vars) {
            Err(TemplateError::Undefined(_)) => Ok(fallback),
            Ok(v) if falsy_counts && !is_truthy(&v) => Ok(fallback),
            other => other,
        };
    }

    let value = evaluate(target, vars)?;
    filters::apply_filter(name, value, &args)
}

fn evaluate_test(
    target: &Expr,
    name: &str,
    args: &[Expr],
    vars: &Map<String, Value>,
) -> Result<bool, TemplateError> {
    match name {
        "defined" | "undefined" => {
            let defined = match evaluate(target, vars) {
                Ok(_) => true,
                Err(TemplateError::Undefined(_)) => false,
                Err(e) => return Err(e),
            };
            Ok(defined == (name == "defined"))
        }
        _ => {
            let value = evaluate(target, vars)?;
            let args = args
                .iter()
                .map(|a| evaluate(a, vars))
                .collect::<Result<Vec<_>, _>>()?;
            filters::apply_test(name, &value, &args)
        }
    }
}
