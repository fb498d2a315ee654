//! JSONPath evaluation.
//!
//! A `KEY` string is split into a base path and a right-to-left chain of
//! postfix zero-argument function calls matching `\.(\w+)\(\)$`.
//! The base path is handed to [`jsonpath::Selector`] — the same crate
//! `mockforge-core`'s condition evaluator uses for "does this path select
//! something" — and the resulting token list is folded left to right through
//! the function chain.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonPathError {
    #[error("invalid JSONPath expression '{0}'")]
    InvalidPath(String),
}

fn trailing_call_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.(\w+)\(\)$").unwrap())
}

/// Splits `key` into `(base_path, function_chain)`, the chain read in the
/// order the calls appear (left to right in the source, which is also
/// application order, folded left to right over the token list after
/// being peeled off right to left).
fn split_key(key: &str) -> (String, Vec<String>) {
    let mut remainder = key.to_string();
    let mut reversed_chain = Vec::new();

    while let Some(caps) = trailing_call_pattern().captures(&remainder) {
        let name = caps[1].to_string();
        let matched_len = caps.get(0).unwrap().len();
        remainder.truncate(remainder.len() - matched_len);
        reversed_chain.push(name);
    }

    reversed_chain.reverse();
    (remainder, reversed_chain)
}

/// Evaluates `key` against `root`, returning the token list produced after
/// the base path selection and the full function chain fold.
pub fn evaluate(root: &Value, key: &str) -> Result<Vec<Value>, JsonPathError> {
    let (base_path, chain) = split_key(key);

    let selector =
        jsonpath::Selector::new(&base_path).map_err(|_| JsonPathError::InvalidPath(base_path.clone()))?;
    let mut tokens: Vec<Value> = selector.find(root).cloned().collect();

    for func in &chain {
        tokens = apply(func, tokens);
    }

    Ok(tokens)
}

fn apply(func: &str, tokens: Vec<Value>) -> Vec<Value> {
    match func {
        "length" | "count" | "size" => vec![Value::from(length_of(&tokens))],
        "empty" => vec![Value::Bool(is_empty(&tokens))],
        "type" => vec![Value::String(type_of(&tokens))],
        "sum" => vec![Value::from(aggregate(&tokens, Aggregate::Sum))],
        "avg" => vec![Value::from(aggregate(&tokens, Aggregate::Avg))],
        "min" => vec![Value::from(aggregate(&tokens, Aggregate::Min))],
        "max" => vec![Value::from(aggregate(&tokens, Aggregate::Max))],
        "distinct" => distinct(tokens),
        "keys" => object_keys(&tokens),
        "values" => object_values(&tokens),
        "to_number" => map_scalar_or_array(tokens, &to_number),
        "to_string" => map_scalar_or_array(tokens, &to_string_value),
        "to_boolean" => map_scalar_or_array(tokens, &to_boolean),
        "trim" => map_scalar_or_array(tokens, &|v| string_transform(v, |s| s.trim().to_string())),
        "lower" => map_scalar_or_array(tokens, &|v| string_transform(v, |s| s.to_lowercase())),
        "upper" => map_scalar_or_array(tokens, &|v| string_transform(v, |s| s.to_uppercase())),
        // Unknown function names pass through unaltered.
        _ => tokens,
    }
}

/// `length`/`count`/`size` treat the base-path result as one logical value
/// at this stage: an array token counts its elements, a string its
/// characters, everything else is 0.
fn length_of(tokens: &[Value]) -> i64 {
    match tokens.first() {
        Some(Value::Array(items)) => items.len() as i64,
        Some(Value::String(s)) => s.chars().count() as i64,
        Some(Value::Object(map)) => map.len() as i64,
        Some(Value::Null) | None => 0,
        Some(_) => 0,
    }
}

fn is_empty(tokens: &[Value]) -> bool {
    match tokens.first() {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

fn type_of(tokens: &[Value]) -> String {
    match tokens.first() {
        None | Some(Value::Null) => "null",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(s)) => {
            let lower = s.to_ascii_lowercase();
            if lower == "true" || lower == "false" {
                return "boolean".to_string();
            }
            if lower == "null" {
                return "null".to_string();
            }
            if s.parse::<f64>().is_ok() {
                return "number".to_string();
            }
            if chrono::DateTime::parse_from_rfc3339(s).is_ok() {
                return "date".to_string();
            }
            "string"
        }
    }
    .to_string()
}

enum Aggregate {
    Sum,
    Avg,
    Min,
    Max,
}

fn aggregate(tokens: &[Value], kind: Aggregate) -> f64 {
    let items = match tokens.first() {
        Some(Value::Array(items)) => items,
        _ => return 0.0,
    };
    let numbers: Vec<f64> = items.iter().filter_map(numeric_value).collect();
    if numbers.is_empty() {
        return 0.0;
    }
    match kind {
        Aggregate::Sum => numbers.iter().sum(),
        Aggregate::Avg => numbers.iter().sum::<f64>() / numbers.len() as f64,
        Aggregate::Min => numbers.iter().cloned().fold(f64::INFINITY, f64::min),
        Aggregate::Max => numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    }
}

fn numeric_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn distinct(tokens: Vec<Value>) -> Vec<Value> {
    let Some(Value::Array(items)) = tokens.into_iter().next() else {
        return Vec::new();
    };
    let mut seen: Vec<Value> = Vec::new();
    let mut out = Vec::new();
    for item in items {
        if !seen.contains(&item) {
            seen.push(item.clone());
            out.push(item);
        }
    }
    vec![Value::Array(out)]
}

fn object_keys(tokens: &[Value]) -> Vec<Value> {
    match tokens.first() {
        Some(Value::Object(map)) => vec![Value::Array(
            map.keys().map(|k| Value::String(k.clone())).collect(),
        )],
        _ => vec![Value::Array(Vec::new())],
    }
}

fn object_values(tokens: &[Value]) -> Vec<Value> {
    match tokens.first() {
        Some(Value::Object(map)) => vec![Value::Array(map.values().cloned().collect())],
        _ => vec![Value::Array(Vec::new())],
    }
}

/// Applies a scalar coercion element-wise: a single array-valued token is
/// coerced member-by-member (producing one array token back); anything else
/// (including a multi-token selection from the base path) is coerced token by
/// token.
fn map_scalar_or_array(tokens: Vec<Value>, f: &dyn Fn(&Value) -> Value) -> Vec<Value> {
    if let [Value::Array(items)] = tokens.as_slice() {
        return vec![Value::Array(items.iter().map(f).collect())];
    }
    tokens.iter().map(f).collect()
}

fn to_number(v: &Value) -> Value {
    match v {
        Value::Number(_) => v.clone(),
        Value::Null => Value::from(0),
        Value::Bool(b) => Value::from(if *b { 1 } else { 0 }),
        Value::String(s) => match s.parse::<f64>() {
            Ok(n) => serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::from(f64::NAN.to_string())),
            Err(_) => Value::String("NaN".to_string()),
        },
        _ => Value::String("NaN".to_string()),
    }
}

fn to_string_value(v: &Value) -> Value {
    match v {
        Value::String(s) => Value::String(s.clone()),
        Value::Null => Value::String(String::new()),
        other => Value::String(other.to_string()),
    }
}

fn to_boolean(v: &Value) -> Value {
    match v {
        Value::Bool(b) => Value::Bool(*b),
        Value::String(s) => Value::Bool(s.eq_ignore_ascii_case("true")),
        Value::Number(n) => Value::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        Value::Null => Value::Bool(false),
        _ => Value::Bool(false),
    }
}

fn string_transform(v: &Value, f: impl Fn(&str) -> String) -> Value {
    match v {
        Value::String(s) => Value::String(f(s)),
        other => other.clone(),
    }
}
