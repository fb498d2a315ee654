//! Expectation evaluator.
//!
//! Validates a response against an [`ExpectDefinition`] in the fixed order
//! status → headers → values, short-circuiting headers/values
//! when the status check fails. `store_as` captures accumulate into the
//! returned [`EvaluationOutcome`] for the caller to merge into the variable
//! store's captured layer, ahead of extractor captures.

use std::collections::HashMap;

use chrono::DateTime;
use serde_json::Value;

use crate::block::{ExpectDefinition, Headers};
use crate::jsonpath;
use crate::vars::VariableStore;

#[derive(Debug, Default)]
pub struct EvaluationOutcome {
    pub status_ok: bool,
    pub header_mismatches: Vec<String>,
    pub value_mismatches: Vec<String>,
    pub captured: HashMap<String, Value>,
}

impl EvaluationOutcome {
    pub fn passed(&self) -> bool {
        self.status_ok && self.header_mismatches.is_empty() && self.value_mismatches.is_empty()
    }
}

/// Evaluates `expect` (absent means "any 2xx, no further checks") against the
/// actual response.
pub fn evaluate(
    expect: Option<&ExpectDefinition>,
    status: u16,
    response_headers: &Headers,
    body: &Value,
    vars: &VariableStore,
) -> EvaluationOutcome {
    let mut outcome = EvaluationOutcome::default();

    let Some(expect) = expect else {
        outcome.status_ok = (200..300).contains(&status);
        return outcome;
    };

    outcome.status_ok = match expect.status {
        Some(expected) => status == expected,
        None => (200..300).contains(&status),
    };
    if !outcome.status_ok {
        return outcome;
    }

    evaluate_headers(&expect.headers, response_headers, vars, &mut outcome);
    evaluate_values(&expect.values, body, vars, &mut outcome);

    outcome
}

fn evaluate_headers(
    expected: &Headers,
    actual: &Headers,
    vars: &VariableStore,
    outcome: &mut EvaluationOutcome,
) {
    for (name, expected_value) in expected.iter() {
        let resolved_expected = match vars.resolve(expected_value) {
            Ok(v) => v,
            Err(e) => {
                outcome.header_mismatches.push(format!("{name}: {e}"));
                continue;
            }
        };
        match actual.get(name) {
            Some(actual_value) if actual_value.trim() == resolved_expected.trim() => {}
            Some(actual_value) => outcome.header_mismatches.push(format!(
                "{name}: expected '{}', got '{}'",
                resolved_expected.trim(),
                actual_value.trim()
            )),
            None => outcome
                .header_mismatches
                .push(format!("{name}: header not present")),
        }
    }
}

fn evaluate_values(
    rules: &[crate::block::ValueExpectation],
    body: &Value,
    vars: &VariableStore,
    outcome: &mut EvaluationOutcome,
) {
    for rule in rules {
        let tokens = match jsonpath::evaluate(body, &rule.key) {
            Ok(t) => t,
            Err(e) => {
                outcome
                    .value_mismatches
                    .push(format!("{}: {e}", rule.key));
                continue;
            }
        };

        if rule.op == "exists" {
            if tokens.is_empty() {
                outcome
                    .value_mismatches
                    .push(format!("{}: expected to exist", rule.key));
            }
            continue;
        }
        if rule.op == "not_exists" {
            if !tokens.is_empty() {
                outcome
                    .value_mismatches
                    .push(format!("{}: expected not to exist", rule.key));
            }
            continue;
        }

        let expected = match resolve_expected(rule.value.as_ref(), vars) {
            Ok(v) => v,
            Err(e) => {
                outcome
                    .value_mismatches
                    .push(format!("{}: {e}", rule.key));
                continue;
            }
        };

        let matched = tokens
            .iter()
            .any(|token| compare(token, expected.as_ref(), &rule.op, rule.ignore_case));

        if !matched {
            outcome.value_mismatches.push(format!(
                "{}: operator '{}' against {:?} failed (tokens: {:?})",
                rule.key, rule.op, expected, tokens
            ));
            continue;
        }

        if let Some(store_as) = &rule.store_as {
            if let Some(first) = tokens.first() {
                outcome.captured.insert(store_as.clone(), first.clone());
            }
        }
    }
}

fn resolve_expected(
    value: Option<&Value>,
    vars: &VariableStore,
) -> Result<Option<Value>, crate::vars::VariableError> {
    match value {
        None => Ok(None),
        Some(v) => Ok(Some(vars.resolve_deep(v)?)),
    }
}

fn compare(actual: &Value, expected: Option<&Value>, op: &str, ignore_case: bool) -> bool {
    match op {
        "equals" => values_equal(actual, expected, ignore_case),
        "not_equals" => !values_equal(actual, expected, ignore_case),
        "contains" => string_of(actual)
            .zip(expected.and_then(string_of))
            .map(|(a, e)| contains_with_case(&a, &e, ignore_case))
            .unwrap_or(false),
        "starts_with" => string_of(actual)
            .zip(expected.and_then(string_of))
            .map(|(a, e)| starts_with_case(&a, &e, ignore_case))
            .unwrap_or(false),
        "ends_with" => string_of(actual)
            .zip(expected.and_then(string_of))
            .map(|(a, e)| ends_with_case(&a, &e, ignore_case))
            .unwrap_or(false),
        "greater_than" => relational(actual, expected, |a, b| a > b, |a, b| a > b),
        "greater_than_or_equal" => relational(actual, expected, |a, b| a >= b, |a, b| a >= b),
        "less_than" => relational(actual, expected, |a, b| a < b, |a, b| a < b),
        "less_than_or_equal" => relational(actual, expected, |a, b| a <= b, |a, b| a <= b),
        _ => false,
    }
}

fn values_equal(actual: &Value, expected: Option<&Value>, ignore_case: bool) -> bool {
    let Some(expected) = expected else { return false };

    if let Value::String(s) = expected {
        if s == "$null" {
            return actual.is_null();
        }
        if s == "$empty" {
            return matches!(actual, Value::String(a) if a.is_empty());
        }
    }

    if let (Some(a), Some(e)) = (string_of(actual), string_of(expected)) {
        return if ignore_case {
            a.eq_ignore_ascii_case(&e)
        } else {
            a == e
        };
    }

    actual == expected
}

fn contains_with_case(a: &str, needle: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a.to_lowercase().contains(&needle.to_lowercase())
    } else {
        a.contains(needle)
    }
}

fn starts_with_case(a: &str, prefix: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a.to_lowercase().starts_with(&prefix.to_lowercase())
    } else {
        a.starts_with(prefix)
    }
}

fn ends_with_case(a: &str, suffix: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a.to_lowercase().ends_with(&suffix.to_lowercase())
    } else {
        a.ends_with(suffix)
    }
}

/// Relational fallback chain: date-vs-date, then numeric, else fail.
fn relational(
    actual: &Value,
    expected: Option<&Value>,
    date_cmp: impl Fn(DateTime<chrono::FixedOffset>, DateTime<chrono::FixedOffset>) -> bool,
    num_cmp: impl Fn(f64, f64) -> bool,
) -> bool {
    let Some(expected) = expected else { return false };

    if let (Some(a), Some(e)) = (string_of(actual), string_of(expected)) {
        if let (Ok(da), Ok(de)) = (DateTime::parse_from_rfc3339(&a), DateTime::parse_from_rfc3339(&e)) {
            return date_cmp(da, de);
        }
    }

    if let (Some(a), Some(e)) = (numeric_of(actual), numeric_of(expected)) {
        return num_cmp(a, e);
    }

    false
}

fn string_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn numeric_of(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::ValueExpectation;
    use serde_json::json;

    fn rule(key: &str, op: &str, value: Option<Value>) -> ValueExpectation {
        ValueExpectation {
            key: key.to_string(),
            op: op.to_string(),
            value,
            store_as: None,
            ignore_case: true,
        }
    }

    #[test]
    fn status_mismatch_short_circuits_headers_and_values() {
        let expect = ExpectDefinition {
            status: Some(200),
            headers: Headers::default(),
            values: vec![rule("$.id", "equals", Some(json!(1)))],
        };
        let body = json!({"id": 1});
        let outcome = evaluate(
            Some(&expect),
            404,
            &Headers::default(),
            &body,
            &VariableStore::new(),
        );
        assert!(!outcome.status_ok);
        assert!(outcome.value_mismatches.is_empty());
    }

    #[test]
    fn equals_matches_and_captures_store_as() {
        let mut r = rule("$.id", "equals", Some(json!(123)));
        r.store_as = Some("user_id".to_string());
        let expect = ExpectDefinition {
            status: None,
            headers: Headers::default(),
            values: vec![r],
        };
        let body = json!({"id": 123});
        let outcome = evaluate(
            Some(&expect),
            200,
            &Headers::default(),
            &body,
            &VariableStore::new(),
        );
        assert!(outcome.passed());
        assert_eq!(outcome.captured.get("user_id").unwrap(), &json!(123));
    }

    #[test]
    fn null_keyword_matches_json_null() {
        let r = rule("$.missing_field", "equals", Some(json!("$null")));
        let body = json!({});
        let tokens = jsonpath::evaluate(&body, "$.missing_field").unwrap();
        assert!(tokens.is_empty() || tokens[0].is_null());
        let _ = r;
    }

    #[test]
    fn greater_than_falls_back_to_numeric_comparison() {
        let r = rule("$.count", "greater_than", Some(json!("5")));
        let expect = ExpectDefinition {
            status: None,
            headers: Headers::default(),
            values: vec![r],
        };
        let body = json!({"count": "10"});
        let outcome = evaluate(
            Some(&expect),
            200,
            &Headers::default(),
            &body,
            &VariableStore::new(),
        );
        assert!(outcome.passed());
    }

    #[test]
    fn missing_header_is_reported() {
        let mut expected_headers = Headers::default();
        expected_headers.0.push(("X-Trace".to_string(), "abc".to_string()));
        let expect = ExpectDefinition {
            status: None,
            headers: expected_headers,
            values: vec![],
        };
        let outcome = evaluate(
            Some(&expect),
            200,
            &Headers::default(),
            &json!({}),
            &VariableStore::new(),
        );
        assert!(!outcome.passed());
        assert_eq!(outcome.header_mismatches.len(), 1);
    }
}
