//! Block decoder — deserializes raw YAML text into a typed [`Block`].
//!
//! Deserializes raw YAML text into an intermediate, fully-optional
//! [`RawYamlBlock`] (unknown keys ignored, camelCase aliases accepted
//! alongside the canonical snake_case names), then classifies
//! and validates it into a typed [`Block`].

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::model::{
    Block, Body, ConfigBlock, ExpectDefinition, FileMockDefinition, Headers,
    InlineMockDefinition, Method, MockResponse, TestBlock, ValueExpectation,
};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Accepts either a bare scalar or a sequence of scalars, producing a
/// `Vec<String>`. An empty sequence yields an empty list.
fn deserialize_string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        One(String),
        Many(Vec<String>),
        None,
    }

    Ok(match Option::<Repr>::deserialize(deserializer)? {
        Some(Repr::One(s)) => vec![s],
        Some(Repr::Many(v)) => v,
        Some(Repr::None) | None => Vec::new(),
    })
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawMockResponse {
    status: Option<u16>,
    #[serde(default)]
    headers: HashMap<String, String>,
    body: Option<Value>,
    #[serde(alias = "contentType")]
    content_type: Option<String>,
    #[serde(alias = "delayMs")]
    delay_ms: Option<u64>,
    #[serde(default)]
    sequence: Vec<RawMockResponse>,
}

impl From<RawMockResponse> for MockResponse {
    fn from(raw: RawMockResponse) -> Self {
        MockResponse {
            status: raw.status,
            headers: Headers::from_map(raw.headers),
            body: raw.body.map(value_to_body),
            content_type: raw.content_type,
            delay_ms: raw.delay_ms,
            sequence: raw.sequence.into_iter().map(MockResponse::from).collect(),
        }
    }
}

fn value_to_body(v: Value) -> Body {
    match v {
        Value::String(s) => Body::Raw(s),
        other => Body::Structured(other),
    }
}

#[derive(Debug, Deserialize)]
struct RawFileMock {
    method: String,
    url: String,
    #[serde(flatten)]
    response: RawMockResponse,
}

#[derive(Debug, Deserialize)]
struct RawValueExpectation {
    key: String,
    op: String,
    value: Option<Value>,
    #[serde(alias = "storeAs")]
    store_as: Option<String>,
    #[serde(alias = "ignoreCase", default = "default_true")]
    ignore_case: bool,
}

#[derive(Debug, Deserialize, Default)]
struct RawExpect {
    status: Option<u16>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    values: Vec<RawValueExpectation>,
}

/// Fully-optional intermediate shape accepted for every fenced block,
/// covering both Config- and Test-only fields. Unknown keys are ignored by
/// default serde behaviour (no `deny_unknown_fields`).
#[derive(Debug, Deserialize, Default)]
struct RawYamlBlock {
    // Config-only
    #[serde(default, deserialize_with = "deserialize_string_or_list")]
    include: Vec<String>,
    #[serde(default)]
    variables: HashMap<String, Value>,
    #[serde(default)]
    mocks: Vec<RawFileMock>,
    #[serde(
        default,
        alias = "mocksFiles",
        deserialize_with = "deserialize_string_or_list"
    )]
    mocks_files: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_list")]
    dependencies: Vec<String>,

    // Test-only
    test: Option<String>,
    description: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    body: Option<Value>,
    #[serde(default)]
    extract: HashMap<String, String>,
    expect: Option<RawExpect>,
    #[serde(default, deserialize_with = "deserialize_string_or_list")]
    requires: Vec<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    retry: usize,
    timeout: Option<u64>,
    #[serde(default, alias = "mockOnly")]
    mock_only: bool,
    mock: Option<RawMockResponse>,

    // HTTP method shorthand keys
    get: Option<String>,
    post: Option<String>,
    put: Option<String>,
    patch: Option<String>,
    delete: Option<String>,
    head: Option<String>,
    options: Option<String>,
}

impl RawYamlBlock {
    fn method_and_url(&self) -> Result<Option<(Method, String)>, DecodeError> {
        let candidates = [
            (Method::Get, &self.get),
            (Method::Post, &self.post),
            (Method::Put, &self.put),
            (Method::Patch, &self.patch),
            (Method::Delete, &self.delete),
            (Method::Head, &self.head),
            (Method::Options, &self.options),
        ];
        let mut found: Vec<(Method, String)> = candidates
            .into_iter()
            .filter_map(|(m, url)| url.clone().map(|u| (m, u)))
            .collect();

        match found.len() {
            0 => Ok(None),
            1 => Ok(Some(found.remove(0))),
            _ => Err(DecodeError::Invalid(format!(
                "test declares multiple HTTP method keys: {}",
                found
                    .iter()
                    .map(|(m, _)| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

/// Decodes the verbatim YAML content of one fenced block into a typed
/// [`Block`], validating block invariants along the way.
pub fn decode(content: &str, _file: &Path) -> Result<Block, DecodeError> {
    let raw: RawYamlBlock = serde_yaml::from_str(content)?;
    let method_url = raw.method_and_url()?;

    let is_test = raw.test.as_deref().is_some_and(|s| !s.trim().is_empty());

    if !is_test {
        return Ok(Block::Config(ConfigBlock {
            include: raw.include,
            variables: raw.variables,
            mocks: raw
                .mocks
                .into_iter()
                .map(build_file_mock)
                .collect::<Result<_, _>>()?,
            mocks_files: raw.mocks_files,
            dependencies: raw.dependencies,
        }));
    }

    let name = raw.test.clone().unwrap();
    let mock = raw.mock.clone().map(MockResponse::from);

    if method_url.is_none() && !(raw.mock_only && mock.is_some()) {
        return Err(DecodeError::Invalid(format!(
            "test '{name}' must declare an HTTP method (or be mock_only with an inline mock and method+url)"
        )));
    }

    if raw.mock_only && mock.is_none() && method_url.is_none() {
        return Err(DecodeError::Invalid(format!(
            "test '{name}' is mock_only without an inline mock and must carry method+url to match file-level mocks"
        )));
    }

    let (method, url) = match method_url {
        Some((m, u)) => (Some(m), Some(u)),
        None => (None, None),
    };

    let expect = raw.expect.map(|e| ExpectDefinition {
        status: e.status,
        headers: Headers::from_map(e.headers),
        values: e
            .values
            .into_iter()
            .map(|v| ValueExpectation {
                key: v.key,
                op: normalize_op(&v.op),
                value: v.value,
                store_as: v.store_as,
                ignore_case: v.ignore_case,
            })
            .collect(),
    });

    Ok(Block::Test(TestBlock {
        name,
        method,
        url,
        description: raw.description,
        headers: Headers::from_map(raw.headers),
        body: raw.body.map(value_to_body),
        extract: raw.extract,
        expect,
        requires: raw.requires,
        disabled: raw.disabled,
        retry: raw.retry,
        timeout: raw.timeout,
        mock_only: raw.mock_only,
        mock,
    }))
}

fn build_file_mock(raw: RawFileMock) -> Result<FileMockDefinition, DecodeError> {
    let method = parse_method(&raw.method)?;
    Ok(FileMockDefinition {
        method,
        url: raw.url,
        response: MockResponse::from(raw.response),
    })
}

fn parse_method(s: &str) -> Result<Method, DecodeError> {
    match s.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::Get),
        "POST" => Ok(Method::Post),
        "PUT" => Ok(Method::Put),
        "PATCH" => Ok(Method::Patch),
        "DELETE" => Ok(Method::Delete),
        "HEAD" => Ok(Method::Head),
        "OPTIONS" => Ok(Method::Options),
        other => Err(DecodeError::Invalid(format!("unknown HTTP method '{other}'"))),
    }
}

/// Normalizes operator aliases: `eq, ne, gt, gte, lt, lte,
/// starts_with, ends_with` plus their long forms, left untouched otherwise
/// (`exists`/`not_exists`/`contains`/... pass through as-is).
pub fn normalize_op(op: &str) -> String {
    match op {
        "eq" => "equals",
        "ne" => "not_equals",
        "gt" => "greater_than",
        "gte" => "greater_than_or_equal",
        "lt" => "less_than",
        "lte" => "less_than_or_equal",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn p() -> PathBuf {
        PathBuf::from("t.resty")
    }

    #[test]
    fn decodes_config_block_with_scalar_dependency() {
        let yaml = "variables:\n  host: https://api.example.com\ndependencies: setup\n";
        let Block::Config(cfg) = decode(yaml, &p()).unwrap() else {
            panic!("expected config")
        };
        assert_eq!(cfg.dependencies, vec!["setup".to_string()]);
        assert_eq!(
            cfg.variables.get("host").unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn decodes_test_block_with_single_method() {
        let yaml = "test: login\npost: $host/api/login\nbody:\n  username: $username\n";
        let Block::Test(t) = decode(yaml, &p()).unwrap() else {
            panic!("expected test")
        };
        assert_eq!(t.name, "login");
        assert_eq!(t.method, Some(Method::Post));
        assert_eq!(t.url.as_deref(), Some("$host/api/login"));
        assert!(matches!(t.body, Some(Body::Structured(_))));
    }

    #[test]
    fn rejects_multiple_methods() {
        let yaml = "test: bad\nget: /a\npost: /b\n";
        let err = decode(yaml, &p()).unwrap_err();
        assert!(matches!(err, DecodeError::Invalid(_)));
    }

    #[test]
    fn mock_only_without_inline_requires_method_and_url() {
        let yaml = "test: only_mock\nmock_only: true\n";
        let err = decode(yaml, &p()).unwrap_err();
        assert!(matches!(err, DecodeError::Invalid(_)));
    }

    #[test]
    fn mock_only_with_inline_mock_needs_no_method() {
        let yaml = "test: only_mock\nmock_only: true\nmock:\n  status: 200\n  body: { ok: true }\n";
        let Block::Test(t) = decode(yaml, &p()).unwrap() else {
            panic!("expected test")
        };
        assert!(t.method.is_none());
        assert!(t.mock.is_some());
    }

    #[test]
    fn requires_accepts_sequence() {
        let yaml = "test: t\nget: /x\nrequires:\n  - a\n  - b\n";
        let Block::Test(t) = decode(yaml, &p()).unwrap() else {
            panic!("expected test")
        };
        assert_eq!(t.requires, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn normalizes_operator_aliases() {
        assert_eq!(normalize_op("eq"), "equals");
        assert_eq!(normalize_op("starts_with"), "starts_with");
        assert_eq!(normalize_op("exists"), "exists");
    }
}
