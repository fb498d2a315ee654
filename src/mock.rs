//! Mock engine.
//!
//! Inline mocks always win; otherwise file-level (`Config.mocks`) and
//! external-file mocks merge with external entries first, inline-in-file
//! entries last, scanned from last to first so the last definition for a
//! given `(method, url)` wins. Sequence counters are keyed by
//! `(source_file, test_name, "inline")` for inline mocks and by
//! `(METHOD, resolved_url)` for file/external mocks, and are
//! sticky-last once a sequence is exhausted.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::block::{Body, FileMockDefinition, Headers, Method, MockResponse};
use crate::vars::{VariableError, VariableStore};

#[derive(Debug, Error)]
pub enum MockError {
    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error("failed to read external mock file '{path}': {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse external mock file '{path}': {source}")]
    Json {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A fully resolved, ready-to-serve mock response.
#[derive(Debug, Clone)]
pub struct MockResult {
    pub status: u16,
    pub headers: Headers,
    pub body: Option<String>,
    pub delay_ms: Option<u64>,
}

/// Intermediate shape for `.json` external mock files.
#[derive(Debug, Deserialize)]
struct ExternalMockEntry {
    method: String,
    url: String,
    status: Option<u16>,
    #[serde(default)]
    headers: HashMap<String, String>,
    body: Option<Value>,
    content_type: Option<String>,
    delay_ms: Option<u64>,
    #[serde(default)]
    sequence: Vec<ExternalSequenceEntry>,
}

#[derive(Debug, Deserialize)]
struct ExternalSequenceEntry {
    status: Option<u16>,
    #[serde(default)]
    headers: HashMap<String, String>,
    body: Option<Value>,
    content_type: Option<String>,
    delay_ms: Option<u64>,
}

/// Loads and parses one external `.json` mock file, relative to `base_dir`.
pub fn load_external_file(
    path: &str,
    base_dir: &Path,
) -> Result<Vec<FileMockDefinition>, MockError> {
    let resolved = if Path::new(path).is_absolute() {
        Path::new(path).to_path_buf()
    } else {
        base_dir.join(path)
    };

    let content = std::fs::read_to_string(&resolved).map_err(|e| MockError::Io {
        path: resolved.clone(),
        source: e,
    })?;
    let entries: Vec<ExternalMockEntry> =
        serde_json::from_str(&content).map_err(|e| MockError::Json {
            path: resolved.clone(),
            source: e,
        })?;

    entries
        .into_iter()
        .map(|e| {
            let method = parse_method(&e.method)?;
            Ok(FileMockDefinition {
                method,
                url: e.url,
                response: MockResponse {
                    status: e.status,
                    headers: Headers::from_map(e.headers),
                    body: e.body.map(value_to_body),
                    content_type: e.content_type,
                    delay_ms: e.delay_ms,
                    sequence: e
                        .sequence
                        .into_iter()
                        .map(|s| MockResponse {
                            status: s.status,
                            headers: Headers::from_map(s.headers),
                            body: s.body.map(value_to_body),
                            content_type: s.content_type,
                            delay_ms: s.delay_ms,
                            sequence: Vec::new(),
                        })
                        .collect(),
                },
            })
        })
        .collect()
}

fn value_to_body(v: Value) -> Body {
    match v {
        Value::String(s) => Body::Raw(s),
        other => Body::Structured(other),
    }
}

fn parse_method(s: &str) -> Result<Method, MockError> {
    Ok(match s.to_ascii_uppercase().as_str() {
        "GET" => Method::Get,
        "POST" => Method::Post,
        "PUT" => Method::Put,
        "PATCH" => Method::Patch,
        "DELETE" => Method::Delete,
        "HEAD" => Method::Head,
        _ => Method::Options,
    })
}

/// Merges file-level (`inline_in_file`) mocks on top of `external` mocks,
/// warning on duplicate `(method, url)` pairs originating from distinct
/// external files.
fn merge(
    external: Vec<FileMockDefinition>,
    inline_in_file: Vec<FileMockDefinition>,
) -> Vec<FileMockDefinition> {
    let mut seen: HashMap<(Method, String), usize> = HashMap::new();
    for (i, m) in external.iter().enumerate() {
        let key = (m.method, m.url.clone());
        if seen.insert(key, i).is_some() {
            tracing::warn!(
                method = %m.method,
                url = %m.url,
                "duplicate external mock definition, last one wins"
            );
        }
    }

    let mut combined = external;
    combined.extend(inline_in_file);
    combined
}

pub struct MockEngine {
    file_mocks: Vec<FileMockDefinition>,
    sequence_counters: HashMap<String, usize>,
}

impl MockEngine {
    pub fn new(external: Vec<FileMockDefinition>, inline_in_file: Vec<FileMockDefinition>) -> Self {
        Self {
            file_mocks: merge(external, inline_in_file),
            sequence_counters: HashMap::new(),
        }
    }

    /// Resolves the mock response for one request, if any applies.
    ///
    /// `inline` is the test's own `mock:` block, if present; it always wins.
    /// Otherwise the merged file/external mocks are scanned from last to
    /// first for the first `(method, resolved-url)` match.
    pub fn resolve(
        &mut self,
        source_file: &str,
        test_name: &str,
        method: Method,
        resolved_url: &str,
        inline: Option<&MockResponse>,
        vars: &VariableStore,
    ) -> Result<Option<MockResult>, MockError> {
        if let Some(inline) = inline {
            let key = format!("{source_file}::{test_name}::inline");
            let chosen = self.select_sequence(&key, inline).clone();
            return Ok(Some(synthesize(&chosen, vars)?));
        }

        let mut matched: Option<MockResponse> = None;
        for candidate in self.file_mocks.iter().rev() {
            if candidate.method != method {
                continue;
            }
            let candidate_url = vars.resolve(&candidate.url)?;
            if candidate_url == resolved_url {
                matched = Some(candidate.response.clone());
                break;
            }
        }

        let Some(response) = matched else {
            return Ok(None);
        };

        let key = format!("{}::{}", method, resolved_url);
        let chosen = self.select_sequence(&key, &response).clone();
        Ok(Some(synthesize(&chosen, vars)?))
    }

    /// Whether any file-level or external mock definitions are loaded, used
    /// by the executor to decide whether a non-`mock_only` test should still
    /// consult the mock engine before falling through to the network.
    pub fn has_definitions(&self) -> bool {
        !self.file_mocks.is_empty()
    }

    /// Returns the sequence element for the current call count on `key`,
    /// incrementing the counter; sticky on the last element once exhausted.
    /// A response without a `sequence` is returned unchanged every time.
    fn select_sequence<'a>(&mut self, key: &str, response: &'a MockResponse) -> &'a MockResponse {
        if response.sequence.is_empty() {
            return response;
        }
        let idx = *self.sequence_counters.get(key).unwrap_or(&0);
        let capped = idx.min(response.sequence.len() - 1);
        self.sequence_counters.insert(key.to_string(), idx + 1);
        &response.sequence[capped]
    }
}

/// Synthesizes an HTTP response from a resolved [`MockResponse`]:
/// status default, body serialization, content-type defaulting.
fn synthesize(response: &MockResponse, vars: &VariableStore) -> Result<MockResult, MockError> {
    let status = response.status.unwrap_or(200);

    let (body, default_content_type) = match &response.body {
        None => (None, None),
        Some(Body::Raw(s)) => (Some(vars.resolve(s)?), Some("text/plain")),
        Some(Body::Structured(v)) => {
            let resolved = vars.resolve_deep(v)?;
            (
                Some(serde_json::to_string(&resolved).unwrap_or_default()),
                Some("application/json"),
            )
        }
    };

    let mut headers = response.headers.clone();
    if headers.get("content-type").is_none() {
        let content_type = response
            .content_type
            .clone()
            .or_else(|| default_content_type.map(str::to_string));
        if let Some(ct) = content_type {
            headers.0.push(("Content-Type".to_string(), ct));
        }
    }

    Ok(MockResult {
        status,
        headers,
        body,
        delay_ms: response.delay_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> MockResponse {
        MockResponse {
            status: Some(status),
            headers: Headers::default(),
            body: Some(Body::Structured(serde_json::json!({"ok": true}))),
            content_type: None,
            delay_ms: None,
            sequence: Vec::new(),
        }
    }

    #[test]
    fn inline_mock_always_wins() {
        let mut engine = MockEngine::new(Vec::new(), Vec::new());
        let inline = response(201);
        let vars = VariableStore::new();
        let result = engine
            .resolve("t.resty", "create", Method::Post, "https://x/y", Some(&inline), &vars)
            .unwrap()
            .unwrap();
        assert_eq!(result.status, 201);
        assert!(result.headers.get("content-type").unwrap().contains("json"));
    }

    #[test]
    fn last_definition_wins_among_file_mocks() {
        let first = FileMockDefinition {
            method: Method::Get,
            url: "https://x/y".to_string(),
            response: response(200),
        };
        let second = FileMockDefinition {
            method: Method::Get,
            url: "https://x/y".to_string(),
            response: response(500),
        };
        let mut engine = MockEngine::new(Vec::new(), vec![first, second]);
        let vars = VariableStore::new();
        let result = engine
            .resolve("t.resty", "get_thing", Method::Get, "https://x/y", None, &vars)
            .unwrap()
            .unwrap();
        assert_eq!(result.status, 500);
    }

    #[test]
    fn sequence_is_sticky_on_last_element() {
        let mut mock = response(200);
        mock.sequence = vec![response(201), response(202)];
        let def = FileMockDefinition {
            method: Method::Get,
            url: "https://x/seq".to_string(),
            response: mock,
        };
        let mut engine = MockEngine::new(Vec::new(), vec![def]);
        let vars = VariableStore::new();

        let r1 = engine
            .resolve("t.resty", "seq", Method::Get, "https://x/seq", None, &vars)
            .unwrap()
            .unwrap();
        let r2 = engine
            .resolve("t.resty", "seq", Method::Get, "https://x/seq", None, &vars)
            .unwrap()
            .unwrap();
        let r3 = engine
            .resolve("t.resty", "seq", Method::Get, "https://x/seq", None, &vars)
            .unwrap()
            .unwrap();

        assert_eq!(r1.status, 201);
        assert_eq!(r2.status, 202);
        assert_eq!(r3.status, 202);
    }

    #[test]
    fn no_match_returns_none() {
        let mut engine = MockEngine::new(Vec::new(), Vec::new());
        let vars = VariableStore::new();
        let result = engine
            .resolve("t.resty", "x", Method::Get, "https://x/y", None, &vars)
            .unwrap();
        assert!(result.is_none());
    }
}
