//! Typed block model.
//!
//! [`Block`] is a tagged union, not a single struct with every field
//! optional — the decoder classifies a fenced YAML block into exactly one of
//! [`ConfigBlock`] or [`TestBlock`] at parse time.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An HTTP method recognised via the YAML shorthand keys `get`/`post`/... .
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive, order-preserving header map.
///
/// A plain `HashMap<String, String>` would lose the ability to preserve the
/// author's original casing for display while still comparing by identity;
/// `Vec` plus an `eq_ignore_ascii_case` lookup keeps both, since header
/// names are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(pub Vec<(String, String)>);

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_map(map: HashMap<String, String>) -> Self {
        let mut pairs: Vec<_> = map.into_iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Headers(pairs)
    }
}

/// A fenced YAML block, discriminated at decode time.
#[derive(Debug, Clone)]
pub enum Block {
    Config(ConfigBlock),
    Test(TestBlock),
}

/// A Config block: variables, includes, file-level mocks, implicit
/// dependencies.
#[derive(Debug, Clone, Default)]
pub struct ConfigBlock {
    pub include: Vec<String>,
    pub variables: HashMap<String, Value>,
    pub mocks: Vec<FileMockDefinition>,
    pub mocks_files: Vec<String>,
    /// Materialized as an implicit `requires` prefix for every test in the
    /// same file (Open Question 2 in DESIGN.md).
    pub dependencies: Vec<String>,
}

/// A Test block: one HTTP test.
#[derive(Debug, Clone)]
pub struct TestBlock {
    pub name: String,
    /// `None` only when `mock_only` is set with an inline mock and no
    /// method/URL is needed to imply the response.
    pub method: Option<Method>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub headers: Headers,
    pub body: Option<Body>,
    pub extract: HashMap<String, String>,
    pub expect: Option<ExpectDefinition>,
    pub requires: Vec<String>,
    pub disabled: bool,
    pub retry: usize,
    pub timeout: Option<u64>,
    pub mock_only: bool,
    pub mock: Option<InlineMockDefinition>,
}

/// A request or mock-response body, either a raw string or a structured
/// YAML/JSON value requiring deep variable resolution.
#[derive(Debug, Clone)]
pub enum Body {
    Raw(String),
    Structured(Value),
}

/// `expect:` block.
#[derive(Debug, Clone, Default)]
pub struct ExpectDefinition {
    pub status: Option<u16>,
    pub headers: Headers,
    pub values: Vec<ValueExpectation>,
}

/// One entry of `expect.values`.
#[derive(Debug, Clone)]
pub struct ValueExpectation {
    pub key: String,
    pub op: String,
    pub value: Option<Value>,
    pub store_as: Option<String>,
    pub ignore_case: bool,
}

/// A mock response, possibly one element of a `sequence`.
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    pub status: Option<u16>,
    pub headers: Headers,
    pub body: Option<Body>,
    pub content_type: Option<String>,
    pub delay_ms: Option<u64>,
    pub sequence: Vec<MockResponse>,
}

/// Inline `mock:` attached directly to a test block.
pub type InlineMockDefinition = MockResponse;

/// A file-level or external-file mock, matched by method + URL.
#[derive(Debug, Clone)]
pub struct FileMockDefinition {
    pub method: Method,
    pub url: String,
    pub response: MockResponse,
}
