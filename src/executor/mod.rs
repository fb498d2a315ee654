//! Request executor.
//!
//! Drives one test block through resolve → (mock or network) → validate →
//! capture, retrying retryable outcomes with exponential backoff, and
//! enforcing the strict-capture rule on successful 2xx responses. Owns the
//! HTTP client and the [`MockEngine`] (and therefore its sequence counters)
//! for the lifetime of one file's run.

pub mod retry;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;

use crate::block::{Body, Headers, Method, TestBlock};
use crate::jsonpath;
use crate::mock::{MockEngine, MockError, MockResult};
use crate::result::{ResolvedRequest, TestResult, TestStatus};
use crate::vars::{VariableError, VariableStore};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error(transparent)]
    Mock(#[from] MockError),

    #[error("structured body is not supported for content type '{0}'")]
    UnsupportedStructuredBody(String),

    #[error("no mock matched a mock_only test")]
    MockUnavailable,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error(
        "capture failed (missing: {}, errored: {}{})",
        missing.join(", "),
        errored.join(", "),
        if *not_json { ", response not JSON or empty" } else { "" }
    )]
    CaptureFailed {
        missing: Vec<String>,
        errored: Vec<String>,
        not_json: bool,
    },
}

impl ExecError {
    /// Whether this failure is one of the network-class exceptions treated
    /// as retryable (connection, DNS, socket, timeout).
    fn is_retryable(&self) -> bool {
        match self {
            ExecError::Timeout => true,
            ExecError::Transport(e) => retry::is_retryable_transport_error(e),
            _ => false,
        }
    }
}

/// Per-file executor options.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// `--timeout` CLI override, taking priority over a test's own `timeout`.
    pub timeout_override: Option<Duration>,
    /// Fallback used when neither the CLI nor the test specify one.
    pub host_default_timeout: Duration,
    /// `--mock` / `RESTY_MOCK`: try the mock engine even without an inline
    /// mock or `mock_only`, for every request.
    pub global_mock: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            timeout_override: None,
            host_default_timeout: Duration::from_secs(30),
            global_mock: false,
        }
    }
}

/// A served response, from either the mock engine or the network, before
/// expectation evaluation.
struct AttemptOutcome {
    status: u16,
    headers: Headers,
    body: Option<String>,
    request: ResolvedRequest,
}

pub struct Executor {
    client: reqwest::Client,
    mock_engine: MockEngine,
    options: ExecutorOptions,
    cancel: Arc<AtomicBool>,
}

impl Executor {
    pub fn new(
        file_mocks: Vec<crate::block::FileMockDefinition>,
        inline_in_file: Vec<crate::block::FileMockDefinition>,
        options: ExecutorOptions,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            mock_engine: MockEngine::new(file_mocks, inline_in_file),
            options,
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Runs `test`, retrying as configured, and returns the finished
    /// [`TestResult`] alongside the variables this run captured (the caller
    /// merges these into the store's captured layer on success).
    pub async fn execute(
        &mut self,
        test: &TestBlock,
        source_file: &std::path::Path,
        line: usize,
        vars: &VariableStore,
    ) -> (TestResult, HashMap<String, Value>) {
        let started_at = Instant::now();
        let mut result = TestResult::not_run(&test.name, &source_file.to_path_buf(), line);
        result.status = TestStatus::Running;
        result.started_at = Some(started_at);
        result.variable_snapshot = vars.snapshot();

        let total = retry::total_attempts(test.retry);
        let mut last_transient: Option<String> = None;

        for attempt in 1..=total {
            result.attempt = attempt;

            if self.cancelled() {
                return finish(result, TestStatus::Failed, Some("cancelled".to_string()), None);
            }

            match self.attempt_once(test, source_file, vars).await {
                Ok(outcome) => {
                    let is_final = attempt == total;
                    if retry::is_retryable_status(outcome.status) && !is_final {
                        last_transient = Some(format!(
                            "retryable status {} on attempt {attempt}",
                            outcome.status
                        ));
                        self.sleep_backoff(attempt).await;
                        continue;
                    }
                    return self.validate_and_capture(result, outcome, test, vars, attempt, total);
                }
                Err(e) => {
                    let is_final = attempt == total;
                    if e.is_retryable() && !is_final {
                        last_transient = Some(e.to_string());
                        self.sleep_backoff(attempt).await;
                        continue;
                    }
                    let message = if is_final && total > 1 {
                        format!("{e} (after {attempt} attempts)")
                    } else {
                        e.to_string()
                    };
                    return finish(result, TestStatus::Failed, Some(message), last_transient);
                }
            }
        }

        finish(
            result,
            TestStatus::Failed,
            Some("exhausted retries".to_string()),
            last_transient,
        )
    }

    async fn sleep_backoff(&self, attempt: usize) {
        tokio::time::sleep(retry::backoff_delay(attempt)).await;
    }

    fn validate_and_capture(
        &self,
        mut result: TestResult,
        outcome: AttemptOutcome,
        test: &TestBlock,
        vars: &VariableStore,
        attempt: usize,
        total: usize,
    ) -> (TestResult, HashMap<String, Value>) {
        let AttemptOutcome {
            status,
            headers,
            body,
            request,
        } = outcome;

        let body_json: Value = body
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or(Value::Null);

        result.request = request;
        result.http_status = Some(status);
        result.response_headers = Some(headers.clone());
        result.response_body = if body_json.is_null() {
            None
        } else {
            Some(body_json.clone())
        };

        let expect_outcome =
            crate::expect::evaluate(test.expect.as_ref(), status, &headers, &body_json, vars);

        if !expect_outcome.status_ok {
            let message = match test.expect.as_ref().and_then(|e| e.status) {
                Some(expected) => format!("expected status {expected}, got {status}"),
                None => format!("expected a 2xx status, got {status}"),
            };
            return finish(result, TestStatus::Failed, Some(message), None);
        }

        if !expect_outcome.header_mismatches.is_empty() {
            let message = format!(
                "header mismatch: {}",
                expect_outcome.header_mismatches.join("; ")
            );
            return finish(result, TestStatus::Failed, Some(message), None);
        }

        if !expect_outcome.value_mismatches.is_empty() {
            let message = format!(
                "value mismatch: {}",
                expect_outcome.value_mismatches.join("; ")
            );
            return finish(result, TestStatus::Failed, Some(message), None);
        }

        let strict = (200..300).contains(&status) && status != 204;
        let mut extracted: HashMap<String, Value> = HashMap::new();
        let mut missing = Vec::new();
        let mut errored = Vec::new();

        for (name, path) in &test.extract {
            match jsonpath::evaluate(&body_json, path) {
                Ok(tokens) if tokens.is_empty() => {
                    if strict {
                        missing.push(name.clone());
                    }
                }
                Ok(tokens) => {
                    extracted.insert(name.clone(), tokens[0].clone());
                }
                Err(_) => {
                    if strict {
                        errored.push(name.clone());
                    }
                }
            }
        }

        if strict && !test.extract.is_empty() {
            let not_json = body.is_some() && body_json.is_null();
            if !missing.is_empty() || !errored.is_empty() || not_json {
                let message = ExecError::CaptureFailed {
                    missing,
                    errored,
                    not_json,
                }
                .to_string();
                return finish(result, TestStatus::Failed, Some(message), None);
            }
        }

        // store_as captures never override an extractor's own key.
        for (k, v) in expect_outcome.captured {
            extracted.entry(k).or_insert(v);
        }

        result.extracted = extracted.clone();
        let cause = if attempt > 1 {
            Some(format!("passed after {attempt}/{total} attempts"))
        } else {
            None
        };
        finish(result, TestStatus::Passed, None, cause).and_return(extracted)
    }

    async fn attempt_once(
        &mut self,
        test: &TestBlock,
        source_file: &std::path::Path,
        vars: &VariableStore,
    ) -> Result<AttemptOutcome, ExecError> {
        let method = test.method;
        let url = match &test.url {
            Some(u) => Some(vars.resolve(u)?),
            None => None,
        };

        let mut headers = Headers::default();
        for (k, v) in test.headers.iter() {
            headers.0.push((k.clone(), vars.resolve(v)?));
        }

        let request = ResolvedRequest {
            method,
            url: url.clone(),
            headers: headers.clone(),
        };

        let should_try_mock = test.mock.is_some()
            || test.mock_only
            || self.options.global_mock
            || self.mock_engine.has_definitions();

        if should_try_mock {
            let resolved_url = url.clone().unwrap_or_default();
            let method_for_match = method.unwrap_or(Method::Get);
            let mock_scope = format!("{}", source_file.display());
            let served = self.mock_engine.resolve(
                &mock_scope,
                &test.name,
                method_for_match,
                &resolved_url,
                test.mock.as_ref(),
                vars,
            )?;

            if let Some(served) = served {
                return self.serve_mock(served, request).await;
            }

            if test.mock_only {
                return Err(ExecError::MockUnavailable);
            }
        }

        self.send_network(test, method, url, headers, vars, request).await
    }

    async fn serve_mock(
        &self,
        served: MockResult,
        request: ResolvedRequest,
    ) -> Result<AttemptOutcome, ExecError> {
        if let Some(delay) = served.delay_ms {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(AttemptOutcome {
            status: served.status,
            headers: served.headers,
            body: served.body,
            request,
        })
    }

    async fn send_network(
        &self,
        test: &TestBlock,
        method: Option<Method>,
        url: Option<String>,
        headers: Headers,
        vars: &VariableStore,
        request: ResolvedRequest,
    ) -> Result<AttemptOutcome, ExecError> {
        let method = method.unwrap_or(Method::Get);
        let url = url.unwrap_or_default();

        let mut builder = self.client.request(method.to_reqwest(), &url);
        for (k, v) in headers.iter() {
            builder = builder.header(k, v);
        }

        if let Some(body) = &test.body {
            let content_type = headers.get("content-type").map(str::to_lowercase);
            let rendered = render_body(body, content_type.as_deref(), vars)?;
            builder = builder.body(rendered);
        }

        let timeout = self
            .options
            .timeout_override
            .or_else(|| test.timeout.map(Duration::from_secs))
            .unwrap_or(self.options.host_default_timeout);
        builder = builder.timeout(timeout);

        let response = match tokio::time::timeout(timeout, builder.send()).await {
            Ok(r) => r?,
            Err(_) => return Err(ExecError::Timeout),
        };

        let status = response.status().as_u16();
        let response_headers = Headers(
            response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
        );
        let body = response.text().await.ok();

        Ok(AttemptOutcome {
            status,
            headers: response_headers,
            body,
            request,
        })
    }
}

/// Small adapter so `finish` can be called from a `Result`-shaped tail
/// position and still hand back the captured-variable map alongside the
/// result, without repeating the `(result, HashMap::new())` tuple at every
/// early-return call site above.
trait AndReturn {
    fn and_return(self, extracted: HashMap<String, Value>) -> (TestResult, HashMap<String, Value>);
}

impl AndReturn for (TestResult, HashMap<String, Value>) {
    fn and_return(self, extracted: HashMap<String, Value>) -> (TestResult, HashMap<String, Value>) {
        (self.0, extracted)
    }
}

fn finish(
    mut result: TestResult,
    status: TestStatus,
    error: Option<String>,
    cause: Option<String>,
) -> (TestResult, HashMap<String, Value>) {
    result.status = status;
    result.error = error;
    result.cause = cause;
    result.ended_at = Some(Instant::now());
    (result, HashMap::new())
}

fn render_body(
    body: &Body,
    content_type: Option<&str>,
    vars: &VariableStore,
) -> Result<String, ExecError> {
    match body {
        Body::Raw(s) => Ok(vars.resolve(s)?),
        Body::Structured(v) => {
            let resolved = vars.resolve_deep(v)?;
            match content_type {
                None => Ok(serde_json::to_string(&resolved).unwrap_or_default()),
                Some(ct) if ct.starts_with("application/json") => {
                    Ok(serde_json::to_string(&resolved).unwrap_or_default())
                }
                Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
                    render_form_urlencoded(&resolved)
                }
                Some(ct) => Err(ExecError::UnsupportedStructuredBody(ct.to_string())),
            }
        }
    }
}

fn render_form_urlencoded(value: &Value) -> Result<String, ExecError> {
    let Value::Object(map) = value else {
        return Err(ExecError::UnsupportedStructuredBody(
            "application/x-www-form-urlencoded".to_string(),
        ));
    };
    let mut parts = Vec::with_capacity(map.len());
    for (k, v) in map {
        let value_str = crate::vars::value_to_text(v);
        parts.push(format!("{}={}", percent_encode(k), percent_encode(&value_str)));
    }
    Ok(parts.join("&"))
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ExpectDefinition, FileMockDefinition, MockResponse};
    use std::path::PathBuf;

    fn test_block(name: &str) -> TestBlock {
        TestBlock {
            name: name.to_string(),
            method: Some(Method::Get),
            url: Some("https://example.invalid/thing".to_string()),
            description: None,
            headers: Headers::default(),
            body: None,
            extract: Default::default(),
            expect: None,
            requires: Vec::new(),
            disabled: false,
            retry: 0,
            timeout: None,
            mock_only: false,
            mock: None,
        }
    }

    #[tokio::test]
    async fn inline_mock_is_served_without_touching_the_network() {
        let mut test = test_block("get_thing");
        test.mock = Some(MockResponse {
            status: Some(200),
            headers: Headers::default(),
            body: Some(Body::Structured(serde_json::json!({"ok": true}))),
            content_type: None,
            delay_ms: None,
            sequence: Vec::new(),
        });

        let mut executor = Executor::new(
            Vec::new(),
            Vec::new(),
            ExecutorOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        let vars = VariableStore::new();
        let (result, extracted) = executor
            .execute(&test, &PathBuf::from("t.resty"), 1, &vars)
            .await;

        assert_eq!(result.status, TestStatus::Passed);
        assert_eq!(result.http_status, Some(200));
        assert!(extracted.is_empty());
    }

    #[tokio::test]
    async fn result_carries_a_variable_store_snapshot() {
        let mut test = test_block("get_thing");
        test.mock = Some(MockResponse {
            status: Some(200),
            headers: Headers::default(),
            body: None,
            content_type: None,
            delay_ms: None,
            sequence: Vec::new(),
        });

        let mut executor = Executor::new(
            Vec::new(),
            Vec::new(),
            ExecutorOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        let mut vars = VariableStore::new();
        vars.update_file(HashMap::from([("host".to_string(), Value::from("https://example.invalid"))]));

        let (result, _) = executor
            .execute(&test, &PathBuf::from("t.resty"), 1, &vars)
            .await;

        assert_eq!(
            result.variable_snapshot.get("host"),
            Some(&(Value::from("https://example.invalid"), crate::vars::VarLayer::File))
        );
    }

    #[tokio::test]
    async fn mock_only_without_a_match_fails() {
        let mut test = test_block("no_mock");
        test.mock_only = true;

        let mut executor = Executor::new(
            Vec::new(),
            Vec::new(),
            ExecutorOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        let vars = VariableStore::new();
        let (result, _) = executor
            .execute(&test, &PathBuf::from("t.resty"), 1, &vars)
            .await;

        assert_eq!(result.status, TestStatus::Failed);
        assert!(result.error.unwrap().contains("no mock matched"));
    }

    #[tokio::test]
    async fn strict_capture_fails_a_2xx_response_missing_an_extractor() {
        let mut test = test_block("get_thing");
        test.mock = Some(MockResponse {
            status: Some(200),
            headers: Headers::default(),
            body: Some(Body::Structured(serde_json::json!({"data": {"value": 42}}))),
            content_type: None,
            delay_ms: None,
            sequence: Vec::new(),
        });
        test.extract.insert("valid".to_string(), "$.data.value".to_string());
        test.extract.insert("invalid".to_string(), "$.nonexistent.path".to_string());

        let mut executor = Executor::new(
            Vec::new(),
            Vec::new(),
            ExecutorOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        let vars = VariableStore::new();
        let (result, _) = executor
            .execute(&test, &PathBuf::from("t.resty"), 1, &vars)
            .await;

        assert_eq!(result.status, TestStatus::Failed);
        let msg = result.error.unwrap();
        assert!(msg.contains("missing: invalid") || msg.contains("invalid"));
    }

    #[tokio::test]
    async fn mock_sequence_of_rate_limit_then_success_passes_after_retry() {
        let mut sequenced = MockResponse {
            status: Some(429),
            headers: Headers::default(),
            body: Some(Body::Structured(serde_json::json!({"error": "rate"}))),
            content_type: None,
            delay_ms: None,
            sequence: Vec::new(),
        };
        sequenced.sequence = vec![
            sequenced.clone(),
            MockResponse {
                status: Some(200),
                headers: Headers::default(),
                body: Some(Body::Structured(serde_json::json!({"ok": true}))),
                content_type: None,
                delay_ms: None,
                sequence: Vec::new(),
            },
        ];
        let def = FileMockDefinition {
            method: Method::Get,
            url: "https://example.invalid/thing".to_string(),
            response: sequenced,
        };

        let mut test = test_block("flaky_thing");
        test.retry = 1;

        let mut executor = Executor::new(
            vec![def],
            Vec::new(),
            ExecutorOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        let vars = VariableStore::new();
        let (result, _) = executor
            .execute(&test, &PathBuf::from("t.resty"), 1, &vars)
            .await;

        assert_eq!(result.status, TestStatus::Passed);
        assert_eq!(result.attempt, 2);
    }

    #[tokio::test]
    async fn status_expectation_mismatch_never_reaches_value_checks() {
        let mut test = test_block("wrong_status");
        test.mock = Some(MockResponse {
            status: Some(404),
            headers: Headers::default(),
            body: Some(Body::Structured(serde_json::json!({"id": 1}))),
            content_type: None,
            delay_ms: None,
            sequence: Vec::new(),
        });
        test.expect = Some(ExpectDefinition {
            status: Some(200),
            headers: Headers::default(),
            values: vec![crate::block::ValueExpectation {
                key: "$.id".to_string(),
                op: "equals".to_string(),
                value: Some(serde_json::json!(1)),
                store_as: None,
                ignore_case: true,
            }],
        });

        let mut executor = Executor::new(
            Vec::new(),
            Vec::new(),
            ExecutorOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        let vars = VariableStore::new();
        let (result, _) = executor
            .execute(&test, &PathBuf::from("t.resty"), 1, &vars)
            .await;

        assert_eq!(result.status, TestStatus::Failed);
        assert!(result.error.unwrap().contains("expected status 200"));
    }
}
