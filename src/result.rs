//! Result model — shapes consumed by reporters.
//!
//! `TestResult` and `TestRunSummary` are owned by [`crate::orchestrator`] for
//! the duration of a run and handed, read-only, to `report` formatters.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::block::{Headers, Method};
use crate::vars::VarLayer;

/// Execution status of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TestStatus {
    NotRun,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::NotRun => "not_run",
            TestStatus::Running => "running",
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Skipped => "skipped",
        }
    }
}

/// The request resty actually sent (or would have sent to a mock), after
/// variable resolution — kept on the result for diagnostics and reporters.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub method: Option<Method>,
    pub url: Option<String>,
    pub headers: Headers,
}

/// One test's outcome.
///
/// `attempt` is a resty-only addition: the number of attempts the executor
/// made before settling on this result, so reporters can distinguish
/// "passed cleanly" from "passed after a retry".
#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub source_file: PathBuf,
    pub line: usize,
    pub status: TestStatus,
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
    pub http_status: Option<u16>,
    pub response_headers: Option<Headers>,
    pub response_body: Option<Value>,
    pub extracted: HashMap<String, Value>,
    pub request: ResolvedRequest,
    pub error: Option<String>,
    pub cause: Option<String>,
    pub attempt: usize,
    pub variable_snapshot: HashMap<String, (Value, VarLayer)>,
}

impl TestResult {
    pub fn not_run(name: &str, source_file: &PathBuf, line: usize) -> Self {
        TestResult {
            name: name.to_string(),
            source_file: source_file.clone(),
            line,
            status: TestStatus::NotRun,
            started_at: None,
            ended_at: None,
            http_status: None,
            response_headers: None,
            response_body: None,
            extracted: HashMap::new(),
            request: ResolvedRequest {
                method: None,
                url: None,
                headers: Headers::default(),
            },
            error: None,
            cause: None,
            attempt: 0,
            variable_snapshot: HashMap::new(),
        }
    }

    pub fn skipped(name: &str, source_file: &PathBuf, line: usize, reason: &str) -> Self {
        let mut r = Self::not_run(name, source_file, line);
        r.status = TestStatus::Skipped;
        r.error = Some(reason.to_string());
        r
    }

    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(s), Some(e)) => Some(e.saturating_duration_since(s)),
            _ => None,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

/// A single parsed file's worth of tests, for per-file groupings in reports.
#[derive(Debug, Clone)]
pub struct FileSuite {
    pub path: PathBuf,
    pub results: Vec<TestResult>,
}

/// Aggregation of results across every file in a run.
#[derive(Debug, Clone, Default)]
pub struct TestRunSummary {
    pub files: Vec<FileSuite>,
}

impl TestRunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_file(&mut self, path: PathBuf, results: Vec<TestResult>) {
        self.files.push(FileSuite { path, results });
    }

    pub fn all_results(&self) -> impl Iterator<Item = &TestResult> {
        self.files.iter().flat_map(|f| f.results.iter())
    }

    pub fn total(&self) -> usize {
        self.all_results().count()
    }

    pub fn passed(&self) -> usize {
        self.count_status(TestStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count_status(TestStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count_status(TestStatus::Skipped)
    }

    fn count_status(&self, status: TestStatus) -> usize {
        self.all_results().filter(|r| r.status == status).count()
    }

    /// Fraction of executed (non-skipped, non-not-run) tests that passed.
    /// `1.0` when nothing ran, so an empty suite doesn't read as a failure.
    pub fn pass_rate(&self) -> f64 {
        let executed = self
            .all_results()
            .filter(|r| matches!(r.status, TestStatus::Passed | TestStatus::Failed))
            .count();
        if executed == 0 {
            return 1.0;
        }
        self.passed() as f64 / executed as f64
    }

    /// Process exit code for an otherwise-clean run: `0` if every
    /// test passed or was skipped, `1` if any test failed. Typed errors that
    /// abort a file (missing/circular dependency, parse failure) are mapped
    /// separately by the caller via `RestyError::exit_code`.
    pub fn exit_code(&self) -> i32 {
        if self.failed() > 0 { 1 } else { 0 }
    }

    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing(name: &str) -> TestResult {
        let mut r = TestResult::not_run(name, &PathBuf::from("t.resty"), 1);
        r.status = TestStatus::Passed;
        r
    }

    fn failing(name: &str) -> TestResult {
        let mut r = TestResult::not_run(name, &PathBuf::from("t.resty"), 1);
        r.status = TestStatus::Failed;
        r
    }

    #[test]
    fn summary_aggregates_across_files() {
        let mut summary = TestRunSummary::new();
        summary.push_file(PathBuf::from("a.resty"), vec![passing("a1"), failing("a2")]);
        summary.push_file(PathBuf::from("b.resty"), vec![passing("b1")]);

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.passed(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn empty_summary_has_full_pass_rate_and_clean_exit() {
        let summary = TestRunSummary::new();
        assert_eq!(summary.pass_rate(), 1.0);
        assert_eq!(summary.exit_code(), 0);
        assert!(summary.success());
    }

    #[test]
    fn pass_rate_excludes_skipped_and_not_run() {
        let mut summary = TestRunSummary::new();
        let skipped = TestResult::skipped("s", &PathBuf::from("t.resty"), 1, "disabled");
        summary.push_file(PathBuf::from("t.resty"), vec![passing("p"), skipped]);
        assert_eq!(summary.pass_rate(), 1.0);
    }
}
