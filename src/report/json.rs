//! JSON formatter: camelCase keys, `{summary, results, metadata}`.

use serde::Serialize;
use serde_json::Value;

use crate::result::{TestResult, TestRunSummary, TestStatus};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonSummary {
    total: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
    pass_rate: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonResult {
    name: String,
    source_file: String,
    line: usize,
    status: TestStatus,
    http_status: Option<u16>,
    attempt: usize,
    error: Option<String>,
    extracted: std::collections::HashMap<String, Value>,
    duration_ms: Option<u128>,
}

impl From<&TestResult> for JsonResult {
    fn from(r: &TestResult) -> Self {
        JsonResult {
            name: r.name.clone(),
            source_file: r.source_file.display().to_string(),
            line: r.line,
            status: r.status,
            http_status: r.http_status,
            attempt: r.attempt,
            error: r.error.clone(),
            extracted: r.extracted.clone(),
            duration_ms: r.duration().map(|d| d.as_millis()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport {
    summary: JsonSummary,
    results: Vec<JsonResult>,
    metadata: JsonMetadata,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonMetadata {
    tool: &'static str,
    file_count: usize,
}

pub fn render(summary: &TestRunSummary) -> String {
    let report = JsonReport {
        summary: JsonSummary {
            total: summary.total(),
            passed: summary.passed(),
            failed: summary.failed(),
            skipped: summary.skipped(),
            pass_rate: summary.pass_rate(),
        },
        results: summary.all_results().map(JsonResult::from).collect(),
        metadata: JsonMetadata {
            tool: "resty",
            file_count: summary.files.len(),
        },
    };
    serde_json::to_string_pretty(&report).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn renders_camelcase_keys_and_aggregate_fields() {
        let mut summary = TestRunSummary::new();
        let mut t = TestResult::not_run("login", &PathBuf::from("a.resty"), 1);
        t.status = TestStatus::Passed;
        summary.push_file(PathBuf::from("a.resty"), vec![t]);

        let rendered = render(&summary);
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["summary"]["total"], 1);
        assert_eq!(value["results"][0]["sourceFile"], "a.resty");
        assert_eq!(value["metadata"]["tool"], "resty");
    }
}
