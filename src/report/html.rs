//! Self-contained HTML formatter (`-o html`) — a single static
//! page, no client-side JS, suitable for archiving as a CI artifact.

use crate::result::{TestRunSummary, TestStatus};

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn status_class(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "passed",
        TestStatus::Failed => "failed",
        TestStatus::Skipped => "skipped",
        TestStatus::NotRun => "not-run",
        TestStatus::Running => "running",
    }
}

pub fn render(summary: &TestRunSummary) -> String {
    let mut rows = String::new();
    for file in &summary.files {
        for result in &file.results {
            let error = result
                .error
                .as_deref()
                .map(escape)
                .unwrap_or_default();
            rows.push_str(&format!(
                "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                status_class(result.status),
                escape(&file.path.display().to_string()),
                escape(&result.name),
                status_class(result.status),
                result.http_status.map(|s| s.to_string()).unwrap_or_default(),
                error
            ));
        }
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>resty test results</title>
<style>
body {{ font-family: sans-serif; margin: 2rem; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ border: 1px solid #ccc; padding: 0.4rem 0.6rem; text-align: left; }}
tr.passed {{ background: #e8f8ee; }}
tr.failed {{ background: #fdeaea; }}
tr.skipped {{ background: #fdf6e3; }}
.summary {{ margin-bottom: 1rem; font-size: 1.1rem; }}
</style>
</head>
<body>
<h1>resty test results</h1>
<p class="summary">Total: {total} &middot; Passed: {passed} &middot; Failed: {failed} &middot; Skipped: {skipped}</p>
<table>
<thead><tr><th>File</th><th>Test</th><th>Status</th><th>HTTP</th><th>Error</th></tr></thead>
<tbody>
{rows}</tbody>
</table>
</body>
</html>
"#,
        total = summary.total(),
        passed = summary.passed(),
        failed = summary.failed(),
        skipped = summary.skipped(),
        rows = rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::TestResult;
    use std::path::PathBuf;

    #[test]
    fn renders_a_row_per_test_and_escapes_error_text() {
        let mut summary = TestRunSummary::new();
        let mut t = TestResult::not_run("login", &PathBuf::from("a.resty"), 1);
        t.status = TestStatus::Failed;
        t.error = Some("<script>alert(1)</script>".to_string());
        summary.push_file(PathBuf::from("a.resty"), vec![t]);

        let html = render(&summary);
        assert!(html.contains("<tr class=\"failed\">"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }
}
