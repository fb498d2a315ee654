//! Markdown formatter (`-o markdown`) — a Markdown table per file,
//! readable directly as a PR comment or CI summary.

use crate::result::{TestRunSummary, TestStatus};

fn status_icon(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "✅",
        TestStatus::Failed => "❌",
        TestStatus::Skipped => "⏭️",
        TestStatus::NotRun => "⬜",
        TestStatus::Running => "🔄",
    }
}

pub fn render(summary: &TestRunSummary) -> String {
    let mut out = String::new();
    out.push_str("# Test results\n\n");
    out.push_str(&format!(
        "**{}** total, **{}** passed, **{}** failed, **{}** skipped\n\n",
        summary.total(),
        summary.passed(),
        summary.failed(),
        summary.skipped()
    ));

    for file in &summary.files {
        out.push_str(&format!("## {}\n\n", file.path.display()));
        out.push_str("| | Test | HTTP | Error |\n|---|---|---|---|\n");
        for result in &file.results {
            let http = result
                .http_status
                .map(|s| s.to_string())
                .unwrap_or_default();
            let error = result.error.clone().unwrap_or_default();
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                status_icon(result.status),
                result.name,
                http,
                error.replace('|', "\\|")
            ));
        }
        out.push('\n');
    }

    out
}
