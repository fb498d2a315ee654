//! Plain-text formatter (`-o text`, the default).

use crate::result::{TestRunSummary, TestStatus};

fn status_label(status: TestStatus) -> &'static str {
    match status {
        TestStatus::NotRun => "NOT RUN",
        TestStatus::Running => "RUNNING",
        TestStatus::Passed => "PASS",
        TestStatus::Failed => "FAIL",
        TestStatus::Skipped => "SKIP",
    }
}

pub fn render(summary: &TestRunSummary) -> String {
    let mut out = String::new();

    for file in &summary.files {
        out.push_str(&format!("{}\n", file.path.display()));
        for result in &file.results {
            out.push_str(&format!(
                "  [{}] {} ({}:{})\n",
                status_label(result.status),
                result.name,
                file.path.display(),
                result.line
            ));
            if let Some(err) = &result.error {
                if result.status == TestStatus::Failed {
                    out.push_str(&format!("      {err}\n"));
                }
            }
        }
    }

    out.push('\n');
    out.push_str(&format!(
        "Total: {}  Passed: {}  Failed: {}  Skipped: {}\n",
        summary.total(),
        summary.passed(),
        summary.failed(),
        summary.skipped()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::TestResult;
    use std::path::PathBuf;

    #[test]
    fn renders_one_line_per_test_plus_totals() {
        let mut summary = TestRunSummary::new();
        let mut passing = TestResult::not_run("login", &PathBuf::from("a.resty"), 3);
        passing.status = TestStatus::Passed;
        summary.push_file(PathBuf::from("a.resty"), vec![passing]);

        let rendered = render(&summary);
        assert!(rendered.contains("[PASS] login"));
        assert!(rendered.contains("Total: 1"));
    }
}
