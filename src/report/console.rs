//! Interactive terminal output (`-c/--color`): per-status coloring via
//! `console::style`, with a one-line verdict after the summary totals.

use crate::result::{TestResult, TestRunSummary, TestStatus};

fn style_status(status: TestStatus, color: bool) -> String {
    let label = match status {
        TestStatus::Passed => "PASS",
        TestStatus::Failed => "FAIL",
        TestStatus::Skipped => "SKIP",
        TestStatus::NotRun => "NOT RUN",
        TestStatus::Running => "RUNNING",
    };
    if !color {
        return label.to_string();
    }
    match status {
        TestStatus::Passed => console::style(label).green().to_string(),
        TestStatus::Failed => console::style(label).red().bold().to_string(),
        TestStatus::Skipped => console::style(label).yellow().to_string(),
        _ => console::style(label).dim().to_string(),
    }
}

/// Prints one line per test as it finishes.
pub fn print_test_line(result: &TestResult, color: bool) {
    println!("  [{}] {}", style_status(result.status, color), result.name);
    if result.status == TestStatus::Failed {
        if let Some(err) = &result.error {
            let line = if color {
                console::style(err).dim().to_string()
            } else {
                err.clone()
            };
            println!("      {line}");
        }
    }
}

/// Prints the final aggregate summary: totals, then a one-line verdict.
pub fn print_summary(summary: &TestRunSummary, color: bool) {
    println!();
    println!("Test Results:");
    println!("  Total:   {}", summary.total());
    print_count("Passed", summary.passed(), color, ColorKind::Green);
    print_count("Failed", summary.failed(), color, ColorKind::Red);
    print_count("Skipped", summary.skipped(), color, ColorKind::Yellow);

    println!();
    if summary.success() {
        print_verdict("All tests passed!", color, ColorKind::Green);
    } else {
        print_verdict("Some tests failed.", color, ColorKind::Red);
        println!();
        println!("Failed tests:");
        for result in summary.all_results() {
            if result.status == TestStatus::Failed {
                println!(
                    "  - {} ({}:{})",
                    result.name,
                    result.source_file.display(),
                    result.line
                );
                if let Some(err) = &result.error {
                    println!("    {err}");
                }
            }
        }
    }
}

enum ColorKind {
    Green,
    Red,
    Yellow,
}

fn print_count(label: &str, value: usize, color: bool, kind: ColorKind) {
    if !color {
        println!("  {label}: {value}");
        return;
    }
    let styled = match kind {
        ColorKind::Green => console::style(value).green().to_string(),
        ColorKind::Red => console::style(value).red().to_string(),
        ColorKind::Yellow => console::style(value).yellow().to_string(),
    };
    println!("  {label}: {styled}");
}

fn print_verdict(message: &str, color: bool, kind: ColorKind) {
    if !color {
        println!("{message}");
        return;
    }
    let styled = match kind {
        ColorKind::Green => console::style(message).green().bold().to_string(),
        ColorKind::Red => console::style(message).red().bold().to_string(),
        ColorKind::Yellow => console::style(message).yellow().bold().to_string(),
    };
    println!("{styled}");
}
