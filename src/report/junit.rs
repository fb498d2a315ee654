//! JUnit-XML formatter: `testsuites`/`testsuite`/`testcase`/`failure`.
//!
//! Hand-rolled with `quick-xml`'s `Writer`/`BytesStart` API rather than a
//! serde-derived mapping — JUnit's mixed attribute/nested-element shape
//! doesn't suit a derive.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::result::{FileSuite, TestResult, TestRunSummary, TestStatus};

pub fn render(summary: &TestRunSummary) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let _ = writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)));

    let mut testsuites = BytesStart::new("testsuites");
    testsuites.push_attribute(("name", "resty"));
    testsuites.push_attribute(("tests", summary.total().to_string().as_str()));
    testsuites.push_attribute(("failures", summary.failed().to_string().as_str()));
    testsuites.push_attribute(("skipped", summary.skipped().to_string().as_str()));
    let _ = writer.write_event(Event::Start(testsuites));

    for file in &summary.files {
        write_testsuite(&mut writer, file);
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("testsuites")));

    String::from_utf8(writer.into_inner().into_inner()).unwrap_or_default()
}

fn write_testsuite(writer: &mut Writer<Cursor<Vec<u8>>>, file: &FileSuite) {
    let tests = file.results.len();
    let failures = file
        .results
        .iter()
        .filter(|r| r.status == TestStatus::Failed)
        .count();
    let skipped = file
        .results
        .iter()
        .filter(|r| r.status == TestStatus::Skipped)
        .count();
    let time: f64 = file
        .results
        .iter()
        .filter_map(TestResult::duration)
        .map(|d| d.as_secs_f64())
        .sum();

    let mut elem = BytesStart::new("testsuite");
    elem.push_attribute(("name", file.path.display().to_string().as_str()));
    elem.push_attribute(("tests", tests.to_string().as_str()));
    elem.push_attribute(("failures", failures.to_string().as_str()));
    elem.push_attribute(("skipped", skipped.to_string().as_str()));
    elem.push_attribute(("time", format!("{time:.3}").as_str()));
    let _ = writer.write_event(Event::Start(elem));

    for result in &file.results {
        write_testcase(writer, result);
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("testsuite")));
}

fn write_testcase(writer: &mut Writer<Cursor<Vec<u8>>>, result: &TestResult) {
    let time = result.duration().map(|d| d.as_secs_f64()).unwrap_or(0.0);

    let mut elem = BytesStart::new("testcase");
    elem.push_attribute(("name", result.name.as_str()));
    elem.push_attribute(("classname", result.source_file.display().to_string().as_str()));
    elem.push_attribute(("time", format!("{time:.3}").as_str()));

    match result.status {
        TestStatus::Failed => {
            let _ = writer.write_event(Event::Start(elem));
            write_failure(writer, result.error.as_deref().unwrap_or("test failed"));
            let _ = writer.write_event(Event::End(BytesEnd::new("testcase")));
        }
        TestStatus::Skipped => {
            let _ = writer.write_event(Event::Start(elem));
            let mut skipped = BytesStart::new("skipped");
            if let Some(reason) = &result.error {
                skipped.push_attribute(("message", reason.as_str()));
            }
            let _ = writer.write_event(Event::Empty(skipped));
            let _ = writer.write_event(Event::End(BytesEnd::new("testcase")));
        }
        _ => {
            let _ = writer.write_event(Event::Empty(elem));
        }
    }
}

fn write_failure(writer: &mut Writer<Cursor<Vec<u8>>>, message: &str) {
    let mut elem = BytesStart::new("failure");
    elem.push_attribute(("message", message));
    let _ = writer.write_event(Event::Start(elem));
    let _ = writer.write_event(Event::Text(BytesText::new(message)));
    let _ = writer.write_event(Event::End(BytesEnd::new("failure")));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn renders_testsuites_with_a_failure_element() {
        let mut summary = TestRunSummary::new();
        let mut failing = TestResult::not_run("login", &PathBuf::from("a.resty"), 1);
        failing.status = TestStatus::Failed;
        failing.error = Some("expected status 200, got 404".to_string());
        summary.push_file(PathBuf::from("a.resty"), vec![failing]);

        let xml = render(&summary);
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<testsuites"));
        assert!(xml.contains(r#"name="login""#));
        assert!(xml.contains("<failure"));
        assert!(xml.contains("expected status 200"));
    }

    #[test]
    fn passing_test_is_a_self_closed_testcase() {
        let mut summary = TestRunSummary::new();
        let mut passing = TestResult::not_run("ok", &PathBuf::from("a.resty"), 1);
        passing.status = TestStatus::Passed;
        summary.push_file(PathBuf::from("a.resty"), vec![passing]);

        let xml = render(&summary);
        assert!(xml.contains(r#"<testcase name="ok""#));
        assert!(!xml.contains("<failure"));
    }
}
