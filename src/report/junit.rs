use super::types::{HistoryReport, ScenarioHistory};
use crate::runner::state::ResultStatus;
use crate::store::types::TestResult;
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

fn seconds(ms: u64) -> String {
    (ms as f64 / 1000.0).to_string()
}

fn count(results: &[TestResult], status: ResultStatus) -> usize {
    results.iter().filter(|r| r.status == status).count()
}

/// Generate JUnit XML: one testsuite per scenario, one testcase per recorded run
pub fn generate_junit_xml(report: &HistoryReport) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "test-builder"));
    suites_start.push_attribute(("tests", report.summary.total_runs.to_string().as_str()));
    suites_start.push_attribute(("failures", report.summary.failed.to_string().as_str()));
    suites_start.push_attribute(("errors", report.summary.errors.to_string().as_str()));
    suites_start.push_attribute(("time", seconds(report.summary.total_duration_ms).as_str()));
    writer.write_event(Event::Start(suites_start))?;

    for scenario in &report.scenarios {
        write_test_suite(&mut writer, scenario, &report.generated_at)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let result = writer.into_inner().into_inner();
    Ok(String::from_utf8(result)?)
}

fn write_test_suite<W: std::io::Write>(
    writer: &mut Writer<W>,
    scenario: &ScenarioHistory,
    generated_at: &str,
) -> Result<()> {
    let total_ms: u64 = scenario.results.iter().map(|r| r.duration_ms).sum();
    let id = scenario.id.to_string();

    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", scenario.name.as_str()));
    suite_start.push_attribute(("id", id.as_str()));
    suite_start.push_attribute(("tests", scenario.results.len().to_string().as_str()));
    suite_start.push_attribute((
        "failures",
        count(&scenario.results, ResultStatus::Failed).to_string().as_str(),
    ));
    suite_start.push_attribute((
        "errors",
        count(&scenario.results, ResultStatus::Error).to_string().as_str(),
    ));
    suite_start.push_attribute(("time", seconds(total_ms).as_str()));
    suite_start.push_attribute(("timestamp", generated_at));
    writer.write_event(Event::Start(suite_start))?;

    for result in &scenario.results {
        write_test_case(writer, scenario, result)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    Ok(())
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    scenario: &ScenarioHistory,
    result: &TestResult,
) -> Result<()> {
    let name = format!(
        "run {} ({})",
        result.id,
        result.execution_time.format("%Y-%m-%d %H:%M:%S")
    );
    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", name.as_str()));
    case_start.push_attribute(("classname", scenario.html_filename.as_str()));
    case_start.push_attribute(("time", seconds(result.duration_ms).as_str()));
    writer.write_event(Event::Start(case_start))?;

    let element = match result.status {
        ResultStatus::Passed => None,
        ResultStatus::Failed => Some(("failure", "AssertionError")),
        ResultStatus::Error => Some(("error", "ExecutionError")),
    };
    if let Some((tag, kind)) = element {
        let message = result.error_message.as_deref().unwrap_or("Unknown error");
        let mut start = BytesStart::new(tag);
        start.push_attribute(("message", message));
        start.push_attribute(("type", kind));
        writer.write_event(Event::Start(start))?;
        writer.write_event(Event::Text(BytesText::new(message)))?;
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
    }

    if let Some(logs) = &result.logs {
        writer.write_event(Event::Start(BytesStart::new("system-out")))?;
        writer.write_event(Event::Text(BytesText::new(logs)))?;
        writer.write_event(Event::End(BytesEnd::new("system-out")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Generate JUnit report to a file or stdout
pub async fn generate(report: &HistoryReport, output: Option<&Path>) -> Result<()> {
    let xml = generate_junit_xml(report)?;
    if let Some(path) = output {
        tokio::fs::write(path, xml).await?;
        println!("JUnit report saved to: {}", path.display());
    } else {
        println!("{}", xml);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::types::RunSummary;
    use crate::runner::state::ScenarioState;
    use chrono::{TimeZone, Utc};

    fn result(id: i64, status: ResultStatus, error: Option<&str>) -> TestResult {
        TestResult {
            id,
            status,
            execution_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, id as u32).unwrap(),
            duration_ms: 1500,
            error_message: error.map(str::to_string),
            screenshot_path: None,
            logs: Some("Executing step 1: click on cta".to_string()),
        }
    }

    #[test]
    fn test_generate_junit_xml() {
        let report = HistoryReport {
            scenarios: vec![ScenarioHistory {
                id: 4,
                name: "Checkout".to_string(),
                html_filename: "checkout.html".to_string(),
                step_count: 3,
                state: ScenarioState::Tested,
                latest_result: None,
                results: vec![
                    result(3, ResultStatus::Error, Some("Executor unavailable: timeout")),
                    result(2, ResultStatus::Failed, Some("Element cta not found")),
                    result(1, ResultStatus::Passed, None),
                ],
            }],
            summary: RunSummary {
                total_runs: 3,
                passed: 1,
                failed: 1,
                errors: 1,
                total_duration_ms: 4500,
            },
            generated_at: "2024-05-01 12:00:00".to_string(),
        };

        let xml = generate_junit_xml(&report).expect("Failed to generate XML");

        assert!(xml.contains(r#"<testsuites name="test-builder""#));
        assert!(xml.contains(r#"<testsuite name="Checkout" id="4" tests="3" failures="1" errors="1""#));
        assert!(xml.contains(r#"classname="checkout.html""#));
        assert!(xml.contains(r#"<failure message="Element cta not found" type="AssertionError">"#));
        assert!(xml.contains(r#"<error message="Executor unavailable: timeout" type="ExecutionError">"#));
        assert!(xml.contains("<system-out>Executing step 1: click on cta</system-out>"));
    }
}
