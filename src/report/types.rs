use crate::runner::state::{ResultStatus, ScenarioState};
use crate::store::types::{LatestResult, Scenario, ScenarioId, TestResult};
use serde::{Deserialize, Serialize};

/// Run history of one scenario, newest run first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioHistory {
    pub id: ScenarioId,
    pub name: String,
    pub html_filename: String,
    pub step_count: usize,
    pub state: ScenarioState,
    pub latest_result: Option<LatestResult>,
    pub results: Vec<TestResult>,
}

impl From<&Scenario> for ScenarioHistory {
    fn from(scenario: &Scenario) -> Self {
        Self {
            id: scenario.id,
            name: scenario.name.clone(),
            html_filename: scenario.html.filename.clone(),
            step_count: scenario.steps.len(),
            state: scenario.state(),
            latest_result: scenario.latest_result().map(LatestResult::from),
            results: scenario.results.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_runs: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub total_duration_ms: u64,
}

/// Test history for report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryReport {
    pub scenarios: Vec<ScenarioHistory>,
    pub summary: RunSummary,
    pub generated_at: String,
}

impl HistoryReport {
    pub fn new(scenarios: &[Scenario]) -> Self {
        let scenarios: Vec<ScenarioHistory> = scenarios.iter().map(ScenarioHistory::from).collect();
        let mut summary = RunSummary::default();
        for result in scenarios.iter().flat_map(|s| &s.results) {
            summary.total_runs += 1;
            summary.total_duration_ms += result.duration_ms;
            match result.status {
                ResultStatus::Passed => summary.passed += 1,
                ResultStatus::Failed => summary.failed += 1,
                ResultStatus::Error => summary.errors += 1,
            }
        }
        Self {
            scenarios,
            summary,
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}
