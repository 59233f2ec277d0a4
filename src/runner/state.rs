use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of one scenario run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Passed,
    Failed,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Passed => "passed",
            ResultStatus::Failed => "failed",
            ResultStatus::Error => "error",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passed" => Ok(ResultStatus::Passed),
            "failed" => Ok(ResultStatus::Failed),
            "error" => Ok(ResultStatus::Error),
            other => Err(format!("unknown result status '{}'", other)),
        }
    }
}

/// Scenario lifecycle as seen by the editor
///
/// `Draft` (no steps) -> `HasSteps` -> `Tested` (at least one result).
/// Removing the last step returns to `Draft`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    Draft,
    HasSteps,
    Tested,
}

impl ScenarioState {
    pub fn of(step_count: usize, result_count: usize) -> Self {
        if step_count == 0 {
            ScenarioState::Draft
        } else if result_count == 0 {
            ScenarioState::HasSteps
        } else {
            ScenarioState::Tested
        }
    }

    /// Whether `runTest` is allowed from this state
    pub fn can_run(&self) -> bool {
        !matches!(self, ScenarioState::Draft)
    }
}

/// What an executor reports back for one run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionReport {
    pub status: ResultStatus,
    pub error_message: Option<String>,
    pub screenshot_path: Option<String>,
    pub logs: Vec<String>,
    /// `step_order` of the step that stopped the run, if any
    pub failed_step: Option<u32>,
}

impl ExecutionReport {
    pub fn passed(logs: Vec<String>) -> Self {
        Self {
            status: ResultStatus::Passed,
            error_message: None,
            screenshot_path: None,
            logs,
            failed_step: None,
        }
    }

    pub fn failed(step_order: u32, error: String, logs: Vec<String>) -> Self {
        Self {
            status: ResultStatus::Failed,
            error_message: Some(error),
            screenshot_path: None,
            logs,
            failed_step: Some(step_order),
        }
    }

    pub fn error(error: String, logs: Vec<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            error_message: Some(error),
            screenshot_path: None,
            logs,
            failed_step: None,
        }
    }
}
