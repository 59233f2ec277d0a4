use crate::error::StoreError;
use crate::parser::types::StepKind;
use crate::runner::state::{ResultStatus, ScenarioState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ScenarioId = i64;
pub type StepId = i64;
pub type ResultId = i64;

/// HTML document a scenario is tested against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlSource {
    pub filename: String,
    pub content: String,
}

/// One stored test step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub step_order: u32,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Payload for creating or replacing a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInput {
    pub step_order: u32,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StepInput {
    pub fn new(step_order: u32, kind: StepKind) -> Self {
        Self {
            step_order,
            kind,
            description: None,
        }
    }

    pub fn into_step(self, id: StepId) -> Step {
        Step {
            id,
            step_order: self.step_order,
            kind: self.kind,
            description: self.description,
        }
    }
}

/// One recorded run of a scenario; immutable once stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: ResultId,
    pub status: ResultStatus,
    pub execution_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub screenshot_path: Option<String>,
    pub logs: Option<String>,
}

/// A run outcome ready to be appended to a scenario's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResult {
    pub status: ResultStatus,
    pub execution_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub screenshot_path: Option<String>,
    pub logs: Option<String>,
}

impl NewResult {
    pub fn into_result(self, id: ResultId) -> TestResult {
        TestResult {
            id,
            status: self.status,
            execution_time: self.execution_time,
            duration_ms: self.duration_ms,
            error_message: self.error_message,
            screenshot_path: self.screenshot_path,
            logs: self.logs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_filename: String,
    pub html_content: String,
}

/// A scenario with its steps (ascending `step_order`) and results (newest first)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,
    pub name: String,
    pub description: Option<String>,
    pub html: HtmlSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub steps: Vec<Step>,
    pub results: Vec<TestResult>,
}

impl Scenario {
    pub fn state(&self) -> ScenarioState {
        ScenarioState::of(self.steps.len(), self.results.len())
    }

    /// The most recently recorded result
    pub fn latest_result(&self) -> Option<&TestResult> {
        self.results.first()
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Order that every new step must exceed: the larger of the step count and the highest order
    pub fn base_step_order(&self) -> u32 {
        let max_order = self.steps.iter().map(|s| s.step_order).max().unwrap_or(0);
        max_order.max(self.steps.len() as u32)
    }

    pub fn next_step_order(&self) -> Result<u32, StoreError> {
        let base = self.base_step_order();
        base.checked_add(1).ok_or(StoreError::StepOrderExhausted(base))
    }

    pub fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            html_filename: self.html.filename.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            step_count: self.steps.len(),
            latest_result: self.latest_result().map(LatestResult::from),
        }
    }
}

/// Latest-run fields shown in scenario listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestResult {
    pub status: ResultStatus,
    pub execution_time: DateTime<Utc>,
    pub duration_ms: u64,
}

impl From<&TestResult> for LatestResult {
    fn from(result: &TestResult) -> Self {
        Self {
            status: result.status,
            execution_time: result.execution_time,
            duration_ms: result.duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub id: ScenarioId,
    pub name: String,
    pub description: Option<String>,
    pub html_filename: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub step_count: usize,
    pub latest_result: Option<LatestResult>,
}

/// Sort steps by execution order and results newest first
pub(crate) fn canonical_order(steps: &mut [Step], results: &mut [TestResult]) {
    steps.sort_by_key(|s| (s.step_order, s.id));
    results.sort_by(|a, b| {
        b.execution_time
            .cmp(&a.execution_time)
            .then(b.id.cmp(&a.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_json_shape() {
        let step = StepInput::new(
            3,
            StepKind::ExpectAttr {
                selector: "cta".to_string(),
                value: "https://example.com".to_string(),
                attr: "href".to_string(),
            },
        )
        .into_step(7);
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "step_order": 3,
                "action": "expectAttr",
                "selector": "cta",
                "value": "https://example.com",
                "attr": "href"
            })
        );
        let back: Step = serde_json::from_value(json).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn test_base_step_order_respects_gaps() {
        let now = Utc::now();
        let step = |id, order| {
            StepInput::new(
                order,
                StepKind::WaitForPageLoad {
                    selector: None,
                    value: None,
                },
            )
            .into_step(id)
        };
        let scenario = Scenario {
            id: 1,
            name: "gaps".to_string(),
            description: None,
            html: HtmlSource {
                filename: "index.html".to_string(),
                content: String::new(),
            },
            created_at: now,
            updated_at: now,
            steps: vec![step(1, 1), step(2, 5)],
            results: vec![],
        };
        assert_eq!(scenario.base_step_order(), 5);
        assert_eq!(scenario.next_step_order().unwrap(), 6);
        assert_eq!(scenario.state(), ScenarioState::HasSteps);
    }

    #[test]
    fn test_next_step_order_at_the_top_of_the_range() {
        let now = Utc::now();
        let scenario = Scenario {
            id: 1,
            name: "full".to_string(),
            description: None,
            html: HtmlSource {
                filename: "index.html".to_string(),
                content: String::new(),
            },
            created_at: now,
            updated_at: now,
            steps: vec![StepInput::new(
                u32::MAX,
                StepKind::WaitForPageLoad {
                    selector: None,
                    value: None,
                },
            )
            .into_step(1)],
            results: vec![],
        };
        assert!(matches!(
            scenario.next_step_order(),
            Err(StoreError::StepOrderExhausted(u32::MAX))
        ));
    }
}
