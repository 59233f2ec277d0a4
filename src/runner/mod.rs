//! Run-and-record execution
//!
//! [`ExecutionCoordinator::run_test`] triggers exactly one executor run for a
//! scenario and appends exactly one result to its history, whatever the
//! executor does.

pub mod events;
pub mod executor;
pub mod state;

use crate::error::RunError;
use crate::store::types::{NewResult, ScenarioId, TestResult};
use crate::store::SharedRepository;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::broadcast;

pub use events::*;
pub use executor::*;
pub use state::*;

pub struct ExecutionCoordinator {
    repo: SharedRepository,
    executor: Arc<dyn ScenarioExecutor>,
    emitter: EventEmitter,
    in_flight: Mutex<HashSet<ScenarioId>>,
}

/// Marks a scenario as running until dropped
struct InFlight<'a> {
    set: &'a Mutex<HashSet<ScenarioId>>,
    scenario_id: ScenarioId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.scenario_id);
    }
}

impl ExecutionCoordinator {
    pub fn new(repo: SharedRepository, executor: Arc<dyn ScenarioExecutor>) -> Self {
        Self {
            repo,
            executor,
            emitter: EventEmitter::default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn repository(&self) -> &SharedRepository {
        &self.repo
    }

    pub fn events(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Subscribe to import and run events
    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.emitter.subscribe()
    }

    pub fn is_running(&self, scenario_id: ScenarioId) -> bool {
        let set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.contains(&scenario_id)
    }

    fn begin(&self, scenario_id: ScenarioId) -> Result<InFlight<'_>, RunError> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(scenario_id) {
            return Err(RunError::AlreadyRunning(scenario_id));
        }
        Ok(InFlight {
            set: &self.in_flight,
            scenario_id,
        })
    }

    /// Run a scenario once and record the outcome.
    ///
    /// Rejected without recording anything if the scenario is unknown, has no
    /// steps, or is already running. Executor failures are recorded as
    /// `status=error`.
    pub async fn run_test(&self, scenario_id: ScenarioId) -> Result<TestResult, RunError> {
        let _running = self.begin(scenario_id)?;

        let scenario = self.repo.get_scenario(scenario_id).await?;
        if !scenario.state().can_run() {
            log::warn!("Scenario {} has no steps, not running", scenario_id);
            return Err(RunError::NoSteps(scenario_id));
        }

        let request = ExecutionRequest {
            scenario_id,
            scenario_name: scenario.name.clone(),
            html: scenario.html.clone(),
            steps: scenario.steps.clone(),
        };

        log::info!(
            "Running scenario {} '{}' ({} steps, {} executor)",
            scenario_id,
            scenario.name,
            request.steps.len(),
            self.executor.name()
        );
        self.emitter.emit(TestEvent::RunStarted {
            scenario_id,
            scenario_name: scenario.name.clone(),
            step_count: request.steps.len(),
        });

        let execution_time = Utc::now();
        let started = Instant::now();
        let report = match self.executor.run_scenario(&request, &self.emitter).await {
            Ok(report) => report,
            Err(e) => {
                log::error!("Executor failed on scenario {}: {}", scenario_id, e);
                ExecutionReport::error(e.to_string(), vec![format!("Test failed: {}", e)])
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = self
            .repo
            .append_result(
                scenario_id,
                NewResult {
                    status: report.status,
                    execution_time,
                    duration_ms,
                    error_message: report.error_message.clone(),
                    screenshot_path: report.screenshot_path.clone(),
                    logs: (!report.logs.is_empty()).then(|| report.logs.join("\n")),
                },
            )
            .await?;

        log::info!(
            "Scenario {} finished: {} in {}ms",
            scenario_id,
            result.status,
            result.duration_ms
        );
        self.emitter.emit(TestEvent::RunFinished {
            scenario_id,
            status: result.status,
            duration_ms: result.duration_ms,
            error_message: result.error_message.clone(),
        });

        Ok(result)
    }
}
