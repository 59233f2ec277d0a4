//! Editor session over one scenario
//!
//! Holds the scenario as last read from the repository. Every mutation goes to
//! the repository and is followed by a full reload, successful or not, so the
//! session never shows a state the store does not have.

use super::types::{Scenario, ScenarioId, Step, StepId, StepInput, TestResult};
use super::SharedRepository;
use crate::error::{SessionError, StoreError};
use crate::html::{extract_selector_candidates, HtmlError, SelectorCandidate};
use crate::parser::normalize::Normalizer;
use crate::parser::types::StepForm;
use crate::parser::validate::{validate_form, validate_rows, ImportSummary};
use crate::runner::events::TestEvent;
use crate::runner::state::ScenarioState;
use crate::runner::ExecutionCoordinator;
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Two-press delete: the first press arms, a second press on the same step
/// within the window confirms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteConfirmation {
    #[default]
    Idle,
    PendingConfirm { step_id: StepId, deadline: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteRequest {
    Armed {
        step_id: StepId,
        expires_in: Duration,
    },
    Confirmed(StepId),
}

impl DeleteConfirmation {
    pub fn press(&mut self, step_id: StepId, now: Instant, window: Duration) -> DeleteRequest {
        self.expire(now);
        if self.is_pending_for(step_id, now) {
            *self = DeleteConfirmation::Idle;
            return DeleteRequest::Confirmed(step_id);
        }
        *self = DeleteConfirmation::PendingConfirm {
            step_id,
            deadline: now + window,
        };
        DeleteRequest::Armed {
            step_id,
            expires_in: window,
        }
    }

    /// Drop back to `Idle` once the window has passed
    pub fn expire(&mut self, now: Instant) {
        if let DeleteConfirmation::PendingConfirm { deadline, .. } = *self {
            if now > deadline {
                *self = DeleteConfirmation::Idle;
            }
        }
    }

    pub fn is_pending_for(&self, step_id: StepId, now: Instant) -> bool {
        matches!(*self, DeleteConfirmation::PendingConfirm { step_id: s, deadline } if s == step_id && now <= deadline)
    }
}

pub struct ScenarioSession {
    repo: SharedRepository,
    coordinator: Arc<ExecutionCoordinator>,
    scenario: Scenario,
    confirm: DeleteConfirmation,
    confirm_window: Duration,
}

impl ScenarioSession {
    pub async fn open(
        coordinator: Arc<ExecutionCoordinator>,
        scenario_id: ScenarioId,
        confirm_window: Duration,
    ) -> Result<Self, StoreError> {
        let repo = coordinator.repository().clone();
        let scenario = repo.get_scenario(scenario_id).await?;
        Ok(Self {
            repo,
            coordinator,
            scenario,
            confirm: DeleteConfirmation::Idle,
            confirm_window,
        })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn state(&self) -> ScenarioState {
        self.scenario.state()
    }

    pub fn confirmation(&self) -> DeleteConfirmation {
        self.confirm
    }

    pub async fn reload(&mut self) -> Result<&Scenario, StoreError> {
        self.scenario = self.repo.get_scenario(self.scenario.id).await?;
        Ok(&self.scenario)
    }

    /// Reload after a mutation attempt and pass its outcome through
    async fn settle<T, E>(&mut self, outcome: Result<T, E>) -> Result<T, SessionError>
    where
        SessionError: From<E>,
    {
        let reloaded = self.reload().await.map(|_| ());
        match (outcome, reloaded) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(SessionError::Store(e)),
            (Err(e), reloaded) => {
                if let Err(reload_error) = reloaded {
                    log::warn!(
                        "Reload of scenario {} failed: {}",
                        self.scenario.id,
                        reload_error
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Add a manually entered step; without an explicit order it goes last
    pub async fn add_step(&mut self, form: &StepForm) -> Result<Step, SessionError> {
        let kind = validate_form(form)?;
        let step_order = match form.step_order {
            Some(order) => order,
            None => match self.scenario.next_step_order() {
                Ok(order) => order,
                Err(e) => return self.settle(Err::<Step, _>(e)).await,
            },
        };
        let input = StepInput {
            step_order,
            kind,
            description: form.description.clone(),
        };
        let outcome = self.repo.create_step(self.scenario.id, input).await;
        if let Err(e) = &outcome {
            log::warn!("Adding step to scenario {} failed: {}", self.scenario.id, e);
        }
        self.settle(outcome).await
    }

    /// Replace a step; without an explicit order it keeps its current one
    pub async fn update_step(
        &mut self,
        step_id: StepId,
        form: &StepForm,
    ) -> Result<Step, SessionError> {
        let kind = validate_form(form)?;
        let current = self.scenario.step(step_id).map(|s| s.step_order);
        let Some(step_order) = form.step_order.or(current) else {
            return self.settle(Err::<Step, _>(StoreError::StepNotFound(step_id))).await;
        };
        let input = StepInput {
            step_order,
            kind,
            description: form.description.clone(),
        };
        let outcome = self.repo.update_step(step_id, input).await;
        if let Err(e) = &outcome {
            log::warn!("Updating step {} failed: {}", step_id, e);
        }
        self.settle(outcome).await
    }

    pub async fn delete_step(&mut self, step_id: StepId) -> Result<(), SessionError> {
        self.confirm = DeleteConfirmation::Idle;
        let outcome = self.repo.delete_step(step_id).await;
        if let Err(e) = &outcome {
            log::warn!("Deleting step {} failed: {}", step_id, e);
        }
        self.settle(outcome).await
    }

    /// Press "delete" on a step; the step is removed on the confirming press
    pub async fn request_delete(
        &mut self,
        step_id: StepId,
        now: Instant,
    ) -> Result<DeleteRequest, SessionError> {
        let request = self.confirm.press(step_id, now, self.confirm_window);
        if let DeleteRequest::Confirmed(step_id) = request {
            self.delete_step(step_id).await?;
        }
        Ok(request)
    }

    /// Import CSV rows as new steps after the existing ones.
    ///
    /// Rows are handled one at a time. Rejected rows and failed creates become
    /// diagnostics; the remaining rows are still imported.
    pub async fn import_csv<R: Read + Send>(
        &mut self,
        reader: R,
    ) -> Result<ImportSummary, StoreError> {
        self.reload().await?;
        let scenario_id = self.scenario.id;
        let base = self.scenario.base_step_order();
        let events = self.coordinator.events();
        events.emit(TestEvent::ImportStarted {
            scenario_id,
            base_order: base,
        });

        let mut summary = ImportSummary::default();
        for row in validate_rows(Normalizer::from_reader(reader)) {
            let kind = match row.outcome {
                Ok(kind) => kind,
                Err(e) => {
                    log::warn!("Row {}: {}", row.index, e);
                    events.emit(TestEvent::RowRejected {
                        scenario_id,
                        row: row.index,
                        error: e.to_string(),
                    });
                    summary.reject(row.index, e);
                    continue;
                }
            };

            let Some(step_order) = summary.next_order(base) else {
                let e = StoreError::StepOrderExhausted(base);
                log::warn!("Row {}: {}", row.index, e);
                events.emit(TestEvent::RowRejected {
                    scenario_id,
                    row: row.index,
                    error: e.to_string(),
                });
                summary.reject(row.index, e);
                continue;
            };
            let action = kind.action();
            match self
                .repo
                .create_step(scenario_id, StepInput::new(step_order, kind))
                .await
            {
                Ok(_) => {
                    log::debug!("Row {} imported as step {}", row.index, step_order);
                    events.emit(TestEvent::RowAccepted {
                        scenario_id,
                        row: row.index,
                        step_order,
                        action,
                    });
                    summary.accept();
                }
                Err(e) => {
                    log::warn!("Row {}: {}", row.index, e);
                    events.emit(TestEvent::RowRejected {
                        scenario_id,
                        row: row.index,
                        error: e.to_string(),
                    });
                    summary.reject(row.index, e);
                }
            }
        }

        log::info!(
            "Imported {} steps into scenario {} ({} rows rejected)",
            summary.success_count,
            scenario_id,
            summary.errors.len()
        );
        events.emit(TestEvent::ImportFinished {
            scenario_id,
            success_count: summary.success_count,
            error_count: summary.errors.len(),
        });

        self.reload().await?;
        Ok(summary)
    }

    pub async fn run_test(&mut self) -> Result<TestResult, SessionError> {
        let outcome = self.coordinator.run_test(self.scenario.id).await;
        self.settle(outcome).await
    }

    pub fn selector_candidates(&self) -> Result<Vec<SelectorCandidate>, HtmlError> {
        extract_selector_candidates(&self.scenario.html.content)
    }
}
