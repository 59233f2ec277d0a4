//! Error types for the test builder
//!
//! Row-level and run-level failures are values, not aborts: `RowError`s are
//! collected into import summaries and `ExecutionError`s are recorded as
//! results with `status=error`.

use crate::parser::types::Action;
use crate::store::types::{ScenarioId, StepId};
use thiserror::Error;

/// Why a CSV row or form submission could not become a step
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("Expected at least {expected} columns (selector, action, value), found {found}")]
    MissingColumns { expected: usize, found: usize },

    #[error("Unreadable row: {0}")]
    Unreadable(String),

    #[error("Invalid action '{action}'. Must be one of: {}", Action::vocabulary())]
    InvalidAction { action: String },

    #[error("Selector required for action '{action}'")]
    SelectorRequired { action: Action },

    #[error("Value required for action '{action}'")]
    ValueRequired { action: Action },

    #[error("Attribute name required for expectAttr action. Add a 4th column with the attribute name (e.g., 'href')")]
    AttrRequired,
}

/// Failures of the persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Test scenario {0} not found")]
    ScenarioNotFound(ScenarioId),

    #[error("Test step {0} not found")]
    StepNotFound(StepId),

    #[error("Step order {step_order} is already used in scenario {scenario_id}")]
    DuplicateStepOrder { scenario_id: ScenarioId, step_order: u32 },

    #[error("Step order must be a positive integer")]
    InvalidStepOrder,

    #[error("No step order left after {0}")]
    StepOrderExhausted(u32),

    #[error("Stored step {id} is invalid: {source}")]
    CorruptStep {
        id: StepId,
        #[source]
        source: RowError,
    },

    #[error("Stored value is invalid: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures inside an executor; recorded as `status=error`, never thrown past the coordinator
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("HTML source could not be parsed: {0}")]
    Html(#[from] crate::html::HtmlError),

    #[error("Executor unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a run was not started or could not be recorded
#[derive(Error, Debug)]
pub enum RunError {
    #[error("No test steps found for scenario {0}")]
    NoSteps(ScenarioId),

    #[error("A run is already in progress for scenario {0}")]
    AlreadyRunning(ScenarioId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by an editor session operation
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Invalid(#[from] RowError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Run(#[from] RunError),
}
