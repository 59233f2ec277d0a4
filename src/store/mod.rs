//! Scenario, step and result persistence
//!
//! [`ScenarioRepository`] is the only way the rest of the crate touches stored
//! scenarios. Callers hold it behind an `Arc` and re-read the whole scenario
//! after every write.

pub mod memory;
pub mod session;
pub mod sqlite;
pub mod types;

use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;

pub use memory::MemoryRepository;
pub use session::{DeleteConfirmation, DeleteRequest, ScenarioSession};
pub use sqlite::SqliteRepository;
pub use types::*;

/// Storage for scenarios and everything they own
#[async_trait]
pub trait ScenarioRepository: Send + Sync {
    async fn create_scenario(&self, scenario: NewScenario) -> Result<Scenario, StoreError>;

    /// All scenarios with step counts and latest results, oldest first
    async fn list_scenarios(&self) -> Result<Vec<ScenarioSummary>, StoreError>;

    /// Canonical read: steps ascending by `step_order`, results newest first
    async fn get_scenario(&self, id: ScenarioId) -> Result<Scenario, StoreError>;

    /// Delete a scenario together with its steps and results
    async fn delete_scenario(&self, id: ScenarioId) -> Result<(), StoreError>;

    /// Add a step; fails if `step_order` is zero or already used in the scenario
    async fn create_step(
        &self,
        scenario_id: ScenarioId,
        input: StepInput,
    ) -> Result<Step, StoreError>;

    /// Replace every field of a step
    async fn update_step(&self, step_id: StepId, input: StepInput) -> Result<Step, StoreError>;

    /// Remove a step; remaining steps keep their orders
    async fn delete_step(&self, step_id: StepId) -> Result<(), StoreError>;

    /// Scenario that owns a step
    async fn step_owner(&self, step_id: StepId) -> Result<ScenarioId, StoreError>;

    /// Append an immutable result to the scenario's history
    async fn append_result(
        &self,
        scenario_id: ScenarioId,
        result: NewResult,
    ) -> Result<TestResult, StoreError>;
}

pub type SharedRepository = Arc<dyn ScenarioRepository>;

/// Open the repository named by a database URL.
///
/// `memory://` keeps everything in process; anything else is a SQLite URL.
pub async fn open(database: &str) -> Result<SharedRepository, StoreError> {
    if database == "memory://" {
        log::info!("Using in-memory scenario store");
        Ok(Arc::new(MemoryRepository::new()))
    } else {
        log::info!("Using SQLite scenario store at {}", database);
        Ok(Arc::new(SqliteRepository::connect(database).await?))
    }
}

pub(crate) fn check_step_order(step_order: u32) -> Result<(), StoreError> {
    if step_order == 0 {
        Err(StoreError::InvalidStepOrder)
    } else {
        Ok(())
    }
}
