use super::types::canonical_order;
use super::{
    check_step_order, NewResult, NewScenario, Scenario, ScenarioId, ScenarioRepository,
    ScenarioSummary, Step, StepId, StepInput, TestResult,
};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    next_id: i64,
    scenarios: BTreeMap<ScenarioId, Scenario>,
}

impl Inner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn scenario_mut(&mut self, id: ScenarioId) -> Result<&mut Scenario, StoreError> {
        self.scenarios
            .get_mut(&id)
            .ok_or(StoreError::ScenarioNotFound(id))
    }

    fn owner_of(&self, step_id: StepId) -> Result<ScenarioId, StoreError> {
        self.scenarios
            .values()
            .find(|s| s.steps.iter().any(|step| step.id == step_id))
            .map(|s| s.id)
            .ok_or(StoreError::StepNotFound(step_id))
    }
}

/// Process-local repository, used for tests and `memory://` databases
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn ensure_unique_order(
    scenario: &Scenario,
    step_order: u32,
    except: Option<StepId>,
) -> Result<(), StoreError> {
    let taken = scenario
        .steps
        .iter()
        .any(|s| s.step_order == step_order && Some(s.id) != except);
    if taken {
        Err(StoreError::DuplicateStepOrder {
            scenario_id: scenario.id,
            step_order,
        })
    } else {
        Ok(())
    }
}

#[async_trait]
impl ScenarioRepository for MemoryRepository {
    async fn create_scenario(&self, scenario: NewScenario) -> Result<Scenario, StoreError> {
        let mut inner = self.inner.write().await;
        let id = inner.allocate_id();
        let now = Utc::now();
        let created = Scenario {
            id,
            name: scenario.name,
            description: scenario.description,
            html: super::HtmlSource {
                filename: scenario.html_filename,
                content: scenario.html_content,
            },
            created_at: now,
            updated_at: now,
            steps: Vec::new(),
            results: Vec::new(),
        };
        inner.scenarios.insert(id, created.clone());
        Ok(created)
    }

    async fn list_scenarios(&self) -> Result<Vec<ScenarioSummary>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .scenarios
            .values()
            .map(|s| {
                let mut s = s.clone();
                canonical_order(&mut s.steps, &mut s.results);
                s.summary()
            })
            .collect())
    }

    async fn get_scenario(&self, id: ScenarioId) -> Result<Scenario, StoreError> {
        let inner = self.inner.read().await;
        let mut scenario = inner
            .scenarios
            .get(&id)
            .cloned()
            .ok_or(StoreError::ScenarioNotFound(id))?;
        canonical_order(&mut scenario.steps, &mut scenario.results);
        Ok(scenario)
    }

    async fn delete_scenario(&self, id: ScenarioId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .scenarios
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::ScenarioNotFound(id))
    }

    async fn create_step(
        &self,
        scenario_id: ScenarioId,
        input: StepInput,
    ) -> Result<Step, StoreError> {
        check_step_order(input.step_order)?;
        let mut inner = self.inner.write().await;
        ensure_unique_order(inner.scenario_mut(scenario_id)?, input.step_order, None)?;

        let step = input.into_step(inner.allocate_id());
        let scenario = inner.scenario_mut(scenario_id)?;
        scenario.steps.push(step.clone());
        scenario.updated_at = Utc::now();
        Ok(step)
    }

    async fn update_step(&self, step_id: StepId, input: StepInput) -> Result<Step, StoreError> {
        check_step_order(input.step_order)?;
        let mut inner = self.inner.write().await;
        let scenario_id = inner.owner_of(step_id)?;
        let scenario = inner.scenario_mut(scenario_id)?;
        ensure_unique_order(scenario, input.step_order, Some(step_id))?;

        let step = input.into_step(step_id);
        if let Some(slot) = scenario.steps.iter_mut().find(|s| s.id == step_id) {
            *slot = step.clone();
        }
        scenario.updated_at = Utc::now();
        Ok(step)
    }

    async fn delete_step(&self, step_id: StepId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let scenario_id = inner.owner_of(step_id)?;
        let scenario = inner.scenario_mut(scenario_id)?;
        scenario.steps.retain(|s| s.id != step_id);
        scenario.updated_at = Utc::now();
        Ok(())
    }

    async fn step_owner(&self, step_id: StepId) -> Result<ScenarioId, StoreError> {
        self.inner.read().await.owner_of(step_id)
    }

    async fn append_result(
        &self,
        scenario_id: ScenarioId,
        result: NewResult,
    ) -> Result<TestResult, StoreError> {
        let mut inner = self.inner.write().await;
        inner.scenario_mut(scenario_id)?;
        let result = result.into_result(inner.allocate_id());
        inner.scenario_mut(scenario_id)?.results.push(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::StepKind;
    use crate::runner::state::ResultStatus;
    use chrono::Duration;

    fn new_scenario() -> NewScenario {
        NewScenario {
            name: "Landing page".to_string(),
            description: None,
            html_filename: "landing.html".to_string(),
            html_content: "<h1 data-testid=\"title\">Hi</h1>".to_string(),
        }
    }

    fn click(order: u32) -> StepInput {
        StepInput::new(
            order,
            StepKind::Click {
                selector: "cta".to_string(),
                value: "go".to_string(),
            },
        )
    }

    fn result_at(offset_secs: i64) -> NewResult {
        NewResult {
            status: ResultStatus::Passed,
            execution_time: Utc::now() + Duration::seconds(offset_secs),
            duration_ms: 10,
            error_message: None,
            screenshot_path: None,
            logs: None,
        }
    }

    #[tokio::test]
    async fn test_steps_read_back_in_order() {
        let repo = MemoryRepository::new();
        let scenario = repo.create_scenario(new_scenario()).await.unwrap();
        repo.create_step(scenario.id, click(3)).await.unwrap();
        repo.create_step(scenario.id, click(1)).await.unwrap();
        repo.create_step(scenario.id, click(2)).await.unwrap();

        let loaded = repo.get_scenario(scenario.id).await.unwrap();
        let orders: Vec<_> = loaded.steps.iter().map(|s| s.step_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_duplicate_and_zero_orders_rejected() {
        let repo = MemoryRepository::new();
        let scenario = repo.create_scenario(new_scenario()).await.unwrap();
        repo.create_step(scenario.id, click(1)).await.unwrap();

        assert!(matches!(
            repo.create_step(scenario.id, click(1)).await,
            Err(StoreError::DuplicateStepOrder { step_order: 1, .. })
        ));
        assert!(matches!(
            repo.create_step(scenario.id, click(0)).await,
            Err(StoreError::InvalidStepOrder)
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_own_order() {
        let repo = MemoryRepository::new();
        let scenario = repo.create_scenario(new_scenario()).await.unwrap();
        let step = repo.create_step(scenario.id, click(1)).await.unwrap();
        let other = repo.create_step(scenario.id, click(2)).await.unwrap();

        let mut input = click(1);
        input.description = Some("primary CTA".to_string());
        let updated = repo.update_step(step.id, input).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("primary CTA"));

        assert!(matches!(
            repo.update_step(other.id, click(1)).await,
            Err(StoreError::DuplicateStepOrder { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_leaves_gaps() {
        let repo = MemoryRepository::new();
        let scenario = repo.create_scenario(new_scenario()).await.unwrap();
        repo.create_step(scenario.id, click(1)).await.unwrap();
        let middle = repo.create_step(scenario.id, click(2)).await.unwrap();
        repo.create_step(scenario.id, click(3)).await.unwrap();

        repo.delete_step(middle.id).await.unwrap();
        let loaded = repo.get_scenario(scenario.id).await.unwrap();
        let orders: Vec<_> = loaded.steps.iter().map(|s| s.step_order).collect();
        assert_eq!(orders, vec![1, 3]);
        assert!(matches!(
            repo.delete_step(middle.id).await,
            Err(StoreError::StepNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_results_newest_first() {
        let repo = MemoryRepository::new();
        let scenario = repo.create_scenario(new_scenario()).await.unwrap();
        let older = repo.append_result(scenario.id, result_at(-60)).await.unwrap();
        let newer = repo.append_result(scenario.id, result_at(0)).await.unwrap();

        let loaded = repo.get_scenario(scenario.id).await.unwrap();
        assert_eq!(loaded.latest_result().unwrap().id, newer.id);
        assert_eq!(loaded.results[1].id, older.id);

        let summaries = repo.list_scenarios().await.unwrap();
        assert_eq!(summaries[0].step_count, 0);
        assert_eq!(
            summaries[0].latest_result.as_ref().unwrap().execution_time,
            newer.execution_time
        );
    }

    #[tokio::test]
    async fn test_delete_scenario() {
        let repo = MemoryRepository::new();
        let scenario = repo.create_scenario(new_scenario()).await.unwrap();
        repo.delete_scenario(scenario.id).await.unwrap();
        assert!(matches!(
            repo.get_scenario(scenario.id).await,
            Err(StoreError::ScenarioNotFound(_))
        ));
    }
}
