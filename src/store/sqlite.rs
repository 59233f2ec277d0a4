//! SQLite-backed scenario store

use super::{
    check_step_order, HtmlSource, LatestResult, NewResult, NewScenario, Scenario, ScenarioId,
    ScenarioRepository, ScenarioSummary, Step, StepId, StepInput, TestResult,
};
use crate::error::StoreError;
use crate::parser::types::{Action, StepKind};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS test_scenario (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        html_content TEXT NOT NULL,
        html_filename TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS test_step (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scenario_id INTEGER NOT NULL REFERENCES test_scenario(id) ON DELETE CASCADE,
        step_order INTEGER NOT NULL,
        action TEXT NOT NULL,
        selector TEXT,
        value TEXT,
        attr TEXT,
        description TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (scenario_id, step_order)
    )",
    "CREATE TABLE IF NOT EXISTS test_result (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scenario_id INTEGER NOT NULL REFERENCES test_scenario(id) ON DELETE CASCADE,
        status TEXT NOT NULL,
        execution_time TEXT NOT NULL,
        duration_ms INTEGER NOT NULL,
        error_message TEXT,
        screenshot_path TEXT,
        logs TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_test_step_scenario ON test_step (scenario_id, step_order)",
    "CREATE INDEX IF NOT EXISTS idx_test_result_scenario ON test_result (scenario_id, execution_time)",
];

const STEP_COLUMNS: &str = "id, step_order, action, selector, value, attr, description";
const RESULT_COLUMNS: &str =
    "id, status, execution_time, duration_ms, error_message, screenshot_path, logs";

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn timestamp_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", text, e)))
}

fn step_from_row(row: &SqliteRow) -> Result<Step, StoreError> {
    let id: StepId = row.try_get("id")?;
    let step_order: i64 = row.try_get("step_order")?;
    let action: String = row.try_get("action")?;

    let corrupt = |source| StoreError::CorruptStep { id, source };
    let action: Action = action.parse().map_err(corrupt)?;
    let kind = StepKind::from_fields(
        action,
        row.try_get::<Option<String>, _>("selector")?,
        row.try_get::<Option<String>, _>("value")?,
        row.try_get::<Option<String>, _>("attr")?,
    )
    .map_err(corrupt)?;

    Ok(Step {
        id,
        step_order: u32::try_from(step_order)
            .map_err(|_| StoreError::Corrupt(format!("step {} has order {}", id, step_order)))?,
        kind,
        description: row.try_get("description")?,
    })
}

fn result_from_row(row: &SqliteRow) -> Result<TestResult, StoreError> {
    let status: String = row.try_get("status")?;
    let execution_time: String = row.try_get("execution_time")?;
    let duration_ms: i64 = row.try_get("duration_ms")?;
    Ok(TestResult {
        id: row.try_get("id")?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        execution_time: parse_timestamp(&execution_time)?,
        duration_ms: duration_ms.max(0) as u64,
        error_message: row.try_get("error_message")?,
        screenshot_path: row.try_get("screenshot_path")?,
        logs: row.try_get("logs")?,
    })
}

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connect to (and create if missing) the database, then apply the schema
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        if !in_memory {
            if let Some(path) = url.strip_prefix("sqlite://") {
                let path = path.split('?').next().unwrap_or(path);
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database lives and dies with its single connection
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
        };

        let pool = pool_options.connect_with(options).await?;
        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        log::debug!("Scenario schema ready");
        Ok(())
    }

    async fn scenario_exists(&self, id: ScenarioId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT id FROM test_scenario WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn order_taken(
        &self,
        scenario_id: ScenarioId,
        step_order: u32,
        except: Option<StepId>,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT id FROM test_step WHERE scenario_id = ? AND step_order = ? AND id != ?",
        )
        .bind(scenario_id)
        .bind(step_order)
        .bind(except.unwrap_or(-1))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn touch(&self, scenario_id: ScenarioId) -> Result<(), StoreError> {
        sqlx::query("UPDATE test_scenario SET updated_at = ? WHERE id = ?")
            .bind(timestamp_text(&Utc::now()))
            .bind(scenario_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn latest_result(&self, scenario_id: ScenarioId) -> Result<Option<LatestResult>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM test_result WHERE scenario_id = ? ORDER BY execution_time DESC, id DESC LIMIT 1",
            RESULT_COLUMNS
        ))
        .bind(scenario_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| result_from_row(&r).map(|res| LatestResult::from(&res)))
            .transpose()
    }
}

#[async_trait]
impl ScenarioRepository for SqliteRepository {
    async fn create_scenario(&self, scenario: NewScenario) -> Result<Scenario, StoreError> {
        let now = parse_timestamp(&timestamp_text(&Utc::now()))?;
        let done = sqlx::query(
            "INSERT INTO test_scenario (name, description, html_content, html_filename, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&scenario.name)
        .bind(&scenario.description)
        .bind(&scenario.html_content)
        .bind(&scenario.html_filename)
        .bind(timestamp_text(&now))
        .bind(timestamp_text(&now))
        .execute(&self.pool)
        .await?;

        let id = done.last_insert_rowid();
        log::info!("Created test scenario {} ({})", id, scenario.name);
        Ok(Scenario {
            id,
            name: scenario.name,
            description: scenario.description,
            html: HtmlSource {
                filename: scenario.html_filename,
                content: scenario.html_content,
            },
            created_at: now,
            updated_at: now,
            steps: Vec::new(),
            results: Vec::new(),
        })
    }

    async fn list_scenarios(&self) -> Result<Vec<ScenarioSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT s.id, s.name, s.description, s.html_filename, s.created_at, s.updated_at,
                    (SELECT COUNT(*) FROM test_step t WHERE t.scenario_id = s.id) AS step_count
             FROM test_scenario s ORDER BY s.id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: ScenarioId = row.try_get("id")?;
            let created_at: String = row.try_get("created_at")?;
            let updated_at: String = row.try_get("updated_at")?;
            let step_count: i64 = row.try_get("step_count")?;
            summaries.push(ScenarioSummary {
                id,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                html_filename: row.try_get("html_filename")?,
                created_at: parse_timestamp(&created_at)?,
                updated_at: parse_timestamp(&updated_at)?,
                step_count: step_count.max(0) as usize,
                latest_result: self.latest_result(id).await?,
            });
        }
        Ok(summaries)
    }

    async fn get_scenario(&self, id: ScenarioId) -> Result<Scenario, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, description, html_content, html_filename, created_at, updated_at
             FROM test_scenario WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::ScenarioNotFound(id))?;

        let steps = sqlx::query(&format!(
            "SELECT {} FROM test_step WHERE scenario_id = ? ORDER BY step_order, id",
            STEP_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(step_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let results = sqlx::query(&format!(
            "SELECT {} FROM test_result WHERE scenario_id = ? ORDER BY execution_time DESC, id DESC",
            RESULT_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(result_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(Scenario {
            id,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            html: HtmlSource {
                filename: row.try_get("html_filename")?,
                content: row.try_get("html_content")?,
            },
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            steps,
            results,
        })
    }

    async fn delete_scenario(&self, id: ScenarioId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM test_step WHERE scenario_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM test_result WHERE scenario_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let done = sqlx::query("DELETE FROM test_scenario WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::ScenarioNotFound(id));
        }
        tx.commit().await?;
        log::info!("Deleted test scenario {}", id);
        Ok(())
    }

    async fn create_step(
        &self,
        scenario_id: ScenarioId,
        input: StepInput,
    ) -> Result<Step, StoreError> {
        check_step_order(input.step_order)?;
        if !self.scenario_exists(scenario_id).await? {
            return Err(StoreError::ScenarioNotFound(scenario_id));
        }
        if self.order_taken(scenario_id, input.step_order, None).await? {
            return Err(StoreError::DuplicateStepOrder {
                scenario_id,
                step_order: input.step_order,
            });
        }

        let done = sqlx::query(
            "INSERT INTO test_step (scenario_id, step_order, action, selector, value, attr, description, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(scenario_id)
        .bind(input.step_order)
        .bind(input.kind.action().as_str())
        .bind(input.kind.selector())
        .bind(input.kind.value())
        .bind(input.kind.attr())
        .bind(&input.description)
        .bind(timestamp_text(&Utc::now()))
        .execute(&self.pool)
        .await?;
        self.touch(scenario_id).await?;

        Ok(input.into_step(done.last_insert_rowid()))
    }

    async fn update_step(&self, step_id: StepId, input: StepInput) -> Result<Step, StoreError> {
        check_step_order(input.step_order)?;
        let scenario_id = self.step_owner(step_id).await?;
        if self
            .order_taken(scenario_id, input.step_order, Some(step_id))
            .await?
        {
            return Err(StoreError::DuplicateStepOrder {
                scenario_id,
                step_order: input.step_order,
            });
        }

        sqlx::query(
            "UPDATE test_step SET step_order = ?, action = ?, selector = ?, value = ?, attr = ?, description = ?
             WHERE id = ?",
        )
        .bind(input.step_order)
        .bind(input.kind.action().as_str())
        .bind(input.kind.selector())
        .bind(input.kind.value())
        .bind(input.kind.attr())
        .bind(&input.description)
        .bind(step_id)
        .execute(&self.pool)
        .await?;
        self.touch(scenario_id).await?;

        Ok(input.into_step(step_id))
    }

    async fn delete_step(&self, step_id: StepId) -> Result<(), StoreError> {
        let scenario_id = self.step_owner(step_id).await?;
        sqlx::query("DELETE FROM test_step WHERE id = ?")
            .bind(step_id)
            .execute(&self.pool)
            .await?;
        self.touch(scenario_id).await?;
        Ok(())
    }

    async fn step_owner(&self, step_id: StepId) -> Result<ScenarioId, StoreError> {
        sqlx::query_scalar("SELECT scenario_id FROM test_step WHERE id = ?")
            .bind(step_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::StepNotFound(step_id))
    }

    async fn append_result(
        &self,
        scenario_id: ScenarioId,
        result: NewResult,
    ) -> Result<TestResult, StoreError> {
        if !self.scenario_exists(scenario_id).await? {
            return Err(StoreError::ScenarioNotFound(scenario_id));
        }
        let execution_time = timestamp_text(&result.execution_time);
        let done = sqlx::query(
            "INSERT INTO test_result (scenario_id, status, execution_time, duration_ms, error_message, screenshot_path, logs)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(scenario_id)
        .bind(result.status.as_str())
        .bind(&execution_time)
        .bind(result.duration_ms as i64)
        .bind(&result.error_message)
        .bind(&result.screenshot_path)
        .bind(&result.logs)
        .execute(&self.pool)
        .await?;

        // Return exactly what a later read will see
        let mut stored = result.into_result(done.last_insert_rowid());
        stored.execution_time = parse_timestamp(&execution_time)?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::state::ResultStatus;

    async fn repo() -> SqliteRepository {
        SqliteRepository::connect("sqlite::memory:").await.unwrap()
    }

    fn new_scenario() -> NewScenario {
        NewScenario {
            name: "Checkout".to_string(),
            description: Some("Cart to payment".to_string()),
            html_filename: "checkout.html".to_string(),
            html_content: "<title>Checkout</title>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_step_round_trip() {
        let repo = repo().await;
        let scenario = repo.create_scenario(new_scenario()).await.unwrap();
        let input = StepInput {
            step_order: 1,
            kind: StepKind::ExpectAttr {
                selector: "cta".to_string(),
                value: "https://example.com/x?y=1".to_string(),
                attr: "href".to_string(),
            },
            description: Some("CTA link".to_string()),
        };
        let created = repo.create_step(scenario.id, input.clone()).await.unwrap();
        repo.create_step(
            scenario.id,
            StepInput::new(
                2,
                StepKind::WaitForPageLoad {
                    selector: None,
                    value: None,
                },
            ),
        )
        .await
        .unwrap();

        let loaded = repo.get_scenario(scenario.id).await.unwrap();
        assert_eq!(loaded.steps.len(), 2);
        assert_eq!(loaded.steps[0], created);
        assert_eq!(loaded.steps[1].kind.selector(), None);
        assert_eq!(loaded.html.content, "<title>Checkout</title>");
    }

    #[tokio::test]
    async fn test_duplicate_order_and_missing_scenario() {
        let repo = repo().await;
        let scenario = repo.create_scenario(new_scenario()).await.unwrap();
        let step = StepInput::new(
            1,
            StepKind::Fill {
                selector: "email".to_string(),
                value: "a@b.co".to_string(),
            },
        );
        repo.create_step(scenario.id, step.clone()).await.unwrap();
        assert!(matches!(
            repo.create_step(scenario.id, step.clone()).await,
            Err(StoreError::DuplicateStepOrder { step_order: 1, .. })
        ));
        assert!(matches!(
            repo.create_step(999, step).await,
            Err(StoreError::ScenarioNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_results_and_summaries() {
        let repo = repo().await;
        let scenario = repo.create_scenario(new_scenario()).await.unwrap();
        let first = repo
            .append_result(
                scenario.id,
                NewResult {
                    status: ResultStatus::Failed,
                    execution_time: Utc::now() - chrono::Duration::seconds(30),
                    duration_ms: 120,
                    error_message: Some("Expected text 'A' does not match 'B'".to_string()),
                    screenshot_path: None,
                    logs: Some("Executing step 1".to_string()),
                },
            )
            .await
            .unwrap();
        let second = repo
            .append_result(
                scenario.id,
                NewResult {
                    status: ResultStatus::Passed,
                    execution_time: Utc::now(),
                    duration_ms: 80,
                    error_message: None,
                    screenshot_path: None,
                    logs: None,
                },
            )
            .await
            .unwrap();

        let loaded = repo.get_scenario(scenario.id).await.unwrap();
        assert_eq!(loaded.results, vec![second.clone(), first]);

        let summaries = repo.list_scenarios().await.unwrap();
        assert_eq!(summaries.len(), 1);
        let latest = summaries[0].latest_result.as_ref().unwrap();
        assert_eq!(latest.status, ResultStatus::Passed);
        assert_eq!(latest.execution_time, second.execution_time);
    }

    #[tokio::test]
    async fn test_update_and_delete_step() {
        let repo = repo().await;
        let scenario = repo.create_scenario(new_scenario()).await.unwrap();
        let step = repo
            .create_step(
                scenario.id,
                StepInput::new(
                    1,
                    StepKind::Click {
                        selector: "buy".to_string(),
                        value: "1".to_string(),
                    },
                ),
            )
            .await
            .unwrap();

        let updated = repo
            .update_step(
                step.id,
                StepInput::new(
                    4,
                    StepKind::ExpectPageTitle {
                        selector: None,
                        value: "Checkout".to_string(),
                    },
                ),
            )
            .await
            .unwrap();
        assert_eq!(updated.step_order, 4);

        assert_eq!(repo.step_owner(step.id).await.unwrap(), scenario.id);
        repo.delete_step(step.id).await.unwrap();
        assert!(repo.get_scenario(scenario.id).await.unwrap().steps.is_empty());
        assert!(matches!(
            repo.delete_step(step.id).await,
            Err(StoreError::StepNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_scenario_cascades() {
        let repo = repo().await;
        let scenario = repo.create_scenario(new_scenario()).await.unwrap();
        repo.delete_scenario(scenario.id).await.unwrap();
        assert!(repo.list_scenarios().await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_scenario(scenario.id).await,
            Err(StoreError::ScenarioNotFound(_))
        ));
    }
}
