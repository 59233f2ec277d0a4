//! REST endpoints for the test builder
//!
//! Every mutating endpoint answers with the scenario as reloaded after the
//! write.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RowError, RunError, SessionError, StoreError};
use crate::html::{HtmlError, SelectorCandidate};
use crate::parser::types::StepForm;
use crate::parser::validate::{preview, PreviewRow};
use crate::runner::state::ScenarioState;
use crate::runner::ExecutionCoordinator;
use crate::store::types::{
    NewScenario, Scenario, ScenarioId, ScenarioSummary, Step, StepId, TestResult,
};
use crate::store::{ScenarioSession, SharedRepository};

/// Shared state for API handlers
pub struct AppState {
    pub coordinator: Arc<ExecutionCoordinator>,
    pub confirm_window: Duration,
}

impl AppState {
    fn repo(&self) -> &SharedRepository {
        self.coordinator.repository()
    }

    async fn session(&self, scenario_id: ScenarioId) -> Result<ScenarioSession, ApiError> {
        Ok(ScenarioSession::open(self.coordinator.clone(), scenario_id, self.confirm_window).await?)
    }
}

/// Error body: `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("{}", self.detail);
        }
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::ScenarioNotFound(_) | StoreError::StepNotFound(_) => StatusCode::NOT_FOUND,
            StoreError::DuplicateStepOrder { .. } => StatusCode::CONFLICT,
            StoreError::InvalidStepOrder | StoreError::StepOrderExhausted(_) => {
                StatusCode::BAD_REQUEST
            }
            StoreError::CorruptStep { .. }
            | StoreError::Corrupt(_)
            | StoreError::Database(_)
            | StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: e.to_string(),
        }
    }
}

impl From<RowError> for ApiError {
    fn from(e: RowError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<RunError> for ApiError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::NoSteps(_) => Self::bad_request(e.to_string()),
            RunError::AlreadyRunning(_) => Self {
                status: StatusCode::CONFLICT,
                detail: e.to_string(),
            },
            RunError::Store(e) => e.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Invalid(e) => e.into(),
            SessionError::Store(e) => e.into(),
            SessionError::Run(e) => e.into(),
        }
    }
}

impl From<HtmlError> for ApiError {
    fn from(e: HtmlError) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: e.to_string(),
        }
    }
}

/// A scenario with its derived editor state
#[derive(Serialize)]
pub struct ScenarioResponse {
    #[serde(flatten)]
    pub scenario: Scenario,
    pub state: ScenarioState,
}

impl From<&Scenario> for ScenarioResponse {
    fn from(scenario: &Scenario) -> Self {
        Self {
            state: scenario.state(),
            scenario: scenario.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct StepResponse {
    pub step: Step,
    pub scenario: ScenarioResponse,
}

#[derive(Serialize)]
pub struct ImportResponse {
    pub success_count: usize,
    pub errors: Vec<String>,
    pub scenario: ScenarioResponse,
}

#[derive(Serialize)]
pub struct RunResponse {
    pub result: TestResult,
    pub scenario: ScenarioResponse,
}

/// Build API router
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/test-scenarios",
            get(list_scenarios).post(create_scenario),
        )
        .route(
            "/api/test-scenarios/:id",
            get(get_scenario).delete(delete_scenario),
        )
        .route("/api/test-scenarios/:id/testids", get(get_testids))
        .route("/api/test-scenarios/:id/steps", post(create_step))
        .route("/api/test-scenarios/:id/import", post(import_csv))
        .route("/api/test-scenarios/:id/preview", post(preview_csv))
        .route("/api/test-scenarios/:id/run", post(run_scenario))
        .route("/api/test-steps/:id", put(update_step).delete(delete_step))
}

/// GET /api/test-scenarios
async fn list_scenarios(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ScenarioSummary>>, ApiError> {
    Ok(Json(state.repo().list_scenarios().await?))
}

/// POST /api/test-scenarios
async fn create_scenario(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewScenario>,
) -> Result<impl IntoResponse, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("Scenario name is required"));
    }
    let scenario = state.repo().create_scenario(body).await?;
    Ok((StatusCode::CREATED, Json(ScenarioResponse::from(&scenario))))
}

/// GET /api/test-scenarios/:id
async fn get_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ScenarioId>,
) -> Result<Json<ScenarioResponse>, ApiError> {
    let scenario = state.repo().get_scenario(id).await?;
    Ok(Json(ScenarioResponse::from(&scenario)))
}

/// DELETE /api/test-scenarios/:id
async fn delete_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ScenarioId>,
) -> Result<StatusCode, ApiError> {
    state.repo().delete_scenario(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/test-scenarios/:id/testids
async fn get_testids(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ScenarioId>,
) -> Result<Json<Vec<SelectorCandidate>>, ApiError> {
    let session = state.session(id).await?;
    Ok(Json(session.selector_candidates()?))
}

/// POST /api/test-scenarios/:id/steps
async fn create_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ScenarioId>,
    Json(form): Json<StepForm>,
) -> Result<impl IntoResponse, ApiError> {
    let mut session = state.session(id).await?;
    let step = session.add_step(&form).await?;
    Ok((
        StatusCode::CREATED,
        Json(StepResponse {
            step,
            scenario: session.scenario().into(),
        }),
    ))
}

/// POST /api/test-scenarios/:id/import - body is the raw CSV
async fn import_csv(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ScenarioId>,
    body: String,
) -> Result<Json<ImportResponse>, ApiError> {
    let mut session = state.session(id).await?;
    let summary = session.import_csv(body.as_bytes()).await?;
    Ok(Json(ImportResponse {
        success_count: summary.success_count,
        errors: summary.error_messages(),
        scenario: session.scenario().into(),
    }))
}

/// POST /api/test-scenarios/:id/preview - body is the raw CSV
async fn preview_csv(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ScenarioId>,
    body: String,
) -> Result<Json<Vec<PreviewRow>>, ApiError> {
    state.repo().get_scenario(id).await?;
    Ok(Json(preview(&body)))
}

/// POST /api/test-scenarios/:id/run
async fn run_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ScenarioId>,
) -> Result<Json<RunResponse>, ApiError> {
    let mut session = state.session(id).await?;
    let result = session.run_test().await?;
    Ok(Json(RunResponse {
        result,
        scenario: session.scenario().into(),
    }))
}

/// PUT /api/test-steps/:id
async fn update_step(
    State(state): State<Arc<AppState>>,
    Path(step_id): Path<StepId>,
    Json(form): Json<StepForm>,
) -> Result<Json<StepResponse>, ApiError> {
    let scenario_id = state.repo().step_owner(step_id).await?;
    let mut session = state.session(scenario_id).await?;
    let step = session.update_step(step_id, &form).await?;
    Ok(Json(StepResponse {
        step,
        scenario: session.scenario().into(),
    }))
}

/// DELETE /api/test-steps/:id
async fn delete_step(
    State(state): State<Arc<AppState>>,
    Path(step_id): Path<StepId>,
) -> Result<Json<ScenarioResponse>, ApiError> {
    let scenario_id = state.repo().step_owner(step_id).await?;
    let mut session = state.session(scenario_id).await?;
    session.delete_step(step_id).await?;
    Ok(Json(session.scenario().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::executor::StaticHtmlExecutor;
    use crate::store::MemoryRepository;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let coordinator = Arc::new(ExecutionCoordinator::new(
            Arc::new(MemoryRepository::new()),
            Arc::new(StaticHtmlExecutor::new(None)),
        ));
        let state = Arc::new(AppState {
            coordinator,
            confirm_window: Duration::from_millis(3000),
        });
        api_router().with_state(state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Body>, json: bool) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if json {
            request = request.header("content-type", "application/json");
        }
        let request = request.body(body.unwrap_or_else(Body::empty)).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        call(app, method, uri, Some(Body::from(body.to_string())), true).await
    }

    async fn create(app: &Router) -> i64 {
        let (status, body) = send_json(
            app,
            "POST",
            "/api/test-scenarios",
            json!({
                "name": "Hero",
                "html_filename": "hero.html",
                "html_content": "<title>Hero</title><a data-testid=\"cta\" href=\"/buy\">Buy now</a>"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["state"], "draft");
        body["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_scenario_lifecycle_over_http() {
        let app = app();
        let id = create(&app).await;

        let (status, body) = call(&app, "GET", &format!("/api/test-scenarios/{}/testids", id), None, false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["selector"], "[data-testid=\"cta\"]");
        assert_eq!(body[0]["text"], "Buy now");

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/test-scenarios/{}/import", id),
            Some(Body::from("cta, expectText, Buy now\ncta, expectAttr, /buy, href\nFoo, bogus, Bar\n")),
            false,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success_count"], 2);
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);
        assert_eq!(body["scenario"]["state"], "has_steps");
        assert_eq!(body["scenario"]["steps"][1]["step_order"], 2);

        let (status, body) = call(&app, "POST", &format!("/api/test-scenarios/{}/run", id), None, false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["status"], "passed");
        assert_eq!(body["scenario"]["state"], "tested");

        let (status, body) = call(&app, "GET", "/api/test-scenarios", None, false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["step_count"], 2);
        assert_eq!(body[0]["latest_result"]["status"], "passed");

        let (status, _) = call(&app, "DELETE", &format!("/api/test-scenarios/{}", id), None, false).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = call(&app, "GET", &format!("/api/test-scenarios/{}", id), None, false).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_step_endpoints() {
        let app = app();
        let id = create(&app).await;

        let (status, body) = send_json(
            &app,
            "POST",
            &format!("/api/test-scenarios/{}/steps", id),
            json!({ "action": "expectAttr", "selector": "cta", "value": "/buy" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("Attribute name required"));

        let (status, body) = send_json(
            &app,
            "POST",
            &format!("/api/test-scenarios/{}/steps", id),
            json!({ "action": "click", "selector": "cta", "value": "go" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let step_id = body["step"]["id"].as_i64().unwrap();
        assert_eq!(body["step"]["step_order"], 1);

        let (status, body) = send_json(
            &app,
            "PUT",
            &format!("/api/test-steps/{}", step_id),
            json!({ "action": "expectPageTitle", "value": "Hero", "description": "title" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"]["action"], "expectPageTitle");
        assert_eq!(body["step"]["step_order"], 1);

        let (status, body) = call(&app, "DELETE", &format!("/api/test-steps/{}", step_id), None, false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "draft");

        let (status, _) = call(&app, "DELETE", &format!("/api/test-steps/{}", step_id), None, false).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_without_steps_is_bad_request() {
        let app = app();
        let id = create(&app).await;
        let (status, body) = call(&app, "POST", &format!("/api/test-scenarios/{}/run", id), None, false).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().starts_with("No test steps found"));
    }

    #[tokio::test]
    async fn test_preview_does_not_import() {
        let app = app();
        let id = create(&app).await;
        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/test-scenarios/{}/preview", id),
            Some(Body::from("Hero-Btn, expectText, Start Now\n")),
            false,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["step"]["action"], "expectText");
        assert_eq!(body[0]["step"]["value"], "Start Now");

        let (_, body) = call(&app, "GET", &format!("/api/test-scenarios/{}", id), None, false).await;
        assert!(body["steps"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            ApiError::from(RunError::AlreadyRunning(1)).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(RunError::NoSteps(1)).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SessionError::Store(StoreError::StepNotFound(3))).status,
            StatusCode::NOT_FOUND
        );
    }
}
