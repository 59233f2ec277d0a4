use super::events::{EventEmitter, TestEvent};
use super::state::ExecutionReport;
use crate::error::ExecutionError;
use crate::html::{normalize_whitespace, HtmlDocument};
use crate::parser::types::StepKind;
use crate::store::types::{HtmlSource, ScenarioId, Step};
use crate::utils::config::ExecutorKind;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Everything an executor needs for one run, captured when the run starts
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub scenario_id: ScenarioId,
    pub scenario_name: String,
    pub html: HtmlSource,
    /// Ascending `step_order`
    pub steps: Vec<Step>,
}

/// Runs a scenario's steps and reports pass, fail or error.
///
/// A step that does not hold is a `failed` report, not an `Err`. `Err` is
/// reserved for the executor itself breaking; the coordinator records it as
/// `status=error`.
#[async_trait]
pub trait ScenarioExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run_scenario(
        &self,
        request: &ExecutionRequest,
        events: &EventEmitter,
    ) -> Result<ExecutionReport, ExecutionError>;
}

pub fn executor_for(
    kind: ExecutorKind,
    artifacts_dir: Option<PathBuf>,
) -> Arc<dyn ScenarioExecutor> {
    match kind {
        ExecutorKind::Static => Arc::new(StaticHtmlExecutor::new(artifacts_dir)),
        ExecutorKind::Validate => Arc::new(ValidationOnlyExecutor),
    }
}

fn step_banner(verb: &str, step: &Step) -> String {
    match step.kind.selector() {
        Some(selector) => format!(
            "{} step {}: {} on {}",
            verb,
            step.step_order,
            step.kind.action(),
            selector
        ),
        None => format!("{} step {}: {}", verb, step.step_order, step.kind.action()),
    }
}

/// Log lines go to the run's log, the `log` facade and the event stream
struct RunLog<'a> {
    lines: Vec<String>,
    events: &'a EventEmitter,
}

impl<'a> RunLog<'a> {
    fn new(events: &'a EventEmitter) -> Self {
        Self {
            lines: Vec::new(),
            events,
        }
    }

    fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        log::debug!("{}", line);
        self.events.log(line.clone());
        self.lines.push(line);
    }
}

/// Evaluates steps against the scenario's HTML without a browser.
///
/// The page is the parsed document at `file:///<html_filename>`; clicks and
/// fills only check that their target exists.
pub struct StaticHtmlExecutor {
    artifacts_dir: Option<PathBuf>,
}

impl StaticHtmlExecutor {
    pub fn new(artifacts_dir: Option<PathBuf>) -> Self {
        Self { artifacts_dir }
    }

    fn check_step(
        doc: &HtmlDocument,
        page_url: &str,
        step: &Step,
        log: &mut RunLog<'_>,
    ) -> Result<(), String> {
        let find = |selector: &str| {
            doc.find(selector)
                .ok_or_else(|| format!("Element '{}' not found", selector))
        };

        match &step.kind {
            StepKind::Click { selector, .. } => {
                find(selector.as_str())?;
            }
            StepKind::Fill { selector, value } => {
                let element = find(selector.as_str())?;
                if !element.is_form_control() {
                    return Err(format!(
                        "Element '{}' <{}> cannot be filled",
                        selector, element.tag
                    ));
                }
                log.push(format!("Filled '{}' with '{}'", selector, value));
            }
            StepKind::WaitForSelector { selector, .. } => {
                find(selector.as_str())?;
            }
            StepKind::ExpectText { selector, value } => {
                let element = find(selector.as_str())?;
                let found = element.normalized_text();
                let expected = normalize_whitespace(value);
                log.push(format!("Found text: '{}'", found));
                log.push(format!("Expected text: '{}'", value));
                if expected != found {
                    return Err(format!(
                        "Expected text '{}' does not match '{}' in element '{}'",
                        expected, found, selector
                    ));
                }
            }
            StepKind::ExpectAttr {
                selector,
                value,
                attr,
            } => {
                let element = find(selector.as_str())?;
                let found = element.attr(attr);
                log.push(format!("Found attribute {}: '{}'", attr, found.unwrap_or("")));
                log.push(format!("Expected attribute {}: '{}'", attr, value));
                match found {
                    Some(found) if found == value.as_str() => {}
                    Some(found) => {
                        return Err(format!(
                            "Expected attribute '{}' to be '{}', got '{}'",
                            attr, value, found
                        ))
                    }
                    None => {
                        return Err(format!(
                            "Expected attribute '{}' to be '{}', but element '{}' has no such attribute",
                            attr, value, selector
                        ))
                    }
                }
            }
            StepKind::ExpectUrlContains { value, .. } => {
                log.push(format!("Current URL: '{}'", page_url));
                log.push(format!("Expected URL to contain: '{}'", value));
                if !page_url.contains(value.as_str()) {
                    return Err(format!(
                        "Expected URL to contain '{}', got '{}'",
                        value, page_url
                    ));
                }
            }
            StepKind::ExpectPageTitle { value, .. } => {
                let title = doc.title().unwrap_or_default();
                log.push(format!("Current page title: '{}'", title));
                log.push(format!("Expected page title: '{}'", value));
                if normalize_whitespace(value) != title {
                    return Err(format!("Expected page title '{}', got '{}'", value, title));
                }
            }
            StepKind::WaitForPageLoad { .. } => {
                log.push("Page load completed");
            }
        }
        Ok(())
    }

    /// Keep the document that failed next to the run, in place of a screenshot
    async fn save_failure_snapshot(
        &self,
        request: &ExecutionRequest,
        step_order: u32,
    ) -> std::io::Result<Option<String>> {
        let Some(dir) = &self.artifacts_dir else {
            return Ok(None);
        };
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!(
            "scenario_{}_step_{}_{}.html",
            request.scenario_id,
            step_order,
            Utc::now().format("%Y%m%d%H%M%S%3f")
        ));
        tokio::fs::write(&path, &request.html.content).await?;
        Ok(Some(path.display().to_string()))
    }
}

#[async_trait]
impl ScenarioExecutor for StaticHtmlExecutor {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn run_scenario(
        &self,
        request: &ExecutionRequest,
        events: &EventEmitter,
    ) -> Result<ExecutionReport, ExecutionError> {
        let mut log = RunLog::new(events);
        log.push(format!("Loading HTML source: {}", request.html.filename));
        let doc = HtmlDocument::parse(&request.html.content)?;
        let page_url = format!("file:///{}", request.html.filename.trim_start_matches('/'));

        for step in &request.steps {
            let started = Instant::now();
            events.emit(TestEvent::StepStarted {
                scenario_id: request.scenario_id,
                step_order: step.step_order,
                description: step
                    .description
                    .clone()
                    .unwrap_or_else(|| step.kind.display()),
            });
            log.push(step_banner("Executing", step));

            match Self::check_step(&doc, &page_url, step, &mut log) {
                Ok(()) => {
                    log.push(format!("Step {} completed successfully", step.step_order));
                    events.emit(TestEvent::StepPassed {
                        scenario_id: request.scenario_id,
                        step_order: step.step_order,
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Err(error) => {
                    events.emit(TestEvent::StepFailed {
                        scenario_id: request.scenario_id,
                        step_order: step.step_order,
                        error: error.clone(),
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                    let snapshot = match self.save_failure_snapshot(request, step.step_order).await {
                        Ok(path) => {
                            if let Some(path) = &path {
                                log.push(format!("Failure snapshot saved at: {}", path));
                            }
                            path
                        }
                        Err(e) => {
                            log.push(format!("Failed to save failure snapshot: {}", e));
                            None
                        }
                    };
                    log.push(format!("Test failed: {}", error));
                    let mut report = ExecutionReport::failed(step.step_order, error, log.lines);
                    report.screenshot_path = snapshot;
                    return Ok(report);
                }
            }
        }

        log.push("Test completed successfully");
        Ok(ExecutionReport::passed(log.lines))
    }
}

/// Checks that every step is well formed and records `status=error`,
/// for hosts where no page can be driven
pub struct ValidationOnlyExecutor;

pub const VALIDATION_ONLY_MESSAGE: &str =
    "Browser execution unavailable - only step validation performed";

#[async_trait]
impl ScenarioExecutor for ValidationOnlyExecutor {
    fn name(&self) -> &'static str {
        "validate"
    }

    async fn run_scenario(
        &self,
        request: &ExecutionRequest,
        events: &EventEmitter,
    ) -> Result<ExecutionReport, ExecutionError> {
        let mut log = RunLog::new(events);
        log.push("Using validation-only execution - steps are checked but not run");

        for step in &request.steps {
            log.push(step_banner("Validating", step));
            let recheck = StepKind::from_fields(
                step.kind.action(),
                step.kind.selector().map(str::to_string),
                step.kind.value().map(str::to_string),
                step.kind.attr().map(str::to_string),
            );
            if let Err(e) = recheck {
                let error = e.to_string();
                log.push(format!("Validation error: {}", error));
                return Ok(ExecutionReport::failed(step.step_order, error, log.lines));
            }
            log.push(format!("Step {} validation passed", step.step_order));
        }

        log.push("All steps validated successfully (execution skipped)");
        Ok(ExecutionReport::error(
            VALIDATION_ONLY_MESSAGE.to_string(),
            log.lines,
        ))
    }
}
