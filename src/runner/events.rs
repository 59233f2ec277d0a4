use super::state::ResultStatus;
use crate::parser::types::Action;
use crate::store::types::ScenarioId;
use tokio::sync::broadcast;

/// Import and execution events for real-time updates
#[derive(Debug, Clone, PartialEq)]
pub enum TestEvent {
    // Import events
    ImportStarted {
        scenario_id: ScenarioId,
        base_order: u32,
    },
    RowAccepted {
        scenario_id: ScenarioId,
        row: usize,
        step_order: u32,
        action: Action,
    },
    RowRejected {
        scenario_id: ScenarioId,
        row: usize,
        error: String,
    },
    ImportFinished {
        scenario_id: ScenarioId,
        success_count: usize,
        error_count: usize,
    },

    // Run events
    RunStarted {
        scenario_id: ScenarioId,
        scenario_name: String,
        step_count: usize,
    },
    StepStarted {
        scenario_id: ScenarioId,
        step_order: u32,
        description: String,
    },
    StepPassed {
        scenario_id: ScenarioId,
        step_order: u32,
        duration_ms: u64,
    },
    StepFailed {
        scenario_id: ScenarioId,
        step_order: u32,
        error: String,
        duration_ms: u64,
    },
    RunFinished {
        scenario_id: ScenarioId,
        status: ResultStatus,
        duration_ms: u64,
        error_message: Option<String>,
    },

    // Log event for coordinated output
    Log {
        message: String,
    },
}

/// Event emitter for broadcasting test events
pub struct EventEmitter {
    sender: broadcast::Sender<TestEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<TestEvent>) {
        let (sender, receiver) = broadcast::channel(256);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: TestEvent) {
        let _ = self.sender.send(event);
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(TestEvent::Log {
            message: message.into(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }
}

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<TestEvent>) {
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        // Hidden draw target when piped, to keep escape codes out of logs
        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let mut spinner: Option<ProgressBar> = None;
        let mut step_text = String::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Console listener skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                TestEvent::ImportStarted {
                    scenario_id,
                    base_order,
                } => {
                    println!(
                        "\n{} Importing steps into scenario {} (after order {})",
                        "▶".green().bold(),
                        scenario_id.to_string().cyan(),
                        base_order
                    );
                }

                TestEvent::RowAccepted {
                    row,
                    step_order,
                    action,
                    ..
                } => {
                    println!(
                        "    {} Row {} -> step {} ({})",
                        "✓".green(),
                        row,
                        step_order,
                        action.as_str().dimmed()
                    );
                }

                TestEvent::RowRejected { row, error, .. } => {
                    println!("    {} Row {}: {}", "✗".red(), row, error);
                }

                TestEvent::ImportFinished {
                    success_count,
                    error_count,
                    ..
                } => {
                    println!(
                        "{} Import finished: {} imported, {} rejected",
                        "■".blue().bold(),
                        success_count.to_string().green(),
                        error_count.to_string().red()
                    );
                }

                TestEvent::RunStarted {
                    scenario_name,
                    step_count,
                    ..
                } => {
                    println!(
                        "\n{} Scenario: {} ({} steps)",
                        "→".blue(),
                        scenario_name.white().bold(),
                        step_count
                    );
                }

                TestEvent::StepStarted {
                    step_order,
                    description,
                    ..
                } => {
                    let pb = multi.add(ProgressBar::new_spinner());
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    step_text = format!("[{}] {}... ", step_order, description.dimmed());
                    pb.set_message(step_text.clone());
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinner = Some(pb);
                }

                TestEvent::StepPassed { duration_ms, .. } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("    {} {}({}ms)", "✓".green(), step_text, duration_ms);
                }

                TestEvent::StepFailed {
                    error, duration_ms, ..
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("    {} {}({}ms)", "✗".red(), step_text, duration_ms);
                    println!("      {}", error.red());
                }

                TestEvent::RunFinished {
                    status,
                    duration_ms,
                    error_message,
                    ..
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    let status_str = match status {
                        ResultStatus::Passed => "PASSED".green().bold(),
                        ResultStatus::Failed => "FAILED".red().bold(),
                        ResultStatus::Error => "ERROR".yellow().bold(),
                    };
                    println!("{} Run finished [{}]", "←".blue(), status_str);
                    if let Some(message) = error_message {
                        println!("    {}", message);
                    }
                    println!("    Duration: {}ms", duration_ms);
                }

                TestEvent::Log { message } => {
                    multi.println(format!("      {}", message.dimmed())).ok();
                }
            }
        }
    }
}
