use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use test_builder::parser::types::StepForm;
use test_builder::report;
use test_builder::runner::executor::executor_for;
use test_builder::runner::{ConsoleEventListener, ExecutionCoordinator, ResultStatus};
use test_builder::server::ApiServer;
use test_builder::store::types::{NewScenario, Scenario, ScenarioId, StepId};
use test_builder::store::{self, ScenarioSession, SharedRepository};
use test_builder::utils::config::{Config, ExecutorKind};

#[derive(Parser)]
#[command(name = "test-builder")]
#[command(version = "0.1.0")]
#[command(about = "Build, import and run HTML test scenarios", long_about = None)]
struct Cli {
    /// Database URL (sqlite://path, sqlite::memory: or memory://)
    #[arg(long, global = true)]
    database: Option<String>,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Executor used for runs
    #[arg(long, value_enum, global = true)]
    executor: Option<ExecutorKind>,

    /// Debug logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage test scenarios
    Scenario {
        #[command(subcommand)]
        command: ScenarioCommands,
    },

    /// Manage the steps of a scenario
    Step {
        #[command(subcommand)]
        command: StepCommands,
    },

    /// Import steps from a headerless CSV (selector, action, value, attr)
    Import {
        /// Scenario id
        scenario: ScenarioId,

        /// CSV file, or "-" for stdin
        file: PathBuf,
    },

    /// Show how a CSV would be imported, without importing it
    Preview {
        /// CSV file, or "-" for stdin
        file: PathBuf,
    },

    /// Run a scenario once and record the result
    Run {
        /// Scenario id
        scenario: ScenarioId,
    },

    /// List data-testid selector candidates of a scenario's HTML
    Selectors {
        /// Scenario id
        scenario: ScenarioId,
    },

    /// Generate a run history report
    Report {
        /// Only this scenario (default: all)
        #[arg(short, long)]
        scenario: Option<ScenarioId>,

        /// Output format (json, junit)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start the HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind
        #[arg(long)]
        host: Option<String>,
    },
}

#[derive(Subcommand)]
enum ScenarioCommands {
    /// Create a scenario bound to an HTML file
    Create {
        /// Scenario name
        name: String,

        /// HTML file the scenario is tested against
        #[arg(long)]
        html: PathBuf,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List scenarios with their latest result
    List,

    /// Show a scenario's steps and results
    Show { id: ScenarioId },

    /// Delete a scenario with its steps and results
    Delete { id: ScenarioId },
}

#[derive(clap::Args)]
struct StepArgs {
    /// Action (click, expectText, expectAttr, ...)
    #[arg(short, long)]
    action: String,

    /// data-testid token or CSS selector
    #[arg(short, long)]
    selector: Option<String>,

    /// Expected or entered value
    #[arg(long)]
    value: Option<String>,

    /// Attribute name (expectAttr only)
    #[arg(long)]
    attr: Option<String>,

    /// Step description
    #[arg(short, long)]
    description: Option<String>,

    /// Explicit step order
    #[arg(short, long)]
    order: Option<u32>,
}

impl From<StepArgs> for StepForm {
    fn from(args: StepArgs) -> Self {
        StepForm {
            step_order: args.order,
            action: args.action,
            selector: args.selector,
            value: args.value,
            attr: args.attr,
            description: args.description,
        }
    }
}

#[derive(Subcommand)]
enum StepCommands {
    /// Add a step to a scenario
    Add {
        /// Scenario id
        scenario: ScenarioId,

        #[command(flatten)]
        args: StepArgs,
    },

    /// Replace a step
    Edit {
        /// Step id
        step: StepId,

        #[command(flatten)]
        args: StepArgs,
    },

    /// Delete a step
    Delete {
        /// Step id
        step: StepId,
    },
}

fn open_input(file: &Path) -> anyhow::Result<Box<dyn Read + Send>> {
    if file == Path::new("-") {
        Ok(Box::new(std::io::stdin()))
    } else {
        let f = std::fs::File::open(file)
            .with_context(|| format!("Failed to open {}", file.display()))?;
        Ok(Box::new(f))
    }
}

fn print_scenario(scenario: &Scenario) {
    println!(
        "{} [{}] {} ({})",
        "■".blue().bold(),
        scenario.id,
        scenario.name.white().bold(),
        scenario.html.filename.dimmed()
    );
    if let Some(description) = &scenario.description {
        println!("  {}", description);
    }
    println!("  State: {:?}", scenario.state());

    println!("\n  Steps:");
    if scenario.steps.is_empty() {
        println!("    {}", "(none)".dimmed());
    }
    for step in &scenario.steps {
        println!(
            "    {:>3}. {} {}",
            step.step_order,
            step.kind.display(),
            format!("#{}", step.id).dimmed()
        );
    }

    println!("\n  Results (newest first):");
    if scenario.results.is_empty() {
        println!("    {}", "(none)".dimmed());
    }
    for result in &scenario.results {
        println!(
            "    {} {} {}ms{}",
            result.execution_time.format("%Y-%m-%d %H:%M:%S"),
            status_label(result.status),
            result.duration_ms,
            result
                .error_message
                .as_deref()
                .map(|m| format!(" - {}", m))
                .unwrap_or_default()
        );
    }
}

fn status_label(status: ResultStatus) -> colored::ColoredString {
    match status {
        ResultStatus::Passed => "PASSED".green().bold(),
        ResultStatus::Failed => "FAILED".red().bold(),
        ResultStatus::Error => "ERROR".yellow().bold(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }
    if let Some(executor) = cli.executor {
        config.executor = executor;
    }

    let repo: SharedRepository = store::open(&config.database)
        .await
        .with_context(|| format!("Failed to open database {}", config.database))?;
    let coordinator = Arc::new(ExecutionCoordinator::new(
        repo.clone(),
        executor_for(config.executor, Some(config.screenshots_dir.clone())),
    ));
    let window = config.delete_confirm_window();

    match cli.command {
        Commands::Scenario { command } => match command {
            ScenarioCommands::Create {
                name,
                html,
                description,
            } => {
                let html_content = std::fs::read_to_string(&html)
                    .with_context(|| format!("Failed to read {}", html.display()))?;
                let html_filename = html
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| html.display().to_string());
                let scenario = repo
                    .create_scenario(NewScenario {
                        name,
                        description,
                        html_filename,
                        html_content,
                    })
                    .await?;
                println!(
                    "{} Created scenario {} ({})",
                    "✓".green(),
                    scenario.id.to_string().cyan(),
                    scenario.name
                );
            }

            ScenarioCommands::List => {
                let scenarios = repo.list_scenarios().await?;
                if scenarios.is_empty() {
                    println!("{} No scenarios yet.", "ℹ".blue());
                }
                for s in scenarios {
                    let latest = match &s.latest_result {
                        Some(r) => format!(
                            "{} {}",
                            status_label(r.status),
                            r.execution_time.format("%Y-%m-%d %H:%M:%S")
                        ),
                        None => "never run".dimmed().to_string(),
                    };
                    println!(
                        "  [{}] {} - {} steps - {}",
                        s.id,
                        s.name.white().bold(),
                        s.step_count,
                        latest
                    );
                }
            }

            ScenarioCommands::Show { id } => {
                print_scenario(&repo.get_scenario(id).await?);
            }

            ScenarioCommands::Delete { id } => {
                repo.delete_scenario(id).await?;
                println!("{} Deleted scenario {}", "✓".green(), id);
            }
        },

        Commands::Step { command } => match command {
            StepCommands::Add { scenario, args } => {
                let mut session = ScenarioSession::open(coordinator.clone(), scenario, window).await?;
                let step = session.add_step(&args.into()).await?;
                println!(
                    "{} Added step {}: {}",
                    "✓".green(),
                    step.step_order,
                    step.kind.display()
                );
            }

            StepCommands::Edit { step, args } => {
                let scenario = repo.step_owner(step).await?;
                let mut session = ScenarioSession::open(coordinator.clone(), scenario, window).await?;
                let updated = session.update_step(step, &args.into()).await?;
                println!(
                    "{} Updated step {}: {}",
                    "✓".green(),
                    updated.step_order,
                    updated.kind.display()
                );
            }

            StepCommands::Delete { step } => {
                let scenario = repo.step_owner(step).await?;
                let mut session = ScenarioSession::open(coordinator.clone(), scenario, window).await?;
                session.delete_step(step).await?;
                println!(
                    "{} Deleted step {} ({} steps left)",
                    "✓".green(),
                    step,
                    session.scenario().steps.len()
                );
            }
        },

        Commands::Import { scenario, file } => {
            let input = open_input(&file)?;
            let listener = tokio::spawn(ConsoleEventListener::listen(coordinator.subscribe()));

            let summary = {
                let mut session = ScenarioSession::open(coordinator.clone(), scenario, window).await?;
                session.import_csv(input).await?
            };
            // Dropping the last emitter handle lets the listener drain and exit
            drop(coordinator);
            listener.await.ok();

            if !summary.errors.is_empty() {
                println!("\n{} Rejected rows:", "⚠".yellow());
                for message in summary.error_messages() {
                    println!("  {}", message);
                }
            }
        }

        Commands::Preview { file } => {
            let mut text = String::new();
            open_input(&file)?.read_to_string(&mut text)?;
            for row in test_builder::preview(&text) {
                match (&row.step, &row.error) {
                    (Some(step), _) => {
                        println!("  {} Row {}: {}", "✓".green(), row.row, step.display())
                    }
                    (None, Some(error)) => println!("  {} {}", "✗".red(), error),
                    (None, None) => {}
                }
                println!("      raw: {}", row.raw.join(", ").dimmed());
            }
        }

        Commands::Run { scenario } => {
            let listener = tokio::spawn(ConsoleEventListener::listen(coordinator.subscribe()));

            let result = coordinator.run_test(scenario).await;
            drop(coordinator);
            listener.await.ok();

            let result = result?;
            if let Some(path) = &result.screenshot_path {
                println!("    Artifact: {}", path);
            }
            if result.status != ResultStatus::Passed {
                std::process::exit(1);
            }
        }

        Commands::Selectors { scenario } => {
            let scenario = repo.get_scenario(scenario).await?;
            let candidates = test_builder::extract_selector_candidates(&scenario.html.content)?;
            if candidates.is_empty() {
                println!("{} No data-testid elements in {}", "ℹ".blue(), scenario.html.filename);
            }
            for c in candidates {
                println!(
                    "  {} <{}> {}",
                    c.selector.cyan(),
                    c.tag,
                    c.text.dimmed()
                );
            }
        }

        Commands::Report {
            scenario,
            format,
            output,
        } => {
            println!(
                "{} Generating {} report...",
                "📊",
                format.cyan()
            );
            report::generate_report(&repo, scenario, &format, output.as_deref()).await?;
        }

        Commands::Serve { port, host } => {
            let mut server = config.server.clone();
            if let Some(port) = port {
                server.port = port;
            }
            if let Some(host) = host {
                server.host = host;
            }
            ApiServer::new(server, coordinator, window).start().await?;
        }
    }

    Ok(())
}
