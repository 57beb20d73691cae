//! Weft CLI - run and inspect workflow documents

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use weft::error::FixSuggestion;
use weft::{Engine, RunConfig, TaskState, WeftError, Workflow};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Weft - DAG workflow engine for LLM tasks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file
    Run {
        /// Path to the workflow YAML file
        file: String,

        /// Input overrides, KEY=JSON (repeatable)
        #[arg(short, long, value_name = "KEY=JSON")]
        input: Vec<String>,

        /// Cap on concurrently running tasks
        #[arg(long)]
        max_in_flight: Option<usize>,

        /// Whole-run timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Validate a workflow file without running it
    Validate {
        /// Path to the workflow YAML file
        file: String,
    },

    /// List the built-in functions
    Functions,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("WEFT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            if let Some(suggestion) = err.fix_suggestion() {
                eprintln!("  {} {suggestion}", "hint:".yellow());
            }
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode, WeftError> {
    match cli.command {
        Commands::Run {
            file,
            input,
            max_in_flight,
            timeout,
        } => run_workflow(&file, &input, max_in_flight, timeout).await,
        Commands::Validate { file } => validate_workflow(&file),
        Commands::Functions => {
            for name in Engine::new().list_functions() {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_workflow(
    file: &str,
    inputs: &[String],
    max_in_flight: Option<usize>,
    timeout: Option<u64>,
) -> Result<ExitCode, WeftError> {
    let text = tokio::fs::read_to_string(file).await?;

    let mut config = RunConfig::default();
    if let Some(n) = max_in_flight {
        config = config.with_max_in_flight(n);
    }
    if let Some(secs) = timeout {
        config = config.with_run_timeout(Duration::from_secs(secs));
    }

    let workflow = Workflow::from_yaml(&text)?.with_config(config);
    let overrides = parse_overrides(inputs)?;

    let engine = Engine::new();
    println!(
        "{} Running {} ({} tasks)...\n",
        "→".cyan(),
        file,
        workflow.spec().tasks.len()
    );

    let outcome = workflow
        .runner(engine.registry())
        .run(overrides)
        .await?;

    for (name, summary) in &outcome.tasks {
        let (symbol, label) = match summary.state {
            TaskState::Success => ("✓".green(), "success".green()),
            TaskState::Cancelled => ("○".yellow(), "cancelled".yellow()),
            _ => ("✗".red(), summary.state.as_str().red()),
        };
        let duration = match (summary.start, summary.end) {
            (Some(start), Some(end)) => format!("({:.1}s)", (end - start) as f64 / 1000.0),
            _ => String::new(),
        };
        println!("  {symbol} {name} {label} {}", duration.dimmed());
        if let Some(error) = &summary.error {
            println!("      {} {error}", "error:".red());
        }
    }

    println!(
        "\n{}",
        serde_json::to_string_pretty(&outcome.output).unwrap_or_default()
    );

    if outcome.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn validate_workflow(file: &str) -> Result<ExitCode, WeftError> {
    let text = std::fs::read_to_string(file)?;
    let workflow = Workflow::from_yaml(&text)?;
    workflow.validate(None)?;

    let outline = workflow.describe();
    println!(
        "{} {} is valid: {} nodes, {} edges",
        "✓".green(),
        file,
        outline.nodes.len(),
        outline.edges.len()
    );
    Ok(ExitCode::SUCCESS)
}

/// Parse repeated `KEY=JSON` flags; bare words become strings
fn parse_overrides(inputs: &[String]) -> Result<Option<Map<String, Value>>, WeftError> {
    if inputs.is_empty() {
        return Ok(None);
    }

    let mut overrides = Map::new();
    for entry in inputs {
        let (key, raw) = entry.split_once('=').ok_or_else(|| WeftError::ParseError {
            details: format!("input override '{entry}' is not KEY=JSON"),
        })?;
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        overrides.insert(key.to_string(), value);
    }
    Ok(Some(overrides))
}
