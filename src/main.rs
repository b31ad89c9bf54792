//! webpilot command-line interface.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use action_primitives::{ControlPort, ScriptedDriver, ScriptedFixture, SessionStateStore};
use agent_core::{AgentConfig, GoalParser, Orchestrator};
use webpilot_cli::{CliConfig, RunReporter};

#[derive(Debug, Parser)]
#[command(
    name = "webpilot",
    version,
    about = "Autonomous goal-driven web agent",
    long_about = "Achieves a natural-language goal against a page by looping \
                  Sense -> Decide -> Act -> Verify until the goal is verified \
                  or a budget runs out."
)]
struct Cli {
    /// Output format for command results.
    #[arg(long, global = true, value_enum, default_value = "text")]
    output: OutputMode,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Optional YAML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the agent loop against a scripted page fixture.
    Run(RunArgs),
    /// Parse a goal into sub-goals without running anything.
    Parse(ParseArgs),
    /// Save, restore, or list captured session states.
    Session(SessionArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Target URL, loaded once at session start.
    #[arg(long)]
    url: String,

    /// Natural-language goal to achieve.
    #[arg(long)]
    goal: String,

    /// Scripted page fixture driving the hermetic backend.
    #[arg(long)]
    fixture: PathBuf,

    /// Step budget for the run.
    #[arg(long)]
    max_steps: Option<u32>,

    /// Directory for run reports.
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Per-action timeout (e.g. "30s").
    #[arg(long, value_parser = humantime::parse_duration)]
    action_timeout: Option<std::time::Duration>,

    /// Stability-wait timeout (e.g. "15s").
    #[arg(long, value_parser = humantime::parse_duration)]
    stability_timeout: Option<std::time::Duration>,

    /// Confidence floor below which decisions are flagged.
    #[arg(long)]
    confidence_floor: Option<f64>,

    /// Launch the control session in evasive mode from the start.
    #[arg(long)]
    evasive: bool,

    /// Skip writing the run report to disk.
    #[arg(long)]
    no_report: bool,
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Goal text to decompose.
    #[arg(long)]
    goal: String,
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[command(subcommand)]
    command: SessionCommand,
}

#[derive(Debug, Subcommand)]
enum SessionCommand {
    /// Capture the current session state from a fixture-backed driver.
    Save {
        #[arg(long)]
        name: String,
        #[arg(long)]
        fixture: PathBuf,
    },
    /// Load a saved session state and replay it into a driver.
    Restore {
        #[arg(long)]
        name: String,
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// List saved session states.
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CliConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    init_tracing(&level);

    match dispatch(cli, config).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn dispatch(cli: Cli, config: CliConfig) -> Result<ExitCode> {
    match cli.command {
        Command::Run(args) => run_command(args, config, cli.output).await,
        Command::Parse(args) => parse_command(args, cli.output),
        Command::Session(args) => session_command(args, config, cli.output).await,
    }
}

async fn run_command(args: RunArgs, config: CliConfig, output: OutputMode) -> Result<ExitCode> {
    let fixture = ScriptedFixture::from_path(&args.fixture)
        .map_err(|err| anyhow!("cannot load fixture {}: {err}", args.fixture.display()))?;
    let driver = Arc::new(ScriptedDriver::new(fixture));

    let mut agent_config = AgentConfig::new(args.url, args.goal)
        .max_steps(args.max_steps.unwrap_or(config.max_steps));
    if let Some(timeout) = args.action_timeout {
        agent_config.action_timeout_ms = timeout.as_millis() as u64;
    }
    if let Some(timeout) = args.stability_timeout {
        agent_config.stability_timeout_ms = timeout.as_millis() as u64;
    }
    if let Some(floor) = args.confidence_floor {
        agent_config = agent_config.confidence_floor(floor);
    }
    agent_config.start_evasive = args.evasive;
    agent_config
        .validate()
        .map_err(|err| anyhow!("invalid run configuration: {err}"))?;

    let orchestrator = Orchestrator::new(agent_config, driver.clone(), driver.clone());

    // Interrupts cancel at the next loop iteration; in-flight actions are
    // allowed to finish or time out.
    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling run");
            token.cancel();
        }
    });

    let result = orchestrator.run().await;
    let events = orchestrator.recorder().snapshot();

    let report_path = if args.no_report {
        None
    } else {
        let reporter = RunReporter::new(args.report_dir.unwrap_or(config.report_dir));
        Some(reporter.persist(&result, &events)?)
    };

    match output {
        OutputMode::Json => {
            let mut payload = serde_json::to_value(&result)?;
            if let Some(path) = &report_path {
                payload["report_path"] = serde_json::Value::String(path.display().to_string());
            }
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        OutputMode::Text => {
            let status = if result.success { "SUCCESS" } else { "FAILED" };
            println!("{status}: {}", result.goal);
            println!(
                "  steps: {}/{}  duration: {:.2}s  decisions: {}",
                result.steps,
                result.max_steps,
                result.duration_seconds,
                result.decisions.len()
            );
            if let Some(reason) = result.reason {
                println!("  reason: {reason}");
            }
            if let Some(error) = &result.error {
                println!("  error: {error}");
            }
            if let Some(path) = &report_path {
                println!("  report: {}", path.display());
            }
        }
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn parse_command(args: ParseArgs, output: OutputMode) -> Result<ExitCode> {
    let sub_goals = GoalParser::parse(&args.goal);
    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&sub_goals)?);
        }
        OutputMode::Text => {
            for sub_goal in &sub_goals {
                println!("{:>2}. {sub_goal}", sub_goal.sequence_index + 1);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn session_command(
    args: SessionArgs,
    config: CliConfig,
    output: OutputMode,
) -> Result<ExitCode> {
    let store = SessionStateStore::new(config.session_dir);
    match args.command {
        SessionCommand::Save { name, fixture } => {
            let fixture = ScriptedFixture::from_path(&fixture)
                .map_err(|err| anyhow!("cannot load fixture: {err}"))?;
            let driver = ScriptedDriver::new(fixture);
            let state = driver
                .capture_session_state()
                .await
                .map_err(|err| anyhow!("capture failed: {err}"))?
                .context("driver does not support session capture")?;
            let path = store.save(&name, &state)?;
            println!("saved session '{name}' to {}", path.display());
        }
        SessionCommand::Restore { name, fixture } => {
            let state = store.load(&name)?;
            if let Some(path) = fixture {
                let fixture = ScriptedFixture::from_path(&path)
                    .map_err(|err| anyhow!("cannot load fixture: {err}"))?;
                let driver = ScriptedDriver::new(fixture);
                driver
                    .restore_session_state(&state)
                    .await
                    .map_err(|err| anyhow!("restore failed: {err}"))?;
            }
            match output {
                OutputMode::Json => println!("{}", serde_json::to_string_pretty(&state)?),
                OutputMode::Text => println!("session '{name}' at {}", state.url),
            }
        }
        SessionCommand::List => {
            for name in store.list()? {
                println!("{name}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
