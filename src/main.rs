//! Opgraph CLI - runs the built-in `clean_string` job

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use opgraph::catalog::{self, CLEAN_STRING_CRON};
use opgraph::config::{EngineConfig, RunConfig};
use opgraph::error::{FixSuggestion, OpgraphError};
use opgraph::event::{read_trace, EventLog, NoopEmitter, TraceWriter, TracingEmitter, TRACE_DIR};
use opgraph::job::Job;
use opgraph::runtime::{Executor, RunOutcome, RunRequest};
use opgraph::schedule::{OutcomeSink, Scheduler};

#[derive(Parser)]
#[command(name = "opgraph")]
#[command(about = "Opgraph - typed operator graph runner")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the job once
    Run {
        /// Run config YAML (ops / resources / inputs)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run id (a UUID is generated when omitted)
        #[arg(long)]
        run_id: Option<String>,

        /// Tag as key=value, repeatable
        #[arg(short, long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,

        /// Write the run's events to .traces/<run_id>.ndjson
        #[arg(long)]
        trace: bool,
    },

    /// Build and validate the job without running it
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run the job on a cron cadence
    Schedule {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Cron expression (5 fields, or 6/7 with seconds first)
        #[arg(long, default_value = CLEAN_STRING_CRON)]
        cron: String,

        /// IANA timezone (defaults to the engine config)
        #[arg(long)]
        timezone: Option<String>,

        /// Stop after this many runs
        #[arg(long)]
        max_runs: Option<usize>,
    },

    /// Show the artifacts (and trace) of a past run
    Inspect {
        run_id: String,
    },
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let engine = match EngineConfig::load() {
        Ok(cfg) => cfg.with_env(),
        Err(e) => exit_with(e),
    };

    // RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(engine.log_filter.as_deref().unwrap_or("info"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            config,
            run_id,
            tags,
            trace,
        } => run_once(&engine, config.as_deref(), run_id, tags, trace),
        Commands::Validate { config } => validate(&engine, config.as_deref()),
        Commands::Schedule {
            config,
            cron,
            timezone,
            max_runs,
        } => schedule(&engine, config.as_deref(), &cron, timezone, max_runs).await,
        Commands::Inspect { run_id } => inspect(&engine, &run_id),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => exit_with(e),
    }
}

fn exit_with(e: OpgraphError) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), e);
    if let Some(suggestion) = e.fix_suggestion() {
        eprintln!("  {} {}", "Fix:".yellow(), suggestion);
    }
    std::process::exit(1);
}

fn load_job(engine: &EngineConfig, config: Option<&Path>) -> Result<Arc<Job>, OpgraphError> {
    let run_config = match config {
        Some(path) => RunConfig::from_file(path)?,
        None => catalog::default_run_config(&engine.storage.root),
    };
    catalog::clean_string_job(run_config)
}

fn executor(engine: &EngineConfig, log: &EventLog) -> Executor {
    let emitter = TracingEmitter::new(Arc::new(log.clone()));
    Executor::new(engine.storage_backend(), Arc::new(emitter))
}

fn run_once(
    engine: &EngineConfig,
    config: Option<&Path>,
    run_id: Option<String>,
    tags: Vec<(String, String)>,
    trace: bool,
) -> Result<bool, OpgraphError> {
    let job = load_job(engine, config)?;
    let log = EventLog::new();

    let mut request = RunRequest::new();
    request.run_id = run_id;
    request.tags.extend(tags);

    println!(
        "{} Running job '{}' with {} operators...",
        "→".cyan(),
        job.name().cyan().bold(),
        job.steps().len()
    );
    let outcome = executor(engine, &log).execute(&job, request)?;
    print_outcome(&outcome);

    if trace {
        let writer = TraceWriter::new(&engine.storage.root.join(TRACE_DIR), &outcome.run_id)?;
        let count = writer.write_run(&log, &outcome.run_id)?;
        println!(
            "  {} {} events → {}",
            "Trace:".dimmed(),
            count,
            writer.path().display()
        );
    }

    Ok(outcome.is_success())
}

fn print_outcome(outcome: &RunOutcome) {
    let status = if outcome.is_success() {
        outcome.status.to_string().green().bold()
    } else {
        outcome.status.to_string().red().bold()
    };
    println!("{} run {} ({:.2?})", status, outcome.run_id, outcome.duration);

    for artifact in &outcome.artifacts {
        println!(
            "  {} {}.{} {}",
            "✓".green(),
            artifact.operator,
            artifact.output,
            artifact.location.to_string().dimmed()
        );
    }
    if let Some(op) = &outcome.failed_operator {
        println!("  {} {}", "✗".red(), op);
    }
    if let Some(err) = &outcome.error {
        println!("      {} {}", "Error:".red(), err);
    }
    for (name, value) in &outcome.metrics {
        println!("  {} {} = {}", "metric".dimmed(), name, value);
    }
}

fn validate(engine: &EngineConfig, config: Option<&Path>) -> Result<bool, OpgraphError> {
    let job = load_job(engine, config)?;

    println!("{} Job '{}' is valid", "✓".green(), job.name());
    println!("  Order: {}", job.order().join(" → "));
    println!(
        "  Resources: {}",
        job.resources()
            .iter()
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(true)
}

async fn schedule(
    engine: &EngineConfig,
    config: Option<&Path>,
    cron: &str,
    timezone: Option<String>,
    max_runs: Option<usize>,
) -> Result<bool, OpgraphError> {
    let job = load_job(engine, config)?;
    let timezone = timezone.unwrap_or_else(|| engine.schedule.timezone.clone());

    // Long-lived: events go to the log output only, never into memory
    let emitter = Arc::new(TracingEmitter::new(Arc::new(NoopEmitter::new())));
    let scheduler = Arc::new(Scheduler::new(emitter.clone()));
    scheduler.register(catalog::clean_string_schedule(job, cron, &timezone)?)?;

    println!(
        "{} Scheduling '{}' at '{}' ({}), Ctrl-C to stop",
        "→".cyan(),
        catalog::CLEAN_STRING_SCHEDULE,
        cron,
        timezone
    );

    let stopper = Arc::clone(&scheduler);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.shutdown();
        }
    });

    let executor = Executor::new(engine.storage_backend(), emitter);
    let on_outcome: OutcomeSink = Arc::new(print_outcome);
    let tally = scheduler.run_with(executor, max_runs, on_outcome).await?;

    println!(
        "{} {} runs, {} failed",
        "Stopped:".cyan(),
        tally.total(),
        tally.failed
    );
    Ok(tally.failed == 0)
}

fn inspect(engine: &EngineConfig, run_id: &str) -> Result<bool, OpgraphError> {
    let storage = engine.storage_backend().open_existing(run_id)?;
    let artifacts = storage.list()?;

    println!("{} run {}", "Artifacts of".cyan(), run_id.bold());
    if artifacts.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (key, location) in &artifacts {
        let value = storage.get(key)?;
        println!("  {}.{} = {}", key.operator, key.output, value);
        println!("    {}", location.to_string().dimmed());
    }

    let trace_path = engine
        .storage
        .root
        .join(TRACE_DIR)
        .join(format!("{}.ndjson", run_id));
    if trace_path.exists() {
        let events = read_trace(&trace_path)?;
        println!("{} {} events", "Trace:".cyan(), events.len());
        for event in &events {
            let kind = serde_json::to_value(&event.kind)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
                .unwrap_or_default();
            println!("  [{:>5}ms] {}", event.timestamp_ms, kind);
        }
    }

    Ok(true)
}
