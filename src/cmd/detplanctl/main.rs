use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use detplan::internal::{
    config::Config,
    kernel::{
        context::{FixedRunId, KernelContext, UuidRunIds},
        failures::ensure_replay_identical,
        hashing::canonical_json,
    },
    plan::planner::Planner,
    provenance::ledger::{AppendOutcome, Ledger},
    registry::discover,
};
use serde_json::{json, Value};
use std::fs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "detplanctl")]
#[command(about = "Deterministic planning kernel CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce a plan for a goal without executing it
    Plan {
        /// Goal description
        #[arg(short, long)]
        goal: String,

        /// Output file for the plan
        #[arg(short, long)]
        out: Option<String>,

        /// Plan twice and fail if the outputs differ
        #[arg(long)]
        verify_replay: bool,
    },
    /// List the action catalog
    Actions,
    /// Print the kernel context for the current configuration
    Context {
        /// Fixed run id instead of a random one
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Provenance ledger operations
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Append an event onto the current head
    Append {
        /// Event payload as a JSON object
        #[arg(short, long)]
        payload: String,
    },
    /// Verify the hash chain
    Verify,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("DETPLAN_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| "detplan=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid DETPLAN_* configuration")?;

    match cli.command {
        Commands::Plan {
            goal,
            out,
            verify_replay,
        } => run_plan(&config, &goal, out.as_deref(), verify_replay),
        Commands::Actions => list_actions(&config),
        Commands::Context { run_id } => print_context(&config, run_id),
        Commands::Ledger { command } => match command {
            LedgerCommands::Append { payload } => append_event(&config, &payload),
            LedgerCommands::Verify => verify_ledger(&config),
        },
    }
}

fn run_plan(config: &Config, goal: &str, out: Option<&str>, verify_replay: bool) -> Result<()> {
    let catalog = discover(config).context("Action discovery failed")?;
    let planner = Planner::new();
    let plan = planner.plan(goal, config, &catalog)?;
    let rendered = canonical_json(&plan)?;

    if verify_replay {
        let replay = planner.plan(goal, config, &catalog)?;
        ensure_replay_identical(rendered.as_bytes(), canonical_json(&replay)?.as_bytes())?;
    }

    match out {
        Some(path) => {
            fs::write(path, &rendered).with_context(|| format!("Failed to write {path}"))?;
            eprintln!("Plan with {} steps written to {}", plan.steps.len(), path);
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn list_actions(config: &Config) -> Result<()> {
    let catalog = discover(config).context("Action discovery failed")?;
    let entries: Vec<Value> = catalog
        .iter()
        .map(|action| {
            json!({
                "name": action.name(),
                "origin": action.origin(),
                "profile": action.profile(),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn print_context(config: &Config, run_id: Option<String>) -> Result<()> {
    let context = match run_id {
        Some(id) => KernelContext::build_with(config, &FixedRunId(id))?,
        None => KernelContext::build_with(config, &UuidRunIds)?,
    };
    println!("{}", serde_json::to_string_pretty(&context.to_dict())?);
    Ok(())
}

fn append_event(config: &Config, raw_payload: &str) -> Result<()> {
    let mut payload: Value = serde_json::from_str(raw_payload).context("Payload is not valid JSON")?;
    let Some(object) = payload.as_object_mut() else {
        bail!("Payload must be a JSON object");
    };
    object
        .entry("ts")
        .or_insert_with(|| json!(chrono::Utc::now().to_rfc3339()));

    let mut ledger = Ledger::open(config)?;
    match ledger.append_next(payload)? {
        AppendOutcome::Appended(event) => println!("{}", serde_json::to_string_pretty(&event)?),
        AppendOutcome::Skipped => println!("{}", json!({"skipped": true, "reason": "ledger_disabled"})),
    }
    Ok(())
}

fn verify_ledger(config: &Config) -> Result<()> {
    let ledger = Ledger::open(config)?;
    let count = ledger.verify()?;
    println!("{}", json!({"ok": true, "events": count, "path": ledger.path()}));
    Ok(())
}
