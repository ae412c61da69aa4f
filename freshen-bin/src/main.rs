use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{self, WrapErr};
use freshen_common::{ManagedUnit, OperationOutcome};
use freshen_engine::{DetectionSummary, DockerRuntime, Fleet, FleetConfig};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,freshen=debug";

#[derive(Parser, Debug)]
#[command(name = "freshen", version, about = "Keep Docker containers on their latest images")]
struct Cli {
    /// Emit single-line JSON instead of pretty-printed output.
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List deployment units without contacting any registry.
    List,
    /// Pull every registry image once and report which units are outdated.
    Check,
    /// Update a unit by compose project name or container id.
    Update { id: String },
    Start { id: String },
    Stop { id: String },
    Restart { id: String },
}

#[derive(Serialize)]
struct CheckReport {
    summary: DetectionSummary,
    units: Vec<ManagedUnit>,
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> eyre::Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{rendered}");
    Ok(())
}

fn status_code(outcome: &OperationOutcome) -> u8 {
    if outcome.success {
        0
    } else {
        1
    }
}

fn report(outcome: &OperationOutcome, compact: bool) -> eyre::Result<ExitCode> {
    print_json(outcome, compact)?;
    Ok(ExitCode::from(status_code(outcome)))
}

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = FleetConfig::from_env();
    info!(?config, "Loaded configuration");

    let runtime = DockerRuntime::connect().wrap_err("Failed to connect to Docker")?;
    runtime
        .ping()
        .await
        .wrap_err("Docker daemon is not responding")?;
    let fleet = Fleet::new(Arc::new(runtime), config);

    let code = match cli.command {
        Command::List => {
            let units = fleet.discover().await?;
            print_json(&units, cli.compact)?;
            ExitCode::SUCCESS
        }
        Command::Check => {
            let (units, summary) = fleet.check().await?;
            info!(
                units = units.len(),
                units_with_updates = summary.units_with_updates,
                "Update check finished"
            );
            print_json(&CheckReport { summary, units }, cli.compact)?;
            ExitCode::SUCCESS
        }
        Command::Update { id } => report(&fleet.update_unit(&id).await, cli.compact)?,
        Command::Start { id } => report(&fleet.start(&id).await, cli.compact)?,
        Command::Stop { id } => report(&fleet.stop(&id).await, cli.compact)?,
        Command::Restart { id } => report(&fleet.restart(&id).await, cli.compact)?,
    };

    Ok(code)
}
