use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod util;

use commands::history::HistoryArgs;
use commands::record::RecordArgs;
use commands::snapshot::SnapshotArgs;
use commands::upside::UpsideArgs;
use commands::verify::VerifyArgs;

#[derive(Parser)]
#[command(
    name = "provenance",
    version,
    about = "Record tool calls and verify narrative text against the facts they returned"
)]
struct Cli {
    /// Root directory of the call log store
    #[arg(long, env = "PROVENANCE_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    /// Recency window in minutes (clamped to 1..=10080)
    #[arg(long, env = "PROVENANCE_WINDOW_MINUTES", global = true)]
    window_minutes: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a narrative text against the entity's logged facts
    Verify(VerifyArgs),
    /// Show the latest payload per tool for an entity
    Snapshot(SnapshotArgs),
    /// Replay recorded verification verdicts
    History(HistoryArgs),
    /// Append one tool call record
    Record(RecordArgs),
    /// Compute (and record) the upside from a current to a target price
    Upside(UpsideArgs),
}

fn main() {
    let _ = dotenvy::dotenv();

    // Structured JSON logging on stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "provenance_engine=info,provenance_cli=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let ctx = util::Context {
        log_dir: cli.log_dir.unwrap_or_else(util::default_log_dir),
        window_minutes: util::clamp_window_minutes(cli.window_minutes),
    };
    tracing::debug!(
        log_dir = %ctx.log_dir.display(),
        window_minutes = ctx.window_minutes,
        "resolved configuration"
    );

    let code = match cli.command {
        Commands::Verify(args) => commands::verify::run(&ctx, args),
        Commands::Snapshot(args) => commands::snapshot::run(&ctx, args),
        Commands::History(args) => commands::history::run(&ctx, args),
        Commands::Record(args) => commands::record::run(&ctx, args),
        Commands::Upside(args) => commands::upside::run(&ctx, args),
    };
    std::process::exit(code);
}
