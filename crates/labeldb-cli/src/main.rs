//! LabelDB CLI - administer a database with mandatory access control.

mod commands;
mod executor;
mod formatter;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use labeldb_core::{Database, DatabaseConfig, DominanceOrder, Error, MacConfig, MacError};
use tracing_subscriber::EnvFilter;

use commands::Command;
use executor::CommandExecutor;
use formatter::OutputFormat;

/// LabelDB command-line interface.
#[derive(Parser, Debug)]
#[command(name = "labeldb")]
#[command(version, about, long_about = None)]
struct Args {
    /// Database directory
    #[arg(short, long, global = true, default_value = "./labeldb_data")]
    data_dir: PathBuf,

    /// Principal the command runs as
    #[arg(short, long, global = true, default_value = "ADMIN")]
    user: String,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Sensitivity order used by the credential cascade: "alphabetical" or a
    /// ranking such as "UNCLASSIFIED,SECRET,TOP"
    #[arg(long, global = true)]
    dominance_order: Option<DominanceOrder>,

    /// Give up waiting for the label store lock after this many milliseconds
    #[arg(long, global = true)]
    lock_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

/// Errors surfaced by the CLI.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Malformed command-line input.
    #[error("{0}")]
    Usage(String),

    /// Access-control failure.
    #[error(transparent)]
    Mac(#[from] MacError),
}

impl From<Error> for CliError {
    fn from(e: Error) -> Self {
        CliError::Mac(MacError::Engine(e))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("labeldb_cli=info".parse().unwrap())
                .add_directive("labeldb_core=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let mut mac = MacConfig::default()
        .with_system_lock_timeout(args.lock_timeout_ms.map(Duration::from_millis));
    if let Some(order) = args.dominance_order {
        mac = mac.with_dominance(order);
    }
    let config = DatabaseConfig::new(&args.data_dir).with_mac(mac);

    let db = Database::open(config)?;
    let output = CommandExecutor::new(&db, &args.user).execute(args.command)?;
    db.flush()?;

    println!("{}", args.format.render(&output));
    Ok(())
}
