// ABOUTME: Command-line entry point
// ABOUTME: Parses arguments, sets up logging and dispatches to the collect/workspaces runs

use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process;

use pbi_refresh_history::config::Settings;
use pbi_refresh_history::logging::init_logger;
use pbi_refresh_history::scheduler::{FailurePolicy, DEFAULT_MAX_CONCURRENCY};
use pbi_refresh_history::transform::DEFAULT_TIMEZONE;
use pbi_refresh_history::{run_collect, run_list_workspaces, CollectOptions};

#[derive(Parser)]
#[command(name = "pbi-refresh-history")]
#[command(about = "Collects Power BI dataset refresh and dataflow transaction history")]
#[command(version)]
struct Cli {
    /// TOML settings file (credentials, API base URL, timeouts)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Also append log lines to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect the history of every workspace into one JSON report
    Collect {
        /// Path of the JSON report to write
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// IANA timezone the report timestamps are shown in
        #[arg(long, short = 't', default_value = DEFAULT_TIMEZONE)]
        timezone: String,

        /// Maximum number of history fetches in flight at once
        #[arg(long, default_value_t = default_max_concurrency())]
        max_concurrency: NonZeroUsize,

        /// What to do when one dataset or dataflow cannot be fetched
        #[arg(long, value_enum, default_value_t = FailurePolicy::FailFast)]
        on_error: FailurePolicy,
    },
    /// List the workspaces visible to the service principal
    Workspaces,
}

fn default_max_concurrency() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_MAX_CONCURRENCY).unwrap_or(NonZeroUsize::MIN)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logger(cli.log_file.as_deref()) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    match cli.command {
        Command::Collect {
            output,
            timezone,
            max_concurrency,
            on_error,
        } => {
            let options = CollectOptions {
                output,
                timezone,
                max_concurrency,
                policy: on_error,
                show_progress: std::io::stderr().is_terminal(),
            };

            match run_collect(&settings, &options).await {
                Ok(summary) if summary.is_complete() => {
                    println!(
                        "Wrote {} records from {} datasets/dataflows to {}",
                        summary.rows,
                        summary.units,
                        options.output.display()
                    );
                }
                Ok(summary) => {
                    eprintln!(
                        "Wrote {} records to {}, but {} of {} datasets/dataflows could not be fetched:",
                        summary.rows,
                        options.output.display(),
                        summary.failures.len(),
                        summary.units
                    );
                    for failure in &summary.failures {
                        eprintln!("  - {}: {}", failure.unit, failure.error);
                    }
                    process::exit(2);
                }
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    process::exit(1);
                }
            }
        }
        Command::Workspaces => match run_list_workspaces(&settings).await {
            Ok(workspaces) if workspaces.is_empty() => println!("No workspaces found."),
            Ok(workspaces) => {
                for workspace in workspaces {
                    println!("{} — {}", workspace.id, workspace.name);
                }
            }
            Err(e) => {
                eprintln!("Error: {:#}", e);
                process::exit(1);
            }
        },
    }
}
