mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::problem::{SectorArgs, ValidateArgs};
use commands::utility::UtilityArgs;

/// Index-tracking portfolio problem preparation
#[derive(Parser)]
#[command(
    name = "itrack",
    version,
    about = "Index-tracking portfolio problem preparation",
    long_about = "A CLI for preparing index-tracking optimization instances: EWMA utility \
                  matrices from price histories with missing data, sector weight bands, \
                  and validation of the MIQP instance handed to an external solver."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log pipeline stages to stderr (overrides RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the utility matrix and benchmark vector from prices
    Utility(UtilityArgs),
    /// Build sector weight bands as linear constraints
    SectorConstraints(SectorArgs),
    /// Validate an instance and print the solver document
    Validate(ValidateArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Utility(args) => commands::utility::run_utility(args),
        Commands::SectorConstraints(args) => commands::problem::run_sector_constraints(args),
        Commands::Validate(args) => commands::problem::run_validate(args),
        Commands::Version => {
            println!("itrack {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
