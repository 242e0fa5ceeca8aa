mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::allocate::AllocateArgs;
use commands::market::{CovarianceArgs, ImpliedReturnsArgs};

/// Black-Litterman portfolio allocation
#[derive(Parser)]
#[command(
    name = "blc",
    version,
    about = "Black-Litterman portfolio allocation",
    long_about = "Blends market-equilibrium returns with up to four investor views, \
                  calibrating each view's uncertainty from a confidence level \
                  (Idzorek's method), and reports market and blended allocations \
                  with decimal precision."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log pipeline stages to stderr (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Market and blended allocations for a universe and a set of views
    Allocate(AllocateArgs),
    /// Reverse-optimised equilibrium returns
    ImpliedReturns(ImpliedReturnsArgs),
    /// Annualised rolling-window covariance of a return history
    Covariance(CovarianceArgs),
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

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Allocate(args) => commands::allocate::run_allocate(args),
        Commands::ImpliedReturns(args) => commands::market::run_implied_returns(args),
        Commands::Covariance(args) => commands::market::run_covariance(args),
        Commands::Version => {
            println!("blc {}", env!("CARGO_PKG_VERSION"));
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
