use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use black_litterman_core::report::{self, CovarianceInput, ImpliedReturnsInput};

use crate::input;

/// Arguments for equilibrium (implied) returns
#[derive(Args)]
pub struct ImpliedReturnsArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,

    /// Risk aversion coefficient (delta), replacing the input's value
    #[arg(long)]
    pub risk_aversion: Option<Decimal>,
}

/// Arguments for covariance estimation
#[derive(Args)]
pub struct CovarianceArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,

    /// JSON or YAML settings file replacing the input's settings
    #[arg(long)]
    pub settings: Option<String>,

    /// Covariance window in return periods
    #[arg(long)]
    pub window: Option<usize>,
}

pub fn run_implied_returns(args: ImpliedReturnsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut ir_input: ImpliedReturnsInput =
        input::read_request(args.input.as_deref(), "implied returns")?;
    if let Some(delta) = args.risk_aversion {
        ir_input.risk_aversion = delta;
    }
    let result = report::run_implied_returns(&ir_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_covariance(args: CovarianceArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut cov_input: CovarianceInput = input::read_request(args.input.as_deref(), "covariance")?;
    if let Some(ref path) = args.settings {
        cov_input.settings = input::file::read_settings(path)?;
    }
    if let Some(window) = args.window {
        cov_input.settings.covariance_window = window;
    }
    let result = report::run_covariance(&cov_input)?;
    Ok(serde_json::to_value(result)?)
}
