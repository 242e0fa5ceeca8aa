use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use black_litterman_core::report::{self, AllocationInput};
use black_litterman_core::settings::CalculationSettings;

use crate::input;

/// Arguments for a Black-Litterman allocation
#[derive(Args)]
pub struct AllocateArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,

    /// JSON or YAML settings file replacing the input's settings
    #[arg(long)]
    pub settings: Option<String>,

    /// Calculation date (YYYY-MM-DD), default the last return observation
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Covariance window in return periods
    #[arg(long)]
    pub window: Option<usize>,

    /// Uncertainty scaling of the prior (tau)
    #[arg(long)]
    pub tau: Option<Decimal>,

    /// Risk aversion coefficient (delta)
    #[arg(long)]
    pub risk_aversion: Option<Decimal>,
}

pub fn run_allocate(args: AllocateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut alloc_input: AllocationInput =
        input::read_request(args.input.as_deref(), "allocation")?;
    if let Some(ref path) = args.settings {
        alloc_input.settings = input::file::read_settings(path)?;
    }
    apply_overrides(&mut alloc_input.settings, &args);
    if args.date.is_some() {
        alloc_input.calculation_date = args.date;
    }

    let result = report::run_allocation(&alloc_input)?;
    Ok(serde_json::to_value(result)?)
}

fn apply_overrides(settings: &mut CalculationSettings, args: &AllocateArgs) {
    if let Some(window) = args.window {
        settings.covariance_window = window;
    }
    if let Some(tau) = args.tau {
        settings.tau = tau;
    }
    if let Some(delta) = args.risk_aversion {
        settings.risk_aversion = delta;
    }
}
