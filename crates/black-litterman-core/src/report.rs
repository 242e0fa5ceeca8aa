use chrono::NaiveDate;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::calibration::IdzorekCalibrator;
use crate::covariance::{annualise, estimate_covariance, ReturnHistory};
use crate::equilibrium::implied_returns;
use crate::error::BlackLittermanError;
use crate::matrix::{dot, ensure_square, ensure_symmetric, portfolio_volatility};
use crate::session::{run_chain, Allocation, SessionResult};
use crate::settings::CalculationSettings;
use crate::types::{with_metadata, ComputationOutput, Matrix, Rate, Vector};
use crate::universe::AssetUniverse;
use crate::views::View;
use crate::BlackLittermanResult;

/// Tilts beyond this (in absolute weight) are flagged.
const LARGE_TILT: Decimal = dec!(0.25);
/// Gross exposure sum |w| beyond this is flagged.
const GROSS_LEVERAGE_LIMIT: Decimal = dec!(1.5);

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// One-shot allocation request.
///
/// Market data is either a dated return history (estimated over the rolling
/// window ending at `calculation_date`, default the last observation) or an
/// already annualised covariance matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationInput {
    pub universe: AssetUniverse,
    #[serde(default)]
    pub views: Vec<View>,
    #[serde(default)]
    pub settings: CalculationSettings,
    #[serde(default)]
    pub calculation_date: Option<NaiveDate>,
    #[serde(default)]
    pub returns: Option<ReturnHistory>,
    #[serde(default)]
    pub covariance: Option<Matrix>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub name: String,
    pub market_weight: Decimal,
    pub implied_return: Rate,
    pub posterior_return: Rate,
    pub blended_weight: Decimal,
    /// blended_weight - market_weight
    pub tilt: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewSummary {
    pub description: String,
    pub view_return: Rate,
    pub confidence: Decimal,
    /// Calibrated diagonal entry of Omega.
    pub uncertainty: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub expected_return: Rate,
    pub volatility: Decimal,
    pub gross_exposure: Decimal,
    pub net_exposure: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutput {
    pub calculation_date: Option<NaiveDate>,
    pub assets: Vec<AssetAllocation>,
    pub views: Vec<ViewSummary>,
    pub market_portfolio: PortfolioSummary,
    pub blended_portfolio: PortfolioSummary,
    pub covariance: Matrix,
    pub posterior_covariance: Matrix,
}

/// Run the market and blended allocations for one request.
pub fn run_allocation(
    input: &AllocationInput,
) -> BlackLittermanResult<ComputationOutput<AllocationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    input.settings.validate()?;
    let universe = &input.universe;
    let (calculation_date, covariance) = resolve_covariance(input)?;

    let calibrator = IdzorekCalibrator::new(&input.settings.calibration);
    let result = run_chain(
        universe,
        calculation_date,
        covariance,
        &input.views,
        &input.settings,
        &calibrator,
    )?;

    let assets = asset_rows(universe, &result);
    for row in &assets {
        if row.blended_weight < Decimal::ZERO {
            warnings.push(format!(
                "Short position: {} has blended weight {:.4}",
                row.name, row.blended_weight
            ));
        }
        if row.tilt.abs() > LARGE_TILT {
            warnings.push(format!(
                "Large tilt: {} moves {:.4} away from its market weight",
                row.name, row.tilt
            ));
        }
    }

    let market_portfolio = summarise(&result.market);
    let blended_portfolio = summarise(&result.blended);
    if blended_portfolio.gross_exposure > GROSS_LEVERAGE_LIMIT {
        warnings.push(format!(
            "High gross leverage: blended weights sum to {:.4} in absolute value",
            blended_portfolio.gross_exposure
        ));
    }

    let views = input
        .views
        .iter()
        .enumerate()
        .map(|(i, view)| ViewSummary {
            description: view.description(),
            view_return: view.view_return(),
            confidence: view.confidence(),
            uncertainty: result.view_uncertainty[i][i],
        })
        .collect();

    let output = AllocationOutput {
        calculation_date,
        assets,
        views,
        market_portfolio,
        blended_portfolio,
        covariance: result.covariance,
        posterior_covariance: result.blended.covariance,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Black-Litterman allocation with Idzorek confidence calibration",
        &serde_json::json!({
            "n_assets": universe.len(),
            "n_views": input.views.len(),
            "risk_aversion": input.settings.risk_aversion.to_string(),
            "tau": input.settings.tau.to_string(),
            "covariance_window": input.settings.covariance_window,
            "periods_per_year": input.settings.periods_per_year,
            "weights": "unconstrained, unnormalised",
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn resolve_covariance(
    input: &AllocationInput,
) -> BlackLittermanResult<(Option<NaiveDate>, Matrix)> {
    let n = input.universe.len();
    match (&input.covariance, &input.returns) {
        (Some(cov), _) => {
            if ensure_square(cov, "covariance")? != n {
                return Err(BlackLittermanError::dimension("covariance", n, cov.len()));
            }
            ensure_symmetric(cov, "covariance")?;
            Ok((input.calculation_date, cov.clone()))
        }
        (None, Some(history)) => {
            let (date, cov) = estimate_from_history(
                history,
                input.calculation_date,
                input.settings.covariance_window,
                input.settings.periods_per_year,
            )?;
            if cov.len() != n {
                return Err(BlackLittermanError::dimension("return history width", n, cov.len()));
            }
            Ok((Some(date), cov))
        }
        (None, None) => Err(BlackLittermanError::InsufficientData(
            "Either `returns` or `covariance` must be supplied".into(),
        )),
    }
}

fn estimate_from_history(
    history: &ReturnHistory,
    calculation_date: Option<NaiveDate>,
    window: usize,
    periods_per_year: u32,
) -> BlackLittermanResult<(NaiveDate, Matrix)> {
    let date = match calculation_date.or_else(|| history.observations().last().map(|o| o.date)) {
        Some(d) => d,
        None => {
            return Err(BlackLittermanError::InsufficientData(
                "Return history is empty".into(),
            ))
        }
    };
    let rows = history.window_ending(date, window)?;
    Ok((date, annualise(&estimate_covariance(&rows)?, periods_per_year)))
}

fn asset_rows(universe: &AssetUniverse, result: &SessionResult) -> Vec<AssetAllocation> {
    universe
        .assets()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let market_weight = universe.market_weights()[i];
            let blended_weight = result.blended.weights[i];
            AssetAllocation {
                name: name.clone(),
                market_weight,
                implied_return: result.implied_returns[i],
                posterior_return: result.blended.expected_returns[i],
                blended_weight,
                tilt: blended_weight - market_weight,
            }
        })
        .collect()
}

fn summarise(allocation: &Allocation) -> PortfolioSummary {
    PortfolioSummary {
        expected_return: dot(&allocation.weights, &allocation.expected_returns),
        volatility: portfolio_volatility(&allocation.weights, &allocation.covariance),
        gross_exposure: allocation.weights.iter().map(|w| w.abs()).sum(),
        net_exposure: allocation.weights.iter().copied().sum(),
    }
}

// ---------------------------------------------------------------------------
// Implied returns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpliedReturnsInput {
    pub universe: AssetUniverse,
    /// Annualised covariance, universe order.
    pub covariance: Matrix,
    #[serde(default = "default_risk_aversion")]
    pub risk_aversion: Decimal,
}

fn default_risk_aversion() -> Decimal {
    CalculationSettings::default().risk_aversion
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetReturn {
    pub name: String,
    pub implied_return: Rate,
}

/// Reverse-optimised returns Pi for a universe and covariance.
pub fn run_implied_returns(
    input: &ImpliedReturnsInput,
) -> BlackLittermanResult<ComputationOutput<Vec<AssetReturn>>> {
    let start = Instant::now();
    ensure_symmetric(&input.covariance, "covariance")?;
    let pi = implied_returns(
        &input.covariance,
        input.universe.market_weights(),
        input.risk_aversion,
    )?;

    let mut warnings = Vec::new();
    for (name, r) in input.universe.assets().iter().zip(pi.iter()) {
        if *r < Decimal::ZERO {
            warnings.push(format!("Negative implied return for {}: {:.4}", name, r));
        }
    }

    let output = input
        .universe
        .assets()
        .iter()
        .zip(pi)
        .map(|(name, implied_return)| AssetReturn {
            name: name.clone(),
            implied_return,
        })
        .collect();

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Reverse optimisation: Pi = delta * Sigma * w_mkt",
        &serde_json::json!({
            "n_assets": input.universe.len(),
            "risk_aversion": input.risk_aversion.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Covariance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CovarianceInput {
    pub returns: ReturnHistory,
    #[serde(default)]
    pub calculation_date: Option<NaiveDate>,
    #[serde(default)]
    pub settings: CalculationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CovarianceOutput {
    pub calculation_date: NaiveDate,
    /// Annualised sample covariance.
    pub covariance: Matrix,
    /// Square roots of the diagonal.
    pub volatilities: Vector,
}

/// Annualised rolling-window covariance of a return history.
pub fn run_covariance(
    input: &CovarianceInput,
) -> BlackLittermanResult<ComputationOutput<CovarianceOutput>> {
    let start = Instant::now();
    input.settings.validate()?;
    let (calculation_date, covariance) = estimate_from_history(
        &input.returns,
        input.calculation_date,
        input.settings.covariance_window,
        input.settings.periods_per_year,
    )?;

    let mut warnings = Vec::new();
    let available = input
        .returns
        .observations()
        .iter()
        .filter(|o| o.date <= calculation_date)
        .count();
    if available < input.settings.covariance_window {
        warnings.push(format!(
            "Only {} of {} requested periods available on or before {}",
            available, input.settings.covariance_window, calculation_date
        ));
    }

    let volatilities = covariance
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].sqrt().unwrap_or(Decimal::ZERO))
        .collect();

    let output = CovarianceOutput {
        calculation_date,
        covariance,
        volatilities,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sample covariance (T - 1), annualised",
        &serde_json::json!({
            "covariance_window": input.settings.covariance_window,
            "periods_per_year": input.settings.periods_per_year,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
