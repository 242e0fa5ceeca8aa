//! Confidence-to-uncertainty calibration (Idzorek's method).
//!
//! A view stated with confidence c in (0, 100] is turned into the variance
//! omega_k for its row of Omega. The 100% case has the closed form
//! omega_k = p_k (tau Sigma) p_k'. For lower confidence the calibrator
//! searches for the omega_k at which the blended weight tilt of the view,
//! taken in isolation against the equilibrium prior, is c/100 of the tilt
//! produced at full confidence.
//!
//! Tilts are measured on weights optimised against the prior covariance,
//! w = (delta Sigma)^-1 E\[R\], so that an infinitely uncertain view leaves the
//! market portfolio untouched and every target tilt is attainable.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, trace, warn};

use crate::blend::blend;
use crate::error::BlackLittermanError;
use crate::matrix::{dot, ensure_square, mat_scale, quadratic_form, vec_sub};
use crate::settings::CalibrationSettings;
use crate::types::{Matrix, Vector};
use crate::views::{ViewSet, FULL_CONFIDENCE};
use crate::weights::solve_weights;
use crate::BlackLittermanResult;

/// Squared full-confidence tilt norm below which a view is treated as
/// agreeing with the prior.
const NEGLIGIBLE_TILT: Decimal = dec!(0.000000000000000000000001);

// ---------------------------------------------------------------------------
// Context and strategy trait
// ---------------------------------------------------------------------------

/// Prior inputs shared by the calibration of every view.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationContext<'a> {
    pub implied_returns: &'a [Decimal],
    pub covariance: &'a [Vec<Decimal>],
    pub market_weights: &'a [Decimal],
    pub tau: Decimal,
    pub risk_aversion: Decimal,
}

/// Strategy turning one view's confidence into its variance in Omega.
pub trait ViewCalibrator {
    fn calibrate_view(
        &self,
        ctx: &CalibrationContext<'_>,
        view_index: usize,
        pick_row: &[Decimal],
        view_return: Decimal,
        confidence: Decimal,
    ) -> BlackLittermanResult<Decimal>;
}

/// Build the diagonal Omega for `views`, one independent calibration per row.
pub fn calibrate_view_uncertainty<C: ViewCalibrator + ?Sized>(
    calibrator: &C,
    ctx: &CalibrationContext<'_>,
    views: &ViewSet,
) -> BlackLittermanResult<Matrix> {
    let n = ensure_square(ctx.covariance, "covariance")?;
    if ctx.market_weights.len() != n {
        return Err(BlackLittermanError::dimension(
            "market_weights",
            n,
            ctx.market_weights.len(),
        ));
    }

    let k = views.len();
    let mut omega = vec![vec![Decimal::ZERO; k]; k];
    for (i, ((row, q), c)) in views
        .pick_matrix()
        .iter()
        .zip(views.view_returns().iter())
        .zip(views.confidences().iter())
        .enumerate()
    {
        if row.len() != n {
            return Err(BlackLittermanError::dimension("pick matrix row", n, row.len()));
        }
        omega[i][i] = calibrator.calibrate_view(ctx, i, row, *q, *c)?;
        debug!(view = i, confidence = %c, omega = %omega[i][i], "calibrated view uncertainty");
    }
    Ok(omega)
}

/// omega at 100% confidence: p (tau Sigma) p'.
pub fn full_confidence_variance(
    pick_row: &[Decimal],
    covariance: &[Vec<Decimal>],
    tau: Decimal,
) -> Decimal {
    quadratic_form(pick_row, &mat_scale(covariance, tau))
}

/// Weight change versus the market portfolio when a single view with
/// variance `omega` is blended into the prior.
pub fn weight_tilt(
    ctx: &CalibrationContext<'_>,
    pick_row: &[Decimal],
    view_return: Decimal,
    omega: Decimal,
) -> BlackLittermanResult<Vector> {
    let posterior = blend(
        ctx.implied_returns,
        ctx.covariance,
        ctx.tau,
        &[pick_row.to_vec()],
        &[view_return],
        &[vec![omega]],
    )?;
    let weights = solve_weights(&posterior.expected_returns, ctx.covariance, ctx.risk_aversion)?;
    Ok(vec_sub(&weights, ctx.market_weights))
}

fn check_confidence(view_index: usize, confidence: Decimal) -> BlackLittermanResult<()> {
    if confidence <= Decimal::ZERO || confidence > FULL_CONFIDENCE {
        return Err(BlackLittermanError::InvalidView {
            index: view_index,
            reason: format!("Confidence must be in (0, 100], got {}", confidence),
        });
    }
    Ok(())
}

fn confidence_too_small(view_index: usize, confidence: Decimal) -> BlackLittermanError {
    BlackLittermanError::InvalidView {
        index: view_index,
        reason: format!("Confidence {} is too small to calibrate", confidence),
    }
}

fn positive_full_confidence_variance(
    ctx: &CalibrationContext<'_>,
    view_index: usize,
    pick_row: &[Decimal],
) -> BlackLittermanResult<Decimal> {
    let omega_100 = full_confidence_variance(pick_row, ctx.covariance, ctx.tau);
    if omega_100 <= Decimal::ZERO {
        return Err(BlackLittermanError::SingularMatrix {
            context: format!("view #{} has no variance under tau * covariance", view_index),
        });
    }
    Ok(omega_100)
}

// ---------------------------------------------------------------------------
// Idzorek tilt matching
// ---------------------------------------------------------------------------

/// Bisection search for the omega that reproduces the confidence-scaled tilt.
#[derive(Debug, Clone, PartialEq)]
pub struct IdzorekCalibrator {
    /// Relative tolerance on the matched tilt.
    pub tolerance: Decimal,
    /// Budget shared by bracket expansion and bisection.
    pub max_iterations: u32,
}

impl Default for IdzorekCalibrator {
    fn default() -> Self {
        Self::new(&CalibrationSettings::default())
    }
}

impl IdzorekCalibrator {
    pub fn new(settings: &CalibrationSettings) -> Self {
        Self {
            tolerance: settings.tolerance,
            max_iterations: settings.max_iterations,
        }
    }
}

impl ViewCalibrator for IdzorekCalibrator {
    fn calibrate_view(
        &self,
        ctx: &CalibrationContext<'_>,
        view_index: usize,
        pick_row: &[Decimal],
        view_return: Decimal,
        confidence: Decimal,
    ) -> BlackLittermanResult<Decimal> {
        check_confidence(view_index, confidence)?;
        let omega_100 = positive_full_confidence_variance(ctx, view_index, pick_row)?;
        if confidence == FULL_CONFIDENCE {
            return Ok(omega_100);
        }

        let inverse_scale = FULL_CONFIDENCE
            .checked_div(confidence)
            .ok_or_else(|| confidence_too_small(view_index, confidence))?;
        let full_tilt = weight_tilt(ctx, pick_row, view_return, omega_100)?;
        let full_norm = dot(&full_tilt, &full_tilt);
        if full_norm < NEGLIGIBLE_TILT {
            warn!(
                view = view_index,
                "view agrees with the prior; using the closed-form uncertainty"
            );
            return AnalyticalCalibrator::scaled_variance(view_index, omega_100, confidence);
        }

        // Tilt at `omega` projected on the full-confidence tilt, relative to
        // the c/100 target, minus one. Decreasing in omega, equal to
        // 100 / c - 1 at omega_100 and tending to -1 as omega grows.
        let relative_error = |omega: Decimal| -> BlackLittermanResult<Decimal> {
            let tilt = weight_tilt(ctx, pick_row, view_return, omega)?;
            let fraction = dot(&tilt, &full_tilt) / full_norm;
            fraction
                .checked_mul(inverse_scale)
                .map(|ratio| ratio - Decimal::ONE)
                .ok_or_else(|| confidence_too_small(view_index, confidence))
        };

        let not_converged = |iterations: u32, last_error: Decimal| {
            BlackLittermanError::CalibrationNonConvergence {
                view_index,
                iterations,
                last_error,
            }
        };

        let mut iterations = 0u32;
        let mut lo;
        let mut hi = omega_100;
        let mut last_error;

        // Double the upper end until the tilt drops to (or below) the target.
        loop {
            if iterations >= self.max_iterations {
                return Err(not_converged(iterations, relative_error(hi)?));
            }
            lo = hi;
            hi = match hi.checked_mul(dec!(2)) {
                Some(v) => v,
                None => return Err(not_converged(iterations, relative_error(lo)?)),
            };
            iterations += 1;
            last_error = relative_error(hi)?;
            trace!(view = view_index, iterations, omega = %hi, error = %last_error, "bracket");
            if last_error.abs() <= self.tolerance {
                return Ok(hi);
            }
            if last_error < Decimal::ZERO {
                break;
            }
        }

        let two = dec!(2);
        while iterations < self.max_iterations {
            let mid = (lo + hi) / two;
            iterations += 1;
            last_error = relative_error(mid)?;
            trace!(view = view_index, iterations, omega = %mid, error = %last_error, "bisect");
            if last_error.abs() <= self.tolerance {
                debug!(view = view_index, iterations, "calibration converged");
                return Ok(mid);
            }
            if last_error > Decimal::ZERO {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        Err(not_converged(iterations, last_error))
    }
}

// ---------------------------------------------------------------------------
// Closed form
// ---------------------------------------------------------------------------

/// omega = omega_100 * (200 / c - 1).
///
/// For a single view the tilt against the prior covariance is proportional
/// to 1 / (p Sigma p' + omega / tau), which makes the tilt-matching equation
/// solvable directly. Agrees with [`IdzorekCalibrator`] up to its tolerance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalyticalCalibrator;

impl AnalyticalCalibrator {
    fn scaled_variance(
        view_index: usize,
        omega_100: Decimal,
        confidence: Decimal,
    ) -> BlackLittermanResult<Decimal> {
        dec!(200)
            .checked_div(confidence)
            .and_then(|ratio| omega_100.checked_mul(ratio - Decimal::ONE))
            .ok_or_else(|| confidence_too_small(view_index, confidence))
    }
}

impl ViewCalibrator for AnalyticalCalibrator {
    fn calibrate_view(
        &self,
        ctx: &CalibrationContext<'_>,
        view_index: usize,
        pick_row: &[Decimal],
        _view_return: Decimal,
        confidence: Decimal,
    ) -> BlackLittermanResult<Decimal> {
        check_confidence(view_index, confidence)?;
        let omega_100 = positive_full_confidence_variance(ctx, view_index, pick_row)?;
        Self::scaled_variance(view_index, omega_100, confidence)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
