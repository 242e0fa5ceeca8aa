use rust_decimal::Decimal;

use crate::error::BlackLittermanError;
use crate::matrix::{ensure_square, mat_vec};
use crate::types::Vector;
use crate::BlackLittermanResult;

/// Reverse-optimised equilibrium returns: Pi = delta * Sigma * w_mkt.
///
/// Pi is the expected-return vector for which the market portfolio is the
/// unconstrained mean-variance optimum at risk aversion `delta`.
pub fn implied_returns(
    sigma: &[Vec<Decimal>],
    market_weights: &[Decimal],
    delta: Decimal,
) -> BlackLittermanResult<Vector> {
    let n = ensure_square(sigma, "covariance")?;
    if market_weights.len() != n {
        return Err(BlackLittermanError::dimension(
            "market_weights",
            n,
            market_weights.len(),
        ));
    }
    if delta <= Decimal::ZERO {
        return Err(BlackLittermanError::parameter(
            "risk_aversion",
            format!("Must be positive, got {}", delta),
        ));
    }

    Ok(mat_vec(sigma, market_weights)
        .into_iter()
        .map(|v| delta * v)
        .collect())
}
