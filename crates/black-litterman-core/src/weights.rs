use rust_decimal::Decimal;

use crate::error::BlackLittermanError;
use crate::matrix::{ensure_square, mat_scale, solve};
use crate::types::Vector;
use crate::BlackLittermanResult;

/// Unconstrained mean-variance optimum w = (delta * Sigma)^-1 * E\[R\].
///
/// No normalisation or long-only constraint is applied: weights may be
/// negative and need not sum to one.
pub fn solve_weights(
    expected_returns: &[Decimal],
    covariance: &[Vec<Decimal>],
    delta: Decimal,
) -> BlackLittermanResult<Vector> {
    let n = ensure_square(covariance, "covariance")?;
    if expected_returns.len() != n {
        return Err(BlackLittermanError::dimension(
            "expected returns",
            n,
            expected_returns.len(),
        ));
    }
    if delta <= Decimal::ZERO {
        return Err(BlackLittermanError::parameter(
            "risk_aversion",
            format!("Must be positive, got {}", delta),
        ));
    }

    solve(
        &mat_scale(covariance, delta),
        expected_returns,
        "risk-scaled covariance",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equilibrium::implied_returns;
    use rust_decimal_macros::dec;

    #[test]
    fn test_recovers_market_weights_from_implied_returns() {
        let sigma = vec![
            vec![dec!(0.0225), dec!(0.0045), dec!(0.015)],
            vec![dec!(0.0045), dec!(0.01), dec!(0.002)],
            vec![dec!(0.015), dec!(0.002), dec!(0.04)],
        ];
        let w_mkt = vec![dec!(0.5), dec!(0.3), dec!(0.2)];
        let pi = implied_returns(&sigma, &w_mkt, dec!(2.5)).unwrap();
        let w = solve_weights(&pi, &sigma, dec!(2.5)).unwrap();
        for (got, want) in w.iter().zip(w_mkt.iter()) {
            assert!((*got - *want).abs() < dec!(0.000000000001), "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_weights_unnormalised() {
        // Diagonal Sigma: w_i = mu_i / (delta * sigma_ii)
        let sigma = vec![vec![dec!(0.04), dec!(0)], vec![dec!(0), dec!(0.01)]];
        let mu = vec![dec!(0.10), dec!(-0.02)];
        let w = solve_weights(&mu, &sigma, dec!(2)).unwrap();
        assert_eq!(w, vec![dec!(1.25), dec!(-1)]);
    }

    #[test]
    fn test_singular_covariance() {
        let sigma = vec![vec![dec!(0.04), dec!(0.04)], vec![dec!(0.04), dec!(0.04)]];
        assert!(matches!(
            solve_weights(&[dec!(0.1), dec!(0.1)], &sigma, dec!(2.5)),
            Err(BlackLittermanError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn test_parameter_checks() {
        let sigma = vec![vec![dec!(0.04)]];
        assert!(matches!(
            solve_weights(&[dec!(0.1)], &sigma, Decimal::ZERO),
            Err(BlackLittermanError::InvalidParameter { .. })
        ));
        assert!(matches!(
            solve_weights(&[dec!(0.1), dec!(0.2)], &sigma, dec!(2.5)),
            Err(BlackLittermanError::DimensionMismatch { .. })
        ));
    }
}
