use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BlackLittermanError;
use crate::matrix::{
    ensure_square, mat_add, mat_mul, mat_scale, mat_vec, symmetrize, transpose, vec_add,
    LuDecomposition,
};
use crate::types::{Matrix, Vector};
use crate::BlackLittermanResult;

/// Posterior return distribution for one calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posterior {
    /// E\[R\]
    pub expected_returns: Vector,
    /// Sigma_BL = Sigma + M
    pub covariance: Matrix,
}

/// Blend the equilibrium prior with views.
///
/// ```text
/// M     = [(tau Sigma)^-1 + P' Omega^-1 P]^-1
/// E[R]  = M [(tau Sigma)^-1 Pi + P' Omega^-1 Q]
/// Sigma_BL = Sigma + M
/// ```
///
/// With no views the prior is returned unchanged (E\[R\] = Pi, Sigma_BL =
/// Sigma) and nothing is factorised.
pub fn blend(
    pi: &[Decimal],
    sigma: &[Vec<Decimal>],
    tau: Decimal,
    pick_matrix: &[Vec<Decimal>],
    view_returns: &[Decimal],
    omega: &[Vec<Decimal>],
) -> BlackLittermanResult<Posterior> {
    let n = ensure_square(sigma, "covariance")?;
    if pi.len() != n {
        return Err(BlackLittermanError::dimension("implied returns", n, pi.len()));
    }
    if tau <= Decimal::ZERO {
        return Err(BlackLittermanError::parameter(
            "tau",
            format!("Must be positive, got {}", tau),
        ));
    }

    let k = pick_matrix.len();
    if view_returns.len() != k {
        return Err(BlackLittermanError::dimension("view returns", k, view_returns.len()));
    }
    for row in pick_matrix {
        if row.len() != n {
            return Err(BlackLittermanError::dimension("pick matrix row", n, row.len()));
        }
    }
    if ensure_square(omega, "view uncertainty")? != k {
        return Err(BlackLittermanError::dimension("view uncertainty", k, omega.len()));
    }

    if k == 0 {
        return Ok(Posterior {
            expected_returns: pi.to_vec(),
            covariance: sigma.to_vec(),
        });
    }

    let tau_sigma = mat_scale(sigma, tau);
    let tau_sigma_lu = LuDecomposition::new(&tau_sigma, "tau * covariance")?;
    let tau_sigma_inv = tau_sigma_lu.inverse()?;
    let omega_inv = invert_view_uncertainty(omega)?;

    // P' * Omega^-1  (n x k)
    let pt_omega_inv = mat_mul(&transpose(pick_matrix), &omega_inv);

    // (tau Sigma)^-1 + P' Omega^-1 P  (n x n)
    let precision = mat_add(&tau_sigma_inv, &mat_mul(&pt_omega_inv, pick_matrix));

    // (tau Sigma)^-1 Pi + P' Omega^-1 Q  (n)
    let rhs = vec_add(
        &tau_sigma_lu.solve(pi)?,
        &mat_vec(&pt_omega_inv, view_returns),
    );

    let precision_lu = LuDecomposition::new(&precision, "posterior precision")?;
    let expected_returns = precision_lu.solve(&rhs)?;
    let m = precision_lu.inverse()?;

    let mut covariance = mat_add(sigma, &m);
    symmetrize(&mut covariance);

    debug!(assets = n, views = k, "blended prior with views");

    Ok(Posterior {
        expected_returns,
        covariance,
    })
}

/// Omega^-1. A diagonal Omega (the calibrated case) is inverted entry by
/// entry; anything else goes through LU.
fn invert_view_uncertainty(omega: &[Vec<Decimal>]) -> BlackLittermanResult<Matrix> {
    let k = omega.len();
    let is_diagonal = omega
        .iter()
        .enumerate()
        .all(|(i, row)| row.iter().enumerate().all(|(j, v)| i == j || v.is_zero()));
    if !is_diagonal {
        return LuDecomposition::new(omega, "view uncertainty")?.inverse();
    }

    let mut inv = vec![vec![Decimal::ZERO; k]; k];
    for i in 0..k {
        let var = omega[i][i];
        if var.is_zero() {
            return Err(BlackLittermanError::SingularMatrix {
                context: format!("view uncertainty (zero variance for view #{})", i),
            });
        }
        if var < Decimal::ZERO {
            return Err(BlackLittermanError::parameter(
                "view uncertainty",
                format!("Negative variance {} for view #{}", var, i),
            ));
        }
        inv[i][i] = Decimal::ONE / var;
    }
    Ok(inv)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equilibrium::implied_returns;
    use rust_decimal_macros::dec;

    /// Equity (15% vol), Bonds (10% vol), Commodities (20% vol).
    fn three_asset_cov() -> Matrix {
        let v0 = dec!(0.15);
        let v1 = dec!(0.10);
        let v2 = dec!(0.20);
        let c01 = dec!(0.3) * v0 * v1;
        let c02 = dec!(0.5) * v0 * v2;
        let c12 = dec!(0.1) * v1 * v2;
        vec![
            vec![v0 * v0, c01, c02],
            vec![c01, v1 * v1, c12],
            vec![c02, c12, v2 * v2],
        ]
    }

    fn prior() -> (Vector, Matrix) {
        let sigma = three_asset_cov();
        let pi = implied_returns(&sigma, &[dec!(0.5), dec!(0.3), dec!(0.2)], dec!(2.5)).unwrap();
        (pi, sigma)
    }

    #[test]
    fn test_no_views_returns_prior_exactly() {
        let (pi, sigma) = prior();
        let post = blend(&pi, &sigma, dec!(0.05), &[], &[], &[]).unwrap();
        assert_eq!(post.expected_returns, pi);
        assert_eq!(post.covariance, sigma);
    }

    #[test]
    fn test_no_views_skips_factorisation() {
        // A singular Sigma would fail any inversion; the empty path never tries.
        let sigma = vec![vec![Decimal::ZERO; 2]; 2];
        let pi = vec![Decimal::ZERO; 2];
        assert!(blend(&pi, &sigma, dec!(0.05), &[], &[], &[]).is_ok());
    }

    #[test]
    fn test_single_view_matches_textbook_form() {
        // E[R] = Pi + tau Sigma p' (p tau Sigma p' + omega)^-1 (q - p Pi)
        let (pi, sigma) = prior();
        let tau = dec!(0.05);
        let p = vec![vec![Decimal::ONE, Decimal::ZERO, Decimal::ZERO]];
        let q = vec![dec!(0.12)];
        let omega = vec![vec![dec!(0.001)]];

        let post = blend(&pi, &sigma, tau, &p, &q, &omega).unwrap();

        let s = tau * sigma[0][0] + omega[0][0];
        let gap = q[0] - pi[0];
        for i in 0..3 {
            let expected = pi[i] + tau * sigma[i][0] * gap / s;
            assert!(
                (post.expected_returns[i] - expected).abs() < dec!(0.0000000001),
                "E[R][{}] = {}, expected {}",
                i,
                post.expected_returns[i],
                expected
            );
        }
    }

    #[test]
    fn test_posterior_between_prior_and_view() {
        let (pi, sigma) = prior();
        let p = vec![vec![Decimal::ONE, Decimal::ZERO, Decimal::ZERO]];
        let q = vec![dec!(0.20)];
        let omega = vec![vec![dec!(0.002)]];
        let post = blend(&pi, &sigma, dec!(0.05), &p, &q, &omega).unwrap();
        assert!(post.expected_returns[0] > pi[0]);
        assert!(post.expected_returns[0] < dec!(0.20));
    }

    #[test]
    fn test_posterior_covariance_exceeds_prior() {
        let (pi, sigma) = prior();
        let p = vec![vec![Decimal::ONE, -Decimal::ONE, Decimal::ZERO]];
        let q = vec![dec!(0.03)];
        let omega = vec![vec![dec!(0.001)]];
        let post = blend(&pi, &sigma, dec!(0.05), &p, &q, &omega).unwrap();
        assert_eq!(post.covariance.len(), 3);
        for i in 0..3 {
            assert!(post.covariance[i][i] > sigma[i][i]);
            for j in 0..3 {
                assert_eq!(post.covariance[i][j], post.covariance[j][i]);
            }
        }
    }

    #[test]
    fn test_zero_omega_is_singular() {
        let (pi, sigma) = prior();
        let p = vec![vec![Decimal::ONE, Decimal::ZERO, Decimal::ZERO]];
        let q = vec![dec!(0.10)];
        let omega = vec![vec![Decimal::ZERO]];
        assert!(matches!(
            blend(&pi, &sigma, dec!(0.05), &p, &q, &omega),
            Err(BlackLittermanError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn test_zero_variance_asset_is_singular() {
        let sigma = vec![
            vec![dec!(0.04), Decimal::ZERO],
            vec![Decimal::ZERO, Decimal::ZERO],
        ];
        let pi = vec![dec!(0.05), Decimal::ZERO];
        let p = vec![vec![Decimal::ONE, Decimal::ZERO]];
        let omega = vec![vec![dec!(0.001)]];
        assert!(matches!(
            blend(&pi, &sigma, dec!(0.05), &p, &[dec!(0.06)], &omega),
            Err(BlackLittermanError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn test_shape_checks() {
        let (pi, sigma) = prior();
        let p = vec![vec![Decimal::ONE, Decimal::ZERO]];
        let omega = vec![vec![dec!(0.001)]];
        assert!(matches!(
            blend(&pi, &sigma, dec!(0.05), &p, &[dec!(0.1)], &omega),
            Err(BlackLittermanError::DimensionMismatch { .. })
        ));
        let p = vec![vec![Decimal::ONE, Decimal::ZERO, Decimal::ZERO]];
        assert!(matches!(
            blend(&pi, &sigma, dec!(0.05), &p, &[], &omega),
            Err(BlackLittermanError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_non_positive_tau() {
        let (pi, sigma) = prior();
        assert!(matches!(
            blend(&pi, &sigma, Decimal::ZERO, &[], &[], &[]),
            Err(BlackLittermanError::InvalidParameter { .. })
        ));
    }
}
