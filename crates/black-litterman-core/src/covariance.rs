use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BlackLittermanError;
use crate::matrix::{mat_scale, symmetrize};
use crate::types::{Matrix, Vector};
use crate::BlackLittermanResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One period of asset returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnObservation {
    pub date: NaiveDate,
    /// Period returns, one per asset in universe order.
    pub returns: Vector,
}

/// Dated T x n return matrix, rows strictly ascending by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ReturnObservation>", into = "Vec<ReturnObservation>")]
pub struct ReturnHistory {
    observations: Vec<ReturnObservation>,
}

impl TryFrom<Vec<ReturnObservation>> for ReturnHistory {
    type Error = BlackLittermanError;

    fn try_from(observations: Vec<ReturnObservation>) -> Result<Self, Self::Error> {
        ReturnHistory::new(observations)
    }
}

impl From<ReturnHistory> for Vec<ReturnObservation> {
    fn from(history: ReturnHistory) -> Self {
        history.observations
    }
}

impl ReturnHistory {
    pub fn new(observations: Vec<ReturnObservation>) -> BlackLittermanResult<Self> {
        if let Some(first) = observations.first() {
            let width = first.returns.len();
            for obs in &observations {
                if obs.returns.len() != width {
                    return Err(BlackLittermanError::dimension(
                        format!("returns on {}", obs.date),
                        width,
                        obs.returns.len(),
                    ));
                }
            }
        }
        for pair in observations.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(BlackLittermanError::parameter(
                    "history",
                    format!(
                        "Dates must be strictly ascending ({} follows {})",
                        pair[1].date, pair[0].date
                    ),
                ));
            }
        }
        Ok(Self { observations })
    }

    /// Build simple returns p_t / p_{t-1} - 1 from a dated price table.
    ///
    /// The first price row only serves as the base for the second, so the
    /// history has one row fewer than `prices`.
    pub fn from_prices(dates: &[NaiveDate], prices: &[Vector]) -> BlackLittermanResult<Self> {
        if dates.len() != prices.len() {
            return Err(BlackLittermanError::dimension(
                "price dates",
                prices.len(),
                dates.len(),
            ));
        }
        for (date, row) in dates.iter().zip(prices.iter()) {
            if let Some(p) = row.iter().find(|p| **p <= Decimal::ZERO) {
                return Err(BlackLittermanError::parameter(
                    "prices",
                    format!("Non-positive price {} on {}", p, date),
                ));
            }
        }

        let mut observations = Vec::with_capacity(prices.len().saturating_sub(1));
        for t in 1..prices.len() {
            let prev = &prices[t - 1];
            let curr = &prices[t];
            if curr.len() != prev.len() {
                return Err(BlackLittermanError::dimension(
                    format!("prices on {}", dates[t]),
                    prev.len(),
                    curr.len(),
                ));
            }
            let returns = curr
                .iter()
                .zip(prev.iter())
                .map(|(c, p)| *c / *p - Decimal::ONE)
                .collect();
            observations.push(ReturnObservation {
                date: dates[t],
                returns,
            });
        }
        Self::new(observations)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Number of assets per row (zero for an empty history).
    pub fn width(&self) -> usize {
        self.observations.first().map_or(0, |o| o.returns.len())
    }

    pub fn observations(&self) -> &[ReturnObservation] {
        &self.observations
    }

    /// The last `length` rows dated on or before `end`.
    ///
    /// A shorter window is returned when the history does not reach back far
    /// enough; the covariance estimate then decides whether it is usable.
    pub fn window_ending(&self, end: NaiveDate, length: usize) -> BlackLittermanResult<Matrix> {
        let available = self.observations.partition_point(|o| o.date <= end);
        if available == 0 {
            return Err(BlackLittermanError::InsufficientData(format!(
                "No return observations on or before {}",
                end
            )));
        }
        let start = available.saturating_sub(length);
        if available - start < length {
            warn!(
                requested = length,
                available = available - start,
                end = %end,
                "return window shorter than requested"
            );
        }
        Ok(self.observations[start..available]
            .iter()
            .map(|o| o.returns.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

/// Sample covariance (denominator T - 1) of a T x n return window.
///
/// The result is symmetrised explicitly so that downstream factorisations see
/// an exactly symmetric matrix.
#[allow(clippy::needless_range_loop)]
pub fn estimate_covariance(returns: &[Vec<Decimal>]) -> BlackLittermanResult<Matrix> {
    let t = returns.len();
    if t < 2 {
        return Err(BlackLittermanError::InsufficientData(format!(
            "Covariance needs at least 2 return periods, got {}",
            t
        )));
    }
    let n = returns[0].len();
    if n == 0 {
        return Err(BlackLittermanError::InsufficientData(
            "Return window has no assets".into(),
        ));
    }
    for row in returns {
        if row.len() != n {
            return Err(BlackLittermanError::dimension("return window", n, row.len()));
        }
    }
    if t <= n {
        debug!(periods = t, assets = n, "return window not longer than asset count");
    }

    let t_dec = Decimal::from(t as u64);
    let means: Vector = (0..n)
        .map(|j| returns.iter().map(|row| row[j]).sum::<Decimal>() / t_dec)
        .collect();

    let mut cov = vec![vec![Decimal::ZERO; n]; n];
    for row in returns {
        let dev: Vector = row.iter().zip(means.iter()).map(|(r, m)| *r - *m).collect();
        for i in 0..n {
            for j in i..n {
                cov[i][j] += dev[i] * dev[j];
            }
        }
    }

    let denom = Decimal::from((t - 1) as u64);
    for i in 0..n {
        for j in i..n {
            cov[i][j] /= denom;
            cov[j][i] = cov[i][j];
        }
    }
    symmetrize(&mut cov);
    Ok(cov)
}

/// Scale a per-period covariance to annual units.
pub fn annualise(cov: &[Vec<Decimal>], periods_per_year: u32) -> Matrix {
    mat_scale(cov, Decimal::from(periods_per_year))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
