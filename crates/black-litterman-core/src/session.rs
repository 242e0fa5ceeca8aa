use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blend::{blend, Posterior};
use crate::calibration::{
    calibrate_view_uncertainty, CalibrationContext, IdzorekCalibrator, ViewCalibrator,
};
use crate::covariance::{annualise, estimate_covariance, ReturnHistory};
use crate::equilibrium::implied_returns;
use crate::error::BlackLittermanError;
use crate::settings::CalculationSettings;
use crate::types::{Matrix, Vector};
use crate::universe::AssetUniverse;
use crate::views::{build_view_set, View, ViewSet};
use crate::weights::solve_weights;
use crate::BlackLittermanResult;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Return distribution and the weights optimal under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub expected_returns: Vector,
    pub covariance: Matrix,
    pub weights: Vector,
}

/// Snapshot of every derived quantity for one calculation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    /// End of the estimation window; `None` when the covariance was supplied.
    pub calculation_date: Option<NaiveDate>,
    /// Annualised sample covariance Sigma.
    pub covariance: Matrix,
    /// Pi
    pub implied_returns: Vector,
    pub view_set: ViewSet,
    /// Diagonal Omega, k x k.
    pub view_uncertainty: Matrix,
    /// Views-empty path: E\[R\] = Pi, Sigma_BL = Sigma.
    pub market: Allocation,
    pub blended: Allocation,
}

/// Solve the weights for a posterior and package them.
pub fn allocate(posterior: Posterior, risk_aversion: Decimal) -> BlackLittermanResult<Allocation> {
    let weights = solve_weights(&posterior.expected_returns, &posterior.covariance, risk_aversion)?;
    Ok(Allocation {
        expected_returns: posterior.expected_returns,
        covariance: posterior.covariance,
        weights,
    })
}

/// Run the chain from an estimated covariance matrix to both allocations.
pub fn run_chain<C: ViewCalibrator + ?Sized>(
    universe: &AssetUniverse,
    calculation_date: Option<NaiveDate>,
    covariance: Matrix,
    views: &[View],
    settings: &CalculationSettings,
    calibrator: &C,
) -> BlackLittermanResult<SessionResult> {
    let delta = settings.risk_aversion;
    let tau = settings.tau;
    let w_mkt = universe.market_weights();

    let view_set = build_view_set(views, universe)?;
    let pi = implied_returns(&covariance, w_mkt, delta)?;
    debug!(assets = universe.len(), views = view_set.len(), "implied returns computed");

    let ctx = CalibrationContext {
        implied_returns: &pi,
        covariance: &covariance,
        market_weights: w_mkt,
        tau,
        risk_aversion: delta,
    };
    let omega = calibrate_view_uncertainty(calibrator, &ctx, &view_set)?;

    let market = allocate(blend(&pi, &covariance, tau, &[], &[], &[])?, delta)?;
    let blended = allocate(
        blend(
            &pi,
            &covariance,
            tau,
            view_set.pick_matrix(),
            view_set.view_returns(),
            &omega,
        )?,
        delta,
    )?;

    Ok(SessionResult {
        calculation_date,
        covariance,
        implied_returns: pi,
        view_set,
        view_uncertainty: omega,
        market,
        blended,
    })
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Holds the inputs of one allocation and the single result derived from
/// them. Every input change recomputes the whole chain; a failed
/// recomputation leaves no result behind.
///
/// Not synchronised: callers serialise recomputation themselves.
#[derive(Debug, Clone)]
pub struct CalculationSession<C: ViewCalibrator = IdzorekCalibrator> {
    universe: AssetUniverse,
    history: ReturnHistory,
    settings: CalculationSettings,
    calculation_date: NaiveDate,
    views: Vec<View>,
    calibrator: C,
    current: Option<SessionResult>,
}

impl CalculationSession<IdzorekCalibrator> {
    /// Session with no views, calibrating with the settings' search bounds.
    pub fn new(
        universe: AssetUniverse,
        history: ReturnHistory,
        settings: CalculationSettings,
        calculation_date: NaiveDate,
    ) -> BlackLittermanResult<Self> {
        let calibrator = IdzorekCalibrator::new(&settings.calibration);
        Self::with_calibrator(universe, history, settings, calculation_date, calibrator)
    }
}

impl<C: ViewCalibrator> CalculationSession<C> {
    pub fn with_calibrator(
        universe: AssetUniverse,
        history: ReturnHistory,
        settings: CalculationSettings,
        calculation_date: NaiveDate,
        calibrator: C,
    ) -> BlackLittermanResult<Self> {
        settings.validate()?;
        if !history.is_empty() && history.width() != universe.len() {
            return Err(BlackLittermanError::dimension(
                "return history width",
                universe.len(),
                history.width(),
            ));
        }
        let mut session = Self {
            universe,
            history,
            settings,
            calculation_date,
            views: Vec::new(),
            calibrator,
            current: None,
        };
        session.recompute()?;
        Ok(session)
    }

    pub fn universe(&self) -> &AssetUniverse {
        &self.universe
    }

    pub fn settings(&self) -> &CalculationSettings {
        &self.settings
    }

    pub fn calculation_date(&self) -> NaiveDate {
        self.calculation_date
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    /// The result for the current inputs, `None` after a failed recomputation.
    pub fn current(&self) -> Option<&SessionResult> {
        self.current.as_ref()
    }

    pub fn set_calculation_date(
        &mut self,
        date: NaiveDate,
    ) -> BlackLittermanResult<&SessionResult> {
        self.calculation_date = date;
        self.recompute()
    }

    pub fn set_covariance_window(
        &mut self,
        periods: usize,
    ) -> BlackLittermanResult<&SessionResult> {
        self.update_settings(|s| s.covariance_window = periods)
    }

    pub fn set_risk_aversion(&mut self, delta: Decimal) -> BlackLittermanResult<&SessionResult> {
        self.update_settings(|s| s.risk_aversion = delta)
    }

    pub fn set_tau(&mut self, tau: Decimal) -> BlackLittermanResult<&SessionResult> {
        self.update_settings(|s| s.tau = tau)
    }

    /// Replace the view list. Views that fail validation are rejected and the
    /// previous views and result are kept.
    pub fn set_views(&mut self, views: Vec<View>) -> BlackLittermanResult<&SessionResult> {
        build_view_set(&views, &self.universe)?;
        self.views = views;
        self.recompute()
    }

    /// Discard the current result and derive a new one from the inputs.
    pub fn recompute(&mut self) -> BlackLittermanResult<&SessionResult> {
        self.current = None;
        match self.compute() {
            Ok(result) => Ok(&*self.current.insert(result)),
            Err(e) => {
                warn!(date = %self.calculation_date, error = %e, "recomputation failed");
                Err(e)
            }
        }
    }

    fn update_settings(
        &mut self,
        change: impl FnOnce(&mut CalculationSettings),
    ) -> BlackLittermanResult<&SessionResult> {
        let mut settings = self.settings.clone();
        change(&mut settings);
        settings.validate()?;
        self.settings = settings;
        self.recompute()
    }

    fn compute(&self) -> BlackLittermanResult<SessionResult> {
        let window = self
            .history
            .window_ending(self.calculation_date, self.settings.covariance_window)?;
        let covariance = annualise(&estimate_covariance(&window)?, self.settings.periods_per_year);
        debug!(
            date = %self.calculation_date,
            periods = window.len(),
            "covariance estimated"
        );

        run_chain(
            &self.universe,
            Some(self.calculation_date),
            covariance,
            &self.views,
            &self.settings,
            &self.calibrator,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::AnalyticalCalibrator;
    use crate::covariance::ReturnObservation;
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn universe() -> AssetUniverse {
        AssetUniverse::new(
            vec!["Equity".into(), "Bonds".into()],
            vec![dec!(0.6), dec!(0.4)],
        )
        .unwrap()
    }

    fn history() -> ReturnHistory {
        let rows = [
            [dec!(0.010), dec!(0.002)],
            [dec!(-0.005), dec!(0.001)],
            [dec!(0.012), dec!(-0.001)],
            [dec!(-0.008), dec!(0.003)],
            [dec!(0.004), dec!(0.000)],
            [dec!(0.007), dec!(-0.002)],
            [dec!(-0.003), dec!(0.002)],
            [dec!(0.009), dec!(0.001)],
        ];
        ReturnHistory::new(
            rows.iter()
                .enumerate()
                .map(|(i, r)| ReturnObservation {
                    date: date(i as u32 + 1),
                    returns: r.to_vec(),
                })
                .collect(),
        )
        .unwrap()
    }

    fn settings() -> CalculationSettings {
        CalculationSettings {
            covariance_window: 6,
            ..CalculationSettings::default()
        }
    }

    fn equity_view(confidence: Decimal) -> View {
        View::Absolute {
            asset: "Equity".into(),
            expected_return: dec!(0.5),
            confidence,
        }
    }

    #[test]
    fn test_new_session_has_market_result() {
        let session = CalculationSession::new(universe(), history(), settings(), date(8)).unwrap();
        let result = session.current().unwrap();
        assert_eq!(result.calculation_date, Some(date(8)));
        assert!(result.view_set.is_empty());
        assert!(result.view_uncertainty.is_empty());
        assert_eq!(result.blended, result.market);
        assert_eq!(result.market.expected_returns, result.implied_returns);
        for (w, m) in result.market.weights.iter().zip([dec!(0.6), dec!(0.4)]) {
            assert!((*w - m).abs() < dec!(0.0000000001));
        }
    }

    #[test]
    fn test_views_move_blended_allocation_only() {
        let mut session =
            CalculationSession::new(universe(), history(), settings(), date(8)).unwrap();
        let market_before = session.current().unwrap().market.clone();
        let result = session.set_views(vec![equity_view(dec!(60))]).unwrap();
        assert_eq!(result.market, market_before);
        assert_eq!(result.view_uncertainty.len(), 1);
        assert!(result.blended.weights[0] > result.market.weights[0]);
    }

    #[test]
    fn test_date_change_recomputes_window() {
        let mut session =
            CalculationSession::new(universe(), history(), settings(), date(8)).unwrap();
        let before = session.current().unwrap().covariance.clone();
        let after = session.set_calculation_date(date(7)).unwrap().covariance.clone();
        assert_ne!(before, after);
        assert_eq!(session.calculation_date(), date(7));
    }

    #[test]
    fn test_invalid_views_keep_previous_state() {
        let mut session =
            CalculationSession::new(universe(), history(), settings(), date(8)).unwrap();
        session.set_views(vec![equity_view(dec!(50))]).unwrap();
        let unknown = View::Absolute {
            asset: "Gold".into(),
            expected_return: dec!(0.05),
            confidence: dec!(50),
        };
        assert!(matches!(
            session.set_views(vec![unknown]),
            Err(BlackLittermanError::InvalidView { .. })
        ));
        assert_eq!(session.views().len(), 1);
        assert!(session.current().is_some());
    }

    #[test]
    fn test_invalid_parameter_rejected_before_recompute() {
        let mut session =
            CalculationSession::new(universe(), history(), settings(), date(8)).unwrap();
        assert!(matches!(
            session.set_tau(Decimal::ZERO),
            Err(BlackLittermanError::InvalidParameter { .. })
        ));
        assert_eq!(session.settings().tau, dec!(0.05));
        assert!(session.current().is_some());
    }

    #[test]
    fn test_failed_recompute_clears_result() {
        let mut session =
            CalculationSession::new(universe(), history(), settings(), date(8)).unwrap();
        // Only the first observation remains on or before day 1.
        assert!(matches!(
            session.set_calculation_date(date(1)),
            Err(BlackLittermanError::InsufficientData(_))
        ));
        assert!(session.current().is_none());
        assert!(session.set_calculation_date(date(8)).is_ok());
    }

    #[test]
    fn test_risk_aversion_scales_implied_returns() {
        let mut session =
            CalculationSession::new(universe(), history(), settings(), date(8)).unwrap();
        let pi = session.current().unwrap().implied_returns.clone();
        let doubled = session.set_risk_aversion(dec!(5)).unwrap().implied_returns.clone();
        for (a, b) in pi.iter().zip(doubled.iter()) {
            assert!((*a * dec!(2) - *b).abs() < dec!(0.0000000000001));
        }
    }

    #[test]
    fn test_custom_calibrator() {
        let mut session = CalculationSession::with_calibrator(
            universe(),
            history(),
            settings(),
            date(8),
            AnalyticalCalibrator,
        )
        .unwrap();
        let result = session.set_views(vec![equity_view(dec!(100))]).unwrap();
        let sigma = &result.covariance;
        assert_eq!(result.view_uncertainty[0][0], dec!(0.05) * sigma[0][0]);
    }

    #[test]
    fn test_supplied_covariance_carries_no_date() {
        let covariance = vec![
            vec![dec!(0.04), dec!(0.01)],
            vec![dec!(0.01), dec!(0.09)],
        ];
        let result = run_chain(
            &universe(),
            None,
            covariance,
            &[],
            &settings(),
            &IdzorekCalibrator::default(),
        )
        .unwrap();
        assert_eq!(result.calculation_date, None);
        assert_eq!(result.implied_returns, vec![dec!(0.07), dec!(0.105)]);
    }

    #[test]
    fn test_history_width_must_match_universe() {
        let three = AssetUniverse::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec![dec!(0.4), dec!(0.3), dec!(0.3)],
        )
        .unwrap();
        assert!(matches!(
            CalculationSession::new(three, history(), settings(), date(8)),
            Err(BlackLittermanError::DimensionMismatch { .. })
        ));
    }
}
