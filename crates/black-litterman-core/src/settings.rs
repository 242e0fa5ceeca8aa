use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::BlackLittermanError;
use crate::BlackLittermanResult;

/// Model parameters supplied by configuration.
///
/// Every field has a default, so a settings file only needs to name the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculationSettings {
    /// Uncertainty scaling of the equilibrium prior (tau), typically 0.025 - 0.05.
    pub tau: Decimal,
    /// Risk aversion coefficient (delta), typically around 2.5.
    pub risk_aversion: Decimal,
    /// Number of return periods in the rolling covariance window.
    pub covariance_window: usize,
    /// Periods per year used to annualise the sample covariance (252 for daily data).
    pub periods_per_year: u32,
    pub calibration: CalibrationSettings,
}

/// Stopping rule for the Idzorek confidence search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Relative tolerance on the matched weight tilt.
    pub tolerance: Decimal,
    pub max_iterations: u32,
}

impl Default for CalculationSettings {
    fn default() -> Self {
        Self {
            tau: dec!(0.05),
            risk_aversion: dec!(2.5),
            covariance_window: 252,
            periods_per_year: 252,
            calibration: CalibrationSettings::default(),
        }
    }
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            tolerance: dec!(0.0000000001),
            max_iterations: 200,
        }
    }
}

impl CalculationSettings {
    pub fn validate(&self) -> BlackLittermanResult<()> {
        if self.tau <= Decimal::ZERO {
            return Err(BlackLittermanError::parameter(
                "tau",
                format!("Must be positive, got {}", self.tau),
            ));
        }
        if self.risk_aversion <= Decimal::ZERO {
            return Err(BlackLittermanError::parameter(
                "risk_aversion",
                format!("Must be positive, got {}", self.risk_aversion),
            ));
        }
        if self.covariance_window == 0 {
            return Err(BlackLittermanError::parameter(
                "covariance_window",
                "Must be at least one period",
            ));
        }
        if self.periods_per_year == 0 {
            return Err(BlackLittermanError::parameter(
                "periods_per_year",
                "Must be at least one period",
            ));
        }
        self.calibration.validate()
    }
}

impl CalibrationSettings {
    pub fn validate(&self) -> BlackLittermanResult<()> {
        if self.tolerance <= Decimal::ZERO {
            return Err(BlackLittermanError::parameter(
                "calibration.tolerance",
                format!("Must be positive, got {}", self.tolerance),
            ));
        }
        if self.max_iterations == 0 {
            return Err(BlackLittermanError::parameter(
                "calibration.max_iterations",
                "Must allow at least one iteration",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = CalculationSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.tau, dec!(0.05));
        assert_eq!(settings.risk_aversion, dec!(2.5));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: CalculationSettings =
            serde_json::from_str(r#"{"tau": "0.025", "calibration": {"max_iterations": 50}}"#)
                .unwrap();
        assert_eq!(settings.tau, dec!(0.025));
        assert_eq!(settings.risk_aversion, dec!(2.5));
        assert_eq!(settings.calibration.max_iterations, 50);
        assert_eq!(settings.calibration.tolerance, dec!(0.0000000001));
    }

    #[test]
    fn test_non_positive_tau_rejected() {
        let settings = CalculationSettings {
            tau: Decimal::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(BlackLittermanError::InvalidParameter { ref field, .. }) if field == "tau"
        ));
    }

    #[test]
    fn test_zero_window_rejected() {
        let settings = CalculationSettings {
            covariance_window: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
