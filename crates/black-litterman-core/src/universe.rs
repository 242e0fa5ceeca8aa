use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::BlackLittermanError;
use crate::types::Vector;
use crate::BlackLittermanResult;

/// Market-cap weights must sum to one within this tolerance.
pub const WEIGHT_SUM_TOLERANCE: Decimal = dec!(0.0001);

/// Ordered set of assets with their market-capitalisation weights.
///
/// Every vector and matrix produced by the engine is indexed by the order of
/// `assets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UniverseSpec", into = "UniverseSpec")]
pub struct AssetUniverse {
    assets: Vec<String>,
    market_weights: Vector,
}

#[derive(Serialize, Deserialize)]
struct UniverseSpec {
    assets: Vec<String>,
    market_weights: Vector,
}

impl TryFrom<UniverseSpec> for AssetUniverse {
    type Error = BlackLittermanError;

    fn try_from(spec: UniverseSpec) -> Result<Self, Self::Error> {
        AssetUniverse::new(spec.assets, spec.market_weights)
    }
}

impl From<AssetUniverse> for UniverseSpec {
    fn from(universe: AssetUniverse) -> Self {
        UniverseSpec {
            assets: universe.assets,
            market_weights: universe.market_weights,
        }
    }
}

impl AssetUniverse {
    pub fn new(assets: Vec<String>, market_weights: Vector) -> BlackLittermanResult<Self> {
        if assets.is_empty() {
            return Err(BlackLittermanError::InsufficientData(
                "At least one asset required".into(),
            ));
        }
        if market_weights.len() != assets.len() {
            return Err(BlackLittermanError::dimension(
                "market_weights",
                assets.len(),
                market_weights.len(),
            ));
        }

        let mut seen = HashSet::new();
        for name in &assets {
            if name.trim().is_empty() {
                return Err(BlackLittermanError::parameter(
                    "assets",
                    "Asset identifiers must be non-empty",
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(BlackLittermanError::parameter(
                    "assets",
                    format!("Duplicate asset '{}'", name),
                ));
            }
        }

        for (name, w) in assets.iter().zip(market_weights.iter()) {
            if *w < Decimal::ZERO {
                return Err(BlackLittermanError::parameter(
                    "market_weights",
                    format!("Weight for '{}' is negative ({})", name, w),
                ));
            }
        }
        let total: Decimal = market_weights.iter().copied().sum();
        if (total - Decimal::ONE).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(BlackLittermanError::parameter(
                "market_weights",
                format!("Weights must sum to 1.0 (got {})", total),
            ));
        }

        Ok(Self {
            assets,
            market_weights,
        })
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn market_weights(&self) -> &[Decimal] {
        &self.market_weights
    }

    /// Position of `asset` in the universe ordering.
    pub fn index_of(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.assets.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_universe() {
        let u = AssetUniverse::new(names(&["A", "B"]), vec![dec!(0.6), dec!(0.4)]).unwrap();
        assert_eq!(u.len(), 2);
        assert_eq!(u.index_of("B"), Some(1));
        assert_eq!(u.index_of("Z"), None);
        assert_eq!(u.name(0), Some("A"));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let err = AssetUniverse::new(names(&["A", "B"]), vec![dec!(0.6), dec!(0.6)]).unwrap_err();
        assert!(matches!(err, BlackLittermanError::InvalidParameter { .. }));
    }

    #[test]
    fn test_negative_weight_rejected() {
        assert!(AssetUniverse::new(names(&["A", "B"]), vec![dec!(1.2), dec!(-0.2)]).is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let err = AssetUniverse::new(names(&["A", "B"]), vec![Decimal::ONE]).unwrap_err();
        assert!(matches!(
            err,
            BlackLittermanError::DimensionMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_asset_rejected() {
        assert!(AssetUniverse::new(names(&["A", "A"]), vec![dec!(0.5), dec!(0.5)]).is_err());
    }

    #[test]
    fn test_empty_universe_rejected() {
        assert!(matches!(
            AssetUniverse::new(vec![], vec![]),
            Err(BlackLittermanError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let bad = r#"{"assets": ["A", "B"], "market_weights": ["0.5", "0.2"]}"#;
        assert!(serde_json::from_str::<AssetUniverse>(bad).is_err());
        let good = r#"{"assets": ["A", "B"], "market_weights": ["0.5", "0.5"]}"#;
        let u: AssetUniverse = serde_json::from_str(good).unwrap();
        assert_eq!(u.market_weights(), &[dec!(0.5), dec!(0.5)]);
    }
}
