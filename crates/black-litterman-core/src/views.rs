use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::BlackLittermanError;
use crate::types::{Matrix, Rate, Vector};
use crate::universe::AssetUniverse;
use crate::BlackLittermanResult;

/// Maximum number of simultaneous views.
pub const MAX_VIEWS: usize = 4;

/// Confidence is stated in percent; 100 means full confidence.
pub const FULL_CONFIDENCE: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An investor view in the Black-Litterman framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum View {
    /// "Asset A will return X%."
    Absolute {
        asset: String,
        expected_return: Rate,
        /// Confidence in percent, in (0, 100].
        confidence: Decimal,
    },
    /// "Asset A will outperform Asset B by X%" (negative X: underperform).
    Relative {
        outperformer: String,
        underperformer: String,
        outperformance: Rate,
        /// Confidence in percent, in (0, 100].
        confidence: Decimal,
    },
}

/// A view resolved against the universe ordering: the information carried by
/// one row of P and the matching entry of Q.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodedView {
    Absolute {
        asset_index: usize,
        expected_return: Rate,
    },
    Relative {
        outperformer_index: usize,
        underperformer_index: usize,
        outperformance: Rate,
    },
}

/// Encoded views: pick matrix P (k x n), view returns Q and confidences,
/// rows in the order the views were supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSet {
    pick_matrix: Matrix,
    view_returns: Vector,
    confidences: Vector,
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

impl View {
    pub fn confidence(&self) -> Decimal {
        match self {
            View::Absolute { confidence, .. } | View::Relative { confidence, .. } => *confidence,
        }
    }

    /// Q entry for this view.
    pub fn view_return(&self) -> Rate {
        match self {
            View::Absolute {
                expected_return, ..
            } => *expected_return,
            View::Relative { outperformance, .. } => *outperformance,
        }
    }

    /// Label shown in view lists, e.g. "Bonds outperforms Equity by 2.00%".
    pub fn description(&self) -> String {
        let pct = dec!(100);
        match self {
            View::Absolute {
                asset,
                expected_return,
                ..
            } => format!("{} returns {:.2}%", asset, *expected_return * pct),
            View::Relative {
                outperformer,
                underperformer,
                outperformance,
                ..
            } => {
                if *outperformance < Decimal::ZERO {
                    format!(
                        "{} underperforms {} by {:.2}%",
                        outperformer,
                        underperformer,
                        outperformance.abs() * pct
                    )
                } else {
                    format!(
                        "{} outperforms {} by {:.2}%",
                        outperformer,
                        underperformer,
                        *outperformance * pct
                    )
                }
            }
        }
    }

    /// Validate against `universe` and resolve asset names to indices.
    /// `index` is the view's position, used to name it in errors.
    pub fn encode(
        &self,
        index: usize,
        universe: &AssetUniverse,
    ) -> BlackLittermanResult<EncodedView> {
        let confidence = self.confidence();
        if confidence <= Decimal::ZERO || confidence > FULL_CONFIDENCE {
            return Err(BlackLittermanError::InvalidView {
                index,
                reason: format!("Confidence must be in (0, 100], got {}", confidence),
            });
        }

        let resolve = |asset: &str| {
            universe
                .index_of(asset)
                .ok_or_else(|| BlackLittermanError::InvalidView {
                    index,
                    reason: format!("Unknown asset '{}'", asset),
                })
        };

        match self {
            View::Absolute {
                asset,
                expected_return,
                ..
            } => Ok(EncodedView::Absolute {
                asset_index: resolve(asset)?,
                expected_return: *expected_return,
            }),
            View::Relative {
                outperformer,
                underperformer,
                outperformance,
                ..
            } => {
                if outperformer == underperformer {
                    return Err(BlackLittermanError::InvalidView {
                        index,
                        reason: format!(
                            "Relative view must reference two different assets, got '{}' twice",
                            outperformer
                        ),
                    });
                }
                Ok(EncodedView::Relative {
                    outperformer_index: resolve(outperformer)?,
                    underperformer_index: resolve(underperformer)?,
                    outperformance: *outperformance,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ViewSet
// ---------------------------------------------------------------------------

/// Validate `views` and encode them as P / Q.
pub fn build_view_set(views: &[View], universe: &AssetUniverse) -> BlackLittermanResult<ViewSet> {
    if views.len() > MAX_VIEWS {
        return Err(BlackLittermanError::TooManyViews {
            count: views.len(),
            max: MAX_VIEWS,
        });
    }

    let n = universe.len();
    let k = views.len();
    let mut pick_matrix = vec![vec![Decimal::ZERO; n]; k];
    let mut view_returns = Vec::with_capacity(k);
    let mut confidences = Vec::with_capacity(k);

    for (row, view) in views.iter().enumerate() {
        match view.encode(row, universe)? {
            EncodedView::Absolute {
                asset_index,
                expected_return,
            } => {
                pick_matrix[row][asset_index] = Decimal::ONE;
                view_returns.push(expected_return);
            }
            EncodedView::Relative {
                outperformer_index,
                underperformer_index,
                outperformance,
            } => {
                pick_matrix[row][outperformer_index] = Decimal::ONE;
                pick_matrix[row][underperformer_index] = -Decimal::ONE;
                view_returns.push(outperformance);
            }
        }
        confidences.push(view.confidence());
    }

    Ok(ViewSet {
        pick_matrix,
        view_returns,
        confidences,
    })
}

impl ViewSet {
    /// No views: the market-only path.
    pub fn empty() -> Self {
        Self {
            pick_matrix: Vec::new(),
            view_returns: Vec::new(),
            confidences: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.view_returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view_returns.is_empty()
    }

    /// P (k x n).
    pub fn pick_matrix(&self) -> &Matrix {
        &self.pick_matrix
    }

    /// Q (length k).
    pub fn view_returns(&self) -> &[Decimal] {
        &self.view_returns
    }

    pub fn confidences(&self) -> &[Decimal] {
        &self.confidences
    }

    pub fn pick_row(&self, k: usize) -> Option<&[Decimal]> {
        self.pick_matrix.get(k).map(Vec::as_slice)
    }

    /// Recover (asset, direction, return) per row from P and Q.
    pub fn decode(&self) -> BlackLittermanResult<Vec<EncodedView>> {
        self.pick_matrix
            .iter()
            .zip(self.view_returns.iter())
            .enumerate()
            .map(|(index, (row, q))| {
                let legs: Vec<(usize, Decimal)> = row
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| !v.is_zero())
                    .map(|(i, v)| (i, *v))
                    .collect();
                match legs.as_slice() {
                    [(asset_index, w)] if *w == Decimal::ONE => Ok(EncodedView::Absolute {
                        asset_index: *asset_index,
                        expected_return: *q,
                    }),
                    [(a, wa), (b, wb)] if *wa == -*wb && wa.abs() == Decimal::ONE => {
                        let (long, short) = if *wa > Decimal::ZERO { (*a, *b) } else { (*b, *a) };
                        Ok(EncodedView::Relative {
                            outperformer_index: long,
                            underperformer_index: short,
                            outperformance: *q,
                        })
                    }
                    _ => Err(BlackLittermanError::InvalidView {
                        index,
                        reason: "Pick row is neither a one-hot nor a +1/-1 pair".into(),
                    }),
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> AssetUniverse {
        AssetUniverse::new(
            vec!["Equity".into(), "Bonds".into(), "Commodities".into()],
            vec![dec!(0.5), dec!(0.3), dec!(0.2)],
        )
        .unwrap()
    }

    fn absolute(asset: &str, r: Decimal, c: Decimal) -> View {
        View::Absolute {
            asset: asset.into(),
            expected_return: r,
            confidence: c,
        }
    }

    fn relative(long: &str, short: &str, r: Decimal, c: Decimal) -> View {
        View::Relative {
            outperformer: long.into(),
            underperformer: short.into(),
            outperformance: r,
            confidence: c,
        }
    }

    #[test]
    fn test_pick_matrix_absolute() {
        let vs = build_view_set(&[absolute("Bonds", dec!(0.07), dec!(50))], &universe()).unwrap();
        assert_eq!(
            vs.pick_matrix()[0],
            vec![Decimal::ZERO, Decimal::ONE, Decimal::ZERO]
        );
        assert_eq!(vs.view_returns(), &[dec!(0.07)]);
        assert_eq!(vs.confidences(), &[dec!(50)]);
    }

    #[test]
    fn test_pick_matrix_relative() {
        let vs = build_view_set(
            &[relative("Equity", "Commodities", dec!(0.03), dec!(60))],
            &universe(),
        )
        .unwrap();
        assert_eq!(
            vs.pick_matrix()[0],
            vec![Decimal::ONE, Decimal::ZERO, -Decimal::ONE]
        );
        assert_eq!(vs.view_returns(), &[dec!(0.03)]);
    }

    #[test]
    fn test_rows_follow_input_order() {
        let views = vec![
            relative("Commodities", "Bonds", dec!(0.01), dec!(20)),
            absolute("Equity", dec!(0.08), dec!(75)),
        ];
        let vs = build_view_set(&views, &universe()).unwrap();
        assert_eq!(vs.len(), 2);
        assert_eq!(vs.view_returns(), &[dec!(0.01), dec!(0.08)]);
        assert_eq!(vs.pick_row(1).unwrap()[0], Decimal::ONE);
    }

    #[test]
    fn test_fifth_view_rejected() {
        let views: Vec<View> = (0..5)
            .map(|_| absolute("Equity", dec!(0.05), dec!(50)))
            .collect();
        assert!(matches!(
            build_view_set(&views, &universe()),
            Err(BlackLittermanError::TooManyViews { count: 5, max: 4 })
        ));
    }

    #[test]
    fn test_four_views_accepted() {
        let views: Vec<View> = (0..4)
            .map(|_| absolute("Equity", dec!(0.05), dec!(50)))
            .collect();
        assert_eq!(build_view_set(&views, &universe()).unwrap().len(), 4);
    }

    #[test]
    fn test_relative_same_asset_rejected() {
        let views = vec![
            absolute("Equity", dec!(0.05), dec!(50)),
            relative("Bonds", "Bonds", dec!(0.02), dec!(50)),
        ];
        match build_view_set(&views, &universe()) {
            Err(BlackLittermanError::InvalidView { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidView, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_asset_rejected() {
        let views = vec![absolute("Gold", dec!(0.05), dec!(50))];
        match build_view_set(&views, &universe()) {
            Err(BlackLittermanError::InvalidView { index, reason }) => {
                assert_eq!(index, 0);
                assert!(reason.contains("Gold"));
            }
            other => panic!("expected InvalidView, got {:?}", other),
        }
    }

    #[test]
    fn test_confidence_bounds() {
        for bad in [dec!(0), dec!(-5), dec!(100.01)] {
            let views = vec![absolute("Equity", dec!(0.05), bad)];
            assert!(matches!(
                build_view_set(&views, &universe()),
                Err(BlackLittermanError::InvalidView { .. })
            ));
        }
        let views = vec![absolute("Equity", dec!(0.05), dec!(100))];
        assert!(build_view_set(&views, &universe()).is_ok());
    }

    #[test]
    fn test_empty_views() {
        let vs = build_view_set(&[], &universe()).unwrap();
        assert!(vs.is_empty());
        assert_eq!(vs, ViewSet::empty());
    }

    #[test]
    fn test_decode_negative_leg_first() {
        // Underperformer sits before the outperformer in universe order.
        let vs = build_view_set(
            &[relative("Commodities", "Equity", dec!(-0.02), dec!(40))],
            &universe(),
        )
        .unwrap();
        assert_eq!(
            vs.decode().unwrap(),
            vec![EncodedView::Relative {
                outperformer_index: 2,
                underperformer_index: 0,
                outperformance: dec!(-0.02),
            }]
        );
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(
            absolute("Equity", dec!(0.08), dec!(75)).description(),
            "Equity returns 8.00%"
        );
        assert_eq!(
            relative("Bonds", "Equity", dec!(0.02), dec!(50)).description(),
            "Bonds outperforms Equity by 2.00%"
        );
        assert_eq!(
            relative("Bonds", "Equity", dec!(-0.015), dec!(50)).description(),
            "Bonds underperforms Equity by 1.50%"
        );
    }

    #[test]
    fn test_view_serde_tagged() {
        let json = r#"{"kind": "relative", "outperformer": "Bonds", "underperformer": "Equity",
                       "outperformance": "0.02", "confidence": "50"}"#;
        let v: View = serde_json::from_str(json).unwrap();
        assert_eq!(v, relative("Bonds", "Equity", dec!(0.02), dec!(50)));
    }
}
