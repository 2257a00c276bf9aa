//! Consumer-choice parameters attached to supply-side contributing records.

use crate::domain::year::YearSeries;
use serde::{Deserialize, Serialize};

/// Parameters the downstream competition module uses to apportion competed
/// stock across technology options.
///
/// Residential microsegments carry logit coefficients; commercial ones carry
/// a capital-cost time-preference rate distribution (unitless weights).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChoiceParams {
    Logit { b1: YearSeries, b2: YearSeries },
    TimePrefs { distribution: Vec<f64> },
}

impl ChoiceParams {
    /// Rescale logit coefficients for a change of cost-unit denominator.
    ///
    /// Multiplying the measure's cost unit by `k` divides both coefficients
    /// by `k`, so the product b·cost (and therefore relative
    /// competitiveness) is unit-invariant. Time-preference distributions are
    /// unitless and pass through unchanged.
    pub fn rescaled_for_cost_units(&self, k: f64) -> ChoiceParams {
        match self {
            ChoiceParams::Logit { b1, b2 } => ChoiceParams::Logit {
                b1: b1.scaled(1.0 / k),
                b2: b2.scaled(1.0 / k),
            },
            ChoiceParams::TimePrefs { distribution } => ChoiceParams::TimePrefs {
                distribution: distribution.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::year::Horizon;

    #[test]
    fn rescale_divides_both_coefficients() {
        let h = Horizon::new(2025, 2026);
        let p = ChoiceParams::Logit {
            b1: YearSeries::splat(h, -0.003),
            b2: YearSeries::splat(h, -0.012),
        };
        match p.rescaled_for_cost_units(2.0) {
            ChoiceParams::Logit { b1, b2 } => {
                assert!((b1.get(2025) - -0.0015).abs() < 1e-12);
                assert!((b2.get(2026) - -0.006).abs() < 1e-12);
            }
            _ => panic!("expected logit"),
        }
    }
}
