//! Consumer choice parameters for supply-side primary keys.

use crate::baseline::{BaselineCpl, DimensionMaps};
use crate::domain::choice::ChoiceParams;
use crate::domain::key::BldgSector;
use crate::domain::year::{Horizon, YearSeries};
use crate::diagnostics::{Diagnostics, WarnKind};

fn series_usable(s: &YearSeries) -> bool {
    s.iter().any(|(_, v)| v != 0.0 && v.is_finite())
}

/// Build choice parameters for one key. `cost_factor` is the denominator
/// reconciliation factor applied to the measure's costs; the logit
/// coefficients are rescaled by the same factor so that cost-unit choice
/// does not change predicted adoption.
pub fn choice_params(
    h: Horizon,
    sector: BldgSector,
    end_use: &str,
    cpl: Option<&BaselineCpl>,
    maps: &DimensionMaps,
    cost_factor: f64,
    diag: &mut Diagnostics,
) -> ChoiceParams {
    match sector {
        BldgSector::Residential => {
            let from_cpl = cpl.and_then(|c| match (&c.choice_b1, &c.choice_b2) {
                (Some(b1), Some(b2)) if series_usable(b1) && series_usable(b2) => {
                    Some((b1.clone(), b2.clone()))
                }
                _ => None,
            });
            let (b1, b2) = match from_cpl {
                Some(pair) => pair,
                None => {
                    diag.warn(
                        WarnKind::ChoiceDefaultsUsed,
                        format!("end use '{end_use}'"),
                    );
                    (
                        YearSeries::splat(h, maps.res_default_b1),
                        YearSeries::splat(h, maps.res_default_b2),
                    )
                }
            };
            ChoiceParams::Logit { b1, b2 }.rescaled_for_cost_units(cost_factor)
        }
        BldgSector::Commercial => {
            if !maps.com_timeprefs.distributions.contains_key(end_use) {
                diag.warn(WarnKind::TimePrefFallback, format!("end use '{end_use}'"));
            }
            ChoiceParams::TimePrefs {
                distribution: maps.com_timeprefs.distribution(end_use).to_vec(),
            }
        }
    }
}
