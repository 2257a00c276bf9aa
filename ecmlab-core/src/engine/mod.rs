//! Market-update engine: key-chain expansion, stock turnover, consumer
//! choice, secondary/linked adjustment, and the per-measure fill driver.

pub mod choice;
pub mod fill;
pub mod keychain;
pub mod linked;
pub mod secondary;
pub mod turnover;

use crate::baseline::{DimensionMaps, EnergyFactors};
use crate::convert::CostConverter;
use crate::domain::year::{Horizon, YearSeries};
use crate::measure::markets::AdoptScheme;
use crate::tsv::TsvFactors;
use std::collections::BTreeMap;

pub use fill::{fill_measure, FillError};
pub use keychain::ApplicabilityError;

/// Immutable inputs shared by every fill in a run.
#[derive(Debug, Clone)]
pub struct EngineCtx {
    pub horizon: Horizon,
    pub schemes: Vec<AdoptScheme>,
    /// Annual early-retrofit rate applied to existing captured-eligible stock.
    pub retro_rate: f64,
    /// Draw count for distribution-valued specs.
    pub nsamples: u32,
    pub seed: u64,
    pub maps: DimensionMaps,
    pub factors: EnergyFactors,
    pub cost_convert: CostConverter,
    pub tsv: TsvFactors,
    /// Exogenous heat-pump conversion rates per region: annual ceiling on
    /// the fuel-switched share of competed stock. The `"all"` key applies
    /// to regions without their own entry.
    pub exog_hp_rates: Option<BTreeMap<String, YearSeries>>,
}

impl EngineCtx {
    pub fn new(
        horizon: Horizon,
        maps: DimensionMaps,
        factors: EnergyFactors,
        cost_convert: CostConverter,
    ) -> Self {
        EngineCtx {
            horizon,
            schemes: AdoptScheme::ALL.to_vec(),
            retro_rate: 0.0,
            nsamples: 100,
            seed: 0,
            maps,
            factors,
            cost_convert,
            tsv: TsvFactors::default(),
            exog_hp_rates: None,
        }
    }

    /// Conversion-rate ceiling for one region, if any is configured.
    pub fn hp_rate_for(&self, region: &str) -> Option<&YearSeries> {
        let rates = self.exog_hp_rates.as_ref()?;
        rates.get(region).or_else(|| rates.get("all"))
    }
}
