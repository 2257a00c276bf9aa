//! Filled measure markets, one set per adoption scheme.

use crate::domain::breakout::OutBreak;
use crate::domain::partition::{ContribMap, MasterMseg};
use crate::engine::secondary::SecondaryAdjustTable;
use crate::measure::definition::MeasureDef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Adoption scheme under which markets are partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AdoptScheme {
    #[serde(rename = "Technical potential")]
    TechnicalPotential,
    #[serde(rename = "Max adoption potential")]
    MaxAdoptionPotential,
}

impl AdoptScheme {
    pub const ALL: [AdoptScheme; 2] = [
        AdoptScheme::TechnicalPotential,
        AdoptScheme::MaxAdoptionPotential,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdoptScheme::TechnicalPotential => "Technical potential",
            AdoptScheme::MaxAdoptionPotential => "Max adoption potential",
        }
    }
}

/// Everything the market update produces for one adoption scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeMarkets {
    /// Aggregated totals across all contributing microsegments.
    pub master: MasterMseg,
    /// Per-key partitions retained for downstream competition.
    pub contributing: ContribMap,
    /// Baseline-energy-normalized output breakouts.
    pub out_break: OutBreak,
    /// Accumulators secondary microsegments derive their fractions from.
    #[serde(default, skip_serializing_if = "SecondaryAdjustTable::is_empty")]
    pub secondary: SecondaryAdjustTable,
}

impl SchemeMarkets {
    pub fn zeros(h: crate::domain::year::Horizon) -> Self {
        SchemeMarkets {
            master: MasterMseg::zeros(h),
            contributing: ContribMap::new(),
            out_break: OutBreak::new(),
            secondary: SecondaryAdjustTable::default(),
        }
    }
}

pub type Markets = BTreeMap<AdoptScheme, SchemeMarkets>;

/// A measure with fully updated markets, ready for output or packaging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    #[serde(flatten)]
    pub def: MeasureDef,
    pub markets: Markets,
    /// Count of key chains the markets were built from; zero when the
    /// measure is out of its market window or nothing applied.
    pub key_chain_count: usize,
}

impl Measure {
    pub fn scheme(&self, scheme: AdoptScheme) -> Option<&SchemeMarkets> {
        self.markets.get(&scheme)
    }
}
