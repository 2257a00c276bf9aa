//! Secondary microsegment adjustment.
//!
//! Secondary keys (demand-side heating/cooling affected by a primary end
//! use like lighting) carry no stock of their own. Their sub-market,
//! competed, and captured fractions are derived from accumulators the
//! primary fill records per (region, building type, vintage).

use crate::domain::key::{MsegKey, Vintage};
use crate::domain::year::{Horizon, YearSeries};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecondaryAdjustKey {
    pub region: String,
    pub bldg_type: String,
    pub vintage: Vintage,
}

impl SecondaryAdjustKey {
    pub fn of(key: &MsegKey) -> Self {
        SecondaryAdjustKey {
            region: key.region.clone(),
            bldg_type: key.bldg_type.clone(),
            vintage: key.vintage,
        }
    }
}

/// Primary stock accumulators for one adjustment key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryAccum {
    /// Total primary stock before sub-market scaling.
    pub total_orig: YearSeries,
    /// Total primary stock after sub-market scaling.
    pub total_adj: YearSeries,
    /// Previously captured (uncompeted measure) stock.
    pub prev_captured: YearSeries,
    pub competed: YearSeries,
    pub competed_captured: YearSeries,
}

impl SecondaryAccum {
    fn zeros(h: Horizon) -> Self {
        SecondaryAccum {
            total_orig: YearSeries::zeros(h),
            total_adj: YearSeries::zeros(h),
            prev_captured: YearSeries::zeros(h),
            competed: YearSeries::zeros(h),
            competed_captured: YearSeries::zeros(h),
        }
    }
}

/// Fractions a secondary key applies to its baseline energy.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryFractions {
    pub sub_market: YearSeries,
    pub competed: YearSeries,
    pub competed_captured: YearSeries,
    pub prev_captured: YearSeries,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecondaryAdjustTable {
    entries: Vec<(SecondaryAdjustKey, SecondaryAccum)>,
}

impl SecondaryAdjustTable {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, key: SecondaryAdjustKey, h: Horizon) -> &mut SecondaryAccum {
        if let Some(idx) = self.entries.iter().position(|(k, _)| *k == key) {
            return &mut self.entries[idx].1;
        }
        self.entries.push((key, SecondaryAccum::zeros(h)));
        let last = self.entries.len() - 1;
        &mut self.entries[last].1
    }

    /// Record one primary key's stock series into its adjustment bucket.
    #[allow(clippy::too_many_arguments)]
    pub fn record_primary(
        &mut self,
        key: &MsegKey,
        h: Horizon,
        total_orig: &YearSeries,
        total_adj: &YearSeries,
        prev_captured: &YearSeries,
        competed: &YearSeries,
        competed_captured: &YearSeries,
    ) {
        let accum = self.entry_mut(SecondaryAdjustKey::of(key), h);
        accum.total_orig.add_assign(total_orig);
        accum.total_adj.add_assign(total_adj);
        accum.prev_captured.add_assign(prev_captured);
        accum.competed.add_assign(competed);
        accum.competed_captured.add_assign(competed_captured);
    }

    /// Fractions for a secondary key, `None` when no primary accumulator
    /// exists on its footprint.
    pub fn fractions(&self, key: &MsegKey) -> Option<SecondaryFractions> {
        let want = SecondaryAdjustKey::of(key);
        let accum = self
            .entries
            .iter()
            .find(|(k, _)| *k == want)
            .map(|(_, a)| a)?;
        let frac = |num: &YearSeries| num.normalized_by(&accum.total_orig);
        Some(SecondaryFractions {
            sub_market: frac(&accum.total_adj),
            competed: frac(&accum.competed),
            competed_captured: frac(&accum.competed_captured),
            prev_captured: frac(&accum.prev_captured),
        })
    }

    /// Fold another measure's table in (package merges).
    pub fn merge(&mut self, other: &SecondaryAdjustTable, h: Horizon) {
        for (key, accum) in &other.entries {
            let mine = self.entry_mut(key.clone(), h);
            mine.total_orig.add_assign(&accum.total_orig);
            mine.total_adj.add_assign(&accum.total_adj);
            mine.prev_captured.add_assign(&accum.prev_captured);
            mine.competed.add_assign(&accum.competed);
            mine.competed_captured.add_assign(&accum.competed_captured);
        }
    }
}
