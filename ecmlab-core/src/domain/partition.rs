//! Fixed-schema market records: the partitioned microsegment, contributing
//! records, and the additive master microsegment.

use crate::domain::choice::ChoiceParams;
use crate::domain::key::MsegKey;
use crate::domain::year::{Horizon, YearSeries};
use serde::{Deserialize, Serialize};

/// Baseline/efficient pair of year series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseEff {
    pub baseline: YearSeries,
    pub efficient: YearSeries,
}

impl BaseEff {
    pub fn zeros(h: Horizon) -> Self {
        Self {
            baseline: YearSeries::zeros(h),
            efficient: YearSeries::zeros(h),
        }
    }

    pub fn add_assign(&mut self, other: &Self) {
        self.baseline.add_assign(&other.baseline);
        self.efficient.add_assign(&other.efficient);
    }

    pub fn scale(&mut self, k: f64) {
        self.baseline.scale(k);
        self.efficient.scale(k);
    }

    pub fn clamp_non_negative(&mut self) -> usize {
        self.baseline.clamp_non_negative() + self.efficient.clamp_non_negative()
    }

    /// Baseline minus efficient, per year.
    pub fn savings(&self) -> YearSeries {
        self.baseline.zip_with(&self.efficient, |b, e| b - e)
    }
}

/// All-stock/measure-captured pair of year series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllMeasure {
    pub all: YearSeries,
    pub measure: YearSeries,
}

impl AllMeasure {
    pub fn zeros(h: Horizon) -> Self {
        Self {
            all: YearSeries::zeros(h),
            measure: YearSeries::zeros(h),
        }
    }

    pub fn add_assign(&mut self, other: &Self) {
        self.all.add_assign(&other.all);
        self.measure.add_assign(&other.measure);
    }

    pub fn scale(&mut self, k: f64) {
        self.all.scale(k);
        self.measure.scale(k);
    }

    pub fn clamp_non_negative(&mut self) -> usize {
        self.all.clamp_non_negative() + self.measure.clamp_non_negative()
    }
}

/// Total/competed split of a stock quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMseg {
    pub total: AllMeasure,
    pub competed: AllMeasure,
}

impl StockMseg {
    pub fn zeros(h: Horizon) -> Self {
        Self {
            total: AllMeasure::zeros(h),
            competed: AllMeasure::zeros(h),
        }
    }

    pub fn add_assign(&mut self, other: &Self) {
        self.total.add_assign(&other.total);
        self.competed.add_assign(&other.competed);
    }

    pub fn scale(&mut self, k: f64) {
        self.total.scale(k);
        self.competed.scale(k);
    }

    pub fn clamp_non_negative(&mut self) -> usize {
        self.total.clamp_non_negative() + self.competed.clamp_non_negative()
    }
}

/// Total/competed split of an energy-linked quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowMseg {
    pub total: BaseEff,
    pub competed: BaseEff,
}

impl FlowMseg {
    pub fn zeros(h: Horizon) -> Self {
        Self {
            total: BaseEff::zeros(h),
            competed: BaseEff::zeros(h),
        }
    }

    pub fn add_assign(&mut self, other: &Self) {
        self.total.add_assign(&other.total);
        self.competed.add_assign(&other.competed);
    }

    pub fn scale(&mut self, k: f64) {
        self.total.scale(k);
        self.competed.scale(k);
    }

    pub fn clamp_non_negative(&mut self) -> usize {
        self.total.clamp_non_negative() + self.competed.clamp_non_negative()
    }
}

/// Stock, energy, and carbon cost blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostMseg {
    pub stock: FlowMseg,
    pub energy: FlowMseg,
    pub carbon: FlowMseg,
}

impl CostMseg {
    pub fn zeros(h: Horizon) -> Self {
        Self {
            stock: FlowMseg::zeros(h),
            energy: FlowMseg::zeros(h),
            carbon: FlowMseg::zeros(h),
        }
    }

    pub fn add_assign(&mut self, other: &Self) {
        self.stock.add_assign(&other.stock);
        self.energy.add_assign(&other.energy);
        self.carbon.add_assign(&other.carbon);
    }

    pub fn clamp_non_negative(&mut self) -> usize {
        self.stock.clamp_non_negative()
            + self.energy.clamp_non_negative()
            + self.carbon.clamp_non_negative()
    }
}

/// One key's market update result: the 24 partitioned series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsegPartition {
    pub stock: StockMseg,
    pub energy: FlowMseg,
    pub carbon: FlowMseg,
    pub cost: CostMseg,
}

impl MsegPartition {
    pub fn zeros(h: Horizon) -> Self {
        Self {
            stock: StockMseg::zeros(h),
            energy: FlowMseg::zeros(h),
            carbon: FlowMseg::zeros(h),
            cost: CostMseg::zeros(h),
        }
    }

    pub fn add_assign(&mut self, other: &Self) {
        self.stock.add_assign(&other.stock);
        self.energy.add_assign(&other.energy);
        self.carbon.add_assign(&other.carbon);
        self.cost.add_assign(&other.cost);
    }

    /// Scale only stock and stock cost; used to factor double-counted floor
    /// area out of measures whose stock is expressed per ft^2.
    pub fn scale_stock(&mut self, k: f64) {
        self.stock.scale(k);
        self.cost.stock.scale(k);
    }

    pub fn clamp_non_negative(&mut self) -> usize {
        self.stock.clamp_non_negative()
            + self.energy.clamp_non_negative()
            + self.carbon.clamp_non_negative()
            + self.cost.clamp_non_negative()
    }
}

/// Equipment lifetime attached to a contributing record or master mseg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lifetime {
    pub baseline: YearSeries,
    pub measure: f64,
}

impl Lifetime {
    pub fn zeros(h: Horizon) -> Self {
        Self {
            baseline: YearSeries::zeros(h),
            measure: 0.0,
        }
    }

    pub fn add_assign(&mut self, other: &Self) {
        self.baseline.add_assign(&other.baseline);
        self.measure += other.measure;
    }

    pub fn divide_by(&mut self, n: f64) {
        if n != 0.0 {
            self.baseline = self.baseline.scaled(1.0 / n);
            self.measure /= n;
        }
    }
}

/// Contributing microsegment record: one key's partition plus the
/// measure-level attributes the competition module needs for that key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContribRecord {
    pub partition: MsegPartition,
    pub lifetime: Lifetime,
    /// Sub-market scaling fraction that was applied to this key.
    pub sub_market_scale: f64,
    /// Present only for supply-side primary keys (invariant: never for
    /// demand-side or secondary keys).
    pub choice: Option<ChoiceParams>,
}

impl ContribRecord {
    /// Merge another record for the same contributing key (the windows
    /// solar/conduction case). Partitions add; lifetime is shared by the two
    /// load components of the same physical unit and is kept, not summed.
    pub fn merge_same_unit(&mut self, other: &ContribRecord) {
        self.partition.add_assign(&other.partition);
    }
}

/// Ordered map of contributing records; insertion order is the render order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContribMap {
    entries: Vec<(MsegKey, ContribRecord)>,
}

impl ContribMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &MsegKey) -> Option<&ContribRecord> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }

    pub fn contains(&self, key: &MsegKey) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &MsegKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MsegKey, &ContribRecord)> {
        self.entries.iter().map(|(k, r)| (k, r))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&MsegKey, &mut ContribRecord)> {
        self.entries.iter_mut().map(|(k, r)| (&*k, r))
    }

    /// Insert a new record, or merge into the existing record for the same
    /// contributing key (windows components of one physical unit).
    pub fn insert_or_merge(&mut self, key: MsegKey, record: ContribRecord) {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            existing.merge_same_unit(&record);
        } else {
            self.entries.push((key, record));
        }
    }

    /// Insert, replacing any existing record for the key.
    pub fn insert(&mut self, key: MsegKey, record: ContribRecord) {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            *existing = record;
        } else {
            self.entries.push((key, record));
        }
    }
}

/// Per-adoption-scheme sum of all contributing records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterMseg {
    pub msegs: MsegPartition,
    pub lifetime: Lifetime,
}

impl MasterMseg {
    pub fn zeros(h: Horizon) -> Self {
        Self {
            msegs: MsegPartition::zeros(h),
            lifetime: Lifetime::zeros(h),
        }
    }

    pub fn add_partition(&mut self, partition: &MsegPartition, lifetime: &Lifetime) {
        self.msegs.add_assign(partition);
        self.lifetime.add_assign(lifetime);
    }

    /// Convert summed lifetimes into the average across contributing chains.
    pub fn finalize_lifetime(&mut self, key_chain_count: usize) {
        self.lifetime.divide_by(key_chain_count as f64);
    }
}
