//! Output breakouts: master-microsegment baseline energy bucketed by
//! region, building class, and end-use bucket, then normalized to fractions.

use crate::domain::year::YearSeries;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Region -> building class -> end-use bucket -> year series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutBreak {
    buckets: BTreeMap<String, BTreeMap<String, BTreeMap<String, YearSeries>>>,
}

impl OutBreak {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, region: &str, class: &str, end_use: &str) -> Option<&YearSeries> {
        self.buckets.get(region)?.get(class)?.get(end_use)
    }

    /// Add baseline energy for one contributing microsegment to its bucket.
    pub fn add(&mut self, region: &str, class: &str, end_use: &str, energy: &YearSeries) {
        let leaf = self
            .buckets
            .entry(region.to_string())
            .or_default()
            .entry(class.to_string())
            .or_default()
            .entry(end_use.to_string());
        match leaf {
            std::collections::btree_map::Entry::Occupied(mut e) => {
                e.get_mut().add_assign(energy)
            }
            std::collections::btree_map::Entry::Vacant(e) => {
                e.insert(energy.clone());
            }
        }
    }

    /// Unnormalize fractions back into absolute energy using a total series
    /// (used when merging a member measure's breakouts into a package).
    pub fn unnormalized(&self, total: &YearSeries) -> OutBreak {
        let mut out = OutBreak::new();
        for (region, classes) in &self.buckets {
            for (class, uses) in classes {
                for (end_use, frac) in uses {
                    let abs = frac.zip_with(total, |f, t| f * t);
                    out.add(region, class, end_use, &abs);
                }
            }
        }
        out
    }

    pub fn add_all(&mut self, other: &OutBreak) {
        for (region, classes) in &other.buckets {
            for (class, uses) in classes {
                for (end_use, series) in uses {
                    self.add(region, class, end_use, series);
                }
            }
        }
    }

    /// Normalize every bucket by total baseline energy, yielding the
    /// fractions of the measure's market attributable to each bucket.
    /// Years with zero total map to a zero fraction.
    pub fn normalize(&mut self, total: &YearSeries) {
        for classes in self.buckets.values_mut() {
            for uses in classes.values_mut() {
                for series in uses.values_mut() {
                    *series = series.normalized_by(total);
                }
            }
        }
    }
}
