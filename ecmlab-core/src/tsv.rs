//! Time-sensitive valuation.
//!
//! Measures may declare load-shed, load-shift, or custom-shape features.
//! The hourly arithmetic lives with the load-shape collaborator; what the
//! market update consumes is a table of factors already annualized per
//! (region, building sector, end use, technology, feature class). Table
//! rows leave fields unset to match any value; the most specific matching
//! row wins. A measure with no features, or a key no row matches, gets
//! factors of 1.0.

use crate::domain::key::BldgSector;
use serde::{Deserialize, Serialize};

/// Load shed: demand reduced by a fraction over a daily window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShedSpec {
    pub relative_energy_change: f64,
    pub start_hour: u8,
    pub stop_hour: u8,
}

/// Load shift: demand moved earlier by a number of hours within a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftSpec {
    pub offset_hours: u8,
    pub start_hour: u8,
    pub stop_hour: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TsvFeatures {
    #[serde(default)]
    pub shed: Option<ShedSpec>,
    #[serde(default)]
    pub shift: Option<ShiftSpec>,
    /// Named custom 8760 shape resolved by the factor table.
    #[serde(default)]
    pub shape: Option<String>,
}

/// The kind of time-sensitive feature a measure declares, in the
/// precedence order the factor table distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TsvFeatureClass {
    Shed,
    Shift,
    Shape,
}

impl TsvFeatures {
    pub fn is_active(&self) -> bool {
        self.class().is_some()
    }

    /// A custom shape subsumes a shift, which subsumes a shed.
    pub fn class(&self) -> Option<TsvFeatureClass> {
        if self.shape.is_some() {
            Some(TsvFeatureClass::Shape)
        } else if self.shift.is_some() {
            Some(TsvFeatureClass::Shift)
        } else if self.shed.is_some() {
            Some(TsvFeatureClass::Shed)
        } else {
            None
        }
    }
}

/// Annualized reweighting factors for one (region, end use).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TsvFactor {
    pub energy: f64,
    pub cost: f64,
    pub carbon: f64,
}

impl Default for TsvFactor {
    fn default() -> Self {
        TsvFactor {
            energy: 1.0,
            cost: 1.0,
            carbon: 1.0,
        }
    }
}

/// One table row: unset fields match any value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsvRule {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub sector: Option<BldgSector>,
    #[serde(default)]
    pub end_use: Option<String>,
    #[serde(default)]
    pub technology: Option<String>,
    #[serde(default)]
    pub feature: Option<TsvFeatureClass>,
    pub factor: TsvFactor,
}

impl TsvRule {
    /// Specificity of the match, `None` when any field disagrees.
    fn score(
        &self,
        region: &str,
        sector: BldgSector,
        end_use: &str,
        technology: Option<&str>,
        class: Option<TsvFeatureClass>,
    ) -> Option<usize> {
        let mut score = 0;
        let mut check = |field_set: bool, matches: bool| {
            if field_set {
                if !matches {
                    return false;
                }
                score += 1;
            }
            true
        };
        if !check(self.region.is_some(), self.region.as_deref() == Some(region)) {
            return None;
        }
        if !check(self.sector.is_some(), self.sector == Some(sector)) {
            return None;
        }
        if !check(self.end_use.is_some(), self.end_use.as_deref() == Some(end_use)) {
            return None;
        }
        if !check(
            self.technology.is_some(),
            self.technology.as_deref() == technology,
        ) {
            return None;
        }
        if !check(self.feature.is_some(), self.feature == class) {
            return None;
        }
        Some(score)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TsvFactors {
    pub rules: Vec<TsvRule>,
}

impl TsvFactors {
    /// Factor for one key chain and feature spec; the most specific
    /// matching rule wins, ties go to the earlier rule.
    pub fn lookup(
        &self,
        region: &str,
        sector: BldgSector,
        end_use: &str,
        technology: Option<&str>,
        features: &TsvFeatures,
    ) -> TsvFactor {
        let class = features.class();
        let mut best: Option<(usize, TsvFactor)> = None;
        for rule in &self.rules {
            let score = match rule.score(region, sector, end_use, technology, class) {
                Some(s) => s,
                None => continue,
            };
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, rule.factor));
            }
        }
        best.map(|(_, f)| f).unwrap_or_default()
    }
}
