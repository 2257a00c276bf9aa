//! Cost unit parsing and reconciliation.
//!
//! Measure costs are reconciled to baseline cost units in two stages: a
//! dollar-year adjustment from a CPI table, then a denominator change from
//! sector-specific conversion factors (units per square foot and the like).

use crate::domain::key::BldgSector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConversionError {
    #[error("cannot parse cost units '{0}' (expected e.g. '2022$/unit')")]
    BadUnits(String),
    #[error("CPI table has no data at or before year {0}")]
    NoCpi(u32),
    #[error("no conversion factor from '{from}' to '{to}' for {sector} buildings")]
    NoFactor {
        from: String,
        to: String,
        sector: &'static str,
    },
}

/// Parsed cost units: dollar year plus a denominator such as `unit`,
/// `ft^2 floor`, or `ft^2 glazing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostUnits {
    pub dollar_year: u32,
    pub denom: String,
}

impl CostUnits {
    pub fn parse(s: &str) -> Result<Self, ConversionError> {
        let (year_part, denom) = s
            .split_once("$/")
            .ok_or_else(|| ConversionError::BadUnits(s.to_string()))?;
        let dollar_year: u32 = year_part
            .trim()
            .parse()
            .map_err(|_| ConversionError::BadUnits(s.to_string()))?;
        if denom.trim().is_empty() {
            return Err(ConversionError::BadUnits(s.to_string()));
        }
        Ok(CostUnits {
            dollar_year,
            denom: denom.trim().to_string(),
        })
    }
}

impl fmt::Display for CostUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}$/{}", self.dollar_year, self.denom)
    }
}

/// On-disk form of the conversion tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostConvertRecord {
    /// Annual CPI index values.
    pub cpi: BTreeMap<u32, f64>,
    /// sector -> from-denominator -> to-denominator -> multiplier.
    pub denom_factors: BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>,
}

#[derive(Debug, Clone, Default)]
pub struct CostConverter {
    cpi: BTreeMap<u32, f64>,
    denom_factors: BTreeMap<(String, String, String), f64>,
}

impl CostConverter {
    pub fn from_record(rec: &CostConvertRecord) -> Self {
        let mut denom_factors = BTreeMap::new();
        for (sector, froms) in &rec.denom_factors {
            for (from, tos) in froms {
                for (to, factor) in tos {
                    denom_factors
                        .insert((sector.clone(), from.clone(), to.clone()), *factor);
                }
            }
        }
        CostConverter {
            cpi: rec.cpi.clone(),
            denom_factors,
        }
    }

    /// CPI index at the given year, falling back to the latest earlier year.
    fn cpi_at(&self, year: u32) -> Result<f64, ConversionError> {
        self.cpi
            .range(..=year)
            .next_back()
            .map(|(_, v)| *v)
            .ok_or(ConversionError::NoCpi(year))
    }

    /// Multiplier converting dollars of `from` year into dollars of `to`.
    pub fn dollar_adjust(&self, from: u32, to: u32) -> Result<f64, ConversionError> {
        if from == to {
            return Ok(1.0);
        }
        Ok(self.cpi_at(to)? / self.cpi_at(from)?)
    }

    /// Multiplier converting a cost per `from` denominator into a cost per
    /// `to` denominator.
    pub fn denom_factor(
        &self,
        sector: BldgSector,
        from: &str,
        to: &str,
    ) -> Result<f64, ConversionError> {
        if from == to {
            return Ok(1.0);
        }
        self.denom_factors
            .get(&(sector.as_str().to_string(), from.to_string(), to.to_string()))
            .copied()
            .ok_or_else(|| ConversionError::NoFactor {
                from: from.to_string(),
                to: to.to_string(),
                sector: sector.as_str(),
            })
    }

    /// Full reconciliation multiplier between two unit strings.
    pub fn factor(
        &self,
        sector: BldgSector,
        from: &CostUnits,
        to: &CostUnits,
    ) -> Result<f64, ConversionError> {
        let dollars = self.dollar_adjust(from.dollar_year, to.dollar_year)?;
        let denom = self.denom_factor(sector, &from.denom, &to.denom)?;
        Ok(dollars * denom)
    }
}
