//! Baseline stock/energy database, cost-performance-lifetime data, and the
//! dimension maps used to expand `"all"` selectors and label output
//! breakouts.
//!
//! Baseline input is a flat list of per-microsegment records. Applicability
//! expansion filters over the keys actually present here, so the database
//! doubles as the authority on which key chains exist.

use crate::domain::key::{BldgSector, MsegKey, Scope, TechType, Vintage};
use crate::domain::year::{Horizon, YearSeries};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("no baseline microsegment for key '{0}'")]
    MissingMseg(String),
    #[error("no building stock data for region '{region}', building type '{bldg_type}'")]
    MissingBldgStock { region: String, bldg_type: String },
    #[error("no {kind} factor for fuel '{fuel}'")]
    MissingFactor { kind: &'static str, fuel: String },
    #[error("no energy price for sector '{sector}', fuel '{fuel}'")]
    MissingPrice { sector: String, fuel: String },
    #[error("building type '{0}' is not classified in the dimension maps")]
    UnknownBldgType(String),
}

/// Consumer choice coefficients attached to residential baseline equipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CplChoice {
    pub b1: BTreeMap<u32, f64>,
    pub b2: BTreeMap<u32, f64>,
}

/// Cost, performance, and lifetime data for one baseline microsegment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CplRecord {
    pub cost: BTreeMap<u32, f64>,
    pub cost_units: String,
    pub performance: BTreeMap<u32, f64>,
    pub performance_units: String,
    pub lifetime: BTreeMap<u32, f64>,
    #[serde(default)]
    pub consumer_choice: Option<CplChoice>,
}

/// One baseline microsegment as loaded from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub region: String,
    pub bldg_type: String,
    pub fuel: String,
    pub end_use: String,
    #[serde(default)]
    pub tech_type: Option<TechType>,
    #[serde(default)]
    pub technology: Option<String>,
    pub vintage: Vintage,
    /// Absent for envelope/demand segments measured in square footage.
    #[serde(default)]
    pub stock: Option<BTreeMap<u32, f64>>,
    pub energy: BTreeMap<u32, f64>,
    #[serde(default)]
    pub cpl: Option<CplRecord>,
}

impl BaselineRecord {
    pub fn key(&self) -> MsegKey {
        MsegKey {
            scope: Scope::Primary,
            region: self.region.clone(),
            bldg_type: self.bldg_type.clone(),
            fuel: self.fuel.clone(),
            end_use: self.end_use.clone(),
            tech_type: self.tech_type,
            technology: self.technology.clone(),
            vintage: self.vintage,
        }
    }
}

/// Resolved baseline series for one microsegment.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineMseg {
    /// `None` marks a square-footage-substituted segment.
    pub stock: Option<YearSeries>,
    pub energy: YearSeries,
}

/// Resolved cost/performance/lifetime series.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineCpl {
    pub cost: YearSeries,
    pub cost_units: String,
    pub performance: YearSeries,
    pub performance_units: String,
    pub lifetime: YearSeries,
    pub choice_b1: Option<YearSeries>,
    pub choice_b2: Option<YearSeries>,
}

#[derive(Debug, Clone)]
pub struct BaselineSlot {
    pub key: MsegKey,
    pub mseg: BaselineMseg,
    pub cpl: Option<BaselineCpl>,
}

/// New/total building counts and floorspace for one (region, building type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BldgStockRecord {
    pub region: String,
    pub bldg_type: String,
    pub new: BTreeMap<u32, f64>,
    pub total: BTreeMap<u32, f64>,
    pub sqft: BTreeMap<u32, f64>,
}

#[derive(Debug, Clone)]
pub struct BldgStock {
    pub new: YearSeries,
    pub total: YearSeries,
    pub sqft: YearSeries,
}

impl BldgStock {
    /// Fraction of the stock that is newly added in each year.
    pub fn new_frac(&self) -> YearSeries {
        self.new.zip_with(&self.total, |n, t| if t > 0.0 { (n / t).min(1.0) } else { 0.0 })
    }
}

/// Indexed baseline database.
#[derive(Debug, Clone, Default)]
pub struct BaselineDb {
    slots: BTreeMap<String, BaselineSlot>,
    bldg_stock: BTreeMap<(String, String), BldgStock>,
}

impl BaselineDb {
    pub fn from_records(
        horizon: Horizon,
        records: Vec<BaselineRecord>,
        stock: Vec<BldgStockRecord>,
    ) -> Self {
        let mut slots = BTreeMap::new();
        for rec in records {
            let key = rec.key();
            let mseg = BaselineMseg {
                stock: rec.stock.as_ref().map(|m| YearSeries::from_map(horizon, m)),
                energy: YearSeries::from_map(horizon, &rec.energy),
            };
            let cpl = rec.cpl.map(|c| BaselineCpl {
                cost: YearSeries::from_map(horizon, &c.cost),
                cost_units: c.cost_units,
                performance: YearSeries::from_map(horizon, &c.performance),
                performance_units: c.performance_units,
                lifetime: YearSeries::from_map(horizon, &c.lifetime),
                choice_b1: c
                    .consumer_choice
                    .as_ref()
                    .map(|ch| YearSeries::from_map(horizon, &ch.b1)),
                choice_b2: c
                    .consumer_choice
                    .as_ref()
                    .map(|ch| YearSeries::from_map(horizon, &ch.b2)),
            });
            slots.insert(key.doc_key(), BaselineSlot { key, mseg, cpl });
        }
        let mut bldg_stock = BTreeMap::new();
        for rec in stock {
            bldg_stock.insert(
                (rec.region.clone(), rec.bldg_type.clone()),
                BldgStock {
                    new: YearSeries::from_map(horizon, &rec.new),
                    total: YearSeries::from_map(horizon, &rec.total),
                    sqft: YearSeries::from_map(horizon, &rec.sqft),
                },
            );
        }
        BaselineDb { slots, bldg_stock }
    }

    pub fn lookup(&self, key: &MsegKey) -> Result<&BaselineSlot, BaselineError> {
        self.slots
            .get(&key.doc_key())
            .ok_or_else(|| BaselineError::MissingMseg(key.doc_key()))
    }

    pub fn get(&self, key: &MsegKey) -> Option<&BaselineSlot> {
        self.slots.get(&key.doc_key())
    }

    /// Every key chain present, in deterministic order.
    pub fn keys(&self) -> impl Iterator<Item = &MsegKey> {
        self.slots.values().map(|s| &s.key)
    }

    pub fn bldg_stock(&self, region: &str, bldg_type: &str) -> Result<&BldgStock, BaselineError> {
        self.bldg_stock
            .get(&(region.to_string(), bldg_type.to_string()))
            .ok_or_else(|| BaselineError::MissingBldgStock {
                region: region.to_string(),
                bldg_type: bldg_type.to_string(),
            })
    }

    pub fn region_count(&self) -> usize {
        let mut regions: Vec<&str> = self.slots.values().map(|s| s.key.region.as_str()).collect();
        regions.sort_unstable();
        regions.dedup();
        regions.len()
    }

    pub fn bldg_type_count(&self) -> usize {
        let mut types: Vec<&str> = self
            .slots
            .values()
            .map(|s| s.key.bldg_type.as_str())
            .collect();
        types.sort_unstable();
        types.dedup();
        types.len()
    }
}

/// Commercial time-preference premiums: fixed capital recovery rates and
/// the population fraction holding each, per end use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComTimePrefs {
    pub rates: Vec<f64>,
    pub distributions: BTreeMap<String, Vec<f64>>,
}

impl ComTimePrefs {
    /// Distribution for an end use, falling back to the heating column.
    pub fn distribution(&self, end_use: &str) -> &[f64] {
        self.distributions
            .get(end_use)
            .or_else(|| self.distributions.get("heating"))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Static classification and labeling tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionMaps {
    /// Building type to sector.
    pub bldg_sectors: BTreeMap<String, BldgSector>,
    /// Technology names belonging to demand-side (envelope) segments.
    pub demand_techs: Vec<String>,
    /// End use to output breakout label, separately for supply and demand.
    pub end_use_breakouts: BTreeMap<String, String>,
    /// Performance units where a higher value means better performance.
    pub inverted_perf_units: Vec<String>,
    /// Residential logit defaults when baseline equipment carries none.
    pub res_default_b1: f64,
    pub res_default_b2: f64,
    pub com_timeprefs: ComTimePrefs,
    /// Heating supply technologies in anchor-preference order for linked
    /// heating/cooling turnover.
    pub anchor_priority: Vec<String>,
}

impl DimensionMaps {
    pub fn builtin() -> Self {
        let mut bldg_sectors = BTreeMap::new();
        for b in [
            "single family home",
            "multi family home",
            "mobile home",
        ] {
            bldg_sectors.insert(b.to_string(), BldgSector::Residential);
        }
        for b in [
            "assembly",
            "education",
            "food sales",
            "food service",
            "health care",
            "lodging",
            "large office",
            "small office",
            "mercantile/service",
            "warehouse",
            "other",
        ] {
            bldg_sectors.insert(b.to_string(), BldgSector::Commercial);
        }

        let mut end_use_breakouts = BTreeMap::new();
        for (eu, label) in [
            ("heating", "Heating (Equip.)"),
            ("secondary heating", "Heating (Equip.)"),
            ("cooling", "Cooling (Equip.)"),
            ("ventilation", "Ventilation"),
            ("lighting", "Lighting"),
            ("water heating", "Water Heating"),
            ("refrigeration", "Refrigeration"),
            ("cooking", "Cooking"),
            ("drying", "Other"),
            ("ceiling fan", "Other"),
            ("fans and pumps", "Other"),
            ("computers", "Computers and Electronics"),
            ("TVs", "Computers and Electronics"),
            ("MELs", "Other"),
            ("other", "Other"),
        ] {
            end_use_breakouts.insert(eu.to_string(), label.to_string());
        }

        let mut distributions = BTreeMap::new();
        distributions.insert(
            "heating".to_string(),
            vec![0.265, 0.226, 0.196, 0.192, 0.105, 0.013, 0.003],
        );
        distributions.insert(
            "cooling".to_string(),
            vec![0.264, 0.225, 0.193, 0.192, 0.106, 0.016, 0.004],
        );
        distributions.insert(
            "water heating".to_string(),
            vec![0.263, 0.249, 0.212, 0.169, 0.097, 0.006, 0.004],
        );
        distributions.insert(
            "ventilation".to_string(),
            vec![0.265, 0.226, 0.196, 0.192, 0.105, 0.013, 0.003],
        );
        distributions.insert(
            "lighting".to_string(),
            vec![0.264, 0.225, 0.193, 0.193, 0.085, 0.027, 0.013],
        );
        distributions.insert(
            "refrigeration".to_string(),
            vec![0.262, 0.248, 0.213, 0.170, 0.097, 0.006, 0.004],
        );

        DimensionMaps {
            bldg_sectors,
            demand_techs: [
                "windows conduction",
                "windows solar",
                "wall",
                "roof",
                "ground",
                "infiltration",
                "equipment gain",
                "people gain",
                "lighting gain",
                "other heat gain",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            end_use_breakouts,
            inverted_perf_units: [
                "COP",
                "EER",
                "SEER",
                "SEER 2",
                "HSPF",
                "HSPF 2",
                "AFUE",
                "UEF",
                "lm/W",
                "BTU out/BTU in",
                "CEF",
                "EF",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            res_default_b1: -0.003,
            res_default_b2: -0.012,
            com_timeprefs: ComTimePrefs {
                rates: vec![10.0, 1.0, 0.45, 0.25, 0.15, 0.065, 0.0],
                distributions,
            },
            anchor_priority: [
                "ASHP",
                "GSHP",
                "NGHP",
                "boiler (NG)",
                "boiler (distillate)",
                "furnace (NG)",
                "furnace (distillate)",
                "furnace (LPG)",
                "furnace (kerosene)",
                "resistance heat",
                "stove (wood)",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }

    pub fn sector(&self, bldg_type: &str) -> Result<BldgSector, BaselineError> {
        self.bldg_sectors
            .get(bldg_type)
            .copied()
            .ok_or_else(|| BaselineError::UnknownBldgType(bldg_type.to_string()))
    }

    pub fn is_demand_tech(&self, tech: &str) -> bool {
        self.demand_techs.iter().any(|t| t == tech)
    }

    /// Output class label: sector crossed with vintage.
    pub fn bldg_class(&self, sector: BldgSector, vintage: Vintage) -> &'static str {
        match (sector, vintage) {
            (BldgSector::Residential, Vintage::New) => "Residential (New)",
            (BldgSector::Residential, Vintage::Existing) => "Residential (Existing)",
            (BldgSector::Commercial, Vintage::New) => "Commercial (New)",
            (BldgSector::Commercial, Vintage::Existing) => "Commercial (Existing)",
        }
    }

    /// Output end-use label; demand-side heating/cooling map to envelope
    /// labels instead of equipment labels.
    pub fn end_use_label(&self, end_use: &str, is_demand: bool) -> String {
        if is_demand {
            return match end_use {
                "heating" | "secondary heating" => "Heating (Env.)".to_string(),
                "cooling" => "Cooling (Env.)".to_string(),
                other => self
                    .end_use_breakouts
                    .get(other)
                    .cloned()
                    .unwrap_or_else(|| "Other".to_string()),
            };
        }
        self.end_use_breakouts
            .get(end_use)
            .cloned()
            .unwrap_or_else(|| "Other".to_string())
    }

    /// True when a higher performance number is better (COP-like units).
    pub fn perf_units_inverted(&self, units: &str) -> bool {
        self.inverted_perf_units.iter().any(|u| u == units)
    }
}

/// Site-source conversions, carbon intensities, and prices per fuel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyFactorsRecord {
    pub site_source: BTreeMap<String, BTreeMap<u32, f64>>,
    pub carbon_intensity: BTreeMap<String, BTreeMap<u32, f64>>,
    /// fuel -> sector name -> price series.
    pub energy_price: BTreeMap<String, BTreeMap<String, BTreeMap<u32, f64>>>,
    pub carbon_cost: BTreeMap<u32, f64>,
}

#[derive(Debug, Clone)]
pub struct EnergyFactors {
    site_source: BTreeMap<String, YearSeries>,
    carbon_intensity: BTreeMap<String, YearSeries>,
    energy_price: BTreeMap<(String, String), YearSeries>,
    carbon_cost: YearSeries,
}

impl EnergyFactors {
    pub fn from_record(horizon: Horizon, rec: &EnergyFactorsRecord) -> Self {
        let series =
            |m: &BTreeMap<u32, f64>| YearSeries::from_map(horizon, m);
        EnergyFactors {
            site_source: rec
                .site_source
                .iter()
                .map(|(k, v)| (k.clone(), series(v)))
                .collect(),
            carbon_intensity: rec
                .carbon_intensity
                .iter()
                .map(|(k, v)| (k.clone(), series(v)))
                .collect(),
            energy_price: rec
                .energy_price
                .iter()
                .flat_map(|(fuel, sectors)| {
                    sectors
                        .iter()
                        .map(|(sector, v)| ((fuel.clone(), sector.clone()), series(v)))
                        .collect::<Vec<_>>()
                })
                .collect(),
            carbon_cost: series(&rec.carbon_cost),
        }
    }

    pub fn site_source(&self, fuel: &str) -> Result<&YearSeries, BaselineError> {
        self.site_source
            .get(fuel)
            .ok_or_else(|| BaselineError::MissingFactor { kind: "site-source", fuel: fuel.to_string() })
    }

    pub fn carbon_intensity(&self, fuel: &str) -> Result<&YearSeries, BaselineError> {
        self.carbon_intensity
            .get(fuel)
            .ok_or_else(|| BaselineError::MissingFactor { kind: "carbon-intensity", fuel: fuel.to_string() })
    }

    pub fn energy_price(&self, fuel: &str, sector: BldgSector) -> Result<&YearSeries, BaselineError> {
        self.energy_price
            .get(&(fuel.to_string(), sector.as_str().to_string()))
            .ok_or_else(|| BaselineError::MissingPrice {
                sector: sector.as_str().to_string(),
                fuel: fuel.to_string(),
            })
    }

    pub fn carbon_cost(&self) -> &YearSeries {
        &self.carbon_cost
    }
}
