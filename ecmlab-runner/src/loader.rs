//! Input document loading.
//!
//! All inputs are JSON documents deserialized straight into the core
//! record types, then assembled into the engine's lookup structures.

use crate::config::RunConfig;
use ecmlab_core::baseline::{
    BaselineDb, BaselineRecord, BldgStockRecord, DimensionMaps, EnergyFactors,
    EnergyFactorsRecord,
};
use ecmlab_core::convert::{CostConvertRecord, CostConverter};
use ecmlab_core::domain::year::YearSeries;
use ecmlab_core::engine::EngineCtx;
use ecmlab_core::measure::MeasureDef;
use ecmlab_core::package::PackageDef;
use ecmlab_core::tsv::TsvFactors;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{path}: baseline document has no microsegment records")]
    EmptyBaseline { path: PathBuf },
}

/// On-disk form of the baseline database: microsegment records plus the
/// building-stock series used for new-construction fractions and
/// square-footage substitution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineDoc {
    pub msegs: Vec<BaselineRecord>,
    pub building_stock: Vec<BldgStockRecord>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_measures(path: &Path) -> Result<Vec<MeasureDef>, LoadError> {
    read_json(path)
}

pub fn load_packages(path: &Path) -> Result<Vec<PackageDef>, LoadError> {
    read_json(path)
}

/// Everything a run needs besides the measure definitions.
pub struct RunInputs {
    pub db: BaselineDb,
    pub ctx: EngineCtx,
}

/// Load the baseline, factor, and conversion documents and assemble the
/// engine context per the run configuration.
pub fn load_inputs(cfg: &RunConfig) -> Result<RunInputs, LoadError> {
    let h = cfg.horizon();

    let doc: BaselineDoc = read_json(&cfg.paths.baseline)?;
    if doc.msegs.is_empty() {
        return Err(LoadError::EmptyBaseline {
            path: cfg.paths.baseline.clone(),
        });
    }
    let db = BaselineDb::from_records(h, doc.msegs, doc.building_stock);

    let factors_rec: EnergyFactorsRecord = read_json(&cfg.paths.energy_factors)?;
    let convert_rec: CostConvertRecord = read_json(&cfg.paths.cost_conversions)?;
    let tsv = match &cfg.paths.tsv_factors {
        Some(p) => read_json::<TsvFactors>(p)?,
        None => TsvFactors::default(),
    };

    let mut ctx = EngineCtx::new(
        h,
        DimensionMaps::builtin(),
        EnergyFactors::from_record(h, &factors_rec),
        CostConverter::from_record(&convert_rec),
    );
    ctx.schemes = cfg.run.schemes.clone();
    ctx.retro_rate = cfg.run.retro_rate;
    ctx.nsamples = cfg.run.nsamples;
    ctx.seed = cfg.run.seed;
    ctx.tsv = tsv;
    if !cfg.run.exog_hp_rates.is_empty() {
        ctx.exog_hp_rates = Some(
            cfg.run
                .exog_hp_rates
                .iter()
                .map(|(region, by_year)| (region.clone(), YearSeries::from_map(h, by_year)))
                .collect(),
        );
    }

    Ok(RunInputs { db, ctx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_doc_round_trips() {
        let json = r#"{
            "msegs": [{
                "region": "AIA_CZ1",
                "bldg_type": "single family home",
                "fuel": "electricity",
                "end_use": "heating",
                "tech_type": "supply",
                "technology": "ASHP",
                "vintage": "existing",
                "stock": {"2025": 100.0},
                "energy": {"2025": 50.0},
                "cpl": null
            }],
            "building_stock": [{
                "region": "AIA_CZ1",
                "bldg_type": "single family home",
                "new": {"2025": 2.0},
                "total": {"2025": 100.0},
                "sqft": {"2025": 2000.0}
            }]
        }"#;
        let doc: BaselineDoc = serde_json::from_str(json).unwrap();
        assert_eq!(doc.msegs.len(), 1);
        let back = serde_json::to_string(&doc).unwrap();
        let again: BaselineDoc = serde_json::from_str(&back).unwrap();
        assert_eq!(again.building_stock.len(), 1);
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = load_measures(Path::new("/nonexistent/measures.json")).unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/measures.json"));
    }
}
