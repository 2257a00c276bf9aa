//! Measure-preparation orchestration.
//!
//! Fills stale measures (optionally across worker threads), persists their
//! documents, merges packages strictly after the fill join, and updates
//! the run registry. Per-measure failures collapse to skip records; only
//! infrastructure failures abort the run.

use crate::config::{ConfigError, RunConfig};
use crate::loader::{load_inputs, load_measures, load_packages, LoadError};
use crate::output::{
    read_measure, write_competition, write_measure, write_summary, OutputDirs, OutputError,
};
use crate::registry::{RegistryError, RunRegistry};
use ecmlab_core::baseline::BaselineDb;
use ecmlab_core::diagnostics::Diagnostics;
use ecmlab_core::domain::year::Horizon;
use ecmlab_core::engine::{fill_measure, EngineCtx};
use ecmlab_core::fingerprint::measure_fingerprint;
use ecmlab_core::measure::{Measure, MeasureDef};
use ecmlab_core::package::{merge_package, MeasurePackage, PackageDef};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrepError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("cannot fingerprint measure '{name}': {source}")]
    Fingerprint {
        name: String,
        source: serde_json::Error,
    },
}

/// What a run did, for reporting at the CLI.
#[derive(Debug)]
pub struct RunReport {
    pub filled: Vec<String>,
    pub reused: Vec<String>,
    pub packages: Vec<String>,
    pub diagnostics: Diagnostics,
}

fn fill_one(def: &MeasureDef, ctx: &EngineCtx, db: &BaselineDb) -> (Option<Measure>, Diagnostics) {
    let mut diag = Diagnostics::new();
    match fill_measure(def, ctx, db, &mut diag) {
        Ok(m) => (Some(m), diag),
        Err(e) => {
            diag.skip(&def.name, e.to_string());
            (None, diag)
        }
    }
}

/// Fill a batch of measures, each worker owning its result; diagnostics
/// merge at the join in input order.
pub fn fill_batch(
    defs: &[MeasureDef],
    ctx: &EngineCtx,
    db: &BaselineDb,
    parallel: bool,
) -> (Vec<Measure>, Diagnostics) {
    let results: Vec<(Option<Measure>, Diagnostics)> = if parallel {
        defs.par_iter().map(|d| fill_one(d, ctx, db)).collect()
    } else {
        defs.iter().map(|d| fill_one(d, ctx, db)).collect()
    };
    let mut measures = Vec::new();
    let mut diag = Diagnostics::new();
    for (m, d) in results {
        diag.merge(d);
        measures.extend(m);
    }
    (measures, diag)
}

/// Merge packages over the prepared measures. Runs strictly after the
/// fill join; a bad package skips that package only.
pub fn prepare_packages(
    defs: &[PackageDef],
    measures: &[Measure],
    h: Horizon,
    diag: &mut Diagnostics,
) -> Vec<MeasurePackage> {
    let mut out = Vec::new();
    for def in defs {
        let mut members = Vec::with_capacity(def.members.len());
        let mut missing = None;
        for name in &def.members {
            match measures.iter().find(|m| m.def.name == *name) {
                Some(m) => members.push(m),
                None => {
                    missing = Some(name.clone());
                    break;
                }
            }
        }
        if let Some(name) = missing {
            diag.skip(&def.name, format!("member '{name}' is not prepared"));
            continue;
        }
        match merge_package(def, &members, h, diag) {
            Ok(p) => out.push(p),
            Err(e) => diag.skip(&def.name, e.to_string()),
        }
    }
    out
}

/// Run the full preparation pipeline for one configuration.
pub fn prepare_run(cfg: &RunConfig) -> Result<RunReport, PrepError> {
    cfg.validate()?;
    let inputs = load_inputs(cfg)?;
    let defs = load_measures(&cfg.paths.measures)?;
    let dirs = OutputDirs::new(&cfg.paths.output_dir)?;
    let mut registry = RunRegistry::load(dirs.root())?;
    let fp_opts = cfg.fingerprint_options();

    // Partition into stale (fill) and fresh (reuse persisted documents).
    let mut stale: Vec<(MeasureDef, String)> = Vec::new();
    let mut fresh: Vec<String> = Vec::new();
    for def in &defs {
        let fp = measure_fingerprint(def, &fp_opts).map_err(|source| {
            PrepError::Fingerprint {
                name: def.name.clone(),
                source,
            }
        })?;
        let outputs_present = dirs.measure_outputs_present(&def.name);
        if !cfg.run.force && !registry.needs_update(&def.name, &fp, outputs_present) {
            fresh.push(def.name.clone());
        } else {
            stale.push((def.clone(), fp));
        }
    }

    let stale_defs: Vec<MeasureDef> = stale.iter().map(|(d, _)| d.clone()).collect();
    let (filled, mut diag) =
        fill_batch(&stale_defs, &inputs.ctx, &inputs.db, cfg.run.parallel);

    for measure in &filled {
        write_measure(&dirs, measure)?;
        write_competition(&dirs, measure)?;
        let fp = stale
            .iter()
            .find(|(d, _)| d.name == measure.def.name)
            .map(|(_, fp)| fp.as_str())
            .unwrap_or_default();
        registry.record(
            &measure.def.name,
            fp,
            measure.key_chain_count > 0,
            measure.key_chain_count,
        );
    }

    // Reassemble the full measure set, persisted documents included, in
    // definition order for the summary and for package membership.
    let mut measures: Vec<Measure> = Vec::with_capacity(defs.len());
    for def in &defs {
        if let Some(m) = filled.iter().find(|m| m.def.name == def.name) {
            measures.push(m.clone());
        } else if fresh.contains(&def.name) {
            measures.push(read_measure(&dirs, &def.name)?);
        }
    }

    let package_defs = match &cfg.paths.packages {
        Some(p) => load_packages(p)?,
        None => Vec::new(),
    };
    let packages = prepare_packages(&package_defs, &measures, cfg.horizon(), &mut diag);

    write_summary(&dirs, &measures, &packages, &diag)?;
    registry.record_skipped(diag.skipped.clone());
    registry.save(dirs.root())?;

    Ok(RunReport {
        filled: filled.iter().map(|m| m.def.name.clone()).collect(),
        reused: fresh,
        packages: packages.iter().map(|p| p.name.clone()).collect(),
        diagnostics: diag,
    })
}
