//! Serializable run configuration.

use ecmlab_core::domain::year::Horizon;
use ecmlab_core::fingerprint::FingerprintOptions;
use ecmlab_core::measure::AdoptScheme;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("modeling horizon {start}..={end} is empty or reversed")]
    BadHorizon { start: u32, end: u32 },
    #[error("adoption scheme list is empty")]
    NoSchemes,
    #[error("retrofit rate {0} outside [0, 1]")]
    BadRetroRate(f64),
}

/// Input and output locations, relative to the config file's directory
/// unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Baseline microsegment document (stock/energy/CPL plus building stock).
    pub baseline: PathBuf,
    /// Site-source, carbon-intensity, and price factors.
    pub energy_factors: PathBuf,
    /// CPI and cost-denominator conversion tables.
    pub cost_conversions: PathBuf,
    /// Measure definitions, a JSON array.
    pub measures: PathBuf,
    /// Package definitions, a JSON array; optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<PathBuf>,
    /// Time-sensitive-valuation factor tables; optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tsv_factors: Option<PathBuf>,
    /// Where summaries, competition documents, and the registry land.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

/// Options that shape the market update itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub horizon_start: u32,
    pub horizon_end: u32,
    /// Adoption schemes to fill; both by default.
    pub schemes: Vec<AdoptScheme>,
    /// Annual early-retrofit rate for existing stock.
    pub retro_rate: f64,
    /// Draw count when a measure input is a distribution.
    pub nsamples: u32,
    pub seed: u64,
    /// Fill measures across worker threads.
    pub parallel: bool,
    /// Refill everything, ignoring recorded fingerprints.
    pub force: bool,
    /// Exogenous heat-pump conversion rates by region and year, applied as
    /// a capture ceiling to fuel-switching measures. The `"all"` region
    /// covers regions without their own table.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub exog_hp_rates: BTreeMap<String, BTreeMap<u32, f64>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            horizon_start: 2025,
            horizon_end: 2050,
            schemes: AdoptScheme::ALL.to_vec(),
            retro_rate: 0.0,
            nsamples: 100,
            seed: 0,
            parallel: true,
            force: false,
            exog_hp_rates: BTreeMap::new(),
        }
    }
}

/// A full measure-preparation run configuration, loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub run: RunOptions,
}

impl RunConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg: RunConfig =
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if let Some(dir) = path.parent() {
            cfg.paths.rebase(dir);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.horizon_end < self.run.horizon_start {
            return Err(ConfigError::BadHorizon {
                start: self.run.horizon_start,
                end: self.run.horizon_end,
            });
        }
        if self.run.schemes.is_empty() {
            return Err(ConfigError::NoSchemes);
        }
        if !(0.0..=1.0).contains(&self.run.retro_rate) {
            return Err(ConfigError::BadRetroRate(self.run.retro_rate));
        }
        Ok(())
    }

    pub fn horizon(&self) -> Horizon {
        Horizon::new(self.run.horizon_start, self.run.horizon_end)
    }

    /// The options that feed the freshness fingerprint.
    pub fn fingerprint_options(&self) -> FingerprintOptions {
        FingerprintOptions {
            horizon_start: self.run.horizon_start,
            horizon_end: self.run.horizon_end,
            schemes: self.run.schemes.clone(),
            retro_rate: self.run.retro_rate,
            nsamples: self.run.nsamples,
            seed: self.run.seed,
        }
    }
}

impl PathsConfig {
    /// Resolve relative paths against the config file's directory.
    fn rebase(&mut self, dir: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        fix(&mut self.baseline);
        fix(&mut self.energy_factors);
        fix(&mut self.cost_conversions);
        fix(&mut self.measures);
        if let Some(p) = &mut self.packages {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        }
        if let Some(p) = &mut self.tsv_factors {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        }
        fix(&mut self.output_dir);
    }
}
