//! Output documents.
//!
//! Three document families land in the output directory:
//! - `measures/<name>.json` — the full filled measure, read back when a
//!   later run reuses it as a package member;
//! - `competition/<name>.json` — contributing records and choice
//!   parameters for the downstream competition step;
//! - `summary.json` — master totals and breakouts for every measure and
//!   package, with per-key and secondary intermediates stripped.

use ecmlab_core::diagnostics::Diagnostics;
use ecmlab_core::domain::breakout::OutBreak;
use ecmlab_core::domain::partition::{ContribMap, MasterMseg};
use ecmlab_core::measure::{AdoptScheme, Measure};
use ecmlab_core::package::MeasurePackage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// File-safe form of a measure name.
pub fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Output directory layout, created on construction.
pub struct OutputDirs {
    root: PathBuf,
    measures: PathBuf,
    competition: PathBuf,
}

impl OutputDirs {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, OutputError> {
        let root = root.as_ref().to_path_buf();
        let measures = root.join("measures");
        let competition = root.join("competition");
        for dir in [&root, &measures, &competition] {
            std::fs::create_dir_all(dir).map_err(|source| OutputError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(OutputDirs {
            root,
            measures,
            competition,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn measure_path(&self, name: &str) -> PathBuf {
        self.measures.join(format!("{}.json", slug(name)))
    }

    pub fn competition_path(&self, name: &str) -> PathBuf {
        self.competition.join(format!("{}.json", slug(name)))
    }

    /// Both per-measure documents exist.
    pub fn measure_outputs_present(&self, name: &str) -> bool {
        self.measure_path(name).exists() && self.competition_path(name).exists()
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| OutputError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, OutputError> {
    let text = std::fs::read_to_string(path).map_err(|source| OutputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| OutputError::Serialize {
        path: path.to_path_buf(),
        source,
    })
}

/// Persist the full filled measure for later reuse.
pub fn write_measure(dirs: &OutputDirs, measure: &Measure) -> Result<(), OutputError> {
    write_json(&dirs.measure_path(&measure.def.name), measure)
}

/// Read a previously filled measure back (fingerprint-fresh reuse).
pub fn read_measure(dirs: &OutputDirs, name: &str) -> Result<Measure, OutputError> {
    read_json(&dirs.measure_path(name))
}

/// Contributing records and choice parameters, per adoption scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionDoc {
    pub name: String,
    pub contributing: BTreeMap<AdoptScheme, ContribMap>,
}

pub fn write_competition(dirs: &OutputDirs, measure: &Measure) -> Result<(), OutputError> {
    let doc = CompetitionDoc {
        name: measure.def.name.clone(),
        contributing: measure
            .markets
            .iter()
            .map(|(s, m)| (*s, m.contributing.clone()))
            .collect(),
    };
    write_json(&dirs.competition_path(&measure.def.name), &doc)
}

/// Master totals and breakouts for one measure or package, with the
/// contributing and secondary intermediates stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryMarkets {
    pub master: MasterMseg,
    pub out_break: OutBreak,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub name: String,
    pub active: bool,
    pub key_chains: usize,
    pub markets: BTreeMap<AdoptScheme, SummaryMarkets>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryPackageEntry {
    pub name: String,
    /// Member measure names; member markets live in their own entries.
    pub members: Vec<String>,
    pub market_entry_year: u32,
    pub market_exit_year: u32,
    pub markets: BTreeMap<AdoptScheme, SummaryMarkets>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryDoc {
    pub measures: Vec<SummaryEntry>,
    pub packages: Vec<SummaryPackageEntry>,
    pub diagnostics: Diagnostics,
}

fn summary_markets(
    markets: &BTreeMap<AdoptScheme, ecmlab_core::measure::markets::SchemeMarkets>,
) -> BTreeMap<AdoptScheme, SummaryMarkets> {
    markets
        .iter()
        .map(|(s, m)| {
            (
                *s,
                SummaryMarkets {
                    master: m.master.clone(),
                    out_break: m.out_break.clone(),
                },
            )
        })
        .collect()
}

pub fn write_summary(
    dirs: &OutputDirs,
    measures: &[Measure],
    packages: &[MeasurePackage],
    diagnostics: &Diagnostics,
) -> Result<(), OutputError> {
    let doc = SummaryDoc {
        measures: measures
            .iter()
            .map(|m| SummaryEntry {
                name: m.def.name.clone(),
                active: m.key_chain_count > 0,
                key_chains: m.key_chain_count,
                markets: summary_markets(&m.markets),
            })
            .collect(),
        packages: packages
            .iter()
            .map(|p| SummaryPackageEntry {
                name: p.name.clone(),
                members: p.member_names.clone(),
                market_entry_year: p.market_entry_year,
                market_exit_year: p.market_exit_year,
                markets: summary_markets(&p.markets),
            })
            .collect(),
        diagnostics: diagnostics.clone(),
    };
    write_json(&dirs.root.join(SUMMARY_FILE), &doc)
}
