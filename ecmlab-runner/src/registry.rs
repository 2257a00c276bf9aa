//! Run registry: which measures are prepared, under which fingerprint.
//!
//! The registry is a JSON document in the output directory. A measure is
//! refilled only when its fingerprint changed, its outputs are missing,
//! or the run forces a refresh.

use chrono::{DateTime, Utc};
use ecmlab_core::diagnostics::SkippedMeasure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const REGISTRY_FILE: &str = "run_registry.json";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cannot read registry {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse registry {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write registry {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One prepared measure's registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub fingerprint: String,
    pub updated_at: DateTime<Utc>,
    /// False when the measure's market window misses the horizon.
    pub active: bool,
    pub key_chains: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRegistry {
    pub measures: BTreeMap<String, RegistryEntry>,
    /// Measures dropped in the most recent run, with reasons.
    #[serde(default)]
    pub skipped: Vec<SkippedMeasure>,
}

impl RunRegistry {
    /// Load the registry from the output directory; a missing file is an
    /// empty registry, not an error.
    pub fn load(output_dir: &Path) -> Result<Self, RegistryError> {
        let path = output_dir.join(REGISTRY_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RunRegistry::default())
            }
            Err(source) => return Err(RegistryError::Read { path, source }),
        };
        serde_json::from_str(&text).map_err(|source| RegistryError::Parse { path, source })
    }

    pub fn save(&self, output_dir: &Path) -> Result<(), RegistryError> {
        let path = output_dir.join(REGISTRY_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|source| {
            RegistryError::Parse {
                path: path.clone(),
                source,
            }
        })?;
        std::fs::write(&path, json).map_err(|source| RegistryError::Write { path, source })
    }

    /// Whether a measure must be (re)filled this run.
    pub fn needs_update(&self, name: &str, fingerprint: &str, outputs_present: bool) -> bool {
        if !outputs_present {
            return true;
        }
        match self.measures.get(name) {
            Some(entry) => entry.fingerprint != fingerprint,
            None => true,
        }
    }

    pub fn record(&mut self, name: &str, fingerprint: &str, active: bool, key_chains: usize) {
        self.measures.insert(
            name.to_string(),
            RegistryEntry {
                fingerprint: fingerprint.to_string(),
                updated_at: Utc::now(),
                active,
                key_chains,
            },
        );
    }

    pub fn record_skipped(&mut self, skipped: Vec<SkippedMeasure>) {
        self.skipped = skipped;
    }

    pub fn active_count(&self) -> usize {
        self.measures.values().filter(|e| e.active).count()
    }

    pub fn inactive_count(&self) -> usize {
        self.measures.values().filter(|e| !e.active).count()
    }
}
