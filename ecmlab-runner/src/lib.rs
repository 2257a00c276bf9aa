//! ECMLab Runner — measure-preparation orchestration.
//!
//! This crate builds on `ecmlab-core` to provide:
//! - TOML run configuration with path rebasing and validation
//! - JSON input loading (baseline, factors, conversions, measures, packages)
//! - Fingerprint-based freshness so unchanged measures are not refilled
//! - Parallel measure fills with per-measure skip records
//! - Package merging strictly after the fill join
//! - Summary, competition, and registry output documents

pub mod config;
pub mod loader;
pub mod output;
pub mod prepare;
pub mod registry;

pub use config::{ConfigError, PathsConfig, RunConfig, RunOptions};
pub use loader::{load_inputs, load_measures, load_packages, BaselineDoc, LoadError, RunInputs};
pub use output::{
    read_measure, slug, write_competition, write_measure, write_summary, CompetitionDoc,
    OutputDirs, OutputError, SummaryDoc,
};
pub use prepare::{fill_batch, prepare_packages, prepare_run, PrepError, RunReport};
pub use registry::{RegistryEntry, RegistryError, RunRegistry, REGISTRY_FILE};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_and_registry_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<RunRegistry>();
        assert_sync::<RunRegistry>();
    }

    #[test]
    fn run_report_is_send() {
        assert_send::<RunReport>();
    }
}
