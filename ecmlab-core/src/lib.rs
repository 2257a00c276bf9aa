//! Core engine for efficiency-measure market preparation.
//!
//! - [`domain`]: year series, microsegment keys, partitions, breakouts
//! - [`baseline`]: baseline stock/energy database and dimension maps
//! - [`measure`]: measure definitions, spec values, filled markets
//! - [`engine`]: key-chain expansion, stock turnover, the fill driver
//! - [`package`]: merging member measures into packages
//! - [`convert`] / [`tsv`]: cost-unit and time-sensitive reweighting tables
//! - [`diagnostics`] / [`fingerprint`]: run warnings and freshness hashes
//!
//! The crate performs no file I/O outside its tests; the runner crate owns
//! loading and persistence.

pub mod baseline;
pub mod convert;
pub mod diagnostics;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod measure;
pub mod package;
pub mod tsv;

pub use baseline::{BaselineDb, DimensionMaps, EnergyFactors};
pub use diagnostics::Diagnostics;
pub use domain::key::MsegKey;
pub use domain::year::{Horizon, YearSeries};
pub use engine::{fill_measure, EngineCtx, FillError};
pub use fingerprint::{measure_fingerprint, FingerprintOptions};
pub use measure::{AdoptScheme, Measure, MeasureDef};
pub use package::{merge_package, MeasurePackage, PackageDef, PackageError};
