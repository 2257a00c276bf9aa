//! Measure definitions and their filled markets.

pub mod definition;
pub mod markets;
pub mod spec_value;

pub use definition::{DefError, FieldSpec, MeasureDef, MeasureType, PrimarySecondary, ScalingSource};
pub use markets::{AdoptScheme, Markets, Measure, SchemeMarkets};
pub use spec_value::{DistSpec, SpecCtx, SpecError, SpecValue};
