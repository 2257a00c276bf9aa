//! Serde model for measure definition files.
//!
//! Definitions are authored as JSON. Applicability fields accept a single
//! value, a list, or the literal `"all"`; fields that can differ between a
//! measure's primary and secondary microsegments accept either a plain
//! value or a `{"primary": ..., "secondary": ...}` split.

use crate::measure::spec_value::SpecValue;
use crate::tsv::TsvFeatures;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DefError {
    #[error("measure '{name}': missing required field '{field}'")]
    MissingField { name: String, field: String },
    #[error("measure '{name}': market scaling fraction carries no usable source (no url and no derivation)")]
    UnverifiableScaling { name: String },
}

/// Whether the measure replaces the baseline technology outright or is
/// installed on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasureType {
    #[serde(rename = "full service")]
    FullService,
    #[serde(rename = "add-on")]
    AddOn,
}

/// An applicability field: one value, several, or every valid value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    One(String),
    Many(Vec<String>),
}

impl FieldSpec {
    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldSpec::One(s) => vec![s.as_str()],
            FieldSpec::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }

    /// True when the field names every valid value, either as the literal
    /// `"all"` or a sector-qualified form like `"all residential"`.
    pub fn all_selector(&self) -> Option<&str> {
        match self {
            FieldSpec::One(s) if s == "all" || s.starts_with("all ") => Some(s),
            _ => None,
        }
    }
}

/// A field that may be split into primary and secondary values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimarySecondary<T> {
    Split {
        primary: T,
        secondary: Option<T>,
    },
    Plain(T),
}

impl<T> PrimarySecondary<T> {
    pub fn primary(&self) -> &T {
        match self {
            PrimarySecondary::Plain(v) => v,
            PrimarySecondary::Split { primary, .. } => primary,
        }
    }

    pub fn secondary(&self) -> Option<&T> {
        match self {
            PrimarySecondary::Plain(_) => None,
            PrimarySecondary::Split { secondary, .. } => secondary.as_ref(),
        }
    }
}

/// Citation attached to a market scaling fraction. A fraction is only
/// retained when its source carries a URL or a derivation note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScalingSource {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub fraction_derivation: Option<String>,
}

impl ScalingSource {
    pub fn is_usable(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
            || self
                .fraction_derivation
                .as_deref()
                .is_some_and(|d| !d.is_empty())
    }
}

/// A measure definition as authored, before any market filling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureDef {
    pub name: String,
    pub measure_type: MeasureType,
    pub climate_zone: FieldSpec,
    pub bldg_type: FieldSpec,
    pub structure_type: FieldSpec,
    pub fuel_type: PrimarySecondary<FieldSpec>,
    pub end_use: PrimarySecondary<FieldSpec>,
    pub technology: PrimarySecondary<Option<FieldSpec>>,
    pub installed_cost: SpecValue,
    pub cost_units: String,
    pub energy_efficiency: PrimarySecondary<SpecValue>,
    pub energy_efficiency_units: PrimarySecondary<String>,
    pub product_lifetime: SpecValue,
    #[serde(default)]
    pub market_entry_year: Option<u32>,
    #[serde(default)]
    pub market_exit_year: Option<u32>,
    #[serde(default)]
    pub fuel_switch_to: Option<String>,
    #[serde(default)]
    pub tech_switch_to: Option<String>,
    #[serde(default)]
    pub market_scaling_fractions: Option<SpecValue>,
    #[serde(default)]
    pub market_scaling_fractions_source: Option<ScalingSource>,
    #[serde(default)]
    pub tsv_features: Option<TsvFeatures>,
}

impl MeasureDef {
    /// Structural checks that do not need baseline data.
    pub fn validate(&self) -> Result<(), DefError> {
        if self.name.trim().is_empty() {
            return Err(DefError::MissingField {
                name: "<unnamed>".into(),
                field: "name".into(),
            });
        }
        if self.cost_units.trim().is_empty() {
            return Err(DefError::MissingField {
                name: self.name.clone(),
                field: "cost_units".into(),
            });
        }
        Ok(())
    }

    /// True when the scaling fraction must be dropped for lack of a source.
    pub fn scaling_unverifiable(&self) -> bool {
        self.market_scaling_fractions.is_some()
            && !self
                .market_scaling_fractions_source
                .as_ref()
                .is_some_and(ScalingSource::is_usable)
    }

    pub fn is_add_on(&self) -> bool {
        self.measure_type == MeasureType::AddOn
    }
}
