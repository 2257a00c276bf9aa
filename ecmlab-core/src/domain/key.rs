//! Microsegment key — the identity of one concrete baseline market slice.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a key chain describes a directly affected baseline market or an
/// indirectly affected one (e.g. heating load changed by a lighting measure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Primary,
    Secondary,
}

/// Supply-side vs demand-side variant of a heating/cooling technology
/// (e.g. ASHP vs envelope air sealing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechType {
    Supply,
    Demand,
}

/// Building vintage the key applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vintage {
    New,
    Existing,
}

impl Vintage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vintage::New => "new",
            Vintage::Existing => "existing",
        }
    }
}

/// Building sector, classified from the building type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BldgSector {
    Residential,
    Commercial,
}

impl BldgSector {
    pub fn as_str(&self) -> &'static str {
        match self {
            BldgSector::Residential => "residential",
            BldgSector::Commercial => "commercial",
        }
    }
}

/// End uses whose key chains carry the extra supply/demand element.
pub const HEAT_COOL_END_USES: [&str; 3] = ["heating", "secondary heating", "cooling"];

pub fn is_heat_cool_end_use(end_use: &str) -> bool {
    HEAT_COOL_END_USES.contains(&end_use)
}

/// Ordered tuple identifying one market microsegment.
///
/// Downstream consumers render output in key-insertion order, so keys are
/// kept in ordered containers by the engine; `Ord` here exists for the
/// deterministic maps used in persisted documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MsegKey {
    pub scope: Scope,
    pub region: String,
    pub bldg_type: String,
    pub fuel: String,
    pub end_use: String,
    /// Present only for heating/cooling end uses.
    pub tech_type: Option<TechType>,
    /// `None` for end uses with no technology breakdown.
    pub technology: Option<String>,
    pub vintage: Vintage,
}

impl MsegKey {
    pub fn is_heat_cool(&self) -> bool {
        is_heat_cool_end_use(&self.end_use)
    }

    pub fn is_supply(&self) -> bool {
        // Non-heating/cooling end uses have no supply/demand split and
        // behave as supply-side equipment for choice-parameter purposes.
        self.tech_type != Some(TechType::Demand)
    }

    /// Key under which this microsegment is registered for competition.
    ///
    /// 'windows solar' and 'windows conduction' collapse to 'windows' so the
    /// two load components of one physical window compete (and merge) as a
    /// single contributing microsegment.
    pub fn contrib_key(&self) -> MsegKey {
        let mut key = self.clone();
        if let Some(tech) = &key.technology {
            if tech.contains("windows") {
                key.technology = Some("windows".to_string());
            }
        }
        key
    }

    /// Canonical string form used as a map key in persisted documents.
    pub fn doc_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MsegKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.scope {
            Scope::Primary => "primary",
            Scope::Secondary => "secondary",
        };
        write!(f, "{scope}|{}|{}|{}|{}", self.region, self.bldg_type, self.fuel, self.end_use)?;
        if let Some(tt) = self.tech_type {
            let tt = match tt {
                TechType::Supply => "supply",
                TechType::Demand => "demand",
            };
            write!(f, "|{tt}")?;
        }
        match &self.technology {
            Some(t) => write!(f, "|{t}")?,
            None => write!(f, "|-")?,
        }
        write!(f, "|{}", self.vintage.as_str())
    }
}
