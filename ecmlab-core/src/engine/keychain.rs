//! Applicability expansion.
//!
//! A measure's region/building/vintage/fuel/end-use/technology fields are
//! resolved against the key chains actually present in the baseline
//! database. Secondary chains (demand-side heating/cooling affected by a
//! primary end use) come from the declared secondary fields, or are added
//! automatically for commercial lighting measures via the "lighting gain"
//! technology.

use crate::baseline::BaselineDb;
use crate::baseline::DimensionMaps;
use crate::domain::key::{BldgSector, MsegKey, Scope, TechType, Vintage};
use crate::measure::definition::{FieldSpec, MeasureDef};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicabilityError {
    #[error("measure '{name}': no baseline key chains match its applicability")]
    NoMatches { name: String },
    #[error("measure '{name}': building type '{bldg_type}' is unclassified")]
    UnknownBldgType { name: String, bldg_type: String },
}

fn field_matches(spec: &FieldSpec, value: &str, sector: BldgSector) -> bool {
    if let Some(sel) = spec.all_selector() {
        return match sel {
            "all" => true,
            "all residential" => sector == BldgSector::Residential,
            "all commercial" => sector == BldgSector::Commercial,
            _ => false,
        };
    }
    spec.values().contains(&value)
}

fn vintage_matches(spec: &FieldSpec, vintage: Vintage) -> bool {
    spec.all_selector().is_some() || spec.values().contains(&vintage.as_str())
}

fn tech_matches(spec: Option<&FieldSpec>, tech: Option<&str>) -> bool {
    match (spec, tech) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(s), _) if s.all_selector().is_some() => true,
        (Some(s), Some(t)) => s.values().contains(&t),
        (Some(_), None) => false,
    }
}

/// Expand the primary key chains for a measure.
pub fn expand_primary(
    def: &MeasureDef,
    db: &BaselineDb,
    maps: &DimensionMaps,
) -> Result<Vec<MsegKey>, ApplicabilityError> {
    let mut chains = Vec::new();
    for key in db.keys() {
        let sector = maps
            .sector(&key.bldg_type)
            .map_err(|_| ApplicabilityError::UnknownBldgType {
                name: def.name.clone(),
                bldg_type: key.bldg_type.clone(),
            })?;
        if !field_matches(&def.climate_zone, &key.region, sector)
            || !field_matches(&def.bldg_type, &key.bldg_type, sector)
            || !vintage_matches(&def.structure_type, key.vintage)
            || !field_matches(def.fuel_type.primary(), &key.fuel, sector)
            || !field_matches(def.end_use.primary(), &key.end_use, sector)
            || !tech_matches(
                def.technology.primary().as_ref(),
                key.technology.as_deref(),
            )
        {
            continue;
        }
        chains.push(key.clone());
    }
    if chains.is_empty() {
        return Err(ApplicabilityError::NoMatches {
            name: def.name.clone(),
        });
    }
    Ok(chains)
}

/// Expand the secondary key chains: declared split fields first, else the
/// automatic commercial-lighting case.
pub fn expand_secondary(
    def: &MeasureDef,
    db: &BaselineDb,
    maps: &DimensionMaps,
    primary: &[MsegKey],
) -> Vec<MsegKey> {
    let declared = def.end_use.secondary();
    let auto_lighting = declared.is_none()
        && def.end_use.primary().values().contains(&"lighting")
        && primary
            .iter()
            .any(|k| matches!(maps.sector(&k.bldg_type), Ok(BldgSector::Commercial)));
    if declared.is_none() && !auto_lighting {
        return Vec::new();
    }

    let end_uses: Vec<&str> = match declared {
        Some(spec) => spec.values(),
        None => vec!["heating", "cooling"],
    };
    let fuels = def.fuel_type.secondary().unwrap_or_else(|| def.fuel_type.primary());
    let techs: Option<&FieldSpec> = match def.technology.secondary() {
        Some(t) => t.as_ref(),
        None => None,
    };

    // Secondary chains live on the (region, building, vintage) footprint of
    // the primary chains.
    let mut chains = Vec::new();
    for key in db.keys() {
        if key.tech_type != Some(TechType::Demand) {
            continue;
        }
        let sector = match maps.sector(&key.bldg_type) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let in_footprint = primary.iter().any(|p| {
            p.region == key.region && p.bldg_type == key.bldg_type && p.vintage == key.vintage
        });
        if !in_footprint || !end_uses.contains(&key.end_use.as_str()) {
            continue;
        }
        if !field_matches(fuels, &key.fuel, sector) {
            continue;
        }
        let tech_ok = if auto_lighting {
            key.technology.as_deref() == Some("lighting gain")
        } else {
            tech_matches(techs, key.technology.as_deref())
        };
        if !tech_ok {
            continue;
        }
        chains.push(MsegKey {
            scope: Scope::Secondary,
            ..key.clone()
        });
    }
    chains
}
