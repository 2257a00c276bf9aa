//! Linked heating/cooling turnover.
//!
//! When one measure spans heating and cooling supply technologies on the
//! same (region, building type, fuel, vintage) footprint, the physical
//! unit is a single piece of equipment. One anchor technology is chosen by
//! a fixed priority ordering and its turnover schedule is reused for every
//! linked key so the unit does not turn over once per end use.

use crate::domain::key::{MsegKey, Scope, TechType, Vintage};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LinkGroupKey {
    pub region: String,
    pub bldg_type: String,
    pub fuel: String,
    pub vintage: Vintage,
}

impl LinkGroupKey {
    fn of(key: &MsegKey) -> Self {
        LinkGroupKey {
            region: key.region.clone(),
            bldg_type: key.bldg_type.clone(),
            fuel: key.fuel.clone(),
            vintage: key.vintage,
        }
    }
}

fn linkable(key: &MsegKey) -> bool {
    key.scope == Scope::Primary && key.tech_type != Some(TechType::Demand) && key.is_heat_cool()
}

/// Anchor assignments for the linked groups found in a chain set.
#[derive(Debug, Clone, Default)]
pub struct LinkGroups {
    anchors: BTreeMap<LinkGroupKey, MsegKey>,
}

impl LinkGroups {
    /// Detect groups spanning heating and cooling, and pick each group's
    /// anchor: the heating technology earliest in `anchor_priority`, else
    /// the first heating key encountered.
    pub fn detect(chains: &[MsegKey], anchor_priority: &[String]) -> Self {
        let mut by_group: BTreeMap<LinkGroupKey, Vec<&MsegKey>> = BTreeMap::new();
        for key in chains.iter().filter(|k| linkable(k)) {
            by_group.entry(LinkGroupKey::of(key)).or_default().push(key);
        }

        let mut anchors = BTreeMap::new();
        for (group, keys) in by_group {
            let has_heating = keys.iter().any(|k| k.end_use != "cooling");
            let has_cooling = keys.iter().any(|k| k.end_use == "cooling");
            if !has_heating || !has_cooling {
                continue;
            }
            let rank = |k: &MsegKey| {
                k.technology
                    .as_deref()
                    .and_then(|t| anchor_priority.iter().position(|p| p == t))
                    .unwrap_or(usize::MAX)
            };
            let anchor = keys
                .iter()
                .filter(|k| k.end_use != "cooling")
                .min_by_key(|k| rank(k));
            if let Some(anchor) = anchor {
                anchors.insert(group, (*anchor).clone());
            }
        }
        LinkGroups { anchors }
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// The group a key belongs to, if it is part of a linked pair.
    pub fn group_of(&self, key: &MsegKey) -> Option<&LinkGroupKey> {
        if !linkable(key) {
            return None;
        }
        let group = LinkGroupKey::of(key);
        self.anchors.get_key_value(&group).map(|(k, _)| k)
    }

    pub fn anchors(&self) -> impl Iterator<Item = (&LinkGroupKey, &MsegKey)> {
        self.anchors.iter()
    }

    pub fn anchor_of(&self, group: &LinkGroupKey) -> Option<&MsegKey> {
        self.anchors.get(group)
    }
}
