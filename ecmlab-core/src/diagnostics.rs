//! Run diagnostics collector.
//!
//! Warnings are deduplicated by kind: the first occurrence keeps its
//! detail string, later ones only bump the count, so a clamp that fires in
//! ten thousand year-cells reports once. Collectors from parallel workers
//! merge into one at the join.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WarnKind {
    /// Negative stock/energy/carbon/cost value clamped to zero.
    NegativeClamped,
    /// Residential choice parameters missing or invalid, defaults used.
    ChoiceDefaultsUsed,
    /// Commercial time-preference distribution missing, heating used.
    TimePrefFallback,
    /// Market scaling fraction dropped for lack of a usable source.
    ScalingSourceDropped,
    /// Secondary key had no primary accumulator to derive fractions from.
    SecondaryUnanchored,
    /// Captured stock exceeded total stock and was clamped.
    CapturedExceedsTotal,
    /// Baseline microsegment missing for an expanded key chain.
    BaselineKeyMissing,
    /// Merged heating and cooling keys on one equipment footprint carry
    /// different turnover schedules.
    LinkedTurnoverMismatch,
}

impl WarnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarnKind::NegativeClamped => "negative value clamped to zero",
            WarnKind::ChoiceDefaultsUsed => "residential choice defaults substituted",
            WarnKind::TimePrefFallback => "commercial time-preference heating fallback",
            WarnKind::ScalingSourceDropped => "market scaling fraction dropped (no source)",
            WarnKind::SecondaryUnanchored => "secondary key without primary accumulator",
            WarnKind::CapturedExceedsTotal => "captured stock clamped to total",
            WarnKind::BaselineKeyMissing => "baseline data missing for key chain",
            WarnKind::LinkedTurnoverMismatch => {
                "linked heating/cooling keys turn over at different rates"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarnEntry {
    pub count: u64,
    /// Detail from the first occurrence.
    pub detail: String,
}

/// A measure dropped from the run, by name, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedMeasure {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub warnings: BTreeMap<WarnKind, WarnEntry>,
    pub skipped: Vec<SkippedMeasure>,
    pub notes: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, kind: WarnKind, detail: impl Into<String>) {
        self.warnings
            .entry(kind)
            .and_modify(|e| e.count += 1)
            .or_insert_with(|| WarnEntry {
                count: 1,
                detail: detail.into(),
            });
    }

    /// Bump a warning by a pre-aggregated count (clamp counters).
    pub fn warn_n(&mut self, kind: WarnKind, n: u64, detail: impl Into<String>) {
        if n == 0 {
            return;
        }
        self.warnings
            .entry(kind)
            .and_modify(|e| e.count += n)
            .or_insert_with(|| WarnEntry {
                count: n,
                detail: detail.into(),
            });
    }

    pub fn skip(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedMeasure {
            name: name.into(),
            reason: reason.into(),
        });
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn merge(&mut self, other: Diagnostics) {
        for (kind, entry) in other.warnings {
            self.warnings
                .entry(kind)
                .and_modify(|e| e.count += entry.count)
                .or_insert(entry);
        }
        self.skipped.extend(other.skipped);
        self.notes.extend(other.notes);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.skipped.is_empty()
    }
}
