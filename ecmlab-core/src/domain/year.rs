//! Modeling-year horizon and dense year-indexed series.
//!
//! The market-update engine is a year-sequential scan; every quantity it
//! carries is a series aligned to one shared [`Horizon`]. Series serialize
//! as `"year" -> value` maps so the persisted documents stay readable and
//! diff-friendly.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Inclusive range of modeling years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    pub start: u32,
    pub end: u32,
}

impl Horizon {
    /// `start` and `end` are inclusive; reversed bounds are a caller bug.
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "horizon start must not exceed end");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn first(&self) -> u32 {
        self.start
    }

    pub fn last(&self) -> u32 {
        self.end
    }

    pub fn contains(&self, year: u32) -> bool {
        year >= self.start && year <= self.end
    }

    pub fn years(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }

    pub fn index_of(&self, year: u32) -> Option<usize> {
        if self.contains(year) {
            Some((year - self.start) as usize)
        } else {
            None
        }
    }
}

/// Dense series of `f64` values, one per horizon year.
///
/// Out-of-horizon reads return 0.0 and out-of-horizon writes are ignored;
/// the engine only ever addresses horizon years, and a total accessor keeps
/// the year loop free of per-access error plumbing.
#[derive(Debug, Clone, PartialEq)]
pub struct YearSeries {
    start: u32,
    values: Vec<f64>,
}

impl YearSeries {
    pub fn zeros(horizon: Horizon) -> Self {
        Self {
            start: horizon.start,
            values: vec![0.0; horizon.len()],
        }
    }

    pub fn splat(horizon: Horizon, value: f64) -> Self {
        Self {
            start: horizon.start,
            values: vec![value; horizon.len()],
        }
    }

    pub fn from_fn(horizon: Horizon, mut f: impl FnMut(u32) -> f64) -> Self {
        Self {
            start: horizon.start,
            values: horizon.years().map(|yr| f(yr)).collect(),
        }
    }

    /// Build from a sparse year map; years missing from the map are 0.0.
    pub fn from_map(horizon: Horizon, map: &BTreeMap<u32, f64>) -> Self {
        Self::from_fn(horizon, |yr| map.get(&yr).copied().unwrap_or(0.0))
    }

    pub fn horizon(&self) -> Horizon {
        Horizon {
            start: self.start,
            end: self.start + self.values.len() as u32 - 1,
        }
    }

    pub fn get(&self, year: u32) -> f64 {
        self.horizon()
            .index_of(year)
            .map(|i| self.values[i])
            .unwrap_or(0.0)
    }

    pub fn set(&mut self, year: u32, value: f64) {
        if let Some(i) = self.horizon().index_of(year) {
            self.values[i] = value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        let start = self.start;
        self.values
            .iter()
            .enumerate()
            .map(move |(i, v)| (start + i as u32, *v))
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            start: self.start,
            values: self.values.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Element-wise combine with another series on the same horizon.
    pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        debug_assert_eq!(self.start, other.start);
        debug_assert_eq!(self.values.len(), other.values.len());
        Self {
            start: self.start,
            values: self
                .values
                .iter()
                .zip(other.values.iter())
                .map(|(a, b)| f(*a, *b))
                .collect(),
        }
    }

    pub fn add_assign(&mut self, other: &Self) {
        debug_assert_eq!(self.start, other.start);
        for (a, b) in self.values.iter_mut().zip(other.values.iter()) {
            *a += *b;
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for v in &mut self.values {
            *v *= factor;
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        self.map(|v| v * factor)
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Clamp negative values to zero, returning how many were clamped.
    pub fn clamp_non_negative(&mut self) -> usize {
        let mut clamped = 0;
        for v in &mut self.values {
            if *v < 0.0 {
                *v = 0.0;
                clamped += 1;
            }
        }
        clamped
    }

    /// Divide element-wise by `denom`, mapping zero denominators to 0.0.
    pub fn normalized_by(&self, denom: &Self) -> Self {
        self.zip_with(denom, |a, b| if b != 0.0 { a / b } else { 0.0 })
    }
}

impl Serialize for YearSeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<String, f64> =
            self.iter().map(|(yr, v)| (yr.to_string(), v)).collect();
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for YearSeries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<String, f64>::deserialize(deserializer)?;
        let mut years = BTreeMap::new();
        for (k, v) in map {
            let yr: u32 = k
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid year key '{k}'")))?;
            years.insert(yr, v);
        }
        let (first, last) = match (years.keys().next(), years.keys().next_back()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return Err(D::Error::custom("empty year series")),
        };
        Ok(YearSeries::from_map(Horizon::new(first, last), &years))
    }
}
