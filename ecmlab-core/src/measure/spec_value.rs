//! Performance/cost/lifetime specification values.
//!
//! A spec value in a measure definition is a point value, a year-keyed
//! series, a probability-distribution descriptor, or a map broken out by
//! context (building type, region, vintage, sub-technology, or an
//! `all residential`/`all commercial` sector key). Distribution sampling
//! happens once per measure, before market filling, with a seeded RNG so
//! repeat runs are deterministic.

use crate::domain::year::{Horizon, YearSeries};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution as _, Gamma, LogNormal, Normal, Triangular, Weibull};
use serde::de::{SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors raised while resolving a spec value for a particular key.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("unsupported distribution family '{0}'")]
    UnsupportedDistribution(String),
    #[error("invalid parameters for '{family}' distribution: {detail}")]
    BadParams { family: String, detail: String },
    #[error("no spec-value entry matches microsegment context '{0}'")]
    NoContextMatch(String),
    #[error("spec value must resolve to a point value, found nested breakout '{0}'")]
    NotScalar(String),
}

/// Probability distribution descriptor: family name plus positional
/// parameters, serialized as a flat list (`["normal", 10.0, 1.5]`).
#[derive(Debug, Clone, PartialEq)]
pub struct DistSpec {
    pub family: String,
    pub params: Vec<f64>,
}

impl DistSpec {
    /// Mean of `nsamples` seeded draws; the point value carried through the
    /// market update.
    pub fn sample_mean(&self, rng: &mut StdRng, nsamples: u32) -> Result<f64, SpecError> {
        let n = nsamples.max(1);
        let mut total = 0.0;
        for _ in 0..n {
            total += self.draw(rng)?;
        }
        Ok(total / n as f64)
    }

    fn draw(&self, rng: &mut StdRng) -> Result<f64, SpecError> {
        let bad = |detail: &str| SpecError::BadParams {
            family: self.family.clone(),
            detail: detail.to_string(),
        };
        match (self.family.as_str(), self.params.as_slice()) {
            ("normal", [mu, sigma]) => Ok(Normal::new(*mu, *sigma)
                .map_err(|e| bad(&e.to_string()))?
                .sample(rng)),
            ("lognormal", [mu, sigma]) => Ok(LogNormal::new(*mu, *sigma)
                .map_err(|e| bad(&e.to_string()))?
                .sample(rng)),
            ("uniform", [lo, hi]) => {
                if hi <= lo {
                    return Err(bad("upper bound must exceed lower bound"));
                }
                Ok(rng.gen_range(*lo..*hi))
            }
            ("gamma", [shape, scale]) => Ok(Gamma::new(*shape, *scale)
                .map_err(|e| bad(&e.to_string()))?
                .sample(rng)),
            ("weibull", [shape, scale]) => Ok(Weibull::new(*scale, *shape)
                .map_err(|e| bad(&e.to_string()))?
                .sample(rng)),
            ("triangular", [left, mode, right]) => Ok(Triangular::new(*left, *right, *mode)
                .map_err(|e| bad(&e.to_string()))?
                .sample(rng)),
            ("normal" | "lognormal" | "uniform" | "gamma" | "weibull", _) => {
                Err(bad("expected 2 parameters"))
            }
            ("triangular", _) => Err(bad("expected 3 parameters")),
            (other, _) => Err(SpecError::UnsupportedDistribution(other.to_string())),
        }
    }
}

impl Serialize for DistSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(1 + self.params.len()))?;
        seq.serialize_element(&self.family)?;
        for p in &self.params {
            seq.serialize_element(p)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for DistSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DistVisitor;
        impl<'de> Visitor<'de> for DistVisitor {
            type Value = DistSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a sequence starting with a distribution family name")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<DistSpec, A::Error> {
                let family: String = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::custom("missing distribution family"))?;
                let mut params = Vec::new();
                while let Some(p) = seq.next_element::<f64>()? {
                    params.push(p);
                }
                Ok(DistSpec { family, params })
            }
        }
        deserializer.deserialize_seq(DistVisitor)
    }
}

/// A measure-defined value for cost, performance, or lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecValue {
    Scalar(f64),
    Distribution(DistSpec),
    /// Year map (all keys parse as years) or a context breakout.
    Breakout(BTreeMap<String, SpecValue>),
}

/// The microsegment attributes a context breakout may key on.
#[derive(Debug, Clone, Copy)]
pub struct SpecCtx<'a> {
    pub region: &'a str,
    pub bldg_type: &'a str,
    pub sector: &'a str,
    pub vintage: &'a str,
    pub fuel: &'a str,
    pub end_use: &'a str,
    pub technology: Option<&'a str>,
}

impl SpecCtx<'_> {
    fn matches(&self, key: &str) -> bool {
        if key == self.region
            || key == self.bldg_type
            || key == self.vintage
            || key == self.fuel
            || key == self.end_use
        {
            return true;
        }
        if let Some(tech) = self.technology {
            if key == tech {
                return true;
            }
        }
        // Sector keys used when a cost/performance value is broken out only
        // by building sector ("all residential": 25.0).
        key == format!("all {}", self.sector)
    }

    fn describe(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}",
            self.region,
            self.bldg_type,
            self.fuel,
            self.end_use,
            self.technology.unwrap_or("-"),
            self.vintage
        )
    }
}

fn is_year_map(map: &BTreeMap<String, SpecValue>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.parse::<u32>().is_ok())
}

impl SpecValue {
    /// Resolve to a point value for the given microsegment, descending
    /// context breakouts and sampling any distribution.
    pub fn resolve_scalar(
        &self,
        ctx: &SpecCtx,
        rng: &mut StdRng,
        nsamples: u32,
    ) -> Result<f64, SpecError> {
        match self {
            SpecValue::Scalar(v) => Ok(*v),
            SpecValue::Distribution(d) => d.sample_mean(rng, nsamples),
            SpecValue::Breakout(map) => {
                if is_year_map(map) {
                    return Err(SpecError::NotScalar("year-keyed value".into()));
                }
                self.descend(map, ctx)?.resolve_scalar(ctx, rng, nsamples)
            }
        }
    }

    /// Resolve to a full year series (point values are broadcast).
    pub fn resolve_series(
        &self,
        ctx: &SpecCtx,
        horizon: Horizon,
        rng: &mut StdRng,
        nsamples: u32,
    ) -> Result<YearSeries, SpecError> {
        match self {
            SpecValue::Scalar(v) => Ok(YearSeries::splat(horizon, *v)),
            SpecValue::Distribution(d) => {
                Ok(YearSeries::splat(horizon, d.sample_mean(rng, nsamples)?))
            }
            SpecValue::Breakout(map) => {
                if is_year_map(map) {
                    let mut series = YearSeries::zeros(horizon);
                    let mut last = 0.0;
                    for yr in horizon.years() {
                        if let Some(v) = map.get(&yr.to_string()) {
                            last = v.resolve_scalar(ctx, rng, nsamples)?;
                        }
                        series.set(yr, last);
                    }
                    Ok(series)
                } else {
                    self.descend(map, ctx)?
                        .resolve_series(ctx, horizon, rng, nsamples)
                }
            }
        }
    }

    fn descend<'m>(
        &self,
        map: &'m BTreeMap<String, SpecValue>,
        ctx: &SpecCtx,
    ) -> Result<&'m SpecValue, SpecError> {
        map.iter()
            .find(|(k, _)| ctx.matches(k))
            .map(|(_, v)| v)
            .ok_or_else(|| SpecError::NoContextMatch(ctx.describe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn ctx<'a>() -> SpecCtx<'a> {
        SpecCtx {
            region: "AIA_CZ1",
            bldg_type: "single family home",
            sector: "residential",
            vintage: "existing",
            fuel: "electricity",
            end_use: "heating",
            technology: Some("ASHP"),
        }
    }

    #[test]
    fn scalar_and_year_map_resolution() {
        let v: SpecValue = serde_json::from_str("25.0").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(v.resolve_scalar(&ctx(), &mut rng, 10).unwrap(), 25.0);

        let h = Horizon::new(2025, 2027);
        let v: SpecValue = serde_json::from_str(r#"{"2025": 1.0, "2027": 3.0}"#).unwrap();
        let s = v.resolve_series(&ctx(), h, &mut rng, 10).unwrap();
        assert_eq!(s.get(2025), 1.0);
        // Missing interior years carry the last specified value forward.
        assert_eq!(s.get(2026), 1.0);
        assert_eq!(s.get(2027), 3.0);
    }

    #[test]
    fn context_breakout_resolution() {
        let v: SpecValue = serde_json::from_str(
            r#"{"all residential": 10.0, "all commercial": 20.0}"#,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(v.resolve_scalar(&ctx(), &mut rng, 10).unwrap(), 10.0);

        let v: SpecValue =
            serde_json::from_str(r#"{"new": 5.0, "existing": 7.0}"#).unwrap();
        assert_eq!(v.resolve_scalar(&ctx(), &mut rng, 10).unwrap(), 7.0);
    }

    #[test]
    fn missing_context_is_an_error() {
        let v: SpecValue = serde_json::from_str(r#"{"mobile home": 4.0}"#).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            v.resolve_scalar(&ctx(), &mut rng, 10),
            Err(SpecError::NoContextMatch(_))
        ));
    }

    #[test]
    fn distribution_sampling_is_seed_deterministic() {
        let v: SpecValue = serde_json::from_str(r#"["normal", 10.0, 1.0]"#).unwrap();
        let a = v
            .resolve_scalar(&ctx(), &mut StdRng::seed_from_u64(7), 50)
            .unwrap();
        let b = v
            .resolve_scalar(&ctx(), &mut StdRng::seed_from_u64(7), 50)
            .unwrap();
        assert_eq!(a, b);
        assert!((a - 10.0).abs() < 1.0);
    }

    #[test]
    fn unsupported_distribution_is_rejected() {
        let v: SpecValue = serde_json::from_str(r#"["cauchy", 0.0, 1.0]"#).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            v.resolve_scalar(&ctx(), &mut rng, 10),
            Err(SpecError::UnsupportedDistribution(_))
        ));
    }
}
