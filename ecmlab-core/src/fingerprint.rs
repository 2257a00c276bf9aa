//! Freshness fingerprints.
//!
//! A measure's fingerprint hashes its definition together with every run
//! option that affects fill results. The runner refills a measure only
//! when the fingerprint differs from the one recorded in the registry.

use crate::measure::definition::MeasureDef;
use crate::measure::markets::AdoptScheme;
use serde::{Deserialize, Serialize};

/// Run options that change market-update results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintOptions {
    pub horizon_start: u32,
    pub horizon_end: u32,
    pub schemes: Vec<AdoptScheme>,
    pub retro_rate: f64,
    pub nsamples: u32,
    pub seed: u64,
}

/// Hex blake3 digest of the definition plus options.
pub fn measure_fingerprint(
    def: &MeasureDef,
    opts: &FingerprintOptions,
) -> Result<String, serde_json::Error> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&serde_json::to_vec(def)?);
    hasher.update(&serde_json::to_vec(opts)?);
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> MeasureDef {
        serde_json::from_str(
            r#"{
                "name": "m",
                "measure_type": "full service",
                "climate_zone": "all",
                "bldg_type": "all",
                "structure_type": "all",
                "fuel_type": "electricity",
                "end_use": "heating",
                "technology": "ASHP",
                "installed_cost": 1000.0,
                "cost_units": "2022$/unit",
                "energy_efficiency": 9.0,
                "energy_efficiency_units": "COP",
                "product_lifetime": 15.0
            }"#,
        )
        .unwrap()
    }

    fn opts() -> FingerprintOptions {
        FingerprintOptions {
            horizon_start: 2025,
            horizon_end: 2050,
            schemes: AdoptScheme::ALL.to_vec(),
            retro_rate: 0.0,
            nsamples: 100,
            seed: 0,
        }
    }

    #[test]
    fn stable_across_calls() {
        let a = measure_fingerprint(&def(), &opts()).unwrap();
        let b = measure_fingerprint(&def(), &opts()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn sensitive_to_definition_and_options() {
        let base = measure_fingerprint(&def(), &opts()).unwrap();
        let mut d = def();
        d.market_entry_year = Some(2030);
        assert_ne!(measure_fingerprint(&d, &opts()).unwrap(), base);
        let mut o = opts();
        o.retro_rate = 0.01;
        assert_ne!(measure_fingerprint(&def(), &o).unwrap(), base);
    }
}
