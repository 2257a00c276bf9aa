//! Shared fixtures: a small baseline database and engine context covering
//! residential supply, envelope, and commercial lighting microsegments.

use ecmlab_core::baseline::{
    BaselineDb, BaselineRecord, BldgStockRecord, CplChoice, CplRecord, DimensionMaps,
    EnergyFactors, EnergyFactorsRecord,
};
use ecmlab_core::convert::CostConverter;
use ecmlab_core::domain::key::{TechType, Vintage};
use ecmlab_core::domain::year::Horizon;
use ecmlab_core::engine::EngineCtx;
use ecmlab_core::measure::MeasureDef;
use std::collections::BTreeMap;

pub fn horizon() -> Horizon {
    Horizon::new(2025, 2029)
}

pub fn flat(v: f64) -> BTreeMap<u32, f64> {
    horizon().years().map(|y| (y, v)).collect()
}

fn cpl(cost: f64, perf: f64, units: &str, life: f64, choice: bool) -> CplRecord {
    CplRecord {
        cost: flat(cost),
        cost_units: "2022$/unit".into(),
        performance: flat(perf),
        performance_units: units.into(),
        lifetime: flat(life),
        consumer_choice: choice.then(|| CplChoice {
            b1: flat(-0.005),
            b2: flat(-0.01),
        }),
    }
}

#[allow(clippy::too_many_arguments)]
fn record(
    bldg: &str,
    fuel: &str,
    end_use: &str,
    tech_type: Option<TechType>,
    tech: Option<&str>,
    vintage: Vintage,
    stock: Option<f64>,
    energy: f64,
    cpl: Option<CplRecord>,
) -> BaselineRecord {
    BaselineRecord {
        region: "AIA_CZ1".into(),
        bldg_type: bldg.into(),
        fuel: fuel.into(),
        end_use: end_use.into(),
        tech_type,
        technology: tech.map(String::from),
        vintage,
        stock: stock.map(flat),
        energy: flat(energy),
        cpl,
    }
}

pub fn baseline_db() -> BaselineDb {
    let sfh = "single family home";
    let records = vec![
        // Residential electric heat pump heating, supply side.
        record(
            sfh,
            "electricity",
            "heating",
            Some(TechType::Supply),
            Some("ASHP"),
            Vintage::Existing,
            Some(100.0),
            50.0,
            Some(cpl(100.0, 3.0, "COP", 10.0, true)),
        ),
        record(
            sfh,
            "electricity",
            "heating",
            Some(TechType::Supply),
            Some("ASHP"),
            Vintage::New,
            Some(10.0),
            5.0,
            Some(cpl(100.0, 3.0, "COP", 10.0, true)),
        ),
        record(
            sfh,
            "electricity",
            "cooling",
            Some(TechType::Supply),
            Some("ASHP"),
            Vintage::Existing,
            Some(100.0),
            30.0,
            Some(cpl(100.0, 3.5, "COP", 10.0, true)),
        ),
        // Gas furnace heating, for fuel-switch scenarios.
        record(
            sfh,
            "natural gas",
            "heating",
            Some(TechType::Supply),
            Some("furnace (NG)"),
            Vintage::Existing,
            Some(100.0),
            50.0,
            Some(cpl(80.0, 0.8, "AFUE", 20.0, true)),
        ),
        // Envelope components: square-footage stock.
        record(
            sfh,
            "electricity",
            "heating",
            Some(TechType::Demand),
            Some("windows conduction"),
            Vintage::Existing,
            None,
            20.0,
            Some(cpl(15.0, 1.0, "R value", 30.0, false)),
        ),
        record(
            sfh,
            "electricity",
            "heating",
            Some(TechType::Demand),
            Some("windows solar"),
            Vintage::Existing,
            None,
            10.0,
            Some(cpl(15.0, 1.0, "SHGC", 30.0, false)),
        ),
        // Commercial lighting with its heating/cooling gain segments.
        record(
            "large office",
            "electricity",
            "lighting",
            None,
            Some("F28T8 HE w/ OS"),
            Vintage::Existing,
            Some(500.0),
            80.0,
            Some(cpl(40.0, 90.0, "lm/W", 12.0, false)),
        ),
        record(
            "large office",
            "electricity",
            "heating",
            Some(TechType::Demand),
            Some("lighting gain"),
            Vintage::Existing,
            None,
            12.0,
            None,
        ),
        record(
            "large office",
            "electricity",
            "cooling",
            Some(TechType::Demand),
            Some("lighting gain"),
            Vintage::Existing,
            None,
            18.0,
            None,
        ),
    ];
    let stock = vec![
        BldgStockRecord {
            region: "AIA_CZ1".into(),
            bldg_type: sfh.into(),
            new: flat(2.0),
            total: flat(100.0),
            sqft: flat(2000.0),
        },
        BldgStockRecord {
            region: "AIA_CZ1".into(),
            bldg_type: "large office".into(),
            new: flat(1.0),
            total: flat(50.0),
            sqft: flat(50000.0),
        },
    ];
    BaselineDb::from_records(horizon(), records, stock)
}

pub fn energy_factors() -> EnergyFactors {
    let rec: EnergyFactorsRecord = serde_json::from_value(serde_json::json!({
        "site_source": {
            "electricity": flat(1.0),
            "natural gas": flat(1.0)
        },
        "carbon_intensity": {
            "electricity": flat(0.5),
            "natural gas": flat(1.0)
        },
        "energy_price": {
            "electricity": {"residential": flat(1.0), "commercial": flat(1.0)},
            "natural gas": {"residential": flat(1.0), "commercial": flat(1.0)}
        },
        "carbon_cost": flat(1.0)
    }))
    .expect("factors fixture");
    EnergyFactors::from_record(horizon(), &rec)
}

pub fn engine_ctx() -> EngineCtx {
    EngineCtx::new(
        horizon(),
        DimensionMaps::builtin(),
        energy_factors(),
        CostConverter::default(),
    )
}

pub fn def(json: serde_json::Value) -> MeasureDef {
    serde_json::from_value(json).expect("measure fixture")
}
