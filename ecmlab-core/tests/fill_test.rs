//! End-to-end fill scenarios against the shared fixture database.

mod common;

use common::{baseline_db, def, engine_ctx, horizon};
use ecmlab_core::diagnostics::{Diagnostics, WarnKind};
use ecmlab_core::domain::choice::ChoiceParams;
use ecmlab_core::engine::fill_measure;
use ecmlab_core::measure::AdoptScheme;
use serde_json::json;

fn ashp_def() -> serde_json::Value {
    json!({
        "name": "ENERGY STAR ASHP",
        "measure_type": "full service",
        "climate_zone": "all",
        "bldg_type": "single family home",
        "structure_type": "existing",
        "fuel_type": "electricity",
        "end_use": "heating",
        "technology": "ASHP",
        "installed_cost": 200.0,
        "cost_units": "2022$/unit",
        "energy_efficiency": 6.0,
        "energy_efficiency_units": "COP",
        "product_lifetime": 15.0
    })
}

#[test]
fn single_key_fill_partitions_both_schemes() {
    let db = baseline_db();
    let ctx = engine_ctx();
    let mut diag = Diagnostics::new();
    let m = fill_measure(&def(ashp_def()), &ctx, &db, &mut diag).unwrap();
    assert_eq!(m.key_chain_count, 1);

    // Technical potential competes and captures everything from entry:
    // baseline 50, relative performance 3.0/6.0 = 0.5.
    let tp = &m.markets[&AdoptScheme::TechnicalPotential].master.msegs;
    assert!((tp.energy.total.baseline.get(2025) - 50.0).abs() < 1e-9);
    assert!((tp.energy.total.efficient.get(2025) - 25.0).abs() < 1e-9);
    assert!((tp.stock.total.measure.get(2025) - 100.0).abs() < 1e-9);
    assert!((tp.cost.stock.total.efficient.get(2025) - 100.0 * 200.0).abs() < 1e-9);

    // Max adoption turns over 1/lifetime of the stock in year one.
    let map = &m.markets[&AdoptScheme::MaxAdoptionPotential].master.msegs;
    assert!((map.stock.competed.all.get(2025) - 10.0).abs() < 1e-9);
    assert!((map.energy.total.efficient.get(2025) - 47.5).abs() < 1e-9);
    // Year two: carried 0.1, newly competed (1 - 0.1) / 10 = 0.09.
    assert!((map.stock.total.measure.get(2026) - 19.0).abs() < 1e-9);
    assert!((map.energy.total.efficient.get(2026) - 45.25).abs() < 1e-9);

    // Carbon follows source energy times the electricity intensity.
    assert!((tp.carbon.total.baseline.get(2025) - 25.0).abs() < 1e-9);

    // Average lifetimes over the single chain.
    let life = &m.markets[&AdoptScheme::TechnicalPotential].master.lifetime;
    assert!((life.measure - 15.0).abs() < 1e-9);
    assert!((life.baseline.get(2025) - 10.0).abs() < 1e-9);
}

#[test]
fn residential_supply_keys_carry_logit_choice() {
    let db = baseline_db();
    let ctx = engine_ctx();
    let mut diag = Diagnostics::new();
    let m = fill_measure(&def(ashp_def()), &ctx, &db, &mut diag).unwrap();
    let contrib = &m.markets[&AdoptScheme::MaxAdoptionPotential].contributing;
    assert_eq!(contrib.len(), 1);
    let (_, rec) = contrib.iter().next().unwrap();
    match rec.choice.as_ref().unwrap() {
        ChoiceParams::Logit { b1, b2 } => {
            assert!((b1.get(2025) - (-0.005)).abs() < 1e-12);
            assert!((b2.get(2025) - (-0.01)).abs() < 1e-12);
        }
        other => panic!("expected logit choice, got {other:?}"),
    }
    assert!(diag.is_clean());
}

#[test]
fn market_entry_year_delays_competition() {
    let db = baseline_db();
    let ctx = engine_ctx();
    let mut diag = Diagnostics::new();
    let mut d = ashp_def();
    d["market_entry_year"] = json!(2027);
    let m = fill_measure(&def(d), &ctx, &db, &mut diag).unwrap();
    let map = &m.markets[&AdoptScheme::MaxAdoptionPotential].master.msegs;
    assert_eq!(map.stock.competed.all.get(2026), 0.0);
    assert_eq!(map.stock.total.measure.get(2026), 0.0);
    assert!(map.stock.competed.all.get(2027) > 0.0);
}

#[test]
fn out_of_horizon_window_yields_inactive_measure() {
    let db = baseline_db();
    let ctx = engine_ctx();
    let mut diag = Diagnostics::new();
    let mut d = ashp_def();
    d["market_entry_year"] = json!(2040);
    let m = fill_measure(&def(d), &ctx, &db, &mut diag).unwrap();
    assert_eq!(m.key_chain_count, 0);
    let tp = &m.markets[&AdoptScheme::TechnicalPotential];
    assert!(tp.contributing.is_empty());
    assert_eq!(tp.master.msegs.energy.total.baseline.sum(), 0.0);
    assert!(!diag.notes.is_empty());
}

#[test]
fn new_vintage_competes_additions_plus_replacements() {
    let db = baseline_db();
    let ctx = engine_ctx();
    let mut diag = Diagnostics::new();
    let mut d = ashp_def();
    d["structure_type"] = json!("new");
    let m = fill_measure(&def(d), &ctx, &db, &mut diag).unwrap();
    let map = &m.markets[&AdoptScheme::MaxAdoptionPotential].master.msegs;
    // New additions 2/100 plus replacement of the rest at 1/10.
    let expected = 10.0 * (0.02 + 0.98 / 10.0);
    assert!((map.stock.competed.all.get(2025) - expected).abs() < 1e-9);
}

#[test]
fn add_on_cost_stacks_on_the_baseline_unit() {
    let db = baseline_db();
    let ctx = engine_ctx();
    let mut diag = Diagnostics::new();
    let mut d = ashp_def();
    d["measure_type"] = json!("add-on");
    d["installed_cost"] = json!(50.0);
    let m = fill_measure(&def(d), &ctx, &db, &mut diag).unwrap();
    let tp = &m.markets[&AdoptScheme::TechnicalPotential].master.msegs;
    assert!((tp.cost.stock.total.efficient.get(2025) - 100.0 * 150.0).abs() < 1e-9);
}

#[test]
fn verified_sub_market_fraction_scales_accounted_quantities() {
    let db = baseline_db();
    let ctx = engine_ctx();
    let mut diag = Diagnostics::new();
    let mut d = ashp_def();
    d["market_scaling_fractions"] = json!(0.5);
    d["market_scaling_fractions_source"] =
        json!({"url": "https://example.gov/shipments"});
    let m = fill_measure(&def(d), &ctx, &db, &mut diag).unwrap();
    let tp = &m.markets[&AdoptScheme::TechnicalPotential];
    assert!((tp.master.msegs.energy.total.baseline.get(2025) - 25.0).abs() < 1e-9);
    assert!((tp.master.msegs.stock.total.all.get(2025) - 50.0).abs() < 1e-9);
    let (_, rec) = tp.contributing.iter().next().unwrap();
    assert!((rec.sub_market_scale - 0.5).abs() < 1e-12);
    // The unscaled baseline stays recoverable for reporting.
    let raw = rec.partition.energy.total.baseline.get(2025) / rec.sub_market_scale;
    assert!((raw - 50.0).abs() < 1e-9);
    assert!(diag.is_clean());
}

#[test]
fn unsourced_sub_market_fraction_is_dropped_with_warning() {
    let db = baseline_db();
    let ctx = engine_ctx();
    let mut diag = Diagnostics::new();
    let mut d = ashp_def();
    d["market_scaling_fractions"] = json!(0.5);
    let m = fill_measure(&def(d), &ctx, &db, &mut diag).unwrap();
    let tp = &m.markets[&AdoptScheme::TechnicalPotential].master.msegs;
    assert!((tp.energy.total.baseline.get(2025) - 50.0).abs() < 1e-9);
    assert!(diag.warnings.contains_key(&WarnKind::ScalingSourceDropped));
}

#[test]
fn windows_components_collapse_to_one_contributing_key() {
    let db = baseline_db();
    let ctx = engine_ctx();
    let mut diag = Diagnostics::new();
    let d = def(json!({
        "name": "triple-pane windows",
        "measure_type": "full service",
        "climate_zone": "all",
        "bldg_type": "single family home",
        "structure_type": "existing",
        "fuel_type": "electricity",
        "end_use": "heating",
        "technology": ["windows conduction", "windows solar"],
        "installed_cost": 30.0,
        "cost_units": "2022$/unit",
        "energy_efficiency": 0.3,
        "energy_efficiency_units": "relative savings (constant)",
        "product_lifetime": 30.0
    }));
    let m = fill_measure(&d, &ctx, &db, &mut diag).unwrap();
    assert_eq!(m.key_chain_count, 2);
    let tp = &m.markets[&AdoptScheme::TechnicalPotential];
    // One merged "windows" record; floor area counted once, not twice.
    assert_eq!(tp.contributing.len(), 1);
    let key = tp.contributing.keys().next().unwrap();
    assert_eq!(key.technology.as_deref(), Some("windows"));
    assert!((tp.master.msegs.stock.total.all.get(2025) - 2000.0).abs() < 1e-9);
    // Energy sums across the merged components: 20 + 10 at 30% savings.
    assert!((tp.master.msegs.energy.total.baseline.get(2025) - 30.0).abs() < 1e-9);
    assert!((tp.master.msegs.energy.total.efficient.get(2025) - 21.0).abs() < 1e-9);
    // Lifetime averages per key chain, not per merged record.
    assert!((tp.master.lifetime.measure - 30.0).abs() < 1e-9);
    // Envelope keys never carry choice parameters.
    assert!(tp.contributing.iter().all(|(_, r)| r.choice.is_none()));
    // The whole breakout lands in one envelope bucket.
    let b = tp
        .out_break
        .get("AIA_CZ1", "Residential (Existing)", "Heating (Env.)")
        .unwrap();
    assert!((b.get(2025) - 1.0).abs() < 1e-9);
}

#[test]
fn commercial_lighting_adds_secondary_gain_chains() {
    let db = baseline_db();
    let ctx = engine_ctx();
    let mut diag = Diagnostics::new();
    let d = def(json!({
        "name": "LED troffer",
        "measure_type": "full service",
        "climate_zone": "all",
        "bldg_type": "large office",
        "structure_type": "existing",
        "fuel_type": "electricity",
        "end_use": "lighting",
        "technology": "all",
        "installed_cost": 60.0,
        "cost_units": "2022$/unit",
        "energy_efficiency": {
            "primary": 120.0,
            "secondary": {"heating": -0.2, "cooling": 0.25}
        },
        "energy_efficiency_units": {
            "primary": "lm/W",
            "secondary": "relative savings (constant)"
        },
        "product_lifetime": 12.0
    }));
    let m = fill_measure(&d, &ctx, &db, &mut diag).unwrap();
    let tp = &m.markets[&AdoptScheme::TechnicalPotential];
    // Lighting plus two secondary gain records.
    assert_eq!(tp.contributing.len(), 3);
    let master = &tp.master.msegs;
    assert!((master.energy.total.baseline.get(2025) - 110.0).abs() < 1e-9);
    // Lighting 80 * (90/120), heating gain 12 * 1.2, cooling gain 18 * 0.75.
    let expected = 80.0 * 0.75 + 12.0 * 1.2 + 18.0 * 0.75;
    assert!((master.energy.total.efficient.get(2025) - expected).abs() < 1e-9);
    // Secondary records contribute no stock or stock cost.
    assert!((master.stock.total.all.get(2025) - 500.0).abs() < 1e-9);
    let (_, lighting) = tp.contributing.iter().next().unwrap();
    match lighting.choice.as_ref().unwrap() {
        ChoiceParams::TimePrefs { distribution } => assert_eq!(distribution.len(), 7),
        other => panic!("expected time preferences, got {other:?}"),
    }
}

#[test]
fn fuel_switch_swaps_measure_side_factors() {
    let db = baseline_db();
    let ctx = engine_ctx();
    let mut diag = Diagnostics::new();
    let d = def(json!({
        "name": "gas furnace to HP",
        "measure_type": "full service",
        "climate_zone": "all",
        "bldg_type": "single family home",
        "structure_type": "existing",
        "fuel_type": "natural gas",
        "end_use": "heating",
        "technology": "furnace (NG)",
        "installed_cost": 250.0,
        "cost_units": "2022$/unit",
        "energy_efficiency": 0.5,
        "energy_efficiency_units": "relative savings (constant)",
        "product_lifetime": 15.0,
        "fuel_switch_to": "electricity"
    }));
    let m = fill_measure(&d, &ctx, &db, &mut diag).unwrap();
    let tp = &m.markets[&AdoptScheme::TechnicalPotential].master.msegs;
    // Baseline carbon on gas intensity 1.0; efficient on electric 0.5.
    assert!((tp.carbon.total.baseline.get(2025) - 50.0).abs() < 1e-9);
    assert!((tp.carbon.total.efficient.get(2025) - 50.0 * 0.5 * 0.5).abs() < 1e-9);
}

fn hp_rate_table(region: &str, rate: f64) -> std::collections::BTreeMap<String, ecmlab_core::YearSeries> {
    let mut rates = std::collections::BTreeMap::new();
    rates.insert(
        region.to_string(),
        ecmlab_core::YearSeries::splat(horizon(), rate),
    );
    rates
}

#[test]
fn exogenous_conversion_rates_cap_fuel_switched_capture() {
    let db = baseline_db();
    let mut ctx = engine_ctx();
    ctx.exog_hp_rates = Some(hp_rate_table("AIA_CZ1", 0.25));
    let mut diag = Diagnostics::new();
    let d = def(json!({
        "name": "gas furnace to HP",
        "measure_type": "full service",
        "climate_zone": "all",
        "bldg_type": "single family home",
        "structure_type": "existing",
        "fuel_type": "natural gas",
        "end_use": "heating",
        "technology": "furnace (NG)",
        "installed_cost": 250.0,
        "cost_units": "2022$/unit",
        "energy_efficiency": 0.5,
        "energy_efficiency_units": "relative savings (constant)",
        "product_lifetime": 15.0,
        "fuel_switch_to": "electricity"
    }));
    let m = fill_measure(&d, &ctx, &db, &mut diag).unwrap();
    let tp = &m.markets[&AdoptScheme::TechnicalPotential].master.msegs;
    // Everything competes, but only a quarter converts in year one.
    assert!((tp.stock.competed.all.get(2025) - 100.0).abs() < 1e-9);
    assert!((tp.stock.competed.measure.get(2025) - 25.0).abs() < 1e-9);
}

#[test]
fn declared_tsv_feature_selects_its_reweighting_factor() {
    let db = baseline_db();
    let mut ctx = engine_ctx();
    ctx.tsv = serde_json::from_value(json!({
        "rules": [
            {"factor": {"energy": 0.8, "cost": 1.0, "carbon": 1.0}},
            {"end_use": "heating", "feature": "shed",
             "factor": {"energy": 0.9, "cost": 1.0, "carbon": 1.0}}
        ]
    }))
    .unwrap();
    let mut diag = Diagnostics::new();

    // A shed-declaring measure picks the shed rule over the catch-all.
    let mut d = ashp_def();
    d["tsv_features"] =
        json!({"shed": {"relative_energy_change": -0.1, "start_hour": 14, "stop_hour": 18}});
    let m = fill_measure(&def(d), &ctx, &db, &mut diag).unwrap();
    let tp = &m.markets[&AdoptScheme::TechnicalPotential].master.msegs;
    assert!((tp.energy.total.efficient.get(2025) - 50.0 * 0.5 * 0.9).abs() < 1e-9);

    // No declared features, no reweighting, table or not.
    let m = fill_measure(&def(ashp_def()), &ctx, &db, &mut diag).unwrap();
    let tp = &m.markets[&AdoptScheme::TechnicalPotential].master.msegs;
    assert!((tp.energy.total.efficient.get(2025) - 25.0).abs() < 1e-9);
}

#[test]
fn conversion_rates_resolve_per_region() {
    let db = baseline_db();
    let d = def(json!({
        "name": "gas furnace to HP",
        "measure_type": "full service",
        "climate_zone": "all",
        "bldg_type": "single family home",
        "structure_type": "existing",
        "fuel_type": "natural gas",
        "end_use": "heating",
        "technology": "furnace (NG)",
        "installed_cost": 250.0,
        "cost_units": "2022$/unit",
        "energy_efficiency": 0.5,
        "energy_efficiency_units": "relative savings (constant)",
        "product_lifetime": 15.0,
        "fuel_switch_to": "electricity"
    }));

    // A rate table for some other region leaves this one uncapped.
    let mut ctx = engine_ctx();
    ctx.exog_hp_rates = Some(hp_rate_table("AIA_CZ5", 0.25));
    let mut diag = Diagnostics::new();
    let m = fill_measure(&d, &ctx, &db, &mut diag).unwrap();
    let tp = &m.markets[&AdoptScheme::TechnicalPotential].master.msegs;
    assert!((tp.stock.competed.measure.get(2025) - 100.0).abs() < 1e-9);

    // The "all" region covers regions without their own table.
    let mut ctx = engine_ctx();
    ctx.exog_hp_rates = Some(hp_rate_table("all", 0.1));
    let mut diag = Diagnostics::new();
    let m = fill_measure(&d, &ctx, &db, &mut diag).unwrap();
    let tp = &m.markets[&AdoptScheme::TechnicalPotential].master.msegs;
    assert!((tp.stock.competed.measure.get(2025) - 10.0).abs() < 1e-9);
}
