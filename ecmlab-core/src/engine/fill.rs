//! Per-measure market fill.
//!
//! Expands a definition's applicability into key chains, runs the stock
//! turnover and partitioning for each chain under every adoption scheme,
//! and aggregates the results into the measure's markets. Errors here are
//! fatal to the measure only; the runner converts them into skip records.

use crate::baseline::{BaselineDb, BaselineError, BaselineSlot};
use crate::convert::{ConversionError, CostUnits};
use crate::diagnostics::{Diagnostics, WarnKind};
use crate::domain::key::{BldgSector, MsegKey, Scope, TechType, Vintage};
use crate::domain::partition::{ContribRecord, Lifetime};
use crate::domain::year::YearSeries;
use crate::engine::choice::choice_params;
use crate::engine::keychain::{expand_primary, expand_secondary, ApplicabilityError};
use crate::engine::linked::{LinkGroupKey, LinkGroups};
use crate::engine::secondary::SecondaryFractions;
use crate::engine::turnover::{
    blend_rel_perf, build_partition, turnover_schedule, CostRates, EnergyRates, TurnoverParams,
    TurnoverSchedule,
};
use crate::engine::EngineCtx;
use crate::measure::definition::{DefError, MeasureDef};
use crate::measure::markets::{AdoptScheme, Markets, Measure, SchemeMarkets};
use crate::measure::spec_value::{SpecCtx, SpecError};
use crate::tsv::TsvFactor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FillError {
    #[error(transparent)]
    Def(#[from] DefError),
    #[error(transparent)]
    Applicability(#[from] ApplicabilityError),
    #[error(transparent)]
    Baseline(#[from] BaselineError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Spec(#[from] SpecError),
}

/// Per-key values resolved once, shared by both adoption schemes.
struct ResolvedKey {
    sector: BldgSector,
    stock_orig: YearSeries,
    energy_orig: YearSeries,
    sqft_substituted: bool,
    rel_perf: YearSeries,
    measure_life: f64,
    base_life: YearSeries,
    base_cost: YearSeries,
    meas_cost: YearSeries,
    lifetime: Lifetime,
    sub_market: f64,
    denom_factor: f64,
    fuel_switched: bool,
    tsv: TsvFactor,
}

fn spec_ctx<'a>(key: &'a MsegKey, sector: BldgSector) -> SpecCtx<'a> {
    SpecCtx {
        region: &key.region,
        bldg_type: &key.bldg_type,
        sector: sector.as_str(),
        vintage: key.vintage.as_str(),
        fuel: &key.fuel,
        end_use: &key.end_use,
        technology: key.technology.as_deref(),
    }
}

/// Relative performance of the measure vs the baseline unit: the ratio of
/// efficient to baseline consumption, per year.
fn relative_performance(
    eff: &YearSeries,
    units: &str,
    base_perf: Option<&YearSeries>,
    inverted: bool,
) -> YearSeries {
    if units.contains("relative savings") {
        return eff.map(|v| (1.0 - v).max(0.0));
    }
    match base_perf {
        Some(base) if inverted => base.zip_with(eff, |b, m| if m > 0.0 { (b / m).max(0.0) } else { 1.0 }),
        Some(base) => eff.zip_with(base, |m, b| if b > 0.0 { (m / b).max(0.0) } else { 1.0 }),
        None => eff.map(|_| 1.0),
    }
}

fn measure_rng(name: &str, seed: u64) -> StdRng {
    let hash = blake3::hash(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    StdRng::seed_from_u64(u64::from_le_bytes(bytes) ^ seed)
}

struct SchemeState {
    markets: SchemeMarkets,
    anchor_scheds: BTreeMap<LinkGroupKey, TurnoverSchedule>,
}

/// Fill one measure's markets against the baseline.
pub fn fill_measure(
    def: &MeasureDef,
    ctx: &EngineCtx,
    db: &BaselineDb,
    diag: &mut Diagnostics,
) -> Result<Measure, FillError> {
    def.validate()?;
    let h = ctx.horizon;
    let entry = def.market_entry_year.unwrap_or(h.first()).max(h.first());
    // The exit year is the first year off the market.
    let exit = def
        .market_exit_year
        .map(|y| y.saturating_sub(1))
        .unwrap_or(h.last());
    if entry > h.last() || exit < h.first() || exit < entry {
        diag.note(format!(
            "measure '{}' inactive over {}..={} (entry {}, exit {})",
            def.name,
            h.first(),
            h.last(),
            entry,
            exit
        ));
        let markets: Markets = ctx
            .schemes
            .iter()
            .map(|s| (*s, SchemeMarkets::zeros(h)))
            .collect();
        return Ok(Measure {
            def: def.clone(),
            markets,
            key_chain_count: 0,
        });
    }

    let scaling_dropped = def.scaling_unverifiable();
    if scaling_dropped {
        diag.warn(WarnKind::ScalingSourceDropped, def.name.clone());
    }

    let primary = expand_primary(def, db, &ctx.maps)?;
    let secondary = expand_secondary(def, db, &ctx.maps, &primary);
    let groups = LinkGroups::detect(&primary, &ctx.maps.anchor_priority);
    let mut rng = measure_rng(&def.name, ctx.seed);

    // Square-footage keys sharing a footprint split the floor area evenly
    // so it is not double-counted across end uses.
    let mut sqft_counts: BTreeMap<(String, String, Vintage), usize> = BTreeMap::new();
    for key in &primary {
        if let Some(slot) = db.get(key) {
            if slot.mseg.stock.is_none() {
                *sqft_counts
                    .entry((key.region.clone(), key.bldg_type.clone(), key.vintage))
                    .or_insert(0) += 1;
            }
        }
    }

    let mut states: BTreeMap<AdoptScheme, SchemeState> = ctx
        .schemes
        .iter()
        .map(|s| {
            (
                *s,
                SchemeState {
                    markets: SchemeMarkets::zeros(h),
                    anchor_scheds: BTreeMap::new(),
                },
            )
        })
        .collect();
    let mut primary_count = 0_usize;

    for key in &primary {
        let slot = match db.get(key) {
            Some(s) => s,
            None => {
                diag.warn(WarnKind::BaselineKeyMissing, key.doc_key());
                continue;
            }
        };
        let resolved = match resolve_key(def, ctx, db, key, slot, scaling_dropped, &mut rng)? {
            Some(r) => r,
            None => continue,
        };
        primary_count += 1;

        for scheme in &ctx.schemes {
            let state = match states.get_mut(scheme) {
                Some(s) => s,
                None => continue,
            };
            let sched = key_schedule(
                ctx, db, key, &resolved, *scheme, entry, exit, &groups, state, diag,
            )?;

            let stock_adj = resolved.stock_orig.scaled(resolved.sub_market);
            let energy_adj = resolved.energy_orig.scaled(resolved.sub_market);
            let rel_blend = blend_rel_perf(h, &sched, &resolved.rel_perf);
            let fuel_m = def.fuel_switch_to.as_deref().unwrap_or(&key.fuel);
            let ss_m = ctx.factors.site_source(fuel_m)?;
            let ci_m = ctx.factors.carbon_intensity(fuel_m)?;
            let pr_m = ctx.factors.energy_price(fuel_m, resolved.sector)?;
            let rates = EnergyRates {
                ss_base: ctx.factors.site_source(&key.fuel)?,
                ss_meas: ss_m,
                carb_base: ctx.factors.carbon_intensity(&key.fuel)?,
                carb_meas: ci_m,
                price_base: ctx.factors.energy_price(&key.fuel, resolved.sector)?,
                price_meas: pr_m,
                carbon_cost: ctx.factors.carbon_cost(),
                tsv: resolved.tsv,
            };
            let costs = CostRates {
                base_unit: resolved.base_cost.clone(),
                meas_unit: resolved.meas_cost.clone(),
            };
            let mut part = build_partition(
                h,
                &stock_adj,
                &energy_adj,
                &sched,
                &resolved.rel_perf,
                &rel_blend,
                &rates,
                Some(&costs),
            );
            if resolved.sqft_substituted {
                let n = sqft_counts
                    .get(&(key.region.clone(), key.bldg_type.clone(), key.vintage))
                    .copied()
                    .unwrap_or(1);
                if n > 1 {
                    part.scale_stock(1.0 / n as f64);
                }
            }
            let clamped = part.clamp_non_negative();
            diag.warn_n(WarnKind::NegativeClamped, clamped as u64, key.doc_key());

            state.markets.secondary.record_primary(
                key,
                h,
                &resolved.stock_orig,
                &stock_adj,
                &sched.prev_captured.zip_with(&stock_adj, |f, s| f * s),
                &sched.competed.zip_with(&stock_adj, |f, s| f * s),
                &sched.competed_captured.zip_with(&stock_adj, |f, s| f * s),
            );

            let choice = if key.is_supply() && key.scope == Scope::Primary {
                Some(choice_params(
                    h,
                    resolved.sector,
                    &key.end_use,
                    slot.cpl.as_ref(),
                    &ctx.maps,
                    resolved.denom_factor,
                    diag,
                ))
            } else {
                None
            };

            state.markets.out_break.add(
                &key.region,
                ctx.maps.bldg_class(resolved.sector, key.vintage),
                &ctx.maps
                    .end_use_label(&key.end_use, key.tech_type == Some(TechType::Demand)),
                &part.energy.total.baseline,
            );
            state
                .markets
                .master
                .add_partition(&part, &resolved.lifetime);
            state.markets.contributing.insert_or_merge(
                key.contrib_key(),
                ContribRecord {
                    partition: part,
                    lifetime: resolved.lifetime.clone(),
                    sub_market_scale: resolved.sub_market,
                    choice,
                },
            );
        }
    }

    // Secondary chains derive their fractions from the accumulators the
    // primary pass recorded; they carry no stock, stock cost, or lifetime.
    for key in &secondary {
        let slot = match db.get(&MsegKey {
            scope: Scope::Primary,
            ..key.clone()
        }) {
            Some(s) => s,
            None => {
                diag.warn(WarnKind::BaselineKeyMissing, key.doc_key());
                continue;
            }
        };
        let energy = slot.mseg.energy.clone();
        if energy.sum() == 0.0 {
            continue;
        }
        let sector = ctx.maps.sector(&key.bldg_type)?;
        let sctx = spec_ctx(key, sector);
        let eff_spec = def
            .energy_efficiency
            .secondary()
            .unwrap_or_else(|| def.energy_efficiency.primary());
        let eff = eff_spec.resolve_series(&sctx, h, &mut rng, ctx.nsamples)?;
        let units = def
            .energy_efficiency_units
            .secondary()
            .unwrap_or_else(|| def.energy_efficiency_units.primary());
        let rel_perf = relative_performance(
            &eff,
            units,
            slot.cpl.as_ref().map(|c| &c.performance),
            ctx.maps.perf_units_inverted(units),
        );

        for scheme in &ctx.schemes {
            let state = match states.get_mut(scheme) {
                Some(s) => s,
                None => continue,
            };
            let fracs: SecondaryFractions = match state.markets.secondary.fractions(key) {
                Some(f) => f,
                None => {
                    diag.warn(WarnKind::SecondaryUnanchored, key.doc_key());
                    continue;
                }
            };
            let mut captured_clamps = 0_u64;
            let mut captured_total = YearSeries::zeros(h);
            for yr in h.years() {
                let c = fracs.prev_captured.get(yr) + fracs.competed_captured.get(yr);
                if c > 1.0 {
                    captured_clamps += 1;
                }
                captured_total.set(yr, c.min(1.0));
            }
            diag.warn_n(WarnKind::CapturedExceedsTotal, captured_clamps, key.doc_key());
            let sched = TurnoverSchedule {
                competed: fracs.competed.clone(),
                competed_captured: fracs.competed_captured.clone(),
                captured_total,
                prev_captured: fracs.prev_captured.clone(),
            };
            let energy_adj = energy.zip_with(&fracs.sub_market, |e, f| e * f);
            let rel_blend = blend_rel_perf(h, &sched, &rel_perf);
            let rates = EnergyRates {
                ss_base: ctx.factors.site_source(&key.fuel)?,
                ss_meas: ctx.factors.site_source(&key.fuel)?,
                carb_base: ctx.factors.carbon_intensity(&key.fuel)?,
                carb_meas: ctx.factors.carbon_intensity(&key.fuel)?,
                price_base: ctx.factors.energy_price(&key.fuel, sector)?,
                price_meas: ctx.factors.energy_price(&key.fuel, sector)?,
                carbon_cost: ctx.factors.carbon_cost(),
                tsv: TsvFactor::default(),
            };
            let mut part = build_partition(
                h,
                &YearSeries::zeros(h),
                &energy_adj,
                &sched,
                &rel_perf,
                &rel_blend,
                &rates,
                None,
            );
            let clamped = part.clamp_non_negative();
            diag.warn_n(WarnKind::NegativeClamped, clamped as u64, key.doc_key());

            state.markets.out_break.add(
                &key.region,
                ctx.maps.bldg_class(sector, key.vintage),
                &ctx.maps.end_use_label(&key.end_use, true),
                &part.energy.total.baseline,
            );
            state
                .markets
                .master
                .add_partition(&part, &Lifetime::zeros(h));
            state.markets.contributing.insert_or_merge(
                key.contrib_key(),
                ContribRecord {
                    partition: part,
                    lifetime: Lifetime::zeros(h),
                    sub_market_scale: 1.0,
                    choice: None,
                },
            );
        }
    }

    let mut markets: Markets = BTreeMap::new();
    for (scheme, mut state) in states {
        state.markets.master.finalize_lifetime(primary_count);
        let total = state.markets.master.msegs.energy.total.baseline.clone();
        state.markets.out_break.normalize(&total);
        markets.insert(scheme, state.markets);
    }
    Ok(Measure {
        def: def.clone(),
        markets,
        key_chain_count: primary_count,
    })
}

/// Resolve the per-key spec values and baseline data shared across schemes.
/// Returns `None` when the key carries no stock or energy at all.
#[allow(clippy::too_many_arguments)]
fn resolve_key(
    def: &MeasureDef,
    ctx: &EngineCtx,
    db: &BaselineDb,
    key: &MsegKey,
    slot: &BaselineSlot,
    scaling_dropped: bool,
    rng: &mut StdRng,
) -> Result<Option<ResolvedKey>, FillError> {
    let h = ctx.horizon;
    let sector = ctx.maps.sector(&key.bldg_type)?;
    let sctx = spec_ctx(key, sector);

    let (stock_orig, sqft_substituted) = match &slot.mseg.stock {
        Some(s) => (s.clone(), false),
        None => (
            db.bldg_stock(&key.region, &key.bldg_type)?.sqft.clone(),
            true,
        ),
    };
    let energy_orig = slot.mseg.energy.clone();
    if stock_orig.sum() == 0.0 && energy_orig.sum() == 0.0 {
        return Ok(None);
    }

    let measure_life = def
        .product_lifetime
        .resolve_scalar(&sctx, rng, ctx.nsamples)?
        .max(1.0);
    let eff = def
        .energy_efficiency
        .primary()
        .resolve_series(&sctx, h, rng, ctx.nsamples)?;
    let units = def.energy_efficiency_units.primary();
    let rel_perf = relative_performance(
        &eff,
        units,
        slot.cpl.as_ref().map(|c| &c.performance),
        ctx.maps.perf_units_inverted(units),
    );

    let meas_units = CostUnits::parse(&def.cost_units)?;
    let (base_units, base_cost, base_life) = match &slot.cpl {
        Some(cpl) => (
            CostUnits::parse(&cpl.cost_units)?,
            cpl.cost.clone(),
            cpl.lifetime.clone(),
        ),
        // No baseline unit data: costs compare against zero and the
        // baseline turns over at the measure's own lifetime.
        None => (
            meas_units.clone(),
            YearSeries::zeros(h),
            YearSeries::splat(h, measure_life),
        ),
    };
    let cost_factor = ctx.cost_convert.factor(sector, &meas_units, &base_units)?;
    let denom_factor = ctx
        .cost_convert
        .denom_factor(sector, &meas_units.denom, &base_units.denom)?;
    let mut meas_cost = def
        .installed_cost
        .resolve_series(&sctx, h, rng, ctx.nsamples)?
        .scaled(cost_factor);
    if def.is_add_on() {
        meas_cost.add_assign(&base_cost);
    }

    let sub_market = match (&def.market_scaling_fractions, scaling_dropped) {
        (Some(frac), false) => frac.resolve_scalar(&sctx, rng, ctx.nsamples)?.clamp(0.0, 1.0),
        _ => 1.0,
    };

    let tsv = match &def.tsv_features {
        Some(f) if f.is_active() => ctx.tsv.lookup(
            &key.region,
            sector,
            &key.end_use,
            key.technology.as_deref(),
            f,
        ),
        _ => TsvFactor::default(),
    };

    Ok(Some(ResolvedKey {
        sector,
        stock_orig,
        energy_orig,
        sqft_substituted,
        rel_perf,
        measure_life,
        base_life: base_life.clone(),
        base_cost,
        meas_cost,
        lifetime: Lifetime {
            baseline: base_life,
            measure: measure_life,
        },
        sub_market,
        denom_factor,
        fuel_switched: def
            .fuel_switch_to
            .as_deref()
            .is_some_and(|f| f != key.fuel),
        tsv,
    }))
}

/// Turnover schedule for a key: the linked anchor's schedule when the key
/// is part of a heating/cooling pair, its own otherwise.
#[allow(clippy::too_many_arguments)]
fn key_schedule(
    ctx: &EngineCtx,
    db: &BaselineDb,
    key: &MsegKey,
    resolved: &ResolvedKey,
    scheme: AdoptScheme,
    entry: u32,
    exit: u32,
    groups: &LinkGroups,
    state: &mut SchemeState,
    diag: &mut Diagnostics,
) -> Result<TurnoverSchedule, FillError> {
    let params_for = |base_life: YearSeries,
                      vintage: Vintage,
                      region: &str,
                      bldg: &str|
     -> Result<TurnoverParams, FillError> {
        let new_frac = if vintage == Vintage::New {
            Some(db.bldg_stock(region, bldg)?.new_frac())
        } else {
            None
        };
        Ok(TurnoverParams {
            scheme,
            entry_year: entry,
            exit_year: exit,
            base_life,
            measure_life: resolved.measure_life,
            retro_rate: if vintage == Vintage::Existing {
                ctx.retro_rate
            } else {
                0.0
            },
            new_frac,
            capture_ceiling: if resolved.fuel_switched {
                ctx.hp_rate_for(region).cloned()
            } else {
                None
            },
        })
    };

    if let Some(group) = groups.group_of(key) {
        if let Some(sched) = state.anchor_scheds.get(group) {
            return Ok(sched.clone());
        }
        let group = group.clone();
        // Compute once from the anchor key's baseline lifetime.
        let anchor = groups.anchor_of(&group).cloned();
        let base_life = anchor
            .as_ref()
            .and_then(|a| db.get(a))
            .and_then(|s| s.cpl.as_ref())
            .map(|c| c.lifetime.clone())
            .unwrap_or_else(|| resolved.base_life.clone());
        let p = params_for(base_life, key.vintage, &key.region, &key.bldg_type)?;
        let (sched, clamps) = turnover_schedule(ctx.horizon, &p);
        diag.warn_n(WarnKind::CapturedExceedsTotal, clamps, key.doc_key());
        state.anchor_scheds.insert(group, sched.clone());
        return Ok(sched);
    }

    let p = params_for(
        resolved.base_life.clone(),
        key.vintage,
        &key.region,
        &key.bldg_type,
    )?;
    let (sched, clamps) = turnover_schedule(ctx.horizon, &p);
    diag.warn_n(WarnKind::CapturedExceedsTotal, clamps, key.doc_key());
    Ok(sched)
}
