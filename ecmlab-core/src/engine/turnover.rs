//! Stock turnover and microsegment partitioning.
//!
//! The turnover schedule is a year-sequential scan with explicit
//! accumulators: the competed fraction of stock each year, the share of it
//! the measure captures, and the cumulative captured fraction carried
//! across years. Partition construction then applies the schedule to the
//! baseline stock/energy series together with the energy-factor and cost
//! rates.

use crate::domain::partition::{FlowMseg, MsegPartition, StockMseg};
use crate::domain::year::{Horizon, YearSeries};
use crate::measure::markets::AdoptScheme;
use crate::tsv::TsvFactor;

/// Turnover inputs for one key chain.
#[derive(Debug, Clone)]
pub struct TurnoverParams {
    pub scheme: AdoptScheme,
    pub entry_year: u32,
    pub exit_year: u32,
    pub base_life: YearSeries,
    pub measure_life: f64,
    /// Annual early-retrofit rate, existing vintage only.
    pub retro_rate: f64,
    /// New-construction fraction of total stock; `Some` for new-vintage keys.
    pub new_frac: Option<YearSeries>,
    /// Annual ceiling on the captured share of competed stock (exogenous
    /// heat-pump conversion rates, fuel-switching measures only).
    pub capture_ceiling: Option<YearSeries>,
}

/// Per-year stock fractions produced by the turnover scan. All values are
/// fractions of total stock.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnoverSchedule {
    pub competed: YearSeries,
    pub competed_captured: YearSeries,
    /// Cumulative measure-captured fraction, including this year's capture.
    pub captured_total: YearSeries,
    /// Captured fraction carried in from prior years, net of retirements.
    pub prev_captured: YearSeries,
}

impl TurnoverSchedule {
    pub fn zeros(h: Horizon) -> Self {
        TurnoverSchedule {
            competed: YearSeries::zeros(h),
            competed_captured: YearSeries::zeros(h),
            captured_total: YearSeries::zeros(h),
            prev_captured: YearSeries::zeros(h),
        }
    }
}

/// Run the turnover scan. Returns the schedule plus the number of years in
/// which the captured fraction had to be clamped to 1.
pub fn turnover_schedule(h: Horizon, p: &TurnoverParams) -> (TurnoverSchedule, u64) {
    let mut sched = TurnoverSchedule::zeros(h);
    let mut captured_prev = 0.0_f64;
    let mut clamps = 0_u64;

    for yr in h.years() {
        let on_market = yr >= p.entry_year && yr <= p.exit_year;
        // Measure units bought at entry begin retiring one lifetime later.
        let eff_retire = if p.measure_life > 0.0
            && f64::from(yr - yr.min(p.entry_year)) >= p.measure_life
        {
            1.0 / p.measure_life
        } else {
            0.0
        };
        let carried = (captured_prev * (1.0 - eff_retire)).max(0.0);

        let competed = if !on_market {
            0.0
        } else {
            match p.scheme {
                // Technical potential competes the entire stock from entry.
                AdoptScheme::TechnicalPotential => 1.0,
                AdoptScheme::MaxAdoptionPotential => {
                    let life = p.base_life.get(yr).max(1.0);
                    match &p.new_frac {
                        Some(nf) => {
                            // New vintage: additions plus replacements of
                            // previously added units.
                            let add = nf.get(yr).clamp(0.0, 1.0);
                            (add + (1.0 - add) / life).min(1.0)
                        }
                        None => {
                            // Existing vintage: uniform-age baseline
                            // replacement, prior measure units reaching end
                            // of life, and early retrofits.
                            let base_replace = (1.0 - carried).max(0.0) / life;
                            let eff_replace = captured_prev * eff_retire;
                            (base_replace + eff_replace + p.retro_rate).min(1.0)
                        }
                    }
                }
            }
        };

        let ceiling = p
            .capture_ceiling
            .as_ref()
            .map(|c| c.get(yr).clamp(0.0, 1.0))
            .unwrap_or(1.0);
        let captured_new = if on_market { competed * ceiling } else { 0.0 };

        let mut captured_total = carried + captured_new;
        if captured_total > 1.0 {
            captured_total = 1.0;
            // Saturation is the designed outcome under Technical potential,
            // not an anomaly worth warning about.
            if p.scheme != AdoptScheme::TechnicalPotential {
                clamps += 1;
            }
        }

        sched.competed.set(yr, competed);
        sched.competed_captured.set(yr, captured_new);
        sched.prev_captured.set(yr, carried);
        sched.captured_total.set(yr, captured_total);
        captured_prev = captured_total;
    }
    (sched, clamps)
}

/// Capture-weighted running blend of relative performance: stock captured
/// in earlier years keeps the relative performance it was captured at.
pub fn blend_rel_perf(h: Horizon, sched: &TurnoverSchedule, rel_perf: &YearSeries) -> YearSeries {
    let mut blend = YearSeries::zeros(h);
    let mut prev = 0.0_f64;
    for yr in h.years() {
        let carried = sched.prev_captured.get(yr);
        let new = (sched.captured_total.get(yr) - carried).max(0.0);
        let total = carried + new;
        let b = if total > 0.0 {
            (prev * carried + rel_perf.get(yr) * new) / total
        } else {
            rel_perf.get(yr)
        };
        blend.set(yr, b);
        prev = b;
    }
    blend
}

/// Per-fuel energy factor series for a key, baseline vs measure side. The
/// measure side differs from the baseline side only on fuel switch.
#[derive(Debug, Clone, Copy)]
pub struct EnergyRates<'a> {
    pub ss_base: &'a YearSeries,
    pub ss_meas: &'a YearSeries,
    pub carb_base: &'a YearSeries,
    pub carb_meas: &'a YearSeries,
    pub price_base: &'a YearSeries,
    pub price_meas: &'a YearSeries,
    pub carbon_cost: &'a YearSeries,
    pub tsv: TsvFactor,
}

/// Unit costs, reconciled to baseline cost units.
#[derive(Debug, Clone)]
pub struct CostRates {
    pub base_unit: YearSeries,
    pub meas_unit: YearSeries,
}

/// Build the 24-series partition for one key.
///
/// `stock_total` and `energy_total` are already sub-market scaled;
/// `costs` is `None` for secondary keys, which carry no stock or stock cost.
pub fn build_partition(
    h: Horizon,
    stock_total: &YearSeries,
    energy_total: &YearSeries,
    sched: &TurnoverSchedule,
    rel_perf: &YearSeries,
    rel_blend: &YearSeries,
    rates: &EnergyRates,
    costs: Option<&CostRates>,
) -> MsegPartition {
    let mut part = MsegPartition::zeros(h);
    for yr in h.years() {
        let stock = stock_total.get(yr);
        let energy = energy_total.get(yr);
        let competed = sched.competed.get(yr);
        let cc = sched.competed_captured.get(yr);
        let captured = sched.captured_total.get(yr);

        set_stock(&mut part.stock, yr, stock, competed, cc, captured);

        let ssb = rates.ss_base.get(yr);
        let ssm = rates.ss_meas.get(yr);
        let rp_blend = rel_blend.get(yr);
        let rp_now = rel_perf.get(yr);
        let tsv_e = rates.tsv.energy;

        // Source energy, total and competed, baseline vs efficient. The
        // captured share runs at blended measure performance on the measure
        // fuel; the rest stays at baseline performance on the baseline fuel.
        let e_total_base = energy * ssb;
        let e_total_eff =
            energy * ((1.0 - captured) * ssb + captured * rp_blend * ssm * tsv_e);
        let e_comp_base = energy * competed * ssb;
        let e_comp_eff = energy * ((competed - cc) * ssb + cc * rp_now * ssm * tsv_e);
        set_flow(&mut part.energy, yr, e_total_base, e_total_eff, e_comp_base, e_comp_eff);

        let cib = rates.carb_base.get(yr);
        let cim = rates.carb_meas.get(yr);
        let tsv_c = rates.tsv.carbon;
        let c_total_base = e_total_base * cib;
        let c_total_eff =
            energy * ((1.0 - captured) * ssb * cib + captured * rp_blend * ssm * cim * tsv_c);
        let c_comp_base = e_comp_base * cib;
        let c_comp_eff =
            energy * ((competed - cc) * ssb * cib + cc * rp_now * ssm * cim * tsv_c);
        set_flow(&mut part.carbon, yr, c_total_base, c_total_eff, c_comp_base, c_comp_eff);

        let pb = rates.price_base.get(yr);
        let pm = rates.price_meas.get(yr);
        let tsv_k = rates.tsv.cost;
        set_flow(
            &mut part.cost.energy,
            yr,
            e_total_base * pb,
            energy * ((1.0 - captured) * ssb * pb + captured * rp_blend * ssm * pm * tsv_k),
            e_comp_base * pb,
            energy * ((competed - cc) * ssb * pb + cc * rp_now * ssm * pm * tsv_k),
        );

        let ccost = rates.carbon_cost.get(yr);
        set_flow(
            &mut part.cost.carbon,
            yr,
            c_total_base * ccost,
            c_total_eff * ccost,
            c_comp_base * ccost,
            c_comp_eff * ccost,
        );

        if let Some(costs) = costs {
            let cb = costs.base_unit.get(yr);
            let cm = costs.meas_unit.get(yr);
            set_flow(
                &mut part.cost.stock,
                yr,
                stock * cb,
                stock * (captured * cm + (1.0 - captured) * cb),
                stock * competed * cb,
                stock * (cc * cm + (competed - cc) * cb),
            );
        }
    }
    part
}

fn set_stock(
    stock: &mut StockMseg,
    yr: u32,
    total: f64,
    competed: f64,
    cc: f64,
    captured: f64,
) {
    stock.total.all.set(yr, total);
    stock.total.measure.set(yr, total * captured);
    stock.competed.all.set(yr, total * competed);
    stock.competed.measure.set(yr, total * cc);
}

fn set_flow(
    flow: &mut FlowMseg,
    yr: u32,
    total_base: f64,
    total_eff: f64,
    comp_base: f64,
    comp_eff: f64,
) {
    flow.total.baseline.set(yr, total_base);
    flow.total.efficient.set(yr, total_eff);
    flow.competed.baseline.set(yr, comp_base);
    flow.competed.efficient.set(yr, comp_eff);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h() -> Horizon {
        Horizon::new(2025, 2030)
    }

    fn params(scheme: AdoptScheme) -> TurnoverParams {
        TurnoverParams {
            scheme,
            entry_year: 2025,
            exit_year: 2030,
            base_life: YearSeries::splat(h(), 10.0),
            measure_life: 15.0,
            retro_rate: 0.0,
            new_frac: None,
            capture_ceiling: None,
        }
    }

    #[test]
    fn technical_potential_competes_everything_at_entry() {
        let (s, clamps) = turnover_schedule(h(), &params(AdoptScheme::TechnicalPotential));
        assert_eq!(s.competed.get(2025), 1.0);
        assert_eq!(s.captured_total.get(2025), 1.0);
        // Later years carry the full capture but clamp at 1, silently.
        assert_eq!(s.captured_total.get(2030), 1.0);
        assert_eq!(clamps, 0);
    }

    #[test]
    fn max_adoption_turns_over_at_one_over_lifetime() {
        let (s, _) = turnover_schedule(h(), &params(AdoptScheme::MaxAdoptionPotential));
        assert!((s.competed.get(2025) - 0.1).abs() < 1e-12);
        assert!((s.captured_total.get(2025) - 0.1).abs() < 1e-12);
        // Second year competes 1/life of the remaining uncaptured stock.
        assert!((s.competed.get(2026) - 0.09).abs() < 1e-12);
        assert!((s.captured_total.get(2026) - 0.19).abs() < 1e-12);
        // Captured fraction is monotone while units are within lifetime.
        for yr in 2026..=2030 {
            assert!(s.captured_total.get(yr) >= s.captured_total.get(yr - 1));
        }
    }

    #[test]
    fn pre_entry_and_post_exit_years_compete_nothing() {
        let mut p = params(AdoptScheme::MaxAdoptionPotential);
        p.entry_year = 2027;
        p.exit_year = 2028;
        let (s, _) = turnover_schedule(h(), &p);
        assert_eq!(s.competed.get(2026), 0.0);
        assert_eq!(s.captured_total.get(2026), 0.0);
        assert!(s.competed.get(2027) > 0.0);
        assert_eq!(s.competed.get(2029), 0.0);
        // Capture persists after exit, net of retirements.
        assert_eq!(s.captured_total.get(2029), s.captured_total.get(2028));
    }

    #[test]
    fn retrofit_rate_adds_to_existing_competition() {
        let mut p = params(AdoptScheme::MaxAdoptionPotential);
        p.retro_rate = 0.02;
        let (s, _) = turnover_schedule(h(), &p);
        assert!((s.competed.get(2025) - 0.12).abs() < 1e-12);
    }

    #[test]
    fn new_vintage_competes_additions_plus_replacements() {
        let mut p = params(AdoptScheme::MaxAdoptionPotential);
        p.new_frac = Some(YearSeries::splat(h(), 0.5));
        let (s, _) = turnover_schedule(h(), &p);
        assert!((s.competed.get(2025) - 0.55).abs() < 1e-12);
    }

    #[test]
    fn capture_ceiling_limits_captured_not_competed() {
        let mut p = params(AdoptScheme::TechnicalPotential);
        p.capture_ceiling = Some(YearSeries::splat(h(), 0.3));
        let (s, _) = turnover_schedule(h(), &p);
        assert_eq!(s.competed.get(2025), 1.0);
        assert_eq!(s.competed_captured.get(2025), 0.3);
    }

    #[test]
    fn rel_perf_blend_tracks_capture_weights() {
        let mut rel = YearSeries::splat(h(), 0.5);
        rel.set(2026, 0.8);
        let mut sched = TurnoverSchedule::zeros(h());
        // Year 1 captures 0.1 at 0.5; year 2 carries 0.1 and adds 0.1 at 0.8.
        sched.prev_captured.set(2026, 0.1);
        sched.captured_total.set(2025, 0.1);
        sched.captured_total.set(2026, 0.2);
        let blend = blend_rel_perf(h(), &sched, &rel);
        assert_eq!(blend.get(2025), 0.5);
        assert!((blend.get(2026) - 0.65).abs() < 1e-12);
    }

    #[test]
    fn partition_series_are_consistent() {
        let (sched, _) = turnover_schedule(h(), &params(AdoptScheme::MaxAdoptionPotential));
        let rel = YearSeries::splat(h(), 0.5);
        let blend = blend_rel_perf(h(), &sched, &rel);
        let ones = YearSeries::splat(h(), 1.0);
        let carbon = YearSeries::splat(h(), 2.0);
        let price = YearSeries::splat(h(), 3.0);
        let rates = EnergyRates {
            ss_base: &ones,
            ss_meas: &ones,
            carb_base: &carbon,
            carb_meas: &carbon,
            price_base: &price,
            price_meas: &price,
            carbon_cost: &ones,
            tsv: TsvFactor::default(),
        };
        let costs = CostRates {
            base_unit: YearSeries::splat(h(), 100.0),
            meas_unit: YearSeries::splat(h(), 150.0),
        };
        let part = build_partition(
            h(),
            &YearSeries::splat(h(), 1000.0),
            &YearSeries::splat(h(), 50.0),
            &sched,
            &rel,
            &blend,
            &rates,
            Some(&costs),
        );
        // Competed never exceeds total; efficient never exceeds baseline
        // when relative performance < 1.
        for yr in h().years() {
            assert!(part.stock.competed.all.get(yr) <= part.stock.total.all.get(yr) + 1e-9);
            assert!(part.energy.total.efficient.get(yr) <= part.energy.total.baseline.get(yr) + 1e-9);
            assert!(part.energy.competed.efficient.get(yr) <= part.energy.competed.baseline.get(yr) + 1e-9);
            // Carbon follows energy times intensity.
            assert!((part.carbon.total.baseline.get(yr) - part.energy.total.baseline.get(yr) * 2.0).abs() < 1e-9);
        }
        // First year: 10% competed of 1000 units at half relative performance.
        assert!((part.stock.competed.all.get(2025) - 100.0).abs() < 1e-9);
        assert!((part.energy.competed.efficient.get(2025) - 50.0 * 0.1 * 0.5).abs() < 1e-9);
        assert!((part.cost.stock.competed.efficient.get(2025) - 100.0 * 150.0).abs() < 1e-9);
    }
}
