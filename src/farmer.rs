//! Farmer households and their per-step decision model.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{best_by_yield, Catalog, Season, Variety};
use crate::conditions::ConditionSnapshot;
use crate::config::{LifecyclePolicy, SimulationConfig};
use crate::events::{EventLog, SimEvent};
use crate::ids::{FarmerId, LocationId, PlotId};
use crate::plot::{FarmPlot, LifecycleError, PlotState};
use crate::strategy::{ReviewContext, Strategy, StrategyAdvisor};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandCategory {
    Landless,
    #[default]
    Marginal,
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub education_years: u32,
    #[serde(default)]
    pub farming_experience_years: u32,
}

/// Everything a farmer needs to see during one step.
pub struct StepContext<'a> {
    pub step: u64,
    pub date: NaiveDate,
    pub season: Season,
    pub dt_days: u32,
    pub catalog: &'a Catalog,
    pub snapshot: &'a ConditionSnapshot,
    pub config: &'a SimulationConfig,
}

impl StepContext<'_> {
    /// Active input subsidy rate: a finite policy signal overrides the
    /// configured rate. A rate that is still not finite counts as no subsidy.
    pub fn input_subsidy_rate(&self) -> f64 {
        let rate = self
            .snapshot
            .policy
            .input_subsidy_rate
            .filter(|rate| rate.is_finite())
            .unwrap_or(self.config.finance.input_subsidy_rate);
        if rate.is_finite() {
            rate.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct FarmerAgent {
    id: FarmerId,
    household_id: String,
    capital_bdt: f64,
    debt_bdt: f64,
    subsidy_received_bdt: f64,
    pub demographics: Demographics,
    pub risk_aversion: f64,
    pub land_category: LandCategory,
    pub location: Option<LocationId>,
    pub expected_plot_count: Option<usize>,
    strategy: Strategy,
    plots: Vec<FarmPlot>,
}

impl FarmerAgent {
    pub fn new(
        id: FarmerId,
        household_id: impl Into<String>,
        capital_bdt: f64,
        strategy: Strategy,
    ) -> Self {
        Self {
            id,
            household_id: household_id.into(),
            capital_bdt,
            debt_bdt: 0.0,
            subsidy_received_bdt: 0.0,
            demographics: Demographics::default(),
            risk_aversion: 0.5,
            land_category: LandCategory::default(),
            location: None,
            expected_plot_count: None,
            strategy,
            plots: Vec::new(),
        }
    }

    pub fn with_debt(mut self, debt_bdt: f64) -> Self {
        self.debt_bdt = debt_bdt.max(0.0);
        self
    }

    pub fn id(&self) -> &FarmerId {
        &self.id
    }

    pub fn household_id(&self) -> &str {
        &self.household_id
    }

    pub fn capital_bdt(&self) -> f64 {
        self.capital_bdt
    }

    pub fn debt_bdt(&self) -> f64 {
        self.debt_bdt
    }

    pub fn subsidy_received_bdt(&self) -> f64 {
        self.subsidy_received_bdt
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn plots(&self) -> &[FarmPlot] {
        &self.plots
    }

    pub fn plot(&self, id: &PlotId) -> Option<&FarmPlot> {
        self.plots.iter().find(|plot| plot.id() == id)
    }

    pub fn plot_mut(&mut self, id: &PlotId) -> Option<&mut FarmPlot> {
        self.plots.iter_mut().find(|plot| plot.id() == id)
    }

    pub fn total_area_ha(&self) -> f64 {
        self.plots.iter().map(FarmPlot::area_ha).sum()
    }

    /// Takes ownership of `plot`, rewriting its owner if needed.
    pub fn add_plot(&mut self, mut plot: FarmPlot) {
        if plot.owner() != &self.id {
            plot.transfer_to(self.id.clone());
        }
        info!(farmer = %self.id, plot = %plot.id(), area_ha = plot.area_ha(), "plot added");
        self.plots.push(plot);
    }

    pub fn release_plot(&mut self, id: &PlotId) -> Option<FarmPlot> {
        let index = self.plots.iter().position(|plot| plot.id() == id)?;
        let plot = self.plots.remove(index);
        info!(farmer = %self.id, plot = %plot.id(), "plot released");
        Some(plot)
    }

    /// Choose a variety for a fallow plot under the active season, the
    /// plot's salinity outlook and the farmer's capital.
    pub fn select_variety(
        &self,
        season: Season,
        salinity_outlook_ds_m: f64,
        catalog: &Catalog,
    ) -> Option<Arc<Variety>> {
        let candidates: Vec<&Arc<Variety>> = catalog.for_season(season).collect();

        if salinity_outlook_ds_m > self.strategy.salinity_threshold_ds_m {
            let tolerant = candidates.iter().copied().filter(|variety| {
                variety
                    .salinity_tolerance()
                    .is_some_and(|limit| limit >= salinity_outlook_ds_m)
            });
            if let Some(variety) = best_by_yield(tolerant) {
                return Some(Arc::clone(variety));
            }
        }

        let budget_per_plot = if self.plots.is_empty() {
            self.capital_bdt
        } else {
            self.capital_bdt / self.plots.len() as f64
        };
        let affordable = candidates
            .iter()
            .copied()
            .filter(|variety| variety.high_yield && variety.input_cost_bdt_ha <= budget_per_plot);
        if let Some(variety) = best_by_yield(affordable) {
            return Some(Arc::clone(variety));
        }

        best_by_yield(candidates).cloned()
    }

    /// Runs this farmer through one step and returns the harvest revenue
    /// realized in it.
    pub fn act(
        &mut self,
        ctx: &StepContext<'_>,
        advisor: &mut dyn StrategyAdvisor,
        events: &mut EventLog,
    ) -> Result<f64, LifecycleError> {
        self.update_plots(ctx, events)?;
        self.make_cultivation_decisions(ctx, events)?;
        let revenue = self.harvest_mature(ctx, events)?;
        self.settle_finances(revenue, ctx, events);
        self.review_strategy(ctx, advisor, events);
        Ok(revenue)
    }

    pub fn update_plots(
        &mut self,
        ctx: &StepContext<'_>,
        events: &mut EventLog,
    ) -> Result<(), LifecycleError> {
        let stress_policy = &ctx.config.stress;
        for index in 0..self.plots.len() {
            let plot = &mut self.plots[index];
            let reading = ctx.snapshot.reading_for(plot.id(), self.location.as_ref());
            let update = plot.update_conditions(reading, ctx.dt_days, stress_policy);
            for (kind, magnitude) in update.applied {
                events.push(SimEvent::StressApplied {
                    step: ctx.step,
                    plot: plot.id().clone(),
                    kind,
                    magnitude,
                });
            }

            let plot_id = plot.id().clone();
            for shock in ctx.snapshot.shocks_for(&plot_id) {
                if plot.crop().is_none() {
                    debug!(plot = %plot_id, kind = %shock.kind, "shock on fallow plot ignored");
                    continue;
                }
                let magnitude = shock.magnitude * plot.shock_factor(shock.kind, stress_policy);
                match plot.apply_stress(shock.kind, magnitude, stress_policy) {
                    Ok(()) => events.push(SimEvent::StressApplied {
                        step: ctx.step,
                        plot: plot_id.clone(),
                        kind: shock.kind,
                        magnitude,
                    }),
                    Err(err) => handle_violation(ctx, plot_id.clone(), err, events)?,
                }
            }
        }
        Ok(())
    }

    fn make_cultivation_decisions(
        &mut self,
        ctx: &StepContext<'_>,
        events: &mut EventLog,
    ) -> Result<(), LifecycleError> {
        let subsidy_rate = ctx.input_subsidy_rate();
        for index in 0..self.plots.len() {
            if self.plots[index].state() != PlotState::Fallow {
                continue;
            }
            let plot_id = self.plots[index].id().clone();
            let outlook = ctx
                .snapshot
                .reading_for(&plot_id, self.location.as_ref())
                .salinity_outlook_ds_m;

            let Some(variety) = self.select_variety(ctx.season, outlook, ctx.catalog) else {
                debug!(farmer = %self.id, plot = %plot_id, season = %ctx.season, "no suitable variety");
                events.push(SimEvent::NoSuitableVariety {
                    step: ctx.step,
                    farmer: self.id.clone(),
                    plot: plot_id,
                    season: ctx.season,
                });
                continue;
            };

            let gross_cost = variety.input_cost_bdt_ha * self.plots[index].area_ha();
            let net_cost = gross_cost * (1.0 - subsidy_rate);
            if net_cost > self.capital_bdt {
                debug!(
                    farmer = %self.id,
                    plot = %plot_id,
                    variety = %variety.id,
                    cost_bdt = net_cost,
                    capital_bdt = self.capital_bdt,
                    "cannot afford inputs"
                );
                events.push(SimEvent::CannotAfford {
                    step: ctx.step,
                    farmer: self.id.clone(),
                    plot: plot_id,
                    variety: variety.id.clone(),
                    cost_bdt: net_cost,
                    capital_bdt: self.capital_bdt,
                });
                continue;
            }

            let variety_id = variety.id.clone();
            match self.plots[index].plant(variety, ctx.season, ctx.step, ctx.date) {
                Ok(()) => {
                    self.capital_bdt -= net_cost;
                    self.subsidy_received_bdt += gross_cost - net_cost;
                    info!(
                        farmer = %self.id,
                        plot = %plot_id,
                        variety = %variety_id,
                        capital_bdt = self.capital_bdt,
                        "planted"
                    );
                    events.push(SimEvent::Planted {
                        step: ctx.step,
                        farmer: self.id.clone(),
                        plot: plot_id,
                        variety: variety_id,
                        season: ctx.season,
                        cost_bdt: net_cost,
                        subsidy_bdt: gross_cost - net_cost,
                    });
                }
                Err(err) => handle_violation(ctx, plot_id, err, events)?,
            }
        }
        Ok(())
    }

    fn harvest_mature(
        &mut self,
        ctx: &StepContext<'_>,
        events: &mut EventLog,
    ) -> Result<f64, LifecycleError> {
        let mut revenue_total = 0.0;
        for plot in self.plots.iter_mut() {
            if plot.state() != PlotState::MatureReady {
                continue;
            }
            let Some(expected_yield) = plot.crop().map(|crop| crop.expected_yield_t_ha()) else {
                continue;
            };
            let crop = match plot.harvest(ctx.date, expected_yield) {
                Ok(crop) => crop,
                Err(err) => {
                    handle_violation(ctx, plot.id().clone(), err, events)?;
                    continue;
                }
            };

            let variety_id = crop.variety().id.clone();
            let quote = ctx.snapshot.market.price_for(&variety_id);
            if quote.fallback {
                debug!(variety = %variety_id, price = quote.bdt_per_ton, "no market price, using default");
                events.push(SimEvent::PriceFallback {
                    step: ctx.step,
                    variety: variety_id.clone(),
                    price_bdt_ton: quote.bdt_per_ton,
                });
            }
            let revenue = expected_yield * plot.area_ha() * quote.bdt_per_ton;
            self.capital_bdt += revenue;
            revenue_total += revenue;
            info!(
                farmer = %self.id,
                plot = %plot.id(),
                variety = %variety_id,
                yield_t_ha = expected_yield,
                revenue_bdt = revenue,
                "harvested"
            );
            events.push(SimEvent::Harvested {
                step: ctx.step,
                farmer: self.id.clone(),
                plot: plot.id().clone(),
                variety: variety_id,
                yield_t_ha: expected_yield,
                revenue_bdt: revenue,
            });
        }
        Ok(revenue_total)
    }

    /// Accrues interest on outstanding debt and repays part of it from this
    /// step's revenue. Capital is never driven below zero.
    pub fn settle_finances(&mut self, revenue_bdt: f64, ctx: &StepContext<'_>, events: &mut EventLog) {
        if self.debt_bdt <= 0.0 {
            return;
        }
        let finance = &ctx.config.finance;
        let interest = self.debt_bdt * finance.annual_interest_rate.max(0.0) * ctx.dt_days as f64 / 365.0;
        self.debt_bdt += interest;

        let repaid = (revenue_bdt.max(0.0) * finance.repayment_share.clamp(0.0, 1.0))
            .min(self.debt_bdt)
            .min(self.capital_bdt.max(0.0));
        self.capital_bdt -= repaid;
        self.debt_bdt -= repaid;

        debug!(
            farmer = %self.id,
            interest_bdt = interest,
            repaid_bdt = repaid,
            outstanding_bdt = self.debt_bdt,
            "debt settled"
        );
        events.push(SimEvent::DebtSettled {
            step: ctx.step,
            farmer: self.id.clone(),
            interest_bdt: interest,
            repaid_bdt: repaid,
            outstanding_bdt: self.debt_bdt,
        });
    }

    pub fn review_strategy(
        &mut self,
        ctx: &StepContext<'_>,
        advisor: &mut dyn StrategyAdvisor,
        events: &mut EventLog,
    ) {
        let interval = ctx.config.decision.strategy_review_interval;
        if interval == 0 || ctx.step % interval != 0 {
            return;
        }
        let review = ReviewContext {
            step: ctx.step,
            risk_aversion: self.risk_aversion,
            trends: &ctx.snapshot.trends,
            policy: &ctx.snapshot.policy,
            defaults: &ctx.config.decision,
        };
        if let Some(revised) = advisor.review(&self.strategy, &review) {
            info!(
                farmer = %self.id,
                advisor = advisor.name(),
                from = self.strategy.salinity_threshold_ds_m,
                to = revised.salinity_threshold_ds_m,
                "strategy revised"
            );
            events.push(SimEvent::StrategyRevised {
                step: ctx.step,
                farmer: self.id.clone(),
                salinity_threshold_ds_m: revised.salinity_threshold_ds_m,
            });
            self.strategy = revised;
        }
    }
}

fn handle_violation(
    ctx: &StepContext<'_>,
    plot: PlotId,
    err: LifecycleError,
    events: &mut EventLog,
) -> Result<(), LifecycleError> {
    match ctx.config.lifecycle {
        LifecyclePolicy::Strict => Err(err),
        LifecyclePolicy::Relaxed => {
            warn!(step = ctx.step, plot = %plot, error = %err, "lifecycle violation");
            events.push(SimEvent::LifecycleViolation {
                step: ctx.step,
                plot,
                detail: err.to_string(),
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Tolerances, VarietyId};
    use crate::config::DecisionPolicy;
    use crate::plot::SoilState;
    use crate::strategy::FixedStrategy;

    fn variety(id: &str, yield_t_ha: f64, cost: f64, salinity: Option<f64>) -> Variety {
        Variety {
            id: VarietyId::new(id),
            name: id.to_string(),
            season: Season::Boro,
            high_yield: true,
            potential_yield_t_ha: yield_t_ha,
            maturity_days: 140,
            tolerances: Tolerances {
                salinity_ds_m: salinity,
                ..Tolerances::default()
            },
            water_requirement_mm: 1_200.0,
            input_cost_bdt_ha: cost,
        }
    }

    fn farmer(capital: f64) -> FarmerAgent {
        let mut farmer = FarmerAgent::new(
            FarmerId::new("f1"),
            "hh1",
            capital,
            Strategy::from_policy(&DecisionPolicy::default()),
        );
        farmer.add_plot(FarmPlot::new(
            PlotId::new("p1"),
            FarmerId::new("f1"),
            1.0,
            SoilState::default(),
        ));
        farmer
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    #[test]
    fn saline_outlook_prefers_tolerant_variety() {
        let catalog = Catalog::new(vec![
            variety("high", 7.0, 20_000.0, None),
            variety("tolerant", 5.5, 20_000.0, Some(8.0)),
        ])
        .unwrap();
        let farmer = farmer(50_000.0);
        let chosen = farmer.select_variety(Season::Boro, 5.0, &catalog).unwrap();
        assert_eq!(chosen.id.as_str(), "tolerant");
        let chosen = farmer.select_variety(Season::Boro, 3.0, &catalog).unwrap();
        assert_eq!(chosen.id.as_str(), "high");
    }

    #[test]
    fn insufficient_tolerance_falls_through_to_yield() {
        let catalog = Catalog::new(vec![
            variety("high", 7.0, 20_000.0, None),
            variety("tolerant", 5.5, 20_000.0, Some(8.0)),
        ])
        .unwrap();
        let chosen = farmer(50_000.0)
            .select_variety(Season::Boro, 9.0, &catalog)
            .unwrap();
        assert_eq!(chosen.id.as_str(), "high");
    }

    #[test]
    fn unaffordable_tier_falls_back_to_highest_yield() {
        let catalog = Catalog::new(vec![
            variety("cheap", 4.0, 5_000.0, None),
            variety("dear", 7.0, 60_000.0, None),
        ])
        .unwrap();
        let modest = farmer(10_000.0);
        assert_eq!(
            modest
                .select_variety(Season::Boro, 0.0, &catalog)
                .unwrap()
                .id
                .as_str(),
            "cheap"
        );
        let poor = farmer(1_000.0);
        assert_eq!(
            poor
                .select_variety(Season::Boro, 0.0, &catalog)
                .unwrap()
                .id
                .as_str(),
            "dear"
        );
    }

    #[test]
    fn equal_yields_break_ties_by_id() {
        let catalog = Catalog::new(vec![
            variety("zeta", 6.0, 20_000.0, None),
            variety("alpha", 6.0, 20_000.0, None),
        ])
        .unwrap();
        let chosen = farmer(50_000.0)
            .select_variety(Season::Boro, 0.0, &catalog)
            .unwrap();
        assert_eq!(chosen.id.as_str(), "alpha");
    }

    #[test]
    fn off_season_catalog_yields_nothing() {
        let catalog = Catalog::new(vec![variety("boro", 6.0, 20_000.0, None)]).unwrap();
        assert!(farmer(50_000.0)
            .select_variety(Season::Aman, 0.0, &catalog)
            .is_none());
    }

    #[test]
    fn subsidy_reduces_cost_and_is_accumulated() {
        let catalog = Catalog::new(vec![variety("boro", 6.0, 20_000.0, None)]).unwrap();
        let mut config = SimulationConfig::default();
        config.finance.input_subsidy_rate = 0.25;
        let snapshot = ConditionSnapshot::default();
        let ctx = StepContext {
            step: 1,
            date: date(),
            season: Season::Boro,
            dt_days: 120,
            catalog: &catalog,
            snapshot: &snapshot,
            config: &config,
        };
        let mut farmer = farmer(50_000.0);
        let mut events = EventLog::new();
        farmer.act(&ctx, &mut FixedStrategy, &mut events).unwrap();
        assert_eq!(farmer.capital_bdt(), 35_000.0);
        assert_eq!(farmer.subsidy_received_bdt(), 5_000.0);
        assert_eq!(farmer.plots()[0].state(), PlotState::Planted);
    }

    #[test]
    fn non_finite_policy_subsidy_falls_back_to_configured_rate() {
        let catalog = Catalog::new(vec![variety("boro", 6.0, 20_000.0, None)]).unwrap();
        let mut config = SimulationConfig::default();
        config.finance.input_subsidy_rate = 0.25;
        let mut snapshot = ConditionSnapshot::default();
        snapshot.policy.input_subsidy_rate = Some(f64::NAN);
        let ctx = StepContext {
            step: 1,
            date: date(),
            season: Season::Boro,
            dt_days: 120,
            catalog: &catalog,
            snapshot: &snapshot,
            config: &config,
        };
        assert_eq!(ctx.input_subsidy_rate(), 0.25);

        let mut farmer = farmer(50_000.0);
        let mut events = EventLog::new();
        farmer.act(&ctx, &mut FixedStrategy, &mut events).unwrap();
        assert_eq!(farmer.capital_bdt(), 35_000.0);

        let mut nan_config = config.clone();
        nan_config.finance.input_subsidy_rate = f64::NAN;
        let ctx = StepContext {
            config: &nan_config,
            ..ctx
        };
        assert_eq!(ctx.input_subsidy_rate(), 0.0);
    }

    #[test]
    fn debt_accrues_interest_and_is_repaid_from_revenue() {
        let catalog = Catalog::default();
        let config = SimulationConfig::default();
        let snapshot = ConditionSnapshot::default();
        let ctx = StepContext {
            step: 1,
            date: date(),
            season: Season::Boro,
            dt_days: 365,
            catalog: &catalog,
            snapshot: &snapshot,
            config: &config,
        };
        let mut farmer = farmer(100_000.0).with_debt(10_000.0);
        let mut events = EventLog::new();
        farmer.settle_finances(4_000.0, &ctx, &mut events);
        assert!((farmer.debt_bdt() - 8_800.0).abs() < 1e-6);
        assert!((farmer.capital_bdt() - 98_000.0).abs() < 1e-6);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn plots_move_between_farmers_with_owner_rewritten() {
        let mut from = farmer(0.0);
        let mut to = FarmerAgent::new(
            FarmerId::new("f2"),
            "hh2",
            0.0,
            Strategy::from_policy(&DecisionPolicy::default()),
        );
        let plot = from.release_plot(&PlotId::new("p1")).unwrap();
        to.add_plot(plot);
        assert!(from.plots().is_empty());
        assert_eq!(to.plots()[0].owner().as_str(), "f2");
        assert_eq!(to.total_area_ha(), 1.0);
    }
}
