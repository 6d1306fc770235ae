mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use common::*;
use paddysim::{
    catalog::{Catalog, Season, VarietyId},
    conditions::ConditionSnapshot,
    config::{DecisionPolicy, SimulationConfig, StressPolicy},
    crop::StressKind,
    events::EventLog,
    farmer::{FarmerAgent, StepContext},
    ids::{FarmerId, PlotId},
    plot::{FarmPlot, LifecycleError, PlotState, SoilState},
    strategy::{FixedStrategy, Strategy},
};
use proptest::prelude::*;

const KINDS: [StressKind; 5] = [
    StressKind::Water,
    StressKind::Salinity,
    StressKind::Flood,
    StressKind::Heat,
    StressKind::Pest,
];

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 11, 15).unwrap()
}

fn fresh_plot(area_ha: f64) -> FarmPlot {
    FarmPlot::new(
        PlotId::new("plot_1"),
        FarmerId::new("farmer_1"),
        area_ha,
        SoilState::default(),
    )
}

fn dhan28(catalog: &Catalog) -> Arc<paddysim::catalog::Variety> {
    catalog.get(&VarietyId::new("brri_dhan28")).cloned().unwrap()
}

#[test]
fn off_season_planting_creates_nothing() {
    let catalog = Catalog::bangladesh_default();
    let mut plot = fresh_plot(1.0);
    for season in [Season::Aus, Season::Aman] {
        let err = plot.plant(dhan28(&catalog), season, 0, date()).unwrap_err();
        assert!(matches!(err, LifecycleError::IncompatibleSeason { .. }));
    }
    assert_eq!(plot.state(), PlotState::Fallow);
}

proptest! {
    #[test]
    fn planting_never_overdraws_capital(
        capital in 0.0f64..200_000.0,
        area in 0.05f64..5.0,
        subsidy in 0.0f64..1.0,
    ) {
        let catalog = dhan28_only();
        let mut config = SimulationConfig::default();
        config.finance.input_subsidy_rate = subsidy;
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
        let mut farmer = FarmerAgent::new(
            FarmerId::new("farmer_1"),
            "hh_1",
            capital,
            Strategy::from_policy(&DecisionPolicy::default()),
        );
        farmer.add_plot(fresh_plot(area));
        let mut events = EventLog::new();
        farmer.act(&ctx, &mut FixedStrategy, &mut events).unwrap();

        let cost = 20_000.0 * area * (1.0 - subsidy);
        prop_assert!(farmer.capital_bdt() >= 0.0);
        if cost <= capital {
            prop_assert_eq!(farmer.plots()[0].state(), PlotState::Planted);
            prop_assert!((farmer.capital_bdt() - (capital - cost)).abs() < 1e-6);
        } else {
            prop_assert_eq!(farmer.plots()[0].state(), PlotState::Fallow);
            prop_assert_eq!(farmer.capital_bdt(), capital);
        }
    }

    #[test]
    fn harvest_yield_follows_accumulated_stress(
        stresses in proptest::collection::vec((0usize..5, 0.0f64..0.6), 0..8),
        clamp in any::<bool>(),
    ) {
        let catalog = Catalog::bangladesh_default();
        let policy = StressPolicy { clamp_per_kind: clamp, ..StressPolicy::default() };
        let mut plot = fresh_plot(1.0);
        plot.plant(dhan28(&catalog), Season::Boro, 0, date()).unwrap();
        for (kind, magnitude) in &stresses {
            plot.apply_stress(KINDS[*kind], *magnitude, &policy).unwrap();
        }
        let crop = plot.crop().unwrap();
        if clamp {
            prop_assert!(crop.stress().values().all(|value| (0.0..=1.0).contains(value)));
        }
        let total: f64 = crop.stress().values().sum();
        let expected = 6.0 * (1.0 - total).max(0.0);
        let expected_yield = crop.expected_yield_t_ha();
        prop_assert!((expected_yield - expected).abs() < 1e-9);

        let finalized = plot.harvest(date(), expected_yield).unwrap();
        prop_assert_eq!(finalized.actual_yield_t_ha(), Some(finalized.expected_yield_t_ha()));
        prop_assert!(plot.crop().is_none());
        prop_assert_eq!(plot.history().len(), 1);
    }

    #[test]
    fn second_planting_always_fails_and_keeps_the_crop(elapsed in 0u32..400) {
        let catalog = Catalog::bangladesh_default();
        let mut plot = fresh_plot(1.0);
        plot.plant(dhan28(&catalog), Season::Boro, 0, date()).unwrap();
        let reading = Default::default();
        plot.update_conditions(&reading, elapsed, &StressPolicy::default());
        let before = plot.crop().unwrap().elapsed_days();

        let second = catalog.get(&VarietyId::new("brri_dhan29")).cloned().unwrap();
        let is_occupied = matches!(
            plot.plant(second, Season::Boro, 1, date()),
            Err(LifecycleError::PlotOccupied { .. })
        );
        prop_assert!(is_occupied);
        let crop = plot.crop().unwrap();
        prop_assert_eq!(crop.variety().id.as_str(), "brri_dhan28");
        prop_assert_eq!(crop.elapsed_days(), before);
    }
}
