#![allow(dead_code)]

use std::sync::Arc;

use paddysim::{
    calendar::FixedCalendar,
    catalog::{Catalog, Season, Tolerances, Variety, VarietyId},
    conditions::{ConditionSnapshot, MarketSnapshot, ScriptedConditions},
    config::{DecisionPolicy, SimulationConfig},
    engine::{Engine, EngineBuilder, EngineSettings},
    farmer::FarmerAgent,
    ids::{FarmerId, PlotId},
    plot::{FarmPlot, SoilState},
    strategy::Strategy,
    world::World,
};

pub fn boro_variety(id: &str, yield_t_ha: f64, salinity: Option<f64>) -> Variety {
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
        input_cost_bdt_ha: 20_000.0,
    }
}

pub fn dhan28_only() -> Arc<Catalog> {
    Arc::new(Catalog::new(vec![boro_variety("brri_dhan28", 6.0, None)]).unwrap())
}

pub fn single_farmer_world(catalog: Arc<Catalog>, capital: f64) -> World {
    let farmer = FarmerAgent::new(
        FarmerId::new("farmer_1"),
        "hh_1",
        capital,
        Strategy::from_policy(&DecisionPolicy::default()),
    );
    let plot = FarmPlot::new(
        PlotId::new("plot_1"),
        FarmerId::new("farmer_1"),
        1.0,
        SoilState::default(),
    );
    World::from_dataset(catalog, 120, vec![farmer], vec![plot]).unwrap()
}

pub fn calm_snapshot(salinity_outlook_ds_m: f64) -> ConditionSnapshot {
    let mut snapshot = ConditionSnapshot {
        market: MarketSnapshot::default().with_price("brri_dhan28", 32_000.0),
        ..ConditionSnapshot::default()
    };
    snapshot.regional.salinity_outlook_ds_m = salinity_outlook_ds_m;
    snapshot
}

pub fn config(max_steps: u64) -> SimulationConfig {
    SimulationConfig {
        max_steps,
        ..SimulationConfig::default()
    }
}

pub fn boro_engine(world: World, frames: Vec<ConditionSnapshot>, config: SimulationConfig) -> Engine {
    let settings = EngineSettings {
        scenario_name: "boro_test".into(),
        seed: 1,
        config,
    };
    EngineBuilder::new(settings)
        .with_calendar(FixedCalendar(Season::Boro))
        .with_conditions(ScriptedConditions::new(frames))
        .build(world)
}

pub fn capital(engine: &Engine) -> f64 {
    engine.world().farmers()[0].capital_bdt()
}
