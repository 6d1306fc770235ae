use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use paddysim::{
    catalog::Catalog,
    conditions::{StochasticConditions, StochasticSettings},
    config::{DecisionPolicy, SimulationConfig},
    engine::{EngineBuilder, EngineSettings},
    farmer::FarmerAgent,
    ids::{FarmerId, PlotId},
    plot::{FarmPlot, SoilState},
    strategy::{Strategy, TrendAdvisor},
    world::World,
};

fn build_world(n_farmers: usize, plots_per_farmer: usize) -> World {
    let strategy = Strategy::from_policy(&DecisionPolicy::default());
    let mut farmers = Vec::with_capacity(n_farmers);
    let mut plots = Vec::with_capacity(n_farmers * plots_per_farmer);
    for i in 0..n_farmers {
        let id = FarmerId::new(format!("farmer_{i:04}"));
        farmers.push(FarmerAgent::new(
            id.clone(),
            format!("hh_{i:04}"),
            40_000.0 + (i % 7) as f64 * 10_000.0,
            strategy.clone(),
        ));
        for p in 0..plots_per_farmer {
            plots.push(FarmPlot::new(
                PlotId::new(format!("plot_{i:04}_{p}")),
                id.clone(),
                0.3 + p as f64 * 0.2,
                SoilState::new("Clay Loam", 1.2, 6.8, 1.0 + (i % 5) as f64, 90.0, 150.0),
            ));
        }
    }
    World::from_dataset(
        Arc::new(Catalog::bangladesh_default()),
        120,
        farmers,
        plots,
    )
    .unwrap()
}

fn bench_run(c: &mut Criterion) {
    c.bench_function("run_30_steps_200_farmers", |b| {
        b.iter(|| {
            let settings = EngineSettings {
                scenario_name: "bench".into(),
                seed: 42,
                config: SimulationConfig {
                    max_steps: 30,
                    ..SimulationConfig::default()
                },
            };
            let settings_noise = StochasticSettings {
                price_noise: 0.05,
                flood_probability: 0.05,
                flood_magnitude: 0.2,
                ..StochasticSettings::default()
            };
            let mut engine = EngineBuilder::new(settings)
                .with_conditions(StochasticConditions::new(42, settings_noise))
                .with_advisor(TrendAdvisor::default())
                .build(build_world(200, 2));
            black_box(engine.run().unwrap())
        })
    });
}

criterion_group!(benches, bench_run);
criterion_main!(benches);
