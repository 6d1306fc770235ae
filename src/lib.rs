pub mod calendar;
pub mod catalog;
pub mod conditions;
pub mod config;
pub mod crop;
pub mod engine;
pub mod events;
pub mod farmer;
pub mod ids;
pub mod logging;
pub mod plot;
pub mod rng;
pub mod scenario;
pub mod strategy;
pub mod world;

pub use config::SimulationConfig;
pub use engine::{Engine, EngineBuilder, EngineSettings, StepOutcome, StepSummary};
pub use scenario::{Scenario, ScenarioLoader};
pub use world::{RunReport, World};
