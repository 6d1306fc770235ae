use anyhow::Result;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::calendar::{SeasonCalendar, StepClock};
use crate::catalog::Season;
use crate::conditions::{
    ConditionSnapshot, ConditionsProvider, SnapshotRequest, StochasticConditions,
};
use crate::config::{LifecyclePolicy, SimulationConfig};
use crate::events::{EventLog, SimEvent};
use crate::farmer::StepContext;
use crate::ids::FarmerId;
use crate::plot::LifecycleError;
use crate::strategy::{FixedStrategy, StrategyAdvisor};
use crate::world::{RunReport, World};

pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    pub config: SimulationConfig,
}

pub struct EngineBuilder {
    settings: EngineSettings,
    conditions: Option<Box<dyn ConditionsProvider>>,
    calendar: Option<Box<dyn SeasonCalendar>>,
    advisor: Option<Box<dyn StrategyAdvisor>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            conditions: None,
            calendar: None,
            advisor: None,
        }
    }

    pub fn with_conditions(mut self, provider: impl ConditionsProvider + 'static) -> Self {
        self.conditions = Some(Box::new(provider));
        self
    }

    pub fn with_boxed_conditions(mut self, provider: Box<dyn ConditionsProvider>) -> Self {
        self.conditions = Some(provider);
        self
    }

    pub fn with_calendar(mut self, calendar: impl SeasonCalendar + 'static) -> Self {
        self.calendar = Some(Box::new(calendar));
        self
    }

    pub fn with_advisor(mut self, advisor: impl StrategyAdvisor + 'static) -> Self {
        self.advisor = Some(Box::new(advisor));
        self
    }

    pub fn with_boxed_advisor(mut self, advisor: Box<dyn StrategyAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Anything not supplied falls back to the configured calendar,
    /// stochastic conditions seeded from the settings, and a fixed strategy.
    pub fn build(self, world: World) -> Engine {
        let config = &self.settings.config;
        let calendar = self.calendar.unwrap_or_else(|| config.calendar.build());
        let seed = self.settings.seed;
        let conditions = self
            .conditions
            .unwrap_or_else(|| Box::new(StochasticConditions::new(seed, Default::default())));
        let advisor = self.advisor.unwrap_or_else(|| Box::new(FixedStrategy));
        Engine {
            clock: StepClock::new(config.start_date, world.days_per_step()),
            phase: SimulationPhase::Initializing,
            world,
            conditions,
            calendar,
            advisor,
            settings: self.settings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationPhase {
    Initializing,
    Stepping,
    Completed,
    /// A step returned an error; the engine refuses to step again.
    Failed,
}

#[derive(Debug, Clone)]
pub struct StepSummary {
    pub step: u64,
    pub season: Season,
    pub date: NaiveDate,
    pub revenue_bdt: f64,
    pub events: Vec<SimEvent>,
}

#[derive(Debug, Clone)]
pub enum StepOutcome {
    Continue(StepSummary),
    Stop,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("step {step}: farmer {farmer}: {source}")]
    Lifecycle {
        step: u64,
        farmer: FarmerId,
        #[source]
        source: LifecycleError,
    },
    #[error("engine halted after a failed step; step {step} was not completed")]
    Halted { step: u64 },
    #[error(transparent)]
    Conditions(#[from] anyhow::Error),
}

pub struct Engine {
    world: World,
    conditions: Box<dyn ConditionsProvider>,
    calendar: Box<dyn SeasonCalendar>,
    advisor: Box<dyn StrategyAdvisor>,
    clock: StepClock,
    phase: SimulationPhase,
    settings: EngineSettings,
}

impl Engine {
    pub fn scenario_name(&self) -> &str {
        &self.settings.scenario_name
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.settings.config
    }

    pub fn phase(&self) -> SimulationPhase {
        self.phase
    }

    pub fn current_step(&self) -> u64 {
        self.world.step()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn into_world(self) -> World {
        self.world
    }

    /// Advances the simulation by one step.
    ///
    /// Any error leaves the engine in [`SimulationPhase::Failed`]; later
    /// calls return [`EngineError::Halted`] instead of re-running a step
    /// whose effects may already be partly applied.
    pub fn run_step(&mut self) -> Result<StepOutcome, EngineError> {
        let step = self.world.step();
        if self.phase == SimulationPhase::Failed {
            return Err(EngineError::Halted { step });
        }
        if step >= self.settings.config.max_steps {
            if self.phase != SimulationPhase::Completed {
                info!(steps = step, "simulation completed");
            }
            self.phase = SimulationPhase::Completed;
            return Ok(StepOutcome::Stop);
        }
        self.phase = SimulationPhase::Stepping;

        let outcome = self.step_once(step);
        if let Err(err) = &outcome {
            warn!(step, error = %err, "step failed, engine halted");
            self.phase = SimulationPhase::Failed;
        }
        outcome
    }

    fn step_once(&mut self, step: u64) -> Result<StepOutcome, EngineError> {
        let season = self.calendar.season_for(step);
        let date = self.clock.date_for(step);
        let span = info_span!("step", step, season = %season);
        let _guard = span.enter();

        let plots = self.world.plot_ids();
        let snapshot = self.conditions.snapshot(&SnapshotRequest {
            step,
            date,
            season,
            plots: &plots,
        })?;
        debug!(provider = self.conditions.name(), shocks = snapshot.shocks.len(), "conditions ready");
        self.check_shocks(step, &snapshot)?;

        let catalog = self.world.catalog().clone();
        let ctx = StepContext {
            step,
            date,
            season,
            dt_days: self.clock.days_per_step(),
            catalog: &catalog,
            snapshot: &snapshot,
            config: &self.settings.config,
        };

        let mut events = EventLog::new();
        let mut revenue_bdt = 0.0;
        let farmer_count = self.world.farmers().len();
        for index in 0..farmer_count {
            let farmer = &mut self.world.farmers_mut()[index];
            match farmer.act(&ctx, self.advisor.as_mut(), &mut events) {
                Ok(revenue) => revenue_bdt += revenue,
                Err(source) => {
                    let farmer = farmer.id().clone();
                    self.world.record_events(events.drain());
                    return Err(EngineError::Lifecycle {
                        step,
                        farmer,
                        source,
                    });
                }
            }
        }

        self.world.advance_step();
        let events = events.drain();
        self.world.record_events(events.iter().cloned());
        info!(revenue_bdt, events = events.len(), "step complete");

        Ok(StepOutcome::Continue(StepSummary {
            step,
            season,
            date,
            revenue_bdt,
            events,
        }))
    }

    /// Under the strict policy, rejects a snapshot carrying a shock that
    /// would fail on a cropped plot before any farmer acts on it.
    fn check_shocks(&self, step: u64, snapshot: &ConditionSnapshot) -> Result<(), EngineError> {
        if self.settings.config.lifecycle != LifecyclePolicy::Strict {
            return Ok(());
        }
        for shock in &snapshot.shocks {
            if shock.magnitude.is_finite() && shock.magnitude >= 0.0 {
                continue;
            }
            let Some(plot) = self.world.plot(&shock.plot) else {
                continue;
            };
            if plot.crop().is_none() {
                continue;
            }
            return Err(EngineError::Lifecycle {
                step,
                farmer: plot.owner().clone(),
                source: LifecycleError::InvalidStress {
                    kind: shock.kind,
                    magnitude: shock.magnitude,
                },
            });
        }
        Ok(())
    }

    pub fn run(&mut self) -> Result<RunReport> {
        self.run_with_hook(|_| {})
    }

    pub fn run_with_hook<F>(&mut self, mut hook: F) -> Result<RunReport>
    where
        F: FnMut(&StepSummary),
    {
        while let StepOutcome::Continue(summary) = self.run_step()? {
            hook(&summary);
        }
        Ok(self.world.report(&self.settings.scenario_name))
    }
}
