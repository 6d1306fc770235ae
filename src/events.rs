//! Structured outcome log emitted by the simulation core.

use serde::Serialize;

use crate::catalog::{Season, VarietyId};
use crate::crop::StressKind;
use crate::ids::{FarmerId, PlotId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    Planted {
        step: u64,
        farmer: FarmerId,
        plot: PlotId,
        variety: VarietyId,
        season: Season,
        cost_bdt: f64,
        subsidy_bdt: f64,
    },
    NoSuitableVariety {
        step: u64,
        farmer: FarmerId,
        plot: PlotId,
        season: Season,
    },
    CannotAfford {
        step: u64,
        farmer: FarmerId,
        plot: PlotId,
        variety: VarietyId,
        cost_bdt: f64,
        capital_bdt: f64,
    },
    StressApplied {
        step: u64,
        plot: PlotId,
        kind: StressKind,
        magnitude: f64,
    },
    Harvested {
        step: u64,
        farmer: FarmerId,
        plot: PlotId,
        variety: VarietyId,
        yield_t_ha: f64,
        revenue_bdt: f64,
    },
    PriceFallback {
        step: u64,
        variety: VarietyId,
        price_bdt_ton: f64,
    },
    LifecycleViolation {
        step: u64,
        plot: PlotId,
        detail: String,
    },
    DebtSettled {
        step: u64,
        farmer: FarmerId,
        interest_bdt: f64,
        repaid_bdt: f64,
        outstanding_bdt: f64,
    },
    StrategyRevised {
        step: u64,
        farmer: FarmerId,
        salinity_threshold_ds_m: f64,
    },
    OwnershipReassigned {
        plot: PlotId,
        from: FarmerId,
        to: FarmerId,
    },
}

impl SimEvent {
    pub fn step(&self) -> Option<u64> {
        match self {
            SimEvent::Planted { step, .. }
            | SimEvent::NoSuitableVariety { step, .. }
            | SimEvent::CannotAfford { step, .. }
            | SimEvent::StressApplied { step, .. }
            | SimEvent::Harvested { step, .. }
            | SimEvent::PriceFallback { step, .. }
            | SimEvent::LifecycleViolation { step, .. }
            | SimEvent::DebtSettled { step, .. }
            | SimEvent::StrategyRevised { step, .. } => Some(*step),
            SimEvent::OwnershipReassigned { .. } => None,
        }
    }

    pub fn is_lifecycle_violation(&self) -> bool {
        matches!(self, SimEvent::LifecycleViolation { .. })
    }
}

/// Append-only collection of events, drained by the engine once per step.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<SimEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Extend<SimEvent> for EventLog {
    fn extend<T: IntoIterator<Item = SimEvent>>(&mut self, iter: T) {
        self.events.extend(iter);
    }
}
