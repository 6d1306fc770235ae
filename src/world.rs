use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::events::{EventLog, SimEvent};
use crate::farmer::FarmerAgent;
use crate::ids::{FarmerId, PlotId};
use crate::plot::{CultivationRecord, FarmPlot};

#[derive(Debug, Error, PartialEq)]
pub enum SetupError {
    #[error("farmer {0} registered more than once")]
    DuplicateFarmer(FarmerId),
    #[error("plot {0} registered more than once")]
    DuplicatePlot(PlotId),
    #[error("plot {0} cannot be assigned: no farmers registered")]
    Unassignable(PlotId),
}

#[derive(Debug, Error, PartialEq)]
pub enum TransferError {
    #[error("unknown plot {0}")]
    UnknownPlot(PlotId),
    #[error("unknown farmer {0}")]
    UnknownFarmer(FarmerId),
}

#[derive(Debug, Clone, Serialize)]
pub struct PlotSummary {
    pub id: PlotId,
    pub area_ha: f64,
    pub salinity_ds_m: f64,
    pub salinity_drift_ds_m: f64,
    /// Health of the standing crop, if any.
    pub crop_health: Option<f64>,
    pub last_cultivation: Option<CultivationRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FarmerSummary {
    pub id: FarmerId,
    pub capital_bdt: f64,
    pub debt_bdt: f64,
    pub subsidy_received_bdt: f64,
    pub plot_count: usize,
    pub total_area_ha: f64,
    pub plots: Vec<PlotSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenario: String,
    pub steps: u64,
    pub days_elapsed: u64,
    pub total_capital_bdt: f64,
    pub total_debt_bdt: f64,
    pub harvests: usize,
    pub lifecycle_violations: usize,
    pub farmers: Vec<FarmerSummary>,
}

/// Registry of farmer agents (and through them, their plots) plus the
/// simulation clock.
pub struct World {
    step: u64,
    days_elapsed: u64,
    days_per_step: u32,
    catalog: Arc<Catalog>,
    farmers: Vec<FarmerAgent>,
    log: EventLog,
}

impl World {
    pub fn new(catalog: Arc<Catalog>, days_per_step: u32) -> Self {
        Self {
            step: 0,
            days_elapsed: 0,
            days_per_step,
            catalog,
            farmers: Vec::new(),
            log: EventLog::new(),
        }
    }

    /// Builds the registry from validated records. Farmers keep their
    /// input order; plots naming an unknown owner go to the first farmer.
    pub fn from_dataset(
        catalog: Arc<Catalog>,
        days_per_step: u32,
        farmers: Vec<FarmerAgent>,
        plots: Vec<FarmPlot>,
    ) -> Result<Self, SetupError> {
        let mut world = World::new(catalog, days_per_step);

        let mut farmer_ids = BTreeSet::new();
        for farmer in &farmers {
            if !farmer_ids.insert(farmer.id().clone()) {
                return Err(SetupError::DuplicateFarmer(farmer.id().clone()));
            }
        }
        let mut plot_ids: BTreeSet<PlotId> = farmers
            .iter()
            .flat_map(|farmer| farmer.plots().iter().map(|plot| plot.id().clone()))
            .collect();
        for plot in &plots {
            if !plot_ids.insert(plot.id().clone()) {
                return Err(SetupError::DuplicatePlot(plot.id().clone()));
            }
        }
        world.farmers = farmers;

        for plot in plots {
            match world.farmer_index(plot.owner()) {
                Some(index) => world.farmers[index].add_plot(plot),
                None => {
                    let Some(first) = world.farmers.first_mut() else {
                        return Err(SetupError::Unassignable(plot.id().clone()));
                    };
                    warn!(
                        plot = %plot.id(),
                        owner = %plot.owner(),
                        fallback = %first.id(),
                        "plot owner not registered, assigning to first farmer"
                    );
                    world.log.push(SimEvent::OwnershipReassigned {
                        plot: plot.id().clone(),
                        from: plot.owner().clone(),
                        to: first.id().clone(),
                    });
                    first.add_plot(plot);
                }
            }
        }

        for farmer in &world.farmers {
            if let Some(expected) = farmer.expected_plot_count {
                if expected != farmer.plots().len() {
                    warn!(
                        farmer = %farmer.id(),
                        expected,
                        actual = farmer.plots().len(),
                        "plot count differs from household record"
                    );
                }
            }
        }
        info!(
            farmers = world.farmers.len(),
            plots = world.plot_count(),
            "world initialised"
        );
        Ok(world)
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn days_per_step(&self) -> u32 {
        self.days_per_step
    }

    pub fn days_elapsed(&self) -> u64 {
        self.days_elapsed
    }

    pub fn advance_step(&mut self) {
        self.step += 1;
        self.days_elapsed += self.days_per_step as u64;
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn farmers(&self) -> &[FarmerAgent] {
        &self.farmers
    }

    pub(crate) fn farmers_mut(&mut self) -> &mut [FarmerAgent] {
        &mut self.farmers
    }

    pub fn farmer(&self, id: &FarmerId) -> Option<&FarmerAgent> {
        self.farmers.iter().find(|farmer| farmer.id() == id)
    }

    pub fn farmer_mut(&mut self, id: &FarmerId) -> Option<&mut FarmerAgent> {
        self.farmers.iter_mut().find(|farmer| farmer.id() == id)
    }

    pub fn plot(&self, id: &PlotId) -> Option<&FarmPlot> {
        self.farmers.iter().find_map(|farmer| farmer.plot(id))
    }

    /// Plot ids in registration order.
    pub fn plot_ids(&self) -> Vec<PlotId> {
        self.farmers
            .iter()
            .flat_map(|farmer| farmer.plots().iter().map(|plot| plot.id().clone()))
            .collect()
    }

    pub fn plot_count(&self) -> usize {
        self.farmers.iter().map(|farmer| farmer.plots().len()).sum()
    }

    pub fn total_capital_bdt(&self) -> f64 {
        self.farmers.iter().map(FarmerAgent::capital_bdt).sum()
    }

    pub fn total_debt_bdt(&self) -> f64 {
        self.farmers.iter().map(FarmerAgent::debt_bdt).sum()
    }

    pub fn events(&self) -> &[SimEvent] {
        self.log.events()
    }

    pub(crate) fn record_events(&mut self, events: impl IntoIterator<Item = SimEvent>) {
        self.log.extend(events);
    }

    /// Moves a plot, crop and history included, to another farmer.
    pub fn transfer_plot(&mut self, plot: &PlotId, to: &FarmerId) -> Result<(), TransferError> {
        let target = self
            .farmer_index(to)
            .ok_or_else(|| TransferError::UnknownFarmer(to.clone()))?;
        let source = self
            .farmers
            .iter()
            .position(|farmer| farmer.plot(plot).is_some())
            .ok_or_else(|| TransferError::UnknownPlot(plot.clone()))?;
        if source == target {
            return Ok(());
        }
        let moved = self.farmers[source]
            .release_plot(plot)
            .ok_or_else(|| TransferError::UnknownPlot(plot.clone()))?;
        let from = self.farmers[source].id().clone();
        self.farmers[target].add_plot(moved);
        self.log.push(SimEvent::OwnershipReassigned {
            plot: plot.clone(),
            from,
            to: to.clone(),
        });
        Ok(())
    }

    pub fn report(&self, scenario: &str) -> RunReport {
        let farmers = self
            .farmers
            .iter()
            .map(|farmer| FarmerSummary {
                id: farmer.id().clone(),
                capital_bdt: farmer.capital_bdt(),
                debt_bdt: farmer.debt_bdt(),
                subsidy_received_bdt: farmer.subsidy_received_bdt(),
                plot_count: farmer.plots().len(),
                total_area_ha: farmer.total_area_ha(),
                plots: farmer
                    .plots()
                    .iter()
                    .map(|plot| PlotSummary {
                        id: plot.id().clone(),
                        area_ha: plot.area_ha(),
                        salinity_ds_m: plot.soil.salinity_ds_m(),
                        salinity_drift_ds_m: plot.soil.salinity_ds_m()
                            - plot.soil.initial_salinity_ds_m(),
                        crop_health: plot.crop().map(|crop| crop.health()),
                        last_cultivation: plot.last_record().cloned(),
                    })
                    .collect(),
            })
            .collect();
        let events = self.log.events();
        RunReport {
            scenario: scenario.to_string(),
            steps: self.step,
            days_elapsed: self.days_elapsed,
            total_capital_bdt: self.total_capital_bdt(),
            total_debt_bdt: self.total_debt_bdt(),
            harvests: events
                .iter()
                .filter(|event| matches!(event, SimEvent::Harvested { .. }))
                .count(),
            lifecycle_violations: events
                .iter()
                .filter(|event| event.is_lifecycle_violation())
                .count(),
            farmers,
        }
    }

    fn farmer_index(&self, id: &FarmerId) -> Option<usize> {
        self.farmers.iter().position(|farmer| farmer.id() == id)
    }
}
