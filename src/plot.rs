use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::{Season, Variety, VarietyId};
use crate::conditions::EnvironmentReading;
use crate::config::StressPolicy;
use crate::crop::{Crop, GrowthStage, StressKind, StressMap};
use crate::ids::{FarmerId, PlotId};

fn default_nitrogen() -> f64 {
    100.0
}

fn default_phosphorus() -> f64 {
    20.0
}

fn default_potassium() -> f64 {
    150.0
}

/// Plant-available macronutrients (kg/ha). Reported only; crop growth does
/// not draw them down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Nutrients {
    #[serde(default = "default_nitrogen")]
    pub nitrogen_kg_ha: f64,
    #[serde(default = "default_phosphorus")]
    pub phosphorus_kg_ha: f64,
    #[serde(default = "default_potassium")]
    pub potassium_kg_ha: f64,
}

impl Default for Nutrients {
    fn default() -> Self {
        Self {
            nitrogen_kg_ha: default_nitrogen(),
            phosphorus_kg_ha: default_phosphorus(),
            potassium_kg_ha: default_potassium(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilState {
    pub soil_type: String,
    pub organic_matter_percent: f64,
    pub ph: f64,
    pub nutrients: Nutrients,
    salinity_ds_m: f64,
    initial_salinity_ds_m: f64,
    moisture_mm: f64,
    holding_capacity_mm: f64,
}

impl SoilState {
    pub fn new(
        soil_type: impl Into<String>,
        organic_matter_percent: f64,
        ph: f64,
        salinity_ds_m: f64,
        moisture_mm: f64,
        holding_capacity_mm: f64,
    ) -> Self {
        let holding_capacity_mm = holding_capacity_mm.max(0.0);
        let salinity_ds_m = salinity_ds_m.max(0.0);
        Self {
            soil_type: soil_type.into(),
            organic_matter_percent,
            ph,
            nutrients: Nutrients::default(),
            salinity_ds_m,
            initial_salinity_ds_m: salinity_ds_m,
            moisture_mm: moisture_mm.clamp(0.0, holding_capacity_mm),
            holding_capacity_mm,
        }
    }

    pub fn salinity_ds_m(&self) -> f64 {
        self.salinity_ds_m
    }

    pub fn initial_salinity_ds_m(&self) -> f64 {
        self.initial_salinity_ds_m
    }

    pub fn moisture_mm(&self) -> f64 {
        self.moisture_mm
    }

    pub fn holding_capacity_mm(&self) -> f64 {
        self.holding_capacity_mm
    }

    pub fn update_salinity(&mut self, change_ds_m: f64) {
        if !change_ds_m.is_finite() {
            return;
        }
        self.salinity_ds_m = (self.salinity_ds_m + change_ds_m).max(0.0);
    }

    pub fn update_moisture(&mut self, rainfall_mm: f64, irrigation_mm: f64, et_mm: f64) {
        let delta = rainfall_mm + irrigation_mm - et_mm;
        if !delta.is_finite() {
            return;
        }
        self.moisture_mm = (self.moisture_mm + delta).clamp(0.0, self.holding_capacity_mm);
    }
}

impl Default for SoilState {
    fn default() -> Self {
        Self::new("Loam", 1.5, 6.5, 1.0, 100.0, 150.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrigationKind {
    GroundwaterStw,
    SurfaceCanal,
    LowLiftPump,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Irrigation {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub kind: Option<IrrigationKind>,
    #[serde(default = "default_reliability")]
    pub reliability: f64,
}

fn default_reliability() -> f64 {
    1.0
}

impl Default for Irrigation {
    fn default() -> Self {
        Self {
            available: false,
            kind: None,
            reliability: default_reliability(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CultivationRecord {
    pub variety: VarietyId,
    pub season: Season,
    pub planted_on: NaiveDate,
    pub harvested_on: NaiveDate,
    pub yield_t_ha: f64,
    pub stress: StressMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotState {
    Fallow,
    Planted,
    Growing,
    MatureReady,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("variety {variety} is a {variety_season} variety, active season is {active}")]
    IncompatibleSeason {
        variety: VarietyId,
        variety_season: Season,
        active: Season,
    },
    #[error("plot {plot} already holds {current}")]
    PlotOccupied { plot: PlotId, current: VarietyId },
    #[error("plot {0} has no crop")]
    NoCropPresent(PlotId),
    #[error("stress magnitude {magnitude} for {kind} is not a finite non-negative value")]
    InvalidStress { kind: StressKind, magnitude: f64 },
}

/// Stress derived from one condition update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionUpdate {
    pub applied: Vec<(StressKind, f64)>,
    pub irrigation_mm: f64,
}

#[derive(Debug, Clone)]
pub struct FarmPlot {
    id: PlotId,
    owner: FarmerId,
    area_ha: f64,
    pub soil: SoilState,
    pub irrigation: Irrigation,
    pub land_quality: f64,
    crop: Option<Crop>,
    history: Vec<CultivationRecord>,
}

impl FarmPlot {
    pub fn new(id: PlotId, owner: FarmerId, area_ha: f64, soil: SoilState) -> Self {
        Self {
            id,
            owner,
            area_ha,
            soil,
            irrigation: Irrigation::default(),
            land_quality: 1.0,
            crop: None,
            history: Vec::new(),
        }
    }

    pub fn with_irrigation(mut self, irrigation: Irrigation) -> Self {
        self.irrigation = irrigation;
        self
    }

    pub fn id(&self) -> &PlotId {
        &self.id
    }

    pub fn owner(&self) -> &FarmerId {
        &self.owner
    }

    pub fn area_ha(&self) -> f64 {
        self.area_ha
    }

    pub fn crop(&self) -> Option<&Crop> {
        self.crop.as_ref()
    }

    pub fn history(&self) -> &[CultivationRecord] {
        &self.history
    }

    pub fn last_record(&self) -> Option<&CultivationRecord> {
        self.history.last()
    }

    pub fn state(&self) -> PlotState {
        match &self.crop {
            None => PlotState::Fallow,
            Some(crop) if crop.is_mature() => PlotState::MatureReady,
            Some(crop) if crop.stage() == GrowthStage::Seedling && crop.elapsed_days() == 0 => {
                PlotState::Planted
            }
            Some(_) => PlotState::Growing,
        }
    }

    pub(crate) fn transfer_to(&mut self, new_owner: FarmerId) {
        info!(plot = %self.id, from = %self.owner, to = %new_owner, "plot ownership transferred");
        self.owner = new_owner;
    }

    pub fn plant(
        &mut self,
        variety: Arc<Variety>,
        active: Season,
        step: u64,
        date: NaiveDate,
    ) -> Result<(), LifecycleError> {
        if let Some(current) = &self.crop {
            return Err(LifecycleError::PlotOccupied {
                plot: self.id.clone(),
                current: current.variety().id.clone(),
            });
        }
        if variety.season != active {
            return Err(LifecycleError::IncompatibleSeason {
                variety: variety.id.clone(),
                variety_season: variety.season,
                active,
            });
        }
        debug!(plot = %self.id, variety = %variety.id, %date, "crop planted");
        self.crop = Some(Crop::sow(variety, active, step, date));
        Ok(())
    }

    pub fn apply_stress(
        &mut self,
        kind: StressKind,
        magnitude: f64,
        policy: &StressPolicy,
    ) -> Result<(), LifecycleError> {
        if !(magnitude.is_finite() && magnitude >= 0.0) {
            return Err(LifecycleError::InvalidStress { kind, magnitude });
        }
        let crop = self
            .crop
            .as_mut()
            .ok_or_else(|| LifecycleError::NoCropPresent(self.id.clone()))?;
        crop.accumulate_stress(kind, magnitude, policy.clamp_per_kind);
        Ok(())
    }

    /// Irrigation water delivered this step; only irrigated plots with a
    /// standing crop are watered.
    pub fn irrigation_supply(&self, policy: &StressPolicy) -> f64 {
        if self.irrigation.available && self.crop.is_some() {
            policy.irrigation_mm_per_step * self.irrigation.reliability.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn update_conditions(
        &mut self,
        reading: &EnvironmentReading,
        dt_days: u32,
        policy: &StressPolicy,
    ) -> ConditionUpdate {
        let irrigation_mm = self.irrigation_supply(policy);
        self.soil.update_moisture(
            reading.precipitation_mm,
            irrigation_mm,
            reading.evapotranspiration_mm,
        );
        self.soil.update_salinity(reading.salinity_change_ds_m);

        let mut update = ConditionUpdate {
            applied: Vec::new(),
            irrigation_mm,
        };
        let Some(crop) = self.crop.as_mut() else {
            return update;
        };
        crop.advance(dt_days);

        let variety = crop.variety().clone();
        let salinity_limit = variety
            .salinity_tolerance()
            .unwrap_or(policy.sensitive_salinity_ds_m);
        if self.soil.salinity_ds_m() > salinity_limit && policy.salinity_stress_per_step > 0.0 {
            crop.accumulate_stress(
                StressKind::Salinity,
                policy.salinity_stress_per_step,
                policy.clamp_per_kind,
            );
            update
                .applied
                .push((StressKind::Salinity, policy.salinity_stress_per_step));
        }
        if self.soil.moisture_mm() < policy.min_moisture_mm && policy.water_stress_per_step > 0.0 {
            let mut magnitude = policy.water_stress_per_step;
            if variety.tolerances.drought {
                magnitude *= policy.drought_tolerance_factor.max(0.0);
            }
            crop.accumulate_stress(StressKind::Water, magnitude, policy.clamp_per_kind);
            update.applied.push((StressKind::Water, magnitude));
        }
        update
    }

    /// Scale factor for an external shock given the standing variety's
    /// tolerances.
    pub fn shock_factor(&self, kind: StressKind, policy: &StressPolicy) -> f64 {
        match (&self.crop, kind) {
            (Some(crop), StressKind::Flood) if crop.variety().tolerances.flood => {
                policy.flood_tolerance_factor.max(0.0)
            }
            (Some(crop), StressKind::Water) if crop.variety().tolerances.drought => {
                policy.drought_tolerance_factor.max(0.0)
            }
            _ => 1.0,
        }
    }

    pub fn harvest(
        &mut self,
        date: NaiveDate,
        actual_yield_t_ha: f64,
    ) -> Result<Crop, LifecycleError> {
        let mut crop = self
            .crop
            .take()
            .ok_or_else(|| LifecycleError::NoCropPresent(self.id.clone()))?;
        crop.finalize(date, actual_yield_t_ha);
        self.history.push(CultivationRecord {
            variety: crop.variety().id.clone(),
            season: crop.season(),
            planted_on: crop.planted_on(),
            harvested_on: date,
            yield_t_ha: actual_yield_t_ha,
            stress: crop.stress().clone(),
        });
        debug!(plot = %self.id, variety = %crop.variety().id, yield_t_ha = actual_yield_t_ha, "crop harvested");
        Ok(crop)
    }
}
