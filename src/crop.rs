use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::{Season, Variety};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Seedling,
    Vegetative,
    Flowering,
    Maturity,
}

impl GrowthStage {
    /// Stage reached after `elapsed_days` of a `maturity_days` cycle.
    pub fn at(elapsed_days: u32, maturity_days: u32) -> GrowthStage {
        let fraction = elapsed_days as f64 / maturity_days.max(1) as f64;
        if fraction >= 1.0 {
            GrowthStage::Maturity
        } else if fraction >= 0.55 {
            GrowthStage::Flowering
        } else if fraction >= 0.2 {
            GrowthStage::Vegetative
        } else {
            GrowthStage::Seedling
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressKind {
    Water,
    Salinity,
    Flood,
    Heat,
    Pest,
}

impl fmt::Display for StressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StressKind::Water => "water",
            StressKind::Salinity => "salinity",
            StressKind::Flood => "flood",
            StressKind::Heat => "heat",
            StressKind::Pest => "pest",
        };
        f.write_str(name)
    }
}

pub type StressMap = BTreeMap<StressKind, f64>;

/// A single cultivation of a variety on a plot.
#[derive(Debug, Clone)]
pub struct Crop {
    variety: Arc<Variety>,
    season: Season,
    planted_step: u64,
    planted_on: NaiveDate,
    elapsed_days: u32,
    stage: GrowthStage,
    stress: StressMap,
    harvested_on: Option<NaiveDate>,
    actual_yield_t_ha: Option<f64>,
}

impl Crop {
    pub(crate) fn sow(
        variety: Arc<Variety>,
        season: Season,
        planted_step: u64,
        planted_on: NaiveDate,
    ) -> Self {
        Self {
            variety,
            season,
            planted_step,
            planted_on,
            elapsed_days: 0,
            stage: GrowthStage::Seedling,
            stress: StressMap::new(),
            harvested_on: None,
            actual_yield_t_ha: None,
        }
    }

    pub fn variety(&self) -> &Arc<Variety> {
        &self.variety
    }

    pub fn season(&self) -> Season {
        self.season
    }

    pub fn planted_step(&self) -> u64 {
        self.planted_step
    }

    pub fn planted_on(&self) -> NaiveDate {
        self.planted_on
    }

    pub fn elapsed_days(&self) -> u32 {
        self.elapsed_days
    }

    pub fn stage(&self) -> GrowthStage {
        self.stage
    }

    pub fn stress(&self) -> &StressMap {
        &self.stress
    }

    pub fn harvested_on(&self) -> Option<NaiveDate> {
        self.harvested_on
    }

    pub fn actual_yield_t_ha(&self) -> Option<f64> {
        self.actual_yield_t_ha
    }

    pub fn is_mature(&self) -> bool {
        self.stage == GrowthStage::Maturity
    }

    pub fn total_stress(&self) -> f64 {
        self.stress.values().sum()
    }

    /// `max(0, 1 - sum(stress))`.
    pub fn yield_reduction_factor(&self) -> f64 {
        (1.0 - self.total_stress()).max(0.0)
    }

    /// 1.0 for an unstressed crop down to 0.0 for a failed one.
    pub fn health(&self) -> f64 {
        self.yield_reduction_factor()
    }

    pub fn expected_yield_t_ha(&self) -> f64 {
        self.variety.potential_yield_t_ha * self.yield_reduction_factor()
    }

    pub(crate) fn advance(&mut self, days: u32) {
        self.elapsed_days = self.elapsed_days.saturating_add(days);
        self.stage = GrowthStage::at(self.elapsed_days, self.variety.maturity_days);
    }

    /// Magnitude must already be validated as finite and non-negative.
    pub(crate) fn accumulate_stress(&mut self, kind: StressKind, magnitude: f64, clamp: bool) {
        let entry = self.stress.entry(kind).or_insert(0.0);
        *entry += magnitude;
        if clamp {
            *entry = entry.clamp(0.0, 1.0);
        }
    }

    pub(crate) fn finalize(&mut self, harvested_on: NaiveDate, actual_yield_t_ha: f64) {
        self.harvested_on = Some(harvested_on);
        self.actual_yield_t_ha = Some(actual_yield_t_ha);
    }
}
