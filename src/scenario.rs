use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError, Variety};
use crate::conditions::ConditionsConfig;
use crate::config::SimulationConfig;
use crate::engine::{Engine, EngineBuilder, EngineSettings};
use crate::farmer::{Demographics, FarmerAgent, LandCategory};
use crate::ids::{FarmerId, LocationId, PlotId};
use crate::plot::{FarmPlot, Irrigation, Nutrients, SoilState};
use crate::strategy::{AdvisorConfig, Strategy};
use crate::world::{SetupError, World};

fn default_seed() -> u64 {
    42
}

fn default_capital() -> f64 {
    50_000.0
}

fn default_risk_aversion() -> f64 {
    0.5
}

fn default_land_quality() -> f64 {
    1.0
}

fn default_soil_type() -> String {
    "Loam".to_string()
}

fn default_organic_matter() -> f64 {
    1.5
}

fn default_ph() -> f64 {
    6.5
}

fn default_salinity() -> f64 {
    1.0
}

fn default_moisture() -> f64 {
    100.0
}

fn default_holding_capacity() -> f64 {
    150.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub config: SimulationConfig,
    #[serde(default)]
    pub conditions: ConditionsConfig,
    #[serde(default)]
    pub advisor: AdvisorConfig,
    /// Replaces the built-in variety catalog when present.
    #[serde(default)]
    pub catalog: Option<Vec<Variety>>,
    #[serde(default)]
    pub farmers: Vec<FarmerRecord>,
    #[serde(default)]
    pub plots: Vec<PlotRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FarmerRecord {
    pub id: FarmerId,
    pub household_id: String,
    #[serde(default = "default_capital")]
    pub initial_capital_bdt: f64,
    #[serde(default)]
    pub initial_debt_bdt: f64,
    #[serde(flatten)]
    pub demographics: Demographics,
    #[serde(default = "default_risk_aversion")]
    pub risk_aversion: f64,
    #[serde(default)]
    pub land_category: LandCategory,
    #[serde(default)]
    pub location: Option<LocationId>,
    #[serde(default)]
    pub expected_plot_count: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoilRecord {
    #[serde(default = "default_soil_type")]
    pub soil_type: String,
    #[serde(default = "default_organic_matter")]
    pub organic_matter_percent: f64,
    #[serde(default = "default_ph")]
    pub ph: f64,
    #[serde(default = "default_salinity")]
    pub salinity_ds_m: f64,
    #[serde(default = "default_moisture")]
    pub moisture_mm: f64,
    #[serde(default = "default_holding_capacity")]
    pub holding_capacity_mm: f64,
    #[serde(default)]
    pub nutrients: Nutrients,
}

impl Default for SoilRecord {
    fn default() -> Self {
        Self {
            soil_type: default_soil_type(),
            organic_matter_percent: default_organic_matter(),
            ph: default_ph(),
            salinity_ds_m: default_salinity(),
            moisture_mm: default_moisture(),
            holding_capacity_mm: default_holding_capacity(),
            nutrients: Nutrients::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlotRecord {
    pub id: PlotId,
    pub owner: FarmerId,
    pub area_ha: f64,
    #[serde(default)]
    pub soil: SoilRecord,
    #[serde(default)]
    pub irrigation: Irrigation,
    #[serde(default = "default_land_quality")]
    pub land_quality: f64,
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("plot {0} must have a positive area")]
    NonPositiveArea(PlotId),
    #[error("farmer {farmer} risk aversion {value} is outside [0, 1]")]
    RiskAversion { farmer: FarmerId, value: f64 },
    #[error("farmer {0} has negative capital or debt")]
    NegativeBalance(FarmerId),
    #[error("plot {0} irrigation reliability is outside [0, 1]")]
    Reliability(PlotId),
    #[error("plot {0} soil holding capacity must not be negative")]
    HoldingCapacity(PlotId),
    #[error("setting {field} has unusable value {value}")]
    Setting { field: String, value: f64 },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Setup(#[from] SetupError),
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ScenarioError> {
    if is_non_negative(value) {
        Ok(())
    } else {
        Err(ScenarioError::Setting {
            field: field.to_string(),
            value,
        })
    }
}

fn check_share(field: &str, value: f64) -> Result<(), ScenarioError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ScenarioError::Setting {
            field: field.to_string(),
            value,
        })
    }
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        scenario
            .validate()
            .with_context(|| format!("Invalid scenario {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    /// Rejects records and settings the simulation core assumes never occur.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        for farmer in &self.farmers {
            if !(0.0..=1.0).contains(&farmer.risk_aversion) {
                return Err(ScenarioError::RiskAversion {
                    farmer: farmer.id.clone(),
                    value: farmer.risk_aversion,
                });
            }
            if !(is_non_negative(farmer.initial_capital_bdt)
                && is_non_negative(farmer.initial_debt_bdt))
            {
                return Err(ScenarioError::NegativeBalance(farmer.id.clone()));
            }
        }
        for plot in &self.plots {
            if !(plot.area_ha > 0.0 && plot.area_ha.is_finite()) {
                return Err(ScenarioError::NonPositiveArea(plot.id.clone()));
            }
            if !(0.0..=1.0).contains(&plot.irrigation.reliability) {
                return Err(ScenarioError::Reliability(plot.id.clone()));
            }
            if !is_non_negative(plot.soil.holding_capacity_mm) {
                return Err(ScenarioError::HoldingCapacity(plot.id.clone()));
            }
            let soil = &plot.soil;
            for (field, value) in [
                ("soil.salinity_ds_m", soil.salinity_ds_m),
                ("soil.moisture_mm", soil.moisture_mm),
                ("soil.nutrients.nitrogen_kg_ha", soil.nutrients.nitrogen_kg_ha),
                ("soil.nutrients.phosphorus_kg_ha", soil.nutrients.phosphorus_kg_ha),
                ("soil.nutrients.potassium_kg_ha", soil.nutrients.potassium_kg_ha),
                ("land_quality", plot.land_quality),
            ] {
                check_non_negative(&format!("plots.{}.{field}", plot.id), value)?;
            }
        }
        self.validate_settings()?;
        self.catalog()?;
        Ok(())
    }

    fn validate_settings(&self) -> Result<(), ScenarioError> {
        let config = &self.config;
        check_share("config.finance.input_subsidy_rate", config.finance.input_subsidy_rate)?;
        check_share("config.finance.repayment_share", config.finance.repayment_share)?;
        check_non_negative(
            "config.finance.annual_interest_rate",
            config.finance.annual_interest_rate,
        )?;
        check_non_negative(
            "config.decision.salinity_threshold_ds_m",
            config.decision.salinity_threshold_ds_m,
        )?;

        let stress = &config.stress;
        for (field, value) in [
            ("sensitive_salinity_ds_m", stress.sensitive_salinity_ds_m),
            ("salinity_stress_per_step", stress.salinity_stress_per_step),
            ("min_moisture_mm", stress.min_moisture_mm),
            ("water_stress_per_step", stress.water_stress_per_step),
            ("drought_tolerance_factor", stress.drought_tolerance_factor),
            ("flood_tolerance_factor", stress.flood_tolerance_factor),
            ("irrigation_mm_per_step", stress.irrigation_mm_per_step),
        ] {
            check_non_negative(&format!("config.stress.{field}"), value)?;
        }

        if let ConditionsConfig::Stochastic(settings) = &self.conditions {
            if let Some((field, value)) = settings.invalid_setting() {
                return Err(ScenarioError::Setting {
                    field: format!("conditions.{field}"),
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.catalog {
            Some(varieties) => Catalog::new(varieties.clone()),
            None => Ok(Catalog::bangladesh_default()),
        }
    }

    pub fn build_world(&self) -> Result<World, ScenarioError> {
        let strategy = Strategy::from_policy(&self.config.decision);
        let farmers = self
            .farmers
            .iter()
            .map(|record| {
                let mut farmer = FarmerAgent::new(
                    record.id.clone(),
                    record.household_id.clone(),
                    record.initial_capital_bdt,
                    strategy.clone(),
                )
                .with_debt(record.initial_debt_bdt);
                farmer.demographics = record.demographics.clone();
                farmer.risk_aversion = record.risk_aversion;
                farmer.land_category = record.land_category;
                farmer.location = record.location.clone();
                farmer.expected_plot_count = record.expected_plot_count;
                farmer
            })
            .collect();
        let plots = self
            .plots
            .iter()
            .map(|record| {
                let mut soil = SoilState::new(
                    record.soil.soil_type.clone(),
                    record.soil.organic_matter_percent,
                    record.soil.ph,
                    record.soil.salinity_ds_m,
                    record.soil.moisture_mm,
                    record.soil.holding_capacity_mm,
                );
                soil.nutrients = record.soil.nutrients;
                let mut plot =
                    FarmPlot::new(record.id.clone(), record.owner.clone(), record.area_ha, soil)
                        .with_irrigation(record.irrigation.clone());
                plot.land_quality = record.land_quality;
                plot
            })
            .collect();
        let world = World::from_dataset(
            Arc::new(self.catalog()?),
            self.config.days_per_step,
            farmers,
            plots,
        )?;
        Ok(world)
    }

    /// Engine wired with the scenario's calendar, conditions and advisor.
    pub fn build_engine(&self) -> Result<Engine, ScenarioError> {
        let world = self.build_world()?;
        let settings = EngineSettings {
            scenario_name: self.name.clone(),
            seed: self.seed,
            config: self.config.clone(),
        };
        Ok(EngineBuilder::new(settings)
            .with_boxed_conditions(self.conditions.build(self.seed))
            .with_boxed_advisor(self.advisor.build())
            .build(world))
    }

    pub fn steps(&self, override_steps: Option<u64>) -> u64 {
        override_steps.unwrap_or(self.config.max_steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name: minimal
farmers:
  - id: f1
    household_id: hh1
    age: 45
plots:
  - id: p1
    owner: f1
    area_ha: 0.8
"#;

    #[test]
    fn minimal_scenario_fills_defaults() {
        let scenario: Scenario = serde_yaml::from_str(MINIMAL).unwrap();
        scenario.validate().unwrap();
        assert_eq!(scenario.seed, 42);
        assert_eq!(scenario.farmers[0].initial_capital_bdt, 50_000.0);
        assert_eq!(scenario.farmers[0].demographics.age, 45);
        assert_eq!(scenario.plots[0].soil.holding_capacity_mm, 150.0);
        assert!(!scenario.plots[0].irrigation.available);
        assert_eq!(scenario.plots[0].soil.nutrients.nitrogen_kg_ha, 100.0);

        let world = scenario.build_world().unwrap();
        assert_eq!(world.plot_count(), 1);
        assert_eq!(world.catalog().len(), 5);
    }

    #[test]
    fn invalid_records_are_rejected() {
        let mut scenario: Scenario = serde_yaml::from_str(MINIMAL).unwrap();
        scenario.plots[0].area_ha = 0.0;
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::NonPositiveArea(_))
        ));

        let mut scenario: Scenario = serde_yaml::from_str(MINIMAL).unwrap();
        scenario.farmers[0].risk_aversion = 1.5;
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::RiskAversion { .. })
        ));
    }

    #[test]
    fn non_finite_settings_are_rejected() {
        let mut scenario: Scenario = serde_yaml::from_str(MINIMAL).unwrap();
        scenario.config.finance.input_subsidy_rate = f64::NAN;
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::Setting { ref field, .. }) if field == "config.finance.input_subsidy_rate"
        ));

        let mut scenario: Scenario = serde_yaml::from_str(MINIMAL).unwrap();
        scenario.config.finance.repayment_share = 1.5;
        assert!(scenario.validate().is_err());

        let mut scenario: Scenario = serde_yaml::from_str(MINIMAL).unwrap();
        scenario.farmers[0].initial_capital_bdt = f64::NAN;
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::NegativeBalance(_))
        ));

        let mut scenario: Scenario = serde_yaml::from_str(MINIMAL).unwrap();
        scenario.config.stress.salinity_stress_per_step = f64::INFINITY;
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn unusable_stochastic_settings_are_rejected() {
        let yaml = format!("{MINIMAL}conditions:\n  kind: stochastic\n  price_noise: .inf\n");
        let scenario: Scenario = serde_yaml::from_str(&yaml).unwrap();
        match scenario.validate() {
            Err(ScenarioError::Setting { field, value }) => {
                assert_eq!(field, "conditions.price_noise");
                assert!(value.is_infinite());
            }
            other => panic!("unexpected validation result: {other:?}"),
        }
    }

    #[test]
    fn soil_nutrients_reach_the_plot() {
        let yaml = MINIMAL.replace(
            "    area_ha: 0.8\n",
            "    area_ha: 0.8\n    soil:\n      nutrients:\n        nitrogen_kg_ha: 80.0\n",
        );
        let scenario: Scenario = serde_yaml::from_str(&yaml).unwrap();
        let world = scenario.build_world().unwrap();
        let soil = &world.plot(&PlotId::new("p1")).unwrap().soil;
        assert_eq!(soil.nutrients.nitrogen_kg_ha, 80.0);
        assert_eq!(soil.nutrients.phosphorus_kg_ha, 20.0);
        assert_eq!(soil.nutrients.potassium_kg_ha, 150.0);
    }

    #[test]
    fn step_override_wins() {
        let scenario: Scenario = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(scenario.steps(None), 100);
        assert_eq!(scenario.steps(Some(7)), 7);
    }
}
