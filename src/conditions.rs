//! Per-step environmental and market conditions.
//!
//! The engine pulls one [`ConditionSnapshot`] per step from a
//! [`ConditionsProvider`] and hands it to every farmer by shared reference.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::{Season, VarietyId};
use crate::crop::StressKind;
use crate::ids::{LocationId, PlotId};
use crate::rng::RngManager;

pub const DEFAULT_PRICE_BDT_TON: f64 = 30_000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    #[serde(default)]
    pub precipitation_mm: f64,
    #[serde(default)]
    pub evapotranspiration_mm: f64,
    #[serde(default)]
    pub salinity_change_ds_m: f64,
    #[serde(default)]
    pub salinity_outlook_ds_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub prices_bdt_ton: BTreeMap<VarietyId, f64>,
    #[serde(default = "default_price")]
    pub default_price_bdt_ton: f64,
}

fn default_price() -> f64 {
    DEFAULT_PRICE_BDT_TON
}

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self {
            prices_bdt_ton: BTreeMap::new(),
            default_price_bdt_ton: DEFAULT_PRICE_BDT_TON,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    pub bdt_per_ton: f64,
    pub fallback: bool,
}

impl MarketSnapshot {
    pub fn with_price(mut self, variety: &str, bdt_per_ton: f64) -> Self {
        self.prices_bdt_ton
            .insert(VarietyId::new(variety), bdt_per_ton);
        self
    }

    pub fn price_for(&self, variety: &VarietyId) -> PriceQuote {
        match self.prices_bdt_ton.get(variety) {
            Some(price) => PriceQuote {
                bdt_per_ton: *price,
                fallback: false,
            },
            None => PriceQuote {
                bdt_per_ton: self.default_price_bdt_ton,
                fallback: true,
            },
        }
    }
}

/// An externally imposed stress event (cyclone surge, heat wave, pest
/// outbreak) targeting one plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressShock {
    pub plot: PlotId,
    pub kind: StressKind,
    pub magnitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateTrends {
    /// Change in regional salinity outlook per step (dS/m).
    #[serde(default)]
    pub salinity_trend_ds_m: f64,
    #[serde(default)]
    pub rainfall_anomaly: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySignals {
    /// Replaces the configured input subsidy rate while present.
    #[serde(default)]
    pub input_subsidy_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionSnapshot {
    #[serde(default)]
    pub step: u64,
    /// Fallback reading for plots and locations without their own entry.
    #[serde(default)]
    pub regional: EnvironmentReading,
    /// Readings keyed by plot id or location id.
    #[serde(default)]
    pub readings: BTreeMap<String, EnvironmentReading>,
    #[serde(default)]
    pub market: MarketSnapshot,
    #[serde(default)]
    pub shocks: Vec<StressShock>,
    #[serde(default)]
    pub trends: ClimateTrends,
    #[serde(default)]
    pub policy: PolicySignals,
}

impl ConditionSnapshot {
    pub fn reading_for(&self, plot: &PlotId, location: Option<&LocationId>) -> &EnvironmentReading {
        self.readings
            .get(plot.as_str())
            .or_else(|| location.and_then(|loc| self.readings.get(loc.as_str())))
            .unwrap_or(&self.regional)
    }

    pub fn shocks_for<'a>(&'a self, plot: &'a PlotId) -> impl Iterator<Item = &'a StressShock> {
        self.shocks.iter().filter(move |shock| &shock.plot == plot)
    }
}

pub struct SnapshotRequest<'a> {
    pub step: u64,
    pub date: NaiveDate,
    pub season: Season,
    pub plots: &'a [PlotId],
}

pub trait ConditionsProvider {
    fn name(&self) -> &str;
    fn snapshot(&mut self, request: &SnapshotRequest<'_>) -> Result<ConditionSnapshot>;
}

/// Replays a fixed sequence of snapshots; steps past the end repeat the
/// last frame.
#[derive(Debug, Clone)]
pub struct ScriptedConditions {
    frames: Vec<ConditionSnapshot>,
}

impl ScriptedConditions {
    pub fn new(frames: Vec<ConditionSnapshot>) -> Self {
        Self { frames }
    }

    pub fn constant(frame: ConditionSnapshot) -> Self {
        Self::new(vec![frame])
    }
}

impl ConditionsProvider for ScriptedConditions {
    fn name(&self) -> &str {
        "scripted"
    }

    fn snapshot(&mut self, request: &SnapshotRequest<'_>) -> Result<ConditionSnapshot> {
        let Some(last) = self.frames.len().checked_sub(1) else {
            bail!("scripted conditions have no frames");
        };
        let index = (request.step as usize).min(last);
        let mut frame = self.frames[index].clone();
        frame.step = request.step;
        Ok(frame)
    }
}

fn default_max_precipitation() -> f64 {
    10.0
}

fn default_salinity_change() -> f64 {
    0.1
}

fn default_salinity_outlook() -> f64 {
    1.2
}

fn default_price_noise() -> f64 {
    0.0
}

fn default_base_prices() -> BTreeMap<VarietyId, f64> {
    let mut prices = BTreeMap::new();
    prices.insert(VarietyId::new("brri_dhan28"), 32_000.0);
    prices.insert(VarietyId::new("swarna"), 28_000.0);
    prices
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StochasticSettings {
    #[serde(default = "default_max_precipitation")]
    pub max_precipitation_mm: f64,
    #[serde(default)]
    pub evapotranspiration_mm: f64,
    /// Per-plot salinity change is drawn from `[-range, range]`.
    #[serde(default = "default_salinity_change")]
    pub salinity_change_range_ds_m: f64,
    #[serde(default = "default_salinity_outlook")]
    pub salinity_outlook_ds_m: f64,
    /// Drift of the salinity outlook per step.
    #[serde(default)]
    pub salinity_trend_ds_m: f64,
    #[serde(default = "default_base_prices")]
    pub base_prices_bdt_ton: BTreeMap<VarietyId, f64>,
    #[serde(default = "default_price")]
    pub default_price_bdt_ton: f64,
    /// Prices move by a uniform fraction in `[-noise, noise]`.
    #[serde(default = "default_price_noise")]
    pub price_noise: f64,
    #[serde(default)]
    pub flood_probability: f64,
    #[serde(default)]
    pub flood_magnitude: f64,
}

impl Default for StochasticSettings {
    fn default() -> Self {
        Self {
            max_precipitation_mm: default_max_precipitation(),
            evapotranspiration_mm: 0.0,
            salinity_change_range_ds_m: default_salinity_change(),
            salinity_outlook_ds_m: default_salinity_outlook(),
            salinity_trend_ds_m: 0.0,
            base_prices_bdt_ton: default_base_prices(),
            default_price_bdt_ton: DEFAULT_PRICE_BDT_TON,
            price_noise: default_price_noise(),
            flood_probability: 0.0,
            flood_magnitude: 0.0,
        }
    }
}

/// Noise is only drawn from `[-bound, bound]` when that range is finite and
/// non-empty.
fn usable_bound(bound: f64) -> bool {
    bound > 0.0 && (bound * 2.0).is_finite()
}

impl StochasticSettings {
    /// First setting that cannot drive the generator, as `(field, value)`.
    pub fn invalid_setting(&self) -> Option<(String, f64)> {
        let non_negative = [
            ("max_precipitation_mm", self.max_precipitation_mm),
            ("evapotranspiration_mm", self.evapotranspiration_mm),
            ("salinity_change_range_ds_m", self.salinity_change_range_ds_m),
            ("salinity_outlook_ds_m", self.salinity_outlook_ds_m),
            ("default_price_bdt_ton", self.default_price_bdt_ton),
            ("price_noise", self.price_noise),
            ("flood_magnitude", self.flood_magnitude),
        ];
        if let Some((field, value)) = non_negative
            .into_iter()
            .find(|(_, value)| !(value.is_finite() && *value >= 0.0))
        {
            return Some((field.to_string(), value));
        }
        if !self.salinity_trend_ds_m.is_finite() {
            return Some(("salinity_trend_ds_m".into(), self.salinity_trend_ds_m));
        }
        if !(0.0..=1.0).contains(&self.flood_probability) {
            return Some(("flood_probability".into(), self.flood_probability));
        }
        self.base_prices_bdt_ton
            .iter()
            .find(|(_, price)| !(price.is_finite() && **price >= 0.0))
            .map(|(variety, price)| (format!("base_prices_bdt_ton.{variety}"), *price))
    }
}

/// Seeded noise around baseline weather, hydrology and prices.
pub struct StochasticConditions {
    rng: RngManager,
    settings: StochasticSettings,
}

impl StochasticConditions {
    pub fn new(seed: u64, settings: StochasticSettings) -> Self {
        Self {
            rng: RngManager::new(seed),
            settings,
        }
    }
}

impl ConditionsProvider for StochasticConditions {
    fn name(&self) -> &str {
        "stochastic"
    }

    fn snapshot(&mut self, request: &SnapshotRequest<'_>) -> Result<ConditionSnapshot> {
        let s = &self.settings;
        let outlook =
            (s.salinity_outlook_ds_m + s.salinity_trend_ds_m * request.step as f64).max(0.0);

        let mut weather = self.rng.stream("weather", request.step);
        let mut readings = BTreeMap::new();
        let mut shocks = Vec::new();
        for plot in request.plots {
            let precipitation_mm = if usable_bound(s.max_precipitation_mm) {
                weather.gen_range(0.0..s.max_precipitation_mm)
            } else {
                0.0
            };
            let salinity_change_ds_m = if usable_bound(s.salinity_change_range_ds_m) {
                weather.gen_range(-s.salinity_change_range_ds_m..s.salinity_change_range_ds_m)
            } else {
                0.0
            };
            readings.insert(
                plot.as_str().to_string(),
                EnvironmentReading {
                    precipitation_mm,
                    evapotranspiration_mm: s.evapotranspiration_mm,
                    salinity_change_ds_m,
                    salinity_outlook_ds_m: outlook,
                },
            );
            if s.flood_probability > 0.0 && weather.gen_bool(s.flood_probability.min(1.0)) {
                shocks.push(StressShock {
                    plot: plot.clone(),
                    kind: StressKind::Flood,
                    magnitude: s.flood_magnitude.max(0.0),
                });
            }
        }

        let mut market_rng = self.rng.stream("market", request.step);
        let mut prices_bdt_ton = BTreeMap::new();
        for (variety, base) in &s.base_prices_bdt_ton {
            let factor = if usable_bound(s.price_noise) {
                1.0 + market_rng.gen_range(-s.price_noise..s.price_noise)
            } else {
                1.0
            };
            prices_bdt_ton.insert(variety.clone(), (base * factor).max(0.0));
        }

        Ok(ConditionSnapshot {
            step: request.step,
            regional: EnvironmentReading {
                precipitation_mm: s.max_precipitation_mm / 2.0,
                evapotranspiration_mm: s.evapotranspiration_mm,
                salinity_change_ds_m: 0.0,
                salinity_outlook_ds_m: outlook,
            },
            readings,
            market: MarketSnapshot {
                prices_bdt_ton,
                default_price_bdt_ton: s.default_price_bdt_ton,
            },
            shocks,
            trends: ClimateTrends {
                salinity_trend_ds_m: s.salinity_trend_ds_m,
                rainfall_anomaly: 0.0,
            },
            policy: PolicySignals::default(),
        })
    }
}

/// Scenario-level choice of conditions provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionsConfig {
    Stochastic(StochasticSettings),
    Scripted { frames: Vec<ConditionSnapshot> },
}

impl Default for ConditionsConfig {
    fn default() -> Self {
        ConditionsConfig::Stochastic(StochasticSettings::default())
    }
}

impl ConditionsConfig {
    pub fn build(&self, seed: u64) -> Box<dyn ConditionsProvider> {
        match self {
            ConditionsConfig::Stochastic(settings) => {
                Box::new(StochasticConditions::new(seed, settings.clone()))
            }
            ConditionsConfig::Scripted { frames } => {
                Box::new(ScriptedConditions::new(frames.clone()))
            }
        }
    }
}
