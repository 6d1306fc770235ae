//! Run configuration for a simulation scenario

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::CalendarConfig;

fn default_max_steps() -> u64 {
    100
}

fn default_days_per_step() -> u32 {
    120
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    #[serde(default = "default_days_per_step")]
    pub days_per_step: u32,
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub lifecycle: LifecyclePolicy,
    #[serde(default)]
    pub decision: DecisionPolicy,
    #[serde(default)]
    pub stress: StressPolicy,
    #[serde(default)]
    pub finance: FinancePolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            days_per_step: default_days_per_step(),
            start_date: default_start_date(),
            calendar: CalendarConfig::default(),
            lifecycle: LifecyclePolicy::default(),
            decision: DecisionPolicy::default(),
            stress: StressPolicy::default(),
            finance: FinancePolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// How lifecycle contract violations (planting onto an occupied plot,
/// harvesting an empty one, ...) are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePolicy {
    /// Log a warning, record the violation and keep stepping.
    #[default]
    Relaxed,
    /// Abort the step with an error.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionPolicy {
    /// Salinity outlook (dS/m) above which farmers look for salt-tolerant
    /// varieties.
    #[serde(default = "default_salinity_threshold")]
    pub salinity_threshold_ds_m: f64,
    /// Interval, in steps, between strategy reviews.
    #[serde(default = "default_review_interval")]
    pub strategy_review_interval: u64,
}

fn default_salinity_threshold() -> f64 {
    4.0
}

fn default_review_interval() -> u64 {
    10
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            salinity_threshold_ds_m: default_salinity_threshold(),
            strategy_review_interval: default_review_interval(),
        }
    }
}

/// Thresholds and magnitudes of environmentally derived crop stress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressPolicy {
    /// Salinity limit for varieties without a salinity tolerance.
    #[serde(default = "default_sensitive_salinity")]
    pub sensitive_salinity_ds_m: f64,
    #[serde(default = "default_salinity_stress")]
    pub salinity_stress_per_step: f64,
    #[serde(default = "default_min_moisture")]
    pub min_moisture_mm: f64,
    #[serde(default = "default_water_stress")]
    pub water_stress_per_step: f64,
    /// Multiplier applied to water stress on drought-tolerant varieties.
    #[serde(default = "default_drought_relief")]
    pub drought_tolerance_factor: f64,
    /// Multiplier applied to flood shocks on flood-tolerant varieties.
    #[serde(default = "default_flood_relief")]
    pub flood_tolerance_factor: f64,
    #[serde(default = "default_irrigation_mm")]
    pub irrigation_mm_per_step: f64,
    /// Clamp each accumulated stress kind to [0, 1].
    #[serde(default = "default_clamp_per_kind")]
    pub clamp_per_kind: bool,
}

fn default_sensitive_salinity() -> f64 {
    6.0
}

fn default_salinity_stress() -> f64 {
    0.2
}

fn default_min_moisture() -> f64 {
    20.0
}

fn default_water_stress() -> f64 {
    0.1
}

fn default_drought_relief() -> f64 {
    0.5
}

fn default_flood_relief() -> f64 {
    0.3
}

fn default_irrigation_mm() -> f64 {
    50.0
}

fn default_clamp_per_kind() -> bool {
    true
}

impl Default for StressPolicy {
    fn default() -> Self {
        Self {
            sensitive_salinity_ds_m: default_sensitive_salinity(),
            salinity_stress_per_step: default_salinity_stress(),
            min_moisture_mm: default_min_moisture(),
            water_stress_per_step: default_water_stress(),
            drought_tolerance_factor: default_drought_relief(),
            flood_tolerance_factor: default_flood_relief(),
            irrigation_mm_per_step: default_irrigation_mm(),
            clamp_per_kind: default_clamp_per_kind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancePolicy {
    #[serde(default = "default_interest_rate")]
    pub annual_interest_rate: f64,
    /// Share of input cost covered by a subsidy programme.
    #[serde(default)]
    pub input_subsidy_rate: f64,
    /// Share of each step's harvest revenue used to pay down debt.
    #[serde(default = "default_repayment_share")]
    pub repayment_share: f64,
}

fn default_interest_rate() -> f64 {
    0.08
}

fn default_repayment_share() -> f64 {
    0.5
}

impl Default for FinancePolicy {
    fn default() -> Self {
        Self {
            annual_interest_rate: default_interest_rate(),
            input_subsidy_rate: 0.0,
            repayment_share: default_repayment_share(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_defaults() {
        let config: SimulationConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.max_steps, 100);
        assert_eq!(config.days_per_step, 120);
        assert_eq!(config.lifecycle, LifecyclePolicy::Relaxed);
        assert_eq!(config.decision.salinity_threshold_ds_m, 4.0);
        assert_eq!(config.finance.input_subsidy_rate, 0.0);
        assert!(config.stress.clamp_per_kind);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn nested_overrides_keep_sibling_defaults() {
        let yaml = "
lifecycle: strict
stress:
  min_moisture_mm: 5.0
calendar:
  kind: fixed
  season: boro
";
        let config: SimulationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.lifecycle, LifecyclePolicy::Strict);
        assert_eq!(config.stress.min_moisture_mm, 5.0);
        assert_eq!(config.stress.salinity_stress_per_step, 0.2);
        assert!(matches!(config.calendar, CalendarConfig::Fixed { .. }));
    }
}
