use serde::{Deserialize, Serialize};

use crate::conditions::{ClimateTrends, PolicySignals};
use crate::config::DecisionPolicy;

/// Long-run decision parameters a farmer carries between reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub salinity_threshold_ds_m: f64,
}

impl Strategy {
    pub fn from_policy(policy: &DecisionPolicy) -> Self {
        Self {
            salinity_threshold_ds_m: policy.salinity_threshold_ds_m,
        }
    }
}

pub struct ReviewContext<'a> {
    pub step: u64,
    pub risk_aversion: f64,
    pub trends: &'a ClimateTrends,
    pub policy: &'a PolicySignals,
    pub defaults: &'a DecisionPolicy,
}

/// Offered a farmer's strategy at each review step; returns a replacement
/// or `None` to keep the current one.
pub trait StrategyAdvisor {
    fn name(&self) -> &str;
    fn review(&mut self, current: &Strategy, ctx: &ReviewContext<'_>) -> Option<Strategy>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FixedStrategy;

impl StrategyAdvisor for FixedStrategy {
    fn name(&self) -> &str {
        "fixed"
    }

    fn review(&mut self, _current: &Strategy, _ctx: &ReviewContext<'_>) -> Option<Strategy> {
        None
    }
}

/// Tightens the salinity threshold while salinity trends upward, more so
/// for risk-averse farmers, and drifts back toward the configured default
/// once the trend reverses.
#[derive(Debug, Clone)]
pub struct TrendAdvisor {
    pub sensitivity: f64,
    pub floor_ds_m: f64,
    pub recovery_rate: f64,
}

impl Default for TrendAdvisor {
    fn default() -> Self {
        Self {
            sensitivity: 5.0,
            floor_ds_m: 2.0,
            recovery_rate: 0.5,
        }
    }
}

impl StrategyAdvisor for TrendAdvisor {
    fn name(&self) -> &str {
        "trend"
    }

    fn review(&mut self, current: &Strategy, ctx: &ReviewContext<'_>) -> Option<Strategy> {
        let trend = ctx.trends.salinity_trend_ds_m;
        if !trend.is_finite() {
            return None;
        }
        let default = ctx.defaults.salinity_threshold_ds_m;
        let current_threshold = current.salinity_threshold_ds_m;
        let next = if trend > 0.0 {
            let weight = 0.5 + ctx.risk_aversion.clamp(0.0, 1.0);
            (current_threshold - trend * self.sensitivity * weight).max(self.floor_ds_m)
        } else if current_threshold < default {
            (current_threshold + (default - current_threshold) * self.recovery_rate).min(default)
        } else {
            current_threshold
        };
        if (next - current_threshold).abs() < 1e-9 {
            None
        } else {
            Some(Strategy {
                salinity_threshold_ds_m: next,
            })
        }
    }
}

/// Scenario-level choice of advisor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdvisorConfig {
    #[default]
    Fixed,
    Trend {
        #[serde(default = "default_sensitivity")]
        sensitivity: f64,
        #[serde(default = "default_floor")]
        floor_ds_m: f64,
        #[serde(default = "default_recovery")]
        recovery_rate: f64,
    },
}

fn default_sensitivity() -> f64 {
    TrendAdvisor::default().sensitivity
}

fn default_floor() -> f64 {
    TrendAdvisor::default().floor_ds_m
}

fn default_recovery() -> f64 {
    TrendAdvisor::default().recovery_rate
}

impl AdvisorConfig {
    pub fn build(&self) -> Box<dyn StrategyAdvisor> {
        match self {
            AdvisorConfig::Fixed => Box::new(FixedStrategy),
            AdvisorConfig::Trend {
                sensitivity,
                floor_ds_m,
                recovery_rate,
            } => Box::new(TrendAdvisor {
                sensitivity: *sensitivity,
                floor_ds_m: *floor_ds_m,
                recovery_rate: *recovery_rate,
            }),
        }
    }
}
