//! geoflow.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level solver configuration. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoflowConfig {
    #[serde(default)]
    pub solver: SolverSection,
    #[serde(default)]
    pub carbon: CarbonSection,
    #[serde(default)]
    pub pricing: PricingSection,
    #[serde(default)]
    pub store: StoreSection,
}

/// How a non-sync join picks its start time from competing predecessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Arrival of the predecessor with the highest `p * arrival`.
    #[default]
    MostLikelyBranch,
    /// Reach-weighted mean of predecessor arrivals.
    ExpectedValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Min-max per metric across the survivor set.
    #[default]
    MinMax,
    /// Raw metric values.
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSection {
    /// Evaluation worker threads. Defaults to available parallelism.
    pub workers: Option<usize>,
    /// Fine-grained search refuses assignment spaces above this size.
    pub max_candidates: u64,
    pub heuristic_budget: usize,
    pub heuristic_max_steps: usize,
    pub heuristic_starts: usize,
    pub runtime_mode: RuntimeMode,
    /// Rank on the tail tuple instead of the expected tuple.
    pub rank_by_tail: bool,
    /// Evaluate soft constraints on the tail tuple.
    pub soft_on_tail: bool,
    pub normalization: Normalization,
    pub top_k: usize,
}

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            workers: None,
            max_candidates: 1_000_000,
            heuristic_budget: 200,
            heuristic_max_steps: 64,
            heuristic_starts: 4,
            runtime_mode: RuntimeMode::default(),
            rank_by_tail: false,
            soft_on_tail: true,
            normalization: Normalization::default(),
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarbonSection {
    /// Used when a region has no grid carbon row.
    pub world_average_grid_gco2_per_kwh: f64,
    /// Network energy per GB, used when a transmission carbon row is missing.
    pub transmission_kwh_per_gb: f64,
    /// Used when a datacenter row carries no `power_per_gb_s`.
    pub default_power_kwh_per_gb_s: f64,
}

impl Default for CarbonSection {
    fn default() -> Self {
        Self {
            world_average_grid_gco2_per_kwh: 475.0,
            transmission_kwh_per_gb: 0.001,
            default_power_kwh_per_gb_s: 1.5e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingSection {
    /// Monthly egress volume used to pick a price band.
    pub egress_monthly_volume_gb: f64,
    /// Charge each region's fixed per-invocation overhead.
    pub include_overhead: bool,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            egress_monthly_volume_gb: 0.0,
            include_overhead: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub retry_initial_ms: u64,
    pub retry_max_elapsed_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            retry_initial_ms: 50,
            retry_max_elapsed_ms: 2_000,
        }
    }
}

impl GeoflowConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GeoflowConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
