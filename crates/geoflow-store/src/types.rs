//! Row types for the geoflow metrics store.
//!
//! Rows are stored as JSON. Telemetry collectors write them; the solver's
//! loader parses them into these types once and rejects rows that do not
//! match. Optional fields carry documented fallbacks downstream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tables;

// ── Datacenter ────────────────────────────────────────────────────

/// Unit of a datacenter's `power_per_gb_s` figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUnit {
    #[default]
    Kwh,
    Wh,
}

/// Execution profile and pricing for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatacenterRow {
    pub provider: String,
    pub region_code: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    /// Opt-in regions are only used when explicitly allowed.
    #[serde(default)]
    pub opt_in: bool,
    /// USD per GB-second of configured memory.
    pub memory_gb_s_price: f64,
    /// USD per invocation.
    pub invocation_price: f64,
    /// Energy per GB-second, in `power_unit`.
    #[serde(default)]
    pub power_per_gb_s: Option<f64>,
    #[serde(default)]
    pub power_unit: PowerUnit,
    #[serde(default)]
    pub egress: Option<EgressPricing>,
    /// USD charged per invocation on top of execution (e.g. gateway fees).
    #[serde(default)]
    pub fixed_overhead: f64,
    #[serde(default)]
    pub max_memory_mb: Option<u32>,
    #[serde(default)]
    pub max_timeout_s: Option<u32>,
}

/// Per-GB egress price bands out of a region.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EgressPricing {
    /// USD per GB between functions in the same region.
    #[serde(default)]
    pub intra_region: f64,
    /// Bands for transfers to another region of the same provider.
    #[serde(default)]
    pub inter_region: Vec<PriceBand>,
    /// Bands for transfers to another provider. Falls back to `inter_region`.
    #[serde(default)]
    pub inter_provider: Vec<PriceBand>,
}

/// One tier of a tiered price; `up_to_gb = None` is the open-ended tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBand {
    #[serde(default)]
    pub up_to_gb: Option<f64>,
    pub price_per_gb: f64,
}

impl EgressPricing {
    /// Price per GB for the band covering `monthly_volume_gb`.
    pub fn band_price(bands: &[PriceBand], monthly_volume_gb: f64) -> Option<f64> {
        let mut sorted: Vec<&PriceBand> = bands.iter().collect();
        sorted.sort_by(|a, b| {
            let a = a.up_to_gb.unwrap_or(f64::INFINITY);
            let b = b.up_to_gb.unwrap_or(f64::INFINITY);
            a.total_cmp(&b)
        });
        sorted
            .iter()
            .find(|band| band.up_to_gb.is_none_or(|cap| monthly_volume_gb < cap))
            .or(sorted.last())
            .map(|band| band.price_per_gb)
    }
}

// ── Carbon & network ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCarbonRow {
    pub provider: String,
    pub region_code: String,
    /// Unix timestamp (seconds) of the bucket.
    pub timestamp: u64,
    /// `null` when the collector had no reading for the bucket.
    #[serde(default)]
    pub carbon_intensity_gco2_per_kwh: Option<f64>,
}

/// Measured latency between two regions, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkLatencyRow {
    pub provider_from: String,
    pub region_from: String,
    pub provider_to: String,
    pub region_to: String,
    pub timestamp: u64,
    /// `null` when no probe completed in the bucket.
    #[serde(default)]
    pub avg: Option<f64>,
    #[serde(default)]
    pub p50: Option<f64>,
    #[serde(default)]
    pub p90: Option<f64>,
    #[serde(default)]
    pub p95: Option<f64>,
    #[serde(default)]
    pub p99: Option<f64>,
}

impl NetworkLatencyRow {
    /// Tail latency: p95, else p99, else p90, else the average.
    pub fn tail(&self) -> Option<f64> {
        self.p95.or(self.p99).or(self.p90).or(self.avg)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionCarbonRow {
    pub provider_from: String,
    pub region_from: String,
    pub provider_to: String,
    pub region_to: String,
    pub gco2_per_gb: f64,
}

// ── Workflow ──────────────────────────────────────────────────────

/// Structure and placement constraints of a deployed workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfigRow {
    pub workflow_id: String,
    pub instances: Vec<InstanceSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    /// Providers every instance may use. `None` allows all.
    #[serde(default)]
    pub providers: Option<Vec<String>>,
    /// Workflow-wide allow-list (`provider:region`). `None` allows all.
    #[serde(default)]
    pub allowed_regions: Option<Vec<String>>,
    #[serde(default)]
    pub disallowed_regions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    #[serde(default)]
    pub entry_point: bool,
    #[serde(default)]
    pub sync: bool,
    pub memory_mb: u32,
    pub timeout_s: u32,
    #[serde(default)]
    pub allowed_regions: Option<Vec<String>>,
    #[serde(default)]
    pub disallowed_regions: Vec<String>,
    #[serde(default)]
    pub providers: Option<Vec<String>>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: String,
    pub to: String,
}

/// Recorded workload statistics of a workflow.
///
/// Region keys are written `provider:region`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowStatisticsRow {
    pub workflow_id: String,
    /// instance → region → runtime summary.
    #[serde(default)]
    pub execution_summary: BTreeMap<String, BTreeMap<String, ExecutionSummary>>,
    /// caller → callee → invocation summary.
    #[serde(default)]
    pub invocation_summary: BTreeMap<String, BTreeMap<String, InvocationSummary>>,
}

/// Runtime of one instance in one region, in seconds. `null` means missing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionSummary {
    #[serde(default)]
    pub avg_runtime: Option<f64>,
    #[serde(default)]
    pub tail_runtime: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InvocationSummary {
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub avg_size_gb: Option<f64>,
    /// caller region → callee region → observed latency.
    #[serde(default)]
    pub latencies: BTreeMap<String, BTreeMap<String, RouteLatency>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteLatency {
    #[serde(default)]
    pub avg: Option<f64>,
    #[serde(default)]
    pub tail: Option<f64>,
}

// ── Keys ──────────────────────────────────────────────────────────

impl DatacenterRow {
    /// Build the key for the datacenter_info table.
    pub fn table_key(&self) -> String {
        tables::region_key(&self.provider, &self.region_code)
    }
}

impl GridCarbonRow {
    /// Build the key for the grid_carbon table.
    pub fn table_key(&self) -> String {
        tables::region_time_key(&self.provider, &self.region_code, self.timestamp)
    }
}

impl NetworkLatencyRow {
    /// Build the key for the network_latency table.
    pub fn table_key(&self) -> String {
        tables::pair_time_key(
            (&self.provider_from, &self.region_from),
            (&self.provider_to, &self.region_to),
            self.timestamp,
        )
    }
}

impl TransmissionCarbonRow {
    /// Build the key for the transmission_carbon table.
    pub fn table_key(&self) -> String {
        tables::pair_key(
            (&self.provider_from, &self.region_from),
            (&self.provider_to, &self.region_to),
        )
    }
}

impl WorkflowConfigRow {
    pub fn table_key(&self) -> String {
        self.workflow_id.clone()
    }
}

impl WorkflowStatisticsRow {
    pub fn table_key(&self) -> String {
        self.workflow_id.clone()
    }
}
