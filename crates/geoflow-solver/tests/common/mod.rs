//! Shared fixtures for solver integration tests.
//!
//! Builds fixture documents in the store's import format and loads them into
//! an in-memory metrics store.

#![allow(dead_code)]

use std::collections::BTreeMap;

use geoflow_core::{Diagnostics, GeoflowConfig};
use geoflow_solver::constraints::allowed_regions;
use geoflow_solver::{
    Deadline, DeploymentProfile, LoadedMetrics, Loader, RegionIndexer, RetryPolicy, WorkflowModel,
};
use geoflow_store::MetricsStore;
use serde_json::{Value, json};

/// One region of a fixture.
#[derive(Debug, Clone)]
pub struct Region {
    pub provider: String,
    pub region: String,
    pub price_gb_s: f64,
    pub grid: Option<f64>,
}

impl Region {
    pub fn new(provider: &str, region: &str, price_gb_s: f64) -> Self {
        Self {
            provider: provider.to_string(),
            region: region.to_string(),
            price_gb_s,
            grid: Some(300.0),
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.provider, self.region)
    }

    pub fn without_grid(mut self) -> Self {
        self.grid = None;
        self
    }
}

/// Fluent builder for a single-workflow fixture.
#[derive(Debug, Clone, Default)]
pub struct Fixture {
    pub workflow_id: String,
    pub regions: Vec<Region>,
    pub instances: Vec<Value>,
    pub edges: Vec<(String, String, Option<f64>, f64)>,
    /// instance → region key → (avg, tail)
    pub runtimes: BTreeMap<String, BTreeMap<String, (f64, f64)>>,
    pub egress_per_gb: f64,
    pub intra_latency: f64,
    pub inter_latency: f64,
}

impl Fixture {
    pub fn new(workflow_id: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            egress_per_gb: 0.02,
            intra_latency: 0.01,
            inter_latency: 0.08,
            ..Default::default()
        }
    }

    pub fn region(mut self, region: Region) -> Self {
        self.regions.push(region);
        self
    }

    pub fn instance(mut self, name: &str, memory_mb: u32) -> Self {
        self.instances.push(json!({
            "name": name,
            "memory_mb": memory_mb,
            "timeout_s": 60,
        }));
        self
    }

    pub fn sync_instance(mut self, name: &str, memory_mb: u32) -> Self {
        self.instances.push(json!({
            "name": name,
            "memory_mb": memory_mb,
            "timeout_s": 60,
            "sync": true,
        }));
        self
    }

    /// Restrict an already added instance to `regions` (`provider:region`).
    pub fn allow(mut self, name: &str, regions: &[&str]) -> Self {
        if let Some(instance) = self.instances.iter_mut().find(|i| i["name"] == name) {
            instance["allowed_regions"] = json!(regions);
        }
        self
    }

    pub fn edge(mut self, from: &str, to: &str, p: f64, size_gb: f64) -> Self {
        self.edges.push((from.to_string(), to.to_string(), Some(p), size_gb));
        self
    }

    /// Same runtime for `instance` in every region.
    pub fn runtime(mut self, instance: &str, avg: f64, tail: f64) -> Self {
        let keys: Vec<String> = self.regions.iter().map(Region::key).collect();
        let entry = self.runtimes.entry(instance.to_string()).or_default();
        for key in keys {
            entry.insert(key, (avg, tail));
        }
        self
    }

    pub fn runtime_in(mut self, instance: &str, region: &str, avg: f64, tail: f64) -> Self {
        self.runtimes
            .entry(instance.to_string())
            .or_default()
            .insert(region.to_string(), (avg, tail));
        self
    }

    pub fn document(&self) -> Value {
        let datacenters: Vec<Value> = self
            .regions
            .iter()
            .map(|r| {
                json!({
                    "provider": r.provider,
                    "region_code": r.region,
                    "memory_gb_s_price": r.price_gb_s,
                    "invocation_price": 0.0,
                    "power_per_gb_s": 1e-6,
                    "egress": {
                        "intra_region": 0.0,
                        "inter_region": [{ "price_per_gb": self.egress_per_gb }],
                    },
                })
            })
            .collect();

        let grid: Vec<Value> = self
            .regions
            .iter()
            .filter_map(|r| {
                r.grid.map(|intensity| {
                    json!({
                        "provider": r.provider,
                        "region_code": r.region,
                        "timestamp": 1_700_000_000u64,
                        "carbon_intensity_gco2_per_kwh": intensity,
                    })
                })
            })
            .collect();

        let mut latency = Vec::new();
        for from in &self.regions {
            for to in &self.regions {
                let avg = if from.key() == to.key() {
                    self.intra_latency
                } else {
                    self.inter_latency
                };
                latency.push(json!({
                    "provider_from": from.provider, "region_from": from.region,
                    "provider_to": to.provider, "region_to": to.region,
                    "timestamp": 1_700_000_000u64,
                    "avg": avg, "p95": avg * 1.5,
                }));
            }
        }

        let edges: Vec<Value> = self
            .edges
            .iter()
            .map(|(from, to, _, _)| json!({ "from": from, "to": to }))
            .collect();

        let mut invocation_summary: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        for (from, to, p, size) in &self.edges {
            invocation_summary
                .entry(from.clone())
                .or_default()
                .insert(to.clone(), json!({ "probability": p, "avg_size_gb": size }));
        }

        let execution_summary: BTreeMap<String, BTreeMap<String, Value>> = self
            .runtimes
            .iter()
            .map(|(instance, per_region)| {
                let per_region = per_region
                    .iter()
                    .map(|(region, (avg, tail))| {
                        (region.clone(), json!({ "avg_runtime": avg, "tail_runtime": tail }))
                    })
                    .collect();
                (instance.clone(), per_region)
            })
            .collect();

        json!({
            "datacenter_info": datacenters,
            "grid_carbon": grid,
            "network_latency": latency,
            "workflow_config": [{
                "workflow_id": self.workflow_id,
                "instances": self.instances,
                "edges": edges,
            }],
            "workflow_statistics": [{
                "workflow_id": self.workflow_id,
                "execution_summary": execution_summary,
                "invocation_summary": invocation_summary,
            }],
        })
    }

    pub fn store(&self) -> MetricsStore {
        let store = MetricsStore::open_in_memory().unwrap();
        store.import_fixture(&self.document()).unwrap();
        store
    }
}

pub fn load(store: &MetricsStore, workflow_id: &str) -> LoadedMetrics {
    Loader::new(store, RetryPolicy::default(), Deadline::none())
        .load(workflow_id)
        .unwrap()
}

/// The evaluation inputs of a loaded workflow, with default configuration.
pub struct Prepared {
    pub indexer: RegionIndexer,
    pub model: WorkflowModel,
    pub profile: DeploymentProfile,
}

pub fn prepare(loaded: &LoadedMetrics) -> Prepared {
    let config = GeoflowConfig::default();
    let indexer = RegionIndexer::new(loaded.datacenters.iter().map(|d| d.id.clone()));
    let allowed = allowed_regions(&loaded.workflow, &loaded.datacenters, &indexer, None).unwrap();
    let mut diagnostics = Diagnostics::default();
    let model = WorkflowModel::build(
        &loaded.workflow,
        &loaded.statistics,
        allowed,
        &indexer,
        &mut diagnostics,
    )
    .unwrap();
    let profile = DeploymentProfile::build(
        loaded,
        &indexer,
        &model,
        &config.carbon,
        &config.pricing,
        &mut diagnostics,
    )
    .unwrap();
    Prepared {
        indexer,
        model,
        profile,
    }
}

/// Scenario A: `a → b`, two regions, cost-only.
pub fn two_node_chain() -> Fixture {
    Fixture::new("chain")
        .region(Region::new("aws", "r1", 1e-5))
        .region(Region::new("aws", "r2", 1.2e-5))
        .instance("a", 512)
        .instance("b", 512)
        .edge("a", "b", 1.0, 1e-3)
        .runtime("a", 1.0, 1.5)
        .runtime("b", 2.0, 3.0)
}
