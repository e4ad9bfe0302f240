//! Shared types for solve requests and responses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::region::RegionId;

// ── Metrics ───────────────────────────────────────────────────────

/// Expected cost (USD), runtime (seconds) and carbon (gCO2e) of one
/// workflow invocation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub cost: f64,
    pub runtime: f64,
    pub carbon: f64,
}

impl Metrics {
    pub fn new(cost: f64, runtime: f64, carbon: f64) -> Self {
        Self { cost, runtime, carbon }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.cost, self.runtime, self.carbon]
    }

    pub fn is_finite(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite())
    }
}

/// Relative weight of each metric in the ranking objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub runtime: f64,
    #[serde(default)]
    pub carbon: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            cost: 1.0,
            runtime: 0.0,
            carbon: 0.0,
        }
    }
}

impl ObjectiveWeights {
    pub fn as_array(&self) -> [f64; 3] {
        [self.cost, self.runtime, self.carbon]
    }

    /// Weights must be finite, non-negative, and not all zero.
    pub fn is_valid(&self) -> bool {
        let w = self.as_array();
        w.iter().all(|v| v.is_finite() && *v >= 0.0) && w.iter().any(|v| *v > 0.0)
    }
}

/// Upper bounds on the metrics of a deployment. Unset bounds are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runtime: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_carbon: Option<f64>,
}

impl MetricBounds {
    pub fn is_empty(&self) -> bool {
        self.max_cost.is_none() && self.max_runtime.is_none() && self.max_carbon.is_none()
    }

    /// Number of bounds the metrics exceed.
    pub fn violations(&self, m: &Metrics) -> u32 {
        [
            (self.max_cost, m.cost),
            (self.max_runtime, m.runtime),
            (self.max_carbon, m.carbon),
        ]
        .iter()
        .filter(|(bound, value)| bound.is_some_and(|b| *value > b))
        .count() as u32
    }
}

// ── Request ───────────────────────────────────────────────────────

/// Assignment-space search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Every instance pinned to the same region.
    Coarse,
    /// Every instance placed independently (exhaustive).
    Fine,
    /// Seeded random sampling plus best-response local search.
    Heuristic,
}

impl StrategyKind {
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::Coarse => "coarse",
            StrategyKind::Fine => "fine",
            StrategyKind::Heuristic => "heuristic",
        }
    }
}

/// A request to place one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveRequest {
    pub workflow_id: String,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub objective: ObjectiveWeights,
    /// Hard global constraints on expected metrics.
    #[serde(default)]
    pub constraints: MetricBounds,
    /// Soft global constraints; violators rank after compliant candidates.
    #[serde(default)]
    pub soft_constraints: MetricBounds,
    /// Per-instance allow-list override (`provider:region` strings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_instance_regions: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
    /// Heuristic sample budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl SolveRequest {
    /// A request with default objective, no constraints, and no overrides.
    pub fn new(workflow_id: impl Into<String>, strategy: StrategyKind) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            strategy,
            objective: ObjectiveWeights::default(),
            constraints: MetricBounds::default(),
            soft_constraints: MetricBounds::default(),
            per_instance_regions: None,
            top_k: None,
            seed: None,
            deadline_ms: None,
            budget: None,
            workers: None,
        }
    }
}

// ── Response ──────────────────────────────────────────────────────

/// Human-readable placement of one instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionLabel {
    pub provider: String,
    pub region: String,
}

impl From<&RegionId> for RegionLabel {
    fn from(id: &RegionId) -> Self {
        Self {
            provider: id.provider.clone(),
            region: id.region.clone(),
        }
    }
}

/// One ranked deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPlacement {
    pub assignment: BTreeMap<String, RegionLabel>,
    pub metrics: Metrics,
    pub tail_metrics: Metrics,
    /// Weighted objective score (lower is better).
    pub score: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub soft_violations: u32,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResponse {
    pub ranked: Vec<RankedPlacement>,
    /// True when the deadline expired before the search finished.
    pub partial: bool,
    pub evaluated: u64,
    pub survivors: u64,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

// ── Diagnostics ───────────────────────────────────────────────────

/// Kinds of recoverable data gaps recorded during a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A row referenced a region missing from the catalog and was dropped.
    MissingRegion,
    GridCarbonFallback,
    TransmissionCarbonFallback,
    LatencyFallback,
    RuntimeFallback,
    EdgeStatsMissing,
    EgressPricingMissing,
    PowerUnitCoerced,
    PowerDefaulted,
    ProbabilityClamped,
    SyncDemoted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub kind: DiagnosticKind,
    /// What the entry is about: a region, instance, edge, or table.
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    #[serde(default)]
    pub entries: Vec<DiagnosticEntry>,
    /// Candidates discarded because evaluation produced NaN or infinity.
    #[serde(default)]
    pub numeric_anomalies: u64,
}

impl Diagnostics {
    pub fn record(&mut self, kind: DiagnosticKind, subject: impl Into<String>, detail: impl Into<String>) {
        self.entries.push(DiagnosticEntry {
            kind,
            subject: subject.into(),
            detail: detail.into(),
        });
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn find(&self, kind: DiagnosticKind, subject: &str) -> Option<&DiagnosticEntry> {
        self.entries
            .iter()
            .find(|e| e.kind == kind && e.subject == subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_request() {
        let json = r#"{ "workflow_id": "wf", "strategy": "coarse" }"#;
        let req: SolveRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.strategy, StrategyKind::Coarse);
        assert_eq!(req.objective, ObjectiveWeights::default());
        assert!(req.constraints.is_empty());
        assert!(req.top_k.is_none());
    }

    #[test]
    fn test_parse_full_request() {
        let json = r#"{
            "workflow_id": "wf",
            "strategy": "heuristic",
            "objective": { "cost": 0.5, "carbon": 0.5 },
            "constraints": { "max_runtime": 3.0 },
            "per_instance_regions": { "resize": ["aws:us-east-1"] },
            "top_k": 3, "seed": 42, "deadline_ms": 250
        }"#;
        let req: SolveRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.objective.runtime, 0.0);
        assert_eq!(req.constraints.max_runtime, Some(3.0));
        assert_eq!(req.seed, Some(42));
        assert_eq!(req.per_instance_regions.unwrap()["resize"].len(), 1);
    }

    #[test]
    fn test_weights_validation() {
        assert!(ObjectiveWeights::default().is_valid());
        let zero = ObjectiveWeights { cost: 0.0, runtime: 0.0, carbon: 0.0 };
        assert!(!zero.is_valid());
        let negative = ObjectiveWeights { cost: -1.0, runtime: 1.0, carbon: 0.0 };
        assert!(!negative.is_valid());
    }

    #[test]
    fn test_bounds_violations() {
        let bounds = MetricBounds {
            max_cost: Some(1.0),
            max_runtime: None,
            max_carbon: Some(5.0),
        };
        assert_eq!(bounds.violations(&Metrics::new(0.5, 100.0, 4.0)), 0);
        assert_eq!(bounds.violations(&Metrics::new(2.0, 0.0, 6.0)), 2);
    }
}
