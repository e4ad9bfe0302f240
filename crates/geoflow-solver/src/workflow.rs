//! Workflow model: a validated DAG of instances with resolved edge statistics.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::warn;

use geoflow_core::{DiagnosticKind, Diagnostics};
use geoflow_store::{RouteLatency, WorkflowConfigRow};

use crate::error::{SolverError, SolverResult};
use crate::indexer::RegionIndexer;
use crate::loader::WorkflowStatistics;

/// Probabilities this close outside `[0, 1]` are clamped instead of rejected.
const PROBABILITY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub sync: bool,
    pub memory_mb: u32,
    pub timeout_s: u32,
    pub environment_variables: BTreeMap<String, String>,
    /// Allowed region indices, ascending.
    pub allowed: Vec<usize>,
}

impl Instance {
    pub fn memory_gb(&self) -> f64 {
        f64::from(self.memory_mb) / 1024.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct EdgeStats {
    pub probability: f64,
    pub size_gb: f64,
    /// Observed latencies keyed by (caller region, callee region) index.
    pub routes: HashMap<(usize, usize), RouteLatency>,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub stats: EdgeStats,
}

#[derive(Debug, Clone)]
pub struct WorkflowModel {
    instances: Vec<Instance>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    entry: usize,
    order: Vec<usize>,
}

impl WorkflowModel {
    /// Validate the workflow and attach statistics and allowed sets.
    ///
    /// `allowed` is indexed like `config.instances`.
    pub fn build(
        config: &WorkflowConfigRow,
        stats: &WorkflowStatistics,
        allowed: Vec<Vec<usize>>,
        indexer: &RegionIndexer,
        diagnostics: &mut Diagnostics,
    ) -> SolverResult<Self> {
        if config.instances.is_empty() {
            return Err(SolverError::config(format!(
                "workflow {:?} has no instances",
                config.workflow_id
            )));
        }
        if allowed.len() != config.instances.len() {
            return Err(SolverError::config("allowed region sets do not match the instance list"));
        }

        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (i, spec) in config.instances.iter().enumerate() {
            if positions.insert(spec.name.as_str(), i).is_some() {
                return Err(SolverError::config(format!("duplicate instance name {:?}", spec.name)));
            }
        }

        let n = config.instances.len();
        let mut edges = Vec::with_capacity(config.edges.len());
        let mut outgoing = vec![Vec::new(); n];
        let mut incoming = vec![Vec::new(); n];
        let mut seen = BTreeSet::new();
        for spec in &config.edges {
            let lookup = |name: &str| {
                positions.get(name).copied().ok_or_else(|| {
                    SolverError::config(format!(
                        "edge {} -> {} references unknown instance {name:?}",
                        spec.from, spec.to
                    ))
                })
            };
            let (from, to) = (lookup(&spec.from)?, lookup(&spec.to)?);
            if from == to {
                return Err(SolverError::config(format!("self-loop on instance {:?}", spec.from)));
            }
            if !seen.insert((from, to)) {
                return Err(SolverError::config(format!(
                    "duplicate edge {} -> {}",
                    spec.from, spec.to
                )));
            }
            let stats = edge_stats(&spec.from, &spec.to, stats, indexer, diagnostics)?;
            outgoing[from].push(edges.len());
            incoming[to].push(edges.len());
            edges.push(Edge { from, to, stats });
        }

        let entry = find_entry(config, &incoming)?;

        let mut instances = Vec::with_capacity(n);
        for ((spec, allowed), preds) in config.instances.iter().zip(allowed).zip(&incoming) {
            let mut sync = spec.sync;
            if sync && preds.len() <= 1 {
                warn!(instance = %spec.name, in_degree = preds.len(), "sync flag ignored on instance without a join");
                diagnostics.record(
                    DiagnosticKind::SyncDemoted,
                    spec.name.clone(),
                    format!("sync instance has in-degree {}; treated as non-sync", preds.len()),
                );
                sync = false;
            }
            let mut allowed = allowed;
            allowed.sort_unstable();
            allowed.dedup();
            instances.push(Instance {
                name: spec.name.clone(),
                sync,
                memory_mb: spec.memory_mb,
                timeout_s: spec.timeout_s,
                environment_variables: spec.environment_variables.clone(),
                allowed,
            });
        }

        let order = topological_order(&instances, &edges, &outgoing, &incoming).ok_or_else(|| {
            SolverError::config(format!("workflow {:?} contains a cycle", config.workflow_id))
        })?;

        Ok(Self {
            instances,
            edges,
            outgoing,
            incoming,
            entry,
            order,
        })
    }

    pub fn entry_point(&self) -> usize {
        self.entry
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instance(&self, i: usize) -> &Instance {
        &self.instances[i]
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outgoing edges of `i`, in configuration order.
    pub fn successors(&self, i: usize) -> impl Iterator<Item = &Edge> {
        self.outgoing[i].iter().map(|e| &self.edges[*e])
    }

    /// Incoming edges of `i`, in configuration order.
    pub fn predecessors(&self, i: usize) -> impl Iterator<Item = &Edge> {
        self.incoming[i].iter().map(|e| &self.edges[*e])
    }

    pub fn is_sync(&self, i: usize) -> bool {
        self.instances[i].sync
    }

    pub fn allowed_regions(&self, i: usize) -> &[usize] {
        &self.instances[i].allowed
    }

    pub fn topological_order(&self) -> &[usize] {
        &self.order
    }
}

fn find_entry(config: &WorkflowConfigRow, incoming: &[Vec<usize>]) -> SolverResult<usize> {
    let flagged: Vec<usize> = (0..config.instances.len())
        .filter(|i| config.instances[*i].entry_point)
        .collect();
    let roots: Vec<usize> = (0..config.instances.len())
        .filter(|i| incoming[*i].is_empty())
        .collect();

    let entry = match flagged.as_slice() {
        [entry] => *entry,
        [] => match roots.as_slice() {
            [root] => *root,
            [] => return Err(SolverError::config("workflow has no entry point")),
            _ => return Err(multiple_entries(config, &roots)),
        },
        _ => return Err(multiple_entries(config, &flagged)),
    };

    if !incoming[entry].is_empty() {
        return Err(SolverError::config(format!(
            "entry point {:?} has incoming edges",
            config.instances[entry].name
        )));
    }
    if roots.len() > 1 {
        return Err(multiple_entries(config, &roots));
    }
    Ok(entry)
}

fn multiple_entries(config: &WorkflowConfigRow, candidates: &[usize]) -> SolverError {
    let names: Vec<&str> = candidates
        .iter()
        .map(|i| config.instances[*i].name.as_str())
        .collect();
    SolverError::config(format!("workflow has multiple entry points: {}", names.join(", ")))
}

fn edge_stats(
    from: &str,
    to: &str,
    stats: &WorkflowStatistics,
    indexer: &RegionIndexer,
    diagnostics: &mut Diagnostics,
) -> SolverResult<EdgeStats> {
    let subject = format!("{from}->{to}");
    let Some(recorded) = stats.invocations.get(&(from.to_string(), to.to_string())) else {
        diagnostics.record(
            DiagnosticKind::EdgeStatsMissing,
            subject,
            "no invocation summary; assuming p = 1 and size = 0",
        );
        return Ok(EdgeStats {
            probability: 1.0,
            size_gb: 0.0,
            routes: HashMap::new(),
        });
    };

    let mut defaulted = Vec::new();
    let probability = match recorded.probability {
        Some(p) => checked_probability(p, &subject, diagnostics)?,
        None => {
            defaulted.push("p = 1");
            1.0
        }
    };
    let size_gb = match recorded.avg_size_gb {
        Some(size) if size.is_finite() && size >= 0.0 => size,
        Some(size) => {
            return Err(SolverError::config(format!(
                "edge {subject} has invalid avg_size_gb {size}"
            )));
        }
        None => {
            defaulted.push("size = 0");
            0.0
        }
    };
    if !defaulted.is_empty() {
        diagnostics.record(
            DiagnosticKind::EdgeStatsMissing,
            subject,
            format!("incomplete invocation summary; assuming {}", defaulted.join(" and ")),
        );
    }

    let routes = recorded
        .routes
        .iter()
        .filter_map(|((caller, callee), latency)| {
            Some(((indexer.index(caller)?, indexer.index(callee)?), *latency))
        })
        .collect();

    Ok(EdgeStats {
        probability,
        size_gb,
        routes,
    })
}

fn checked_probability(p: f64, subject: &str, diagnostics: &mut Diagnostics) -> SolverResult<f64> {
    if (0.0..=1.0).contains(&p) {
        return Ok(p);
    }
    if p.is_finite() && p >= -PROBABILITY_TOLERANCE && p <= 1.0 + PROBABILITY_TOLERANCE {
        let clamped = p.clamp(0.0, 1.0);
        diagnostics.record(
            DiagnosticKind::ProbabilityClamped,
            subject,
            format!("probability {p} clamped to {clamped}"),
        );
        return Ok(clamped);
    }
    Err(SolverError::config(format!(
        "edge {subject} has probability {p} outside [0, 1]"
    )))
}

/// Kahn's algorithm; ready instances are taken in name order.
/// Returns `None` when the graph has a cycle.
fn topological_order(
    instances: &[Instance],
    edges: &[Edge],
    outgoing: &[Vec<usize>],
    incoming: &[Vec<usize>],
) -> Option<Vec<usize>> {
    let mut remaining: Vec<usize> = incoming.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<(&str, usize)> = remaining
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| (instances[i].name.as_str(), i))
        .collect();

    let mut order = Vec::with_capacity(instances.len());
    while let Some((_, i)) = ready.pop_first() {
        order.push(i);
        for e in &outgoing[i] {
            let to = edges[*e].to;
            remaining[to] -= 1;
            if remaining[to] == 0 {
                ready.insert((instances[to].name.as_str(), to));
            }
        }
    }
    (order.len() == instances.len()).then_some(order)
}
