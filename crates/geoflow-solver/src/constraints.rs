//! Placement constraints.
//!
//! Per-instance constraints shrink each instance's allowed region set before
//! search. Global constraints bound a candidate's evaluated metrics: hard
//! bounds discard it, soft bounds only demote it in the ranking.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use geoflow_core::{MetricBounds, RegionId};
use geoflow_store::{InstanceSpec, WorkflowConfigRow};

use crate::calculator::DeploymentMetrics;
use crate::error::{SolverError, SolverResult};
use crate::indexer::RegionIndexer;
use crate::loader::Datacenter;

/// Compute `allowed(i)` for every instance, in configuration order.
///
/// `datacenters` must be indexed by `indexer` (same order).
pub fn allowed_regions(
    workflow: &WorkflowConfigRow,
    datacenters: &[Datacenter],
    indexer: &RegionIndexer,
    overrides: Option<&BTreeMap<String, Vec<String>>>,
) -> SolverResult<Vec<Vec<usize>>> {
    if let Some(overrides) = overrides {
        for name in overrides.keys() {
            if !workflow.instances.iter().any(|i| &i.name == name) {
                return Err(SolverError::config(format!(
                    "per_instance_regions names unknown instance {name:?}"
                )));
            }
        }
    }

    let workflow_allow = workflow
        .allowed_regions
        .as_deref()
        .map(|list| parse_list(list, "workflow allowed_regions"))
        .transpose()?;
    let workflow_deny = parse_list(&workflow.disallowed_regions, "workflow disallowed_regions")?;

    workflow
        .instances
        .iter()
        .map(|instance| {
            let override_list = overrides
                .and_then(|o| o.get(&instance.name))
                .map(|list| {
                    let parsed = parse_list(list, "per_instance_regions")?;
                    if let Some(unknown) = parsed.iter().find(|id| indexer.index(id).is_none()) {
                        return Err(SolverError::config(format!(
                            "per_instance_regions for {:?} names unknown region {unknown}",
                            instance.name
                        )));
                    }
                    Ok(parsed)
                })
                .transpose()?;

            let allowed = instance_regions(
                workflow,
                instance,
                datacenters,
                indexer,
                &InstanceLists {
                    workflow_allow: workflow_allow.as_ref(),
                    workflow_deny: &workflow_deny,
                    override_allow: override_list.as_ref(),
                },
            )?;
            if allowed.is_empty() {
                return Err(SolverError::config(format!(
                    "no region satisfies the constraints of instance {:?}",
                    instance.name
                )));
            }
            debug!(instance = %instance.name, allowed = allowed.len(), "allowed regions computed");
            Ok(allowed)
        })
        .collect()
}

struct InstanceLists<'a> {
    workflow_allow: Option<&'a BTreeSet<RegionId>>,
    workflow_deny: &'a BTreeSet<RegionId>,
    override_allow: Option<&'a BTreeSet<RegionId>>,
}

fn instance_regions(
    workflow: &WorkflowConfigRow,
    instance: &InstanceSpec,
    datacenters: &[Datacenter],
    indexer: &RegionIndexer,
    lists: &InstanceLists<'_>,
) -> SolverResult<Vec<usize>> {
    let instance_allow = instance
        .allowed_regions
        .as_deref()
        .map(|list| parse_list(list, "instance allowed_regions"))
        .transpose()?;
    let instance_deny = parse_list(&instance.disallowed_regions, "instance disallowed_regions")?;

    let allow_lists: Vec<&BTreeSet<RegionId>> = [
        lists.workflow_allow,
        instance_allow.as_ref(),
        lists.override_allow,
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut allowed = Vec::new();
    for (index, id) in indexer.iter() {
        let dc = &datacenters[index];
        let provider_ok = [workflow.providers.as_ref(), instance.providers.as_ref()]
            .into_iter()
            .flatten()
            .all(|providers| providers.iter().any(|p| *p == id.provider));
        if !provider_ok {
            continue;
        }
        if !allow_lists.iter().all(|list| list.contains(id)) {
            continue;
        }
        if lists.workflow_deny.contains(id) || instance_deny.contains(id) {
            continue;
        }
        // Opt-in regions need to be named by some allow-list.
        if dc.opt_in && !allow_lists.iter().any(|list| list.contains(id)) {
            continue;
        }
        if dc.max_memory_mb.is_some_and(|cap| instance.memory_mb > cap)
            || dc.max_timeout_s.is_some_and(|cap| instance.timeout_s > cap)
        {
            continue;
        }
        allowed.push(index);
    }
    Ok(allowed)
}

fn parse_list(list: &[String], what: &str) -> SolverResult<BTreeSet<RegionId>> {
    list.iter()
        .map(|text| {
            RegionId::parse(text).map_err(|e| SolverError::config(format!("{what}: {e}")))
        })
        .collect()
}

/// Global bounds on a candidate's evaluated metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintChecker {
    pub hard: MetricBounds,
    pub soft: MetricBounds,
    /// Check soft bounds against the tail tuple instead of the expected one.
    pub soft_on_tail: bool,
}

impl ConstraintChecker {
    pub fn new(hard: MetricBounds, soft: MetricBounds, soft_on_tail: bool) -> Self {
        Self {
            hard,
            soft,
            soft_on_tail,
        }
    }

    /// Whether the expected metrics satisfy every hard bound.
    pub fn admits(&self, metrics: &DeploymentMetrics) -> bool {
        self.hard.violations(&metrics.expected) == 0
    }

    pub fn hard_violations(&self, metrics: &DeploymentMetrics) -> u32 {
        self.hard.violations(&metrics.expected)
    }

    pub fn soft_violations(&self, metrics: &DeploymentMetrics) -> u32 {
        let tuple = if self.soft_on_tail {
            &metrics.tail
        } else {
            &metrics.expected
        };
        self.soft.violations(tuple)
    }
}
