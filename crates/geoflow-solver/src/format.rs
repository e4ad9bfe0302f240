//! Response formatting: region indices back to names.

use std::collections::BTreeMap;

use geoflow_core::{Diagnostics, RankedPlacement, RegionLabel, SolveResponse};

use crate::indexer::RegionIndexer;
use crate::ranker::Ranked;
use crate::workflow::WorkflowModel;

/// Search totals reported alongside the ranking.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchSummary {
    pub evaluated: u64,
    pub survivors: u64,
    pub partial: bool,
}

/// `{ instance: { provider, region } }` for one ranked candidate.
pub fn placement(ranked: &Ranked, model: &WorkflowModel, indexer: &RegionIndexer) -> RankedPlacement {
    let assignment: BTreeMap<String, RegionLabel> = ranked
        .candidate
        .assignment
        .iter()
        .enumerate()
        .map(|(i, r)| (model.instance(i).name.clone(), RegionLabel::from(indexer.region(*r))))
        .collect();
    RankedPlacement {
        assignment,
        metrics: ranked.candidate.metrics.expected,
        tail_metrics: ranked.candidate.metrics.tail,
        score: ranked.score,
        soft_violations: ranked.soft_violations,
    }
}

pub fn response(
    ranked: &[Ranked],
    model: &WorkflowModel,
    indexer: &RegionIndexer,
    summary: SearchSummary,
    diagnostics: Diagnostics,
) -> SolveResponse {
    SolveResponse {
        ranked: ranked.iter().map(|r| placement(r, model, indexer)).collect(),
        partial: summary.partial,
        evaluated: summary.evaluated,
        survivors: summary.survivors,
        diagnostics,
    }
}
