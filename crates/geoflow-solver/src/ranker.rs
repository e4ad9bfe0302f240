//! Candidate ranking.
//!
//! Scores survivors with a weighted sum of their metrics, optionally
//! min-max normalized across the survivor set, and orders them by:
//! - soft constraint violations (fewest first)
//! - score (lowest first)
//! - cost, runtime, carbon
//! - assignment vector, so the order is total

use std::cmp::Ordering;

use geoflow_core::config::Normalization;
use geoflow_core::{Metrics, ObjectiveWeights};

use crate::constraints::ConstraintChecker;
use crate::search::Candidate;

/// Ranking settings for one solve.
#[derive(Debug, Clone, Copy)]
pub struct RankingPolicy {
    pub weights: ObjectiveWeights,
    pub normalization: Normalization,
    /// Score the tail tuple instead of the expected tuple.
    pub by_tail: bool,
    pub top_k: usize,
}

/// A scored candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub candidate: Candidate,
    pub score: f64,
    pub soft_violations: u32,
}

/// Per-metric `(min, max)` over a candidate set.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    min: [f64; 3],
    max: [f64; 3],
}

impl Bounds {
    fn of<'a>(metrics: impl Iterator<Item = &'a Metrics>) -> Self {
        let mut bounds = Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        };
        for m in metrics {
            for (k, v) in m.as_array().into_iter().enumerate() {
                bounds.min[k] = bounds.min[k].min(v);
                bounds.max[k] = bounds.max[k].max(v);
            }
        }
        bounds
    }

    /// Position of `v` within the range of metric `k`; 0 when the range is empty.
    fn normalize(&self, k: usize, v: f64) -> f64 {
        let span = self.max[k] - self.min[k];
        if span > 0.0 { (v - self.min[k]) / span } else { 0.0 }
    }
}

/// Score a candidate's metrics.
fn score(metrics: &Metrics, weights: &ObjectiveWeights, bounds: Option<&Bounds>) -> f64 {
    metrics
        .as_array()
        .into_iter()
        .zip(weights.as_array())
        .enumerate()
        .map(|(k, (v, w))| {
            let v = match bounds {
                Some(b) => b.normalize(k, v),
                None => v,
            };
            w * v
        })
        .sum()
}

/// Score all survivors and return the best `top_k`, best first.
pub fn rank(
    survivors: Vec<Candidate>,
    policy: &RankingPolicy,
    checker: &ConstraintChecker,
) -> Vec<Ranked> {
    let bounds = match policy.normalization {
        Normalization::MinMax => Some(Bounds::of(
            survivors.iter().map(|c| c.metrics.ranked(policy.by_tail)),
        )),
        Normalization::None => None,
    };

    let mut ranked: Vec<Ranked> = survivors
        .into_iter()
        .map(|candidate| {
            let metrics = candidate.metrics.ranked(policy.by_tail);
            Ranked {
                score: score(metrics, &policy.weights, bounds.as_ref()),
                soft_violations: checker.soft_violations(&candidate.metrics),
                candidate,
            }
        })
        .collect();

    ranked.sort_by(|a, b| compare(a, b, policy.by_tail));
    ranked.truncate(policy.top_k);
    ranked
}

fn compare(a: &Ranked, b: &Ranked, by_tail: bool) -> Ordering {
    let (ma, mb) = (
        a.candidate.metrics.ranked(by_tail),
        b.candidate.metrics.ranked(by_tail),
    );
    a.soft_violations
        .cmp(&b.soft_violations)
        .then_with(|| a.score.total_cmp(&b.score))
        .then_with(|| ma.cost.total_cmp(&mb.cost))
        .then_with(|| ma.runtime.total_cmp(&mb.runtime))
        .then_with(|| ma.carbon.total_cmp(&mb.carbon))
        .then_with(|| a.candidate.assignment.cmp(&b.candidate.assignment))
}
