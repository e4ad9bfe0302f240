//! Assignment-space search.
//!
//! # Strategies
//!
//! - **`coarse`**: every instance in the same region
//! - **`fine`**: exhaustive Cartesian product of allowed sets
//! - **`heuristic`**: seeded sampling plus best-response local search
//!
//! All strategies evaluate candidates in batches on the solve's rayon pool
//! through [`Evaluator`], which also enforces the deadline between batches.

mod coarse;
mod fine;
mod heuristic;

pub use coarse::CoarseSearch;
pub use fine::{FineSearch, space_size};
pub use heuristic::HeuristicSearch;

use std::collections::BTreeMap;

use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::debug;

use geoflow_core::{ObjectiveWeights, StrategyKind};

use crate::calculator::{Calculator, DeploymentMetrics, Scratch};
use crate::constraints::ConstraintChecker;
use crate::deadline::Deadline;
use crate::error::SolverResult;

/// Candidates evaluated per worker between deadline checks.
const BATCH_PER_WORKER: usize = 256;

/// Tunables shared by the strategies.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub max_candidates: u64,
    pub budget: usize,
    pub max_steps: usize,
    pub starts: usize,
    pub seed: u64,
    pub objective: ObjectiveWeights,
    pub rank_by_tail: bool,
}

pub struct SearchContext<'a> {
    pub calculator: &'a Calculator<'a>,
    pub checker: &'a ConstraintChecker,
    pub pool: &'a ThreadPool,
    pub workers: usize,
    pub deadline: Deadline,
    pub params: SearchParams,
}

impl SearchContext<'_> {
    pub(crate) fn evaluator(&self) -> Evaluator<'_> {
        Evaluator {
            ctx: self,
            batch_size: self.workers.max(1) * BATCH_PER_WORKER,
            batches: 0,
            evaluated: 0,
            numeric_anomalies: 0,
            partial: false,
            survivors: BTreeMap::new(),
        }
    }
}

/// A feasible assignment and its metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub assignment: Vec<usize>,
    pub metrics: DeploymentMetrics,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Sorted by assignment vector.
    pub survivors: Vec<Candidate>,
    pub evaluated: u64,
    /// The deadline cut the search short.
    pub partial: bool,
    pub numeric_anomalies: u64,
}

pub trait SearchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-line description for logs and CLI output.
    fn describe(&self) -> String;

    fn search(&self, ctx: &SearchContext<'_>) -> SolverResult<SearchOutcome>;
}

/// The strategy implementing `kind`.
pub fn strategy_for(kind: StrategyKind) -> Box<dyn SearchStrategy> {
    match kind {
        StrategyKind::Coarse => Box::new(CoarseSearch),
        StrategyKind::Fine => Box::new(FineSearch),
        StrategyKind::Heuristic => Box::new(HeuristicSearch),
    }
}

/// Result of evaluating one candidate in a batch.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Evaluation {
    Admitted(DeploymentMetrics),
    /// Violates a hard global bound.
    Rejected(DeploymentMetrics),
    Anomaly,
}

/// Batched, deadline-aware evaluation that accumulates survivors.
pub(crate) struct Evaluator<'a> {
    ctx: &'a SearchContext<'a>,
    batch_size: usize,
    batches: u64,
    evaluated: u64,
    numeric_anomalies: u64,
    partial: bool,
    survivors: BTreeMap<Vec<usize>, DeploymentMetrics>,
}

impl Evaluator<'_> {
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Whether another batch may run. The first batch always may.
    pub fn may_continue(&mut self) -> bool {
        if self.partial {
            return false;
        }
        if self.batches > 0 && self.ctx.deadline.expired() {
            debug!(
                batches = self.batches,
                evaluated = self.evaluated,
                "deadline reached, stopping search"
            );
            self.partial = true;
            return false;
        }
        true
    }

    /// Evaluate one batch in parallel; results keep input order.
    pub fn run_batch(&mut self, batch: &[Vec<usize>]) -> Vec<Evaluation> {
        let calculator = self.ctx.calculator;
        let checker = self.ctx.checker;
        let results: Vec<Evaluation> = self.ctx.pool.install(|| {
            batch
                .par_iter()
                .map_init(
                    || calculator.scratch(),
                    |scratch: &mut Scratch, assignment| {
                        match calculator.evaluate(assignment, scratch) {
                            Ok(metrics) if checker.admits(&metrics) => {
                                Evaluation::Admitted(metrics)
                            }
                            Ok(metrics) => Evaluation::Rejected(metrics),
                            Err(_) => Evaluation::Anomaly,
                        }
                    },
                )
                .collect()
        });

        self.batches += 1;
        self.evaluated += batch.len() as u64;
        for (assignment, result) in batch.iter().zip(&results) {
            match result {
                Evaluation::Admitted(metrics) => {
                    self.survivors.insert(assignment.clone(), *metrics);
                }
                Evaluation::Rejected(_) => {}
                Evaluation::Anomaly => self.numeric_anomalies += 1,
            }
        }
        results
    }

    /// Drain `candidates` batch by batch until exhausted or out of time.
    pub fn run_all(&mut self, candidates: impl Iterator<Item = Vec<usize>>) {
        let mut candidates = candidates.peekable();
        while candidates.peek().is_some() && self.may_continue() {
            let batch: Vec<Vec<usize>> = candidates.by_ref().take(self.batch_size).collect();
            self.run_batch(&batch);
        }
    }

    pub fn finish(self) -> SearchOutcome {
        SearchOutcome {
            survivors: self
                .survivors
                .into_iter()
                .map(|(assignment, metrics)| Candidate {
                    assignment,
                    metrics,
                })
                .collect(),
            evaluated: self.evaluated,
            partial: self.partial,
            numeric_anomalies: self.numeric_anomalies,
        }
    }
}
