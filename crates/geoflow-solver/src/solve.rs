//! Solve orchestration: load, build, search, rank, format.

use rayon::ThreadPoolBuilder;
use tracing::{info, info_span, warn};

use geoflow_core::{GeoflowConfig, SolveRequest, SolveResponse};
use geoflow_store::MetricsSource;

use crate::calculator::{Calculator, CalculatorOptions};
use crate::constraints::{ConstraintChecker, allowed_regions};
use crate::deadline::Deadline;
use crate::error::{SolverError, SolverResult};
use crate::format::{self, SearchSummary};
use crate::indexer::RegionIndexer;
use crate::loader::{LoadedMetrics, Loader, RetryPolicy};
use crate::profile::DeploymentProfile;
use crate::ranker::{self, RankingPolicy};
use crate::search::{SearchContext, SearchParams, strategy_for};
use crate::workflow::WorkflowModel;

/// Entry point for placement solves. Holds configuration only; every solve
/// reads a fresh snapshot of the metrics.
#[derive(Debug, Clone, Default)]
pub struct Solver {
    config: GeoflowConfig,
}

impl Solver {
    pub fn new(config: GeoflowConfig) -> Self {
        Self { config }
    }

    /// Solve `request` against the metrics in `source`.
    pub fn solve<S: MetricsSource + ?Sized>(
        &self,
        source: &S,
        request: &SolveRequest,
    ) -> SolverResult<SolveResponse> {
        self.validate(request)?;
        let deadline = Deadline::from_millis(request.deadline_ms);
        let retry = RetryPolicy::from(&self.config.store);
        let loaded = Loader::new(source, retry, deadline).load(&request.workflow_id)?;
        self.solve_loaded(loaded, request, deadline)
    }

    /// Solve against metrics that are already loaded.
    pub fn solve_loaded(
        &self,
        loaded: LoadedMetrics,
        request: &SolveRequest,
        deadline: Deadline,
    ) -> SolverResult<SolveResponse> {
        self.validate(request)?;
        let span = info_span!(
            "solve",
            workflow = %request.workflow_id,
            strategy = request.strategy.label()
        );
        let _guard = span.enter();
        let solver = &self.config.solver;

        let mut diagnostics = loaded.diagnostics.clone();
        let indexer = RegionIndexer::new(loaded.datacenters.iter().map(|d| d.id.clone()));
        let allowed = allowed_regions(
            &loaded.workflow,
            &loaded.datacenters,
            &indexer,
            request.per_instance_regions.as_ref(),
        )?;
        let model = WorkflowModel::build(
            &loaded.workflow,
            &loaded.statistics,
            allowed,
            &indexer,
            &mut diagnostics,
        )?;
        let profile = DeploymentProfile::build(
            &loaded,
            &indexer,
            &model,
            &self.config.carbon,
            &self.config.pricing,
            &mut diagnostics,
        )?;

        let calculator = Calculator::new(
            &model,
            &profile,
            CalculatorOptions {
                runtime_mode: solver.runtime_mode,
                include_overhead: self.config.pricing.include_overhead,
            },
        );
        let checker = ConstraintChecker::new(
            request.constraints,
            request.soft_constraints,
            solver.soft_on_tail,
        );

        let workers = request
            .workers
            .or(solver.workers)
            .unwrap_or_else(rayon::current_num_threads)
            .max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("geoflow-eval-{i}"))
            .build()
            .map_err(|e| SolverError::config(format!("cannot start {workers} workers: {e}")))?;

        let ctx = SearchContext {
            calculator: &calculator,
            checker: &checker,
            pool: &pool,
            workers,
            deadline,
            params: SearchParams {
                max_candidates: solver.max_candidates,
                budget: request.budget.unwrap_or(solver.heuristic_budget),
                max_steps: solver.heuristic_max_steps,
                starts: solver.heuristic_starts,
                seed: request.seed.unwrap_or(0),
                objective: request.objective,
                rank_by_tail: solver.rank_by_tail,
            },
        };

        let strategy = strategy_for(request.strategy);
        info!(
            strategy = strategy.name(),
            description = %strategy.describe(),
            instances = model.instance_count(),
            regions = indexer.len(),
            workers,
            "search started"
        );
        let outcome = strategy.search(&ctx)?;
        if outcome.partial {
            warn!(
                evaluated = outcome.evaluated,
                survivors = outcome.survivors.len(),
                "deadline expired, returning partial results"
            );
        }
        diagnostics.numeric_anomalies += outcome.numeric_anomalies;

        let summary = SearchSummary {
            evaluated: outcome.evaluated,
            survivors: outcome.survivors.len() as u64,
            partial: outcome.partial,
        };
        let policy = RankingPolicy {
            weights: request.objective,
            normalization: solver.normalization,
            by_tail: solver.rank_by_tail,
            top_k: request.top_k.unwrap_or(solver.top_k),
        };
        let ranked = ranker::rank(outcome.survivors, &policy, &checker);

        info!(
            evaluated = summary.evaluated,
            survivors = summary.survivors,
            ranked = ranked.len(),
            partial = summary.partial,
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "solve finished"
        );
        Ok(format::response(&ranked, &model, &indexer, summary, diagnostics))
    }

    fn validate(&self, request: &SolveRequest) -> SolverResult<()> {
        if !request.objective.is_valid() {
            return Err(SolverError::config(
                "objective weights must be non-negative, finite and not all zero",
            ));
        }
        if request.top_k == Some(0) {
            return Err(SolverError::config("top_k must be at least 1"));
        }
        if request.workers == Some(0) {
            return Err(SolverError::config("workers must be at least 1"));
        }
        Ok(())
    }
}
