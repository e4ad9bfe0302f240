use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use geoflow_core::Metrics;

use crate::error::SolverResult;

use super::{Evaluation, SearchContext, SearchOutcome, SearchStrategy};

/// Penalty per violated hard bound, above any weighted score.
const HARD_PENALTY: f64 = 1e6;
/// Penalty per violated soft bound.
const SOFT_PENALTY: f64 = 1e3;

/// Seeded random sampling followed by best-response local search.
///
/// Samples `budget` assignments uniformly from the allowed sets, then
/// improves the best `starts` of them one instance at a time until no
/// single move helps or `max_steps` is reached. Every feasible assignment
/// seen along the way is a survivor. The result is a function of the seed
/// unless the deadline interrupts the search.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicSearch;

impl SearchStrategy for HeuristicSearch {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn describe(&self) -> String {
        "seeded sampling with best-response local search".to_string()
    }

    fn search(&self, ctx: &SearchContext<'_>) -> SolverResult<SearchOutcome> {
        let model = ctx.calculator.model();
        let params = ctx.params;
        let count = model.instance_count();
        let mut rng = StdRng::seed_from_u64(params.seed);

        let samples: Vec<Vec<usize>> = (0..params.budget.max(1))
            .map(|_| {
                (0..count)
                    .map(|i| {
                        let allowed = model.allowed_regions(i);
                        allowed[rng.gen_range(0..allowed.len())]
                    })
                    .collect()
            })
            .collect();

        let mut evaluator = ctx.evaluator();
        let batch_size = evaluator.batch_size();
        let mut scored: Vec<(Vec<usize>, Evaluation)> = Vec::with_capacity(samples.len());
        for chunk in samples.chunks(batch_size) {
            if !evaluator.may_continue() {
                break;
            }
            let results = evaluator.run_batch(chunk);
            scored.extend(chunk.iter().cloned().zip(results));
        }

        let objective = Objective::from_samples(ctx, &scored);
        let mut ranked: Vec<(f64, Vec<usize>)> = scored
            .into_iter()
            .map(|(assignment, eval)| (objective.value(&eval), assignment))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        ranked.dedup_by(|a, b| a.1 == b.1);

        for (start_value, start) in ranked.into_iter().take(params.starts.max(1)) {
            let mut current = start;
            let mut current_value = start_value;
            for step in 0..params.max_steps {
                if !evaluator.may_continue() {
                    break;
                }
                let moves = neighbours(ctx, &current);
                if moves.is_empty() {
                    break;
                }
                let results = evaluator.run_batch(&moves);
                let best = results
                    .iter()
                    .map(|eval| objective.value(eval))
                    .enumerate()
                    .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                match best {
                    Some((index, value)) if value < current_value => {
                        current = moves[index].clone();
                        current_value = value;
                    }
                    _ => {
                        debug!(step, value = current_value, "local search converged");
                        break;
                    }
                }
            }
        }

        Ok(evaluator.finish())
    }
}

/// All assignments differing from `current` in exactly one instance,
/// ordered by (instance, region).
fn neighbours(ctx: &SearchContext<'_>, current: &[usize]) -> Vec<Vec<usize>> {
    let model = ctx.calculator.model();
    let mut out = Vec::new();
    for i in 0..model.instance_count() {
        for &r in model.allowed_regions(i) {
            if r != current[i] {
                let mut next = current.to_vec();
                next[i] = r;
                out.push(next);
            }
        }
    }
    out
}

/// Scalar guide for the local search: the weighted objective over metrics
/// scaled by the largest sampled value, plus penalties for violated bounds.
struct Objective<'a> {
    ctx: &'a SearchContext<'a>,
    scale: [f64; 3],
}

impl<'a> Objective<'a> {
    fn from_samples(ctx: &'a SearchContext<'a>, scored: &[(Vec<usize>, Evaluation)]) -> Self {
        let mut scale = [0.0f64; 3];
        for (_, eval) in scored {
            if let Evaluation::Admitted(m) | Evaluation::Rejected(m) = eval {
                let values = m.ranked(ctx.params.rank_by_tail).as_array();
                for (s, v) in scale.iter_mut().zip(values) {
                    *s = s.max(v);
                }
            }
        }
        for s in &mut scale {
            if *s <= 0.0 {
                *s = 1.0;
            }
        }
        Self { ctx, scale }
    }

    fn weighted(&self, metrics: &Metrics) -> f64 {
        let weights = self.ctx.params.objective.as_array();
        metrics
            .as_array()
            .iter()
            .zip(weights)
            .zip(self.scale)
            .map(|((v, w), s)| w * v / s)
            .sum()
    }

    fn value(&self, eval: &Evaluation) -> f64 {
        let by_tail = self.ctx.params.rank_by_tail;
        match eval {
            Evaluation::Admitted(m) => {
                let soft = self.ctx.checker.soft_violations(m);
                f64::from(soft) * SOFT_PENALTY + self.weighted(m.ranked(by_tail))
            }
            Evaluation::Rejected(m) => {
                let hard = self.ctx.checker.hard_violations(m);
                let soft = self.ctx.checker.soft_violations(m);
                f64::from(hard) * HARD_PENALTY
                    + f64::from(soft) * SOFT_PENALTY
                    + self.weighted(m.ranked(by_tail))
            }
            Evaluation::Anomaly => f64::INFINITY,
        }
    }
}
