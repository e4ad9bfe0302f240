use tracing::debug;

use crate::error::{SolverError, SolverResult};
use crate::workflow::WorkflowModel;

use super::{SearchContext, SearchOutcome, SearchStrategy};

/// Exhaustive search over the Cartesian product of allowed sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct FineSearch;

/// Number of assignments in the product of allowed sets, saturating.
pub fn space_size(model: &WorkflowModel) -> u128 {
    (0..model.instance_count())
        .map(|i| model.allowed_regions(i).len() as u128)
        .fold(1u128, u128::saturating_mul)
}

impl SearchStrategy for FineSearch {
    fn name(&self) -> &'static str {
        "fine"
    }

    fn describe(&self) -> String {
        "every instance placed independently (exhaustive)".to_string()
    }

    fn search(&self, ctx: &SearchContext<'_>) -> SolverResult<SearchOutcome> {
        let model = ctx.calculator.model();
        let size = space_size(model);
        let cap = ctx.params.max_candidates;
        if size > u128::from(cap) {
            return Err(SolverError::SearchSpaceTooLarge { size, cap });
        }
        debug!(size = size as u64, "fine-grained search space");

        let allowed: Vec<&[usize]> = (0..model.instance_count())
            .map(|i| model.allowed_regions(i))
            .collect();
        let mut evaluator = ctx.evaluator();
        evaluator.run_all(Odometer::new(allowed));
        Ok(evaluator.finish())
    }
}

/// Mixed-radix counter over allowed sets, in lexicographic order of the
/// resulting assignment vectors.
struct Odometer<'a> {
    allowed: Vec<&'a [usize]>,
    digits: Vec<usize>,
    done: bool,
}

impl<'a> Odometer<'a> {
    fn new(allowed: Vec<&'a [usize]>) -> Self {
        let done = allowed.iter().any(|set| set.is_empty());
        Self {
            digits: vec![0; allowed.len()],
            allowed,
            done,
        }
    }
}

impl Iterator for Odometer<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let current = self
            .digits
            .iter()
            .zip(&self.allowed)
            .map(|(d, set)| set[*d])
            .collect();

        // Advance: the last instance varies fastest.
        let mut position = self.digits.len();
        loop {
            if position == 0 {
                self.done = true;
                break;
            }
            position -= 1;
            self.digits[position] += 1;
            if self.digits[position] < self.allowed[position].len() {
                break;
            }
            self.digits[position] = 0;
        }
        Some(current)
    }
}
