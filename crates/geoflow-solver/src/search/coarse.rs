use tracing::debug;

use crate::error::SolverResult;

use super::{SearchContext, SearchOutcome, SearchStrategy};

/// Pins every instance to one region, for each region all instances allow.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoarseSearch;

impl SearchStrategy for CoarseSearch {
    fn name(&self) -> &'static str {
        "coarse"
    }

    fn describe(&self) -> String {
        "single region for the whole workflow".to_string()
    }

    fn search(&self, ctx: &SearchContext<'_>) -> SolverResult<SearchOutcome> {
        let model = ctx.calculator.model();
        let mut common: Vec<usize> = model.allowed_regions(0).to_vec();
        for i in 1..model.instance_count() {
            let allowed = model.allowed_regions(i);
            common.retain(|r| allowed.binary_search(r).is_ok());
        }
        debug!(regions = common.len(), "coarse candidates");

        let count = model.instance_count();
        let mut evaluator = ctx.evaluator();
        evaluator.run_all(common.into_iter().map(|r| vec![r; count]));
        Ok(evaluator.finish())
    }
}
