pub mod import;
pub mod regions;
pub mod solve;

use std::path::Path;

use geoflow_solver::SolverError;
use geoflow_store::MetricsStore;

/// Open the metrics database; failures map to the store-unavailable exit code.
pub fn open_store(path: &Path) -> Result<MetricsStore, SolverError> {
    MetricsStore::open(path).map_err(SolverError::StoreUnavailable)
}
