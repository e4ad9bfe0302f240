//! geoflow placement solver: cost, runtime and carbon aware placement of
//! serverless workflows across cloud regions.
//!
//! A solve loads a fresh snapshot of the metrics store, builds dense
//! evaluation tables, searches the assignment space with the requested
//! strategy, and ranks the survivors by a weighted objective.
//!
//! # Components
//!
//! - **`loader`**: typed snapshot of the metrics store, with retries
//! - **`indexer`**: dense region indices
//! - **`workflow`**: validated workflow DAG
//! - **`constraints`**: allowed region sets and global bounds
//! - **`profile`**: dense per-region tables with data-gap fallbacks
//! - **`calculator`**: expected and tail metrics of one assignment
//! - **`search`**: coarse, fine-grained and heuristic strategies
//! - **`ranker`** / **`format`**: ordering and response shaping
//! - **`solve`**: orchestration

pub mod calculator;
pub mod constraints;
pub mod deadline;
pub mod error;
pub mod format;
pub mod indexer;
pub mod loader;
pub mod profile;
pub mod ranker;
pub mod search;
pub mod solve;
pub mod workflow;

pub use calculator::{Calculator, CalculatorOptions, DeploymentMetrics, NumericAnomaly, Scratch};
pub use constraints::ConstraintChecker;
pub use deadline::Deadline;
pub use error::{SolverError, SolverResult};
pub use indexer::RegionIndexer;
pub use loader::{LoadedMetrics, Loader, RetryPolicy};
pub use profile::DeploymentProfile;
pub use search::{Candidate, SearchOutcome, SearchStrategy, strategy_for};
pub use solve::Solver;
pub use workflow::WorkflowModel;
