//! geoflow-store: embedded metrics store for geoflow.
//!
//! Backed by [redb](https://docs.rs/redb), holds the telemetry the solver
//! consumes: datacenter profiles, grid carbon, network latency,
//! transmission carbon, workflow configuration and workflow statistics.
//!
//! # Architecture
//!
//! Rows are JSON documents in redb's `&[u8]` value columns, addressed by
//! table name and primary key. Time-bucketed keys end in a zero-padded
//! timestamp so prefix scans return rows oldest first.
//!
//! `MetricsStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).
//! Readers depend on the [`MetricsSource`] trait rather than the store.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::{MetricsSource, MetricsStore, row_key};
pub use tables::Table;
pub use types::*;
