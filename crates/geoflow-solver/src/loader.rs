//! Metrics loader: one fresh snapshot of the store per solve.
//!
//! Reads the region catalog, grid carbon, latency and transmission rows,
//! and the workflow's configuration and statistics. Rows are parsed once
//! into typed structures here; nothing downstream touches raw JSON.
//!
//! Transient store failures are retried with exponential backoff, bounded
//! by both the retry budget and the solve deadline.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use backoff::SystemClock;
use backoff::exponential::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use geoflow_core::config::StoreSection;
use geoflow_core::{DiagnosticKind, Diagnostics, RegionId};
use geoflow_store::{
    DatacenterRow, EgressPricing, ExecutionSummary, GridCarbonRow, MetricsSource,
    NetworkLatencyRow, PowerUnit, RouteLatency, StoreError, StoreResult, Table,
    TransmissionCarbonRow, WorkflowConfigRow, WorkflowStatisticsRow,
};

use crate::deadline::Deadline;
use crate::error::{SolverError, SolverResult};

/// Retry policy for transient store failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max_elapsed: Duration,
}

impl From<&StoreSection> for RetryPolicy {
    fn from(section: &StoreSection) -> Self {
        Self {
            initial: Duration::from_millis(section.retry_initial_ms),
            max_elapsed: Duration::from_millis(section.retry_max_elapsed_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        (&StoreSection::default()).into()
    }
}

/// A cataloged region with units normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Datacenter {
    pub id: RegionId,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub opt_in: bool,
    pub memory_gb_s_price: f64,
    pub invocation_price: f64,
    /// kWh per GB-second; `None` when the row carried no figure.
    pub power_kwh_per_gb_s: Option<f64>,
    pub egress: Option<EgressPricing>,
    pub fixed_overhead: f64,
    pub max_memory_mb: Option<u32>,
    pub max_timeout_s: Option<u32>,
}

/// Latency between two regions, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkLatency {
    pub avg: f64,
    pub tail: f64,
}

/// Recorded statistics of one edge, with region keys resolved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdgeStatistics {
    pub probability: Option<f64>,
    pub avg_size_gb: Option<f64>,
    pub routes: BTreeMap<(RegionId, RegionId), RouteLatency>,
}

/// Workflow statistics with region keys resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkflowStatistics {
    /// instance → region → runtime summary.
    pub execution: BTreeMap<String, BTreeMap<RegionId, ExecutionSummary>>,
    /// (caller, callee) → invocation statistics.
    pub invocations: BTreeMap<(String, String), EdgeStatistics>,
}

/// Everything a solve reads from the store.
#[derive(Debug, Clone)]
pub struct LoadedMetrics {
    /// Sorted by region id.
    pub datacenters: Vec<Datacenter>,
    /// Most recent grid carbon intensity per region (gCO2e/kWh).
    pub grid_carbon: BTreeMap<RegionId, f64>,
    /// Most recent latency per ordered region pair.
    pub latencies: BTreeMap<(RegionId, RegionId), LinkLatency>,
    /// gCO2e per GB per ordered region pair.
    pub transmission_carbon: BTreeMap<(RegionId, RegionId), f64>,
    pub workflow: WorkflowConfigRow,
    pub statistics: WorkflowStatistics,
    pub diagnostics: Diagnostics,
}

/// Reads and validates a solve's inputs from a [`MetricsSource`].
pub struct Loader<'a, S: MetricsSource + ?Sized> {
    source: &'a S,
    retry: RetryPolicy,
    deadline: Deadline,
}

/// Regions referenced by rows but absent from the catalog, with the tables
/// that referenced them.
type MissingRegions = BTreeMap<RegionId, BTreeSet<&'static str>>;

impl<'a, S: MetricsSource + ?Sized> Loader<'a, S> {
    pub fn new(source: &'a S, retry: RetryPolicy, deadline: Deadline) -> Self {
        Self {
            source,
            retry,
            deadline,
        }
    }

    /// Load a fresh snapshot for `workflow_id`.
    pub fn load(&self, workflow_id: &str) -> SolverResult<LoadedMetrics> {
        let mut diagnostics = Diagnostics::default();
        let mut missing = MissingRegions::new();

        let datacenters = self.load_datacenters(&mut diagnostics)?;
        if datacenters.is_empty() {
            return Err(SolverError::config("the region catalog is empty"));
        }
        let catalog: BTreeSet<RegionId> = datacenters.iter().map(|d| d.id.clone()).collect();

        let grid_carbon = self.load_grid_carbon(&catalog, &mut missing)?;
        let latencies = self.load_latencies(&catalog, &mut missing)?;
        let transmission_carbon = self.load_transmission_carbon(&catalog, &mut missing)?;

        let workflow: WorkflowConfigRow = self
            .fetch_one(Table::WorkflowConfig, workflow_id)?
            .ok_or_else(|| SolverError::config(format!("unknown workflow {workflow_id:?}")))?;
        let raw_stats: WorkflowStatisticsRow = self
            .fetch_one(Table::WorkflowStatistics, workflow_id)?
            .ok_or_else(|| {
                SolverError::config(format!("no statistics recorded for workflow {workflow_id:?}"))
            })?;
        let statistics = resolve_statistics(workflow_id, raw_stats, &catalog, &mut missing)?;

        for (region, tables) in &missing {
            let tables: Vec<&str> = tables.iter().copied().collect();
            warn!(%region, ?tables, "dropping rows for uncataloged region");
            diagnostics.record(
                DiagnosticKind::MissingRegion,
                region.to_string(),
                format!("referenced by {} but absent from datacenter_info", tables.join(", ")),
            );
        }

        info!(
            workflow = workflow_id,
            regions = datacenters.len(),
            instances = workflow.instances.len(),
            latency_pairs = latencies.len(),
            elapsed_ms = self.deadline.elapsed().as_millis() as u64,
            "metrics loaded"
        );

        Ok(LoadedMetrics {
            datacenters,
            grid_carbon,
            latencies,
            transmission_carbon,
            workflow,
            statistics,
            diagnostics,
        })
    }

    // ── Tables ─────────────────────────────────────────────────────

    fn load_datacenters(&self, diagnostics: &mut Diagnostics) -> SolverResult<Vec<Datacenter>> {
        let rows: Vec<(String, DatacenterRow)> = self.fetch_all(Table::DatacenterInfo, "")?;
        let mut datacenters = Vec::with_capacity(rows.len());
        for (key, row) in rows {
            for (field, value) in [
                ("memory_gb_s_price", Some(row.memory_gb_s_price)),
                ("invocation_price", Some(row.invocation_price)),
                ("power_per_gb_s", row.power_per_gb_s),
                ("fixed_overhead", Some(row.fixed_overhead)),
            ] {
                if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
                    return Err(schema_mismatch(
                        Table::DatacenterInfo,
                        &key,
                        format!("{field} must be a non-negative number"),
                    ));
                }
            }

            let id = RegionId::new(&row.provider, &row.region_code);
            let power_kwh_per_gb_s = row.power_per_gb_s.map(|power| match row.power_unit {
                PowerUnit::Kwh => power,
                PowerUnit::Wh => {
                    diagnostics.record(
                        DiagnosticKind::PowerUnitCoerced,
                        id.to_string(),
                        format!("power_per_gb_s {power} Wh normalized to {} kWh", power / 1000.0),
                    );
                    power / 1000.0
                }
            });

            datacenters.push(Datacenter {
                id,
                lat: row.lat,
                lng: row.lng,
                opt_in: row.opt_in,
                memory_gb_s_price: row.memory_gb_s_price,
                invocation_price: row.invocation_price,
                power_kwh_per_gb_s,
                egress: row.egress,
                fixed_overhead: row.fixed_overhead,
                max_memory_mb: row.max_memory_mb,
                max_timeout_s: row.max_timeout_s,
            });
        }
        datacenters.sort_by(|a, b| a.id.cmp(&b.id));
        datacenters.dedup_by(|a, b| a.id == b.id);
        debug!(count = datacenters.len(), "datacenters loaded");
        Ok(datacenters)
    }

    fn load_grid_carbon(
        &self,
        catalog: &BTreeSet<RegionId>,
        missing: &mut MissingRegions,
    ) -> SolverResult<BTreeMap<RegionId, f64>> {
        let rows: Vec<(String, GridCarbonRow)> = self.fetch_all(Table::GridCarbon, "")?;
        let mut latest: BTreeMap<RegionId, (u64, f64)> = BTreeMap::new();
        for (key, row) in rows {
            let id = RegionId::new(&row.provider, &row.region_code);
            if !catalog.contains(&id) {
                missing.entry(id).or_default().insert(Table::GridCarbon.name());
                continue;
            }
            let Some(intensity) = row.carbon_intensity_gco2_per_kwh.filter(|v| v.is_finite())
            else {
                debug!(%id, timestamp = row.timestamp, "grid carbon bucket has no reading");
                continue;
            };
            if intensity < 0.0 {
                return Err(schema_mismatch(
                    Table::GridCarbon,
                    &key,
                    "carbon_intensity_gco2_per_kwh must be a non-negative number",
                ));
            }
            let slot = latest.entry(id).or_insert((row.timestamp, intensity));
            if row.timestamp >= slot.0 {
                *slot = (row.timestamp, intensity);
            }
        }
        Ok(latest.into_iter().map(|(id, (_, v))| (id, v)).collect())
    }

    fn load_latencies(
        &self,
        catalog: &BTreeSet<RegionId>,
        missing: &mut MissingRegions,
    ) -> SolverResult<BTreeMap<(RegionId, RegionId), LinkLatency>> {
        let rows: Vec<(String, NetworkLatencyRow)> = self.fetch_all(Table::NetworkLatency, "")?;
        let mut latest: BTreeMap<(RegionId, RegionId), (u64, LinkLatency)> = BTreeMap::new();
        for (key, row) in rows {
            let from = RegionId::new(&row.provider_from, &row.region_from);
            let to = RegionId::new(&row.provider_to, &row.region_to);
            if !track_pair(catalog, &from, &to, Table::NetworkLatency, missing) {
                continue;
            }
            let Some(avg) = row.avg.filter(|v| v.is_finite()) else {
                debug!(%from, %to, timestamp = row.timestamp, "latency bucket has no reading");
                continue;
            };
            let link = LinkLatency {
                avg,
                tail: row.tail().filter(|v| v.is_finite()).unwrap_or(avg),
            };
            if link.avg < 0.0 || link.tail < 0.0 {
                return Err(schema_mismatch(
                    Table::NetworkLatency,
                    &key,
                    "latencies must be non-negative numbers",
                ));
            }
            let slot = latest.entry((from, to)).or_insert((row.timestamp, link));
            if row.timestamp >= slot.0 {
                *slot = (row.timestamp, link);
            }
        }
        Ok(latest.into_iter().map(|(pair, (_, l))| (pair, l)).collect())
    }

    fn load_transmission_carbon(
        &self,
        catalog: &BTreeSet<RegionId>,
        missing: &mut MissingRegions,
    ) -> SolverResult<BTreeMap<(RegionId, RegionId), f64>> {
        let rows: Vec<(String, TransmissionCarbonRow)> =
            self.fetch_all(Table::TransmissionCarbon, "")?;
        let mut pairs = BTreeMap::new();
        for (key, row) in rows {
            let from = RegionId::new(&row.provider_from, &row.region_from);
            let to = RegionId::new(&row.provider_to, &row.region_to);
            if !track_pair(catalog, &from, &to, Table::TransmissionCarbon, missing) {
                continue;
            }
            if !row.gco2_per_gb.is_finite() || row.gco2_per_gb < 0.0 {
                return Err(schema_mismatch(
                    Table::TransmissionCarbon,
                    &key,
                    "gco2_per_gb must be a non-negative number",
                ));
            }
            pairs.insert((from, to), row.gco2_per_gb);
        }
        Ok(pairs)
    }

    // ── Store access ───────────────────────────────────────────────

    fn fetch_one<T: DeserializeOwned>(&self, table: Table, key: &str) -> SolverResult<Option<T>> {
        let row = self.with_retry(table, || self.source.get_row(table, key))?;
        row.map(|value| parse_row(table, key, value)).transpose()
    }

    fn fetch_all<T: DeserializeOwned>(
        &self,
        table: Table,
        prefix: &str,
    ) -> SolverResult<Vec<(String, T)>> {
        let rows = self.with_retry(table, || self.source.scan_rows(table, prefix))?;
        rows.into_iter()
            .map(|(key, value)| {
                let row = parse_row(table, &key, value)?;
                Ok((key, row))
            })
            .collect()
    }

    fn with_retry<T>(
        &self,
        table: Table,
        mut op: impl FnMut() -> StoreResult<T>,
    ) -> SolverResult<T> {
        if self.deadline.expired() {
            return Err(self.timeout(table));
        }
        let budget = match self.deadline.remaining() {
            Some(remaining) => remaining.min(self.retry.max_elapsed),
            None => self.retry.max_elapsed,
        };
        let policy: ExponentialBackoff<SystemClock> = ExponentialBackoffBuilder::default()
            .with_initial_interval(self.retry.initial)
            .with_max_elapsed_time(Some(budget))
            .build();

        let result = backoff::retry(policy, || {
            op().map_err(|err| {
                if err.is_transient() {
                    warn!(%table, error = %err, "store read failed, retrying");
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        });

        match result {
            Ok(_) if self.deadline.expired() => Err(self.timeout(table)),
            Ok(value) => Ok(value),
            Err(backoff::Error::Permanent(err)) => Err(match err {
                StoreError::Deserialize(reason) => schema_mismatch(table, "", reason),
                other => SolverError::StoreUnavailable(other),
            }),
            Err(backoff::Error::Transient { err, .. }) => {
                if self.deadline.expired() {
                    Err(self.timeout(table))
                } else {
                    Err(SolverError::StoreUnavailable(err))
                }
            }
        }
    }

    fn timeout(&self, table: Table) -> SolverError {
        SolverError::Timeout {
            stage: format!("reading {table}"),
            elapsed: self.deadline.elapsed(),
        }
    }
}

/// Records uncataloged endpoints; returns whether the pair is usable.
fn track_pair(
    catalog: &BTreeSet<RegionId>,
    from: &RegionId,
    to: &RegionId,
    table: Table,
    missing: &mut MissingRegions,
) -> bool {
    let mut usable = true;
    for id in [from, to] {
        if !catalog.contains(id) {
            missing.entry(id.clone()).or_default().insert(table.name());
            usable = false;
        }
    }
    usable
}

fn resolve_statistics(
    workflow_id: &str,
    raw: WorkflowStatisticsRow,
    catalog: &BTreeSet<RegionId>,
    missing: &mut MissingRegions,
) -> SolverResult<WorkflowStatistics> {
    let table = Table::WorkflowStatistics;
    let resolve = |text: &str, missing: &mut MissingRegions| -> SolverResult<Option<RegionId>> {
        let id = RegionId::parse(text)
            .map_err(|e| schema_mismatch(table, workflow_id, e.to_string()))?;
        if catalog.contains(&id) {
            Ok(Some(id))
        } else {
            missing.entry(id).or_default().insert(table.name());
            Ok(None)
        }
    };

    let mut stats = WorkflowStatistics::default();
    for (instance, per_region) in raw.execution_summary {
        let mut resolved = BTreeMap::new();
        for (region, summary) in per_region {
            if let Some(id) = resolve(&region, missing)? {
                resolved.insert(id, summary);
            }
        }
        stats.execution.insert(instance, resolved);
    }

    for (caller, callees) in raw.invocation_summary {
        for (callee, summary) in callees {
            let mut edge = EdgeStatistics {
                probability: summary.probability,
                avg_size_gb: summary.avg_size_gb,
                routes: BTreeMap::new(),
            };
            for (from, targets) in summary.latencies {
                let from = resolve(&from, missing)?;
                for (to, latency) in targets {
                    let to = resolve(&to, missing)?;
                    if let (Some(from), Some(to)) = (from.clone(), to) {
                        edge.routes.insert((from, to), latency);
                    }
                }
            }
            stats.invocations.insert((caller.clone(), callee), edge);
        }
    }
    Ok(stats)
}

fn parse_row<T: DeserializeOwned>(table: Table, key: &str, value: Value) -> SolverResult<T> {
    serde_json::from_value(value).map_err(|e| schema_mismatch(table, key, e.to_string()))
}

fn schema_mismatch(table: Table, key: &str, reason: impl Into<String>) -> SolverError {
    SolverError::SchemaMismatch {
        table: table.name().to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use geoflow_store::MetricsStore;
    use serde_json::json;

    use super::*;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            initial: Duration::from_millis(1),
            max_elapsed: Duration::from_millis(200),
        }
    }

    fn seeded_store() -> MetricsStore {
        let store = MetricsStore::open_in_memory().unwrap();
        store
            .import_fixture(&json!({
                "datacenter_info": [
                    { "provider": "aws", "region_code": "us-east-1",
                      "memory_gb_s_price": 1e-5, "invocation_price": 2e-7,
                      "power_per_gb_s": 0.0015, "power_unit": "wh" },
                    { "provider": "aws", "region_code": "eu-north-1",
                      "memory_gb_s_price": 1.1e-5, "invocation_price": 2e-7 },
                ],
                "grid_carbon": [
                    { "provider": "aws", "region_code": "us-east-1", "timestamp": 10,
                      "carbon_intensity_gco2_per_kwh": 390.0 },
                    { "provider": "aws", "region_code": "us-east-1", "timestamp": 20,
                      "carbon_intensity_gco2_per_kwh": 410.0 },
                    { "provider": "aws", "region_code": "ap-south-1", "timestamp": 20,
                      "carbon_intensity_gco2_per_kwh": 700.0 },
                ],
                "network_latency": [
                    { "provider_from": "aws", "region_from": "us-east-1",
                      "provider_to": "aws", "region_to": "eu-north-1",
                      "timestamp": 5, "avg": 0.09, "p95": 0.12 },
                ],
                "workflow_config": [{
                    "workflow_id": "wf",
                    "instances": [
                        { "name": "a", "entry_point": true, "memory_mb": 512, "timeout_s": 30 },
                        { "name": "b", "memory_mb": 512, "timeout_s": 30 },
                    ],
                    "edges": [{ "from": "a", "to": "b" }],
                }],
                "workflow_statistics": [{
                    "workflow_id": "wf",
                    "execution_summary": {
                        "a": { "aws:us-east-1": { "avg_runtime": 1.0, "tail_runtime": 1.5 },
                               "aws:ap-south-1": { "avg_runtime": 0.9 } },
                    },
                    "invocation_summary": {
                        "a": { "b": { "probability": 1.0, "avg_size_gb": 0.001 } }
                    },
                }],
            }))
            .unwrap();
        store
    }

    #[test]
    fn loads_and_normalizes() {
        let store = seeded_store();
        let loaded = Loader::new(&store, fast_retry(), Deadline::none())
            .load("wf")
            .unwrap();

        let ids: Vec<String> = loaded.datacenters.iter().map(|d| d.id.to_string()).collect();
        assert_eq!(ids, ["aws:eu-north-1", "aws:us-east-1"]);

        let east = RegionId::new("aws", "us-east-1");
        assert_eq!(loaded.grid_carbon[&east], 410.0);
        let power = loaded.datacenters[1].power_kwh_per_gb_s.unwrap();
        assert!((power - 1.5e-6).abs() < 1e-15);
        assert_eq!(loaded.diagnostics.count(DiagnosticKind::PowerUnitCoerced), 1);

        let north = RegionId::new("aws", "eu-north-1");
        let link = loaded.latencies[&(east.clone(), north)];
        assert_eq!(link.tail, 0.12);
    }

    #[test]
    fn null_readings_are_skipped() {
        let store = seeded_store();
        store
            .import_fixture(&json!({
                "grid_carbon": [
                    { "provider": "aws", "region_code": "us-east-1", "timestamp": 30,
                      "carbon_intensity_gco2_per_kwh": null },
                    { "provider": "aws", "region_code": "eu-north-1", "timestamp": 30,
                      "carbon_intensity_gco2_per_kwh": null },
                ],
                "network_latency": [
                    { "provider_from": "aws", "region_from": "us-east-1",
                      "provider_to": "aws", "region_to": "eu-north-1",
                      "timestamp": 9, "avg": null, "p95": 0.5 },
                    { "provider_from": "aws", "region_from": "eu-north-1",
                      "provider_to": "aws", "region_to": "us-east-1",
                      "timestamp": 9, "avg": null },
                ],
            }))
            .unwrap();
        let loaded = Loader::new(&store, fast_retry(), Deadline::none())
            .load("wf")
            .unwrap();

        let east = RegionId::new("aws", "us-east-1");
        let north = RegionId::new("aws", "eu-north-1");
        assert_eq!(loaded.grid_carbon[&east], 410.0);
        assert!(!loaded.grid_carbon.contains_key(&north));
        assert_eq!(loaded.latencies[&(east.clone(), north.clone())].avg, 0.09);
        assert!(!loaded.latencies.contains_key(&(north, east)));
    }

    #[test]
    fn drops_uncataloged_regions_with_diagnostic() {
        let store = seeded_store();
        let loaded = Loader::new(&store, fast_retry(), Deadline::none())
            .load("wf")
            .unwrap();

        let entry = loaded
            .diagnostics
            .find(DiagnosticKind::MissingRegion, "aws:ap-south-1")
            .unwrap();
        assert!(entry.detail.contains("grid_carbon"));
        assert!(entry.detail.contains("workflow_statistics"));
        assert_eq!(loaded.statistics.execution["a"].len(), 1);
    }

    #[test]
    fn unknown_workflow_is_config_error() {
        let store = seeded_store();
        let err = Loader::new(&store, fast_retry(), Deadline::none())
            .load("nope")
            .unwrap_err();
        assert!(matches!(err, SolverError::Config(_)));
    }

    #[test]
    fn malformed_row_is_schema_mismatch() {
        let store = seeded_store();
        store
            .put_row(
                Table::DatacenterInfo,
                "gcp:broken",
                &json!({ "provider": "gcp", "region_code": "broken" }),
            )
            .unwrap();
        let err = Loader::new(&store, fast_retry(), Deadline::none())
            .load("wf")
            .unwrap_err();
        match err {
            SolverError::SchemaMismatch { table, key, .. } => {
                assert_eq!(table, "datacenter_info");
                assert_eq!(key, "gcp:broken");
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    /// Fails the first `failures` reads, then delegates.
    struct FlakySource {
        inner: MetricsStore,
        failures: AtomicU32,
    }

    impl MetricsSource for FlakySource {
        fn get_row(&self, table: Table, key: &str) -> StoreResult<Option<Value>> {
            self.inner.get_row(table, key)
        }

        fn scan_rows(&self, table: Table, prefix: &str) -> StoreResult<Vec<(String, Value)>> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Read("connection reset".to_string()));
            }
            self.inner.scan_rows(table, prefix)
        }
    }

    #[test]
    fn transient_failures_are_retried() {
        let source = FlakySource {
            inner: seeded_store(),
            failures: AtomicU32::new(2),
        };
        let loaded = Loader::new(&source, fast_retry(), Deadline::none())
            .load("wf")
            .unwrap();
        assert_eq!(loaded.datacenters.len(), 2);
    }

    #[test]
    fn persistent_failure_surfaces_store_unavailable() {
        let source = FlakySource {
            inner: seeded_store(),
            failures: AtomicU32::new(u32::MAX),
        };
        let retry = RetryPolicy {
            initial: Duration::from_millis(1),
            max_elapsed: Duration::from_millis(20),
        };
        let err = Loader::new(&source, retry, Deadline::none())
            .load("wf")
            .unwrap_err();
        assert!(matches!(err, SolverError::StoreUnavailable(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn expired_deadline_times_out() {
        let store = seeded_store();
        let err = Loader::new(&store, fast_retry(), Deadline::from_millis(Some(0)))
            .load("wf")
            .unwrap_err();
        assert!(matches!(err, SolverError::Timeout { .. }));
    }

    /// Answers every read, but only after `delay`.
    struct SlowSource {
        inner: MetricsStore,
        delay: Duration,
    }

    impl MetricsSource for SlowSource {
        fn get_row(&self, table: Table, key: &str) -> StoreResult<Option<Value>> {
            std::thread::sleep(self.delay);
            self.inner.get_row(table, key)
        }

        fn scan_rows(&self, table: Table, prefix: &str) -> StoreResult<Vec<(String, Value)>> {
            std::thread::sleep(self.delay);
            self.inner.scan_rows(table, prefix)
        }
    }

    #[test]
    fn read_finishing_after_deadline_times_out() {
        let source = SlowSource {
            inner: seeded_store(),
            delay: Duration::from_millis(30),
        };
        let err = Loader::new(&source, fast_retry(), Deadline::after(Duration::from_millis(10)))
            .load("wf")
            .unwrap_err();
        match err {
            SolverError::Timeout { stage, elapsed } => {
                assert_eq!(stage, "reading datacenter_info");
                assert!(elapsed >= Duration::from_millis(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
