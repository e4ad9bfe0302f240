//! redb table definitions for the geoflow metrics store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON rows).
//! Time-bucketed keys zero-pad the timestamp so key order is chronological.

use std::fmt;
use std::str::FromStr;

use redb::TableDefinition;

use crate::error::StoreError;

/// Datacenter profiles keyed by `{provider}:{region}`.
pub const DATACENTER_INFO: TableDefinition<&str, &[u8]> = TableDefinition::new("datacenter_info");

/// Grid carbon intensity keyed by `{provider}:{region}:{timestamp}`.
pub const GRID_CARBON: TableDefinition<&str, &[u8]> = TableDefinition::new("grid_carbon");

/// Region-pair latency keyed by `{provider}:{region}:{provider}:{region}:{timestamp}`.
pub const NETWORK_LATENCY: TableDefinition<&str, &[u8]> = TableDefinition::new("network_latency");

/// Region-pair transmission carbon keyed by `{provider}:{region}:{provider}:{region}`.
pub const TRANSMISSION_CARBON: TableDefinition<&str, &[u8]> =
    TableDefinition::new("transmission_carbon");

/// Workflow structure and placement constraints keyed by `{workflow_id}`.
pub const WORKFLOW_CONFIG: TableDefinition<&str, &[u8]> = TableDefinition::new("workflow_config");

/// Recorded execution and invocation summaries keyed by `{workflow_id}`.
pub const WORKFLOW_STATISTICS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("workflow_statistics");

/// Addressable tables of the metrics store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    DatacenterInfo,
    GridCarbon,
    NetworkLatency,
    TransmissionCarbon,
    WorkflowConfig,
    WorkflowStatistics,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::DatacenterInfo,
        Table::GridCarbon,
        Table::NetworkLatency,
        Table::TransmissionCarbon,
        Table::WorkflowConfig,
        Table::WorkflowStatistics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::DatacenterInfo => "datacenter_info",
            Table::GridCarbon => "grid_carbon",
            Table::NetworkLatency => "network_latency",
            Table::TransmissionCarbon => "transmission_carbon",
            Table::WorkflowConfig => "workflow_config",
            Table::WorkflowStatistics => "workflow_statistics",
        }
    }

    pub(crate) fn definition(self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            Table::DatacenterInfo => DATACENTER_INFO,
            Table::GridCarbon => GRID_CARBON,
            Table::NetworkLatency => NETWORK_LATENCY,
            Table::TransmissionCarbon => TRANSMISSION_CARBON,
            Table::WorkflowConfig => WORKFLOW_CONFIG,
            Table::WorkflowStatistics => WORKFLOW_STATISTICS,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| StoreError::UnknownTable(s.to_string()))
    }
}

/// Key for a region-scoped row.
pub fn region_key(provider: &str, region: &str) -> String {
    format!("{provider}:{region}")
}

/// Key for a time-bucketed region-scoped row.
pub fn region_time_key(provider: &str, region: &str, timestamp: u64) -> String {
    format!("{provider}:{region}:{timestamp:020}")
}

/// Key for a region-pair row.
pub fn pair_key(from: (&str, &str), to: (&str, &str)) -> String {
    format!("{}:{}:{}:{}", from.0, from.1, to.0, to.1)
}

/// Key for a time-bucketed region-pair row.
pub fn pair_time_key(from: (&str, &str), to: (&str, &str), timestamp: u64) -> String {
    format!("{}:{timestamp:020}", pair_key(from, to))
}
