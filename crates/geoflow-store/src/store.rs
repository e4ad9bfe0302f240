//! MetricsStore: redb-backed row store for placement metrics.
//!
//! Rows are addressed by table name and primary key. Values are JSON
//! documents; the store does not interpret them beyond deriving keys on
//! import. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::tables::Table;
use crate::types::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Read access to metrics rows. The solver's loader consumes this.
///
/// Calls are blocking and cannot be interrupted: the loader checks its
/// deadline before and after each call, so a source that never returns
/// blocks the solve. Sources that reach over a network must bound their
/// own I/O time and return a transient error when it runs out.
pub trait MetricsSource {
    /// Get one row by primary key.
    fn get_row(&self, table: Table, key: &str) -> StoreResult<Option<Value>>;

    /// All rows whose key starts with `prefix`, in key order.
    fn scan_rows(&self, table: Table, prefix: &str) -> StoreResult<Vec<(String, Value)>>;
}

/// Thread-safe metrics store backed by redb.
#[derive(Clone)]
pub struct MetricsStore {
    db: Arc<Database>,
}

impl MetricsStore {
    /// Open (or create) a persistent metrics store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "metrics store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory metrics store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory metrics store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in Table::ALL {
            txn.open_table(table.definition()).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or replace a row.
    pub fn put_row(&self, table: Table, key: &str, row: &Value) -> StoreResult<()> {
        let value = serde_json::to_vec(row).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut handle = txn.open_table(table.definition()).map_err(map_err!(Table))?;
            handle
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%table, %key, "row stored");
        Ok(())
    }

    /// Delete a row by key. Returns true if it existed.
    pub fn delete_row(&self, table: Table, key: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut handle = txn.open_table(table.definition()).map_err(map_err!(Table))?;
            existed = handle.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%table, %key, existed, "row deleted");
        Ok(existed)
    }

    /// Insert rows, deriving each key from the row's own fields.
    ///
    /// All rows are validated before anything is written.
    pub fn import_rows(&self, table: Table, rows: &[Value]) -> StoreResult<usize> {
        let keyed: Vec<(String, Vec<u8>)> = rows
            .iter()
            .map(|row| {
                let key = row_key(table, row)?;
                let bytes = serde_json::to_vec(row).map_err(map_err!(Serialize))?;
                Ok((key, bytes))
            })
            .collect::<StoreResult<_>>()?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut handle = txn.open_table(table.definition()).map_err(map_err!(Table))?;
            for (key, bytes) in &keyed {
                handle
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%table, rows = keyed.len(), "rows imported");
        Ok(keyed.len())
    }

    /// Import a fixture document: `{ "<table name>": [row, ...], ... }`.
    ///
    /// Returns the number of rows written.
    pub fn import_fixture(&self, fixture: &Value) -> StoreResult<usize> {
        let object = fixture
            .as_object()
            .ok_or_else(|| StoreError::Deserialize("fixture must be a JSON object".to_string()))?;
        let mut total = 0;
        for (name, rows) in object {
            let table: Table = name.parse()?;
            let rows = rows.as_array().ok_or_else(|| {
                StoreError::Deserialize(format!("fixture table {name} must be an array"))
            })?;
            total += self.import_rows(table, rows)?;
        }
        Ok(total)
    }
}

impl MetricsSource for MetricsStore {
    fn get_row(&self, table: Table, key: &str) -> StoreResult<Option<Value>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let handle = txn.open_table(table.definition()).map_err(map_err!(Table))?;
        match handle.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let row: Value =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn scan_rows(&self, table: Table, prefix: &str) -> StoreResult<Vec<(String, Value)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let handle = txn.open_table(table.definition()).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in handle.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let row: Value =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push((key.value().to_string(), row));
            }
        }
        Ok(results)
    }
}

/// Derive the primary key of a row for the given table.
pub fn row_key(table: Table, row: &Value) -> StoreResult<String> {
    Ok(match table {
        Table::DatacenterInfo => parse_row::<DatacenterRow>(table, row)?.table_key(),
        Table::GridCarbon => parse_row::<GridCarbonRow>(table, row)?.table_key(),
        Table::NetworkLatency => parse_row::<NetworkLatencyRow>(table, row)?.table_key(),
        Table::TransmissionCarbon => parse_row::<TransmissionCarbonRow>(table, row)?.table_key(),
        Table::WorkflowConfig => parse_row::<WorkflowConfigRow>(table, row)?.table_key(),
        Table::WorkflowStatistics => parse_row::<WorkflowStatisticsRow>(table, row)?.table_key(),
    })
}

fn parse_row<T: DeserializeOwned>(table: Table, row: &Value) -> StoreResult<T> {
    serde_json::from_value(row.clone())
        .map_err(|e| StoreError::Deserialize(format!("{table}: {e}")))
}
