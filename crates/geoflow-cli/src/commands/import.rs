use std::path::Path;

use anyhow::Context;
use serde_json::Value;
use tracing::info;

use geoflow_solver::SolverError;

use super::open_store;

pub fn import(store_path: &Path, fixture_path: &Path) -> anyhow::Result<usize> {
    let text = std::fs::read_to_string(fixture_path)
        .with_context(|| format!("reading fixture {}", fixture_path.display()))?;
    let fixture: Value = serde_json::from_str(&text).map_err(|e| {
        SolverError::Config(format!("fixture {} is not JSON: {e}", fixture_path.display()))
    })?;

    let store = open_store(store_path)?;
    let rows = store.import_fixture(&fixture).map_err(|e| {
        if e.is_transient() {
            SolverError::StoreUnavailable(e)
        } else {
            SolverError::Config(format!("fixture {}: {e}", fixture_path.display()))
        }
    })?;
    info!(rows, store = %store_path.display(), "fixture imported");
    println!("imported {rows} rows into {}", store_path.display());
    Ok(rows)
}
