use std::io::Read;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use tracing::info;

use geoflow_core::{GeoflowConfig, SolveRequest};
use geoflow_solver::{Solver, SolverError};

use super::open_store;

/// Exit code when the deadline cut the search short.
const PARTIAL_EXIT: u8 = 4;

pub fn read_request(source: &str) -> anyhow::Result<SolveRequest> {
    let text = if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading request from stdin")?;
        text
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading request {source}"))?
    };
    let request = serde_json::from_str(&text)
        .map_err(|e| SolverError::Config(format!("invalid solve request: {e}")))?;
    Ok(request)
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<GeoflowConfig> {
    match path {
        Some(path) => GeoflowConfig::from_file(path)
            .map_err(|e| SolverError::Config(format!("{}: {e:#}", path.display())).into()),
        None => Ok(GeoflowConfig::default()),
    }
}

pub fn solve(store_path: &Path, request: &str, config: Option<&Path>) -> anyhow::Result<ExitCode> {
    let config = load_config(config)?;
    let request = read_request(request)?;
    let store = open_store(store_path)?;

    info!(workflow = %request.workflow_id, store = %store_path.display(), "solving");
    let response = Solver::new(config).solve(&store, &request)?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if response.partial {
        return Ok(ExitCode::from(PARTIAL_EXIT));
    }
    Ok(ExitCode::SUCCESS)
}
