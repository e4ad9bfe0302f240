use std::path::Path;

use geoflow_core::RegionId;
use geoflow_solver::{RegionIndexer, SolverError};
use geoflow_store::{DatacenterRow, MetricsSource, Table};

use super::open_store;

/// Index the datacenter catalog the way a solve does.
pub fn catalog(source: &dyn MetricsSource) -> Result<RegionIndexer, SolverError> {
    let rows = source
        .scan_rows(Table::DatacenterInfo, "")
        .map_err(SolverError::StoreUnavailable)?;
    let ids = rows
        .into_iter()
        .map(|(key, row)| {
            serde_json::from_value::<DatacenterRow>(row)
                .map(|dc| RegionId::new(dc.provider, dc.region_code))
                .map_err(|e| SolverError::SchemaMismatch {
                    table: Table::DatacenterInfo.name().to_string(),
                    key,
                    reason: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RegionIndexer::new(ids))
}

pub fn regions(store_path: &Path) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let indexer = catalog(&store)?;
    for (index, region) in indexer.iter() {
        println!("{index}\t{region}");
    }
    Ok(())
}
