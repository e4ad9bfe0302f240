//! Dense indexing of regions.
//!
//! Search and evaluation work on `usize` region indices so assignments are
//! plain vectors and per-region tables are flat arrays.

use std::collections::HashMap;

use geoflow_core::RegionId;

/// Bijection between cataloged regions and `0..len`, in region order.
#[derive(Debug, Clone, Default)]
pub struct RegionIndexer {
    regions: Vec<RegionId>,
    positions: HashMap<RegionId, usize>,
}

impl RegionIndexer {
    /// Index the given regions. Duplicates collapse; order is sorted.
    pub fn new(regions: impl IntoIterator<Item = RegionId>) -> Self {
        let mut regions: Vec<RegionId> = regions.into_iter().collect();
        regions.sort();
        regions.dedup();
        let positions = regions
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Self { regions, positions }
    }

    pub fn index(&self, id: &RegionId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// The region at `index`. Panics when out of range.
    pub fn region(&self, index: usize) -> &RegionId {
        &self.regions[index]
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &RegionId)> {
        self.regions.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_region_order() {
        let indexer = RegionIndexer::new([
            RegionId::new("gcp", "europe-west1"),
            RegionId::new("aws", "us-east-1"),
            RegionId::new("aws", "eu-north-1"),
            RegionId::new("aws", "us-east-1"),
        ]);
        assert_eq!(indexer.len(), 3);
        assert_eq!(indexer.region(0).to_string(), "aws:eu-north-1");
        assert_eq!(indexer.index(&RegionId::new("gcp", "europe-west1")), Some(2));
        assert_eq!(indexer.index(&RegionId::new("azure", "westeurope")), None);
    }

    #[test]
    fn round_trips_every_index() {
        let indexer = RegionIndexer::new((0..5).map(|i| RegionId::new("aws", format!("r{i}"))));
        for (i, id) in indexer.iter() {
            assert_eq!(indexer.index(id), Some(i));
        }
    }
}
