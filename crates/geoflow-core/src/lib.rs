pub mod config;
pub mod region;
pub mod types;

pub use config::GeoflowConfig;
pub use region::{RegionId, RegionParseError};
pub use types::*;
