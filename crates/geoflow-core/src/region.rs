//! Region identifiers: `provider:region_code`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A cloud region, identified by provider and region code.
///
/// Ordering is lexicographic by provider, then region code. The region
/// indexer relies on this to assign dense indices deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionId {
    pub provider: String,
    pub region: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum RegionParseError {
    #[error("region must be written as provider:region, got {0:?}")]
    MissingSeparator(String),
    #[error("empty provider or region in {0:?}")]
    Empty(String),
}

impl RegionId {
    pub fn new(provider: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            region: region.into(),
        }
    }

    /// Parse `provider:region`. Region codes may not contain `:`.
    pub fn parse(text: &str) -> Result<Self, RegionParseError> {
        let (provider, region) = text
            .split_once(':')
            .ok_or_else(|| RegionParseError::MissingSeparator(text.to_string()))?;
        let (provider, region) = (provider.trim(), region.trim());
        if provider.is_empty() || region.is_empty() || region.contains(':') {
            return Err(RegionParseError::Empty(text.to_string()));
        }
        Ok(Self::new(provider, region))
    }

    pub fn same_provider(&self, other: &RegionId) -> bool {
        self.provider == other.provider
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.region)
    }
}

impl FromStr for RegionId {
    type Err = RegionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RegionId {
    type Error = RegionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RegionId> for String {
    fn from(value: RegionId) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region() {
        let id = RegionId::parse("aws:us-east-1").unwrap();
        assert_eq!(id.provider, "aws");
        assert_eq!(id.region, "us-east-1");
        assert_eq!(id.to_string(), "aws:us-east-1");
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        assert!(matches!(
            RegionId::parse("us-east-1"),
            Err(RegionParseError::MissingSeparator(_))
        ));
        assert!(matches!(RegionId::parse("aws:"), Err(RegionParseError::Empty(_))));
        assert!(matches!(RegionId::parse("aws:a:b"), Err(RegionParseError::Empty(_))));
    }

    #[test]
    fn test_ordering_is_provider_then_region() {
        let mut ids = vec![
            RegionId::new("gcp", "europe-west1"),
            RegionId::new("aws", "us-west-2"),
            RegionId::new("aws", "ca-central-1"),
        ];
        ids.sort();
        let names: Vec<String> = ids.iter().map(|r| r.to_string()).collect();
        assert_eq!(names, ["aws:ca-central-1", "aws:us-west-2", "gcp:europe-west1"]);
    }

    #[test]
    fn test_serde_as_string() {
        let id = RegionId::new("aws", "eu-north-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"aws:eu-north-1\"");
        let back: RegionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
