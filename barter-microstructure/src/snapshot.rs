use crate::error::StatisticError;
use serde::{Serialize, de::DeserializeOwned};

/// Serialisable engine state that can be exported, persisted by the host and imported to resume
/// with identical subsequent outputs.
///
/// Decimals are encoded as strings, so a JSON round-trip is lossless.
pub trait Snapshot: Serialize + DeserializeOwned {
    fn to_json(&self) -> Result<String, StatisticError> {
        serde_json::to_string(self).map_err(StatisticError::from)
    }

    fn from_json(input: &str) -> Result<Self, StatisticError> {
        serde_json::from_str(input).map_err(StatisticError::from)
    }
}
