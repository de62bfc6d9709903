use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// All errors generated in `barter-microstructure`.
///
/// Degenerate statistics (no volume, no depth, no completed observations) are never errors,
/// they surface as `None` results from the relevant query.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Error)]
pub enum StatisticError {
    #[error("invalid window width for {name}: {value}ms must be positive")]
    InvalidWindow { name: &'static str, value: i64 },

    #[error("invalid number of book levels: {0} must be positive")]
    InvalidLevels(usize),

    #[error("invalid tick size: {0} must be positive")]
    InvalidTickSize(Decimal),

    #[error("invalid half-life: {0} ticks must be positive")]
    InvalidHalfLife(Decimal),

    #[error("{horizon} horizon requires the {parameter} parameter")]
    MissingHorizonParameter {
        horizon: &'static str,
        parameter: &'static str,
    },

    #[error("invalid horizon parameter {parameter}: {value} must be positive")]
    InvalidHorizonParameter { parameter: &'static str, value: i64 },

    #[error(
        "\
        LengthMismatch: bid sizes ({bids}), ask sizes ({asks}) and weights ({weights}) \
        must have equal length\
    "
    )]
    LengthMismatch {
        bids: usize,
        asks: usize,
        weights: usize,
    },

    #[error("invalid state snapshot: {0}")]
    InvalidState(String),

    #[error("SerDe error: {0}")]
    Serde(String),
}

impl StatisticError {
    /// Determine if an error is a configuration error, ie/ the engine could not be constructed
    /// from the provided parameters.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_config(&self) -> bool {
        match self {
            StatisticError::InvalidWindow { .. }
            | StatisticError::InvalidLevels(_)
            | StatisticError::InvalidTickSize(_)
            | StatisticError::InvalidHalfLife(_)
            | StatisticError::MissingHorizonParameter { .. }
            | StatisticError::InvalidHorizonParameter { .. } => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StatisticError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value.to_string())
    }
}

/// Validate that a window width in milliseconds is strictly positive.
pub(crate) fn ensure_positive_window(name: &'static str, value: i64) -> Result<(), StatisticError> {
    if value <= 0 {
        Err(StatisticError::InvalidWindow { name, value })
    } else {
        Ok(())
    }
}
