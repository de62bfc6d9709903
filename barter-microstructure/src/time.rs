//! Timestamp unit inference.
//!
//! Upstream feeds deliver epoch timestamps in seconds, milliseconds, microseconds or
//! nanoseconds without saying which. Every engine in this crate normalises to milliseconds
//! first, inferring the unit from the decimal digit count.

use tracing::warn;

/// Unit of an epoch timestamp, inferred from its decimal digit count.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum TimestampUnit {
    /// Up to 10 digits.
    Seconds,
    /// Up to 13 digits.
    Milliseconds,
    /// Up to 16 digits.
    Microseconds,
    /// Up to 19 digits.
    Nanoseconds,
    /// More than 19 digits, treated as milliseconds.
    Unknown,
}

impl TimestampUnit {
    /// Infer the [`TimestampUnit`] of the provided epoch timestamp.
    pub fn infer(ts: i128) -> Self {
        match decimal_digits(ts.unsigned_abs()) {
            0..=10 => TimestampUnit::Seconds,
            11..=13 => TimestampUnit::Milliseconds,
            14..=16 => TimestampUnit::Microseconds,
            17..=19 => TimestampUnit::Nanoseconds,
            _ => TimestampUnit::Unknown,
        }
    }
}

fn decimal_digits(value: u128) -> u32 {
    value.checked_ilog10().map_or(1, |log| log + 1)
}

/// Normalise an epoch timestamp of unknown unit to milliseconds.
///
/// Every `i64` has at most 19 digits, so this never hits the fallback branch of
/// [`normalise_timestamp_ms_wide`].
pub fn normalise_timestamp_ms(ts: i64) -> i64 {
    match TimestampUnit::infer(i128::from(ts)) {
        TimestampUnit::Seconds => ts.saturating_mul(1_000),
        TimestampUnit::Milliseconds | TimestampUnit::Unknown => ts,
        TimestampUnit::Microseconds => ts / 1_000,
        TimestampUnit::Nanoseconds => ts / 1_000_000,
    }
}

/// Normalise an epoch timestamp of unknown unit to milliseconds, accepting values wider than
/// nanosecond precision.
///
/// Values longer than 19 digits are assumed to already be milliseconds, and a warning is logged.
pub fn normalise_timestamp_ms_wide(ts: i128) -> i128 {
    match TimestampUnit::infer(ts) {
        TimestampUnit::Seconds => ts.saturating_mul(1_000),
        TimestampUnit::Milliseconds => ts,
        TimestampUnit::Microseconds => ts / 1_000,
        TimestampUnit::Nanoseconds => ts / 1_000_000,
        TimestampUnit::Unknown => {
            warn!(
                timestamp = %ts,
                digits = decimal_digits(ts.unsigned_abs()),
                "timestamp has an unexpected number of digits, assuming milliseconds"
            );
            ts
        }
    }
}
