use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Closed interval `[start_ms, end_ms)` over which a value was constant.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Constructor)]
pub struct Segment {
    pub start_ms: i64,
    pub end_ms: i64,
    pub value: Decimal,
}

/// Segment that started at `start_ms` and is still current.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Constructor)]
pub struct OpenSegment {
    pub start_ms: i64,
    pub value: Decimal,
}

/// Piecewise-constant time series of an optionally defined value.
///
/// Each change of value closes the open segment and opens a new one. Periods where the value is
/// undefined are not covered by any segment, and so do not contribute to the time weighted mean.
#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct SegmentSeries {
    pub closed: VecDeque<Segment>,
    pub open: Option<OpenSegment>,
}

impl SegmentSeries {
    /// Record that the series takes `value` from `time_ms` onwards.
    ///
    /// `time_ms` must not precede the start of the open segment. Zero length segments are
    /// discarded rather than closed.
    pub fn advance(&mut self, time_ms: i64, value: Option<Decimal>) {
        if self.open.map(|open| open.value) == value {
            return;
        }

        if let Some(open) = self.open.take().filter(|open| time_ms > open.start_ms) {
            self.closed
                .push_back(Segment::new(open.start_ms, time_ms, open.value));
        }

        self.open = value.map(|value| OpenSegment::new(time_ms, value));
    }

    /// Drop closed segments that end at or before `window_start_ms`.
    pub fn prune(&mut self, window_start_ms: i64) -> usize {
        let before = self.closed.len();
        while self
            .closed
            .front()
            .is_some_and(|segment| segment.end_ms <= window_start_ms)
        {
            self.closed.pop_front();
        }
        before - self.closed.len()
    }

    /// Time weighted mean over `[window_start_ms, window_end_ms]`, with the open segment
    /// extended to `window_end_ms`.
    ///
    /// Returns `None` if no segment overlaps the window.
    pub fn time_weighted_mean(&self, window_start_ms: i64, window_end_ms: i64) -> Option<Decimal> {
        let open = self
            .open
            .map(|open| Segment::new(open.start_ms, window_end_ms, open.value));

        let (weighted_sum, covered_ms) = self
            .closed
            .iter()
            .copied()
            .chain(open)
            .filter_map(|segment| {
                let start_ms = segment.start_ms.max(window_start_ms);
                let end_ms = segment.end_ms.min(window_end_ms);
                (end_ms > start_ms).then(|| {
                    let duration = Decimal::from(end_ms - start_ms);
                    (segment.value * duration, duration)
                })
            })
            .fold(
                (Decimal::ZERO, Decimal::ZERO),
                |(weighted_sum, covered_ms), (value, duration)| {
                    (weighted_sum + value, covered_ms + duration)
                },
            );

        if covered_ms.is_zero() {
            None
        } else {
            weighted_sum.checked_div(covered_ms)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.closed.is_empty() && self.open.is_none()
    }
}
