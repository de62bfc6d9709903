//! Generic trailing time window.

use crate::{
    error::{StatisticError, ensure_positive_window},
    time::normalise_timestamp_ms,
};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Timestamped payload resident in a [`TimeWindow`].
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Constructor)]
pub struct WindowEntry<T> {
    pub time_ms: i64,
    pub payload: T,
}

/// Time-based sliding window of `(time_ms, payload)` entries in arrival order.
///
/// Entries are assumed to arrive with non-decreasing timestamps. Eviction removes every entry
/// with `time_ms < boundary - window_duration_ms`, where the boundary is either the latest
/// inserted timestamp ([`TimeWindow::add`], [`TimeWindow::window_data`]) or a caller supplied
/// window end ([`TimeWindow::purge`]).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TimeWindow<T> {
    window_duration_ms: i64,
    entries: VecDeque<WindowEntry<T>>,
}

impl<T> TimeWindow<T> {
    /// Construct a new empty [`TimeWindow`]. Fails if `window_duration_ms` is not positive.
    pub fn new(window_duration_ms: i64) -> Result<Self, StatisticError> {
        ensure_positive_window("time_window", window_duration_ms)?;
        Ok(Self {
            window_duration_ms,
            entries: VecDeque::new(),
        })
    }

    pub fn window_duration_ms(&self) -> i64 {
        self.window_duration_ms
    }

    /// Append a payload, normalising `time` to milliseconds, then evict relative to it.
    pub fn add(&mut self, time: i64, payload: T) {
        let time_ms = normalise_timestamp_ms(time);
        self.entries.push_back(WindowEntry::new(time_ms, payload));
        self.evict(time_ms);
    }

    /// Evict relative to the latest resident entry, then return every remaining entry in
    /// arrival order.
    pub fn window_data(&mut self) -> impl ExactSizeIterator<Item = &WindowEntry<T>> {
        if let Some(latest_ms) = self.entries.back().map(|entry| entry.time_ms) {
            self.evict(latest_ms);
        }
        self.entries.iter()
    }

    /// Evict relative to an explicit window end, independent of what has been inserted.
    pub fn purge(&mut self, window_end: i64) {
        self.evict(normalise_timestamp_ms(window_end));
    }

    /// Most recently added payload, if any.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back().map(|entry| &entry.payload)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resident entries in arrival order, without evicting.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &WindowEntry<T>> {
        self.entries.iter()
    }

    fn evict(&mut self, boundary_ms: i64) {
        let cutoff_ms = boundary_ms.saturating_sub(self.window_duration_ms);
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.time_ms < cutoff_ms)
        {
            self.entries.pop_front();
        }
    }
}
