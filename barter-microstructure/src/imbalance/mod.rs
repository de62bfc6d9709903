//! Weighted queue imbalance (QI) near the touch and its time weighted mean.
//!
//! ```text
//! w_k   = 2^{-(k-1)/HL}
//! D_bid = Σ w_k · bid_size_k,  D_ask = Σ w_k · ask_size_k
//! QI    = D_bid - D_ask
//! IB    = (D_bid - D_ask) / (D_bid + D_ask)
//! ```
//!
//! The instantaneous QI is treated as piecewise-constant between book updates, and averaged
//! over a trailing window weighted by how long each value was held.

use crate::{
    error::{StatisticError, ensure_positive_window},
    snapshot::Snapshot,
    time::normalise_timestamp_ms,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub mod book;
pub mod segment;

pub use book::{BookLevels, WeightedDepth, exponential_weights, sizes_on_tick_grid};
pub use segment::{OpenSegment, Segment, SegmentSeries};

/// Default number of tick levels per side.
pub const DEFAULT_QI_K_LEVELS: usize = 10;

/// Default trailing window width in milliseconds.
pub const DEFAULT_QI_WINDOW_MS: i64 = 30_000;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct QueueImbalanceConfig {
    /// Number of tick levels per side, K.
    pub k_levels: usize,
    pub tick_size: Decimal,
    /// Half-life of the distance weights in ticks, HL.
    pub half_life_ticks: Decimal,
    /// Trailing window width in milliseconds.
    pub window_ms: i64,
}

impl Default for QueueImbalanceConfig {
    fn default() -> Self {
        Self {
            k_levels: DEFAULT_QI_K_LEVELS,
            tick_size: Decimal::new(1, 2),
            half_life_ticks: Decimal::new(5, 1),
            window_ms: DEFAULT_QI_WINDOW_MS,
        }
    }
}

impl QueueImbalanceConfig {
    pub fn validate(&self) -> Result<(), StatisticError> {
        if self.k_levels == 0 {
            return Err(StatisticError::InvalidLevels(self.k_levels));
        }
        if self.tick_size <= Decimal::ZERO {
            return Err(StatisticError::InvalidTickSize(self.tick_size));
        }
        if self.half_life_ticks <= Decimal::ZERO {
            return Err(StatisticError::InvalidHalfLife(self.half_life_ticks));
        }
        ensure_positive_window("queue_imbalance", self.window_ms)
    }
}

/// Streaming queue imbalance calculator.
///
/// Book timestamps that precede the last seen timestamp are clamped up to it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct QueueImbalanceEngine {
    config: QueueImbalanceConfig,
    weights: Vec<Decimal>,
    series: SegmentSeries,
    last_time_ms: Option<i64>,
}

impl QueueImbalanceEngine {
    pub fn new(config: QueueImbalanceConfig) -> Result<Self, StatisticError> {
        config.validate()?;
        let weights = exponential_weights(config.k_levels, config.half_life_ticks)?;

        Ok(Self {
            config,
            weights,
            series: SegmentSeries::default(),
            last_time_ms: None,
        })
    }

    /// Construct a [`QueueImbalanceEngine`] directly from a previously exported
    /// [`QueueImbalanceState`].
    pub fn from_state(state: QueueImbalanceState) -> Result<Self, StatisticError> {
        let mut engine = Self::new(state.config)?;
        engine.import_state(state)?;
        Ok(engine)
    }

    pub fn config(&self) -> &QueueImbalanceConfig {
        &self.config
    }

    /// Distance weights `w_1..=w_K`.
    pub fn weights(&self) -> &[Decimal] {
        &self.weights
    }

    pub fn last_time_ms(&self) -> Option<i64> {
        self.last_time_ms
    }

    /// Value of the open segment, ie/ the most recent defined QI, if any.
    pub fn current(&self) -> Option<Decimal> {
        self.series.open.map(|open| open.value)
    }

    pub fn series(&self) -> &SegmentSeries {
        &self.series
    }

    /// Update from an order book snapshot and return the instantaneous QI.
    ///
    /// QI is `None` if either best price is missing, or if the book has no depth on the tick
    /// grid.
    pub fn update_from_book<Bids, Asks>(
        &mut self,
        time: i64,
        best_bid: Option<Decimal>,
        best_ask: Option<Decimal>,
        bids: &Bids,
        asks: &Asks,
    ) -> Option<Decimal>
    where
        Bids: BookLevels + ?Sized,
        Asks: BookLevels + ?Sized,
    {
        let mut time_ms = normalise_timestamp_ms(time);
        if let Some(last_time_ms) = self.last_time_ms.filter(|last| time_ms < *last) {
            warn!(
                time_ms,
                last_time_ms,
                "QueueImbalance received out-of-order timestamp, clamping to last seen"
            );
            time_ms = last_time_ms;
        }
        self.last_time_ms = Some(time_ms);

        let value = best_bid
            .zip(best_ask)
            .and_then(|(best_bid, best_ask)| self.queue_difference(best_bid, best_ask, bids, asks));

        self.series.advance(time_ms, value);
        value
    }

    fn queue_difference<Bids, Asks>(
        &self,
        best_bid: Decimal,
        best_ask: Decimal,
        bids: &Bids,
        asks: &Asks,
    ) -> Option<Decimal>
    where
        Bids: BookLevels + ?Sized,
        Asks: BookLevels + ?Sized,
    {
        let (bid_sizes, ask_sizes) = sizes_on_tick_grid(
            best_bid,
            best_ask,
            self.config.tick_size,
            self.config.k_levels,
            bids,
            asks,
        )
        .ok()?;

        WeightedDepth::new(&bid_sizes, &ask_sizes, &self.weights)
            .ok()?
            .difference()
    }

    /// Time weighted mean QI over `[current_time - window_ms, current_time]`.
    ///
    /// Closed segments that end at or before the window start are pruned first. Returns `None` if
    /// QI was undefined for the whole window.
    pub fn time_weighted_mean(&mut self, current_time: i64) -> Option<Decimal> {
        let window_end_ms = normalise_timestamp_ms(current_time);
        let window_start_ms = window_end_ms.saturating_sub(self.config.window_ms);

        let pruned = self.series.prune(window_start_ms);
        if pruned > 0 {
            debug!(window_start_ms, pruned, "QueueImbalance pruned segments");
        }

        self.series
            .time_weighted_mean(window_start_ms, window_end_ms)
    }

    pub fn export_state(&self) -> QueueImbalanceState {
        QueueImbalanceState {
            config: self.config,
            series: self.series.clone(),
            last_time_ms: self.last_time_ms,
        }
    }

    /// Replace the configuration, segments and last seen time with the provided
    /// [`QueueImbalanceState`]. Weights are recomputed from the restored configuration.
    ///
    /// The engine is left untouched if the state is invalid.
    pub fn import_state(&mut self, state: QueueImbalanceState) -> Result<(), StatisticError> {
        let QueueImbalanceState {
            config,
            series,
            last_time_ms,
        } = state;

        config.validate()?;
        let weights = exponential_weights(config.k_levels, config.half_life_ticks)?;

        if let Some(segment) = series
            .closed
            .iter()
            .find(|segment| segment.end_ms <= segment.start_ms)
        {
            return Err(StatisticError::InvalidState(format!(
                "queue imbalance segment [{}, {}) has no duration",
                segment.start_ms, segment.end_ms
            )));
        }

        *self = Self {
            config,
            weights,
            series,
            last_time_ms,
        };
        Ok(())
    }
}

/// Serialisable snapshot of a [`QueueImbalanceEngine`].
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct QueueImbalanceState {
    pub config: QueueImbalanceConfig,
    pub series: SegmentSeries,
    pub last_time_ms: Option<i64>,
}

impl Snapshot for QueueImbalanceState {}
