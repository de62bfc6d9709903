//! Aggressive Volume Concentration Index (AVCI).
//!
//! Measures how concentrated aggressive (taker) volume is within a trailing time window, ie/
//! whether a few large takers dominate or volume is spread across many small ones.
//!
//! ```text
//! AVCI   = Σ_p (v_p / V)² = Σ² / V²        ∈ [1/N, 1]
//! excess = N · AVCI - 1                    ∈ [0, N - 1]
//! ```
//!
//! Three independent [`ConcentrationBucket`]s are maintained over the same window: every fill
//! lands in the combined bucket, and buy or sell fills additionally land in their side bucket.

use crate::{
    error::{StatisticError, ensure_positive_window},
    model::{L3Fill, Side},
    snapshot::Snapshot,
    time::normalise_timestamp_ms,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub mod bucket;

pub use bucket::{BucketMetrics, BucketState, ConcentrationBucket, FillRecord};

/// Default AVCI window width in milliseconds.
pub const DEFAULT_AVCI_WINDOW_MS: i64 = 10_000;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct AvciConfig {
    /// Trailing window width in milliseconds.
    pub window_ms: i64,
}

impl Default for AvciConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_AVCI_WINDOW_MS,
        }
    }
}

impl AvciConfig {
    pub fn validate(&self) -> Result<(), StatisticError> {
        ensure_positive_window("avci", self.window_ms)
    }
}

/// Partition of the fill stream tracked by an [`AvciEngine`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Combined,
    Buy,
    Sell,
}

impl From<Side> for Partition {
    fn from(value: Side) -> Self {
        match value {
            Side::Buy => Partition::Buy,
            Side::Sell => Partition::Sell,
        }
    }
}

/// [`BucketMetrics`] for every [`Partition`].
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct AvciMetrics {
    pub combined: BucketMetrics,
    pub buy: BucketMetrics,
    pub sell: BucketMetrics,
}

/// Streaming AVCI calculator with combined, buy-only and sell-only variants.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AvciEngine {
    config: AvciConfig,
    combined: ConcentrationBucket,
    buy: ConcentrationBucket,
    sell: ConcentrationBucket,
}

impl AvciEngine {
    pub fn new(config: AvciConfig) -> Result<Self, StatisticError> {
        config.validate()?;
        Ok(Self {
            config,
            combined: ConcentrationBucket::default(),
            buy: ConcentrationBucket::default(),
            sell: ConcentrationBucket::default(),
        })
    }

    /// Construct an [`AvciEngine`] directly from a previously exported [`AvciState`].
    pub fn from_state(state: AvciState) -> Result<Self, StatisticError> {
        let mut engine = Self::new(state.config)?;
        engine.import_state(state)?;
        Ok(engine)
    }

    pub fn config(&self) -> &AvciConfig {
        &self.config
    }

    /// Add an L3 fill.
    ///
    /// Fills with an unknown side only contribute to the combined bucket. Fills must arrive in
    /// non-decreasing time order for eviction to stay correct.
    pub fn add_fill<Fill>(&mut self, fill: &Fill)
    where
        Fill: L3Fill,
    {
        let time_ms = normalise_timestamp_ms(fill.time());
        let quantity = fill.quantity();

        if quantity < Decimal::ZERO {
            warn!(
                time_ms,
                participant = %fill.participant_id(),
                %quantity,
                "AVCI skipping fill with negative quantity"
            );
            return;
        }

        // Side volumes never exceed combined ones, so a fill the combined bucket accepts fits
        // its side bucket too
        let participant = fill.participant_id();
        if !self.combined.insert(time_ms, participant.clone(), quantity) {
            return;
        }

        match fill.side() {
            Some(Side::Buy) => {
                self.buy.insert(time_ms, participant.clone(), quantity);
            }
            Some(Side::Sell) => {
                self.sell.insert(time_ms, participant.clone(), quantity);
            }
            None => debug!(
                time_ms,
                participant = %participant,
                "AVCI fill has unknown side, added to combined bucket only"
            ),
        }
    }

    /// Evict every fill older than `now - window_ms` from all buckets.
    pub fn evict_to(&mut self, now: i64) {
        let cutoff_ms = normalise_timestamp_ms(now).saturating_sub(self.config.window_ms);

        let evicted = self.combined.evict_before(cutoff_ms);
        self.buy.evict_before(cutoff_ms);
        self.sell.evict_before(cutoff_ms);

        if evicted > 0 {
            debug!(cutoff_ms, evicted, "AVCI evicted fills");
        }
    }

    pub fn metrics(&self) -> AvciMetrics {
        AvciMetrics {
            combined: self.combined.metrics(),
            buy: self.buy.metrics(),
            sell: self.sell.metrics(),
        }
    }

    pub fn bucket(&self, partition: Partition) -> &ConcentrationBucket {
        match partition {
            Partition::Combined => &self.combined,
            Partition::Buy => &self.buy,
            Partition::Sell => &self.sell,
        }
    }

    pub fn export_state(&self) -> AvciState {
        AvciState {
            config: self.config,
            combined: self.combined.export_state(),
            buy: self.buy.export_state(),
            sell: self.sell.export_state(),
        }
    }

    /// Replace the engine configuration and every bucket with the provided [`AvciState`].
    ///
    /// The engine is left untouched if the state is invalid.
    pub fn import_state(&mut self, state: AvciState) -> Result<(), StatisticError> {
        let AvciState {
            config,
            combined,
            buy,
            sell,
        } = state;

        config.validate()?;
        let combined = ConcentrationBucket::from_state(combined)?;
        let buy = ConcentrationBucket::from_state(buy)?;
        let sell = ConcentrationBucket::from_state(sell)?;

        *self = Self {
            config,
            combined,
            buy,
            sell,
        };
        Ok(())
    }
}

/// Serialisable snapshot of an [`AvciEngine`].
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct AvciState {
    pub config: AvciConfig,
    pub combined: BucketState,
    pub buy: BucketState,
    pub sell: BucketState,
}

impl Snapshot for AvciState {}
