#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    unused_import_braces,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Barter-Microstructure
//! Streaming market microstructure statistics for a single instrument, computed incrementally
//! over trailing time windows from normalised trades, L3 fills and order book snapshots.
//!
//! **It is:**
//! * **Incremental**: Every update is amortised O(1), with no re-scan of the window on ingest.
//! * **Exact**: All arithmetic uses [`Decimal`](rust_decimal::Decimal), so an exported state
//!   resumes with identical subsequent outputs.
//! * **Pure**: No I/O, no clocks. The host supplies events and timestamps in order.
//!
//! ## Overview
//! Three independent engines share the same time model (epoch timestamps of unknown unit,
//! normalised to milliseconds) and error type:
//! * [`AvciEngine`]: concentration of aggressive volume across takers (combined, buy & sell).
//! * [`QueueImbalanceEngine`]: distance weighted bid/ask queue imbalance near the touch, and
//!   its time weighted mean.
//! * [`MarkoutEngine`]: side-conditional post-trade mid price moves at a clock or event
//!   horizon, and their skew.
//!
//! Data-quality issues (out-of-order timestamps, inconsistent L2/L3 batches) are logged via
//! `tracing` and never fail an update. Degenerate statistics are `None`.
//!
//! ## Example
//! ```rust,no_run
//! use barter_microstructure::{
//!     MicrostructureConfig, MicrostructureEngines,
//!     model::{PublicFill, PublicL3Trade, Side},
//! };
//! use rust_decimal::Decimal;
//! use smol_str::SmolStr;
//!
//! let config = MicrostructureConfig::from_env();
//! let mut engines = MicrostructureEngines::new(&config).expect("valid configuration");
//!
//! let time = 1_700_000_000_000;
//! let fill = PublicFill::new(time, SmolStr::new("taker"), Some(Side::Buy), Decimal::TEN);
//! engines.avci.add_fill(&fill);
//!
//! let trades = [PublicL3Trade::new(time, Decimal::ONE_HUNDRED, Decimal::TEN, 1)];
//! engines.markout.add_coalesced_trades(time, &trades, Decimal::ONE_HUNDRED);
//! engines.markout.complete_horizons_clock(time + 1_000, Decimal::ONE_HUNDRED);
//!
//! println!("{:?}", engines.avci.metrics());
//! println!("{:?}", engines.markout.markout_skew(time + 1_000));
//! ```

/// Aggressive Volume Concentration Index.
pub mod avci;

/// [`MicrostructureConfig`] bundle, environment loading & [`MicrostructureEngines`].
pub mod config;

/// All [`Error`](std::error::Error)s generated in Barter-Microstructure.
pub mod error;

/// Weighted queue imbalance near the touch.
pub mod imbalance;

/// Markout skew at clock or event horizons.
pub mod markout;

/// Trade, fill & book data contracts, plus stateless helpers.
pub mod model;

/// JSON persistence of engine state.
pub mod snapshot;

/// Timestamp unit inference & normalisation.
pub mod time;

/// Generic trailing time window.
pub mod window;

pub use avci::{AvciConfig, AvciEngine, AvciMetrics, AvciState};
pub use config::{MicrostructureConfig, MicrostructureEngines, MicrostructureState};
pub use error::StatisticError;
pub use imbalance::{QueueImbalanceConfig, QueueImbalanceEngine, QueueImbalanceState};
pub use markout::{
    HorizonType, MarkoutConfig, MarkoutEngine, MarkoutObservation, MarkoutSkew, MarkoutState,
};
pub use snapshot::Snapshot;
pub use time::normalise_timestamp_ms;
pub use window::TimeWindow;
