//! Markout skew: the information content of aggressive flow.
//!
//! Each side of a batch of coalesced trades creates one [`MarkoutObservation`]. When its horizon
//! is reached the observation is completed with `markout = m(u) - m(t⁻)` and filed into a
//! per-side window keyed by completion time. The skew is the difference of the side-conditional
//! means:
//!
//! ```text
//! skew = mean(buy markouts) - mean(sell markouts)
//! ```

use crate::{
    error::{StatisticError, ensure_positive_window},
    model::{L3Trade, MidPrice, Side},
    snapshot::Snapshot,
    time::normalise_timestamp_ms,
    window::{TimeWindow, WindowEntry},
};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub mod horizon;

pub use horizon::{ClockHorizon, EventHorizon, EventTarget, Horizon, HorizonSchedule};

/// Default completion-time window width in milliseconds.
pub const DEFAULT_MARKOUT_WINDOW_MS: i64 = 300_000;

/// Default clock-time horizon in milliseconds.
pub const DEFAULT_MARKOUT_TAU_MS: i64 = 1_000;

/// How the horizon of a [`MarkoutObservation`] is measured.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum HorizonType {
    /// Fixed time offset `tau_ms` after the trade.
    #[display("clock")]
    Clock,
    /// Fixed number of subsequent trades `k_trades`.
    #[display("event")]
    Event,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct MarkoutConfig {
    pub horizon_type: HorizonType,
    /// Required for [`HorizonType::Clock`].
    pub tau_ms: Option<i64>,
    /// Required for [`HorizonType::Event`].
    pub k_trades: Option<u64>,
    /// Completion-time window width in milliseconds.
    pub window_ms: i64,
}

impl Default for MarkoutConfig {
    fn default() -> Self {
        Self::clock(DEFAULT_MARKOUT_TAU_MS)
    }
}

impl MarkoutConfig {
    /// Clock-time horizon config with the default window.
    pub fn clock(tau_ms: i64) -> Self {
        Self {
            horizon_type: HorizonType::Clock,
            tau_ms: Some(tau_ms),
            k_trades: None,
            window_ms: DEFAULT_MARKOUT_WINDOW_MS,
        }
    }

    /// Event-time horizon config with the default window.
    pub fn event(k_trades: u64) -> Self {
        Self {
            horizon_type: HorizonType::Event,
            tau_ms: None,
            k_trades: Some(k_trades),
            window_ms: DEFAULT_MARKOUT_WINDOW_MS,
        }
    }

    pub fn with_window_ms(self, window_ms: i64) -> Self {
        Self { window_ms, ..self }
    }

    pub fn validate(&self) -> Result<(), StatisticError> {
        self.horizon().map(|_| ())
    }

    /// Build the [`Horizon`] strategy this configuration selects.
    pub fn horizon(&self) -> Result<Horizon, StatisticError> {
        ensure_positive_window("markout", self.window_ms)?;

        match self.horizon_type {
            HorizonType::Clock => {
                let tau_ms = self
                    .tau_ms
                    .ok_or(StatisticError::MissingHorizonParameter {
                        horizon: "clock",
                        parameter: "tau_ms",
                    })?;
                if tau_ms <= 0 {
                    return Err(StatisticError::InvalidHorizonParameter {
                        parameter: "tau_ms",
                        value: tau_ms,
                    });
                }
                Ok(Horizon::Clock(ClockHorizon::new(tau_ms)))
            }
            HorizonType::Event => {
                let k_trades = self
                    .k_trades
                    .ok_or(StatisticError::MissingHorizonParameter {
                        horizon: "event",
                        parameter: "k_trades",
                    })?;
                if k_trades == 0 {
                    return Err(StatisticError::InvalidHorizonParameter {
                        parameter: "k_trades",
                        value: 0,
                    });
                }
                Ok(Horizon::Event(EventHorizon::new(k_trades)))
            }
        }
    }
}

/// One side of a batch of coalesced trades, awaiting or having reached its horizon.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct MarkoutObservation {
    pub start_time_ms: i64,
    /// Unset until scheduled (clock) or completed (event).
    pub horizon_time_ms: Option<i64>,
    pub side: Side,
    /// Mid price just before the trades, m(t⁻).
    pub pre_trade_mid: Decimal,
    /// m(u) - m(t⁻), set on completion.
    pub markout: Option<Decimal>,
}

impl MarkoutObservation {
    /// Construct a new observation with no horizon and no markout.
    pub fn pending(start_time_ms: i64, side: Side, pre_trade_mid: Decimal) -> Self {
        Self {
            start_time_ms,
            horizon_time_ms: None,
            side,
            pre_trade_mid,
            markout: None,
        }
    }

    /// Complete this observation at `horizon_time_ms` against the prevailing `mid`.
    pub fn complete(self, horizon_time_ms: i64, mid: Decimal) -> Self {
        Self {
            horizon_time_ms: Some(horizon_time_ms),
            markout: Some(mid - self.pre_trade_mid),
            ..self
        }
    }

    pub fn is_complete(&self) -> bool {
        self.markout.is_some()
    }
}

/// Side-conditional markout means over the completion-time window.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct MarkoutSkew {
    /// Mean buy markout, `None` if no buy completed in the window.
    pub mplus: Option<Decimal>,
    /// Mean sell markout, `None` if no sell completed in the window.
    pub mminus: Option<Decimal>,
    /// `mplus - mminus`, `None` unless both are defined.
    pub skew: Option<Decimal>,
    pub n_buys: usize,
    pub n_sells: usize,
}

/// Streaming markout skew calculator.
///
/// Input is expected in non-decreasing time order. Out-of-order batches are logged and then
/// processed as given.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MarkoutEngine {
    config: MarkoutConfig,
    horizon: Horizon,
    buy_window: TimeWindow<MarkoutObservation>,
    sell_window: TimeWindow<MarkoutObservation>,
    last_input_time_ms: Option<i64>,
}

impl MarkoutEngine {
    pub fn new(config: MarkoutConfig) -> Result<Self, StatisticError> {
        let horizon = config.horizon()?;

        Ok(Self {
            config,
            horizon,
            buy_window: TimeWindow::new(config.window_ms)?,
            sell_window: TimeWindow::new(config.window_ms)?,
            last_input_time_ms: None,
        })
    }

    /// Construct a [`MarkoutEngine`] directly from a previously exported [`MarkoutState`].
    pub fn from_state(state: MarkoutState) -> Result<Self, StatisticError> {
        let mut engine = Self::new(state.config)?;
        engine.import_state(state)?;
        Ok(engine)
    }

    pub fn config(&self) -> &MarkoutConfig {
        &self.config
    }

    pub fn horizon(&self) -> &Horizon {
        &self.horizon
    }

    /// Number of observations still awaiting their horizon.
    pub fn pending_len(&self) -> usize {
        self.horizon.pending_len()
    }

    /// Trades processed so far in event mode, zero in clock mode.
    pub fn trade_counter(&self) -> u64 {
        match &self.horizon {
            Horizon::Clock(_) => 0,
            Horizon::Event(event) => event.trade_counter(),
        }
    }

    /// Add a batch of trades sharing timestamp `time`, along with the mid price just before
    /// them.
    ///
    /// Creates up to two observations (buy first, then sell) that share the batch start time
    /// and pre-trade mid. Trades with an unknown aggressor sign create no observation, but still
    /// advance the event-time trade counter. Empty batches are ignored.
    pub fn add_coalesced_trades<Trade, Mid>(
        &mut self,
        time: i64,
        trades: &[Trade],
        pre_trade_mid: Mid,
    ) -> Vec<MarkoutObservation>
    where
        Trade: L3Trade,
        Mid: MidPrice,
    {
        if trades.is_empty() {
            return Vec::new();
        }

        let time_ms = normalise_timestamp_ms(time);
        if let Some(last_time_ms) = self.last_input_time_ms.filter(|last| time_ms < *last) {
            warn!(
                time_ms,
                last_time_ms,
                "MarkoutSkew received out-of-order timestamp"
            );
        }
        self.last_input_time_ms = Some(time_ms);

        let pre_trade_mid = pre_trade_mid.mid_price();
        let created = [Side::Buy, Side::Sell]
            .into_iter()
            .filter(|side| {
                trades
                    .iter()
                    .any(|trade| trade.aggressor_sign() == side.sign())
            })
            .map(|side| {
                self.horizon
                    .schedule(MarkoutObservation::pending(time_ms, side, pre_trade_mid))
            })
            .collect::<Vec<_>>();

        self.horizon.record_trades(trades.len() as u64);

        debug!(
            time_ms,
            %pre_trade_mid,
            trades = trades.len(),
            observations = created.len(),
            "MarkoutSkew created observations"
        );

        created
    }

    /// Complete clock-time observations with `horizon ≤ now` against `mid`, filing each at its
    /// horizon time. No-op in event mode.
    pub fn complete_horizons_clock<Mid>(&mut self, now: i64, mid: Mid) -> Vec<MarkoutObservation>
    where
        Mid: MidPrice,
    {
        if !matches!(self.horizon, Horizon::Clock(_)) {
            return Vec::new();
        }
        self.complete_horizons(now, mid)
    }

    /// Complete event-time observations whose trade target has been reached against `mid`,
    /// filing each at `now`. No-op in clock mode.
    pub fn complete_horizons_event<Mid>(&mut self, now: i64, mid: Mid) -> Vec<MarkoutObservation>
    where
        Mid: MidPrice,
    {
        if !matches!(self.horizon, Horizon::Event(_)) {
            return Vec::new();
        }
        self.complete_horizons(now, mid)
    }

    fn complete_horizons<Mid>(&mut self, now: i64, mid: Mid) -> Vec<MarkoutObservation>
    where
        Mid: MidPrice,
    {
        let now_ms = normalise_timestamp_ms(now);
        let completed = self.horizon.complete(now_ms, mid.mid_price());

        for observation in &completed {
            let horizon_time_ms = observation.horizon_time_ms.unwrap_or(now_ms);
            debug!(
                side = %observation.side,
                start_time_ms = observation.start_time_ms,
                horizon_time_ms,
                markout = ?observation.markout,
                "MarkoutSkew completed observation"
            );

            match observation.side {
                Side::Buy => self.buy_window.add(horizon_time_ms, observation.clone()),
                Side::Sell => self.sell_window.add(horizon_time_ms, observation.clone()),
            }
        }

        completed
    }

    /// Markout skew over the completion-time window `[current_time - window_ms, current_time]`.
    ///
    /// Both side windows are purged relative to `current_time` first.
    pub fn markout_skew(&mut self, current_time: i64) -> MarkoutSkew {
        let window_end_ms = normalise_timestamp_ms(current_time);
        self.buy_window.purge(window_end_ms);
        self.sell_window.purge(window_end_ms);

        let (mplus, n_buys) = mean_markout(&self.buy_window);
        let (mminus, n_sells) = mean_markout(&self.sell_window);

        MarkoutSkew {
            mplus,
            mminus,
            skew: mplus.zip(mminus).map(|(mplus, mminus)| mplus - mminus),
            n_buys,
            n_sells,
        }
    }

    pub fn export_state(&self) -> MarkoutState {
        MarkoutState {
            config: self.config,
            buy_window: self.buy_window.iter().cloned().collect(),
            sell_window: self.sell_window.iter().cloned().collect(),
            horizon: self.horizon.clone(),
            last_input_time_ms: self.last_input_time_ms,
        }
    }

    /// Replace the configuration, completion windows and horizon state with the provided
    /// [`MarkoutState`].
    ///
    /// The engine is left untouched if the state is invalid.
    pub fn import_state(&mut self, state: MarkoutState) -> Result<(), StatisticError> {
        let MarkoutState {
            config,
            buy_window,
            sell_window,
            horizon,
            last_input_time_ms,
        } = state;

        let expected = config.horizon()?;
        let consistent = match (&expected, &horizon) {
            (Horizon::Clock(expected), Horizon::Clock(actual)) => {
                expected.tau_ms() == actual.tau_ms()
            }
            (Horizon::Event(expected), Horizon::Event(actual)) => {
                expected.k_trades() == actual.k_trades()
            }
            _ => false,
        };
        if !consistent {
            return Err(StatisticError::InvalidState(format!(
                "markout horizon state does not match {} horizon config",
                config.horizon_type
            )));
        }

        let buy_window = restore_window(config.window_ms, buy_window)?;
        let sell_window = restore_window(config.window_ms, sell_window)?;

        *self = Self {
            config,
            horizon,
            buy_window,
            sell_window,
            last_input_time_ms,
        };
        Ok(())
    }
}

fn mean_markout(window: &TimeWindow<MarkoutObservation>) -> (Option<Decimal>, usize) {
    let (sum, count) = window
        .iter()
        .filter_map(|entry| entry.payload.markout)
        .fold((Decimal::ZERO, 0usize), |(sum, count), markout| {
            (sum + markout, count + 1)
        });

    let mean = (count > 0)
        .then(|| sum.checked_div(Decimal::from(count)))
        .flatten();

    (mean, count)
}

fn restore_window(
    window_ms: i64,
    entries: Vec<WindowEntry<MarkoutObservation>>,
) -> Result<TimeWindow<MarkoutObservation>, StatisticError> {
    let mut window = TimeWindow::new(window_ms)?;
    for entry in entries {
        window.add(entry.time_ms, entry.payload);
    }
    Ok(window)
}

/// Serialisable snapshot of a [`MarkoutEngine`].
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct MarkoutState {
    pub config: MarkoutConfig,
    pub buy_window: Vec<WindowEntry<MarkoutObservation>>,
    pub sell_window: Vec<WindowEntry<MarkoutObservation>>,
    /// Pending observations, plus the trade counter and target queue in event mode.
    pub horizon: Horizon,
    pub last_input_time_ms: Option<i64>,
}

impl Snapshot for MarkoutState {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PublicL3Trade, Quote};
    use rust_decimal_macros::dec;

    const BASE_MS: i64 = 1_700_000_000_000;

    fn trade(offset_ms: i64, aggressor_sign: i8) -> PublicL3Trade {
        PublicL3Trade::new(BASE_MS + offset_ms, dec!(101.0), dec!(100), aggressor_sign)
    }

    fn clock_engine(window_ms: i64) -> MarkoutEngine {
        MarkoutEngine::new(MarkoutConfig::clock(1_000).with_window_ms(window_ms)).unwrap()
    }

    fn event_engine(k_trades: u64) -> MarkoutEngine {
        MarkoutEngine::new(MarkoutConfig::event(k_trades).with_window_ms(10_000)).unwrap()
    }

    fn event_targets(engine: &MarkoutEngine) -> Vec<u64> {
        match engine.horizon() {
            Horizon::Event(event) => event.queue().map(|queued| queued.target).collect(),
            Horizon::Clock(_) => panic!("expected event horizon"),
        }
    }

    #[test]
    fn test_markout_config_validate() {
        struct TestCase {
            input: MarkoutConfig,
            expected: Result<(), StatisticError>,
        }

        let tests = vec![
            TestCase {
                // TC0: valid clock config
                input: MarkoutConfig::clock(1_000),
                expected: Ok(()),
            },
            TestCase {
                // TC1: valid event config
                input: MarkoutConfig::event(10),
                expected: Ok(()),
            },
            TestCase {
                // TC2: clock horizon without tau_ms
                input: MarkoutConfig {
                    tau_ms: None,
                    ..MarkoutConfig::clock(1_000)
                },
                expected: Err(StatisticError::MissingHorizonParameter {
                    horizon: "clock",
                    parameter: "tau_ms",
                }),
            },
            TestCase {
                // TC3: event horizon without k_trades
                input: MarkoutConfig {
                    k_trades: None,
                    ..MarkoutConfig::event(3)
                },
                expected: Err(StatisticError::MissingHorizonParameter {
                    horizon: "event",
                    parameter: "k_trades",
                }),
            },
            TestCase {
                // TC4: non-positive tau_ms
                input: MarkoutConfig::clock(0),
                expected: Err(StatisticError::InvalidHorizonParameter {
                    parameter: "tau_ms",
                    value: 0,
                }),
            },
            TestCase {
                // TC5: zero k_trades
                input: MarkoutConfig::event(0),
                expected: Err(StatisticError::InvalidHorizonParameter {
                    parameter: "k_trades",
                    value: 0,
                }),
            },
            TestCase {
                // TC6: non-positive window
                input: MarkoutConfig::clock(1_000).with_window_ms(-1),
                expected: Err(StatisticError::InvalidWindow {
                    name: "markout",
                    value: -1,
                }),
            },
            TestCase {
                // TC7: unused parameter for the other horizon is ignored
                input: MarkoutConfig {
                    k_trades: Some(0),
                    ..MarkoutConfig::clock(1_000)
                },
                expected: Ok(()),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.validate();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_markout_config_deserialise() {
        let config = serde_json::from_str::<MarkoutConfig>(
            r#"{"horizon_type":"event","tau_ms":null,"k_trades":5,"window_ms":60000}"#,
        )
        .unwrap();
        assert_eq!(config, MarkoutConfig::event(5).with_window_ms(60_000));
    }

    #[test]
    fn test_add_coalesced_trades_single_side() {
        let mut engine = clock_engine(30_000);

        let observations = engine.add_coalesced_trades(BASE_MS, &[trade(0, 1)], dec!(100.5));

        assert_eq!(
            observations,
            vec![MarkoutObservation {
                start_time_ms: BASE_MS,
                horizon_time_ms: Some(BASE_MS + 1_000),
                side: Side::Buy,
                pre_trade_mid: dec!(100.5),
                markout: None,
            }]
        );
        assert_eq!(engine.pending_len(), 1);
    }

    #[test]
    fn test_add_coalesced_trades_both_sides_share_start_and_mid() {
        let mut engine = clock_engine(30_000);

        let trades = [trade(0, -1), trade(0, 1), trade(0, -1)];
        let observations =
            engine.add_coalesced_trades(BASE_MS, &trades, Quote::new(dec!(100.7), dec!(100.9)));

        assert_eq!(observations.len(), 2);
        let (buy, sell) = (&observations[0], &observations[1]);
        assert_eq!(buy.side, Side::Buy);
        assert_eq!(sell.side, Side::Sell);
        assert_eq!(buy.start_time_ms, sell.start_time_ms);
        assert_eq!(buy.pre_trade_mid, dec!(100.8));
        assert_eq!(sell.pre_trade_mid, dec!(100.8));
        assert_eq!(buy.horizon_time_ms, sell.horizon_time_ms);
    }

    #[test]
    fn test_add_coalesced_trades_ignores_empty_and_unknown_sign() {
        let mut engine = clock_engine(30_000);

        assert!(
            engine
                .add_coalesced_trades::<PublicL3Trade, _>(BASE_MS, &[], dec!(100))
                .is_empty()
        );
        assert!(
            engine
                .add_coalesced_trades(BASE_MS, &[trade(0, 0)], dec!(100))
                .is_empty()
        );
        assert_eq!(engine.pending_len(), 0);
    }

    #[test]
    fn test_add_coalesced_trades_out_of_order_is_processed() {
        let mut engine = clock_engine(30_000);

        engine.add_coalesced_trades(BASE_MS + 2_000, &[trade(2_000, 1)], dec!(100));
        let late = engine.add_coalesced_trades(BASE_MS + 1_000, &[trade(1_000, -1)], dec!(100));

        assert_eq!(late.len(), 1);
        assert_eq!(late[0].start_time_ms, BASE_MS + 1_000);
        assert_eq!(engine.pending_len(), 2);
    }

    #[test]
    fn test_complete_horizons_clock() {
        let mut engine = clock_engine(30_000);
        engine.add_coalesced_trades(BASE_MS, &[trade(0, 1), trade(0, -1)], dec!(100.8));

        let completed = engine.complete_horizons_clock(BASE_MS + 1_000, dec!(101.0));

        assert_eq!(completed.len(), 2);
        assert!(completed.iter().all(MarkoutObservation::is_complete));
        assert!(completed.iter().all(|obs| obs.markout == Some(dec!(0.2))));
        assert_eq!(engine.pending_len(), 0);
    }

    #[test]
    fn test_complete_horizons_clock_partial() {
        let mut engine = clock_engine(30_000);
        engine.add_coalesced_trades(BASE_MS, &[trade(0, 1)], dec!(100.5));
        engine.add_coalesced_trades(BASE_MS + 500, &[trade(500, 1)], dec!(100.6));

        let completed = engine.complete_horizons_clock(BASE_MS + 1_200, dec!(101.0));

        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].start_time_ms, BASE_MS);
        assert_eq!(engine.pending_len(), 1);
    }

    #[test]
    fn test_complete_horizons_mode_mismatch_is_noop() {
        let mut clock = clock_engine(30_000);
        clock.add_coalesced_trades(BASE_MS, &[trade(0, 1)], dec!(100));
        assert!(clock.complete_horizons_event(BASE_MS + 5_000, dec!(101)).is_empty());
        assert_eq!(clock.pending_len(), 1);

        let mut event = event_engine(1);
        event.add_coalesced_trades(BASE_MS, &[trade(0, 1)], dec!(100));
        assert!(event.complete_horizons_clock(BASE_MS + 5_000, dec!(101)).is_empty());
        assert_eq!(event.pending_len(), 1);
    }

    #[test]
    fn test_markout_skew_basic() {
        let mut engine = clock_engine(30_000);
        engine.add_coalesced_trades(BASE_MS, &[trade(0, 1)], dec!(100.5));
        engine.add_coalesced_trades(BASE_MS + 500, &[trade(500, -1)], dec!(100.8));

        engine.complete_horizons_clock(BASE_MS + 1_000, dec!(101.0));
        engine.complete_horizons_clock(BASE_MS + 1_500, dec!(100.5));

        let skew = engine.markout_skew(BASE_MS + 2_000);
        assert_eq!(
            skew,
            MarkoutSkew {
                mplus: Some(dec!(0.5)),
                mminus: Some(dec!(-0.3)),
                skew: Some(dec!(0.8)),
                n_buys: 1,
                n_sells: 1,
            }
        );
    }

    #[test]
    fn test_markout_skew_zero_counts() {
        let mut engine = clock_engine(30_000);
        assert_eq!(engine.markout_skew(BASE_MS), MarkoutSkew::default());
    }

    #[test]
    fn test_markout_skew_single_side() {
        let mut engine = clock_engine(30_000);
        engine.add_coalesced_trades(BASE_MS, &[trade(0, 1)], dec!(100.5));
        engine.complete_horizons_clock(BASE_MS + 1_000, dec!(101.0));

        let skew = engine.markout_skew(BASE_MS + 1_000);
        assert_eq!(skew.n_buys, 1);
        assert_eq!(skew.n_sells, 0);
        assert_eq!(skew.mplus, Some(dec!(0.5)));
        assert_eq!(skew.mminus, None);
        assert_eq!(skew.skew, None);
    }

    #[test]
    fn test_markout_skew_means_multiple_observations() {
        let mut engine = clock_engine(30_000);
        engine.add_coalesced_trades(BASE_MS, &[trade(0, 1)], dec!(100));
        engine.add_coalesced_trades(BASE_MS + 100, &[trade(100, 1)], dec!(101));
        engine.add_coalesced_trades(BASE_MS + 200, &[trade(200, -1)], dec!(102));

        engine.complete_horizons_clock(BASE_MS + 1_200, dec!(102));

        // buys: 2 & 1, sells: 0
        let skew = engine.markout_skew(BASE_MS + 1_200);
        assert_eq!(skew.mplus, Some(dec!(1.5)));
        assert_eq!(skew.mminus, Some(dec!(0)));
        assert_eq!(skew.skew, Some(dec!(1.5)));
    }

    #[test]
    fn test_markout_skew_completion_time_eviction() {
        let mut engine = clock_engine(5_000);
        engine.add_coalesced_trades(BASE_MS, &[trade(0, 1)], dec!(100.5));
        engine.complete_horizons_clock(BASE_MS + 1_000, dec!(101.0));

        assert_eq!(engine.markout_skew(BASE_MS + 5_000).n_buys, 1);

        // cutoff = BASE + 3_000, completed at BASE + 1_000
        let skew = engine.markout_skew(BASE_MS + 8_000);
        assert_eq!(skew.n_buys, 0);
        assert_eq!(skew.mplus, None);
    }

    #[test]
    fn test_markout_skew_is_idempotent() {
        let mut engine = clock_engine(30_000);
        engine.add_coalesced_trades(BASE_MS, &[trade(0, 1), trade(0, -1)], dec!(100));
        engine.complete_horizons_clock(BASE_MS + 1_000, dec!(100.25));

        assert_eq!(
            engine.markout_skew(BASE_MS + 2_000),
            engine.markout_skew(BASE_MS + 2_000)
        );
    }

    #[test]
    fn test_event_horizon_counts_every_trade() {
        let mut engine = event_engine(3);
        assert_eq!(engine.trade_counter(), 0);

        engine.add_coalesced_trades(BASE_MS, &[trade(0, 1), trade(0, -1)], dec!(100.5));
        assert_eq!(engine.trade_counter(), 2);
        assert_eq!(event_targets(&engine), vec![3, 3]);

        // Unknown sign trades create no observation but still count
        engine.add_coalesced_trades(BASE_MS + 100, &[trade(100, 0)], dec!(100.5));
        assert_eq!(engine.trade_counter(), 3);
        assert_eq!(engine.pending_len(), 2);
    }

    #[test]
    fn test_event_horizon_scheduling() {
        let mut engine = event_engine(3);

        let observations = engine.add_coalesced_trades(BASE_MS, &[trade(0, 1)], dec!(100.5));

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].horizon_time_ms, None);
        assert_eq!(event_targets(&engine), vec![3]);
    }

    #[test]
    fn test_complete_horizons_event() {
        let mut engine = event_engine(3);

        // counter 0 → 1, target 3
        engine.add_coalesced_trades(BASE_MS, &[trade(0, 1)], dec!(100.5));
        // counter 1 → 3, targets 4 & 4
        engine.add_coalesced_trades(
            BASE_MS + 1_000,
            &[trade(1_000, -1), trade(1_000, 1)],
            dec!(101),
        );
        // counter 3 → 4, target 6
        engine.add_coalesced_trades(BASE_MS + 2_000, &[trade(2_000, 1)], dec!(102));

        let completed = engine.complete_horizons_event(BASE_MS + 2_000, dec!(103.0));

        assert_eq!(completed.len(), 3);
        let first = completed
            .iter()
            .find(|obs| obs.start_time_ms == BASE_MS)
            .unwrap();
        assert_eq!(first.horizon_time_ms, Some(BASE_MS + 2_000));
        assert_eq!(first.markout, Some(dec!(2.5)));
        assert_eq!(engine.pending_len(), 1);
        assert_eq!(event_targets(&engine), vec![6]);

        let skew = engine.markout_skew(BASE_MS + 2_000);
        assert_eq!(skew.n_buys, 2);
        assert_eq!(skew.n_sells, 1);
        assert_eq!(skew.mplus, Some(dec!(2.25)));
        assert_eq!(skew.mminus, Some(dec!(2)));
    }

    #[test]
    fn test_complete_horizons_event_multiple_batches() {
        let mut engine = event_engine(3);
        engine.add_coalesced_trades(BASE_MS, &[trade(0, 1), trade(0, -1)], dec!(100.5));

        for index in 0..3 {
            let offset = 1_000 + index * 100;
            engine.add_coalesced_trades(BASE_MS + offset, &[trade(offset, 1)], dec!(101));
        }

        // counter = 5, targets [3, 3, 5, 6, 7]
        let completed = engine.complete_horizons_event(BASE_MS + 1_300, dec!(102.5));
        assert_eq!(completed.len(), 3);
        assert_eq!(engine.pending_len(), 2);
    }

    #[test]
    fn test_event_horizon_time_is_normalised() {
        let mut engine = event_engine(1);
        engine.add_coalesced_trades(BASE_MS, &[trade(0, -1)], dec!(10));

        // Microsecond completion time
        let completed = engine.complete_horizons_event((BASE_MS + 50) * 1_000, dec!(9));
        assert_eq!(completed[0].horizon_time_ms, Some(BASE_MS + 50));
        assert_eq!(completed[0].markout, Some(dec!(-1)));
    }

    #[test]
    fn test_markout_clock_state_round_trip() {
        let mut original = clock_engine(30_000);
        original.add_coalesced_trades(BASE_MS, &[trade(0, 1), trade(0, -1)], dec!(100.5));
        original.complete_horizons_clock(BASE_MS + 1_000, dec!(101.0));
        original.add_coalesced_trades(BASE_MS + 1_500, &[trade(1_500, 1)], dec!(100.9));

        let json = original.export_state().to_json().unwrap();
        let mut restored =
            MarkoutEngine::from_state(MarkoutState::from_json(&json).unwrap()).unwrap();

        assert_eq!(restored, original);
        assert_eq!(restored.pending_len(), 1);
        assert_eq!(
            restored.markout_skew(BASE_MS + 2_000),
            original.markout_skew(BASE_MS + 2_000)
        );

        for markout in [&mut original, &mut restored] {
            markout.complete_horizons_clock(BASE_MS + 3_000, dec!(100.1));
        }
        assert_eq!(
            restored.markout_skew(BASE_MS + 3_000),
            original.markout_skew(BASE_MS + 3_000)
        );
    }

    #[test]
    fn test_markout_event_state_round_trip() {
        let mut original = event_engine(2);
        original.add_coalesced_trades(BASE_MS, &[trade(0, 1)], dec!(100));

        let state = original.export_state();
        let mut restored = MarkoutEngine::new(MarkoutConfig::clock(5)).unwrap();
        restored.import_state(state).unwrap();

        assert_eq!(restored.trade_counter(), 1);
        assert_eq!(event_targets(&restored), vec![2]);

        for markout in [&mut original, &mut restored] {
            markout.add_coalesced_trades(BASE_MS + 10, &[trade(10, -1)], dec!(100.2));
            markout.complete_horizons_event(BASE_MS + 10, dec!(100.4));
        }
        assert_eq!(restored.export_state(), original.export_state());
        assert_eq!(
            restored.markout_skew(BASE_MS + 10),
            original.markout_skew(BASE_MS + 10)
        );
    }

    #[test]
    fn test_markout_import_rejects_mismatched_horizon() {
        let mut engine = clock_engine(30_000);
        let before = engine.clone();

        let mut state = engine.export_state();
        state.horizon = Horizon::Event(EventHorizon::new(3));
        assert!(matches!(
            engine.import_state(state),
            Err(StatisticError::InvalidState(_))
        ));

        let mut state = engine.export_state();
        state.config.tau_ms = Some(2_000);
        assert!(engine.import_state(state).is_err());

        assert_eq!(engine, before);
    }
}
