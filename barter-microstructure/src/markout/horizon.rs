use super::MarkoutObservation;
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Strategy deciding when a pending [`MarkoutObservation`] reaches its horizon.
pub trait HorizonSchedule {
    /// Schedule a freshly created observation, returning it as the caller should see it.
    fn schedule(&mut self, observation: MarkoutObservation) -> MarkoutObservation;

    /// Account for `count` trades having been processed.
    fn record_trades(&mut self, count: u64);

    /// Complete every observation whose horizon has been reached by `now_ms`, evaluating its
    /// markout against `mid`.
    ///
    /// Completed observations are returned in scheduling order and no longer pending.
    fn complete(&mut self, now_ms: i64, mid: Decimal) -> Vec<MarkoutObservation>;

    fn pending_len(&self) -> usize;
}

/// Clock-time horizon, `u = t + tau_ms`.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct ClockHorizon {
    tau_ms: i64,
    pending: VecDeque<MarkoutObservation>,
}

impl ClockHorizon {
    pub fn new(tau_ms: i64) -> Self {
        Self {
            tau_ms,
            pending: VecDeque::new(),
        }
    }

    pub fn tau_ms(&self) -> i64 {
        self.tau_ms
    }

    /// Observations awaiting their horizon, oldest first.
    pub fn pending(&self) -> impl ExactSizeIterator<Item = &MarkoutObservation> {
        self.pending.iter()
    }
}

impl HorizonSchedule for ClockHorizon {
    fn schedule(&mut self, mut observation: MarkoutObservation) -> MarkoutObservation {
        observation.horizon_time_ms = Some(observation.start_time_ms.saturating_add(self.tau_ms));
        self.pending.push_back(observation.clone());
        observation
    }

    fn record_trades(&mut self, _: u64) {}

    fn complete(&mut self, now_ms: i64, mid: Decimal) -> Vec<MarkoutObservation> {
        let (completed, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|observation| {
                observation
                    .horizon_time_ms
                    .is_some_and(|horizon_ms| horizon_ms <= now_ms)
            });
        self.pending = pending.into();

        completed
            .into_iter()
            .map(|observation| {
                let horizon_ms = observation.horizon_time_ms.unwrap_or(now_ms);
                observation.complete(horizon_ms, mid)
            })
            .collect()
    }

    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Observation waiting for the trade counter to reach `target`.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Constructor)]
pub struct EventTarget {
    pub target: u64,
    pub observation: MarkoutObservation,
}

/// Event-time horizon, `u` = time at which the trade counter first reaches `i + k_trades`, where
/// `i` is the counter when the observation was created.
///
/// The counter advances by every processed trade, including those with an unknown aggressor.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct EventHorizon {
    k_trades: u64,
    trade_counter: u64,
    queue: VecDeque<EventTarget>,
}

impl EventHorizon {
    pub fn new(k_trades: u64) -> Self {
        Self {
            k_trades,
            trade_counter: 0,
            queue: VecDeque::new(),
        }
    }

    pub fn k_trades(&self) -> u64 {
        self.k_trades
    }

    pub fn trade_counter(&self) -> u64 {
        self.trade_counter
    }

    /// Queued `(target, observation)` pairs, oldest first.
    pub fn queue(&self) -> impl ExactSizeIterator<Item = &EventTarget> {
        self.queue.iter()
    }
}

impl HorizonSchedule for EventHorizon {
    fn schedule(&mut self, observation: MarkoutObservation) -> MarkoutObservation {
        let target = self.trade_counter.saturating_add(self.k_trades);
        self.queue
            .push_back(EventTarget::new(target, observation.clone()));
        observation
    }

    fn record_trades(&mut self, count: u64) {
        self.trade_counter = self.trade_counter.saturating_add(count);
    }

    fn complete(&mut self, now_ms: i64, mid: Decimal) -> Vec<MarkoutObservation> {
        let trade_counter = self.trade_counter;
        let (completed, queue): (Vec<_>, Vec<_>) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|queued| trade_counter >= queued.target);
        self.queue = queue.into();

        completed
            .into_iter()
            .map(|queued| queued.observation.complete(now_ms, mid))
            .collect()
    }

    fn pending_len(&self) -> usize {
        self.queue.len()
    }
}

/// Horizon strategy selected once from the [`MarkoutConfig`](super::MarkoutConfig).
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Horizon {
    Clock(ClockHorizon),
    Event(EventHorizon),
}

impl HorizonSchedule for Horizon {
    fn schedule(&mut self, observation: MarkoutObservation) -> MarkoutObservation {
        match self {
            Horizon::Clock(clock) => clock.schedule(observation),
            Horizon::Event(event) => event.schedule(observation),
        }
    }

    fn record_trades(&mut self, count: u64) {
        match self {
            Horizon::Clock(clock) => clock.record_trades(count),
            Horizon::Event(event) => event.record_trades(count),
        }
    }

    fn complete(&mut self, now_ms: i64, mid: Decimal) -> Vec<MarkoutObservation> {
        match self {
            Horizon::Clock(clock) => clock.complete(now_ms, mid),
            Horizon::Event(event) => event.complete(now_ms, mid),
        }
    }

    fn pending_len(&self) -> usize {
        match self {
            Horizon::Clock(clock) => clock.pending_len(),
            Horizon::Event(event) => event.pending_len(),
        }
    }
}
