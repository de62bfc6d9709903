use crate::error::StatisticError;
use derive_more::Constructor;
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::VecDeque;
use tracing::warn;

/// Fill resident in a [`ConcentrationBucket`].
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Constructor)]
pub struct FillRecord {
    pub time_ms: i64,
    pub participant: SmolStr,
    pub quantity: Decimal,
}

/// Concentration metrics of a single [`ConcentrationBucket`].
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct BucketMetrics {
    /// Σ(v_p²) / V², `None` if there is no resident volume.
    pub avci: Option<Decimal>,
    /// N·AVCI - 1, `None` if there is no resident volume.
    pub excess: Option<Decimal>,
    /// Number of participants with non-zero resident volume.
    pub participants: usize,
    /// Total resident volume.
    pub volume: Decimal,
}

/// Incrementally maintained Herfindahl-style concentration of volume across participants.
///
/// Keeps the running scalars V = Σ v_p, Σ² = Σ v_p² and N = |{p : v_p > 0}| so inserting or
/// evicting a fill is O(1) regardless of how many participants are resident.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ConcentrationBucket {
    fills: VecDeque<FillRecord>,
    volume_by_participant: FnvHashMap<SmolStr, Decimal>,
    volume: Decimal,
    sum_squares: Decimal,
    participants: usize,
}

impl ConcentrationBucket {
    /// Insert a fill, returning whether it was accepted.
    ///
    /// Non-positive quantities carry no volume and are ignored. A fill whose volume would make
    /// V or Σ² unrepresentable is skipped, leaving the bucket untouched.
    pub fn insert(&mut self, time_ms: i64, participant: SmolStr, quantity: Decimal) -> bool {
        if quantity <= Decimal::ZERO {
            return false;
        }

        let old = self
            .volume_by_participant
            .get(&participant)
            .copied()
            .unwrap_or(Decimal::ZERO);

        // Σ² = Σ² - x² + (x + q)²
        let Some((new, volume, sum_squares)) = old.checked_add(quantity).and_then(|new| {
            let volume = self.volume.checked_add(quantity)?;
            let sum_squares = self
                .sum_squares
                .checked_sub(old.checked_mul(old)?)?
                .checked_add(new.checked_mul(new)?)?;
            Some((new, volume, sum_squares))
        }) else {
            warn!(
                time_ms,
                %participant,
                %quantity,
                "fill volume overflows concentration sums, skipping"
            );
            return false;
        };

        self.volume = volume;
        self.sum_squares = sum_squares;

        if old.is_zero() {
            self.participants += 1;
        }

        self.volume_by_participant.insert(participant.clone(), new);
        self.fills
            .push_back(FillRecord::new(time_ms, participant, quantity));
        true
    }

    /// Evict every fill with `time_ms < cutoff_ms`, returning how many were evicted.
    pub fn evict_before(&mut self, cutoff_ms: i64) -> usize {
        let mut evicted = 0;

        while self
            .fills
            .front()
            .is_some_and(|fill| fill.time_ms < cutoff_ms)
        {
            let Some(fill) = self.fills.pop_front() else {
                break;
            };
            evicted += 1;

            let old = self
                .volume_by_participant
                .get(&fill.participant)
                .copied()
                .unwrap_or(Decimal::ZERO);
            let new = old - fill.quantity;

            // Every resident square fits since insert checked it, and eviction only shrinks them
            self.volume -= fill.quantity;
            self.sum_squares = (self.sum_squares - old * old) + new * new;

            if new <= Decimal::ZERO {
                self.volume_by_participant.remove(&fill.participant);
                self.participants = self.participants.saturating_sub(1);
            } else {
                self.volume_by_participant.insert(fill.participant, new);
            }
        }

        evicted
    }

    /// Current metrics. When V² or N·Σ² is not representable the ratios are taken as
    /// (Σ²/V)/V and N·AVCI - 1 instead.
    pub fn metrics(&self) -> BucketMetrics {
        if self.volume <= Decimal::ZERO {
            return BucketMetrics::default();
        }

        let participants = Decimal::from(self.participants);
        let (avci, excess) = match self.volume.checked_mul(self.volume) {
            Some(volume_squared) => (
                self.sum_squares.checked_div(volume_squared),
                participants
                    .checked_mul(self.sum_squares)
                    .and_then(|weighted| weighted.checked_sub(volume_squared))
                    .and_then(|excess| excess.checked_div(volume_squared)),
            ),
            None => (
                self.sum_squares
                    .checked_div(self.volume)
                    .and_then(|avci| avci.checked_div(self.volume)),
                None,
            ),
        };

        let excess = excess.or_else(|| {
            avci.and_then(|avci| participants.checked_mul(avci))
                .and_then(|scaled| scaled.checked_sub(Decimal::ONE))
        });

        BucketMetrics {
            avci,
            excess,
            participants: self.participants,
            volume: self.volume,
        }
    }

    /// Total resident volume V.
    pub fn volume(&self) -> Decimal {
        self.volume
    }

    /// Running sum of squared per-participant volumes Σ².
    pub fn sum_squares(&self) -> Decimal {
        self.sum_squares
    }

    /// Number of participants with non-zero resident volume.
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Resident volume attributed to `participant`.
    pub fn volume_of(&self, participant: &str) -> Decimal {
        self.volume_by_participant
            .get(participant)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Resident fills, oldest first.
    pub fn fills(&self) -> impl ExactSizeIterator<Item = &FillRecord> {
        self.fills.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fills.is_empty()
    }

    pub fn export_state(&self) -> BucketState {
        BucketState {
            fills: self.fills.iter().cloned().collect(),
            volume_by_participant: self.volume_by_participant.clone(),
            volume: self.volume,
            sum_squares: self.sum_squares,
            participants: self.participants,
        }
    }

    /// Restore a bucket from a [`BucketState`], taking the running scalars as-is rather than
    /// recomputing them.
    pub fn from_state(state: BucketState) -> Result<Self, StatisticError> {
        let BucketState {
            fills,
            volume_by_participant,
            volume,
            sum_squares,
            participants,
        } = state;

        let recomputed = volume_by_participant
            .values()
            .try_fold(Decimal::ZERO, |sum, volume| {
                sum.checked_add(volume.checked_mul(*volume)?)
            });
        if recomputed.is_none() {
            return Err(StatisticError::InvalidState(
                "bucket participant volumes overflow the sum of squares".to_string(),
            ));
        }

        if participants != volume_by_participant.len() {
            return Err(StatisticError::InvalidState(format!(
                "bucket participant count {participants} does not match {} resident participants",
                volume_by_participant.len()
            )));
        }

        Ok(Self {
            fills: fills.into(),
            volume_by_participant,
            volume,
            sum_squares,
            participants,
        })
    }
}

/// Serialisable snapshot of a [`ConcentrationBucket`].
#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct BucketState {
    pub fills: Vec<FillRecord>,
    pub volume_by_participant: FnvHashMap<SmolStr, Decimal>,
    pub volume: Decimal,
    pub sum_squares: Decimal,
    pub participants: usize,
}
