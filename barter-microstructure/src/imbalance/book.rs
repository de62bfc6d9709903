use crate::{error::StatisticError, model::BookLevel};
use rust_decimal::{Decimal, MathematicalOps, prelude::ToPrimitive};
use std::{
    collections::{BTreeMap, HashMap},
    hash::BuildHasher,
};

/// Price → resting size lookup for one side of an order book.
///
/// Absent prices have zero size.
pub trait BookLevels {
    fn size_at(&self, price: &Decimal) -> Decimal;
}

impl<S> BookLevels for HashMap<Decimal, Decimal, S>
where
    S: BuildHasher,
{
    fn size_at(&self, price: &Decimal) -> Decimal {
        self.get(price).copied().unwrap_or(Decimal::ZERO)
    }
}

impl BookLevels for BTreeMap<Decimal, Decimal> {
    fn size_at(&self, price: &Decimal) -> Decimal {
        self.get(price).copied().unwrap_or(Decimal::ZERO)
    }
}

impl BookLevels for [BookLevel] {
    fn size_at(&self, price: &Decimal) -> Decimal {
        self.iter()
            .find(|level| level.price == *price)
            .map_or(Decimal::ZERO, |level| level.size)
    }
}

impl BookLevels for Vec<BookLevel> {
    fn size_at(&self, price: &Decimal) -> Decimal {
        self.as_slice().size_at(price)
    }
}

/// Exponential distance weights `w_k = 2^{-(k-1)/HL}` for `k = 1..=k_levels`, where `HL` is the
/// half-life in ticks.
///
/// If `1/HL` is integral the weights are exact powers of two, otherwise they are computed via
/// `exp(-(k-1)/HL · ln 2)`. Weights too small to represent are zero.
pub fn exponential_weights(
    k_levels: usize,
    half_life_ticks: Decimal,
) -> Result<Vec<Decimal>, StatisticError> {
    if k_levels == 0 {
        return Err(StatisticError::InvalidLevels(k_levels));
    }
    if half_life_ticks <= Decimal::ZERO {
        return Err(StatisticError::InvalidHalfLife(half_life_ticks));
    }

    let inverse_half_life = Decimal::ONE
        .checked_div(half_life_ticks)
        .ok_or(StatisticError::InvalidHalfLife(half_life_ticks))?;

    let weights = match inverse_half_life
        .fract()
        .is_zero()
        .then(|| inverse_half_life.to_u64())
        .flatten()
    {
        Some(step) => (0..k_levels as u64)
            .map(|level| power_of_two_weight(level.checked_mul(step)))
            .collect(),
        None => {
            let ln_two = Decimal::TWO.ln();
            (0..k_levels)
                .map(|level| {
                    Decimal::from(level)
                        .checked_div(half_life_ticks)
                        .and_then(|ticks| ticks.checked_mul(ln_two))
                        .and_then(|exponent| (-exponent).checked_exp())
                        .unwrap_or(Decimal::ZERO)
                })
                .collect()
        }
    };

    Ok(weights)
}

// 1 / 2^exponent, or zero if 2^exponent is not representable.
fn power_of_two_weight(exponent: Option<u64>) -> Decimal {
    exponent
        .and_then(|exponent| Decimal::TWO.checked_powu(exponent))
        .and_then(|divisor| Decimal::ONE.checked_div(divisor))
        .unwrap_or(Decimal::ZERO)
}

/// Resting sizes on a tick grid anchored at the touch.
///
/// Bid level `i` is priced `best_bid - i·tick_size` and ask level `i` is priced
/// `best_ask + i·tick_size`, for `i = 0..k_levels`. Missing levels are padded with zero.
pub fn sizes_on_tick_grid<Bids, Asks>(
    best_bid: Decimal,
    best_ask: Decimal,
    tick_size: Decimal,
    k_levels: usize,
    bids: &Bids,
    asks: &Asks,
) -> Result<(Vec<Decimal>, Vec<Decimal>), StatisticError>
where
    Bids: BookLevels + ?Sized,
    Asks: BookLevels + ?Sized,
{
    if tick_size <= Decimal::ZERO {
        return Err(StatisticError::InvalidTickSize(tick_size));
    }
    if k_levels == 0 {
        return Err(StatisticError::InvalidLevels(k_levels));
    }

    let (bid_sizes, ask_sizes) = (0..k_levels)
        .map(|level| {
            let offset = tick_size.checked_mul(Decimal::from(level));
            let bid_size = offset
                .and_then(|offset| best_bid.checked_sub(offset))
                .map_or(Decimal::ZERO, |price| bids.size_at(&price));
            let ask_size = offset
                .and_then(|offset| best_ask.checked_add(offset))
                .map_or(Decimal::ZERO, |price| asks.size_at(&price));
            (bid_size, ask_size)
        })
        .unzip();

    Ok((bid_sizes, ask_sizes))
}

/// Weighted resting depth `D = Σ w_k · size_k` on each side of the book.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct WeightedDepth {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl WeightedDepth {
    pub fn new(
        bid_sizes: &[Decimal],
        ask_sizes: &[Decimal],
        weights: &[Decimal],
    ) -> Result<Self, StatisticError> {
        if bid_sizes.len() != ask_sizes.len() || bid_sizes.len() != weights.len() {
            return Err(StatisticError::LengthMismatch {
                bids: bid_sizes.len(),
                asks: ask_sizes.len(),
                weights: weights.len(),
            });
        }

        Ok(bid_sizes.iter().zip(ask_sizes).zip(weights).fold(
            Self::default(),
            |depth, ((bid_size, ask_size), weight)| Self {
                bid: depth.bid + weight * bid_size,
                ask: depth.ask + weight * ask_size,
            },
        ))
    }

    /// Normalised imbalance `IB = (D_bid - D_ask) / (D_bid + D_ask)`.
    ///
    /// Returns `None` if the denominator is zero.
    pub fn imbalance(&self) -> Option<Decimal> {
        let total = self.bid + self.ask;
        if total.is_zero() {
            None
        } else {
            (self.bid - self.ask).checked_div(total)
        }
    }

    /// Raw queue imbalance `QI = D_bid - D_ask`.
    ///
    /// Returns `None` if both sides have zero depth.
    pub fn difference(&self) -> Option<Decimal> {
        if self.bid.is_zero() && self.ask.is_zero() {
            None
        } else {
            Some(self.bid - self.ask)
        }
    }
}
