//! Structural data contracts consumed by the statistic engines, plus the stateless helpers
//! that sit alongside them.
//!
//! Hosts adapt their own trade, fill and quote types by implementing the traits in this module.
//! Concrete implementations ([`PublicFill`], [`PublicL3Trade`], [`BookLevel`], [`Quote`]) are
//! provided for convenience and for tests.

use crate::time::normalise_timestamp_ms;
use derive_more::{Constructor, Display};
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use tracing::warn;

/// Aggressor side of a trade or fill.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[display("buy")]
    Buy,
    #[display("sell")]
    Sell,
}

impl Side {
    /// Map an aggressor sign (+1 buy, -1 sell) to a [`Side`]. Any other value is unknown.
    pub fn from_sign(sign: i8) -> Option<Self> {
        match sign {
            1 => Some(Side::Buy),
            -1 => Some(Side::Sell),
            _ => None,
        }
    }

    /// Aggressor sign of this [`Side`] (+1 buy, -1 sell).
    pub fn sign(&self) -> i8 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

/// Something with a price.
pub trait HasPrice {
    fn price(&self) -> Decimal;
}

/// Something with a size.
pub trait HasSize {
    fn size(&self) -> Decimal;
}

/// Something that may or may not carry a size.
///
/// Blanket implemented for every [`HasSize`]. Types without a size implement this directly and
/// return `None`, which [`total_size`] skips.
pub trait MaybeSized {
    fn maybe_size(&self) -> Option<Decimal>;
}

impl<T> MaybeSized for T
where
    T: HasSize,
{
    fn maybe_size(&self) -> Option<Decimal> {
        Some(self.size())
    }
}

/// Public trade print.
pub trait Trade {
    /// Epoch timestamp of unknown unit.
    fn time(&self) -> i64;

    fn quantity(&self) -> Decimal;

    fn side(&self) -> Option<Side> {
        None
    }
}

/// Level 3 trade print carrying the aggressor sign.
pub trait L3Trade: Trade + HasPrice {
    /// +1 for a buy aggressor, -1 for a sell aggressor, anything else if unknown.
    fn aggressor_sign(&self) -> i8;
}

/// Something a mid price can be read from.
pub trait MidPrice {
    fn mid_price(&self) -> Decimal;
}

impl MidPrice for Decimal {
    fn mid_price(&self) -> Decimal {
        *self
    }
}

/// Level 3 fill attributing traded quantity to a taker.
pub trait L3Fill {
    /// Epoch timestamp of unknown unit.
    fn time(&self) -> i64;

    fn participant_id(&self) -> &SmolStr;

    fn side(&self) -> Option<Side>;

    fn quantity(&self) -> Decimal;
}

/// Normalised Barter level 3 fill.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Constructor)]
pub struct PublicFill {
    pub time: i64,
    pub participant: SmolStr,
    pub side: Option<Side>,
    pub quantity: Decimal,
}

impl L3Fill for PublicFill {
    fn time(&self) -> i64 {
        self.time
    }

    fn participant_id(&self) -> &SmolStr {
        &self.participant
    }

    fn side(&self) -> Option<Side> {
        self.side
    }

    fn quantity(&self) -> Decimal {
        self.quantity
    }
}

/// Normalised Barter level 3 trade.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Constructor)]
pub struct PublicL3Trade {
    pub time: i64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub aggressor_sign: i8,
}

impl Trade for PublicL3Trade {
    fn time(&self) -> i64 {
        self.time
    }

    fn quantity(&self) -> Decimal {
        self.quantity
    }

    fn side(&self) -> Option<Side> {
        Side::from_sign(self.aggressor_sign)
    }
}

impl HasPrice for PublicL3Trade {
    fn price(&self) -> Decimal {
        self.price
    }
}

impl HasSize for PublicL3Trade {
    fn size(&self) -> Decimal {
        self.quantity
    }
}

impl L3Trade for PublicL3Trade {
    fn aggressor_sign(&self) -> i8 {
        self.aggressor_sign
    }
}

/// Single resting price level.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize, Constructor)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl HasPrice for BookLevel {
    fn price(&self) -> Decimal {
        self.price
    }
}

impl HasSize for BookLevel {
    fn size(&self) -> Decimal {
        self.size
    }
}

/// Best bid & best ask.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Constructor)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl MidPrice for Quote {
    fn mid_price(&self) -> Decimal {
        compute_mid_price(self.bid, self.ask)
    }
}

/// Sum the size of every `(timestamp, item)` entry, skipping items without a size.
///
/// Returns zero for an empty input.
pub fn total_size<'a, T>(entries: impl IntoIterator<Item = &'a (i64, T)>) -> Decimal
where
    T: MaybeSized + 'a,
{
    entries
        .into_iter()
        .filter_map(|(_, item)| item.maybe_size())
        .sum()
}

/// Mid price = (bid + ask) / 2.
pub fn compute_mid_price(bid: Decimal, ask: Decimal) -> Decimal {
    (bid + ask) / Decimal::TWO
}

/// Check that coalesced L3 prints at a timestamp are accompanied by exactly one combined L2
/// update.
///
/// Returns `false` and logs a warning if `l3_count > 0` and `l2_count != 1`.
pub fn validate_l2_consistency(time_ms: i64, l3_count: usize, l2_count: usize) -> bool {
    if l3_count > 0 && l2_count != 1 {
        warn!(
            time_ms,
            l3_count,
            l2_count,
            "expected a single combined L2 update for coalesced L3 prints"
        );
        return false;
    }
    true
}

/// Group trades by normalised millisecond timestamp, in ascending time order.
///
/// Trades within a group keep their input order.
pub fn coalesce_trades_by_timestamp<T>(trades: impl IntoIterator<Item = T>) -> BTreeMap<i64, Vec<T>>
where
    T: Trade,
{
    trades
        .into_iter()
        .into_group_map_by(|trade| normalise_timestamp_ms(trade.time()))
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct Heartbeat;

    impl MaybeSized for Heartbeat {
        fn maybe_size(&self) -> Option<Decimal> {
            None
        }
    }

    #[test]
    fn test_side_from_sign() {
        assert_eq!(Side::from_sign(1), Some(Side::Buy));
        assert_eq!(Side::from_sign(-1), Some(Side::Sell));
        assert_eq!(Side::from_sign(0), None);
        assert_eq!(Side::Buy.sign(), 1);
        assert_eq!(Side::Sell.to_string(), "sell");
    }

    #[test]
    fn test_total_size() {
        struct TestCase {
            input: Vec<(i64, BookLevel)>,
            expected: Decimal,
        }

        let tests = vec![
            TestCase {
                // TC0: sizes are summed
                input: vec![
                    (1, BookLevel::new(dec!(100), dec!(1.5))),
                    (2, BookLevel::new(dec!(101), dec!(2.5))),
                ],
                expected: dec!(4.0),
            },
            TestCase {
                // TC1: empty input is zero
                input: vec![],
                expected: Decimal::ZERO,
            },
            TestCase {
                // TC2: zero sizes are summed as zero
                input: vec![
                    (1, BookLevel::new(dec!(100), dec!(0))),
                    (2, BookLevel::new(dec!(101), dec!(3))),
                ],
                expected: dec!(3),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = total_size(&test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_total_size_skips_unsized_entries() {
        let entries = vec![(1, Heartbeat), (2, Heartbeat)];
        assert_eq!(total_size(&entries), Decimal::ZERO);
    }

    #[test]
    fn test_compute_mid_price() {
        assert_eq!(compute_mid_price(dec!(100.0), dec!(101.0)), dec!(100.5));
        assert_eq!(Quote::new(dec!(99.98), dec!(100.02)).mid_price(), dec!(100.00));
        assert_eq!(dec!(42.5).mid_price(), dec!(42.5));
    }

    #[test]
    fn test_validate_l2_consistency() {
        assert!(validate_l2_consistency(1_700_000_000_000, 3, 1));
        assert!(validate_l2_consistency(1_700_000_000_000, 0, 0));
        assert!(validate_l2_consistency(1_700_000_000_000, 0, 2));
        assert!(!validate_l2_consistency(1_700_000_000_000, 2, 0));
        assert!(!validate_l2_consistency(1_700_000_000_000, 1, 2));
    }

    #[test]
    fn test_coalesce_trades_by_timestamp() {
        let trades = vec![
            PublicL3Trade::new(1_700_000_000_000, dec!(101.0), dec!(100), 1),
            PublicL3Trade::new(1_700_000_001_000, dec!(102.0), dec!(50), -1),
            PublicL3Trade::new(1_700_000_000, dec!(101.5), dec!(25), -1),
            PublicL3Trade::new(1_700_000_001_000_000, dec!(103.0), dec!(75), 1),
        ];

        let groups = coalesce_trades_by_timestamp(trades);

        assert_eq!(groups.len(), 2);
        let times = groups.keys().copied().collect::<Vec<_>>();
        assert_eq!(times, vec![1_700_000_000_000, 1_700_000_001_000]);

        let first = &groups[&1_700_000_000_000];
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].price, dec!(101.0));
        assert_eq!(first[1].price, dec!(101.5));

        let second = &groups[&1_700_000_001_000];
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].side(), Some(Side::Sell));
        assert_eq!(second[1].side(), Some(Side::Buy));
    }
}
