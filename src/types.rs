// 1.0: primitives. IDs, prices, quote amounts, basis points, timestamps.
// each is a newtype so the compiler catches unit mixups. quantities stay
// raw Decimal: contracts are unitless counts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Trader identity. Accounts are keyed by this and never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraderId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

// Long = profit when the index rises. Short = the opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    pub fn of_taker(is_buy: bool) -> Self {
        if is_buy {
            Side::Long
        } else {
            Side::Short
        }
    }
}

// 1.1: price in quote units per contract at contract_size 1. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value > Decimal::ZERO);
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.2: quote currency amount. collateral, margin, pnl, fees, rewards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quote(Decimal);

impl Quote {
    pub const ZERO: Quote = Quote(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Clamp a transient signed value to the reportable domain.
    pub fn floor_zero(&self) -> Self {
        Self(self.0.max(Decimal::ZERO))
    }

    pub fn min(self, other: Quote) -> Self {
        Self(self.0.min(other.0))
    }
}

impl Add for Quote {
    type Output = Quote;
    fn add(self, rhs: Quote) -> Quote {
        Quote(self.0 + rhs.0)
    }
}

impl Sub for Quote {
    type Output = Quote;
    fn sub(self, rhs: Quote) -> Quote {
        Quote(self.0 - rhs.0)
    }
}

impl AddAssign for Quote {
    fn add_assign(&mut self, rhs: Quote) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Quote {
    fn sub_assign(&mut self, rhs: Quote) {
        self.0 -= rhs.0;
    }
}

impl Neg for Quote {
    type Output = Quote;
    fn neg(self) -> Quote {
        Quote(-self.0)
    }
}

impl Sum for Quote {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Quote::ZERO, |acc, q| acc + q)
    }
}

impl<'a> Sum<&'a Quote> for Quote {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Quote::ZERO, |acc, q| acc + *q)
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.3: basis points. 100 bps = 1%. every rate parameter uses these.
pub const BPS_DENOM: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Bps(pub u32);

impl Bps {
    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(BPS_DENOM)
    }

    /// `amount * bps / 10_000`.
    pub fn of(&self, amount: Decimal) -> Decimal {
        amount * Decimal::from(self.0) / Decimal::from(BPS_DENOM)
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

// 1.4: millisecond timestamp. the engine runs on injected time, never wall
// clock; Timestamp::now() exists for the sim binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// One-minute bucket index, for mark-sample dedup.
    pub fn minute_bucket(&self) -> i64 {
        self.0.div_euclid(60_000)
    }

    pub fn saturating_sub_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs as i64 * 1000))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
