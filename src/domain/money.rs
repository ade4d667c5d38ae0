use crate::error::MarketError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

/// A non-negative monetary amount in the marketplace currency.
///
/// Wraps `rust_decimal::Decimal` so prices, shipping, fees and fines never go
/// through floating point. Deserializing a negative amount fails.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, MarketError> {
        if value >= Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(MarketError::ValidationError(
                "Amount must not be negative".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Rounds to whole cents, half away from zero.
    pub fn round_cents(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Subtraction that stops at zero.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        if self.0 > rhs.0 {
            Self(self.0 - rhs.0)
        } else {
            Self::ZERO
        }
    }

    /// Splits the amount into `parts` equal cent-precise shares.
    ///
    /// Shares are truncated to the cent and the leftover cents go to the first
    /// share, so the shares always sum back to the original amount.
    pub fn split_evenly(self, parts: usize) -> Vec<Money> {
        if parts == 0 {
            return Vec::new();
        }
        let base = (self.0 / Decimal::from(parts as u64))
            .round_dp_with_strategy(2, RoundingStrategy::ToZero);
        let remainder = self.0 - base * Decimal::from(parts as u64);

        let mut shares = vec![Money(base); parts];
        shares[0] = Money(base + remainder);
        shares
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MarketError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl From<u32> for Money {
    fn from(value: u32) -> Self {
        Self(Decimal::from(value))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

/// Scaling by a negative factor gives zero.
impl Mul<Decimal> for Money {
    type Output = Self;
    fn mul(self, rhs: Decimal) -> Self::Output {
        Self((self.0 * rhs).max(Decimal::ZERO))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}
