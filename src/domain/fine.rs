use super::money::Money;
use super::order::Order;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whole days elapsed past `due`, never negative.
pub fn overdue_days(due: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let days = (now - due).num_days();
    u32::try_from(days.max(0)).unwrap_or(u32::MAX)
}

/// Whether a received order is past its rental period.
pub fn is_overdue(order: &Order, now: DateTime<Utc>) -> bool {
    order.due_date().is_some_and(|due| now > due)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineQuote {
    pub due_date: DateTime<Utc>,
    pub overdue_days: u32,
    pub amount: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinePolicy {
    pub daily_rate: Money,
}

impl FinePolicy {
    pub fn new(daily_rate: Money) -> Self {
        Self { daily_rate }
    }

    pub fn fine_for(&self, overdue_days: u32) -> Money {
        self.daily_rate * Decimal::from(overdue_days)
    }

    /// Fine owed on `order` at `now`; `None` until the order has been received.
    pub fn quote(&self, order: &Order, now: DateTime<Utc>) -> Option<FineQuote> {
        let due_date = order.due_date()?;
        let overdue_days = overdue_days(due_date, now);
        Some(FineQuote {
            due_date,
            overdue_days,
            amount: self.fine_for(overdue_days),
        })
    }
}
