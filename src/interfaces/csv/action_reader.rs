use crate::domain::money::Money;
use crate::domain::party::{ProductId, UserId};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Vendor,
    Buyer,
    Review,
    Product,
    Cart,
    Checkout,
    Ship,
    Reject,
    Receive,
    SendBack,
    Return,
    Payout,
    Sweep,
}

/// One raw row of an action log.
///
/// Columns are shared by every action; which ones an action reads is
/// documented on [`Action`].
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRecord {
    pub action: ActionKind,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// `actor` id, `target` email, `reference` payout account.
    Vendor {
        id: UserId,
        email: String,
        payout_account: Option<String>,
    },
    /// `actor` id, `target` email, `quantity` completed orders.
    Buyer {
        id: UserId,
        email: String,
        completed_orders: u32,
    },
    /// `actor` reviewer, `target` subject, `amount` rating.
    Review {
        reviewer: UserId,
        subject: UserId,
        rating: u8,
    },
    /// `actor` vendor, `target` product id, `amount` price, `reference` name.
    Product {
        vendor: UserId,
        id: ProductId,
        price: Money,
        name: String,
    },
    /// `actor` buyer, `target` product, `quantity` rental days.
    Cart {
        buyer: UserId,
        product: ProductId,
        days: u32,
    },
    /// `actor` buyer, `amount` shipping total.
    Checkout { buyer: UserId, shipping: Money },
    /// `actor` vendor, `target` order number, `reference` tracking number.
    Ship {
        vendor: UserId,
        order: u64,
        tracking_number: String,
    },
    /// `actor` buyer or vendor, `target` order number, `reference` reason.
    Reject {
        actor: UserId,
        order: u64,
        reason: Option<String>,
    },
    Receive { buyer: UserId, order: u64 },
    /// `actor` buyer, `target` order number, `reference` tracking number.
    SendBack {
        buyer: UserId,
        order: u64,
        tracking_number: String,
    },
    Return { vendor: UserId, order: u64 },
    /// `actor` vendor, `target` order number. Retries an owed payout.
    Payout { vendor: UserId, order: u64 },
    Sweep,
}

/// An action and the instant it happened at, if the log pins one.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedAction {
    pub at: Option<DateTime<Utc>>,
    pub action: Action,
}

fn required<T>(value: Option<T>, action: ActionKind, column: &str) -> Result<T> {
    value.ok_or_else(|| {
        MarketError::ValidationError(format!("{action:?} requires the {column} column"))
    })
}

impl ActionRecord {
    fn actor(&self) -> Result<UserId> {
        required(self.actor.as_deref(), self.action, "actor").map(UserId::from)
    }

    fn target(&self) -> Result<&str> {
        required(self.target.as_deref(), self.action, "target")
    }

    fn order(&self) -> Result<u64> {
        let target = self.target()?;
        target.parse().map_err(|_| {
            MarketError::ValidationError(format!("{target} is not an order number"))
        })
    }

    fn money(&self) -> Result<Money> {
        Money::new(required(self.amount, self.action, "amount")?)
    }

    fn reference(&self) -> Result<String> {
        required(self.reference.clone(), self.action, "reference")
    }
}

impl TryFrom<ActionRecord> for TimedAction {
    type Error = MarketError;

    fn try_from(record: ActionRecord) -> Result<Self> {
        let action = match record.action {
            ActionKind::Vendor => Action::Vendor {
                id: record.actor()?,
                email: record.target()?.to_string(),
                payout_account: record.reference.clone(),
            },
            ActionKind::Buyer => Action::Buyer {
                id: record.actor()?,
                email: record.target()?.to_string(),
                completed_orders: record.quantity.unwrap_or(0),
            },
            ActionKind::Review => {
                let raw = required(record.amount, record.action, "amount")?;
                let rating = Some(raw)
                    .filter(|r| r.fract().is_zero())
                    .and_then(|r| r.to_u8())
                    .filter(|r| (1..=5).contains(r))
                    .ok_or_else(|| {
                        MarketError::ValidationError(format!(
                            "rating must be a whole number from 1 to 5, got {raw}"
                        ))
                    })?;
                Action::Review {
                    reviewer: record.actor()?,
                    subject: UserId::from(record.target()?),
                    rating,
                }
            }
            ActionKind::Product => Action::Product {
                vendor: record.actor()?,
                id: ProductId::from(record.target()?),
                price: record.money()?,
                name: record
                    .reference
                    .clone()
                    .unwrap_or_else(|| record.target.clone().unwrap_or_default()),
            },
            ActionKind::Cart => Action::Cart {
                buyer: record.actor()?,
                product: ProductId::from(record.target()?),
                days: required(record.quantity, record.action, "quantity")?,
            },
            ActionKind::Checkout => Action::Checkout {
                buyer: record.actor()?,
                shipping: record.amount.map(Money::new).transpose()?.unwrap_or(Money::ZERO),
            },
            ActionKind::Ship => Action::Ship {
                vendor: record.actor()?,
                order: record.order()?,
                tracking_number: record.reference()?,
            },
            ActionKind::Reject => Action::Reject {
                actor: record.actor()?,
                order: record.order()?,
                reason: record.reference.clone(),
            },
            ActionKind::Receive => Action::Receive {
                buyer: record.actor()?,
                order: record.order()?,
            },
            ActionKind::SendBack => Action::SendBack {
                buyer: record.actor()?,
                order: record.order()?,
                tracking_number: record.reference()?,
            },
            ActionKind::Return => Action::Return {
                vendor: record.actor()?,
                order: record.order()?,
            },
            ActionKind::Payout => Action::Payout {
                vendor: record.actor()?,
                order: record.order()?,
            },
            ActionKind::Sweep => Action::Sweep,
        };
        Ok(TimedAction {
            at: record.at,
            action,
        })
    }
}

/// Reads marketplace actions from a CSV source.
///
/// Header: `action,actor,target,amount,quantity,reference,at`. Whitespace is
/// trimmed and short rows are accepted, missing columns read as empty.
pub struct ActionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ActionReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes and validates each row.
    pub fn actions(self) -> impl Iterator<Item = Result<TimedAction>> {
        self.reader.into_deserialize().map(|result| {
            let record: ActionRecord = result.map_err(MarketError::from)?;
            TimedAction::try_from(record)
        })
    }
}
