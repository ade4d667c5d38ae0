use super::money::Money;
use super::party::{ProductId, ShippingAddress, UserId};
use crate::error::MarketError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a vendor sub-order.
///
/// ```text
/// NEW_ORDER ─ship→ SENT ─receive→ RECEIVED ─(sweep)→ OVERDUE
///     │                               │                 │
///   reject                            └───send back─────┘
///     ↓                                        ↓
///  REJECTED                      SENT_BACK ─confirm→ RETURNED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    NewOrder,
    Sent,
    Received,
    Overdue,
    SentBack,
    Returned,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::NewOrder => "NEW_ORDER",
            OrderStatus::Sent => "SENT",
            OrderStatus::Received => "RECEIVED",
            OrderStatus::Overdue => "OVERDUE",
            OrderStatus::SentBack => "SENT_BACK",
            OrderStatus::Returned => "RETURNED",
            OrderStatus::Rejected => "REJECTED",
        }
    }

    /// No transition leaves these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Returned | OrderStatus::Rejected)
    }

    /// Whether the vendor has shipped this order at some point.
    pub fn is_fulfilled(&self) -> bool {
        matches!(
            self,
            OrderStatus::Sent
                | OrderStatus::Received
                | OrderStatus::Overdue
                | OrderStatus::SentBack
                | OrderStatus::Returned
        )
    }

    /// The transition table. Returns the target status when `role` may trigger
    /// `event` from `self`.
    pub fn next(self, event: EventKind, role: Role) -> Option<OrderStatus> {
        use EventKind as E;
        use OrderStatus as S;
        match (self, event, role) {
            (S::NewOrder, E::Reject, Role::Buyer | Role::Vendor) => Some(S::Rejected),
            (S::NewOrder, E::Ship, Role::Vendor) => Some(S::Sent),
            (S::Sent, E::Receive, Role::Buyer) => Some(S::Received),
            (S::Received, E::MarkOverdue, Role::System) => Some(S::Overdue),
            (S::Received | S::Overdue, E::SendBack, Role::Buyer) => Some(S::SentBack),
            (S::SentBack, E::ConfirmReturn, Role::Vendor) => Some(S::Returned),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is acting on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Vendor,
    /// Background processes such as the overdue sweep.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Reject,
    Ship,
    Receive,
    MarkOverdue,
    SendBack,
    ConfirmReturn,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Reject => "reject",
            EventKind::Ship => "ship",
            EventKind::Receive => "receive",
            EventKind::MarkOverdue => "mark overdue",
            EventKind::SendBack => "send back",
            EventKind::ConfirmReturn => "confirm the return of",
        };
        f.write_str(name)
    }
}

/// A state-machine input together with the data it attaches to the order.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Reject { reason: Option<String> },
    Ship { tracking_number: String },
    Receive,
    MarkOverdue,
    SendBack {
        tracking_number: String,
        fine: Option<Money>,
        fine_session: Option<String>,
    },
    ConfirmReturn,
}

impl OrderEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            OrderEvent::Reject { .. } => EventKind::Reject,
            OrderEvent::Ship { .. } => EventKind::Ship,
            OrderEvent::Receive => EventKind::Receive,
            OrderEvent::MarkOverdue => EventKind::MarkOverdue,
            OrderEvent::SendBack { .. } => EventKind::SendBack,
            OrderEvent::ConfirmReturn => EventKind::ConfirmReturn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub by: Role,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// How the payment authorization of a buyer order was finally settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "amount", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementOutcome {
    Captured(Money),
    PartiallyCaptured(Money),
    Released,
}

impl SettlementOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SettlementOutcome::Captured(_) => "CAPTURED",
            SettlementOutcome::PartiallyCaptured(_) => "PARTIAL_CAPTURE",
            SettlementOutcome::Released => "RELEASED",
        }
    }

    pub fn captured(&self) -> Money {
        match self {
            SettlementOutcome::Captured(m) | SettlementOutcome::PartiallyCaptured(m) => *m,
            SettlementOutcome::Released => Money::ZERO,
        }
    }
}

/// Where the vendor's payout for a received order stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    /// Owed since receipt; the transfer has not gone through yet.
    Pending,
    Transferred,
}

/// Aggregate root of one checkout: holds the single payment authorization and
/// owns the vendor sub-orders by number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyerOrder {
    pub id: Uuid,
    pub buyer: UserId,
    /// Sum of child prices plus shipping.
    pub price: Money,
    pub shipping: Money,
    pub payment_ref: String,
    pub order_numbers: Vec<u64>,
    pub paid: bool,
    pub settlement: Option<SettlementOutcome>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl BuyerOrder {
    pub fn is_settled(&self) -> bool {
        self.settlement.is_some()
    }
}

/// One vendor's share of a checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub number: u64,
    pub buyer_order_id: Uuid,
    pub vendor: UserId,
    pub buyer: UserId,
    pub status: OrderStatus,
    pub duration_days: u32,
    pub price: Money,
    pub shipping: Money,
    pub products: Vec<ProductId>,
    pub shipping_address: Option<ShippingAddress>,
    pub created_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub sent_back_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
    pub return_tracking_number: Option<String>,
    pub rejection: Option<Rejection>,
    pub fine: Option<Money>,
    pub fine_session: Option<String>,
    #[serde(default)]
    pub payout: Option<PayoutStatus>,
    pub version: u64,
}

impl Order {
    /// Price plus this order's share of shipping.
    pub fn gross(&self) -> Money {
        self.price + self.shipping
    }

    /// The party acting as `user` on this order, if any.
    pub fn role_of(&self, user: &UserId) -> Option<Role> {
        if &self.buyer == user {
            Some(Role::Buyer)
        } else if &self.vendor == user {
            Some(Role::Vendor)
        } else {
            None
        }
    }

    /// The other party of a buyer or vendor.
    pub fn counterparty(&self, role: Role) -> &UserId {
        match role {
            Role::Vendor => &self.buyer,
            Role::Buyer | Role::System => &self.vendor,
        }
    }

    /// When the rental period ends, once the buyer has received the items.
    ///
    /// `None` before receipt, and for a period reaching past the calendar
    /// range, which is never due.
    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.received_at?
            .checked_add_signed(Duration::days(i64::from(self.duration_days)))
    }

    /// Checks the transition table without mutating anything.
    pub fn ensure(&self, event: EventKind, role: Role) -> Result<OrderStatus, MarketError> {
        self.status
            .next(event, role)
            .ok_or(MarketError::InvalidTransition {
                from: self.status,
                event,
            })
    }

    /// Applies a state-machine event, stamping the fields tied to the new status.
    pub fn apply(
        &mut self,
        event: OrderEvent,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<OrderStatus, MarketError> {
        let next = self.ensure(event.kind(), role)?;
        match event {
            OrderEvent::Reject { reason } => {
                self.rejection = Some(Rejection {
                    by: role,
                    reason,
                    at: now,
                });
                self.closed_at = Some(now);
            }
            OrderEvent::Ship { tracking_number } => {
                self.tracking_number = Some(tracking_number);
                self.shipped_at = Some(now);
            }
            OrderEvent::Receive => {
                self.received_at = Some(now);
                self.payout = Some(PayoutStatus::Pending);
            }
            OrderEvent::MarkOverdue => {}
            OrderEvent::SendBack {
                tracking_number,
                fine,
                fine_session,
            } => {
                self.return_tracking_number = Some(tracking_number);
                self.sent_back_at = Some(now);
                self.fine = fine;
                self.fine_session = fine_session;
            }
            OrderEvent::ConfirmReturn => {
                self.closed_at = Some(now);
            }
        }
        self.status = next;
        Ok(next)
    }
}
