use super::order::{Order, OrderStatus};
use super::party::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    OrderRejected,
    OrderShipped,
    OrderReceived,
    OrderSentBack,
    OrderReturned,
}

/// In-app notification record. Written together with the state change that
/// caused it and handed to the notification sink afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: UserId,
    pub kind: NotificationKind,
    pub order_number: Option<u64>,
    pub shipping_status: Option<OrderStatus>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn for_order(
        recipient: &UserId,
        kind: NotificationKind,
        order: &Order,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            recipient: recipient.clone(),
            kind,
            order_number: Some(order.number),
            shipping_status: Some(order.status),
            created_at: now,
        }
    }
}

/// Email templates for shipping events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailTemplate {
    OrderShipped,
    OrderSentBack,
    OrderReturned,
}

/// An email waiting to be handed to the mail sender.
#[derive(Debug, Clone, PartialEq)]
pub struct Mail {
    pub to: String,
    pub template: MailTemplate,
    pub context: serde_json::Value,
}
