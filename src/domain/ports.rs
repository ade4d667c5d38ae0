use super::money::Money;
use super::notification::{MailTemplate, Notification};
use super::order::{BuyerOrder, Order, OrderStatus};
use super::party::{Cart, Product, ProductId, Review, User, UserId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Read-only view of the product catalog.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn product(&self, id: &ProductId) -> Result<Option<Product>>;
}

/// Read-only view of user profiles and the reviews they received.
#[async_trait]
pub trait IdentityReader: Send + Sync {
    async fn user(&self, id: &UserId) -> Result<Option<User>>;
    async fn reviews_received(&self, id: &UserId) -> Result<Vec<Review>>;
}

/// Writes owned by the identity and catalog services, used to seed data.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn put_user(&self, user: User) -> Result<()>;
    async fn put_product(&self, product: Product) -> Result<()>;
    async fn add_review(&self, review: Review) -> Result<()>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    /// The buyer's cart, empty if none was saved yet.
    async fn cart(&self, buyer: &UserId) -> Result<Cart>;
    async fn put_cart(&self, cart: Cart) -> Result<()>;
}

/// Everything a checkout persists, applied as one atomic unit.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub buyer_order: BuyerOrder,
    pub orders: Vec<Order>,
    /// Products flipped to unavailable.
    pub consumed: Vec<ProductId>,
    pub notifications: Vec<Notification>,
}

/// Changes applied atomically by [`OrderStore::commit`].
///
/// Orders and the buyer order carry the `version` they were read at. The
/// commit fails with a conflict if any of them changed in the meantime.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub orders: Vec<Order>,
    pub buyer_order: Option<BuyerOrder>,
    /// Products made available again.
    pub restock: Vec<ProductId>,
    pub notifications: Vec<Notification>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn next_order_number(&self) -> Result<u64>;
    /// Persists a checkout and empties the buyer's cart. Fails with a conflict,
    /// writing nothing, if a consumed product is no longer available.
    async fn create_checkout(&self, checkout: Checkout) -> Result<()>;
    async fn buyer_order(&self, id: Uuid) -> Result<Option<BuyerOrder>>;
    async fn order(&self, number: u64) -> Result<Option<Order>>;
    /// Children of a buyer order, in creation order.
    async fn siblings(&self, buyer_order_id: Uuid) -> Result<Vec<Order>>;
    async fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<Order>>;
    async fn all_orders(&self) -> Result<Vec<Order>>;
    async fn all_buyer_orders(&self) -> Result<Vec<BuyerOrder>>;
    async fn commit(&self, changes: ChangeSet) -> Result<()>;
}

/// Hosted checkout created to collect an overdue fine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Places a hold for `amount` and returns the payment reference.
    async fn authorize(&self, amount: Money) -> Result<String>;
    async fn capture(&self, payment_ref: &str, amount: Money) -> Result<()>;
    async fn release(&self, payment_ref: &str) -> Result<()>;

    /// Moves `amount` of a captured payment to the vendor.
    ///
    /// A repeated `idempotency_key` must not move money again.
    async fn transfer_to_vendor(
        &self,
        idempotency_key: &str,
        vendor_account: &str,
        payment_ref: &str,
        amount: Money,
        platform_fee: Money,
    ) -> Result<()>;

    /// A repeated `idempotency_key` returns the session created the first time.
    async fn create_overdue_charge(
        &self,
        idempotency_key: &str,
        buyer: &UserId,
        vendor_account: &str,
        order_id: Uuid,
        amount: Money,
    ) -> Result<CheckoutSession>;
}

/// Fire-and-forget delivery of in-app notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

#[async_trait]
pub trait MailSender: Send + Sync {
    /// Returns `false` when the mail could not be handed off.
    async fn send(&self, to: &str, template: MailTemplate, context: serde_json::Value) -> bool;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type CatalogReaderRef = Arc<dyn CatalogReader>;
pub type IdentityReaderRef = Arc<dyn IdentityReader>;
pub type DirectoryRef = Arc<dyn Directory>;
pub type CartStoreRef = Arc<dyn CartStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
pub type MailSenderRef = Arc<dyn MailSender>;
pub type ClockRef = Arc<dyn Clock>;
