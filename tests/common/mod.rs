#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rentmesh::application::{Marketplace, Ports};
use rentmesh::config::Settings;
use rentmesh::domain::money::Money;
use rentmesh::domain::order::{BuyerOrder, Order, OrderStatus};
use rentmesh::domain::party::{Product, ProductId, User, UserId};
use rentmesh::domain::ports::{ChangeSet, Checkout, Directory, OrderStore, OrderStoreRef};
use rentmesh::error::{MarketError, Result};
use rentmesh::infrastructure::clock::ManualClock;
use rentmesh::infrastructure::in_memory::InMemoryMarketStore;
use rentmesh::infrastructure::recording::{
    InMemoryMailer, InMemoryNotificationSink, InMemoryPaymentGateway,
};
use std::io::{Error, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::NamedTempFile;
use uuid::Uuid;

pub const LOG_HEADER: &str = "action,actor,target,amount,quantity,reference,at";

/// A marketplace over in-memory adapters, clock pinned to 2026-01-01 09:00 UTC.
pub struct Harness {
    pub store: InMemoryMarketStore,
    pub gateway: InMemoryPaymentGateway,
    pub sink: InMemoryNotificationSink,
    pub mailer: InMemoryMailer,
    pub clock: ManualClock,
    pub market: Arc<Marketplace>,
}

impl Harness {
    pub fn new() -> Self {
        let store = InMemoryMarketStore::new();
        Self::with_orders(store.clone(), Arc::new(store))
    }

    /// Same as [`Harness::new`] but with `orders` standing in for the order port.
    pub fn with_orders(store: InMemoryMarketStore, orders: OrderStoreRef) -> Self {
        let gateway = InMemoryPaymentGateway::new();
        let sink = InMemoryNotificationSink::new();
        let mailer = InMemoryMailer::new();
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap());

        let mut ports = Ports::with_store(
            store.clone(),
            Arc::new(gateway.clone()),
            Arc::new(sink.clone()),
            Arc::new(mailer.clone()),
            Arc::new(clock.clone()),
        );
        ports.orders = orders;
        let market = Arc::new(Marketplace::new(ports, &Settings::default()));

        Self {
            store,
            gateway,
            sink,
            mailer,
            clock,
            market,
        }
    }

    pub async fn vendor(&self, id: &str) {
        let mut user = User::new(id, format!("{id}@mail.test"));
        user.payout_account = Some(format!("acct_{id}"));
        self.store.put_user(user).await.unwrap();
    }

    pub async fn buyer(&self, id: &str) {
        let user = User::new(id, format!("{id}@mail.test"));
        self.store.put_user(user).await.unwrap();
    }

    pub async fn product(&self, id: &str, vendor: &str, price: u32) {
        self.store
            .put_product(Product {
                id: ProductId::from(id),
                vendor: UserId::from(vendor),
                name: id.to_uppercase(),
                price: Money::from(price),
                available: true,
            })
            .await
            .unwrap();
    }

    pub async fn add(&self, buyer: &str, product: &str, days: u32) {
        self.market
            .carts
            .add_to_cart(&UserId::from(buyer), &ProductId::from(product), days)
            .await
            .unwrap();
    }

    /// Checks `buyer` out with `shipping` and returns the order numbers created.
    pub async fn checkout(&self, buyer: &str, shipping: u32) -> Vec<u64> {
        self.market
            .checkout
            .checkout(&UserId::from(buyer), Money::from(shipping))
            .await
            .unwrap()
            .order_numbers
    }

    /// One vendor, one buyer, one single-vendor checkout shipped and received.
    /// Returns the order number.
    pub async fn received_rental(&self, vendor: &str, buyer: &str, product: &str) -> u64 {
        self.vendor(vendor).await;
        self.buyer(buyer).await;
        self.product(product, vendor, 50).await;
        self.add(buyer, product, 7).await;
        let number = self.checkout(buyer, 10).await[0];

        let lifecycle = &self.market.lifecycle;
        lifecycle
            .ship(&UserId::from(vendor), number, "TRK-1")
            .await
            .unwrap();
        lifecycle.receive(&UserId::from(buyer), number).await.unwrap();
        number
    }
}

type OrderFilter = Box<dyn Fn(&Order) -> bool + Send + Sync>;

/// Order store whose commits fail when they write an order matching `fails`.
pub struct FlakyOrders {
    inner: InMemoryMarketStore,
    fails: OrderFilter,
    remaining: AtomicUsize,
}

impl FlakyOrders {
    pub fn always(
        inner: InMemoryMarketStore,
        fails: impl Fn(&Order) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::times(inner, usize::MAX, fails)
    }

    /// Fails the first `times` matching commits, then lets them through.
    pub fn times(
        inner: InMemoryMarketStore,
        times: usize,
        fails: impl Fn(&Order) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            fails: Box::new(fails),
            remaining: AtomicUsize::new(times),
        }
    }

    /// Matches writes moving order `number` to `status`.
    pub fn moving_to(number: u64, status: OrderStatus) -> impl Fn(&Order) -> bool {
        move |o: &Order| o.number == number && o.status == status
    }
}

#[async_trait]
impl OrderStore for FlakyOrders {
    async fn next_order_number(&self) -> Result<u64> {
        self.inner.next_order_number().await
    }

    async fn create_checkout(&self, checkout: Checkout) -> Result<()> {
        self.inner.create_checkout(checkout).await
    }

    async fn buyer_order(&self, id: Uuid) -> Result<Option<BuyerOrder>> {
        self.inner.buyer_order(id).await
    }

    async fn order(&self, number: u64) -> Result<Option<Order>> {
        self.inner.order(number).await
    }

    async fn siblings(&self, buyer_order_id: Uuid) -> Result<Vec<Order>> {
        self.inner.siblings(buyer_order_id).await
    }

    async fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        self.inner.orders_with_status(status).await
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        self.inner.all_orders().await
    }

    async fn all_buyer_orders(&self) -> Result<Vec<BuyerOrder>> {
        self.inner.all_buyer_orders().await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        if changes.orders.iter().any(|o| (self.fails)(o))
            && self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(MarketError::ServiceUnavailable("disk full".into()));
        }
        self.inner.commit(changes).await
    }
}

/// Writes an action log with the standard header to a temp file.
pub fn write_log(rows: &[&str]) -> std::result::Result<NamedTempFile, Error> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "{LOG_HEADER}")?;
    for row in rows {
        writeln!(file, "{row}")?;
    }
    file.flush()?;
    Ok(file)
}

/// Rows seeding two vendors, a buyer and one product each.
pub fn seed_rows() -> Vec<&'static str> {
    vec![
        "vendor,v1,v1@mail.test,,,acct_v1,",
        "vendor,v2,v2@mail.test,,,acct_v2,",
        "buyer,b1,b1@mail.test,,0,,",
        "product,v1,a,50,,Tent,",
        "product,v2,b,30,,Stove,",
    ]
}
