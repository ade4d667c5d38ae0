use super::{Marketplace, Ports};
use crate::config::Settings;
use crate::domain::money::Money;
use crate::domain::party::{Product, ProductId, Review, User, UserId};
use crate::domain::ports::{Clock, Directory};
use crate::infrastructure::clock::ManualClock;
use crate::infrastructure::in_memory::InMemoryMarketStore;
use crate::infrastructure::recording::{
    InMemoryMailer, InMemoryNotificationSink, InMemoryPaymentGateway,
};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// An engine over in-memory adapters with the clock pinned to
/// 2026-01-01 09:00 UTC.
pub(crate) struct Fixture {
    pub store: InMemoryMarketStore,
    pub gateway: InMemoryPaymentGateway,
    pub sink: InMemoryNotificationSink,
    pub mailer: InMemoryMailer,
    pub clock: ManualClock,
    pub market: Marketplace,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = InMemoryMarketStore::new();
        let gateway = InMemoryPaymentGateway::new();
        let sink = InMemoryNotificationSink::new();
        let mailer = InMemoryMailer::new();
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap());

        let ports = Ports::with_store(
            store.clone(),
            Arc::new(gateway.clone()),
            Arc::new(sink.clone()),
            Arc::new(mailer.clone()),
            Arc::new(clock.clone()),
        );
        let market = Marketplace::new(ports, &Settings::default());

        Self {
            store,
            gateway,
            sink,
            mailer,
            clock,
            market,
        }
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn vendor(&self, id: &str) {
        let mut user = User::new(id, format!("{id}@mail.test"));
        user.payout_account = Some(format!("acct_{id}"));
        self.store.put_user(user).await.unwrap();
    }

    pub async fn buyer(&self, id: &str, completed_orders: u32) {
        let mut user = User::new(id, format!("{id}@mail.test"));
        user.completed_orders = completed_orders;
        self.store.put_user(user).await.unwrap();
    }

    pub async fn review(&self, reviewer: &str, subject: &str, rating: u8) {
        self.store
            .add_review(Review {
                reviewer: UserId::from(reviewer),
                subject: UserId::from(subject),
                rating,
            })
            .await
            .unwrap();
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

    pub async fn remove_user(&self, id: &str) {
        self.store.remove_user(&UserId::from(id)).await;
    }
}
