use crate::domain::notification::Notification;
use crate::domain::order::{BuyerOrder, Order, OrderStatus};
use crate::domain::party::{Cart, Product, ProductId, Review, User, UserId};
use crate::domain::ports::{
    CartStore, CatalogReader, ChangeSet, Checkout, Directory, IdentityReader, OrderStore,
};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const CF_USERS: &str = "users";
/// Keyed by `<subject>\0<review id>` so a subject's reviews share a prefix.
pub const CF_REVIEWS: &str = "reviews";
pub const CF_PRODUCTS: &str = "products";
pub const CF_CARTS: &str = "carts";
pub const CF_BUYER_ORDERS: &str = "buyer_orders";
/// Keyed by big-endian order number, so iteration follows creation order.
pub const CF_ORDERS: &str = "orders";
pub const CF_NOTIFICATIONS: &str = "notifications";
pub const CF_META: &str = "meta";

const COLUMN_FAMILIES: [&str; 8] = [
    CF_USERS,
    CF_REVIEWS,
    CF_PRODUCTS,
    CF_CARTS,
    CF_BUYER_ORDERS,
    CF_ORDERS,
    CF_NOTIFICATIONS,
    CF_META,
];

const ORDER_SEQUENCE_KEY: &[u8] = b"order_sequence";

/// A persistent marketplace store backed by RocksDB.
///
/// Each entity kind lives in its own column family, values are JSON. Checkout
/// and commit write through a single `WriteBatch`, and a store-wide write lock
/// keeps the version check and the batch write together.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating any missing
    /// column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| MarketError::internal(format!("{name} column family not found")))
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        batch.put_cf(self.cf(cf)?, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let mode = if prefix.is_empty() {
            IteratorMode::Start
        } else {
            IteratorMode::From(prefix, Direction::Forward)
        };
        let mut values = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn review_key(review: &Review) -> Vec<u8> {
        let mut key = Self::review_prefix(&review.subject);
        key.extend_from_slice(Uuid::now_v7().as_bytes());
        key
    }

    fn review_prefix(subject: &UserId) -> Vec<u8> {
        let mut key = subject.as_str().as_bytes().to_vec();
        key.push(0);
        key
    }

    fn write_single<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, cf, key, value)?;
        self.db.write(batch)?;
        Ok(())
    }

    fn stage_notifications(
        &self,
        batch: &mut WriteBatch,
        notifications: &[Notification],
    ) -> Result<()> {
        for notification in notifications {
            self.put_json(batch, CF_NOTIFICATIONS, notification.id.as_bytes(), notification)?;
        }
        Ok(())
    }

    /// Notification records written so far, oldest first.
    pub fn notifications(&self) -> Result<Vec<Notification>> {
        self.scan(CF_NOTIFICATIONS, &[])
    }
}

#[async_trait]
impl CatalogReader for RocksDBStore {
    async fn product(&self, id: &ProductId) -> Result<Option<Product>> {
        self.get_json(CF_PRODUCTS, id.as_str().as_bytes())
    }
}

#[async_trait]
impl IdentityReader for RocksDBStore {
    async fn user(&self, id: &UserId) -> Result<Option<User>> {
        self.get_json(CF_USERS, id.as_str().as_bytes())
    }

    async fn reviews_received(&self, id: &UserId) -> Result<Vec<Review>> {
        self.scan(CF_REVIEWS, &Self::review_prefix(id))
    }
}

#[async_trait]
impl Directory for RocksDBStore {
    async fn put_user(&self, user: User) -> Result<()> {
        self.write_single(CF_USERS, user.id.as_str().as_bytes(), &user)
    }

    async fn put_product(&self, product: Product) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_single(CF_PRODUCTS, product.id.as_str().as_bytes(), &product)
    }

    async fn add_review(&self, review: Review) -> Result<()> {
        self.write_single(CF_REVIEWS, &Self::review_key(&review), &review)
    }
}

#[async_trait]
impl CartStore for RocksDBStore {
    async fn cart(&self, buyer: &UserId) -> Result<Cart> {
        Ok(self
            .get_json(CF_CARTS, buyer.as_str().as_bytes())?
            .unwrap_or_else(|| Cart::empty(buyer.clone())))
    }

    async fn put_cart(&self, cart: Cart) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_single(CF_CARTS, cart.buyer.as_str().as_bytes(), &cart)
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn next_order_number(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let last: u64 = self.get_json(CF_META, ORDER_SEQUENCE_KEY)?.unwrap_or(0);
        let next = last + 1;
        self.write_single(CF_META, ORDER_SEQUENCE_KEY, &next)?;
        Ok(next)
    }

    async fn create_checkout(&self, checkout: Checkout) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();

        for id in &checkout.consumed {
            let mut product: Product = self
                .get_json(CF_PRODUCTS, id.as_str().as_bytes())?
                .ok_or_else(|| MarketError::ProductNotFound(id.to_string()))?;
            if !product.available {
                return Err(MarketError::conflict(format!(
                    "product {id} is no longer available"
                )));
            }
            product.available = false;
            self.put_json(&mut batch, CF_PRODUCTS, id.as_str().as_bytes(), &product)?;
        }

        let buyer = &checkout.buyer_order.buyer;
        self.put_json(
            &mut batch,
            CF_CARTS,
            buyer.as_str().as_bytes(),
            &Cart::empty(buyer.clone()),
        )?;
        for order in &checkout.orders {
            self.put_json(&mut batch, CF_ORDERS, &order.number.to_be_bytes(), order)?;
        }
        self.put_json(
            &mut batch,
            CF_BUYER_ORDERS,
            checkout.buyer_order.id.as_bytes(),
            &checkout.buyer_order,
        )?;
        self.stage_notifications(&mut batch, &checkout.notifications)?;

        self.db.write(batch)?;
        Ok(())
    }

    async fn buyer_order(&self, id: Uuid) -> Result<Option<BuyerOrder>> {
        self.get_json(CF_BUYER_ORDERS, id.as_bytes())
    }

    async fn order(&self, number: u64) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, &number.to_be_bytes())
    }

    async fn siblings(&self, buyer_order_id: Uuid) -> Result<Vec<Order>> {
        let Some(parent) = self.buyer_order(buyer_order_id).await? else {
            return Ok(Vec::new());
        };
        let mut orders = Vec::with_capacity(parent.order_numbers.len());
        for number in parent.order_numbers {
            if let Some(order) = self.order(number).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    async fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        Ok(self
            .all_orders()
            .await?
            .into_iter()
            .filter(|o| o.status == status)
            .collect())
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        self.scan(CF_ORDERS, &[])
    }

    async fn all_buyer_orders(&self) -> Result<Vec<BuyerOrder>> {
        let mut all: Vec<BuyerOrder> = self.scan(CF_BUYER_ORDERS, &[])?;
        all.sort_by_key(|b| b.created_at);
        Ok(all)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();

        for order in &changes.orders {
            let key = order.number.to_be_bytes();
            let stored: Order = self
                .get_json(CF_ORDERS, &key)?
                .ok_or(MarketError::OrderNotFound(order.number))?;
            if stored.version != order.version {
                return Err(MarketError::conflict(format!(
                    "order {} was modified concurrently",
                    order.number
                )));
            }
            let mut next = order.clone();
            next.version += 1;
            self.put_json(&mut batch, CF_ORDERS, &key, &next)?;
        }

        if let Some(parent) = &changes.buyer_order {
            let stored: BuyerOrder = self
                .get_json(CF_BUYER_ORDERS, parent.id.as_bytes())?
                .ok_or_else(|| {
                    MarketError::internal(format!("buyer order {} is missing", parent.id))
                })?;
            if stored.version != parent.version {
                return Err(MarketError::conflict(format!(
                    "buyer order {} was modified concurrently",
                    parent.id
                )));
            }
            let mut next = parent.clone();
            next.version += 1;
            self.put_json(&mut batch, CF_BUYER_ORDERS, parent.id.as_bytes(), &next)?;
        }

        for id in &changes.restock {
            if let Some(mut product) =
                self.get_json::<Product>(CF_PRODUCTS, id.as_str().as_bytes())?
            {
                product.available = true;
                self.put_json(&mut batch, CF_PRODUCTS, id.as_str().as_bytes(), &product)?;
            }
        }
        self.stage_notifications(&mut batch, &changes.notifications)?;

        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::order::tests::sample_order;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");
        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_rocksdb_reviews_are_scoped_to_subject() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        for (subject, rating) in [("b1", 5), ("b1", 4), ("b10", 1)] {
            store
                .add_review(Review {
                    reviewer: UserId::from("v1"),
                    subject: UserId::from(subject),
                    rating,
                })
                .await
                .unwrap();
        }
        let reviews = store.reviews_received(&UserId::from("b1")).await.unwrap();
        assert_eq!(reviews.len(), 2);
        assert!(reviews.iter().all(|r| r.subject == UserId::from("b1")));
    }

    #[tokio::test]
    async fn test_rocksdb_checkout_and_versioned_commit() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        store
            .put_product(Product {
                id: ProductId::from("p1"),
                vendor: UserId::from("v1"),
                name: "Tent".into(),
                price: Money::from(50),
                available: true,
            })
            .await
            .unwrap();

        let order = sample_order(OrderStatus::NewOrder);
        let parent = BuyerOrder {
            id: order.buyer_order_id,
            buyer: order.buyer.clone(),
            price: order.gross(),
            shipping: order.shipping,
            payment_ref: "pi_1".into(),
            order_numbers: vec![order.number],
            paid: false,
            settlement: None,
            created_at: order.created_at,
            version: 0,
        };
        store
            .create_checkout(Checkout {
                buyer_order: parent,
                orders: vec![order.clone()],
                consumed: vec![ProductId::from("p1")],
                notifications: Vec::new(),
            })
            .await
            .unwrap();

        let p1 = store.product(&ProductId::from("p1")).await.unwrap().unwrap();
        assert!(!p1.available);
        assert_eq!(store.siblings(order.buyer_order_id).await.unwrap().len(), 1);

        let mut sent = store.order(order.number).await.unwrap().unwrap();
        let stale = sent.clone();
        sent.status = OrderStatus::Sent;
        store
            .commit(ChangeSet {
                orders: vec![sent],
                ..Default::default()
            })
            .await
            .unwrap();

        let err = store
            .commit(ChangeSet {
                orders: vec![stale],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
        assert_eq!(
            store.orders_with_status(OrderStatus::Sent).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_rocksdb_order_sequence_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            assert_eq!(store.next_order_number().await.unwrap(), 1);
            assert_eq!(store.next_order_number().await.unwrap(), 2);
        }
        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(store.next_order_number().await.unwrap(), 3);
    }
}
