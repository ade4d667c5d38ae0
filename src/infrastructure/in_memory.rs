use crate::domain::notification::Notification;
use crate::domain::order::{BuyerOrder, Order, OrderStatus};
use crate::domain::party::{Cart, Product, ProductId, Review, User, UserId};
use crate::domain::ports::{
    CartStore, CatalogReader, ChangeSet, Checkout, Directory, IdentityReader, OrderStore,
};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MarketState {
    users: HashMap<UserId, User>,
    reviews: Vec<Review>,
    products: HashMap<ProductId, Product>,
    carts: HashMap<UserId, Cart>,
    buyer_orders: HashMap<Uuid, BuyerOrder>,
    orders: BTreeMap<u64, Order>,
    notifications: Vec<Notification>,
    last_order_number: u64,
}

impl MarketState {
    fn check_version(&self, order: &Order) -> Result<()> {
        match self.orders.get(&order.number) {
            Some(stored) if stored.version == order.version => Ok(()),
            Some(_) => Err(MarketError::conflict(format!(
                "order {} was modified concurrently",
                order.number
            ))),
            None => Err(MarketError::OrderNotFound(order.number)),
        }
    }

    fn check_buyer_order_version(&self, buyer_order: &BuyerOrder) -> Result<()> {
        match self.buyer_orders.get(&buyer_order.id) {
            Some(stored) if stored.version == buyer_order.version => Ok(()),
            Some(_) => Err(MarketError::conflict(format!(
                "buyer order {} was modified concurrently",
                buyer_order.id
            ))),
            None => Err(MarketError::internal(format!(
                "buyer order {} is missing",
                buyer_order.id
            ))),
        }
    }
}

/// A thread-safe in-memory marketplace store.
///
/// One `Arc<RwLock<..>>` backs every store port, so a checkout or a commit is
/// applied under a single write lock and is never observed half-done.
/// Ideal for testing or single-process runs where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryMarketStore {
    state: Arc<RwLock<MarketState>>,
}

impl InMemoryMarketStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notification records written so far, oldest first.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.notifications.clone()
    }

    /// Drops a user profile, as the identity service does on account deletion.
    pub async fn remove_user(&self, id: &UserId) -> Option<User> {
        self.state.write().await.users.remove(id)
    }
}

#[async_trait]
impl CatalogReader for InMemoryMarketStore {
    async fn product(&self, id: &ProductId) -> Result<Option<Product>> {
        let state = self.state.read().await;
        Ok(state.products.get(id).cloned())
    }
}

#[async_trait]
impl IdentityReader for InMemoryMarketStore {
    async fn user(&self, id: &UserId) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(id).cloned())
    }

    async fn reviews_received(&self, id: &UserId) -> Result<Vec<Review>> {
        let state = self.state.read().await;
        Ok(state
            .reviews
            .iter()
            .filter(|r| &r.subject == id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Directory for InMemoryMarketStore {
    async fn put_user(&self, user: User) -> Result<()> {
        let mut state = self.state.write().await;
        state.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn put_product(&self, product: Product) -> Result<()> {
        let mut state = self.state.write().await;
        state.products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn add_review(&self, review: Review) -> Result<()> {
        let mut state = self.state.write().await;
        state.reviews.push(review);
        Ok(())
    }
}

#[async_trait]
impl CartStore for InMemoryMarketStore {
    async fn cart(&self, buyer: &UserId) -> Result<Cart> {
        let state = self.state.read().await;
        Ok(state
            .carts
            .get(buyer)
            .cloned()
            .unwrap_or_else(|| Cart::empty(buyer.clone())))
    }

    async fn put_cart(&self, cart: Cart) -> Result<()> {
        let mut state = self.state.write().await;
        state.carts.insert(cart.buyer.clone(), cart);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryMarketStore {
    async fn next_order_number(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        state.last_order_number += 1;
        Ok(state.last_order_number)
    }

    async fn create_checkout(&self, checkout: Checkout) -> Result<()> {
        let mut state = self.state.write().await;

        for id in &checkout.consumed {
            match state.products.get(id) {
                Some(p) if p.available => {}
                Some(_) => {
                    return Err(MarketError::conflict(format!(
                        "product {id} is no longer available"
                    )));
                }
                None => return Err(MarketError::ProductNotFound(id.to_string())),
            }
        }

        for id in &checkout.consumed {
            if let Some(product) = state.products.get_mut(id) {
                product.available = false;
            }
        }
        let buyer = checkout.buyer_order.buyer.clone();
        state.carts.insert(buyer.clone(), Cart::empty(buyer));
        for order in checkout.orders {
            state.orders.insert(order.number, order);
        }
        state
            .buyer_orders
            .insert(checkout.buyer_order.id, checkout.buyer_order);
        state.notifications.extend(checkout.notifications);
        Ok(())
    }

    async fn buyer_order(&self, id: Uuid) -> Result<Option<BuyerOrder>> {
        let state = self.state.read().await;
        Ok(state.buyer_orders.get(&id).cloned())
    }

    async fn order(&self, number: u64) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(&number).cloned())
    }

    async fn siblings(&self, buyer_order_id: Uuid) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let Some(parent) = state.buyer_orders.get(&buyer_order_id) else {
            return Ok(Vec::new());
        };
        Ok(parent
            .order_numbers
            .iter()
            .filter_map(|n| state.orders.get(n).cloned())
            .collect())
    }

    async fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect())
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.values().cloned().collect())
    }

    async fn all_buyer_orders(&self) -> Result<Vec<BuyerOrder>> {
        let state = self.state.read().await;
        let mut all: Vec<BuyerOrder> = state.buyer_orders.values().cloned().collect();
        all.sort_by_key(|b| b.created_at);
        Ok(all)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut state = self.state.write().await;

        for order in &changes.orders {
            state.check_version(order)?;
        }
        if let Some(parent) = &changes.buyer_order {
            state.check_buyer_order_version(parent)?;
        }

        for mut order in changes.orders {
            order.version += 1;
            state.orders.insert(order.number, order);
        }
        if let Some(mut parent) = changes.buyer_order {
            parent.version += 1;
            state.buyer_orders.insert(parent.id, parent);
        }
        for id in &changes.restock {
            if let Some(product) = state.products.get_mut(id) {
                product.available = true;
            }
        }
        state.notifications.extend(changes.notifications);
        Ok(())
    }
}
