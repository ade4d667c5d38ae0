//! Checkout: turns a buyer's cart into one buyer order and one sub-order per
//! vendor, all persisted in a single unit.

use super::dispatch::{Dispatcher, Outbox};
use crate::domain::money::Money;
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::order::{BuyerOrder, Order, OrderStatus};
use crate::domain::party::{Cart, CartLine, Product, User, UserId};
use crate::domain::ports::{
    CartStoreRef, CatalogReaderRef, Checkout, ClockRef, IdentityReaderRef, OrderStoreRef,
    PaymentGatewayRef,
};
use crate::error::{MarketError, Result};
use uuid::Uuid;

/// Input of [`CheckoutService::split`].
#[derive(Debug, Clone)]
pub struct SplitRequest {
    pub buyer: UserId,
    pub cart: Cart,
    pub shipping_total: Money,
    /// Amount covered by the payment authorization.
    pub total: Money,
    pub payment_ref: String,
}

struct VendorGroup {
    vendor: User,
    duration_days: u32,
    products: Vec<Product>,
}

pub struct CheckoutService {
    identity: IdentityReaderRef,
    catalog: CatalogReaderRef,
    carts: CartStoreRef,
    orders: OrderStoreRef,
    payments: PaymentGatewayRef,
    clock: ClockRef,
    dispatcher: Dispatcher,
}

impl CheckoutService {
    pub fn new(
        identity: IdentityReaderRef,
        catalog: CatalogReaderRef,
        carts: CartStoreRef,
        orders: OrderStoreRef,
        payments: PaymentGatewayRef,
        clock: ClockRef,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            identity,
            catalog,
            carts,
            orders,
            payments,
            clock,
            dispatcher,
        }
    }

    /// Authorizes the cart total and splits the cart into orders.
    ///
    /// If the split fails after the authorization went through, the
    /// authorization is released before the error is returned.
    #[tracing::instrument(skip(self), fields(buyer = %buyer))]
    pub async fn checkout(&self, buyer: &UserId, shipping_total: Money) -> Result<BuyerOrder> {
        let cart = self.carts.cart(buyer).await?;
        if cart.is_empty() {
            return Err(MarketError::EmptyCart);
        }
        self.identity
            .user(buyer)
            .await?
            .ok_or_else(|| MarketError::UserNotFound(buyer.to_string()))?;

        let mut subtotal = Money::ZERO;
        for line in &cart.lines {
            subtotal += self.load_product(line).await?.price;
        }
        let total = subtotal + shipping_total;
        let payment_ref = self
            .payments
            .authorize(total)
            .await
            .map_err(MarketError::escalate)?;

        let request = SplitRequest {
            buyer: buyer.clone(),
            cart,
            shipping_total,
            total,
            payment_ref: payment_ref.clone(),
        };
        match self.persist_split(request).await {
            Ok((parent, outbox)) => {
                self.dispatcher.deliver(outbox).await?;
                Ok(parent)
            }
            Err(e) => {
                tracing::warn!("checkout failed, releasing authorization {payment_ref}: {e}");
                if let Err(release) = self.payments.release(&payment_ref).await {
                    tracing::error!("could not release authorization {payment_ref}: {release}");
                }
                Err(e)
            }
        }
    }

    /// Splits an already-authorized cart into per-vendor orders.
    pub async fn split(&self, request: SplitRequest) -> Result<BuyerOrder> {
        let (parent, outbox) = self.persist_split(request).await?;
        self.dispatcher.deliver(outbox).await?;
        Ok(parent)
    }

    async fn load_product(&self, line: &CartLine) -> Result<Product> {
        self.catalog
            .product(&line.product)
            .await?
            .ok_or_else(|| MarketError::ProductNotFound(line.product.to_string()))
    }

    /// Groups cart lines by vendor in order of first appearance. Products and
    /// vendors are looked up again rather than trusted from the cart.
    async fn group_by_vendor(&self, cart: &Cart) -> Result<Vec<VendorGroup>> {
        let mut groups: Vec<VendorGroup> = Vec::new();
        for line in &cart.lines {
            let product = self.load_product(line).await?;
            let duration = line.duration_days;

            if let Some(group) = groups.iter_mut().find(|g| g.vendor.id == product.vendor) {
                group.duration_days = group.duration_days.max(duration);
                group.products.push(product);
                continue;
            }

            let vendor = self
                .identity
                .user(&product.vendor)
                .await?
                .ok_or_else(|| MarketError::VendorNotFound(product.vendor.to_string()))?;
            groups.push(VendorGroup {
                vendor,
                duration_days: duration,
                products: vec![product],
            });
        }
        Ok(groups)
    }

    async fn persist_split(&self, request: SplitRequest) -> Result<(BuyerOrder, Outbox)> {
        let SplitRequest {
            buyer,
            cart,
            shipping_total,
            total,
            payment_ref,
        } = request;

        if cart.buyer != buyer {
            return Err(MarketError::conflict(format!(
                "cart of {} cannot be checked out by {buyer}",
                cart.buyer
            )));
        }
        if cart.is_empty() {
            return Err(MarketError::EmptyCart);
        }
        let buyer_user = self
            .identity
            .user(&buyer)
            .await?
            .ok_or_else(|| MarketError::UserNotFound(buyer.to_string()))?;

        let groups = self.group_by_vendor(&cart).await?;
        let expected = groups
            .iter()
            .flat_map(|g| g.products.iter().map(|p| p.price))
            .sum::<Money>()
            + shipping_total;
        if expected != total {
            return Err(MarketError::conflict(format!(
                "authorized total {total} does not match cart total {expected}"
            )));
        }

        let now = self.clock.now();
        let parent_id = Uuid::now_v7();
        let shares = shipping_total.split_evenly(groups.len());

        let mut orders = Vec::with_capacity(groups.len());
        let mut notifications = Vec::with_capacity(groups.len());
        for (group, shipping) in groups.into_iter().zip(shares) {
            let number = self
                .orders
                .next_order_number()
                .await
                .map_err(MarketError::escalate)?;
            let order = Order {
                id: Uuid::now_v7(),
                number,
                buyer_order_id: parent_id,
                vendor: group.vendor.id.clone(),
                buyer: buyer.clone(),
                status: OrderStatus::NewOrder,
                duration_days: group.duration_days,
                price: group.products.iter().map(|p| p.price).sum(),
                shipping,
                products: group.products.into_iter().map(|p| p.id).collect(),
                shipping_address: buyer_user.address.clone(),
                created_at: now,
                shipped_at: None,
                received_at: None,
                sent_back_at: None,
                closed_at: None,
                tracking_number: None,
                return_tracking_number: None,
                rejection: None,
                fine: None,
                fine_session: None,
                payout: None,
                version: 0,
            };
            notifications.push(Notification::for_order(
                &order.vendor,
                NotificationKind::OrderPlaced,
                &order,
                now,
            ));
            orders.push(order);
        }

        let parent = BuyerOrder {
            id: parent_id,
            buyer: buyer.clone(),
            price: orders.iter().map(|o| o.gross()).sum(),
            shipping: shipping_total,
            payment_ref,
            order_numbers: orders.iter().map(|o| o.number).collect(),
            paid: false,
            settlement: None,
            created_at: now,
            version: 0,
        };

        self.orders
            .create_checkout(Checkout {
                buyer_order: parent.clone(),
                consumed: orders.iter().flat_map(|o| o.products.clone()).collect(),
                orders,
                notifications: notifications.clone(),
            })
            .await
            .map_err(MarketError::escalate)?;

        tracing::info!(
            buyer_order = %parent.id,
            orders = ?parent.order_numbers,
            total = %parent.price,
            "checkout split into vendor orders"
        );
        Ok((
            parent,
            Outbox {
                notifications,
                mails: Vec::new(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fixtures::Fixture;
    use crate::domain::party::ProductId;
    use crate::domain::ports::{CatalogReader, OrderStore};
    use crate::infrastructure::recording::{PaymentCall, PaymentOp};

    async fn two_vendor_cart(fx: &Fixture) {
        fx.vendor("v1").await;
        fx.vendor("v2").await;
        fx.buyer("b1", 0).await;
        fx.product("a", "v1", 50).await;
        fx.product("b", "v2", 30).await;
        fx.add("b1", "a", 7).await;
        fx.add("b1", "b", 3).await;
    }

    #[tokio::test]
    async fn test_split_by_vendor_with_even_shipping() {
        let fx = Fixture::new().await;
        two_vendor_cart(&fx).await;

        let parent = fx
            .market
            .checkout
            .checkout(&UserId::from("b1"), Money::from(20))
            .await
            .unwrap();
        assert_eq!(parent.price, Money::from(100));
        assert_eq!(parent.order_numbers, vec![1, 2]);

        let orders = fx.store.siblings(parent.id).await.unwrap();
        let summary: Vec<_> = orders
            .iter()
            .map(|o| (o.vendor.to_string(), o.duration_days, o.price, o.shipping))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("v1".to_string(), 7, Money::from(50), Money::from(10)),
                ("v2".to_string(), 3, Money::from(30), Money::from(10)),
            ]
        );
        let children: Money = orders.iter().map(|o| o.gross()).sum();
        assert_eq!(children, parent.price);

        assert!(fx.market.carts.cart(&UserId::from("b1")).await.unwrap().is_empty());
        let a = fx.store.product(&ProductId::from("a")).await.unwrap().unwrap();
        assert!(!a.available);
        assert_eq!(fx.sink.delivered().len(), 2);
    }

    #[tokio::test]
    async fn test_vendor_duration_is_the_longest_line() {
        let fx = Fixture::new().await;
        fx.vendor("v1").await;
        fx.buyer("b1", 0).await;
        fx.product("a", "v1", 10).await;
        fx.product("b", "v1", 10).await;
        fx.product("c", "v1", 10).await;
        fx.add("b1", "a", 2).await;
        fx.add("b1", "b", 6).await;
        fx.add("b1", "c", 4).await;

        let parent = fx
            .market
            .checkout
            .checkout(&UserId::from("b1"), Money::from(5))
            .await
            .unwrap();
        let orders = fx.store.siblings(parent.id).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].duration_days, 6);
        assert_eq!(orders[0].price, Money::from(30));
        assert_eq!(orders[0].products.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_cart_is_refused_before_authorizing() {
        let fx = Fixture::new().await;
        fx.buyer("b1", 0).await;
        let err = fx
            .market
            .checkout
            .checkout(&UserId::from("b1"), Money::from(20))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::EmptyCart));
        assert!(fx.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_vanished_vendor_releases_authorization() {
        let fx = Fixture::new().await;
        two_vendor_cart(&fx).await;
        fx.remove_user("v2").await;

        let err = fx
            .market
            .checkout
            .checkout(&UserId::from("b1"), Money::from(20))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::VendorNotFound(_)));

        let calls = fx.gateway.calls();
        assert!(matches!(calls[0], PaymentCall::Authorize { .. }));
        assert!(matches!(calls[1], PaymentCall::Release { .. }));
        assert!(fx.store.all_orders().await.unwrap().is_empty());
        assert_eq!(fx.market.carts.cart(&UserId::from("b1")).await.unwrap().lines.len(), 2);
    }

    #[tokio::test]
    async fn test_split_rejects_mismatched_total() {
        let fx = Fixture::new().await;
        two_vendor_cart(&fx).await;
        let cart = fx.market.carts.cart(&UserId::from("b1")).await.unwrap();

        let err = fx
            .market
            .checkout
            .split(SplitRequest {
                buyer: UserId::from("b1"),
                cart,
                shipping_total: Money::from(20),
                total: Money::from(90),
                payment_ref: "pi_external".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
        assert!(fx.store.all_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_split_refuses_another_buyers_cart() {
        let fx = Fixture::new().await;
        two_vendor_cart(&fx).await;
        fx.buyer("b2", 0).await;
        let cart = fx.market.carts.cart(&UserId::from("b1")).await.unwrap();

        let err = fx
            .market
            .checkout
            .split(SplitRequest {
                buyer: UserId::from("b2"),
                cart,
                shipping_total: Money::from(20),
                total: Money::from(100),
                payment_ref: "pi_external".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
        assert!(fx.store.all_orders().await.unwrap().is_empty());
        assert_eq!(fx.market.carts.cart(&UserId::from("b1")).await.unwrap().lines.len(), 2);
        assert!(fx.market.carts.cart(&UserId::from("b2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_authorization_creates_nothing() {
        let fx = Fixture::new().await;
        two_vendor_cart(&fx).await;
        fx.gateway.fail_on(PaymentOp::Authorize);

        let err = fx
            .market
            .checkout
            .checkout(&UserId::from("b1"), Money::from(20))
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::ServiceUnavailable(_)));
        assert!(fx.store.all_buyer_orders().await.unwrap().is_empty());
    }
}
