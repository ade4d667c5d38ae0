//! Application layer: the services that drive carts, checkout, the order
//! lifecycle, settlement and the overdue sweep through the domain ports.
//!
//! [`Marketplace`] wires them together over one set of ports and one shared
//! row-lock table, which is what keeps request-driven transitions and the
//! background sweep from interleaving on the same buyer order.

pub mod cart;
pub mod checkout;
pub mod dispatch;
pub mod lifecycle;
pub mod locks;
pub mod settlement;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::config::Settings;
use crate::domain::ports::{
    CartStore, CartStoreRef, CatalogReader, CatalogReaderRef, ClockRef, IdentityReader,
    IdentityReaderRef, MailSenderRef, NotificationSinkRef, OrderStore, OrderStoreRef,
    PaymentGatewayRef,
};
use cart::CartService;
use checkout::CheckoutService;
use dispatch::Dispatcher;
use lifecycle::OrderLifecycle;
use locks::RowLocks;
use settlement::SettlementCoordinator;
use std::sync::Arc;
use sweeper::OverdueSweeper;

/// The collaborators the engine runs against.
#[derive(Clone)]
pub struct Ports {
    pub catalog: CatalogReaderRef,
    pub identity: IdentityReaderRef,
    pub carts: CartStoreRef,
    pub orders: OrderStoreRef,
    pub payments: PaymentGatewayRef,
    pub notifications: NotificationSinkRef,
    pub mailer: MailSenderRef,
    pub clock: ClockRef,
}

impl Ports {
    /// Uses one store for the catalog, identity, cart and order ports.
    pub fn with_store<S>(
        store: S,
        payments: PaymentGatewayRef,
        notifications: NotificationSinkRef,
        mailer: MailSenderRef,
        clock: ClockRef,
    ) -> Self
    where
        S: CatalogReader + IdentityReader + CartStore + OrderStore + Clone + 'static,
    {
        Self {
            catalog: Arc::new(store.clone()),
            identity: Arc::new(store.clone()),
            carts: Arc::new(store.clone()),
            orders: Arc::new(store),
            payments,
            notifications,
            mailer,
            clock,
        }
    }
}

pub struct Marketplace {
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub lifecycle: OrderLifecycle,
    pub settlement: Arc<SettlementCoordinator>,
    pub sweeper: Arc<OverdueSweeper>,
}

impl Marketplace {
    pub fn new(ports: Ports, settings: &Settings) -> Self {
        let locks = RowLocks::new();
        let dispatcher = Dispatcher::new(ports.notifications.clone(), ports.mailer.clone());

        let settlement = Arc::new(SettlementCoordinator::new(
            ports.orders.clone(),
            ports.payments.clone(),
            locks.clone(),
        ));
        let sweeper = Arc::new(OverdueSweeper::new(
            ports.orders.clone(),
            ports.clock.clone(),
            locks.clone(),
        ));

        Self {
            carts: CartService::new(
                ports.identity.clone(),
                ports.catalog.clone(),
                ports.carts.clone(),
                settings.eligibility.clone(),
            ),
            checkout: CheckoutService::new(
                ports.identity.clone(),
                ports.catalog.clone(),
                ports.carts.clone(),
                ports.orders.clone(),
                ports.payments.clone(),
                ports.clock.clone(),
                dispatcher.clone(),
            ),
            lifecycle: OrderLifecycle::new(
                ports.orders,
                ports.identity,
                ports.payments,
                ports.clock,
                locks,
                dispatcher,
                settlement.clone(),
                settings.fees.fine_policy(),
                settings.fees.platform_fee_rate,
            ),
            settlement,
            sweeper,
        }
    }
}
