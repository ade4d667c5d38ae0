//! Actor-triggered transitions of vendor sub-orders.
//!
//! Every operation runs under the row lock of the order's buyer order:
//! reload, check the transition table, run any payment step that must come
//! first, then commit the new status together with its notification records.
//! Deliveries happen after the lock is released and never undo the commit.

use super::dispatch::{Dispatcher, Outbox};
use super::locks::{RowGuard, RowLocks};
use super::settlement::SettlementCoordinator;
use crate::domain::fine::{FinePolicy, FineQuote};
use crate::domain::money::Money;
use crate::domain::notification::{Mail, MailTemplate, Notification, NotificationKind};
use crate::domain::order::{EventKind, Order, OrderEvent, OrderStatus, PayoutStatus, Role};
use crate::domain::party::UserId;
use crate::domain::ports::{
    ChangeSet, ClockRef, IdentityReaderRef, OrderStoreRef, PaymentGatewayRef,
};
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;

pub struct OrderLifecycle {
    orders: OrderStoreRef,
    identity: IdentityReaderRef,
    payments: PaymentGatewayRef,
    clock: ClockRef,
    locks: RowLocks,
    dispatcher: Dispatcher,
    settlement: Arc<SettlementCoordinator>,
    fines: FinePolicy,
    platform_fee_rate: Decimal,
}

/// A transition ready to be committed.
struct Step {
    event: OrderEvent,
    role: Role,
    notify: Vec<(UserId, NotificationKind)>,
    restock: bool,
}

impl OrderLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: OrderStoreRef,
        identity: IdentityReaderRef,
        payments: PaymentGatewayRef,
        clock: ClockRef,
        locks: RowLocks,
        dispatcher: Dispatcher,
        settlement: Arc<SettlementCoordinator>,
        fines: FinePolicy,
        platform_fee_rate: Decimal,
    ) -> Self {
        Self {
            orders,
            identity,
            payments,
            clock,
            locks,
            dispatcher,
            settlement,
            fines,
            platform_fee_rate,
        }
    }

    /// The order as seen by one of its parties. Anyone else gets `OrderNotFound`.
    pub async fn order_for(&self, actor: &UserId, number: u64) -> Result<Order> {
        self.locate(actor, number).await.map(|(order, _)| order)
    }

    /// Fine the buyer would owe if they sent the order back now.
    ///
    /// `None` unless the order is with the buyer (`RECEIVED` or `OVERDUE`).
    pub async fn fine_quote(&self, buyer: &UserId, number: u64) -> Result<Option<FineQuote>> {
        let (order, role) = self.locate(buyer, number).await?;
        if role != Role::Buyer {
            return Err(MarketError::OrderNotFound(number));
        }
        if !matches!(order.status, OrderStatus::Received | OrderStatus::Overdue) {
            return Ok(None);
        }
        Ok(self.fines.quote(&order, self.clock.now()))
    }

    #[tracing::instrument(skip(self, reason), fields(order = number, actor = %actor))]
    pub async fn reject(
        &self,
        actor: &UserId,
        number: u64,
        reason: Option<String>,
    ) -> Result<Order> {
        let (guard, order, role) = self.lock_order(actor, number).await?;
        order.ensure(EventKind::Reject, role)?;

        let counterparty = order.counterparty(role).clone();
        let step = Step {
            event: OrderEvent::Reject { reason },
            role,
            notify: vec![(counterparty, NotificationKind::OrderRejected)],
            restock: true,
        };
        let (order, notifications) = self.commit(order, step).await?;
        let settled = self.settlement.evaluate_locked(order.buyer_order_id).await;
        drop(guard);

        let delivered = self.deliver(notifications, Vec::new()).await;
        settled?;
        delivered?;
        Ok(order)
    }

    #[tracing::instrument(skip(self, tracking_number), fields(order = number, vendor = %vendor))]
    pub async fn ship(&self, vendor: &UserId, number: u64, tracking_number: &str) -> Result<Order> {
        let tracking_number = non_blank(tracking_number)?;
        let (guard, order, role) = self.lock_order(vendor, number).await?;
        order.ensure(EventKind::Ship, role)?;

        let step = Step {
            event: OrderEvent::Ship { tracking_number },
            role,
            notify: both(&order, NotificationKind::OrderShipped),
            restock: false,
        };
        let (order, notifications) = self.commit(order, step).await?;
        let settled = self.settlement.evaluate_locked(order.buyer_order_id).await;
        drop(guard);

        let mail = self
            .mail(&order.buyer, MailTemplate::OrderShipped, &order)
            .await;
        let delivered = self.deliver(notifications, mail).await;
        settled?;
        delivered?;
        Ok(order)
    }

    /// Buyer confirms receipt; the vendor is paid out minus the platform fee.
    ///
    /// The receipt commits first with the payout owed. A failed transfer
    /// leaves it owed for [`Self::retry_payout`].
    #[tracing::instrument(skip(self), fields(order = number, buyer = %buyer))]
    pub async fn receive(&self, buyer: &UserId, number: u64) -> Result<Order> {
        let (guard, order, role) = self.lock_order(buyer, number).await?;
        order.ensure(EventKind::Receive, role)?;

        let step = Step {
            event: OrderEvent::Receive,
            role,
            notify: both(&order, NotificationKind::OrderReceived),
            restock: false,
        };
        let (order, notifications) = self.commit(order, step).await?;
        let paid_out = self.pay_out(order).await;
        drop(guard);

        let delivered = self.deliver(notifications, Vec::new()).await;
        let order = paid_out?;
        delivered?;
        Ok(order)
    }

    /// Transfers a payout still owed to the vendor. Already transferred
    /// payouts are left alone.
    #[tracing::instrument(skip(self), fields(order = number, vendor = %vendor))]
    pub async fn retry_payout(&self, vendor: &UserId, number: u64) -> Result<Order> {
        let (_guard, order, role) = self.lock_order(vendor, number).await?;
        if role != Role::Vendor {
            return Err(MarketError::OrderNotFound(number));
        }
        match order.payout {
            Some(PayoutStatus::Pending) => self.pay_out(order).await,
            Some(PayoutStatus::Transferred) => Ok(order),
            None => Err(MarketError::conflict(format!(
                "order {number} has no payout owed"
            ))),
        }
    }

    /// Buyer ships the items back. From `OVERDUE` the fine is charged before
    /// the transition; if the charge fails nothing changes.
    #[tracing::instrument(skip(self, tracking_number), fields(order = number, buyer = %buyer))]
    pub async fn send_back(
        &self,
        buyer: &UserId,
        number: u64,
        tracking_number: &str,
    ) -> Result<Order> {
        let tracking_number = non_blank(tracking_number)?;
        let (guard, order, role) = self.lock_order(buyer, number).await?;
        order.ensure(EventKind::SendBack, role)?;

        let (fine, fine_session) = if order.status == OrderStatus::Overdue {
            self.charge_fine(&order).await?
        } else {
            (None, None)
        };

        let step = Step {
            event: OrderEvent::SendBack {
                tracking_number,
                fine,
                fine_session,
            },
            role,
            notify: both(&order, NotificationKind::OrderSentBack),
            restock: false,
        };
        let (order, notifications) = self.commit(order, step).await.inspect_err(|_| {
            if fine.is_some_and(|f| !f.is_zero()) {
                tracing::warn!(
                    order = number,
                    "fine was charged but the send back did not commit"
                );
            }
        })?;
        drop(guard);

        let mail = self
            .mail(&order.vendor, MailTemplate::OrderSentBack, &order)
            .await;
        self.deliver(notifications, mail).await?;
        Ok(order)
    }

    #[tracing::instrument(skip(self), fields(order = number, vendor = %vendor))]
    pub async fn confirm_return(&self, vendor: &UserId, number: u64) -> Result<Order> {
        let (guard, order, role) = self.lock_order(vendor, number).await?;
        order.ensure(EventKind::ConfirmReturn, role)?;

        let step = Step {
            event: OrderEvent::ConfirmReturn,
            role,
            notify: both(&order, NotificationKind::OrderReturned),
            restock: true,
        };
        let (order, notifications) = self.commit(order, step).await?;
        drop(guard);

        let mail = self
            .mail(&order.buyer, MailTemplate::OrderReturned, &order)
            .await;
        self.deliver(notifications, mail).await?;
        Ok(order)
    }

    async fn locate(&self, actor: &UserId, number: u64) -> Result<(Order, Role)> {
        let order = self
            .orders
            .order(number)
            .await
            .map_err(MarketError::escalate)?
            .ok_or(MarketError::OrderNotFound(number))?;
        let role = order
            .role_of(actor)
            .ok_or(MarketError::OrderNotFound(number))?;
        Ok((order, role))
    }

    /// Takes the row lock of the order's buyer order and reloads the order
    /// under it.
    async fn lock_order(&self, actor: &UserId, number: u64) -> Result<(RowGuard, Order, Role)> {
        let (order, _) = self.locate(actor, number).await?;
        let guard = self.locks.acquire(order.buyer_order_id).await;
        let (order, role) = self.locate(actor, number).await?;
        Ok((guard, order, role))
    }

    async fn commit(&self, mut order: Order, step: Step) -> Result<(Order, Vec<Notification>)> {
        let now = self.clock.now();
        let from = order.status;
        let to = order.apply(step.event, step.role, now)?;

        let notifications: Vec<Notification> = step
            .notify
            .iter()
            .map(|(recipient, kind)| Notification::for_order(recipient, *kind, &order, now))
            .collect();
        let restock = if step.restock {
            order.products.clone()
        } else {
            Vec::new()
        };

        self.orders
            .commit(ChangeSet {
                orders: vec![order.clone()],
                buyer_order: None,
                restock,
                notifications: notifications.clone(),
            })
            .await
            .map_err(MarketError::escalate)?;
        order.version += 1;

        tracing::info!(%from, %to, "order transition committed");
        Ok((order, notifications))
    }

    async fn charge_fine(&self, order: &Order) -> Result<(Option<Money>, Option<String>)> {
        let Some(quote) = self.fines.quote(order, self.clock.now()) else {
            return Ok((None, None));
        };
        if quote.amount.is_zero() {
            return Ok((Some(Money::ZERO), None));
        }

        let account = self.payout_account(&order.vendor).await?.ok_or_else(|| {
            MarketError::conflict(format!(
                "vendor {} cannot receive the overdue fine",
                order.vendor
            ))
        })?;
        // Keyed per day so a retried send back reuses the same session.
        let key = format!("fine-{}-{}", order.id, quote.overdue_days);
        let session = self
            .payments
            .create_overdue_charge(&key, &order.buyer, &account, order.id, quote.amount)
            .await
            .map_err(MarketError::escalate)?;

        tracing::info!(
            fine = %quote.amount,
            overdue_days = quote.overdue_days,
            session = %session.id,
            "overdue fine charged"
        );
        Ok((Some(quote.amount), Some(session.id)))
    }

    /// Transfers the vendor's share and records it. The caller holds the
    /// row lock.
    async fn pay_out(&self, mut order: Order) -> Result<Order> {
        let Some(account) = self.payout_account(&order.vendor).await? else {
            tracing::warn!(
                vendor = %order.vendor,
                "vendor has no payout account, payout stays owed"
            );
            return Ok(order);
        };
        let parent = self
            .orders
            .buyer_order(order.buyer_order_id)
            .await
            .map_err(MarketError::escalate)?
            .ok_or_else(|| {
                MarketError::internal(format!("buyer order {} is missing", order.buyer_order_id))
            })?;

        let gross = order.gross();
        let fee = (gross * self.platform_fee_rate).round_cents();
        let amount = gross - fee;
        self.payments
            .transfer_to_vendor(
                &format!("payout-{}", order.id),
                &account,
                &parent.payment_ref,
                amount,
                fee,
            )
            .await
            .map_err(MarketError::escalate)?;
        tracing::info!(%amount, %fee, "vendor paid out");

        order.payout = Some(PayoutStatus::Transferred);
        self.orders
            .commit(ChangeSet {
                orders: vec![order.clone()],
                ..ChangeSet::default()
            })
            .await
            .inspect_err(|_| tracing::warn!("transfer made but not recorded"))
            .map_err(MarketError::escalate)?;
        order.version += 1;
        Ok(order)
    }

    async fn payout_account(&self, vendor: &UserId) -> Result<Option<String>> {
        let user = self
            .identity
            .user(vendor)
            .await
            .map_err(MarketError::escalate)?
            .ok_or_else(|| MarketError::VendorNotFound(vendor.to_string()))?;
        Ok(user.payout_account)
    }

    /// Builds the shipping-event mail for `recipient`. A recipient without a
    /// profile gets no mail.
    async fn mail(&self, recipient: &UserId, template: MailTemplate, order: &Order) -> Vec<Mail> {
        match self.identity.user(recipient).await {
            Ok(Some(user)) => vec![Mail {
                to: user.email,
                template,
                context: json!({
                    "order": order.number,
                    "status": order.status,
                    "tracking_number": order.tracking_number,
                    "return_tracking_number": order.return_tracking_number,
                    "fine": order.fine,
                }),
            }],
            Ok(None) => {
                tracing::warn!(%recipient, "no profile to mail");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(%recipient, "could not load profile for mail: {e}");
                Vec::new()
            }
        }
    }

    async fn deliver(&self, notifications: Vec<Notification>, mails: Vec<Mail>) -> Result<()> {
        self.dispatcher
            .deliver(Outbox {
                notifications,
                mails,
            })
            .await
    }
}

fn both(order: &Order, kind: NotificationKind) -> Vec<(UserId, NotificationKind)> {
    vec![(order.buyer.clone(), kind), (order.vendor.clone(), kind)]
}

fn non_blank(tracking_number: &str) -> Result<String> {
    let trimmed = tracking_number.trim();
    if trimmed.is_empty() {
        return Err(MarketError::ValidationError(
            "Tracking number must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
