//! Settlement of a buyer order's single payment authorization.
//!
//! Every sub-order of a checkout shares one authorization. Once no vendor is
//! still deciding (no sibling left in `NEW_ORDER`) the coordinator captures
//! everything, releases everything, or captures only what the shipping vendors
//! are owed.

use super::locks::RowLocks;
use crate::domain::money::Money;
use crate::domain::order::{BuyerOrder, Order, OrderStatus, SettlementOutcome};
use crate::domain::ports::{ChangeSet, OrderStoreRef, PaymentGatewayRef};
use crate::error::{MarketError, Result};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementDecision {
    /// At least one vendor has not shipped or rejected yet.
    Pending,
    AlreadySettled,
    CaptureFull(Money),
    ReleaseAll,
    CapturePartial(Money),
}

/// Decides what to do with the authorization given the current siblings.
pub fn decide(parent: &BuyerOrder, siblings: &[Order]) -> SettlementDecision {
    if parent.is_settled() {
        return SettlementDecision::AlreadySettled;
    }
    if siblings.is_empty() || siblings.iter().any(|o| o.status == OrderStatus::NewOrder) {
        return SettlementDecision::Pending;
    }

    let fulfilled: Vec<&Order> = siblings.iter().filter(|o| o.status.is_fulfilled()).collect();
    if fulfilled.len() == siblings.len() {
        SettlementDecision::CaptureFull(parent.price)
    } else if fulfilled.is_empty() {
        SettlementDecision::ReleaseAll
    } else {
        SettlementDecision::CapturePartial(fulfilled.iter().map(|o| o.gross()).sum())
    }
}

pub struct SettlementCoordinator {
    orders: OrderStoreRef,
    payments: PaymentGatewayRef,
    locks: RowLocks,
}

impl SettlementCoordinator {
    pub fn new(orders: OrderStoreRef, payments: PaymentGatewayRef, locks: RowLocks) -> Self {
        Self {
            orders,
            payments,
            locks,
        }
    }

    /// Evaluates settlement for `buyer_order_id`, taking its row lock.
    ///
    /// Safe to call any number of times: once settled, later calls return the
    /// recorded outcome without touching the payment provider.
    pub async fn settle(&self, buyer_order_id: Uuid) -> Result<Option<SettlementOutcome>> {
        let _guard = self.locks.acquire(buyer_order_id).await;
        self.evaluate_locked(buyer_order_id).await
    }

    /// Same as [`Self::settle`] for callers already holding the row lock.
    #[tracing::instrument(skip(self), fields(buyer_order = %buyer_order_id))]
    pub(crate) async fn evaluate_locked(
        &self,
        buyer_order_id: Uuid,
    ) -> Result<Option<SettlementOutcome>> {
        let mut parent = self
            .orders
            .buyer_order(buyer_order_id)
            .await
            .map_err(MarketError::escalate)?
            .ok_or_else(|| {
                MarketError::internal(format!("buyer order {buyer_order_id} is missing"))
            })?;
        let siblings = self
            .orders
            .siblings(buyer_order_id)
            .await
            .map_err(MarketError::escalate)?;

        let outcome = match decide(&parent, &siblings) {
            SettlementDecision::Pending => {
                tracing::debug!("settlement pending on other vendors");
                return Ok(None);
            }
            SettlementDecision::AlreadySettled => return Ok(parent.settlement),
            SettlementDecision::CaptureFull(amount) => {
                self.payments
                    .capture(&parent.payment_ref, amount)
                    .await
                    .map_err(MarketError::escalate)?;
                SettlementOutcome::Captured(amount)
            }
            SettlementDecision::CapturePartial(amount) => {
                self.payments
                    .capture(&parent.payment_ref, amount)
                    .await
                    .map_err(MarketError::escalate)?;
                SettlementOutcome::PartiallyCaptured(amount)
            }
            SettlementDecision::ReleaseAll => {
                self.payments
                    .release(&parent.payment_ref)
                    .await
                    .map_err(MarketError::escalate)?;
                SettlementOutcome::Released
            }
        };

        parent.settlement = Some(outcome);
        parent.paid = !matches!(outcome, SettlementOutcome::Released);
        self.orders
            .commit(ChangeSet {
                buyer_order: Some(parent),
                ..Default::default()
            })
            .await
            .map_err(MarketError::escalate)?;

        tracing::info!(
            outcome = outcome.label(),
            captured = %outcome.captured(),
            "buyer order settled"
        );
        Ok(Some(outcome))
    }
}
