//! Background promotion of late rentals to `OVERDUE`.

use super::locks::RowLocks;
use crate::domain::fine::is_overdue;
use crate::domain::order::{Order, OrderEvent, OrderStatus, Role};
use crate::domain::ports::{ChangeSet, ClockRef, OrderStoreRef};
use crate::error::{MarketError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Outcome of one pass over the received orders.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub promoted: usize,
    pub failed: usize,
}

pub struct OverdueSweeper {
    orders: OrderStoreRef,
    clock: ClockRef,
    locks: RowLocks,
}

impl OverdueSweeper {
    pub fn new(orders: OrderStoreRef, clock: ClockRef, locks: RowLocks) -> Self {
        Self {
            orders,
            clock,
            locks,
        }
    }

    /// Promotes every `RECEIVED` order whose rental period has ended.
    ///
    /// Each order is updated on its own under its buyer order's row lock. A
    /// failure on one order is logged and the scan moves on.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let candidates = match self.orders.orders_with_status(OrderStatus::Received).await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!("overdue sweep could not list received orders: {e}");
                report.failed += 1;
                return report;
            }
        };

        for order in candidates {
            report.scanned += 1;
            if !is_overdue(&order, self.clock.now()) {
                continue;
            }
            match self.promote(&order).await {
                Ok(true) => report.promoted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(order = order.number, "overdue promotion failed: {e}");
                    report.failed += 1;
                }
            }
        }

        if report.promoted > 0 || report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                promoted = report.promoted,
                failed = report.failed,
                "overdue sweep finished"
            );
        }
        report
    }

    /// Re-checks the order under the lock, since a buyer may have sent it back
    /// since the scan read it.
    async fn promote(&self, candidate: &Order) -> Result<bool> {
        let _guard = self.locks.acquire(candidate.buyer_order_id).await;
        let Some(mut order) = self
            .orders
            .order(candidate.number)
            .await
            .map_err(MarketError::escalate)?
        else {
            return Ok(false);
        };

        let now = self.clock.now();
        if order.status != OrderStatus::Received || !is_overdue(&order, now) {
            return Ok(false);
        }
        order.apply(OrderEvent::MarkOverdue, Role::System, now)?;
        self.orders
            .commit(ChangeSet {
                orders: vec![order],
                ..Default::default()
            })
            .await
            .map_err(MarketError::escalate)?;
        Ok(true)
    }

    /// Runs [`Self::sweep`] every `interval` until the handle is shut down.
    /// Ticks missed while a sweep is running are skipped, not queued.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> SweeperHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let task = tokio::spawn(async move {
            tracing::info!(?interval, "overdue sweeper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = signal.notified() => {
                        tracing::info!("overdue sweeper received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
        });

        SweeperHandle { shutdown, task }
    }
}

pub struct SweeperHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the loop after the sweep in progress, if any, and waits for it.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            tracing::error!("overdue sweeper task failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::application::fixtures::Fixture;
    use crate::domain::money::Money;
    use crate::domain::order::OrderStatus;
    use crate::domain::party::UserId;
    use crate::domain::ports::{ChangeSet, OrderStore};
    use chrono::Duration;
    use std::sync::Arc;

    async fn received(fx: &Fixture) {
        fx.vendor("v1").await;
        fx.buyer("b1", 0).await;
        fx.product("a", "v1", 50).await;
        fx.add("b1", "a", 7).await;
        let b1 = UserId::from("b1");
        fx.market.checkout.checkout(&b1, Money::from(10)).await.unwrap();
        fx.market
            .lifecycle
            .ship(&UserId::from("v1"), 1, "TRK-1")
            .await
            .unwrap();
        fx.market.lifecycle.receive(&b1, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_promotes_only_past_due() {
        let fx = Fixture::new().await;
        received(&fx).await;

        fx.clock.advance(Duration::days(7));
        let report = fx.market.sweeper.sweep().await;
        assert_eq!((report.scanned, report.promoted), (1, 0));

        fx.clock.advance(Duration::days(3));
        let report = fx.market.sweeper.sweep().await;
        assert_eq!((report.scanned, report.promoted, report.failed), (1, 1, 0));
        let order = fx.store.order(1).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Overdue);

        let again = fx.market.sweeper.sweep().await;
        assert_eq!(again.scanned, 0);
    }

    #[tokio::test]
    async fn test_rental_past_calendar_range_is_never_promoted() {
        let fx = Fixture::new().await;
        received(&fx).await;
        let mut order = fx.store.order(1).await.unwrap().unwrap();
        order.duration_days = u32::MAX;
        fx.store
            .commit(ChangeSet {
                orders: vec![order],
                ..Default::default()
            })
            .await
            .unwrap();

        fx.clock.advance(Duration::days(10_000));
        let report = fx.market.sweeper.sweep().await;
        assert_eq!((report.scanned, report.promoted, report.failed), (1, 0, 0));

        let quote = fx
            .market
            .lifecycle
            .fine_quote(&UserId::from("b1"), 1)
            .await
            .unwrap();
        assert_eq!(quote, None);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_stops_on_shutdown() {
        let fx = Fixture::new().await;
        received(&fx).await;
        fx.clock.advance(Duration::days(10));

        let handle = Arc::clone(&fx.market.sweeper).spawn(std::time::Duration::from_millis(10));
        for _ in 0..100 {
            if fx.store.order(1).await.unwrap().unwrap().status == OrderStatus::Overdue {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        tokio::time::timeout(std::time::Duration::from_secs(1), handle.shutdown())
            .await
            .unwrap();

        let order = fx.store.order(1).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Overdue);
    }
}
