use crate::application::Marketplace;
use crate::domain::party::{Product, Review, User};
use crate::domain::ports::{DirectoryRef, OrderStoreRef};
use crate::error::Result;
use crate::infrastructure::clock::ManualClock;
use crate::interfaces::csv::action_reader::{Action, TimedAction};
use crate::interfaces::csv::order_writer::OrderRow;

/// Feeds logged actions to the engine, one at a time and in order.
///
/// Seeding actions (vendors, buyers, reviews, products) go straight to the
/// directory. A row with a timestamp pins the clock to it before it runs, so
/// due dates and fines follow the log rather than the wall clock.
pub struct Replayer {
    market: Marketplace,
    directory: DirectoryRef,
    orders: OrderStoreRef,
    clock: ManualClock,
}

impl Replayer {
    pub fn new(
        market: Marketplace,
        directory: DirectoryRef,
        orders: OrderStoreRef,
        clock: ManualClock,
    ) -> Self {
        Self {
            market,
            directory,
            orders,
            clock,
        }
    }

    pub fn market(&self) -> &Marketplace {
        &self.market
    }

    pub async fn apply(&self, timed: TimedAction) -> Result<()> {
        if let Some(at) = timed.at {
            self.clock.set(at);
        }

        match timed.action {
            Action::Vendor {
                id,
                email,
                payout_account,
            } => {
                let mut user = User::new(id.as_str(), email);
                user.payout_account = payout_account;
                self.directory.put_user(user).await?;
            }
            Action::Buyer {
                id,
                email,
                completed_orders,
            } => {
                let mut user = User::new(id.as_str(), email);
                user.completed_orders = completed_orders;
                self.directory.put_user(user).await?;
            }
            Action::Review {
                reviewer,
                subject,
                rating,
            } => {
                self.directory
                    .add_review(Review {
                        reviewer,
                        subject,
                        rating,
                    })
                    .await?;
            }
            Action::Product {
                vendor,
                id,
                price,
                name,
            } => {
                self.directory
                    .put_product(Product {
                        id,
                        vendor,
                        name,
                        price,
                        available: true,
                    })
                    .await?;
            }
            Action::Cart {
                buyer,
                product,
                days,
            } => {
                self.market.carts.add_to_cart(&buyer, &product, days).await?;
            }
            Action::Checkout { buyer, shipping } => {
                self.market.checkout.checkout(&buyer, shipping).await?;
            }
            Action::Ship {
                vendor,
                order,
                tracking_number,
            } => {
                self.market
                    .lifecycle
                    .ship(&vendor, order, &tracking_number)
                    .await?;
            }
            Action::Reject {
                actor,
                order,
                reason,
            } => {
                self.market.lifecycle.reject(&actor, order, reason).await?;
            }
            Action::Receive { buyer, order } => {
                self.market.lifecycle.receive(&buyer, order).await?;
            }
            Action::SendBack {
                buyer,
                order,
                tracking_number,
            } => {
                self.market
                    .lifecycle
                    .send_back(&buyer, order, &tracking_number)
                    .await?;
            }
            Action::Return { vendor, order } => {
                self.market.lifecycle.confirm_return(&vendor, order).await?;
            }
            Action::Payout { vendor, order } => {
                self.market.lifecycle.retry_payout(&vendor, order).await?;
            }
            Action::Sweep => {
                self.market.sweeper.sweep().await;
            }
        }
        Ok(())
    }

    /// Every order with its settlement, ordered by number.
    pub async fn summary(&self) -> Result<Vec<OrderRow>> {
        let orders = self.orders.all_orders().await?;
        let parents = self.orders.all_buyer_orders().await?;
        Ok(OrderRow::summarize(orders, &parents))
    }
}
