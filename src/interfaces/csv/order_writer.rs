use crate::domain::money::Money;
use crate::domain::order::{BuyerOrder, Order, OrderStatus};
use crate::error::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use uuid::Uuid;

/// One line of the order summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRow {
    pub order: u64,
    pub vendor: String,
    pub buyer: String,
    pub status: OrderStatus,
    pub duration: u32,
    pub price: Money,
    pub shipping: Money,
    pub fine: Option<Money>,
    pub settlement: Option<&'static str>,
    pub captured: Option<Money>,
    pub buyer_order: Uuid,
}

impl OrderRow {
    pub fn new(order: &Order, parent: Option<&BuyerOrder>) -> Self {
        let settlement = parent.and_then(|p| p.settlement);
        Self {
            order: order.number,
            vendor: order.vendor.to_string(),
            buyer: order.buyer.to_string(),
            status: order.status,
            duration: order.duration_days,
            price: order.price,
            shipping: order.shipping,
            fine: order.fine,
            settlement: settlement.map(|s| s.label()),
            captured: settlement.map(|s| s.captured()),
            buyer_order: order.buyer_order_id,
        }
    }

    /// Joins every order with its buyer order, ordered by order number.
    pub fn summarize(mut orders: Vec<Order>, parents: &[BuyerOrder]) -> Vec<Self> {
        let by_id: HashMap<Uuid, &BuyerOrder> = parents.iter().map(|p| (p.id, p)).collect();
        orders.sort_by_key(|o| o.number);
        orders
            .iter()
            .map(|o| Self::new(o, by_id.get(&o.buyer_order_id).copied()))
            .collect()
    }
}

/// Writes the order summary as CSV.
pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders(&mut self, rows: impl IntoIterator<Item = OrderRow>) -> Result<()> {
        let mut wrote_any = false;
        for row in rows {
            self.writer.serialize(row)?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record([
                "order",
                "vendor",
                "buyer",
                "status",
                "duration",
                "price",
                "shipping",
                "fine",
                "settlement",
                "captured",
                "buyer_order",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
