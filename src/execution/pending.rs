use crate::models::{Order, Side};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Price and size a buy order was placed at
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBuy {
    pub price: Decimal,
    pub size: Decimal,
}

/// Buy orders placed but not yet answered with a sell, keyed by order id.
///
/// Lives in memory only; a restart forgets everything except what
/// [`PendingBuys::adopt`] recovers from the exchange's open orders.
/// Holds buy orders only.
#[derive(Debug, Default)]
pub struct PendingBuys {
    entries: HashMap<String, PendingBuy>,
}

impl PendingBuys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a buy the exchange confirmed with `order_id`.
    pub fn record_placed(&mut self, order_id: String, price: Decimal, size: Decimal) {
        self.entries.insert(order_id, PendingBuy { price, size });
    }

    /// Track the buy orders among `orders`, skipping sells and ids already known.
    /// Returns how many were added.
    pub fn adopt(&mut self, orders: &[Order]) -> usize {
        let mut adopted = 0;
        for order in orders.iter().filter(|o| o.side == Side::Buy) {
            if !self.entries.contains_key(&order.id) {
                self.entries.insert(
                    order.id.clone(),
                    PendingBuy {
                        price: order.price,
                        size: order.size,
                    },
                );
                adopted += 1;
            }
        }
        adopted
    }

    pub fn remove(&mut self, order_id: &str) -> Option<PendingBuy> {
        self.entries.remove(order_id)
    }

    pub fn get(&self, order_id: &str) -> Option<&PendingBuy> {
        self.entries.get(order_id)
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.entries.contains_key(order_id)
    }

    /// Snapshot of tracked ids, safe to iterate while removing entries.
    pub fn order_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
