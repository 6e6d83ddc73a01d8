pub mod auth;
pub mod coinbase;
pub mod outcome;

pub use auth::RequestSigner;
pub use coinbase::ExchangeClient;
pub use outcome::ApiOutcome;

use crate::models::{Fill, Order, OrderRequest, Side};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// The exchange operations the order tracker depends on.
///
/// Implemented by [`ExchangeClient`] for live trading; tests substitute an
/// in-memory exchange.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn current_price(&self) -> ApiOutcome<Decimal>;

    async fn available_balance(&self, account_id: &str) -> ApiOutcome<Decimal>;

    async fn open_orders(&self) -> ApiOutcome<Vec<Order>>;

    async fn fills_for_order(&self, order_id: &str) -> ApiOutcome<Vec<Fill>>;

    /// Returns the exchange-assigned order id on success.
    async fn submit_order(&self, request: &OrderRequest) -> ApiOutcome<String>;
}

pub fn filter_orders_by_side(orders: &[Order], side: Side) -> Vec<Order> {
    orders
        .iter()
        .filter(|order| order.side == side)
        .cloned()
        .collect()
}

/// Order ids are compared case-insensitively.
pub fn order_id_in_fills(order_id: &str, fills: &[Fill]) -> bool {
    fills
        .iter()
        .any(|fill| fill.order_id.eq_ignore_ascii_case(order_id))
}

pub fn order_id_in_orders(order_id: &str, orders: &[Order]) -> bool {
    orders
        .iter()
        .any(|order| order.id.eq_ignore_ascii_case(order_id))
}
