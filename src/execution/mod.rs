// Order lifecycle: pending buys and the trading loop
pub mod pending;
pub mod tracker;

pub use pending::{PendingBuy, PendingBuys};
pub use tracker::{aggregate_fills, CycleReport, OrderTracker};
