use super::pending::PendingBuys;
use crate::api::{ApiOutcome, Exchange};
use crate::models::{AccountIds, CancelAfter, Fill, OrderRequest};
use crate::pricing::{plan_buy, plan_sell, BuySizing};
use crate::settings::StrategySettings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// What one pass of the trading loop did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub buys_placed: usize,
    pub sells_placed: usize,
    pub pending: usize,
}

/// Drives the buy -> fill -> sell lifecycle.
///
/// Each cycle first spends free balance on discounted buys (acquisition),
/// then answers every filled buy with a marked-up sell (resolution). A buy
/// leaves the tracker only once its sell is accepted; failed sells are simply
/// retried on the next cycle.
pub struct OrderTracker<E: Exchange> {
    exchange: E,
    strategy: StrategySettings,
    accounts: AccountIds,
    pending: PendingBuys,
    rng: StdRng,
}

impl<E: Exchange> OrderTracker<E> {
    pub fn new(exchange: E, strategy: StrategySettings, accounts: AccountIds) -> Self {
        Self {
            exchange,
            strategy,
            accounts,
            pending: PendingBuys::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the random source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn pending(&self) -> &PendingBuys {
        &self.pending
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    /// Start tracking buy orders already resting on the exchange, so a restart
    /// still sells what earlier runs bought.
    pub async fn adopt_open_buys(&mut self) -> usize {
        match self.exchange.open_orders().await {
            ApiOutcome::Success(orders) => {
                let adopted = self.pending.adopt(&orders);
                tracing::info!(adopted, "Adopted open buy orders");
                adopted
            }
            ApiOutcome::Empty => 0,
            other => {
                tracing::warn!(
                    outcome = other.kind(),
                    "Could not list open orders, starting with nothing tracked"
                );
                0
            }
        }
    }

    /// Run forever. Stopping is the caller's job (drop the future).
    pub async fn run(&mut self) {
        let interval = self.strategy.poll_interval();
        loop {
            let report = self.run_cycle().await;
            tracing::debug!(
                buys = report.buys_placed,
                sells = report.sells_placed,
                pending = report.pending,
                "Cycle complete"
            );
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let buys_placed = self.run_acquisition().await;
        let sells_placed = self.run_resolution().await;
        CycleReport {
            buys_placed,
            sells_placed,
            pending: self.pending.len(),
        }
    }

    /// Place discounted buys while the balance exceeds the trade amount.
    /// Returns the number of buys placed.
    pub async fn run_acquisition(&mut self) -> usize {
        let sizing = BuySizing {
            trade_amount: self.strategy.trade_amount,
            min_lot_size: self.strategy.min_lot_size,
            size_decimals: self.strategy.size_decimals,
        };
        let mut placed = 0;

        for _ in 0..self.strategy.max_buy_attempts_per_cycle {
            let balance = match self.exchange.available_balance(&self.accounts.quote).await {
                ApiOutcome::Success(balance) => balance,
                other => {
                    tracing::debug!(outcome = other.kind(), "No balance reading, ending acquisition");
                    break;
                }
            };
            if balance <= self.strategy.trade_amount {
                break;
            }

            let market_price = match self.exchange.current_price().await {
                ApiOutcome::Success(price) => price,
                other => {
                    tracing::warn!(outcome = other.kind(), "No market price, ending acquisition");
                    break;
                }
            };

            let decrease = self.pick_decrease();
            let plan = match plan_buy(balance, market_price, decrease, &sizing) {
                Ok(plan) => plan,
                Err(rejection) => {
                    tracing::debug!(?rejection, %market_price, %decrease, "Skipping buy");
                    continue;
                }
            };

            let request = OrderRequest::buy(plan.price, plan.size, self.pick_cancel_after());
            match self.exchange.submit_order(&request).await {
                ApiOutcome::Success(order_id) => {
                    tracing::info!(
                        order_id = %order_id,
                        price = %plan.price,
                        size = %plan.size,
                        %market_price,
                        cancel_after = ?request.cancel_after,
                        "Placed buy order"
                    );
                    self.pending.record_placed(order_id, plan.price, plan.size);
                    placed += 1;
                }
                other => {
                    tracing::warn!(
                        outcome = other.kind(),
                        price = %plan.price,
                        size = %plan.size,
                        "Buy order not placed"
                    );
                }
            }
        }

        placed
    }

    /// Answer every filled buy with a sell. Returns the number of sells placed.
    pub async fn run_resolution(&mut self) -> usize {
        let mut sold = 0;

        for order_id in self.pending.order_ids() {
            let fills = match self.exchange.fills_for_order(&order_id).await {
                ApiOutcome::Success(fills) => fills,
                ApiOutcome::Empty => continue,
                other => {
                    tracing::debug!(order_id = %order_id, outcome = other.kind(), "Fills unavailable");
                    continue;
                }
            };
            let Some((filled_price, filled_size)) = aggregate_fills(&fills) else {
                continue;
            };
            tracing::info!(
                order_id = %order_id,
                price = %filled_price,
                size = %filled_size,
                "Buy order filled"
            );

            let market_price = match self.exchange.current_price().await {
                ApiOutcome::Success(price) => price,
                other => {
                    tracing::warn!(
                        order_id = %order_id,
                        outcome = other.kind(),
                        "No market price, deferring sell"
                    );
                    continue;
                }
            };

            let plan = plan_sell(filled_price, market_price, self.strategy.markup);
            if plan.adjusted {
                tracing::info!(
                    order_id = %order_id,
                    bought = %filled_price,
                    %market_price,
                    sell = %plan.price,
                    "Market already past target, raised sell price to cover fees"
                );
            }

            let request = OrderRequest::sell(plan.price, filled_size);
            match self.exchange.submit_order(&request).await {
                ApiOutcome::Success(sell_id) => {
                    tracing::info!(
                        buy_order_id = %order_id,
                        sell_order_id = %sell_id,
                        price = %plan.price,
                        size = %filled_size,
                        "Placed sell order"
                    );
                    self.pending.remove(&order_id);
                    sold += 1;
                }
                other => {
                    tracing::warn!(
                        order_id = %order_id,
                        outcome = other.kind(),
                        "Sell order not placed, will retry next cycle"
                    );
                }
            }
        }

        sold
    }

    /// Whole-unit discount drawn uniformly from `[min_decrease, max_decrease]`.
    fn pick_decrease(&mut self) -> Decimal {
        let low = self.strategy.min_decrease.ceil().to_i64();
        let high = self.strategy.max_decrease.floor().to_i64();
        match (low, high) {
            (Some(low), Some(high)) if low <= high => Decimal::from(self.rng.gen_range(low..=high)),
            _ => self.strategy.min_decrease,
        }
    }

    /// Spread buy expiries across day and hour.
    fn pick_cancel_after(&mut self) -> CancelAfter {
        if self.rng.gen_bool(0.5) {
            CancelAfter::Day
        } else {
            CancelAfter::Hour
        }
    }
}

/// Total size and size-weighted price of an order's fills.
pub fn aggregate_fills(fills: &[Fill]) -> Option<(Decimal, Decimal)> {
    let size: Decimal = fills.iter().map(|fill| fill.size).sum();
    if size <= Decimal::ZERO {
        return None;
    }
    let notional: Decimal = fills.iter().map(|fill| fill.price * fill.size).sum();
    Some((notional / size, size))
}
