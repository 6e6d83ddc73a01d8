use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use spreadbot::api::{ApiOutcome, Exchange};
use spreadbot::execution::OrderTracker;
use spreadbot::models::{AccountIds, Fill, Order, OrderRequest, Side};
use spreadbot::settings::StrategySettings;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[derive(Default)]
struct Book {
    balance: Decimal,
    price: Option<Decimal>,
    open_orders: Vec<Order>,
    fills: HashMap<String, Vec<Fill>>,
    next_ids: VecDeque<String>,
    submitted: Vec<OrderRequest>,
    reject_sells: bool,
    reject_buys: bool,
    issued: usize,
}

/// In-memory exchange: buys reserve their cost, fills are injected by the test.
#[derive(Default)]
struct FakeExchange {
    book: Mutex<Book>,
}

impl FakeExchange {
    fn new(balance: &str, price: &str) -> Self {
        let exchange = Self::default();
        {
            let mut book = exchange.book.lock().unwrap();
            book.balance = dec(balance);
            book.price = Some(dec(price));
        }
        exchange
    }

    fn with_ids(self, ids: &[&str]) -> Self {
        self.book.lock().unwrap().next_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    fn set_price(&self, price: &str) {
        self.book.lock().unwrap().price = Some(dec(price));
    }

    fn set_balance(&self, balance: &str) {
        self.book.lock().unwrap().balance = dec(balance);
    }

    fn fill(&self, order_id: &str, price: &str, size: &str) {
        self.book
            .lock()
            .unwrap()
            .fills
            .entry(order_id.to_string())
            .or_default()
            .push(Fill {
                order_id: order_id.to_string(),
                side: Side::Buy,
                price: dec(price),
                size: dec(size),
                trade_id: None,
                fee: None,
            });
    }

    fn reject_sells(&self, reject: bool) {
        self.book.lock().unwrap().reject_sells = reject;
    }

    fn submitted(&self) -> Vec<OrderRequest> {
        self.book.lock().unwrap().submitted.clone()
    }

    fn sells(&self) -> Vec<OrderRequest> {
        self.submitted()
            .into_iter()
            .filter(|request| request.side == Side::Sell)
            .collect()
    }
}

#[async_trait]
impl Exchange for FakeExchange {
    async fn current_price(&self) -> ApiOutcome<Decimal> {
        match self.book.lock().unwrap().price {
            Some(price) => ApiOutcome::Success(price),
            None => ApiOutcome::TransientError("ticker unavailable".to_string()),
        }
    }

    async fn available_balance(&self, account_id: &str) -> ApiOutcome<Decimal> {
        assert_eq!(account_id, "usd-acct");
        ApiOutcome::Success(self.book.lock().unwrap().balance)
    }

    async fn open_orders(&self) -> ApiOutcome<Vec<Order>> {
        ApiOutcome::from_list(self.book.lock().unwrap().open_orders.clone())
    }

    async fn fills_for_order(&self, order_id: &str) -> ApiOutcome<Vec<Fill>> {
        let fills = self.book.lock().unwrap().fills.get(order_id).cloned();
        ApiOutcome::from_list(fills.unwrap_or_default())
    }

    async fn submit_order(&self, request: &OrderRequest) -> ApiOutcome<String> {
        let mut book = self.book.lock().unwrap();
        book.submitted.push(request.clone());

        let rejected = match request.side {
            Side::Buy => book.reject_buys,
            Side::Sell => book.reject_sells,
        };
        if rejected {
            return ApiOutcome::PermanentError {
                status: Some(400),
                message: "rejected".to_string(),
            };
        }

        if request.side == Side::Buy {
            book.balance -= request.price * request.size;
        }
        book.issued += 1;
        let issued = book.issued;
        let id = book
            .next_ids
            .pop_front()
            .unwrap_or_else(|| format!("order-{}", issued));
        ApiOutcome::Success(id)
    }
}

fn accounts() -> AccountIds {
    AccountIds {
        base: "btc-acct".to_string(),
        quote: "usd-acct".to_string(),
    }
}

fn strategy(min_decrease: &str, max_decrease: &str) -> StrategySettings {
    StrategySettings {
        trade_amount: dec("15"),
        min_decrease: dec(min_decrease),
        max_decrease: dec(max_decrease),
        markup: dec("10"),
        min_lot_size: dec("0.001"),
        size_decimals: 3,
        poll_interval_ms: 1000,
        max_buy_attempts_per_cycle: 25,
        ..Default::default()
    }
}

fn tracker(exchange: FakeExchange, strategy: StrategySettings) -> OrderTracker<FakeExchange> {
    OrderTracker::new(exchange, strategy, accounts()).with_rng(StdRng::seed_from_u64(42))
}

#[tokio::test]
async fn test_acquisition_places_one_affordable_buy() {
    // balance 20, $15 trades, market 10000, fixed discount of 50
    let exchange = FakeExchange::new("20", "10000").with_ids(&["abc123"]);
    let mut tracker = tracker(exchange, strategy("50", "50"));

    let placed = tracker.run_acquisition().await;

    assert_eq!(placed, 1);
    let submitted = tracker.exchange().submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].side, Side::Buy);
    assert_eq!(submitted[0].price, dec("9950"));
    assert_eq!(submitted[0].size, dec("0.002"));
    assert!(submitted[0].cancel_after.is_some());

    let entry = tracker.pending().get("abc123").unwrap();
    assert_eq!(entry.price, dec("9950"));
    assert_eq!(entry.size, dec("0.002"));
}

#[tokio::test]
async fn test_acquisition_spends_down_to_trade_amount() {
    let exchange = FakeExchange::new("100", "1000");
    let mut tracker = tracker(exchange, strategy("3", "300"));

    let placed = tracker.run_acquisition().await;

    assert!(placed >= 5);
    assert_eq!(tracker.pending().len(), placed);
    let book = tracker.exchange().book.lock().unwrap();
    assert!(book.balance <= dec("15"));
    assert!(book.submitted.iter().all(|request| {
        request.side == Side::Buy && request.price >= dec("700") && request.price <= dec("997")
    }));
}

#[tokio::test]
async fn test_no_buy_when_balance_at_trade_amount() {
    let exchange = FakeExchange::new("15", "10000");
    let mut tracker = tracker(exchange, strategy("50", "50"));

    assert_eq!(tracker.run_acquisition().await, 0);
    assert!(tracker.exchange().submitted().is_empty());
}

#[tokio::test]
async fn test_no_buy_without_market_price() {
    let exchange = FakeExchange::new("20", "10000");
    exchange.book.lock().unwrap().price = None;
    let mut tracker = tracker(exchange, strategy("50", "50"));

    assert_eq!(tracker.run_acquisition().await, 0);
    assert!(tracker.pending().is_empty());
}

#[tokio::test]
async fn test_rejected_buys_are_bounded_per_cycle() {
    let exchange = FakeExchange::new("1000", "10000");
    exchange.book.lock().unwrap().reject_buys = true;
    let mut strategy = strategy("50", "50");
    strategy.max_buy_attempts_per_cycle = 4;
    let mut tracker = tracker(exchange, strategy);

    assert_eq!(tracker.run_acquisition().await, 0);
    assert_eq!(tracker.exchange().submitted().len(), 4);
    assert!(tracker.pending().is_empty());
}

#[tokio::test]
async fn test_filled_buy_sold_at_markup() {
    // market 103 minus 3 puts the buy at 100
    let exchange = FakeExchange::new("20", "103").with_ids(&["abc123", "sell-1"]);
    let mut tracker = tracker(exchange, strategy("3", "3"));
    assert_eq!(tracker.run_acquisition().await, 1);

    tracker.exchange().fill("abc123", "100", "0.15");
    tracker.exchange().set_price("105");
    tracker.exchange().set_balance("0");

    let report = tracker.run_cycle().await;

    assert_eq!(report.sells_placed, 1);
    assert_eq!(report.pending, 0);
    let sells = tracker.exchange().sells();
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].price, dec("110"));
    assert_eq!(sells[0].size, dec("0.15"));
    assert!(sells[0].cancel_after.is_none());
}

#[tokio::test]
async fn test_sell_follows_market_past_target() {
    let exchange = FakeExchange::new("0", "115");
    exchange.book.lock().unwrap().open_orders = vec![Order {
        id: "abc123".to_string(),
        side: Side::Buy,
        price: dec("100"),
        size: dec("0.15"),
        product_id: None,
        status: Some("open".to_string()),
        created_at: None,
    }];
    let mut tracker = tracker(exchange, strategy("3", "3"));
    assert_eq!(tracker.adopt_open_buys().await, 1);

    tracker.exchange().fill("abc123", "100", "0.15");
    tracker.run_cycle().await;

    let sells = tracker.exchange().sells();
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].price, dec("125"));
    assert!(tracker.pending().is_empty());
}

#[tokio::test]
async fn test_partial_fills_sold_together() {
    let exchange = FakeExchange::new("20", "103").with_ids(&["abc123"]);
    let mut tracker = tracker(exchange, strategy("3", "3"));
    tracker.run_acquisition().await;

    tracker.exchange().fill("abc123", "100", "0.05");
    tracker.exchange().fill("abc123", "103", "0.10");
    tracker.exchange().set_price("100");
    tracker.exchange().set_balance("0");
    tracker.run_cycle().await;

    let sells = tracker.exchange().sells();
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].size, dec("0.15"));
    // (100 * 0.05 + 103 * 0.10) / 0.15 = 102, plus markup
    assert_eq!(sells[0].price, dec("112"));
}

#[tokio::test]
async fn test_failed_sell_stays_tracked_until_accepted() {
    let exchange = FakeExchange::new("20", "103").with_ids(&["abc123"]);
    let mut tracker = tracker(exchange, strategy("3", "3"));
    tracker.run_acquisition().await;

    tracker.exchange().fill("abc123", "100", "0.15");
    tracker.exchange().set_balance("0");
    tracker.exchange().reject_sells(true);

    let report = tracker.run_cycle().await;
    assert_eq!(report.sells_placed, 0);
    assert!(tracker.pending().contains("abc123"));

    tracker.exchange().reject_sells(false);
    let report = tracker.run_cycle().await;
    assert_eq!(report.sells_placed, 1);
    assert!(!tracker.pending().contains("abc123"));
    // one rejected attempt, one accepted
    assert_eq!(tracker.exchange().sells().len(), 2);
}

#[tokio::test]
async fn test_unfilled_buy_keeps_waiting() {
    let exchange = FakeExchange::new("20", "103").with_ids(&["abc123"]);
    let mut tracker = tracker(exchange, strategy("3", "3"));
    tracker.run_acquisition().await;
    tracker.exchange().set_balance("0");

    for _ in 0..3 {
        let report = tracker.run_cycle().await;
        assert_eq!(report.sells_placed, 0);
        assert_eq!(report.pending, 1);
    }
    assert!(tracker.exchange().sells().is_empty());
}

#[tokio::test]
async fn test_sell_deferred_without_market_price() {
    let exchange = FakeExchange::new("20", "103").with_ids(&["abc123"]);
    let mut tracker = tracker(exchange, strategy("3", "3"));
    tracker.run_acquisition().await;

    tracker.exchange().fill("abc123", "100", "0.15");
    tracker.exchange().set_balance("0");
    tracker.exchange().book.lock().unwrap().price = None;

    tracker.run_cycle().await;
    assert!(tracker.pending().contains("abc123"));
    assert!(tracker.exchange().sells().is_empty());
}

#[tokio::test]
async fn test_adopt_ignores_sell_orders() {
    let exchange = FakeExchange::new("0", "100");
    let order = |id: &str, side: Side| Order {
        id: id.to_string(),
        side,
        price: dec("90"),
        size: dec("0.1"),
        product_id: Some("BTC-USD".to_string()),
        status: Some("open".to_string()),
        created_at: None,
    };
    exchange.book.lock().unwrap().open_orders =
        vec![order("b-1", Side::Buy), order("s-1", Side::Sell), order("b-2", Side::Buy)];
    let mut tracker = tracker(exchange, strategy("3", "3"));

    assert_eq!(tracker.adopt_open_buys().await, 2);
    assert!(!tracker.pending().contains("s-1"));
    // adopting again adds nothing
    assert_eq!(tracker.adopt_open_buys().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_keeps_cycling_until_dropped() {
    let exchange = FakeExchange::new("20", "103").with_ids(&["abc123"]);
    let mut tracker = tracker(exchange, strategy("3", "3"));
    tracker.exchange().fill("abc123", "100", "0.15");

    let stopped = tokio::time::timeout(Duration::from_millis(3500), tracker.run()).await;

    assert!(stopped.is_err());
    // bought in the first cycle, filled immediately, sold in the same cycle
    assert_eq!(tracker.exchange().sells().len(), 1);
    assert!(tracker.pending().is_empty());
}
