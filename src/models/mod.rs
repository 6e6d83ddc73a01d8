use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Order / fill side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expiry for good-till-time buy orders
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CancelAfter {
    Day,
    Hour,
}

/// An order as listed by the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// An executed (part of an) order. Never changes once reported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fill {
    pub order_id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    #[serde(default)]
    pub trade_id: Option<u64>,
    #[serde(default)]
    pub fee: Option<Decimal>,
}

/// A currency account held on the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: String,
    pub currency: String,
    pub balance: Decimal,
    pub available: Decimal,
    #[serde(default)]
    pub hold: Decimal,
}

/// Account ids for both legs of the traded product, resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIds {
    pub base: String,
    pub quote: String,
}

impl AccountIds {
    /// Pick the ids for `base` and `quote` out of a currency -> id map.
    pub fn from_map(ids: &HashMap<String, String>, base: &str, quote: &str) -> Option<Self> {
        Some(Self {
            base: ids.get(base)?.clone(),
            quote: ids.get(quote)?.clone(),
        })
    }
}

/// What the bot wants to place. Price stays unrounded until submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub cancel_after: Option<CancelAfter>,
}

impl OrderRequest {
    /// Limit buy, good till `cancel_after`
    pub fn buy(price: Decimal, size: Decimal, cancel_after: CancelAfter) -> Self {
        Self {
            side: Side::Buy,
            price,
            size,
            cancel_after: Some(cancel_after),
        }
    }

    /// Limit sell, good till cancelled
    pub fn sell(price: Decimal, size: Decimal) -> Self {
        Self {
            side: Side::Sell,
            price,
            size,
            cancel_after: None,
        }
    }

    /// Build the JSON body sent to `POST /orders`, rounding the price.
    pub fn to_payload(&self, product_id: &str, price_decimals: u32) -> OrderPayload {
        OrderPayload {
            order_type: "limit",
            side: self.side,
            product_id: product_id.to_string(),
            price: self.price.round_dp(price_decimals),
            size: self.size,
            client_oid: Uuid::new_v4(),
            time_in_force: self.cancel_after.map(|_| "GTT"),
            cancel_after: self.cancel_after,
        }
    }
}

/// Wire format of a limit order placement
#[derive(Debug, Clone, Serialize)]
pub struct OrderPayload {
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub side: Side,
    pub product_id: String,
    pub price: Decimal,
    pub size: Decimal,
    pub client_oid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_after: Option<CancelAfter>,
}
