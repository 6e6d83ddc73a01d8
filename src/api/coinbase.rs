use super::auth::RequestSigner;
use super::{filter_orders_by_side, order_id_in_fills, order_id_in_orders, ApiOutcome, Exchange};
use crate::error::ExchangeError;
use crate::models::{Account, AccountIds, Fill, Order, OrderRequest, Side};
use crate::resilience::ResilientCaller;
use crate::settings::{ExchangeSettings, Settings};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode, Url};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;

/// Client for the exchange REST API (Coinbase Exchange dialect)
///
/// Every call is signed, rate limited and retried through the shared
/// [`ResilientCaller`]. Accessors never return `Err`: problems come back as
/// [`ApiOutcome`] variants after being logged.
#[derive(Clone)]
pub struct ExchangeClient {
    client: Client,
    base_url: Url,
    product_id: String,
    price_decimals: u32,
    signer: RequestSigner,
    caller: ResilientCaller,
}

#[derive(Debug, Deserialize)]
struct Ticker {
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct PlacedOrder {
    #[serde(default)]
    id: Option<String>,
}

impl ExchangeClient {
    pub fn new(
        exchange: &ExchangeSettings,
        price_decimals: u32,
        caller: ResilientCaller,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder().timeout(exchange.request_timeout()).build()?;

        // Url::join drops the last segment unless the base ends with '/'
        let mut base = exchange.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| ExchangeError::Url(e.to_string()))?;

        let signer = RequestSigner::new(
            &exchange.api_key,
            &exchange.api_secret,
            &exchange.passphrase,
        )?;

        Ok(Self {
            client,
            base_url,
            product_id: exchange.product_id(),
            price_decimals,
            signer,
            caller,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ExchangeError> {
        Self::new(
            &settings.exchange,
            settings.strategy.price_decimals,
            ResilientCaller::from_settings(&settings.resilience),
        )
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// One signed request. 200 yields the body, any other status is logged and
    /// reported as `PermanentError`; transport failures bubble up for retry.
    async fn send_once(
        &self,
        operation: &str,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&str>,
    ) -> Result<ApiOutcome<String>, ExchangeError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ExchangeError::Url(e.to_string()))?;

        let mut builder = self.client.request(method.clone(), url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.body(body.to_string());
        }
        let mut request = builder.build()?;

        let mut signed_path = request.url().path().to_string();
        if let Some(q) = request.url().query() {
            signed_path.push('?');
            signed_path.push_str(q);
        }
        let timestamp = Utc::now().timestamp().to_string();
        let headers = self.signer.headers(
            &timestamp,
            method.as_str(),
            &signed_path,
            body.unwrap_or(""),
        )?;
        request.headers_mut().extend(headers);

        let response = self.client.execute(request).await?;
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::OK {
            Ok(ApiOutcome::Success(text))
        } else {
            tracing::warn!(
                operation,
                status = status.as_u16(),
                body = %text,
                "Exchange API returned an error"
            );
            Ok(ApiOutcome::PermanentError {
                status: Some(status.as_u16()),
                message: text,
            })
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&str>,
    ) -> ApiOutcome<T> {
        let outcome = self
            .caller
            .call(operation, || {
                self.send_once(operation, &method, path, query, body)
            })
            .await;

        match outcome {
            ApiOutcome::Success(text) => match serde_json::from_str(&text) {
                Ok(value) => ApiOutcome::Success(value),
                Err(e) => {
                    tracing::warn!(operation, error = %e, body = %text, "Undecodable response");
                    ApiOutcome::PermanentError {
                        status: Some(StatusCode::OK.as_u16()),
                        message: e.to_string(),
                    }
                }
            },
            ApiOutcome::Empty => ApiOutcome::Empty,
            ApiOutcome::TransientError(message) => ApiOutcome::TransientError(message),
            ApiOutcome::PermanentError { status, message } => {
                ApiOutcome::PermanentError { status, message }
            }
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> ApiOutcome<T> {
        self.request(operation, Method::GET, path, query, None).await
    }

    /// Last traded price of the product
    pub async fn get_current_price(&self) -> ApiOutcome<Decimal> {
        let path = format!("products/{}/ticker", self.product_id);
        let outcome = self.get::<Ticker>("ticker", &path, &[]).await.map(|t| t.price);
        if let ApiOutcome::Success(price) = &outcome {
            tracing::debug!(product = %self.product_id, %price, "Fetched ticker");
        }
        outcome
    }

    /// Orders still resting on the book
    pub async fn get_open_orders(&self) -> ApiOutcome<Vec<Order>> {
        let query = [
            ("status", "open".to_string()),
            ("product_id", self.product_id.clone()),
        ];
        self.get::<Vec<Order>>("open_orders", "orders", &query)
            .await
            .non_empty()
    }

    /// Orders without a status filter (exchange default statuses)
    pub async fn get_orders(&self) -> ApiOutcome<Vec<Order>> {
        let query = [("product_id", self.product_id.clone())];
        self.get::<Vec<Order>>("orders", "orders", &query)
            .await
            .non_empty()
    }

    pub async fn get_fills_for_order(&self, order_id: &str) -> ApiOutcome<Vec<Fill>> {
        let query = [
            ("order_id", order_id.to_string()),
            ("product_id", self.product_id.clone()),
        ];
        self.get::<Vec<Fill>>("order_fills", "fills", &query)
            .await
            .non_empty()
    }

    /// Every fill on the product, both sides
    pub async fn get_fills(&self) -> ApiOutcome<Vec<Fill>> {
        let query = [("product_id", self.product_id.clone())];
        self.get::<Vec<Fill>>("fills", "fills", &query)
            .await
            .non_empty()
    }

    /// Fills on one side. The exchange can't filter by side, so this fetches
    /// everything and filters locally.
    pub async fn get_fills_by_side(&self, side: Side) -> ApiOutcome<Vec<Fill>> {
        match self.get_fills().await {
            ApiOutcome::Success(fills) => ApiOutcome::from_list(
                fills.into_iter().filter(|fill| fill.side == side).collect(),
            ),
            other => other,
        }
    }

    pub async fn list_accounts(&self) -> ApiOutcome<Vec<Account>> {
        self.get::<Vec<Account>>("accounts", "accounts", &[])
            .await
            .non_empty()
    }

    /// Currency code -> account id
    pub async fn get_account_ids(&self) -> ApiOutcome<HashMap<String, String>> {
        self.list_accounts().await.map(|accounts| {
            accounts
                .into_iter()
                .map(|account| (account.currency, account.id))
                .collect()
        })
    }

    /// Look up the base and quote accounts for the traded product.
    pub async fn resolve_account_ids(&self, base: &str, quote: &str) -> ApiOutcome<AccountIds> {
        match self.get_account_ids().await {
            ApiOutcome::Success(ids) => match AccountIds::from_map(&ids, base, quote) {
                Some(ids) => ApiOutcome::Success(ids),
                None => {
                    tracing::warn!(base, quote, "No account found for product currencies");
                    ApiOutcome::Empty
                }
            },
            ApiOutcome::Empty => ApiOutcome::Empty,
            ApiOutcome::TransientError(message) => ApiOutcome::TransientError(message),
            ApiOutcome::PermanentError { status, message } => {
                ApiOutcome::PermanentError { status, message }
            }
        }
    }

    pub async fn get_account(&self, account_id: &str) -> ApiOutcome<Account> {
        let path = format!("accounts/{}", account_id);
        self.get("account", &path, &[]).await
    }

    /// Funds free to trade in the given account
    pub async fn get_available_balance(&self, account_id: &str) -> ApiOutcome<Decimal> {
        let outcome = self.get_account(account_id).await;
        if let ApiOutcome::Success(account) = &outcome {
            tracing::debug!(
                currency = %account.currency,
                available = %account.available,
                "Fetched balance"
            );
        }
        outcome.map(|account| account.available)
    }

    /// Place a limit order and return the exchange's order id.
    ///
    /// The payload (and its `client_oid`) is built once, so a retried POST is
    /// recognisable as the same order on the exchange side.
    pub async fn place_order(&self, request: &OrderRequest) -> ApiOutcome<String> {
        let payload = request.to_payload(&self.product_id, self.price_decimals);
        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode order payload");
                return ApiOutcome::PermanentError {
                    status: None,
                    message: e.to_string(),
                };
            }
        };

        let outcome: ApiOutcome<PlacedOrder> = self
            .request("place_order", Method::POST, "orders", &[], Some(&body))
            .await;

        match outcome {
            ApiOutcome::Success(PlacedOrder { id: Some(id) }) if !id.is_empty() => {
                tracing::info!(
                    order_id = %id,
                    side = %payload.side,
                    price = %payload.price,
                    size = %payload.size,
                    client_oid = %payload.client_oid,
                    "Order accepted"
                );
                ApiOutcome::Success(id)
            }
            ApiOutcome::Success(_) | ApiOutcome::Empty => {
                tracing::warn!(side = %payload.side, "Order response carried no id");
                ApiOutcome::Empty
            }
            other => other.map(|placed| placed.id.unwrap_or_default()),
        }
    }

    /// Open buy orders; an API failure reads as "none".
    pub async fn get_buy_orders(&self) -> Vec<Order> {
        filter_orders_by_side(&self.get_open_orders().await.unwrap_or_default(), Side::Buy)
    }

    /// Open sell orders; an API failure reads as "none".
    pub async fn get_sell_orders(&self) -> Vec<Order> {
        filter_orders_by_side(&self.get_open_orders().await.unwrap_or_default(), Side::Sell)
    }

    pub async fn count_sell_orders(&self) -> usize {
        self.get_sell_orders().await.len()
    }

    pub async fn is_order_filled(&self, order_id: &str) -> bool {
        order_id_in_fills(order_id, &self.get_fills().await.unwrap_or_default())
    }

    pub async fn is_order_still_active(&self, order_id: &str) -> bool {
        order_id_in_orders(order_id, &self.get_open_orders().await.unwrap_or_default())
    }
}

#[async_trait]
impl Exchange for ExchangeClient {
    async fn current_price(&self) -> ApiOutcome<Decimal> {
        self.get_current_price().await
    }

    async fn available_balance(&self, account_id: &str) -> ApiOutcome<Decimal> {
        self.get_available_balance(account_id).await
    }

    async fn open_orders(&self) -> ApiOutcome<Vec<Order>> {
        self.get_open_orders().await
    }

    async fn fills_for_order(&self, order_id: &str) -> ApiOutcome<Vec<Fill>> {
        self.get_fills_for_order(order_id).await
    }

    async fn submit_order(&self, request: &OrderRequest) -> ApiOutcome<String> {
        self.place_order(request).await
    }
}
