use crate::error::ConfigError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `SPREADBOT__EXCHANGE__API_KEY`.
pub const ENV_PREFIX: &str = "SPREADBOT";

/// Immutable bot configuration, loaded once at startup and handed to every
/// component that needs it.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub exchange: ExchangeSettings,
    pub strategy: StrategySettings,
    pub resilience: ResilienceSettings,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub base_url: String,
    pub api_key: String,
    /// Base64 encoded, as issued by the exchange.
    pub api_secret: String,
    pub passphrase: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub request_timeout_secs: u64,
}

// Hand-written so credentials never end up in logs.
impl std::fmt::Debug for ExchangeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeSettings")
            .field("base_url", &self.base_url)
            .field("base_currency", &self.base_currency)
            .field("quote_currency", &self.quote_currency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchange.coinbase.com/".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            passphrase: String::new(),
            base_currency: "BTC".to_string(),
            quote_currency: "USD".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ExchangeSettings {
    /// Product traded by the bot, e.g. `BTC-USD`.
    pub fn product_id(&self) -> String {
        format!("{}-{}", self.base_currency, self.quote_currency)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Trading parameters. All money amounts are in the quote currency.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    /// Dollar amount spent per buy order; also the balance threshold for buying.
    pub trade_amount: Decimal,
    pub min_decrease: Decimal,
    pub max_decrease: Decimal,
    /// Fixed amount added to the fill price to get the sell price.
    pub markup: Decimal,
    /// Smallest order size the exchange accepts.
    pub min_lot_size: Decimal,
    pub size_decimals: u32,
    pub price_decimals: u32,
    pub poll_interval_ms: u64,
    pub max_buy_attempts_per_cycle: u32,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            trade_amount: Decimal::new(15, 0),
            min_decrease: Decimal::new(3, 0),
            max_decrease: Decimal::new(300, 0),
            markup: Decimal::new(10, 0),
            min_lot_size: Decimal::new(1, 3),
            size_decimals: 3,
            price_decimals: 2,
            poll_interval_ms: 1_000,
            max_buy_attempts_per_cycle: 25,
        }
    }
}

impl StrategySettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Rate limit and retry discipline applied to every exchange call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub rate_limit_calls: u32,
    pub rate_limit_period_ms: u64,
    pub max_attempts: u32,
    /// Linear backoff unit: attempt `n` sleeps `n * backoff_ms`.
    pub backoff_ms: u64,
    /// Upper bound for one call including every retry. `None` waits forever.
    pub call_deadline_secs: Option<u64>,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            rate_limit_calls: 5,
            rate_limit_period_ms: 1_000,
            max_attempts: 1_000,
            backoff_ms: 5_000,
            call_deadline_secs: Some(600),
        }
    }
}

impl ResilienceSettings {
    pub fn rate_limit_period(&self) -> Duration {
        Duration::from_millis(self.rate_limit_period_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn call_deadline(&self) -> Option<Duration> {
        self.call_deadline_secs.map(Duration::from_secs)
    }
}

impl Settings {
    /// Load settings from defaults, an optional TOML file and the environment,
    /// in increasing order of precedence.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("spreadbot").required(false)),
        };

        let settings: Settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject configurations the bot cannot trade with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let exchange = &self.exchange;
        if exchange.api_key.is_empty() {
            return Err(ConfigError::Missing("exchange.api_key"));
        }
        if exchange.api_secret.is_empty() {
            return Err(ConfigError::Missing("exchange.api_secret"));
        }
        if exchange.passphrase.is_empty() {
            return Err(ConfigError::Missing("exchange.passphrase"));
        }
        if let Err(e) = STANDARD.decode(&exchange.api_secret) {
            return Err(ConfigError::Invalid {
                field: "exchange.api_secret",
                reason: format!("not valid base64: {}", e),
            });
        }
        if let Err(e) = reqwest::Url::parse(&exchange.base_url) {
            return Err(ConfigError::Invalid {
                field: "exchange.base_url",
                reason: e.to_string(),
            });
        }

        let strategy = &self.strategy;
        if strategy.trade_amount <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "strategy.trade_amount",
                reason: "must be positive".to_string(),
            });
        }
        if strategy.min_decrease < Decimal::ZERO || strategy.min_decrease > strategy.max_decrease
        {
            return Err(ConfigError::Invalid {
                field: "strategy.min_decrease",
                reason: format!(
                    "range [{}, {}] is empty or negative",
                    strategy.min_decrease, strategy.max_decrease
                ),
            });
        }
        if strategy.markup <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "strategy.markup",
                reason: "must be positive".to_string(),
            });
        }

        if self.resilience.rate_limit_calls == 0 {
            return Err(ConfigError::Invalid {
                field: "resilience.rate_limit_calls",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.resilience.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "resilience.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
