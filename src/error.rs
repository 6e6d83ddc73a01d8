use thiserror::Error;

/// Failures raised while talking to the exchange.
///
/// Only [`ExchangeError::Transport`] is worth retrying; everything else means
/// the request reached the exchange (or never could) and repeating it won't help.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request url: {0}")]
    Url(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

impl ExchangeError {
    /// Timeouts, refused connections and other client-raised HTTP errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeError::Transport(e) => !e.is_builder(),
            _ => false,
        }
    }
}

/// Problems found while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
