use crate::error::ExchangeError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use sha2::Sha256;

pub const SIGN_HEADER: &str = "CB-ACCESS-SIGN";
pub const TIMESTAMP_HEADER: &str = "CB-ACCESS-TIMESTAMP";
pub const KEY_HEADER: &str = "CB-ACCESS-KEY";
pub const PASSPHRASE_HEADER: &str = "CB-ACCESS-PASSPHRASE";

/// Signs requests the way the exchange expects:
/// base64(HMAC-SHA256(base64decode(secret), timestamp + method + path + body))
#[derive(Clone)]
pub struct RequestSigner {
    api_key: String,
    secret: Vec<u8>,
    passphrase: String,
}

impl RequestSigner {
    pub fn new(api_key: &str, api_secret: &str, passphrase: &str) -> Result<Self, ExchangeError> {
        let secret = STANDARD
            .decode(api_secret)
            .map_err(|e| ExchangeError::Signing(format!("secret is not valid base64: {}", e)))?;

        Ok(Self {
            api_key: api_key.to_string(),
            secret,
            passphrase: passphrase.to_string(),
        })
    }

    /// `path` includes the query string, e.g. `/orders?status=open`.
    pub fn signature(
        &self,
        timestamp: &str,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<String, ExchangeError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret)
            .map_err(|e| ExchangeError::Signing(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(method.as_bytes());
        mac.update(path.as_bytes());
        mac.update(body.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Every header an authenticated request carries.
    pub fn headers(
        &self,
        timestamp: &str,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<HeaderMap, ExchangeError> {
        let signature = self.signature(timestamp, method, path, body)?;

        let mut headers = HeaderMap::new();
        headers.insert(SIGN_HEADER, header_value(&signature)?);
        headers.insert(TIMESTAMP_HEADER, header_value(timestamp)?);
        headers.insert(KEY_HEADER, header_value(&self.api_key)?);
        headers.insert(PASSPHRASE_HEADER, header_value(&self.passphrase)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ExchangeError> {
    HeaderValue::from_str(value).map_err(|e| ExchangeError::Signing(e.to_string()))
}
