// Core modules
pub mod api;
pub mod error;
pub mod execution;
pub mod models;
pub mod pricing;
pub mod resilience;
pub mod settings;

// Re-export commonly used types
pub use api::{ApiOutcome, Exchange, ExchangeClient};
pub use error::{ConfigError, ExchangeError};
pub use models::*;
pub use settings::Settings;
