// Rate limiting and retry applied to every exchange call
pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::FixedWindowLimiter;
pub use retry::{ResilientCaller, RetryPolicy, Retryable};
