use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Window {
    started: Option<Instant>,
    calls: u32,
}

/// Fixed-window call limiter shared by every exchange call.
///
/// A window opens on the first call after the previous one expired and admits
/// `max_calls` calls. Callers beyond that wait until the window closes instead
/// of failing.
pub struct FixedWindowLimiter {
    max_calls: u32,
    period: Duration,
    window: Mutex<Window>,
}

impl FixedWindowLimiter {
    pub fn new(max_calls: u32, period: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            period,
            window: Mutex::new(Window {
                started: None,
                calls: 0,
            }),
        }
    }

    /// Take a slot without waiting. On refusal returns how long until the
    /// current window closes.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        let mut window = self.window.lock().await;
        let now = Instant::now();

        match window.started {
            Some(started) if now.duration_since(started) < self.period => {
                if window.calls < self.max_calls {
                    window.calls += 1;
                    Ok(())
                } else {
                    Err(self.period - now.duration_since(started))
                }
            }
            _ => {
                window.started = Some(now);
                window.calls = 1;
                Ok(())
            }
        }
    }

    /// Take a slot, sleeping until one is free.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire().await {
                Ok(()) => return,
                Err(wait) => {
                    tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, sleeping");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
