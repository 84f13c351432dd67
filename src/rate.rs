//! Bounded admission for outbound venue operations.

use std::time::Duration;

use tokio::time::Instant;

/// Admits up to `rate` operations per `period`.
///
/// Callers beyond the budget suspend in `block` until the window
/// resets; fairness is arrival order because waiters queue on the
/// internal `tokio::sync::Mutex`. Blocking is not cancellable - a
/// caller that needs a deadline wraps the call in `tokio::time::timeout`.
pub struct RateLimiter {
    rate: usize,
    period: Duration,
    window: tokio::sync::Mutex<Window>,
}

struct Window {
    started: Instant,
    admitted: usize,
}

impl RateLimiter {
    pub fn new(rate: usize, period: Duration) -> Self {
        Self {
            rate: rate.max(1),
            period,
            window: tokio::sync::Mutex::new(Window {
                started: Instant::now(),
                admitted: 0,
            }),
        }
    }

    /// Take one permit, suspending until the current window has budget.
    pub async fn block(&self) {
        let mut window = self.window.lock().await;
        loop {
            let now = Instant::now();
            if now.duration_since(window.started) >= self.period {
                window.started = now;
                window.admitted = 0;
            }
            if window.admitted < self.rate {
                window.admitted += 1;
                return;
            }
            // Hold the lock across the sleep so later arrivals stay
            // queued behind this caller.
            tokio::time::sleep_until(window.started + self.period).await;
        }
    }
}
