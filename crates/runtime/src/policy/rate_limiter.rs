//! Sliding-window rate limiter.

use std::collections::VecDeque;
use tokio::time::Instant;

use super::config::RateLimitConfig;

/// Tracks acquisition timestamps inside a sliding window. Acquisitions are
/// allowed while fewer than `limit` of them happened within the last
/// `window`.
#[derive(Debug)]
pub struct RateLimiterWindow {
    config: RateLimitConfig,
    timestamps: VecDeque<Instant>,
}

impl RateLimiterWindow {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            timestamps: VecDeque::new(),
        }
    }

    /// Try to acquire a slot now. Returns false when the window is full.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        while let Some(front) = self.timestamps.front() {
            if now.duration_since(*front) >= self.config.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        if self.timestamps.len() < self.config.limit {
            self.timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn rejects_above_limit_within_window() {
        let mut limiter = RateLimiterWindow::new(RateLimitConfig {
            limit: 3,
            window: Duration::from_secs(10),
        });
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn slots_free_up_as_window_slides() {
        let mut limiter = RateLimiterWindow::new(RateLimitConfig {
            limit: 2,
            window: Duration::from_secs(10),
        });
        assert!(limiter.try_acquire());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        // First slot expires at t=10; second is still inside the window.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
