use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::errors::{AppError, AppResult};

const SWEEP_THRESHOLD: usize = 1024;

/// Sliding-window request budget per caller for the feed entry point.
pub struct RequestThrottle {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RequestThrottle {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1) as usize,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    pub fn check(&self, caller: &str) -> AppResult<()> {
        self.check_at(caller, Instant::now())
    }

    fn check_at(&self, caller: &str, now: Instant) -> AppResult<()> {
        let mut hits = self.hits.lock();
        if hits.len() > SWEEP_THRESHOLD {
            let window = self.window;
            hits.retain(|_, stamps| {
                stamps
                    .back()
                    .is_some_and(|last| now.saturating_duration_since(*last) < window)
            });
        }

        let stamps = hits.entry(caller.to_string()).or_default();
        while stamps
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.window)
        {
            stamps.pop_front();
        }

        if stamps.len() >= self.max_requests {
            let oldest = stamps.front().copied().unwrap_or(now);
            let retry_after = self
                .window
                .saturating_sub(now.saturating_duration_since(oldest));
            warn!(caller, retry_after_ms = retry_after.as_millis() as u64, "feed request rate limited");
            return Err(AppError::RateLimited {
                retry_after_ms: retry_after.as_millis() as u64,
            });
        }

        stamps.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_callers_over_budget_until_window_slides() {
        let throttle = RequestThrottle::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(throttle.check_at("alice", start).is_ok());
        assert!(throttle
            .check_at("alice", start + Duration::from_secs(10))
            .is_ok());
        let err = throttle
            .check_at("alice", start + Duration::from_secs(20))
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert!(matches!(err, AppError::RateLimited { retry_after_ms } if retry_after_ms == 40_000));

        assert!(throttle.check_at("bob", start + Duration::from_secs(20)).is_ok());
        assert!(throttle
            .check_at("alice", start + Duration::from_secs(61))
            .is_ok());
    }
}
