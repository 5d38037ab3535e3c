//! Per-API request gates.
//!
//! Every outbound call acquires a slot from the [`RateLimiter`] before it is
//! sent. The limiter is the only state shared between concurrent sync runs,
//! so it is built once per process and handed around as `Arc<RateLimiter>`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::config::RateLimitConfig;

/// A timing policy for one external API. Never rejects, only delays.
#[async_trait]
pub trait RatePolicy: Send + Sync {
    async fn acquire(&self);
}

/// At most `max_requests` dispatches in any `window`.
///
/// The timestamps live behind a tokio mutex, which queues waiters fairly, so
/// callers are released in arrival order.
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let max_requests = max_requests.max(1) as usize;
        Self {
            max_requests,
            window,
            sent: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }
}

#[async_trait]
impl RatePolicy for SlidingWindowLimiter {
    async fn acquire(&self) {
        let mut sent = self.sent.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&oldest) = sent.front() {
                if now.duration_since(oldest) >= self.window {
                    sent.pop_front();
                } else {
                    break;
                }
            }

            if sent.len() < self.max_requests {
                sent.push_back(now);
                return;
            }

            if let Some(&oldest) = sent.front() {
                let wake_at = oldest + self.window;
                debug!(
                    wait_ms = wake_at.duration_since(now).as_millis() as u64,
                    "[RateLimiter] window full, waiting"
                );
                sleep_until(wake_at).await;
            }
        }
    }
}

/// Minimum spacing of `interval` between consecutive dispatches.
pub struct FixedIntervalLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl FixedIntervalLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl RatePolicy for FixedIntervalLimiter {
    async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let next = previous + self.interval;
            if next > Instant::now() {
                sleep_until(next).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct Unlimited;

#[async_trait]
impl RatePolicy for Unlimited {
    async fn acquire(&self) {}
}

/// Registry of rate policies keyed by API name.
#[derive(Default, Clone)]
pub struct RateLimiter {
    policies: HashMap<String, Arc<dyn RatePolicy>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A limiter that never waits. Any API name passes straight through.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn from_config<'a>(
        limits: impl IntoIterator<Item = (&'a String, &'a RateLimitConfig)>,
    ) -> Self {
        limits.into_iter().fold(Self::new(), |limiter, (api, cfg)| {
            limiter.with_policy(api.clone(), cfg.build())
        })
    }

    pub fn with_policy(mut self, api_name: impl Into<String>, policy: Arc<dyn RatePolicy>) -> Self {
        self.policies.insert(api_name.into(), policy);
        self
    }

    pub async fn acquire(&self, api_name: &str) {
        match self.policies.get(api_name) {
            Some(policy) => policy.acquire().await,
            None => debug!(api = api_name, "[RateLimiter] no policy configured, not throttling"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sliding_window_delays_request_past_the_ceiling() {
        let limiter = Arc::new(SlidingWindowLimiter::new(3, Duration::from_secs(60)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        assert!(finished[2].duration_since(start) < Duration::from_secs(1));
        assert!(finished[3].duration_since(start) >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_interval_spaces_requests() {
        let limiter = FixedIntervalLimiter::new(Duration::from_millis(200));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(400));
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_api_is_not_throttled() {
        let limiter = RateLimiter::new().with_policy(
            "airtable",
            Arc::new(FixedIntervalLimiter::new(Duration::from_secs(5))),
        );
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire("offorte").await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
