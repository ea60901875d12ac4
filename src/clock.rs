//! Time source used by every suspension point in the cycle (schedule waits,
//! retry backoff, rate-limit waits, inter-post delays).
//!
//! Production code uses [`SystemClock`]; tests use [`ManualClock`], which
//! advances its own notion of "now" instead of sleeping and records every wait.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, dur: Duration);

    /// Sleep until `at`; returns immediately when `at` is already in the past.
    async fn sleep_until(&self, at: DateTime<Utc>) {
        let now = self.now();
        if at > now {
            let wait = (at - now).to_std().unwrap_or_default();
            self.sleep(wait).await;
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}

/// Deterministic clock for tests: `sleep` advances time instantly.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<ManualInner>,
}

#[derive(Debug)]
struct ManualInner {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(ManualInner {
                now: start,
                sleeps: Vec::new(),
            }),
        }
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner
            .lock()
            .map(|g| g.sleeps.clone())
            .unwrap_or_default()
    }

    pub fn advance(&self, dur: Duration) {
        if let Ok(mut g) = self.inner.lock() {
            g.now += chrono::Duration::from_std(dur).unwrap_or_default();
        }
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().map(|g| g.now).unwrap_or_else(|_| Utc::now())
    }

    async fn sleep(&self, dur: Duration) {
        if let Ok(mut g) = self.inner.lock() {
            g.sleeps.push(dur);
            g.now += chrono::Duration::from_std(dur).unwrap_or_default();
        }
    }
}
