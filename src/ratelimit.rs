//! In-memory request rate limiting.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub trait RateLimiter: Send + Sync {
    /// Record one request for `key` and report whether it may proceed.
    fn allow(&self, key: &str) -> bool;

    /// Time until `key` may make requests again.
    fn retry_after(&self, key: &str) -> Duration;
}

struct Window {
    started: Instant,
    count: u32,
}

struct Windows {
    by_key: HashMap<String, Window>,
    /// Stale keys are swept at most once per window, at this instant.
    next_sweep: Instant,
}

/// Fixed-window counter: at most `limit` requests per key per `window`.
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<Windows>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(Windows {
                by_key: HashMap::new(),
                next_sweep: Instant::now() + window,
            }),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    fn lock(&self) -> MutexGuard<'_, Windows> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut windows = self.lock();

        if now >= windows.next_sweep {
            let window = self.window;
            windows
                .by_key
                .retain(|_, w| now.duration_since(w.started) < window);
            windows.next_sweep = now + window;
        }

        let entry = windows.by_key.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        if entry.count >= self.limit {
            return false;
        }
        entry.count += 1;
        true
    }

    fn retry_after_at(&self, key: &str, now: Instant) -> Duration {
        self.lock()
            .by_key
            .get(key)
            .map(|w| (w.started + self.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn retry_after(&self, key: &str) -> Duration {
        self.retry_after_at(key, Instant::now())
    }
}
