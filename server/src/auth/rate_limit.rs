//! Per-IP sliding window over failed authentications. Entries older than the
//! window are pruned on access; once `max_attempts` failures remain in the
//! window the address is blocked until the oldest one ages out. Idle buckets
//! are swept every ten windows.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use crate::error::AuthError;

struct LimiterState {
    buckets: HashMap<IpAddr, Vec<DateTime<Utc>>>,
    last_sweep: DateTime<Utc>,
}

pub struct RateLimiter {
    window: Duration,
    max_attempts: usize,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(window_minutes: u64, max_attempts: u32) -> Self {
        Self {
            window: Duration::minutes(window_minutes.max(1) as i64),
            max_attempts: max_attempts.max(1) as usize,
            state: Mutex::new(LimiterState {
                buckets: HashMap::new(),
                last_sweep: Utc::now(),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Called before any credential check. Prunes the caller's bucket and
    /// rejects when the window already holds `max_attempts` failures.
    pub fn check(&self, ip: IpAddr, now: DateTime<Utc>) -> Result<(), AuthError> {
        let cutoff = now - self.window;
        let mut state = self.lock();
        self.maybe_sweep(&mut state, now);

        if let Some(bucket) = state.buckets.get_mut(&ip) {
            bucket.retain(|t| *t > cutoff);
            if bucket.len() >= self.max_attempts {
                tracing::warn!(client = %ip, failures = bucket.len(), "rate limit exceeded");
                return Err(AuthError::RateLimited);
            }
        }
        Ok(())
    }

    /// Records one failed authentication for the address.
    pub fn record_failure(&self, ip: IpAddr, now: DateTime<Utc>) {
        let mut state = self.lock();
        state.buckets.entry(ip).or_default().push(now);
    }

    fn maybe_sweep(&self, state: &mut LimiterState, now: DateTime<Utc>) {
        if now - state.last_sweep < self.window * 10 {
            return;
        }
        let cutoff = now - self.window;
        state.buckets.retain(|_, bucket| {
            bucket.retain(|t| *t > cutoff);
            !bucket.is_empty()
        });
        state.last_sweep = now;
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    fn tracked_addresses(&self) -> usize {
        self.lock().buckets.len()
    }
}
