//! Per-client sliding-window connection rate limiter.
//!
//! A client may open at most `capacity` sessions in any trailing `window`.
//! Each client's record holds the instants of its admitted attempts; the
//! prune, the capacity check and the append happen under one lock so two
//! concurrent attempts can never both take the last slot. Rejected attempts
//! are not recorded.
//!
//! Records whose timestamps have all left the window are dropped by
//! [`RateLimiter::evict_expired`], which runs every [`EVICT_EVERY`] attempts
//! and can also be driven by a periodic task.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::SessionConfig;

/// Attempts between opportunistic eviction sweeps.
pub const EVICT_EVERY: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// `retry_after` is the time until the oldest admitted attempt leaves
    /// the window.
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, VecDeque<Instant>>,
    attempts: u64,
}

pub struct RateLimiter {
    window: Duration,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl RateLimiter {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            Duration::from_secs(config.rate_limit_window_secs),
            config.rate_limit_capacity,
        )
    }

    pub fn admit(&self, client: &str) -> Admission {
        self.admit_at(client, Instant::now())
    }

    /// Decide one connection attempt by `client` at `now`.
    pub fn admit_at(&self, client: &str, now: Instant) -> Admission {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        inner.attempts += 1;
        if inner.attempts % EVICT_EVERY == 0 {
            evict(&mut inner.records, self.window, now);
        }

        let record = inner.records.entry(client.to_string()).or_default();
        prune(record, self.window, now);

        if record.len() < self.capacity {
            record.push_back(now);
            return Admission::Admitted;
        }

        let retry_after = record
            .front()
            .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or_default();
        Admission::Rejected { retry_after }
    }

    /// Drop every record with no attempts left inside the window.
    ///
    /// Returns the number of records removed.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        evict(&mut inner.records, self.window, now)
    }

    /// Number of clients currently holding a record.
    pub fn tracked_clients(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }
}

/// Keep only instants `t` with `now - t < window`.
fn prune(record: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while let Some(&front) = record.front() {
        if now.saturating_duration_since(front) >= window {
            record.pop_front();
        } else {
            break;
        }
    }
}

fn evict(records: &mut HashMap<String, VecDeque<Instant>>, window: Duration, now: Instant) -> usize {
    let before = records.len();
    records.retain(|_, record| {
        prune(record, window, now);
        !record.is_empty()
    });
    before - records.len()
}
