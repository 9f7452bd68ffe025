//! Per-source rate limiter
//!
//! One instance is built at startup and shared (`Arc`) by every adapter and the
//! coordinator. For each source it remembers the last permitted call and spaces
//! permits at least the configured interval apart, across all callers.

use crate::types::SourceKind;
use abr_common::config::{secs_to_duration, RateLimitConfig};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Minimum-interval gate keyed by source
pub struct RateLimiter {
    intervals: HashMap<SourceKind, Duration>,
    last_permitted: Mutex<HashMap<SourceKind, Instant>>,
}

impl RateLimiter {
    pub fn new(intervals: HashMap<SourceKind, Duration>) -> Self {
        Self {
            intervals,
            last_permitted: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(HashMap::from([
            (SourceKind::Scrape, secs_to_duration(config.scrape_secs)),
            (SourceKind::Primary, secs_to_duration(config.primary_secs)),
            (SourceKind::Fallback, secs_to_duration(config.fallback_secs)),
        ]))
    }

    /// Same interval for every source
    pub fn uniform(interval: Duration) -> Self {
        Self::new(SourceKind::ALL.iter().map(|s| (*s, interval)).collect())
    }

    /// No waiting at all
    pub fn unlimited() -> Self {
        Self::uniform(Duration::ZERO)
    }

    pub fn interval(&self, source: SourceKind) -> Duration {
        self.intervals.get(&source).copied().unwrap_or(Duration::ZERO)
    }

    /// Wait until `source` may be called again, then return.
    ///
    /// The next slot is computed and recorded in one critical section without
    /// an await inside it, so concurrent callers always get distinct slots at
    /// least one interval apart. The lock is released before sleeping; other
    /// sources are never held up by a wait on this one.
    ///
    /// If the returned future is dropped before the slot arrives (a caller's
    /// timeout fired), the reservation is rolled back so an abandoned wait
    /// does not push later callers further out.
    pub async fn await_slot(&self, source: SourceKind) {
        let interval = self.interval(source);

        let mut reservation = {
            let mut last = self.permits();
            let now = Instant::now();
            let previous = last.get(&source).copied();
            let slot = match previous {
                Some(previous) => (previous + interval).max(now),
                None => now,
            };
            last.insert(source, slot);
            Reservation {
                limiter: self,
                source,
                slot,
                previous,
                reached: false,
            }
        };

        let now = Instant::now();
        if reservation.slot > now {
            debug!(
                source = %source,
                wait_ms = (reservation.slot - now).as_millis() as u64,
                "Rate limiting: waiting for slot"
            );
            sleep_until(reservation.slot).await;
        }
        reservation.reached = true;
    }

    /// Forget all recorded calls
    pub fn reset(&self) {
        self.permits().clear();
    }

    fn permits(&self) -> MutexGuard<'_, HashMap<SourceKind, Instant>> {
        // The map is always left consistent, so a poisoned lock is still usable
        self.last_permitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A slot handed out by `await_slot` that has not been reached yet
struct Reservation<'a> {
    limiter: &'a RateLimiter,
    source: SourceKind,
    slot: Instant,
    previous: Option<Instant>,
    reached: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.reached {
            return;
        }
        let mut last = self.limiter.permits();
        // A later caller already stacked on top of this slot; leave theirs alone
        if last.get(&self.source) != Some(&self.slot) {
            return;
        }
        match self.previous {
            Some(previous) => last.insert(self.source, previous),
            None => last.remove(&self.source),
        };
        debug!(source = %self.source, "Rate limiting: abandoned slot released");
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
