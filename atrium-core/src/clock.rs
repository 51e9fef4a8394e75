//! Injectable wall clock.
//!
//! Token expiry and cache TTLs both read time through [`Clock`] so tests can
//! pin or advance "now" deterministically.

use crate::Timestamp;
use chrono::{TimeZone, Utc};
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Timestamp;

    fn now_epoch_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Clock that always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl FixedClock {
    pub fn at_epoch_secs(secs: i64) -> Self {
        Self(epoch_secs(secs))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn at_epoch_secs(secs: i64) -> Self {
        Self::new(epoch_secs(secs))
    }

    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set(&self, to: Timestamp) {
        self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let millis = self.millis.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

fn epoch_secs(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

/// Well-known instants for tests.
pub mod test_clocks {
    /// 2024-01-01 00:00:00 UTC
    pub const VALID_EPOCH: i64 = 1_704_067_200;
    /// 2020-01-01 00:00:00 UTC
    pub const EXPIRED_EPOCH: i64 = 1_577_836_800;
    /// 2030-01-01 00:00:00 UTC
    pub const FUTURE_EPOCH: i64 = 1_893_456_000;
}
