//! Clock abstraction for testable timing.
//!
//! Retry scheduling and the update-debounce both compare wall-clock
//! timestamps, so production code never calls `Utc::now()` directly; it goes
//! through an injected [`Clock`] that tests can control.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Utc};

/// Time source injected into workers, schedulers, and tasks.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current system time.
    fn now_system(&self) -> SystemTime;

    /// Sleeps for the specified duration.
    ///
    /// Maps to `tokio::time::sleep` in production; test clocks advance
    /// virtual time instead.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Current time as a UTC timestamp, the representation stored on rows.
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.now_system())
    }
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Controllable clock for deterministic tests.
///
/// Time only moves when the test advances it, which makes debounce windows
/// and retry schedules reproducible.
#[derive(Debug, Clone)]
pub struct TestClock {
    /// Nanoseconds since `UNIX_EPOCH`.
    system_ns: Arc<AtomicU64>,
}

impl TestClock {
    /// Creates a test clock starting at the current system time.
    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    /// Creates a test clock starting at a specific time.
    pub fn starting_at(start: SystemTime) -> Self {
        let since_epoch = start.duration_since(UNIX_EPOCH).unwrap_or_default();
        let ns = u64::try_from(since_epoch.as_nanos().min(u128::from(u64::MAX))).unwrap_or(0);
        Self { system_ns: Arc::new(AtomicU64::new(ns)) }
    }

    /// Creates a test clock starting at a UTC timestamp.
    pub fn starting_at_utc(start: DateTime<Utc>) -> Self {
        Self::starting_at(SystemTime::from(start))
    }

    /// Advances the clock by the specified duration.
    pub fn advance(&self, duration: Duration) {
        let ns = u64::try_from(duration.as_nanos().min(u128::from(u64::MAX))).unwrap_or(0);
        self.system_ns.fetch_add(ns, Ordering::AcqRel);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now_system(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.system_ns.load(Ordering::Acquire))
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        // Sleeping in a test just advances virtual time, then yields so
        // other tasks get a chance to observe it.
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}
