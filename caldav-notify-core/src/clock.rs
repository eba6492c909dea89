//! Time source used by the normalizer, resolver and scheduler.
//!
//! Everything that needs "now" or the local zone offset goes through a
//! [`Clock`], so tests can pin both.

use chrono::{DateTime, Duration, Local, Utc};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    /// Offset of the process-local zone relative to UTC (east is positive).
    fn local_offset(&self) -> Duration;
}

/// Wall clock and the host's local zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_offset(&self) -> Duration {
        Duration::seconds(Local::now().offset().local_minus_utc() as i64)
    }
}

/// A clock frozen at one instant with a fixed local offset.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub now: DateTime<Utc>,
    pub local_offset: Duration,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, local_offset: Duration) -> Self {
        FixedClock { now, local_offset }
    }

    /// A clock at `now` in a UTC local zone.
    pub fn utc(now: DateTime<Utc>) -> Self {
        FixedClock::new(now, Duration::zero())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn local_offset(&self) -> Duration {
        self.local_offset
    }
}
