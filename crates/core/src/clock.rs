//! Clock port.
//!
//! All "today" decisions (task idempotency, retention cutoffs, the latest
//! strip a source can have) go through a [`Clock`] anchored to the
//! reference timezone, so they can be pinned in tests.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Reference timezone for calendar decisions.
    fn timezone(&self) -> Tz;

    fn local_now(&self) -> DateTime<Tz> {
        self.now().with_timezone(&self.timezone())
    }

    /// Calendar date in the reference timezone.
    fn today(&self) -> NaiveDate {
        self.local_now().date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
    tz: Tz,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self { millis: AtomicI64::new(now.timestamp_millis()), tz }
    }

    /// Clock pinned to noon of `date` in `tz`.
    pub fn at_local_noon(date: NaiveDate, tz: Tz) -> Self {
        let noon = date.and_hms_opt(12, 0, 0).unwrap_or_default();
        let now = tz
            .from_local_datetime(&noon)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| noon.and_utc());
        Self::new(now, tz)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.millis.store(now.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance_days(&self, days: i64) {
        self.millis.fetch_add(days * 86_400_000, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}
