//! Device clock abstraction.
//!
//! All date-sensitive operations take the current day from a [`Clock`]
//! rather than reading the system time directly, so tests can pin the day
//! and midnight-boundary behavior stays deterministic.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

/// Source of the current time and the device-local calendar day.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Current instant in the device-local timezone.
    fn now_local(&self) -> DateTime<Local>;

    /// The device-local calendar day.
    fn today(&self) -> NaiveDate {
        self.now_local().date_naive()
    }
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock pinned to a fixed day, for tests and deterministic replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    today: NaiveDate,
}

impl FixedClock {
    /// Pin the clock to the given day (noon local time).
    pub fn on(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now_local().with_timezone(&Utc)
    }

    fn now_local(&self) -> DateTime<Local> {
        let noon = self.today.and_hms_opt(12, 0, 0).unwrap_or_default();
        match Local.from_local_datetime(&noon).earliest() {
            Some(instant) => instant,
            None => Local::now(),
        }
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}
