//! Day-boundary invalidation
//!
//! Volatile cache entries are dropped the first time the worker sees a new
//! UTC calendar date. The last-seen date lives in a [`DayTracker`] owned by
//! the worker instance and is empty after every restart.

use chrono::{NaiveDate, Utc};
use std::sync::Mutex;

/// Source of the current calendar date
pub trait Clock: Send + Sync {
    /// Today's date (UTC)
    fn today(&self) -> NaiveDate;
}

/// Wall clock in UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Whether volatile entries must be dropped before serving a fetch
///
/// True only when a previous date was recorded and it differs from `today`.
pub fn should_invalidate(today: NaiveDate, last: Option<NaiveDate>) -> bool {
    last.is_some_and(|last| last != today)
}

/// Last-access date shared by all fetches of one worker instance
#[derive(Debug, Default)]
pub struct DayTracker {
    last: Mutex<Option<NaiveDate>>,
}

impl DayTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `today` and reports whether the day rolled over since the
    /// previous observation
    pub fn observe(&self, today: NaiveDate) -> bool {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let rolled_over = should_invalidate(today, *last);
        *last = Some(today);
        rolled_over
    }

    /// The most recently recorded date, if any
    pub fn last(&self) -> Option<NaiveDate> {
        match self.last.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
