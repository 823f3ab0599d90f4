//! Time source
//!
//! Cooldowns, staleness and timestamps all read the clock through this trait so
//! tests can move time forward without sleeping.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and replays
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub type SharedClock = Arc<dyn Clock>;

/// Drop sub-millisecond digits so in-memory instants compare equal to stored ones
pub fn to_storage_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Fixed-width RFC 3339 text at millisecond precision; lexical order equals
/// chronological order.
pub fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn from_db_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), start + Duration::seconds(90));
    }

    #[test]
    fn db_timestamps_sort_lexically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 9, 59, 59).unwrap();
        let b = a + Duration::milliseconds(1500);
        assert!(to_db_timestamp(a) < to_db_timestamp(b));
        assert_eq!(from_db_timestamp(&to_db_timestamp(b)), Some(b));
    }

    #[test]
    fn storage_precision_matches_stored_text() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 9, 59, 59).unwrap()
            + Duration::microseconds(1_500_250);
        let stored = from_db_timestamp(&to_db_timestamp(a)).unwrap();
        assert_eq!(to_storage_precision(a), stored);
        assert!(stored < a);
    }
}
