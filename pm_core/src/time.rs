// ABOUTME: Utilities for working with times and timestamps.
// ABOUTME: Provides sortable RFC3339 stamps, day offsets, date parts and monotonic timers.
use ::time::{Duration as TimeDuration, OffsetDateTime};
use std::time::{Duration, Instant};

/// Format a UTC instant with a fixed six-digit fraction.
///
/// Fixed width keeps stored timestamps lexically sortable in SQL.
pub fn format_stamp(time: OffsetDateTime) -> String {
    let t = time.to_offset(::time::UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}Z",
        t.year(),
        u8::from(t.month()),
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
        t.microsecond()
    )
}

/// Current time as a sortable RFC3339 string
///
/// # Examples
///
/// ```
/// use pm_core::now_iso8601;
/// let timestamp = now_iso8601();
/// assert_eq!(timestamp.len(), 27);
/// assert!(timestamp.ends_with('Z'));
/// ```
pub fn now_iso8601() -> String {
    format_stamp(OffsetDateTime::now_utc())
}

/// Sortable stamp for the instant `days` days before `now`
pub fn stamp_days_before(now: OffsetDateTime, days: u32) -> String {
    format_stamp(now - TimeDuration::days(i64::from(days)))
}

/// Sortable stamp for `days` days ago
pub fn stamp_days_ago(days: u32) -> String {
    stamp_days_before(OffsetDateTime::now_utc(), days)
}

/// Current calendar year (UTC)
pub fn current_year() -> i32 {
    OffsetDateTime::now_utc().year()
}

/// `YYYYMMDD` for the given instant (UTC)
pub fn date_stamp(time: OffsetDateTime) -> String {
    let t = time.to_offset(::time::UtcOffset::UTC);
    format!("{:04}{:02}{:02}", t.year(), u8::from(t.month()), t.day())
}

/// Create a monotonic duration measurer
///
/// # Examples
///
/// ```
/// use pm_core::MonotonicTimer;
/// let timer = MonotonicTimer::new();
/// assert!(timer.elapsed_secs() >= 0.0);
/// ```
pub struct MonotonicTimer {
    start: Instant,
}

impl MonotonicTimer {
    /// Create a new timer starting now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time since creation
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed time as fractional seconds, the unit Prometheus histograms expect
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

impl Default for MonotonicTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_format_stamp_fixed_width() {
        let t = OffsetDateTime::from(UNIX_EPOCH + Duration::from_secs(1_609_459_200));
        assert_eq!(format_stamp(t), "2021-01-01T00:00:00.000000Z");
        assert_eq!(date_stamp(t), "20210101");
    }

    #[test]
    fn test_stamp_days_before() {
        let now = OffsetDateTime::from(UNIX_EPOCH + Duration::from_secs(1_609_459_200 + 10 * 86_400));
        assert_eq!(stamp_days_before(now, 7), "2021-01-04T00:00:00.000000Z");
        assert_eq!(stamp_days_before(now, 0), format_stamp(now));
    }

    #[test]
    fn test_monotonic_timer() {
        let timer = MonotonicTimer::new();
        thread::sleep(Duration::from_millis(1));
        assert!(timer.elapsed() >= Duration::from_millis(1));
        assert!(timer.elapsed() < Duration::from_secs(1));
    }
}
