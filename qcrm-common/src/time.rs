//! Timestamp utilities

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Half-open UTC interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UtcRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// "Today" and "this week" as seen from a local clock, expressed in UTC
///
/// Weeks run Monday through Sunday. Due-date windows on the dashboard are
/// computed against these ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalWindows {
    pub today: UtcRange,
    pub this_week: UtcRange,
}

impl LocalWindows {
    /// Windows around `now` in the time zone `now` carries
    pub fn at<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let tz = now.timezone();
        let date = now.date_naive();
        let week_start = date - Duration::days(date.weekday().num_days_from_monday() as i64);

        Self {
            today: UtcRange {
                start: local_midnight(&tz, date),
                end: local_midnight(&tz, date + Duration::days(1)),
            },
            this_week: UtcRange {
                start: local_midnight(&tz, week_start),
                end: local_midnight(&tz, week_start + Duration::days(7)),
            },
        }
    }
}

/// Start of `date` in `tz`, converted to UTC
///
/// When local midnight falls in a DST gap the first valid hour is used.
fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive: NaiveDateTime = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    match tz.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_millis_to_duration_one_second() {
        let duration = millis_to_duration(1000);
        assert_eq!(duration, StdDuration::from_secs(1));
    }

    #[test]
    fn test_today_window_utc() {
        // Thursday
        let now = Utc.with_ymd_and_hms(2026, 10, 15, 13, 30, 0).unwrap();
        let w = LocalWindows::at(&now);

        assert_eq!(w.today.start, Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap());
        assert_eq!(w.today.end, Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap());
        assert_eq!(w.this_week.start, Utc.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap());
        assert_eq!(w.this_week.end, Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_window_uses_local_date_not_utc_date() {
        // 23:30 on Sunday at UTC-5 is already Monday in UTC
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2026, 10, 18, 23, 30, 0).unwrap();
        let w = LocalWindows::at(&now);

        assert_eq!(w.today.start, Utc.with_ymd_and_hms(2026, 10, 18, 5, 0, 0).unwrap());
        // Week still started on local Monday the 12th
        assert_eq!(w.this_week.start, Utc.with_ymd_and_hms(2026, 10, 12, 5, 0, 0).unwrap());
        assert!(w.this_week.contains(now.with_timezone(&Utc)));
    }

    #[test]
    fn test_range_is_half_open() {
        let now = Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap();
        let w = LocalWindows::at(&now);
        assert!(w.today.contains(w.today.start));
        assert!(!w.today.contains(w.today.end));
    }
}
