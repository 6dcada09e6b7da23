//! Sync date window and timezone handling.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
};
use chrono_tz::Tz;

use super::types::SyncError;

/// Timezone in which shift times are interpreted and events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTimezone {
    /// The process's local timezone.
    Local,
    Named(Tz),
}

impl SyncTimezone {
    pub fn today(&self) -> NaiveDate {
        match self {
            SyncTimezone::Local => Local::now().date_naive(),
            SyncTimezone::Named(tz) => chrono::Utc::now().with_timezone(tz).date_naive(),
        }
    }

    /// IANA name to send alongside event times, if one is configured.
    pub fn iana_name(&self) -> Option<&'static str> {
        match self {
            SyncTimezone::Local => None,
            SyncTimezone::Named(tz) => Some(tz.name()),
        }
    }

    /// Pin a wall-clock time to this timezone. Ambiguous times (DST fall
    /// back) resolve to the earlier instant; nonexistent ones yield `None`.
    pub fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            SyncTimezone::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
            SyncTimezone::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
        }
    }

    /// First instant of `date`. When local midnight falls in a DST gap this
    /// is the first wall-clock minute after the gap.
    pub fn start_of_day(&self, date: NaiveDate) -> Option<DateTime<FixedOffset>> {
        let midnight = date.and_time(NaiveTime::MIN);
        (0..DAY_MINUTES)
            .map(|m| midnight + Duration::minutes(m))
            .find_map(|naive| self.localize(naive))
    }

    /// Last instant of `date`, stepping back out of a DST gap if needed.
    pub fn end_of_day(&self, date: NaiveDate) -> Option<DateTime<FixedOffset>> {
        let last = date.and_time(NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)?);
        (0..DAY_MINUTES)
            .map(|m| last - Duration::minutes(m))
            .find_map(|naive| self.localize(naive))
    }
}

const DAY_MINUTES: i64 = 24 * 60;

impl fmt::Display for SyncTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTimezone::Local => f.write_str("local"),
            SyncTimezone::Named(tz) => f.write_str(tz.name()),
        }
    }
}

/// One end of the configured window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    /// Resolved to the current date when the run starts.
    Today,
    Date(NaiveDate),
}

impl DateBound {
    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        match self {
            DateBound::Today => today,
            DateBound::Date(d) => *d,
        }
    }
}

impl FromStr for DateBound {
    type Err = String;

    /// Accepts `today`, `YYYY-MM-DD`, or an RFC 3339 date-time (date part kept).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("today") {
            return Ok(DateBound::Today);
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(DateBound::Date(d));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(DateBound::Date(dt.date_naive()));
        }
        Err(format!(
            "invalid date '{s}'. Expected YYYY-MM-DD, an RFC 3339 timestamp, or 'today'"
        ))
    }
}

/// Inclusive date range of shifts to sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateBound,
    pub end: DateBound,
}

/// A window pinned to concrete instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Start of `start_date`.
    pub start: DateTime<FixedOffset>,
    /// Last nanosecond of `end_date`.
    pub end: DateTime<FixedOffset>,
}

impl ResolvedWindow {
    pub fn contains<Tz2: TimeZone>(&self, instant: &DateTime<Tz2>) -> bool {
        *instant >= self.start && *instant <= self.end
    }
}

impl DateWindow {
    /// Resolve against the current date in `tz`.
    pub fn resolve(&self, tz: &SyncTimezone) -> Result<ResolvedWindow, SyncError> {
        self.resolve_at(tz.today(), tz)
    }

    /// Resolve with an explicit "today".
    ///
    /// # Errors
    /// `SyncError::InvalidWindow` if the start is after the end.
    pub fn resolve_at(
        &self,
        today: NaiveDate,
        tz: &SyncTimezone,
    ) -> Result<ResolvedWindow, SyncError> {
        let start_date = self.start.resolve(today);
        let end_date = self.end.resolve(today);

        if start_date > end_date {
            return Err(SyncError::InvalidWindow(format!(
                "start {start_date} is after end {end_date}"
            )));
        }

        let start = tz.start_of_day(start_date).ok_or_else(|| {
            SyncError::InvalidWindow(format!("start of {start_date} does not exist in {tz}"))
        })?;
        let end = tz.end_of_day(end_date).ok_or_else(|| {
            SyncError::InvalidWindow(format!("end of {end_date} does not exist in {tz}"))
        })?;

        Ok(ResolvedWindow {
            start_date,
            end_date,
            start,
            end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_bounds() {
        assert_eq!("today".parse::<DateBound>().unwrap(), DateBound::Today);
        assert_eq!(" Today ".parse::<DateBound>().unwrap(), DateBound::Today);
        assert_eq!(
            "2024-01-10".parse::<DateBound>().unwrap(),
            DateBound::Date(date(2024, 1, 10))
        );
        assert_eq!(
            "2024-01-10T22:30:00-05:00".parse::<DateBound>().unwrap(),
            DateBound::Date(date(2024, 1, 10))
        );
        assert!("10/01/2024".parse::<DateBound>().is_err());
    }

    #[test]
    fn test_resolve_inclusive_bounds() {
        let tz = SyncTimezone::Named(chrono_tz::America::New_York);
        let window = DateWindow {
            start: DateBound::Date(date(2024, 1, 10)),
            end: DateBound::Date(date(2024, 1, 12)),
        };
        let resolved = window.resolve_at(date(2024, 1, 1), &tz).unwrap();

        assert_eq!(resolved.start.to_rfc3339(), "2024-01-10T00:00:00-05:00");
        assert_eq!(
            resolved.end.naive_local(),
            date(2024, 1, 12)
                .and_hms_nano_opt(23, 59, 59, 999_999_999)
                .unwrap()
        );

        let first = DateTime::parse_from_rfc3339("2024-01-10T00:00:00-05:00").unwrap();
        let last = DateTime::parse_from_rfc3339("2024-01-12T23:59:59-05:00").unwrap();
        let after = DateTime::parse_from_rfc3339("2024-01-13T00:00:00-05:00").unwrap();
        let before = DateTime::parse_from_rfc3339("2024-01-10T04:59:59Z").unwrap();
        assert!(resolved.contains(&first));
        assert!(resolved.contains(&last));
        assert!(!resolved.contains(&after));
        assert!(!resolved.contains(&before));
    }

    #[test]
    fn test_today_sentinel() {
        let tz = SyncTimezone::Named(chrono_tz::UTC);
        let window = DateWindow {
            start: DateBound::Today,
            end: DateBound::Today,
        };
        let resolved = window.resolve_at(date(2024, 3, 5), &tz).unwrap();
        assert_eq!(resolved.start_date, date(2024, 3, 5));
        assert_eq!(resolved.end_date, date(2024, 3, 5));
    }

    #[test]
    fn test_reversed_window_rejected() {
        let tz = SyncTimezone::Named(chrono_tz::UTC);
        let window = DateWindow {
            start: DateBound::Date(date(2024, 2, 1)),
            end: DateBound::Date(date(2024, 1, 1)),
        };
        assert!(matches!(
            window.resolve_at(date(2024, 1, 1), &tz),
            Err(SyncError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_localize_named_and_iana_name() {
        let tz = SyncTimezone::Named(chrono_tz::Europe::Rome);
        let dt = tz
            .localize(date(2024, 7, 1).and_hms_opt(9, 0, 0).unwrap())
            .unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-07-01T09:00:00+02:00");
        assert_eq!(tz.iana_name(), Some("Europe/Rome"));
        assert_eq!(SyncTimezone::Local.iana_name(), None);
    }

    #[test]
    fn test_localize_skipped_time_is_none() {
        // 02:30 does not exist on the spring-forward day in New York.
        let tz = SyncTimezone::Named(chrono_tz::America::New_York);
        assert!(tz
            .localize(date(2024, 3, 10).and_hms_opt(2, 30, 0).unwrap())
            .is_none());
    }

    #[test]
    fn test_midnight_skipped_by_dst() {
        // Santiago springs forward from 00:00 to 01:00 on 2024-09-08.
        let tz = SyncTimezone::Named(chrono_tz::America::Santiago);
        let window = DateWindow {
            start: DateBound::Today,
            end: DateBound::Today,
        };
        let resolved = window.resolve_at(date(2024, 9, 8), &tz).unwrap();

        assert_eq!(resolved.start.to_rfc3339(), "2024-09-08T01:00:00-03:00");
        assert_eq!(
            resolved.end.naive_local(),
            date(2024, 9, 8)
                .and_hms_nano_opt(23, 59, 59, 999_999_999)
                .unwrap()
        );

        let first_shift = DateTime::parse_from_rfc3339("2024-09-08T01:00:00-03:00").unwrap();
        assert!(resolved.contains(&first_shift));
    }
}
