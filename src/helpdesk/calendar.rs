//! Due-date buckets and relative time.
//!
//! All times are local wall-clock `NaiveDateTime`s truncated to seconds,
//! matching what the database stores.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound};
use serde::{Deserialize, Serialize};

pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

/// Dashboard calendar bucket, also usable as a list filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarFilter {
    Expired,
    Today,
    Tomorrow,
    Week,
    Month,
}

impl CalendarFilter {
    pub const ALL: [CalendarFilter; 5] = [
        Self::Expired,
        Self::Today,
        Self::Tomorrow,
        Self::Week,
        Self::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Today => "today",
            Self::Tomorrow => "tomorrow",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// `[lower, upper)` range of `limit_date` values in this bucket.
    /// Expired has no lower bound.
    pub fn range(&self, b: &CalendarBounds) -> (Option<NaiveDateTime>, NaiveDateTime) {
        match self {
            Self::Expired => (None, b.now),
            Self::Today => (Some(b.today_start), b.tomorrow),
            Self::Tomorrow => (Some(b.tomorrow), b.day_after),
            Self::Week => (Some(b.today_start), b.next_week),
            Self::Month => (Some(b.today_start), b.next_month),
        }
    }

    pub fn contains(&self, b: &CalendarBounds, limit: NaiveDateTime) -> bool {
        let (lower, upper) = self.range(b);
        lower.is_none_or(|l| limit >= l) && limit < upper
    }
}

impl FromStr for CalendarFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expired" => Ok(Self::Expired),
            "today" => Ok(Self::Today),
            "tomorrow" => Ok(Self::Tomorrow),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            _ => Err(format!("Invalid calendar filter: {}", s)),
        }
    }
}

impl fmt::Display for CalendarFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference instants for bucketing, computed once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarBounds {
    pub now: NaiveDateTime,
    pub today_start: NaiveDateTime,
    pub tomorrow: NaiveDateTime,
    pub day_after: NaiveDateTime,
    /// Monday 00:00 after the current Monday-based week.
    pub next_week: NaiveDateTime,
    /// First day of next month, 00:00.
    pub next_month: NaiveDateTime,
}

impl CalendarBounds {
    pub fn at(now: NaiveDateTime) -> Self {
        let today = now.date();
        let days_to_monday = 7 - i64::from(today.weekday().num_days_from_monday());
        let monday = today + Duration::days(days_to_monday);
        Self {
            now,
            today_start: today.and_time(NaiveTime::MIN),
            tomorrow: (today + Duration::days(1)).and_time(NaiveTime::MIN),
            day_after: (today + Duration::days(2)).and_time(NaiveTime::MIN),
            next_week: monday.and_time(NaiveTime::MIN),
            next_month: first_of_next_month(today).and_time(NaiveTime::MIN),
        }
    }

    /// Exclusive upper bound of the pre-fetched upcoming set: whichever of
    /// next week and next month comes later.
    pub fn upcoming_end(&self) -> NaiveDateTime {
        self.next_week.max(self.next_month)
    }
}

fn first_of_next_month(d: NaiveDate) -> NaiveDate {
    let (y, m) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(d)
}

/// Where a ticket's due date falls relative to now, for the calendar column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueState {
    NoLimit { start: NaiveDateTime, started: bool },
    Expired { limit: NaiveDateTime },
    Today { limit: NaiveDateTime },
    Tomorrow { limit: NaiveDateTime },
    ThisWeek { limit: NaiveDateTime },
    Later { limit: NaiveDateTime },
}

impl DueState {
    pub fn of(start: NaiveDateTime, limit: Option<NaiveDateTime>, b: &CalendarBounds) -> Self {
        match limit {
            None => Self::NoLimit {
                start,
                started: start <= b.now,
            },
            Some(limit) if limit < b.now => Self::Expired { limit },
            Some(limit) if limit < b.tomorrow => Self::Today { limit },
            Some(limit) if limit < b.day_after => Self::Tomorrow { limit },
            Some(limit) if limit < b.next_week => Self::ThisWeek { limit },
            Some(limit) => Self::Later { limit },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    pub fn abbr(&self) -> &'static str {
        match self {
            Self::Second => "s",
            Self::Minute => "m",
            Self::Hour => "h",
            Self::Day => "d",
            Self::Week => "w",
            Self::Month => "mo",
            Self::Year => "y",
        }
    }
}

/// Coarse distance between two instants ("3 hours").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relative {
    pub amount: i64,
    pub unit: TimeUnit,
    pub future: bool,
}

impl Relative {
    pub fn between(then: NaiveDateTime, now: NaiveDateTime) -> Self {
        let secs = (now - then).num_seconds();
        let future = secs < 0;
        let secs = secs.abs();
        let (amount, unit) = match secs {
            s if s < 60 => (s, TimeUnit::Second),
            s if s < 3_600 => (s / 60, TimeUnit::Minute),
            s if s < 86_400 => (s / 3_600, TimeUnit::Hour),
            s if s < 7 * 86_400 => (s / 86_400, TimeUnit::Day),
            s if s < 30 * 86_400 => (s / (7 * 86_400), TimeUnit::Week),
            s if s < 365 * 86_400 => (s / (30 * 86_400), TimeUnit::Month),
            s => (s / (365 * 86_400), TimeUnit::Year),
        };
        Self {
            amount,
            unit,
            future,
        }
    }

    /// Compact form for narrow columns: "3h", "2d".
    pub fn abbr(&self) -> String {
        format!("{}{}", self.amount, self.unit.abbr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_bounds_on_wednesday() {
        // 2024-05-15 is a Wednesday.
        let b = CalendarBounds::at(dt("2024-05-15 09:00:00"));
        assert_eq!(b.today_start, dt("2024-05-15 00:00:00"));
        assert_eq!(b.tomorrow, dt("2024-05-16 00:00:00"));
        assert_eq!(b.day_after, dt("2024-05-17 00:00:00"));
        assert_eq!(b.next_week, dt("2024-05-20 00:00:00"));
        assert_eq!(b.next_month, dt("2024-06-01 00:00:00"));
    }

    #[test]
    fn test_bounds_sunday_and_december() {
        let b = CalendarBounds::at(dt("2023-12-31 12:00:00"));
        assert_eq!(b.next_week, dt("2024-01-01 00:00:00"));
        assert_eq!(b.next_month, dt("2024-01-01 00:00:00"));
        let feb = CalendarBounds::at(dt("2024-02-10 12:00:00"));
        assert_eq!(feb.next_month, dt("2024-03-01 00:00:00"));
    }

    #[test]
    fn test_last_second_of_week_and_month_is_inside() {
        let b = CalendarBounds::at(dt("2024-05-15 09:00:00"));
        let sunday = dt("2024-05-19 23:59:59");
        assert!(CalendarFilter::Week.contains(&b, sunday));
        assert!(CalendarFilter::Month.contains(&b, sunday));
        assert!(matches!(DueState::of(b.now, Some(sunday), &b), DueState::ThisWeek { .. }));
        assert!(!CalendarFilter::Week.contains(&b, dt("2024-05-20 00:00:00")));

        let month_end = dt("2024-05-31 23:59:59");
        assert!(CalendarFilter::Month.contains(&b, month_end));
        assert!(!CalendarFilter::Month.contains(&b, dt("2024-06-01 00:00:00")));
    }

    #[test]
    fn test_thursday_limit_buckets() {
        let b = CalendarBounds::at(dt("2024-05-15 09:00:00"));
        let limit = dt("2024-05-16 10:00:00");
        assert!(!CalendarFilter::Today.contains(&b, limit));
        assert!(CalendarFilter::Tomorrow.contains(&b, limit));
        assert!(CalendarFilter::Week.contains(&b, limit));
        assert!(CalendarFilter::Month.contains(&b, limit));
        assert!(!CalendarFilter::Expired.contains(&b, limit));
    }

    #[test]
    fn test_expired_and_today_overlap_earlier_today() {
        let b = CalendarBounds::at(dt("2024-05-15 09:00:00"));
        let limit = dt("2024-05-15 08:00:00");
        assert!(CalendarFilter::Expired.contains(&b, limit));
        assert!(CalendarFilter::Today.contains(&b, limit));
    }

    #[test]
    fn test_due_state() {
        let b = CalendarBounds::at(dt("2024-05-15 09:00:00"));
        let start = dt("2024-05-01 08:00:00");
        assert!(matches!(DueState::of(start, None, &b), DueState::NoLimit { started: true, .. }));
        assert!(matches!(
            DueState::of(start, Some(dt("2024-05-14 10:00:00")), &b),
            DueState::Expired { .. }
        ));
        assert!(matches!(
            DueState::of(start, Some(dt("2024-05-18 10:00:00")), &b),
            DueState::ThisWeek { .. }
        ));
        assert!(matches!(
            DueState::of(start, Some(dt("2024-06-18 10:00:00")), &b),
            DueState::Later { .. }
        ));
    }

    #[test]
    fn test_relative_time() {
        let now = dt("2024-05-15 09:00:00");
        let r = Relative::between(dt("2024-05-15 06:00:00"), now);
        assert_eq!((r.amount, r.unit, r.future), (3, TimeUnit::Hour, false));
        assert_eq!(r.abbr(), "3h");
        let f = Relative::between(dt("2024-05-17 09:00:00"), now);
        assert_eq!((f.amount, f.unit, f.future), (2, TimeUnit::Day, true));
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("week".parse::<CalendarFilter>().unwrap(), CalendarFilter::Week);
        assert!("yesterday".parse::<CalendarFilter>().is_err());
    }
}
