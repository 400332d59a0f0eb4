//! ISO-8601 calendar arithmetic.
//!
//! Weeks start on Monday and week 1 is the week containing the year's first
//! Thursday. Everything here is pure: callers hand in the instant or the
//! reference week explicitly, and [`Clock`] is the only place "now" is read.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Average weeks per month, in hundredths (52.18 / 12 rounded to 4.33).
const WEEKS_PER_MONTH_X100: u32 = 433;

/// ISO week identifier, rendered as `YYYY-Www`.
///
/// Ordering follows the calendar: ISO year first, then week number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekId {
    year: i32,
    week: u32,
}

impl WeekId {
    /// Build a week id, rejecting weeks the ISO year does not have.
    pub fn new(year: i32, week: u32) -> Result<Self, ValidationError> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
            .map(|_| Self { year, week })
            .ok_or_else(|| ValidationError::InvalidWeekId(format!("{year}-W{week:02}")))
    }

    /// The ISO week containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    /// Monday of this week.
    pub fn monday(&self) -> NaiveDate {
        // Construction guarantees the (year, week) pair exists.
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon).unwrap_or(NaiveDate::MIN)
    }

    /// Sunday of this week.
    pub fn sunday(&self) -> NaiveDate {
        self.monday() + Duration::days(6)
    }

    /// The following week, rolling over ISO years.
    pub fn succ(&self) -> Self {
        Self::containing(self.monday() + Duration::days(7))
    }

    /// The preceding week, rolling over ISO years.
    pub fn pred(&self) -> Self {
        Self::containing(self.monday() - Duration::days(7))
    }

    /// Signed number of weeks from `earlier` to `self`.
    pub fn weeks_since(&self, earlier: &WeekId) -> i64 {
        (self.monday() - earlier.monday()).num_days() / 7
    }

    /// `true` when `date` falls inside this week.
    pub fn contains(&self, date: NaiveDate) -> bool {
        Self::containing(date) == *self
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidWeekId(s.to_string());
        let (year, week) = s.split_once("-W").ok_or_else(invalid)?;
        if year.len() != 4 || week.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let week: u32 = week.parse().map_err(|_| invalid())?;
        Self::new(year, week).map_err(|_| invalid())
    }
}

impl TryFrom<String> for WeekId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WeekId> for String {
    fn from(value: WeekId) -> Self {
        value.to_string()
    }
}

/// ISO week for the current UTC instant.
pub fn current_iso_week() -> WeekId {
    iso_week_at(Utc::now())
}

/// ISO week containing `instant` (UTC).
pub fn iso_week_at(instant: DateTime<Utc>) -> WeekId {
    WeekId::containing(instant.date_naive())
}

/// Convert a month count to weeks, rounding up so N months never
/// under-counts.
pub fn months_to_weeks(months: u32) -> u32 {
    let scaled = u64::from(months) * u64::from(WEEKS_PER_MONTH_X100);
    scaled.div_ceil(100) as u32
}

/// Whole ISO weeks from `reference_week` to the week containing
/// `target_date`. Targets in the past clamp to zero.
pub fn date_to_weeks(target_date: NaiveDate, reference_week: WeekId) -> u32 {
    let target_week = WeekId::containing(target_date);
    target_week.weeks_since(&reference_week).max(0) as u32
}

/// Weeks left before a deadline, used to seed `weeks_remaining`.
pub fn weeks_until_date(target_date: NaiveDate, reference_week: WeekId) -> u32 {
    date_to_weeks(target_date, reference_week)
}

/// Calendar month key (`YYYY-MM`) for monthly completion counts.
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// First day of the month after the one containing `date`.
pub fn next_month_start(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Source of "now" for the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn current_week(&self) -> WeekId {
        iso_week_at(self.now())
    }
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Clock pinned to noon UTC on `date`.
    pub fn at_date(date: NaiveDate) -> Self {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
        Self::new(date.and_time(noon).and_utc())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }

    pub fn advance_weeks(&self, weeks: i64) {
        self.advance(Duration::weeks(weeks));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|guard| *guard).unwrap_or_else(|p| *p.into_inner())
    }
}
