//! Time windows and named reporting periods.
//!
//! Named periods resolve against an injectable [`Clock`] so that date
//! boundaries can be tested without depending on the wall clock. Weeks start
//! on Monday; a window covers `00:00:00` of its first day through `23:59:59`
//! of its last day.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Local, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const GIT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const END_OF_DAY_SECS: i64 = 86_399;

/// Source of "today" for period resolution.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Reads the local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Always reports the same day.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Inclusive time range passed to `git log --since/--until`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    since: NaiveDateTime,
    until: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(since: NaiveDateTime, until: NaiveDateTime) -> Result<Self> {
        if since > until {
            return Err(Error::InvalidTimeWindow {
                since: since.format(GIT_DATE_FORMAT).to_string(),
                until: until.format(GIT_DATE_FORMAT).to_string(),
            });
        }
        Ok(Self { since, until })
    }

    /// Whole days from the start of `first` to the end of `last`.
    pub fn from_dates(first: NaiveDate, last: NaiveDate) -> Result<Self> {
        let since = first.and_time(NaiveTime::MIN);
        let until = last.and_time(NaiveTime::MIN) + Duration::seconds(END_OF_DAY_SECS);
        Self::new(since, until)
    }

    /// Parse `YYYY-MM-DD` day bounds.
    pub fn parse_dates(first: &str, last: &str) -> Result<Self> {
        Self::from_dates(parse_day(first)?, parse_day(last)?)
    }

    pub fn since(&self) -> NaiveDateTime {
        self.since
    }

    pub fn until(&self) -> NaiveDateTime {
        self.until
    }

    pub fn since_arg(&self) -> String {
        self.since.format(GIT_DATE_FORMAT).to_string()
    }

    pub fn until_arg(&self) -> String {
        self.until.format(GIT_DATE_FORMAT).to_string()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.since_arg(), self.until_arg())
    }
}

fn parse_day(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|err| {
        Error::InvalidArgument(format!("invalid date '{raw}' (expected YYYY-MM-DD): {err}"))
    })
}

/// Named reporting periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Period {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisQuarter,
    LastQuarter,
    FirstHalf,
    SecondHalf,
    ThisYear,
}

impl Period {
    pub const ALL: [Period; 11] = [
        Period::Today,
        Period::Yesterday,
        Period::ThisWeek,
        Period::LastWeek,
        Period::ThisMonth,
        Period::LastMonth,
        Period::ThisQuarter,
        Period::LastQuarter,
        Period::FirstHalf,
        Period::SecondHalf,
        Period::ThisYear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Yesterday => "yesterday",
            Period::ThisWeek => "this-week",
            Period::LastWeek => "last-week",
            Period::ThisMonth => "this-month",
            Period::LastMonth => "last-month",
            Period::ThisQuarter => "this-quarter",
            Period::LastQuarter => "last-quarter",
            Period::FirstHalf => "first-half",
            Period::SecondHalf => "second-half",
            Period::ThisYear => "this-year",
        }
    }

    /// First and last day of the period containing `clock.today()`.
    pub fn day_bounds(self, clock: &dyn Clock) -> Result<(NaiveDate, NaiveDate)> {
        let today = clock.today();
        let year = today.year();
        match self {
            Period::Today => Ok((today, today)),
            Period::Yesterday => {
                let day = today - Duration::days(1);
                Ok((day, day))
            }
            Period::ThisWeek => Ok(week_of(today)),
            Period::LastWeek => Ok(week_of(today - Duration::days(7))),
            Period::ThisMonth => month_span(month_start(today), 1),
            Period::LastMonth => {
                let first = shift_months_back(month_start(today), 1)?;
                month_span(first, 1)
            }
            Period::ThisQuarter => {
                let quarter = today.month0() / 3;
                month_span(ymd(year, quarter * 3 + 1, 1)?, 3)
            }
            Period::LastQuarter => {
                let quarter = today.month0() / 3;
                let first = if quarter == 0 {
                    ymd(year - 1, 10, 1)?
                } else {
                    ymd(year, (quarter - 1) * 3 + 1, 1)?
                };
                month_span(first, 3)
            }
            Period::FirstHalf => Ok((ymd(year, 1, 1)?, ymd(year, 6, 30)?)),
            Period::SecondHalf => Ok((ymd(year, 7, 1)?, ymd(year, 12, 31)?)),
            Period::ThisYear => Ok((ymd(year, 1, 1)?, ymd(year, 12, 31)?)),
        }
    }

    pub fn resolve(self, clock: &dyn Clock) -> Result<TimeWindow> {
        let (first, last) = self.day_bounds(clock)?;
        TimeWindow::from_dates(first, last)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        Period::ALL
            .iter()
            .copied()
            .find(|period| period.as_str() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = Period::ALL.iter().map(|p| p.as_str()).collect();
                Error::InvalidArgument(format!(
                    "unknown period '{raw}' (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}

fn week_of(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = day - Duration::days(i64::from(day.weekday().num_days_from_monday()));
    (monday, monday + Duration::days(6))
}

fn month_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.day0()))
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::InvalidArgument(format!("date out of range: {year}-{month}-{day}")))
}

fn shift_months_back(first: NaiveDate, months: u32) -> Result<NaiveDate> {
    first
        .checked_sub_months(Months::new(months))
        .ok_or_else(|| Error::InvalidArgument(format!("date out of range: {first} - {months} months")))
}

/// `months` whole months starting at `first` (which must be a first-of-month).
fn month_span(first: NaiveDate, months: u32) -> Result<(NaiveDate, NaiveDate)> {
    let next = first
        .checked_add_months(Months::new(months))
        .ok_or_else(|| Error::InvalidArgument(format!("date out of range: {first} + {months} months")))?;
    Ok((first, next - Duration::days(1)))
}
