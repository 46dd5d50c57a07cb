//! Week identity: pure calendar math shared by every other component.
//!
//! Weeks run Sunday through Saturday and are identified by `YYYY-Wnn`
//! strings under a fixed 52-week-per-year model. The formula below is the
//! system of record for week numbering; template resolution and log queries
//! compare these ids directly, so it must never change shape.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate};

use crate::error::AppError;

/// A calendar week identifier, totally ordered by (year, week number).
///
/// Week numbers are not clamped to 52: a year whose last days spill into a
/// 53rd bucket yields `-W53` from [`WeekId::from_date`], while
/// [`WeekId::previous`] and [`WeekId::next`] assume 52 weeks per year.
/// Switching to ISO week numbering would change persisted ids, so the model
/// is kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekId {
    year: i32,
    week: u32,
}

impl WeekId {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    /// Week containing `date`.
    ///
    /// week = ceil((days since Jan 1 + weekday of Jan 1 + 1) / 7), with
    /// Sunday as weekday 0.
    pub fn from_date(date: NaiveDate) -> Self {
        let year = date.year();
        let days = date.ordinal0() as i64;
        let jan1_weekday = NaiveDate::from_ymd_opt(year, 1, 1)
            .map(|d| d.weekday().num_days_from_sunday() as i64)
            .unwrap_or(0);
        let week = (days + jan1_weekday + 1 + 6) / 7;
        Self {
            year,
            week: week as u32,
        }
    }

    /// The week before this one; week 1 wraps to week 52 of the prior year
    pub fn previous(&self) -> Self {
        if self.week <= 1 {
            Self {
                year: self.year - 1,
                week: 52,
            }
        } else {
            Self {
                year: self.year,
                week: self.week - 1,
            }
        }
    }

    /// The week after this one; week 52 (or beyond) wraps to week 1
    pub fn next(&self) -> Self {
        if self.week >= 52 {
            Self {
                year: self.year + 1,
                week: 1,
            }
        } else {
            Self {
                year: self.year,
                week: self.week + 1,
            }
        }
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekId {
    type Err = AppError;

    /// Strict `YYYY-Wnn` parse. No coercion: four-digit year, two-digit
    /// week, week number at least 1.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || AppError::MalformedWeekId(s.to_string());
        let (year_part, week_part) = s.split_once("-W").ok_or_else(malformed)?;
        if year_part.len() != 4 || week_part.len() != 2 {
            return Err(malformed());
        }
        let year: i32 = year_part.parse().map_err(|_| malformed())?;
        let week: u32 = week_part.parse().map_err(|_| malformed())?;
        if week < 1 {
            return Err(malformed());
        }
        Ok(Self { year, week })
    }
}

/// The Sunday on or before `date`
pub fn week_start_date(date: NaiveDate) -> NaiveDate {
    let back = date.weekday().num_days_from_sunday() as u64;
    date.checked_sub_days(Days::new(back)).unwrap_or(date)
}

/// The date of `day_index` (0 = Sunday .. 6 = Saturday) within the week
/// starting at `week_start`
pub fn date_for_day(week_start: NaiveDate, day_index: usize) -> NaiveDate {
    week_start
        .checked_add_days(Days::new(day_index as u64))
        .unwrap_or(week_start)
}
