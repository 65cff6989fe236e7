//! Decision-date grids shared by every cell × time matrix.
//!
//! A [`TimeGrid`] is the ordered list of dates at which exposure is evaluated
//! and observations are emitted. Its semantics follow the usual calendar
//! frequency aliases:
//!
//! | frequency | code | dates |
//! |-----------|------|-------|
//! | [`Frequency::Day`] | `D` | every day in `[start, end]` |
//! | [`Frequency::Week`] | `W` | `start`, `start + 7d`, ... up to `end` |
//! | [`Frequency::MonthEnd`] | `M` | every last day of a month in `[start, end]` |
//! | [`Frequency::YearEnd`] | `Y` | every December 31st in `[start, end]` |

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{CoreError, CoreResult};

/// Sampling frequency of a [`TimeGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Frequency {
    /// One bucket per day
    Day,
    /// One bucket every seven days, anchored on the start date
    Week,
    /// One bucket per calendar month, dated on the month's last day
    #[default]
    MonthEnd,
    /// One bucket per calendar year, dated on December 31st
    YearEnd,
}

impl Frequency {
    /// Short code used in file names (`D`, `W`, `M`, `Y`).
    pub fn code(&self) -> &'static str {
        match self {
            Frequency::Day => "D",
            Frequency::Week => "W",
            Frequency::MonthEnd => "M",
            Frequency::YearEnd => "Y",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d" | "day" | "daily" => Ok(Frequency::Day),
            "w" | "week" | "weekly" => Ok(Frequency::Week),
            "m" | "me" | "month" | "monthly" | "month-end" => Ok(Frequency::MonthEnd),
            "y" | "a" | "year" | "yearly" | "year-end" => Ok(Frequency::YearEnd),
            other => Err(CoreError::parse("frequency", other)),
        }
    }
}

/// Ordered decision dates shared by all matrices of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeGrid {
    start: NaiveDate,
    end: NaiveDate,
    frequency: Frequency,
    dates: Vec<NaiveDate>,
}

impl TimeGrid {
    /// Build the grid for `[start, end]` at `frequency`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimeGrid`] when `start > end`. A range that
    /// contains no bucket date (e.g. a ten-day range at month-end frequency)
    /// yields an empty grid, which is legal.
    pub fn new(start: NaiveDate, end: NaiveDate, frequency: Frequency) -> CoreResult<Self> {
        if start > end {
            return Err(CoreError::InvalidTimeGrid { start, end });
        }

        let dates = match frequency {
            Frequency::Day => step_days(start, end, 1),
            Frequency::Week => step_days(start, end, 7),
            Frequency::MonthEnd => month_ends(start, end),
            Frequency::YearEnd => year_ends(start, end),
        };

        if dates.is_empty() {
            tracing::warn!(%start, %end, %frequency, "time grid contains no bucket");
        }

        Ok(Self {
            start,
            end,
            frequency,
            dates,
        })
    }

    /// Build a grid from explicit dates (sorted and deduplicated).
    ///
    /// Used when matrices are reloaded from persisted tables.
    pub fn from_dates(mut dates: Vec<NaiveDate>, frequency: Frequency) -> CoreResult<Self> {
        dates.sort_unstable();
        dates.dedup();
        let (start, end) = match (dates.first(), dates.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => return Err(CoreError::validation("time grid needs at least one date")),
        };
        Ok(Self {
            start,
            end,
            frequency,
            dates,
        })
    }

    /// First date of the requested range.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last date of the requested range.
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Sampling frequency.
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Bucket dates in chronological order.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Whether the grid has no bucket.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Column index of `date`, if it is a bucket of this grid.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }
}

fn step_days(start: NaiveDate, end: NaiveDate, step: i64) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        dates.push(current);
        current += Duration::days(step);
    }
    dates
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1).and_then(|d| d.pred_opt())
}

fn month_ends(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let (mut year, mut month) = (start.year(), start.month());
    while let Some(candidate) = last_day_of_month(year, month) {
        if candidate > end {
            break;
        }
        if candidate >= start {
            dates.push(candidate);
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    dates
}

fn year_ends(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    (start.year()..=end.year())
        .filter_map(|year| NaiveDate::from_ymd_opt(year, 12, 31))
        .filter(|d| *d >= start && *d <= end)
        .collect()
}
