//! Calendar-aligned date windows for paginating catalog queries.

use crate::error::{FetchError, Result};
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WindowUnit {
    Month,
    Year,
}

/// One sub-range of the requested date span, bounded to whole days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn start_timestamp(&self) -> String {
        format!("{}T00:00:00.000Z", self.start)
    }

    pub fn end_timestamp(&self) -> String {
        format!("{}T23:59:59.999Z", self.end)
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Splits [initial, last] into contiguous windows, one per calendar unit,
/// clamped to the requested bounds. Reversed bounds are swapped, not rejected.
pub fn split_date_range(initial: &str, last: &str, unit: WindowUnit) -> Result<Vec<DateWindow>> {
    let start = parse_date(initial)?;
    let end = parse_date(last)?;

    let (mut cursor, end) = if start > end {
        warn!(initial, last, "dates given in reverse order, swapping them");
        (end, start)
    } else {
        (start, end)
    };

    let mut windows = Vec::new();
    while cursor <= end {
        let unit_end = match unit {
            WindowUnit::Month => end_of_month(cursor),
            WindowUnit::Year => end_of_year(cursor),
        };
        let window_end = unit_end.min(end);
        windows.push(DateWindow {
            start: cursor,
            end: window_end,
        });
        cursor = match window_end.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    Ok(windows)
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
        FetchError::Input(format!("invalid date '{value}', expected YYYY-MM-DD"))
    })
}

fn end_of_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    let next_month = first.checked_add_months(Months::new(1)).unwrap_or(first);
    next_month.checked_sub_days(Days::new(1)).unwrap_or(date)
}

fn end_of_year(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date)
}
