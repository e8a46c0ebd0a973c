//! Small shared helpers: timestamp truncation and calendar grouping keys.

use chrono::{Datelike, NaiveDate};

use crate::{Error, Result};

/// Truncate an ISO-8601 timestamp to its calendar date.
///
/// Image sources deliver timestamps like `2024-07-29T10:00:00.000Z`; only
/// the date part matters for weekly and monthly grouping, so everything
/// from the first `T` (or space) on is dropped.
pub fn truncate_to_date(timestamp: &str) -> Result<NaiveDate> {
    let date_part = timestamp
        .split(['T', ' '])
        .next()
        .unwrap_or(timestamp)
        .trim();

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| Error::InvalidTimestamp(timestamp.to_string()))
}

/// Grouping key for weekly accumulation: ISO week number paired with the
/// calendar year of the date.
pub fn week_key(date: NaiveDate) -> (u32, i32) {
    (date.iso_week().week(), date.year())
}

/// Grouping key for monthly accumulation: calendar month and year.
pub fn month_key(date: NaiveDate) -> (u32, i32) {
    (date.month(), date.year())
}
