//! Date range parsing and validation
//!
//! Dates are calendar days in `YYYY/MM/DD` form, interpreted as UTC midnight.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// Calendar date format accepted for start and end dates
pub const DATE_FORMAT: &str = "%Y/%m/%d";

/// Date range errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateRangeError {
    /// Input does not match `YYYY/MM/DD`
    #[error("invalid {field} date '{value}': must be provided in format YYYY/MM/DD")]
    InvalidDateFormat {
        /// Which bound failed to parse ("start" or "end")
        field: &'static str,
        /// Raw input
        value: String,
    },

    /// End does not occur strictly after start
    #[error("end date {end} must occur after the start date {start}")]
    InvalidDateRange {
        /// Parsed start date
        start: NaiveDate,
        /// Parsed end date
        end: NaiveDate,
    },
}

/// Time interval a run covers.
///
/// `end`, when present, is strictly after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
}

impl TimeInterval {
    /// Interval start
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Interval end, if bounded
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Start as epoch milliseconds, the encoding the LIMS expects
    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// End as epoch milliseconds
    pub fn end_millis(&self) -> Option<i64> {
        self.end.map(|end| end.timestamp_millis())
    }

    /// Whether a delivery at `timestamp_ms` is kept.
    ///
    /// Only the end bound is checked: the source already filters on start.
    pub fn admits_delivery(&self, timestamp_ms: i64) -> bool {
        match self.end_millis() {
            Some(end) => timestamp_ms <= end,
            None => true,
        }
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.start.format(DATE_FORMAT);
        match self.end {
            Some(end) => write!(f, "{start} - {}", end.format(DATE_FORMAT)),
            None => write!(f, "{start} - open"),
        }
    }
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, DateRangeError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        DateRangeError::InvalidDateFormat {
            field,
            value: value.to_string(),
        }
    })
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Resolve a start and optional end date into a [`TimeInterval`].
///
/// # Errors
///
/// - [`DateRangeError::InvalidDateFormat`] if either input is not `YYYY/MM/DD`
/// - [`DateRangeError::InvalidDateRange`] if end is not strictly after start
///
/// # Examples
///
/// ```
/// use lims_publisher::date_range::resolve;
///
/// let interval = resolve("2024/01/01", Some("2024/01/31")).unwrap();
/// assert_eq!(interval.start_millis(), 1704067200000);
/// assert!(resolve("2024/01/31", Some("2024/01/01")).is_err());
/// ```
pub fn resolve(start: &str, end: Option<&str>) -> Result<TimeInterval, DateRangeError> {
    let start_date = parse_date("start", start)?;

    let end = match end {
        Some(raw) => {
            let end_date = parse_date("end", raw)?;
            if end_date <= start_date {
                return Err(DateRangeError::InvalidDateRange {
                    start: start_date,
                    end: end_date,
                });
            }
            Some(midnight_utc(end_date))
        }
        None => None,
    };

    Ok(TimeInterval {
        start: midnight_utc(start_date),
        end,
    })
}
