use anyhow::{Result, anyhow};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open validity interval `[begin, end)`.
///
/// Equality, ordering, and hashing derive only from the two boundary values,
/// so timespans are usable as grouping keys with reproducible results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timespan {
    begin: NaiveDateTime,
    end: NaiveDateTime,
}

impl Timespan {
    pub fn new(begin: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if begin > end {
            return Err(anyhow!("timespan begin {begin} is after end {end}"));
        }
        Ok(Self { begin, end })
    }

    pub fn begin(&self) -> NaiveDateTime {
        self.begin
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Build a timespan from a legacy validity row. The legacy convention
    /// stores an inclusive end date, so the half-open end is the stored end
    /// plus exactly one day.
    pub fn from_legacy_row(valid_start: &str, valid_end: &str) -> Result<Self> {
        let begin = parse_legacy_time(valid_start)?;
        let end = parse_legacy_time(valid_end)? + Duration::days(1);
        Self::new(begin, end)
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// Legacy registries store validity boundaries as ISO dates, sometimes with
/// a time component.
pub fn parse_legacy_time(raw: &str) -> Result<NaiveDateTime> {
    let trimmed = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    Err(anyhow!("unparseable legacy validity time `{raw}`"))
}

/// One day plus a small tolerance. Gaps and overlaps smaller than this are
/// treated as legacy day-convention artifacts and corrected; anything larger
/// is a genuine discontinuity and passes through untouched.
pub fn fuzzy_day() -> Duration {
    Duration::milliseconds(86_486_400)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(begin: &str, end: &str) -> Timespan {
        Timespan::new(
            parse_legacy_time(begin).expect("begin"),
            parse_legacy_time(end).expect("end"),
        )
        .expect("timespan")
    }

    #[test]
    fn legacy_row_end_is_exclusive_next_day() {
        let span = Timespan::from_legacy_row("2020-01-01", "2020-01-01").expect("row");
        assert_eq!(span, ts("2020-01-01", "2020-01-02"));
    }

    #[test]
    fn parse_accepts_date_and_datetime_forms() {
        assert!(parse_legacy_time("2020-01-01").is_ok());
        assert!(parse_legacy_time("2020-01-01 12:30:00").is_ok());
        assert!(parse_legacy_time("2020-01-01T12:30:00.5").is_ok());
        assert!(parse_legacy_time("yesterday").is_err());
    }

    #[test]
    fn inverted_timespan_is_rejected() {
        assert!(Timespan::from_legacy_row("2020-02-01", "2020-01-01").is_err());
    }

    #[test]
    fn timespans_order_by_begin_then_end() {
        let a = ts("2020-01-01", "2020-01-05");
        let b = ts("2020-01-01", "2020-01-06");
        let c = ts("2020-01-02", "2020-01-03");
        assert!(a < b && b < c);
    }

    #[test]
    fn fuzzy_day_is_just_over_one_day() {
        assert!(fuzzy_day() > Duration::days(1));
        assert!(fuzzy_day() < Duration::days(1) + Duration::minutes(2));
    }
}
