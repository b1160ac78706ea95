//! Local calendar used to place timetable slots on the time line.
//!
//! Lessons are stored as wall-clock times (`09:00`-`10:30` on Mondays),
//! while occupancy records and device authentications are UTC timestamps.
//! [`SchoolCalendar`] converts between the two using the institution's
//! fixed UTC offset, and answers "which calendar day is it" questions for
//! device eligibility and the midnight deactivation run.

use chrono::{Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;

/// Default offset of the timetable's local time (JST).
pub const DEFAULT_UTC_OFFSET: &str = "+09:00";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchoolCalendar {
    offset: FixedOffset,
}

impl SchoolCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// A calendar whose local time is UTC.
    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Parse an offset of the form `+HH:MM`, `-HH:MM`, `+HHMM`, `Z` or `UTC`.
    pub fn from_offset_str(raw: &str) -> CoreResult<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
            return Ok(Self::utc());
        }

        let invalid = || CoreError::Validation(format!("Invalid UTC offset '{raw}'"));

        let (sign, rest) = match raw.as_bytes().first() {
            Some(b'+') => (1, &raw[1..]),
            Some(b'-') => (-1, &raw[1..]),
            _ => return Err(invalid()),
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
        let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self::new)
            .ok_or_else(invalid)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// The local calendar date containing `at`.
    pub fn local_date(&self, at: Timestamp) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// The UTC instant of wall-clock `time` on local `date`.
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> Timestamp {
        let local = date.and_time(time);
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }

    /// The first local midnight strictly after `at`.
    pub fn next_midnight(&self, at: Timestamp) -> Timestamp {
        match self.local_date(at).succ_opt() {
            Some(tomorrow) => self.at(tomorrow, NaiveTime::MIN),
            None => at + Duration::days(1),
        }
    }

    /// Whether both instants fall on the same local calendar day.
    pub fn same_day(&self, a: Timestamp, b: Timestamp) -> bool {
        self.local_date(a) == self.local_date(b)
    }

    /// Day-of-week index as stored in the timetable (0 = Sunday .. 6 = Saturday).
    pub fn weekday_index(date: NaiveDate) -> i16 {
        date.weekday().num_days_from_sunday() as i16
    }
}

impl Default for SchoolCalendar {
    fn default() -> Self {
        // DEFAULT_UTC_OFFSET is a valid literal.
        Self::from_offset_str(DEFAULT_UTC_OFFSET).unwrap_or_else(|_| Self::utc())
    }
}
