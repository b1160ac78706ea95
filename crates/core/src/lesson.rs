//! Timetable slots and their monitoring windows.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::calendar::SchoolCalendar;
use crate::types::{EntityId, Timestamp};

/// Monitoring starts this many minutes before the scheduled start.
pub const MONITOR_LEAD_MINUTES: i64 = 5;

/// Monitoring continues this many minutes after the scheduled end.
pub const MONITOR_TRAIL_MINUTES: i64 = 10;

/// One timetable slot as administered externally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: EntityId,
    pub subject_id: EntityId,
    pub room_id: EntityId,
    pub org_id: EntityId,
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Set for one-off lessons; weekly lessons leave it empty.
    pub date: Option<NaiveDate>,
    pub period: Option<i16>,
}

impl Lesson {
    /// Whether this slot takes place on `date`.
    ///
    /// A dated lesson only occurs on its date; otherwise the weekday decides.
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        match self.date {
            Some(d) => d == date,
            None => SchoolCalendar::weekday_index(date) == self.day_of_week,
        }
    }

    /// Place the slot on a concrete local date.
    ///
    /// Returns `None` when the lesson does not occur on `date`. An end time
    /// earlier than the start time is taken to fall on the following day.
    pub fn schedule_on(&self, date: NaiveDate, calendar: &SchoolCalendar) -> Option<ScheduledLesson> {
        if !self.occurs_on(date) {
            return None;
        }
        let starts_at = calendar.at(date, self.start_time);
        let mut ends_at = calendar.at(date, self.end_time);
        if ends_at < starts_at {
            ends_at += Duration::days(1);
        }
        Some(ScheduledLesson {
            lesson: self.clone(),
            date,
            starts_at,
            ends_at,
        })
    }
}

/// A [`Lesson`] resolved onto a calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledLesson {
    pub lesson: Lesson,
    pub date: NaiveDate,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
}

impl ScheduledLesson {
    /// Id of the underlying timetable slot.
    pub fn id(&self) -> EntityId {
        self.lesson.id
    }

    /// Room the lesson takes place in.
    pub fn room_id(&self) -> EntityId {
        self.lesson.room_id
    }

    /// Subject taught in the lesson.
    pub fn subject_id(&self) -> EntityId {
        self.lesson.subject_id
    }

    /// `[start - 5min, end + 10min)`.
    pub fn monitoring_window(&self) -> TimeWindow {
        TimeWindow {
            start: self.starts_at - Duration::minutes(MONITOR_LEAD_MINUTES),
            end: self.ends_at + Duration::minutes(MONITOR_TRAIL_MINUTES),
        }
    }

    /// A lesson is live while `now` is inside its monitoring window.
    pub fn is_live_at(&self, now: Timestamp) -> bool {
        self.monitoring_window().contains(now)
    }

    /// Whether the lesson itself (not its monitoring window) is running.
    /// Both ends are inclusive.
    pub fn is_running_at(&self, at: Timestamp) -> bool {
        self.starts_at <= at && at <= self.ends_at
    }
}

/// A span of time between two instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    /// Half-open membership: `start <= at < end`.
    pub fn contains(&self, at: Timestamp) -> bool {
        self.start <= at && at < self.end
    }

    /// Closed membership: `start <= at <= end`.
    pub fn contains_inclusive(&self, at: Timestamp) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Resolve the live occurrences of `lessons` at `now`.
///
/// Candidates from both today and yesterday are considered so that a
/// window running past local midnight is still reported. Each lesson id
/// appears at most once.
pub fn live_occurrences<'a>(
    lessons: impl IntoIterator<Item = &'a Lesson>,
    now: Timestamp,
    calendar: &SchoolCalendar,
) -> Vec<ScheduledLesson> {
    let today = calendar.local_date(now);
    let dates = [today.pred_opt(), Some(today)];

    let mut live: Vec<ScheduledLesson> = Vec::new();
    for lesson in lessons {
        for date in dates.iter().flatten() {
            if let Some(scheduled) = lesson.schedule_on(*date, calendar) {
                if scheduled.is_live_at(now) && !live.iter().any(|l| l.id() == lesson.id) {
                    live.push(scheduled);
                }
            }
        }
    }
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 14).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn lesson(start: NaiveTime, end: NaiveTime) -> Lesson {
        Lesson {
            id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            day_of_week: 1,
            start_time: start,
            end_time: end,
            date: None,
            period: Some(1),
        }
    }

    fn at(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 4, 14, h, m, 0).unwrap()
    }

    #[test]
    fn weekly_lesson_occurs_on_matching_weekday_only() {
        let l = lesson(hm(9, 0), hm(10, 30));
        assert!(l.occurs_on(monday()));
        assert!(!l.occurs_on(monday().succ_opt().unwrap()));
    }

    #[test]
    fn dated_lesson_ignores_weekday() {
        let mut l = lesson(hm(9, 0), hm(10, 30));
        l.day_of_week = 3;
        l.date = Some(monday());
        assert!(l.occurs_on(monday()));
        assert!(!l.occurs_on(monday() + Duration::days(7)));
    }

    #[test]
    fn monitoring_window_boundaries() {
        let cal = SchoolCalendar::utc();
        let l = lesson(hm(9, 0), hm(10, 30)).schedule_on(monday(), &cal).unwrap();

        assert!(!l.is_live_at(at(8, 54)));
        assert!(l.is_live_at(at(8, 55)));
        assert!(l.is_live_at(at(8, 56)));
        assert!(l.is_live_at(at(10, 39)));
        assert!(!l.is_live_at(at(10, 40)));
    }

    #[test]
    fn running_window_is_inclusive() {
        let cal = SchoolCalendar::utc();
        let l = lesson(hm(9, 0), hm(10, 0)).schedule_on(monday(), &cal).unwrap();
        assert!(l.is_running_at(at(9, 0)));
        assert!(l.is_running_at(at(10, 0)));
        assert!(!l.is_running_at(at(10, 1)));
    }

    #[test]
    fn overnight_lesson_ends_next_day() {
        let cal = SchoolCalendar::utc();
        let l = lesson(hm(23, 30), hm(0, 30)).schedule_on(monday(), &cal).unwrap();
        assert_eq!(l.ends_at - l.starts_at, Duration::hours(1));
    }

    #[test]
    fn live_occurrences_filters_and_dedupes() {
        let cal = SchoolCalendar::utc();
        let first = lesson(hm(9, 0), hm(10, 0));
        let second = lesson(hm(13, 0), hm(14, 0));
        let lessons = vec![first.clone(), second, first.clone()];

        let live = live_occurrences(&lessons, at(9, 30), &cal);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id(), first.id);
    }

    #[test]
    fn live_occurrences_includes_yesterdays_late_lesson() {
        let cal = SchoolCalendar::utc();
        let mut late = lesson(hm(23, 0), hm(23, 55));
        late.day_of_week = 0; // Sunday
        let now = Utc.with_ymd_and_hms(2025, 4, 14, 0, 2, 0).unwrap(); // Monday 00:02

        let live = live_occurrences([&late], now, &cal);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].date, NaiveDate::from_ymd_opt(2025, 4, 13).unwrap());
    }
}
