//! Attendance engine.
//!
//! Pure functions deriving lateness and an [`AttendanceStatus`] from an
//! occupancy record and the lesson it belongs to. Nothing here performs
//! I/O; callers fetch lessons and records and hand them in.
//!
//! Absence is not decided by [`attendance_status`]: a lesson with no
//! matching record at all is reported [`AttendanceStatus::Absent`] by
//! [`evaluate`].

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::lesson::{ScheduledLesson, TimeWindow};
use crate::occupancy::OccupancyRecord;
use crate::types::{DbId, EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Lateness beyond this many minutes is `very_late`.
pub const DEFAULT_LATE_THRESHOLD_MINUTES: i64 = 10;

/// Fallback matching accepts records opened this long before the start.
pub const DEFAULT_EARLY_ENTRY_MINUTES: i64 = 10;

/// Fallback matching accepts records opened this long after the end.
pub const DEFAULT_LATE_ENTRY_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceConfig {
    pub late_threshold_minutes: i64,
    pub early_entry_minutes: i64,
    pub late_entry_minutes: i64,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            late_threshold_minutes: DEFAULT_LATE_THRESHOLD_MINUTES,
            early_entry_minutes: DEFAULT_EARLY_ENTRY_MINUTES,
            late_entry_minutes: DEFAULT_LATE_ENTRY_MINUTES,
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    OnTime,
    Late,
    VeryLate,
    Absent,
    Unknown,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::OnTime => "on_time",
            AttendanceStatus::Late => "late",
            AttendanceStatus::VeryLate => "very_late",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Unknown => "unknown",
        }
    }
}

/// Whole minutes between the lesson start and `opened_at`, never negative.
pub fn late_minutes(opened_at: Timestamp, lesson_start: Timestamp) -> i64 {
    (opened_at - lesson_start).num_minutes().max(0)
}

/// Classify a lateness value.
pub fn classify(late_minutes: i64, config: &AttendanceConfig) -> AttendanceStatus {
    if late_minutes <= 0 {
        AttendanceStatus::OnTime
    } else if late_minutes <= config.late_threshold_minutes {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::VeryLate
    }
}

/// Lateness of `record` against `lesson`; 0 when no lesson is known.
pub fn record_late_minutes(record: &OccupancyRecord, lesson: Option<&ScheduledLesson>) -> i64 {
    lesson
        .map(|l| late_minutes(record.opened_at, l.starts_at))
        .unwrap_or(0)
}

/// Status of `record` against `lesson`; `Unknown` when no lesson is known.
pub fn attendance_status(
    record: &OccupancyRecord,
    lesson: Option<&ScheduledLesson>,
    config: &AttendanceConfig,
) -> AttendanceStatus {
    match lesson {
        Some(l) => classify(late_minutes(record.opened_at, l.starts_at), config),
        None => AttendanceStatus::Unknown,
    }
}

/// An occupancy record annotated with its attendance classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordAttendance {
    #[serde(flatten)]
    pub record: OccupancyRecord,
    pub attendance_status: AttendanceStatus,
    pub late_minutes: i64,
    pub on_time: bool,
}

pub fn enrich_record(
    record: OccupancyRecord,
    lesson: Option<&ScheduledLesson>,
    config: &AttendanceConfig,
) -> RecordAttendance {
    let late = record_late_minutes(&record, lesson);
    let status = attendance_status(&record, lesson, config);
    RecordAttendance {
        record,
        attendance_status: status,
        late_minutes: late,
        on_time: late == 0,
    }
}

// ---------------------------------------------------------------------------
// Record matching
// ---------------------------------------------------------------------------

/// `[start - early_entry, end + late_entry]`, inclusive on both ends.
pub fn fallback_window(lesson: &ScheduledLesson, config: &AttendanceConfig) -> TimeWindow {
    TimeWindow {
        start: lesson.starts_at - Duration::minutes(config.early_entry_minutes),
        end: lesson.ends_at + Duration::minutes(config.late_entry_minutes),
    }
}

fn is_fallback_candidate(
    record: &OccupancyRecord,
    lesson: &ScheduledLesson,
    config: &AttendanceConfig,
) -> bool {
    // A record already tied to another lesson belongs to that lesson.
    if record.lesson_id.is_some_and(|id| id != lesson.id()) {
        return false;
    }
    record.room_id == lesson.room_id()
        && fallback_window(lesson, config).contains_inclusive(record.opened_at)
}

/// Find the record that evidences attendance of `lesson`.
///
/// Records linked to the lesson by id win; among them the earliest opened.
/// Otherwise a record in the same room opened inside the fallback window is
/// accepted. When such a record also falls into the fallback window of
/// another lesson in `day_lessons` (overlapping slots in one room), it is
/// attributed to the lesson whose start is nearest its open time, ties
/// going to the earlier start.
pub fn match_record<'a>(
    lesson: &ScheduledLesson,
    user_records: &'a [OccupancyRecord],
    day_lessons: &[ScheduledLesson],
    config: &AttendanceConfig,
) -> Option<&'a OccupancyRecord> {
    let linked = user_records
        .iter()
        .filter(|r| r.lesson_id == Some(lesson.id()))
        .min_by_key(|r| r.opened_at);
    if linked.is_some() {
        return linked;
    }

    user_records
        .iter()
        .filter(|r| is_fallback_candidate(r, lesson, config))
        .filter(|r| nearest_lesson(r, lesson, day_lessons, config) == lesson.id())
        .min_by_key(|r| r.opened_at)
}

fn nearest_lesson(
    record: &OccupancyRecord,
    lesson: &ScheduledLesson,
    day_lessons: &[ScheduledLesson],
    config: &AttendanceConfig,
) -> EntityId {
    std::iter::once(lesson)
        .chain(day_lessons.iter().filter(|l| l.id() != lesson.id()))
        .filter(|l| is_fallback_candidate(record, l, config))
        .min_by_key(|l| ((record.opened_at - l.starts_at).abs(), l.starts_at))
        .map(|l| l.id())
        .unwrap_or_else(|| lesson.id())
}

// ---------------------------------------------------------------------------
// Per-lesson evaluation and summary
// ---------------------------------------------------------------------------

/// Attendance of one user for one lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub lesson: ScheduledLesson,
    pub attendance_status: AttendanceStatus,
    pub late_minutes: i64,
    pub on_time: bool,
    pub record_id: Option<DbId>,
    pub entry_time: Option<Timestamp>,
    pub exit_time: Option<Timestamp>,
}

/// Evaluate a lesson against its matched record (`None` means absent).
pub fn evaluate(
    lesson: &ScheduledLesson,
    matched: Option<&OccupancyRecord>,
    config: &AttendanceConfig,
) -> AttendanceEntry {
    match matched {
        None => AttendanceEntry {
            lesson: lesson.clone(),
            attendance_status: AttendanceStatus::Absent,
            late_minutes: 0,
            on_time: false,
            record_id: None,
            entry_time: None,
            exit_time: None,
        },
        Some(record) => {
            let late = late_minutes(record.opened_at, lesson.starts_at);
            AttendanceEntry {
                lesson: lesson.clone(),
                attendance_status: classify(late, config),
                late_minutes: late,
                on_time: late == 0,
                record_id: Some(record.id),
                entry_time: Some(record.opened_at),
                exit_time: record.closed_at,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub total_lessons: usize,
    pub on_time: usize,
    /// Late and very late combined.
    pub late: usize,
    pub absent: usize,
    /// Percentage of lessons attended (on time or late).
    pub attendance_rate: f64,
}

pub fn summarize(entries: &[AttendanceEntry]) -> AttendanceSummary {
    let mut summary = AttendanceSummary {
        total_lessons: entries.len(),
        on_time: 0,
        late: 0,
        absent: 0,
        attendance_rate: 0.0,
    };

    for entry in entries {
        match entry.attendance_status {
            AttendanceStatus::OnTime => summary.on_time += 1,
            AttendanceStatus::Late | AttendanceStatus::VeryLate => summary.late += 1,
            AttendanceStatus::Absent => summary.absent += 1,
            AttendanceStatus::Unknown => {}
        }
    }

    if summary.total_lessons > 0 {
        let attended = (summary.on_time + summary.late) as f64;
        summary.attendance_rate = attended / summary.total_lessons as f64 * 100.0;
    }
    summary
}

/// A user's attendance over one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAttendance {
    pub user_id: EntityId,
    pub date: NaiveDate,
    pub records: Vec<AttendanceEntry>,
    pub summary: AttendanceSummary,
}

/// Build the daily report from the user's lessons and occupancy records.
pub fn daily_attendance(
    user_id: EntityId,
    date: NaiveDate,
    lessons: &[ScheduledLesson],
    user_records: &[OccupancyRecord],
    config: &AttendanceConfig,
) -> DailyAttendance {
    let records: Vec<AttendanceEntry> = lessons
        .iter()
        .map(|lesson| {
            let matched = match_record(lesson, user_records, lessons, config);
            evaluate(lesson, matched, config)
        })
        .collect();
    let summary = summarize(&records);

    DailyAttendance {
        user_id,
        date,
        records,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::SchoolCalendar;
    use crate::lesson::Lesson;
    use crate::occupancy::OccupancySource;
    use chrono::{NaiveTime, TimeZone, Utc};
    use uuid::Uuid;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 14).unwrap()
    }

    fn at(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 4, 14, h, m, 0).unwrap()
    }

    fn scheduled(room_id: EntityId, start: (u32, u32), end: (u32, u32)) -> ScheduledLesson {
        Lesson {
            id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
            room_id,
            org_id: Uuid::new_v4(),
            day_of_week: 1,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            date: None,
            period: None,
        }
        .schedule_on(monday(), &SchoolCalendar::utc())
        .unwrap()
    }

    fn record(id: DbId, room_id: EntityId, lesson_id: Option<EntityId>, opened_at: Timestamp) -> OccupancyRecord {
        OccupancyRecord {
            id,
            user_id: Uuid::nil(),
            room_id,
            subject_id: Uuid::new_v4(),
            lesson_id,
            source: if lesson_id.is_some() {
                OccupancySource::Auto
            } else {
                OccupancySource::Manual
            },
            is_active: false,
            description: None,
            opened_at,
            closed_at: None,
        }
    }

    // -----------------------------------------------------------------------
    // Lateness and status
    // -----------------------------------------------------------------------

    #[test]
    fn opened_at_start_is_on_time() {
        let config = AttendanceConfig::default();
        let lesson = scheduled(Uuid::new_v4(), (9, 0), (10, 0));
        let r = record(1, lesson.room_id(), Some(lesson.id()), at(9, 0));
        assert_eq!(record_late_minutes(&r, Some(&lesson)), 0);
        assert_eq!(attendance_status(&r, Some(&lesson), &config), AttendanceStatus::OnTime);
    }

    #[test]
    fn early_arrival_is_on_time() {
        let config = AttendanceConfig::default();
        let lesson = scheduled(Uuid::new_v4(), (9, 0), (10, 0));
        let r = record(1, lesson.room_id(), Some(lesson.id()), at(8, 56));
        assert_eq!(record_late_minutes(&r, Some(&lesson)), 0);
        assert_eq!(attendance_status(&r, Some(&lesson), &config), AttendanceStatus::OnTime);
    }

    #[test]
    fn ten_minutes_is_late() {
        let config = AttendanceConfig::default();
        let lesson = scheduled(Uuid::new_v4(), (9, 0), (10, 0));
        let r = record(1, lesson.room_id(), Some(lesson.id()), at(9, 10));
        assert_eq!(record_late_minutes(&r, Some(&lesson)), 10);
        assert_eq!(attendance_status(&r, Some(&lesson), &config), AttendanceStatus::Late);
    }

    #[test]
    fn eleven_minutes_is_very_late() {
        let config = AttendanceConfig::default();
        let lesson = scheduled(Uuid::new_v4(), (9, 0), (10, 0));
        let r = record(1, lesson.room_id(), Some(lesson.id()), at(9, 11));
        assert_eq!(attendance_status(&r, Some(&lesson), &config), AttendanceStatus::VeryLate);
    }

    #[test]
    fn partial_minutes_are_floored() {
        let start = at(9, 0);
        assert_eq!(late_minutes(start + Duration::seconds(59), start), 0);
        assert_eq!(late_minutes(start + Duration::seconds(10 * 60 + 59), start), 10);
    }

    #[test]
    fn no_lesson_is_unknown() {
        let r = record(1, Uuid::new_v4(), None, at(9, 0));
        assert_eq!(
            attendance_status(&r, None, &AttendanceConfig::default()),
            AttendanceStatus::Unknown
        );
        assert_eq!(record_late_minutes(&r, None), 0);
    }

    #[test]
    fn enrich_without_lesson_is_unknown_but_on_time() {
        let r = record(1, Uuid::new_v4(), None, at(9, 30));
        let enriched = enrich_record(r, None, &AttendanceConfig::default());
        assert_eq!(enriched.attendance_status, AttendanceStatus::Unknown);
        assert_eq!(enriched.late_minutes, 0);
        assert!(enriched.on_time);
    }

    #[test]
    fn custom_threshold() {
        let config = AttendanceConfig {
            late_threshold_minutes: 3,
            ..Default::default()
        };
        assert_eq!(classify(3, &config), AttendanceStatus::Late);
        assert_eq!(classify(4, &config), AttendanceStatus::VeryLate);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AttendanceStatus::VeryLate).unwrap(),
            "\"very_late\""
        );
        assert_eq!(AttendanceStatus::OnTime.as_str(), "on_time");
    }

    // -----------------------------------------------------------------------
    // Matching
    // -----------------------------------------------------------------------

    #[test]
    fn linked_record_wins_over_fallback() {
        let config = AttendanceConfig::default();
        let lesson = scheduled(Uuid::new_v4(), (9, 0), (10, 0));
        let records = vec![
            record(1, lesson.room_id(), None, at(8, 55)),
            record(2, lesson.room_id(), Some(lesson.id()), at(9, 5)),
        ];
        let matched = match_record(&lesson, &records, std::slice::from_ref(&lesson), &config);
        assert_eq!(matched.map(|r| r.id), Some(2));
    }

    #[test]
    fn earliest_linked_record_is_used() {
        let config = AttendanceConfig::default();
        let lesson = scheduled(Uuid::new_v4(), (9, 0), (10, 0));
        let records = vec![
            record(1, lesson.room_id(), Some(lesson.id()), at(9, 20)),
            record(2, lesson.room_id(), Some(lesson.id()), at(9, 2)),
        ];
        let matched = match_record(&lesson, &records, std::slice::from_ref(&lesson), &config);
        assert_eq!(matched.map(|r| r.id), Some(2));
    }

    #[test]
    fn fallback_window_edges_are_inclusive() {
        let config = AttendanceConfig::default();
        let lesson = scheduled(Uuid::new_v4(), (9, 0), (10, 0));
        let day = std::slice::from_ref(&lesson);

        let early = vec![record(1, lesson.room_id(), None, at(8, 50))];
        assert!(match_record(&lesson, &early, day, &config).is_some());

        let too_early = vec![record(1, lesson.room_id(), None, at(8, 49))];
        assert!(match_record(&lesson, &too_early, day, &config).is_none());

        let late = vec![record(1, lesson.room_id(), None, at(10, 30))];
        assert!(match_record(&lesson, &late, day, &config).is_some());

        let too_late = vec![record(1, lesson.room_id(), None, at(10, 31))];
        assert!(match_record(&lesson, &too_late, day, &config).is_none());
    }

    #[test]
    fn fallback_requires_same_room() {
        let config = AttendanceConfig::default();
        let lesson = scheduled(Uuid::new_v4(), (9, 0), (10, 0));
        let records = vec![record(1, Uuid::new_v4(), None, at(9, 0))];
        assert!(match_record(&lesson, &records, std::slice::from_ref(&lesson), &config).is_none());
    }

    #[test]
    fn record_linked_elsewhere_is_not_a_fallback() {
        let config = AttendanceConfig::default();
        let lesson = scheduled(Uuid::new_v4(), (9, 0), (10, 0));
        let records = vec![record(1, lesson.room_id(), Some(Uuid::new_v4()), at(9, 0))];
        assert!(match_record(&lesson, &records, std::slice::from_ref(&lesson), &config).is_none());
    }

    #[test]
    fn back_to_back_lesson_does_not_reuse_linked_record() {
        // Entered at 09:58 for the first lesson; the second starts at 10:00
        // in the same room, so the record is inside its fallback window too.
        let config = AttendanceConfig::default();
        let room = Uuid::new_v4();
        let first = scheduled(room, (9, 0), (10, 0));
        let second = scheduled(room, (10, 0), (11, 0));
        let records = vec![record(1, room, Some(first.id()), at(9, 58))];
        let day = [first.clone(), second.clone()];

        assert_eq!(match_record(&first, &records, &day, &config).map(|r| r.id), Some(1));
        assert!(match_record(&second, &records, &day, &config).is_none());
    }

    #[test]
    fn overlapping_lessons_attribute_to_nearest_start() {
        let config = AttendanceConfig::default();
        let room = Uuid::new_v4();
        let first = scheduled(room, (9, 0), (10, 0));
        let second = scheduled(room, (10, 10), (11, 10));
        let day = vec![first.clone(), second.clone()];

        // 10:05 is inside both fallback windows; second starts nearer.
        let records = vec![record(7, room, None, at(10, 5))];
        assert!(match_record(&first, &records, &day, &config).is_none());
        assert_eq!(match_record(&second, &records, &day, &config).map(|r| r.id), Some(7));
    }

    #[test]
    fn equidistant_overlap_goes_to_earlier_start() {
        let config = AttendanceConfig::default();
        let room = Uuid::new_v4();
        let first = scheduled(room, (9, 0), (10, 0));
        let second = scheduled(room, (9, 10), (10, 10));
        let day = vec![second.clone(), first.clone()];

        let records = vec![record(3, room, None, at(9, 5))];
        assert_eq!(match_record(&first, &records, &day, &config).map(|r| r.id), Some(3));
        assert!(match_record(&second, &records, &day, &config).is_none());
    }

    // -----------------------------------------------------------------------
    // Evaluation and summary
    // -----------------------------------------------------------------------

    #[test]
    fn no_match_is_absent_with_zero_lateness() {
        let lesson = scheduled(Uuid::new_v4(), (9, 0), (10, 0));
        let entry = evaluate(&lesson, None, &AttendanceConfig::default());
        assert_eq!(entry.attendance_status, AttendanceStatus::Absent);
        assert_eq!(entry.late_minutes, 0);
        assert!(!entry.on_time);
        assert!(entry.entry_time.is_none());
    }

    #[test]
    fn evaluate_carries_entry_and_exit_times() {
        let lesson = scheduled(Uuid::new_v4(), (9, 0), (10, 0));
        let mut r = record(4, lesson.room_id(), Some(lesson.id()), at(9, 3));
        r.closed_at = Some(at(10, 10));
        let entry = evaluate(&lesson, Some(&r), &AttendanceConfig::default());
        assert_eq!(entry.attendance_status, AttendanceStatus::Late);
        assert_eq!(entry.late_minutes, 3);
        assert_eq!(entry.entry_time, Some(at(9, 3)));
        assert_eq!(entry.exit_time, Some(at(10, 10)));
        assert_eq!(entry.record_id, Some(4));
    }

    #[test]
    fn attendance_rate_counts_late_as_attended() {
        let lesson = scheduled(Uuid::new_v4(), (9, 0), (10, 0));
        let entry = |status| AttendanceEntry {
            lesson: lesson.clone(),
            attendance_status: status,
            late_minutes: 0,
            on_time: false,
            record_id: None,
            entry_time: None,
            exit_time: None,
        };
        let entries = vec![
            entry(AttendanceStatus::OnTime),
            entry(AttendanceStatus::Late),
            entry(AttendanceStatus::Absent),
            entry(AttendanceStatus::Absent),
        ];
        let summary = summarize(&entries);
        assert_eq!(summary.total_lessons, 4);
        assert_eq!(summary.on_time, 1);
        assert_eq!(summary.late, 1);
        assert_eq!(summary.absent, 2);
        assert!((summary.attendance_rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_summary_has_zero_rate() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_lessons, 0);
        assert_eq!(summary.attendance_rate, 0.0);
    }

    #[test]
    fn daily_attendance_combines_everything() {
        let config = AttendanceConfig::default();
        let room = Uuid::new_v4();
        let first = scheduled(room, (9, 0), (10, 0));
        let second = scheduled(Uuid::new_v4(), (13, 0), (14, 0));
        let lessons = vec![first.clone(), second.clone()];
        let records = vec![record(1, room, Some(first.id()), at(8, 57))];

        let report = daily_attendance(Uuid::nil(), monday(), &lessons, &records, &config);
        assert_eq!(report.records[0].attendance_status, AttendanceStatus::OnTime);
        assert_eq!(report.records[1].attendance_status, AttendanceStatus::Absent);
        assert_eq!(report.summary.attendance_rate, 50.0);
    }
}
