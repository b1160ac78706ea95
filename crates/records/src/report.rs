//! Attendance reporting.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use attend_core::attendance::{
    daily_attendance, enrich_record, AttendanceConfig, DailyAttendance, RecordAttendance,
};
use attend_core::calendar::SchoolCalendar;
use attend_core::clock::Clock;
use attend_core::error::CoreResult;
use attend_core::lesson::ScheduledLesson;
use attend_core::ports::{OccupancyStore, Timetable};
use attend_core::types::EntityId;

pub struct AttendanceReportService {
    timetable: Arc<dyn Timetable>,
    store: Arc<dyn OccupancyStore>,
    clock: Arc<dyn Clock>,
    calendar: SchoolCalendar,
    config: AttendanceConfig,
}

impl AttendanceReportService {
    pub fn new(
        timetable: Arc<dyn Timetable>,
        store: Arc<dyn OccupancyStore>,
        clock: Arc<dyn Clock>,
        calendar: SchoolCalendar,
        config: AttendanceConfig,
    ) -> Self {
        Self {
            timetable,
            store,
            clock,
            calendar,
            config,
        }
    }

    /// The user's attendance for the current local day.
    pub async fn today(&self, user_id: EntityId) -> CoreResult<DailyAttendance> {
        let date = self.calendar.local_date(self.clock.now());
        self.for_date(user_id, date).await
    }

    /// The user's attendance for every lesson on local `date`. Lessons
    /// without a matching record count as absent.
    pub async fn for_date(&self, user_id: EntityId, date: NaiveDate) -> CoreResult<DailyAttendance> {
        let lessons = self.timetable.lessons_for_user_on(user_id, date).await?;

        // Fallback windows reach at most a few minutes across midnight.
        let first = date - Duration::days(1);
        let last = date + Duration::days(1);
        let records: Vec<_> = self
            .store
            .records_for_user(user_id)
            .await?
            .into_iter()
            .filter(|r| {
                let day = self.calendar.local_date(r.opened_at);
                first <= day && day <= last
            })
            .collect();

        let report = daily_attendance(user_id, date, &lessons, &records, &self.config);
        tracing::debug!(
            user_id = %user_id,
            %date,
            lessons = report.summary.total_lessons,
            absent = report.summary.absent,
            "Attendance computed"
        );
        Ok(report)
    }

    /// Every record linked to `lesson`, classified against it.
    pub async fn lesson_records(&self, lesson: &ScheduledLesson) -> CoreResult<Vec<RecordAttendance>> {
        let records = self.store.records_for_lesson(lesson.id()).await?;
        Ok(records
            .into_iter()
            .map(|r| enrich_record(r, Some(lesson), &self.config))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attend_core::attendance::AttendanceStatus;
    use attend_core::lesson::Lesson;
    use attend_core::occupancy::{OccupancyRecord, OccupancySource};
    use attend_core::testing::{FixedClock, InMemoryBackend};
    use attend_core::types::{DbId, Timestamp};
    use chrono::{NaiveTime, TimeZone, Utc};
    use uuid::Uuid;

    fn at(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 4, 14, h, m, 0).unwrap()
    }

    fn lesson(org: EntityId, room: EntityId, start: u32, end: u32) -> Lesson {
        Lesson {
            id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
            room_id: room,
            org_id: org,
            day_of_week: 1,
            start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
            date: None,
            period: None,
        }
    }

    fn record(id: DbId, user: EntityId, l: &Lesson, linked: bool, opened_at: Timestamp) -> OccupancyRecord {
        OccupancyRecord {
            id,
            user_id: user,
            room_id: l.room_id,
            subject_id: l.subject_id,
            lesson_id: linked.then_some(l.id),
            source: if linked {
                OccupancySource::Auto
            } else {
                OccupancySource::Manual
            },
            is_active: false,
            description: None,
            opened_at,
            closed_at: Some(opened_at + Duration::minutes(50)),
        }
    }

    fn service(backend: &Arc<InMemoryBackend>, now: Timestamp) -> AttendanceReportService {
        AttendanceReportService::new(
            backend.clone(),
            backend.clone(),
            Arc::new(FixedClock::new(now)),
            SchoolCalendar::utc(),
            AttendanceConfig::default(),
        )
    }

    #[tokio::test]
    async fn today_reports_every_lesson() {
        let backend = Arc::new(InMemoryBackend::new(SchoolCalendar::utc()));
        let org = Uuid::new_v4();
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();
        backend.add_user(user, org);

        let first = lesson(org, room, 9, 10);
        let second = lesson(org, room, 11, 12);
        let third = lesson(org, Uuid::new_v4(), 13, 14);
        let fourth = lesson(org, Uuid::new_v4(), 15, 16);
        for l in [&first, &second, &third, &fourth] {
            backend.add_lesson(l.clone());
        }
        // On time by link, late by room fallback, the rest absent.
        backend.insert_record(record(1, user, &first, true, at(8, 58)));
        backend.insert_record(record(2, user, &second, false, at(11, 7)));

        let report = service(&backend, at(18, 0)).today(user).await.unwrap();
        let statuses: Vec<_> = report.records.iter().map(|r| r.attendance_status).collect();
        assert_eq!(
            statuses,
            vec![
                AttendanceStatus::OnTime,
                AttendanceStatus::Late,
                AttendanceStatus::Absent,
                AttendanceStatus::Absent,
            ]
        );
        assert_eq!(report.records[1].late_minutes, 7);
        assert_eq!(report.records[0].exit_time, Some(at(9, 48)));
        assert_eq!(report.summary.attendance_rate, 50.0);
        assert_eq!(report.date, NaiveDate::from_ymd_opt(2025, 4, 14).unwrap());
    }

    #[tokio::test]
    async fn records_from_other_days_are_ignored() {
        let backend = Arc::new(InMemoryBackend::new(SchoolCalendar::utc()));
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        backend.add_user(user, org);
        let l = lesson(org, Uuid::new_v4(), 9, 10);
        backend.add_lesson(l.clone());
        backend.insert_record(record(1, user, &l, true, at(9, 0) - Duration::days(7)));

        let report = service(&backend, at(18, 0)).today(user).await.unwrap();
        assert_eq!(report.records[0].attendance_status, AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn lesson_records_are_classified() {
        let backend = Arc::new(InMemoryBackend::new(SchoolCalendar::utc()));
        let org = Uuid::new_v4();
        let l = lesson(org, Uuid::new_v4(), 9, 10);
        backend.insert_record(record(1, Uuid::new_v4(), &l, true, at(9, 0)));
        backend.insert_record(record(2, Uuid::new_v4(), &l, true, at(9, 25)));

        let scheduled = l
            .schedule_on(NaiveDate::from_ymd_opt(2025, 4, 14).unwrap(), &SchoolCalendar::utc())
            .unwrap();
        let records = service(&backend, at(10, 0))
            .lesson_records(&scheduled)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].attendance_status, AttendanceStatus::OnTime);
        assert!(records[0].on_time);
        assert_eq!(records[1].attendance_status, AttendanceStatus::VeryLate);
        assert_eq!(records[1].late_minutes, 25);
    }
}
