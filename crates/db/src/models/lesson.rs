use attend_core::lesson::Lesson;
use attend_core::types::EntityId;
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `lessons` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LessonRow {
    pub id: EntityId,
    pub subject_id: EntityId,
    pub room_id: EntityId,
    pub org_id: EntityId,
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub date: Option<NaiveDate>,
    pub period: Option<i16>,
}

impl From<LessonRow> for Lesson {
    fn from(row: LessonRow) -> Self {
        Lesson {
            id: row.id,
            subject_id: row.subject_id,
            room_id: row.room_id,
            org_id: row.org_id,
            day_of_week: row.day_of_week,
            start_time: row.start_time,
            end_time: row.end_time,
            date: row.date,
            period: row.period,
        }
    }
}
