use attend_core::calendar::SchoolCalendar;
use attend_core::types::EntityId;
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::models::lesson::LessonRow;

const COLUMNS: &str = "\
    id, subject_id, room_id, org_id, day_of_week, start_time, end_time, date, period";

/// Read access to the `lessons` table.
///
/// Queries only narrow the candidates down to the requested local dates;
/// exact window checks happen on the resolved [`ScheduledLesson`]s.
///
/// [`ScheduledLesson`]: attend_core::lesson::ScheduledLesson
pub struct LessonRepo;

/// Weekday indexes matching `dates`, for `day_of_week = ANY($n)`.
fn weekdays(dates: &[NaiveDate]) -> Vec<i16> {
    dates.iter().map(|d| SchoolCalendar::weekday_index(*d)).collect()
}

impl LessonRepo {
    /// Lessons that may occur on any of `dates`: dated lessons on one of
    /// those dates, weekly lessons on one of their weekdays.
    pub async fn list_on_dates(
        pool: &PgPool,
        dates: &[NaiveDate],
    ) -> Result<Vec<LessonRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM lessons \
             WHERE (date IS NULL AND day_of_week = ANY($1)) OR date = ANY($2) \
             ORDER BY start_time"
        );
        sqlx::query_as::<_, LessonRow>(&query)
            .bind(weekdays(dates))
            .bind(dates)
            .fetch_all(pool)
            .await
    }

    /// Like [`list_on_dates`](Self::list_on_dates), restricted to one room.
    pub async fn list_for_room_on_dates(
        pool: &PgPool,
        room_id: EntityId,
        dates: &[NaiveDate],
    ) -> Result<Vec<LessonRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM lessons \
             WHERE room_id = $1 \
               AND ((date IS NULL AND day_of_week = ANY($2)) OR date = ANY($3)) \
             ORDER BY start_time"
        );
        sqlx::query_as::<_, LessonRow>(&query)
            .bind(room_id)
            .bind(weekdays(dates))
            .bind(dates)
            .fetch_all(pool)
            .await
    }

    /// Lessons of an organization occurring on `date`.
    pub async fn list_for_org_on_date(
        pool: &PgPool,
        org_id: EntityId,
        date: NaiveDate,
    ) -> Result<Vec<LessonRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM lessons \
             WHERE org_id = $1 \
               AND ((date IS NULL AND day_of_week = $2) OR date = $3) \
             ORDER BY start_time"
        );
        sqlx::query_as::<_, LessonRow>(&query)
            .bind(org_id)
            .bind(SchoolCalendar::weekday_index(date))
            .bind(date)
            .fetch_all(pool)
            .await
    }
}
