//! [`PgStore`]: every collaborator port except presence, over a `PgPool`.

use async_trait::async_trait;
use chrono::NaiveDate;

use attend_core::calendar::SchoolCalendar;
use attend_core::device::Device;
use attend_core::error::{CoreError, CoreResult};
use attend_core::lesson::{live_occurrences, Lesson, ScheduledLesson};
use attend_core::occupancy::{NewOccupancy, OccupancyRecord};
use attend_core::organization::Organization;
use attend_core::ports::{DeviceDirectory, OccupancyStore, Organizations, RoomDirectory, Timetable};
use attend_core::room::RoomZone;
use attend_core::types::{DbId, EntityId, Timestamp};

use crate::models::occupancy::StayRow;
use crate::repositories::{DeviceRepo, LessonRepo, OrganizationRepo, RoomRepo, StayRepo, UserRepo};
use crate::DbPool;

/// Map a sqlx failure onto the core error taxonomy.
///
/// Connectivity problems are transient (`Unavailable`); anything else is an
/// `Internal` error.
pub fn map_db_error(err: sqlx::Error) -> CoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            CoreError::Unavailable(format!("database: {err}"))
        }
        other => CoreError::Internal(format!("database: {other}")),
    }
}

fn into_records(rows: Vec<StayRow>) -> CoreResult<Vec<OccupancyRecord>> {
    rows.into_iter().map(StayRow::into_record).collect()
}

/// PostgreSQL implementation of every port except presence.
///
/// Lesson instants are computed with `calendar` from the stored
/// time-of-day columns.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    calendar: SchoolCalendar,
}

impl PgStore {
    /// Wrap a pool; `calendar` turns stored times into instants.
    pub fn new(pool: DbPool, calendar: SchoolCalendar) -> Self {
        Self { pool, calendar }
    }

    /// Yesterday and today in local time: a lesson from yesterday may still
    /// be inside its window shortly after midnight.
    fn candidate_dates(&self, at: Timestamp) -> Vec<NaiveDate> {
        let today = self.calendar.local_date(at);
        [today.pred_opt(), Some(today)].into_iter().flatten().collect()
    }
}

#[async_trait]
impl Timetable for PgStore {
    async fn live_lessons(&self, now: Timestamp) -> CoreResult<Vec<ScheduledLesson>> {
        let rows = LessonRepo::list_on_dates(&self.pool, &self.candidate_dates(now))
            .await
            .map_err(map_db_error)?;
        let lessons: Vec<Lesson> = rows.into_iter().map(Lesson::from).collect();
        Ok(live_occurrences(&lessons, now, &self.calendar))
    }

    async fn lesson_in_room_at(
        &self,
        room_id: EntityId,
        at: Timestamp,
    ) -> CoreResult<Option<ScheduledLesson>> {
        let dates = self.candidate_dates(at);
        let rows = LessonRepo::list_for_room_on_dates(&self.pool, room_id, &dates)
            .await
            .map_err(map_db_error)?;

        let lessons: Vec<Lesson> = rows.into_iter().map(Lesson::from).collect();
        Ok(dates
            .iter()
            .flat_map(|date| lessons.iter().filter_map(|l| l.schedule_on(*date, &self.calendar)))
            .filter(|l| l.is_running_at(at))
            .min_by_key(|l| l.starts_at))
    }

    async fn lessons_for_user_on(
        &self,
        user_id: EntityId,
        date: NaiveDate,
    ) -> CoreResult<Vec<ScheduledLesson>> {
        let org_id = UserRepo::find_org_id(&self.pool, user_id)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| CoreError::not_found("user", user_id))?;

        let rows = LessonRepo::list_for_org_on_date(&self.pool, org_id, date)
            .await
            .map_err(map_db_error)?;
        let mut scheduled: Vec<ScheduledLesson> = rows
            .into_iter()
            .map(Lesson::from)
            .filter_map(|l| l.schedule_on(date, &self.calendar))
            .collect();
        scheduled.sort_by_key(|l| l.starts_at);
        Ok(scheduled)
    }
}

#[async_trait]
impl RoomDirectory for PgStore {
    async fn zone_for_room(&self, room_id: EntityId) -> CoreResult<Option<RoomZone>> {
        let row = RoomRepo::find_by_id(&self.pool, room_id)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(RoomZone::from))
    }
}

#[async_trait]
impl DeviceDirectory for PgStore {
    async fn resolve_device(&self, device_id: &str) -> CoreResult<Option<Device>> {
        let row = DeviceRepo::find_by_device_id(&self.pool, device_id)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Device::from))
    }

    async fn activate(&self, device_id: &str, at: Timestamp) -> CoreResult<Option<Device>> {
        let row = DeviceRepo::activate(&self.pool, device_id, at)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Device::from))
    }

    async fn deactivate_all_for_org(&self, org_id: EntityId) -> CoreResult<u64> {
        let count = DeviceRepo::deactivate_all_for_org(&self.pool, org_id)
            .await
            .map_err(map_db_error)?;
        tracing::debug!(org_id = %org_id, count, "Devices deactivated");
        Ok(count)
    }
}

#[async_trait]
impl Organizations for PgStore {
    async fn all(&self) -> CoreResult<Vec<Organization>> {
        let rows = OrganizationRepo::list(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Organization::from).collect())
    }
}

#[async_trait]
impl OccupancyStore for PgStore {
    async fn open(&self, new: NewOccupancy) -> CoreResult<OccupancyRecord> {
        StayRepo::create(&self.pool, &new)
            .await
            .map_err(map_db_error)?
            .into_record()
    }

    async fn close(&self, id: DbId, closed_at: Timestamp) -> CoreResult<()> {
        let updated = StayRepo::close(&self.pool, id, closed_at)
            .await
            .map_err(map_db_error)?;
        if !updated {
            return Err(CoreError::not_found("occupancy record", id));
        }
        Ok(())
    }

    async fn open_record_for(
        &self,
        user_id: EntityId,
        lesson_id: EntityId,
    ) -> CoreResult<Option<OccupancyRecord>> {
        StayRepo::find_active_by_user_and_lesson(&self.pool, user_id, lesson_id)
            .await
            .map_err(map_db_error)?
            .map(StayRow::into_record)
            .transpose()
    }

    async fn active_for_user(&self, user_id: EntityId) -> CoreResult<Option<OccupancyRecord>> {
        StayRepo::find_active_by_user(&self.pool, user_id)
            .await
            .map_err(map_db_error)?
            .map(StayRow::into_record)
            .transpose()
    }

    async fn find_by_id(&self, id: DbId) -> CoreResult<Option<OccupancyRecord>> {
        StayRepo::find_by_id(&self.pool, id)
            .await
            .map_err(map_db_error)?
            .map(StayRow::into_record)
            .transpose()
    }

    async fn records_for_lesson(&self, lesson_id: EntityId) -> CoreResult<Vec<OccupancyRecord>> {
        let rows = StayRepo::list_by_lesson(&self.pool, lesson_id)
            .await
            .map_err(map_db_error)?;
        into_records(rows)
    }

    async fn records_for_user(&self, user_id: EntityId) -> CoreResult<Vec<OccupancyRecord>> {
        let rows = StayRepo::list_by_user(&self.pool, user_id)
            .await
            .map_err(map_db_error)?;
        into_records(rows)
    }
}
