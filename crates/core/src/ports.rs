//! Collaborator ports.
//!
//! The scheduler and record services only talk to the outside world through
//! these traits. `attend-db` implements every port except
//! [`PresenceProvider`], which `attend-presence` implements over HTTP.
//! A lookup that finds nothing returns `Ok(None)` rather than
//! [`CoreError::NotFound`](crate::error::CoreError::NotFound).

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::device::Device;
use crate::error::CoreResult;
use crate::lesson::ScheduledLesson;
use crate::occupancy::{NewOccupancy, OccupancyRecord};
use crate::organization::Organization;
use crate::room::RoomZone;
use crate::types::{DbId, EntityId, Timestamp};

#[async_trait]
pub trait Timetable: Send + Sync {
    /// Lessons whose monitoring window contains `now`.
    async fn live_lessons(&self, now: Timestamp) -> CoreResult<Vec<ScheduledLesson>>;

    /// The lesson running in `room_id` at `at` (start and end inclusive).
    async fn lesson_in_room_at(
        &self,
        room_id: EntityId,
        at: Timestamp,
    ) -> CoreResult<Option<ScheduledLesson>>;

    /// Lessons of the user's organization that take place on local `date`,
    /// ordered by start.
    async fn lessons_for_user_on(
        &self,
        user_id: EntityId,
        date: NaiveDate,
    ) -> CoreResult<Vec<ScheduledLesson>>;
}

#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn zone_for_room(&self, room_id: EntityId) -> CoreResult<Option<RoomZone>>;
}

#[async_trait]
pub trait PresenceProvider: Send + Sync {
    /// Device identifiers currently located in `zone_id`.
    ///
    /// An unknown zone yields an empty list; a transport failure is
    /// reported as `CoreError::Unavailable`.
    async fn zone_occupants(&self, zone_id: &str) -> CoreResult<Vec<String>>;
}

#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Look a device up by the identifier the presence provider reports.
    /// Implementations compare normalized identifiers
    /// (see [`normalize_device_id`](crate::device::normalize_device_id)).
    async fn resolve_device(&self, device_id: &str) -> CoreResult<Option<Device>>;

    /// Mark the device active and authenticated at `at`. Returns the
    /// updated device, or `None` when no device has this identifier.
    async fn activate(&self, device_id: &str, at: Timestamp) -> CoreResult<Option<Device>>;

    /// Mark every device of the organization inactive. Authentication
    /// timestamps are left untouched. Returns the number of rows changed.
    async fn deactivate_all_for_org(&self, org_id: EntityId) -> CoreResult<u64>;
}

#[async_trait]
pub trait Organizations: Send + Sync {
    async fn all(&self) -> CoreResult<Vec<Organization>>;
}

#[async_trait]
pub trait OccupancyStore: Send + Sync {
    async fn open(&self, new: NewOccupancy) -> CoreResult<OccupancyRecord>;

    /// Close a record: inactive, `closed_at` set.
    async fn close(&self, id: DbId, closed_at: Timestamp) -> CoreResult<()>;

    /// The open record of `user_id` for `lesson_id`, if any.
    async fn open_record_for(
        &self,
        user_id: EntityId,
        lesson_id: EntityId,
    ) -> CoreResult<Option<OccupancyRecord>>;

    /// The user's currently open record in any room.
    async fn active_for_user(&self, user_id: EntityId) -> CoreResult<Option<OccupancyRecord>>;

    async fn find_by_id(&self, id: DbId) -> CoreResult<Option<OccupancyRecord>>;

    async fn records_for_lesson(&self, lesson_id: EntityId) -> CoreResult<Vec<OccupancyRecord>>;

    /// All records of a user, oldest first.
    async fn records_for_user(&self, user_id: EntityId) -> CoreResult<Vec<OccupancyRecord>>;
}
