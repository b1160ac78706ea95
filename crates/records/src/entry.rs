//! Manual entry into a room and leaving it.
//!
//! A user holds at most one open record: entering closes whichever record
//! is still open before opening the new one.

use std::sync::Arc;

use serde::Deserialize;
use validator::Validate;

use attend_core::clock::Clock;
use attend_core::error::{CoreError, CoreResult};
use attend_core::lesson::ScheduledLesson;
use attend_core::occupancy::{NewOccupancy, OccupancyRecord, OccupancySource};
use attend_core::ports::{OccupancyStore, RoomDirectory, Timetable};
use attend_core::types::{DbId, EntityId};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ManualEntryRequest {
    pub user_id: EntityId,
    pub room_id: EntityId,
    /// Falls back to the subject of the lesson running in the room.
    pub subject_id: Option<EntityId>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// Result of a manual entry.
#[derive(Debug, Clone)]
pub struct ManualEntry {
    pub record: OccupancyRecord,
    /// The record that was still open and got closed by this entry.
    pub superseded: Option<OccupancyRecord>,
    /// The lesson the new record was linked to.
    pub lesson: Option<ScheduledLesson>,
}

pub struct ManualEntryService {
    timetable: Arc<dyn Timetable>,
    rooms: Arc<dyn RoomDirectory>,
    store: Arc<dyn OccupancyStore>,
    clock: Arc<dyn Clock>,
}

impl ManualEntryService {
    pub fn new(
        timetable: Arc<dyn Timetable>,
        rooms: Arc<dyn RoomDirectory>,
        store: Arc<dyn OccupancyStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            timetable,
            rooms,
            store,
            clock,
        }
    }

    /// Record that a user entered a room now.
    ///
    /// The new record is linked to the lesson running in the room, if any.
    pub async fn enter(&self, request: ManualEntryRequest) -> CoreResult<ManualEntry> {
        request
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        if self.rooms.zone_for_room(request.room_id).await?.is_none() {
            return Err(CoreError::not_found("room", request.room_id));
        }

        let now = self.clock.now();
        let lesson = self.timetable.lesson_in_room_at(request.room_id, now).await?;
        let subject_id = request
            .subject_id
            .or_else(|| lesson.as_ref().map(ScheduledLesson::subject_id))
            .ok_or_else(|| {
                CoreError::Validation("subject_id is required when no lesson is running".into())
            })?;

        let superseded = match self.store.active_for_user(request.user_id).await? {
            Some(mut open) => {
                self.store.close(open.id, now).await?;
                tracing::info!(
                    user_id = %request.user_id,
                    record_id = open.id,
                    "Closed previous record before manual entry"
                );
                open.is_active = false;
                open.closed_at = Some(now);
                Some(open)
            }
            None => None,
        };

        let record = self
            .store
            .open(NewOccupancy {
                user_id: request.user_id,
                room_id: request.room_id,
                subject_id,
                lesson_id: lesson.as_ref().map(ScheduledLesson::id),
                source: OccupancySource::Manual,
                description: request.description,
                opened_at: now,
            })
            .await?;

        tracing::info!(
            user_id = %record.user_id,
            record_id = record.id,
            lesson_id = ?record.lesson_id,
            "Manual entry recorded"
        );

        Ok(ManualEntry {
            record,
            superseded,
            lesson,
        })
    }

    /// Close `record_id` on behalf of `user_id`.
    pub async fn leave(&self, record_id: DbId, user_id: EntityId) -> CoreResult<OccupancyRecord> {
        let mut record = self
            .store
            .find_by_id(record_id)
            .await?
            .ok_or_else(|| CoreError::not_found("occupancy record", record_id))?;

        if record.user_id != user_id {
            return Err(CoreError::Forbidden(format!(
                "Record {record_id} belongs to another user"
            )));
        }
        if !record.is_active {
            return Err(CoreError::Conflict(format!("Record {record_id} is already closed")));
        }

        let now = self.clock.now();
        self.store.close(record.id, now).await?;
        record.is_active = false;
        record.closed_at = Some(now);

        tracing::info!(user_id = %user_id, record_id, "Left room");
        Ok(record)
    }
}
