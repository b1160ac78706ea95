//! Occupancy records live in the `stays` table.

use attend_core::error::CoreResult;
use attend_core::occupancy::OccupancyRecord;
use attend_core::types::{DbId, EntityId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `stays` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StayRow {
    pub id: DbId,
    pub user_id: EntityId,
    pub room_id: EntityId,
    pub subject_id: EntityId,
    pub lesson_id: Option<EntityId>,
    pub source: String,
    pub is_active: bool,
    pub description: Option<String>,
    pub created_at: Timestamp,
    pub leaved_at: Option<Timestamp>,
}

impl StayRow {
    /// Convert into the domain record. Fails on an unknown `source` value.
    pub fn into_record(self) -> CoreResult<OccupancyRecord> {
        Ok(OccupancyRecord {
            id: self.id,
            user_id: self.user_id,
            room_id: self.room_id,
            subject_id: self.subject_id,
            lesson_id: self.lesson_id,
            source: self.source.parse()?,
            is_active: self.is_active,
            description: self.description,
            opened_at: self.created_at,
            closed_at: self.leaved_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use attend_core::error::CoreError;
    use attend_core::occupancy::OccupancySource;
    use chrono::Utc;
    use uuid::Uuid;

    fn row(source: &str) -> StayRow {
        StayRow {
            id: 9,
            user_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
            lesson_id: None,
            source: source.into(),
            is_active: true,
            description: Some("front row".into()),
            created_at: Utc::now(),
            leaved_at: None,
        }
    }

    #[test]
    fn converts_manual_row() {
        let record = row("manual").into_record().unwrap();
        assert_eq!(record.source, OccupancySource::Manual);
        assert_eq!(record.id, 9);
        assert!(record.closed_at.is_none());
    }

    #[test]
    fn rejects_unknown_source() {
        assert_matches!(row("badge").into_record(), Err(CoreError::Validation(_)));
    }
}
