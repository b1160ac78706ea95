use attend_core::room::RoomZone;
use attend_core::types::EntityId;
use serde::Serialize;
use sqlx::FromRow;

/// The zone-related columns of a `rooms` row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RoomRow {
    pub id: EntityId,
    pub org_id: EntityId,
    pub org_room_id: String,
    pub mist_zone_id: Option<String>,
}

impl From<RoomRow> for RoomZone {
    fn from(row: RoomRow) -> Self {
        RoomZone {
            room_id: row.id,
            org_room_id: row.org_room_id,
            // An empty string is how an uninstrumented room is often stored.
            zone_id: row.mist_zone_id.filter(|z| !z.trim().is_empty()),
        }
    }
}
