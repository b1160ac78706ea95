use serde::{Deserialize, Serialize};

use crate::types::EntityId;

/// The slice of a room the monitor needs: which provider zone covers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomZone {
    pub room_id: EntityId,
    /// Organization-scoped room code, for logs.
    pub org_room_id: String,
    /// `None` when the room is not instrumented.
    pub zone_id: Option<String>,
}
