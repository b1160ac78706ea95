use attend_core::types::EntityId;
use sqlx::PgPool;

use crate::models::room::RoomRow;

const COLUMNS: &str = "id, org_id, org_room_id, mist_zone_id";

/// Read access to the `rooms` table.
pub struct RoomRepo;

impl RoomRepo {
    /// Find a room with its presence zone mapping.
    pub async fn find_by_id(pool: &PgPool, id: EntityId) -> Result<Option<RoomRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM rooms WHERE id = $1");
        sqlx::query_as::<_, RoomRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
