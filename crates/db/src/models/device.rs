use attend_core::device::Device;
use attend_core::types::{EntityId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `devices` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DeviceRow {
    pub id: EntityId,
    pub user_id: EntityId,
    pub device_id: String,
    pub is_active: bool,
    pub last_authenticated: Option<Timestamp>,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Device {
            id: row.id,
            user_id: row.user_id,
            device_id: row.device_id,
            is_active: row.is_active,
            last_authenticated_at: row.last_authenticated,
        }
    }
}
