use attend_core::device::normalize_device_id;
use attend_core::types::{EntityId, Timestamp};
use sqlx::PgPool;

use crate::models::device::DeviceRow;

const COLUMNS: &str = "id, user_id, device_id, is_active, last_authenticated";

/// Access to the `devices` table.
pub struct DeviceRepo;

impl DeviceRepo {
    /// Find a device by the identifier the presence provider reports.
    ///
    /// Stored ids are colon-separated, so the key is normalized first.
    pub async fn find_by_device_id(
        pool: &PgPool,
        device_id: &str,
    ) -> Result<Option<DeviceRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM devices WHERE device_id = $1");
        sqlx::query_as::<_, DeviceRow>(&query)
            .bind(normalize_device_id(device_id))
            .fetch_optional(pool)
            .await
    }

    /// Mark a device active and set its authentication time.
    ///
    /// Returns the updated row, or `None` if no device has this id.
    pub async fn activate(
        pool: &PgPool,
        device_id: &str,
        at: Timestamp,
    ) -> Result<Option<DeviceRow>, sqlx::Error> {
        let query = format!(
            "UPDATE devices SET is_active = true, last_authenticated = $2, updated_at = now() \
             WHERE device_id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeviceRow>(&query)
            .bind(normalize_device_id(device_id))
            .bind(at)
            .fetch_optional(pool)
            .await
    }

    /// Deactivate every device owned by a member of `org_id`.
    ///
    /// `last_authenticated` is left as is. Returns the number of rows
    /// updated.
    pub async fn deactivate_all_for_org(pool: &PgPool, org_id: EntityId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE devices SET is_active = false, updated_at = now() \
             WHERE user_id IN (SELECT id FROM users WHERE org_id = $1)",
        )
        .bind(org_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
