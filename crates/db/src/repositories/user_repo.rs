use attend_core::types::EntityId;
use sqlx::PgPool;

/// Read access to the `users` table.
pub struct UserRepo;

impl UserRepo {
    /// The organization a user belongs to.
    pub async fn find_org_id(pool: &PgPool, user_id: EntityId) -> Result<Option<EntityId>, sqlx::Error> {
        let row: Option<(EntityId,)> = sqlx::query_as("SELECT org_id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(|(org_id,)| org_id))
    }
}
