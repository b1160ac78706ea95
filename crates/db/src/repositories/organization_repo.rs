use sqlx::PgPool;

use crate::models::organization::OrganizationRow;

/// Read access to the `organizations` table.
pub struct OrganizationRepo;

impl OrganizationRepo {
    /// Every organization, ordered by name.
    pub async fn list(pool: &PgPool) -> Result<Vec<OrganizationRow>, sqlx::Error> {
        sqlx::query_as::<_, OrganizationRow>("SELECT id, name FROM organizations ORDER BY name")
            .fetch_all(pool)
            .await
    }
}
