use attend_core::organization::Organization;
use attend_core::types::EntityId;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `organizations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrganizationRow {
    pub id: EntityId,
    pub name: String,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            id: row.id,
            name: row.name,
        }
    }
}
