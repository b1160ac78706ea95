use attend_core::occupancy::NewOccupancy;
use attend_core::types::{DbId, EntityId, Timestamp};
use sqlx::PgPool;

use crate::models::occupancy::StayRow;

const COLUMNS: &str = "\
    id, user_id, room_id, subject_id, lesson_id, source, is_active, \
    description, created_at, leaved_at";

/// CRUD for the `stays` table (occupancy records).
pub struct StayRepo;

impl StayRepo {
    /// Insert an open stay.
    pub async fn create(pool: &PgPool, input: &NewOccupancy) -> Result<StayRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO stays \
                (user_id, room_id, subject_id, lesson_id, source, is_active, description, created_at) \
             VALUES ($1, $2, $3, $4, $5, true, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StayRow>(&query)
            .bind(input.user_id)
            .bind(input.room_id)
            .bind(input.subject_id)
            .bind(input.lesson_id)
            .bind(input.source.as_str())
            .bind(&input.description)
            .bind(input.opened_at)
            .fetch_one(pool)
            .await
    }

    /// Mark a stay inactive and stamp its leave time. Returns whether a row
    /// was updated.
    pub async fn close(pool: &PgPool, id: DbId, closed_at: Timestamp) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE stays SET is_active = false, leaved_at = $2 WHERE id = $1")
            .bind(id)
            .bind(closed_at)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a stay by id, open or closed.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<StayRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stays WHERE id = $1");
        sqlx::query_as::<_, StayRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The user's open stay for a lesson.
    pub async fn find_active_by_user_and_lesson(
        pool: &PgPool,
        user_id: EntityId,
        lesson_id: EntityId,
    ) -> Result<Option<StayRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM stays \
             WHERE user_id = $1 AND lesson_id = $2 AND is_active = true \
             ORDER BY created_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, StayRow>(&query)
            .bind(user_id)
            .bind(lesson_id)
            .fetch_optional(pool)
            .await
    }

    /// The user's open stay in any room.
    pub async fn find_active_by_user(
        pool: &PgPool,
        user_id: EntityId,
    ) -> Result<Option<StayRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM stays \
             WHERE user_id = $1 AND is_active = true \
             ORDER BY created_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, StayRow>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Every stay linked to a lesson.
    pub async fn list_by_lesson(pool: &PgPool, lesson_id: EntityId) -> Result<Vec<StayRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stays WHERE lesson_id = $1 ORDER BY created_at");
        sqlx::query_as::<_, StayRow>(&query)
            .bind(lesson_id)
            .fetch_all(pool)
            .await
    }

    /// Every stay of a user, oldest first.
    pub async fn list_by_user(pool: &PgPool, user_id: EntityId) -> Result<Vec<StayRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stays WHERE user_id = $1 ORDER BY created_at");
        sqlx::query_as::<_, StayRow>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }
}
