/// Occupancy records use a PostgreSQL BIGSERIAL primary key.
pub type DbId = i64;

/// Lessons, rooms, users, subjects and organizations are keyed by UUID.
pub type EntityId = uuid::Uuid;

/// All persisted timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
