//! Occupancy records ("stays"): one continuous presence interval of a user
//! in a room, optionally tied to a lesson.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, EntityId, Timestamp};

/// Who opened the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancySource {
    /// Opened by a lesson monitor from presence telemetry.
    Auto,
    /// Opened by an explicit manual entry.
    Manual,
}

impl OccupancySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancySource::Auto => "auto",
            OccupancySource::Manual => "manual",
        }
    }
}

impl fmt::Display for OccupancySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OccupancySource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(OccupancySource::Auto),
            "manual" => Ok(OccupancySource::Manual),
            other => Err(CoreError::Validation(format!(
                "Unknown occupancy source '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyRecord {
    pub id: DbId,
    pub user_id: EntityId,
    pub room_id: EntityId,
    pub subject_id: EntityId,
    pub lesson_id: Option<EntityId>,
    pub source: OccupancySource,
    pub is_active: bool,
    pub description: Option<String>,
    pub opened_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

/// Insert DTO for a new, open occupancy record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOccupancy {
    pub user_id: EntityId,
    pub room_id: EntityId,
    pub subject_id: EntityId,
    pub lesson_id: Option<EntityId>,
    pub source: OccupancySource,
    pub description: Option<String>,
    pub opened_at: Timestamp,
}
