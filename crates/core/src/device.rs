//! Registered presence credentials.

use serde::{Deserialize, Serialize};

use crate::calendar::SchoolCalendar;
use crate::types::{EntityId, Timestamp};

/// A device registered to a user, as seen by the device directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: EntityId,
    pub user_id: EntityId,
    /// Identifier reported by the presence provider (MAC-like).
    pub device_id: String,
    pub is_active: bool,
    pub last_authenticated_at: Option<Timestamp>,
}

/// Canonical form of a device identifier: hyphen-separated MACs are
/// rewritten with colons so `AA-BB-CC` and `AA:BB:CC` name the same device.
pub fn normalize_device_id(raw: &str) -> String {
    raw.trim().replace('-', ":")
}

impl Device {
    /// A device counts as presence evidence only when it is active and was
    /// authenticated on the current local calendar day.
    pub fn is_eligible_at(&self, now: Timestamp, calendar: &SchoolCalendar) -> bool {
        if !self.is_active {
            return false;
        }
        match self.last_authenticated_at {
            Some(at) => calendar.same_day(at, now),
            None => false,
        }
    }
}
