//! Wall-clock source.
//!
//! Components read "now" through [`Clock`] instead of calling `Utc::now()`
//! directly so tests can drive lesson windows and midnight boundaries
//! deterministically.

use chrono::Utc;

use crate::types::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}
