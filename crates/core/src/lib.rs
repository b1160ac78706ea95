//! Domain types, collaborator ports and the pure attendance engine.
//!
//! This crate has no internal dependencies so it can be shared by the
//! scheduler, the record services and the storage/presence adapters.

pub mod attendance;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod lesson;
pub mod occupancy;
pub mod organization;
pub mod ports;
pub mod room;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
