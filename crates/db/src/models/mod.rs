//! Row structs for the tables the attendance service reads and writes.
//!
//! Each row converts into the matching `attend-core` domain type.

pub mod device;
pub mod lesson;
pub mod occupancy;
pub mod organization;
pub mod room;
