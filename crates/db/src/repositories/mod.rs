//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod device_repo;
pub mod lesson_repo;
pub mod organization_repo;
pub mod room_repo;
pub mod stay_repo;
pub mod user_repo;

pub use device_repo::DeviceRepo;
pub use lesson_repo::LessonRepo;
pub use organization_repo::OrganizationRepo;
pub use room_repo::RoomRepo;
pub use stay_repo::StayRepo;
pub use user_repo::UserRepo;
