//! Presence provider adapter for the Mist zone-statistics API.

pub mod api;
pub mod config;

pub use api::{MistPresenceClient, PresenceError};
pub use config::PresenceConfig;
