//! Background services: the lesson scheduler with its per-lesson monitors,
//! and the daily device deactivation run.

pub mod config;
pub mod deactivation;
pub mod lesson_scheduler;
pub mod monitor;
pub mod registry;

pub use config::SchedulerConfig;
pub use deactivation::{DailyDeactivationScheduler, DeactivationReport};
pub use lesson_scheduler::{LessonScheduler, ReconcileReport};
pub use monitor::{LessonMonitor, MonitorConfig, MonitorContext, MonitorReport, PollOutcome};
pub use registry::MonitorRegistry;
