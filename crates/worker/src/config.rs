use attend_core::calendar::SchoolCalendar;
use attend_core::config::{env_flag, env_or, env_required};
use attend_core::error::CoreResult;

/// Offset used for local days and midnight when none is configured.
pub const DEFAULT_UTC_OFFSET: &str = "+09:00";

/// Worker configuration loaded from environment variables.
///
/// | Env Var                      | Default  |
/// |------------------------------|----------|
/// | `DATABASE_URL`               | required |
/// | `TIMETABLE_UTC_OFFSET`       | `+09:00` |
/// | `DAILY_DEACTIVATION_ENABLED` | `true`   |
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub calendar: SchoolCalendar,
    pub deactivation_enabled: bool,
}

impl WorkerConfig {
    pub fn from_env() -> CoreResult<Self> {
        let offset: String = env_or("TIMETABLE_UTC_OFFSET", DEFAULT_UTC_OFFSET.to_string())?;
        Ok(Self {
            database_url: env_required("DATABASE_URL")?,
            calendar: SchoolCalendar::from_offset_str(&offset)?,
            deactivation_enabled: env_flag("DAILY_DEACTIVATION_ENABLED", true)?,
        })
    }
}

/// Log output format, from `LOG_FORMAT` (`text` or `json`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(raw) if raw.trim().eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}
