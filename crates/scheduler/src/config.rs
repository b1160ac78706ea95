use std::time::Duration;

use attend_core::attendance::{AttendanceConfig, DEFAULT_LATE_THRESHOLD_MINUTES};
use attend_core::config::env_or;
use attend_core::error::{CoreError, CoreResult};

use crate::monitor::MonitorConfig;

/// Default reconciliation period of the lesson scheduler.
pub const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 60;

/// Default poll period of a lesson monitor.
pub const DEFAULT_MONITOR_POLL_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often live lessons are reconciled against running monitors.
    pub tick_interval: Duration,
    pub monitor: MonitorConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(DEFAULT_SCHEDULER_INTERVAL_SECS),
            monitor: MonitorConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Load from environment variables.
    ///
    /// | Env var                      | Default |
    /// |------------------------------|---------|
    /// | `SCHEDULER_INTERVAL_SECS`    | `60`    |
    /// | `MONITOR_POLL_INTERVAL_SECS` | `60`    |
    /// | `LATE_THRESHOLD_MINUTES`     | `10`    |
    pub fn from_env() -> CoreResult<Self> {
        let tick = positive_secs(
            "SCHEDULER_INTERVAL_SECS",
            env_or("SCHEDULER_INTERVAL_SECS", DEFAULT_SCHEDULER_INTERVAL_SECS)?,
        )?;
        let poll = positive_secs(
            "MONITOR_POLL_INTERVAL_SECS",
            env_or("MONITOR_POLL_INTERVAL_SECS", DEFAULT_MONITOR_POLL_INTERVAL_SECS)?,
        )?;
        let late_threshold: i64 = env_or("LATE_THRESHOLD_MINUTES", DEFAULT_LATE_THRESHOLD_MINUTES)?;
        if late_threshold < 0 {
            return Err(CoreError::Validation(
                "LATE_THRESHOLD_MINUTES must not be negative".into(),
            ));
        }

        Ok(Self {
            tick_interval: tick,
            monitor: MonitorConfig {
                poll_interval: poll,
                attendance: AttendanceConfig {
                    late_threshold_minutes: late_threshold,
                    ..AttendanceConfig::default()
                },
            },
        })
    }
}

/// Intervals feed `tokio::time::interval`, which rejects a zero period.
fn positive_secs(key: &str, secs: u64) -> CoreResult<Duration> {
    if secs == 0 {
        return Err(CoreError::Validation(format!("{key} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}
