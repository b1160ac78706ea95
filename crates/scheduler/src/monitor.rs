//! Per-lesson presence monitor.
//!
//! A [`LessonMonitor`] watches the room of one scheduled lesson for the
//! duration of its monitoring window. Each poll asks the presence provider
//! which devices are in the room's zone, resolves them to users and opens
//! one `auto` occupancy record per eligible user. When the window ends, or
//! the monitor is cancelled, every record it opened is closed.
//!
//! Phases: `Pending` (before the window) -> `Active` -> `Closing` ->
//! `Terminated`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use attend_core::attendance::{self, AttendanceConfig};
use attend_core::calendar::SchoolCalendar;
use attend_core::clock::Clock;
use attend_core::error::CoreError;
use attend_core::lesson::ScheduledLesson;
use attend_core::occupancy::{NewOccupancy, OccupancySource};
use attend_core::ports::{DeviceDirectory, OccupancyStore, PresenceProvider, RoomDirectory};
use attend_core::types::{EntityId, Timestamp};

use crate::config::DEFAULT_MONITOR_POLL_INTERVAL_SECS;
use crate::registry::MonitorRegistry;

// ---------------------------------------------------------------------------
// Configuration and collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Only used to classify lateness in logs.
    pub attendance: AttendanceConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_MONITOR_POLL_INTERVAL_SECS),
            attendance: AttendanceConfig::default(),
        }
    }
}

/// The ports a monitor talks to. Cheap to clone.
#[derive(Clone)]
pub struct MonitorContext {
    pub rooms: Arc<dyn RoomDirectory>,
    pub presence: Arc<dyn PresenceProvider>,
    pub devices: Arc<dyn DeviceDirectory>,
    pub store: Arc<dyn OccupancyStore>,
    pub clock: Arc<dyn Clock>,
    pub calendar: SchoolCalendar,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Pending,
    Active,
    Closing,
    Terminated,
}

/// Why a poll was skipped.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Room {0} not found")]
    RoomNotFound(EntityId),

    #[error("Room {org_room_id} has no presence zone configured")]
    ZoneNotConfigured { room_id: EntityId, org_room_id: String },

    #[error("Room lookup failed: {0}")]
    RoomLookup(CoreError),

    #[error("Presence query failed: {0}")]
    Presence(CoreError),
}

/// What a successful poll saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Device ids reported in the zone.
    pub detected: usize,
    /// Users for whom a record was opened by this poll.
    pub recorded: Vec<EntityId>,
    pub already_recorded: usize,
    pub unregistered: usize,
    pub ineligible: usize,
    /// Device lookups or record inserts that failed; retried next poll.
    pub failed: usize,
}

#[derive(Debug)]
pub enum PollOutcome {
    /// Before the monitoring window.
    Waiting,
    /// At or past the end of the monitoring window.
    Expired,
    /// The poll could not run; nothing was recorded.
    Skipped(MonitorError),
    Polled(PollSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    WindowEnded,
    Cancelled,
}

/// Final account of a monitor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    pub lesson_id: EntityId,
    pub polls: usize,
    pub recorded_users: Vec<EntityId>,
    pub closed: usize,
    pub close_failures: usize,
    pub stop_reason: StopReason,
}

// ---------------------------------------------------------------------------
// LessonMonitor
// ---------------------------------------------------------------------------

pub struct LessonMonitor {
    lesson: ScheduledLesson,
    ctx: MonitorContext,
    config: MonitorConfig,
    phase: MonitorPhase,
    /// Users with a record opened by this monitor, in recording order.
    recorded: Vec<EntityId>,
    recorded_set: HashSet<EntityId>,
}

impl LessonMonitor {
    /// Create a monitor in the `Pending` phase. Nothing runs until
    /// [`run`](Self::run) or [`poll`](Self::poll) is called.
    pub fn new(lesson: ScheduledLesson, ctx: MonitorContext, config: MonitorConfig) -> Self {
        Self {
            lesson,
            ctx,
            config,
            phase: MonitorPhase::Pending,
            recorded: Vec::new(),
            recorded_set: HashSet::new(),
        }
    }

    /// The lesson this monitor watches.
    pub fn lesson(&self) -> &ScheduledLesson {
        &self.lesson
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    /// Users recorded so far, in recording order.
    pub fn recorded_users(&self) -> &[EntityId] {
        &self.recorded
    }

    /// Run until the monitoring window ends or `cancel` fires, then close
    /// every record this monitor opened.
    ///
    /// The first poll happens immediately. A poll in flight is finished
    /// before cancellation is observed.
    pub async fn run(mut self, cancel: CancellationToken) -> MonitorReport {
        let lesson_id = self.lesson.id();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls = 0;

        tracing::info!(
            lesson_id = %lesson_id,
            room_id = %self.lesson.room_id(),
            starts_at = %self.lesson.starts_at,
            ends_at = %self.lesson.ends_at,
            "Lesson monitor started"
        );

        let stop_reason = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                _ = ticker.tick() => {
                    match self.poll().await {
                        PollOutcome::Expired => break StopReason::WindowEnded,
                        PollOutcome::Waiting => {}
                        PollOutcome::Skipped(e) => {
                            polls += 1;
                            tracing::warn!(lesson_id = %lesson_id, error = %e, "Poll skipped");
                        }
                        PollOutcome::Polled(summary) => {
                            polls += 1;
                            tracing::debug!(
                                lesson_id = %lesson_id,
                                detected = summary.detected,
                                recorded = summary.recorded.len(),
                                "Poll complete"
                            );
                        }
                    }
                }
            }
        };

        let (closed, close_failures) = self.close_all().await;
        self.phase = MonitorPhase::Terminated;

        tracing::info!(
            lesson_id = %lesson_id,
            reason = ?stop_reason,
            recorded = self.recorded.len(),
            closed,
            close_failures,
            "Lesson monitor terminated"
        );

        MonitorReport {
            lesson_id,
            polls,
            recorded_users: self.recorded,
            closed,
            close_failures,
            stop_reason,
        }
    }

    /// [`run`](Self::run), then remove this monitor's own registry entry.
    pub async fn run_registered(
        self,
        cancel: CancellationToken,
        registry: Arc<MonitorRegistry>,
        instance: u64,
    ) -> MonitorReport {
        let lesson_id = self.lesson.id();
        let report = self.run(cancel).await;
        registry.remove_instance(lesson_id, instance).await;
        report
    }

    /// One detection pass at the current time.
    pub async fn poll(&mut self) -> PollOutcome {
        let now = self.ctx.clock.now();
        let window = self.lesson.monitoring_window();
        if now < window.start {
            return PollOutcome::Waiting;
        }
        if now >= window.end {
            return PollOutcome::Expired;
        }
        self.phase = MonitorPhase::Active;

        let room_id = self.lesson.room_id();
        let zone_id = match self.ctx.rooms.zone_for_room(room_id).await {
            Ok(Some(room)) => match room.zone_id {
                Some(zone_id) => zone_id,
                None => {
                    return PollOutcome::Skipped(MonitorError::ZoneNotConfigured {
                        room_id,
                        org_room_id: room.org_room_id,
                    })
                }
            },
            Ok(None) => return PollOutcome::Skipped(MonitorError::RoomNotFound(room_id)),
            Err(e) => return PollOutcome::Skipped(MonitorError::RoomLookup(e)),
        };

        let device_ids = match self.ctx.presence.zone_occupants(&zone_id).await {
            Ok(ids) => ids,
            Err(e) => return PollOutcome::Skipped(MonitorError::Presence(e)),
        };

        let mut summary = PollSummary {
            detected: device_ids.len(),
            ..PollSummary::default()
        };
        for device_id in &device_ids {
            self.handle_device(device_id, now, &mut summary).await;
        }
        PollOutcome::Polled(summary)
    }

    async fn handle_device(&mut self, device_id: &str, now: Timestamp, summary: &mut PollSummary) {
        let lesson_id = self.lesson.id();
        let device = match self.ctx.devices.resolve_device(device_id).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                summary.unregistered += 1;
                return;
            }
            Err(e) => {
                tracing::warn!(lesson_id = %lesson_id, device_id, error = %e, "Device lookup failed");
                summary.failed += 1;
                return;
            }
        };

        let user_id = device.user_id;
        if self.recorded_set.contains(&user_id) {
            summary.already_recorded += 1;
            return;
        }
        if !device.is_eligible_at(now, &self.ctx.calendar) {
            tracing::debug!(
                lesson_id = %lesson_id,
                user_id = %user_id,
                device_id,
                "Device not authenticated today, skipping"
            );
            summary.ineligible += 1;
            return;
        }

        // A user holds at most one open record.
        match self.ctx.store.active_for_user(user_id).await {
            Ok(Some(open)) => {
                if let Err(e) = self.ctx.store.close(open.id, now).await {
                    tracing::error!(
                        lesson_id = %lesson_id,
                        user_id = %user_id,
                        record_id = open.id,
                        error = %e,
                        "Failed to close previous record"
                    );
                    summary.failed += 1;
                    return;
                }
                tracing::debug!(
                    lesson_id = %lesson_id,
                    user_id = %user_id,
                    record_id = open.id,
                    "Closed previous record"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(lesson_id = %lesson_id, user_id = %user_id, error = %e, "Open record lookup failed");
                summary.failed += 1;
                return;
            }
        }

        let new = NewOccupancy {
            user_id,
            room_id: self.lesson.room_id(),
            subject_id: self.lesson.subject_id(),
            lesson_id: Some(lesson_id),
            source: OccupancySource::Auto,
            description: None,
            opened_at: now,
        };
        match self.ctx.store.open(new).await {
            Ok(record) => {
                self.recorded_set.insert(user_id);
                self.recorded.push(user_id);
                summary.recorded.push(user_id);

                let late = attendance::late_minutes(now, self.lesson.starts_at);
                tracing::info!(
                    lesson_id = %lesson_id,
                    user_id = %user_id,
                    record_id = record.id,
                    late_minutes = late,
                    status = attendance::classify(late, &self.config.attendance).as_str(),
                    "Attendance recorded"
                );
            }
            Err(e) => {
                tracing::error!(
                    lesson_id = %lesson_id,
                    user_id = %user_id,
                    error = %e,
                    "Failed to open occupancy record"
                );
                summary.failed += 1;
            }
        }
    }

    /// Close the open record of every recorded user. Returns
    /// `(closed, failures)`.
    async fn close_all(&mut self) -> (usize, usize) {
        self.phase = MonitorPhase::Closing;
        let lesson_id = self.lesson.id();
        let now = self.ctx.clock.now();
        let mut closed = 0;
        let mut failures = 0;

        for user_id in &self.recorded {
            let record = match self.ctx.store.open_record_for(*user_id, lesson_id).await {
                Ok(Some(record)) => record,
                // Already closed elsewhere (e.g. a manual leave).
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(lesson_id = %lesson_id, user_id = %user_id, error = %e, "Failed to look up open record");
                    failures += 1;
                    continue;
                }
            };
            match self.ctx.store.close(record.id, now).await {
                Ok(()) => closed += 1,
                Err(e) => {
                    tracing::error!(
                        lesson_id = %lesson_id,
                        user_id = %user_id,
                        record_id = record.id,
                        error = %e,
                        "Failed to close occupancy record"
                    );
                    failures += 1;
                }
            }
        }
        (closed, failures)
    }
}
