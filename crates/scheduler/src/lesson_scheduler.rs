//! Lesson scheduler.
//!
//! [`LessonScheduler`] ticks on a fixed period, asks the timetable which
//! lessons are live and reconciles that set against the running monitors:
//! a monitor is started for each live lesson without one, and monitors of
//! lessons that are no longer live are signalled to stop and close their
//! records.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use attend_core::error::CoreResult;
use attend_core::lesson::ScheduledLesson;
use attend_core::ports::Timetable;
use attend_core::types::EntityId;

use crate::config::SchedulerConfig;
use crate::monitor::{LessonMonitor, MonitorContext};
use crate::registry::MonitorRegistry;

/// Result of one reconciliation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Lessons live at the tick.
    pub live: usize,
    pub started: Vec<EntityId>,
    pub stopped: Vec<EntityId>,
}

/// Supervisor that keeps one [`LessonMonitor`] running per live lesson.
///
/// Each tick reconciles the registry against the timetable: new live
/// lessons get a monitor, monitors of lessons that vanished are cancelled.
pub struct LessonScheduler {
    timetable: Arc<dyn Timetable>,
    ctx: MonitorContext,
    config: SchedulerConfig,
    registry: Arc<MonitorRegistry>,
    /// Every monitor task, including ones already retired from the registry.
    tracker: TaskTracker,
    /// Master token; monitors get child tokens.
    cancel: CancellationToken,
}

impl LessonScheduler {
    /// Create a stopped scheduler; call [`run`](Self::run) to start ticking.
    pub fn new(timetable: Arc<dyn Timetable>, ctx: MonitorContext, config: SchedulerConfig) -> Self {
        Self {
            timetable,
            ctx,
            config,
            registry: Arc::new(MonitorRegistry::new()),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<MonitorRegistry> {
        &self.registry
    }

    /// Number of monitor tasks still running, retired ones included.
    pub fn running_monitors(&self) -> usize {
        self.tracker.len()
    }

    /// Run the reconciliation loop until [`stop`](Self::stop) is called.
    ///
    /// The first tick happens immediately. A failed tick is logged and the
    /// next one retries.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.config.tick_interval.as_secs(),
            "Lesson scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("Lesson scheduler loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    match self.reconcile().await {
                        Ok(report) => {
                            if !report.started.is_empty() || !report.stopped.is_empty() {
                                tracing::info!(
                                    live = report.live,
                                    started = report.started.len(),
                                    stopped = report.stopped.len(),
                                    "Monitors reconciled"
                                );
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to load live lessons");
                        }
                    }
                }
            }
        }
    }

    /// One reconciliation pass against the lessons live now.
    pub async fn reconcile(&self) -> CoreResult<ReconcileReport> {
        let now = self.ctx.clock.now();
        let live = self.timetable.live_lessons(now).await?;
        let live_ids: HashSet<EntityId> = live.iter().map(ScheduledLesson::id).collect();

        let mut report = ReconcileReport {
            live: live_ids.len(),
            ..ReconcileReport::default()
        };

        for (lesson_id, handle) in self.registry.retain_live(&live_ids).await {
            tracing::info!(lesson_id = %lesson_id, "Lesson no longer live, stopping monitor");
            handle.cancel.cancel();
            report.stopped.push(lesson_id);
        }

        for lesson in live {
            if self.cancel.is_cancelled() {
                break;
            }
            let lesson_id = lesson.id();
            if self.spawn_monitor(lesson).await {
                report.started.push(lesson_id);
            }
        }

        Ok(report)
    }

    /// Start a monitor for `lesson` unless one is registered already.
    async fn spawn_monitor(&self, lesson: ScheduledLesson) -> bool {
        let lesson_id = lesson.id();
        let cancel = self.cancel.child_token();
        let Some(instance) = self
            .registry
            .try_register(lesson_id, cancel.clone(), self.ctx.clock.now())
            .await
        else {
            return false;
        };

        let monitor = LessonMonitor::new(lesson, self.ctx.clone(), self.config.monitor.clone());
        let registry = Arc::clone(&self.registry);
        self.tracker.spawn(async move {
            let report = monitor.run_registered(cancel, registry, instance).await;
            tracing::debug!(
                lesson_id = %report.lesson_id,
                polls = report.polls,
                recorded = report.recorded_users.len(),
                "Monitor task exited"
            );
        });
        true
    }

    /// Stop the loop, signal every monitor and wait until all monitor
    /// tasks have closed their records.
    pub async fn stop(&self) {
        tracing::info!("Stopping lesson scheduler");
        self.cancel.cancel();

        for (lesson_id, handle) in self.registry.drain().await {
            tracing::debug!(lesson_id = %lesson_id, "Signalling monitor");
            handle.cancel.cancel();
        }

        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Lesson scheduler stopped");
    }
}
