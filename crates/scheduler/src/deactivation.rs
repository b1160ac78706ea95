//! Daily device deactivation.
//!
//! At every local midnight all devices of every organization are marked
//! inactive, so a device only counts as presence evidence again once its
//! owner authenticates on the new day. Authentication timestamps are kept.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use attend_core::calendar::SchoolCalendar;
use attend_core::clock::Clock;
use attend_core::error::CoreResult;
use attend_core::ports::{DeviceDirectory, Organizations};
use attend_core::types::{EntityId, Timestamp};

/// Period between runs once the first midnight has been reached.
const RUN_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrgOutcome {
    Deactivated(u64),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgDeactivation {
    pub org_id: EntityId,
    pub name: String,
    pub outcome: OrgOutcome,
}

/// Result of one deactivation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeactivationReport {
    pub ran_at: Timestamp,
    pub organizations: Vec<OrgDeactivation>,
    pub total_deactivated: u64,
}

impl DeactivationReport {
    pub fn failures(&self) -> usize {
        self.organizations
            .iter()
            .filter(|o| matches!(o.outcome, OrgOutcome::Failed(_)))
            .count()
    }
}

pub struct DailyDeactivationScheduler {
    organizations: Arc<dyn Organizations>,
    devices: Arc<dyn DeviceDirectory>,
    clock: Arc<dyn Clock>,
    calendar: SchoolCalendar,
}

impl DailyDeactivationScheduler {
    pub fn new(
        organizations: Arc<dyn Organizations>,
        devices: Arc<dyn DeviceDirectory>,
        clock: Arc<dyn Clock>,
        calendar: SchoolCalendar,
    ) -> Self {
        Self {
            organizations,
            devices,
            clock,
            calendar,
        }
    }

    /// Time left until the next local midnight.
    pub fn until_next_midnight(&self) -> Duration {
        let now = self.clock.now();
        (self.calendar.next_midnight(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Wait for the next local midnight, run, then run every 24 hours until
    /// `cancel` fires. A run in progress is not interrupted.
    pub async fn run(&self, cancel: CancellationToken) {
        let wait = self.until_next_midnight();
        tracing::info!(wait_secs = wait.as_secs(), "Daily deactivation scheduled");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Daily deactivation cancelled");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }
        self.run_logged().await;

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + RUN_PERIOD, RUN_PERIOD);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Daily deactivation cancelled");
                    break;
                }
                _ = ticker.tick() => self.run_logged().await,
            }
        }
    }

    async fn run_logged(&self) {
        match self.run_once().await {
            Ok(report) => tracing::info!(
                organizations = report.organizations.len(),
                failures = report.failures(),
                total_deactivated = report.total_deactivated,
                "Daily deactivation complete"
            ),
            Err(e) => tracing::error!(error = %e, "Failed to list organizations for deactivation"),
        }
    }

    /// One pass over every organization. Also used for manual runs.
    ///
    /// Fails only if the organizations cannot be listed; a failure for one
    /// organization is recorded in the report and the pass continues.
    pub async fn run_once(&self) -> CoreResult<DeactivationReport> {
        let ran_at = self.clock.now();
        let organizations = self.organizations.all().await?;

        let mut report = DeactivationReport {
            ran_at,
            organizations: Vec::with_capacity(organizations.len()),
            total_deactivated: 0,
        };

        for org in organizations {
            let outcome = match self.devices.deactivate_all_for_org(org.id).await {
                Ok(count) => {
                    tracing::info!(org_id = %org.id, org_name = %org.name, count, "Devices deactivated");
                    report.total_deactivated += count;
                    OrgOutcome::Deactivated(count)
                }
                Err(e) => {
                    tracing::error!(org_id = %org.id, org_name = %org.name, error = %e, "Failed to deactivate devices");
                    OrgOutcome::Failed(e.to_string())
                }
            };
            report.organizations.push(OrgDeactivation {
                org_id: org.id,
                name: org.name,
                outcome,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use attend_core::device::Device;
    use attend_core::organization::Organization;
    use attend_core::ports::DeviceDirectory;
    use attend_core::testing::{FixedClock, InMemoryBackend, TokioClock};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn org(name: &str) -> Organization {
        Organization {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    fn device(user: EntityId, device_id: &str, authenticated: Timestamp) -> Device {
        Device {
            id: Uuid::new_v4(),
            user_id: user,
            device_id: device_id.into(),
            is_active: true,
            last_authenticated_at: Some(authenticated),
        }
    }

    fn scheduler(backend: &Arc<InMemoryBackend>, clock: Arc<dyn Clock>) -> DailyDeactivationScheduler {
        DailyDeactivationScheduler::new(
            backend.clone(),
            backend.clone(),
            clock,
            SchoolCalendar::default(),
        )
    }

    #[tokio::test]
    async fn deactivates_every_organization() {
        let now = Utc.with_ymd_and_hms(2025, 4, 14, 15, 0, 0).unwrap();
        let backend = Arc::new(InMemoryBackend::new(SchoolCalendar::default()));
        let a = org("A");
        let b = org("B");
        backend.add_organization(a.clone());
        backend.add_organization(b.clone());
        backend.add_device(a.id, device(Uuid::new_v4(), "A1", now));
        backend.add_device(a.id, device(Uuid::new_v4(), "A2", now));
        backend.add_device(b.id, device(Uuid::new_v4(), "B1", now));

        let report = scheduler(&backend, Arc::new(FixedClock::new(now)))
            .run_once()
            .await
            .unwrap();
        assert_eq!(report.total_deactivated, 3);
        assert_eq!(report.failures(), 0);
        for id in ["A1", "A2", "B1"] {
            let d = backend.device(id).unwrap();
            assert!(!d.is_active);
            assert_eq!(d.last_authenticated_at, Some(now));
        }
    }

    #[tokio::test]
    async fn failing_organization_does_not_stop_the_pass() {
        let now = Utc::now();
        let backend = Arc::new(InMemoryBackend::new(SchoolCalendar::default()));
        let broken = org("Broken");
        let fine = org("Fine");
        backend.add_organization(broken.clone());
        backend.add_organization(fine.clone());
        backend.fail_organization(broken.id);
        backend.add_device(fine.id, device(Uuid::new_v4(), "F1", now));

        let report = scheduler(&backend, Arc::new(FixedClock::new(now)))
            .run_once()
            .await
            .unwrap();
        assert_eq!(report.failures(), 1);
        assert_matches!(report.organizations[0].outcome, OrgOutcome::Failed(_));
        assert_eq!(report.organizations[1].outcome, OrgOutcome::Deactivated(1));
        assert!(!backend.device("F1").unwrap().is_active);
    }

    #[test]
    fn waits_until_local_midnight() {
        // 12:30 JST
        let now = Utc.with_ymd_and_hms(2025, 4, 14, 3, 30, 0).unwrap();
        let backend = Arc::new(InMemoryBackend::new(SchoolCalendar::default()));
        let s = scheduler(&backend, Arc::new(FixedClock::new(now)));
        assert_eq!(s.until_next_midnight(), Duration::from_secs((11 * 60 + 30) * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_at_midnight_then_daily() {
        // 23:00 JST
        let start = Utc.with_ymd_and_hms(2025, 4, 14, 14, 0, 0).unwrap();
        let backend = Arc::new(InMemoryBackend::new(SchoolCalendar::default()));
        let o = org("A");
        backend.add_organization(o.clone());
        backend.add_device(o.id, device(Uuid::new_v4(), "A1", start));

        let s = Arc::new(scheduler(&backend, Arc::new(TokioClock::starting_at(start))));
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let s = Arc::clone(&s);
            let cancel = cancel.clone();
            async move { s.run(cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(59 * 60)).await;
        assert!(backend.device("A1").unwrap().is_active);

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert!(!backend.device("A1").unwrap().is_active);

        // Re-activated during the day, deactivated again at the next midnight.
        backend.activate("A1", start + chrono::Duration::hours(12)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(22 * 60 * 60)).await;
        assert!(backend.device("A1").unwrap().is_active);
        tokio::time::sleep(Duration::from_secs(2 * 60 * 60)).await;
        assert!(!backend.device("A1").unwrap().is_active);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_midnight_skips_the_run() {
        let start = Utc.with_ymd_and_hms(2025, 4, 14, 14, 0, 0).unwrap();
        let backend = Arc::new(InMemoryBackend::new(SchoolCalendar::default()));
        let o = org("A");
        backend.add_organization(o.clone());
        backend.add_device(o.id, device(Uuid::new_v4(), "A1", start));

        let s = scheduler(&backend, Arc::new(TokioClock::starting_at(start)));
        let cancel = CancellationToken::new();
        cancel.cancel();
        s.run(cancel).await;
        assert!(backend.device("A1").unwrap().is_active);
    }
}
