//! Device authentication.
//!
//! Devices are deactivated every night; authenticating one marks it active
//! for the current day so the lesson monitors accept it as presence
//! evidence again.

use std::sync::Arc;

use attend_core::clock::Clock;
use attend_core::device::Device;
use attend_core::error::{CoreError, CoreResult};
use attend_core::ports::DeviceDirectory;

pub struct DeviceAuthService {
    devices: Arc<dyn DeviceDirectory>,
    clock: Arc<dyn Clock>,
}

impl DeviceAuthService {
    pub fn new(devices: Arc<dyn DeviceDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self { devices, clock }
    }

    /// Activate `device_id` and stamp its authentication time with now.
    ///
    /// The id may be given in hyphenated or colon-separated form.
    pub async fn authenticate(&self, device_id: &str) -> CoreResult<Device> {
        let now = self.clock.now();
        let device = self
            .devices
            .activate(device_id, now)
            .await?
            .ok_or_else(|| CoreError::not_found("device", device_id))?;

        tracing::info!(
            user_id = %device.user_id,
            device_id = %device.device_id,
            "Device authenticated"
        );
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use attend_core::calendar::SchoolCalendar;
    use attend_core::testing::{FixedClock, InMemoryBackend};
    use attend_core::types::Timestamp;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn at(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 4, 14, h, m, 0).unwrap()
    }

    fn backend_with_stale_device() -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new(SchoolCalendar::utc()));
        backend.add_device(
            Uuid::new_v4(),
            Device {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                device_id: "AA:BB:CC:DD:EE:FF".into(),
                is_active: false,
                last_authenticated_at: Some(at(8, 0) - Duration::days(1)),
            },
        );
        backend
    }

    #[tokio::test]
    async fn authenticated_device_becomes_eligible() {
        let backend = backend_with_stale_device();
        let calendar = SchoolCalendar::utc();
        assert!(!backend
            .device("AA:BB:CC:DD:EE:FF")
            .unwrap()
            .is_eligible_at(at(8, 30), &calendar));

        let service = DeviceAuthService::new(backend.clone(), Arc::new(FixedClock::new(at(8, 30))));
        let device = service.authenticate("AA-BB-CC-DD-EE-FF").await.unwrap();

        assert!(device.is_active);
        assert_eq!(device.last_authenticated_at, Some(at(8, 30)));
        assert!(backend
            .device("AA:BB:CC:DD:EE:FF")
            .unwrap()
            .is_eligible_at(at(9, 0), &calendar));
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let backend = backend_with_stale_device();
        let service = DeviceAuthService::new(backend, Arc::new(FixedClock::new(at(8, 30))));
        assert_matches!(
            service.authenticate("11:22:33").await,
            Err(CoreError::NotFound { entity: "device", .. })
        );
    }
}
