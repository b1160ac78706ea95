//! In-memory implementations of every port, plus controllable clocks.
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for the tests of downstream crates.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

use crate::calendar::SchoolCalendar;
use crate::clock::Clock;
use crate::device::{normalize_device_id, Device};
use crate::error::{CoreError, CoreResult};
use crate::lesson::{live_occurrences, Lesson, ScheduledLesson};
use crate::occupancy::{NewOccupancy, OccupancyRecord};
use crate::organization::Organization;
use crate::ports::{
    DeviceDirectory, OccupancyStore, Organizations, PresenceProvider, RoomDirectory, Timetable,
};
use crate::room::RoomZone;
use crate::types::{DbId, EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Clocks
// ---------------------------------------------------------------------------

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<Timestamp>,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

/// Wall-clock time derived from the tokio clock.
///
/// Under `#[tokio::test(start_paused = true)]` the tokio clock auto-advances
/// to the next timer, so this clock follows interval ticks and sleeps
/// exactly.
#[derive(Debug)]
pub struct TokioClock {
    anchor: Timestamp,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(anchor: Timestamp) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.started.elapsed();
        self.anchor + Duration::from_std(elapsed).unwrap_or_else(|_| Duration::zero())
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    lessons: Vec<Lesson>,
    user_orgs: HashMap<EntityId, EntityId>,
    rooms: HashMap<EntityId, RoomZone>,
    zones: HashMap<String, Vec<String>>,
    failing_zones: HashSet<String>,
    devices: HashMap<String, Device>,
    device_orgs: HashMap<String, EntityId>,
    organizations: Vec<Organization>,
    failing_orgs: HashSet<EntityId>,
    records: Vec<OccupancyRecord>,
    failing_opens: HashSet<EntityId>,
    failing_closes: HashSet<EntityId>,
    timetable_unavailable: bool,
}

/// One object implementing every port over shared in-memory state.
pub struct InMemoryBackend {
    calendar: SchoolCalendar,
    state: Mutex<State>,
    presence_calls: AtomicUsize,
    open_calls: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new(calendar: SchoolCalendar) -> Self {
        Self {
            calendar,
            state: Mutex::new(State::default()),
            presence_calls: AtomicUsize::new(0),
            open_calls: AtomicUsize::new(0),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    // -- seeding ------------------------------------------------------------

    pub fn add_lesson(&self, lesson: Lesson) {
        self.with(|s| s.lessons.push(lesson));
    }

    pub fn remove_lesson(&self, lesson_id: EntityId) {
        self.with(|s| s.lessons.retain(|l| l.id != lesson_id));
    }

    /// Register a user as a member of `org_id`.
    pub fn add_user(&self, user_id: EntityId, org_id: EntityId) {
        self.with(|s| {
            s.user_orgs.insert(user_id, org_id);
        });
    }

    pub fn add_room(&self, room: RoomZone) {
        self.with(|s| {
            s.rooms.insert(room.room_id, room);
        });
    }

    pub fn set_zone_occupants(&self, zone_id: &str, device_ids: &[&str]) {
        self.with(|s| {
            s.zones.insert(
                zone_id.to_string(),
                device_ids.iter().map(|d| d.to_string()).collect(),
            );
        });
    }

    pub fn fail_zone(&self, zone_id: &str, failing: bool) {
        self.with(|s| {
            if failing {
                s.failing_zones.insert(zone_id.to_string());
            } else {
                s.failing_zones.remove(zone_id);
            }
        });
    }

    /// Register a device; its identifier is stored normalized.
    pub fn add_device(&self, org_id: EntityId, mut device: Device) {
        device.device_id = normalize_device_id(&device.device_id);
        self.with(|s| {
            s.device_orgs.insert(device.device_id.clone(), org_id);
            s.devices.insert(device.device_id.clone(), device);
        });
    }

    pub fn add_organization(&self, org: Organization) {
        self.with(|s| s.organizations.push(org));
    }

    pub fn fail_organization(&self, org_id: EntityId) {
        self.with(|s| {
            s.failing_orgs.insert(org_id);
        });
    }

    /// Make `open` fail for this user until cleared.
    pub fn fail_opens_for(&self, user_id: EntityId, failing: bool) {
        self.with(|s| {
            if failing {
                s.failing_opens.insert(user_id);
            } else {
                s.failing_opens.remove(&user_id);
            }
        });
    }

    /// Make `close` fail for records of this user until cleared.
    pub fn fail_closes_for(&self, user_id: EntityId, failing: bool) {
        self.with(|s| {
            if failing {
                s.failing_closes.insert(user_id);
            } else {
                s.failing_closes.remove(&user_id);
            }
        });
    }

    pub fn set_timetable_unavailable(&self, unavailable: bool) {
        self.with(|s| s.timetable_unavailable = unavailable);
    }

    pub fn insert_record(&self, record: OccupancyRecord) {
        self.with(|s| s.records.push(record));
    }

    // -- inspection ---------------------------------------------------------

    pub fn records(&self) -> Vec<OccupancyRecord> {
        self.with(|s| s.records.clone())
    }

    pub fn device(&self, device_id: &str) -> Option<Device> {
        let key = normalize_device_id(device_id);
        self.with(|s| s.devices.get(&key).cloned())
    }

    pub fn presence_calls(&self) -> usize {
        self.presence_calls.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    fn scheduled_around(&self, lessons: &[Lesson], at: Timestamp) -> Vec<ScheduledLesson> {
        let today = self.calendar.local_date(at);
        let mut scheduled = Vec::new();
        for date in [today.pred_opt(), Some(today)].into_iter().flatten() {
            scheduled.extend(lessons.iter().filter_map(|l| l.schedule_on(date, &self.calendar)));
        }
        scheduled
    }
}

#[async_trait]
impl Timetable for InMemoryBackend {
    async fn live_lessons(&self, now: Timestamp) -> CoreResult<Vec<ScheduledLesson>> {
        let (lessons, unavailable) = self.with(|s| (s.lessons.clone(), s.timetable_unavailable));
        if unavailable {
            return Err(CoreError::Unavailable("timetable offline".into()));
        }
        Ok(live_occurrences(&lessons, now, &self.calendar))
    }

    async fn lesson_in_room_at(
        &self,
        room_id: EntityId,
        at: Timestamp,
    ) -> CoreResult<Option<ScheduledLesson>> {
        let lessons: Vec<Lesson> = self.with(|s| {
            s.lessons
                .iter()
                .filter(|l| l.room_id == room_id)
                .cloned()
                .collect()
        });
        Ok(self
            .scheduled_around(&lessons, at)
            .into_iter()
            .filter(|l| l.is_running_at(at))
            .min_by_key(|l| l.starts_at))
    }

    async fn lessons_for_user_on(
        &self,
        user_id: EntityId,
        date: NaiveDate,
    ) -> CoreResult<Vec<ScheduledLesson>> {
        let lessons: Vec<Lesson> = self.with(|s| match s.user_orgs.get(&user_id) {
            Some(org_id) => s
                .lessons
                .iter()
                .filter(|l| l.org_id == *org_id)
                .cloned()
                .collect(),
            None => Vec::new(),
        });
        let mut scheduled: Vec<ScheduledLesson> = lessons
            .iter()
            .filter_map(|l| l.schedule_on(date, &self.calendar))
            .collect();
        scheduled.sort_by_key(|l| l.starts_at);
        Ok(scheduled)
    }
}

#[async_trait]
impl RoomDirectory for InMemoryBackend {
    async fn zone_for_room(&self, room_id: EntityId) -> CoreResult<Option<RoomZone>> {
        Ok(self.with(|s| s.rooms.get(&room_id).cloned()))
    }
}

#[async_trait]
impl PresenceProvider for InMemoryBackend {
    async fn zone_occupants(&self, zone_id: &str) -> CoreResult<Vec<String>> {
        self.presence_calls.fetch_add(1, Ordering::SeqCst);
        self.with(|s| {
            if s.failing_zones.contains(zone_id) {
                return Err(CoreError::Unavailable(format!("zone {zone_id} unreachable")));
            }
            Ok(s.zones.get(zone_id).cloned().unwrap_or_default())
        })
    }
}

#[async_trait]
impl DeviceDirectory for InMemoryBackend {
    async fn resolve_device(&self, device_id: &str) -> CoreResult<Option<Device>> {
        Ok(self.device(device_id))
    }

    async fn activate(&self, device_id: &str, at: Timestamp) -> CoreResult<Option<Device>> {
        let key = normalize_device_id(device_id);
        Ok(self.with(|s| {
            s.devices.get_mut(&key).map(|device| {
                device.is_active = true;
                device.last_authenticated_at = Some(at);
                device.clone()
            })
        }))
    }

    async fn deactivate_all_for_org(&self, org_id: EntityId) -> CoreResult<u64> {
        self.with(|s| {
            if s.failing_orgs.contains(&org_id) {
                return Err(CoreError::Internal(format!("organization {org_id} update failed")));
            }
            let owned: Vec<String> = s
                .device_orgs
                .iter()
                .filter(|(_, org)| **org == org_id)
                .map(|(device_id, _)| device_id.clone())
                .collect();
            let mut changed = 0;
            for device_id in owned {
                if let Some(device) = s.devices.get_mut(&device_id) {
                    device.is_active = false;
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }
}

#[async_trait]
impl Organizations for InMemoryBackend {
    async fn all(&self) -> CoreResult<Vec<Organization>> {
        Ok(self.with(|s| s.organizations.clone()))
    }
}

#[async_trait]
impl OccupancyStore for InMemoryBackend {
    async fn open(&self, new: NewOccupancy) -> CoreResult<OccupancyRecord> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.with(|s| {
            if s.failing_opens.contains(&new.user_id) {
                return Err(CoreError::Unavailable("occupancy insert failed".into()));
            }
            let id = s.records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
            let record = OccupancyRecord {
                id,
                user_id: new.user_id,
                room_id: new.room_id,
                subject_id: new.subject_id,
                lesson_id: new.lesson_id,
                source: new.source,
                is_active: true,
                description: new.description,
                opened_at: new.opened_at,
                closed_at: None,
            };
            s.records.push(record.clone());
            Ok(record)
        })
    }

    async fn close(&self, id: DbId, closed_at: Timestamp) -> CoreResult<()> {
        self.with(|s| {
            let record = s
                .records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| CoreError::not_found("occupancy record", id))?;
            if s.failing_closes.contains(&record.user_id) {
                return Err(CoreError::Unavailable("occupancy update failed".into()));
            }
            record.is_active = false;
            record.closed_at = Some(closed_at);
            Ok(())
        })
    }

    async fn open_record_for(
        &self,
        user_id: EntityId,
        lesson_id: EntityId,
    ) -> CoreResult<Option<OccupancyRecord>> {
        Ok(self.with(|s| {
            s.records
                .iter()
                .filter(|r| r.is_active && r.user_id == user_id && r.lesson_id == Some(lesson_id))
                .max_by_key(|r| r.opened_at)
                .cloned()
        }))
    }

    async fn active_for_user(&self, user_id: EntityId) -> CoreResult<Option<OccupancyRecord>> {
        Ok(self.with(|s| {
            s.records
                .iter()
                .filter(|r| r.is_active && r.user_id == user_id)
                .max_by_key(|r| r.opened_at)
                .cloned()
        }))
    }

    async fn find_by_id(&self, id: DbId) -> CoreResult<Option<OccupancyRecord>> {
        Ok(self.with(|s| s.records.iter().find(|r| r.id == id).cloned()))
    }

    async fn records_for_lesson(&self, lesson_id: EntityId) -> CoreResult<Vec<OccupancyRecord>> {
        Ok(self.with(|s| {
            s.records
                .iter()
                .filter(|r| r.lesson_id == Some(lesson_id))
                .cloned()
                .collect()
        }))
    }

    async fn records_for_user(&self, user_id: EntityId) -> CoreResult<Vec<OccupancyRecord>> {
        let mut records: Vec<OccupancyRecord> = self.with(|s| {
            s.records
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect()
        });
        records.sort_by_key(|r| r.opened_at);
        Ok(records)
    }
}
