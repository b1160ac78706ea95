//! Registry of running lesson monitors, keyed by lesson id.
//!
//! The scheduler inserts and retires entries while monitors remove
//! themselves when they finish, so every entry carries an instance number:
//! a finishing monitor only removes the entry it registered, never a newer
//! monitor started for the same lesson after it was retired.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use attend_core::types::{EntityId, Timestamp};

/// Bookkeeping for one running monitor.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    pub instance: u64,
    /// Child of the scheduler's master token.
    pub cancel: CancellationToken,
    pub started_at: Timestamp,
}

#[derive(Debug, Default)]
pub struct MonitorRegistry {
    monitors: RwLock<HashMap<EntityId, MonitorHandle>>,
    next_instance: AtomicU64,
}

impl MonitorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a monitor for `lesson_id` unless one is already running.
    ///
    /// Returns the new entry's instance number, or `None` when the lesson
    /// already has a monitor.
    pub async fn try_register(
        &self,
        lesson_id: EntityId,
        cancel: CancellationToken,
        started_at: Timestamp,
    ) -> Option<u64> {
        let mut monitors = self.monitors.write().await;
        if monitors.contains_key(&lesson_id) {
            return None;
        }
        let instance = self.next_instance.fetch_add(1, Ordering::Relaxed) + 1;
        monitors.insert(
            lesson_id,
            MonitorHandle {
                instance,
                cancel,
                started_at,
            },
        );
        Some(instance)
    }

    /// Remove the entry for `lesson_id` if it still belongs to `instance`.
    pub async fn remove_instance(&self, lesson_id: EntityId, instance: u64) -> bool {
        let mut monitors = self.monitors.write().await;
        match monitors.get(&lesson_id) {
            Some(handle) if handle.instance == instance => {
                monitors.remove(&lesson_id);
                true
            }
            _ => false,
        }
    }

    /// Drop every entry whose lesson is not in `live` and hand the removed
    /// handles back so the caller can signal them.
    pub async fn retain_live(&self, live: &HashSet<EntityId>) -> Vec<(EntityId, MonitorHandle)> {
        let mut monitors = self.monitors.write().await;
        let stale: Vec<EntityId> = monitors
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        stale
            .into_iter()
            .filter_map(|id| monitors.remove(&id).map(|handle| (id, handle)))
            .collect()
    }

    /// Remove and return every entry.
    pub async fn drain(&self) -> Vec<(EntityId, MonitorHandle)> {
        self.monitors.write().await.drain().collect()
    }

    /// Whether `lesson_id` has a registered monitor.
    pub async fn contains(&self, lesson_id: EntityId) -> bool {
        self.monitors.read().await.contains_key(&lesson_id)
    }

    /// Snapshot of the monitored lesson ids.
    pub async fn lesson_ids(&self) -> Vec<EntityId> {
        self.monitors.read().await.keys().copied().collect()
    }

    /// Number of registered monitors.
    pub async fn len(&self) -> usize {
        self.monitors.read().await.len()
    }

    /// Whether no monitor is registered.
    pub async fn is_empty(&self) -> bool {
        self.monitors.read().await.is_empty()
    }
}
