//! In-flight registry
//!
//! Tracks every task that was handed to a worker and not yet acknowledged.
//! Per task id the lifecycle is `unseen -> dispatched -> acknowledged`; an
//! acknowledged task is simply removed.

use crate::shard::TaskRecord;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Dispatch metadata for one outstanding task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightEntry {
    pub task_id: String,
    pub url: String,
    pub dispatched_at: Instant,
}

impl InFlightEntry {
    pub fn to_record(&self) -> TaskRecord {
        TaskRecord {
            id: self.task_id.clone(),
            url: self.url.clone(),
        }
    }
}

/// Outstanding tasks keyed by task id
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    entries: HashMap<String, InFlightEntry>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a task as dispatched
    ///
    /// # Returns
    ///
    /// The entry previously registered under the same id, if any (a shard
    /// that repeats an id, or a re-offered task)
    pub fn dispatch(&mut self, record: &TaskRecord, now: Instant) -> Option<InFlightEntry> {
        self.entries.insert(
            record.id.clone(),
            InFlightEntry {
                task_id: record.id.clone(),
                url: record.url.clone(),
                dispatched_at: now,
            },
        )
    }

    /// Removes the entry for an acknowledged task
    ///
    /// # Returns
    ///
    /// * `Some(entry)` - The task was in flight
    /// * `None` - Unknown id (duplicate ack, or issued before a restart)
    pub fn acknowledge(&mut self, task_id: &str) -> Option<InFlightEntry> {
        self.entries.remove(task_id)
    }

    /// Removes and returns entries dispatched more than `window` before `now`,
    /// oldest first
    pub fn evict_stale(&mut self, now: Instant, window: Duration) -> Vec<InFlightEntry> {
        let stale_ids: Vec<String> = self
            .entries
            .values()
            .filter(|e| now.saturating_duration_since(e.dispatched_at) > window)
            .map(|e| e.task_id.clone())
            .collect();

        let mut evicted: Vec<InFlightEntry> = stale_ids
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .collect();
        evicted.sort_by_key(|e| e.dispatched_at);
        evicted
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.entries.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
