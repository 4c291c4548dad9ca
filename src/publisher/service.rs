//! Publisher service: the single owner of dispatch state
//!
//! Every pull and every acknowledgment goes through one async mutex, so a task
//! is never handed to two callers and the checkpoint always reflects exactly
//! the records that left the source.

use crate::config::PublisherConfig;
use crate::publisher::registry::InFlightRegistry;
use crate::shard::{Checkpoint, CheckpointStore, ShardResult, TaskRecord, TaskSource};
use crate::HarvestError;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};

/// Result of processing an acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The task was in flight and is now complete
    Completed,
    /// No in-flight task carries this id
    Unmatched,
}

/// Point-in-time counters reported by `GET /status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStatus {
    pub dispatched: u64,
    pub acknowledged: u64,
    pub unmatched_acks: u64,
    pub requeued: u64,
    pub in_flight: usize,
    pub pending: usize,
    pub exhausted: bool,
}

/// Behavior switches for a publisher service
#[derive(Debug, Clone, Default)]
pub struct PublisherOptions {
    /// Re-offer tasks that stayed in flight longer than this
    pub stale_after: Option<Duration>,
}

struct PublisherState {
    source: TaskSource,
    store: CheckpointStore,
    registry: InFlightRegistry,
    requeued: VecDeque<TaskRecord>,
    status: PublisherStatus,
    exhaustion_saved: bool,
}

impl PublisherState {
    fn is_drained(&self) -> bool {
        self.source.pending() == 0 && self.requeued.is_empty() && self.registry.is_empty()
    }

    fn save(&mut self) -> ShardResult<()> {
        let checkpoint = self.source.checkpoint();
        self.store.save(&checkpoint)
    }
}

/// Hands out tasks, tracks acknowledgments and persists progress
pub struct PublisherService {
    state: Mutex<PublisherState>,
    options: PublisherOptions,
    drained: watch::Sender<bool>,
}

impl PublisherService {
    /// Builds a service from the publisher configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Publisher section of the configuration
    /// * `fresh` - Ignore the existing checkpoint and start every shard at 0
    pub fn open(config: &PublisherConfig, fresh: bool) -> Result<Self, HarvestError> {
        let store = CheckpointStore::new(
            &config.checkpoint_file,
            Duration::from_secs(config.save_interval_secs),
        );

        let checkpoint = if fresh {
            tracing::info!("Ignoring checkpoint {} (fresh start)", store.path().display());
            Checkpoint::default()
        } else {
            store.load()
        };

        let source = TaskSource::open(
            Path::new(&config.shard_dir),
            &config.shard_extension,
            &checkpoint,
        )?;

        let options = PublisherOptions {
            stale_after: config.stale_after_secs.map(Duration::from_secs),
        };

        Ok(Self::new(source, store, options))
    }

    /// Builds a service around an already opened task source
    pub fn new(source: TaskSource, store: CheckpointStore, options: PublisherOptions) -> Self {
        let state = PublisherState {
            source,
            store,
            registry: InFlightRegistry::new(),
            requeued: VecDeque::new(),
            status: PublisherStatus::default(),
            exhaustion_saved: false,
        };
        let (drained, _) = watch::channel(state.is_drained());

        Self {
            state: Mutex::new(state),
            options,
            drained,
        }
    }

    /// Hands out the next task, or `None` when there is nothing left to dispatch
    ///
    /// Re-offered stale tasks go out before new records. Pulling a new record
    /// advances its shard's progress; the checkpoint is written when the save
    /// interval elapsed and once more when the source runs dry.
    pub async fn pull(&self) -> Option<TaskRecord> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if let Some(window) = self.options.stale_after {
            for entry in state.registry.evict_stale(now, window) {
                tracing::warn!(
                    "Task {} not acknowledged within {}s, offering it again",
                    entry.task_id,
                    window.as_secs()
                );
                state.requeued.push_back(entry.to_record());
                state.status.requeued += 1;
            }
        }

        let requeued = state.requeued.pop_front();
        let record = match requeued {
            Some(record) => Some(record),
            None => {
                if let Some(file) = state.source.shard_to_load() {
                    let shard_id = file.id.clone();
                    match tokio::task::spawn_blocking(move || file.load()).await {
                        Ok(contents) => state.source.preload(&shard_id, contents),
                        Err(e) => tracing::warn!("Reading shard {} failed: {}", shard_id, e),
                    }
                }
                state.source.next().map(|dispatched| {
                    tracing::debug!(
                        "Dispatching {} ({}:{})",
                        dispatched.record.id,
                        dispatched.shard_id,
                        dispatched.offset
                    );
                    dispatched.record
                })
            }
        };

        match record {
            Some(record) => {
                if state.registry.dispatch(&record, now).is_some() {
                    tracing::warn!("Task id {} is already in flight", record.id);
                }
                state.status.dispatched += 1;

                let checkpoint = state.source.checkpoint();
                if let Err(e) = state.store.save_if_due(&checkpoint, now) {
                    tracing::error!("Failed to save checkpoint: {}", e);
                }
                Some(record)
            }
            None => {
                if !state.exhaustion_saved {
                    tracing::info!(
                        "All tasks dispatched, {} still awaiting acknowledgment",
                        state.registry.len()
                    );
                    match state.save() {
                        Ok(()) => state.exhaustion_saved = true,
                        Err(e) => tracing::error!("Failed to save checkpoint: {}", e),
                    }
                }
                self.drained.send_replace(state.is_drained());
                None
            }
        }
    }

    /// Marks a task as complete
    ///
    /// An unknown id is counted and logged; it never touches the checkpoint.
    pub async fn acknowledge(&self, task_id: &str) -> AckOutcome {
        let mut state = self.state.lock().await;

        let outcome = match state.registry.acknowledge(task_id) {
            Some(entry) => {
                tracing::debug!(
                    "Task {} acknowledged after {:.1}s",
                    task_id,
                    entry.dispatched_at.elapsed().as_secs_f64()
                );
                state.status.acknowledged += 1;
                AckOutcome::Completed
            }
            None => {
                tracing::warn!("Acknowledgment for unknown task {}", task_id);
                state.status.unmatched_acks += 1;
                AckOutcome::Unmatched
            }
        };

        if state.is_drained() {
            self.drained.send_replace(true);
        }
        outcome
    }

    /// Current counters
    pub async fn status(&self) -> PublisherStatus {
        let state = self.state.lock().await;
        PublisherStatus {
            in_flight: state.registry.len(),
            pending: state.source.pending() + state.requeued.len(),
            exhausted: state.source.is_exhausted(),
            ..state.status.clone()
        }
    }

    /// Progress that would be written to the checkpoint right now
    pub async fn checkpoint(&self) -> Checkpoint {
        self.state.lock().await.source.checkpoint()
    }

    /// Writes the checkpoint regardless of the save interval
    pub async fn save_checkpoint(&self) -> ShardResult<()> {
        self.state.lock().await.save()
    }

    /// Watches whether every record was dispatched and acknowledged
    pub fn drained(&self) -> watch::Receiver<bool> {
        self.drained.subscribe()
    }
}
