//! Worker orchestrator
//!
//! Owns one browser at a time and drives the pull -> capture -> report loop.
//! A generation starts by launching a browser and ends after
//! `restart-interval` dispatched tasks: in-flight captures are drained, the
//! browser is torn down, and the next generation launches a fresh one.

use crate::browser::{Browser, BrowserLauncher, ContextSettings, LaunchOptions};
use crate::config::Config;
use crate::shard::TaskRecord;
use crate::storage::ArtifactSink;
use crate::worker::client::PublisherClient;
use crate::worker::pool::{PagePool, PageSlot};
use crate::worker::session::{capture, CaptureError, CaptureOptions, CaptureStage};
use crate::HarvestError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};

/// Counters for one browser generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Tasks pulled from the publisher
    pub dispatched: usize,
    /// Captures that were stored
    pub stored: usize,
    /// Captures that failed in the browser
    pub failed: usize,
    /// Captures that succeeded but could not be stored
    pub persist_failed: usize,
}

/// How a single task ended
#[derive(Debug)]
pub enum TaskOutcome {
    Stored,
    CaptureFailed(CaptureError),
}

/// Shared, immutable inputs of every capture task
struct TaskContext {
    capture: CaptureOptions,
    client: PublisherClient,
    sink: Arc<dyn ArtifactSink>,
}

type Running = HashMap<Id, String>;

/// Pulls tasks, captures pages and reports completions
pub struct Worker {
    launcher: Arc<dyn BrowserLauncher>,
    launch: LaunchOptions,
    context_settings: ContextSettings,
    max_pages: usize,
    restart_interval: usize,
    idle_backoff: Duration,
    tasks: Arc<TaskContext>,
}

impl Worker {
    /// Creates a worker from the configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Full configuration (`[worker]` and `[browser]` are used)
    /// * `launcher` - Browser backend
    /// * `sink` - Where captured artifacts go
    pub fn new(
        config: &Config,
        launcher: Arc<dyn BrowserLauncher>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Result<Self, HarvestError> {
        let client = PublisherClient::new(
            &config.worker.publisher_url,
            Duration::from_secs(config.worker.ack_timeout_secs),
        )?;

        Ok(Self {
            launcher,
            launch: LaunchOptions::from_config(&config.browser),
            context_settings: ContextSettings::from_config(&config.browser),
            max_pages: config.worker.max_pages,
            restart_interval: config.worker.restart_interval,
            idle_backoff: Duration::from_millis(config.worker.idle_backoff_ms),
            tasks: Arc::new(TaskContext {
                capture: CaptureOptions::from_config(&config.worker, &config.browser),
                client,
                sink,
            }),
        })
    }

    /// Runs generations forever
    ///
    /// Only returns on a fatal error: a browser that cannot be launched or a
    /// capture task that panicked.
    pub async fn run(&self) -> Result<(), HarvestError> {
        let mut generation: u64 = 0;
        loop {
            generation += 1;
            let report = self.run_generation().await?;
            tracing::info!(
                "Generation {} finished: {} dispatched, {} stored, {} failed, {} not persisted",
                generation,
                report.dispatched,
                report.stored,
                report.failed,
                report.persist_failed
            );
        }
    }

    /// Runs one browser generation
    ///
    /// Launches a browser, dispatches up to `restart-interval` tasks, waits for
    /// every capture to finish and tears the browser down.
    pub async fn run_generation(&self) -> Result<GenerationReport, HarvestError> {
        let browser = self.launcher.launch(&self.launch).await?;
        let context = match browser.new_context(&self.context_settings).await {
            Ok(context) => context,
            Err(e) => {
                close_browser(browser.as_ref()).await;
                return Err(e.into());
            }
        };

        let pool = PagePool::new(context, self.max_pages);
        let mut tasks = JoinSet::new();
        let mut running = Running::new();
        let mut report = GenerationReport::default();

        let mut result = self
            .dispatch(&pool, &mut tasks, &mut running, &mut report)
            .await;

        if result.is_ok() {
            tracing::info!(
                "Dispatched {} tasks, draining {} in-flight captures before restarting the browser",
                report.dispatched,
                tasks.len()
            );
            while let Some(joined) = tasks.join_next_with_id().await {
                if let Err(e) = record_join(joined, &mut running, &mut report) {
                    result = Err(e);
                    break;
                }
            }
        }

        if result.is_err() {
            tasks.shutdown().await;
        }

        pool.close();
        if let Err(e) = pool.context().close().await {
            tracing::warn!("Failed to close browser context: {}", e);
        }
        close_browser(browser.as_ref()).await;

        result.map(|()| report)
    }

    async fn dispatch(
        &self,
        pool: &PagePool,
        tasks: &mut JoinSet<Result<TaskOutcome, HarvestError>>,
        running: &mut Running,
        report: &mut GenerationReport,
    ) -> Result<(), HarvestError> {
        while report.dispatched < self.restart_interval {
            while let Some(joined) = tasks.try_join_next_with_id() {
                record_join(joined, running, report)?;
            }

            let Some(slot) = pool.reserve().await else {
                break;
            };

            let Some(task) = self.tasks.client.fetch_task().await else {
                drop(slot);
                tokio::time::sleep(self.idle_backoff).await;
                continue;
            };

            report.dispatched += 1;
            tracing::debug!(
                "Capturing {} ({}), {} pages in use",
                task.id,
                task.url,
                pool.count()
            );

            let task_id = task.id.clone();
            let handle = tasks.spawn(process_task(slot, task, Arc::clone(&self.tasks)));
            running.insert(handle.id(), task_id);
        }
        Ok(())
    }
}

/// Captures one task, stores the artifact and acknowledges the task
///
/// The acknowledgment is sent whatever happened before it. A storage failure
/// is returned after the acknowledgment.
async fn process_task(
    slot: PageSlot,
    task: TaskRecord,
    ctx: Arc<TaskContext>,
) -> Result<TaskOutcome, HarvestError> {
    let captured = match slot.open().await {
        Ok(lease) => {
            let result = capture(lease.page(), &task.url, &ctx.capture).await;
            lease.release().await;
            result
        }
        Err(source) => Err(CaptureError::Browser {
            stage: CaptureStage::Navigating,
            source,
        }),
    };

    let outcome = match captured {
        Ok(artifact) => ctx
            .sink
            .save(&task.id, &artifact)
            .await
            .map(|()| TaskOutcome::Stored),
        Err(e) => Ok(TaskOutcome::CaptureFailed(e)),
    };

    ctx.client.acknowledge(&task.id).await;

    outcome.map_err(HarvestError::from)
}

fn record_join(
    joined: Result<(Id, Result<TaskOutcome, HarvestError>), JoinError>,
    running: &mut Running,
    report: &mut GenerationReport,
) -> Result<(), HarvestError> {
    match joined {
        Ok((id, Ok(TaskOutcome::Stored))) => {
            running.remove(&id);
            report.stored += 1;
        }
        Ok((id, Ok(TaskOutcome::CaptureFailed(e)))) => {
            let task_id = running.remove(&id).unwrap_or_default();
            tracing::warn!("Capture of {} failed at {}: {}", task_id, e.stage(), e);
            report.failed += 1;
        }
        Ok((id, Err(e))) => {
            let task_id = running.remove(&id).unwrap_or_default();
            tracing::error!("Failed to store capture {}: {}", task_id, e);
            report.persist_failed += 1;
        }
        Err(e) if e.is_panic() => {
            let task_id = running.remove(&e.id()).unwrap_or_default();
            let message = panic_message(e.into_panic());
            tracing::error!("Capture task for {} panicked: {}", task_id, message);
            return Err(HarvestError::TaskPanicked { task_id, message });
        }
        Err(e) => {
            running.remove(&e.id());
            tracing::debug!("Capture task cancelled: {}", e);
        }
    }
    Ok(())
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn close_browser(browser: &dyn Browser) {
    match browser.close().await {
        Ok(()) => tracing::info!("Browser closed"),
        Err(e) => tracing::warn!("Failed to close browser: {}", e),
    }
}
