//! Worker module: captures pages for tasks pulled from the publisher
//!
//! This module contains:
//! - The page pool bounding how many pages are open at once
//! - The capture session implementing the per-page capture protocol
//! - The screenshot overlay for tagged bounding boxes
//! - The HTTP client for the publisher's task protocol
//! - The orchestrator tying them together

mod annotate;
mod client;
mod orchestrator;
mod pool;
mod session;

pub use annotate::{annotate_screenshot, draw_boxes, extract_boxes, AnnotateError, BoundingBox};
pub use client::PublisherClient;
pub use orchestrator::{GenerationReport, TaskOutcome, Worker};
pub use pool::{PageLease, PagePool, PageSlot};
pub use session::{capture, CaptureError, CaptureOptions, CaptureStage, CapturedArtifact};

use crate::config::Config;
use crate::storage::{default_run_name, FileStorage};
use crate::HarvestError;
use std::sync::Arc;

/// Runs a worker with the compiled-in browser backend and file storage
///
/// Returns when interrupted (Ctrl-C) or on a fatal worker error.
///
/// # Arguments
///
/// * `config` - The full configuration
/// * `run_name` - Storage run directory; defaults to `worker_<timestamp>`
#[cfg(feature = "chromium")]
pub async fn run_worker(config: &Config, run_name: Option<String>) -> Result<(), HarvestError> {
    let launcher = Arc::new(crate::browser::ChromiumLauncher);
    run_worker_with(config, launcher, run_name).await
}

/// Runs a worker with the given browser backend and file storage
pub async fn run_worker_with(
    config: &Config,
    launcher: Arc<dyn crate::browser::BrowserLauncher>,
    run_name: Option<String>,
) -> Result<(), HarvestError> {
    let run_name = run_name.unwrap_or_else(default_run_name);
    let storage = Arc::new(FileStorage::open(&config.worker.storage_dir, &run_name)?);
    let worker = Worker::new(config, launcher, storage)?;

    tracing::info!(
        "Worker pulling from {} with up to {} pages, restarting the browser every {} tasks",
        config.worker.publisher_url,
        config.worker.max_pages,
        config.worker.restart_interval
    );

    tokio::select! {
        result = worker.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, stopping worker");
            Ok(())
        }
    }
}
