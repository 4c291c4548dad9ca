//! Publisher module: hands out capture tasks over HTTP
//!
//! This module contains:
//! - The in-flight registry of dispatched, unacknowledged tasks
//! - The publisher service that serializes pulls and acknowledgments
//! - The axum router exposing `/task`, `/done` and `/status`

mod registry;
mod server;
mod service;

pub use registry::{InFlightEntry, InFlightRegistry};
pub use server::{router, serve, AckRequest};
pub use service::{AckOutcome, PublisherOptions, PublisherService, PublisherStatus};

use crate::config::PublisherConfig;
use crate::HarvestError;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Runs the publisher until interrupted, or until every task is acknowledged
/// when `exit-when-drained` is set
///
/// The checkpoint is written one final time on the way out.
///
/// # Arguments
///
/// * `config` - Publisher section of the configuration
/// * `fresh` - Ignore the existing checkpoint
pub async fn run_publisher(config: &PublisherConfig, fresh: bool) -> Result<(), HarvestError> {
    let service = Arc::new(PublisherService::open(config, fresh)?);

    let listener = TcpListener::bind(&config.bind).await?;
    tracing::info!("Publisher listening on {}", listener.local_addr()?);

    let mut drained = service.drained();
    let exit_when_drained = config.exit_when_drained;
    let shutdown = async move {
        let all_done = async {
            let signalled = exit_when_drained && drained.wait_for(|done| *done).await.is_ok();
            if !signalled {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, shutting down publisher");
            }
            _ = all_done => {
                tracing::info!("Every task was dispatched and acknowledged");
            }
        }
    };

    serve(Arc::clone(&service), listener, shutdown).await?;

    service.save_checkpoint().await?;
    let status = service.status().await;
    tracing::info!(
        "Publisher stopped: {} dispatched, {} acknowledged, {} pending",
        status.dispatched,
        status.acknowledged,
        status.pending
    );
    Ok(())
}
