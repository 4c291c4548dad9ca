//! HTTP surface of the publisher
//!
//! - `GET /task`   -> 200 `{"id", "url"}`, or 204 once nothing is left to dispatch
//! - `POST /done`  -> body `{"id", "type"}`, always answered with 200 (the
//!   body is read as JSON whatever its content type)
//! - `GET /status` -> dispatch counters as JSON

use crate::publisher::service::{PublisherService, PublisherStatus};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Acknowledgment body posted by workers
#[derive(Debug, Deserialize)]
pub struct AckRequest {
    /// Task id, as a string or a number
    pub id: serde_json::Value,

    /// Completion kind; workers send `"complete"`
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl AckRequest {
    fn task_id(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Builds the publisher router
pub fn router(service: Arc<PublisherService>) -> Router {
    Router::new()
        .route("/task", get(next_task))
        .route("/done", post(acknowledge))
        .route("/status", get(status))
        .with_state(service)
}

/// Serves the publisher API until `shutdown` resolves
pub async fn serve<F>(
    service: Arc<PublisherService>,
    listener: TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn next_task(State(service): State<Arc<PublisherService>>) -> Response {
    match service.pull().await {
        Some(task) => Json(task).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn acknowledge(State(service): State<Arc<PublisherService>>, body: Bytes) -> StatusCode {
    let ack: AckRequest = match serde_json::from_slice(&body) {
        Ok(ack) => ack,
        Err(e) => {
            tracing::warn!("Ignoring malformed acknowledgment: {}", e);
            return StatusCode::OK;
        }
    };
    let task_id = ack.task_id();
    if let Some(kind) = ack.kind.as_deref().filter(|k| *k != "complete") {
        tracing::debug!("Acknowledgment for {} has type {}", task_id, kind);
    }
    service.acknowledge(&task_id).await;
    StatusCode::OK
}

async fn status(State(service): State<Arc<PublisherService>>) -> Json<PublisherStatus> {
    Json(service.status().await)
}
