//! HTTP client for the publisher's task protocol

use crate::shard::TaskRecord;
use crate::ConfigError;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Pulls tasks from and reports completions to the publisher
#[derive(Debug, Clone)]
pub struct PublisherClient {
    client: Client,
    task_url: Url,
    done_url: Url,
    ack_timeout: Duration,
}

impl PublisherClient {
    /// Creates a client for the publisher at `publisher_url`
    ///
    /// # Arguments
    ///
    /// * `publisher_url` - Base URL; `task` and `done` are resolved against it
    /// * `ack_timeout` - Upper bound for one acknowledgment request
    pub fn new(publisher_url: &str, ack_timeout: Duration) -> Result<Self, ConfigError> {
        let mut base = Url::parse(publisher_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", publisher_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let join = |endpoint: &str| {
            base.join(endpoint)
                .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", publisher_url, e)))
        };
        let task_url = join("task")?;
        let done_url = join("done")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConfigError::Validation(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            task_url,
            done_url,
            ack_timeout,
        })
    }

    /// Asks the publisher for one task
    ///
    /// # Returns
    ///
    /// * `Some(TaskRecord)` - A task to capture
    /// * `None` - No work right now: exhausted publisher, unexpected status,
    ///   unreadable body or transport failure
    pub async fn fetch_task(&self) -> Option<TaskRecord> {
        let response = match self.client.get(self.task_url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Task request failed: {}", e);
                return None;
            }
        };

        match response.status() {
            StatusCode::OK => match response.json::<TaskRecord>().await {
                Ok(task) => Some(task),
                Err(e) => {
                    tracing::warn!("Publisher sent an unreadable task: {}", e);
                    None
                }
            },
            StatusCode::NO_CONTENT => {
                tracing::debug!("Publisher has no tasks left");
                None
            }
            status => {
                tracing::debug!("Publisher answered task request with {}", status);
                None
            }
        }
    }

    /// Reports a task as complete
    ///
    /// Failures are logged and reported as `false`; they are never fatal.
    pub async fn acknowledge(&self, task_id: &str) -> bool {
        let body = serde_json::json!({ "id": task_id, "type": "complete" });
        let result = self
            .client
            .post(self.done_url.clone())
            .timeout(self.ack_timeout)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    "Acknowledgment for {} rejected with {}",
                    task_id,
                    response.status()
                );
                false
            }
            Err(e) => {
                tracing::warn!("Failed to acknowledge {}: {}", task_id, e);
                false
            }
        }
    }
}
