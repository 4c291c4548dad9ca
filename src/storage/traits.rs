//! Storage traits and error types
//!
//! This module defines the sink interface the worker hands captured artifacts
//! to, and the errors a sink can raise.

use crate::worker::CapturedArtifact;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Captured content is missing `{0}`")]
    MissingContent(&'static str),

    #[error("Task id cannot be used as a storage key: {0:?}")]
    InvalidId(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination for captured artifacts
///
/// Implementations must be idempotent per task id: a task can be delivered
/// more than once, and a later delivery replaces the earlier one.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persists the artifact captured for `task_id`
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Stored (or replaced)
    /// * `Err(StorageError::MissingContent)` - The HTML or the screenshot is empty
    async fn save(&self, task_id: &str, artifact: &CapturedArtifact) -> StorageResult<()>;
}
