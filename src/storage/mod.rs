//! Storage module for persisting captured pages
//!
//! This module handles everything that happens to an artifact after capture:
//! - The `ArtifactSink` interface the worker hands artifacts to
//! - File-based storage of HTML and screenshots per task
//! - A SQLite index of stored captures

mod file;
mod schema;
mod sqlite;
mod traits;

pub use file::{default_run_name, FileStorage};
pub use sqlite::CaptureIndex;
pub use traits::{ArtifactSink, StorageError, StorageResult};

use chrono::{DateTime, Utc};

/// Index entry for one stored capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub id: String,
    pub url: String,
    pub captured_at: DateTime<Utc>,
    /// Whether an annotated screenshot was written
    pub annotated: bool,
}
