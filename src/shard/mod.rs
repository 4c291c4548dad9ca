//! Shard module: the ordered, resumable source of capture tasks
//!
//! This module covers everything the publisher needs to hand out records:
//! - Reading shard files (JSON Lines, one URL record per line)
//! - Fingerprinting shard content to detect changed files
//! - Persisting per-shard progress in a checkpoint file
//! - Iterating all unfinished shards in a fixed order

mod checkpoint;
mod reader;
mod source;

pub use checkpoint::{Checkpoint, CheckpointStore, ShardCheckpoint};
pub use reader::{list_shards, ShardContents, ShardFile};
pub use source::{DispatchedRecord, TaskSource};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading shards or writing checkpoints
#[derive(Debug, Error)]
pub enum ShardError {
    #[error("Failed to list shard directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read shard {shard}: {source}")]
    Read {
        shard: String,
        source: std::io::Error,
    },

    #[error("Failed to write checkpoint {path}: {source}")]
    CheckpointWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for shard operations
pub type ShardResult<T> = Result<T, ShardError>;

/// One URL record read from a shard
///
/// This is also the wire shape of a task handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Opaque identifier, stable per source row
    pub id: String,

    /// The URL to capture
    pub url: String,
}

/// Progress bookkeeping for one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardState {
    /// Shard identifier (the file name)
    pub shard_id: String,

    /// Hex SHA-256 of the shard file content
    pub fingerprint: String,

    /// Offset of the next record to dispatch; never exceeds `record_count`
    pub progress_offset: usize,

    /// Number of records in the shard
    pub record_count: usize,
}

impl ShardState {
    /// Builds the state for a shard, resuming from a checkpoint entry when it
    /// matches the shard's current fingerprint
    ///
    /// A missing entry or a fingerprint mismatch means the shard starts over at
    /// offset 0. A stored progress beyond the record count is clamped.
    pub fn resume(
        shard_id: &str,
        fingerprint: &str,
        record_count: usize,
        saved: Option<&ShardCheckpoint>,
    ) -> Self {
        let progress_offset = match saved {
            Some(entry) if entry.checksum == fingerprint => entry.progress.min(record_count),
            _ => 0,
        };

        Self {
            shard_id: shard_id.to_string(),
            fingerprint: fingerprint.to_string(),
            progress_offset,
            record_count,
        }
    }

    /// Returns true once every record of the shard has been dispatched
    pub fn is_complete(&self) -> bool {
        self.progress_offset >= self.record_count
    }

    /// Number of records not yet dispatched
    pub fn remaining(&self) -> usize {
        self.record_count.saturating_sub(self.progress_offset)
    }

    /// Converts the state into its checkpoint entry
    pub fn to_checkpoint(&self) -> ShardCheckpoint {
        ShardCheckpoint {
            checksum: self.fingerprint.clone(),
            progress: self.progress_offset,
        }
    }
}
