//! Checkpoint persistence
//!
//! The checkpoint file maps shard ids to `{checksum, progress}`. It is read
//! once at startup and rewritten in full (never appended) on every save. A
//! missing or corrupt file is never fatal: it simply means no prior progress.

use crate::shard::{ShardError, ShardResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Saved progress for one shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardCheckpoint {
    /// Fingerprint of the shard when the progress was recorded
    pub checksum: String,

    /// Offset of the next record to dispatch
    pub progress: usize,
}

/// Progress for every known shard, keyed by shard id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint {
    shards: BTreeMap<String, ShardCheckpoint>,
}

impl Checkpoint {
    pub fn get(&self, shard_id: &str) -> Option<&ShardCheckpoint> {
        self.shards.get(shard_id)
    }

    pub fn insert(&mut self, shard_id: impl Into<String>, entry: ShardCheckpoint) {
        self.shards.insert(shard_id.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ShardCheckpoint)> {
        self.shards.iter()
    }
}

/// Reads and writes the checkpoint file, rate-limiting periodic writes
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    interval: Duration,
    last_saved: Instant,
}

impl CheckpointStore {
    /// Creates a store for the given file
    ///
    /// # Arguments
    ///
    /// * `path` - Location of the checkpoint file
    /// * `interval` - Minimum time between two periodic writes
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_saved: Instant::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the checkpoint, treating a missing or unreadable file as empty
    pub fn load(&self) -> Checkpoint {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "No checkpoint at {}, starting without prior progress",
                    self.path.display()
                );
                return Checkpoint::default();
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read checkpoint {}: {}; ignoring it",
                    self.path.display(),
                    e
                );
                return Checkpoint::default();
            }
        };

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                tracing::info!(
                    "Loaded checkpoint {} with {} shard entries",
                    self.path.display(),
                    checkpoint.len()
                );
                checkpoint
            }
            Err(e) => {
                tracing::warn!(
                    "Checkpoint {} is corrupt ({}); ignoring it",
                    self.path.display(),
                    e
                );
                Checkpoint::default()
            }
        }
    }

    /// Writes the checkpoint unconditionally
    ///
    /// The file is replaced through a temporary sibling and a rename, so a
    /// crash mid-write leaves the previous checkpoint intact.
    pub fn save(&mut self, checkpoint: &Checkpoint) -> ShardResult<()> {
        let json = serde_json::to_string(checkpoint)?;
        let tmp = self.tmp_path();

        std::fs::write(&tmp, json).map_err(|source| ShardError::CheckpointWrite {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| ShardError::CheckpointWrite {
            path: self.path.clone(),
            source,
        })?;

        self.last_saved = Instant::now();
        tracing::debug!("Checkpoint saved to {}", self.path.display());
        Ok(())
    }

    /// Writes the checkpoint if at least one interval passed since the last write
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The checkpoint was written
    /// * `Ok(false)` - Not due yet
    pub fn save_if_due(&mut self, checkpoint: &Checkpoint, now: Instant) -> ShardResult<bool> {
        if now.duration_since(self.last_saved) < self.interval {
            return Ok(false);
        }
        self.save(checkpoint)?;
        Ok(true)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
