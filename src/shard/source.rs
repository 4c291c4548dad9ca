//! Task source: the ordered record stream across all unfinished shards
//!
//! Shards are visited in lexicographic order of their ids; inside a shard,
//! records are visited in file order starting at the shard's progress offset.
//! Advancing the offset is part of `next()`, so the offset always reflects what
//! has been dispatched, not what has been completed.

use crate::shard::checkpoint::{Checkpoint, ShardCheckpoint};
use crate::shard::reader::{list_shards, ShardContents, ShardFile};
use crate::shard::{ShardResult, ShardState, TaskRecord};
use std::collections::BTreeMap;
use std::path::Path;

/// A record handed out by the task source together with its position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedRecord {
    pub shard_id: String,
    pub offset: usize,
    pub record: TaskRecord,
}

#[derive(Debug)]
struct ShardEntry {
    file: ShardFile,
    state: ShardState,
}

/// Lazy, resumable iterator over the records of every unfinished shard
#[derive(Debug)]
pub struct TaskSource {
    entries: Vec<ShardEntry>,
    position: usize,
    /// Records of `entries[position]`, loaded when iteration reaches it
    loaded: Option<Vec<TaskRecord>>,
    /// Checkpoint entries for shards that are no longer on disk
    retained: BTreeMap<String, ShardCheckpoint>,
    exhausted: bool,
}

impl TaskSource {
    /// Scans the shard directory and resumes each shard from the checkpoint
    ///
    /// Every shard is read once to compute its fingerprint and record count;
    /// record lists are dropped again until iteration reaches the shard.
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory holding the shard files
    /// * `extension` - Shard file extension, without the dot
    /// * `checkpoint` - Progress recorded by a previous run
    pub fn open(dir: &Path, extension: &str, checkpoint: &Checkpoint) -> ShardResult<Self> {
        let files = list_shards(dir, extension)?;
        let mut entries = Vec::with_capacity(files.len());

        for file in files {
            let contents = file.load()?;
            let saved = checkpoint.get(&file.id);
            let state = ShardState::resume(
                &file.id,
                &contents.fingerprint,
                contents.records.len(),
                saved,
            );

            match saved {
                Some(entry) if entry.checksum != state.fingerprint => {
                    tracing::info!(
                        "Shard {} changed since the last checkpoint, restarting at offset 0",
                        file.id
                    );
                }
                _ if state.is_complete() && state.record_count > 0 => {
                    tracing::info!("Skipping finished shard {}", file.id);
                }
                _ if state.progress_offset > 0 => {
                    tracing::info!(
                        "Resuming shard {} at offset {}/{}",
                        file.id,
                        state.progress_offset,
                        state.record_count
                    );
                }
                _ => {
                    tracing::debug!("Shard {} has {} records", file.id, state.record_count);
                }
            }

            entries.push(ShardEntry { file, state });
        }

        let retained = checkpoint
            .iter()
            .filter(|(id, _)| !entries.iter().any(|e| &e.file.id == *id))
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();

        let source = Self {
            entries,
            position: 0,
            loaded: None,
            retained,
            exhausted: false,
        };

        tracing::info!(
            "Found {} pending records across {} shards",
            source.pending(),
            source.entries.len()
        );

        Ok(source)
    }

    /// Returns the next record and advances its shard's progress offset
    ///
    /// Once this returns `None` it keeps returning `None`. A shard that cannot
    /// be read at iteration time is logged and skipped; its remaining records
    /// count as dispatched. Records of the next shard are read from disk here
    /// unless they were handed in through [`TaskSource::preload`].
    pub fn next(&mut self) -> Option<DispatchedRecord> {
        if self.exhausted {
            return None;
        }

        loop {
            self.skip_completed();

            let Some(entry) = self.entries.get(self.position) else {
                self.exhausted = true;
                self.loaded = None;
                return None;
            };

            if self.loaded.is_none() {
                let contents = entry.file.load();
                self.install(contents);
                continue;
            }

            let entry = &mut self.entries[self.position];
            let offset = entry.state.progress_offset;
            let record = self
                .loaded
                .as_ref()
                .and_then(|records| records.get(offset))
                .cloned();

            match record {
                Some(record) => {
                    entry.state.progress_offset += 1;
                    return Some(DispatchedRecord {
                        shard_id: entry.state.shard_id.clone(),
                        offset,
                        record,
                    });
                }
                None => {
                    entry.state.progress_offset = entry.state.record_count;
                }
            }
        }
    }

    /// The shard whose records `next()` would read from disk, if any
    ///
    /// Lets the caller do the read elsewhere and hand the result back through
    /// [`TaskSource::preload`].
    pub fn shard_to_load(&mut self) -> Option<ShardFile> {
        if self.exhausted {
            return None;
        }
        self.skip_completed();
        if self.loaded.is_some() {
            return None;
        }
        self.entries.get(self.position).map(|entry| entry.file.clone())
    }

    /// Installs records read for the shard returned by [`TaskSource::shard_to_load`]
    ///
    /// Contents for any other shard are ignored.
    pub fn preload(&mut self, shard_id: &str, contents: ShardResult<ShardContents>) {
        let current = self.entries.get(self.position).map(|e| e.file.id.as_str());
        if self.loaded.is_none() && current == Some(shard_id) {
            self.install(contents);
        }
    }

    fn skip_completed(&mut self) {
        while self
            .entries
            .get(self.position)
            .is_some_and(|entry| entry.state.is_complete())
        {
            self.position += 1;
            self.loaded = None;
        }
    }

    fn install(&mut self, contents: ShardResult<ShardContents>) {
        let Some(entry) = self.entries.get_mut(self.position) else {
            return;
        };

        match contents {
            Ok(contents) => {
                if contents.fingerprint != entry.state.fingerprint {
                    tracing::warn!(
                        "Shard {} changed while the publisher was running, restarting it at offset 0",
                        entry.file.id
                    );
                    entry.state.fingerprint = contents.fingerprint;
                    entry.state.record_count = contents.records.len();
                    entry.state.progress_offset = 0;
                }
                self.loaded = Some(contents.records);
            }
            Err(e) => {
                tracing::error!(
                    "Skipping unreadable shard {} ({} records dropped): {}",
                    entry.file.id,
                    entry.state.remaining(),
                    e
                );
                entry.state.progress_offset = entry.state.record_count;
                self.position += 1;
            }
        }
    }

    /// Returns true once every shard has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Number of records not yet dispatched across all shards
    pub fn pending(&self) -> usize {
        self.entries.iter().map(|e| e.state.remaining()).sum()
    }

    /// Current per-shard states, in iteration order
    pub fn states(&self) -> impl Iterator<Item = &ShardState> {
        self.entries.iter().map(|e| &e.state)
    }

    /// Snapshot of the progress to persist
    pub fn checkpoint(&self) -> Checkpoint {
        let mut checkpoint = Checkpoint::default();
        for (id, entry) in &self.retained {
            checkpoint.insert(id.clone(), entry.clone());
        }
        for entry in &self.entries {
            checkpoint.insert(entry.state.shard_id.clone(), entry.state.to_checkpoint());
        }
        checkpoint
    }
}
