//! Shard file reader
//!
//! A shard is a JSON Lines file. Every non-blank line holds one record with an
//! `id` (string or number, `uuid` is accepted as an alias) and a `url`. Lines
//! that do not parse are skipped with a warning, so record offsets depend only
//! on the file content.

use crate::shard::{ShardError, ShardResult, TaskRecord};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A shard file discovered in the shard directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFile {
    /// Shard identifier (the file name)
    pub id: String,

    /// Full path to the file
    pub path: PathBuf,
}

/// The parsed content of one shard file
#[derive(Debug, Clone)]
pub struct ShardContents {
    /// Hex SHA-256 of the raw file bytes
    pub fingerprint: String,

    /// Records in file order
    pub records: Vec<TaskRecord>,
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(alias = "uuid")]
    id: serde_json::Value,
    url: String,
}

/// Lists the shard files in a directory, sorted by file name
///
/// # Arguments
///
/// * `dir` - Directory to scan (not recursive)
/// * `extension` - File extension that marks a shard, without the dot
pub fn list_shards(dir: &Path, extension: &str) -> ShardResult<Vec<ShardFile>> {
    let entries = std::fs::read_dir(dir).map_err(|source| ShardError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut shards = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ShardError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            shards.push(ShardFile {
                id: name.to_string(),
                path: path.clone(),
            });
        }
    }

    shards.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(shards)
}

impl ShardFile {
    /// Reads, fingerprints and parses the shard
    pub fn load(&self) -> ShardResult<ShardContents> {
        let bytes = std::fs::read(&self.path).map_err(|source| ShardError::Read {
            shard: self.id.clone(),
            source,
        })?;

        Ok(ShardContents {
            fingerprint: fingerprint_bytes(&bytes),
            records: parse_records(&self.id, &bytes),
        })
    }
}

/// Computes the hex SHA-256 fingerprint of shard content
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn parse_records(shard_id: &str, bytes: &[u8]) -> Vec<TaskRecord> {
    let text = String::from_utf8_lossy(bytes);
    let mut records = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Some(record) => records.push(record),
            None => {
                tracing::warn!(
                    "Skipping malformed record at {}:{}",
                    shard_id,
                    line_no + 1
                );
            }
        }
    }

    records
}

fn parse_line(line: &str) -> Option<TaskRecord> {
    let raw: RawRecord = serde_json::from_str(line).ok()?;

    let id = match raw.id {
        serde_json::Value::String(s) if !s.is_empty() => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };

    if raw.url.trim().is_empty() {
        return None;
    }

    Some(TaskRecord { id, url: raw.url })
}
