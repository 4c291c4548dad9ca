//! File-based artifact storage
//!
//! Layout under `<root>/<run name>/`:
//!
//! ```text
//! captures.db
//! <id>/<id>.html
//! <id>/<id>.png
//! <id>/<id>_annotated.png   (only when an overlay was produced)
//! ```

use crate::storage::sqlite::CaptureIndex;
use crate::storage::traits::{ArtifactSink, StorageError, StorageResult};
use crate::storage::CaptureRecord;
use crate::worker::CapturedArtifact;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const INDEX_FILE: &str = "captures.db";

/// Writes artifacts as files and indexes them in SQLite
pub struct FileStorage {
    dir: PathBuf,
    index: Mutex<CaptureIndex>,
}

impl FileStorage {
    /// Opens (creating if needed) the run directory `root/run_name`
    ///
    /// # Arguments
    ///
    /// * `root` - Storage root shared by all runs
    /// * `run_name` - Directory name for this run, see [`default_run_name`]
    pub fn open(root: impl AsRef<Path>, run_name: &str) -> StorageResult<Self> {
        validate_key(run_name)?;
        let dir = root.as_ref().join(run_name);
        std::fs::create_dir_all(&dir)?;

        let index = CaptureIndex::open(&dir.join(INDEX_FILE))?;
        tracing::info!("Storing captures in {}", dir.display());

        Ok(Self {
            dir,
            index: Mutex::new(index),
        })
    }

    /// Directory holding the files of one task
    pub fn artifact_dir(&self, task_id: &str) -> PathBuf {
        self.dir.join(task_id)
    }

    /// Number of captures in the index
    pub fn count(&self) -> StorageResult<u64> {
        self.index()?.count()
    }

    /// Index entry for one task
    pub fn get(&self, task_id: &str) -> StorageResult<Option<CaptureRecord>> {
        self.index()?.get(task_id)
    }

    fn index(&self) -> StorageResult<MutexGuard<'_, CaptureIndex>> {
        self.index
            .lock()
            .map_err(|_| StorageError::Database("capture index lock poisoned".to_string()))
    }
}

/// Run directory name for a worker started now: `worker_<YYYYmmdd-HHMMSS>`
pub fn default_run_name() -> String {
    format!("worker_{}", Utc::now().format("%Y%m%d-%H%M%S"))
}

#[async_trait]
impl ArtifactSink for FileStorage {
    async fn save(&self, task_id: &str, artifact: &CapturedArtifact) -> StorageResult<()> {
        validate_key(task_id)?;
        if artifact.html.is_empty() {
            return Err(StorageError::MissingContent("html"));
        }
        if artifact.screenshot.is_empty() {
            return Err(StorageError::MissingContent("image"));
        }

        let dir = self.artifact_dir(task_id);
        tokio::fs::create_dir_all(&dir).await?;

        tokio::fs::write(dir.join(format!("{}.html", task_id)), &artifact.html).await?;
        tokio::fs::write(dir.join(format!("{}.png", task_id)), &artifact.screenshot).await?;

        let annotated_path = dir.join(format!("{}_annotated.png", task_id));
        match &artifact.annotated_screenshot {
            Some(annotated) => tokio::fs::write(&annotated_path, annotated).await?,
            None => match tokio::fs::remove_file(&annotated_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }

        let record = CaptureRecord {
            id: task_id.to_string(),
            url: artifact.url.clone(),
            captured_at: Utc::now(),
            annotated: artifact.annotated_screenshot.is_some(),
        };
        self.index()?.upsert(&record)?;

        tracing::debug!("Stored capture {} ({})", task_id, artifact.url);
        Ok(())
    }
}

/// Ids and run names become directory names
fn validate_key(key: &str) -> StorageResult<()> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StorageError::InvalidId(key.to_string()));
    }
    Ok(())
}
