//! Artifact sinks and browser setups for worker tests

use crate::fake::{FakeBehavior, FakeLauncher};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use sumi_harvest::storage::{ArtifactSink, StorageError, StorageResult};
use sumi_harvest::CapturedArtifact;

/// Pages whose URL contains this marker never finish loading in time
pub const SLOW_MARKER: &str = "slow";

/// A launcher whose pages echo their URL and hang on [`SLOW_MARKER`]
pub fn echo_launcher(load_time: Duration) -> FakeLauncher {
    FakeLauncher {
        behavior: FakeBehavior {
            navigation_delay: load_time,
            hang_on: Some(SLOW_MARKER.to_string()),
            html: r#"<html><body><a href="{url}">page</a></body></html>"#.to_string(),
            marked_html: r#"<html><body __bbox__="(0,0,40,20)"><a href="{url}" __bbox__="(5,5,30,15)">page</a></body></html>"#
                .to_string(),
            ..FakeBehavior::default()
        },
        ..FakeLauncher::default()
    }
}

/// Keeps every artifact in memory; optionally refuses all of them
#[derive(Default)]
pub struct RecordingSink {
    pub saved: Mutex<Vec<(String, CapturedArtifact)>>,
    pub reject: bool,
}

impl RecordingSink {
    pub fn rejecting() -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .saved
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl ArtifactSink for RecordingSink {
    async fn save(&self, task_id: &str, artifact: &CapturedArtifact) -> StorageResult<()> {
        if self.reject {
            return Err(StorageError::Database("disk full".to_string()));
        }
        self.saved
            .lock()
            .unwrap()
            .push((task_id.to_string(), artifact.clone()));
        Ok(())
    }
}

/// Panics on every save
pub struct PanickingSink;

#[async_trait]
impl ArtifactSink for PanickingSink {
    async fn save(&self, _task_id: &str, _artifact: &CapturedArtifact) -> StorageResult<()> {
        panic!("sink exploded")
    }
}
