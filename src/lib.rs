//! Sumi-Harvest: a resumable, distributed page-capture fleet
//!
//! A single publisher hands out URL records from pre-enumerated shard files
//! over HTTP; many independent workers pull those records, render each page in
//! a headless browser, and persist the rendered HTML and screenshot. Progress
//! is checkpointed per shard so a restarted publisher resumes where it left off.

// Test support is written against `sumi_harvest::` paths
#[cfg(test)]
extern crate self as sumi_harvest;

pub mod browser;
pub mod config;
pub mod publisher;
pub mod shard;
pub mod storage;
pub mod worker;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Shard error: {0}")]
    Shard(#[from] shard::ShardError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Browser error: {0}")]
    Browser(#[from] browser::BrowserError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Capture task for {task_id} panicked: {message}")]
    TaskPanicked { task_id: String, message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use publisher::PublisherService;
pub use shard::{ShardState, TaskRecord, TaskSource};
pub use worker::{CapturedArtifact, PagePool, Worker};
