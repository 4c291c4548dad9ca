//! Configuration module for Sumi-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The publisher and the workers read the same file; each only looks at its own
//! section plus `[browser]`.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Workers keep at most {} pages open", config.worker.max_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{BrowserConfig, Config, PublisherConfig, WorkerConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
