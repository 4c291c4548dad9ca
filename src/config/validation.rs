use crate::config::types::{BrowserConfig, Config, PublisherConfig, WorkerConfig};
use crate::ConfigError;
use std::net::SocketAddr;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_publisher_config(&config.publisher)?;
    validate_worker_config(&config.worker)?;
    validate_browser_config(&config.browser)?;
    Ok(())
}

/// Validates publisher configuration
fn validate_publisher_config(config: &PublisherConfig) -> Result<(), ConfigError> {
    if config.shard_dir.is_empty() {
        return Err(ConfigError::Validation(
            "shard_dir cannot be empty".to_string(),
        ));
    }

    if config.checkpoint_file.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_file cannot be empty".to_string(),
        ));
    }

    validate_extension(&config.shard_extension)?;

    config
        .bind
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::InvalidAddress(format!("'{}': {}", config.bind, e)))?;

    if config.save_interval_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "save_interval_secs must be >= 1, got {}",
            config.save_interval_secs
        )));
    }

    if config.stale_after_secs == Some(0) {
        return Err(ConfigError::Validation(
            "stale_after_secs must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates worker configuration
fn validate_worker_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    validate_publisher_url(&config.publisher_url)?;

    if config.max_pages < 1 || config.max_pages > 500 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be between 1 and 500, got {}",
            config.max_pages
        )));
    }

    if config.restart_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "restart_interval must be >= 1, got {}",
            config.restart_interval
        )));
    }

    if config.ack_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "ack_timeout_secs must be >= 1, got {}",
            config.ack_timeout_secs
        )));
    }

    if config.storage_dir.is_empty() {
        return Err(ConfigError::Validation(
            "storage_dir cannot be empty".to_string(),
        ));
    }

    if config.accepted_status.is_empty() {
        return Err(ConfigError::Validation(
            "accepted_status must list at least one status code".to_string(),
        ));
    }

    if let Some(code) = config
        .accepted_status
        .iter()
        .find(|code| !(100..=599).contains(*code))
    {
        return Err(ConfigError::Validation(format!(
            "accepted_status contains invalid HTTP status {}",
            code
        )));
    }

    if config.annotate_screenshot && !config.mark_bounding_boxes {
        return Err(ConfigError::Validation(
            "annotate_screenshot requires mark_bounding_boxes".to_string(),
        ));
    }

    Ok(())
}

/// Validates browser configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.width == 0 || config.height == 0 {
        return Err(ConfigError::Validation(format!(
            "viewport must be non-empty, got {}x{}",
            config.width, config.height
        )));
    }

    if config.max_page_height < config.height {
        return Err(ConfigError::Validation(format!(
            "max_page_height ({}) must be >= height ({})",
            config.max_page_height, config.height
        )));
    }

    if config.navigation_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "navigation_timeout_secs must be >= 1, got {}",
            config.navigation_timeout_secs
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the publisher base URL used by workers
fn validate_publisher_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid publisher_url '{}': {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "publisher_url '{}' must use http or https",
            raw
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "publisher_url '{}' has no host",
            raw
        )));
    }

    Ok(())
}

/// Validates a shard file extension (no leading dot, no path separators)
fn validate_extension(extension: &str) -> Result<(), ConfigError> {
    if extension.is_empty() {
        return Err(ConfigError::Validation(
            "shard_extension cannot be empty".to_string(),
        ));
    }

    if !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::Validation(format!(
            "shard_extension must be alphanumeric without a leading dot, got '{}'",
            extension
        )));
    }

    Ok(())
}
