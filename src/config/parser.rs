use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Parses and validates configuration text
///
/// # Arguments
///
/// * `text` - TOML document with optional `[publisher]`, `[worker]` and
///   `[browser]` sections
///
/// # Returns
///
/// * `Ok(Config)` - Parsed configuration, defaults filled in
/// * `Err(ConfigError)` - Invalid TOML or a value outside its allowed range
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(text)?;
    validate(&config)?;
    Ok(config)
}

/// Loads a configuration file from the given path
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&std::fs::read_to_string(path)?)
}

/// Hex SHA-256 of a configuration file's content
///
/// Logged at startup so that publisher and worker logs can be matched to the
/// settings they ran with.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_text(&std::fs::read_to_string(path)?))
}

/// Loads a configuration and returns it with the hash of the exact text parsed
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config = parse_config(&text)?;
    Ok((config, hash_text(&text)))
}

fn hash_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
