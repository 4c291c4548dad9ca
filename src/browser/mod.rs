//! Browser abstraction used by the capture worker
//!
//! The worker only talks to these traits. The Chromium backend (feature
//! `chromium`) implements them over the DevTools protocol; tests provide an
//! in-memory implementation.
//!
//! Object hierarchy: a [`BrowserLauncher`] starts a [`Browser`], which hands out
//! one [`BrowserContext`] (fixed viewport and user agent) per generation, which
//! opens [`Page`]s.

#[cfg(feature = "chromium")]
mod chromium;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumLauncher;

use crate::config::BrowserConfig;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a browser backend
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Failed to open page: {0}")]
    NewPage(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Script evaluation failed: {0}")]
    Evaluate(String),

    #[error("Failed to resize viewport: {0}")]
    Viewport(String),

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    #[error("Failed to read page content: {0}")]
    Content(String),

    #[error("Failed to close {what}: {message}")]
    Close { what: &'static str, message: String },
}

/// Result type for browser operations
pub type BrowserResult<T> = Result<T, BrowserError>;

/// Viewport size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// How to start the browser process
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub args: Vec<String>,
    /// Timeout for a single DevTools request
    pub request_timeout: Duration,
}

impl LaunchOptions {
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            headless: config.headless,
            executable: config.executable.as_ref().map(PathBuf::from),
            args: config.args.clone(),
            request_timeout: Duration::from_secs(config.navigation_timeout_secs.max(30)),
        }
    }
}

/// Settings shared by every page of a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSettings {
    pub viewport: Viewport,
    pub user_agent: String,
}

impl ContextSettings {
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            viewport: Viewport {
                width: config.width,
                height: config.height,
            },
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Starts browser processes
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> BrowserResult<Box<dyn Browser>>;
}

/// A running browser process
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_context(&self, settings: &ContextSettings)
        -> BrowserResult<Arc<dyn BrowserContext>>;

    /// Terminates the browser process; pages left open are discarded
    async fn close(&self) -> BrowserResult<()>;
}

/// An isolated group of pages with a fixed viewport and user agent
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> BrowserResult<Box<dyn Page>>;

    async fn close(&self) -> BrowserResult<()>;
}

/// One browser tab
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigates to `url` and waits for the load to finish
    ///
    /// # Returns
    ///
    /// The HTTP status of the main document, when the backend can observe it
    async fn goto(&self, url: &str) -> BrowserResult<Option<u16>>;

    /// Evaluates a JavaScript expression and returns its JSON value
    /// (`Null` when the expression yields nothing)
    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value>;

    async fn set_viewport(&self, viewport: Viewport) -> BrowserResult<()>;

    fn viewport(&self) -> Viewport;

    /// Captures the current viewport as PNG bytes
    async fn screenshot(&self) -> BrowserResult<Vec<u8>>;

    /// Serialized DOM of the page
    async fn content(&self) -> BrowserResult<String>;

    async fn close(&self) -> BrowserResult<()>;
}

#[cfg(test)]
pub(crate) mod fake;
