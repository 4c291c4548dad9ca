use serde::Deserialize;

/// Main configuration structure for Sumi-Harvest
///
/// Every section is optional in the file; a missing section takes its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Publisher (task distribution) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    /// Directory holding the shard files
    #[serde(rename = "shard-dir", default = "default_shard_dir")]
    pub shard_dir: String,

    /// File extension (without the dot) that marks a shard file
    #[serde(rename = "shard-extension", default = "default_shard_extension")]
    pub shard_extension: String,

    /// Path to the JSON checkpoint file
    #[serde(rename = "checkpoint-file", default = "default_checkpoint_file")]
    pub checkpoint_file: String,

    /// Address the HTTP server binds to (host:port)
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Minimum number of seconds between two checkpoint writes
    #[serde(rename = "save-interval-secs", default = "default_save_interval")]
    pub save_interval_secs: u64,

    /// Re-offer in-flight tasks that were not acknowledged within this window.
    /// Unset means in-flight entries are never evicted.
    #[serde(rename = "stale-after-secs", default)]
    pub stale_after_secs: Option<u64>,

    /// Stop serving once every record was dispatched and acknowledged
    #[serde(rename = "exit-when-drained", default = "default_true")]
    pub exit_when_drained: bool,
}

/// Worker (capture loop) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Base URL of the publisher (endpoints `/task` and `/done` are appended)
    #[serde(rename = "publisher-url", default = "default_publisher_url")]
    pub publisher_url: String,

    /// Maximum number of browser pages open at the same time
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: usize,

    /// Number of dispatched tasks after which the browser is rebuilt
    #[serde(rename = "restart-interval", default = "default_restart_interval")]
    pub restart_interval: usize,

    /// Pause before pulling again when the publisher has no work (milliseconds)
    #[serde(rename = "idle-backoff-ms", default = "default_idle_backoff")]
    pub idle_backoff_ms: u64,

    /// Timeout for acknowledgment requests (seconds)
    #[serde(rename = "ack-timeout-secs", default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,

    /// Root directory for captured artifacts
    #[serde(rename = "storage-dir", default = "default_storage_dir")]
    pub storage_dir: String,

    /// Tag every element with its document bounding box in the exported HTML
    #[serde(rename = "mark-bounding-boxes", default = "default_true")]
    pub mark_bounding_boxes: bool,

    /// Also produce a screenshot with the bounding boxes drawn on it
    #[serde(rename = "annotate-screenshot", default)]
    pub annotate_screenshot: bool,

    /// Main-document HTTP statuses that count as a successful navigation
    #[serde(rename = "accepted-status", default = "default_accepted_status")]
    pub accepted_status: Vec<u16>,
}

/// Browser launch and page-capture configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Run the browser without a window
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Viewport width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Viewport height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// User agent presented by every page
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Navigation timeout (seconds)
    #[serde(rename = "navigation-timeout-secs", default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Settle delay after navigation and after resizing (milliseconds)
    #[serde(rename = "settle-ms", default = "default_settle")]
    pub settle_ms: u64,

    /// Upper bound for the expanded viewport height (pixels)
    #[serde(rename = "max-page-height", default = "default_max_page_height")]
    pub max_page_height: u32,

    /// Optional path to the browser executable
    #[serde(default)]
    pub executable: Option<String>,

    /// Command-line arguments passed to the browser process
    #[serde(default = "default_browser_args")]
    pub args: Vec<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            shard_dir: default_shard_dir(),
            shard_extension: default_shard_extension(),
            checkpoint_file: default_checkpoint_file(),
            bind: default_bind(),
            save_interval_secs: default_save_interval(),
            stale_after_secs: None,
            exit_when_drained: true,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            publisher_url: default_publisher_url(),
            max_pages: default_max_pages(),
            restart_interval: default_restart_interval(),
            idle_backoff_ms: default_idle_backoff(),
            ack_timeout_secs: default_ack_timeout(),
            storage_dir: default_storage_dir(),
            mark_bounding_boxes: true,
            annotate_screenshot: false,
            accepted_status: default_accepted_status(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            width: default_width(),
            height: default_height(),
            user_agent: default_user_agent(),
            navigation_timeout_secs: default_navigation_timeout(),
            settle_ms: default_settle(),
            max_page_height: default_max_page_height(),
            executable: None,
            args: default_browser_args(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_shard_dir() -> String {
    "./shards".to_string()
}

fn default_shard_extension() -> String {
    "jsonl".to_string()
}

fn default_checkpoint_file() -> String {
    "checkpoint.json".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:10086".to_string()
}

fn default_save_interval() -> u64 {
    100
}

fn default_publisher_url() -> String {
    "http://127.0.0.1:10086".to_string()
}

fn default_max_pages() -> usize {
    50
}

fn default_restart_interval() -> usize {
    1000
}

fn default_idle_backoff() -> u64 {
    3000
}

fn default_ack_timeout() -> u64 {
    10
}

fn default_storage_dir() -> String {
    "data".to_string()
}

fn default_accepted_status() -> Vec<u16> {
    vec![200, 302]
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/91.0.4472.124 Safari/537.36"
        .to_string()
}

fn default_navigation_timeout() -> u64 {
    15
}

fn default_settle() -> u64 {
    5000
}

fn default_max_page_height() -> u32 {
    16384
}

fn default_browser_args() -> Vec<String> {
    [
        "--ignore-certificate-errors",
        "--disable-logging",
        "--disable-gpu",
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--charset=utf-8",
        "--disable-application-cache",
        "--media-cache-size=0",
        "--disk-cache-size=0",
        "--log-level=3",
        "--silent",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}
