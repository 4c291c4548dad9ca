//! Capture session: the page-level protocol
//!
//! `navigating -> stabilizing -> annotating -> extracting -> done | failed`
//!
//! A navigation error or timeout fails the capture immediately; retrying is
//! left to re-dispatch. When bounding boxes are requested every element is
//! tagged right before the HTML is serialized and untagged right after, on
//! every exit path.

use crate::browser::{BrowserError, Page, Viewport};
use crate::config::{BrowserConfig, WorkerConfig};
use crate::worker::annotate;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

const SCROLL_HEIGHT_SCRIPT: &str = r"(() => Math.max(
    document.body ? document.body.scrollHeight : 0,
    document.documentElement ? document.documentElement.scrollHeight : 0
))()";

const NOTIFY_RESIZE_SCRIPT: &str = r"(() => {
    window.dispatchEvent(new Event('scroll'));
    window.dispatchEvent(new Event('resize'));
})()";

const MARK_BOXES_SCRIPT: &str = r"(() => {
    let marked = 0;
    for (const el of document.querySelectorAll('*')) {
        const r = el.getBoundingClientRect();
        const left = Math.round(r.left + window.scrollX);
        const top = Math.round(r.top + window.scrollY);
        const right = Math.round(r.right + window.scrollX);
        const bottom = Math.round(r.bottom + window.scrollY);
        if (left === 0 && top === 0 && right === 0 && bottom === 0) continue;
        el.setAttribute('__bbox__', `(${left},${top},${right},${bottom})`);
        marked += 1;
    }
    return marked;
})()";

const ERASE_BOXES_SCRIPT: &str = r"(() => {
    for (const el of document.querySelectorAll('[__bbox__], [__tbox__]')) {
        el.removeAttribute('__bbox__');
        el.removeAttribute('__tbox__');
    }
})()";

/// Stage of the capture protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Navigating,
    Stabilizing,
    Annotating,
    Extracting,
}

impl fmt::Display for CaptureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureStage::Navigating => "navigating",
            CaptureStage::Stabilizing => "stabilizing",
            CaptureStage::Annotating => "annotating",
            CaptureStage::Extracting => "extracting",
        };
        f.write_str(name)
    }
}

/// Why a capture failed
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Navigation to {url} timed out after {}s", timeout.as_secs())]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("{url} answered with HTTP {status}")]
    RejectedStatus { url: String, status: u16 },

    #[error("Capture failed while {stage}: {source}")]
    Browser {
        stage: CaptureStage,
        #[source]
        source: BrowserError,
    },
}

impl CaptureError {
    /// Stage at which the capture stopped
    pub fn stage(&self) -> CaptureStage {
        match self {
            CaptureError::NavigationTimeout { .. } | CaptureError::RejectedStatus { .. } => {
                CaptureStage::Navigating
            }
            CaptureError::Browser { stage, .. } => *stage,
        }
    }

    fn at(stage: CaptureStage) -> impl FnOnce(BrowserError) -> CaptureError {
        move |source| CaptureError::Browser { stage, source }
    }
}

/// The output of a successful capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedArtifact {
    pub url: String,
    pub html: String,
    /// PNG bytes
    pub screenshot: Vec<u8>,
    /// PNG bytes with the tagged bounding boxes drawn in red
    pub annotated_screenshot: Option<Vec<u8>>,
}

/// Knobs of the capture protocol
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub navigation_timeout: Duration,
    pub settle: Duration,
    pub max_page_height: u32,
    pub accepted_status: Vec<u16>,
    pub mark_bounding_boxes: bool,
    pub annotate_screenshot: bool,
}

impl CaptureOptions {
    pub fn from_config(worker: &WorkerConfig, browser: &BrowserConfig) -> Self {
        Self {
            navigation_timeout: Duration::from_secs(browser.navigation_timeout_secs),
            settle: Duration::from_millis(browser.settle_ms),
            max_page_height: browser.max_page_height,
            accepted_status: worker.accepted_status.clone(),
            mark_bounding_boxes: worker.mark_bounding_boxes,
            annotate_screenshot: worker.annotate_screenshot,
        }
    }
}

/// Captures one URL on an already open page
///
/// # Arguments
///
/// * `page` - A fresh page leased from the pool
/// * `url` - The URL to capture
/// * `options` - Timeouts, settle delay and annotation switches
///
/// # Returns
///
/// * `Ok(CapturedArtifact)` - Rendered HTML and screenshot
/// * `Err(CaptureError)` - The stage that failed and why
pub async fn capture(
    page: &dyn Page,
    url: &str,
    options: &CaptureOptions,
) -> Result<CapturedArtifact, CaptureError> {
    navigate(page, url, options).await?;
    stabilize(page, options).await?;

    let screenshot = page
        .screenshot()
        .await
        .map_err(CaptureError::at(CaptureStage::Extracting))?;

    let html = extract_html(page, options.mark_bounding_boxes).await?;

    let annotated_screenshot = if options.annotate_screenshot && options.mark_bounding_boxes {
        overlay(url, &screenshot, &html).await
    } else {
        None
    };

    Ok(CapturedArtifact {
        url: url.to_string(),
        html,
        screenshot,
        annotated_screenshot,
    })
}

/// Draws the tagged boxes on a copy of the screenshot
///
/// Decoding and encoding a full-page PNG runs on the blocking pool. Any
/// failure only drops the overlay.
async fn overlay(url: &str, screenshot: &[u8], html: &str) -> Option<Vec<u8>> {
    let (png, html) = (screenshot.to_vec(), html.to_string());
    let drawn = tokio::task::spawn_blocking(move || annotate::annotate_screenshot(&png, &html)).await;

    match drawn {
        Ok(Ok(annotated)) => Some(annotated),
        Ok(Err(e)) => {
            tracing::warn!("Dropping screenshot overlay for {}: {}", url, e);
            None
        }
        Err(e) => {
            tracing::warn!("Screenshot overlay for {} did not finish: {}", url, e);
            None
        }
    }
}

async fn navigate(page: &dyn Page, url: &str, options: &CaptureOptions) -> Result<(), CaptureError> {
    let status = tokio::time::timeout(options.navigation_timeout, page.goto(url))
        .await
        .map_err(|_| CaptureError::NavigationTimeout {
            url: url.to_string(),
            timeout: options.navigation_timeout,
        })?
        .map_err(CaptureError::at(CaptureStage::Navigating))?;

    match status {
        Some(status) if !options.accepted_status.contains(&status) => {
            Err(CaptureError::RejectedStatus {
                url: url.to_string(),
                status,
            })
        }
        Some(status) => {
            tracing::debug!("Loaded {} (HTTP {})", url, status);
            Ok(())
        }
        None => {
            tracing::debug!("Loaded {} (status unknown)", url);
            Ok(())
        }
    }
}

/// Lets dynamic content render, then grows the viewport to the content height
async fn stabilize(page: &dyn Page, options: &CaptureOptions) -> Result<(), CaptureError> {
    tokio::time::sleep(options.settle).await;

    let content_height = page
        .evaluate(SCROLL_HEIGHT_SCRIPT)
        .await
        .map_err(CaptureError::at(CaptureStage::Stabilizing))?
        .as_f64()
        .unwrap_or(0.0);

    let current = page.viewport();
    let height = if content_height >= 1.0 {
        (content_height as u32).min(options.max_page_height)
    } else {
        current.height
    };

    if height != current.height {
        page.set_viewport(Viewport {
            width: current.width,
            height,
        })
        .await
        .map_err(CaptureError::at(CaptureStage::Stabilizing))?;
        page.evaluate(NOTIFY_RESIZE_SCRIPT)
            .await
            .map_err(CaptureError::at(CaptureStage::Stabilizing))?;
    }

    tokio::time::sleep(options.settle).await;
    Ok(())
}

async fn extract_html(page: &dyn Page, mark_bounding_boxes: bool) -> Result<String, CaptureError> {
    if !mark_bounding_boxes {
        return page
            .content()
            .await
            .map_err(CaptureError::at(CaptureStage::Extracting));
    }

    let html = match page.evaluate(MARK_BOXES_SCRIPT).await {
        Ok(marked) => {
            tracing::trace!("Tagged {} elements with bounding boxes", marked);
            page.content()
                .await
                .map_err(CaptureError::at(CaptureStage::Extracting))
        }
        Err(e) => Err(CaptureError::Browser {
            stage: CaptureStage::Annotating,
            source: e,
        }),
    };

    if let Err(e) = page.evaluate(ERASE_BOXES_SCRIPT).await {
        tracing::warn!("Failed to remove bounding-box tags: {}", e);
    }

    html
}
