//! Scripted in-memory browser shared by the unit and integration tests
//!
//! Written against `sumi_harvest::` paths so the integration crate can pull
//! the same file in with `#[path]`.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_harvest::browser::{
    Browser, BrowserContext, BrowserError, BrowserLauncher, BrowserResult, ContextSettings,
    LaunchOptions, Page, Viewport,
};

/// How every page of a fake context behaves
#[derive(Debug, Clone)]
pub(crate) struct FakeBehavior {
    pub status: Option<u16>,
    pub navigation_delay: Duration,
    /// URLs containing this text take 30s to load
    pub hang_on: Option<String>,
    pub fail_navigation: bool,
    pub fail_content: bool,
    pub fail_close: bool,
    pub scroll_height: u32,
    /// Served by `content()`; `{url}` is replaced by the navigated URL
    pub html: String,
    /// Served by `content()` while bounding-box tags are applied
    pub marked_html: String,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            status: Some(200),
            navigation_delay: Duration::ZERO,
            hang_on: None,
            fail_navigation: false,
            fail_content: false,
            fail_close: false,
            scroll_height: 3000,
            html: "<html><body><p>hello</p></body></html>".to_string(),
            marked_html: r#"<html><body __bbox__="(0,0,40,20)"><p __bbox__="(5,5,30,15)">hello</p></body></html>"#
                .to_string(),
        }
    }
}

/// What the fake browser observed
#[derive(Debug, Default)]
pub(crate) struct FakeRecorder {
    pub launched: AtomicUsize,
    pub browser_closed: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub open_now: AtomicUsize,
    pub max_open: AtomicUsize,
    pub marked: AtomicBool,
    pub scripts: Mutex<Vec<String>>,
    pub viewports: Mutex<Vec<Viewport>>,
}

impl FakeRecorder {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Launches fake browsers that all report to one recorder
#[derive(Default)]
pub(crate) struct FakeLauncher {
    pub behavior: FakeBehavior,
    pub recorder: Arc<FakeRecorder>,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> BrowserResult<Box<dyn Browser>> {
        self.recorder.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeBrowser {
            behavior: self.behavior.clone(),
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

struct FakeBrowser {
    behavior: FakeBehavior,
    recorder: Arc<FakeRecorder>,
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_context(
        &self,
        settings: &ContextSettings,
    ) -> BrowserResult<Arc<dyn BrowserContext>> {
        Ok(Arc::new(FakeContext {
            behavior: self.behavior.clone(),
            viewport: settings.viewport,
            recorder: Arc::clone(&self.recorder),
        }))
    }

    async fn close(&self) -> BrowserResult<()> {
        self.recorder.browser_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct FakeContext {
    behavior: FakeBehavior,
    viewport: Viewport,
    recorder: Arc<FakeRecorder>,
}

impl FakeContext {
    /// A standalone context with a 40x20 viewport
    pub fn new(behavior: FakeBehavior) -> (Arc<Self>, Arc<FakeRecorder>) {
        let recorder = Arc::new(FakeRecorder::default());
        let context = Arc::new(Self {
            behavior,
            viewport: Viewport {
                width: 40,
                height: 20,
            },
            recorder: Arc::clone(&recorder),
        });
        (context, recorder)
    }
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn new_page(&self) -> BrowserResult<Box<dyn Page>> {
        self.recorder.opened.fetch_add(1, Ordering::SeqCst);
        let open = self.recorder.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder.max_open.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(FakePage {
            behavior: self.behavior.clone(),
            viewport: Mutex::new(self.viewport),
            url: Mutex::new(String::new()),
            recorder: Arc::clone(&self.recorder),
        }))
    }

    async fn close(&self) -> BrowserResult<()> {
        Ok(())
    }
}

pub(crate) struct FakePage {
    behavior: FakeBehavior,
    viewport: Mutex<Viewport>,
    url: Mutex<String>,
    recorder: Arc<FakeRecorder>,
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str) -> BrowserResult<Option<u16>> {
        if let Some(marker) = &self.behavior.hang_on {
            if url.contains(marker.as_str()) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        }
        tokio::time::sleep(self.behavior.navigation_delay).await;
        if self.behavior.fail_navigation {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        *self.url.lock().unwrap() = url.to_string();
        Ok(self.behavior.status)
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value> {
        self.recorder.scripts.lock().unwrap().push(script.to_string());

        if script.contains("removeAttribute") {
            self.recorder.marked.store(false, Ordering::SeqCst);
        } else if script.contains("setAttribute") {
            self.recorder.marked.store(true, Ordering::SeqCst);
            return Ok(serde_json::json!(2));
        } else if script.contains("scrollHeight") {
            return Ok(serde_json::json!(self.behavior.scroll_height));
        }
        Ok(serde_json::Value::Null)
    }

    async fn set_viewport(&self, viewport: Viewport) -> BrowserResult<()> {
        *self.viewport.lock().unwrap() = viewport;
        self.recorder.viewports.lock().unwrap().push(viewport);
        Ok(())
    }

    fn viewport(&self) -> Viewport {
        *self.viewport.lock().unwrap()
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        let viewport = self.viewport();
        Ok(png(viewport.width.min(64), viewport.height.min(64)))
    }

    async fn content(&self) -> BrowserResult<String> {
        if self.behavior.fail_content {
            return Err(BrowserError::Content("target closed".to_string()));
        }
        let html = if self.recorder.marked.load(Ordering::SeqCst) {
            &self.behavior.marked_html
        } else {
            &self.behavior.html
        };
        Ok(html.replace("{url}", &self.url.lock().unwrap()))
    }

    async fn close(&self) -> BrowserResult<()> {
        self.recorder.closed.fetch_add(1, Ordering::SeqCst);
        self.recorder.open_now.fetch_sub(1, Ordering::SeqCst);
        if self.behavior.fail_close {
            return Err(BrowserError::Close {
                what: "page",
                message: "already detached".to_string(),
            });
        }
        Ok(())
    }
}

/// A white PNG of the given size
pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}
