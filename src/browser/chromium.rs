//! Chromium backend over the DevTools protocol
//!
//! A context is logical: chromiumoxide pages share one browser profile, so the
//! context's viewport and user agent are applied to every page it opens.

use crate::browser::{
    Browser, BrowserContext, BrowserError, BrowserLauncher, BrowserResult, ContextSettings,
    LaunchOptions, Page, Viewport,
};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Main-document status from the Navigation Timing API (0 or undefined when unknown)
const NAVIGATION_STATUS_SCRIPT: &str = r"(() => {
    const entry = performance.getEntriesByType('navigation')[0];
    return entry && entry.responseStatus ? entry.responseStatus : null;
})()";

/// Launches a local Chromium through chromiumoxide
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &LaunchOptions) -> BrowserResult<Box<dyn Browser>> {
        let mut builder = CdpConfig::builder().request_timeout(options.request_timeout);

        builder = if options.headless {
            builder.headless_mode(HeadlessMode::New)
        } else {
            builder.with_head()
        };

        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }

        for arg in &options.args {
            builder = builder.arg(arg.clone());
        }

        let config = builder.build().map_err(BrowserError::Launch)?;
        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("Browser handler error: {}", e);
                }
            }
            tracing::debug!("Browser handler task completed");
        });

        tracing::info!("Chromium launched (headless: {})", options.headless);

        Ok(Box::new(ChromiumBrowser {
            browser: Arc::new(Mutex::new(browser)),
            handler: std::sync::Mutex::new(Some(handler_task)),
        }))
    }
}

struct ChromiumBrowser {
    browser: Arc<Mutex<CdpBrowser>>,
    handler: std::sync::Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn new_context(
        &self,
        settings: &ContextSettings,
    ) -> BrowserResult<Arc<dyn BrowserContext>> {
        Ok(Arc::new(ChromiumContext {
            browser: Arc::clone(&self.browser),
            settings: settings.clone(),
        }))
    }

    async fn close(&self) -> BrowserResult<()> {
        let result = {
            let mut browser = self.browser.lock().await;
            let closed = browser.close().await.map(|_| ());
            if let Err(e) = browser.wait().await {
                tracing::debug!("Failed to reap browser process: {}", e);
            }
            closed
        };

        if let Ok(mut handler) = self.handler.lock() {
            if let Some(task) = handler.take() {
                task.abort();
            }
        }

        result.map_err(|e| BrowserError::Close {
            what: "browser",
            message: e.to_string(),
        })
    }
}

struct ChromiumContext {
    browser: Arc<Mutex<CdpBrowser>>,
    settings: ContextSettings,
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn new_page(&self) -> BrowserResult<Box<dyn Page>> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::NewPage(e.to_string()))?
        };

        page.execute(SetUserAgentOverrideParams::new(self.settings.user_agent.clone()))
            .await
            .map_err(|e| BrowserError::NewPage(e.to_string()))?;

        let page = ChromiumPage {
            page,
            viewport: std::sync::Mutex::new(self.settings.viewport),
        };
        page.set_viewport(self.settings.viewport).await?;

        Ok(Box::new(page))
    }

    async fn close(&self) -> BrowserResult<()> {
        Ok(())
    }
}

struct ChromiumPage {
    page: chromiumoxide::Page,
    viewport: std::sync::Mutex<Viewport>,
}

#[async_trait]
impl Page for ChromiumPage {
    async fn goto(&self, url: &str) -> BrowserResult<Option<u16>> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = self.evaluate(NAVIGATION_STATUS_SCRIPT).await?;
        Ok(status
            .as_u64()
            .and_then(|s| u16::try_from(s).ok())
            .filter(|s| *s > 0))
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))?;

        // Scripts returning undefined carry no value
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn set_viewport(&self, viewport: Viewport) -> BrowserResult<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(viewport.width))
            .height(i64::from(viewport.height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(BrowserError::Viewport)?;

        self.page
            .execute(params)
            .await
            .map_err(|e| BrowserError::Viewport(e.to_string()))?;

        if let Ok(mut current) = self.viewport.lock() {
            *current = viewport;
        }
        Ok(())
    }

    fn viewport(&self) -> Viewport {
        match self.viewport.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        let params = CaptureScreenshotParams {
            format: Some(CaptureScreenshotFormat::Png),
            ..Default::default()
        };

        self.page
            .screenshot(params)
            .await
            .map_err(|e| BrowserError::Screenshot(e.to_string()))
    }

    async fn content(&self) -> BrowserResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::Content(e.to_string()))
    }

    async fn close(&self) -> BrowserResult<()> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| BrowserError::Close {
                what: "page",
                message: e.to_string(),
            })
    }
}
