//! Browser session: obtain the script-rendered markup of a document page.
//!
//! The viewer only writes its metadata and page images into the DOM after
//! its JavaScript has run, so a plain HTTP GET of the document URL is not
//! enough. [`ChromeSession`] drives a headless Chromium over CDP via
//! `chromiumoxide`; the orchestrator only sees the [`MarkupSource`] trait,
//! which keeps the polling logic testable without a browser.

use crate::config::DownloadConfig;
use crate::error::FlipbookError;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Something that can load a URL and report its current rendered markup.
pub trait MarkupSource: Send {
    /// Load `url`. Called once per session.
    fn navigate(&mut self, url: &str) -> impl Future<Output = Result<(), FlipbookError>> + Send;

    /// The markup as currently rendered (re-read on every poll).
    fn markup(&mut self) -> impl Future<Output = Result<String, FlipbookError>> + Send;

    /// Terminate the session and release its resources.
    fn close(self) -> impl Future<Output = Result<(), FlipbookError>> + Send;
}

/// A headless Chromium session with one open tab.
pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Option<Page>,
    url: String,
    navigation_timeout: Duration,
}

impl ChromeSession {
    /// Start the browser. Navigation happens in [`MarkupSource::navigate`].
    pub async fn launch(config: &DownloadConfig) -> Result<Self, FlipbookError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-notifications")
            .request_timeout(Duration::from_secs(config.navigation_timeout_secs));
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(ref exe) = config.chrome_executable {
            builder = builder.chrome_executable(exe);
        }
        let browser_config = builder.build().map_err(FlipbookError::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| FlipbookError::BrowserLaunch(e.to_string()))?;

        // The CDP connection only makes progress while its handler is polled.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });

        debug!("Browser launched");
        Ok(Self {
            browser,
            handler,
            page: None,
            url: String::new(),
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
        })
    }
}

impl MarkupSource for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), FlipbookError> {
        info!("Opening {} in headless browser", url);
        self.url = url.to_string();

        let page = tokio::time::timeout(self.navigation_timeout, self.browser.new_page(url))
            .await
            .map_err(|_| FlipbookError::Navigation {
                url: url.to_string(),
                reason: format!("timed out after {}s", self.navigation_timeout.as_secs()),
            })?
            .map_err(|e| FlipbookError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        self.page = Some(page);
        Ok(())
    }

    async fn markup(&mut self) -> Result<String, FlipbookError> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| FlipbookError::Internal("markup requested before navigation".into()))?;
        page.content()
            .await
            .map_err(|e| FlipbookError::MarkupUnavailable {
                url: self.url.clone(),
                reason: e.to_string(),
            })
    }

    async fn close(mut self) -> Result<(), FlipbookError> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Failed to close tab for {}: {}", self.url, e);
            }
        }
        let closed = self.browser.close().await;
        if closed.is_ok() {
            if let Err(e) = self.browser.wait().await {
                warn!("Failed to wait for browser process to exit: {}", e);
            }
        }
        self.handler.abort();
        debug!("Browser session closed");
        closed
            .map(|_| ())
            .map_err(|e| FlipbookError::Internal(format!("Failed to close browser: {e}")))
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
