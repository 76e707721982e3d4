//! Web capturer: one JPEG screenshot of a remote page.
//!
//! ## Lifecycle
//!
//! [`BrowserRuntime`] is process-wide state owning a single headless Chrome.
//! It starts empty and launches the browser on the first valid capture, so a
//! request with a bad URL never starts anything. If the browser stops
//! answering (crash, idle cut-off) it is relaunched on the next capture.
//! [`BrowserRuntime::shutdown`] closes it when the server stops.
//!
//! Requests never touch the shared browser directly. Each capture opens its
//! own incognito browser context and tab; a guard disposes the context (which
//! closes its tab) when the capture ends, successful or not.

use crate::config::{ConversionConfig, VIEWPORT_HEIGHT, VIEWPORT_WIDTH};
use crate::error::DocshotError;
use crate::pipeline::encode::is_jpeg;
use crate::pipeline::PageCapturer;
use async_trait::async_trait;
use bytes::Bytes;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::protocol::cdp::Target;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Extra time allowed on top of the navigation budget for opening the
/// context and encoding the screenshot.
const CAPTURE_GRACE: Duration = Duration::from_secs(10);

/// A validated screenshot target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotRequest {
    url: Url,
}

impl ScreenshotRequest {
    /// Validate a client-supplied URL: absolute, `http`/`https`, with a host.
    pub fn parse(raw: &str) -> Result<Self, DocshotError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DocshotError::MissingUrl);
        }

        let url = Url::parse(raw).map_err(|e| DocshotError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(DocshotError::InvalidUrlScheme {
                    scheme: other.to_string(),
                })
            }
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(DocshotError::InvalidUrl {
                url: raw.to_string(),
                reason: "URL has no host".into(),
            });
        }

        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Viewport the page is rendered at.
    pub fn viewport(&self) -> (u32, u32) {
        (VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
    }
}

#[derive(Debug, Clone)]
struct BrowserOptions {
    chrome_path: Option<PathBuf>,
    idle_timeout: Duration,
    navigation_timeout: Duration,
    jpeg_quality: u8,
}

/// Shared headless browser, launched lazily.
pub struct BrowserRuntime {
    options: BrowserOptions,
    browser: Mutex<Option<Arc<Browser>>>,
}

impl BrowserRuntime {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            options: BrowserOptions {
                chrome_path: config.chrome_path.clone(),
                idle_timeout: Duration::from_secs(config.browser_idle_timeout_secs),
                navigation_timeout: config.navigation_timeout(),
                jpeg_quality: config.jpeg_quality,
            },
            browser: Mutex::new(None),
        }
    }

    /// Whether a browser process is currently held.
    pub async fn is_launched(&self) -> bool {
        self.browser.lock().await.is_some()
    }

    /// Return the running browser, launching or relaunching it as needed.
    async fn acquire(&self) -> Result<Arc<Browser>, DocshotError> {
        let mut slot = self.browser.lock().await;

        if let Some(browser) = slot.as_ref() {
            let handle = Arc::clone(browser);
            let alive = tokio::task::spawn_blocking(move || handle.get_version().is_ok())
                .await
                .unwrap_or(false);
            if alive {
                return Ok(Arc::clone(browser));
            }
            warn!("Headless browser stopped responding; relaunching");
            *slot = None;
        }

        let options = self.options.clone();
        let browser = tokio::task::spawn_blocking(move || launch_browser(&options))
            .await
            .map_err(|e| DocshotError::Internal(format!("Browser launch task panicked: {e}")))??;
        let browser = Arc::new(browser);
        *slot = Some(Arc::clone(&browser));
        Ok(browser)
    }

    /// Tabs the running browser currently tracks, or `None` before launch.
    pub async fn open_tabs(&self) -> Option<usize> {
        let slot = self.browser.lock().await;
        let browser = slot.as_ref()?;
        let tabs = browser.get_tabs().lock().ok()?;
        Some(tabs.len())
    }

    /// Close the browser, if one was launched.
    pub async fn shutdown(&self) {
        if let Some(browser) = self.browser.lock().await.take() {
            // Dropping the last handle kills the process; that may block briefly.
            let _ = tokio::task::spawn_blocking(move || drop(browser)).await;
            info!("Headless browser shut down");
        }
    }
}

impl std::fmt::Debug for BrowserRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserRuntime")
            .field("options", &self.options)
            .finish()
    }
}

#[async_trait]
impl PageCapturer for BrowserRuntime {
    async fn capture(&self, request: &ScreenshotRequest) -> Result<Bytes, DocshotError> {
        let browser = self.acquire().await?;
        let url = request.url().to_string();
        let navigation_timeout = self.options.navigation_timeout;
        let quality = self.options.jpeg_quality;

        let task_url = url.clone();
        let task = tokio::task::spawn_blocking(move || {
            capture_blocking(&browser, &task_url, navigation_timeout, quality)
        });

        match tokio::time::timeout(navigation_timeout + CAPTURE_GRACE, task).await {
            Ok(joined) => joined
                .map_err(|e| DocshotError::Internal(format!("Capture task panicked: {e}")))?,
            Err(_) => Err(DocshotError::NavigationFailed {
                url,
                detail: format!("timed out after {}s", navigation_timeout.as_secs()),
            }),
        }
    }
}

fn launch_browser(options: &BrowserOptions) -> Result<Browser, DocshotError> {
    let launch = LaunchOptions {
        headless: true,
        sandbox: false,
        window_size: Some((VIEWPORT_WIDTH, VIEWPORT_HEIGHT)),
        path: options.chrome_path.clone(),
        idle_browser_timeout: options.idle_timeout,
        ..Default::default()
    };
    let browser =
        Browser::new(launch).map_err(|e| DocshotError::BrowserLaunchFailed(format!("{e:#}")))?;
    info!(path = ?options.chrome_path, "Launched headless browser");
    Ok(browser)
}

/// Disposes the incognito context, and with it the capture tab, on drop.
struct ContextGuard<'a> {
    browser: &'a Browser,
    context_id: String,
    tab: Option<Arc<Tab>>,
}

impl ContextGuard<'_> {
    /// Tab to send browser-level commands through: our own if it opened,
    /// otherwise any tab the browser still has.
    fn command_tab(&self) -> Option<Arc<Tab>> {
        if let Some(tab) = &self.tab {
            return Some(Arc::clone(tab));
        }
        let tabs = self.browser.get_tabs().lock().ok()?;
        tabs.first().cloned()
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let dispose = Target::DisposeBrowserContext {
            browser_context_id: self.context_id.clone(),
        };
        let disposed = match self.command_tab() {
            Some(tab) => match tab.call_method(dispose) {
                Ok(_) => true,
                Err(e) => {
                    warn!(context = %self.context_id, error = %e, "Disposing browser context failed");
                    false
                }
            },
            None => {
                warn!(context = %self.context_id, "No tab left to dispose browser context through");
                false
            }
        };

        if !disposed {
            if let Some(tab) = self.tab.take() {
                if let Err(e) = tab.close(false) {
                    debug!(error = %e, "Closing screenshot tab failed");
                }
            }
        }
    }
}

fn capture_blocking(
    browser: &Browser,
    url: &str,
    navigation_timeout: Duration,
    quality: u8,
) -> Result<Bytes, DocshotError> {
    let start = Instant::now();
    let context = browser
        .new_context()
        .map_err(|e| DocshotError::Internal(format!("Could not open browser context: {e:#}")))?;
    let mut guard = ContextGuard {
        browser,
        context_id: context.get_id().to_string(),
        tab: None,
    };

    let tab = context
        .new_tab()
        .map_err(|e| DocshotError::Internal(format!("Could not open browser tab: {e:#}")))?;
    guard.tab = Some(Arc::clone(&tab));

    tab.set_default_timeout(navigation_timeout);
    tab.navigate_to(url)
        .and_then(|tab| tab.wait_until_navigated())
        .map_err(|e| navigation_failed(url, e))?;

    let data = tab
        .capture_screenshot(
            CaptureScreenshotFormatOption::Jpeg,
            Some(u32::from(quality)),
            None,
            true,
        )
        .map_err(|e| navigation_failed(url, e))?;

    if data.is_empty() || !is_jpeg(&data) {
        return Err(DocshotError::NavigationFailed {
            url: url.to_string(),
            detail: "browser returned an empty or non-JPEG screenshot".into(),
        });
    }

    info!(
        url,
        bytes = data.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Captured screenshot"
    );
    drop(guard);
    Ok(Bytes::from(data))
}

fn navigation_failed(url: &str, e: impl std::fmt::Display) -> DocshotError {
    DocshotError::NavigationFailed {
        url: url.to_string(),
        detail: format!("{e:#}"),
    }
}
