//! Local Render Backend using Headless Chrome

use async_trait::async_trait;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::{Emulation, Page, Security};
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::backend::{RenderBackend, RenderRequest};
use crate::error::{PreviewError, PreviewResult};
use crate::naming::ImageKind;

/// Render backend driving headless Chrome through the DevTools protocol
pub struct LocalRenderBackend {
    /// DevTools websocket of an already running browser; `None` launches one
    browser_ws: Option<String>,
    /// Idle timeout of a launched browser
    idle_timeout: Duration,
}

impl LocalRenderBackend {
    /// Create a backend that launches its own Chrome for every capture
    pub fn new() -> Self {
        Self {
            browser_ws: None,
            idle_timeout: Duration::from_secs(60),
        }
    }

    /// Create a backend that attaches to a running browser, e.g. a headless
    /// Chrome service, through its DevTools websocket URL
    pub fn connect(ws_url: impl Into<String>) -> Self {
        Self {
            browser_ws: Some(ws_url.into()),
            idle_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

impl Default for LocalRenderBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Closes the tab on every exit path
struct TabSession(Arc<Tab>);

impl Drop for TabSession {
    fn drop(&mut self) {
        if let Err(e) = self.0.close(false) {
            debug!("Failed to close tab: {}", e);
        }
    }
}

fn chrome_error<E: Display>(what: &'static str) -> impl FnOnce(E) -> PreviewError {
    move |e| {
        error!("{}: {}", what, e);
        PreviewError::Chrome(format!("{}: {}", what, e))
    }
}

/// Extra launch flags for a browser we start ourselves. Each tab gets the
/// viewport through a device-metrics override as well.
fn launch_args(request: &RenderRequest) -> Vec<String> {
    let mut args = Vec::new();
    if request.scale > 0.0 {
        args.push(format!("--force-device-scale-factor={}", request.scale));
    }
    if request.mobile {
        args.push("--touch-events=enabled".to_string());
        args.push("--enable-viewport".to_string());
    }
    if !request.scrollbars {
        args.push("--hide-scrollbars".to_string());
    }
    args
}

fn open_browser(
    browser_ws: Option<&str>,
    idle_timeout: Duration,
    request: &RenderRequest,
) -> PreviewResult<Browser> {
    if let Some(ws_url) = browser_ws {
        debug!("Connecting to browser at {}", ws_url);
        return Browser::connect(ws_url.to_string()).map_err(|e| {
            error!("Failed to connect to browser at {}: {}", ws_url, e);
            PreviewError::Network(format!("Failed to connect to browser: {}", e))
        });
    }

    let args = launch_args(request);
    let window_size = (request.width > 0 && request.height > 0)
        .then_some((request.width, request.height));
    let options = LaunchOptions::default_builder()
        .headless(true) // Must be headless for server environments
        .sandbox(false) // Disable sandbox for Docker compatibility
        .idle_browser_timeout(idle_timeout)
        .window_size(window_size)
        .ignore_certificate_errors(request.ignore_cert_errors)
        .args(args.iter().map(OsStr::new).collect())
        .build()
        .map_err(|e| {
            error!("Failed to build launch options: {}", e);
            PreviewError::Chrome(format!("Failed to build options: {}", e))
        })?;

    Browser::new(options).map_err(chrome_error("Failed to launch browser"))
}

/// Wall-clock budget of one blocking capture
struct Budget<'a> {
    deadline: Instant,
    total: Duration,
    url: &'a str,
}

impl<'a> Budget<'a> {
    fn new(request: &'a RenderRequest) -> Self {
        Self {
            deadline: Instant::now() + request.timeout,
            total: request.timeout,
            url: &request.url,
        }
    }

    /// Time left, or a timeout error once it is spent.
    fn remaining(&self) -> PreviewResult<Duration> {
        let left = self.deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            debug!("Capture of {} ran out of time", self.url);
            return Err(PreviewError::Timeout {
                url: self.url.to_string(),
                after: self.total,
            });
        }
        Ok(left)
    }
}

fn capture_blocking(
    browser_ws: Option<&str>,
    idle_timeout: Duration,
    request: &RenderRequest,
) -> PreviewResult<Vec<u8>> {
    let budget = Budget::new(request);
    budget.remaining()?;

    // Dropping a launched browser kills its process.
    let browser = open_browser(browser_ws, idle_timeout, request)?;
    debug!("Browser ready");
    budget.remaining()?;

    let session = TabSession(browser.new_tab().map_err(chrome_error("Failed to create tab"))?);
    let tab = &session.0;
    tab.set_default_timeout(budget.remaining()?);

    tab.call_method(Emulation::SetDeviceMetricsOverride {
        width: request.width,
        height: request.height,
        device_scale_factor: request.scale,
        mobile: request.mobile,
        scale: None,
        screen_width: None,
        screen_height: None,
        position_x: None,
        position_y: None,
        dont_set_visible_size: None,
        screen_orientation: None,
        viewport: None,
        display_feature: None,
        device_posture: None,
    })
    .map_err(chrome_error("Failed to set viewport"))?;
    tab.call_method(Emulation::SetScriptExecutionDisabled {
        value: !request.javascript,
    })
    .map_err(chrome_error("Failed to toggle JavaScript"))?;
    tab.call_method(Emulation::SetDocumentCookieDisabled {
        disabled: !request.cookies,
    })
    .map_err(chrome_error("Failed to toggle cookies"))?;
    tab.call_method(Emulation::SetScrollbarsHidden {
        hidden: !request.scrollbars,
    })
    .map_err(chrome_error("Failed to toggle scrollbars"))?;
    tab.call_method(Security::SetIgnoreCertificateErrors {
        ignore: request.ignore_cert_errors,
    })
    .map_err(chrome_error("Failed to set certificate handling"))?;

    let user_agent = (!request.user_agent.is_empty()).then_some(request.user_agent.as_str());
    if let Some(user_agent) = user_agent {
        let platform = (!request.platform.is_empty()).then_some(request.platform.as_str());
        tab.set_user_agent(user_agent, None, platform)
            .map_err(chrome_error("Failed to set user agent"))?;
    }

    tab.set_default_timeout(budget.remaining()?);
    tab.navigate_to(&request.url)
        .and_then(|tab| tab.wait_until_navigated())
        .map_err(|e| {
            error!("Failed to navigate to {}: {}", request.url, e);
            PreviewError::Network(format!("Failed to navigate to {}: {}", request.url, e))
        })?;

    std::thread::sleep(request.settle_delay.min(budget.remaining()?));
    tab.set_default_timeout(budget.remaining()?);

    let (format, quality) = match request.format {
        ImageKind::Png => (Page::CaptureScreenshotFormatOption::Png, None),
        ImageKind::Jpeg => (
            Page::CaptureScreenshotFormatOption::Jpeg,
            Some(u32::from(request.quality)),
        ),
    };
    let data = tab
        .capture_screenshot(format, quality, None, true)
        .map_err(chrome_error("Screenshot capture failed"))?;

    info!(
        "Captured screenshot of {} ({} bytes)",
        request.url,
        data.len()
    );
    Ok(data)
}

#[async_trait]
impl RenderBackend for LocalRenderBackend {
    async fn capture(&self, request: &RenderRequest, out: &mut Vec<u8>) -> PreviewResult<()> {
        debug!(
            "Capturing screenshot of {} using headless Chrome",
            request.url
        );

        if url::Url::parse(&request.url).is_err() {
            return Err(PreviewError::InvalidUrl(request.url.clone()));
        }
        Budget::new(request).remaining()?;

        // headless_chrome is sync, run it on the blocking pool
        let data = tokio::task::spawn_blocking({
            let browser_ws = self.browser_ws.clone();
            let idle_timeout = self.idle_timeout;
            let request = request.clone();
            move || capture_blocking(browser_ws.as_deref(), idle_timeout, &request)
        })
        .await
        .map_err(|e| {
            error!("Screenshot task failed: {}", e);
            if e.is_panic() {
                PreviewError::BackendFault {
                    url: request.url.clone(),
                    message: format!("capture task panicked: {}", e),
                }
            } else {
                PreviewError::Chrome(format!("Task execution failed: {}", e))
            }
        })??;

        out.extend_from_slice(&data);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "local-headless-chrome"
    }

    async fn is_available(&self) -> bool {
        let browser_ws = self.browser_ws.clone();
        tokio::task::spawn_blocking(move || match browser_ws {
            Some(ws_url) => Browser::connect(ws_url).is_ok(),
            None => LaunchOptions::default_builder()
                .headless(true)
                .sandbox(false)
                .idle_browser_timeout(Duration::from_secs(5))
                .build()
                .map(|options| Browser::new(options).is_ok())
                .unwrap_or(false),
        })
        .await
        .unwrap_or(false)
    }
}
