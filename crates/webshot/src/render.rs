//! Render orchestration
//!
//! Resolves the per-URL browser behaviour, drives the render backend under a
//! deadline and turns whatever it returned into a normalized image.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::backend::{RenderBackend, RenderRequest};
use crate::config::PreviewConfig;
use crate::error::{PreviewError, PreviewResult};
use crate::hostlist::{HostLists, HostPolicy};
use crate::normalize::{ImageNormalizer, PLAUSIBLE_SIZE};

/// Wait after navigation; doubled when scripts run.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

pub struct RenderOrchestrator {
    backend: Arc<dyn RenderBackend>,
    host_lists: Arc<HostLists>,
}

impl RenderOrchestrator {
    pub fn new(backend: Arc<dyn RenderBackend>, host_lists: Arc<HostLists>) -> Self {
        Self {
            backend,
            host_lists,
        }
    }

    pub fn backend(&self) -> &Arc<dyn RenderBackend> {
        &self.backend
    }

    /// Whether scripts run for `url`: the global setting, flipped when the
    /// host is on the matching exception list.
    pub async fn javascript_for(&self, config: &PreviewConfig, url: &str) -> bool {
        if config.javascript() {
            !self
                .host_lists
                .query(url, HostPolicy::AvoidJavaScript)
                .await
        } else {
            self.host_lists
                .query(url, HostPolicy::NeedJavaScript)
                .await
        }
    }

    pub fn settle_delay(javascript: bool) -> Duration {
        if javascript {
            SETTLE_DELAY * 2
        } else {
            SETTLE_DELAY
        }
    }

    /// The backend request for `url` under `config`, due by `deadline`.
    pub async fn build_request(
        &self,
        config: &PreviewConfig,
        url: &str,
        deadline: Instant,
    ) -> RenderRequest {
        let javascript = self.javascript_for(config, url).await;
        RenderRequest {
            url: url.to_string(),
            width: config.width(),
            height: config.height(),
            scale: config.scale(),
            mobile: config.mobile(),
            cookies: config.cookies(),
            ignore_cert_errors: !config.cert_errors(),
            scrollbars: config.scrollbars(),
            javascript,
            user_agent: config.user_agent().to_string(),
            platform: config.platform().to_string(),
            settle_delay: Self::settle_delay(javascript),
            format: config.image_kind(),
            quality: config.quality(),
            full_viewport: true,
            timeout: deadline.saturating_duration_since(Instant::now()),
        }
    }

    /// Render `url` and return the normalized image.
    ///
    /// The backend call is aborted at `deadline`. A panicking backend is
    /// reported as [`PreviewError::BackendFault`]; bytes it produced before
    /// failing are still normalized and returned when the result is larger
    /// than [`PLAUSIBLE_SIZE`].
    pub async fn render(
        &self,
        config: &PreviewConfig,
        url: &str,
        deadline: Instant,
    ) -> PreviewResult<Vec<u8>> {
        let request = self.build_request(config, url, deadline).await;
        debug!(
            "Rendering {} via {} (javascript: {}, settle: {:?})",
            url,
            self.backend.backend_name(),
            request.javascript,
            request.settle_delay
        );

        let mut raw = Vec::new();
        let outcome = {
            let capture = AssertUnwindSafe(self.backend.capture(&request, &mut raw)).catch_unwind();
            match tokio::time::timeout_at(deadline, capture).await {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => {
                    let message = panic_message(panic.as_ref());
                    error!("Render backend panicked for {}: {}", url, message);
                    Err(PreviewError::BackendFault {
                        url: url.to_string(),
                        message,
                    })
                }
                Err(_) => {
                    warn!("Rendering {} exceeded {:?}", url, config.max_duration());
                    return Err(PreviewError::Timeout {
                        url: url.to_string(),
                        after: config.max_duration(),
                    });
                }
            }
        };

        if raw.is_empty() {
            return match outcome {
                Ok(()) => Err(PreviewError::NoData(url.to_string())),
                Err(e) => Err(e),
            };
        }
        if let Err(e) = &outcome {
            warn!(
                "Render of {} failed after {} bytes, trying to salvage them: {}",
                url,
                raw.len(),
                e
            );
        }

        let image = ImageNormalizer::from_config(config).normalize(&raw);
        if image.len() > PLAUSIBLE_SIZE {
            return Ok(image);
        }

        debug!("Rendered image of {} only {} bytes", url, image.len());
        match outcome {
            Ok(()) => Err(PreviewError::NoData(url.to_string())),
            Err(e) => Err(e),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hostlist::HostList;
    use std::io::Write;

    struct NullBackend;

    #[async_trait::async_trait]
    impl RenderBackend for NullBackend {
        async fn capture(&self, _: &RenderRequest, _: &mut Vec<u8>) -> PreviewResult<()> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "null"
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    fn orchestrator(avoid: &[&str], need: &[&str]) -> (RenderOrchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let write_list = |name: &str, entries: &[&str]| {
            let path = dir.path().join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            for entry in entries {
                writeln!(file, "{}", entry).unwrap();
            }
            path
        };
        let lists = HostLists::new(
            HostList::new(write_list("avoid.lst", avoid), Duration::from_secs(60)),
            HostList::new(write_list("need.lst", need), Duration::from_secs(60)),
        );
        (
            RenderOrchestrator::new(Arc::new(NullBackend), Arc::new(lists)),
            dir,
        )
    }

    #[tokio::test]
    async fn test_javascript_override_by_host_lists() {
        let (orchestrator, _dir) = orchestrator(&["ads.example.com"], &["app.example.org"]);
        let mut config = PreviewConfig::default();

        config.set_javascript(true);
        assert!(
            !orchestrator
                .javascript_for(&config, "https://ads.example.com/x")
                .await
        );
        assert!(
            orchestrator
                .javascript_for(&config, "https://www.example.com/")
                .await
        );

        config.set_javascript(false);
        assert!(
            orchestrator
                .javascript_for(&config, "https://my.app.example.org/")
                .await
        );
        assert!(
            !orchestrator
                .javascript_for(&config, "https://www.example.com/")
                .await
        );
    }

    #[tokio::test]
    async fn test_build_request_carries_config() {
        let (orchestrator, _dir) = orchestrator(&[], &["needs-js.test"]);
        let mut config = PreviewConfig::default();
        config.set_width(1280);
        config.set_height(0);
        config.set_quality(70);
        config.set_mobile(true);
        config.set_cert_errors(true);

        let deadline = Instant::now() + Duration::from_secs(10);
        let request = orchestrator
            .build_request(&config, "https://needs-js.test/page", deadline)
            .await;
        assert_eq!(request.width, 1280);
        assert_eq!(request.height, 0);
        assert!(request.mobile);
        assert!(!request.ignore_cert_errors);
        assert!(request.javascript);
        assert_eq!(request.settle_delay, SETTLE_DELAY * 2);
        assert_eq!(request.format, crate::naming::ImageKind::Jpeg);
        assert_eq!(request.quality, 70);
        assert!(request.full_viewport);
        assert!(request.timeout > Duration::from_secs(9));
        assert!(request.timeout <= Duration::from_secs(10));

        let request = orchestrator
            .build_request(&config, "https://static.test/", deadline)
            .await;
        assert!(!request.javascript);
        assert_eq!(request.settle_delay, SETTLE_DELAY);

        let request = orchestrator
            .build_request(&config, "https://static.test/", Instant::now())
            .await;
        assert_eq!(request.timeout, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_empty_capture_is_no_data() {
        let (orchestrator, _dir) = orchestrator(&[], &[]);
        let config = PreviewConfig::default();
        let result = orchestrator
            .render(
                &config,
                "https://example.com/",
                Instant::now() + Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(PreviewError::NoData(_))));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
