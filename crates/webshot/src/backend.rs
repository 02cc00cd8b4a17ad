//! Render Backend Trait
//!
//! Defines the interface for page rendering backends (local Chrome, remote
//! screenshot service, ...)

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::error::PreviewResult;
use crate::naming::ImageKind;

/// Everything a backend needs to render one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderRequest {
    /// Navigation target
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Device scale factor; `0` keeps the browser default
    pub scale: f64,
    pub mobile: bool,
    pub cookies: bool,
    pub ignore_cert_errors: bool,
    pub scrollbars: bool,
    pub javascript: bool,
    pub user_agent: String,
    pub platform: String,
    /// Wait after navigation before capturing
    #[serde(rename = "settle_delay_ms", serialize_with = "serialize_millis")]
    pub settle_delay: Duration,
    pub format: ImageKind,
    /// JPEG quality; ignored for PNG
    pub quality: u8,
    /// Capture the whole viewport rather than the visible part only
    pub full_viewport: bool,
    /// Time left until the render deadline. Backends doing blocking work
    /// must give up once it is spent.
    #[serde(rename = "timeout_ms", serialize_with = "serialize_millis")]
    pub timeout: Duration,
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

/// Render backend trait - implement this for different browser backends
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Render the page described by `request`, appending the captured image
    /// bytes to `out`.
    ///
    /// Bytes already appended stay in `out` when the call fails or faults.
    async fn capture(&self, request: &RenderRequest, out: &mut Vec<u8>) -> PreviewResult<()>;

    /// Get the name of this backend (for logging/debugging)
    fn backend_name(&self) -> &'static str;

    /// Check if the backend is available/configured
    async fn is_available(&self) -> bool;
}
