//! Web Page Previews
//!
//! Renders preview images of web pages (or downloads direct image links),
//! normalizes them to a configured size and caches them on local disk so
//! repeated requests avoid refetching.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod hostlist;
pub mod local_backend;
pub mod naming;
pub mod normalize;
pub mod remote_backend;
pub mod render;
pub mod service;

pub use backend::{RenderBackend, RenderRequest};
pub use cache::CachePolicy;
pub use config::{PreviewConfig, PreviewSettings};
pub use error::{PreviewError, PreviewResult};
pub use hostlist::{HostList, HostLists, HostPolicy};
pub use local_backend::LocalRenderBackend;
pub use naming::{cache_path, derive_extension, sanitize, ImageKind};
pub use normalize::{ImageNormalizer, SubRegion};
pub use remote_backend::RemoteRenderBackend;
pub use render::RenderOrchestrator;
pub use service::PreviewService;

/// Trait for preview operations (used for dependency injection and testing)
#[async_trait::async_trait]
pub trait PreviewServiceTrait: Send + Sync {
    /// Produce a cached preview of `url` and return its file name
    async fn create_image(&self, url: &str) -> PreviewResult<String>;

    /// Get the name of the current render backend
    fn backend_name(&self) -> &'static str;

    /// Check if the render backend is available
    async fn is_backend_available(&self) -> bool;
}

/// Implement the trait for the concrete PreviewService
#[async_trait::async_trait]
impl PreviewServiceTrait for PreviewService {
    async fn create_image(&self, url: &str) -> PreviewResult<String> {
        self.create_image(url).await
    }

    fn backend_name(&self) -> &'static str {
        self.backend_name()
    }

    async fn is_backend_available(&self) -> bool {
        self.is_backend_available().await
    }
}
