//! Preview Service
//!
//! Ties cache lookup, URL classification, rendering or direct download and
//! the cache write together behind [`PreviewService::create_image`].

use futures::stream::{BoxStream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::RenderBackend;
use crate::cache::CachePolicy;
use crate::config::PreviewConfig;
use crate::error::{PreviewError, PreviewResult};
use crate::hostlist::HostLists;
use crate::naming::{self, UrlClass};
use crate::render::RenderOrchestrator;

/// Bytes to store in the cache.
enum Artifact {
    Buffer(Vec<u8>),
    /// Body of a direct download, written as it arrives
    Stream(BoxStream<'static, PreviewResult<Vec<u8>>>),
}

/// Preview service that manages rendering and the on-disk cache
pub struct PreviewService {
    config: PreviewConfig,
    orchestrator: RenderOrchestrator,
    client: reqwest::Client,
}

impl PreviewService {
    /// Create a new preview service using the host lists named in `config`
    pub fn new(config: PreviewConfig, backend: Arc<dyn RenderBackend>) -> PreviewResult<Self> {
        let host_lists = Arc::new(HostLists::from_config(&config));
        Self::with_host_lists(config, backend, host_lists)
    }

    /// Create a new preview service with explicit host lists
    pub fn with_host_lists(
        config: PreviewConfig,
        backend: Arc<dyn RenderBackend>,
        host_lists: Arc<HostLists>,
    ) -> PreviewResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .timeout(config.max_duration())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                error!("Failed to create HTTP client: {}", e);
                PreviewError::Network(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            orchestrator: RenderOrchestrator::new(backend, host_lists),
            client,
        })
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    /// Get the name of the current render backend
    pub fn backend_name(&self) -> &'static str {
        self.orchestrator.backend().backend_name()
    }

    /// Check if the render backend is available
    pub async fn is_backend_available(&self) -> bool {
        self.orchestrator.backend().is_available().await
    }

    /// Produce a preview image of `url` in the cache directory.
    ///
    /// Returns the file name relative to the cache directory. A usable cached
    /// file is returned without any network traffic; its name may carry the
    /// other image format when `accept_other_format` is set.
    pub async fn create_image(&self, url: &str) -> PreviewResult<String> {
        let cache_dir = self.config.cache_dir();
        if cache_dir.as_os_str().is_empty() {
            return Err(PreviewError::Config(
                "no cache directory configured".to_string(),
            ));
        }

        let policy = CachePolicy::new(&self.config);
        if let Some(name) = policy.lookup(url).await {
            info!("Using cached preview {} for {}", name, url);
            return Ok(name);
        }

        let (name, artifact) = match naming::classify(url) {
            UrlClass::Excluded(ext) => {
                debug!("Not previewing {}: excluded extension {}", url, ext);
                return Err(PreviewError::ExcludedType(ext));
            }
            UrlClass::DirectImage(ext) => {
                let name = format!("{}{}", naming::sanitize(url), ext);
                if policy.is_usable(&cache_dir.join(&name)).await {
                    info!("Using cached image {} for {}", name, url);
                    return Ok(name);
                }
                let body = self
                    .download(url)
                    .await?
                    .bytes_stream()
                    .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(PreviewError::from))
                    .boxed();
                (name, Artifact::Stream(body))
            }
            UrlClass::Page => {
                let deadline = Instant::now() + self.config.max_duration();
                let data = self.orchestrator.render(&self.config, url, deadline).await?;
                if Instant::now() >= deadline {
                    warn!("Render of {} finished past its deadline", url);
                    return Err(PreviewError::Timeout {
                        url: url.to_string(),
                        after: self.config.max_duration(),
                    });
                }
                let name = naming::cache_file_name(url, self.config.image_kind());
                (name, Artifact::Buffer(data))
            }
        };

        if let Artifact::Buffer(data) = &artifact {
            if data.is_empty() {
                return Err(PreviewError::NoData(name));
            }
        }

        fs::create_dir_all(cache_dir).await.map_err(|e| {
            error!("Failed to create cache directory: {}", e);
            PreviewError::Write {
                path: cache_dir.to_path_buf(),
                source: e,
            }
        })?;

        let path = cache_dir.join(&name);
        let written = write_artifact(&path, artifact).await?;
        info!(
            "Preview of {} saved to {} ({} bytes)",
            url,
            path.display(),
            written
        );

        Ok(name)
    }

    async fn download(&self, url: &str) -> PreviewResult<reqwest::Response> {
        debug!("Downloading image {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            error!("Failed to download {}: {}", url, e);
            PreviewError::Network(format!("Failed to download {}: {}", url, e))
        })?;

        if !response.status().is_success() {
            error!("Download of {} returned {}", url, response.status());
            return Err(PreviewError::Network(format!(
                "Download of {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response)
    }
}

/// Write `artifact` to `path`, replacing any previous file.
///
/// The file is removed again when anything goes wrong, including a download
/// that turns out to be empty.
async fn write_artifact(path: &Path, artifact: Artifact) -> PreviewResult<u64> {
    let result = write_to(path, artifact).await;
    match result {
        Ok(0) => {
            discard(path).await;
            Err(PreviewError::NoData(path.display().to_string()))
        }
        Ok(written) => Ok(written),
        Err(e) => {
            error!("Failed to write {}: {}", path.display(), e);
            discard(path).await;
            Err(e)
        }
    }
}

async fn write_to(path: &Path, artifact: Artifact) -> PreviewResult<u64> {
    let write_error = |source: std::io::Error| PreviewError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await.map_err(write_error)?;

    let mut written = 0u64;
    match artifact {
        Artifact::Buffer(data) => {
            file.write_all(&data).await.map_err(write_error)?;
            written = data.len() as u64;
        }
        Artifact::Stream(mut body) => {
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await.map_err(write_error)?;
                written += chunk.len() as u64;
            }
        }
    }

    file.flush().await.map_err(write_error)?;
    file.sync_all().await.map_err(write_error)?;
    Ok(written)
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        debug!("Could not remove {}: {}", path.display(), e);
    }
}
