//! Cache existence policy
//!
//! Decides whether a preview already on disk can be returned instead of
//! fetching the page again.

use std::path::Path;
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;

use crate::config::PreviewConfig;
use crate::naming;

/// Cache rules derived from a [`PreviewConfig`].
#[derive(Debug, Clone)]
pub struct CachePolicy<'a> {
    config: &'a PreviewConfig,
}

impl<'a> CachePolicy<'a> {
    pub fn new(config: &'a PreviewConfig) -> Self {
        Self { config }
    }

    /// Whether the file at `path` satisfies the current request.
    ///
    /// With a zero max. age nothing is ever reused. Missing files,
    /// directories, files below the minimum size and overwrite mode all
    /// force a refetch. Paths that exist but are neither directories nor
    /// regular files (devices, sockets, ...) are accepted as-is.
    pub async fn is_usable(&self, path: &Path) -> bool {
        let max_age = self.config.max_age();
        if max_age.is_zero() {
            return false;
        }

        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(_) => return false,
        };
        if metadata.is_dir() {
            return false;
        }
        if !metadata.is_file() {
            debug!(
                "Cache entry {} is not a regular file, accepting it",
                path.display()
            );
            return true;
        }

        if metadata.len() < self.config.min_cache_size() {
            debug!(
                "Cache entry {} too small ({} bytes), ignoring it",
                path.display(),
                metadata.len()
            );
            return false;
        }
        if self.config.overwrite() {
            return false;
        }

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(_) => return false,
        };
        match modified.checked_add(max_age) {
            Some(expires) => SystemTime::now() < expires,
            None => true,
        }
    }

    /// File name of a usable cached preview of `url`, if there is one.
    ///
    /// The configured format is checked first; with `accept_other_format`
    /// set, a preview in the other format is returned as well, so the name
    /// may not match the configured format.
    pub async fn lookup(&self, url: &str) -> Option<String> {
        let kind = self.config.image_kind();
        let name = naming::cache_file_name(url, kind);
        if self.is_usable(&self.config.cache_dir().join(&name)).await {
            return Some(name);
        }

        if self.config.accept_other_format() {
            let other = naming::cache_file_name(url, kind.alternate());
            if self.is_usable(&self.config.cache_dir().join(&other)).await {
                debug!("Accepting cached {} in place of {}", other, name);
                return Some(other);
            }
        }

        None
    }
}
