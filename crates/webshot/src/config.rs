//! Preview configuration
//!
//! [`PreviewSettings`] is the plain option bundle a host application or the
//! command line fills in. [`PreviewConfig`] is the validated form every
//! operation reads; its setters clamp out-of-range input to defaults instead
//! of rejecting it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::hostlist::HostPolicy;
use crate::naming::{self, ImageKind};

pub const DEFAULT_WIDTH: u32 = 896;
pub const DEFAULT_HEIGHT: u32 = 768;
pub const DEFAULT_QUALITY: u8 = 100;
pub const DEFAULT_PLATFORM: &str = "Linux x86_64";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:89.0) Gecko/20100101 Firefox/89.0";
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(32);
pub const DEFAULT_HOST_LIST_RELOAD: Duration = Duration::from_secs(60);
pub const DEFAULT_MIN_CACHE_SIZE: u64 = 8192;
pub const DEFAULT_AVOID_JS_LIST: &str = "avoidjs.lst";
pub const DEFAULT_NEED_JS_LIST: &str = "needjs.lst";

/// Plain, serializable preview options.
///
/// Durations are whole seconds. Nothing here is validated; pass the bundle to
/// [`PreviewConfig::apply`] to get clamped values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    pub width: i64,
    pub height: i64,
    pub quality: i64,
    pub scale: f64,
    pub cookies: bool,
    pub javascript: bool,
    pub mobile: bool,
    pub scrollbars: bool,
    /// Skip sites with certificate errors instead of ignoring the errors.
    pub cert_errors: bool,
    pub platform: String,
    pub user_agent: String,
    pub cache_dir: PathBuf,
    pub max_age_secs: u64,
    pub overwrite: bool,
    pub accept_other_format: bool,
    pub max_duration_secs: u64,
    pub avoid_js_list: PathBuf,
    pub need_js_list: PathBuf,
    pub host_list_reload_secs: u64,
    pub min_cache_size: u64,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        PreviewConfig::default().settings()
    }
}

/// Validated configuration passed to every preview operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewConfig {
    width: u32,
    height: u32,
    quality: u8,
    scale: f64,
    cookies: bool,
    javascript: bool,
    mobile: bool,
    scrollbars: bool,
    cert_errors: bool,
    platform: String,
    user_agent: String,
    cache_dir: PathBuf,
    max_age: Duration,
    overwrite: bool,
    accept_other_format: bool,
    max_duration: Duration,
    avoid_js_list: PathBuf,
    need_js_list: PathBuf,
    host_list_reload: Duration,
    min_cache_size: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            quality: DEFAULT_QUALITY,
            scale: 0.0,
            cookies: false,
            javascript: false,
            mobile: false,
            scrollbars: false,
            cert_errors: false,
            platform: DEFAULT_PLATFORM.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_dir: std::env::temp_dir(),
            max_age: Duration::ZERO,
            overwrite: false,
            accept_other_format: false,
            max_duration: DEFAULT_MAX_DURATION,
            avoid_js_list: absolute(Path::new(DEFAULT_AVOID_JS_LIST)),
            need_js_list: absolute(Path::new(DEFAULT_NEED_JS_LIST)),
            host_list_reload: DEFAULT_HOST_LIST_RELOAD,
            min_cache_size: DEFAULT_MIN_CACHE_SIZE,
        }
    }
}

impl PreviewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a validated configuration from a settings bundle.
    pub fn from_settings(settings: &PreviewSettings) -> Self {
        let mut config = Self::default();
        config.apply(settings);
        config
    }

    /// Apply every option of `settings` through its validating setter.
    ///
    /// Returns `false` without touching anything when `settings` already
    /// matches the current state.
    pub fn apply(&mut self, settings: &PreviewSettings) -> bool {
        if self.settings() == *settings {
            return false;
        }

        self.set_width(settings.width);
        self.set_height(settings.height);
        self.set_quality(settings.quality);
        self.set_scale(settings.scale);
        self.set_cookies(settings.cookies);
        self.set_javascript(settings.javascript);
        self.set_mobile(settings.mobile);
        self.set_scrollbars(settings.scrollbars);
        self.set_cert_errors(settings.cert_errors);
        self.set_platform(&settings.platform);
        self.set_user_agent(&settings.user_agent);
        self.set_cache_dir(&settings.cache_dir);
        self.set_max_age(Duration::from_secs(settings.max_age_secs));
        self.set_overwrite(settings.overwrite);
        self.set_accept_other_format(settings.accept_other_format);
        self.set_max_duration(Duration::from_secs(settings.max_duration_secs));
        self.set_host_list(HostPolicy::AvoidJavaScript, &settings.avoid_js_list);
        self.set_host_list(HostPolicy::NeedJavaScript, &settings.need_js_list);
        self.set_host_list_reload(Duration::from_secs(settings.host_list_reload_secs));
        self.set_min_cache_size(settings.min_cache_size);
        true
    }

    /// Export the current state as a settings bundle.
    pub fn settings(&self) -> PreviewSettings {
        PreviewSettings {
            width: i64::from(self.width),
            height: i64::from(self.height),
            quality: i64::from(self.quality),
            scale: self.scale,
            cookies: self.cookies,
            javascript: self.javascript,
            mobile: self.mobile,
            scrollbars: self.scrollbars,
            cert_errors: self.cert_errors,
            platform: self.platform.clone(),
            user_agent: self.user_agent.clone(),
            cache_dir: self.cache_dir.clone(),
            max_age_secs: self.max_age.as_secs(),
            overwrite: self.overwrite,
            accept_other_format: self.accept_other_format,
            max_duration_secs: self.max_duration.as_secs(),
            avoid_js_list: self.avoid_js_list.clone(),
            need_js_list: self.need_js_list.clone(),
            host_list_reload_secs: self.host_list_reload.as_secs(),
            min_cache_size: self.min_cache_size,
        }
    }

    /// Max. width of the generated image; `0` leaves the width unconstrained.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn set_width(&mut self, width: i64) {
        self.width = clamp_dimension(width);
    }

    /// Max. height of the generated image; `0` renders the whole page.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_height(&mut self, height: i64) {
        self.height = clamp_dimension(height);
    }

    /// Image quality in percent. `100` selects PNG, anything lower JPEG.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn set_quality(&mut self, quality: i64) {
        self.quality = match u8::try_from(quality) {
            Ok(q @ 1..=100) => q,
            _ => DEFAULT_QUALITY,
        };
    }

    /// Format of rendered previews, derived from [`quality`](Self::quality).
    pub fn image_kind(&self) -> ImageKind {
        ImageKind::for_quality(self.quality)
    }

    /// Device scale factor of the virtual browser; `0` disables the override.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = if scale > 0.0 { scale } else { 0.0 };
    }

    pub fn cookies(&self) -> bool {
        self.cookies
    }

    pub fn set_cookies(&mut self, allow: bool) {
        self.cookies = allow;
    }

    /// Global JavaScript default, overridden per host by the host lists.
    pub fn javascript(&self) -> bool {
        self.javascript
    }

    pub fn set_javascript(&mut self, allow: bool) {
        self.javascript = allow;
    }

    pub fn mobile(&self) -> bool {
        self.mobile
    }

    pub fn set_mobile(&mut self, mobile: bool) {
        self.mobile = mobile;
    }

    pub fn scrollbars(&self) -> bool {
        self.scrollbars
    }

    pub fn set_scrollbars(&mut self, show: bool) {
        self.scrollbars = show;
    }

    /// Whether sites with certificate errors are skipped rather than rendered.
    pub fn cert_errors(&self) -> bool {
        self.cert_errors
    }

    pub fn set_cert_errors(&mut self, skip: bool) {
        self.cert_errors = skip;
    }

    /// Value reported by `navigator.platform`.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn set_platform(&mut self, platform: &str) {
        self.platform = platform.trim().to_string();
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn set_user_agent(&mut self, agent: &str) {
        self.user_agent = agent.trim().to_string();
    }

    /// Directory the preview images are stored in.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Set the cache directory. Blank input falls back to `./`; relative
    /// paths are made absolute.
    pub fn set_cache_dir(&mut self, dir: impl AsRef<Path>) {
        let trimmed = dir.as_ref().to_string_lossy().trim().to_string();
        let dir = if trimmed.is_empty() { "./".to_string() } else { trimmed };
        self.cache_dir = absolute(Path::new(&dir));
    }

    /// Max. age of a cached image. Zero disables cache reuse entirely.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn set_max_age(&mut self, max_age: Duration) {
        self.max_age = max_age;
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn set_overwrite(&mut self, overwrite: bool) {
        self.overwrite = overwrite;
    }

    /// Whether a cached image in the other format satisfies a request.
    pub fn accept_other_format(&self) -> bool {
        self.accept_other_format
    }

    pub fn set_accept_other_format(&mut self, accept: bool) {
        self.accept_other_format = accept;
    }

    /// Deadline for rendering a single page.
    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub fn set_max_duration(&mut self, max_duration: Duration) {
        self.max_duration = if max_duration.is_zero() {
            DEFAULT_MAX_DURATION
        } else {
            max_duration
        };
    }

    pub fn host_list(&self, policy: HostPolicy) -> &Path {
        match policy {
            HostPolicy::AvoidJavaScript => &self.avoid_js_list,
            HostPolicy::NeedJavaScript => &self.need_js_list,
        }
    }

    /// Set the file backing a host list. Blank input selects the default
    /// file name in the working directory.
    pub fn set_host_list(&mut self, policy: HostPolicy, path: impl AsRef<Path>) {
        let trimmed = path.as_ref().to_string_lossy().trim().to_string();
        let path = if trimmed.is_empty() {
            match policy {
                HostPolicy::AvoidJavaScript => DEFAULT_AVOID_JS_LIST.to_string(),
                HostPolicy::NeedJavaScript => DEFAULT_NEED_JS_LIST.to_string(),
            }
        } else {
            trimmed
        };
        let path = absolute(Path::new(&path));
        match policy {
            HostPolicy::AvoidJavaScript => self.avoid_js_list = path,
            HostPolicy::NeedJavaScript => self.need_js_list = path,
        }
    }

    /// Min. time between two reloads of a host list; zero reloads on every
    /// query.
    pub fn host_list_reload(&self) -> Duration {
        self.host_list_reload
    }

    pub fn set_host_list_reload(&mut self, interval: Duration) {
        self.host_list_reload = interval;
    }

    /// Cached files smaller than this many bytes are treated as broken.
    pub fn min_cache_size(&self) -> u64 {
        self.min_cache_size
    }

    pub fn set_min_cache_size(&mut self, size: u64) {
        self.min_cache_size = if size == 0 {
            DEFAULT_MIN_CACHE_SIZE
        } else {
            size
        };
    }

    /// Full cache path of the preview for `url` in the configured format.
    ///
    /// The file is not checked for existence.
    pub fn path_file(&self, url: &str) -> PathBuf {
        naming::cache_path(&self.cache_dir, url, self.image_kind())
    }
}

impl fmt::Display for PreviewConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CertErrors:\t{}", self.cert_errors)?;
        writeln!(f, "Cookies:\t{}", self.cookies)?;
        writeln!(f, "ImageAge:\t{}", self.max_age.as_secs())?;
        writeln!(f, "ImageDir:\t'{}'", self.cache_dir.display())?;
        writeln!(f, "ImageHeight:\t{}", self.height)?;
        writeln!(f, "ImageQuality:\t{}", self.quality)?;
        writeln!(f, "ImageScale:\t{:.2}", self.scale)?;
        writeln!(f, "ImageWidth:\t{}", self.width)?;
        writeln!(f, "JavaScript:\t{}", self.javascript)?;
        writeln!(f, "Mobile:\t{}", self.mobile)?;
        writeln!(f, "Platform:\t'{}'", self.platform)?;
        writeln!(f, "Scrollbars:\t{}", self.scrollbars)?;
        writeln!(f, "UserAgent:\t'{}'", self.user_agent)?;
        writeln!(f, "Overwrite:\t{}", self.overwrite)?;
        writeln!(f, "AcceptOtherFormat:\t{}", self.accept_other_format)?;
        writeln!(f, "MaxDuration:\t{}", self.max_duration.as_secs())?;
        writeln!(f, "AvoidJS:\t'{}'", self.avoid_js_list.display())?;
        writeln!(f, "NeedJS:\t'{}'", self.need_js_list.display())
    }
}

fn clamp_dimension(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(if value > 0 { u32::MAX } else { 0 })
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
