//! Webshot CLI
//!
//! Produces one cached preview image of a URL and prints its file name.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, Layer};
use webshot::{
    LocalRenderBackend, PreviewConfig, PreviewService, PreviewSettings, RemoteRenderBackend,
    RenderBackend,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Headless Chrome on this machine (or behind --browser-ws)
    Local,
    /// External screenshot service at --remote-url
    Remote,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// URL to generate a preview for
    #[arg(long, env = "WEBSHOT_URL")]
    url: String,

    /// Allow cookies
    #[arg(long, env = "WEBSHOT_COOKIES")]
    cookies: bool,

    /// Skip sites with certificate errors instead of ignoring them
    #[arg(long, env = "WEBSHOT_CERT_ERRORS")]
    cert_errors: bool,

    /// Emulate a mobile device
    #[arg(long, env = "WEBSHOT_MOBILE")]
    mobile: bool,

    /// Show scrollbars
    #[arg(long, env = "WEBSHOT_SCROLLBARS")]
    scrollbars: bool,

    /// Directory for generated images (default: system temp dir)
    #[arg(long, env = "WEBSHOT_DIR")]
    dir: Option<PathBuf>,

    /// Image height in pixels, 0 keeps the page height
    #[arg(long, default_value_t = 768, env = "WEBSHOT_HEIGHT")]
    height: i64,

    /// Image quality; 100 writes PNG, lower values JPEG
    #[arg(long, default_value_t = 100, env = "WEBSHOT_QUALITY")]
    quality: i64,

    /// Device scale factor, 0 disables the override
    #[arg(long, default_value_t = 0.0, env = "WEBSHOT_SCALE")]
    scale: f64,

    /// Image width in pixels, 0 keeps the page width
    #[arg(long, default_value_t = 896, env = "WEBSHOT_WIDTH")]
    width: i64,

    /// Run JavaScript on rendered pages
    #[arg(long, env = "WEBSHOT_JAVASCRIPT")]
    javascript: bool,

    /// Platform reported to pages
    #[arg(long, env = "WEBSHOT_PLATFORM")]
    platform: Option<String>,

    /// User agent reported to pages
    #[arg(long, env = "WEBSHOT_USER_AGENT")]
    user_agent: Option<String>,

    /// Hosts to render without JavaScript
    #[arg(long, env = "WEBSHOT_AVOID_JS")]
    avoid_js: Option<PathBuf>,

    /// Hosts to render with JavaScript
    #[arg(long, env = "WEBSHOT_NEED_JS")]
    need_js: Option<PathBuf>,

    /// Reuse cached images younger than this many seconds
    #[arg(long, default_value_t = 0, env = "WEBSHOT_MAX_AGE")]
    max_age: u64,

    /// Ignore cached images and always regenerate
    #[arg(long, env = "WEBSHOT_OVERWRITE")]
    overwrite: bool,

    /// Accept a cached image in the other format
    #[arg(long, env = "WEBSHOT_ACCEPT_OTHER_FORMAT")]
    accept_other_format: bool,

    /// Render deadline in seconds
    #[arg(long, default_value_t = 32, env = "WEBSHOT_TIMEOUT")]
    timeout: u64,

    /// Render backend
    #[arg(long, value_enum, default_value_t = BackendKind::Local, env = "WEBSHOT_BACKEND")]
    backend: BackendKind,

    /// DevTools websocket of an already running browser
    #[arg(long, env = "WEBSHOT_BROWSER_WS")]
    browser_ws: Option<String>,

    /// Endpoint of the remote screenshot service
    #[arg(long, env = "WEBSHOT_REMOTE_URL")]
    remote_url: Option<String>,

    /// API key for the remote screenshot service
    #[arg(long, env = "WEBSHOT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Print the effective configuration
    #[arg(long, short)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "WEBSHOT_LOG_LEVEL")]
    log_level: String,

    /// Log format: compact, full
    #[arg(long, default_value = "compact", env = "WEBSHOT_LOG_FORMAT")]
    log_format: String,
}

impl Cli {
    fn settings(&self) -> PreviewSettings {
        let defaults = PreviewSettings::default();
        PreviewSettings {
            width: self.width,
            height: self.height,
            quality: self.quality,
            scale: self.scale,
            cookies: self.cookies,
            javascript: self.javascript,
            mobile: self.mobile,
            scrollbars: self.scrollbars,
            cert_errors: self.cert_errors,
            platform: self.platform.clone().unwrap_or(defaults.platform),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            cache_dir: self.dir.clone().unwrap_or(defaults.cache_dir),
            max_age_secs: self.max_age,
            overwrite: self.overwrite,
            accept_other_format: self.accept_other_format,
            max_duration_secs: self.timeout,
            avoid_js_list: self.avoid_js.clone().unwrap_or(defaults.avoid_js_list),
            need_js_list: self.need_js.clone().unwrap_or(defaults.need_js_list),
            host_list_reload_secs: defaults.host_list_reload_secs,
            min_cache_size: defaults.min_cache_size,
        }
    }

    fn backend(&self) -> anyhow::Result<Arc<dyn RenderBackend>> {
        Ok(match self.backend {
            BackendKind::Local => match &self.browser_ws {
                Some(ws) => Arc::new(LocalRenderBackend::connect(ws.clone())),
                None => Arc::new(
                    LocalRenderBackend::new()
                        .with_idle_timeout(Duration::from_secs(self.timeout.max(1) + 30)),
                ),
            },
            BackendKind::Remote => {
                let Some(remote_url) = &self.remote_url else {
                    anyhow::bail!("--remote-url is required with --backend remote");
                };
                Arc::new(RemoteRenderBackend::new(
                    remote_url.clone(),
                    self.api_key.clone(),
                )?)
            }
        })
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    // RUST_LOG takes full control when set
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "webshot={level},\
             webshot_cli={level},\
             headless_chrome=warn,\
             tungstenite=warn,\
             hyper=warn,\
             reqwest=warn",
            level = cli.log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = PreviewConfig::from_settings(&cli.settings());
    if cli.verbose {
        println!("{}", config);
    }

    let service = PreviewService::new(config, cli.backend()?)?;
    tracing::debug!("Using render backend {}", service.backend_name());

    let name = service.create_image(&cli.url).await?;
    println!("generated URL screenshot: {}", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_library_defaults() {
        let cli = Cli::try_parse_from(["webshot", "--url", "https://example.com"]).unwrap();
        assert_eq!(cli.backend, BackendKind::Local);
        assert_eq!(cli.settings(), PreviewSettings::default());
    }

    #[test]
    fn test_cli_flags_reach_settings() {
        let cli = Cli::try_parse_from([
            "webshot",
            "--url",
            "https://example.com",
            "--width",
            "1280",
            "--height",
            "0",
            "--quality",
            "75",
            "--mobile",
            "--javascript",
            "--max-age",
            "3600",
            "--timeout",
            "10",
            "--dir",
            "/tmp/previews",
        ])
        .unwrap();

        let config = PreviewConfig::from_settings(&cli.settings());
        assert_eq!(config.width(), 1280);
        assert_eq!(config.height(), 0);
        assert_eq!(config.quality(), 75);
        assert!(config.mobile());
        assert!(config.javascript());
        assert_eq!(config.max_age(), Duration::from_secs(3600));
        assert_eq!(config.max_duration(), Duration::from_secs(10));
        assert_eq!(config.cache_dir(), std::path::Path::new("/tmp/previews"));
    }

    #[test]
    fn test_remote_backend_needs_url() {
        let cli = Cli::try_parse_from([
            "webshot",
            "--url",
            "https://example.com",
            "--backend",
            "remote",
        ])
        .unwrap();
        assert!(cli.backend().is_err());
    }
}
