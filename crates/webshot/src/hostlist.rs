//! Host lists
//!
//! Suffix-matched lists of hosts/domains that decide per-request JavaScript
//! behaviour. Lists are read lazily from plain text files (one entry per
//! line, `#` starts a comment line) and re-read once their reload deadline
//! has passed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PreviewConfig;

/// Which host list a query is made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostPolicy {
    /// Hosts rendered with JavaScript disabled even when it is globally on.
    AvoidJavaScript,
    /// Hosts rendered with JavaScript enabled even when it is globally off.
    NeedJavaScript,
}

impl FromStr for HostPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avoidjs" | "avoid_javascript" | "avoid-js" => Ok(HostPolicy::AvoidJavaScript),
            "needjs" | "need_javascript" | "need-js" => Ok(HostPolicy::NeedJavaScript),
            other => Err(format!("unknown host list '{}'", other)),
        }
    }
}

impl fmt::Display for HostPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPolicy::AvoidJavaScript => f.write_str("avoidjs"),
            HostPolicy::NeedJavaScript => f.write_str("needjs"),
        }
    }
}

#[derive(Debug, Default)]
struct HostListState {
    entries: Vec<String>,
    /// `None` means a reload is due on the next query.
    next_reload: Option<Instant>,
}

/// One suffix-match host list backed by a file.
#[derive(Debug)]
pub struct HostList {
    path: PathBuf,
    reload_interval: Duration,
    state: Mutex<HostListState>,
}

impl HostList {
    /// Create a list backed by `path`. Nothing is read until the first query.
    ///
    /// A zero `reload_interval` makes every query re-read the file.
    pub fn new(path: impl Into<PathBuf>, reload_interval: Duration) -> Self {
        Self {
            path: path.into(),
            reload_interval,
            state: Mutex::new(HostListState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `host` ends with any entry of the list (case-insensitive).
    pub async fn matches_host(&self, host: &str) -> bool {
        let host = host.trim().to_lowercase();
        if host.is_empty() {
            return false;
        }

        let mut state = self.state.lock().await;
        let reload_due = match state.next_reload {
            None => true,
            Some(deadline) => state.entries.is_empty() || Instant::now() >= deadline,
        };
        if reload_due {
            self.reload(&mut state).await;
        }

        state.entries.iter().any(|entry| host.ends_with(entry.as_str()))
    }

    /// Current entries in file order, without triggering a reload.
    pub async fn entries(&self) -> Vec<String> {
        self.state.lock().await.entries.clone()
    }

    async fn reload(&self, state: &mut HostListState) {
        match fs::read_to_string(&self.path).await {
            Ok(content) => {
                let entries = parse_entries(&content);
                debug!(
                    "Loaded {} host list entries from {}",
                    entries.len(),
                    self.path.display()
                );
                state.entries = entries;
            }
            Err(e) => {
                // Keep serving whatever was loaded before.
                warn!(
                    "Failed to read host list {}: {} (keeping {} previous entries)",
                    self.path.display(),
                    e,
                    state.entries.len()
                );
            }
        }

        state.next_reload = if self.reload_interval.is_zero() {
            None
        } else {
            Some(Instant::now() + self.reload_interval)
        };
    }
}

/// The "avoid JavaScript" and "need JavaScript" lists together.
#[derive(Debug)]
pub struct HostLists {
    avoid_js: HostList,
    need_js: HostList,
}

impl HostLists {
    pub fn new(avoid_js: HostList, need_js: HostList) -> Self {
        Self { avoid_js, need_js }
    }

    /// Lists backed by the files named in `config`.
    pub fn from_config(config: &PreviewConfig) -> Self {
        let interval = config.host_list_reload();
        Self::new(
            HostList::new(config.host_list(HostPolicy::AvoidJavaScript), interval),
            HostList::new(config.host_list(HostPolicy::NeedJavaScript), interval),
        )
    }

    pub fn list(&self, policy: HostPolicy) -> &HostList {
        match policy {
            HostPolicy::AvoidJavaScript => &self.avoid_js,
            HostPolicy::NeedJavaScript => &self.need_js,
        }
    }

    /// Whether the host of `url` is on the list selected by `policy`.
    ///
    /// `url` may be a full URL or a bare host name. Unparseable or empty
    /// input never matches.
    pub async fn query(&self, url: &str, policy: HostPolicy) -> bool {
        match extract_host(url) {
            Some(host) => self.list(policy).matches_host(&host).await,
            None => false,
        }
    }

    /// Like [`query`](Self::query) with the list named by a string; unknown
    /// names never match.
    pub async fn query_named(&self, url: &str, policy: &str) -> bool {
        match policy.parse::<HostPolicy>() {
            Ok(policy) => self.query(url, policy).await,
            Err(e) => {
                debug!("{}", e);
                false
            }
        }
    }
}

/// Lowercased, trimmed, non-blank, non-comment lines in file order.
pub fn parse_entries(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Host name of `url`, or the leading path segment of a bare host string.
pub fn extract_host(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    match url::Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) if !host.is_empty() => Some(host.to_lowercase()),
            _ => first_segment(parsed.path()),
        },
        Err(url::ParseError::RelativeUrlWithoutBase) => first_segment(url),
        Err(_) => None,
    }
}

fn first_segment(path: &str) -> Option<String> {
    path.trim_start_matches('/')
        .split(['/', '?', '#'])
        .next()
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_lowercase())
}
