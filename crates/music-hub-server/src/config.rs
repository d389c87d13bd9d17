//! Configuration loading and parsing.
//!
//! Defines the server config schema and resolves defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable consulted when neither CLI nor config name a media dir.
pub const MUSIC_BASE_ENV: &str = "MUSIC_BASE";

const DEFAULT_MAX_CONCURRENCY: usize = 6;
const DEFAULT_WARMUP_FIRST: usize = 8;
const DEFAULT_PROGRESS_EVERY: usize = 200;
const DEFAULT_PROGRESS_MIN_SECS: f64 = 12.0;
const DEFAULT_IDLE_SECONDS: u64 = 180;
const DEFAULT_POLL_PERIOD_SECS: u64 = 30;
const DEFAULT_IDLE_MESSAGE: &str = "Disconnected automatically after 3 minutes of inactivity.";
const DEFAULT_ANNOUNCE_DEDUP_SECS: u64 = 5;
const DEFAULT_SEARCH_PREFIX: &str = "ytsearch:";

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Media library root directory.
    pub media_dir: Option<String>,
    /// Optional override for the library cache file location.
    pub cache_file: Option<String>,
    /// Remote decoding node settings.
    pub resolver: Option<ResolverConfig>,
    /// Enqueue pipeline tuning.
    pub enqueue: Option<EnqueueConfig>,
    /// Idle monitor settings.
    pub idle: Option<IdleConfig>,
    /// Announcement delivery settings.
    pub announce: Option<AnnounceConfig>,
}

/// Remote decoding node config from TOML.
#[derive(Debug, Deserialize)]
pub struct ResolverConfig {
    /// Node REST base URL, e.g. `http://127.0.0.1:2333`.
    pub base_url: String,
    /// Node password sent in the `Authorization` header.
    pub password: Option<String>,
    /// Prefix applied to free-text queries (default `ytsearch:`).
    pub search_prefix: Option<String>,
}

/// Enqueue pipeline config from TOML.
#[derive(Debug, Deserialize)]
pub struct EnqueueConfig {
    /// Concurrent in-flight resolutions (default 6).
    pub max_concurrency: Option<usize>,
    /// Tracks resolved sequentially before the bulk phase (default 8).
    pub warmup_first: Option<usize>,
    /// Emit progress every N completions (default 200, 0 disables).
    pub progress_every: Option<usize>,
    /// Minimum seconds between progress emissions (default 12).
    pub progress_min_secs: Option<f64>,
}

/// Idle monitor config from TOML.
#[derive(Debug, Deserialize)]
pub struct IdleConfig {
    /// Seconds of continuous inactivity before disconnecting (default 180).
    pub idle_seconds: Option<u64>,
    /// Poll period in seconds (default 30, minimum 1).
    pub poll_period_secs: Option<u64>,
    /// Text sent to the announcement target before disconnecting.
    pub message: Option<String>,
}

/// Announcement config from TOML.
#[derive(Debug, Deserialize)]
pub struct AnnounceConfig {
    /// Webhook base URL; announcements are posted to `<base>/<target>`.
    pub webhook_base: Option<String>,
    /// Window in seconds for suppressing duplicate "now playing" lines.
    pub dedup_secs: Option<u64>,
}

/// Resolved enqueue settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueSettings {
    pub max_concurrency: usize,
    pub warmup_first: usize,
    pub progress_every: usize,
    pub progress_min_interval: Duration,
    pub search_prefix: String,
}

impl Default for EnqueueSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            warmup_first: DEFAULT_WARMUP_FIRST,
            progress_every: DEFAULT_PROGRESS_EVERY,
            progress_min_interval: Duration::from_secs_f64(DEFAULT_PROGRESS_MIN_SECS),
            search_prefix: DEFAULT_SEARCH_PREFIX.to_string(),
        }
    }
}

/// Resolved idle monitor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct IdleSettings {
    pub idle_threshold: Duration,
    pub poll_period: Duration,
    pub message: String,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(DEFAULT_IDLE_SECONDS),
            poll_period: Duration::from_secs(DEFAULT_POLL_PERIOD_SECS),
            message: DEFAULT_IDLE_MESSAGE.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Extract the media directory from config, falling back to `MUSIC_BASE`.
pub fn media_dir_from_config(cfg: &ServerConfig) -> Result<PathBuf> {
    let from_env = std::env::var(MUSIC_BASE_ENV).ok();
    let dir = cfg
        .media_dir
        .as_deref()
        .or(from_env.as_deref())
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .ok_or_else(|| anyhow::anyhow!("media_dir is required in config or {MUSIC_BASE_ENV}"))?;
    Ok(PathBuf::from(dir))
}

/// Extract the optional cache file override from config.
pub fn cache_file_from_config(cfg: &ServerConfig) -> Option<PathBuf> {
    cfg.cache_file.as_deref().and_then(|path| {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    })
}

/// Parse an optional bind address from config.
pub fn bind_from_config(cfg: &ServerConfig) -> Result<Option<SocketAddr>> {
    let Some(bind) = cfg.bind.as_deref() else {
        return Ok(None);
    };
    let addr = bind.parse().with_context(|| format!("parse bind {bind}"))?;
    Ok(Some(addr))
}

/// Resolve enqueue settings, applying defaults for missing keys.
pub fn enqueue_settings_from_config(cfg: &ServerConfig) -> EnqueueSettings {
    let mut settings = EnqueueSettings::default();
    if let Some(enqueue) = cfg.enqueue.as_ref() {
        if let Some(value) = enqueue.max_concurrency {
            settings.max_concurrency = value.max(1);
        }
        if let Some(value) = enqueue.warmup_first {
            settings.warmup_first = value;
        }
        if let Some(value) = enqueue.progress_every {
            settings.progress_every = value;
        }
        if let Some(value) = enqueue.progress_min_secs.filter(|v| v.is_finite() && *v >= 0.0) {
            settings.progress_min_interval = Duration::from_secs_f64(value);
        }
    }
    if let Some(prefix) = cfg
        .resolver
        .as_ref()
        .and_then(|r| r.search_prefix.as_deref())
        .filter(|p| !p.trim().is_empty())
    {
        settings.search_prefix = prefix.trim().to_string();
    }
    settings
}

/// Resolve idle monitor settings, applying defaults for missing keys.
pub fn idle_settings_from_config(cfg: &ServerConfig) -> IdleSettings {
    let mut settings = IdleSettings::default();
    if let Some(idle) = cfg.idle.as_ref() {
        if let Some(secs) = idle.idle_seconds {
            settings.idle_threshold = Duration::from_secs(secs);
        }
        if let Some(secs) = idle.poll_period_secs {
            settings.poll_period = Duration::from_secs(secs.max(1));
        }
        if let Some(message) = idle.message.as_ref() {
            settings.message = message.clone();
        }
    }
    settings
}

/// Duplicate "now playing" suppression window.
pub fn announce_dedup_from_config(cfg: &ServerConfig) -> Duration {
    let secs = cfg
        .announce
        .as_ref()
        .and_then(|a| a.dedup_secs)
        .unwrap_or(DEFAULT_ANNOUNCE_DEDUP_SECS);
    Duration::from_secs(secs)
}

/// Optional announcement webhook base URL.
pub fn webhook_base_from_config(cfg: &ServerConfig) -> Option<String> {
    cfg.announce
        .as_ref()
        .and_then(|a| a.webhook_base.as_deref())
        .map(|url| url.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
}
