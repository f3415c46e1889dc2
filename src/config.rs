//! Worker configuration.
//!
//! Values come from three layers, later layers winning:
//! built-in defaults, an optional TOML file, then `ADSHOT_*` environment variables.
//! CLI flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::Viewport;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid value for {key}: '{value}'")]
    InvalidOverride { key: String, value: String },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ceiling on simultaneously running browser sessions.
    pub max_concurrent_sessions: usize,
    /// Sessions older than this are force-killed by the reaper.
    #[serde(with = "humantime_serde")]
    pub session_max_lifetime: Duration,
    /// Per-request deadline covering navigation and element location.
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    pub viewport: Viewport,
    /// Output image size; the crop window.
    pub clip: Viewport,
    pub user_agent: String,
    pub poll_retry_count: u32,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub screenshot_expiration_hours: u64,
    pub screenshot_dir: PathBuf,
    #[serde(with = "humantime_serde")]
    pub reap_interval: Duration,
    /// Graceful browser close budget before falling back to a kill.
    #[serde(with = "humantime_serde")]
    pub close_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub overflow_drain_delay: Duration,
    /// Search iframes once after load instead of polling for late tags.
    pub single_pass_iframes: bool,
    pub browser: BrowserSettings,
    pub upload: UploadSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    #[serde(with = "humantime_serde")]
    pub launch_timeout: Duration,
    pub extra_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            launch_timeout: Duration::from_secs(20),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Objects are uploaded with `PUT {endpoint}/{object}`.
    pub endpoint: Option<String>,
    /// Public URL prefix returned for uploaded objects; defaults to `endpoint`.
    pub public_base_url: Option<String>,
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 5,
            session_max_lifetime: Duration::from_secs(180),
            navigation_timeout: Duration::from_secs(60),
            viewport: Viewport::default(),
            clip: Viewport::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            poll_retry_count: 20,
            poll_interval: Duration::from_millis(500),
            screenshot_expiration_hours: 24,
            screenshot_dir: PathBuf::from("screenshots"),
            reap_interval: Duration::from_secs(30),
            close_timeout: Duration::from_secs(10),
            overflow_drain_delay: Duration::ZERO,
            single_pass_iframes: false,
            browser: BrowserSettings::default(),
            upload: UploadSettings::default(),
        }
    }
}

impl Config {
    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `ADSHOT_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidOverride {
                    key: key.to_string(),
                    value: value.to_string(),
                })
        }

        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ADSHOT_MAX_CONCURRENT_SESSIONS") {
            self.max_concurrent_sessions = parse("ADSHOT_MAX_CONCURRENT_SESSIONS", &v)?;
        }
        if let Some(v) = get("ADSHOT_SESSION_MAX_LIFETIME_SECONDS") {
            self.session_max_lifetime =
                Duration::from_secs(parse("ADSHOT_SESSION_MAX_LIFETIME_SECONDS", &v)?);
        }
        if let Some(v) = get("ADSHOT_NAVIGATION_TIMEOUT_MS") {
            self.navigation_timeout =
                Duration::from_millis(parse("ADSHOT_NAVIGATION_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("ADSHOT_VIEWPORT_WIDTH") {
            self.viewport.width = parse("ADSHOT_VIEWPORT_WIDTH", &v)?;
        }
        if let Some(v) = get("ADSHOT_VIEWPORT_HEIGHT") {
            self.viewport.height = parse("ADSHOT_VIEWPORT_HEIGHT", &v)?;
        }
        if let Some(v) = get("ADSHOT_USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = get("ADSHOT_POLL_RETRY_COUNT") {
            self.poll_retry_count = parse("ADSHOT_POLL_RETRY_COUNT", &v)?;
        }
        if let Some(v) = get("ADSHOT_POLL_INTERVAL_MS") {
            self.poll_interval = Duration::from_millis(parse("ADSHOT_POLL_INTERVAL_MS", &v)?);
        }
        if let Some(v) = get("ADSHOT_SCREENSHOT_EXPIRATION_HOURS") {
            self.screenshot_expiration_hours = parse("ADSHOT_SCREENSHOT_EXPIRATION_HOURS", &v)?;
        }
        if let Some(v) = get("ADSHOT_SCREENSHOT_DIR") {
            self.screenshot_dir = PathBuf::from(v);
        }
        if let Some(v) = get("ADSHOT_CHROME_PATH") {
            self.browser.chrome_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("ADSHOT_UPLOAD_ENDPOINT") {
            self.upload.endpoint = Some(v);
        }
        if let Some(v) = get("ADSHOT_UPLOAD_TOKEN") {
            self.upload.token = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_sessions == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_sessions must be at least 1".to_string(),
            ));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ConfigError::Invalid("viewport must be non-zero".to_string()));
        }
        if self.clip.width == 0 || self.clip.height == 0 {
            return Err(ConfigError::Invalid("clip must be non-zero".to_string()));
        }
        if self.poll_retry_count == 0 {
            return Err(ConfigError::Invalid(
                "poll_retry_count must be at least 1".to_string(),
            ));
        }
        if self.screenshot_expiration_hours.checked_mul(3600).is_none() {
            return Err(ConfigError::Invalid(format!(
                "screenshot_expiration_hours ({}) is too large",
                self.screenshot_expiration_hours
            )));
        }
        if self.session_max_lifetime <= self.navigation_timeout {
            return Err(ConfigError::Invalid(format!(
                "session_max_lifetime ({:?}) must exceed navigation_timeout ({:?})",
                self.session_max_lifetime, self.navigation_timeout
            )));
        }
        Ok(())
    }

    /// Freshness window of the duplicate-capture check.
    pub fn screenshot_expiration(&self) -> Duration {
        Duration::from_secs(self.screenshot_expiration_hours.saturating_mul(3600))
    }
}
