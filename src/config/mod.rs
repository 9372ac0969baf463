//! Configuration system (layered: code > env > config file).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::policy::{normalize_base, AuthPolicy, DEFAULT_PUBLIC_PATHS};
use crate::util::retry::RetryPolicy;

pub const ENV_IAM_BASE_URL: &str = "IAM_BASE_URL";
pub const ENV_API_BASE_URL: &str = "API_BASE_URL";
pub const ENV_APP_SLUG: &str = "IAM_APP_SLUG";
pub const ENV_SESSION_DIR: &str = "IAM_SESSION_DIR";
pub const ENV_NEAR_EXPIRY_SECS: &str = "IAM_NEAR_EXPIRY_SECS";

pub const DEFAULT_NEAR_EXPIRY_SECS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Session configuration.
///
/// Resolution order:
/// 1. Values set in code (builder or field assignment)
/// 2. Environment variables (`IAM_BASE_URL`, `API_BASE_URL`, `IAM_APP_SLUG`, ...)
/// 3. A TOML config file
///
/// # Example
/// ```
/// use iam_session::config::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .iam_base_url("https://iam.example.com/")
///     .api_base_url("https://api.example.com")
///     .app_slug("orders")
///     .build();
/// assert_eq!(config.policy().iam_base(), "https://iam.example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[builder(into)]
    pub iam_base_url: String,
    #[builder(into, default)]
    pub api_base_url: String,
    #[builder(into, default)]
    pub app_slug: String,
    #[builder(into)]
    pub storage_dir: Option<PathBuf>,
    #[builder(default = DEFAULT_NEAR_EXPIRY_SECS)]
    pub near_expiry_threshold_secs: u64,
    #[builder(default = default_public_paths())]
    pub public_paths: Vec<String>,
    #[builder(default)]
    pub refresh_retry: RetryPolicy,
    #[builder(default = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            iam_base_url: String::new(),
            api_base_url: String::new(),
            app_slug: String::new(),
            storage_dir: None,
            near_expiry_threshold_secs: DEFAULT_NEAR_EXPIRY_SECS,
            public_paths: default_public_paths(),
            refresh_retry: RetryPolicy::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

fn default_public_paths() -> Vec<String> {
    DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect()
}

impl SessionConfig {
    /// Load from a TOML file. Returns defaults if the file does not exist.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(SessionError::Io(err)),
        };
        toml::from_str(&raw).map_err(|e| {
            SessionError::Configuration(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Defaults overlaid with environment variables (and `.env`, if present).
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Overlay process environment variables onto this config.
    pub fn with_env_overrides(self) -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Overlay values produced by `lookup` (keyed by env var name).
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_IAM_BASE_URL) {
            self.iam_base_url = url;
        }
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            self.api_base_url = url;
        }
        if let Some(slug) = lookup(ENV_APP_SLUG) {
            self.app_slug = slug;
        }
        if let Some(dir) = lookup(ENV_SESSION_DIR) {
            self.storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = lookup(ENV_NEAR_EXPIRY_SECS) {
            match raw.trim().parse() {
                Ok(secs) => self.near_expiry_threshold_secs = secs,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "ignoring non-numeric {ENV_NEAR_EXPIRY_SECS}"
                ),
            }
        }
        self
    }

    /// Reject configurations that cannot reach an identity backend.
    pub fn validate(&self) -> Result<(), SessionError> {
        if normalize_base(&self.iam_base_url).is_empty() {
            return Err(SessionError::Configuration(format!(
                "identity backend base URL is not set ({ENV_IAM_BASE_URL})"
            )));
        }
        Ok(())
    }

    pub fn policy(&self) -> AuthPolicy {
        AuthPolicy::new(&self.api_base_url, &self.iam_base_url, &self.public_paths)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Configured storage directory, or `~/.iam-session`.
    pub fn resolved_storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(default_storage_dir)
    }
}

fn default_storage_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".iam-session"))
        .unwrap_or_else(|| PathBuf::from(".iam-session"))
}
