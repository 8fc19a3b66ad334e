use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::core::{
    error::SyncError,
    retry::{Backoff, RetryPolicy},
};

pub const DEFAULT_CONFIG_PATH: &str = "config/anyrun-misp-sync.toml";
pub const DEFAULT_HISTORY_URL: &str = "https://api.any.run/v1/analysis/";
pub const DEFAULT_DUPLICATE_MARKER: &str = "Event already exists";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnyrunConfig {
    pub api_key: String,
    pub history_url: String,
    pub page_size: u32,
    pub timeout_ms: u64,
}

impl Default for AnyrunConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            history_url: DEFAULT_HISTORY_URL.to_string(),
            page_size: 25,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MispConfig {
    pub url: String,
    pub auth_key: String,
    pub verify_tls: bool,
    pub timeout_ms: u64,
    /// Substring of the platform's error text that means "already imported".
    pub duplicate_marker: String,
}

impl Default for MispConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth_key: String::new(),
            verify_tls: true,
            timeout_ms: 30_000,
            duplicate_marker: DEFAULT_DUPLICATE_MARKER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 10_000,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.delay_ms),
            self.backoff,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub watermark_path: PathBuf,
    pub audit_dir: Option<PathBuf>,
    pub summary_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            watermark_path: PathBuf::from("data/event_date_dat"),
            audit_dir: Some(PathBuf::from("data/downloads")),
            summary_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub subject: String,
    pub error_subject_prefix: String,
    pub webhook_url: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            subject: "ANY.RUN import".to_string(),
            error_subject_prefix: "[error]".to_string(),
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub anyrun: AnyrunConfig,
    pub misp: MispConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
}

impl AppConfig {
    /// Collect every missing or out-of-range setting in one error.
    pub fn validate(&self) -> Result<(), SyncError> {
        let mut problems = Vec::new();
        if self.anyrun.api_key.trim().is_empty() {
            problems.push("anyrun.api_key");
        }
        if self.anyrun.history_url.trim().is_empty() {
            problems.push("anyrun.history_url");
        }
        if self.anyrun.page_size == 0 {
            problems.push("anyrun.page_size");
        }
        if self.misp.url.trim().is_empty() {
            problems.push("misp.url");
        }
        if self.misp.auth_key.trim().is_empty() {
            problems.push("misp.auth_key");
        }
        if self.misp.duplicate_marker.is_empty() {
            problems.push("misp.duplicate_marker");
        }
        if self.retry.max_attempts == 0 {
            problems.push("retry.max_attempts");
        }
        if self.storage.watermark_path.as_os_str().is_empty() {
            problems.push("storage.watermark_path");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Config(format!(
                "missing or invalid settings: {}",
                problems.join(", ")
            )))
        }
    }

    /// Secrets may come from the environment instead of the file.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("ANYRUN_API_KEY") {
            self.anyrun.api_key = key;
        }
        if let Ok(url) = std::env::var("MISP_URL") {
            self.misp.url = url;
        }
        if let Ok(key) = std::env::var("MISP_AUTHKEY") {
            self.misp.auth_key = key;
        }
        self
    }
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, SyncError> {
    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    let path = path.unwrap_or(default_path);

    if !path.exists() {
        tracing::debug!("config {} not found; using defaults", path.display());
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| SyncError::Config(e.to_string()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<AppConfig, SyncError> {
    toml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))
}
