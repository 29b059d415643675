//! Configuration Module
//!
//! Runtime settings with defaults, overridable through `COMPANION_*`
//! environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://companion.orerve.net";

/// Companion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionConfig {
    /// Base URL of the game backend's companion API.
    #[serde(default = "default_api_url")]
    pub api_base_url: String,

    /// Directory holding credentials and logs.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Home star system, used for distance-from-home.
    #[serde(default)]
    pub home_system: Option<String>,

    #[serde(default)]
    pub home_station: Option<String>,

    /// Connect and read timeout for every API request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long a fetched profile is served from cache.
    #[serde(default = "default_profile_ttl")]
    pub profile_ttl_secs: u64,

    /// Interval between background profile refreshes; 0 disables them.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Maximum number of observer deliveries running at once.
    #[serde(default = "default_observer_concurrency")]
    pub observer_concurrency: usize,

    /// JSON-lines file of parsed game events; stdin when unset.
    #[serde(default)]
    pub events_file: Option<PathBuf>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("CommanderCompanion")
}

fn default_request_timeout() -> u64 {
    10
}

fn default_profile_ttl() -> u64 {
    30
}

fn default_refresh_interval() -> u64 {
    300
}

fn default_observer_concurrency() -> usize {
    8
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_url(),
            data_dir: default_data_dir(),
            home_system: None,
            home_station: None,
            request_timeout_secs: default_request_timeout(),
            profile_ttl_secs: default_profile_ttl(),
            refresh_interval_secs: default_refresh_interval(),
            observer_concurrency: default_observer_concurrency(),
            events_file: None,
        }
    }
}

impl CompanionConfig {
    /// Build the configuration from defaults plus environment overrides.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("COMPANION_API_URL") {
            self.api_base_url = url;
        }
        if let Some(dir) = lookup("COMPANION_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(system) = non_blank(lookup("COMPANION_HOME_SYSTEM")) {
            self.home_system = Some(system);
        }
        if let Some(station) = non_blank(lookup("COMPANION_HOME_STATION")) {
            self.home_station = Some(station);
        }
        if let Some(secs) = parse_number(&lookup, "COMPANION_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs;
        }
        if let Some(secs) = parse_number(&lookup, "COMPANION_REFRESH_INTERVAL_SECS") {
            self.refresh_interval_secs = secs;
        }
        if let Some(limit) = parse_number(&lookup, "COMPANION_OBSERVER_CONCURRENCY") {
            self.observer_concurrency = limit as usize;
        }
        if let Some(path) = non_blank(lookup("COMPANION_EVENTS_FILE")) {
            self.events_file = Some(PathBuf::from(path));
        }

        debug!(api = %self.api_base_url, data_dir = ?self.data_dir, "Configuration loaded");
        self
    }

    /// Reject settings the companion cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        let url = self.api_base_url.trim();
        if url.is_empty() {
            return Err("API base URL is empty".into());
        }
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(format!("API base URL must be http(s): {}", url));
        }
        if self.request_timeout_secs == 0 {
            return Err("Request timeout must be at least one second".into());
        }
        if self.observer_concurrency == 0 {
            return Err("Observer concurrency must be at least 1".into());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn profile_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_ttl_secs)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring non-numeric configuration override");
            None
        }
    }
}
