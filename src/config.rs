//! Layered configuration for streamwatch.
//!
//! Settings are read from `streamwatch.toml`, then overridden by environment
//! variables, then by command-line flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:5000"
//! request_timeout_secs = 30
//!
//! [tracking]
//! connect_timeout_secs = 5
//! poll_interval_secs = 3
//! overall_timeout_secs = 300
//!
//! [defaults]
//! platform = "chaturbate"
//! ```
//!
//! The file is looked up at `--config`, then `.streamwatch/streamwatch.toml`
//! in the working directory, then `<config dir>/streamwatch/streamwatch.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::Platform;
use crate::tracker::TrackingConfig;

pub const CONFIG_FILE_NAME: &str = "streamwatch.toml";
pub const PROJECT_CONFIG_DIR: &str = ".streamwatch";
/// Upper bound for every `*_secs` setting (one week).
pub const MAX_SECS: u64 = 7 * 24 * 60 * 60;

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for one-shot requests (creation, status polls)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Delivery protocol timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingSection {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_overall_timeout_secs")]
    pub overall_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    crate::tracker::DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_poll_interval_secs() -> u64 {
    crate::tracker::DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_overall_timeout_secs() -> u64 {
    crate::tracker::DEFAULT_OVERALL_TIMEOUT.as_secs()
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            overall_timeout_secs: default_overall_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultsSection {
    /// Platform used when a room URL doesn't name a known domain
    #[serde(default)]
    pub platform: Platform,
}

/// Full configuration as stored in `streamwatch.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub tracking: TrackingSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse streamwatch.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the file layer: an explicit path must exist, otherwise the
    /// first existing default location wins, otherwise built-in defaults.
    pub fn discover(explicit: Option<&Path>, working_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        for candidate in Self::search_paths(working_dir) {
            if candidate.exists() {
                return Self::load(&candidate);
            }
        }
        Ok(Self::default())
    }

    pub fn search_paths(working_dir: &Path) -> Vec<PathBuf> {
        let mut paths = vec![working_dir.join(PROJECT_CONFIG_DIR).join(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("streamwatch").join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Apply `STREAMWATCH_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable source.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("STREAMWATCH_API_URL") {
            self.api.base_url = url;
        }
        if let Some(v) = lookup("STREAMWATCH_CONNECT_TIMEOUT") {
            self.tracking.connect_timeout_secs = parse_secs("STREAMWATCH_CONNECT_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("STREAMWATCH_POLL_INTERVAL") {
            self.tracking.poll_interval_secs = parse_secs("STREAMWATCH_POLL_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("STREAMWATCH_OVERALL_TIMEOUT") {
            self.tracking.overall_timeout_secs = parse_secs("STREAMWATCH_OVERALL_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("STREAMWATCH_PLATFORM") {
            self.defaults.platform = v.parse()?;
        }
        self.validate()
    }

    /// Apply command-line overrides; these win over file and environment.
    pub fn with_cli_args(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url {
            self.api.base_url = url;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            anyhow::bail!("api.base_url must not be empty");
        }
        let durations = [
            ("api.request_timeout_secs", self.api.request_timeout_secs),
            ("tracking.connect_timeout_secs", self.tracking.connect_timeout_secs),
            ("tracking.poll_interval_secs", self.tracking.poll_interval_secs),
            ("tracking.overall_timeout_secs", self.tracking.overall_timeout_secs),
        ];
        for (key, secs) in durations {
            if secs > MAX_SECS {
                anyhow::bail!("{} must be at most {} seconds, got {}", key, MAX_SECS, secs);
            }
        }
        if self.api.request_timeout_secs == 0 {
            anyhow::bail!("api.request_timeout_secs must be at least 1");
        }
        if self.tracking.poll_interval_secs == 0 {
            anyhow::bail!("tracking.poll_interval_secs must be at least 1");
        }
        if self.tracking.connect_timeout_secs == 0 {
            anyhow::bail!("tracking.connect_timeout_secs must be at least 1");
        }
        if self.tracking.overall_timeout_secs < self.tracking.connect_timeout_secs {
            anyhow::bail!(
                "tracking.overall_timeout_secs ({}) must not be shorter than connect_timeout_secs ({})",
                self.tracking.overall_timeout_secs,
                self.tracking.connect_timeout_secs
            );
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn tracking_config(&self) -> TrackingConfig {
        TrackingConfig::default()
            .with_connect_timeout(Duration::from_secs(self.tracking.connect_timeout_secs))
            .with_poll_interval(Duration::from_secs(self.tracking.poll_interval_secs))
            .with_overall_timeout(Duration::from_secs(self.tracking.overall_timeout_secs))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .with_context(|| format!("{} must be a whole number of seconds, got '{}'", key, value))
}
