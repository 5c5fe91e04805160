//! Runtime settings.
//!
//! Settings are layered, later sources overriding earlier ones:
//! - built-in defaults
//! - an optional TOML file (`--config`)
//! - environment variables
//!
//! # Environment Variables
//!
//! Environment variables are prefixed with `PROMCONFIGMGR_` and use double
//! underscores to separate nested levels:
//! - `PROMCONFIGMGR_DEBOUNCE_MS=1000` sets `debounce_ms`
//! - `PROMCONFIGMGR_RELOAD__URL=http://prometheus:9090/-/reload` sets `reload.url`
//! - `PROMCONFIGMGR_SOURCE__NAMESPACE=monitoring` sets `source.namespace`

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "PROMCONFIGMGR_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid settings: {0}")]
    Invalid(#[from] Box<figment::Error>),

    #[error("Invalid reload url '{url}': {reason}")]
    InvalidReloadUrl { url: String, reason: String },
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Quiet period after the last change before regenerating (milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Where fragments come from and which ones are eligible
    #[serde(default)]
    pub source: SourceConfig,

    /// On-disk output layout
    #[serde(default)]
    pub output: OutputConfig,

    /// Reload endpoint of the consuming process
    #[serde(default)]
    pub reload: ReloadConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SourceConfig {
    /// Annotation that must be set to exactly "true" for a fragment to be merged
    #[serde(default = "default_annotation")]
    pub annotation: String,

    /// Restrict the watch to one namespace (all namespaces when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Label selector applied to the watch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// Name of the primary document, both inside fragments and in the target dir
    #[serde(default = "default_primary_file")]
    pub primary_file: String,

    /// Directory (relative to the target dir) holding auxiliary files
    #[serde(default = "default_rule_dir")]
    pub rule_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReloadConfig {
    /// Endpoint receiving the reload POST
    #[serde(default = "default_reload_url")]
    pub url: String,

    /// Wait between failed reload attempts (milliseconds)
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level applied to every target without an override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `kube_runtime = "warn"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_debounce_ms() -> u64 {
    5_000
}
fn default_annotation() -> String {
    "prometheus.io/config".to_string()
}
fn default_primary_file() -> String {
    "prometheus.yml".to_string()
}
fn default_rule_dir() -> String {
    "rule_files".to_string()
}
fn default_reload_url() -> String {
    "http://localhost:9090/-/reload".to_string()
}
fn default_backoff_ms() -> u64 {
    5_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            source: SourceConfig::default(),
            output: OutputConfig::default(),
            reload: ReloadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            annotation: default_annotation(),
            namespace: None,
            label_selector: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            primary_file: default_primary_file(),
            rule_dir: default_rule_dir(),
        }
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            url: default_reload_url(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional TOML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }

        let settings: Settings = figment
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract::<Settings>()
            .map_err(Box::new)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would only fail later, deep inside the control loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.reload.url).map_err(|e| ConfigError::InvalidReloadUrl {
            url: self.reload.url.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl ReloadConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
