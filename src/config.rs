use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::pipeline::analysis::ConversionLimits;
use crate::pipeline::intake::{IntakePolicy, PolicyOverrides};

/// Application-level constants
pub const APP_NAME: &str = "Deckflow";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overrides the data directory (tests, containers).
pub const DATA_DIR_ENV: &str = "DECKFLOW_DATA_DIR";
pub const ANALYZER_URL_ENV: &str = "DECKFLOW_ANALYZER_URL";
pub const TRANSFER_CONCURRENCY_ENV: &str = "DECKFLOW_TRANSFER_CONCURRENCY";

pub const CONFIG_FILE_NAME: &str = "deckflow.toml";
pub const DEFAULT_ANALYZER_URL: &str = "http://127.0.0.1:8787";
pub const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 120;

/// Get the application data directory
/// ~/Deckflow/ unless `DECKFLOW_DATA_DIR` is set. Falls back to the working
/// directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

pub fn database_path() -> PathBuf {
    app_data_dir().join("deckflow.db")
}

/// Root directory for `LocalStorageSink`.
pub fn storage_root() -> PathBuf {
    app_data_dir().join("storage")
}

pub fn config_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "deckflow=debug,deckflow_lib=debug,info"
    } else {
        "deckflow=info,deckflow_lib=info,warn"
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Runtime settings. Every field has a default, so a missing or partial
/// `deckflow.toml` is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analyzer_url: String,
    pub analyzer_timeout_secs: u64,
    /// Items in flight per batch transfer. 1 = strictly sequential.
    pub transfer_concurrency: usize,
    #[serde(deserialize_with = "batch_policy")]
    pub batch_policy: IntakePolicy,
    #[serde(deserialize_with = "single_document_policy")]
    pub single_document_policy: IntakePolicy,
    pub conversion: ConversionLimits,
}

fn batch_policy<'de, D: Deserializer<'de>>(de: D) -> Result<IntakePolicy, D::Error> {
    Ok(PolicyOverrides::deserialize(de)?.over(IntakePolicy::batch()))
}

fn single_document_policy<'de, D: Deserializer<'de>>(de: D) -> Result<IntakePolicy, D::Error> {
    Ok(PolicyOverrides::deserialize(de)?.over(IntakePolicy::single_document()))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            analyzer_url: DEFAULT_ANALYZER_URL.to_string(),
            analyzer_timeout_secs: DEFAULT_ANALYZER_TIMEOUT_SECS,
            transfer_concurrency: 1,
            batch_policy: IntakePolicy::batch(),
            single_document_policy: IntakePolicy::single_document(),
            conversion: ConversionLimits::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, apply environment overrides, validate. A missing file
    /// yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_toml_str(&std::fs::read_to_string(path)?)?
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup(ANALYZER_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.analyzer_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(TRANSFER_CONCURRENCY_ENV) {
            self.transfer_concurrency = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{TRANSFER_CONCURRENCY_ENV} must be a number, got {raw:?}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.analyzer_url.starts_with("http://") && !self.analyzer_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "analyzer_url must be http(s): {}",
                self.analyzer_url
            )));
        }
        if self.analyzer_timeout_secs == 0 {
            return Err(ConfigError::Invalid("analyzer_timeout_secs must be > 0".into()));
        }
        if self.transfer_concurrency == 0 {
            return Err(ConfigError::Invalid("transfer_concurrency must be >= 1".into()));
        }
        for (name, policy) in [
            ("batch_policy", &self.batch_policy),
            ("single_document_policy", &self.single_document_policy),
        ] {
            if policy.max_files == 0 || policy.max_file_bytes == 0 {
                return Err(ConfigError::Invalid(format!("{name} limits must be > 0")));
            }
        }
        if self.conversion.max_pages == 0 || self.conversion.max_dimension_px == 0 {
            return Err(ConfigError::Invalid("conversion limits must be > 0".into()));
        }
        Ok(())
    }
}
