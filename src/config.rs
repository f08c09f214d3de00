//! Configuration management for peownerfinder
//!
//! Configuration is loaded from `./config/peownerfinder.toml`, which `--init`
//! writes from the template compiled into the binary. Only the optional
//! `[rate_limit]` section falls back to defaults defined here.

use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/peownerfinder.toml";

/// Template written by `--init`
pub const DEFAULT_CONFIG: &str = include_str!("../config/peownerfinder.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Invalid address in '{field}': {address} (expected host:port format)")]
    InvalidAddress { field: String, address: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' is out of range: {reason}")]
    OutOfRange { field: String, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Web server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub static_dir: String,
    pub max_upload_mb: usize,
}

/// Locations of persisted state. Every file path is relative to `data_dir`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    pub settings_file: String,
    pub history_file: String,
    pub pe_firms_file: String,
    pub reports_dir: String,
    pub uploads_dir: String,
}

impl StorageConfig {
    fn resolve(&self, relative: &str) -> PathBuf {
        Path::new(&self.data_dir).join(relative)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.resolve(&self.settings_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.resolve(&self.history_file)
    }

    pub fn pe_firms_path(&self) -> PathBuf {
        self.resolve(&self.pe_firms_file)
    }

    pub fn reports_path(&self) -> PathBuf {
        self.resolve(&self.reports_dir)
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.resolve(&self.uploads_dir)
    }

    /// Storage rooted at `dir` with the standard file layout.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            data_dir: dir.to_string_lossy().into_owned(),
            settings_file: "settings.json".to_string(),
            history_file: "instance/history.json".to_string(),
            pe_firms_file: "pe_firms.json".to_string(),
            reports_dir: "reports".to_string(),
            uploads_dir: "uploads".to_string(),
        }
    }
}

/// Batch analysis tuning
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum in-flight research calls per stage
    pub concurrency: usize,
    /// Delay between submitting two research calls (milliseconds)
    pub submit_delay_ms: u64,
    /// Grace period between cancelling a pending batch and deleting its artifacts
    pub cancel_grace_ms: u64,
}

impl AnalysisConfig {
    pub fn submit_delay(&self) -> Duration {
        Duration::from_millis(self.submit_delay_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Gemini API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub parse_attempts: u32,
    #[serde(default = "default_google_search")]
    pub google_search: bool,
}

fn default_google_search() -> bool {
    true
}

/// Backoff strategy for retried requests
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Linear,
    Exponential,
}

/// Request rate limiting and retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum Gemini requests per second (0 = unlimited)
    #[serde(default)]
    pub requests_per_second: u32,
    #[serde(default = "default_backoff_strategy")]
    pub backoff_strategy: BackoffStrategy,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_delay_ms")]
    pub backoff_base_delay_ms: u64,
    #[serde(default = "default_backoff_max_delay_ms")]
    pub backoff_max_delay_ms: u64,
}

fn default_backoff_strategy() -> BackoffStrategy {
    BackoffStrategy::Exponential
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_max_delay_ms() -> u64 {
    30000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 0,
            backoff_strategy: default_backoff_strategy(),
            max_retries: default_max_retries(),
            backoff_base_delay_ms: default_backoff_base_delay_ms(),
            backoff_max_delay_ms: default_backoff_max_delay_ms(),
        }
    }
}

impl RateLimitConfig {
    /// Delay before retry number `attempt` (1-indexed). Attempt 0 never waits.
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = self.backoff_base_delay_ms;
        let delay_ms = match self.backoff_strategy {
            BackoffStrategy::Linear => base.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential => {
                let factor = 2u64.saturating_pow(attempt - 1);
                base.saturating_mul(factor)
            }
        };
        Duration::from_millis(delay_ms.min(self.backoff_max_delay_ms))
    }
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// The shipped template, parsed. Used by tests and by `--init` previews.
    pub fn from_default_template() -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_address.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "server.bind_address".to_string(),
            });
        }
        if !self.server.bind_address.contains(':') {
            return Err(ConfigError::InvalidAddress {
                field: "server.bind_address".to_string(),
                address: self.server.bind_address.clone(),
            });
        }
        if self.server.max_upload_mb == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "server.max_upload_mb".to_string(),
            });
        }

        for (field, value) in [
            ("storage.data_dir", &self.storage.data_dir),
            ("storage.settings_file", &self.storage.settings_file),
            ("storage.history_file", &self.storage.history_file),
            ("storage.pe_firms_file", &self.storage.pe_firms_file),
            ("storage.reports_dir", &self.storage.reports_dir),
            ("storage.uploads_dir", &self.storage.uploads_dir),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: field.to_string(),
                });
            }
        }

        if self.analysis.concurrency == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "analysis.concurrency".to_string(),
            });
        }

        if !self.gemini.base_url.starts_with("https://") && !self.gemini.base_url.starts_with("http://") {
            return Err(ConfigError::InvalidUrl {
                field: "gemini.base_url".to_string(),
                url: self.gemini.base_url.clone(),
            });
        }
        if self.gemini.model.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "gemini.model".to_string(),
            });
        }
        if self.gemini.request_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "gemini.request_timeout_secs".to_string(),
            });
        }
        if self.gemini.parse_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "gemini.parse_attempts".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.gemini.temperature) {
            return Err(ConfigError::OutOfRange {
                field: "gemini.temperature".to_string(),
                reason: format!("{} is not between 0.0 and 2.0", self.gemini.temperature),
            });
        }

        if self.rate_limit.backoff_max_delay_ms < self.rate_limit.backoff_base_delay_ms {
            return Err(ConfigError::OutOfRange {
                field: "rate_limit.backoff_max_delay_ms".to_string(),
                reason: "must not be smaller than backoff_base_delay_ms".to_string(),
            });
        }

        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        atty::is(atty::Stream::Stdin)
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config()?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}
