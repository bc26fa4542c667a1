//! File-based settings
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard paths)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Sink selection schema

use crate::config::AuditConfig;
use crate::policy::EventCreationPolicy;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// Core audit settings
    pub audit: CoreSettings,

    /// Where events go
    pub sink: SinkSettings,
}

/// Core audit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Default event creation policy
    pub creation_policy: EventCreationPolicy,

    /// Capture machine, user and call-site details on every event
    pub include_environment: bool,

    /// Record the target's type name alongside its snapshots
    pub include_type_name: bool,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            creation_policy: EventCreationPolicy::default(),
            include_environment: true,
            include_type_name: true,
        }
    }
}

/// Sink selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    /// Sink kind (null, memory, file, jsonl, tracing)
    pub kind: String,

    /// Directory for `file`, log file for `jsonl`
    pub path: String,

    /// File name prefix for the `file` sink
    pub file_prefix: String,

    /// Flush after every append (`jsonl` only)
    pub flush_each: bool,
}

impl SinkSettings {
    pub const KINDS: [&'static str; 5] = ["null", "memory", "file", "jsonl", "tracing"];
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            kind: "jsonl".to_string(),
            path: default_data_dir()
                .join("events.jsonl")
                .to_string_lossy()
                .to_string(),
            file_prefix: "audit_".to_string(),
            flush_each: true,
        }
    }
}

impl AuditSettings {
    /// Push the scalar settings into a configuration context
    pub fn apply(&self, config: &AuditConfig) {
        config.set_creation_policy(self.audit.creation_policy);
        config.set_include_environment(self.audit.include_environment);
        config.set_include_type_name(self.audit.include_type_name);
        debug!(
            creation_policy = %self.audit.creation_policy,
            include_environment = self.audit.include_environment,
            "Applied audit settings"
        );
    }
}

/// Settings loader
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load settings with the following precedence:
    /// 1. CLI --config flag
    /// 2. TRAIL_CONFIG environment variable
    /// 3. <config dir>/trail/config.toml
    /// 4. /etc/trail/config.toml
    /// 5. Default values
    pub fn load(&self) -> ConfigResult<AuditSettings> {
        let mut settings = match self.find_config_file() {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                AuditSettings::default()
            }
        };

        Self::apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
        Self::validate(&settings)?;
        Ok(settings)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("CLI config path does not exist: {}", path.display());
        }

        if let Ok(env_path) = std::env::var("TRAIL_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("TRAIL_CONFIG path does not exist: {}", env_path);
        }

        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Some(path);
            }
        }

        #[cfg(unix)]
        {
            let path = PathBuf::from("/etc/trail/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Load settings from a TOML file
    pub fn load_from_file(path: &Path) -> ConfigResult<AuditSettings> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment variable overrides read through `var`
    fn apply_env_overrides<F>(settings: &mut AuditSettings, var: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = var("TRAIL_LOG_LEVEL") {
            settings.audit.log_level = val;
        }
        if let Some(val) = var("TRAIL_CREATION_POLICY") {
            settings.audit.creation_policy = val.parse().map_err(ConfigError::ValidationError)?;
        }
        if let Some(val) = var("TRAIL_SINK") {
            settings.sink.kind = val;
        }
        if let Some(val) = var("TRAIL_SINK_PATH") {
            settings.sink.path = val;
        }
        Ok(())
    }

    /// Validate settings
    pub fn validate(settings: &AuditSettings) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&settings.audit.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                settings.audit.log_level, valid_levels
            )));
        }

        let kind = settings.sink.kind.to_lowercase();
        if !SinkSettings::KINDS.contains(&kind.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid sink kind: {}. Must be one of: {:?}",
                settings.sink.kind,
                SinkSettings::KINDS
            )));
        }

        if matches!(kind.as_str(), "file" | "jsonl") && settings.sink.path.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Sink '{}' requires a path",
                kind
            )));
        }

        Ok(())
    }

    /// Save settings to a file
    pub fn save(settings: &AuditSettings, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(settings).map_err(|e| {
            ConfigError::ValidationError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Default config file path for the current platform
    pub fn default_config_path() -> Option<PathBuf> {
        BaseDirs::new().map(|d| d.config_dir().join("trail").join("config.toml"))
    }
}

/// Directory for locally stored events
pub fn default_data_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir)
        .join("trail")
}
