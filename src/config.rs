//! Configuration management for kv-session.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Args;
use crate::session::{CoordinatorConfig, DEFAULT_APPLICATION_NAME, DEFAULT_TIMEOUT_MINUTES};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session coordination settings.
    pub session: SessionSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Namespace tag for records written by this deployment.
    pub application_name: String,
    /// Idle timeout in minutes.
    pub timeout_minutes: u32,
    /// Raise store failures instead of logging and continuing.
    pub propagate_faults: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            propagate_faults: false,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = var("KV_SESSION_APP_NAME") {
            if !name.is_empty() {
                self.session.application_name = name;
            }
        }

        if let Some(minutes) = var("KV_SESSION_TIMEOUT_MINUTES") {
            if let Ok(minutes) = minutes.parse() {
                self.session.timeout_minutes = minutes;
            }
        }

        if let Some(flag) = var("KV_SESSION_PROPAGATE_FAULTS").as_deref().and_then(parse_flag) {
            self.session.propagate_faults = flag;
        }

        if let Some(level) = var("KV_SESSION_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref name) = args.app_name {
            self.session.application_name = name.clone();
        }

        if let Some(minutes) = args.timeout_minutes {
            self.session.timeout_minutes = minutes;
        }

        if args.propagate_faults {
            self.session.propagate_faults = true;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Validate and convert to the coordinator's settings.
    pub fn to_coordinator_config(&self) -> Result<CoordinatorConfig, ConfigError> {
        let name = self.session.application_name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "application_name",
                self.session.application_name.clone(),
            ));
        }

        if self.session.timeout_minutes == 0 {
            return Err(ConfigError::InvalidValue(
                "timeout_minutes",
                self.session.timeout_minutes.to_string(),
            ));
        }

        Ok(CoordinatorConfig {
            application_name: name.to_string(),
            timeout_minutes: self.session.timeout_minutes,
            propagate_faults: self.session.propagate_faults,
        })
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing error.
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
    /// A setting has an unusable value.
    #[error("invalid value for {0}: '{1}'")]
    InvalidValue(&'static str, String),
}
