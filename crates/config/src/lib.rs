//! Configuration management for mixture training
//!
//! Supports loading configuration from:
//! - YAML/TOML files
//! - Environment variables (GAUSSMIX_ prefix, `__` between sections)
//! - Runtime overrides (plain struct fields)
//!
//! `TrainingConfig` is the explicit option set the trainer consumes. It is
//! validated up front: conflicting or out-of-range options are rejected
//! before any training work starts.

pub mod constants;
pub mod settings;
pub mod training;

pub use settings::{load_settings, load_settings_from, ObservabilityConfig, Settings};
pub use training::{InitStrategy, TrainingConfig};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Option {option} requires {requires}")]
    Conflict { option: String, requires: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(field) => ConfigError::MissingField(field),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}

impl From<ConfigError> for gaussmix_core::Error {
    fn from(err: ConfigError) -> Self {
        gaussmix_core::Error::Config(err.to_string())
    }
}
