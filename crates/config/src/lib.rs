//! Voicebridge configuration
//!
//! Layered settings: defaults, then an optional TOML file, then
//! `VOICEBRIDGE__`-prefixed environment variables.

pub mod settings;

pub use settings::{
    AudioConfig, ObservabilityConfig, PipelineSettings, ServerConfig, ServiceRetryConfig,
    SessionConfig, Settings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
