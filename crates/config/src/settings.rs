//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Session audio format
    #[serde(default)]
    pub audio: AudioConfig,

    /// Session lifecycle configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Pipeline channel sizing
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// External-service retry policy
    #[serde(default)]
    pub services: ServiceRetryConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Load settings from an optional file plus the environment overlay.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let settings: Settings = builder
            .add_source(Environment::with_prefix("VOICEBRIDGE").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.channels != 1 {
            return Err(ConfigError::InvalidValue {
                field: "audio.channels".to_string(),
                message: "only mono audio is supported".to_string(),
            });
        }
        if !matches!(self.audio.sample_rate, 8000 | 16000 | 24000 | 48000) {
            return Err(ConfigError::InvalidValue {
                field: "audio.sample_rate".to_string(),
                message: format!(
                    "unsupported sample rate {} (use 8000, 16000, 24000, or 48000)",
                    self.audio.sample_rate
                ),
            });
        }
        if self.session.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.idle_timeout_secs".to_string(),
                message: "idle timeout must be at least one second".to_string(),
            });
        }
        if self.pipeline.stage_buffer == 0 || self.pipeline.input_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline".to_string(),
                message: "channel buffers must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket path
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

/// Session audio format, negotiated once per connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Channel count (mono only)
    #[serde(default = "default_channels")]
    pub channels: u8,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
        }
    }
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u8 {
    1
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Seconds without inbound audio before a session starts draining
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Upper bound on the draining phase before the session closes anyway
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,

    /// Interval of the expired-session cleanup task
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout(),
            drain_timeout_secs: default_drain_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_max_sessions() -> usize {
    100
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_drain_timeout() -> u64 {
    10
}

fn default_cleanup_interval() -> u64 {
    300
}

/// Pipeline channel sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Capacity of the pipeline input channel
    #[serde(default = "default_buffer")]
    pub input_buffer: usize,

    /// Capacity of each stage's merged output channel
    #[serde(default = "default_buffer")]
    pub stage_buffer: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            input_buffer: default_buffer(),
            stage_buffer: default_buffer(),
        }
    }
}

fn default_buffer() -> usize {
    64
}

/// External-service retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRetryConfig {
    /// Connection attempts before degrading
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for ServiceRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2000
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default log level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub log_json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
