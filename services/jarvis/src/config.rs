//! Service configuration, loaded from the environment once at startup.

use std::env;
use std::path::PathBuf;

use secrecy::SecretString;
use tracing::Level;

// --- Application constants ---

/// Samples per microphone capture frame.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// Samples per playback device callback.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// Depth of the playback ring buffer in milliseconds.
pub const OUTPUT_LATENCY_MS: usize = 1000;
/// Interval between pending-playback pump passes, in milliseconds.
pub const PLAYBACK_PUMP_MS: u64 = 100;
/// Interval between HUD status gauge ticks, in seconds.
pub const STATUS_TICK_SECS: u64 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

/// Holds all configuration loaded from the environment.
pub struct Config {
    pub api_key: SecretString,
    pub realtime_model: Option<String>,
    pub memory_path: PathBuf,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `GEMINI_API_KEY`: Secret key for the hosted generative API. Required.
    // *   `REALTIME_MODEL`: (Optional) Overrides the realtime session model.
    // *   `MEMORY_PATH`: (Optional) Memory vault file. Defaults to "jarvis_memories.json".
    // *   `RUST_LOG`: (Optional) Logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env for local development; ignored when absent.
        dotenvy::dotenv().ok();

        let api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let realtime_model = env::var("REALTIME_MODEL").ok();

        let memory_path = env::var("MEMORY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("jarvis_memories.json"));

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            realtime_model,
            memory_path,
            log_level,
        })
    }
}
