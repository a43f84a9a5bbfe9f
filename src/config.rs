//! Coordinator configuration: time budgets, intervals, and the pair list.

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::session::UserId;

/// Configuration for the coordinator service, loadable from TOML.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    db_path: String,

    /// Host to bind the HTTP surface to.
    #[serde(default = "default_host")]
    host: String,

    /// Port to bind the HTTP surface to.
    #[serde(default = "default_port")]
    port: u16,

    /// Seconds before an unaccepted invite expires.
    #[serde(default = "default_invite_ttl_secs")]
    invite_ttl_secs: i64,

    /// Seconds between janitor sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    sweep_interval_secs: u64,

    /// Seconds a non-terminal session may live before force-cancellation.
    #[serde(default = "default_session_max_age_secs")]
    session_max_age_secs: i64,

    /// Seconds a terminal session is retained so both clients observe it.
    #[serde(default = "default_cleanup_grace_secs")]
    cleanup_grace_secs: i64,

    /// Milliseconds a mismatched memory pair stays face up.
    #[serde(default = "default_hide_delay_ms")]
    hide_delay_ms: u64,

    /// Pairs per memory deck.
    #[serde(default = "default_memory_pairs")]
    memory_pairs: usize,

    /// Registered partner pairs, e.g. `pairs = [["u1", "u2"]]`.
    #[serde(default)]
    pairs: Vec<(UserId, UserId)>,
}

fn default_db_path() -> String {
    "duet_games.db".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_invite_ttl_secs() -> i64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_session_max_age_secs() -> i64 {
    3600
}

fn default_cleanup_grace_secs() -> i64 {
    10
}

fn default_hide_delay_ms() -> u64 {
    1500
}

fn default_memory_pairs() -> usize {
    8
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            host: default_host(),
            port: default_port(),
            invite_ttl_secs: default_invite_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            session_max_age_secs: default_session_max_age_secs(),
            cleanup_grace_secs: default_cleanup_grace_secs(),
            hide_delay_ms: default_hide_delay_ms(),
            memory_pairs: default_memory_pairs(),
            pairs: Vec::new(),
        }
    }
}

impl CoordinatorConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!(
            db_path = %config.db_path,
            pairs = config.pairs.len(),
            "Config loaded successfully"
        );
        Ok(config)
    }

    /// Replaces the database path (CLI override).
    pub fn with_db_path(mut self, db_path: String) -> Self {
        self.db_path = db_path;
        self
    }

    /// Replaces the bind port (CLI override).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// The mismatch hide delay as a [`Duration`].
    pub fn hide_delay(&self) -> Duration {
        Duration::from_millis(self.hide_delay_ms)
    }

    /// The sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where the error originated.
    pub line: u32,
    /// Source file where the error originated.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error with caller location tracking.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
