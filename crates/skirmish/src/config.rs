//! # Configuration
//!
//! One TOML file per process, loaded once at startup. Every section and
//! every field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! [rules]
//! winning_score = 3
//!
//! [reliability]
//! retry_interval_ms = 500
//! max_attempts = 10
//!
//! [session]
//! heartbeat_interval_ms = 1000
//!
//! [network]
//! broker = "192.168.1.200:1883"
//! ```

use serde::Deserialize;
use skirmish_core::{CoreError, Rules};
use skirmish_networking::{NetworkConditions, ReliabilityConfig, SessionConfig};
use skirmish_shared::constants::{BROKER_ADDR, BROKER_BIND};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Match rules are unplayable.
    #[error(transparent)]
    Rules(#[from] CoreError),

    /// An address does not resolve.
    #[error("cannot resolve [network] {field} = {value:?}")]
    Address {
        /// Offending key.
        field: &'static str,
        /// Configured value.
        value: String,
    },

    /// A value is out of range.
    #[error("invalid [{section}] {field}: {reason}")]
    Invalid {
        /// TOML section.
        section: &'static str,
        /// Offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Addresses for the relay broker and its clients.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Broker address clients connect to.
    pub broker: String,
    /// Address the broker listens on.
    pub broker_bind: String,
    /// Local address clients bind to.
    pub client_bind: String,
    /// Broker forgets clients silent for this long.
    pub client_timeout_ms: u64,
    /// A client link is down when the broker has not answered for this long.
    pub link_liveness_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            broker: BROKER_ADDR.to_string(),
            broker_bind: BROKER_BIND.to_string(),
            client_bind: "0.0.0.0:0".to_string(),
            client_timeout_ms: 30_000,
            link_liveness_ms: 3_000,
        }
    }
}

impl NetworkConfig {
    /// Broker client expiry.
    #[must_use]
    pub const fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    /// Link liveness window.
    #[must_use]
    pub const fn link_liveness(&self) -> Duration {
        Duration::from_millis(self.link_liveness_ms)
    }

    /// Resolves [`NetworkConfig::broker`].
    ///
    /// # Errors
    ///
    /// Fails if the name does not resolve.
    pub fn broker_addr(&self) -> Result<SocketAddr, ConfigError> {
        resolve("broker", &self.broker)
    }

    /// Resolves [`NetworkConfig::client_bind`].
    ///
    /// # Errors
    ///
    /// Fails if the address does not parse.
    pub fn client_bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        resolve("client_bind", &self.client_bind)
    }
}

fn resolve(field: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::Address {
            field,
            value: value.to_string(),
        })
}

/// Event loop pacing.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Period of the loop tick.
    pub tick_interval_ms: u64,
    /// Period of unit telemetry.
    pub telemetry_interval_ms: u64,
    /// Capacity of the per-process event queue.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
            telemetry_interval_ms: 2_000,
            queue_capacity: 1024,
        }
    }
}

impl RuntimeConfig {
    /// Loop tick period.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Telemetry period.
    #[must_use]
    pub const fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }
}

/// Everything a Skirmish process can be configured with.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SkirmishConfig {
    /// `[rules]`
    pub rules: Rules,
    /// `[reliability]`
    pub reliability: ReliabilityConfig,
    /// `[session]`
    pub session: SessionConfig,
    /// `[network]`
    pub network: NetworkConfig,
    /// `[runtime]`
    pub runtime: RuntimeConfig,
    /// `[simulation]`: radio conditions for the in-process match simulation.
    pub simulation: NetworkConditions,
}

impl SkirmishConfig {
    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, does not parse, or holds values
    /// that would make the match unplayable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Same as [`SkirmishConfig::load`], minus the I/O.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rules.validate()?;

        let r = &self.reliability;
        if r.retry_interval_ms == 0 {
            return Err(invalid("reliability", "retry_interval_ms", "must be positive"));
        }
        if r.backoff_factor < 1.0 {
            return Err(invalid("reliability", "backoff_factor", "must be at least 1.0"));
        }
        if r.max_retry_interval_ms < r.retry_interval_ms {
            return Err(invalid("reliability", "max_retry_interval_ms", "must not be below retry_interval_ms"));
        }
        if r.max_attempts == 0 {
            return Err(invalid("reliability", "max_attempts", "must be positive"));
        }
        if r.dedup_window == 0 || r.dedup_window > 64 {
            return Err(invalid("reliability", "dedup_window", "must be in 1..=64"));
        }

        let s = &self.session;
        if s.heartbeat_interval_ms == 0 {
            return Err(invalid("session", "heartbeat_interval_ms", "must be positive"));
        }
        if s.link_timeout_ms <= s.heartbeat_interval_ms {
            return Err(invalid("session", "link_timeout_ms", "must exceed heartbeat_interval_ms"));
        }
        if s.reconnect_max_ms < s.reconnect_initial_ms {
            return Err(invalid("session", "reconnect_max_ms", "must not be below reconnect_initial_ms"));
        }

        if self.network.broker.is_empty() {
            return Err(invalid("network", "broker", "must not be empty"));
        }
        if self.runtime.tick_interval_ms == 0 {
            return Err(invalid("runtime", "tick_interval_ms", "must be positive"));
        }
        if self.runtime.queue_capacity == 0 {
            return Err(invalid("runtime", "queue_capacity", "must be positive"));
        }
        if self.simulation.loss_percent > 100 || self.simulation.duplicate_percent > 100 {
            return Err(invalid("simulation", "loss_percent", "percentages must be at most 100"));
        }
        Ok(())
    }
}

fn invalid(section: &'static str, field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        section,
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        let config = SkirmishConfig::from_toml("").unwrap();
        assert_eq!(config, SkirmishConfig::default());
        assert_eq!(config.reliability.retry_interval_ms, 500);
        assert_eq!(config.session.heartbeat_interval_ms, 1000);
        assert_eq!(config.rules.winning_score, 3);
    }

    #[test]
    fn test_partial_sections() {
        let config = SkirmishConfig::from_toml(
            r#"
            [rules]
            winning_score = 1
            red_base_code = "R"

            [reliability]
            max_attempts = 3

            [network]
            broker = "127.0.0.1:9000"

            [simulation]
            loss_percent = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.rules.winning_score, 1);
        assert_eq!(config.rules.red_base_code, "R");
        assert_eq!(config.rules.blue_base_code, "BASE-BLUE");
        assert_eq!(config.reliability.max_attempts, 3);
        assert_eq!(config.reliability.dedup_window, 64);
        assert_eq!(config.network.broker, "127.0.0.1:9000");
        assert_eq!(config.simulation.loss_percent, 20);
        assert_eq!(config.simulation.duplicate_percent, 0);
    }

    #[test]
    fn test_rejects_unplayable_values() {
        assert!(matches!(
            SkirmishConfig::from_toml("[rules]\nwinning_score = 4"),
            Err(ConfigError::Rules(_))
        ));
        assert!(matches!(
            SkirmishConfig::from_toml("[session]\nheartbeat_interval_ms = 5000\nlink_timeout_ms = 3000"),
            Err(ConfigError::Invalid { field: "link_timeout_ms", .. })
        ));
        assert!(matches!(
            SkirmishConfig::from_toml("[reliability]\ndedup_window = 128"),
            Err(ConfigError::Invalid { field: "dedup_window", .. })
        ));
        assert!(matches!(SkirmishConfig::from_toml("[rules\n"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_addresses() {
        let mut network = NetworkConfig {
            broker: "127.0.0.1:1883".to_string(),
            ..NetworkConfig::default()
        };
        assert_eq!(network.broker_addr().unwrap().port(), 1883);
        assert_eq!(network.client_bind_addr().unwrap().port(), 0);
        network.broker = "not an address".to_string();
        assert!(matches!(network.broker_addr(), Err(ConfigError::Address { field: "broker", .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SkirmishConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
