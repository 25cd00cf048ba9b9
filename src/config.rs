//! Runtime configuration for connections and the server.
//!
//! [`ConnectionConfig`] and [`ServerConfig`] are the in-memory settings used
//! by the engine. [`Settings`] is the TOML file model read by the `gatewire`
//! binary; every field is optional in the file and falls back to the defaults
//! below.

use std::{
    fs,
    io,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{DEFAULT_MAX_FRAME_LENGTH, clamp_frame_length};

/// Default capacity of a connection's outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Default bound on waiting for queue space.
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(3);
/// Default interval between backlog checks.
pub const DEFAULT_BACKLOG_CHECK_INTERVAL: Duration = Duration::from_secs(1);
/// Default deadline for a blocked pump to be released.
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(3);
/// Default bound on graceful connection shutdown when the server stops.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection engine settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Capacity of the outbound queue.
    pub queue_capacity: usize,
    /// Largest payload accepted or sent, in bytes.
    pub max_frame_length: usize,
    /// Heartbeat interval `H`; a peer silent for `2H` is disconnected.
    /// `None` disables heartbeat checking.
    pub heartbeat_interval: Option<Duration>,
    /// Emit a zero-length frame on heartbeat ticks with no outbound traffic.
    pub keepalive: bool,
    /// Bound on waiting for queue space in `push`, `send` and graceful close.
    pub push_timeout: Duration,
    /// Interval of the slow-consumer check.
    pub backlog_check_interval: Duration,
    /// Deadline for a blocked pump to receive a release.
    pub block_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            heartbeat_interval: None,
            keepalive: true,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            backlog_check_interval: DEFAULT_BACKLOG_CHECK_INTERVAL,
            block_timeout: DEFAULT_BLOCK_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Set the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Set the outbound queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the maximum frame length.
    #[must_use]
    pub fn with_max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = len;
        self
    }

    /// Clamp values to the ranges the engine accepts.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use gatewire::config::ConnectionConfig;
    ///
    /// let cfg = ConnectionConfig {
    ///     queue_capacity: 0,
    ///     heartbeat_interval: Some(Duration::ZERO),
    ///     ..ConnectionConfig::default()
    /// }
    /// .normalized();
    /// assert_eq!(cfg.queue_capacity, 1);
    /// assert_eq!(cfg.heartbeat_interval, None);
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let min_tick = Duration::from_millis(1);
        self.queue_capacity = self.queue_capacity.max(1);
        self.max_frame_length = clamp_frame_length(self.max_frame_length);
        self.heartbeat_interval = self.heartbeat_interval.filter(|h| !h.is_zero());
        self.backlog_check_interval = self.backlog_check_interval.max(min_tick);
        self.block_timeout = self.block_timeout.max(min_tick);
        self
    }
}

/// Exponential back-off applied after `accept()` failures.
///
/// The first retry waits `initial_delay`; each further failure doubles the
/// wait up to `max_delay`. A successful accept resets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Raise both delays to at least 1 ms and order them.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use gatewire::config::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::ZERO,
    /// }
    /// .normalized();
    /// assert_eq!(cfg.initial_delay, Duration::from_millis(1));
    /// assert_eq!(cfg.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(self) -> Self {
        let floor = Duration::from_millis(1);
        let a = self.initial_delay.max(floor);
        let b = self.max_delay.max(floor);
        Self {
            initial_delay: a.min(b),
            max_delay: a.max(b),
        }
    }

    /// Delay to use after another failure following `current`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration { (current * 2).min(self.max_delay) }
}

/// Settings for [`crate::server::GateServer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Number of accept-loop workers.
    pub workers: usize,
    /// Back-off applied after accept failures.
    pub backoff: BackoffConfig,
    /// Bound on graceful shutdown of live connections.
    pub shutdown_timeout: Duration,
    /// Settings applied to every accepted connection.
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            backoff: BackoffConfig::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            connection: ConnectionConfig::default(),
        }
    }
}

fn default_workers() -> usize { thread::available_parallelism().map_or(1, NonZeroUsize::get) }

/// Errors raised while loading a settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path of the settings file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file is not valid TOML for [`Settings`].
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// Path of the settings file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
}

/// On-disk settings for the `gatewire` binary.
///
/// ```
/// use gatewire::config::Settings;
///
/// let settings: Settings = toml::from_str(
///     r#"
///     [server]
///     bind_address = "0.0.0.0:3553"
///
///     [connection]
///     heartbeat_interval_ms = 5000
///     "#,
/// )
/// .expect("valid settings");
/// let cfg = settings.server_config();
/// assert_eq!(
///     cfg.connection.heartbeat_interval,
///     Some(std::time::Duration::from_secs(5))
/// );
/// assert_eq!(cfg.connection.queue_capacity, 1024);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Per-connection settings.
    pub connection: ConnectionSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// `[server]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address the gateway listens on.
    pub bind_address: String,
    /// Accept workers; `None` uses the available parallelism.
    pub workers: Option<usize>,
    /// Bound on graceful shutdown of live connections, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3553".to_string(),
            workers: None,
            shutdown_timeout_ms: millis(DEFAULT_SHUTDOWN_TIMEOUT),
        }
    }
}

/// `[connection]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Outbound queue capacity.
    pub queue_capacity: usize,
    /// Largest payload in bytes.
    pub max_frame_length: usize,
    /// Heartbeat interval in milliseconds; 0 disables heartbeat checking.
    pub heartbeat_interval_ms: u64,
    /// Emit keepalive frames on idle heartbeat ticks.
    pub keepalive: bool,
    /// Bound on waiting for queue space, in milliseconds.
    pub push_timeout_ms: u64,
    /// Deadline for releasing a blocked connection, in milliseconds.
    pub block_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            heartbeat_interval_ms: 0,
            keepalive: true,
            push_timeout_ms: millis(DEFAULT_PUSH_TIMEOUT),
            block_timeout_ms: millis(DEFAULT_BLOCK_TIMEOUT),
        }
    }
}

/// `[logging]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level filter; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn millis(d: Duration) -> u64 { u64::try_from(d.as_millis()).unwrap_or(u64::MAX) }

impl Settings {
    /// Read and parse a TOML settings file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build the engine configuration described by these settings.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        let c = &self.connection;
        let connection = ConnectionConfig {
            queue_capacity: c.queue_capacity,
            max_frame_length: c.max_frame_length,
            heartbeat_interval: (c.heartbeat_interval_ms > 0)
                .then(|| Duration::from_millis(c.heartbeat_interval_ms)),
            keepalive: c.keepalive,
            push_timeout: Duration::from_millis(c.push_timeout_ms),
            backlog_check_interval: DEFAULT_BACKLOG_CHECK_INTERVAL,
            block_timeout: Duration::from_millis(c.block_timeout_ms),
        }
        .normalized();
        ServerConfig {
            workers: self.server.workers.unwrap_or_else(default_workers).max(1),
            backoff: BackoffConfig::default(),
            shutdown_timeout: Duration::from_millis(self.server.shutdown_timeout_ms),
            connection,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rstest::rstest;

    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let settings: Settings = toml::from_str("").expect("empty settings");
        assert_eq!(settings, Settings::default());
        let cfg = settings.server_config();
        assert_eq!(cfg.connection, ConnectionConfig::default());
        assert_eq!(cfg.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn loads_settings_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[server]\nworkers = 2\n\n[connection]\nqueue_capacity = 16\nheartbeat_interval_ms = \
             250\n\n[logging]\nlevel = \"debug\"\njson = true"
        )
        .expect("write settings");

        let settings = Settings::load(file.path()).expect("load settings");
        assert!(settings.logging.json);
        assert_eq!(settings.logging.level, "debug");

        let cfg = settings.server_config();
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.connection.queue_capacity, 16);
        assert_eq!(
            cfg.connection.heartbeat_interval,
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn missing_file_reports_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = Settings::load(dir.path().join("absent.toml")).expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[connection]\nqueue_capacity = \"many\"").expect("write settings");
        let err = Settings::load(file.path()).expect_err("bad settings");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[rstest]
    #[case(0, crate::codec::MIN_FRAME_LENGTH)]
    #[case(usize::MAX, crate::codec::MAX_FRAME_LENGTH)]
    fn normalized_clamps_frame_length(#[case] requested: usize, #[case] expected: usize) {
        let cfg = ConnectionConfig::default()
            .with_max_frame_length(requested)
            .normalized();
        assert_eq!(cfg.max_frame_length, expected);
    }
}
