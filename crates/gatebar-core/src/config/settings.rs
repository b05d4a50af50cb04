use crate::{Error, Result};
use gatebar_rpc::{INVALID_PARAMS, IgnoredErrorCodes};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::Directories;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub login: LoginConfig,

    #[serde(default)]
    pub query: QueryConfig,

    /// Verbose daemon flags, RPC traffic tracing and stderr logging
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_broker_log_file")]
    pub broker_log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_dirs(&Directories::new())
    }
}

impl Config {
    /// Defaults rooted at the given directories instead of the XDG ones
    #[must_use]
    pub fn with_dirs(dirs: &Directories) -> Self {
        Self {
            daemon: DaemonConfig::with_dirs(dirs),
            login: LoginConfig::default(),
            query: QueryConfig::default(),
            debug: false,
            broker_log_file: dirs.state.join("gatebar-broker.log"),
        }
    }

    /// Load config from file, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, "config.json");
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings that would leave the broker unusable.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.daemon.binary.as_os_str().is_empty() {
            return Err(Error::Config("daemon.binary must not be empty".into()));
        }
        if self.daemon.startup_poll_interval_ms == 0 {
            return Err(Error::Config(
                "daemon.startupPollIntervalMs must be greater than 0".into(),
            ));
        }
        if self.query.port == 0 {
            return Err(Error::Config("query.port must not be 0".into()));
        }
        if self.query.key.is_empty() {
            return Err(Error::Config("query.key must not be empty".into()));
        }
        Ok(())
    }
}

/// How the AppGate service is found, started and reached
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    /// Appended to `args` in debug mode
    #[serde(default = "default_debug_args")]
    pub debug_args: Vec<String>,

    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Sink for the service's stdout and stderr
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    #[serde(default = "default_poll_interval")]
    pub startup_poll_interval_ms: u64,

    /// Upper bound on waiting for the control socket; unbounded when absent
    #[serde(default)]
    pub startup_timeout_ms: Option<u64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::with_dirs(&Directories::new())
    }
}

impl DaemonConfig {
    #[must_use]
    pub fn with_dirs(dirs: &Directories) -> Self {
        Self {
            binary: default_binary(),
            args: Vec::new(),
            debug_args: default_debug_args(),
            socket_path: dirs.runtime.join(SOCKET_NAME),
            log_file: dirs.state.join(DAEMON_LOG_NAME),
            startup_poll_interval_ms: default_poll_interval(),
            startup_timeout_ms: None,
        }
    }

    /// Arguments for the service command line
    #[must_use]
    pub fn command_args(&self, debug: bool) -> Vec<&str> {
        let extra = if debug { self.debug_args.as_slice() } else { &[] };
        self.args
            .iter()
            .chain(extra)
            .map(String::as_str)
            .collect()
    }

    #[must_use]
    pub fn startup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.startup_poll_interval_ms)
    }

    #[must_use]
    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout_ms.map(Duration::from_millis)
    }
}

/// Startup handshake settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginConfig {
    #[serde(default = "default_true")]
    pub auto_login: bool,

    #[serde(default = "default_locale")]
    pub locale: String,

    /// Error codes the service reports during normal operation
    #[serde(default = "default_ignored_codes")]
    pub ignored_error_codes: Vec<i32>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            auto_login: true,
            locale: default_locale(),
            ignored_error_codes: default_ignored_codes(),
        }
    }
}

impl LoginConfig {
    #[must_use]
    pub fn ignored_codes(&self) -> IgnoredErrorCodes {
        self.ignored_error_codes.iter().copied().collect()
    }
}

/// Status-query endpoint settings, shared by the broker and the query client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_key")]
    pub key: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            key: default_key(),
        }
    }
}

impl QueryConfig {
    /// `host:port` for binding or connecting
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn key_bytes(&self) -> &[u8] {
        self.key.as_bytes()
    }
}

const SOCKET_NAME: &str = "appgate.service.sock";
const DAEMON_LOG_NAME: &str = "appgateservice.log";

fn default_binary() -> PathBuf {
    PathBuf::from("/opt/appgate/service/appgateservice")
}

fn default_debug_args() -> Vec<String> {
    vec!["-l".to_string(), "0".to_string()]
}

fn default_socket_path() -> PathBuf {
    Directories::new().runtime.join(SOCKET_NAME)
}

fn default_log_file() -> PathBuf {
    Directories::new().state.join(DAEMON_LOG_NAME)
}

fn default_broker_log_file() -> PathBuf {
    Directories::new().state.join("gatebar-broker.log")
}

fn default_poll_interval() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_ignored_codes() -> Vec<i32> {
    vec![INVALID_PARAMS]
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    2345
}

fn default_key() -> String {
    "polybar-appgate-mpc".to_string()
}
