use dispatch::DispatchConfig;
use grouping::DEFAULT_WORKER_POOL_SIZE;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// The debug value that disables authentication enforcement on the sample
/// edge.
const AUTH_EXEMPT_DEBUG_VALUE: &str = "VisualStudio";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub listener: Listener,
    pub admin_listener: AdminListener,
    pub dispatch: DispatchConfig,
    pub grouping: GroupingConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub debug: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 6666,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AdminListener {
    pub host: String,
    pub port: u16,
}

impl Default for AdminListener {
    fn default() -> Self {
        AdminListener {
            host: "0.0.0.0".into(),
            port: 6667,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GroupingConfig {
    pub worker_pool_size: usize,
    /// Base URL for relative task targets; defaults to the own listener.
    pub base_url: Option<String>,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        GroupingConfig {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            base_url: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub statsd_host: Option<String>,
    pub statsd_port: u16,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Loads the config file when one is given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Applies the environment overrides of the sample edge:
    /// `USER_SCRIPT_ROOT`, `SERVER_HOST`, `SERVER_PORT` and `SERVER_DEBUG`.
    pub fn apply_env(&mut self) {
        if let Ok(root) = std::env::var("USER_SCRIPT_ROOT")
            && !root.is_empty()
        {
            self.dispatch.script_root = root.into();
        }
        if let Ok(host) = std::env::var("SERVER_HOST")
            && !host.is_empty()
        {
            self.listener.host = host;
        }
        if let Ok(port) = std::env::var("SERVER_PORT") {
            match port.parse() {
                Ok(port) => self.listener.port = port,
                Err(_) => tracing::warn!(%port, "Ignoring invalid SERVER_PORT"),
            }
        }
        if let Ok(debug) = std::env::var("SERVER_DEBUG") {
            self.dispatch.disable_auth = debug == AUTH_EXEMPT_DEBUG_VALUE;
            self.debug = Some(debug);
        }
    }
}
