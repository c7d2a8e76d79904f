// Server configuration.
//
// Layers, lowest precedence first: built-in defaults, the optional TOML file
// (`~/.watchtrack/config.toml`), `WATCHTRACK_*` environment variables, and
// finally command-line flags applied by the binary.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use watchtrack_common::interval::MergePolicy;

use crate::engine::TrackerConfig;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_LOG_FILTER: &str = "info";

/// Root directory for local state: `~/.watchtrack/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".watchtrack"))
}

/// Path to the default config file: `~/.watchtrack/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Default SQLite database location: `~/.watchtrack/progress.db`.
pub fn default_db_path() -> PathBuf {
    global_dir().unwrap_or_else(|| PathBuf::from(".watchtrack")).join("progress.db")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: `{value}` ({reason})")]
    Invalid { key: &'static str, value: String, reason: &'static str },
}

impl ConfigError {
    fn invalid(key: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Self::Invalid { key, value: value.to_string(), reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Memory,
}

impl FromStr for StoreKind {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            _ => Err("expected `sqlite` or `memory`"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err("expected `pretty` or `json`"),
        }
    }
}

/// Contents of the optional TOML config file. Every key may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub store: Option<StoreKind>,
    pub db_path: Option<PathBuf>,
    pub cors_origins: Option<String>,
    pub log_filter: Option<String>,
    pub log_format: Option<LogFormat>,
    pub min_segment_secs: Option<f64>,
    pub merge_tolerance_secs: Option<f64>,
    pub lock_timeout_ms: Option<u64>,
    pub max_conflict_retries: Option<u32>,
}

impl FileConfig {
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        toml::from_str(&contents)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Load the config file named by `explicit`, `WATCHTRACK_CONFIG`, or the
    /// default location, in that order.
    ///
    /// An explicitly named file must exist. A missing default file yields an
    /// empty config.
    pub fn locate_and_load<F>(explicit: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        if let Ok(path) = env("WATCHTRACK_CONFIG") {
            return Self::load_from(Path::new(&path));
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub store: StoreKind,
    /// SQLite file, ignored by the memory store.
    pub db_path: PathBuf,
    /// Comma-separated CORS origins (or `"*"` for any). `None` uses cors.rs defaults.
    pub cors_origins: Option<String>,
    pub log_filter: String,
    pub log_format: LogFormat,
    pub tracker: TrackerConfig,
}

impl ServerConfig {
    /// Resolve configuration from the process environment on top of `file`.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `WATCHTRACK_HOST` | `0.0.0.0` |
    /// | `WATCHTRACK_PORT` | `5000` |
    /// | `WATCHTRACK_STORE` | `sqlite` |
    /// | `WATCHTRACK_DB_PATH` | `~/.watchtrack/progress.db` |
    /// | `WATCHTRACK_CORS_ORIGINS` | *(none, cors.rs uses localhost:3000)* |
    /// | `WATCHTRACK_LOG_FILTER` | `info` |
    /// | `WATCHTRACK_LOG_FORMAT` | `pretty` |
    /// | `WATCHTRACK_MIN_SEGMENT_SECS` | `1.0` |
    /// | `WATCHTRACK_MERGE_TOLERANCE_SECS` | `1.0` |
    /// | `WATCHTRACK_LOCK_TIMEOUT_MS` | `5000` |
    /// | `WATCHTRACK_MAX_CONFLICT_RETRIES` | `3` |
    pub fn from_env(file: FileConfig) -> Result<Self, ConfigError> {
        Self::from_env_fn(file, |key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    pub fn from_env_fn<F>(file: FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let var = |key: &str| env(key).ok().filter(|v| !v.trim().is_empty());

        let host = var("WATCHTRACK_HOST")
            .or(file.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let ip: IpAddr = host
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid("WATCHTRACK_HOST", &host, "expected an IP address"))?;
        let port = match var("WATCHTRACK_PORT") {
            Some(raw) => parse_env("WATCHTRACK_PORT", &raw, "expected a port number")?,
            None => file.port.unwrap_or(DEFAULT_PORT),
        };

        let store = match var("WATCHTRACK_STORE") {
            Some(raw) => StoreKind::from_str(&raw)
                .map_err(|reason| ConfigError::invalid("WATCHTRACK_STORE", &raw, reason))?,
            None => file.store.unwrap_or_default(),
        };
        let db_path = var("WATCHTRACK_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(default_db_path);
        let cors_origins = var("WATCHTRACK_CORS_ORIGINS").or(file.cors_origins);

        let log_filter = var("WATCHTRACK_LOG_FILTER")
            .or(file.log_filter)
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned());
        let log_format = match var("WATCHTRACK_LOG_FORMAT") {
            Some(raw) => LogFormat::from_str(&raw)
                .map_err(|reason| ConfigError::invalid("WATCHTRACK_LOG_FORMAT", &raw, reason))?,
            None => file.log_format.unwrap_or_default(),
        };

        let defaults = TrackerConfig::default();
        let min_duration = match var("WATCHTRACK_MIN_SEGMENT_SECS") {
            Some(raw) => parse_env("WATCHTRACK_MIN_SEGMENT_SECS", &raw, "expected seconds")?,
            None => file.min_segment_secs.unwrap_or(defaults.policy.min_duration),
        };
        let tolerance = match var("WATCHTRACK_MERGE_TOLERANCE_SECS") {
            Some(raw) => parse_env("WATCHTRACK_MERGE_TOLERANCE_SECS", &raw, "expected seconds")?,
            None => file.merge_tolerance_secs.unwrap_or(defaults.policy.tolerance),
        };
        let lock_timeout_ms: u64 = match var("WATCHTRACK_LOCK_TIMEOUT_MS") {
            Some(raw) => parse_env("WATCHTRACK_LOCK_TIMEOUT_MS", &raw, "expected milliseconds")?,
            None => file
                .lock_timeout_ms
                .unwrap_or(defaults.lock_timeout.as_millis() as u64),
        };
        let max_conflict_retries = match var("WATCHTRACK_MAX_CONFLICT_RETRIES") {
            Some(raw) => parse_env("WATCHTRACK_MAX_CONFLICT_RETRIES", &raw, "expected a count")?,
            None => file.max_conflict_retries.unwrap_or(defaults.max_conflict_retries),
        };

        if !(min_duration.is_finite() && min_duration >= 0.0) {
            return Err(ConfigError::invalid(
                "min_segment_secs",
                min_duration,
                "must be a non-negative number",
            ));
        }
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(ConfigError::invalid(
                "merge_tolerance_secs",
                tolerance,
                "must be a non-negative number",
            ));
        }
        if lock_timeout_ms == 0 {
            return Err(ConfigError::invalid("lock_timeout_ms", 0, "must be positive"));
        }

        Ok(Self {
            listen_addr: SocketAddr::new(ip, port),
            store,
            db_path,
            cors_origins,
            log_filter,
            log_format,
            tracker: TrackerConfig {
                policy: MergePolicy { min_duration, tolerance },
                lock_timeout: Duration::from_millis(lock_timeout_ms),
                max_conflict_retries,
            },
        })
    }
}

fn parse_env<T: FromStr>(key: &'static str, raw: &str, reason: &'static str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::invalid(key, raw, reason))
}
