//! Broadcaster configuration.
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file passed with `--config`,
//! 3. environment variables (or a `.env` file via `dotenvy`),
//! 4. the `--hostname` / `--port` command-line flags.
//!
//! ```toml
//! hostname = "0.0.0.0"
//! port = 8080
//! allowed-hosts = ["localhost:8080", "chat.example.com"]
//! index-path = "static/index.html"
//! log-format = "json"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Parser;
use serde::Deserialize;

const DEFAULT_HOSTNAME: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_INDEX_PATH: &str = "static/index.html";

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "broadcast-hub", version)]
#[command(about = "Relays every WebSocket message to every connected client")]
pub struct Cli {
    /// TOML configuration file to load
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Hostname to listen on
    #[arg(long)]
    pub hostname: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Errors raised while loading configuration. All of them are fatal at
/// startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration file {path}: {source}")]
    Io {
        /// Path of the file that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has unexpected keys.
    #[error("cannot parse configuration file {path}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// On-disk shape of the configuration file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FileConfig {
    hostname: Option<String>,
    port: Option<u16>,
    allowed_hosts: Option<Vec<String>>,
    index_path: Option<PathBuf>,
    log_format: Option<LogFormat>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Top-level broadcaster configuration.
///
/// Loaded once at startup via [`BroadcasterConfig::load`] and passed
/// explicitly to whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcasterConfig {
    /// Hostname or address to bind the HTTP server to.
    pub hostname: String,

    /// Port to bind the HTTP server to.
    pub port: u16,

    /// Hostnames whose pages may open a WebSocket. Each entry is compared
    /// against the `Origin` header as `http://<host>` or `https://<host>`.
    /// Defaults to `localhost:<port>` and `127.0.0.1:<port>`.
    pub allowed_hosts: Vec<String>,

    /// HTML file served at `/`.
    pub index_path: PathBuf,

    /// Log output format.
    pub log_format: LogFormat,
}

impl BroadcasterConfig {
    /// Loads configuration from the file named in `cli` (if any), the
    /// environment, and the command-line overrides.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a configuration file was given but
    /// cannot be read or parsed.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let file = cli.config.as_deref().map(FileConfig::load).transpose()?;
        Ok(Self::resolve(cli, file.unwrap_or_default(), |key| {
            std::env::var(key).ok()
        }))
    }

    /// Returns the `hostname:port` string the server listens on.
    #[must_use]
    pub fn listen_host(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    fn resolve<F>(cli: &Cli, file: FileConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let hostname = cli.hostname.clone().unwrap_or_else(|| {
            parse_env(
                &env,
                "BROADCASTER_HOSTNAME",
                file.hostname.unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
            )
        });

        let port = cli.port.unwrap_or_else(|| {
            parse_env(&env, "BROADCASTER_PORT", file.port.unwrap_or(DEFAULT_PORT))
        });

        let allowed_hosts = parse_env_list(&env, "BROADCASTER_ALLOWED_HOSTS")
            .or(file.allowed_hosts)
            .unwrap_or_else(|| vec![format!("localhost:{port}"), format!("127.0.0.1:{port}")]);

        let index_path = parse_env(
            &env,
            "BROADCASTER_INDEX_PATH",
            file.index_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_PATH)),
        );

        let log_format = parse_env(&env, "LOG_FORMAT", file.log_format.unwrap_or_default());

        Self {
            hostname,
            port,
            allowed_hosts,
            index_path,
            log_format,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing,
/// empty or invalid values.
fn parse_env<T, F>(env: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a comma-separated environment variable into a list, skipping
/// blank entries. Returns `None` when the variable is missing or blank.
fn parse_env_list<F>(env: &F, key: &str) -> Option<Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let list: Vec<String> = env(key)?
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect();
    (!list.is_empty()).then_some(list)
}
