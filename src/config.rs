//! Configuration module for greet-server.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values, which take
//! precedence over built-in defaults.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Port the server binds when nothing else is configured.
pub const DEFAULT_PORT: u16 = 1235;

/// Host the server binds when nothing else is configured (all interfaces).
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// How accepted connections are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    /// One connection at a time, handled to completion before the next accept.
    #[default]
    Sequential,
    /// One task per accepted connection. Enhancement over the sequential
    /// baseline; ordering between clients is no longer guaranteed.
    Concurrent,
}

/// Command-line arguments for the greeting server
#[derive(Parser, Debug)]
#[command(name = "greet-server")]
#[command(author = "greet-server authors")]
#[command(version = "0.1.0")]
#[command(about = "A line-oriented TCP greeting server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host or address to bind to (e.g., 0.0.0.0, 127.0.0.1, ::)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// TCP port to bind
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Connection scheduling mode
    #[arg(short, long, value_enum)]
    pub mode: Option<ServeMode>,

    /// Number of worker threads in concurrent mode (defaults to number of CPU cores)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Artificial delay before reading each request, in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub handler: HandlerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[server]` table
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub mode: ServeMode,
    pub workers: Option<usize>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mode: ServeMode::default(),
            workers: None,
        }
    }
}

/// `[handler]` table
#[derive(Debug, Deserialize)]
pub struct HandlerSection {
    /// Delay before the request line is read
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for HandlerSection {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
        }
    }
}

/// `[logging]` table
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_delay_ms() -> u64 {
    crate::handler::DEFAULT_DELAY.as_millis() as u64
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub mode: ServeMode,
    pub workers: Option<usize>,
    pub delay: Duration,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::empty(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from process arguments and an optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve already-parsed CLI arguments, reading the TOML file they point at.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = match cli.config {
            Some(ref path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::FileRead(path.clone(), e))?;
                toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(path.clone(), e))?
            }
            None => TomlConfig::default(),
        };

        Ok(Self::merge(cli, toml_config))
    }

    fn merge(cli: CliArgs, file: TomlConfig) -> Self {
        Config {
            host: cli.host.unwrap_or(file.server.host),
            port: cli.port.unwrap_or(file.server.port),
            mode: cli.mode.unwrap_or(file.server.mode),
            workers: cli.workers.or(file.server.workers),
            delay: Duration::from_millis(cli.delay_ms.unwrap_or(file.handler.delay_ms)),
            log_level: cli.log_level.unwrap_or(file.logging.level),
        }
    }

    /// `host:port` string suitable for address resolution.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl CliArgs {
    fn empty() -> Self {
        CliArgs {
            config: None,
            host: None,
            port: None,
            mode: None,
            workers: None,
            delay_ms: None,
            log_level: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}
