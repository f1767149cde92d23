//! Configuration module for the scalebench server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Which message protocol the server speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// Structured JSON request/response
    Json,
    /// Plain-text ping/pong commands
    Text,
}

/// Command-line arguments for the benchmark server
#[derive(Parser, Debug)]
#[command(name = "scalebench")]
#[command(author = "scalebench authors")]
#[command(version = "0.1.0")]
#[command(about = "A concurrent TCP server for scalability benchmarking", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8000)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Message protocol variant
    #[arg(short = 'p', long, value_enum)]
    pub protocol: Option<ProtocolVariant>,

    /// Maximum number of simultaneous connections
    #[arg(short = 'n', long)]
    pub max_connections: Option<usize>,

    /// Idle timeout per connection in seconds
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Interval between periodic stats reports in seconds (0 disables)
    #[arg(long)]
    pub stats_interval: Option<u64>,

    /// Disable the adaptive per-message pacing delay
    #[arg(long)]
    pub no_pacing: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Message protocol variant
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolVariant,
    /// Maximum number of simultaneous connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Interval between periodic stats reports in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            protocol: default_protocol(),
            max_connections: default_max_connections(),
            stats_interval: default_stats_interval(),
        }
    }
}

/// Per-connection tuning
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    /// Adaptive per-message pacing delay
    #[serde(default = "default_pacing")]
    pub pacing: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
            pacing: default_pacing(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_protocol() -> ProtocolVariant {
    ProtocolVariant::Json
}

fn default_max_connections() -> usize {
    2000
}

fn default_stats_interval() -> u64 {
    10 // seconds
}

fn default_idle_timeout() -> u64 {
    30 // seconds
}

fn default_pacing() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub protocol: ProtocolVariant,
    pub max_connections: usize,
    pub idle_timeout: u64,
    pub stats_interval: u64,
    pub pacing: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Config {
        Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            protocol: cli.protocol.unwrap_or(toml_config.server.protocol),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            idle_timeout: cli
                .idle_timeout
                .unwrap_or(toml_config.connection.idle_timeout),
            stats_interval: cli
                .stats_interval
                .unwrap_or(toml_config.server.stats_interval),
            pacing: if cli.no_pacing {
                false
            } else {
                toml_config.connection.pacing
            },
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:8000");
        assert_eq!(config.server.protocol, ProtocolVariant::Json);
        assert_eq!(config.server.max_connections, 2000);
        assert_eq!(config.connection.idle_timeout, 30);
        assert!(config.connection.pacing);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:9000"
            protocol = "text"
            max_connections = 64
            stats_interval = 5

            [connection]
            idle_timeout = 120
            pacing = false

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.server.protocol, ProtocolVariant::Text);
        assert_eq!(config.server.max_connections, 64);
        assert_eq!(config.server.stats_interval, 5);
        assert_eq!(config.connection.idle_timeout, 120);
        assert!(!config.connection.pacing);
        assert_eq!(config.logging.level, "debug");
    }

    fn cli_defaults() -> CliArgs {
        CliArgs {
            config: None,
            listen: None,
            protocol: None,
            max_connections: None,
            idle_timeout: None,
            stats_interval: None,
            no_pacing: false,
            log_level: None,
        }
    }

    #[test]
    fn test_cli_overrides_toml_defaults() {
        let cli = CliArgs {
            listen: Some("127.0.0.1:7000".to_string()),
            protocol: Some(ProtocolVariant::Text),
            max_connections: Some(10),
            no_pacing: true,
            ..cli_defaults()
        };

        let config = Config::merge(cli, TomlConfig::default());
        assert_eq!(config.listen, "127.0.0.1:7000");
        assert_eq!(config.protocol, ProtocolVariant::Text);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.idle_timeout, 30);
        assert!(!config.pacing);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_explicit_log_level_beats_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [logging]
            level = "debug"
        "#,
        )
        .unwrap();

        // An explicit --log-level wins even when it matches the default
        let cli = CliArgs {
            log_level: Some("info".to_string()),
            ..cli_defaults()
        };
        let config = Config::merge(cli, toml_config);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_absent_log_level_falls_back_to_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [logging]
            level = "debug"
        "#,
        )
        .unwrap();

        let config = Config::merge(cli_defaults(), toml_config);
        assert_eq!(config.log_level, "debug");
    }
}
