//! Configuration module for the roomcast server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Command-line arguments for the chat server
#[derive(Parser, Debug)]
#[command(name = "roomcast")]
#[command(author = "roomcast authors")]
#[command(version = "0.1.0")]
#[command(about = "A multi-room chat server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8080)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Maximum number of simultaneous connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Maximum number of rooms, including "general"
    #[arg(long)]
    pub max_rooms: Option<usize>,

    /// Maximum number of members per room
    #[arg(long)]
    pub max_members: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rooms: RoomsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum number of simultaneous connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Readiness events fetched per poll
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: default_max_connections(),
            backlog: default_backlog(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Room-related configuration
#[derive(Debug, Deserialize)]
pub struct RoomsConfig {
    /// Maximum number of rooms, including "general"
    #[serde(default = "default_max_rooms")]
    pub max_rooms: usize,
    /// Maximum number of members per room
    #[serde(default = "default_max_members")]
    pub max_members: usize,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            max_rooms: default_max_rooms(),
            max_members: default_max_members(),
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
    "0.0.0.0:8080".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_backlog() -> i32 {
    128
}

fn default_event_capacity() -> usize {
    1024
}

fn default_max_rooms() -> usize {
    10
}

fn default_max_members() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub max_connections: usize,
    pub backlog: i32,
    pub event_capacity: usize,
    pub max_rooms: usize,
    pub max_members: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: default_max_connections(),
            backlog: default_backlog(),
            event_capacity: default_event_capacity(),
            max_rooms: default_max_rooms(),
            max_members: default_max_members(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(Some(cli), toml_config)
    }

    /// Merge CLI args over a parsed TOML config.
    fn resolve(cli: Option<CliArgs>, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let (listen, max_connections, max_rooms, max_members, cli_level) = match cli {
            Some(cli) => (
                cli.listen,
                cli.max_connections,
                cli.max_rooms,
                cli.max_members,
                cli.log_level,
            ),
            None => (None, None, None, None, default_log_level()),
        };

        let listen = listen.unwrap_or(toml_config.server.listen);
        let listen = listen
            .parse()
            .map_err(|_| ConfigError::InvalidListen(listen.clone()))?;

        Ok(Config {
            listen,
            max_connections: max_connections.unwrap_or(toml_config.server.max_connections),
            backlog: toml_config.server.backlog,
            event_capacity: toml_config.server.event_capacity,
            max_rooms: max_rooms.unwrap_or(toml_config.rooms.max_rooms),
            max_members: max_members.unwrap_or(toml_config.rooms.max_members),
            log_level: if cli_level != "info" {
                cli_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidListen(String),
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
            ConfigError::InvalidListen(addr) => {
                write!(f, "Invalid listen address '{}'", addr)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
