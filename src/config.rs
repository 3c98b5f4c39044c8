//! Configuration module for async-primer.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::demos::DemoKind;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "async-primer")]
#[command(version = "0.1.0")]
#[command(about = "Echo server/client and bounded work queue on a cooperative scheduler", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Echo every received byte back to the sender
    Server {
        /// Address to bind to (e.g., localhost:10000)
        #[arg(short = 'l', long)]
        listen: Option<String>,

        /// Maximum number of live connections
        #[arg(long)]
        max_connections: Option<usize>,
    },

    /// Send the messages to an echo server and print the response
    Client {
        /// Address of the echo server
        #[arg(long)]
        connect: Option<String>,

        /// Message to send; repeat for several chunks
        #[arg(short = 'm', long = "message")]
        messages: Vec<String>,
    },

    /// Run the producer/consumer pool
    Queue {
        /// Queue capacity (0 = unbounded)
        #[arg(long)]
        capacity: Option<usize>,

        /// Number of consumers
        #[arg(short = 'n', long)]
        consumers: Option<usize>,

        /// Number of work items
        #[arg(long)]
        items: Option<usize>,

        /// Simulated work per unit of item value, in milliseconds
        #[arg(long)]
        work_unit_ms: Option<u64>,
    },

    /// Run one of the primitive demos
    Demo {
        #[arg(value_enum)]
        name: DemoKind,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Address to bind to
    #[serde(default = "default_address")]
    pub listen: String,
    /// Maximum number of live connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// How long shutdown waits for live connections
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Whether connections may half-close
    #[serde(default = "default_true")]
    pub half_close: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_address(),
            max_connections: default_max_connections(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            half_close: true,
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    /// Address of the echo server
    #[serde(default = "default_address")]
    pub connect: String,
    /// Chunks to send, in order
    #[serde(default = "default_messages")]
    pub messages: Vec<String>,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            connect: default_address(),
            messages: default_messages(),
        }
    }
}

/// Work queue configuration
#[derive(Debug, Deserialize)]
pub struct QueueSection {
    /// Queue capacity, defaults to the consumer count
    pub capacity: Option<usize>,
    #[serde(default = "default_consumers")]
    pub consumers: usize,
    /// Number of work items, defaults to three per consumer
    pub items: Option<usize>,
    #[serde(default = "default_work_unit_ms")]
    pub work_unit_ms: u64,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            capacity: None,
            consumers: default_consumers(),
            items: None,
            work_unit_ms: default_work_unit_ms(),
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

fn default_address() -> String {
    "localhost:10000".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_shutdown_grace_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_messages() -> Vec<String> {
    vec![
        "This is the message".to_string(),
        "It will be sent".to_string(),
        "in parts.".to_string(),
    ]
}

fn default_consumers() -> usize {
    2
}

fn default_work_unit_ms() -> u64 {
    10
}

fn default_log_level() -> String {
    "debug".to_string()
}

/// Resolved echo server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    pub max_connections: usize,
    pub shutdown_grace: Duration,
    pub half_close: bool,
}

/// Resolved echo client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect: String,
    pub messages: Vec<String>,
}

/// Resolved work pool settings
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
    pub consumers: usize,
    pub items: usize,
    pub work_unit: Duration,
}

/// What the binary was asked to run
#[derive(Debug, Clone)]
pub enum Mode {
    Server(ServerConfig),
    Client(ClientConfig),
    Queue(QueueConfig),
    Demo(DemoKind),
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub mode: Mode,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve already-parsed CLI args, reading the TOML file they name.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over file values.
    pub fn merge(cli: CliArgs, file: TomlConfig) -> Result<Self, ConfigError> {
        let mode = match cli.command {
            Command::Server {
                listen,
                max_connections,
            } => Mode::Server(ServerConfig {
                listen: listen.unwrap_or(file.server.listen),
                max_connections: max_connections.unwrap_or(file.server.max_connections),
                shutdown_grace: Duration::from_millis(file.server.shutdown_grace_ms),
                half_close: file.server.half_close,
            }),

            Command::Client { connect, messages } => Mode::Client(ClientConfig {
                connect: connect.unwrap_or(file.client.connect),
                messages: if messages.is_empty() {
                    file.client.messages
                } else {
                    messages
                },
            }),

            Command::Queue {
                capacity,
                consumers,
                items,
                work_unit_ms,
            } => {
                let consumers = consumers.unwrap_or(file.queue.consumers);
                if consumers == 0 {
                    return Err(ConfigError::Invalid(
                        "queue needs at least one consumer".to_string(),
                    ));
                }
                Mode::Queue(QueueConfig {
                    capacity: capacity.or(file.queue.capacity).unwrap_or(consumers),
                    consumers,
                    items: items.or(file.queue.items).unwrap_or(consumers * 3),
                    work_unit: Duration::from_millis(
                        work_unit_ms.unwrap_or(file.queue.work_unit_ms),
                    ),
                })
            }

            Command::Demo { name } => Mode::Demo(name),
        };

        Ok(Config {
            log_level: cli.log_level.unwrap_or(file.logging.level),
            mode,
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
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
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
