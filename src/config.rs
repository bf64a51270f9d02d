//! Configuration module for the echo workload.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::echo::{SessionOptions, BUFFERSIZE, ECHO_SERVER_PORT, LISTEN_BACKLOG, MAX_EVENTS};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the echo workload
#[derive(Parser, Debug)]
#[command(name = "echo-workload")]
#[command(author = "echo-workload authors")]
#[command(version = "0.1.0")]
#[command(about = "TCP echo client/server workload", long_about = None)]
pub struct CliArgs {
    /// Session mode: client, server, loopback or socketpair
    pub mode: String,

    /// Server host to connect to (client mode only)
    pub host: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Echo port shared by client and server
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Payload and echo buffer size in bytes
    #[arg(short, long)]
    pub buffer_size: Option<usize>,

    /// Milliseconds between scheduler ticks
    #[arg(long)]
    pub tick_interval_ms: Option<u64>,

    /// Stop after this many ticks
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// Share one echo buffer between all server peers
    #[arg(long)]
    pub shared_buffer: bool,

    /// Close the server listener when any peer disconnects
    #[arg(long)]
    pub close_listener_on_eof: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub echo: EchoConfig,
    #[serde(default)]
    pub compat: CompatConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Wire and buffer configuration
#[derive(Debug, Deserialize)]
pub struct EchoConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            buffer_size: default_buffer_size(),
            max_events: default_max_events(),
            backlog: default_backlog(),
        }
    }
}

/// Switches that restore legacy server behavior
#[derive(Debug, Deserialize, Default)]
pub struct CompatConfig {
    #[serde(default)]
    pub shared_server_buffer: bool,
    #[serde(default)]
    pub close_listener_on_peer_eof: bool,
}

/// Tick driver configuration
#[derive(Debug, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    pub max_ticks: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: None,
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

fn default_port() -> u16 {
    ECHO_SERVER_PORT
}

fn default_buffer_size() -> usize {
    BUFFERSIZE
}

fn default_max_events() -> usize {
    MAX_EVENTS
}

fn default_backlog() -> i32 {
    LISTEN_BACKLOG
}

fn default_tick_interval_ms() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Construction vector handed to the session: mode, then optional host.
    pub args: Vec<String>,
    pub session: SessionOptions,
    pub tick_interval: Duration,
    pub max_ticks: Option<u64>,
    pub log_level: String,
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

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let mut args = vec![cli.mode];
        args.extend(cli.host);

        Config {
            args,
            session: SessionOptions {
                port: cli.port.unwrap_or(toml_config.echo.port),
                buffer_size: cli.buffer_size.unwrap_or(toml_config.echo.buffer_size),
                max_events: toml_config.echo.max_events,
                backlog: toml_config.echo.backlog,
                shared_server_buffer: cli.shared_buffer
                    || toml_config.compat.shared_server_buffer,
                close_listener_on_peer_eof: cli.close_listener_on_eof
                    || toml_config.compat.close_listener_on_peer_eof,
            },
            tick_interval: Duration::from_millis(
                cli.tick_interval_ms
                    .unwrap_or(toml_config.scheduler.tick_interval_ms),
            ),
            max_ticks: cli.max_ticks.or(toml_config.scheduler.max_ticks),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
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
