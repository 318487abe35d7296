//! Configuration handling for the SQLite tools MCP server.
//!
//! This module provides configuration management via CLI arguments and environment variables.
//! The database path is resolved once here and handed to the service; tool bodies never
//! look at the environment themselves.

use crate::db::ScopeSettings;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "demo.db";
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 60;

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// Streamable HTTP (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Configuration for the SQLite tools MCP server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sqlite-tools-mcp",
    about = "MCP server exposing a SQLite database as guarded tools, plus passthrough to other MCP servers",
    version,
    author
)]
pub struct Config {
    /// SQLite database file. Created on first use if missing.
    #[arg(
        short = 'd',
        long = "db-path",
        value_name = "PATH",
        default_value = DEFAULT_DB_PATH,
        env = "SQLITE_DB"
    )]
    pub db_path: PathBuf,

    /// Seconds to wait on a locked database before failing
    #[arg(
        long,
        default_value_t = DEFAULT_BUSY_TIMEOUT_SECS,
        env = "MCP_BUSY_TIMEOUT"
    )]
    pub busy_timeout: u64,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "MCP_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "MCP_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Upper bound in seconds for a single upstream proxy call
    #[arg(
        long,
        default_value_t = DEFAULT_PROXY_TIMEOUT_SECS,
        env = "MCP_PROXY_TIMEOUT"
    )]
    pub proxy_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (disabled by default to avoid interfering with stdio transport)
    #[arg(long, env = "MCP_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            busy_timeout: DEFAULT_BUSY_TIMEOUT_SECS,
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            proxy_timeout: DEFAULT_PROXY_TIMEOUT_SECS,
            log_level: "info".to_string(),
            json_logs: false,
            enable_logs: false,
        }
    }

    /// Validate values clap cannot check on its own.
    pub fn validate(&self) -> Result<(), String> {
        if self.db_path.as_os_str().is_empty() {
            return Err("db-path must not be empty".to_string());
        }
        if self.busy_timeout == 0 {
            return Err("busy-timeout must be greater than 0".to_string());
        }
        if self.proxy_timeout == 0 {
            return Err("proxy-timeout must be greater than 0".to_string());
        }
        if !self.mcp_endpoint.starts_with('/') {
            return Err(format!(
                "mcp-endpoint must start with '/', got '{}'",
                self.mcp_endpoint
            ));
        }
        Ok(())
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Get the busy timeout as a Duration.
    pub fn busy_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.busy_timeout)
    }

    /// Get the upstream proxy timeout as a Duration.
    pub fn proxy_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.proxy_timeout)
    }

    /// Settings for every connection scope opened by the service.
    pub fn scope_settings(&self) -> ScopeSettings {
        ScopeSettings::new(&self.db_path).with_busy_timeout(self.busy_timeout_duration())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
