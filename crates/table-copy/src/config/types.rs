//! Configuration type definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CopyError;

/// Default number of rows per insert statement.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default MySQL port.
pub const DEFAULT_PORT: u16 = 3306;

/// Default TLS mode.
pub const DEFAULT_SSL_MODE: &str = "prefer";

/// Default pool size per database.
pub const DEFAULT_MAX_CONNECTIONS: usize = 2;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database (rows are read from here).
    pub source: DatabaseConfig,

    /// Target database (rows are written here and references checked here).
    pub target: DatabaseConfig,

    /// Copy behavior configuration.
    #[serde(default)]
    pub copy: CopyConfig,
}

/// Connection settings for one MySQL/MariaDB database.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// TLS mode: disable, prefer, require, verify-ca, verify-full (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,

    /// Maximum pooled connections (default: 2).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl DatabaseConfig {
    /// `host:port/database`, for log lines.
    pub fn display_name(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Copy behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Rows per insert statement (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How foreign-key existence is resolved against the target.
    #[serde(default)]
    pub fk_strategy: FkStrategy,

    /// Log a per-column summary of missing references before cleaning (default: true).
    #[serde(default = "default_true")]
    pub validate_foreign_keys: bool,

    /// Restrict the run to these tables (empty: every registered table).
    #[serde(default)]
    pub tables: Vec<String>,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            fk_strategy: FkStrategy::default(),
            validate_foreign_keys: true,
            tables: Vec::new(),
        }
    }
}

/// Strategy for checking foreign-key values against the target.
///
/// Both strategies produce identical rows; they differ only in how many
/// queries reach the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FkStrategy {
    /// Collect distinct values per FK column once per table and resolve them
    /// with chunked `IN (...)` lookups before cleaning.
    #[default]
    Prefetch,

    /// Check each FK value of each row as the row is cleaned.
    PerRow,
}

impl FkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FkStrategy::Prefetch => "prefetch",
            FkStrategy::PerRow => "per_row",
        }
    }
}

impl FromStr for FkStrategy {
    type Err = CopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "prefetch" => Ok(FkStrategy::Prefetch),
            "per_row" | "row" => Ok(FkStrategy::PerRow),
            other => Err(CopyError::Config(format!(
                "unknown fk strategy '{}', expected 'prefetch' or 'per_row'",
                other
            ))),
        }
    }
}

impl fmt::Display for FkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Default value functions for serde
fn default_mysql_port() -> u16 {
    DEFAULT_PORT
}

fn default_prefer() -> String {
    DEFAULT_SSL_MODE.to_string()
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}
