//! Error types for the copy engine.
//!
//! Only two kinds of error ever stop a run: losing a database connection and a
//! table-level failure the engine cannot classify. Everything else (missing or
//! empty source tables, dangling references, rejected rows) is absorbed where
//! it happens and surfaces only as a count in the final report.

use thiserror::Error;

/// Exit code for configuration errors (bad YAML, missing variables).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code when a source or target connection cannot be opened or is lost.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for an unrecoverable error while copying a table.
pub const EXIT_TABLE_ERROR: u8 = 3;
/// Exit code for file I/O errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for copy operations.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Configuration error (invalid YAML, missing variables, bad registry).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or target connection could not be opened or was lost.
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// A query against a table failed in a way the engine cannot absorb.
    #[error("Copy failed for table {table}: {message}")]
    Table { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CopyError {
    /// Create a Connection error with context about where it occurred.
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        CopyError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Table error.
    pub fn table(table: impl Into<String>, message: impl ToString) -> Self {
        CopyError::Table {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error means the connection itself is gone.
    ///
    /// The batch inserter uses this to tell a dead connection (fatal) apart
    /// from a statement the server rejected (retry row by row).
    pub fn is_connection(&self) -> bool {
        matches!(self, CopyError::Connection { .. })
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CopyError::Config(_) | CopyError::Yaml(_) | CopyError::Json(_) => EXIT_CONFIG_ERROR,
            CopyError::Connection { .. } => EXIT_CONNECTION_ERROR,
            CopyError::Table { .. } => EXIT_TABLE_ERROR,
            CopyError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CopyError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            CopyError::connection("refused", "opening source").exit_code(),
            EXIT_CONNECTION_ERROR
        );
        assert_eq!(CopyError::table("state", "boom").exit_code(), EXIT_TABLE_ERROR);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(CopyError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_is_connection() {
        assert!(CopyError::connection("reset by peer", "insert").is_connection());
        assert!(!CopyError::table("accounts", "syntax").is_connection());
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CopyError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: denied"));
    }

    #[test]
    fn test_table_error_message() {
        let err = CopyError::table("client_bu", "Unknown column 'x'");
        assert_eq!(
            err.to_string(),
            "Copy failed for table client_bu: Unknown column 'x'"
        );
    }
}
