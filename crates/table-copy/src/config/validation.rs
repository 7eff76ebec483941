//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::error::{CopyError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("target", &config.target)?;

    // Cannot copy a database onto itself
    if config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
    {
        return Err(CopyError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    if config.copy.batch_size == 0 {
        return Err(CopyError::Config(
            "copy.batch_size must be at least 1".into(),
        ));
    }

    Ok(())
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(CopyError::Config(format!("{}.host is required", side)));
    }
    if db.database.is_empty() {
        return Err(CopyError::Config(format!("{}.database is required", side)));
    }
    if db.user.is_empty() {
        return Err(CopyError::Config(format!("{}.user is required", side)));
    }
    if db.max_connections == 0 {
        return Err(CopyError::Config(format!(
            "{}.max_connections must be at least 1",
            side
        )));
    }
    match db.ssl_mode.to_lowercase().as_str() {
        "disable" | "prefer" | "require" | "verify-ca" | "verify_ca" | "verify-full"
        | "verify_identity" => Ok(()),
        other => Err(CopyError::Config(format!(
            "{}.ssl_mode '{}' is not one of disable, prefer, require, verify-ca, verify-full",
            side, other
        ))),
    }
}
