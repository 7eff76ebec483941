//! Configuration loading and validation.
//!
//! Configuration normally comes from the environment (`SOURCE_DB_*`,
//! `TARGET_DB_*`, `COPY_*`). A YAML file with the same structure can be used
//! instead.

mod types;
mod validation;

pub use types::*;

use crate::error::{CopyError, Result};
use std::path::Path;
use std::str::FromStr;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = EnvVars { lookup: &lookup };

        let mut copy = CopyConfig::default();
        if let Some(size) = vars.parsed::<usize>("COPY_BATCH_SIZE")? {
            copy.batch_size = size;
        }
        if let Some(strategy) = vars.get("COPY_FK_STRATEGY") {
            copy.fk_strategy = FkStrategy::from_str(&strategy)?;
        }
        if let Some(flag) = vars.get("COPY_VALIDATE_FKS") {
            copy.validate_foreign_keys = parse_bool("COPY_VALIDATE_FKS", &flag)?;
        }
        if let Some(tables) = vars.get("COPY_TABLES") {
            copy.tables = tables
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }

        let config = Config {
            source: vars.database("SOURCE_DB")?,
            target: vars.database("TARGET_DB")?,
            copy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

struct EnvVars<'a, F> {
    lookup: &'a F,
}

impl<F> EnvVars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| CopyError::Config(format!("{} is not set", key)))
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| CopyError::Config(format!("{} has invalid value '{}'", key, raw))),
            None => Ok(None),
        }
    }

    fn database(&self, prefix: &str) -> Result<DatabaseConfig> {
        Ok(DatabaseConfig {
            host: self.required(&format!("{}_HOST", prefix))?,
            port: self
                .parsed(&format!("{}_PORT", prefix))?
                .unwrap_or(DEFAULT_PORT),
            database: self.required(&format!("{}_NAME", prefix))?,
            user: self.required(&format!("{}_USER", prefix))?,
            password: self
                .get(&format!("{}_PASSWORD", prefix))
                .unwrap_or_default(),
            ssl_mode: self
                .get(&format!("{}_SSL_MODE", prefix))
                .unwrap_or_else(|| DEFAULT_SSL_MODE.to_string()),
            max_connections: self
                .parsed(&format!("{}_MAX_CONNECTIONS", prefix))?
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(CopyError::Config(format!(
            "{} has invalid value '{}'",
            key, raw
        ))),
    }
}
