//! # table-copy
//!
//! Dependency-ordered table copy between two MySQL/MariaDB databases with
//! foreign-key healing.
//!
//! A fixed catalog of tables is copied parent-first from a source database
//! into a target database:
//!
//! - **Dependency order** from a validated, static schema registry
//! - **Duplicate-safe inserts**: rows whose `id` already exists are skipped
//! - **Foreign-key healing**: references with no matching row in the target
//!   are set to NULL and counted
//! - **Batched lookups**: distinct foreign-key values are resolved with
//!   chunked `IN (...)` queries before a table is written
//!
//! ## Example
//!
//! ```rust,no_run
//! use table_copy::{Config, Orchestrator, SchemaRegistry};
//!
//! #[tokio::main]
//! async fn main() -> table_copy::Result<()> {
//!     let config = Config::from_env()?;
//!     let orchestrator = Orchestrator::connect(&config, SchemaRegistry::builtin()).await?;
//!     let report = orchestrator.run().await?;
//!     println!("Inserted {} rows", report.totals.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod copy;
pub mod core;
pub mod drivers;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod schema;

// Re-exports for convenient access
pub use config::{Config, CopyConfig, DatabaseConfig, FkStrategy};
pub use copy::{CopyStats, FkValidationSummary};
pub use crate::core::{InsertOutcome, PkValue, Row, SourceReader, SqlValue, TargetWriter};
pub use drivers::{MysqlReader, MysqlWriter};
pub use error::{CopyError, Result};
pub use memory::MemoryDatabase;
pub use orchestrator::{
    CopyReport, HealthCheckResult, Orchestrator, RowCountCheck, RunStatus, TableOutcome,
    TableReport,
};
pub use schema::{ForeignKeyRef, SchemaRegistry, TableSpec};
