//! Database driver implementations.
//!
//! Each driver implements the core traits for one database engine:
//!
//! - [`mysql`]: MySQL/MariaDB, for both the source and the target
//!
//! In-memory stand-ins for both sides live in [`crate::memory`].

pub mod mysql;

pub use mysql::{MysqlReader, MysqlWriter};
