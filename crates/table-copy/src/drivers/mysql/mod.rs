//! MySQL/MariaDB database driver.
//!
//! - [`MysqlReader`]: source side, reads whole tables (SQLx)
//! - [`MysqlWriter`]: target side, key lookups and duplicate-tolerant inserts
//!   (mysql_async)
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod reader;
mod writer;

pub use reader::MysqlReader;
pub use writer::MysqlWriter;
