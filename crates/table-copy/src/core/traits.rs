//! Core traits for the two sides of a copy.
//!
//! - [`SourceReader`]: reads whole tables from the source database
//! - [`TargetWriter`]: checks references against, and writes rows to, the target
//!
//! The copy engine only talks to these traits, so the MySQL drivers and the
//! in-memory database used by the tests are interchangeable.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

use super::row::Row;
use super::value::PkValue;

/// Outcome of writing a single row with the duplicate-tolerant insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was written.
    Inserted,
    /// A row with the same key already exists; nothing was changed.
    Duplicate,
    /// The server rejected the row for another reason (constraint, data).
    Failed(String),
}

/// Read data from a source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Check whether `table` exists in the source database.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Get the row count for a table.
    async fn count_rows(&self, table: &str) -> Result<i64>;

    /// Read every row of `table`.
    ///
    /// Each call reads fresh from the source. All rows of a fetch share one
    /// column list.
    async fn fetch_all(&self, table: &str) -> Result<Vec<Row>>;

    /// Round-trip a trivial query to prove the connection is alive.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g., "mysql").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Check and write rows in a target database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Get the row count for a table.
    async fn count_rows(&self, table: &str) -> Result<i64>;

    /// Return the subset of `keys` that match an `id` value in `table`.
    ///
    /// Matching follows the datastore's own comparison; the returned values
    /// are always taken from `keys`.
    ///
    /// Fails if the table does not exist.
    async fn existing_keys(&self, table: &str, keys: &[PkValue]) -> Result<HashSet<PkValue>>;

    /// Insert `rows` with one duplicate-tolerant statement.
    ///
    /// Rows whose key already exists are left untouched. Returns the number
    /// of rows actually inserted. The statement is all-or-nothing: on error
    /// no row of the batch was written.
    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<u64>;

    /// Insert one row with the duplicate-tolerant statement.
    ///
    /// Row-level rejections are reported as [`InsertOutcome::Failed`]; only
    /// connection failures are returned as errors.
    async fn insert_row(&self, table: &str, row: &Row) -> Result<InsertOutcome>;

    /// Round-trip a trivial query to prove the connection is alive.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g., "mysql").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

#[async_trait]
impl<T: SourceReader + ?Sized> SourceReader for Arc<T> {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        (**self).table_exists(table).await
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        (**self).count_rows(table).await
    }

    async fn fetch_all(&self, table: &str) -> Result<Vec<Row>> {
        (**self).fetch_all(table).await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }

    fn db_type(&self) -> &str {
        (**self).db_type()
    }

    async fn close(&self) {
        (**self).close().await
    }
}

#[async_trait]
impl<T: TargetWriter + ?Sized> TargetWriter for Arc<T> {
    async fn count_rows(&self, table: &str) -> Result<i64> {
        (**self).count_rows(table).await
    }

    async fn existing_keys(&self, table: &str, keys: &[PkValue]) -> Result<HashSet<PkValue>> {
        (**self).existing_keys(table, keys).await
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<u64> {
        (**self).insert_rows(table, rows).await
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<InsertOutcome> {
        (**self).insert_row(table, row).await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }

    fn db_type(&self) -> &str {
        (**self).db_type()
    }

    async fn close(&self) {
        (**self).close().await
    }
}
