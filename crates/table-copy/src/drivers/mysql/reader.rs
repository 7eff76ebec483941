//! MySQL/MariaDB source reader implementation.
//!
//! Implements the `SourceReader` trait for reading whole tables from the
//! source database. Uses SQLx for connection pooling and async query execution.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{
    MySql, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode,
};
use sqlx::{Column, Decode, Row as _, Type, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::core::{quote_mysql, Row, SourceReader, SqlValue};
use crate::error::{CopyError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
}

impl MysqlReader {
    /// Open the source pool and check it with `SELECT 1`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode(&config.ssl_mode));

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections.max(1) as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| CopyError::connection(e, "creating MySQL source pool"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| CopyError::connection(e, "testing MySQL source connection"))?;

        info!("Connected to MySQL source: {}", config.display_name());

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }
}

fn ssl_mode(mode: &str) -> MySqlSslMode {
    match mode.to_lowercase().as_str() {
        "disable" => {
            warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
            MySqlSslMode::Disabled
        }
        "prefer" => MySqlSslMode::Preferred,
        "require" => MySqlSslMode::Required,
        "verify-ca" | "verify_ca" => MySqlSslMode::VerifyCa,
        "verify-full" | "verify_identity" => MySqlSslMode::VerifyIdentity,
        other => {
            warn!("Unknown ssl_mode '{}', defaulting to Preferred", other);
            MySqlSslMode::Preferred
        }
    }
}

/// Map a SQLx error to the copy error taxonomy.
///
/// Transport and pool failures mean the connection is gone; anything else is
/// a failure of the statement against `table`.
pub(crate) fn classify(e: sqlx::Error, table: &str, context: &str) -> CopyError {
    let lost = matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    );
    if lost {
        CopyError::connection(e, context)
    } else {
        CopyError::table(table, format!("{}: {}", context, e))
    }
}

fn decode<'r, T>(row: &'r MySqlRow, idx: usize) -> Option<T>
where
    T: Decode<'r, MySql> + Type<MySql>,
{
    row.try_get::<T, _>(idx).ok()
}

/// How a column is decoded, chosen from its reported type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Signed,
    Unsigned,
    Float,
    Double,
    Decimal,
    Date,
    Time,
    DateTime,
    Bytes,
    Text,
}

/// `BOOLEAN` is how the server reports `TINYINT(1)`, which holds any value in
/// -128..=127, so it decodes as a plain integer.
fn column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        t if t.ends_with("UNSIGNED") && !t.starts_with("DECIMAL") => ColumnKind::Unsigned,
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => ColumnKind::Signed,
        "FLOAT" => ColumnKind::Float,
        "DOUBLE" => ColumnKind::Double,
        t if t.starts_with("DECIMAL") => ColumnKind::Decimal,
        "DATE" => ColumnKind::Date,
        "TIME" => ColumnKind::Time,
        "DATETIME" | "TIMESTAMP" => ColumnKind::DateTime,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => ColumnKind::Bytes,
        _ => ColumnKind::Text,
    }
}

/// Convert one column of a MySQL row to a `SqlValue`, keyed on the column's
/// reported type name.
fn decode_value(row: &MySqlRow, idx: usize, type_name: &str) -> SqlValue {
    let is_null = row.try_get_raw(idx).map(|r| r.is_null()).unwrap_or(true);
    if is_null {
        return SqlValue::Null;
    }

    let type_name = type_name.to_uppercase();
    let value = match column_kind(&type_name) {
        ColumnKind::Signed => decode::<i64>(row, idx)
            .or_else(|| decode::<i8>(row, idx).map(i64::from))
            .map(SqlValue::Int),
        ColumnKind::Unsigned => decode::<u64>(row, idx).map(SqlValue::UInt),
        ColumnKind::Float => decode::<f32>(row, idx).map(|v| SqlValue::Float(f64::from(v))),
        ColumnKind::Double => decode::<f64>(row, idx).map(SqlValue::Float),
        ColumnKind::Decimal => decode::<rust_decimal::Decimal>(row, idx).map(SqlValue::Decimal),
        ColumnKind::Date => decode::<chrono::NaiveDate>(row, idx).map(SqlValue::Date),
        ColumnKind::Time => decode::<chrono::NaiveTime>(row, idx).map(SqlValue::Time),
        ColumnKind::DateTime => {
            decode::<chrono::NaiveDateTime>(row, idx).map(SqlValue::DateTime)
        }
        ColumnKind::Bytes => decode::<Vec<u8>>(row, idx).map(SqlValue::Bytes),
        ColumnKind::Text => decode::<String>(row, idx).map(SqlValue::Text),
    };

    value
        .or_else(|| decode::<String>(row, idx).map(SqlValue::Text))
        .or_else(|| decode::<Vec<u8>>(row, idx).map(SqlValue::Bytes))
        .unwrap_or_else(|| {
            debug!("column {} of type {} could not be decoded", idx, type_name);
            SqlValue::Null
        })
}

fn convert_rows(rows: &[MySqlRow]) -> Vec<Row> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };

    let columns: Arc<[String]> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let type_names: Vec<String> = first
        .columns()
        .iter()
        .map(|c| c.type_info().name().to_string())
        .collect();

    rows.iter()
        .map(|row| {
            let values = type_names
                .iter()
                .enumerate()
                .map(|(idx, type_name)| decode_value(row, idx, type_name))
                .collect();
            Row::new(Arc::clone(&columns), values)
        })
        .collect()
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let query = r#"
            SELECT COUNT(*) AS cnt FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#;

        let row: MySqlRow = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, table, "checking table existence"))?;

        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| classify(e, table, "checking table existence"))?;
        Ok(count > 0)
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*) AS cnt FROM {}", quote_mysql(table)?);

        let row: MySqlRow = sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, table, "getting row count"))?;

        row.try_get::<i64, _>("cnt")
            .map_err(|e| classify(e, table, "getting row count"))
    }

    async fn fetch_all(&self, table: &str) -> Result<Vec<Row>> {
        let query = format!("SELECT * FROM {}", quote_mysql(table)?);

        let rows: Vec<MySqlRow> = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, table, "fetching rows"))?;

        debug!("MySQL: fetched {} rows from {}", rows.len(), table);
        Ok(convert_rows(&rows))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CopyError::connection(e, "testing MySQL source connection"))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(ssl_mode("disable"), MySqlSslMode::Disabled));
        assert!(matches!(ssl_mode("REQUIRE"), MySqlSslMode::Required));
        assert!(matches!(ssl_mode("verify_identity"), MySqlSslMode::VerifyIdentity));
        assert!(matches!(ssl_mode("bogus"), MySqlSslMode::Preferred));
    }

    #[test]
    fn test_classify() {
        assert!(classify(sqlx::Error::PoolTimedOut, "state", "fetching rows").is_connection());
        let err = classify(sqlx::Error::RowNotFound, "state", "fetching rows");
        assert!(matches!(err, CopyError::Table { ref table, .. } if table == "state"));
    }

    #[test]
    fn test_column_kind() {
        assert_eq!(column_kind("BOOLEAN"), ColumnKind::Signed);
        assert_eq!(column_kind("TINYINT"), ColumnKind::Signed);
        assert_eq!(column_kind("INT UNSIGNED"), ColumnKind::Unsigned);
        assert_eq!(column_kind("DECIMAL"), ColumnKind::Decimal);
        assert_eq!(column_kind("TIMESTAMP"), ColumnKind::DateTime);
        assert_eq!(column_kind("VARBINARY"), ColumnKind::Bytes);
        assert_eq!(column_kind("VARCHAR"), ColumnKind::Text);
    }

    #[test]
    fn test_tinyint_one_keeps_its_value_as_a_key() {
        // a TINYINT(1) column holding 2 must key as 2, not as "true"
        assert_eq!(column_kind("BOOLEAN"), ColumnKind::Signed);
        assert_eq!(SqlValue::Int(2).as_key(), Some(crate::core::PkValue::Int(2)));
        assert_eq!(SqlValue::Int(-1).as_key(), Some(crate::core::PkValue::Int(-1)));
    }

    #[test]
    fn test_convert_rows_empty() {
        assert!(convert_rows(&[]).is_empty());
    }
}
