//! MySQL/MariaDB target writer implementation.
//!
//! Implements the `TargetWriter` trait for the target database. Uses
//! mysql_async for connection pooling and multi-row
//! `INSERT ... ON DUPLICATE KEY UPDATE` for duplicate-tolerant writes.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use mysql_async::prelude::*;
use mysql_async::{
    Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, SslOpts, TxOpts, Value,
};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::core::{
    quote_mysql, InsertOutcome, PkValue, Row, SqlValue, TargetWriter, ID_COLUMN,
};
use crate::error::{CopyError, Result};

/// MySQL max placeholders per prepared statement.
const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// MySQL target writer implementation using mysql_async.
pub struct MysqlWriter {
    pool: Pool,
}

impl MysqlWriter {
    /// Open the target pool and check it with `SELECT 1`.
    ///
    /// Under `prefer` (and unknown modes) a failed TLS connect is retried once
    /// without TLS, since mysql_async treats any `SslOpts` as mandatory.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let (ssl_opts, plaintext_fallback) = tls_options(&config.ssl_mode);

        let pool = match open_pool(config, ssl_opts).await {
            Ok(pool) => pool,
            Err(e) if plaintext_fallback => {
                warn!(
                    "TLS connection to {} failed ({}), retrying without TLS",
                    config.display_name(),
                    e
                );
                open_pool(config, None).await?
            }
            Err(e) => return Err(e),
        };

        info!("Connected to MySQL target: {}", config.display_name());

        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| CopyError::connection(e, "getting MySQL connection"))
    }
}

/// TLS options for an `ssl_mode`, and whether a failed TLS connect may fall
/// back to plaintext.
fn tls_options(ssl_mode: &str) -> (Option<SslOpts>, bool) {
    match ssl_mode.to_lowercase().as_str() {
        "disable" => {
            warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
            (None, false)
        }
        "prefer" => (Some(SslOpts::default().with_danger_accept_invalid_certs(true)), true),
        "require" => (Some(SslOpts::default().with_danger_accept_invalid_certs(true)), false),
        "verify-ca" | "verify_ca" => (
            Some(SslOpts::default().with_danger_skip_domain_validation(true)),
            false,
        ),
        "verify-full" | "verify_identity" => (Some(SslOpts::default()), false),
        _ => {
            warn!("Unknown ssl_mode '{}', defaulting to Preferred", ssl_mode);
            (Some(SslOpts::default().with_danger_accept_invalid_certs(true)), true)
        }
    }
}

/// Build a pool for `config` and check one connection from it.
///
/// The pool is disconnected again if the check fails.
async fn open_pool(config: &DatabaseConfig, ssl_opts: Option<SslOpts>) -> Result<Pool> {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(&config.host)
        .tcp_port(config.port)
        .db_name(Some(&config.database))
        .user(Some(&config.user))
        .pass(Some(&config.password))
        // Use utf8mb4 for full Unicode support
        .init(vec!["SET NAMES utf8mb4"]);

    if let Some(ssl) = ssl_opts {
        builder = builder.ssl_opts(ssl);
    }

    let constraints = PoolConstraints::new(1, config.max_connections.max(1)).unwrap_or_default();
    let pool_opts = PoolOpts::new().with_constraints(constraints);

    let opts: Opts = builder.pool_opts(pool_opts).into();
    let pool = Pool::new(opts);

    match check_pool(&pool).await {
        Ok(()) => Ok(pool),
        Err(e) => {
            if let Err(disconnect_err) = pool.disconnect().await {
                debug!("Error disconnecting failed pool: {}", disconnect_err);
            }
            Err(e)
        }
    }
}

async fn check_pool(pool: &Pool) -> Result<()> {
    let mut conn = pool
        .get_conn()
        .await
        .map_err(|e| CopyError::connection(e, "creating MySQL target pool"))?;

    conn.query_drop("SELECT 1")
        .await
        .map_err(|e| CopyError::connection(e, "testing MySQL target connection"))
}

/// Map a mysql_async error to the copy error taxonomy.
///
/// I/O and driver failures mean the connection is gone; server errors are a
/// failure of the statement against `table`.
pub(crate) fn classify(e: mysql_async::Error, table: &str, context: &str) -> CopyError {
    if matches!(e, mysql_async::Error::Io(_) | mysql_async::Error::Driver(_)) {
        CopyError::connection(e, format!("{} on {}", context, table))
    } else {
        CopyError::table(table, format!("{}: {}", context, e))
    }
}

/// `INSERT INTO t (cols) VALUES (?..), .. ON DUPLICATE KEY UPDATE id = id`.
fn build_insert_sql(table: &str, columns: &[String], row_count: usize) -> Result<String> {
    let col_list = columns
        .iter()
        .map(|c| quote_mysql(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let placeholders_per_row = format!("({})", vec!["?"; columns.len()].join(", "));
    let all_placeholders: Vec<String> =
        std::iter::repeat_n(placeholders_per_row, row_count).collect();
    let id = quote_mysql(ID_COLUMN)?;

    Ok(format!(
        "INSERT INTO {} ({}) VALUES {} ON DUPLICATE KEY UPDATE {} = {}",
        quote_mysql(table)?,
        col_list,
        all_placeholders.join(", "),
        id,
        id
    ))
}

/// One `SELECT n FROM DUAL WHERE EXISTS (.. id = ?)` branch per key, joined
/// with `UNION ALL`.
///
/// The server returns the position of each requested key it matches, so
/// equality follows MySQL's own comparison (numeric coercion, collation,
/// PAD SPACE).
fn build_lookup_sql(table: &str, key_count: usize) -> Result<String> {
    let id = quote_mysql(ID_COLUMN)?;
    let table = quote_mysql(table)?;
    let branches: Vec<String> = (0..key_count)
        .map(|n| {
            format!(
                "SELECT {} AS n FROM DUAL WHERE EXISTS (SELECT 1 FROM {} WHERE {} = ?)",
                n, table, id
            )
        })
        .collect();
    Ok(branches.join(" UNION ALL "))
}

/// Convert SqlValue to mysql_async::Value.
fn sql_value_to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::Int(i) => Value::Int(*i),
        SqlValue::UInt(u) => Value::UInt(*u),
        SqlValue::Float(f) => Value::Double(*f),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::Date(d) => {
            Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0)
        }
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            micros(t.nanosecond()),
        ),
        SqlValue::DateTime(dt) => Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            micros(dt.nanosecond()),
        ),
    }
}

// chrono carries leap seconds as nanos past 1e9
fn micros(nanos: u32) -> u32 {
    (nanos / 1_000).min(999_999)
}

fn key_to_mysql(key: &PkValue) -> Value {
    match key {
        PkValue::Int(i) => Value::Int(*i),
        PkValue::String(s) => Value::Bytes(s.as_bytes().to_vec()),
    }
}

/// The requested keys at the positions the server reported as present.
fn keys_at(keys: &[PkValue], positions: Vec<i64>) -> HashSet<PkValue> {
    positions
        .into_iter()
        .filter_map(|n| usize::try_from(n).ok())
        .filter_map(|n| keys.get(n).cloned())
        .collect()
}

#[async_trait]
impl TargetWriter for MysqlWriter {
    async fn count_rows(&self, table: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        let sql = format!("SELECT COUNT(*) AS cnt FROM {}", quote_mysql(table)?);
        let count: Option<i64> = conn
            .query_first(&sql)
            .await
            .map_err(|e| classify(e, table, "getting row count"))?;
        Ok(count.unwrap_or(0))
    }

    async fn existing_keys(&self, table: &str, keys: &[PkValue]) -> Result<HashSet<PkValue>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }

        let sql = build_lookup_sql(table, keys.len())?;
        let params: Vec<Value> = keys.iter().map(key_to_mysql).collect();

        let mut conn = self.conn().await?;
        let positions: Vec<i64> = conn
            .exec(&sql, params)
            .await
            .map_err(|e| classify(e, table, "looking up keys"))?;

        Ok(keys_at(keys, positions))
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<u64> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        if let Some(odd) = rows.iter().find(|r| !r.same_columns(first)) {
            return Err(CopyError::table(
                table,
                format!("row {} has a different column list", odd.display_id()),
            ));
        }

        let columns = first.columns();
        let max_rows_per_statement = MYSQL_MAX_PLACEHOLDERS / columns.len().max(1);

        let mut conn = self.conn().await?;
        let mut tx = conn
            .start_transaction(TxOpts::default())
            .await
            .map_err(|e| classify(e, table, "starting transaction"))?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(max_rows_per_statement.max(1)) {
            let sql = build_insert_sql(table, columns, chunk.len())?;
            let params: Vec<Value> = chunk
                .iter()
                .flat_map(|row| row.values().iter().map(sql_value_to_mysql))
                .collect();

            tx.exec_drop(&sql, params)
                .await
                .map_err(|e| classify(e, table, "INSERT batch"))?;
            inserted += tx.affected_rows();
        }

        tx.commit()
            .await
            .map_err(|e| classify(e, table, "committing batch"))?;

        debug!(
            "MySQL: inserted {} of {} rows into {}",
            inserted,
            rows.len(),
            table
        );
        Ok(inserted)
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<InsertOutcome> {
        let sql = build_insert_sql(table, row.columns(), 1)?;
        let params: Vec<Value> = row.values().iter().map(sql_value_to_mysql).collect();

        let mut conn = self.conn().await?;
        match conn.exec_drop(&sql, params).await {
            Ok(()) if conn.affected_rows() > 0 => Ok(InsertOutcome::Inserted),
            Ok(()) => Ok(InsertOutcome::Duplicate),
            Err(e) => match classify(e, table, "INSERT row") {
                err if err.is_connection() => Err(err),
                err => Ok(InsertOutcome::Failed(err.to_string())),
            },
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| CopyError::connection(e, "testing MySQL target connection"))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    #[test]
    fn test_tls_options() {
        let (opts, fallback) = tls_options("prefer");
        assert!(opts.is_some() && fallback);
        let (opts, fallback) = tls_options("PREFER");
        assert!(opts.is_some() && fallback);
        let (opts, fallback) = tls_options("require");
        assert!(opts.is_some() && !fallback);
        let (opts, fallback) = tls_options("verify_identity");
        assert!(opts.is_some() && !fallback);
        let (opts, fallback) = tls_options("disable");
        assert!(opts.is_none() && !fallback);
        let (opts, fallback) = tls_options("bogus");
        assert!(opts.is_some() && fallback);
    }

    #[test]
    fn test_build_insert_sql() {
        let columns = vec!["id".to_string(), "state_id".to_string()];
        let sql = build_insert_sql("client_bu", &columns, 2).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO `client_bu` (`id`, `state_id`) VALUES (?, ?), (?, ?) \
             ON DUPLICATE KEY UPDATE `id` = `id`"
        );
    }

    #[test]
    fn test_build_lookup_sql() {
        let sql = build_lookup_sql("state", 2).unwrap();
        assert_eq!(
            sql,
            "SELECT 0 AS n FROM DUAL WHERE EXISTS (SELECT 1 FROM `state` WHERE `id` = ?) \
             UNION ALL SELECT 1 AS n FROM DUAL WHERE EXISTS (SELECT 1 FROM `state` WHERE `id` = ?)"
        );
        assert_eq!(build_lookup_sql("state", 500).unwrap().matches('?').count(), 500);
    }

    #[test]
    fn test_sql_value_to_mysql() {
        assert_eq!(sql_value_to_mysql(&SqlValue::Null), Value::NULL);
        assert_eq!(sql_value_to_mysql(&SqlValue::Bool(true)), Value::Int(1));
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Decimal(Decimal::new(1850, 2))),
            Value::Bytes(b"18.50".to_vec())
        );
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Date(date)),
            Value::Date(2024, 3, 31, 0, 0, 0, 0)
        );
        let dt = date.and_hms_micro_opt(13, 5, 9, 250).unwrap();
        assert_eq!(
            sql_value_to_mysql(&SqlValue::DateTime(dt)),
            Value::Date(2024, 3, 31, 13, 5, 9, 250)
        );
        let time = NaiveTime::from_hms_opt(8, 30, 0).unwrap();
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Time(time)),
            Value::Time(false, 0, 8, 30, 0, 0)
        );
    }

    #[test]
    fn test_keys_at_returns_requested_spelling() {
        // the server matched '077' against INT 77 and 'mh ' against 'MH'
        let keys = vec![
            PkValue::String("077".into()),
            PkValue::Int(5),
            PkValue::String("mh ".into()),
        ];
        let found = keys_at(&keys, vec![0, 2]);
        assert_eq!(
            found,
            HashSet::from([PkValue::String("077".into()), PkValue::String("mh ".into())])
        );
        assert!(!found.contains(&PkValue::Int(5)));
        assert!(keys_at(&keys, vec![-1, 9]).is_empty());
    }
}
