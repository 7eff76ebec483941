//! Batched, duplicate-tolerant insertion.

use tracing::{info, warn};

use crate::core::{InsertOutcome, Row, TargetWriter};
use crate::error::Result;

use super::stats::CopyStats;

/// Write `rows` to `table` in batches of `batch_size`.
///
/// Existing keys are skipped. A batch the server rejects is retried row by
/// row; rows that still fail are logged and skipped. Only connection errors
/// are returned. The returned stats carry inserted and skipped counts.
pub async fn insert_batch<T: TargetWriter + ?Sized>(
    target: &T,
    table: &str,
    rows: &[Row],
    batch_size: usize,
) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    let total = rows.len();
    let mut processed = 0;

    for batch in rows.chunks(batch_size.max(1)) {
        match target.insert_rows(table, batch).await {
            Ok(affected) => {
                let inserted = affected.min(batch.len() as u64);
                stats.rows_inserted += inserted;
                stats.rows_skipped += batch.len() as u64 - inserted;
            }
            Err(e) if e.is_connection() => return Err(e),
            Err(e) => {
                warn!(
                    "{}: batch of {} row(s) failed, retrying row by row: {}",
                    table,
                    batch.len(),
                    e
                );
                let (inserted, skipped) = insert_one_by_one(target, table, batch).await?;
                stats.rows_inserted += inserted;
                stats.rows_skipped += skipped;
            }
        }

        processed += batch.len();
        info!("{}: {}/{} rows processed", table, processed, total);
    }

    Ok(stats)
}

async fn insert_one_by_one<T: TargetWriter + ?Sized>(
    target: &T,
    table: &str,
    batch: &[Row],
) -> Result<(u64, u64)> {
    let mut inserted = 0;
    let mut skipped = 0;

    for row in batch {
        match target.insert_row(table, row).await {
            Ok(InsertOutcome::Inserted) => inserted += 1,
            Ok(InsertOutcome::Duplicate) => skipped += 1,
            Ok(InsertOutcome::Failed(reason)) => {
                warn!("{}: skipping row id={}: {}", table, row.display_id(), reason);
                skipped += 1;
            }
            Err(e) if e.is_connection() => return Err(e),
            Err(e) => {
                warn!("{}: skipping row id={}: {}", table, row.display_id(), e);
                skipped += 1;
            }
        }
    }

    Ok((inserted, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use crate::memory::MemoryDatabase;

    fn account(id: i64) -> Row {
        Row::from_pairs([("id", SqlValue::Int(id)), ("balance", SqlValue::Int(0))])
    }

    #[tokio::test]
    async fn test_existing_rows_are_skipped() {
        let existing: Vec<Row> = (1..=10).map(account).collect();
        let target = MemoryDatabase::new("target").with_table("accounts", existing);
        let rows: Vec<Row> = (1..=50).map(account).collect();

        let stats = insert_batch(&target, "accounts", &rows, 100).await.unwrap();

        assert_eq!(stats.rows_inserted, 40);
        assert_eq!(stats.rows_skipped, 10);
        assert_eq!(target.row_count("accounts"), 50);
    }

    #[tokio::test]
    async fn test_batches_by_size() {
        let target = MemoryDatabase::new("target").with_table("accounts", vec![]);
        let rows: Vec<Row> = (1..=25).map(account).collect();

        insert_batch(&target, "accounts", &rows, 10).await.unwrap();

        assert_eq!(target.write_log().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_row_isolated() {
        let target = MemoryDatabase::new("target").with_table("accounts", vec![account(2)]);
        target.reject_row("accounts", 4);
        let rows: Vec<Row> = (1..=5).map(account).collect();

        let stats = insert_batch(&target, "accounts", &rows, 100).await.unwrap();

        assert_eq!(stats.rows_inserted, 3);
        assert_eq!(stats.rows_skipped, 2);
        assert!(target.row("accounts", 4).is_none());
        assert!(target.row("accounts", 5).is_some());
    }

    #[tokio::test]
    async fn test_connection_error_is_fatal() {
        let target = MemoryDatabase::new("target").with_table("accounts", vec![]);
        target.disconnect_after_batches(1);
        let rows: Vec<Row> = (1..=4).map(account).collect();

        let err = insert_batch(&target, "accounts", &rows, 2).await.unwrap_err();

        assert!(err.is_connection());
        assert_eq!(target.row_count("accounts"), 2);
    }
}
