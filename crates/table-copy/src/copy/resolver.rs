//! Foreign-key healing.
//!
//! Every non-null foreign-key value of a row is checked against the `id`
//! column of the referenced table in the target. Values with no match, values
//! that cannot be a key, and values whose lookup failed are set to NULL in the
//! copy that gets inserted.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::FkStrategy;
use crate::core::{PkValue, Row, TargetWriter};
use crate::error::Result;
use crate::schema::ForeignKeyRef;

use super::stats::{FkColumnSummary, FkValidationSummary};

/// Maximum number of keys per `IN (...)` lookup.
pub const LOOKUP_CHUNK_SIZE: usize = 500;

/// Rows ready for insertion.
#[derive(Debug, Clone, Default)]
pub struct CleanedRows {
    pub rows: Vec<Row>,
    /// Foreign-key values set to NULL, one per value.
    pub nullified: u64,
}

/// Resolved existence of referenced keys, per referenced table.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    tables: HashMap<String, HashMap<PkValue, bool>>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, table: &str, key: PkValue, exists: bool) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key, exists);
    }

    /// `None` if `key` has not been looked up yet.
    pub fn lookup(&self, table: &str, key: &PkValue) -> Option<bool> {
        self.tables.get(table)?.get(key).copied()
    }

    pub fn exists(&self, table: &str, key: &PkValue) -> bool {
        self.lookup(table, key) == Some(true)
    }

    /// Number of resolved keys.
    pub fn len(&self) -> usize {
        self.tables.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Checks foreign-key values of fetched rows against the target.
pub struct ReferenceResolver<'a, T: ?Sized> {
    target: &'a T,
    strategy: FkStrategy,
}

impl<'a, T: TargetWriter + ?Sized> ReferenceResolver<'a, T> {
    pub fn new(target: &'a T, strategy: FkStrategy) -> Self {
        Self { target, strategy }
    }

    /// Clean `rows` of `table`.
    ///
    /// The input rows are not modified. Lookup failures never surface as
    /// errors; the affected values are treated as missing.
    pub async fn clean_rows(
        &self,
        table: &str,
        foreign_keys: &[ForeignKeyRef],
        rows: &[Row],
    ) -> CleanedRows {
        if foreign_keys.is_empty() {
            return CleanedRows {
                rows: rows.to_vec(),
                nullified: 0,
            };
        }

        let index = match self.strategy {
            FkStrategy::Prefetch => self.prefetch(table, foreign_keys, rows).await,
            FkStrategy::PerRow => self.resolve_per_row(table, foreign_keys, rows).await,
        };
        debug!(
            "{}: {} referenced key(s) resolved ({})",
            table,
            index.len(),
            self.strategy
        );

        let mut cleaned = CleanedRows {
            rows: Vec::with_capacity(rows.len()),
            nullified: 0,
        };
        for row in rows {
            let (row, nullified) = clean_row(table, row, foreign_keys, &index);
            cleaned.rows.push(row);
            cleaned.nullified += nullified;
        }
        cleaned
    }

    /// One pass per referenced table over the distinct values of the table's
    /// foreign-key columns. Referenced tables are resolved concurrently.
    async fn prefetch(
        &self,
        table: &str,
        foreign_keys: &[ForeignKeyRef],
        rows: &[Row],
    ) -> ReferenceIndex {
        let mut wanted: BTreeMap<&str, BTreeSet<PkValue>> = BTreeMap::new();
        for fk in foreign_keys {
            wanted
                .entry(fk.references.as_str())
                .or_default()
                .extend(distinct_keys(rows, &fk.column));
        }

        let lookups = wanted
            .into_iter()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(referenced, keys)| async move {
                let keys: Vec<PkValue> = keys.into_iter().collect();
                (referenced, self.lookup(table, referenced, &keys).await)
            });

        let mut index = ReferenceIndex::new();
        for (referenced, resolved) in join_all(lookups).await {
            for (key, exists) in resolved {
                index.record(referenced, key, exists);
            }
        }
        index
    }

    /// One lookup per distinct value, issued as rows are visited.
    async fn resolve_per_row(
        &self,
        table: &str,
        foreign_keys: &[ForeignKeyRef],
        rows: &[Row],
    ) -> ReferenceIndex {
        let mut index = ReferenceIndex::new();
        for row in rows {
            for fk in foreign_keys {
                let Some(key) = row.get(&fk.column).and_then(|v| v.as_key()) else {
                    continue;
                };
                if index.lookup(&fk.references, &key).is_some() {
                    continue;
                }
                for (key, exists) in self
                    .lookup(table, &fk.references, std::slice::from_ref(&key))
                    .await
                {
                    index.record(&fk.references, key, exists);
                }
            }
        }
        index
    }

    /// Chunked existence check. A failed chunk resolves to "missing".
    async fn lookup(
        &self,
        table: &str,
        referenced: &str,
        keys: &[PkValue],
    ) -> Vec<(PkValue, bool)> {
        let mut resolved = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(LOOKUP_CHUNK_SIZE) {
            match self.target.existing_keys(referenced, chunk).await {
                Ok(found) => {
                    resolved.extend(chunk.iter().map(|k| (k.clone(), found.contains(k))));
                }
                Err(e) => {
                    warn!(
                        "{}: lookup of {} key(s) in {} failed, treating them as missing: {}",
                        table,
                        chunk.len(),
                        referenced,
                        e
                    );
                    resolved.extend(chunk.iter().map(|k| (k.clone(), false)));
                }
            }
        }
        resolved
    }

    /// Count existing and missing distinct values per foreign-key column.
    ///
    /// Diagnostic only: returns `None` if any lookup fails.
    pub async fn validate_foreign_keys(
        &self,
        table: &str,
        foreign_keys: &[ForeignKeyRef],
        rows: &[Row],
    ) -> Option<FkValidationSummary> {
        match self.summarize(table, foreign_keys, rows).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(
                    "{}: foreign key validation failed (informational only): {}",
                    table, e
                );
                None
            }
        }
    }

    async fn summarize(
        &self,
        table: &str,
        foreign_keys: &[ForeignKeyRef],
        rows: &[Row],
    ) -> Result<FkValidationSummary> {
        let mut columns = Vec::with_capacity(foreign_keys.len());
        for fk in foreign_keys {
            let keys: Vec<PkValue> = distinct_keys(rows, &fk.column).into_iter().collect();
            let mut existing = 0;
            for chunk in keys.chunks(LOOKUP_CHUNK_SIZE) {
                let found = self.target.existing_keys(&fk.references, chunk).await?;
                existing += chunk.iter().filter(|k| found.contains(*k)).count();
            }
            let missing = keys.len() - existing;

            if missing > 0 {
                info!(
                    "{}.{} -> {}: {} distinct value(s), {} missing",
                    table,
                    fk.column,
                    fk.references,
                    keys.len(),
                    missing
                );
            } else {
                debug!(
                    "{}.{} -> {}: all {} distinct value(s) present",
                    table,
                    fk.column,
                    fk.references,
                    keys.len()
                );
            }

            columns.push(FkColumnSummary {
                column: fk.column.clone(),
                references: fk.references.clone(),
                total_distinct: keys.len(),
                existing,
                missing,
            });
        }

        Ok(FkValidationSummary {
            table: table.to_string(),
            columns,
        })
    }
}

fn distinct_keys(rows: &[Row], column: &str) -> BTreeSet<PkValue> {
    rows.iter()
        .filter_map(|row| row.get(column))
        .filter_map(|v| v.as_key())
        .collect()
}

/// Null every foreign-key value of `row` that `index` does not know to exist.
fn clean_row(
    table: &str,
    row: &Row,
    foreign_keys: &[ForeignKeyRef],
    index: &ReferenceIndex,
) -> (Row, u64) {
    let mut cleaned = row.clone();
    let mut nullified = 0;

    for fk in foreign_keys {
        let Some(value) = row.get(&fk.column) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let exists = value
            .as_key()
            .is_some_and(|key| index.exists(&fk.references, &key));
        if !exists {
            debug!(
                "{}: row {} has {} = {} with no match in {}, setting NULL",
                table,
                row.display_id(),
                fk.column,
                value,
                fk.references
            );
            cleaned.set_null(&fk.column);
            nullified += 1;
        }
    }

    (cleaned, nullified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use crate::memory::MemoryDatabase;

    fn id_row(id: i64) -> Row {
        Row::from_pairs([("id", SqlValue::Int(id))])
    }

    fn client_bu(id: i64, state_id: SqlValue, city_id: SqlValue) -> Row {
        Row::from_pairs([
            ("id", SqlValue::Int(id)),
            ("state_id", state_id),
            ("city_id", city_id),
        ])
    }

    fn fks() -> Vec<ForeignKeyRef> {
        vec![
            ForeignKeyRef::new("state_id", "state"),
            ForeignKeyRef::new("city_id", "city"),
        ]
    }

    fn target() -> MemoryDatabase {
        MemoryDatabase::new("target")
            .with_table("state", vec![id_row(1), id_row(2)])
            .with_table("city", vec![id_row(10)])
    }

    fn source_rows() -> Vec<Row> {
        vec![
            client_bu(1, SqlValue::Int(1), SqlValue::Int(10)),
            client_bu(2, SqlValue::Int(77), SqlValue::Null),
            client_bu(3, SqlValue::from("2"), SqlValue::Int(11)),
            client_bu(4, SqlValue::Int(77), SqlValue::Float(10.5)),
        ]
    }

    #[tokio::test]
    async fn test_clean_rows_nulls_missing_references() {
        let target = target();
        let rows = source_rows();
        let resolver = ReferenceResolver::new(&target, FkStrategy::Prefetch);

        let cleaned = resolver.clean_rows("client_bu", &fks(), &rows).await;

        assert_eq!(cleaned.nullified, 4);
        assert_eq!(cleaned.rows[0], rows[0]);
        assert_eq!(cleaned.rows[1].get("state_id"), Some(&SqlValue::Null));
        assert_eq!(cleaned.rows[2].get("state_id"), Some(&SqlValue::from("2")));
        assert_eq!(cleaned.rows[2].get("city_id"), Some(&SqlValue::Null));
        assert_eq!(cleaned.rows[3].get("city_id"), Some(&SqlValue::Null));
        // input untouched
        assert_eq!(rows[1].get("state_id"), Some(&SqlValue::Int(77)));
    }

    #[tokio::test]
    async fn test_strategies_agree() {
        let rows = source_rows();

        let prefetch_target = target();
        let prefetch = ReferenceResolver::new(&prefetch_target, FkStrategy::Prefetch)
            .clean_rows("client_bu", &fks(), &rows)
            .await;

        let per_row_target = target();
        let per_row = ReferenceResolver::new(&per_row_target, FkStrategy::PerRow)
            .clean_rows("client_bu", &fks(), &rows)
            .await;

        assert_eq!(prefetch.rows, per_row.rows);
        assert_eq!(prefetch.nullified, per_row.nullified);
        // one lookup per referenced table versus one per distinct value
        assert_eq!(prefetch_target.lookup_queries(), 2);
        assert_eq!(per_row_target.lookup_queries(), 5);
    }

    #[tokio::test]
    async fn test_lookup_failure_treated_as_missing() {
        let target = target();
        target.fail_lookups_on("state");
        let rows = vec![client_bu(1, SqlValue::Int(1), SqlValue::Int(10))];

        for strategy in [FkStrategy::Prefetch, FkStrategy::PerRow] {
            let cleaned = ReferenceResolver::new(&target, strategy)
                .clean_rows("client_bu", &fks(), &rows)
                .await;
            assert_eq!(cleaned.nullified, 1);
            assert_eq!(cleaned.rows[0].get("state_id"), Some(&SqlValue::Null));
            assert_eq!(cleaned.rows[0].get("city_id"), Some(&SqlValue::Int(10)));
        }
    }

    /// Target whose `id` comparison is numeric for digits and otherwise
    /// case-insensitive with trailing spaces ignored.
    struct CoercingTarget {
        ids: Vec<&'static str>,
    }

    fn loosely_equal(key: &PkValue, id: &str) -> bool {
        match key {
            PkValue::Int(v) => id.parse::<i64>().is_ok_and(|n| n == *v),
            PkValue::String(s) => match (s.trim().parse::<i64>(), id.parse::<i64>()) {
                (Ok(a), Ok(b)) => a == b,
                _ => s.trim_end().eq_ignore_ascii_case(id),
            },
        }
    }

    #[async_trait::async_trait]
    impl TargetWriter for CoercingTarget {
        async fn count_rows(&self, _table: &str) -> Result<i64> {
            Ok(self.ids.len() as i64)
        }

        async fn existing_keys(
            &self,
            _table: &str,
            keys: &[PkValue],
        ) -> Result<std::collections::HashSet<PkValue>> {
            Ok(keys
                .iter()
                .filter(|k| self.ids.iter().any(|id| loosely_equal(k, id)))
                .cloned()
                .collect())
        }

        async fn insert_rows(&self, _table: &str, _rows: &[Row]) -> Result<u64> {
            Ok(0)
        }

        async fn insert_row(&self, _table: &str, _row: &Row) -> Result<crate::core::InsertOutcome> {
            Ok(crate::core::InsertOutcome::Duplicate)
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        fn db_type(&self) -> &str {
            "coercing"
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_references_matched_by_target_comparison_are_kept() {
        let target = CoercingTarget {
            ids: vec!["77", "MH"],
        };
        let fks = vec![ForeignKeyRef::new("state_id", "state")];
        let rows = vec![
            Row::from_pairs([("id", SqlValue::Int(1)), ("state_id", SqlValue::from("077"))]),
            Row::from_pairs([("id", SqlValue::Int(2)), ("state_id", SqlValue::Float(77.0))]),
            Row::from_pairs([("id", SqlValue::Int(3)), ("state_id", SqlValue::from("mh "))]),
            Row::from_pairs([("id", SqlValue::Int(4)), ("state_id", SqlValue::from("KA"))]),
        ];

        for strategy in [FkStrategy::Prefetch, FkStrategy::PerRow] {
            let cleaned = ReferenceResolver::new(&target, strategy)
                .clean_rows("client_bu", &fks, &rows)
                .await;
            assert_eq!(cleaned.nullified, 1, "{}", strategy);
            assert_eq!(cleaned.rows[..3], rows[..3]);
            assert_eq!(cleaned.rows[3].get("state_id"), Some(&SqlValue::Null));
        }
    }

    #[tokio::test]
    async fn test_prefetch_chunks_lookups() {
        let target = MemoryDatabase::new("target").with_table("state", vec![id_row(3)]);
        let rows: Vec<Row> = (0..1200)
            .map(|i| client_bu(i, SqlValue::Int(i), SqlValue::Null))
            .collect();
        let fks = vec![ForeignKeyRef::new("state_id", "state")];

        let cleaned = ReferenceResolver::new(&target, FkStrategy::Prefetch)
            .clean_rows("client_bu", &fks, &rows)
            .await;

        assert_eq!(target.lookup_queries(), 3);
        assert_eq!(cleaned.nullified, 1199);
    }

    #[tokio::test]
    async fn test_validate_foreign_keys() {
        let target = target();
        let rows = source_rows();
        let resolver = ReferenceResolver::new(&target, FkStrategy::Prefetch);

        let summary = resolver
            .validate_foreign_keys("client_bu", &fks(), &rows)
            .await
            .unwrap();
        assert_eq!(summary.columns[0].total_distinct, 3);
        assert_eq!(summary.columns[0].missing, 1);
        assert_eq!(summary.columns[1].total_distinct, 2);
        assert_eq!(summary.columns[1].existing, 1);
        assert_eq!(summary.total_missing(), 2);

        target.fail_lookups_on("city");
        assert!(resolver
            .validate_foreign_keys("client_bu", &fks(), &rows)
            .await
            .is_none());
    }
}
