//! In-memory datastore.
//!
//! [`MemoryDatabase`] implements both [`SourceReader`] and [`TargetWriter`]
//! with the same observable semantics as the MySQL drivers: `id`-keyed
//! tables, duplicate-tolerant inserts, all-or-nothing batches. It also
//! supports failure injection (failing lookups, rejected rows, dropped
//! connections, failing reads) and records the queries it served. The
//! engine's tests run against it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::core::{InsertOutcome, PkValue, Row, SourceReader, TargetWriter};
use crate::error::{CopyError, Result};

#[derive(Default)]
struct State {
    tables: HashMap<String, BTreeMap<PkValue, Row>>,
    failing_lookups: HashSet<String>,
    failing_fetches: HashSet<String>,
    rejected: HashMap<String, HashSet<PkValue>>,
    disconnected: bool,
    inserts_before_disconnect: Option<usize>,
    write_log: Vec<String>,
}

/// A set of `id`-keyed tables held in memory.
#[derive(Default)]
pub struct MemoryDatabase {
    name: String,
    state: Mutex<State>,
    lookups: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a table holding `rows`, builder style.
    pub fn with_table(self, table: &str, rows: Vec<Row>) -> Self {
        self.create_table(table);
        self.insert(table, rows);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty table. Existing tables are left as they are.
    pub fn create_table(&self, table: &str) {
        self.state().tables.entry(table.to_string()).or_default();
    }

    /// Store rows directly, replacing rows with the same key.
    ///
    /// Creates the table if needed. Rows without a usable `id` are dropped.
    pub fn insert(&self, table: &str, rows: Vec<Row>) {
        let mut state = self.state();
        let stored = state.tables.entry(table.to_string()).or_default();
        for row in rows {
            if let Some(key) = row.key() {
                stored.insert(key, row);
            }
        }
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state().tables.contains_key(table)
    }

    /// All rows of `table` in key order; empty if the table is missing.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, id: impl Into<PkValue>) -> Option<Row> {
        let id = id.into();
        self.state().tables.get(table)?.get(&id).cloned()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state().tables.get(table).map_or(0, BTreeMap::len)
    }

    /// Make every key lookup against `table` fail.
    pub fn fail_lookups_on(&self, table: &str) {
        self.state().failing_lookups.insert(table.to_string());
    }

    /// Make reading the rows of `table` fail with a table error.
    pub fn fail_fetch_on(&self, table: &str) {
        self.state().failing_fetches.insert(table.to_string());
    }

    /// Make the server reject the row with `id` in `table`.
    ///
    /// A batch containing the row fails as a whole; writing the row on its
    /// own reports [`InsertOutcome::Failed`].
    pub fn reject_row(&self, table: &str, id: impl Into<PkValue>) {
        self.state()
            .rejected
            .entry(table.to_string())
            .or_default()
            .insert(id.into());
    }

    /// Drop the connection: every later call fails with a connection error.
    pub fn disconnect(&self) {
        self.state().disconnected = true;
    }

    /// Drop the connection after `batches` more successful batch inserts.
    pub fn disconnect_after_batches(&self, batches: usize) {
        let mut state = self.state();
        if batches == 0 {
            state.disconnected = true;
        } else {
            state.inserts_before_disconnect = Some(batches);
        }
    }

    /// Number of key lookups served so far.
    pub fn lookup_queries(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Table name of every successful batch insert, in order.
    pub fn write_log(&self) -> Vec<String> {
        self.state().write_log.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_connected(&self, state: &State, operation: &str) -> Result<()> {
        if state.disconnected {
            return Err(CopyError::connection(
                "connection lost",
                format!("{} on {}", operation, self.name),
            ));
        }
        Ok(())
    }

    fn missing_table(&self, table: &str) -> CopyError {
        CopyError::table(
            table,
            format!("Table '{}.{}' doesn't exist", self.name, table),
        )
    }
}

fn count(state: &State, table: &str) -> Option<i64> {
    state.tables.get(table).map(|t| t.len() as i64)
}

#[async_trait]
impl SourceReader for MemoryDatabase {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let state = self.state();
        self.check_connected(&state, "table_exists")?;
        Ok(state.tables.contains_key(table))
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let state = self.state();
        self.check_connected(&state, "count_rows")?;
        count(&state, table).ok_or_else(|| self.missing_table(table))
    }

    async fn fetch_all(&self, table: &str) -> Result<Vec<Row>> {
        let state = self.state();
        self.check_connected(&state, "fetch_all")?;
        if state.failing_fetches.contains(table) {
            return Err(CopyError::table(table, "fetch failed"));
        }
        state
            .tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .ok_or_else(|| self.missing_table(table))
    }

    async fn ping(&self) -> Result<()> {
        let state = self.state();
        self.check_connected(&state, "ping")
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TargetWriter for MemoryDatabase {
    async fn count_rows(&self, table: &str) -> Result<i64> {
        let state = self.state();
        self.check_connected(&state, "count_rows")?;
        count(&state, table).ok_or_else(|| self.missing_table(table))
    }

    async fn existing_keys(&self, table: &str, keys: &[PkValue]) -> Result<HashSet<PkValue>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        self.check_connected(&state, "existing_keys")?;
        if state.failing_lookups.contains(table) {
            return Err(CopyError::table(table, "lookup failed"));
        }
        let stored = state
            .tables
            .get(table)
            .ok_or_else(|| self.missing_table(table))?;
        Ok(keys
            .iter()
            .filter(|k| stored.contains_key(k))
            .cloned()
            .collect())
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<u64> {
        let mut state = self.state();
        self.check_connected(&state, "insert_rows")?;
        if !state.tables.contains_key(table) {
            return Err(self.missing_table(table));
        }

        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let key = row.key().ok_or_else(|| {
                CopyError::table(table, format!("row {} has no usable id", row.display_id()))
            })?;
            let rejected = state
                .rejected
                .get(table)
                .is_some_and(|ids| ids.contains(&key));
            if rejected {
                return Err(CopyError::table(
                    table,
                    format!("row {} rejected by constraint", key),
                ));
            }
            keyed.push((key, row));
        }

        let mut inserted = 0u64;
        if let Some(stored) = state.tables.get_mut(table) {
            for (key, row) in keyed {
                if !stored.contains_key(&key) {
                    stored.insert(key, row.clone());
                    inserted += 1;
                }
            }
        }
        state.write_log.push(table.to_string());

        if let Some(remaining) = state.inserts_before_disconnect.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                state.inserts_before_disconnect = None;
                state.disconnected = true;
            }
        }

        Ok(inserted)
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<InsertOutcome> {
        let mut state = self.state();
        self.check_connected(&state, "insert_row")?;

        let Some(key) = row.key() else {
            return Ok(InsertOutcome::Failed("row has no usable id".to_string()));
        };
        if state
            .rejected
            .get(table)
            .is_some_and(|ids| ids.contains(&key))
        {
            return Ok(InsertOutcome::Failed(format!(
                "row {} rejected by constraint",
                key
            )));
        }

        match state.tables.get_mut(table) {
            None => Ok(InsertOutcome::Failed(format!(
                "Table '{}.{}' doesn't exist",
                self.name, table
            ))),
            Some(stored) if stored.contains_key(&key) => Ok(InsertOutcome::Duplicate),
            Some(stored) => {
                stored.insert(key, row.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        let state = self.state();
        self.check_connected(&state, "ping")
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
