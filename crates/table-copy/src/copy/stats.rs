//! Copy counters and foreign-key diagnostics.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Row counters for one table, or summed over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyStats {
    /// Rows fetched from the source.
    pub rows_read: u64,

    /// Rows written to the target.
    pub rows_inserted: u64,

    /// Rows not written: key already present, or rejected by the target.
    pub rows_skipped: u64,

    /// Foreign-key values set to NULL because the referenced row was missing.
    pub fk_nullified: u64,
}

impl AddAssign for CopyStats {
    fn add_assign(&mut self, other: Self) {
        self.rows_read += other.rows_read;
        self.rows_inserted += other.rows_inserted;
        self.rows_skipped += other.rows_skipped;
        self.fk_nullified += other.fk_nullified;
    }
}

/// Existence of the distinct values of one foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkColumnSummary {
    pub column: String,
    pub references: String,
    pub total_distinct: usize,
    pub existing: usize,
    pub missing: usize,
}

/// Pre-cleaning diagnostic for one table. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkValidationSummary {
    pub table: String,
    pub columns: Vec<FkColumnSummary>,
}

impl FkValidationSummary {
    /// Distinct values missing across all columns.
    pub fn total_missing(&self) -> usize {
        self.columns.iter().map(|c| c.missing).sum()
    }
}
