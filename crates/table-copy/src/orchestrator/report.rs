//! Run and per-table reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::copy::{CopyStats, FkValidationSummary};
use crate::error::Result;

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// What happened to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableOutcome {
    Copied,
    /// The table does not exist in the source.
    SkippedMissing,
    /// The source table has no rows.
    SkippedEmpty,
}

/// Result of processing one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub outcome: TableOutcome,
    pub stats: CopyStats,

    /// Rows already in the target before the copy, if they could be counted.
    pub existing_in_target: Option<i64>,

    /// Pre-cleaning foreign-key diagnostic, if it ran and succeeded.
    pub fk_summary: Option<FkValidationSummary>,

    pub duration_seconds: f64,
}

impl TableReport {
    pub fn skipped(table: &str, outcome: TableOutcome, duration_seconds: f64) -> Self {
        Self {
            table: table.to_string(),
            outcome,
            stats: CopyStats::default(),
            existing_in_target: None,
            fk_summary: None,
            duration_seconds,
        }
    }
}

/// Result of a copy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run finished.
    pub completed_at: Option<DateTime<Utc>>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Processed tables, in processing order.
    pub tables: Vec<TableReport>,

    /// Counters summed over all tables.
    pub totals: CopyStats,

    /// Table being processed when the run aborted.
    pub failed_table: Option<String>,

    /// Error that aborted the run.
    pub error: Option<String>,
}

impl CopyReport {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_seconds: 0.0,
            tables: Vec::new(),
            totals: CopyStats::default(),
            failed_table: None,
            error: None,
        }
    }

    pub fn add_table(&mut self, table: TableReport) {
        self.totals += table.stats;
        self.tables.push(table);
    }

    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        let completed_at = Utc::now();
        self.duration_seconds =
            (completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.completed_at = Some(completed_at);
        self.status = status;
        self.error = error;
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn tables_copied(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| t.outcome == TableOutcome::Copied)
            .count()
    }

    pub fn tables_skipped(&self) -> usize {
        self.tables.len() - self.tables_copied()
    }

    /// Write the human-readable summary to the log.
    pub fn log_summary(&self) {
        info!(
            "Copy {}: {} tables copied, {} skipped in {:.1}s",
            self.status.as_str(),
            self.tables_copied(),
            self.tables_skipped(),
            self.duration_seconds
        );
        info!(
            "Totals: read {}, inserted {}, skipped {}, fk nullified {}",
            self.totals.rows_read,
            self.totals.rows_inserted,
            self.totals.rows_skipped,
            self.totals.fk_nullified
        );
        if self.status == RunStatus::Failed {
            error!(
                "Run {} aborted at table {}: {}",
                self.run_id,
                self.failed_table.as_deref().unwrap_or("<none>"),
                self.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for CopyReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copied(table: &str, read: u64, inserted: u64) -> TableReport {
        TableReport {
            table: table.to_string(),
            outcome: TableOutcome::Copied,
            stats: CopyStats {
                rows_read: read,
                rows_inserted: inserted,
                rows_skipped: read - inserted,
                fk_nullified: 0,
            },
            existing_in_target: Some(0),
            fk_summary: None,
            duration_seconds: 0.1,
        }
    }

    #[test]
    fn test_totals_and_counts() {
        let mut report = CopyReport::new();
        report.add_table(copied("accounts", 50, 40));
        report.add_table(TableReport::skipped(
            "gst_rates",
            TableOutcome::SkippedMissing,
            0.0,
        ));
        report.finish(RunStatus::Completed, None);

        assert_eq!(report.totals.rows_read, 50);
        assert_eq!(report.totals.rows_skipped, 10);
        assert_eq!(report.tables_copied(), 1);
        assert_eq!(report.tables_skipped(), 1);
        assert!(report.completed_at.is_some());
        assert!(report.table("gst_rates").is_some());
    }

    #[test]
    fn test_to_json() {
        let mut report = CopyReport::new();
        report.add_table(TableReport::skipped("state", TableOutcome::SkippedEmpty, 0.0));
        report.failed_table = Some("city".into());
        report.finish(RunStatus::Failed, Some("connection lost".into()));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["failed_table"], "city");
        assert_eq!(json["tables"][0]["outcome"], "skipped_empty");
        assert!(uuid::Uuid::parse_str(json["run_id"].as_str().unwrap()).is_ok());
    }
}
