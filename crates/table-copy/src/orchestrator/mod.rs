//! Copy orchestrator - main workflow coordinator.
//!
//! Tables are processed one at a time in registry order. For each table the
//! run moves through `Fetching -> Validating -> Cleaning -> Inserting ->
//! Reporting`; missing and empty source tables are skipped. The only errors
//! that end a run early are lost connections and table failures the engine
//! cannot absorb. Both connections are closed on every exit path.

mod health;
mod report;

pub use health::{HealthCheckResult, RowCountCheck};
pub use report::{CopyReport, RunStatus, TableOutcome, TableReport};

use std::fmt;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{Config, CopyConfig};
use crate::copy::{insert_batch, ReferenceResolver};
use crate::core::{SourceReader, TargetWriter};
use crate::drivers::{MysqlReader, MysqlWriter};
use crate::error::Result;
use crate::schema::{SchemaRegistry, TableSpec};

use health::SideCheck;

/// Phase of a copy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Connecting,
    Fetching,
    Validating,
    Cleaning,
    Inserting,
    Reporting,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Connecting => "connecting",
            RunPhase::Fetching => "fetching",
            RunPhase::Validating => "validating",
            RunPhase::Cleaning => "cleaning",
            RunPhase::Inserting => "inserting",
            RunPhase::Reporting => "reporting",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy orchestrator.
pub struct Orchestrator<S, T> {
    copy: CopyConfig,
    registry: SchemaRegistry,
    source: S,
    target: T,
    phase: RunPhase,
}

impl Orchestrator<MysqlReader, MysqlWriter> {
    /// Open both MySQL connections.
    ///
    /// If the target cannot be opened, the already opened source is closed
    /// before the error is returned.
    pub async fn connect(config: &Config, registry: SchemaRegistry) -> Result<Self> {
        debug!("{} -> {}", RunPhase::Idle, RunPhase::Connecting);
        let source = MysqlReader::connect(&config.source).await?;
        let target = match MysqlWriter::connect(&config.target).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };
        Ok(Self::new(config.copy.clone(), registry, source, target))
    }

    /// Open each side independently and report connectivity and latency.
    pub async fn health_check(config: &Config) -> HealthCheckResult {
        let started = Instant::now();
        let source = match MysqlReader::connect(&config.source).await {
            Ok(reader) => {
                let check = SideCheck::finish(started, Ok(()));
                reader.close().await;
                check
            }
            Err(e) => SideCheck::finish(started, Err(e)),
        };

        let started = Instant::now();
        let target = match MysqlWriter::connect(&config.target).await {
            Ok(writer) => {
                let check = SideCheck::finish(started, Ok(()));
                writer.close().await;
                check
            }
            Err(e) => SideCheck::finish(started, Err(e)),
        };

        HealthCheckResult::from_checks(source, target)
    }
}

impl<S: SourceReader, T: TargetWriter> Orchestrator<S, T> {
    /// Create an orchestrator over already opened connections.
    pub fn new(copy: CopyConfig, registry: SchemaRegistry, source: S, target: T) -> Self {
        Self {
            copy,
            registry,
            source,
            target,
            phase: RunPhase::Idle,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    fn transition(&mut self, next: RunPhase, table: Option<&str>) {
        match table {
            Some(table) => debug!("{}: {} -> {}", table, self.phase, next),
            None => debug!("{} -> {}", self.phase, next),
        }
        self.phase = next;
    }

    fn resolver(&self) -> ReferenceResolver<'_, T> {
        ReferenceResolver::new(&self.target, self.copy.fk_strategy)
    }

    /// Run the copy.
    ///
    /// On a fatal error the partial report is logged with status `failed`
    /// and the error is returned. Tables copied before the failure stay in
    /// the target.
    pub async fn run(mut self) -> Result<CopyReport> {
        let mut report = CopyReport::new();
        info!(
            "Starting copy run: {} ({} tables, {} strategy, batch size {})",
            report.run_id,
            self.registry.len(),
            self.copy.fk_strategy,
            self.copy.batch_size
        );

        let result = self.copy_all(&mut report).await;
        self.close().await;

        match result {
            Ok(()) => {
                self.transition(RunPhase::Completed, None);
                report.finish(RunStatus::Completed, None);
                report.log_summary();
                Ok(report)
            }
            Err(e) => {
                self.transition(RunPhase::Failed, report.failed_table.as_deref());
                report.finish(RunStatus::Failed, Some(e.to_string()));
                report.log_summary();
                Err(e)
            }
        }
    }

    async fn copy_all(&mut self, report: &mut CopyReport) -> Result<()> {
        self.transition(RunPhase::Connecting, None);
        self.source.ping().await?;
        self.target.ping().await?;

        let tables = self.registry.tables_in_order().to_vec();
        for spec in &tables {
            match self.copy_table(spec).await {
                Ok(table_report) => report.add_table(table_report),
                Err(e) => {
                    report.failed_table = Some(spec.name.clone());
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn copy_table(&mut self, spec: &TableSpec) -> Result<TableReport> {
        let started = Instant::now();
        let table = spec.name.as_str();

        self.transition(RunPhase::Fetching, Some(table));
        if !self.source.table_exists(table).await? {
            info!("{}: skipped: does not exist in source", table);
            return Ok(TableReport::skipped(
                table,
                TableOutcome::SkippedMissing,
                started.elapsed().as_secs_f64(),
            ));
        }

        let source_count = self.source.count_rows(table).await?;
        if source_count == 0 {
            info!("{}: skipped: source table is empty", table);
            return Ok(TableReport::skipped(
                table,
                TableOutcome::SkippedEmpty,
                started.elapsed().as_secs_f64(),
            ));
        }

        let existing_in_target = match TargetWriter::count_rows(&self.target, table).await {
            Ok(count) => Some(count),
            Err(e) => {
                debug!("{}: could not count target rows: {}", table, e);
                None
            }
        };
        info!(
            "{}: {} rows in source, {} already in target",
            table,
            source_count,
            existing_in_target.map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );

        let rows = self.source.fetch_all(table).await?;
        if rows.is_empty() {
            info!("{}: skipped: source table is empty", table);
            return Ok(TableReport::skipped(
                table,
                TableOutcome::SkippedEmpty,
                started.elapsed().as_secs_f64(),
            ));
        }

        let fk_summary = if self.copy.validate_foreign_keys && !spec.foreign_keys.is_empty() {
            self.transition(RunPhase::Validating, Some(table));
            self.resolver()
                .validate_foreign_keys(table, &spec.foreign_keys, &rows)
                .await
        } else {
            None
        };

        self.transition(RunPhase::Cleaning, Some(table));
        let cleaned = self
            .resolver()
            .clean_rows(table, &spec.foreign_keys, &rows)
            .await;
        if cleaned.nullified > 0 {
            warn!(
                "{}: {} foreign key value(s) set to NULL",
                table, cleaned.nullified
            );
        }

        self.transition(RunPhase::Inserting, Some(table));
        let mut stats =
            insert_batch(&self.target, table, &cleaned.rows, self.copy.batch_size).await?;
        stats.rows_read = rows.len() as u64;
        stats.fk_nullified = cleaned.nullified;

        self.transition(RunPhase::Reporting, Some(table));
        let duration_seconds = started.elapsed().as_secs_f64();
        info!(
            "{}: read {}, inserted {}, skipped {}, fk nullified {} ({:.1}s)",
            table,
            stats.rows_read,
            stats.rows_inserted,
            stats.rows_skipped,
            stats.fk_nullified,
            duration_seconds
        );

        Ok(TableReport {
            table: table.to_string(),
            outcome: TableOutcome::Copied,
            stats,
            existing_in_target,
            fk_summary,
            duration_seconds,
        })
    }

    /// Compare row counts of every registry table between source and target.
    pub async fn validate(&self) -> Result<Vec<RowCountCheck>> {
        let mut results = Vec::with_capacity(self.registry.len());

        for spec in self.registry.tables_in_order() {
            let table = spec.name.as_str();
            let source_rows = if self.source.table_exists(table).await? {
                Some(self.source.count_rows(table).await?)
            } else {
                None
            };
            let target_rows = TargetWriter::count_rows(&self.target, table).await.ok();

            let check = RowCountCheck {
                table: table.to_string(),
                source_rows,
                target_rows,
            };
            if check.matches() {
                info!("{}: {} rows (match)", table, source_rows.unwrap_or(0));
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    table,
                    count_label(source_rows),
                    count_label(target_rows)
                );
            }
            results.push(check);
        }

        Ok(results)
    }

    /// Ping both sides and report latency.
    pub async fn health(&self) -> HealthCheckResult {
        let started = Instant::now();
        let source = SideCheck::finish(started, self.source.ping().await);
        let started = Instant::now();
        let target = SideCheck::finish(started, self.target.ping().await);
        HealthCheckResult::from_checks(source, target)
    }

    /// Close both connections.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}

fn count_label(count: Option<i64>) -> String {
    count.map_or_else(|| "missing".to_string(), |n| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Row, SqlValue};
    use crate::memory::MemoryDatabase;
    use std::sync::Arc;

    fn row(id: i64) -> Row {
        Row::from_pairs([("id", SqlValue::Int(id))])
    }

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(vec![
            TableSpec::new("country"),
            TableSpec::new("state").references("country_id", "country"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_validate_reports_mismatch() {
        let source = Arc::new(
            MemoryDatabase::new("source")
                .with_table("country", vec![row(1), row(2)])
                .with_table("state", vec![row(1)]),
        );
        let target = Arc::new(
            MemoryDatabase::new("target").with_table("country", vec![row(1), row(2)]),
        );
        let orchestrator = Orchestrator::new(
            CopyConfig::default(),
            registry(),
            Arc::clone(&source),
            Arc::clone(&target),
        );

        let checks = orchestrator.validate().await.unwrap();

        assert!(checks[0].matches());
        assert_eq!(checks[1].source_rows, Some(1));
        assert_eq!(checks[1].target_rows, None);
        assert!(!checks[1].matches());
    }

    #[tokio::test]
    async fn test_health_reports_each_side() {
        let source = Arc::new(MemoryDatabase::new("source"));
        let target = Arc::new(MemoryDatabase::new("target"));
        target.disconnect();
        let orchestrator =
            Orchestrator::new(CopyConfig::default(), registry(), source, Arc::clone(&target));

        let health = orchestrator.health().await;

        assert!(health.source_connected);
        assert!(!health.target_connected);
        assert!(!health.healthy);
    }

    #[test]
    fn test_run_phase_display() {
        assert_eq!(RunPhase::Validating.to_string(), "validating");
    }
}
