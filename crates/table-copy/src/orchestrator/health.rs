//! Connectivity and row-count checks.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::CopyError;

/// Result of a health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Outcome of checking one side.
#[derive(Debug, Clone)]
pub(crate) struct SideCheck {
    latency: Duration,
    error: Option<String>,
}

impl SideCheck {
    pub(crate) fn finish(started: Instant, result: Result<(), CopyError>) -> Self {
        Self {
            latency: started.elapsed(),
            error: result.err().map(|e| e.to_string()),
        }
    }
}

impl HealthCheckResult {
    pub(crate) fn from_checks(source: SideCheck, target: SideCheck) -> Self {
        let source_connected = source.error.is_none();
        let target_connected = target.error.is_none();
        Self {
            source_connected,
            source_latency_ms: source.latency.as_millis() as u64,
            source_error: source.error,
            target_connected,
            target_latency_ms: target.latency.as_millis() as u64,
            target_error: target.error,
            healthy: source_connected && target_connected,
        }
    }
}

/// Row counts of one registry table on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCountCheck {
    pub table: String,
    /// `None` if the table does not exist in the source.
    pub source_rows: Option<i64>,
    /// `None` if the table could not be counted in the target.
    pub target_rows: Option<i64>,
}

impl RowCountCheck {
    pub fn matches(&self) -> bool {
        self.source_rows == self.target_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_checks() {
        let now = Instant::now();
        let ok = SideCheck::finish(now, Ok(()));
        let failed = SideCheck::finish(now, Err(CopyError::connection("refused", "target")));

        let result = HealthCheckResult::from_checks(ok.clone(), failed);
        assert!(result.source_connected);
        assert!(!result.target_connected);
        assert!(!result.healthy);
        assert!(result.target_error.unwrap().contains("refused"));

        assert!(HealthCheckResult::from_checks(ok.clone(), ok).healthy);
    }

    #[test]
    fn test_row_count_matches() {
        let check = RowCountCheck {
            table: "accounts".into(),
            source_rows: Some(50),
            target_rows: Some(50),
        };
        assert!(check.matches());
        let missing = RowCountCheck {
            table: "gst_rates".into(),
            source_rows: None,
            target_rows: Some(3),
        };
        assert!(!missing.matches());
    }
}
