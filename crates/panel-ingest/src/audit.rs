//! Audit trail for reconciliation runs
//!
//! Every check records one entry, whether or not the store matched.

use crate::reconcile::report::{Discrepancy, Report};
use chrono::{DateTime, Utc};
use panel_common::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Confirmed,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            AuditOutcome::Confirmed => "confirmed",
            AuditOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Test directory and panel dumps that were checked
    pub source: String,
    pub outcome: AuditOutcome,
    pub message: String,
    pub discrepancy_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discrepancies: Vec<Discrepancy>,
}

impl AuditEntry {
    pub fn from_report(report: &Report) -> Self {
        let (outcome, message) = if report.is_ok() {
            (
                AuditOutcome::Confirmed,
                format!(
                    "Store confirmed against {} on {}",
                    report.source,
                    report.checked_at.format("%Y-%m-%d")
                ),
            )
        } else {
            (
                AuditOutcome::Failed,
                format!(
                    "{} discrepancies against {} on {}",
                    report.len(),
                    report.source,
                    report.checked_at.format("%Y-%m-%d")
                ),
            )
        };

        Self {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: report.source.clone(),
            outcome,
            message,
            discrepancy_count: report.len(),
            discrepancies: report.discrepancies().cloned().collect(),
        }
    }
}

/// Destination for audit entries
pub trait AuditSink {
    fn record(&mut self, entry: &AuditEntry) -> Result<()>;
}

/// Appends one JSON object per line to a file
#[derive(Debug, Clone)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
}

impl JsonLinesAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&mut self, entry: &AuditEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        serde_jsonlines::append_json_lines(&self.path, [entry])?;
        debug!(path = %self.path.display(), run_id = %entry.run_id, "Recorded audit entry");
        Ok(())
    }
}

/// Keeps entries in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    pub entries: Vec<AuditEntry>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&mut self, entry: &AuditEntry) -> Result<()> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::graph::EntityKind;
    use crate::reconcile::report::Mismatch;

    #[test]
    fn test_confirmed_entry_names_source() {
        let entry = AuditEntry::from_report(&Report::new("directory v7 (230401)"));
        assert_eq!(entry.outcome, AuditOutcome::Confirmed);
        assert!(entry.message.starts_with("Store confirmed against directory v7 (230401) on "));
        assert_eq!(entry.discrepancy_count, 0);
    }

    #[test]
    fn test_json_lines_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("checks.jsonl");
        let mut sink = JsonLinesAuditSink::new(&path);

        let mut report = Report::new("directory v7");
        report.push(Discrepancy::new(EntityKind::Panel, "100", Mismatch::OnlyExpected));
        sink.record(&AuditEntry::from_report(&report)).unwrap();
        sink.record(&AuditEntry::from_report(&Report::new("directory v7"))).unwrap();

        let entries: Vec<AuditEntry> = serde_jsonlines::json_lines(&path)
            .unwrap()
            .collect::<std::io::Result<_>>()
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].outcome, AuditOutcome::Failed);
        assert_eq!(entries[0].discrepancies.len(), 1);
        assert_eq!(entries[1].outcome, AuditOutcome::Confirmed);
        assert_ne!(entries[0].run_id, entries[1].run_id);
    }
}
