//! Error types for the panel database tools

use thiserror::Error;

/// Result type alias for panel operations
pub type Result<T> = std::result::Result<T, PanelError>;

/// Main error type for panel building and reconciliation
#[derive(Error, Debug)]
pub enum PanelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delimited file error: {0}")]
    Delimited(#[from] csv::Error),

    /// A dump row could not be read into its expected shape
    #[error("Malformed record in {source_name} line {line}: {reason}")]
    MalformedRecord {
        source_name: String,
        line: u64,
        reason: String,
    },

    /// Two rows for the same panel disagree on a write-once attribute
    #[error("Panel {panel_id} has conflicting {field}: '{first}' then '{second}'")]
    InconsistentPanel {
        panel_id: String,
        field: &'static str,
        first: String,
        second: String,
    },

    #[error("Unresolved {kind} reference '{key}' from {referenced_by}")]
    UnresolvedReference {
        kind: String,
        key: String,
        referenced_by: String,
    },

    #[error("Reconciliation failed: {discrepancies} discrepancies across {entity_types} entity types")]
    ReconciliationFailed {
        discrepancies: usize,
        entity_types: usize,
    },

    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl PanelError {
    /// Create a malformed record error
    pub fn malformed(source_name: impl Into<String>, line: u64, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            source_name: source_name.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Create a store error
    pub fn store(msg: impl std::fmt::Display) -> Self {
        Self::Store(msg.to_string())
    }

    /// Whether the error belongs to the reconciliation outcome rather than a fault
    pub fn is_reconciliation_failure(&self) -> bool {
        matches!(self, Self::ReconciliationFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_message_names_source_and_line() {
        let err = PanelError::malformed("R59_1.0.tsv", 12, "expected 6 fields, got 4");
        assert_eq!(
            err.to_string(),
            "Malformed record in R59_1.0.tsv line 12: expected 6 fields, got 4"
        );
    }

    #[test]
    fn test_reconciliation_failure_flag() {
        let err = PanelError::ReconciliationFailed {
            discrepancies: 3,
            entity_types: 2,
        };
        assert!(err.is_reconciliation_failure());
        assert!(!PanelError::store("down").is_reconciliation_failure());
    }
}
