// Reconciliation report

use crate::graph::EntityKind;
use chrono::{DateTime, Utc};
use panel_common::{PanelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{error, info};

/// What is wrong with one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mismatch {
    /// Present in the store, absent from the expected graph
    OnlyInStore,
    /// Present in the expected graph, absent from the store
    OnlyExpected,
    Field {
        field: String,
        expected: String,
        actual: String,
    },
    Count {
        expected: usize,
        actual: usize,
    },
    /// The dump or test directory names an entity that does not exist
    Unresolved { reference: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: EntityKind,
    pub key: String,
    /// Parent panel, gene or transcript the key is scoped to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub mismatch: Mismatch,
}

impl Discrepancy {
    pub fn new(kind: EntityKind, key: impl Into<String>, mismatch: Mismatch) -> Self {
        Self {
            kind,
            key: key.into(),
            scope: None,
            mismatch,
        }
    }

    pub fn scoped(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn field(
        kind: EntityKind,
        key: impl Into<String>,
        field: &str,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self::new(
            kind,
            key,
            Mismatch::Field {
                field: field.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            },
        )
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.key)?;
        if let Some(scope) = &self.scope {
            write!(f, " in {}", scope)?;
        }
        match &self.mismatch {
            Mismatch::OnlyInStore => write!(f, ": only in store"),
            Mismatch::OnlyExpected => write!(f, ": missing from store"),
            Mismatch::Field {
                field,
                expected,
                actual,
            } => write!(f, ": {} expected '{}' but store has '{}'", field, expected, actual),
            Mismatch::Count { expected, actual } => {
                write!(f, ": expected {} rows but store has {}", expected, actual)
            },
            Mismatch::Unresolved { reference } => write!(f, ": unresolved reference '{}'", reference),
        }
    }
}

/// Discrepancies grouped by entity kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub source: String,
    pub checked_at: DateTime<Utc>,
    sections: BTreeMap<EntityKind, Vec<Discrepancy>>,
}

impl Report {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            checked_at: Utc::now(),
            sections: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, discrepancy: Discrepancy) {
        self.sections
            .entry(discrepancy.kind)
            .or_default()
            .push(discrepancy);
    }

    pub fn extend(&mut self, discrepancies: impl IntoIterator<Item = Discrepancy>) {
        for discrepancy in discrepancies {
            self.push(discrepancy);
        }
    }

    pub fn is_ok(&self) -> bool {
        self.sections.values().all(Vec::is_empty)
    }

    pub fn section(&self, kind: EntityKind) -> &[Discrepancy] {
        self.sections.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All discrepancies in entity-kind order
    pub fn discrepancies(&self) -> impl Iterator<Item = &Discrepancy> + '_ {
        self.sections.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entity kinds with at least one discrepancy
    pub fn failed_kinds(&self) -> Vec<EntityKind> {
        self.sections
            .iter()
            .filter(|(_, section)| !section.is_empty())
            .map(|(&kind, _)| kind)
            .collect()
    }

    /// Log the outcome; every discrepancy is logged at error level
    pub fn log(&self) {
        if self.is_ok() {
            info!(source = %self.source, "Store matches expected panel data");
            return;
        }
        for discrepancy in self.discrepancies() {
            error!(kind = %discrepancy.kind, "{}", discrepancy);
        }
        error!(
            source = %self.source,
            discrepancies = self.len(),
            kinds = ?self.failed_kinds(),
            "Store does not match expected panel data"
        );
    }

    /// `Err(ReconciliationFailed)` when any discrepancy was found
    pub fn into_result(self) -> Result<Self> {
        if self.is_ok() {
            return Ok(self);
        }
        Err(PanelError::ReconciliationFailed {
            discrepancies: self.len(),
            entity_types: self.failed_kinds().len(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_ok() {
        let report = Report::new("td v7");
        assert!(report.is_ok());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_failed_report_counts_kinds() {
        let mut report = Report::new("td v7");
        report.push(Discrepancy::new(EntityKind::Gene, "HGNC:2", Mismatch::OnlyExpected).scoped("100"));
        report.push(Discrepancy::field(EntityKind::Panel, "100", "name", "Ataxia", "Ataxias"));
        report.push(Discrepancy::new(EntityKind::Gene, "HGNC:9", Mismatch::OnlyInStore).scoped("100"));

        assert_eq!(report.section(EntityKind::Gene).len(), 2);
        assert_eq!(report.failed_kinds(), vec![EntityKind::Panel, EntityKind::Gene]);

        let err = report.into_result().unwrap_err();
        assert!(err.is_reconciliation_failure());
        assert!(err.to_string().contains("3 discrepancies across 2 entity types"));
    }

    #[test]
    fn test_discrepancy_display() {
        let d = Discrepancy::new(EntityKind::Gene, "HGNC:2", Mismatch::OnlyExpected).scoped("100");
        assert_eq!(d.to_string(), "gene 'HGNC:2' in 100: missing from store");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["mismatch"]["type"], "only_expected");
        assert_eq!(json["kind"], "gene");
    }
}
