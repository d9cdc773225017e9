// National test directory: clinical indications and their targets

use panel_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Parsed test directory (JSON form)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDirectory {
    pub td_source: String,
    #[serde(default)]
    pub config_source: Option<String>,
    pub date: String,
    pub indications: Vec<IndicationEntry>,
}

impl TestDirectory {
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Short description used in audit entries
    pub fn describe(&self) -> String {
        format!("{} ({})", self.td_source, self.date)
    }
}

/// Read the test directory JSON file
pub fn read_test_directory(path: impl AsRef<Path>) -> Result<TestDirectory> {
    let path = path.as_ref();
    let directory = TestDirectory::from_json_str(&std::fs::read_to_string(path)?)?;
    info!(
        path = %path.display(),
        source = %directory.td_source,
        indications = directory.indications.len(),
        "Read test directory"
    );
    Ok(directory)
}

/// One clinical indication test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicationEntry {
    pub name: String,
    /// Test code, e.g. `R59.3`
    pub code: String,
    pub gemini_name: String,
    #[serde(default)]
    pub test_method: Option<String>,
    #[serde(default)]
    pub panels: Vec<Option<String>>,
    #[serde(default)]
    pub original_targets: Option<String>,
    #[serde(default)]
    pub changes: Option<String>,
}

impl IndicationEntry {
    /// Clinical indication id: the code before the first `.`
    pub fn ci_id(&self) -> &str {
        ci_id(&self.code)
    }

    /// Classified targets; null and blank targets are skipped
    pub fn targets(&self) -> Vec<Target> {
        self.panels
            .iter()
            .filter_map(|target| match target.as_deref().map(str::trim) {
                Some(t) if !t.is_empty() => Some(Target::classify(t)),
                _ => {
                    warn!(code = %self.code, "Skipping null target");
                    None
                },
            })
            .collect()
    }
}

/// Clinical indication id of a test code
pub fn ci_id(code: &str) -> &str {
    code.split_once('.').map_or(code, |(id, _)| id)
}

/// A test target: a catalog panel id or a gene
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    Panel(String),
    Gene(String),
}

impl Target {
    /// Digits only means a catalog panel id, anything else is a gene
    pub fn classify(target: &str) -> Self {
        let target = target.trim();
        if !target.is_empty() && target.chars().all(|c| c.is_ascii_digit()) {
            Target::Panel(target.to_string())
        } else {
            Target::Gene(target.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Target::Panel(id) | Target::Gene(id) => id,
        }
    }
}

/// Distinct gene targets in first-seen order
pub fn gather_single_genes(indications: &[IndicationEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    indications
        .iter()
        .flat_map(IndicationEntry::targets)
        .filter_map(|target| match target {
            Target::Gene(gene) => Some(gene),
            Target::Panel(_) => None,
        })
        .filter(|gene| seen.insert(gene.clone()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn entry(code: &str, targets: &[&str]) -> IndicationEntry {
        IndicationEntry {
            name: format!("Indication {}", ci_id(code)),
            code: code.to_string(),
            gemini_name: format!("{}_gemini", code),
            test_method: Some("Small panel".to_string()),
            panels: targets.iter().map(|t| Some(t.to_string())).collect(),
            original_targets: None,
            changes: None,
        }
    }

    #[test]
    fn test_parse_directory_json() {
        let json = r#"{
            "td_source": "rare-and-inherited-disease-national-gnomic-test-directory-v7.xlsx",
            "config_source": null,
            "date": "230401",
            "indications": [
                {
                    "name": "Hypertrophic cardiomyopathy",
                    "code": "R135.1",
                    "gemini_name": "R135.1_Hypertrophic cardiomyopathy_P",
                    "test_method": "Medium panel",
                    "panels": ["49", null, "HGNC:7577"],
                    "original_targets": "Hypertrophic cardiomyopathy (49)",
                    "changes": "No change"
                }
            ]
        }"#;
        let directory = TestDirectory::from_json_str(json).unwrap();
        let entry = &directory.indications[0];
        assert_eq!(entry.ci_id(), "R135");
        assert_eq!(
            entry.targets(),
            vec![Target::Panel("49".into()), Target::Gene("HGNC:7577".into())]
        );
    }

    #[test]
    fn test_target_classification() {
        assert_eq!(Target::classify("484"), Target::Panel("484".into()));
        assert_eq!(Target::classify("BRCA1"), Target::Gene("BRCA1".into()));
        assert_eq!(Target::classify("HGNC:1100"), Target::Gene("HGNC:1100".into()));
    }

    #[test]
    fn test_gather_single_genes_is_distinct_and_ordered() {
        let entries = vec![
            entry("R1.1", &["10", "TTN", "MYH7"]),
            entry("R2.1", &["MYH7", "BRCA2", "11"]),
        ];
        assert_eq!(gather_single_genes(&entries), vec!["TTN", "MYH7", "BRCA2"]);
    }

    #[test]
    fn test_ci_id_without_dot() {
        assert_eq!(ci_id("R80"), "R80");
        assert_eq!(ci_id("R266.1"), "R266");
    }
}
