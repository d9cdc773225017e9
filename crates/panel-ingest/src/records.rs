// Flat records produced by the dump reader

use panel_common::{PanelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Panel type
// ============================================================================

/// Origin of a panel, fixed per dump directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PanelType {
    #[serde(rename = "gms")]
    Gms,
    #[serde(rename = "non-gms")]
    NonGms,
    #[serde(rename = "in-house")]
    InHouse,
    #[serde(rename = "single_gene")]
    SingleGene,
}

impl PanelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PanelType::Gms => "gms",
            PanelType::NonGms => "non-gms",
            PanelType::InHouse => "in-house",
            PanelType::SingleGene => "single_gene",
        }
    }
}

impl fmt::Display for PanelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PanelType {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "gms" => Ok(PanelType::Gms),
            "non-gms" => Ok(PanelType::NonGms),
            "in-house" => Ok(PanelType::InHouse),
            "single_gene" => Ok(PanelType::SingleGene),
            other => Err(PanelError::Config(format!("Unknown panel type: {}", other))),
        }
    }
}

// ============================================================================
// Coordinates
// ============================================================================

/// Closed genomic interval on one reference build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: u64,
    pub end: u64,
}

impl Interval {
    /// Parse `[start, end]`; the literal `None` yields `Ok(None)`
    pub fn parse_bracketed(text: &str) -> std::result::Result<Option<Self>, String> {
        let text = text.trim();
        if text == "None" || text.is_empty() {
            return Ok(None);
        }

        let inner = text
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .ok_or_else(|| format!("coordinates '{}' are not bracketed", text))?;
        let (start, end) = inner
            .split_once(',')
            .ok_or_else(|| format!("coordinates '{}' lack a comma", text))?;

        let start = start
            .trim()
            .parse()
            .map_err(|_| format!("invalid start coordinate '{}'", start.trim()))?;
        let end = end
            .trim()
            .parse()
            .map_err(|_| format!("invalid end coordinate '{}'", end.trim()))?;

        Ok(Some(Self { start, end }))
    }
}

// ============================================================================
// Dump records
// ============================================================================

/// File and 1-based line a record was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOrigin {
    pub source: String,
    pub line: u64,
}

impl RecordOrigin {
    pub fn new(source: impl Into<String>, line: u64) -> Self {
        Self {
            source: source.into(),
            line,
        }
    }

    pub fn malformed(&self, reason: impl Into<String>) -> PanelError {
        PanelError::malformed(self.source.clone(), self.line, reason)
    }
}

/// Panel attributes repeated on every normal-panel row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelHeader {
    pub panel_id: String,
    pub name: String,
    pub version: String,
    pub signed_off: String,
    pub panel_type: PanelType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneRecord {
    pub symbol: String,
    pub hgnc_id: Option<String>,
}

impl GeneRecord {
    pub fn new(symbol: impl Into<String>, hgnc_id: Option<String>) -> Self {
        Self {
            symbol: symbol.into(),
            hgnc_id,
        }
    }

    /// A bare test-directory target; `HGNC:` prefixed targets carry their id
    pub fn from_target(target: &str) -> Self {
        let hgnc_id = target.starts_with("HGNC:").then(|| target.to_string());
        Self::new(target, hgnc_id)
    }
}

/// Short tandem repeat definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrRecord {
    pub name: String,
    pub gene: String,
    pub repeated_sequence: String,
    pub nb_repeats: u32,
    pub nb_pathogenic_repeats: u32,
    pub chrom: String,
    pub grch37: Option<Interval>,
    pub grch38: Option<Interval>,
}

/// Copy number variant definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CnvRecord {
    pub name: String,
    pub variant_type: String,
    pub chrom: String,
    pub grch37: Option<Interval>,
    pub grch38: Option<Interval>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feature {
    Gene(GeneRecord),
    Str(StrRecord),
    Cnv(CnvRecord),
}

impl Feature {
    pub fn entity_type(&self) -> &'static str {
        match self {
            Feature::Gene(_) => "gene",
            Feature::Str(_) => "str",
            Feature::Cnv(_) => "cnv",
        }
    }
}

/// One row of a normal panel file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelRecord {
    pub panel: PanelHeader,
    pub feature: Feature,
    pub origin: RecordOrigin,
}

/// One row of a superpanel file: a single superpanel/subpanel pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperpanelRecord {
    pub panel_id: String,
    pub name: String,
    pub version: String,
    pub signed_off: String,
    pub panel_type: PanelType,
    pub subpanel_id: String,
    pub subpanel_name: String,
    pub subpanel_version: String,
    pub origin: RecordOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpRecord {
    Panel(PanelRecord),
    Superpanel(SuperpanelRecord),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bracketed_interval() {
        assert_eq!(
            Interval::parse_bracketed("[146993568, 146993629]").unwrap(),
            Some(Interval {
                start: 146993568,
                end: 146993629
            })
        );
        assert_eq!(Interval::parse_bracketed("None").unwrap(), None);
        assert!(Interval::parse_bracketed("146993568, 146993629").is_err());
        assert!(Interval::parse_bracketed("[12]").is_err());
        assert!(Interval::parse_bracketed("[a, 5]").is_err());
    }

    #[test]
    fn test_panel_type_names() {
        for name in ["gms", "non-gms", "in-house", "single_gene"] {
            assert_eq!(name.parse::<PanelType>().unwrap().as_str(), name);
        }
        assert!("custom".parse::<PanelType>().is_err());
    }

    #[test]
    fn test_gene_from_target() {
        assert_eq!(GeneRecord::from_target("HGNC:1100").hgnc_id.as_deref(), Some("HGNC:1100"));
        assert_eq!(GeneRecord::from_target("BRCA1").hgnc_id, None);
    }
}
