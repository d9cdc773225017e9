//! Normalized panel graph
//!
//! Output of the builder and input of the fixture emitter, the in-memory
//! store and the reconciler. Rows reference each other only through
//! [`SurrogateKey`]s; natural keys are held by the [`KeyedTable`]s.

use crate::identity::{KeyedTable, LinkTable, SurrogateKey};
use crate::records::PanelType;
use panel_common::version::{latest_version, same_version};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const GRCH37: &str = "GRCh37";
pub const GRCH38: &str = "GRCh38";

/// Entity types, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Panel,
    Superpanel,
    Subpanel,
    Gene,
    Transcript,
    Exon,
    Region,
    Str,
    Cnv,
    ClinicalIndication,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Panel,
        EntityKind::Superpanel,
        EntityKind::Subpanel,
        EntityKind::Gene,
        EntityKind::Transcript,
        EntityKind::Exon,
        EntityKind::Region,
        EntityKind::Str,
        EntityKind::Cnv,
        EntityKind::ClinicalIndication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Panel => "panel",
            EntityKind::Superpanel => "superpanel",
            EntityKind::Subpanel => "subpanel",
            EntityKind::Gene => "gene",
            EntityKind::Transcript => "transcript",
            EntityKind::Exon => "exon",
            EntityKind::Region => "region",
            EntityKind::Str => "str",
            EntityKind::Cnv => "cnv",
            EntityKind::ClinicalIndication => "clinical_indication",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRow {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelRow {
    pub name: String,
    pub version: String,
    pub signed_off: String,
    pub panel_type: PanelType,
    pub is_superpanel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneRow {
    pub symbol: String,
    pub hgnc_id: Option<String>,
    pub clinical_transcript: Option<SurrogateKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRow {
    pub refseq_base: String,
    pub version: u32,
    pub canonical: bool,
    pub gene: SurrogateKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExonRow {
    pub number: u32,
    pub transcript: SurrogateKey,
    pub region: SurrogateKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRow {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub reference: SurrogateKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrRow {
    pub gene: Option<SurrogateKey>,
    pub repeated_sequence: String,
    pub nb_repeats: u32,
    pub nb_pathogenic_repeats: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CnvRow {
    pub variant_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicationRow {
    pub name: String,
    pub gemini_name: String,
    pub test_method: Option<String>,
}

// ============================================================================
// Natural keys
// ============================================================================

/// `(refseq_base, version)`
pub type TranscriptKey = (String, u32);

/// `(transcript, exon number)`
pub type ExonKey = (SurrogateKey, u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionKey {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub reference: SurrogateKey,
}

impl RegionKey {
    pub fn of(row: &RegionRow) -> Self {
        Self {
            chrom: row.chrom.clone(),
            start: row.start,
            end: row.end,
            reference: row.reference,
        }
    }

    pub fn to_row(&self) -> RegionRow {
        RegionRow {
            chrom: self.chrom.clone(),
            start: self.start,
            end: self.end,
            reference: self.reference,
        }
    }
}

// ============================================================================
// Links
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PanelGeneLink {
    pub panel: SurrogateKey,
    pub gene: SurrogateKey,
    pub panel_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PanelStrLink {
    pub panel: SurrogateKey,
    pub repeat: SurrogateKey,
    pub panel_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PanelCnvLink {
    pub panel: SurrogateKey,
    pub cnv: SurrogateKey,
    pub panel_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuperpanelLink {
    pub superpanel: SurrogateKey,
    pub panel: SurrogateKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionStrLink {
    pub region: SurrogateKey,
    pub repeat: SurrogateKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionCnvLink {
    pub region: SurrogateKey,
    pub cnv: SurrogateKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndicationPanelLink {
    pub clinical_indication: SurrogateKey,
    pub panel: SurrogateKey,
    pub ci_version: String,
}

/// Feature tables a panel links to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureTable {
    Gene,
    Str,
    Cnv,
}

impl FeatureTable {
    pub const ALL: [FeatureTable; 3] = [FeatureTable::Gene, FeatureTable::Str, FeatureTable::Cnv];

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            FeatureTable::Gene => EntityKind::Gene,
            FeatureTable::Str => EntityKind::Str,
            FeatureTable::Cnv => EntityKind::Cnv,
        }
    }
}

/// A reference the builder could not resolve under the collecting policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedRef {
    /// Kind of the referring entity
    pub kind: EntityKind,
    /// Natural key of the referring entity
    pub key: String,
    /// The missing natural key
    pub reference: String,
}

/// A superpanel row whose copy of a subpanel header disagrees with the
/// subpanel's own dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleSubpanel {
    pub superpanel: String,
    pub subpanel: String,
    pub field: &'static str,
    /// Value written in the superpanel row
    pub declared: String,
    /// Value of the built subpanel row
    pub built: String,
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct PanelGraph {
    pub references: KeyedTable<String, ReferenceRow>,
    pub panels: KeyedTable<String, PanelRow>,
    pub genes: KeyedTable<String, GeneRow>,
    pub transcripts: KeyedTable<TranscriptKey, TranscriptRow>,
    pub exons: KeyedTable<ExonKey, ExonRow>,
    pub regions: KeyedTable<RegionKey, RegionRow>,
    pub strs: KeyedTable<String, StrRow>,
    pub cnvs: KeyedTable<String, CnvRow>,
    pub indications: KeyedTable<String, IndicationRow>,

    pub panel_genes: LinkTable<PanelGeneLink>,
    pub panel_strs: LinkTable<PanelStrLink>,
    pub panel_cnvs: LinkTable<PanelCnvLink>,
    pub superpanel_links: LinkTable<SuperpanelLink>,
    pub region_strs: LinkTable<RegionStrLink>,
    pub region_cnvs: LinkTable<RegionCnvLink>,
    pub indication_panels: LinkTable<IndicationPanelLink>,

    pub unresolved: Vec<UnresolvedRef>,
    pub stale_subpanels: Vec<StaleSubpanel>,
}

/// One line of the genepanels export
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GenePanelRow {
    pub panel_name: String,
    pub panel_version: String,
    pub gene: String,
}

/// Clinical transcript assignments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Genes2Transcripts {
    /// `(gene, refseq.version)` sorted by gene
    pub assigned: Vec<(String, String)>,
    /// Genes without a clinical transcript, sorted
    pub missing: Vec<String>,
}

impl PanelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference_key(&self, name: &str) -> Option<SurrogateKey> {
        self.references.surrogate(&name.to_string())
    }

    pub fn reference_name(&self, pk: SurrogateKey) -> Option<&str> {
        self.references.row(pk).map(|r| r.name.as_str())
    }

    pub fn panel_key(&self, external_id: &str) -> Option<SurrogateKey> {
        self.panels.surrogate(&external_id.to_string())
    }

    /// Gene natural keys linked to a panel under any version
    pub fn panel_gene_keys(&self, panel_id: &str) -> BTreeSet<String> {
        let Some(panel) = self.panel_key(panel_id) else {
            return BTreeSet::new();
        };
        self.panel_genes
            .rows()
            .iter()
            .filter(|link| link.panel == panel)
            .filter_map(|link| self.genes.key_of(link.gene).cloned())
            .collect()
    }

    /// Gene natural keys linked to a panel at its latest linked version
    pub fn current_gene_keys(&self, panel_id: &str) -> BTreeSet<String> {
        self.current_feature_keys(panel_id, FeatureTable::Gene)
    }

    /// Natural keys of one feature table linked to a panel at its latest
    /// linked version
    pub fn current_feature_keys(&self, panel_id: &str, feature: FeatureTable) -> BTreeSet<String> {
        let Some(panel) = self.panel_key(panel_id) else {
            return BTreeSet::new();
        };
        let links = self.feature_links(panel, feature);
        let fallback = self.panels.row(panel).map(|p| p.version.clone()).unwrap_or_default();
        let current = current_version(links.iter().map(|(version, _)| *version), &fallback);

        links
            .into_iter()
            .filter(|(version, _)| same_version(version, &current))
            .map(|(_, key)| key)
            .collect()
    }

    fn feature_links(&self, panel: SurrogateKey, feature: FeatureTable) -> Vec<(&str, String)> {
        match feature {
            FeatureTable::Gene => self
                .panel_genes
                .rows()
                .iter()
                .filter(|link| link.panel == panel)
                .filter_map(|link| Some((link.panel_version.as_str(), self.genes.key_of(link.gene)?.clone())))
                .collect(),
            FeatureTable::Str => self
                .panel_strs
                .rows()
                .iter()
                .filter(|link| link.panel == panel)
                .filter_map(|link| Some((link.panel_version.as_str(), self.strs.key_of(link.repeat)?.clone())))
                .collect(),
            FeatureTable::Cnv => self
                .panel_cnvs
                .rows()
                .iter()
                .filter(|link| link.panel == panel)
                .filter_map(|link| Some((link.panel_version.as_str(), self.cnvs.key_of(link.cnv)?.clone())))
                .collect(),
        }
    }

    /// Subpanel external ids of a superpanel, in link order
    pub fn subpanel_ids(&self, superpanel_id: &str) -> Vec<String> {
        let Some(superpanel) = self.panel_key(superpanel_id) else {
            return Vec::new();
        };
        self.superpanel_links
            .rows()
            .iter()
            .filter(|link| link.superpanel == superpanel)
            .filter_map(|link| self.panels.key_of(link.panel).cloned())
            .collect()
    }

    /// Union of the current gene sets of a superpanel's subpanels
    pub fn superpanel_gene_keys(&self, superpanel_id: &str) -> BTreeSet<String> {
        self.superpanel_feature_keys(superpanel_id, FeatureTable::Gene)
    }

    pub fn superpanel_feature_keys(&self, superpanel_id: &str, feature: FeatureTable) -> BTreeSet<String> {
        self.subpanel_ids(superpanel_id)
            .iter()
            .flat_map(|subpanel| self.current_feature_keys(subpanel, feature))
            .collect()
    }

    /// Sorted, distinct `(panel name, version, gene symbol)` rows
    ///
    /// Superpanels are expanded through their subpanels under the superpanel
    /// name.
    pub fn genepanels(&self) -> Vec<GenePanelRow> {
        let mut rows = BTreeSet::new();
        for (_, panel_id, panel) in self.panels.iter() {
            let genes = if panel.is_superpanel {
                self.superpanel_gene_keys(panel_id)
            } else {
                self.panel_gene_keys(panel_id)
            };
            for gene_key in genes {
                let symbol = self
                    .genes
                    .get(&gene_key)
                    .map(|g| g.symbol.clone())
                    .unwrap_or(gene_key);
                rows.insert(GenePanelRow {
                    panel_name: panel.name.clone(),
                    panel_version: panel.version.clone(),
                    gene: symbol,
                });
            }
        }

        let mut rows: Vec<GenePanelRow> = rows.into_iter().collect();
        rows.sort_by(|a, b| (&a.panel_name, &a.gene).cmp(&(&b.panel_name, &b.gene)));
        rows
    }

    /// Clinical transcript of every gene, keyed by gene symbol
    pub fn genes2transcripts(&self) -> Genes2Transcripts {
        let mut assigned = BTreeMap::new();
        let mut missing = BTreeSet::new();
        for (_, _, gene) in self.genes.iter() {
            let transcript = gene
                .clinical_transcript
                .and_then(|pk| self.transcripts.row(pk))
                .map(|t| format!("{}.{}", t.refseq_base, t.version));
            match transcript {
                Some(accession) => {
                    assigned.insert(gene.symbol.clone(), accession);
                },
                None => {
                    missing.insert(gene.symbol.clone());
                },
            }
        }
        Genes2Transcripts {
            assigned: assigned.into_iter().collect(),
            missing: missing.into_iter().collect(),
        }
    }

    /// Row counts per table, for logging
    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("panel", self.panels.len()),
            ("gene", self.genes.len()),
            ("transcript", self.transcripts.len()),
            ("exon", self.exons.len()),
            ("region", self.regions.len()),
            ("str", self.strs.len()),
            ("cnv", self.cnvs.len()),
            ("clinical_indication", self.indications.len()),
            ("panel_gene", self.panel_genes.len()),
            ("superpanel", self.superpanel_links.len()),
        ])
    }
}

/// Latest of a set of version tags, or `fallback` when none parse
pub fn current_version<'a>(tags: impl IntoIterator<Item = &'a str>, fallback: &str) -> String {
    match latest_version(tags) {
        Ok(Some(version)) => version.to_string(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn panel(name: &str, version: &str, is_superpanel: bool) -> PanelRow {
        PanelRow {
            name: name.to_string(),
            version: version.to_string(),
            signed_off: "None".to_string(),
            panel_type: PanelType::Gms,
            is_superpanel,
        }
    }

    fn gene(symbol: &str) -> GeneRow {
        GeneRow {
            symbol: symbol.to_string(),
            hgnc_id: None,
            clinical_transcript: None,
        }
    }

    fn sample() -> PanelGraph {
        let mut graph = PanelGraph::new();
        let p1 = graph.panels.insert("1".into(), panel("Alpha", "1.10", false));
        let p2 = graph.panels.insert("2".into(), panel("Beta", "2.0", false));
        let sp = graph.panels.insert("3".into(), panel("Combined", "1.0", true));
        let g1 = graph.genes.insert("G1".into(), gene("G1"));
        let g2 = graph.genes.insert("G2".into(), gene("G2"));
        let g3 = graph.genes.insert("G3".into(), gene("G3"));

        for (panel, gene, version) in [(p1, g1, "1.9"), (p1, g2, "1.10"), (p2, g2, "2.0"), (p2, g3, "2.0")] {
            graph.panel_genes.push(PanelGeneLink {
                panel,
                gene,
                panel_version: version.to_string(),
            });
        }
        graph.superpanel_links.push(SuperpanelLink { superpanel: sp, panel: p1 });
        graph.superpanel_links.push(SuperpanelLink { superpanel: sp, panel: p2 });
        graph
    }

    #[test]
    fn test_current_gene_keys_use_semantic_latest_version() {
        let graph = sample();
        assert_eq!(graph.panel_gene_keys("1").len(), 2);
        let current: Vec<String> = graph.current_gene_keys("1").into_iter().collect();
        assert_eq!(current, vec!["G2"]);
    }

    #[test]
    fn test_superpanel_genes_are_union_of_subpanels() {
        let graph = sample();
        let genes: Vec<String> = graph.superpanel_gene_keys("3").into_iter().collect();
        assert_eq!(genes, vec!["G2", "G3"]);
        assert!(graph.superpanel_gene_keys("1").is_empty());
    }

    #[test]
    fn test_genepanels_expands_superpanels_sorted() {
        let rows = sample().genepanels();
        let flat: Vec<(String, String)> = rows
            .iter()
            .map(|r| (r.panel_name.clone(), r.gene.clone()))
            .collect();
        assert_eq!(
            flat,
            vec![
                ("Alpha".to_string(), "G1".to_string()),
                ("Alpha".to_string(), "G2".to_string()),
                ("Beta".to_string(), "G2".to_string()),
                ("Beta".to_string(), "G3".to_string()),
                ("Combined".to_string(), "G2".to_string()),
                ("Combined".to_string(), "G3".to_string()),
            ]
        );
    }

    #[test]
    fn test_current_feature_keys_by_table() {
        let mut graph = sample();
        let p1 = graph.panel_key("1").unwrap();
        let repeat = graph.strs.insert(
            "STR_1".into(),
            StrRow {
                gene: None,
                repeated_sequence: "CAG".into(),
                nb_repeats: 30,
                nb_pathogenic_repeats: 40,
            },
        );
        graph.panel_strs.push(PanelStrLink {
            panel: p1,
            repeat,
            panel_version: "1.10".into(),
        });
        let strs: Vec<String> = graph.current_feature_keys("1", FeatureTable::Str).into_iter().collect();
        assert_eq!(strs, vec!["STR_1"]);
        assert!(graph.current_feature_keys("1", FeatureTable::Cnv).is_empty());
        assert_eq!(graph.superpanel_feature_keys("3", FeatureTable::Str).len(), 1);
    }

    #[test]
    fn test_current_version_falls_back() {
        assert_eq!(current_version(["1.2", "1.10"], "0"), "1.10");
        assert_eq!(current_version(["draft"], "draft"), "draft");
        assert_eq!(current_version(std::iter::empty(), "1.0"), "1.0");
    }
}
