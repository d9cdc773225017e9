//! Fixture emitter
//!
//! Serialises a [`PanelGraph`] into the `{model, pk, fields}` records of a
//! relational fixture file. Tables are emitted in a fixed order and rows in
//! surrogate-key order, so the same graph always serialises to the same
//! bytes.

use crate::graph::PanelGraph;
use panel_common::checksum::write_sidecar;
use panel_common::{PanelError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prefix of every model name
pub const MODEL_PREFIX: &str = "panel_database";

/// One fixture record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub model: String,
    pub pk: u64,
    pub fields: Value,
}

impl FixtureRecord {
    fn new(model: &str, pk: u64, fields: Value) -> Self {
        Self {
            model: format!("{}.{}", MODEL_PREFIX, model),
            pk,
            fields,
        }
    }

    /// Model name without the application prefix
    pub fn model_name(&self) -> &str {
        self.model
            .strip_prefix(MODEL_PREFIX)
            .and_then(|m| m.strip_prefix('.'))
            .unwrap_or(&self.model)
    }
}

/// Records of one table
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureTable {
    pub table: &'static str,
    pub records: Vec<FixtureRecord>,
}

/// Files written by [`write_fixtures`]
#[derive(Debug, Clone)]
pub struct FixtureOutput {
    pub folder: PathBuf,
    pub dump: PathBuf,
    pub tables: Vec<PathBuf>,
    /// SHA-256 of the full dump
    pub digest: String,
}

// ============================================================================
// Serialisation
// ============================================================================

/// Every table of the graph, in load order
pub fn fixture_tables(graph: &PanelGraph) -> Vec<FixtureTable> {
    let mut tables = Vec::with_capacity(16);

    tables.push(table(
        "reference",
        graph
            .references
            .iter()
            .map(|(pk, _, row)| FixtureRecord::new("Reference", pk.get(), json!({ "name": row.name })))
            .collect(),
    ));

    tables.push(table(
        "panel",
        graph
            .panels
            .iter()
            .map(|(pk, external_id, row)| {
                FixtureRecord::new(
                    "Panel",
                    pk.get(),
                    json!({
                        "panelapp_id": external_id,
                        "name": row.name,
                        "version": row.version,
                        "signedoff": row.signed_off,
                        "panel_type": row.panel_type.as_str(),
                        "is_superpanel": row.is_superpanel,
                    }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "superpanel",
        graph
            .superpanel_links
            .iter()
            .map(|(pk, link)| {
                FixtureRecord::new(
                    "Superpanel",
                    pk.get(),
                    json!({ "superpanel": link.superpanel.get(), "panel": link.panel.get() }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "gene",
        graph
            .genes
            .iter()
            .map(|(pk, _, row)| {
                FixtureRecord::new(
                    "Gene",
                    pk.get(),
                    json!({
                        "symbol": row.symbol,
                        "hgnc_id": row.hgnc_id,
                        "clinical_transcript": row.clinical_transcript.map(|t| t.get()),
                    }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "transcript",
        graph
            .transcripts
            .iter()
            .map(|(pk, _, row)| {
                FixtureRecord::new(
                    "Transcript",
                    pk.get(),
                    json!({
                        "refseq": row.refseq_base,
                        "version": row.version,
                        "canonical": row.canonical,
                        "gene": row.gene.get(),
                    }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "region",
        graph
            .regions
            .iter()
            .map(|(pk, _, row)| {
                FixtureRecord::new(
                    "Region",
                    pk.get(),
                    json!({
                        "chrom": row.chrom,
                        "start": row.start,
                        "end": row.end,
                        "reference": row.reference.get(),
                    }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "exon",
        graph
            .exons
            .iter()
            .map(|(pk, _, row)| {
                FixtureRecord::new(
                    "Exon",
                    pk.get(),
                    json!({
                        "number": row.number,
                        "transcript": row.transcript.get(),
                        "region": row.region.get(),
                    }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "str",
        graph
            .strs
            .iter()
            .map(|(pk, name, row)| {
                FixtureRecord::new(
                    "Str",
                    pk.get(),
                    json!({
                        "name": name,
                        "gene": row.gene.map(|g| g.get()),
                        "repeated_sequence": row.repeated_sequence,
                        "nb_repeats": row.nb_repeats,
                        "nb_pathogenic_repeats": row.nb_pathogenic_repeats,
                    }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "region_str",
        graph
            .region_strs
            .iter()
            .map(|(pk, link)| {
                FixtureRecord::new(
                    "RegionStr",
                    pk.get(),
                    json!({ "region": link.region.get(), "str": link.repeat.get() }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "panel_str",
        graph
            .panel_strs
            .iter()
            .map(|(pk, link)| {
                FixtureRecord::new(
                    "PanelStr",
                    pk.get(),
                    json!({
                        "panel": link.panel.get(),
                        "str": link.repeat.get(),
                        "panel_version": link.panel_version,
                    }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "cnv",
        graph
            .cnvs
            .iter()
            .map(|(pk, name, row)| {
                FixtureRecord::new(
                    "Cnv",
                    pk.get(),
                    json!({ "name": name, "variant_type": row.variant_type }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "region_cnv",
        graph
            .region_cnvs
            .iter()
            .map(|(pk, link)| {
                FixtureRecord::new(
                    "RegionCnv",
                    pk.get(),
                    json!({ "region": link.region.get(), "cnv": link.cnv.get() }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "panel_cnv",
        graph
            .panel_cnvs
            .iter()
            .map(|(pk, link)| {
                FixtureRecord::new(
                    "PanelCnv",
                    pk.get(),
                    json!({
                        "panel": link.panel.get(),
                        "cnv": link.cnv.get(),
                        "panel_version": link.panel_version,
                    }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "panel_gene",
        graph
            .panel_genes
            .iter()
            .map(|(pk, link)| {
                FixtureRecord::new(
                    "PanelGene",
                    pk.get(),
                    json!({
                        "panel": link.panel.get(),
                        "gene": link.gene.get(),
                        "panel_version": link.panel_version,
                    }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "clinical_indication",
        graph
            .indications
            .iter()
            .map(|(pk, code, row)| {
                FixtureRecord::new(
                    "ClinicalIndication",
                    pk.get(),
                    json!({
                        "code": code,
                        "name": row.name,
                        "gemini_name": row.gemini_name,
                        "test_method": row.test_method,
                    }),
                )
            })
            .collect(),
    ));

    tables.push(table(
        "clinical_indication_panels",
        graph
            .indication_panels
            .iter()
            .map(|(pk, link)| {
                FixtureRecord::new(
                    "ClinicalIndicationPanels",
                    pk.get(),
                    json!({
                        "clinical_indication": link.clinical_indication.get(),
                        "panel": link.panel.get(),
                        "ci_version": link.ci_version,
                    }),
                )
            })
            .collect(),
    ));

    tables
}

/// Every record of the graph, in load order
pub fn fixture_records(graph: &PanelGraph) -> Vec<FixtureRecord> {
    fixture_tables(graph)
        .into_iter()
        .flat_map(|t| t.records)
        .collect()
}

fn table(table: &'static str, records: Vec<FixtureRecord>) -> FixtureTable {
    FixtureTable { table, records }
}

/// Pretty-printed JSON with four-space indentation
pub fn to_json_bytes(records: &[FixtureRecord]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    records.serialize(&mut serializer)?;
    buffer.push(b'\n');
    Ok(buffer)
}

// ============================================================================
// Files
// ============================================================================

/// Write the fixture set into a fresh folder dated today
pub fn write_fixtures(graph: &PanelGraph, dir: impl AsRef<Path>) -> Result<FixtureOutput> {
    let date = chrono::Local::now().format("%y%m%d").to_string();
    write_fixtures_dated(graph, dir, &date)
}

/// Write the fixture set into `<dir>/<date>-<n>`, `n` being the first unused
/// suffix
pub fn write_fixtures_dated(graph: &PanelGraph, dir: impl AsRef<Path>, date: &str) -> Result<FixtureOutput> {
    let folder = next_output_folder(dir.as_ref(), date)?;
    std::fs::create_dir_all(&folder)?;

    let tables = fixture_tables(graph);
    let mut table_paths = Vec::with_capacity(tables.len());
    for table in &tables {
        let path = folder.join(format!("{}_{}.json", date, table.table));
        std::fs::write(&path, to_json_bytes(&table.records)?)?;
        debug!(table = table.table, records = table.records.len(), "Wrote fixture table");
        table_paths.push(path);
    }

    let all: Vec<FixtureRecord> = tables.into_iter().flat_map(|t| t.records).collect();
    let dump = folder.join(format!("{}_json_dump.json", date));
    std::fs::write(&dump, to_json_bytes(&all)?)?;
    let digest = write_sidecar(&dump)?;

    info!(
        folder = %folder.display(),
        records = all.len(),
        digest = %digest,
        "Wrote fixtures"
    );

    Ok(FixtureOutput {
        folder,
        dump,
        tables: table_paths,
        digest,
    })
}

fn next_output_folder(dir: &Path, date: &str) -> Result<PathBuf> {
    (1..=u32::MAX)
        .map(|n| dir.join(format!("{}-{}", date, n)))
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| PanelError::Config(format!("No free output folder for {} in {}", date, dir.display())))
}

/// Read a fixture dump back
pub fn read_fixture_file(path: impl AsRef<Path>) -> Result<Vec<FixtureRecord>> {
    let path = path.as_ref();
    let records: Vec<FixtureRecord> = serde_json::from_slice(&std::fs::read(path)?)?;
    info!(path = %path.display(), records = records.len(), "Read fixture dump");
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::graph::{GeneRow, PanelGeneLink, PanelRow, ReferenceRow};
    use crate::records::PanelType;

    fn graph() -> PanelGraph {
        let mut graph = PanelGraph::new();
        graph.references.insert("GRCh37".into(), ReferenceRow { name: "GRCh37".into() });
        let panel = graph.panels.insert(
            "100".into(),
            PanelRow {
                name: "Cardiomyopathy".into(),
                version: "2.1".into(),
                signed_off: "2021-03-01".into(),
                panel_type: PanelType::Gms,
                is_superpanel: false,
            },
        );
        let gene = graph.genes.insert(
            "HGNC:7577".into(),
            GeneRow {
                symbol: "MYH7".into(),
                hgnc_id: Some("HGNC:7577".into()),
                clinical_transcript: None,
            },
        );
        graph.panel_genes.push(PanelGeneLink {
            panel,
            gene,
            panel_version: "2.1".into(),
        });
        graph
    }

    #[test]
    fn test_records_follow_table_order() {
        let records = fixture_records(&graph());
        let models: Vec<&str> = records.iter().map(FixtureRecord::model_name).collect();
        assert_eq!(models, vec!["Reference", "Panel", "Gene", "PanelGene"]);
        assert_eq!(records[1].model, "panel_database.Panel");
        assert_eq!(records[1].fields["panelapp_id"], "100");
        assert_eq!(records[1].fields["panel_type"], "gms");
        assert_eq!(records[2].fields["clinical_transcript"], Value::Null);
        assert_eq!(records[3].fields["panel"], 1);
    }

    #[test]
    fn test_json_uses_four_space_indent() {
        let bytes = to_json_bytes(&fixture_records(&graph())).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("[\n    {\n        \"model\""));
    }

    #[test]
    fn test_write_fixtures_uses_fresh_folder() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_fixtures_dated(&graph(), dir.path(), "240315").unwrap();
        let second = write_fixtures_dated(&graph(), dir.path(), "240315").unwrap();

        assert!(first.folder.ends_with("240315-1"));
        assert!(second.folder.ends_with("240315-2"));
        assert_eq!(first.digest, second.digest);
        assert_eq!(first.tables.len(), 16);
        assert!(first.folder.join("240315_panel_gene.json").exists());
        assert!(panel_common::checksum::verify_sidecar(&first.dump).unwrap());

        let back = read_fixture_file(&first.dump).unwrap();
        assert_eq!(back, fixture_records(&graph()));
    }
}
