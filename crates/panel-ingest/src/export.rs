// Tab-separated exports derived from the panel graph

use crate::graph::PanelGraph;
use panel_common::Result;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

fn tsv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(writer)
}

/// Write `panel name, version, gene` rows
pub fn write_genepanels_to<W: Write>(graph: &PanelGraph, writer: W) -> Result<usize> {
    let rows = graph.genepanels();
    let mut writer = tsv_writer(writer);
    for row in &rows {
        writer.write_record([&row.panel_name, &row.panel_version, &row.gene])?;
    }
    writer.flush()?;
    Ok(rows.len())
}

pub fn write_genepanels(graph: &PanelGraph, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let written = write_genepanels_to(graph, std::fs::File::create(path)?)?;
    info!(path = %path.display(), rows = written, "Wrote genepanels");
    Ok(written)
}

/// Write `gene, refseq.version` rows; returns the genes left without a
/// clinical transcript
pub fn write_genes2transcripts_to<W: Write>(graph: &PanelGraph, writer: W) -> Result<Vec<String>> {
    let g2t = graph.genes2transcripts();
    let mut writer = tsv_writer(writer);
    for (gene, accession) in &g2t.assigned {
        writer.write_record([gene, accession])?;
    }
    writer.flush()?;
    Ok(g2t.missing)
}

pub fn write_genes2transcripts(graph: &PanelGraph, path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let missing = write_genes2transcripts_to(graph, std::fs::File::create(path)?)?;
    if !missing.is_empty() {
        warn!(count = missing.len(), genes = ?missing, "Genes without a clinical transcript");
    }
    info!(path = %path.display(), "Wrote genes2transcripts");
    Ok(missing)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::graph::{GeneRow, PanelGeneLink, PanelRow, TranscriptRow};
    use crate::records::PanelType;

    fn graph() -> PanelGraph {
        let mut graph = PanelGraph::new();
        let panel = graph.panels.insert(
            "7".into(),
            PanelRow {
                name: "Epilepsy".into(),
                version: "3.0".into(),
                signed_off: "None".into(),
                panel_type: PanelType::Gms,
                is_superpanel: false,
            },
        );
        for symbol in ["SCN1A", "CDKL5"] {
            let gene = graph.genes.insert(
                symbol.into(),
                GeneRow {
                    symbol: symbol.into(),
                    hgnc_id: None,
                    clinical_transcript: None,
                },
            );
            graph.panel_genes.push(PanelGeneLink {
                panel,
                gene,
                panel_version: "3.0".into(),
            });
        }
        let scn1a = graph.genes.surrogate(&"SCN1A".to_string()).unwrap();
        let transcript = graph.transcripts.insert(
            ("NM_001165963".into(), 4),
            TranscriptRow {
                refseq_base: "NM_001165963".into(),
                version: 4,
                canonical: true,
                gene: scn1a,
            },
        );
        graph.genes.row_mut(scn1a).unwrap().clinical_transcript = Some(transcript);
        graph
    }

    #[test]
    fn test_genepanels_tsv() {
        let mut out = Vec::new();
        assert_eq!(write_genepanels_to(&graph(), &mut out).unwrap(), 2);
        assert_eq!(String::from_utf8(out).unwrap(), "Epilepsy\t3.0\tCDKL5\nEpilepsy\t3.0\tSCN1A\n");
    }

    #[test]
    fn test_g2t_reports_missing_genes() {
        let mut out = Vec::new();
        let missing = write_genes2transcripts_to(&graph(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "SCN1A\tNM_001165963.4\n");
        assert_eq!(missing, vec!["CDKL5"]);
    }
}
