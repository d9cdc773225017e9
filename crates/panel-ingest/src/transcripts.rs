// Transcript and exon lookup for genes

use crate::records::GeneRecord;
use flate2::read::GzDecoder;
use panel_common::{PanelError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// One exon of a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExonSpan {
    pub number: u32,
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

/// A RefSeq transcript split into `(refseq_base, version)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptModel {
    pub refseq_base: String,
    pub version: u32,
    pub canonical: bool,
    /// Sorted by exon number
    pub exons: Vec<ExonSpan>,
}

impl TranscriptModel {
    pub fn accession(&self) -> String {
        format!("{}.{}", self.refseq_base, self.version)
    }
}

/// Split `NM_000059.3` into its base and numeric version
pub fn split_accession(accession: &str) -> Option<(String, u32)> {
    let (base, version) = accession.trim().rsplit_once('.')?;
    let version = version.parse().ok()?;
    (!base.is_empty()).then(|| (base.to_string(), version))
}

/// Transcripts of one gene together with its clinical transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneTranscripts {
    pub transcripts: Vec<TranscriptModel>,
    /// Accession of the clinical transcript, always one of `transcripts`
    pub clinical: String,
}

/// Source of transcript structure for genes
///
/// `None` means the gene is stored without transcripts and without a
/// clinical transcript.
pub trait TranscriptSource {
    fn lookup(&self, gene: &GeneRecord) -> Option<GeneTranscripts>;
}

/// Source with no transcripts at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranscripts;

impl TranscriptSource for NoTranscripts {
    fn lookup(&self, _gene: &GeneRecord) -> Option<GeneTranscripts> {
        None
    }
}

// ============================================================================
// In-memory source
// ============================================================================

#[derive(Debug, Deserialize)]
struct ExonTableRow {
    gene: String,
    transcript: String,
    canonical: String,
    exon_number: u32,
    chrom: String,
    start: u64,
    end: u64,
}

/// Transcript source loaded from an exon table
///
/// Genes are keyed by upper-cased symbol or HGNC id, whichever the table
/// uses.
#[derive(Debug, Clone, Default)]
pub struct MemoryTranscriptSource {
    genes: HashMap<String, Vec<TranscriptModel>>,
    clinical: HashMap<String, String>,
}

impl MemoryTranscriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one transcript of a gene
    pub fn add_transcript(&mut self, gene: &str, transcript: TranscriptModel) {
        let transcripts = self.genes.entry(normalise_gene(gene)).or_default();
        match transcripts
            .iter_mut()
            .find(|t| t.refseq_base == transcript.refseq_base && t.version == transcript.version)
        {
            Some(existing) => {
                existing.canonical |= transcript.canonical;
                existing.exons.extend(transcript.exons);
                existing.exons.sort_by_key(|e| e.number);
                existing.exons.dedup_by_key(|e| e.number);
            },
            None => transcripts.push(transcript),
        }
    }

    /// Name the clinical transcript of a gene
    pub fn set_clinical(&mut self, gene: &str, accession: &str) {
        self.clinical
            .insert(normalise_gene(gene), accession.trim().to_string());
    }

    /// Load `gene, transcript, canonical, exon_number, chrom, start, end`
    /// (with header); `.gz` files are decompressed
    pub fn from_exon_table(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut source = Self::new();
        source.load_exon_table(open_maybe_gz(path)?, &display_name(path))?;
        info!(
            path = %path.display(),
            genes = source.genes.len(),
            "Loaded exon table"
        );
        Ok(source)
    }

    pub fn load_exon_table<R: Read>(&mut self, reader: R, source_name: &str) -> Result<()> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(reader);

        for (index, row) in reader.deserialize::<ExonTableRow>().enumerate() {
            let line = index as u64 + 2;
            let row = row.map_err(|e| PanelError::malformed(source_name, line, e.to_string()))?;
            let (refseq_base, version) = split_accession(&row.transcript).ok_or_else(|| {
                PanelError::malformed(
                    source_name,
                    line,
                    format!("transcript '{}' is not of the form base.version", row.transcript),
                )
            })?;

            self.add_transcript(
                &row.gene,
                TranscriptModel {
                    refseq_base,
                    version,
                    canonical: parse_flag(&row.canonical),
                    exons: vec![ExonSpan {
                        number: row.exon_number,
                        chrom: row.chrom,
                        start: row.start,
                        end: row.end,
                    }],
                },
            );
        }
        Ok(())
    }

    /// Load the `gene<TAB>transcript` clinical transcript map
    pub fn with_clinical_map(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        self.load_clinical_map(open_maybe_gz(path)?)?;
        debug!(path = %path.display(), entries = self.clinical.len(), "Loaded clinical transcripts");
        Ok(self)
    }

    pub fn load_clinical_map<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        for row in reader.records() {
            let row = row?;
            if let (Some(gene), Some(transcript)) = (row.get(0), row.get(1)) {
                if !gene.trim().is_empty() {
                    self.set_clinical(gene, transcript);
                }
            }
        }
        Ok(())
    }

    fn gene_key(&self, gene: &GeneRecord) -> Option<String> {
        gene.hgnc_id
            .iter()
            .map(|id| normalise_gene(id))
            .chain(std::iter::once(normalise_gene(&gene.symbol)))
            .find(|key| self.genes.contains_key(key))
    }
}

impl TranscriptSource for MemoryTranscriptSource {
    fn lookup(&self, gene: &GeneRecord) -> Option<GeneTranscripts> {
        let key = self.gene_key(gene)?;
        let transcripts = self.genes.get(&key)?;
        if transcripts.is_empty() {
            return None;
        }

        let clinical = self
            .clinical
            .get(&key)
            .filter(|accession| transcripts.iter().any(|t| &t.accession() == *accession))
            .cloned()
            .or_else(|| {
                transcripts
                    .iter()
                    .rev()
                    .find(|t| t.canonical)
                    .map(TranscriptModel::accession)
            })?;

        Some(GeneTranscripts {
            transcripts: transcripts.clone(),
            clinical,
        })
    }
}

fn normalise_gene(gene: &str) -> String {
    gene.trim().to_uppercase()
}

fn parse_flag(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "y")
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn open_maybe_gz(path: &Path) -> Result<Box<dyn Read>> {
    let file = std::fs::File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const EXONS: &str = "\
gene\ttranscript\tcanonical\texon_number\tchrom\tstart\tend
BRCA1\tNM_007294.4\ttrue\t2\t17\t41276033\t41276132
BRCA1\tNM_007294.4\ttrue\t1\t17\t41277287\t41277500
BRCA1\tNM_007300.4\tfalse\t1\t17\t41277287\t41277500
HGNC:7577\tNM_000257.4\tfalse\t1\t14\t23902000\t23902100
";

    fn source() -> MemoryTranscriptSource {
        let mut source = MemoryTranscriptSource::new();
        source.load_exon_table(EXONS.as_bytes(), "exons.tsv").unwrap();
        source
    }

    #[test]
    fn test_canonical_transcript_is_clinical_by_default() {
        let found = source().lookup(&GeneRecord::new("brca1", None)).unwrap();
        assert_eq!(found.clinical, "NM_007294.4");
        assert_eq!(found.transcripts.len(), 2);
        let numbers: Vec<u32> = found.transcripts[0].exons.iter().map(|e| e.number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_clinical_map_overrides_canonical_only_when_gene_has_it() {
        let mut source = source();
        source.load_clinical_map("BRCA1\tNM_007300.4\n".as_bytes()).unwrap();
        let found = source.lookup(&GeneRecord::new("BRCA1", None)).unwrap();
        assert_eq!(found.clinical, "NM_007300.4");

        source.set_clinical("BRCA1", "NM_999999.1");
        let found = source.lookup(&GeneRecord::new("BRCA1", None)).unwrap();
        assert_eq!(found.clinical, "NM_007294.4");
    }

    #[test]
    fn test_gene_without_clinical_transcript_has_none() {
        let source = source();
        let gene = GeneRecord::new("MYH7", Some("HGNC:7577".into()));
        assert!(source.lookup(&gene).is_none());
        assert!(source.lookup(&GeneRecord::new("TTN", None)).is_none());
    }

    #[test]
    fn test_split_accession() {
        assert_eq!(split_accession("NM_000059.3"), Some(("NM_000059".to_string(), 3)));
        assert_eq!(split_accession("NM_000059"), None);
        assert_eq!(split_accession(".3"), None);
    }

    #[test]
    fn test_gzip_exon_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exons.tsv.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(EXONS.as_bytes()).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let source = MemoryTranscriptSource::from_exon_table(&path).unwrap();
        assert!(source.lookup(&GeneRecord::new("BRCA1", None)).is_some());
    }

    #[test]
    fn test_bad_transcript_is_malformed() {
        let content = "gene\ttranscript\tcanonical\texon_number\tchrom\tstart\tend\nA\tNM_1\ttrue\t1\t1\t1\t2\n";
        let err = MemoryTranscriptSource::new()
            .load_exon_table(content.as_bytes(), "exons.tsv")
            .unwrap_err();
        assert!(err.to_string().contains("exons.tsv line 2"));
    }
}
