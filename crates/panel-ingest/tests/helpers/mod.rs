//! Test helpers for panel-ingest integration tests
//!
//! Writes a small but complete set of sources to a temporary directory:
//! - GMS panel dumps (normal panels and one superpanel)
//! - a test directory JSON
//! - an exon table with a shared exon between two transcripts

#![allow(dead_code)]

use panel_ingest::builder::{build_graph, BuildInput, BuildOptions};
use panel_ingest::dump::read_dump_dir;
use panel_ingest::graph::PanelGraph;
use panel_ingest::records::{DumpRecord, PanelType};
use panel_ingest::test_directory::{read_test_directory, TestDirectory};
use panel_ingest::transcripts::MemoryTranscriptSource;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const CI_VERSION: &str = "230401";

pub const ATAXIA_PANEL: &str = "\
Ataxia\t100\t2.1\t2021-03-01\tgene\tG1\tHGNC:1
Ataxia\t100\t2.1\t2021-03-01\tgene\tG2\tHGNC:2
Ataxia\t100\t2.1\t2021-03-01\tstr\tHTT_CAG\tG1\tCAG\t26\t40\t4\t[3076604, 3076660]\t[3074877, 3074933]
";

pub const MYOPATHY_PANEL: &str = "\
Myopathy\t200\t1.0\t2022-01-10\tgene\tG2\tHGNC:2
Myopathy\t200\t1.0\t2022-01-10\tgene\tG3\tHGNC:3
Myopathy\t200\t1.0\t2022-01-10\tcnv\tISCA-1\tloss\t22\t[100, 200]\tNone
";

pub const DELETION_PANEL: &str = "\
Deletions\t300\t4.0\t2020-11-30\tcnv\tISCA-2\tgain\t22\t[100, 200]\tNone
";

pub const DDG2P_PANEL: &str = "\
DDG2P\t484\t3.2\t2021-06-15\tgene\tG4\tHGNC:4
";

pub const SUPERPANEL: &str = "\
500\tAtaxia and myopathy\t3.0\tNone\t100\tAtaxia\t2.1
500\tAtaxia and myopathy\t3.0\tNone\t200\tMyopathy\t1.0
";

pub const EXON_TABLE: &str = "\
gene\ttranscript\tcanonical\texon_number\tchrom\tstart\tend
HGNC:1\tNM_000001.2\ttrue\t1\t1\t1000\t1100
HGNC:1\tNM_000001.2\ttrue\t2\t1\t1200\t1300
HGNC:1\tNM_000009.1\tfalse\t1\t1\t1000\t1100
G2\tNM_000002.1\ttrue\t1\t2\t500\t600
";

/// Indications; R27.1 and R266.1 come from the alias table
pub fn test_directory_json(extra_targets: &[&str]) -> String {
    let extra: Vec<String> = extra_targets.iter().map(|t| format!("\"{}\"", t)).collect();
    let ataxia_targets = std::iter::once("\"100\"".to_string())
        .chain(extra)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"{{
    "td_source": "rare-disease-test-directory-v7.xlsx",
    "config_source": null,
    "date": "230401",
    "indications": [
        {{"name": "Ataxia", "code": "R54.4", "gemini_name": "R54.4_Ataxia_P", "test_method": "WGS", "panels": [{}]}},
        {{"name": "Myopathy", "code": "R80.1", "gemini_name": "R80.1_Myopathy_P", "test_method": "WES", "panels": ["200"]}},
        {{"name": "Combined", "code": "R81.2", "gemini_name": "R81.2_Combined_P", "panels": ["500", "HGNC:3", null]}},
        {{"name": "Single gene", "code": "R83.1", "gemini_name": "R83.1_G5_G", "panels": ["HGNC:5"]}}
    ]
}}"#,
        ataxia_targets
    )
}

/// Sources written to disk, plus their parsed form
pub struct Sources {
    pub dir: TempDir,
    pub records: Vec<DumpRecord>,
    pub directory: TestDirectory,
    pub transcripts: MemoryTranscriptSource,
}

impl Sources {
    pub fn new() -> Self {
        Self::with_extra_targets(&[])
    }

    /// Extra targets are appended to R54.4
    pub fn with_extra_targets(extra_targets: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let gms = dir.path().join("gms");
        std::fs::create_dir_all(&gms).expect("Failed to create dump dir");

        write(&gms.join("100_Ataxia.tsv"), ATAXIA_PANEL);
        write(&gms.join("200_Myopathy.tsv"), MYOPATHY_PANEL);
        write(&gms.join("300_Deletions.tsv"), DELETION_PANEL);
        write(&gms.join("484_DDG2P.tsv"), DDG2P_PANEL);
        write(&gms.join("superpanel_500.tsv"), SUPERPANEL);
        write(&dir.path().join("test_directory.json"), &test_directory_json(extra_targets));
        write(&dir.path().join("exons.tsv"), EXON_TABLE);

        let records = read_dump_dir(&gms, PanelType::Gms).expect("Failed to read dumps");
        let directory =
            read_test_directory(dir.path().join("test_directory.json")).expect("Failed to read test directory");
        let transcripts =
            MemoryTranscriptSource::from_exon_table(dir.path().join("exons.tsv")).expect("Failed to read exons");

        Self {
            dir,
            records,
            directory,
            transcripts,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("fixtures")
    }

    pub fn input(&self) -> BuildInput<'_> {
        BuildInput::new(&self.records, &self.directory.indications)
    }

    pub fn build(&self) -> PanelGraph {
        build_graph(self.input(), &self.transcripts, &options()).expect("Failed to build graph")
    }
}

pub fn options() -> BuildOptions {
    BuildOptions::new(CI_VERSION)
}

fn write(path: &Path, content: &str) {
    std::fs::write(path, content).expect("Failed to write source file");
}

/// Route tracing output through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("panel_ingest=debug")
        .with_test_writer()
        .try_init();
}
