//! Read-only access to a loaded panel store
//!
//! Every method takes a batch of natural keys or parent surrogate keys and
//! returns all matching rows in a single call, so a reconciliation run
//! issues a bounded number of queries whatever the catalog size.
//!
//! Surrogate ids are the store's own; they are only meaningful for follow-up
//! calls on the same store.

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgPanelStore;

use async_trait::async_trait;
use panel_common::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct StoredReference {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct StoredPanel {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub version: String,
    pub signed_off: String,
    pub panel_type: String,
    pub is_superpanel: bool,
}

/// A subpanel of a superpanel
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct StoredSubpanel {
    pub superpanel_id: i64,
    pub panel_id: i64,
    pub external_id: String,
    pub name: String,
}

/// A panel's link to a gene, STR or CNV, named by the feature's natural key
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct StoredPanelLink {
    pub panel_id: i64,
    pub feature_key: String,
    pub panel_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct StoredGene {
    pub id: i64,
    /// Natural key under the store's gene key strategy
    pub key: String,
    pub symbol: String,
    pub hgnc_id: Option<String>,
    /// `refseq.version` of the clinical transcript
    pub clinical_transcript: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct StoredTranscript {
    pub id: i64,
    pub gene_id: i64,
    pub refseq_base: String,
    pub version: i32,
    pub canonical: bool,
}

impl StoredTranscript {
    pub fn accession(&self) -> String {
        format!("{}.{}", self.refseq_base, self.version)
    }
}

/// Genomic coordinates with their reference build name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoredRegion {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    pub reference: String,
}

impl std::fmt::Display for StoredRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}-{} ({})", self.chrom, self.start, self.end, self.reference)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredExon {
    pub transcript_id: i64,
    pub number: i32,
    pub region: StoredRegion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct StoredStr {
    pub id: i64,
    pub name: String,
    /// Natural key of the linked gene
    pub gene_key: Option<String>,
    pub repeated_sequence: String,
    pub nb_repeats: i32,
    pub nb_pathogenic_repeats: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct StoredCnv {
    pub id: i64,
    pub name: String,
    pub variant_type: String,
}

/// A region attached to an STR or CNV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVariantRegion {
    pub owner_id: i64,
    pub region: StoredRegion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct StoredIndication {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub gemini_name: String,
    pub test_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct StoredIndicationLink {
    pub indication_id: i64,
    pub panel_external_id: String,
    pub ci_version: String,
}

/// Batched read access to the panel tables
#[async_trait]
pub trait PanelStore: Send + Sync {
    async fn reference_builds(&self) -> Result<Vec<StoredReference>>;

    /// External ids of every stored panel
    async fn panel_external_ids(&self) -> Result<Vec<String>>;

    async fn panels_by_external_id(&self, external_ids: &[String]) -> Result<Vec<StoredPanel>>;

    async fn subpanel_links(&self, superpanel_ids: &[i64]) -> Result<Vec<StoredSubpanel>>;

    async fn panel_gene_links(&self, panel_ids: &[i64]) -> Result<Vec<StoredPanelLink>>;

    async fn panel_str_links(&self, panel_ids: &[i64]) -> Result<Vec<StoredPanelLink>>;

    async fn panel_cnv_links(&self, panel_ids: &[i64]) -> Result<Vec<StoredPanelLink>>;

    async fn genes_by_key(&self, keys: &[String]) -> Result<Vec<StoredGene>>;

    async fn transcripts_for_genes(&self, gene_ids: &[i64]) -> Result<Vec<StoredTranscript>>;

    async fn exons_for_transcripts(&self, transcript_ids: &[i64]) -> Result<Vec<StoredExon>>;

    async fn strs_by_name(&self, names: &[String]) -> Result<Vec<StoredStr>>;

    async fn cnvs_by_name(&self, names: &[String]) -> Result<Vec<StoredCnv>>;

    async fn str_regions(&self, str_ids: &[i64]) -> Result<Vec<StoredVariantRegion>>;

    async fn cnv_regions(&self, cnv_ids: &[i64]) -> Result<Vec<StoredVariantRegion>>;

    /// Codes of every stored clinical indication
    async fn indication_codes(&self) -> Result<Vec<String>>;

    async fn indications_by_code(&self, codes: &[String]) -> Result<Vec<StoredIndication>>;

    async fn indication_panel_links(&self, indication_ids: &[i64]) -> Result<Vec<StoredIndicationLink>>;
}
