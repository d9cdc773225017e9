// PostgreSQL panel store
//
// One `= ANY($1)` query per call. Table layout: migrations/0001_panel_schema.sql

use super::{
    PanelStore, StoredCnv, StoredExon, StoredGene, StoredIndication, StoredIndicationLink, StoredPanel,
    StoredPanelLink, StoredReference, StoredRegion, StoredStr, StoredSubpanel, StoredTranscript,
    StoredVariantRegion,
};
use crate::identity::GeneKeyStrategy;
use async_trait::async_trait;
use panel_common::{PanelError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

type RegionColumns = (i64, String, i64, i64, String);

pub struct PgPanelStore {
    pool: PgPool,
    gene_key: GeneKeyStrategy,
}

impl PgPanelStore {
    pub fn new(pool: PgPool, gene_key: GeneKeyStrategy) -> Self {
        Self { pool, gene_key }
    }

    /// Open a connection pool
    pub async fn connect(
        url: &str,
        max_connections: u32,
        connect_timeout: Duration,
        gene_key: GeneKeyStrategy,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await
            .map_err(PanelError::store)?;
        info!(max_connections, gene_key = %gene_key, "Connected to panel store");
        Ok(Self::new(pool, gene_key))
    }

    fn gene_key_column(&self) -> &'static str {
        match self.gene_key {
            GeneKeyStrategy::HgncId => "COALESCE(g.hgnc_id, g.symbol)",
            GeneKeyStrategy::Symbol => "g.symbol",
        }
    }

    async fn feature_links(&self, sql: &str, panel_ids: &[i64]) -> Result<Vec<StoredPanelLink>> {
        sqlx::query_as::<_, StoredPanelLink>(sql)
            .bind(panel_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(PanelError::store)
    }

    async fn variant_regions(&self, sql: &str, owner_ids: &[i64]) -> Result<Vec<StoredVariantRegion>> {
        let rows = sqlx::query_as::<_, RegionColumns>(sql)
            .bind(owner_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(PanelError::store)?;
        Ok(rows
            .into_iter()
            .map(|(owner_id, chrom, start, end, reference)| StoredVariantRegion {
                owner_id,
                region: StoredRegion {
                    chrom,
                    start,
                    end,
                    reference,
                },
            })
            .collect())
    }
}

#[async_trait]
impl PanelStore for PgPanelStore {
    async fn reference_builds(&self) -> Result<Vec<StoredReference>> {
        sqlx::query_as::<_, StoredReference>("SELECT id, name FROM reference ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(PanelError::store)
    }

    async fn panel_external_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>("SELECT panelapp_id FROM panel ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(PanelError::store)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn panels_by_external_id(&self, external_ids: &[String]) -> Result<Vec<StoredPanel>> {
        sqlx::query_as::<_, StoredPanel>(
            r#"
            SELECT id, panelapp_id AS external_id, name, version,
                   signedoff AS signed_off, panel_type, is_superpanel
            FROM panel
            WHERE panelapp_id = ANY($1)
            "#,
        )
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(PanelError::store)
    }

    async fn subpanel_links(&self, superpanel_ids: &[i64]) -> Result<Vec<StoredSubpanel>> {
        sqlx::query_as::<_, StoredSubpanel>(
            r#"
            SELECT s.superpanel_id, s.panel_id, p.panelapp_id AS external_id, p.name
            FROM superpanel s
            JOIN panel p ON p.id = s.panel_id
            WHERE s.superpanel_id = ANY($1)
            "#,
        )
        .bind(superpanel_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(PanelError::store)
    }

    async fn panel_gene_links(&self, panel_ids: &[i64]) -> Result<Vec<StoredPanelLink>> {
        let sql = format!(
            r#"
            SELECT pg.panel_id, {} AS feature_key, pg.panel_version
            FROM panel_gene pg
            JOIN gene g ON g.id = pg.gene_id
            WHERE pg.panel_id = ANY($1)
            "#,
            self.gene_key_column()
        );
        self.feature_links(&sql, panel_ids).await
    }

    async fn panel_str_links(&self, panel_ids: &[i64]) -> Result<Vec<StoredPanelLink>> {
        self.feature_links(
            r#"
            SELECT ps.panel_id, s.name AS feature_key, ps.panel_version
            FROM panel_str ps
            JOIN str s ON s.id = ps.str_id
            WHERE ps.panel_id = ANY($1)
            "#,
            panel_ids,
        )
        .await
    }

    async fn panel_cnv_links(&self, panel_ids: &[i64]) -> Result<Vec<StoredPanelLink>> {
        self.feature_links(
            r#"
            SELECT pc.panel_id, c.name AS feature_key, pc.panel_version
            FROM panel_cnv pc
            JOIN cnv c ON c.id = pc.cnv_id
            WHERE pc.panel_id = ANY($1)
            "#,
            panel_ids,
        )
        .await
    }

    async fn genes_by_key(&self, keys: &[String]) -> Result<Vec<StoredGene>> {
        let key = self.gene_key_column();
        let sql = format!(
            r#"
            SELECT g.id, {key} AS key, g.symbol, g.hgnc_id,
                   t.refseq || '.' || t.version AS clinical_transcript
            FROM gene g
            LEFT JOIN transcript t ON t.id = g.clinical_transcript_id
            WHERE {key} = ANY($1)
            "#
        );
        sqlx::query_as::<_, StoredGene>(&sql)
            .bind(keys)
            .fetch_all(&self.pool)
            .await
            .map_err(PanelError::store)
    }

    async fn transcripts_for_genes(&self, gene_ids: &[i64]) -> Result<Vec<StoredTranscript>> {
        sqlx::query_as::<_, StoredTranscript>(
            r#"
            SELECT id, gene_id, refseq AS refseq_base, version, canonical
            FROM transcript
            WHERE gene_id = ANY($1)
            "#,
        )
        .bind(gene_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(PanelError::store)
    }

    async fn exons_for_transcripts(&self, transcript_ids: &[i64]) -> Result<Vec<StoredExon>> {
        let rows = sqlx::query_as::<_, (i64, i32, String, i64, i64, String)>(
            r#"
            SELECT e.transcript_id, e.number, r.chrom, r.start, r."end", rb.name
            FROM exon e
            JOIN region r ON r.id = e.region_id
            JOIN reference rb ON rb.id = r.reference_id
            WHERE e.transcript_id = ANY($1)
            "#,
        )
        .bind(transcript_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(PanelError::store)?;

        Ok(rows
            .into_iter()
            .map(|(transcript_id, number, chrom, start, end, reference)| StoredExon {
                transcript_id,
                number,
                region: StoredRegion {
                    chrom,
                    start,
                    end,
                    reference,
                },
            })
            .collect())
    }

    async fn strs_by_name(&self, names: &[String]) -> Result<Vec<StoredStr>> {
        let sql = format!(
            r#"
            SELECT s.id, s.name, {} AS gene_key, s.repeated_sequence,
                   s.nb_repeats, s.nb_pathogenic_repeats
            FROM str s
            LEFT JOIN gene g ON g.id = s.gene_id
            WHERE s.name = ANY($1)
            "#,
            self.gene_key_column()
        );
        sqlx::query_as::<_, StoredStr>(&sql)
            .bind(names)
            .fetch_all(&self.pool)
            .await
            .map_err(PanelError::store)
    }

    async fn cnvs_by_name(&self, names: &[String]) -> Result<Vec<StoredCnv>> {
        sqlx::query_as::<_, StoredCnv>("SELECT id, name, variant_type FROM cnv WHERE name = ANY($1)")
            .bind(names)
            .fetch_all(&self.pool)
            .await
            .map_err(PanelError::store)
    }

    async fn str_regions(&self, str_ids: &[i64]) -> Result<Vec<StoredVariantRegion>> {
        self.variant_regions(
            r#"
            SELECT rs.str_id, r.chrom, r.start, r."end", rb.name
            FROM region_str rs
            JOIN region r ON r.id = rs.region_id
            JOIN reference rb ON rb.id = r.reference_id
            WHERE rs.str_id = ANY($1)
            "#,
            str_ids,
        )
        .await
    }

    async fn cnv_regions(&self, cnv_ids: &[i64]) -> Result<Vec<StoredVariantRegion>> {
        self.variant_regions(
            r#"
            SELECT rc.cnv_id, r.chrom, r.start, r."end", rb.name
            FROM region_cnv rc
            JOIN region r ON r.id = rc.region_id
            JOIN reference rb ON rb.id = r.reference_id
            WHERE rc.cnv_id = ANY($1)
            "#,
            cnv_ids,
        )
        .await
    }

    async fn indication_codes(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>("SELECT code FROM clinical_indication ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(PanelError::store)?;
        Ok(rows.into_iter().map(|(code,)| code).collect())
    }

    async fn indications_by_code(&self, codes: &[String]) -> Result<Vec<StoredIndication>> {
        sqlx::query_as::<_, StoredIndication>(
            r#"
            SELECT id, code, name, gemini_name, test_method
            FROM clinical_indication
            WHERE code = ANY($1)
            "#,
        )
        .bind(codes)
        .fetch_all(&self.pool)
        .await
        .map_err(PanelError::store)
    }

    async fn indication_panel_links(&self, indication_ids: &[i64]) -> Result<Vec<StoredIndicationLink>> {
        sqlx::query_as::<_, StoredIndicationLink>(
            r#"
            SELECT cip.clinical_indication_id AS indication_id,
                   p.panelapp_id AS panel_external_id, cip.ci_version
            FROM clinical_indication_panels cip
            JOIN panel p ON p.id = cip.panel_id
            WHERE cip.clinical_indication_id = ANY($1)
            "#,
        )
        .bind(indication_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(PanelError::store)
    }
}
