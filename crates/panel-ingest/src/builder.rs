//! Panel Graph Builder
//!
//! Turns flat dump records and the test directory into a [`PanelGraph`].
//! The work runs in a declared phase order rather than file order:
//!
//! 1. [`BuildPhase::CatalogPanels`]: panels, genes, transcripts, exons and
//!    their regions
//! 2. [`BuildPhase::SingleGenePanels`]: one synthetic panel per gene target
//!    of the test directory
//! 3. [`BuildPhase::Variants`]: STRs and CNVs, whose gene references need
//!    every gene built
//! 4. [`BuildPhase::Superpanels`]: superpanel rows and copied-forward
//!    subpanel links, which need every subpanel built
//! 5. [`BuildPhase::ClinicalIndications`]: indications linked to panels
//!
//! Reference rows `GRCh37` and `GRCh38` are always surrogate keys 1 and 2.

use crate::aliases::{resolve_indications, AliasTable};
use crate::graph::{
    CnvRow, EntityKind, ExonRow, FeatureTable, GeneRow, IndicationPanelLink, IndicationRow, PanelCnvLink,
    PanelGeneLink, PanelGraph, PanelRow, PanelStrLink, ReferenceRow, RegionCnvLink, RegionKey,
    RegionStrLink, StaleSubpanel, StrRow, SuperpanelLink, TranscriptRow, UnresolvedRef, GRCH37, GRCH38,
};
use crate::identity::{GeneKeyStrategy, Sighting, SurrogateKey};
use crate::records::{
    CnvRecord, DumpRecord, Feature, GeneRecord, Interval, PanelRecord, PanelType, RecordOrigin,
    StrRecord, SuperpanelRecord,
};
use crate::test_directory::{gather_single_genes, IndicationEntry, Target};
use crate::transcripts::TranscriptSource;
use panel_common::version::same_version;
use panel_common::{PanelError, Result};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Suffix of the synthetic single-gene panel key
pub const SINGLE_GENE_SUFFIX: &str = "_SG_panel";

/// Version tag of single-gene panels and their gene links
pub const SINGLE_GENE_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    CatalogPanels,
    SingleGenePanels,
    Variants,
    Superpanels,
    ClinicalIndications,
}

impl BuildPhase {
    pub const ORDER: [BuildPhase; 5] = [
        BuildPhase::CatalogPanels,
        BuildPhase::SingleGenePanels,
        BuildPhase::Variants,
        BuildPhase::Superpanels,
        BuildPhase::ClinicalIndications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPhase::CatalogPanels => "catalog_panels",
            BuildPhase::SingleGenePanels => "single_gene_panels",
            BuildPhase::Variants => "variants",
            BuildPhase::Superpanels => "superpanels",
            BuildPhase::ClinicalIndications => "clinical_indications",
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a reference that does not resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedPolicy {
    /// Abort the build with [`PanelError::UnresolvedReference`]
    #[default]
    Fail,
    /// Record it in [`PanelGraph::unresolved`] and carry on
    Collect,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub gene_key: GeneKeyStrategy,
    /// Reference build of exon regions
    pub exon_reference: String,
    /// Tag stamped on clinical indication links
    pub ci_version: String,
    pub policy: UnresolvedPolicy,
    pub aliases: AliasTable,
}

impl BuildOptions {
    pub fn new(ci_version: impl Into<String>) -> Self {
        Self {
            gene_key: GeneKeyStrategy::default(),
            exon_reference: GRCH37.to_string(),
            ci_version: ci_version.into(),
            policy: UnresolvedPolicy::Fail,
            aliases: AliasTable::standard(),
        }
    }

    pub fn with_gene_key(mut self, gene_key: GeneKeyStrategy) -> Self {
        self.gene_key = gene_key;
        self
    }

    pub fn with_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_exon_reference(mut self, reference: impl Into<String>) -> Self {
        self.exon_reference = reference.into();
        self
    }

    pub fn with_aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }
}

/// Parsed sources of one build
#[derive(Debug, Clone, Copy)]
pub struct BuildInput<'a> {
    pub records: &'a [DumpRecord],
    pub indications: &'a [IndicationEntry],
}

impl<'a> BuildInput<'a> {
    pub fn new(records: &'a [DumpRecord], indications: &'a [IndicationEntry]) -> Self {
        Self {
            records,
            indications,
        }
    }

    fn panel_records(&self) -> impl Iterator<Item = &'a PanelRecord> + 'a {
        let records = self.records;
        records.iter().filter_map(|r| match r {
            DumpRecord::Panel(record) => Some(record),
            DumpRecord::Superpanel(_) => None,
        })
    }

    fn superpanel_records(&self) -> impl Iterator<Item = &'a SuperpanelRecord> + 'a {
        let records = self.records;
        records.iter().filter_map(|r| match r {
            DumpRecord::Superpanel(record) => Some(record),
            DumpRecord::Panel(_) => None,
        })
    }
}

/// Build the normalized graph in one call
pub fn build_graph(
    input: BuildInput<'_>,
    transcripts: &dyn TranscriptSource,
    options: &BuildOptions,
) -> Result<PanelGraph> {
    GraphBuilder::new(transcripts, options).build(input)
}

/// Builder state owned by a single invocation
pub struct GraphBuilder<'a> {
    transcripts: &'a dyn TranscriptSource,
    options: &'a BuildOptions,
    graph: PanelGraph,
    grch37: SurrogateKey,
    grch38: SurrogateKey,
    exon_reference: SurrogateKey,
    /// First gene seen per symbol, for references made by symbol
    gene_symbols: HashMap<String, SurrogateKey>,
    /// Test-directory gene target -> single-gene panel
    single_gene_panels: HashMap<String, SurrogateKey>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(transcripts: &'a dyn TranscriptSource, options: &'a BuildOptions) -> Self {
        let mut graph = PanelGraph::new();
        let mut reference = |name: &str| {
            graph.references.intern_with(name.to_string(), || ReferenceRow {
                name: name.to_string(),
            })
        };
        let grch37 = reference(GRCH37);
        let grch38 = reference(GRCH38);
        let exon_reference = reference(&options.exon_reference);

        Self {
            transcripts,
            options,
            graph,
            grch37,
            grch38,
            exon_reference,
            gene_symbols: HashMap::new(),
            single_gene_panels: HashMap::new(),
        }
    }

    pub fn build(mut self, input: BuildInput<'_>) -> Result<PanelGraph> {
        for phase in BuildPhase::ORDER {
            match phase {
                BuildPhase::CatalogPanels => self.catalog_panels(input)?,
                BuildPhase::SingleGenePanels => self.add_single_gene_panels(input)?,
                BuildPhase::Variants => self.variants(input)?,
                BuildPhase::Superpanels => self.superpanels(input)?,
                BuildPhase::ClinicalIndications => self.clinical_indications(input)?,
            }
            info!(
                phase = %phase,
                panels = self.graph.panels.len(),
                genes = self.graph.genes.len(),
                regions = self.graph.regions.len(),
                strs = self.graph.strs.len(),
                cnvs = self.graph.cnvs.len(),
                indications = self.graph.indications.len(),
                "Build phase complete"
            );
        }

        if !self.graph.unresolved.is_empty() {
            warn!(
                unresolved = self.graph.unresolved.len(),
                "Graph built with unresolved references"
            );
        }
        Ok(self.graph)
    }

    // ========================================================================
    // Phases
    // ========================================================================

    fn catalog_panels(&mut self, input: BuildInput<'_>) -> Result<()> {
        for record in input.panel_records() {
            let header = &record.panel;
            let panel = self.upsert_panel(
                &header.panel_id,
                PanelRow {
                    name: header.name.clone(),
                    version: header.version.clone(),
                    signed_off: header.signed_off.clone(),
                    panel_type: header.panel_type,
                    is_superpanel: false,
                },
            )?;

            if let Feature::Gene(gene) = &record.feature {
                let gene = self.add_gene(gene, &record.origin)?;
                self.graph.panel_genes.push(PanelGeneLink {
                    panel,
                    gene,
                    panel_version: header.version.clone(),
                });
            }
        }
        Ok(())
    }

    fn add_single_gene_panels(&mut self, input: BuildInput<'_>) -> Result<()> {
        for target in gather_single_genes(input.indications) {
            let Some(gene) = self.resolve_gene_target(&target) else {
                debug!(target = %target, "Gene target cannot be keyed, left for indication pass");
                continue;
            };
            let gene_key = self.graph.genes.key_of(gene).cloned().unwrap_or_else(|| target.clone());
            let panel_id = format!("{}{}", gene_key, SINGLE_GENE_SUFFIX);

            let panel = self.upsert_panel(
                &panel_id,
                PanelRow {
                    name: panel_id.clone(),
                    version: SINGLE_GENE_VERSION.to_string(),
                    signed_off: String::new(),
                    panel_type: PanelType::SingleGene,
                    is_superpanel: false,
                },
            )?;
            self.graph.panel_genes.push(PanelGeneLink {
                panel,
                gene,
                panel_version: SINGLE_GENE_VERSION.to_string(),
            });
            self.single_gene_panels.insert(target, panel);
        }
        Ok(())
    }

    fn variants(&mut self, input: BuildInput<'_>) -> Result<()> {
        for record in input.panel_records() {
            let Some(panel) = self.graph.panel_key(&record.panel.panel_id) else {
                continue;
            };
            let panel_version = record.panel.version.clone();

            match &record.feature {
                Feature::Gene(_) => {},
                Feature::Str(str_record) => {
                    let repeat = self.add_str(str_record, &record.panel.name);
                    self.graph.panel_strs.push(PanelStrLink {
                        panel,
                        repeat,
                        panel_version,
                    });
                },
                Feature::Cnv(cnv_record) => {
                    let cnv = self.add_cnv(cnv_record);
                    self.graph.panel_cnvs.push(PanelCnvLink {
                        panel,
                        cnv,
                        panel_version,
                    });
                },
            }
        }
        Ok(())
    }

    fn superpanels(&mut self, input: BuildInput<'_>) -> Result<()> {
        for record in input.superpanel_records() {
            let superpanel = self.upsert_panel(
                &record.panel_id,
                PanelRow {
                    name: record.name.clone(),
                    version: record.version.clone(),
                    signed_off: record.signed_off.clone(),
                    panel_type: record.panel_type,
                    is_superpanel: true,
                },
            )?;

            let Some(subpanel) = self.graph.panel_key(&record.subpanel_id) else {
                self.unresolved(
                    EntityKind::Superpanel,
                    &record.panel_id,
                    "subpanel",
                    &record.subpanel_id,
                )?;
                continue;
            };

            self.check_subpanel_header(record, subpanel);
            self.graph.superpanel_links.push(SuperpanelLink {
                superpanel,
                panel: subpanel,
            });
            self.copy_forward(superpanel, subpanel, &record.version);
        }
        Ok(())
    }

    /// Compare the subpanel name and version a superpanel row carries with
    /// the subpanel's own row; the subpanel's dump wins
    fn check_subpanel_header(&mut self, record: &SuperpanelRecord, subpanel: SurrogateKey) {
        let Some(row) = self.graph.panels.row(subpanel) else {
            return;
        };
        let mut stale = Vec::new();
        if record.subpanel_name != row.name {
            stale.push(("name", record.subpanel_name.clone(), row.name.clone()));
        }
        if !same_version(&record.subpanel_version, &row.version) {
            stale.push(("version", record.subpanel_version.clone(), row.version.clone()));
        }

        for (field, declared, built) in stale {
            warn!(
                superpanel = %record.panel_id,
                subpanel = %record.subpanel_id,
                field,
                declared = %declared,
                built = %built,
                "Superpanel row disagrees with subpanel dump"
            );
            self.graph.stale_subpanels.push(StaleSubpanel {
                superpanel: record.panel_id.clone(),
                subpanel: record.subpanel_id.clone(),
                field,
                declared,
                built,
            });
        }
    }

    fn clinical_indications(&mut self, input: BuildInput<'_>) -> Result<()> {
        let resolved = resolve_indications(input.indications, &self.options.aliases, |target| {
            self.target_panel(target).is_some()
        });
        for indication in resolved {
            let ci = self.graph.indications.insert(
                indication.code.clone(),
                IndicationRow {
                    name: indication.name.clone(),
                    gemini_name: indication.gemini_name.clone(),
                    test_method: indication.test_method.clone(),
                },
            );

            for target in &indication.targets {
                let kind = match target {
                    Target::Panel(_) => "panel",
                    Target::Gene(_) => "gene",
                };
                match self.target_panel(target) {
                    Some(panel) => {
                        self.graph.indication_panels.push(IndicationPanelLink {
                            clinical_indication: ci,
                            panel,
                            ci_version: self.options.ci_version.clone(),
                        });
                    },
                    None => self.unresolved(
                        EntityKind::ClinicalIndication,
                        &indication.code,
                        kind,
                        target.as_str(),
                    )?,
                }
            }
        }
        Ok(())
    }

    fn target_panel(&self, target: &Target) -> Option<SurrogateKey> {
        match target {
            Target::Panel(id) => self.graph.panel_key(id),
            Target::Gene(gene) => self.single_gene_panels.get(gene).copied(),
        }
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Insert a panel, or check a repeated row agrees with the first one
    fn upsert_panel(&mut self, panel_id: &str, row: PanelRow) -> Result<SurrogateKey> {
        let key = panel_id.to_string();
        let pk = match self.graph.panels.sighting(&key) {
            Sighting::Unseen => return Ok(self.graph.panels.insert(key, row)),
            Sighting::Seen(pk) => pk,
        };

        if let Some(existing) = self.graph.panels.row(pk) {
            let checks = [
                ("name", &existing.name, &row.name),
                ("version", &existing.version, &row.version),
                ("signed_off", &existing.signed_off, &row.signed_off),
            ];
            for (field, first, second) in checks {
                if first != second {
                    return Err(PanelError::InconsistentPanel {
                        panel_id: key,
                        field,
                        first: first.clone(),
                        second: second.clone(),
                    });
                }
            }
            if existing.is_superpanel != row.is_superpanel {
                return Err(PanelError::InconsistentPanel {
                    panel_id: key,
                    field: "is_superpanel",
                    first: existing.is_superpanel.to_string(),
                    second: row.is_superpanel.to_string(),
                });
            }
        }
        Ok(pk)
    }

    fn add_gene(&mut self, record: &GeneRecord, origin: &RecordOrigin) -> Result<SurrogateKey> {
        let key = self.options.gene_key.key(record).ok_or_else(|| {
            origin.malformed(format!(
                "gene '{}' has no {}",
                record.symbol, self.options.gene_key
            ))
        })?;
        Ok(match self.graph.genes.sighting(&key) {
            Sighting::Seen(pk) => pk,
            Sighting::Unseen => self.create_gene(key, record),
        })
    }

    /// First sighting of a gene: its row, transcripts, exons and regions
    fn create_gene(&mut self, key: String, record: &GeneRecord) -> SurrogateKey {
        let gene = self.graph.genes.insert(
            key.clone(),
            GeneRow {
                symbol: record.symbol.clone(),
                hgnc_id: record.hgnc_id.clone(),
                clinical_transcript: None,
            },
        );
        self.gene_symbols.entry(record.symbol.clone()).or_insert(gene);

        let Some(found) = self.transcripts.lookup(record) else {
            debug!(gene = %key, "No clinical transcript");
            return gene;
        };

        let mut clinical = None;
        for transcript in &found.transcripts {
            let transcript_key = (transcript.refseq_base.clone(), transcript.version);
            let transcript_pk = match self.graph.transcripts.sighting(&transcript_key) {
                Sighting::Seen(existing) => {
                    warn!(
                        gene = %key,
                        transcript = %transcript.accession(),
                        "Transcript already belongs to another gene, reusing it"
                    );
                    existing
                },
                Sighting::Unseen => {
                    let transcript_pk = self.graph.transcripts.insert(
                        transcript_key,
                        TranscriptRow {
                            refseq_base: transcript.refseq_base.clone(),
                            version: transcript.version,
                            canonical: transcript.canonical,
                            gene,
                        },
                    );
                    for exon in &transcript.exons {
                        let region = self.intern_region(
                            &exon.chrom,
                            Interval {
                                start: exon.start,
                                end: exon.end,
                            },
                            self.exon_reference,
                        );
                        self.graph.exons.insert(
                            (transcript_pk, exon.number),
                            ExonRow {
                                number: exon.number,
                                transcript: transcript_pk,
                                region,
                            },
                        );
                    }
                    transcript_pk
                },
            };
            if transcript.accession() == found.clinical {
                clinical = Some(transcript_pk);
            }
        }

        if let Some(row) = self.graph.genes.row_mut(gene) {
            row.clinical_transcript = clinical;
        }
        gene
    }

    /// Gene of a test-directory target: by key, by symbol, or newly created
    fn resolve_gene_target(&mut self, target: &str) -> Option<SurrogateKey> {
        if let Some(pk) = self.graph.genes.surrogate(&target.to_string()) {
            return Some(pk);
        }
        if let Some(&pk) = self.gene_symbols.get(target) {
            return Some(pk);
        }
        let record = GeneRecord::from_target(target);
        let key = self.options.gene_key.key(&record)?;
        Some(match self.graph.genes.sighting(&key) {
            Sighting::Seen(pk) => pk,
            Sighting::Unseen => self.create_gene(key, &record),
        })
    }

    fn intern_region(&mut self, chrom: &str, interval: Interval, reference: SurrogateKey) -> SurrogateKey {
        let key = RegionKey {
            chrom: chrom.to_string(),
            start: interval.start,
            end: interval.end,
            reference,
        };
        let row = key.to_row();
        self.graph.regions.intern_with(key, || row)
    }

    fn build_regions(&mut self, chrom: &str, grch37: Option<Interval>, grch38: Option<Interval>) -> Vec<SurrogateKey> {
        [(grch37, self.grch37), (grch38, self.grch38)]
            .into_iter()
            .filter_map(|(interval, reference)| interval.map(|iv| (iv, reference)))
            .map(|(interval, reference)| self.intern_region(chrom, interval, reference))
            .collect()
    }

    fn add_str(&mut self, record: &StrRecord, panel_name: &str) -> SurrogateKey {
        if let Sighting::Seen(pk) = self.graph.strs.sighting(&record.name) {
            return pk;
        }

        let gene = self
            .graph
            .genes
            .surrogate(&record.gene)
            .or_else(|| self.gene_symbols.get(&record.gene).copied());
        if gene.is_none() {
            warn!(
                panel = %panel_name,
                str_name = %record.name,
                gene = %record.gene,
                "STR gene is not in the graph, storing without gene"
            );
        }

        let repeat = self.graph.strs.insert(
            record.name.clone(),
            StrRow {
                gene,
                repeated_sequence: record.repeated_sequence.clone(),
                nb_repeats: record.nb_repeats,
                nb_pathogenic_repeats: record.nb_pathogenic_repeats,
            },
        );
        for region in self.build_regions(&record.chrom, record.grch37, record.grch38) {
            self.graph.region_strs.push(RegionStrLink { region, repeat });
        }
        repeat
    }

    fn add_cnv(&mut self, record: &CnvRecord) -> SurrogateKey {
        if let Sighting::Seen(pk) = self.graph.cnvs.sighting(&record.name) {
            return pk;
        }

        let cnv = self.graph.cnvs.insert(
            record.name.clone(),
            CnvRow {
                variant_type: record.variant_type.clone(),
            },
        );
        for region in self.build_regions(&record.chrom, record.grch37, record.grch38) {
            self.graph.region_cnvs.push(RegionCnvLink { region, cnv });
        }
        cnv
    }

    /// Copy a subpanel's current feature links onto its superpanel
    fn copy_forward(&mut self, superpanel: SurrogateKey, subpanel: SurrogateKey, version: &str) {
        let Some(subpanel_id) = self.graph.panels.key_of(subpanel).cloned() else {
            return;
        };
        let current = |table| self.graph.current_feature_keys(&subpanel_id, table);
        let genes: Vec<SurrogateKey> = current(FeatureTable::Gene)
            .iter()
            .filter_map(|key| self.graph.genes.surrogate(key))
            .collect();
        let strs: Vec<SurrogateKey> = current(FeatureTable::Str)
            .iter()
            .filter_map(|key| self.graph.strs.surrogate(key))
            .collect();
        let cnvs: Vec<SurrogateKey> = current(FeatureTable::Cnv)
            .iter()
            .filter_map(|key| self.graph.cnvs.surrogate(key))
            .collect();

        for gene in genes {
            self.graph.panel_genes.push(PanelGeneLink {
                panel: superpanel,
                gene,
                panel_version: version.to_string(),
            });
        }
        for repeat in strs {
            self.graph.panel_strs.push(PanelStrLink {
                panel: superpanel,
                repeat,
                panel_version: version.to_string(),
            });
        }
        for cnv in cnvs {
            self.graph.panel_cnvs.push(PanelCnvLink {
                panel: superpanel,
                cnv,
                panel_version: version.to_string(),
            });
        }
    }

    fn unresolved(&mut self, referrer: EntityKind, key: &str, missing: &str, reference: &str) -> Result<()> {
        match self.options.policy {
            UnresolvedPolicy::Fail => Err(PanelError::UnresolvedReference {
                kind: missing.to_string(),
                key: reference.to_string(),
                referenced_by: format!("{} {}", referrer, key),
            }),
            UnresolvedPolicy::Collect => {
                warn!(
                    referrer = %referrer,
                    key = %key,
                    missing = %missing,
                    reference = %reference,
                    "Unresolved reference"
                );
                self.graph.unresolved.push(UnresolvedRef {
                    kind: referrer,
                    key: key.to_string(),
                    reference: reference.to_string(),
                });
                Ok(())
            },
        }
    }
}
