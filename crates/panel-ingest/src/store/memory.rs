// In-memory panel store
//
// Holds exactly what loading a fixture dump would put in the relational
// store. Tests use the mutation helpers to simulate drift between a dump
// and the store.

use super::{
    PanelStore, StoredCnv, StoredExon, StoredGene, StoredIndication, StoredIndicationLink, StoredPanel,
    StoredPanelLink, StoredReference, StoredRegion, StoredStr, StoredSubpanel, StoredTranscript,
    StoredVariantRegion,
};
use crate::fixtures::{fixture_records, FixtureRecord};
use crate::graph::PanelGraph;
use crate::identity::GeneKeyStrategy;
use crate::records::GeneRecord;
use async_trait::async_trait;
use panel_common::{PanelError, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
struct GeneEntry {
    symbol: String,
    hgnc_id: Option<String>,
    key: String,
    clinical_transcript: Option<i64>,
}

#[derive(Debug, Clone)]
struct ExonEntry {
    transcript_id: i64,
    number: i32,
    region_id: i64,
}

#[derive(Debug, Clone)]
struct StrEntry {
    name: String,
    gene_id: Option<i64>,
    repeated_sequence: String,
    nb_repeats: i32,
    nb_pathogenic_repeats: i32,
}

#[derive(Debug, Clone)]
struct RegionEntry {
    chrom: String,
    start: i64,
    end: i64,
    reference_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkEntry {
    panel_id: i64,
    feature_id: i64,
    panel_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IndicationLinkEntry {
    indication_id: i64,
    panel_id: i64,
    ci_version: String,
}

/// Panel store held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    references: BTreeMap<i64, String>,
    panels: BTreeMap<i64, StoredPanel>,
    superpanels: Vec<(i64, i64)>,
    genes: BTreeMap<i64, GeneEntry>,
    transcripts: BTreeMap<i64, StoredTranscript>,
    regions: BTreeMap<i64, RegionEntry>,
    exons: Vec<ExonEntry>,
    strs: BTreeMap<i64, StrEntry>,
    cnvs: BTreeMap<i64, StoredCnv>,
    region_strs: Vec<(i64, i64)>,
    region_cnvs: Vec<(i64, i64)>,
    panel_genes: Vec<LinkEntry>,
    panel_strs: Vec<LinkEntry>,
    panel_cnvs: Vec<LinkEntry>,
    indications: BTreeMap<i64, StoredIndication>,
    indication_panels: Vec<IndicationLinkEntry>,
}

impl MemoryStore {
    /// Store contents after a successful import of `graph`
    pub fn from_graph(graph: &PanelGraph, gene_key: GeneKeyStrategy) -> Result<Self> {
        Self::from_fixture_records(&fixture_records(graph), gene_key)
    }

    /// Store contents after importing a fixture dump
    pub fn from_fixture_records(records: &[FixtureRecord], gene_key: GeneKeyStrategy) -> Result<Self> {
        let mut store = Self::default();
        for (index, record) in records.iter().enumerate() {
            let fields = Fields {
                record,
                line: index as u64 + 1,
            };
            let pk = i64::try_from(record.pk).map_err(|_| fields.error("pk out of range"))?;
            store.load(pk, record.model_name(), &fields, gene_key)?;
        }
        debug!(
            panels = store.panels.len(),
            genes = store.genes.len(),
            indications = store.indications.len(),
            "Loaded memory store"
        );
        Ok(store)
    }

    fn load(&mut self, pk: i64, model: &str, fields: &Fields<'_>, gene_key: GeneKeyStrategy) -> Result<()> {
        match model {
            "Reference" => {
                self.references.insert(pk, fields.text("name")?);
            },
            "Panel" => {
                self.panels.insert(
                    pk,
                    StoredPanel {
                        id: pk,
                        external_id: fields.text("panelapp_id")?,
                        name: fields.text("name")?,
                        version: fields.text("version")?,
                        signed_off: fields.text("signedoff")?,
                        panel_type: fields.text("panel_type")?,
                        is_superpanel: fields.flag("is_superpanel")?,
                    },
                );
            },
            "Superpanel" => self
                .superpanels
                .push((fields.int("superpanel")?, fields.int("panel")?)),
            "Gene" => {
                let symbol = fields.text("symbol")?;
                let hgnc_id = fields.optional_text("hgnc_id")?;
                let key = gene_key
                    .key(&GeneRecord::new(symbol.clone(), hgnc_id.clone()))
                    .unwrap_or_else(|| symbol.clone());
                self.genes.insert(
                    pk,
                    GeneEntry {
                        symbol,
                        hgnc_id,
                        key,
                        clinical_transcript: fields.optional_int("clinical_transcript")?,
                    },
                );
            },
            "Transcript" => {
                self.transcripts.insert(
                    pk,
                    StoredTranscript {
                        id: pk,
                        gene_id: fields.int("gene")?,
                        refseq_base: fields.text("refseq")?,
                        version: fields.small_int("version")?,
                        canonical: fields.flag("canonical")?,
                    },
                );
            },
            "Region" => {
                self.regions.insert(
                    pk,
                    RegionEntry {
                        chrom: fields.text("chrom")?,
                        start: fields.int("start")?,
                        end: fields.int("end")?,
                        reference_id: fields.int("reference")?,
                    },
                );
            },
            "Exon" => self.exons.push(ExonEntry {
                transcript_id: fields.int("transcript")?,
                number: fields.small_int("number")?,
                region_id: fields.int("region")?,
            }),
            "Str" => {
                self.strs.insert(
                    pk,
                    StrEntry {
                        name: fields.text("name")?,
                        gene_id: fields.optional_int("gene")?,
                        repeated_sequence: fields.text("repeated_sequence")?,
                        nb_repeats: fields.small_int("nb_repeats")?,
                        nb_pathogenic_repeats: fields.small_int("nb_pathogenic_repeats")?,
                    },
                );
            },
            "RegionStr" => self.region_strs.push((fields.int("region")?, fields.int("str")?)),
            "PanelStr" => self.panel_strs.push(fields.panel_link("str")?),
            "Cnv" => {
                self.cnvs.insert(
                    pk,
                    StoredCnv {
                        id: pk,
                        name: fields.text("name")?,
                        variant_type: fields.text("variant_type")?,
                    },
                );
            },
            "RegionCnv" => self.region_cnvs.push((fields.int("region")?, fields.int("cnv")?)),
            "PanelCnv" => self.panel_cnvs.push(fields.panel_link("cnv")?),
            "PanelGene" => self.panel_genes.push(fields.panel_link("gene")?),
            "ClinicalIndication" => {
                self.indications.insert(
                    pk,
                    StoredIndication {
                        id: pk,
                        code: fields.text("code")?,
                        name: fields.text("name")?,
                        gemini_name: fields.text("gemini_name")?,
                        test_method: fields.optional_text("test_method")?,
                    },
                );
            },
            "ClinicalIndicationPanels" => self.indication_panels.push(IndicationLinkEntry {
                indication_id: fields.int("clinical_indication")?,
                panel_id: fields.int("panel")?,
                ci_version: fields.text("ci_version")?,
            }),
            other => return Err(fields.error(format!("unknown model '{}'", other))),
        }
        Ok(())
    }

    // ========================================================================
    // Drift helpers
    // ========================================================================

    fn panel_id(&self, external_id: &str) -> Option<i64> {
        self.panels
            .values()
            .find(|p| p.external_id == external_id)
            .map(|p| p.id)
    }

    fn gene_id(&self, key: &str) -> Option<i64> {
        self.genes
            .iter()
            .find(|(_, gene)| gene.key == key)
            .map(|(&id, _)| id)
    }

    /// Remove a panel and every link to it
    pub fn delete_panel(&mut self, external_id: &str) -> bool {
        let Some(id) = self.panel_id(external_id) else {
            return false;
        };
        self.panels.remove(&id);
        self.superpanels.retain(|&(sp, p)| sp != id && p != id);
        for links in [&mut self.panel_genes, &mut self.panel_strs, &mut self.panel_cnvs] {
            links.retain(|link| link.panel_id != id);
        }
        self.indication_panels.retain(|link| link.panel_id != id);
        true
    }

    /// Remove every link between a panel and a gene; returns the number removed
    pub fn unlink_gene(&mut self, panel_external_id: &str, gene_key: &str) -> usize {
        let (Some(panel), Some(gene)) = (self.panel_id(panel_external_id), self.gene_id(gene_key)) else {
            return 0;
        };
        let before = self.panel_genes.len();
        self.panel_genes
            .retain(|link| !(link.panel_id == panel && link.feature_id == gene));
        before - self.panel_genes.len()
    }

    pub fn set_panel_version(&mut self, external_id: &str, version: &str) -> bool {
        let Some(id) = self.panel_id(external_id) else {
            return false;
        };
        self.panels
            .get_mut(&id)
            .map(|panel| panel.version = version.to_string())
            .is_some()
    }

    pub fn set_panel_name(&mut self, external_id: &str, name: &str) -> bool {
        let Some(id) = self.panel_id(external_id) else {
            return false;
        };
        self.panels
            .get_mut(&id)
            .map(|panel| panel.name = name.to_string())
            .is_some()
    }

    pub fn clear_clinical_transcript(&mut self, gene_key: &str) -> bool {
        let Some(id) = self.gene_id(gene_key) else {
            return false;
        };
        self.genes
            .get_mut(&id)
            .map(|gene| gene.clinical_transcript = None)
            .is_some()
    }

    /// Point one exon at new coordinates on its current reference build
    pub fn move_exon(&mut self, accession: &str, number: i32, start: i64, end: i64) -> bool {
        let Some(transcript_id) = self
            .transcripts
            .values()
            .find(|t| t.accession() == accession)
            .map(|t| t.id)
        else {
            return false;
        };
        let Some(exon) = self
            .exons
            .iter_mut()
            .find(|e| e.transcript_id == transcript_id && e.number == number)
        else {
            return false;
        };
        let Some(region) = self.regions.get(&exon.region_id).cloned() else {
            return false;
        };

        // Exon regions may be shared, so the moved exon gets its own row
        let new_id = self.regions.keys().next_back().copied().unwrap_or(0) + 1;
        self.regions.insert(new_id, RegionEntry { start, end, ..region });
        exon.region_id = new_id;
        true
    }

    pub fn unlink_indication_panel(&mut self, code: &str, panel_external_id: &str) -> usize {
        let Some(panel) = self.panel_id(panel_external_id) else {
            return 0;
        };
        let Some(indication) = self.indications.values().find(|i| i.code == code).map(|i| i.id) else {
            return 0;
        };
        let before = self.indication_panels.len();
        self.indication_panels
            .retain(|link| !(link.indication_id == indication && link.panel_id == panel));
        before - self.indication_panels.len()
    }

    /// Change the external id of a panel, keeping its links
    pub fn rename_panel(&mut self, external_id: &str, new_external_id: &str) -> bool {
        let Some(id) = self.panel_id(external_id) else {
            return false;
        };
        self.panels
            .get_mut(&id)
            .map(|panel| panel.external_id = new_external_id.to_string())
            .is_some()
    }

    pub fn unlink_subpanel(&mut self, superpanel_external_id: &str, panel_external_id: &str) -> bool {
        let (Some(superpanel), Some(panel)) =
            (self.panel_id(superpanel_external_id), self.panel_id(panel_external_id))
        else {
            return false;
        };
        let before = self.superpanels.len();
        self.superpanels.retain(|&link| link != (superpanel, panel));
        before != self.superpanels.len()
    }

    pub fn link_subpanel(&mut self, superpanel_external_id: &str, panel_external_id: &str) -> bool {
        let (Some(superpanel), Some(panel)) =
            (self.panel_id(superpanel_external_id), self.panel_id(panel_external_id))
        else {
            return false;
        };
        self.superpanels.push((superpanel, panel));
        true
    }

    /// Link a gene to a panel at the panel's stored version
    pub fn link_gene(&mut self, panel_external_id: &str, gene_key: &str) -> bool {
        let (Some(panel), Some(gene)) = (self.panel_id(panel_external_id), self.gene_id(gene_key)) else {
            return false;
        };
        let Some(version) = self.panels.get(&panel).map(|p| p.version.clone()) else {
            return false;
        };
        self.panel_genes.push(LinkEntry {
            panel_id: panel,
            feature_id: gene,
            panel_version: version,
        });
        true
    }

    pub fn set_str_repeats(&mut self, name: &str, nb_repeats: i32) -> bool {
        self.strs
            .values_mut()
            .find(|s| s.name == name)
            .map(|s| s.nb_repeats = nb_repeats)
            .is_some()
    }

    pub fn clear_str_gene(&mut self, name: &str) -> bool {
        self.strs
            .values_mut()
            .find(|s| s.name == name)
            .map(|s| s.gene_id = None)
            .is_some()
    }

    pub fn set_cnv_type(&mut self, name: &str, variant_type: &str) -> bool {
        self.cnvs
            .values_mut()
            .find(|c| c.name == name)
            .map(|c| c.variant_type = variant_type.to_string())
            .is_some()
    }

    /// Point the region of an STR or CNV on one build at new coordinates
    pub fn move_variant_region(&mut self, name: &str, reference: &str, start: i64, end: i64) -> bool {
        let Some(reference_id) = self
            .references
            .iter()
            .find(|(_, build)| build.as_str() == reference)
            .map(|(&id, _)| id)
        else {
            return false;
        };
        let str_id = self.strs.iter().find(|(_, s)| s.name == name).map(|(&id, _)| id);
        let cnv_id = self.cnvs.iter().find(|(_, c)| c.name == name).map(|(&id, _)| id);
        let (links, owner) = match (str_id, cnv_id) {
            (Some(id), _) => (&mut self.region_strs, id),
            (None, Some(id)) => (&mut self.region_cnvs, id),
            (None, None) => return false,
        };

        let regions = &mut self.regions;
        let Some(link) = links.iter_mut().find(|(region, linked)| {
            *linked == owner && regions.get(region).is_some_and(|r| r.reference_id == reference_id)
        }) else {
            return false;
        };
        let Some(region) = regions.get(&link.0).cloned() else {
            return false;
        };

        // Variant regions may be shared, so the moved one gets its own row
        let new_id = regions.keys().next_back().copied().unwrap_or(0) + 1;
        regions.insert(new_id, RegionEntry { start, end, ..region });
        link.0 = new_id;
        true
    }

    // ========================================================================
    // Row assembly
    // ========================================================================

    fn region(&self, region_id: i64) -> Option<StoredRegion> {
        let region = self.regions.get(&region_id)?;
        Some(StoredRegion {
            chrom: region.chrom.clone(),
            start: region.start,
            end: region.end,
            reference: self.references.get(&region.reference_id)?.clone(),
        })
    }

    fn links(
        &self,
        links: &[LinkEntry],
        panel_ids: &[i64],
        feature_key: impl Fn(i64) -> Option<String>,
    ) -> Vec<StoredPanelLink> {
        let wanted: HashSet<i64> = panel_ids.iter().copied().collect();
        links
            .iter()
            .filter(|link| wanted.contains(&link.panel_id))
            .filter_map(|link| {
                Some(StoredPanelLink {
                    panel_id: link.panel_id,
                    feature_key: feature_key(link.feature_id)?,
                    panel_version: link.panel_version.clone(),
                })
            })
            .collect()
    }

    fn variant_regions(&self, links: &[(i64, i64)], owner_ids: &[i64]) -> Vec<StoredVariantRegion> {
        let wanted: HashSet<i64> = owner_ids.iter().copied().collect();
        links
            .iter()
            .filter(|(_, owner)| wanted.contains(owner))
            .filter_map(|&(region, owner)| {
                Some(StoredVariantRegion {
                    owner_id: owner,
                    region: self.region(region)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl PanelStore for MemoryStore {
    async fn reference_builds(&self) -> Result<Vec<StoredReference>> {
        Ok(self
            .references
            .iter()
            .map(|(&id, name)| StoredReference { id, name: name.clone() })
            .collect())
    }

    async fn panel_external_ids(&self) -> Result<Vec<String>> {
        Ok(self.panels.values().map(|p| p.external_id.clone()).collect())
    }

    async fn panels_by_external_id(&self, external_ids: &[String]) -> Result<Vec<StoredPanel>> {
        let wanted: HashSet<&str> = external_ids.iter().map(String::as_str).collect();
        Ok(self
            .panels
            .values()
            .filter(|p| wanted.contains(p.external_id.as_str()))
            .cloned()
            .collect())
    }

    async fn subpanel_links(&self, superpanel_ids: &[i64]) -> Result<Vec<StoredSubpanel>> {
        let wanted: HashSet<i64> = superpanel_ids.iter().copied().collect();
        Ok(self
            .superpanels
            .iter()
            .filter(|(superpanel, _)| wanted.contains(superpanel))
            .filter_map(|&(superpanel_id, panel_id)| {
                let panel = self.panels.get(&panel_id)?;
                Some(StoredSubpanel {
                    superpanel_id,
                    panel_id,
                    external_id: panel.external_id.clone(),
                    name: panel.name.clone(),
                })
            })
            .collect())
    }

    async fn panel_gene_links(&self, panel_ids: &[i64]) -> Result<Vec<StoredPanelLink>> {
        Ok(self.links(&self.panel_genes, panel_ids, |id| {
            self.genes.get(&id).map(|g| g.key.clone())
        }))
    }

    async fn panel_str_links(&self, panel_ids: &[i64]) -> Result<Vec<StoredPanelLink>> {
        Ok(self.links(&self.panel_strs, panel_ids, |id| {
            self.strs.get(&id).map(|s| s.name.clone())
        }))
    }

    async fn panel_cnv_links(&self, panel_ids: &[i64]) -> Result<Vec<StoredPanelLink>> {
        Ok(self.links(&self.panel_cnvs, panel_ids, |id| {
            self.cnvs.get(&id).map(|c| c.name.clone())
        }))
    }

    async fn genes_by_key(&self, keys: &[String]) -> Result<Vec<StoredGene>> {
        let wanted: HashSet<&str> = keys.iter().map(String::as_str).collect();
        Ok(self
            .genes
            .iter()
            .filter(|(_, gene)| wanted.contains(gene.key.as_str()))
            .map(|(&id, gene)| StoredGene {
                id,
                key: gene.key.clone(),
                symbol: gene.symbol.clone(),
                hgnc_id: gene.hgnc_id.clone(),
                clinical_transcript: gene
                    .clinical_transcript
                    .and_then(|t| self.transcripts.get(&t))
                    .map(StoredTranscript::accession),
            })
            .collect())
    }

    async fn transcripts_for_genes(&self, gene_ids: &[i64]) -> Result<Vec<StoredTranscript>> {
        let wanted: HashSet<i64> = gene_ids.iter().copied().collect();
        Ok(self
            .transcripts
            .values()
            .filter(|t| wanted.contains(&t.gene_id))
            .cloned()
            .collect())
    }

    async fn exons_for_transcripts(&self, transcript_ids: &[i64]) -> Result<Vec<StoredExon>> {
        let wanted: HashSet<i64> = transcript_ids.iter().copied().collect();
        Ok(self
            .exons
            .iter()
            .filter(|e| wanted.contains(&e.transcript_id))
            .filter_map(|e| {
                Some(StoredExon {
                    transcript_id: e.transcript_id,
                    number: e.number,
                    region: self.region(e.region_id)?,
                })
            })
            .collect())
    }

    async fn strs_by_name(&self, names: &[String]) -> Result<Vec<StoredStr>> {
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        Ok(self
            .strs
            .iter()
            .filter(|(_, s)| wanted.contains(s.name.as_str()))
            .map(|(&id, s)| StoredStr {
                id,
                name: s.name.clone(),
                gene_key: s
                    .gene_id
                    .and_then(|g| self.genes.get(&g))
                    .map(|g| g.key.clone()),
                repeated_sequence: s.repeated_sequence.clone(),
                nb_repeats: s.nb_repeats,
                nb_pathogenic_repeats: s.nb_pathogenic_repeats,
            })
            .collect())
    }

    async fn cnvs_by_name(&self, names: &[String]) -> Result<Vec<StoredCnv>> {
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        Ok(self
            .cnvs
            .values()
            .filter(|c| wanted.contains(c.name.as_str()))
            .cloned()
            .collect())
    }

    async fn str_regions(&self, str_ids: &[i64]) -> Result<Vec<StoredVariantRegion>> {
        Ok(self.variant_regions(&self.region_strs, str_ids))
    }

    async fn cnv_regions(&self, cnv_ids: &[i64]) -> Result<Vec<StoredVariantRegion>> {
        Ok(self.variant_regions(&self.region_cnvs, cnv_ids))
    }

    async fn indication_codes(&self) -> Result<Vec<String>> {
        Ok(self.indications.values().map(|i| i.code.clone()).collect())
    }

    async fn indications_by_code(&self, codes: &[String]) -> Result<Vec<StoredIndication>> {
        let wanted: HashSet<&str> = codes.iter().map(String::as_str).collect();
        Ok(self
            .indications
            .values()
            .filter(|i| wanted.contains(i.code.as_str()))
            .cloned()
            .collect())
    }

    async fn indication_panel_links(&self, indication_ids: &[i64]) -> Result<Vec<StoredIndicationLink>> {
        let wanted: HashSet<i64> = indication_ids.iter().copied().collect();
        Ok(self
            .indication_panels
            .iter()
            .filter(|link| wanted.contains(&link.indication_id))
            .filter_map(|link| {
                Some(StoredIndicationLink {
                    indication_id: link.indication_id,
                    panel_external_id: self.panels.get(&link.panel_id)?.external_id.clone(),
                    ci_version: link.ci_version.clone(),
                })
            })
            .collect())
    }
}

// ============================================================================
// Fixture field access
// ============================================================================

struct Fields<'a> {
    record: &'a FixtureRecord,
    line: u64,
}

impl Fields<'_> {
    fn error(&self, reason: impl Into<String>) -> PanelError {
        PanelError::malformed(
            "fixture dump",
            self.line,
            format!("{} pk {}: {}", self.record.model, self.record.pk, reason.into()),
        )
    }

    fn value(&self, name: &str) -> &Value {
        self.record.fields.get(name).unwrap_or(&Value::Null)
    }

    fn text(&self, name: &str) -> Result<String> {
        self.optional_text(name)?
            .ok_or_else(|| self.error(format!("missing field '{}'", name)))
    }

    fn optional_text(&self, name: &str) -> Result<Option<String>> {
        match self.value(name) {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            other => Err(self.error(format!("field '{}' is not a string: {}", name, other))),
        }
    }

    fn int(&self, name: &str) -> Result<i64> {
        self.optional_int(name)?
            .ok_or_else(|| self.error(format!("missing field '{}'", name)))
    }

    fn optional_int(&self, name: &str) -> Result<Option<i64>> {
        match self.value(name) {
            Value::Null => Ok(None),
            value => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.error(format!("field '{}' is not an integer: {}", name, value))),
        }
    }

    fn small_int(&self, name: &str) -> Result<i32> {
        i32::try_from(self.int(name)?).map_err(|_| self.error(format!("field '{}' out of range", name)))
    }

    fn flag(&self, name: &str) -> Result<bool> {
        self.value(name)
            .as_bool()
            .ok_or_else(|| self.error(format!("field '{}' is not a boolean", name)))
    }

    fn panel_link(&self, feature: &str) -> Result<LinkEntry> {
        Ok(LinkEntry {
            panel_id: self.int("panel")?,
            feature_id: self.int(feature)?,
            panel_version: self.text("panel_version")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(model: &str, pk: u64, fields: Value) -> FixtureRecord {
        FixtureRecord {
            model: format!("panel_database.{}", model),
            pk,
            fields,
        }
    }

    fn records() -> Vec<FixtureRecord> {
        vec![
            record("Reference", 1, json!({"name": "GRCh37"})),
            record(
                "Panel",
                1,
                json!({"panelapp_id": "100", "name": "Ataxia", "version": "1.2", "signedoff": "None",
                       "panel_type": "gms", "is_superpanel": false}),
            ),
            record(
                "Gene",
                1,
                json!({"symbol": "ATXN1", "hgnc_id": "HGNC:10548", "clinical_transcript": 1}),
            ),
            record(
                "Transcript",
                1,
                json!({"refseq": "NM_000332", "version": 4, "canonical": true, "gene": 1}),
            ),
            record("Region", 1, json!({"chrom": "6", "start": 100, "end": 200, "reference": 1})),
            record("Exon", 1, json!({"number": 1, "transcript": 1, "region": 1})),
            record("PanelGene", 1, json!({"panel": 1, "gene": 1, "panel_version": "1.2"})),
        ]
    }

    #[tokio::test]
    async fn test_loads_fixture_records() {
        let store = MemoryStore::from_fixture_records(&records(), GeneKeyStrategy::HgncId).unwrap();

        let genes = store.genes_by_key(&["HGNC:10548".to_string()]).await.unwrap();
        assert_eq!(genes.len(), 1);
        assert_eq!(genes[0].clinical_transcript.as_deref(), Some("NM_000332.4"));

        let links = store.panel_gene_links(&[1]).await.unwrap();
        assert_eq!(links[0].feature_key, "HGNC:10548");

        let exons = store.exons_for_transcripts(&[1]).await.unwrap();
        assert_eq!(exons[0].region.reference, "GRCh37");
    }

    #[tokio::test]
    async fn test_symbol_strategy_keys_genes_by_symbol() {
        let store = MemoryStore::from_fixture_records(&records(), GeneKeyStrategy::Symbol).unwrap();
        assert_eq!(store.genes_by_key(&["ATXN1".to_string()]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_drift_helpers() {
        let mut store = MemoryStore::from_fixture_records(&records(), GeneKeyStrategy::HgncId).unwrap();

        assert!(store.move_exon("NM_000332.4", 1, 150, 250));
        let exons = store.exons_for_transcripts(&[1]).await.unwrap();
        assert_eq!((exons[0].region.start, exons[0].region.end), (150, 250));

        assert_eq!(store.unlink_gene("100", "HGNC:10548"), 1);
        assert!(store.panel_gene_links(&[1]).await.unwrap().is_empty());

        assert!(store.delete_panel("100"));
        assert!(store.panel_external_ids().await.unwrap().is_empty());
        assert!(!store.delete_panel("100"));
    }

    #[test]
    fn test_bad_field_is_malformed() {
        let bad = vec![record("Exon", 1, json!({"number": "one", "transcript": 1, "region": 1}))];
        let err = MemoryStore::from_fixture_records(&bad, GeneKeyStrategy::HgncId).unwrap_err();
        assert!(err.to_string().contains("fixture dump line 1"));
        assert!(err.to_string().contains("number"));
    }
}
