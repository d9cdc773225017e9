//! Reconciliation engine
//!
//! Rebuilds the expected panel graph from the same sources as the build and
//! compares it against what a [`PanelStore`] holds. Every entity kind is
//! checked in two steps: membership of natural keys first, then attributes
//! of the keys present on both sides. Nothing short-circuits; the report
//! lists every discrepancy found.
//!
//! Only store failures and malformed input produce an `Err`. A store that
//! does not match yields an `Ok` report that is not [`Report::is_ok`].

pub mod report;

pub use report::{Discrepancy, Mismatch, Report};

use crate::audit::{AuditEntry, AuditSink};
use crate::builder::{build_graph, BuildInput, BuildOptions, UnresolvedPolicy};
use crate::graph::{current_version, EntityKind, FeatureTable, PanelGraph, PanelRow};
use crate::identity::SurrogateKey;
use crate::store::{PanelStore, StoredPanel, StoredPanelLink, StoredRegion, StoredVariantRegion};
use crate::transcripts::{split_accession, TranscriptSource};
use panel_common::version::same_version;
use panel_common::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Options of the build being verified; the policy is always collecting
    pub build: BuildOptions,
    /// Description of the sources, e.g. the test directory name and date
    pub source: String,
}

impl ReconcileOptions {
    pub fn new(build: BuildOptions, source: impl Into<String>) -> Self {
        Self {
            build: build.with_policy(UnresolvedPolicy::Collect),
            source: source.into(),
        }
    }
}

pub struct Reconciler<S> {
    store: S,
    options: ReconcileOptions,
}

impl<S: PanelStore> Reconciler<S> {
    pub fn new(store: S, options: ReconcileOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Compare the store against the graph built from `input`
    ///
    /// The audit entry is recorded before returning, whatever the outcome.
    pub async fn check(
        &self,
        input: BuildInput<'_>,
        transcripts: &dyn TranscriptSource,
        audit: &mut dyn AuditSink,
    ) -> Result<Report> {
        let build = self.options.build.clone().with_policy(UnresolvedPolicy::Collect);
        let expected = build_graph(input, transcripts, &build)?;
        info!(source = %self.options.source, tables = ?expected.summary(), "Built expected graph");

        let mut report = Report::new(self.options.source.clone());
        report.extend(expected.unresolved.iter().map(|u| {
            Discrepancy::new(
                u.kind,
                u.key.clone(),
                Mismatch::Unresolved {
                    reference: u.reference.clone(),
                },
            )
        }));

        let check = GraphCheck {
            store: &self.store,
            expected: &expected,
        };
        report.extend(check.references().await?);
        let panels = check.panels(&mut report).await?;
        report.extend(check.panel_features(&panels).await?);
        report.extend(check.superpanels(&panels).await?);
        report.extend(check.genes().await?);
        report.extend(check.strs().await?);
        report.extend(check.cnvs().await?);
        report.extend(check.indications().await?);

        report.log();
        audit.record(&AuditEntry::from_report(&report))?;
        Ok(report)
    }
}

/// One comparison of an expected graph against a store
struct GraphCheck<'a, S> {
    store: &'a S,
    expected: &'a PanelGraph,
}

impl<S: PanelStore> GraphCheck<'_, S> {
    async fn references(&self) -> Result<Vec<Discrepancy>> {
        let stored: Vec<String> = self
            .store
            .reference_builds()
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();
        let expected: BTreeSet<String> = self.expected.references.keys().cloned().collect();
        Ok(membership(EntityKind::Region, Some("reference"), &expected, &stored))
    }

    /// Panel and superpanel rows; returns the stored rows of expected panels
    async fn panels(&self, report: &mut Report) -> Result<BTreeMap<String, StoredPanel>> {
        let stored_ids = self.store.panel_external_ids().await?;
        let expected_ids: Vec<String> = self.expected.panels.keys().cloned().collect();
        let stored: BTreeMap<String, StoredPanel> = self
            .store
            .panels_by_external_id(&expected_ids)
            .await?
            .into_iter()
            .map(|p| (p.external_id.clone(), p))
            .collect();

        for (_, external_id, row) in self.expected.panels.iter() {
            match stored.get(external_id) {
                Some(panel) => report.extend(compare_panel(external_id, row, panel)),
                None => report.push(Discrepancy::new(panel_kind(row), external_id.clone(), Mismatch::OnlyExpected)),
            }
        }

        let expected_ids: BTreeSet<&String> = expected_ids.iter().collect();
        let store_only: Vec<String> = stored_ids
            .into_iter()
            .filter(|id| !expected_ids.contains(id))
            .collect();
        if !store_only.is_empty() {
            let superpanels: BTreeSet<String> = self
                .store
                .panels_by_external_id(&store_only)
                .await?
                .into_iter()
                .filter(|p| p.is_superpanel)
                .map(|p| p.external_id)
                .collect();
            for external_id in store_only {
                let kind = if superpanels.contains(&external_id) {
                    EntityKind::Superpanel
                } else {
                    EntityKind::Panel
                };
                report.push(Discrepancy::new(kind, external_id, Mismatch::OnlyInStore));
            }
        }

        debug!(matched = stored.len(), "Checked panels");
        Ok(stored)
    }

    /// Feature sets at each panel's latest version
    ///
    /// Superpanels are compared against the union recomputed from their
    /// subpanels rather than their own links in the expected graph.
    async fn panel_features(&self, panels: &BTreeMap<String, StoredPanel>) -> Result<Vec<Discrepancy>> {
        let ids: Vec<i64> = panels.values().map(|p| p.id).collect();
        let mut found = Vec::new();

        for table in FeatureTable::ALL {
            let links = match table {
                FeatureTable::Gene => self.store.panel_gene_links(&ids).await?,
                FeatureTable::Str => self.store.panel_str_links(&ids).await?,
                FeatureTable::Cnv => self.store.panel_cnv_links(&ids).await?,
            };
            let mut by_panel = group_by(links, |link| link.panel_id);

            for (external_id, panel) in panels {
                let Some(row) = self.expected.panels.get(external_id) else {
                    continue;
                };
                let stored = current_links(by_panel.remove(&panel.id).unwrap_or_default(), &panel.version);
                let (kind, expected) = if row.is_superpanel {
                    (
                        EntityKind::Superpanel,
                        self.expected.superpanel_feature_keys(external_id, table),
                    )
                } else {
                    (table.entity_kind(), self.expected.current_feature_keys(external_id, table))
                };
                found.extend(membership(kind, Some(external_id.as_str()), &expected, &stored));
            }
        }
        Ok(found)
    }

    async fn superpanels(&self, panels: &BTreeMap<String, StoredPanel>) -> Result<Vec<Discrepancy>> {
        let superpanels: BTreeMap<i64, &String> = panels
            .iter()
            .filter(|(id, _)| self.expected.panels.get(*id).is_some_and(|row| row.is_superpanel))
            .map(|(id, panel)| (panel.id, id))
            .collect();
        if superpanels.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = superpanels.keys().copied().collect();
        let mut by_superpanel = group_by(self.store.subpanel_links(&ids).await?, |link| link.superpanel_id);
        let mut found = Vec::new();

        for (id, external_id) in superpanels {
            let stored = by_superpanel.remove(&id).unwrap_or_default();
            let expected: BTreeSet<String> = self.expected.subpanel_ids(external_id).into_iter().collect();
            let stored_ids: Vec<String> = stored.iter().map(|s| s.external_id.clone()).collect();
            found.extend(membership(EntityKind::Subpanel, Some(external_id.as_str()), &expected, &stored_ids));

            for subpanel in stored.iter().filter(|s| expected.contains(&s.external_id)) {
                if let Some(row) = self.expected.panels.get(&subpanel.external_id) {
                    if row.name != subpanel.name {
                        found.push(
                            Discrepancy::field(EntityKind::Subpanel, &subpanel.external_id, "name", &row.name, &subpanel.name)
                                .scoped(external_id.as_str()),
                        );
                    }
                }
            }
        }
        Ok(found)
    }

    /// Gene attributes, transcripts, exons and exon regions
    ///
    /// Gene membership is checked through panel links; genes absent from the
    /// store are already reported there.
    async fn genes(&self) -> Result<Vec<Discrepancy>> {
        let keys: Vec<String> = self.expected.genes.keys().cloned().collect();
        let stored_genes = self.store.genes_by_key(&keys).await?;
        let mut found = Vec::new();

        for gene in &stored_genes {
            let Some(row) = self.expected.genes.get(&gene.key) else {
                continue;
            };
            if row.symbol != gene.symbol {
                found.push(Discrepancy::field(EntityKind::Gene, &gene.key, "symbol", &row.symbol, &gene.symbol));
            }
            let expected_clinical = row.clinical_transcript.and_then(|pk| self.accession(pk));
            if !same_accession(expected_clinical.as_deref(), gene.clinical_transcript.as_deref()) {
                found.push(Discrepancy::field(
                    EntityKind::Gene,
                    &gene.key,
                    "clinical_transcript",
                    display_or_none(expected_clinical.as_deref()),
                    display_or_none(gene.clinical_transcript.as_deref()),
                ));
            }
        }

        // Transcripts, by owning gene
        let gene_ids: Vec<i64> = stored_genes.iter().map(|g| g.id).collect();
        let gene_keys: BTreeMap<i64, &str> = stored_genes.iter().map(|g| (g.id, g.key.as_str())).collect();
        let mut stored_transcripts = group_by(self.store.transcripts_for_genes(&gene_ids).await?, |t| t.gene_id);

        let mut expected_transcripts: BTreeMap<&str, BTreeMap<String, SurrogateKey>> = BTreeMap::new();
        for (pk, _, row) in self.expected.transcripts.iter() {
            if let Some(gene_key) = self.expected.genes.key_of(row.gene) {
                expected_transcripts
                    .entry(gene_key.as_str())
                    .or_default()
                    .insert(format!("{}.{}", row.refseq_base, row.version), pk);
            }
        }

        // (stored transcript id, expected transcript pk, accession, gene key)
        let mut matched = Vec::new();
        for (gene_id, gene_key) in &gene_keys {
            let stored = stored_transcripts.remove(gene_id).unwrap_or_default();
            let expected = expected_transcripts.remove(gene_key).unwrap_or_default();
            let expected_set: BTreeSet<String> = expected.keys().cloned().collect();
            let stored_accessions: Vec<String> = stored.iter().map(|t| t.accession()).collect();
            found.extend(membership(EntityKind::Transcript, Some(*gene_key), &expected_set, &stored_accessions));

            for transcript in stored {
                let accession = transcript.accession();
                let Some(&pk) = expected.get(&accession) else {
                    continue;
                };
                if let Some(row) = self.expected.transcripts.row(pk) {
                    if row.canonical != transcript.canonical {
                        found.push(
                            Discrepancy::field(EntityKind::Transcript, &accession, "canonical", row.canonical, transcript.canonical)
                                .scoped(*gene_key),
                        );
                    }
                }
                matched.push((transcript.id, pk, accession, *gene_key));
            }
        }

        // Exons, by transcript
        let transcript_ids: Vec<i64> = matched.iter().map(|(id, ..)| *id).collect();
        let mut stored_exons = group_by(self.store.exons_for_transcripts(&transcript_ids).await?, |e| e.transcript_id);
        let mut expected_exons: BTreeMap<SurrogateKey, BTreeMap<u32, SurrogateKey>> = BTreeMap::new();
        for (_, _, row) in self.expected.exons.iter() {
            expected_exons
                .entry(row.transcript)
                .or_default()
                .insert(row.number, row.region);
        }

        for (transcript_id, pk, accession, gene_key) in matched {
            let stored = stored_exons.remove(&transcript_id).unwrap_or_default();
            let expected = expected_exons.remove(&pk).unwrap_or_default();
            let expected_numbers: BTreeSet<String> = expected.keys().map(u32::to_string).collect();
            let stored_numbers: Vec<String> = stored.iter().map(|e| e.number.to_string()).collect();
            found.extend(membership(EntityKind::Exon, Some(accession.as_str()), &expected_numbers, &stored_numbers));

            for exon in stored {
                let Some(&region) = u32::try_from(exon.number).ok().and_then(|n| expected.get(&n)) else {
                    continue;
                };
                let expected_region = self.region_text(region);
                let actual = exon.region.to_string();
                if expected_region.as_deref() != Some(actual.as_str()) {
                    found.push(
                        Discrepancy::field(
                            EntityKind::Region,
                            format!("{} exon {}", accession, exon.number),
                            "coordinates",
                            display_or_none(expected_region.as_deref()),
                            actual,
                        )
                        .scoped(gene_key),
                    );
                }
            }
        }

        debug!(genes = gene_keys.len(), "Checked genes");
        Ok(found)
    }

    async fn strs(&self) -> Result<Vec<Discrepancy>> {
        let names: Vec<String> = self.expected.strs.keys().cloned().collect();
        let stored = self.store.strs_by_name(&names).await?;
        let ids: Vec<i64> = stored.iter().map(|s| s.id).collect();
        let mut regions = group_by(self.store.str_regions(&ids).await?, |r| r.owner_id);
        let mut found = Vec::new();

        for repeat in stored {
            let (Some(pk), Some(row)) = (
                self.expected.strs.surrogate(&repeat.name),
                self.expected.strs.get(&repeat.name),
            ) else {
                continue;
            };

            let expected_gene = row.gene.and_then(|g| self.expected.genes.key_of(g)).cloned();
            if expected_gene != repeat.gene_key {
                found.push(Discrepancy::field(
                    EntityKind::Str,
                    &repeat.name,
                    "gene",
                    display_or_none(expected_gene.as_deref()),
                    display_or_none(repeat.gene_key.as_deref()),
                ));
            }
            if row.repeated_sequence != repeat.repeated_sequence {
                found.push(Discrepancy::field(
                    EntityKind::Str,
                    &repeat.name,
                    "repeated_sequence",
                    &row.repeated_sequence,
                    &repeat.repeated_sequence,
                ));
            }
            if i64::from(row.nb_repeats) != i64::from(repeat.nb_repeats) {
                found.push(Discrepancy::field(EntityKind::Str, &repeat.name, "nb_repeats", row.nb_repeats, repeat.nb_repeats));
            }
            if i64::from(row.nb_pathogenic_repeats) != i64::from(repeat.nb_pathogenic_repeats) {
                found.push(Discrepancy::field(
                    EntityKind::Str,
                    &repeat.name,
                    "nb_pathogenic_repeats",
                    row.nb_pathogenic_repeats,
                    repeat.nb_pathogenic_repeats,
                ));
            }

            let expected_regions = self.expected_regions(
                self.expected
                    .region_strs
                    .rows()
                    .iter()
                    .filter(|link| link.repeat == pk)
                    .map(|link| link.region),
            );
            found.extend(compare_regions(
                &repeat.name,
                expected_regions,
                regions.remove(&repeat.id).unwrap_or_default(),
            ));
        }
        Ok(found)
    }

    async fn cnvs(&self) -> Result<Vec<Discrepancy>> {
        let names: Vec<String> = self.expected.cnvs.keys().cloned().collect();
        let stored = self.store.cnvs_by_name(&names).await?;
        let ids: Vec<i64> = stored.iter().map(|c| c.id).collect();
        let mut regions = group_by(self.store.cnv_regions(&ids).await?, |r| r.owner_id);
        let mut found = Vec::new();

        for cnv in stored {
            let (Some(pk), Some(row)) = (self.expected.cnvs.surrogate(&cnv.name), self.expected.cnvs.get(&cnv.name))
            else {
                continue;
            };
            if row.variant_type != cnv.variant_type {
                found.push(Discrepancy::field(
                    EntityKind::Cnv,
                    &cnv.name,
                    "variant_type",
                    &row.variant_type,
                    &cnv.variant_type,
                ));
            }

            let expected_regions = self.expected_regions(
                self.expected
                    .region_cnvs
                    .rows()
                    .iter()
                    .filter(|link| link.cnv == pk)
                    .map(|link| link.region),
            );
            found.extend(compare_regions(
                &cnv.name,
                expected_regions,
                regions.remove(&cnv.id).unwrap_or_default(),
            ));
        }
        Ok(found)
    }

    /// Indication rows and their target panels after alias resolution
    async fn indications(&self) -> Result<Vec<Discrepancy>> {
        let stored_codes = self.store.indication_codes().await?;
        let expected_codes: BTreeSet<String> = self.expected.indications.keys().cloned().collect();
        let mut found = membership(EntityKind::ClinicalIndication, None, &expected_codes, &stored_codes);

        let codes: Vec<String> = expected_codes.iter().cloned().collect();
        let stored = self.store.indications_by_code(&codes).await?;
        let ids: Vec<i64> = stored.iter().map(|i| i.id).collect();
        let mut links = group_by(self.store.indication_panel_links(&ids).await?, |l| l.indication_id);

        for indication in stored {
            let (Some(pk), Some(row)) = (
                self.expected.indications.surrogate(&indication.code),
                self.expected.indications.get(&indication.code),
            ) else {
                continue;
            };
            if row.name != indication.name {
                found.push(Discrepancy::field(
                    EntityKind::ClinicalIndication,
                    &indication.code,
                    "name",
                    &row.name,
                    &indication.name,
                ));
            }
            if row.gemini_name != indication.gemini_name {
                found.push(Discrepancy::field(
                    EntityKind::ClinicalIndication,
                    &indication.code,
                    "gemini_name",
                    &row.gemini_name,
                    &indication.gemini_name,
                ));
            }

            let stored_links = links.remove(&indication.id).unwrap_or_default();
            let tags: Vec<&str> = stored_links.iter().map(|l| l.ci_version.as_str()).collect();
            let fallback = tags.iter().max().copied().unwrap_or_default();
            let current = current_version(tags.iter().copied(), fallback);
            let stored_targets: Vec<String> = stored_links
                .iter()
                .filter(|l| same_version(&l.ci_version, &current))
                .map(|l| l.panel_external_id.clone())
                .collect();
            let expected_targets: BTreeSet<String> = self
                .expected
                .indication_panels
                .rows()
                .iter()
                .filter(|link| link.clinical_indication == pk)
                .filter_map(|link| self.expected.panels.key_of(link.panel).cloned())
                .collect();
            found.extend(membership(
                EntityKind::ClinicalIndication,
                Some(indication.code.as_str()),
                &expected_targets,
                &stored_targets,
            ));
        }
        Ok(found)
    }

    fn accession(&self, transcript: SurrogateKey) -> Option<String> {
        self.expected
            .transcripts
            .row(transcript)
            .map(|t| format!("{}.{}", t.refseq_base, t.version))
    }

    /// Region in the same text form as [`StoredRegion`]'s `Display`
    fn region_text(&self, region: SurrogateKey) -> Option<String> {
        let row = self.expected.regions.row(region)?;
        let reference = self.expected.reference_name(row.reference)?;
        Some(format!("{}:{}-{} ({})", row.chrom, row.start, row.end, reference))
    }

    /// Region texts grouped by reference build name
    fn expected_regions(&self, regions: impl Iterator<Item = SurrogateKey>) -> BTreeMap<String, Vec<String>> {
        let mut by_build: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for region in regions {
            let Some(row) = self.expected.regions.row(region) else {
                continue;
            };
            let (Some(reference), Some(text)) = (self.expected.reference_name(row.reference), self.region_text(region))
            else {
                continue;
            };
            by_build.entry(reference.to_string()).or_default().push(text);
        }
        by_build
    }
}

// ============================================================================
// Comparison helpers
// ============================================================================

fn panel_kind(row: &PanelRow) -> EntityKind {
    if row.is_superpanel {
        EntityKind::Superpanel
    } else {
        EntityKind::Panel
    }
}

fn compare_panel(external_id: &str, row: &PanelRow, stored: &StoredPanel) -> Vec<Discrepancy> {
    let kind = panel_kind(row);
    let mut found = Vec::new();
    let mut check = |field: &str, expected: &dyn Display, actual: &dyn Display, equal: bool| {
        if !equal {
            found.push(Discrepancy::field(kind, external_id, field, expected, actual));
        }
    };

    check("name", &row.name, &stored.name, row.name == stored.name);
    check("version", &row.version, &stored.version, same_version(&row.version, &stored.version));
    check("signed_off", &row.signed_off, &stored.signed_off, row.signed_off == stored.signed_off);
    check(
        "panel_type",
        &row.panel_type,
        &stored.panel_type,
        row.panel_type.as_str() == stored.panel_type,
    );
    check(
        "is_superpanel",
        &row.is_superpanel,
        &stored.is_superpanel,
        row.is_superpanel == stored.is_superpanel,
    );
    found
}

/// Feature keys of the links at the latest version tag
fn current_links(links: Vec<StoredPanelLink>, fallback: &str) -> Vec<String> {
    let current = current_version(links.iter().map(|l| l.panel_version.as_str()), fallback);
    links
        .into_iter()
        .filter(|l| same_version(&l.panel_version, &current))
        .map(|l| l.feature_key)
        .collect()
}

/// Membership discrepancies between expected keys and stored keys
///
/// A key stored more than once is reported as a count mismatch.
fn membership(kind: EntityKind, scope: Option<&str>, expected: &BTreeSet<String>, stored: &[String]) -> Vec<Discrepancy> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for key in stored {
        *counts.entry(key.as_str()).or_default() += 1;
    }

    let scoped = |discrepancy: Discrepancy| match scope {
        Some(scope) => discrepancy.scoped(scope),
        None => discrepancy,
    };

    let mut found: Vec<Discrepancy> = expected
        .iter()
        .filter(|key| !counts.contains_key(key.as_str()))
        .map(|key| scoped(Discrepancy::new(kind, key.clone(), Mismatch::OnlyExpected)))
        .collect();

    for (key, count) in counts {
        if !expected.contains(key) {
            found.push(scoped(Discrepancy::new(kind, key, Mismatch::OnlyInStore)));
        } else if count > 1 {
            found.push(scoped(Discrepancy::new(
                kind,
                key,
                Mismatch::Count {
                    expected: 1,
                    actual: count,
                },
            )));
        }
    }
    found
}

/// Per-build region comparison of one STR or CNV
fn compare_regions(
    owner: &str,
    expected: BTreeMap<String, Vec<String>>,
    stored: Vec<StoredVariantRegion>,
) -> Vec<Discrepancy> {
    let mut actual: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for StoredVariantRegion { region, .. } in stored {
        let StoredRegion { reference, .. } = &region;
        actual.entry(reference.clone()).or_default().push(region.to_string());
    }

    let builds: BTreeSet<String> = expected.keys().chain(actual.keys()).cloned().collect();
    let mut found = Vec::new();
    for build in builds {
        let mut want = expected.get(&build).cloned().unwrap_or_default();
        let mut have = actual.get(&build).cloned().unwrap_or_default();
        want.sort();
        have.sort();
        if want == have {
            continue;
        }

        let discrepancy = match (want.as_slice(), have.as_slice()) {
            ([], _) => Discrepancy::new(EntityKind::Region, owner, Mismatch::OnlyInStore),
            (_, []) => Discrepancy::new(EntityKind::Region, owner, Mismatch::OnlyExpected),
            ([one], [other]) => Discrepancy::field(EntityKind::Region, owner, "coordinates", one, other),
            _ => Discrepancy::new(
                EntityKind::Region,
                owner,
                Mismatch::Count {
                    expected: want.len(),
                    actual: have.len(),
                },
            ),
        };
        found.push(discrepancy.scoped(build));
    }
    found
}

/// Transcript accessions compared as `(base, numeric version)`
fn same_accession(expected: Option<&str>, actual: Option<&str>) -> bool {
    match (expected, actual) {
        (Some(a), Some(b)) => match (split_accession(a), split_accession(b)) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (None, None) => true,
        _ => false,
    }
}

fn display_or_none(value: Option<&str>) -> &str {
    value.unwrap_or("None")
}

fn group_by<T, K: Ord>(items: Vec<T>, key: impl Fn(&T) -> K) -> BTreeMap<K, Vec<T>> {
    let mut groups: BTreeMap<K, Vec<T>> = BTreeMap::new();
    for item in items {
        groups.entry(key(&item)).or_default().push(item);
    }
    groups
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn keys(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn stored(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_membership_reports_both_sides() {
        let found = membership(EntityKind::Gene, Some("100"), &keys(&["G1", "G2"]), &stored(&["G1", "G3", "G3"]));
        let mismatches: Vec<(&str, &Mismatch)> = found.iter().map(|d| (d.key.as_str(), &d.mismatch)).collect();
        assert_eq!(
            mismatches,
            vec![("G2", &Mismatch::OnlyExpected), ("G3", &Mismatch::OnlyInStore)]
        );
        assert!(found.iter().all(|d| d.scope.as_deref() == Some("100")));
    }

    #[test]
    fn test_membership_flags_duplicate_rows() {
        let found = membership(EntityKind::Transcript, None, &keys(&["NM_1.1"]), &stored(&["NM_1.1", "NM_1.1"]));
        assert_eq!(
            found[0].mismatch,
            Mismatch::Count {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn test_current_links_use_semantic_latest() {
        let link = |key: &str, version: &str| StoredPanelLink {
            panel_id: 1,
            feature_key: key.to_string(),
            panel_version: version.to_string(),
        };
        let links = vec![link("G1", "1.9"), link("G2", "1.10"), link("G3", "1.10.0")];
        assert_eq!(current_links(links, "1.0"), vec!["G2", "G3"]);
    }

    #[test]
    fn test_same_accession_compares_numeric_versions() {
        assert!(same_accession(Some("NM_1.04"), Some("NM_1.4")));
        assert!(!same_accession(Some("NM_1.4"), Some("NM_1.5")));
        assert!(!same_accession(Some("NM_1.4"), None));
        assert!(same_accession(None, None));
    }

    #[test]
    fn test_compare_regions_per_build() {
        let region = |start: i64, reference: &str| StoredVariantRegion {
            owner_id: 1,
            region: StoredRegion {
                chrom: "4".into(),
                start,
                end: start + 100,
                reference: reference.into(),
            },
        };
        let mut expected = BTreeMap::new();
        expected.insert("GRCh37".to_string(), vec!["4:10-110 (GRCh37)".to_string()]);
        expected.insert("GRCh38".to_string(), vec!["4:20-120 (GRCh38)".to_string()]);

        let found = compare_regions("HTT_CAG", expected, vec![region(10, "GRCh37"), region(25, "GRCh38")]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].scope.as_deref(), Some("GRCh38"));
        assert!(matches!(found[0].mismatch, Mismatch::Field { .. }));
    }
}
