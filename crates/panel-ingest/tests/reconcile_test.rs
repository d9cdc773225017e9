//! End-to-end tests for reconciliation
//!
//! A store loaded from the built graph must reconcile cleanly; each test
//! then drifts one thing in the store and checks that exactly that drift is
//! reported.

mod helpers;

use helpers::{init_tracing, options, Sources};
use panel_ingest::audit::{AuditEntry, AuditOutcome, JsonLinesAuditSink, MemoryAuditSink};
use panel_ingest::fixtures::{read_fixture_file, write_fixtures_dated};
use panel_ingest::graph::EntityKind;
use panel_ingest::identity::GeneKeyStrategy;
use panel_ingest::reconcile::{Discrepancy, Mismatch, ReconcileOptions, Reconciler, Report};
use panel_ingest::store::MemoryStore;

fn store(sources: &Sources) -> MemoryStore {
    MemoryStore::from_graph(&sources.build(), GeneKeyStrategy::HgncId).expect("Failed to load store")
}

async fn check(sources: &Sources, store: MemoryStore) -> (Report, MemoryAuditSink) {
    let reconciler = Reconciler::new(store, ReconcileOptions::new(options(), sources.directory.describe()));
    let mut audit = MemoryAuditSink::new();
    let report = reconciler
        .check(sources.input(), &sources.transcripts, &mut audit)
        .await
        .expect("Reconciliation errored");
    (report, audit)
}

// ============================================================================
// Clean stores
// ============================================================================

#[tokio::test]
async fn test_store_built_from_same_sources_matches() {
    init_tracing();
    let sources = Sources::new();
    let (report, audit) = check(&sources, store(&sources)).await;

    assert!(report.is_ok(), "unexpected discrepancies: {:?}", report.discrepancies().collect::<Vec<_>>());
    assert_eq!(audit.entries.len(), 1);
    assert_eq!(audit.entries[0].outcome, AuditOutcome::Confirmed);
    assert!(audit.entries[0]
        .message
        .starts_with("Store confirmed against rare-disease-test-directory-v7.xlsx (230401)"));
}

#[tokio::test]
async fn test_fixture_dump_reconciles_before_import() {
    let sources = Sources::new();
    let written = write_fixtures_dated(&sources.build(), sources.output_dir(), "230401").unwrap();
    let records = read_fixture_file(&written.dump).unwrap();
    let store = MemoryStore::from_fixture_records(&records, GeneKeyStrategy::HgncId).unwrap();

    let (report, _) = check(&sources, store).await;
    assert!(report.is_ok(), "unexpected discrepancies: {:?}", report.discrepancies().collect::<Vec<_>>());
}

// ============================================================================
// Drift
// ============================================================================

#[tokio::test]
async fn test_unlinked_gene_is_the_only_discrepancy() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert_eq!(store.unlink_gene("100", "HGNC:2"), 1);

    let (report, audit) = check(&sources, store).await;
    assert_eq!(report.len(), 1);
    assert_eq!(
        report.section(EntityKind::Gene),
        &[Discrepancy::new(EntityKind::Gene, "HGNC:2", Mismatch::OnlyExpected).scoped("100")]
    );
    assert_eq!(audit.entries[0].outcome, AuditOutcome::Failed);
    assert_eq!(audit.entries[0].discrepancy_count, 1);
}

#[tokio::test]
async fn test_deleted_panel_is_reported_missing() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert!(store.delete_panel("300"));

    let (report, _) = check(&sources, store).await;
    assert_eq!(
        report.section(EntityKind::Panel),
        &[Discrepancy::new(EntityKind::Panel, "300", Mismatch::OnlyExpected)]
    );
    assert!(report.into_result().unwrap_err().is_reconciliation_failure());
}

#[tokio::test]
async fn test_panel_version_drift() {
    let sources = Sources::new();
    let mut store = store(&sources);
    store.set_panel_version("200", "1.1");

    let (report, _) = check(&sources, store).await;
    assert_eq!(
        report.section(EntityKind::Panel),
        &[Discrepancy::field(EntityKind::Panel, "200", "version", "1.0", "1.1")]
    );
}

#[tokio::test]
async fn test_equal_versions_in_other_notation_match() {
    let sources = Sources::new();
    let mut store = store(&sources);
    store.set_panel_version("200", "1.00");

    let (report, _) = check(&sources, store).await;
    assert!(report.section(EntityKind::Panel).is_empty());
}

#[tokio::test]
async fn test_subpanel_name_drift_is_scoped_to_superpanel() {
    let sources = Sources::new();
    let mut store = store(&sources);
    store.set_panel_name("100", "Ataxias");

    let (report, _) = check(&sources, store).await;
    assert_eq!(
        report.section(EntityKind::Panel),
        &[Discrepancy::field(EntityKind::Panel, "100", "name", "Ataxia", "Ataxias")]
    );
    assert_eq!(
        report.section(EntityKind::Subpanel),
        &[Discrepancy::field(EntityKind::Subpanel, "100", "name", "Ataxia", "Ataxias").scoped("500")]
    );
}

#[tokio::test]
async fn test_missing_clinical_transcript() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert!(store.clear_clinical_transcript("HGNC:1"));

    let (report, _) = check(&sources, store).await;
    assert_eq!(
        report.section(EntityKind::Gene),
        &[Discrepancy::field(
            EntityKind::Gene,
            "HGNC:1",
            "clinical_transcript",
            "NM_000001.2",
            "None"
        )]
    );
}

#[tokio::test]
async fn test_moved_exon_reports_coordinates() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert!(store.move_exon("NM_000001.2", 1, 1001, 1100));

    let (report, _) = check(&sources, store).await;
    assert_eq!(report.len(), 1);
    assert_eq!(
        report.section(EntityKind::Region),
        &[Discrepancy::field(
            EntityKind::Region,
            "NM_000001.2 exon 1",
            "coordinates",
            "1:1000-1100 (GRCh37)",
            "1:1001-1100 (GRCh37)"
        )
        .scoped("HGNC:1")]
    );
}

#[tokio::test]
async fn test_unlinked_indication_target() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert_eq!(store.unlink_indication_panel("R266.1", "500"), 1);

    let (report, _) = check(&sources, store).await;
    assert_eq!(
        report.section(EntityKind::ClinicalIndication),
        &[Discrepancy::new(EntityKind::ClinicalIndication, "500", Mismatch::OnlyExpected).scoped("R266.1")]
    );
}

#[tokio::test]
async fn test_unresolved_target_is_a_discrepancy_not_an_error() {
    let clean = Sources::new();
    let sources = Sources::with_extra_targets(&["999"]);

    let (report, _) = check(&sources, store(&clean)).await;
    assert_eq!(
        report.section(EntityKind::ClinicalIndication),
        &[Discrepancy::new(
            EntityKind::ClinicalIndication,
            "R54.4",
            Mismatch::Unresolved {
                reference: "999".to_string()
            }
        )]
    );
}

// ============================================================================
// Superpanels
// ============================================================================

#[tokio::test]
async fn test_superpanel_links_compared_with_subpanel_union() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert_eq!(store.unlink_gene("500", "HGNC:3"), 1);
    assert!(store.link_gene("500", "HGNC:4"));

    let (report, _) = check(&sources, store).await;
    assert_eq!(report.len(), 2);
    assert_eq!(
        report.section(EntityKind::Superpanel),
        &[
            Discrepancy::new(EntityKind::Superpanel, "HGNC:3", Mismatch::OnlyExpected).scoped("500"),
            Discrepancy::new(EntityKind::Superpanel, "HGNC:4", Mismatch::OnlyInStore).scoped("500"),
        ]
    );
}

#[tokio::test]
async fn test_removed_subpanel_link() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert!(store.unlink_subpanel("500", "200"));

    let (report, _) = check(&sources, store).await;
    assert_eq!(report.len(), 1);
    assert_eq!(
        report.section(EntityKind::Subpanel),
        &[Discrepancy::new(EntityKind::Subpanel, "200", Mismatch::OnlyExpected).scoped("500")]
    );
}

#[tokio::test]
async fn test_extra_subpanel_link() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert!(store.link_subpanel("500", "300"));

    let (report, _) = check(&sources, store).await;
    assert_eq!(report.len(), 1);
    assert_eq!(
        report.section(EntityKind::Subpanel),
        &[Discrepancy::new(EntityKind::Subpanel, "300", Mismatch::OnlyInStore).scoped("500")]
    );
}

#[tokio::test]
async fn test_store_only_superpanel_keeps_its_kind() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert!(store.rename_panel("500", "501"));

    let (report, _) = check(&sources, store).await;
    assert_eq!(
        report.section(EntityKind::Superpanel),
        &[
            Discrepancy::new(EntityKind::Superpanel, "500", Mismatch::OnlyExpected),
            Discrepancy::new(EntityKind::Superpanel, "501", Mismatch::OnlyInStore),
        ]
    );
    assert!(report.section(EntityKind::Panel).is_empty());
}

// ============================================================================
// STRs and CNVs
// ============================================================================

#[tokio::test]
async fn test_str_attribute_drift() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert!(store.set_str_repeats("HTT_CAG", 30));
    assert!(store.clear_str_gene("HTT_CAG"));

    let (report, _) = check(&sources, store).await;
    assert_eq!(report.len(), 2);
    assert_eq!(
        report.section(EntityKind::Str),
        &[
            Discrepancy::field(EntityKind::Str, "HTT_CAG", "gene", "HGNC:1", "None"),
            Discrepancy::field(EntityKind::Str, "HTT_CAG", "nb_repeats", 26, 30),
        ]
    );
}

#[tokio::test]
async fn test_cnv_variant_type_drift() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert!(store.set_cnv_type("ISCA-1", "gain"));

    let (report, _) = check(&sources, store).await;
    assert_eq!(report.len(), 1);
    assert_eq!(
        report.section(EntityKind::Cnv),
        &[Discrepancy::field(EntityKind::Cnv, "ISCA-1", "variant_type", "loss", "gain")]
    );
}

#[tokio::test]
async fn test_moved_str_region_is_scoped_to_its_build() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert!(store.move_variant_region("HTT_CAG", "GRCh38", 3074878, 3074933));

    let (report, _) = check(&sources, store).await;
    assert_eq!(report.len(), 1);
    assert_eq!(
        report.section(EntityKind::Region),
        &[Discrepancy::field(
            EntityKind::Region,
            "HTT_CAG",
            "coordinates",
            "4:3074877-3074933 (GRCh38)",
            "4:3074878-3074933 (GRCh38)"
        )
        .scoped("GRCh38")]
    );
}

#[tokio::test]
async fn test_moving_shared_cnv_region_leaves_the_other_cnv() {
    let sources = Sources::new();
    let mut store = store(&sources);
    assert!(store.move_variant_region("ISCA-1", "GRCh37", 101, 200));

    let (report, _) = check(&sources, store).await;
    assert_eq!(
        report.section(EntityKind::Region),
        &[Discrepancy::field(
            EntityKind::Region,
            "ISCA-1",
            "coordinates",
            "22:100-200 (GRCh37)",
            "22:101-200 (GRCh37)"
        )
        .scoped("GRCh37")]
    );
}

// ============================================================================
// Audit trail
// ============================================================================

#[tokio::test]
async fn test_every_check_appends_an_audit_line() {
    let sources = Sources::new();
    let path = sources.path().join("logs").join("panel_audit.jsonl");
    let options = ReconcileOptions::new(options(), sources.directory.describe());

    let mut drifted = store(&sources);
    drifted.unlink_gene("200", "HGNC:3");

    for store in [store(&sources), drifted] {
        let mut audit = JsonLinesAuditSink::new(&path);
        Reconciler::new(store, options.clone())
            .check(sources.input(), &sources.transcripts, &mut audit)
            .await
            .unwrap();
    }

    let entries: Vec<AuditEntry> = serde_jsonlines::json_lines(&path)
        .unwrap()
        .collect::<std::io::Result<_>>()
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].outcome, AuditOutcome::Confirmed);
    assert_eq!(entries[1].outcome, AuditOutcome::Failed);
    assert_eq!(entries[1].discrepancies[0].key, "HGNC:3");
}
