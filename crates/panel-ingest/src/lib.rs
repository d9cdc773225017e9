//! Panel Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Builds the normalized panel database from catalog panel dumps and the
//! national test directory, emits it as relational fixtures, and checks a
//! loaded store against the same sources.
//!
//! # Pipeline
//!
//! - [`dump`] and [`test_directory`] read the sources into flat records
//! - [`builder`] turns them into a [`graph::PanelGraph`], deduplicating every
//!   entity by natural key
//! - [`fixtures`] serialises the graph; [`export`] writes the genepanels and
//!   genes2transcripts views
//! - [`reconcile`] rebuilds the graph and compares it against a
//!   [`store::PanelStore`], recording each run with an [`audit::AuditSink`]
//!
//! # Example
//!
//! ```no_run
//! use panel_ingest::builder::{build_graph, BuildInput, BuildOptions};
//! use panel_ingest::dump::read_dump_dir;
//! use panel_ingest::records::PanelType;
//! use panel_ingest::test_directory::read_test_directory;
//! use panel_ingest::transcripts::MemoryTranscriptSource;
//!
//! fn main() -> panel_common::Result<()> {
//!     let records = read_dump_dir("./dumps/gms", PanelType::Gms)?;
//!     let directory = read_test_directory("./test_directory.json")?;
//!     let transcripts = MemoryTranscriptSource::from_exon_table("./exons.tsv.gz")?;
//!
//!     let options = BuildOptions::new(directory.date.clone());
//!     let graph = build_graph(BuildInput::new(&records, &directory.indications), &transcripts, &options)?;
//!     panel_ingest::fixtures::write_fixtures(&graph, "./fixtures")?;
//!     Ok(())
//! }
//! ```

pub mod aliases;
pub mod audit;
pub mod builder;
pub mod config;
pub mod dump;
pub mod export;
pub mod fixtures;
pub mod graph;
pub mod identity;
pub mod reconcile;
pub mod records;
pub mod store;
pub mod test_directory;
pub mod transcripts;
