//! Panel Ingest - build and check the panel database

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use panel_common::logging::{init_logging, LogConfig, LogLevel};
use panel_ingest::audit::JsonLinesAuditSink;
use panel_ingest::builder::{build_graph, BuildInput, BuildOptions};
use panel_ingest::config::Config;
use panel_ingest::dump::read_dump_dir;
use panel_ingest::export::{write_genepanels, write_genes2transcripts};
use panel_ingest::fixtures::{read_fixture_file, write_fixtures};
use panel_ingest::identity::GeneKeyStrategy;
use panel_ingest::reconcile::{ReconcileOptions, Reconciler};
use panel_ingest::records::{DumpRecord, PanelType};
use panel_ingest::store::{MemoryStore, PanelStore};
use panel_ingest::test_directory::{read_test_directory, TestDirectory};
use panel_ingest::transcripts::MemoryTranscriptSource;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "panel-ingest")]
#[command(author, version, about = "Build and check the panel database")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the panel graph and write fixtures
    Build {
        #[command(flatten)]
        sources: SourceArgs,

        /// Directory for the dated fixture folder
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a fixture dump or a live store against the sources
    Check {
        #[command(flatten)]
        sources: SourceArgs,

        /// Fixture dump to check before import
        #[arg(long, conflicts_with = "database")]
        fixture: Option<PathBuf>,

        /// PostgreSQL URL of the live store
        #[arg(long)]
        database: Option<String>,
    },

    /// Write the genepanels file
    Genepanels {
        #[command(flatten)]
        sources: SourceArgs,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Command {
    fn log_file_prefix(&self) -> &'static str {
        match self {
            Command::Build { .. } | Command::Genepanels { .. } => "panel-build",
            Command::Check { .. } => "panel-check",
        }
    }
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Panel dump directory as TYPE=DIR (gms, non-gms, in-house, single_gene)
    #[arg(long = "panels", value_parser = parse_panel_set, required = true)]
    panels: Vec<(PanelType, PathBuf)>,

    /// Test directory JSON
    #[arg(long)]
    test_directory: PathBuf,

    /// Exon table (TSV, optionally gzipped)
    #[arg(long)]
    transcripts: PathBuf,

    /// Clinical transcript map (gene<TAB>transcript)
    #[arg(long)]
    g2t: Option<PathBuf>,

    /// Gene natural key: hgnc_id or symbol
    #[arg(long)]
    gene_key: Option<GeneKeyStrategy>,
}

fn parse_panel_set(value: &str) -> std::result::Result<(PanelType, PathBuf), String> {
    let (panel_type, dir) = value
        .split_once('=')
        .ok_or_else(|| format!("expected TYPE=DIR, got '{}'", value))?;
    let panel_type = panel_type.parse::<PanelType>().map_err(|e| e.to_string())?;
    Ok((panel_type, PathBuf::from(dir)))
}

/// Parsed inputs shared by every command
struct Sources {
    records: Vec<DumpRecord>,
    directory: TestDirectory,
    transcripts: MemoryTranscriptSource,
}

impl Sources {
    fn load(args: &SourceArgs) -> Result<Self> {
        let mut records = Vec::new();
        for (panel_type, dir) in &args.panels {
            records.extend(
                read_dump_dir(dir, *panel_type)
                    .with_context(|| format!("Failed to read {} dumps from {}", panel_type, dir.display()))?,
            );
        }

        let directory = read_test_directory(&args.test_directory).context("Failed to read test directory")?;

        let mut transcripts =
            MemoryTranscriptSource::from_exon_table(&args.transcripts).context("Failed to read exon table")?;
        if let Some(g2t) = &args.g2t {
            transcripts = transcripts
                .with_clinical_map(g2t)
                .context("Failed to read clinical transcript map")?;
        }

        Ok(Self {
            records,
            directory,
            transcripts,
        })
    }

    fn input(&self) -> BuildInput<'_> {
        BuildInput::new(&self.records, &self.directory.indications)
    }
}

fn build_options(config: &Config, args: &SourceArgs) -> BuildOptions {
    BuildOptions::new(config.ci_version.clone())
        .with_gene_key(args.gene_key.unwrap_or(config.gene_key))
        .with_exon_reference(config.exon_reference.clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix(cli.command.log_file_prefix())
        .build()
        .with_env_overrides()
        .context("Invalid logging environment")?;

    init_logging(&log_config)?;

    let config = Config::load()?;

    match cli.command {
        Command::Build { sources, output } => {
            let options = build_options(&config, &sources);
            let loaded = Sources::load(&sources)?;
            let graph = build_graph(loaded.input(), &loaded.transcripts, &options)?;

            let output = output.unwrap_or_else(|| config.fixture_dir.clone());
            let written = write_fixtures(&graph, &output)?;
            let g2t_path = written.folder.join(format!("{}_g2t.tsv", config.ci_version));
            write_genes2transcripts(&graph, &g2t_path)?;

            info!(folder = %written.folder.display(), digest = %written.digest, "Build complete");
        },
        Command::Check {
            sources,
            fixture,
            database,
        } => {
            let options = build_options(&config, &sources);
            let gene_key = options.gene_key;
            let loaded = Sources::load(&sources)?;
            let reconcile = ReconcileOptions::new(options, loaded.directory.describe());

            match (fixture, database.or_else(|| config.database.url.clone())) {
                (Some(fixture), _) => {
                    let records = read_fixture_file(&fixture)?;
                    let store = MemoryStore::from_fixture_records(&records, gene_key)?;
                    run_check(store, &loaded, reconcile, &config.audit_log).await?;
                },
                (None, Some(url)) => check_database(&url, &config, gene_key, &loaded, reconcile).await?,
                (None, None) => bail!("check needs --fixture or --database (or PANEL_DATABASE_URL)"),
            }
        },
        Command::Genepanels { sources, output } => {
            let options = build_options(&config, &sources);
            let loaded = Sources::load(&sources)?;
            let graph = build_graph(loaded.input(), &loaded.transcripts, &options)?;

            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}_genepanels.tsv", config.ci_version)));
            write_genepanels(&graph, &output)?;
        },
    }

    Ok(())
}

async fn run_check<S: PanelStore>(
    store: S,
    sources: &Sources,
    options: ReconcileOptions,
    audit_log: &Path,
) -> Result<()> {
    let mut audit = JsonLinesAuditSink::new(audit_log);
    let reconciler = Reconciler::new(store, options);
    let report = reconciler
        .check(sources.input(), &sources.transcripts, &mut audit)
        .await?;

    report.into_result()?;
    info!("Check passed");
    Ok(())
}

#[cfg(feature = "database")]
async fn check_database(
    url: &str,
    config: &Config,
    gene_key: GeneKeyStrategy,
    sources: &Sources,
    options: ReconcileOptions,
) -> Result<()> {
    use panel_ingest::store::PgPanelStore;
    use std::time::Duration;

    let store = PgPanelStore::connect(
        url,
        config.database.max_connections,
        Duration::from_secs(config.database.connect_timeout_secs),
        gene_key,
    )
    .await
    .context("Failed to connect to the panel store")?;
    run_check(store, sources, options, &config.audit_log).await
}

#[cfg(not(feature = "database"))]
async fn check_database(
    _url: &str,
    _config: &Config,
    _gene_key: GeneKeyStrategy,
    _sources: &Sources,
    _options: ReconcileOptions,
) -> Result<()> {
    bail!("panel-ingest was built without the `database` feature")
}
