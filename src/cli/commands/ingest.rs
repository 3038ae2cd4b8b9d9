//! Ingest command implementation.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::cli::output::{DryRunSummary, get_formatter};
use crate::error::IngestError;
use crate::models::{Config, ConfigOverrides, OutputFormat};
use crate::services::{
    EmbeddingClient, Pipeline, QdrantBackend, RetryingEmbedder, RetryingStore, VectorStore,
    build_prompt, preflight,
};
use crate::sources::RecordSource;

/// Arguments for the ingest command.
#[derive(Debug, Clone, Default, Args)]
pub struct IngestArgs {
    /// Input file: a JSON array or JSON Lines of cost records
    #[arg(long, short = 'i', env = "COSTBOOK_INPUT")]
    pub input: Option<PathBuf>,

    /// Maximum number of points per upsert batch
    #[arg(long, short = 'b', env = "COSTBOOK_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Validate records and build prompts without calling any remote service
    #[arg(long)]
    pub dry_run: bool,
}

/// Handle the ingest command.
pub async fn handle_ingest(
    args: &IngestArgs,
    config_path: Option<&Path>,
    overrides: ConfigOverrides,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);

    if args.dry_run {
        // Credentials are not needed when nothing is sent.
        let mut config = Config::load(config_path)?;
        config.apply(overrides);
        let summary = summarize_input(&config.ingest.input)?;
        println!("{}", formatter.format_dry_run(&summary));
        return Ok(());
    }

    let config = Config::resolve(config_path, overrides)?;
    let source = RecordSource::open(&config.ingest.input)?;

    let embedder = RetryingEmbedder::new(
        EmbeddingClient::new(&config.embedding)?,
        config.retry.clone(),
    );
    let store = RetryingStore::new(
        QdrantBackend::new(&config.vector_store)?,
        config.retry.clone(),
    );

    info!(
        input = %source.path().display(),
        layout = %source.layout(),
        collection = store.collection(),
        batch_size = config.ingest.batch_size,
        "starting ingestion"
    );

    let pb = progress_bar(format, verbose);
    let mut pipeline = Pipeline::new(&embedder, &store, &config).with_progress(&pb);
    let result = pipeline.run(&source).await;
    pb.finish_and_clear();

    let mut report = result?;
    report.retries = embedder.retries() + store.retries();

    println!(
        "{}",
        formatter.format_ingest_report(&report, store.collection())
    );
    Ok(())
}

/// Validate the whole input file and show the prompt of its first record.
pub fn summarize_input(path: &Path) -> Result<DryRunSummary, IngestError> {
    let source = RecordSource::open(path)?;
    let records = preflight(&source)?;
    let sample_prompt = source
        .records()?
        .next()
        .transpose()?
        .map(|record| build_prompt(&record));

    Ok(DryRunSummary {
        input: path.display().to_string(),
        layout: source.layout().to_string(),
        records,
        sample_prompt,
    })
}

fn progress_bar(format: OutputFormat, verbose: bool) -> ProgressBar {
    if format == OutputFormat::Json || verbose || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
