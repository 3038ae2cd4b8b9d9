//! Ingestion driver: records → prompts → vectors → batches → upserts.
//!
//! Remote calls are awaited one at a time, so at most one batch of points and
//! one group of prompts are held in memory. A failed run leaves already
//! upserted batches in place; re-running over the same input converges to the
//! same stored state because point ids are derived from record identifiers.

use std::fmt;
use std::time::Instant;

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{EmbeddingError, IngestError};
use crate::models::{Batch, Config, CostRecord, Point};
use crate::services::batch::BatchAssembler;
use crate::services::embedding::{Embedder, check_dimensions};
use crate::services::prompt::{build_payload, build_prompt};
use crate::services::vector_store::VectorStore;
use crate::sources::RecordSource;

/// Phase the driver is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Loading,
    Embedding,
    Batching,
    Upserting,
    Done,
    Failed(String),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Loading => write!(f, "loading"),
            PipelineState::Embedding => write!(f, "embedding"),
            PipelineState::Batching => write!(f, "batching"),
            PipelineState::Upserting => write!(f, "upserting"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Receives a report after every batch flush.
pub trait ProgressReporter: Send + Sync {
    /// Called once the number of records to ingest is known.
    fn started(&self, _total_records: u64) {}

    /// Called after `batch` is acknowledged by the store.
    fn batch_flushed(&self, batch: &Batch, records_processed: u64);
}

impl ProgressReporter for () {
    fn batch_flushed(&self, _batch: &Batch, _records_processed: u64) {}
}

impl ProgressReporter for ProgressBar {
    fn started(&self, total_records: u64) {
        self.set_length(total_records);
    }

    fn batch_flushed(&self, batch: &Batch, records_processed: u64) {
        self.set_position(records_processed);
        self.set_message(format!("batch {}", batch.index + 1));
    }
}

/// Counters for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub records_read: u64,
    pub points_upserted: u64,
    pub batches: u64,
    pub embedding_requests: u64,
    pub retries: u64,
    pub duration_ms: u64,
}

/// Validate every record without touching the network.
///
/// Returns the number of records. Bad input aborts here, before any embedding
/// or upsert call is made.
pub fn preflight(source: &RecordSource) -> Result<u64, IngestError> {
    let mut count = 0u64;
    for record in source.records()? {
        record?;
        count += 1;
    }
    Ok(count)
}

/// Orchestrates one ingestion run.
pub struct Pipeline<'a, E: ?Sized, S: ?Sized> {
    embedder: &'a E,
    store: &'a S,
    config: &'a Config,
    progress: &'a dyn ProgressReporter,
    state: PipelineState,
}

impl<'a, E, S> Pipeline<'a, E, S>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    pub fn new(embedder: &'a E, store: &'a S, config: &'a Config) -> Self {
        Self {
            embedder,
            store,
            config,
            progress: &(),
            state: PipelineState::Idle,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "pipeline state");
            self.state = next;
        }
    }

    /// Run the whole pipeline over `source`.
    pub async fn run(&mut self, source: &RecordSource) -> Result<IngestReport, IngestError> {
        let started = Instant::now();
        let result = self.execute(source).await;

        match result {
            Ok(mut report) => {
                self.transition(PipelineState::Done);
                report.duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    records = report.records_read,
                    points = report.points_upserted,
                    batches = report.batches,
                    "ingestion complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.transition(PipelineState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn execute(&mut self, source: &RecordSource) -> Result<IngestReport, IngestError> {
        self.transition(PipelineState::Loading);
        let total = preflight(source)?;
        info!(records = total, path = %source.path().display(), "input validated");
        self.progress.started(total);

        self.store
            .ensure_collection(self.embedder.dimension())
            .await
            .map_err(IngestError::Setup)?;

        let group_size = self.config.embedding.batch_size.max(1);
        let mut assembler = BatchAssembler::from_config(&self.config.ingest);
        let mut report = IngestReport::default();
        let mut pending: Vec<CostRecord> = Vec::with_capacity(group_size);

        for record in source.records()? {
            pending.push(record?);
            report.records_read += 1;
            if pending.len() >= group_size {
                self.embed_pending(&mut pending, &mut assembler, &mut report)
                    .await?;
                self.transition(PipelineState::Loading);
            }
        }
        if !pending.is_empty() {
            self.embed_pending(&mut pending, &mut assembler, &mut report)
                .await?;
        }

        if let Some(batch) = assembler.finish() {
            self.flush(batch, &mut report).await?;
        }

        Ok(report)
    }

    async fn embed_pending(
        &mut self,
        pending: &mut Vec<CostRecord>,
        assembler: &mut BatchAssembler,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let first = pending.first().map_or(0, CostRecord::index);
        let end = pending.last().map_or(0, |r| r.index() + 1);
        let embed_error = |source: EmbeddingError| IngestError::Embed { first, end, source };

        self.transition(PipelineState::Embedding);
        let prompts: Vec<String> = pending.iter().map(build_prompt).collect();
        let vectors = self.embedder.embed(&prompts).await.map_err(embed_error)?;
        report.embedding_requests += 1;

        if vectors.len() != prompts.len() {
            return Err(embed_error(EmbeddingError::InvalidResponse(format!(
                "received {} embeddings for {} prompts",
                vectors.len(),
                prompts.len()
            ))));
        }
        check_dimensions(&vectors, self.embedder.dimension()).map_err(embed_error)?;

        self.transition(PipelineState::Batching);
        for (record, vector) in pending.drain(..).zip(vectors) {
            let index = record.index();
            let point = Point::new(
                record.point_id(),
                vector,
                build_payload(&record, self.embedder.model()),
            );
            let completed = assembler
                .push(point)
                .map_err(|source| IngestError::Batch { index, source })?;
            if let Some(batch) = completed {
                self.flush(batch, report).await?;
                self.transition(PipelineState::Batching);
            }
        }
        Ok(())
    }

    async fn flush(&mut self, batch: Batch, report: &mut IngestReport) -> Result<(), IngestError> {
        self.transition(PipelineState::Upserting);
        self.store
            .upsert_batch(&batch)
            .await
            .map_err(|source| IngestError::Upsert {
                batch: batch.index,
                source,
            })?;

        report.batches += 1;
        report.points_upserted += batch.len() as u64;
        debug!(
            batch = batch.index,
            points = batch.len(),
            bytes = batch.estimated_bytes,
            processed = report.points_upserted,
            "batch upserted"
        );
        self.progress.batch_flushed(&batch, report.points_upserted);
        Ok(())
    }
}
