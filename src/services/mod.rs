mod batch;
mod embedding;
mod pipeline;
mod prompt;
mod vector_store;

pub use batch::{BATCH_ENVELOPE_BYTES, BatchAssembler, Batches};
pub use embedding::{Embedder, EmbeddingClient, RetryingEmbedder, check_dimensions};
pub use pipeline::{IngestReport, Pipeline, PipelineState, ProgressReporter, preflight};
pub use prompt::{SOURCE_TYPE, SOURCE_VERSION, build_payload, build_prompt};
pub use vector_store::{CollectionInfo, QdrantBackend, RetryingStore, VectorStore};
