mod config;
mod format;
mod point;
mod record;

pub use config::{
    Config, ConfigOverrides, DEFAULT_BATCH_SIZE, DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_MAX_BATCH_BYTES, DEFAULT_QDRANT_URL, EmbeddingConfig,
    IngestConfig, VectorStoreConfig,
};
pub use format::OutputFormat;
pub use point::{Batch, Point};
pub use record::CostRecord;
pub use record::{
    FIELD_CODE, FIELD_DESCRIPTION, FIELD_MAIN_DIVISION, FIELD_MAJOR_CLASSIFICATION,
    FIELD_SUBDIVISION, FIELD_UNIT, FIELD_UNIT_COST,
};
