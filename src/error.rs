//! Error types for the cost record ingestion pipeline.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors raised while reading cost records from the input file.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("data format error: {0}")]
    Malformed(String),

    #[error("data format error in record {index}: {message}")]
    InvalidRecord { index: usize, message: String },

    #[error("record {index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },
}

impl RecordError {
    /// Index of the offending record, when the error is tied to one.
    pub fn record_index(&self) -> Option<usize> {
        match self {
            RecordError::InvalidRecord { index, .. } | RecordError::MissingField { index, .. } => {
                Some(*index)
            }
            RecordError::Io { .. } | RecordError::Malformed(_) => None,
        }
    }
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding service rejected credentials: {0}")]
    Auth(String),

    #[error("embedding service rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("embedding request failed: {0}")]
    TransientNetwork(String),

    #[error("embedding server error: {0}")]
    TransientServer(String),

    #[error("embedding request rejected: {0}")]
    Rejected(String),

    #[error("expected {expected}-dimensional embedding, got {actual}")]
    UnexpectedDimension { expected: usize, actual: usize },

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::RateLimit { .. }
                | EmbeddingError::TransientNetwork(_)
                | EmbeddingError::TransientServer(_)
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            EmbeddingError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store rejected credentials: {0}")]
    Auth(String),

    #[error("vector store request timed out: {0}")]
    Timeout(String),

    #[error("batch payload too large for vector store: {0}")]
    PayloadTooLarge(String),

    #[error("vector store server error: {0}")]
    TransientServer(String),

    #[error("failed to connect to vector store: {0}")]
    Connection(String),

    #[error("collection error: {0}")]
    Collection(String),

    #[error("upsert rejected: {0}")]
    Rejected(String),
}

impl VectorStoreError {
    /// Map a gRPC status returned by Qdrant to the matching variant.
    pub fn from_status(code: tonic::Code, message: impl Into<String>) -> Self {
        use tonic::Code;

        let message = message.into();
        match code {
            Code::Unauthenticated | Code::PermissionDenied => VectorStoreError::Auth(message),
            Code::OutOfRange => VectorStoreError::PayloadTooLarge(message),
            Code::ResourceExhausted if is_oversized_message(&message) => {
                VectorStoreError::PayloadTooLarge(message)
            }
            Code::DeadlineExceeded => VectorStoreError::Timeout(message),
            Code::Unavailable | Code::ResourceExhausted | Code::Internal | Code::Aborted => {
                VectorStoreError::TransientServer(message)
            }
            _ => VectorStoreError::Rejected(message),
        }
    }

    /// Classify a client-side failure that carries no gRPC status.
    pub fn from_transport(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("timed out") || lower.contains("deadline") {
            VectorStoreError::Timeout(message)
        } else if lower.contains("connection")
            || lower.contains("transport error")
            || lower.contains("dns")
        {
            VectorStoreError::Connection(message)
        } else {
            VectorStoreError::Rejected(message)
        }
    }
}

/// gRPC reports request bodies above the server limit as exhausted resources.
fn is_oversized_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("larger than max") || lower.contains("message length")
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            VectorStoreError::Timeout(_)
                | VectorStoreError::TransientServer(_)
                | VectorStoreError::Connection(_)
        )
    }
}

/// Errors raised while grouping points into batches.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("point {id} is {size} bytes, above the {limit}-byte batch ceiling")]
    PointTooLarge { id: String, size: usize, limit: usize },

    #[error("failed to estimate point size: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Pipeline stage an ingestion failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Loading,
    Embedding,
    Batching,
    Upserting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Loading => "loading",
            Stage::Embedding => "embedding",
            Stage::Batching => "batching",
            Stage::Upserting => "upserting",
        };
        f.write_str(name)
    }
}

/// Unrecovered failure of an ingestion run.
///
/// Every variant names the stage it happened in and, where one exists, the
/// record or batch index, so the message printed on exit locates the fault.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("setup failed: {0}")]
    Setup(#[source] VectorStoreError),

    #[error("loading failed: {0}")]
    Load(#[from] RecordError),

    #[error("embedding failed at records {first}..{end}: {source}")]
    Embed {
        first: usize,
        end: usize,
        #[source]
        source: EmbeddingError,
    },

    #[error("batching failed at record {index}: {source}")]
    Batch {
        index: usize,
        #[source]
        source: BatchError,
    },

    #[error("upserting failed at batch {batch}: {source}")]
    Upsert {
        batch: usize,
        #[source]
        source: VectorStoreError,
    },
}

impl IngestError {
    pub fn stage(&self) -> Stage {
        match self {
            IngestError::Setup(_) => Stage::Setup,
            IngestError::Load(_) => Stage::Loading,
            IngestError::Embed { .. } => Stage::Embedding,
            IngestError::Batch { .. } => Stage::Batching,
            IngestError::Upsert { .. } => Stage::Upserting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_retryability() {
        let rate_limited = EmbeddingError::RateLimit {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert!(rate_limited.is_retryable());
        assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(2)));

        assert!(EmbeddingError::TransientNetwork("reset".to_string()).is_retryable());
        assert!(!EmbeddingError::Auth("bad key".to_string()).is_retryable());
        assert!(
            !EmbeddingError::UnexpectedDimension {
                expected: 1536,
                actual: 3072
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_vector_store_status_codes() {
        use tonic::Code;

        assert!(matches!(
            VectorStoreError::from_status(Code::Unauthenticated, "Invalid api-key"),
            VectorStoreError::Auth(_)
        ));
        assert!(matches!(
            VectorStoreError::from_status(
                Code::ResourceExhausted,
                "grpc: received message larger than max (40000000 vs. 33554432)"
            ),
            VectorStoreError::PayloadTooLarge(_)
        ));
        assert!(matches!(
            VectorStoreError::from_status(Code::DeadlineExceeded, "Timeout expired"),
            VectorStoreError::Timeout(_)
        ));
        assert!(matches!(
            VectorStoreError::from_status(Code::Unavailable, "service is unavailable"),
            VectorStoreError::TransientServer(_)
        ));
    }

    #[test]
    fn test_numbers_in_message_do_not_change_class() {
        use tonic::Code;

        let dimension = VectorStoreError::from_status(
            Code::InvalidArgument,
            "Wrong input: Vector dimension error: expected dim: 1536, got 1401",
        );
        assert!(matches!(dimension, VectorStoreError::Rejected(_)));

        let bad_point = VectorStoreError::from_status(
            Code::InvalidArgument,
            "Unable to parse point id 5030c2a1-0503-5e5a-9a8e-504b1b2d3e4f",
        );
        assert!(matches!(bad_point, VectorStoreError::Rejected(_)));
        assert!(!bad_point.is_retryable());
    }

    #[test]
    fn test_vector_store_transport_messages() {
        assert!(matches!(
            VectorStoreError::from_transport("error trying to connect: connection refused"),
            VectorStoreError::Connection(_)
        ));
        assert!(matches!(
            VectorStoreError::from_transport("operation timed out"),
            VectorStoreError::Timeout(_)
        ));
        assert!(matches!(
            VectorStoreError::from_transport("Error in conversion: sparse vector"),
            VectorStoreError::Rejected(_)
        ));
    }

    #[test]
    fn test_vector_store_retryability() {
        assert!(VectorStoreError::Timeout("no response within 60s".to_string()).is_retryable());
        assert!(VectorStoreError::TransientServer("503".to_string()).is_retryable());
        assert!(!VectorStoreError::PayloadTooLarge("33554432".to_string()).is_retryable());
        assert!(!VectorStoreError::Auth("forbidden".to_string()).is_retryable());
    }

    #[test]
    fn test_ingest_error_names_stage_and_index() {
        let err = IngestError::Upsert {
            batch: 2,
            source: VectorStoreError::Timeout("no response within 60s".to_string()),
        };
        assert_eq!(err.stage(), Stage::Upserting);
        assert_eq!(
            err.to_string(),
            "upserting failed at batch 2: vector store request timed out: no response within 60s"
        );

        let err = IngestError::from(RecordError::MissingField {
            index: 7,
            field: "unit_cost",
        });
        assert_eq!(err.stage(), Stage::Loading);
        assert!(err.to_string().contains("record 7"));
        assert!(err.to_string().contains("unit_cost"));
    }
}
